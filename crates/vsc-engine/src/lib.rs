//! vsc Engine - video speed controller
//!
//! Content-script core of a playback speed controller. It finds media
//! elements in a document tree (light DOM, open shadow roots and same-origin
//! frames), attaches an overlay controller to each, and turns key presses
//! and overlay clicks into speed, seek, volume and visibility actions.
//!
//! Features:
//! - Discovery with deferred mutation processing
//! - Per-element controllers with shadow-DOM overlays
//! - Configurable key bindings and action dispatch
//! - Site-specific placement, seek relays and blacklisting

mod bindings;
mod blacklist;
mod config;
mod content;
mod controller;
mod discovery;
mod dispatch;
mod placement;
mod runtime;
mod site;

pub use bindings::{default_bindings, Action, KeyBinding, KeyBindingTable, KeyModifier};
pub use blacklist::{Blacklist, DEFAULT_BLACKLIST};
pub use config::{MemoryStore, Settings, SettingsStore};
pub use content::{ContentScript, Pumped};
pub use controller::{ElementController, TrackedElementSet, CONTROLLER_CLASS};
pub use discovery::DocumentPhase;
pub use dispatch::RATE_CHANGE_ORIGIN;
pub use placement::{HostPattern, InsertionPoint, Placement, PlacementPolicy};
pub use site::{rescan_rule, RescanRule, SeekBackend, SiteProfile, SiteProfiles};

pub use vsc_dom as dom;

use vsc_dom::NodeId;

/// Lowest speed actions will set
pub const MIN_SPEED: f64 = 0.07;
/// Highest speed actions will set
pub const MAX_SPEED: f64 = 16.0;
/// Window after an extension speed change in which native rate changes
/// are suppressed
pub const COOLDOWN_MS: u64 = 1000;
/// Upper bound on how long a mutation batch waits for an idle point
pub const IDLE_TIMEOUT_MS: u64 = 1000;
/// How long an action keeps the overlay visible
pub const SHOW_MS: u64 = 2000;
/// Default blink duration
pub const BLINK_MS: u64 = 1000;
/// Base URL of packaged assets
pub const DEFAULT_EXTENSION_URL: &str = "chrome-extension://videospeed/";

/// Engine error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("DOM error: {0}")]
    Dom(#[from] vsc_dom::DomError),

    #[error("Invalid setting {key}: {source}")]
    Setting {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid blacklist pattern {line:?}: {source}")]
    Pattern {
        line: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid extension URL: {0}")]
    ExtensionUrl(#[from] url::ParseError),

    #[error("Media element {0:?} has no parent to attach to")]
    Detached(NodeId),
}

pub type Result<T> = std::result::Result<T, Error>;
