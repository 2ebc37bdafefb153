//! vsc DOM - host document model
//!
//! Arena-based DOM shared by every document of one browsing context tree
//! (top document plus its frames). Mutations are recorded for observers,
//! events are queued as deliveries, and resize notifications are queued per
//! observer, so an embedder drains all DOM activity explicitly.

mod classlist;
mod document;
mod events;
mod geometry;
mod media;
mod node;
mod observer;
mod shadow;
mod tree;

pub use classlist::DOMTokenList;
pub use document::{PostedMessage, ReadyState};
pub use events::{Delivery, Event, EventId, EventType, KeyboardInit, ListenerId, Modifier};
pub use geometry::DOMRect;
pub use media::{MediaKind, MediaState, MAX_PLAYBACK_RATE, MIN_PLAYBACK_RATE};
pub use node::{Attribute, DocumentData, ElementData, Node, NodeData, ShadowRootData};
pub use observer::{MutationObserverInit, MutationRecord, MutationType, ObserverId, ResizeObserverEntry};
pub use shadow::ShadowRootMode;
pub use tree::DomTree;

/// Node identifier (index into the arena). Ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Sentinel for "no node"
    pub const NONE: NodeId = NodeId(u32::MAX);

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::NONE
    }

    /// Convert the sentinel into `None`
    #[inline]
    pub fn some(self) -> Option<NodeId> {
        self.is_valid().then_some(self)
    }
}

/// Identifies the embedder-side handler of a listener or observer.
///
/// The DOM never runs callbacks itself; it hands the id back with each
/// delivery and the embedder routes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackId(pub u32);

/// DOM error
#[derive(Debug, thiserror::Error)]
pub enum DomError {
    #[error("Node not found: {0:?}")]
    NotFound(NodeId),

    #[error("Hierarchy request error: {0}")]
    HierarchyRequest(&'static str),

    #[error("Security error: {0}")]
    Security(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, DomError>;
