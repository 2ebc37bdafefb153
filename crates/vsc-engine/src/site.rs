//! Site Integrations
//!
//! Per-host seek backends, injected page scripts and the attribute
//! re-scan rules for players that toggle visibility instead of inserting
//! nodes.

use serde_json::json;
use vsc_dom::{DomTree, NodeId};

use crate::placement::HostPattern;
use crate::Result;

/// How a seek request reaches the player
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeekBackend {
    /// Move `currentTime` on the element
    Direct,
    /// Ask the page's own player through `postMessage`
    PostMessage { target_origin: String },
}

/// What an attribute-triggered re-scan does with already tracked videos
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RescanRule {
    /// Only attach controllers that are missing
    AttachMissing,
    /// Remove and recreate every controller
    ForceReattach,
}

/// Integration for one site
#[derive(Debug, Clone)]
pub struct SiteProfile {
    pub host: HostPattern,
    pub seek: SeekBackend,
    /// Script path relative to the extension base URL
    pub script: Option<String>,
}

/// Site integration table
#[derive(Debug, Clone)]
pub struct SiteProfiles {
    profiles: Vec<SiteProfile>,
}

impl Default for SiteProfiles {
    fn default() -> Self {
        Self {
            profiles: vec![SiteProfile {
                host: HostPattern::exact("www.netflix.com"),
                seek: SeekBackend::PostMessage {
                    target_origin: "https://www.netflix.com".into(),
                },
                script: Some("scriptforsite/netflix.js".into()),
            }],
        }
    }
}

impl SiteProfiles {
    pub fn empty() -> Self {
        Self { profiles: Vec::new() }
    }

    pub fn with_profile(mut self, profile: SiteProfile) -> Self {
        self.profiles.push(profile);
        self
    }

    pub fn for_host(&self, hostname: &str) -> Option<&SiteProfile> {
        self.profiles.iter().find(|p| p.host.matches(hostname))
    }

    /// Seek `media` by `seconds` through the backend of its document's site
    pub fn seek(&self, dom: &mut DomTree, media: NodeId, seconds: f64) -> Result<()> {
        let Some(doc) = dom.owner_document(media) else {
            return Ok(());
        };
        let backend = self.for_host(dom.hostname(doc)).map(|p| p.seek.clone()).unwrap_or(SeekBackend::Direct);
        match backend {
            SeekBackend::Direct => {
                let current = dom.media(media).map(|m| m.current_time).unwrap_or(0.0);
                dom.set_current_time(media, current + seconds)?;
            }
            SeekBackend::PostMessage { target_origin } => {
                let message = json!({"action": "videospeed-seek", "seekMs": seconds * 1000.0});
                if !dom.post_message(doc, message, &target_origin) {
                    tracing::debug!("Seek relay to {} was not delivered", target_origin);
                }
            }
        }
        Ok(())
    }

    /// Append the site's helper script to the document head
    pub fn inject_script(&self, dom: &mut DomTree, doc: NodeId, extension_url: &str) -> Result<Option<NodeId>> {
        let Some(path) = self.for_host(dom.hostname(doc)).and_then(|p| p.script.clone()) else {
            return Ok(None);
        };
        let Some(head) = dom.head(doc) else {
            return Ok(None);
        };
        let script = dom.create_element(doc, "script");
        dom.set_attribute(script, "src", &format!("{extension_url}{path}"))?;
        dom.append_child(head, script)?;
        tracing::debug!("Injected {} into {:?}", path, doc);
        Ok(Some(script))
    }
}

/// Re-scan rule for an attribute change on `target`, None when the change
/// does not call for a re-scan
pub fn rescan_rule(dom: &DomTree, target: NodeId) -> Option<RescanRule> {
    // toggled on every click on the overlay, so never re-create there
    if dom.is_tag(target, "apple-tv-plus-player") {
        return Some(RescanRule::AttachMissing);
    }
    if dom.get_attribute(target, "aria-hidden") == Some("false") {
        return Some(RescanRule::ForceReattach);
    }
    None
}
