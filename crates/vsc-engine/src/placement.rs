//! Overlay Placement
//!
//! Host-pattern table deciding where an overlay wrapper is inserted.
//! Some sites cover their video with sibling layers, so the wrapper has
//! to sit higher up the tree to stay clickable.

use vsc_dom::{DomTree, NodeId};

/// Host name pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostPattern {
    Exact(String),
    Contains(String),
}

impl HostPattern {
    pub fn exact(host: &str) -> Self {
        Self::Exact(host.to_string())
    }

    pub fn contains(fragment: &str) -> Self {
        Self::Contains(fragment.to_string())
    }

    pub fn matches(&self, hostname: &str) -> bool {
        match self {
            Self::Exact(host) => hostname == host,
            Self::Contains(fragment) => hostname.contains(fragment.as_str()),
        }
    }
}

/// Where the wrapper goes relative to the media element's natural parent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// First child of the natural parent
    FirstChildOfParent,
    /// Sibling right before the natural parent
    BeforeParent,
    /// First child of the n-th ancestor of the natural parent
    FirstChildOfAncestor(usize),
}

/// Resolved insertion point: `insert_before(parent, wrapper, before)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertionPoint {
    pub parent: NodeId,
    pub before: Option<NodeId>,
}

#[derive(Debug, Clone)]
struct PlacementRule {
    host: HostPattern,
    /// Rule is skipped when the media element carries this class
    unless_class: Option<String>,
    placement: Placement,
}

/// Placement lookup table, first matching row wins
#[derive(Debug, Clone)]
pub struct PlacementPolicy {
    rules: Vec<PlacementRule>,
}

impl Default for PlacementPolicy {
    fn default() -> Self {
        Self::empty()
            // product-page players use vjs-tech and break in fullscreen otherwise
            .with_rule_unless(HostPattern::exact("www.amazon.com"), "vjs-tech", Placement::BeforeParent)
            .with_rule(HostPattern::exact("www.reddit.com"), Placement::BeforeParent)
            .with_rule(HostPattern::contains("hbogo."), Placement::BeforeParent)
            .with_rule(HostPattern::exact("www.facebook.com"), Placement::FirstChildOfAncestor(7))
            .with_rule(HostPattern::exact("tv.apple.com"), Placement::FirstChildOfAncestor(1))
            .with_rule(HostPattern::exact("www.youtube.com"), Placement::FirstChildOfAncestor(1))
    }
}

impl PlacementPolicy {
    /// Policy with only the default rule
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn with_rule(mut self, host: HostPattern, placement: Placement) -> Self {
        self.rules.push(PlacementRule { host, unless_class: None, placement });
        self
    }

    pub fn with_rule_unless(mut self, host: HostPattern, class: &str, placement: Placement) -> Self {
        self.rules.push(PlacementRule {
            host,
            unless_class: Some(class.to_string()),
            placement,
        });
        self
    }

    /// Placement for a media element on `hostname`
    pub fn placement_for(&self, hostname: &str, dom: &DomTree, media: NodeId) -> Placement {
        self.rules.iter()
            .find(|rule| {
                rule.host.matches(hostname)
                    && !rule.unless_class.as_deref().is_some_and(|c| dom.has_class(media, c))
            })
            .map(|rule| rule.placement)
            .unwrap_or(Placement::FirstChildOfParent)
    }

    /// Decide where the overlay for `media` goes. Rules that need missing
    /// ancestors fall back to the natural parent.
    pub fn resolve(&self, hostname: &str, dom: &DomTree, media: NodeId, parent: NodeId) -> InsertionPoint {
        let first_child_of = |node: NodeId| InsertionPoint { parent: node, before: dom.first_child(node) };

        match self.placement_for(hostname, dom, media) {
            Placement::FirstChildOfParent => first_child_of(parent),
            Placement::BeforeParent => match dom.parent_element(parent) {
                Some(grandparent) => InsertionPoint { parent: grandparent, before: Some(parent) },
                None => first_child_of(parent),
            },
            Placement::FirstChildOfAncestor(levels) => {
                let mut node = parent;
                for _ in 0..levels {
                    match dom.parent(node).filter(|&p| dom.is_element(p) || dom.is_shadow_root(p)) {
                        Some(next) => node = next,
                        None => {
                            tracing::debug!("Ancestor {} levels up is missing, using natural parent", levels);
                            return first_child_of(parent);
                        }
                    }
                }
                first_child_of(node)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nested(depth: usize) -> (DomTree, Vec<NodeId>, NodeId) {
        let mut dom = DomTree::new();
        let doc = dom.create_document("https://example.com/").unwrap();
        let mut chain = vec![dom.body(doc).unwrap()];
        for _ in 0..depth {
            let div = dom.create_element(doc, "div");
            dom.append_child(*chain.last().unwrap(), div).unwrap();
            chain.push(div);
        }
        let video = dom.create_element(doc, "video");
        dom.append_child(*chain.last().unwrap(), video).unwrap();
        (dom, chain, video)
    }

    #[test]
    fn test_default_is_first_child_of_parent() {
        let (dom, chain, video) = nested(2);
        let parent = chain[2];
        let point = PlacementPolicy::default().resolve("example.com", &dom, video, parent);
        assert_eq!(point, InsertionPoint { parent, before: Some(video) });
    }

    #[test]
    fn test_before_parent_sites() {
        let (dom, chain, video) = nested(2);
        let policy = PlacementPolicy::default();
        let point = policy.resolve("www.reddit.com", &dom, video, chain[2]);
        assert_eq!(point, InsertionPoint { parent: chain[1], before: Some(chain[2]) });
        let point = policy.resolve("play.hbogo.com", &dom, video, chain[2]);
        assert_eq!(point.parent, chain[1]);
    }

    #[test]
    fn test_amazon_skips_product_videos() {
        let (mut dom, chain, video) = nested(2);
        let policy = PlacementPolicy::default();
        assert_eq!(policy.placement_for("www.amazon.com", &dom, video), Placement::BeforeParent);
        dom.add_class(video, "vjs-tech");
        assert_eq!(policy.placement_for("www.amazon.com", &dom, video), Placement::FirstChildOfParent);
        assert_eq!(policy.resolve("www.amazon.com", &dom, video, chain[2]).parent, chain[2]);
    }

    #[test]
    fn test_ancestor_rules() {
        let (dom, chain, video) = nested(8);
        let policy = PlacementPolicy::default();
        let youtube = policy.resolve("www.youtube.com", &dom, video, chain[8]);
        assert_eq!(youtube.parent, chain[7]);
        let facebook = policy.resolve("www.facebook.com", &dom, video, chain[8]);
        assert_eq!(facebook.parent, chain[1]);
    }

    #[test]
    fn test_missing_ancestor_falls_back() {
        let (dom, chain, video) = nested(1);
        let point = PlacementPolicy::default().resolve("www.facebook.com", &dom, video, chain[1]);
        assert_eq!(point.parent, chain[1]);
    }
}
