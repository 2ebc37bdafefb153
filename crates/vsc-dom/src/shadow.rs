//! Shadow DOM
//!
//! Shadow roots are parentless nodes linked to their host. Mutation
//! observers registered on a document never see inside them.

use crate::node::{Node, NodeData, ShadowRootData};
use crate::{DomError, DomTree, NodeId, Result};

/// Shadow root mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShadowRootMode {
    #[default]
    Open,
    Closed,
}

impl DomTree {
    /// `attachShadow`
    pub fn attach_shadow(&mut self, host: NodeId, mode: ShadowRootMode) -> Result<NodeId> {
        let elem = self.element(host).ok_or(DomError::NotFound(host))?;
        if elem.shadow_root.is_valid() {
            return Err(DomError::NotSupported("element already hosts a shadow root".into()));
        }
        let doc = self.owner_document(host).ok_or(DomError::NotFound(host))?;
        let root = self.alloc(Node::new(doc, NodeData::ShadowRoot(ShadowRootData { host, mode })));
        if let Some(elem) = self.element_mut(host) {
            elem.shadow_root = root;
        }
        Ok(root)
    }

    /// `element.shadowRoot`: only open roots are exposed
    pub fn shadow_root(&self, host: NodeId) -> Option<NodeId> {
        let root = self.element(host)?.shadow_root.some()?;
        let data = self.get(root)?.as_shadow_root()?;
        (data.mode == ShadowRootMode::Open).then_some(root)
    }

    /// Host element of a shadow root
    pub fn host(&self, shadow_root: NodeId) -> Option<NodeId> {
        self.get(shadow_root)?.as_shadow_root()?.host.some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_roots_are_hidden() {
        let mut dom = DomTree::new();
        let doc = dom.create_document("https://example.com/").unwrap();
        let open_host = dom.create_element(doc, "div");
        let closed_host = dom.create_element(doc, "div");
        let open = dom.attach_shadow(open_host, ShadowRootMode::Open).unwrap();
        dom.attach_shadow(closed_host, ShadowRootMode::Closed).unwrap();

        assert_eq!(dom.shadow_root(open_host), Some(open));
        assert_eq!(dom.shadow_root(closed_host), None);
        assert_eq!(dom.host(open), Some(open_host));
        assert!(dom.attach_shadow(open_host, ShadowRootMode::Open).is_err());
    }

    #[test]
    fn test_shadow_content_is_connected_through_host() {
        let mut dom = DomTree::new();
        let doc = dom.create_document("https://example.com/").unwrap();
        let body = dom.body(doc).unwrap();
        let host = dom.create_element(doc, "my-player");
        let root = dom.attach_shadow(host, ShadowRootMode::Open).unwrap();
        let video = dom.create_element(doc, "video");
        dom.append_child(root, video).unwrap();

        assert!(!dom.is_connected(video));
        dom.append_child(body, host).unwrap();
        assert!(dom.is_connected(video));
        assert_eq!(dom.root_node(video), root);
        assert_eq!(dom.parent_element(video), None);
        assert_eq!(dom.flat_parent(root), Some(host));
    }
}
