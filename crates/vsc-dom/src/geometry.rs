//! Geometry APIs
//!
//! DOMRect, getBoundingClientRect and offsetParent.

use crate::{DomTree, NodeId};

/// DOMRect - rectangle geometry in viewport coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DOMRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl DOMRect {
    /// Create with dimensions
    pub fn from_xywh(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn top(&self) -> f64 {
        self.y
    }

    pub fn left(&self) -> f64 {
        self.x
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Same box size, position ignored
    pub fn same_size(&self, other: &DOMRect) -> bool {
        self.width == other.width && self.height == other.height
    }
}

impl DomTree {
    /// Viewport-relative box of an element (zero rect for other nodes)
    pub fn bounding_client_rect(&self, node: NodeId) -> DOMRect {
        self.element(node).map(|e| e.rect).unwrap_or_default()
    }

    /// Update an element's layout box.
    ///
    /// Queues resize observations when the size changed.
    pub fn set_rect(&mut self, node: NodeId, rect: DOMRect) {
        let Some(elem) = self.element_mut(node) else { return };
        let resized = !elem.rect.same_size(&rect);
        elem.rect = rect;
        if resized {
            self.notify_resize(node, rect);
        }
    }

    /// `offsetWidth`/`offsetHeight`
    pub fn offset_size(&self, node: NodeId) -> (f64, f64) {
        let rect = self.bounding_client_rect(node);
        (rect.width, rect.height)
    }

    /// `offsetParent`: nearest positioned ancestor in the flat tree, or the
    /// body. None when the element is disconnected or `display: none`.
    pub fn offset_parent(&self, node: NodeId) -> Option<NodeId> {
        if !self.is_connected(node) || self.style(node, "display") == Some("none") {
            return None;
        }
        let mut current = self.flat_parent(node);
        while let Some(id) = current {
            if let Some(elem) = self.element(id) {
                if elem.tag == "body" {
                    return Some(id);
                }
                let positioned = elem.style.get("position")
                    .is_some_and(|p| p != "static");
                if positioned || matches!(elem.tag.as_str(), "td" | "th" | "table") {
                    return Some(id);
                }
            }
            current = self.flat_parent(id);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dom_rect_edges() {
        let rect = DOMRect::from_xywh(10.0, 20.0, 100.0, 50.0);
        assert_eq!(rect.top(), 20.0);
        assert_eq!(rect.right(), 110.0);
        assert_eq!(rect.bottom(), 70.0);
        assert_eq!(rect.left(), 10.0);
    }

    #[test]
    fn test_offset_parent_prefers_positioned_ancestor() {
        let mut dom = DomTree::new();
        let doc = dom.create_document("https://example.com/").unwrap();
        let body = dom.body(doc).unwrap();
        let outer = dom.create_element(doc, "div");
        let inner = dom.create_element(doc, "div");
        let video = dom.create_element(doc, "video");
        dom.append_child(body, outer).unwrap();
        dom.append_child(outer, inner).unwrap();
        dom.append_child(inner, video).unwrap();

        assert_eq!(dom.offset_parent(video), Some(body));
        dom.set_style(outer, "position", "relative");
        assert_eq!(dom.offset_parent(video), Some(outer));
        dom.set_style(video, "display", "none");
        assert_eq!(dom.offset_parent(video), None);
    }
}
