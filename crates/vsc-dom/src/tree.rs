//! DOM Tree (arena-based allocation)
//!
//! One arena holds every document of a browsing context tree. Tree edits
//! go through `insert_before`/`remove` so observers see every change.

use crate::events::EventRegistry;
use crate::media::{MediaKind, MediaState};
use crate::node::{ElementData, Node, NodeData};
use crate::observer::ObserverRegistry;
use crate::{CallbackId, DOMTokenList, DomError, NodeId, Result};

/// Arena-based DOM tree
#[derive(Debug, Default)]
pub struct DomTree {
    nodes: Vec<Node>,
    pub(crate) observers: ObserverRegistry,
    pub(crate) events: EventRegistry,
    next_callback: u32,
}

impl DomTree {
    /// Create a new empty DOM tree
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Get a node by ID
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0 as usize)
    }

    /// Get a mutable node by ID
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0 as usize)
    }

    /// Number of nodes ever allocated
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Hand out a fresh callback id for a listener or observer
    pub fn allocate_callback(&mut self) -> CallbackId {
        self.next_callback += 1;
        CallbackId(self.next_callback)
    }

    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        self.get(id)?.as_element()
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        self.get_mut(id)?.as_element_mut()
    }

    // --- Creation ---

    /// Create a detached element owned by `doc`
    pub fn create_element(&mut self, doc: NodeId, tag: &str) -> NodeId {
        let mut data = ElementData::new(tag);
        data.media = MediaKind::from_tag(&data.tag).map(MediaState::new);
        self.alloc(Node::new(doc, NodeData::Element(data)))
    }

    /// Create a detached text node owned by `doc`
    pub fn create_text(&mut self, doc: NodeId, text: &str) -> NodeId {
        self.alloc(Node::new(doc, NodeData::Text(text.to_string())))
    }

    // --- Navigation ---

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id)?.parent.some()
    }

    /// Parent if it is an element
    pub fn parent_element(&self, id: NodeId) -> Option<NodeId> {
        self.parent(id).filter(|&p| self.is_element(p))
    }

    /// Parent in the flattened tree: shadow roots lead to their host
    pub fn flat_parent(&self, id: NodeId) -> Option<NodeId> {
        let node = self.get(id)?;
        if let Some(shadow) = node.as_shadow_root() {
            return shadow.host.some();
        }
        node.parent.some()
    }

    /// All child nodes in order
    pub fn child_nodes(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut child = self.get(id).map(|n| n.first_child).unwrap_or(NodeId::NONE);
        while let Some(node) = self.get(child) {
            out.push(child);
            child = node.next_sibling;
        }
        out
    }

    /// Element children in order
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.child_nodes(id).into_iter().filter(|&c| self.is_element(c)).collect()
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.get(id)?.first_child.some()
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.get(id).is_some_and(|n| n.is_element())
    }

    pub fn is_document(&self, id: NodeId) -> bool {
        self.get(id).is_some_and(|n| n.as_document().is_some())
    }

    pub fn is_shadow_root(&self, id: NodeId) -> bool {
        self.get(id).is_some_and(|n| n.as_shadow_root().is_some())
    }

    /// Lowercase tag name of an element
    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|e| e.tag.as_str())
    }

    pub fn is_tag(&self, id: NodeId, tag: &str) -> bool {
        self.tag_name(id) == Some(tag)
    }

    pub fn owner_document(&self, id: NodeId) -> Option<NodeId> {
        self.get(id)?.owner_document.some()
    }

    /// `getRootNode()` without crossing shadow boundaries
    pub fn root_node(&self, id: NodeId) -> NodeId {
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            current = parent;
        }
        current
    }

    /// Document this node is connected to, crossing shadow boundaries
    pub fn connected_document(&self, id: NodeId) -> Option<NodeId> {
        let mut root = self.root_node(id);
        loop {
            let node = self.get(root)?;
            if node.as_document().is_some() {
                return Some(root);
            }
            let host = node.as_shadow_root()?.host;
            root = self.root_node(host);
        }
    }

    /// `isConnected`
    pub fn is_connected(&self, id: NodeId) -> bool {
        self.connected_document(id).is_some()
    }

    /// Light-tree inclusive ancestor check
    pub fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    // --- Tree edits ---

    /// Append `child` as last child of `parent`
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.insert_before(parent, child, None)
    }

    /// Insert `child` as first child of `parent`
    pub fn prepend(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        let first = self.first_child(parent);
        self.insert_before(parent, child, first)
    }

    /// Insert `child` before `reference` (append when None).
    ///
    /// A child that already has a parent is moved, producing a removal
    /// record followed by an addition record.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) -> Result<()> {
        let parent_node = self.get(parent).ok_or(DomError::NotFound(parent))?;
        if matches!(parent_node.data, NodeData::Text(_)) {
            return Err(DomError::HierarchyRequest("text nodes cannot have children"));
        }
        let child_node = self.get(child).ok_or(DomError::NotFound(child))?;
        if matches!(child_node.data, NodeData::Document(_) | NodeData::ShadowRoot(_)) {
            return Err(DomError::HierarchyRequest("documents and shadow roots cannot be inserted"));
        }
        if self.is_inclusive_ancestor(child, parent) {
            return Err(DomError::HierarchyRequest("cannot insert a node into its own subtree"));
        }
        if let Some(reference) = reference {
            if self.parent(reference) != Some(parent) {
                return Err(DomError::NotFound(reference));
            }
            if reference == child {
                return Ok(());
            }
        }

        self.remove(child)?;

        let next = reference.unwrap_or(NodeId::NONE);
        let prev = match reference {
            Some(r) => self.nodes[r.0 as usize].prev_sibling,
            None => self.nodes[parent.0 as usize].last_child,
        };
        {
            let node = &mut self.nodes[child.0 as usize];
            node.parent = parent;
            node.prev_sibling = prev;
            node.next_sibling = next;
        }
        match prev.some() {
            Some(p) => self.nodes[p.0 as usize].next_sibling = child,
            None => self.nodes[parent.0 as usize].first_child = child,
        }
        match next.some() {
            Some(n) => self.nodes[n.0 as usize].prev_sibling = child,
            None => self.nodes[parent.0 as usize].last_child = child,
        }

        self.record_child_list(parent, vec![child], Vec::new());
        Ok(())
    }

    /// Detach a node from its parent. Detached nodes are left alone.
    pub fn remove(&mut self, child: NodeId) -> Result<()> {
        let node = self.get(child).ok_or(DomError::NotFound(child))?;
        let Some(parent) = node.parent.some() else {
            return Ok(());
        };
        let (prev, next) = (node.prev_sibling, node.next_sibling);

        match prev.some() {
            Some(p) => self.nodes[p.0 as usize].next_sibling = next,
            None => self.nodes[parent.0 as usize].first_child = next,
        }
        match next.some() {
            Some(n) => self.nodes[n.0 as usize].prev_sibling = prev,
            None => self.nodes[parent.0 as usize].last_child = prev,
        }
        {
            let node = &mut self.nodes[child.0 as usize];
            node.parent = NodeId::NONE;
            node.prev_sibling = NodeId::NONE;
            node.next_sibling = NodeId::NONE;
        }

        self.record_child_list(parent, Vec::new(), vec![child]);
        Ok(())
    }

    // --- Attributes ---

    /// Attribute value (`class` lives in the class list)
    pub fn get_attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)?.get_attr(name)
    }

    pub fn has_attribute(&self, id: NodeId, name: &str) -> bool {
        self.get_attribute(id, name).is_some()
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> Result<()> {
        let elem = self.element_mut(id).ok_or(DomError::NotFound(id))?;
        let old = if name == "class" {
            let old = elem.classes.value();
            elem.classes = DOMTokenList::from_string(value);
            Some(old)
        } else {
            elem.set_attr(name, value)
        };
        self.record_attribute(id, name, old);
        Ok(())
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> Result<()> {
        let elem = self.element_mut(id).ok_or(DomError::NotFound(id))?;
        if let Some(old) = elem.remove_attr(name) {
            self.record_attribute(id, name, Some(old));
        }
        Ok(())
    }

    // --- Classes ---

    pub fn class_list(&self, id: NodeId) -> Option<&DOMTokenList> {
        self.element(id).map(|e| &e.classes)
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.class_list(id).is_some_and(|c| c.contains(class))
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) {
        self.edit_classes(id, |c| c.add(class));
    }

    pub fn remove_class(&mut self, id: NodeId, class: &str) {
        self.edit_classes(id, |c| c.remove(class));
    }

    /// Toggle a class, returns whether it is now present
    pub fn toggle_class(&mut self, id: NodeId, class: &str) -> bool {
        self.edit_classes(id, |c| {
            c.toggle(class);
            true
        });
        self.has_class(id, class)
    }

    fn edit_classes(&mut self, id: NodeId, edit: impl FnOnce(&mut DOMTokenList) -> bool) {
        let Some(elem) = self.element_mut(id) else { return };
        let old = elem.classes.value();
        if edit(&mut elem.classes) {
            self.record_attribute(id, "class", Some(old));
        }
    }

    // --- Inline style ---

    pub fn style(&self, id: NodeId, property: &str) -> Option<&str> {
        self.element(id)?.style.get(property).map(|s| s.as_str())
    }

    pub fn set_style(&mut self, id: NodeId, property: &str, value: &str) {
        if let Some(elem) = self.element_mut(id) {
            elem.style.insert(property.to_string(), value.to_string());
        }
    }

    // --- Text ---

    /// Replace all children with a single text node
    pub fn set_text_content(&mut self, id: NodeId, text: &str) -> Result<()> {
        for child in self.child_nodes(id) {
            self.remove(child)?;
        }
        let doc = self.owner_document(id).ok_or(DomError::NotFound(id))?;
        let text_node = self.create_text(doc, text);
        self.append_child(id, text_node)
    }

    /// Concatenated descendant text
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(text) = self.get(current).and_then(|n| n.as_text()) {
                out.push_str(text);
            }
            stack.extend(self.child_nodes(current).into_iter().rev());
        }
        out
    }

    /// `isContentEditable`: nearest `contenteditable` attribute wins
    pub fn is_content_editable(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            match self.get_attribute(node, "contenteditable") {
                Some("" | "true" | "plaintext-only") => return true,
                Some("false") => return false,
                _ => {}
            }
            current = self.parent_element(node);
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_before_orders_children() {
        let mut dom = DomTree::new();
        let doc = dom.create_document("https://example.com/").unwrap();
        let body = dom.body(doc).unwrap();
        let a = dom.create_element(doc, "div");
        let b = dom.create_element(doc, "span");
        let c = dom.create_element(doc, "p");
        dom.append_child(body, a).unwrap();
        dom.append_child(body, c).unwrap();
        dom.insert_before(body, b, Some(c)).unwrap();
        assert_eq!(dom.children(body), vec![a, b, c]);

        dom.remove(b).unwrap();
        assert_eq!(dom.children(body), vec![a, c]);
        assert!(!dom.is_connected(b));
    }

    #[test]
    fn test_insert_into_own_subtree_fails() {
        let mut dom = DomTree::new();
        let doc = dom.create_document("https://example.com/").unwrap();
        let outer = dom.create_element(doc, "div");
        let inner = dom.create_element(doc, "div");
        dom.append_child(outer, inner).unwrap();
        assert!(matches!(dom.append_child(inner, outer), Err(DomError::HierarchyRequest(_))));
    }

    #[test]
    fn test_moving_node_keeps_single_parent() {
        let mut dom = DomTree::new();
        let doc = dom.create_document("https://example.com/").unwrap();
        let body = dom.body(doc).unwrap();
        let first = dom.create_element(doc, "div");
        let second = dom.create_element(doc, "div");
        let video = dom.create_element(doc, "video");
        dom.append_child(body, first).unwrap();
        dom.append_child(body, second).unwrap();
        dom.append_child(first, video).unwrap();
        dom.append_child(second, video).unwrap();
        assert!(dom.children(first).is_empty());
        assert_eq!(dom.parent(video), Some(second));
    }

    #[test]
    fn test_text_content_and_editable() {
        let mut dom = DomTree::new();
        let doc = dom.create_document("https://example.com/").unwrap();
        let div = dom.create_element(doc, "div");
        let input = dom.create_element(doc, "span");
        dom.append_child(div, input).unwrap();
        dom.set_text_content(input, "1.00").unwrap();
        assert_eq!(dom.text_content(div), "1.00");

        dom.set_attribute(div, "contenteditable", "true").unwrap();
        assert!(dom.is_content_editable(input));
        dom.set_attribute(input, "contenteditable", "false").unwrap();
        assert!(!dom.is_content_editable(input));
    }
}
