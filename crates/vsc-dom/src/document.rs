//! Document - document-level API
//!
//! Documents, frames, `document.write` replacement and the window message
//! channel.

use url::{Origin, Url};

use crate::events::{Event, EventType};
use crate::node::{DocumentData, Node, NodeData};
use crate::{DomError, DomTree, NodeId, Result};

/// `document.readyState`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadyState {
    Loading,
    Interactive,
    #[default]
    Complete,
}

/// A message delivered through `window.postMessage`
#[derive(Debug, Clone, PartialEq)]
pub struct PostedMessage {
    pub data: serde_json::Value,
    /// Serialized origin of the sender
    pub origin: String,
}

impl DomTree {
    /// Create a complete document with `<html><head/><body/></html>`
    pub fn create_document(&mut self, url: &str) -> Result<NodeId> {
        let url = Url::parse(url)?;
        let doc = self.alloc(Node::new(NodeId::NONE, NodeData::Document(DocumentData {
            url,
            ready_state: ReadyState::Complete,
            frame_element: NodeId::NONE,
            messages: Vec::new(),
        })));
        if let Some(node) = self.get_mut(doc) {
            node.owner_document = doc;
        }
        let html = self.build_document_element(doc)?;
        self.append_child(doc, html)?;
        tracing::debug!("Created document {:?}", doc);
        Ok(doc)
    }

    fn build_document_element(&mut self, doc: NodeId) -> Result<NodeId> {
        let html = self.create_element(doc, "html");
        let head = self.create_element(doc, "head");
        let body = self.create_element(doc, "body");
        self.append_child(html, head)?;
        self.append_child(html, body)?;
        Ok(html)
    }

    /// `<html>` element
    pub fn document_element(&self, doc: NodeId) -> Option<NodeId> {
        self.children(doc).into_iter().next()
    }

    pub fn head(&self, doc: NodeId) -> Option<NodeId> {
        self.document_child(doc, "head")
    }

    pub fn body(&self, doc: NodeId) -> Option<NodeId> {
        self.document_child(doc, "body")
    }

    fn document_child(&self, doc: NodeId, tag: &str) -> Option<NodeId> {
        let html = self.document_element(doc)?;
        self.children(html).into_iter().find(|&c| self.is_tag(c, tag))
    }

    /// Document URL
    pub fn url(&self, doc: NodeId) -> Option<&Url> {
        self.get(doc)?.as_document().map(|d| &d.url)
    }

    /// Host name of the document URL (empty when it has none)
    pub fn hostname(&self, doc: NodeId) -> &str {
        self.url(doc).and_then(|u| u.host_str()).unwrap_or("")
    }

    /// Effective origin; `about:` documents inherit their frame's origin
    pub fn origin(&self, doc: NodeId) -> Option<Origin> {
        let data = self.get(doc)?.as_document()?;
        if data.url.scheme() == "about" {
            if let Some(parent_doc) = self.owner_document(data.frame_element) {
                return self.origin(parent_doc);
            }
        }
        Some(data.url.origin())
    }

    pub fn ready_state(&self, doc: NodeId) -> Option<ReadyState> {
        self.get(doc)?.as_document().map(|d| d.ready_state)
    }

    /// Update `readyState` and fire `readystatechange`
    pub fn set_ready_state(&mut self, doc: NodeId, state: ReadyState) -> Result<()> {
        let data = self.get_mut(doc)
            .and_then(|n| n.as_document_mut())
            .ok_or(DomError::NotFound(doc))?;
        if data.ready_state == state {
            return Ok(());
        }
        data.ready_state = state;
        self.dispatch_event(Event::new(EventType::ReadyStateChange, doc));
        Ok(())
    }

    /// `document.open()` + `document.write()`: drops the document's own
    /// listeners and replaces the document element with a fresh tree.
    pub fn write_document(&mut self, doc: NodeId) -> Result<NodeId> {
        if !self.is_document(doc) {
            return Err(DomError::NotFound(doc));
        }
        self.remove_listeners_on(doc);
        for child in self.child_nodes(doc) {
            self.remove(child)?;
        }
        let html = self.build_document_element(doc)?;
        self.append_child(doc, html)?;
        tracing::debug!("Document {:?} rewritten", doc);
        Ok(html)
    }

    // --- Frames ---

    /// Create a detached `<iframe>` owned by `doc` with its own content document
    pub fn create_iframe(&mut self, doc: NodeId, src: &str) -> Result<(NodeId, NodeId)> {
        let frame_doc = self.create_document(src)?;
        let iframe = self.create_element(doc, "iframe");
        self.set_attribute(iframe, "src", src)?;
        if let Some(elem) = self.element_mut(iframe) {
            elem.content_document = frame_doc;
        }
        if let Some(data) = self.get_mut(frame_doc).and_then(|n| n.as_document_mut()) {
            data.frame_element = iframe;
        }
        Ok((iframe, frame_doc))
    }

    /// `iframe.contentDocument`; cross-origin access is a security error
    pub fn content_document(&self, iframe: NodeId) -> Result<Option<NodeId>> {
        let Some(frame_doc) = self.element(iframe).and_then(|e| e.content_document.some()) else {
            return Ok(None);
        };
        let embedder = self.owner_document(iframe).ok_or(DomError::NotFound(iframe))?;
        if self.origin(embedder) != self.origin(frame_doc) {
            let url = self.url(frame_doc).map(|u| u.to_string()).unwrap_or_default();
            return Err(DomError::Security(format!("blocked access to cross-origin frame {url}")));
        }
        Ok(Some(frame_doc))
    }

    /// Frame element embedding `doc`, None for top-level documents
    pub fn frame_element(&self, doc: NodeId) -> Option<NodeId> {
        self.get(doc)?.as_document()?.frame_element.some()
    }

    // --- Messaging ---

    /// `window.postMessage(data, targetOrigin)` from a script running in
    /// `doc` to the same window. Returns false when the target origin does
    /// not match and the message is dropped.
    pub fn post_message(&mut self, doc: NodeId, data: serde_json::Value, target_origin: &str) -> bool {
        let Some(origin) = self.origin(doc).map(|o| o.ascii_serialization()) else {
            return false;
        };
        if target_origin != "*" && target_origin.trim_end_matches('/') != origin {
            tracing::debug!("postMessage to {} dropped for origin {}", target_origin, origin);
            return false;
        }
        if let Some(data_slot) = self.get_mut(doc).and_then(|n| n.as_document_mut()) {
            data_slot.messages.push(PostedMessage { data, origin });
            return true;
        }
        false
    }

    /// Drain messages delivered to `doc`'s window
    pub fn take_messages(&mut self, doc: NodeId) -> Vec<PostedMessage> {
        self.get_mut(doc)
            .and_then(|n| n.as_document_mut())
            .map(|d| std::mem::take(&mut d.messages))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_structure() {
        let mut dom = DomTree::new();
        let doc = dom.create_document("https://www.example.com/watch").unwrap();
        let html = dom.document_element(doc).unwrap();
        assert!(dom.is_tag(html, "html"));
        assert!(dom.head(doc).is_some());
        assert!(dom.body(doc).is_some());
        assert_eq!(dom.hostname(doc), "www.example.com");
        assert_eq!(dom.owner_document(doc), Some(doc));
    }

    #[test]
    fn test_write_document_replaces_body() {
        let mut dom = DomTree::new();
        let doc = dom.create_document("https://example.com/").unwrap();
        let old_body = dom.body(doc).unwrap();
        let new_html = dom.write_document(doc).unwrap();
        assert_eq!(dom.document_element(doc), Some(new_html));
        assert_ne!(dom.body(doc), Some(old_body));
        assert!(!dom.is_connected(old_body));
    }

    #[test]
    fn test_cross_origin_frame_access() {
        let mut dom = DomTree::new();
        let doc = dom.create_document("https://example.com/").unwrap();
        let (same, same_doc) = dom.create_iframe(doc, "https://example.com/embed").unwrap();
        let (other, _) = dom.create_iframe(doc, "https://cdn.other.net/embed").unwrap();
        let (blank, blank_doc) = dom.create_iframe(doc, "about:blank").unwrap();

        assert_eq!(dom.content_document(same).unwrap(), Some(same_doc));
        assert!(matches!(dom.content_document(other), Err(DomError::Security(_))));
        assert_eq!(dom.content_document(blank).unwrap(), Some(blank_doc));
    }

    #[test]
    fn test_post_message_checks_target_origin() {
        let mut dom = DomTree::new();
        let doc = dom.create_document("https://www.netflix.com/watch/1").unwrap();
        assert!(dom.post_message(doc, serde_json::json!({"a": 1}), "https://www.netflix.com"));
        assert!(!dom.post_message(doc, serde_json::json!({"a": 2}), "https://evil.example"));
        let messages = dom.take_messages(doc);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].origin, "https://www.netflix.com");
        assert!(dom.take_messages(doc).is_empty());
    }
}
