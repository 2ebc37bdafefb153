//! DOM Node
//!
//! Nodes link to each other through `NodeId`s instead of pointers, so the
//! whole multi-document tree lives in one arena.

use std::collections::BTreeMap;

use url::Url;

use crate::document::{PostedMessage, ReadyState};
use crate::geometry::DOMRect;
use crate::media::MediaState;
use crate::shadow::ShadowRootMode;
use crate::{DOMTokenList, NodeId};

/// DOM Node - Core structure
#[derive(Debug)]
pub struct Node {
    /// Parent node (NONE for documents, shadow roots and detached nodes)
    pub parent: NodeId,
    /// First child
    pub first_child: NodeId,
    /// Last child (for O(1) append)
    pub last_child: NodeId,
    /// Previous sibling
    pub prev_sibling: NodeId,
    /// Next sibling
    pub next_sibling: NodeId,
    /// Document that created this node (itself for documents)
    pub owner_document: NodeId,
    /// Node-specific data
    pub data: NodeData,
}

impl Node {
    pub(crate) fn new(owner_document: NodeId, data: NodeData) -> Self {
        Self {
            parent: NodeId::NONE,
            first_child: NodeId::NONE,
            last_child: NodeId::NONE,
            prev_sibling: NodeId::NONE,
            next_sibling: NodeId::NONE,
            owner_document,
            data,
        }
    }

    #[inline]
    pub fn is_element(&self) -> bool {
        matches!(self.data, NodeData::Element(_))
    }

    #[inline]
    pub fn as_element(&self) -> Option<&ElementData> {
        match &self.data {
            NodeData::Element(e) => Some(e),
            _ => None,
        }
    }

    #[inline]
    pub fn as_element_mut(&mut self) -> Option<&mut ElementData> {
        match &mut self.data {
            NodeData::Element(e) => Some(e),
            _ => None,
        }
    }

    #[inline]
    pub fn as_document(&self) -> Option<&DocumentData> {
        match &self.data {
            NodeData::Document(d) => Some(d),
            _ => None,
        }
    }

    #[inline]
    pub fn as_document_mut(&mut self) -> Option<&mut DocumentData> {
        match &mut self.data {
            NodeData::Document(d) => Some(d),
            _ => None,
        }
    }

    #[inline]
    pub fn as_shadow_root(&self) -> Option<&ShadowRootData> {
        match &self.data {
            NodeData::ShadowRoot(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_text(&self) -> Option<&str> {
        match &self.data {
            NodeData::Text(t) => Some(t),
            _ => None,
        }
    }
}

/// Node-specific data
#[derive(Debug)]
pub enum NodeData {
    Document(DocumentData),
    ShadowRoot(ShadowRootData),
    Element(ElementData),
    Text(String),
}

/// Document-specific data
#[derive(Debug)]
pub struct DocumentData {
    pub url: Url,
    pub ready_state: ReadyState,
    /// Frame element hosting this document, NONE for a top-level document
    pub frame_element: NodeId,
    /// Messages posted to this document's window
    pub(crate) messages: Vec<PostedMessage>,
}

/// Shadow root data
#[derive(Debug)]
pub struct ShadowRootData {
    pub host: NodeId,
    pub mode: ShadowRootMode,
}

/// Element-specific data
#[derive(Debug)]
pub struct ElementData {
    /// Lowercase tag name
    pub tag: String,
    pub attrs: Vec<Attribute>,
    pub classes: DOMTokenList,
    /// Inline style declarations
    pub style: BTreeMap<String, String>,
    /// Attached shadow root (NONE if none)
    pub shadow_root: NodeId,
    /// Media state for `video` / `audio`
    pub media: Option<MediaState>,
    /// Content document for `iframe`
    pub content_document: NodeId,
    /// Layout box in viewport coordinates, provided by the embedder
    pub rect: DOMRect,
}

impl ElementData {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attrs: Vec::new(),
            classes: DOMTokenList::new(),
            style: BTreeMap::new(),
            shadow_root: NodeId::NONE,
            media: None,
            content_document: NodeId::NONE,
            rect: DOMRect::default(),
        }
    }

    /// Get an attribute value
    pub fn get_attr(&self, name: &str) -> Option<&str> {
        self.attrs.iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Set an attribute, returning the previous value
    pub fn set_attr(&mut self, name: &str, value: &str) -> Option<String> {
        for attr in self.attrs.iter_mut() {
            if attr.name == name {
                return Some(std::mem::replace(&mut attr.value, value.to_string()));
            }
        }
        self.attrs.push(Attribute { name: name.to_string(), value: value.to_string() });
        None
    }

    /// Remove an attribute, returning the previous value
    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let pos = self.attrs.iter().position(|a| a.name == name)?;
        Some(self.attrs.remove(pos).value)
    }
}

/// Attribute
#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}
