//! DOM Observers
//!
//! MutationObserver and ResizeObserver. Records accumulate per observer
//! until the embedder takes them, which groups them into batches the way
//! the platform's observer callback does.

use crate::geometry::DOMRect;
use crate::{CallbackId, DomTree, NodeId};

/// Observer identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u32);

/// Mutation observer options
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationObserverInit {
    pub child_list: bool,
    pub attributes: bool,
    pub subtree: bool,
    /// Implies `attributes` for the listed names
    pub attribute_filter: Option<Vec<String>>,
}

impl MutationObserverInit {
    fn wants_attribute(&self, name: &str) -> bool {
        match &self.attribute_filter {
            Some(filter) => filter.iter().any(|f| f == name),
            None => self.attributes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationType {
    Attributes,
    ChildList,
}

/// Mutation record
#[derive(Debug, Clone, PartialEq)]
pub struct MutationRecord {
    pub mutation_type: MutationType,
    pub target: NodeId,
    pub added_nodes: Vec<NodeId>,
    pub removed_nodes: Vec<NodeId>,
    pub attribute_name: Option<String>,
    pub old_value: Option<String>,
}

#[derive(Debug)]
struct MutationObserver {
    id: ObserverId,
    callback: CallbackId,
    registrations: Vec<(NodeId, MutationObserverInit)>,
    records: Vec<MutationRecord>,
}

/// Resize observer entry
#[derive(Debug, Clone, PartialEq)]
pub struct ResizeObserverEntry {
    pub target: NodeId,
    pub content_rect: DOMRect,
}

#[derive(Debug)]
struct ResizeObserver {
    id: ObserverId,
    callback: CallbackId,
    observed: Vec<NodeId>,
    entries: Vec<ResizeObserverEntry>,
}

#[derive(Debug, Default)]
pub(crate) struct ObserverRegistry {
    mutation: Vec<MutationObserver>,
    resize: Vec<ResizeObserver>,
    next_id: u32,
}

impl ObserverRegistry {
    fn next(&mut self) -> ObserverId {
        self.next_id += 1;
        ObserverId(self.next_id)
    }
}

impl DomTree {
    // --- MutationObserver ---

    pub fn create_mutation_observer(&mut self, callback: CallbackId) -> ObserverId {
        let id = self.observers.next();
        self.observers.mutation.push(MutationObserver {
            id,
            callback,
            registrations: Vec::new(),
            records: Vec::new(),
        });
        id
    }

    /// `observe`; observing the same target again replaces its options
    pub fn observe(&mut self, observer: ObserverId, target: NodeId, options: MutationObserverInit) {
        let Some(obs) = self.observers.mutation.iter_mut().find(|o| o.id == observer) else {
            return;
        };
        match obs.registrations.iter_mut().find(|(t, _)| *t == target) {
            Some(registration) => registration.1 = options,
            None => obs.registrations.push((target, options)),
        }
    }

    /// `disconnect`: drops registrations and pending records
    pub fn disconnect(&mut self, observer: ObserverId) {
        if let Some(obs) = self.observers.mutation.iter_mut().find(|o| o.id == observer) {
            obs.registrations.clear();
            obs.records.clear();
        }
    }

    /// Drop a mutation or resize observer together with its pending
    /// records. The id is dead afterwards.
    pub fn release_observer(&mut self, observer: ObserverId) {
        self.observers.mutation.retain(|o| o.id != observer);
        self.observers.resize.retain(|o| o.id != observer);
    }

    /// Live mutation and resize observers
    pub fn observer_count(&self) -> usize {
        self.observers.mutation.len() + self.observers.resize.len()
    }

    /// Nodes an observer currently watches
    pub fn observed_targets(&self, observer: ObserverId) -> Vec<NodeId> {
        self.observers.mutation.iter()
            .find(|o| o.id == observer)
            .map(|o| o.registrations.iter().map(|(t, _)| *t).collect())
            .unwrap_or_default()
    }

    /// Drain pending records, one batch per observer in creation order
    pub fn take_mutation_records(&mut self) -> Vec<(CallbackId, Vec<MutationRecord>)> {
        self.observers.mutation.iter_mut()
            .filter(|o| !o.records.is_empty())
            .map(|o| (o.callback, std::mem::take(&mut o.records)))
            .collect()
    }

    fn registration_covers(&self, registered: NodeId, options: &MutationObserverInit, node: NodeId) -> bool {
        registered == node || (options.subtree && self.is_inclusive_ancestor(registered, node))
    }

    pub(crate) fn record_child_list(&mut self, parent: NodeId, added: Vec<NodeId>, removed: Vec<NodeId>) {
        let interested: Vec<usize> = self.observers.mutation.iter().enumerate()
            .filter(|(_, o)| o.registrations.iter()
                .any(|(t, opts)| opts.child_list && self.registration_covers(*t, opts, parent)))
            .map(|(i, _)| i)
            .collect();
        for index in interested {
            self.observers.mutation[index].records.push(MutationRecord {
                mutation_type: MutationType::ChildList,
                target: parent,
                added_nodes: added.clone(),
                removed_nodes: removed.clone(),
                attribute_name: None,
                old_value: None,
            });
        }
    }

    pub(crate) fn record_attribute(&mut self, target: NodeId, name: &str, old_value: Option<String>) {
        let interested: Vec<usize> = self.observers.mutation.iter().enumerate()
            .filter(|(_, o)| o.registrations.iter()
                .any(|(t, opts)| opts.wants_attribute(name) && self.registration_covers(*t, opts, target)))
            .map(|(i, _)| i)
            .collect();
        for index in interested {
            self.observers.mutation[index].records.push(MutationRecord {
                mutation_type: MutationType::Attributes,
                target,
                added_nodes: Vec::new(),
                removed_nodes: Vec::new(),
                attribute_name: Some(name.to_string()),
                old_value: old_value.clone(),
            });
        }
    }

    // --- ResizeObserver ---

    pub fn create_resize_observer(&mut self, callback: CallbackId) -> ObserverId {
        let id = self.observers.next();
        self.observers.resize.push(ResizeObserver {
            id,
            callback,
            observed: Vec::new(),
            entries: Vec::new(),
        });
        id
    }

    /// Start observing; the platform always reports an initial size
    pub fn observe_resize(&mut self, observer: ObserverId, target: NodeId) {
        let rect = self.bounding_client_rect(target);
        let Some(obs) = self.observers.resize.iter_mut().find(|o| o.id == observer) else {
            return;
        };
        if !obs.observed.contains(&target) {
            obs.observed.push(target);
            obs.entries.push(ResizeObserverEntry { target, content_rect: rect });
        }
    }

    pub fn disconnect_resize(&mut self, observer: ObserverId) {
        if let Some(obs) = self.observers.resize.iter_mut().find(|o| o.id == observer) {
            obs.observed.clear();
            obs.entries.clear();
        }
    }

    /// Drain pending resize entries, one batch per observer
    pub fn take_resize_entries(&mut self) -> Vec<(CallbackId, Vec<ResizeObserverEntry>)> {
        self.observers.resize.iter_mut()
            .filter(|o| !o.entries.is_empty())
            .map(|o| (o.callback, std::mem::take(&mut o.entries)))
            .collect()
    }

    pub(crate) fn notify_resize(&mut self, target: NodeId, rect: DOMRect) {
        for obs in self.observers.resize.iter_mut().filter(|o| o.observed.contains(&target)) {
            obs.entries.push(ResizeObserverEntry { target, content_rect: rect });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn child_list_subtree() -> MutationObserverInit {
        MutationObserverInit {
            child_list: true,
            subtree: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_subtree_child_list_records() {
        let mut dom = DomTree::new();
        let doc = dom.create_document("https://example.com/").unwrap();
        let body = dom.body(doc).unwrap();
        let callback = dom.allocate_callback();
        let observer = dom.create_mutation_observer(callback);
        dom.observe(observer, doc, child_list_subtree());

        let div = dom.create_element(doc, "div");
        dom.append_child(body, div).unwrap();
        dom.remove(div).unwrap();

        let batches = dom.take_mutation_records();
        assert_eq!(batches.len(), 1);
        let (cb, records) = &batches[0];
        assert_eq!(*cb, callback);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].added_nodes, vec![div]);
        assert_eq!(records[1].removed_nodes, vec![div]);
        assert!(dom.take_mutation_records().is_empty());
    }

    #[test]
    fn test_document_observer_does_not_see_shadow_trees() {
        let mut dom = DomTree::new();
        let doc = dom.create_document("https://example.com/").unwrap();
        let body = dom.body(doc).unwrap();
        let host = dom.create_element(doc, "div");
        dom.append_child(body, host).unwrap();
        let root = dom.attach_shadow(host, crate::ShadowRootMode::Open).unwrap();

        let callback = dom.allocate_callback();
        let observer = dom.create_mutation_observer(callback);
        dom.observe(observer, doc, child_list_subtree());
        dom.take_mutation_records();

        let video = dom.create_element(doc, "video");
        dom.append_child(root, video).unwrap();
        assert!(dom.take_mutation_records().is_empty());

        dom.observe(observer, root, child_list_subtree());
        dom.remove(video).unwrap();
        assert_eq!(dom.take_mutation_records().len(), 1);
    }

    #[test]
    fn test_attribute_filter() {
        let mut dom = DomTree::new();
        let doc = dom.create_document("https://example.com/").unwrap();
        let video = dom.create_element(doc, "video");
        let callback = dom.allocate_callback();
        let observer = dom.create_mutation_observer(callback);
        dom.observe(observer, video, MutationObserverInit {
            attribute_filter: Some(vec!["src".into()]),
            ..Default::default()
        });

        dom.set_attribute(video, "title", "ignored").unwrap();
        dom.set_src(video, "movie.mp4").unwrap();
        let batches = dom.take_mutation_records();
        assert_eq!(batches[0].1.len(), 1);
        assert_eq!(batches[0].1[0].attribute_name.as_deref(), Some("src"));

        dom.disconnect(observer);
        dom.clear_src(video).unwrap();
        assert!(dom.take_mutation_records().is_empty());
    }

    #[test]
    fn test_resize_observer_reports_initial_and_size_changes() {
        let mut dom = DomTree::new();
        let doc = dom.create_document("https://example.com/").unwrap();
        let video = dom.create_element(doc, "video");
        let callback = dom.allocate_callback();
        let observer = dom.create_resize_observer(callback);
        dom.observe_resize(observer, video);
        assert_eq!(dom.take_resize_entries()[0].1.len(), 1);

        dom.set_rect(video, DOMRect::from_xywh(0.0, 0.0, 640.0, 360.0));
        dom.set_rect(video, DOMRect::from_xywh(50.0, 50.0, 640.0, 360.0));
        let batches = dom.take_resize_entries();
        assert_eq!(batches[0].1.len(), 1);

        dom.disconnect_resize(observer);
        dom.set_rect(video, DOMRect::from_xywh(0.0, 0.0, 320.0, 180.0));
        assert!(dom.take_resize_entries().is_empty());
    }
}
