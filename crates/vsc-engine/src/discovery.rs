//! Media Discovery
//!
//! Finds media elements in documents, open shadow roots and same-origin
//! frames. The initial scan is synchronous; later tree changes arrive as
//! mutation batches that wait for the next idle point.

use std::collections::VecDeque;

use vsc_dom::{
    CallbackId, DomTree, EventType, ListenerId, MutationObserverInit, MutationRecord, MutationType, NodeId,
    ObserverId, ReadyState,
};

use crate::controller::CONTROLLER_CLASS;
use crate::runtime::{Handler, Runtime, TimerTask};
use crate::site::{rescan_rule, RescanRule};
use crate::{Result, IDLE_TIMEOUT_MS};

/// Marker class on the body of every attached document
const INITIALIZED_CLASS: &str = "vsc-initialized";

/// Observation state of one document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentPhase {
    /// Waiting for `readyState` to reach `complete`
    AwaitingReady,
    Scanning,
    Observing,
}

#[derive(Debug)]
pub(crate) struct DocumentState {
    pub(crate) phase: DocumentPhase,
    pub(crate) observer: Option<ObserverId>,
    /// Document plus every shadow root observed so far
    pub(crate) scopes: Vec<NodeId>,
    listeners: Vec<ListenerId>,
    callbacks: Vec<CallbackId>,
    ready_listener: Option<(ListenerId, CallbackId)>,
}

impl DocumentState {
    fn new(phase: DocumentPhase) -> Self {
        Self {
            phase,
            observer: None,
            scopes: Vec::new(),
            listeners: Vec::new(),
            callbacks: Vec::new(),
            ready_listener: None,
        }
    }
}

fn observer_options() -> MutationObserverInit {
    MutationObserverInit {
        child_list: true,
        subtree: true,
        attribute_filter: Some(vec!["aria-hidden".into(), "data-focus-method".into()]),
        ..Default::default()
    }
}

impl Runtime {
    /// Attach to `doc` and, through it, to every same-origin frame found
    pub(crate) fn attach(&mut self, dom: &mut DomTree, doc: NodeId) {
        let mut queue = VecDeque::from([doc]);
        while let Some(doc) = queue.pop_front() {
            match self.attach_document(dom, doc) {
                Ok(frames) => queue.extend(frames),
                Err(err) => tracing::warn!("Failed to attach to document {:?}: {}", doc, err),
            }
        }
    }

    /// Returns the frame documents still to attach
    fn attach_document(&mut self, dom: &mut DomTree, doc: NodeId) -> Result<Vec<NodeId>> {
        if !self.settings.enabled {
            tracing::debug!("Extension disabled, not attaching");
            return Ok(Vec::new());
        }
        let url = dom.url(doc).map(|u| u.as_str().to_string()).unwrap_or_default();
        if self.blacklist.matches(&url) {
            tracing::info!("Blacklisted page {}", url);
            return Ok(Vec::new());
        }
        if dom.ready_state(doc) != Some(ReadyState::Complete) {
            self.await_ready(dom, doc);
            return Ok(Vec::new());
        }
        let Some(body) = dom.body(doc) else {
            return Ok(Vec::new());
        };
        if dom.has_class(body, INITIALIZED_CLASS) {
            return Ok(Vec::new());
        }
        dom.add_class(body, INITIALIZED_CLASS);
        tracing::debug!("Initializing document {:?} ({})", doc, url);

        self.release_document(dom, doc);
        let mut state = DocumentState::new(DocumentPhase::Scanning);

        let key_down = self.register(dom, Handler::KeyDown);
        let rate_change = self.register(dom, Handler::RateChange);
        state.callbacks.extend([key_down, rate_change]);
        state.listeners.push(dom.add_event_listener(doc, EventType::KeyDown, true, key_down));
        state.listeners.push(dom.add_event_listener(doc, EventType::RateChange, true, rate_change));

        self.sites.inject_script(dom, doc, &self.extension_url)?;
        if dom.frame_element(doc).is_some() {
            self.inject_stylesheet(dom, doc)?;
        }

        let mutations = self.register(dom, Handler::DocumentMutations { document: doc });
        state.callbacks.push(mutations);
        let observer = dom.create_mutation_observer(mutations);
        dom.observe(observer, doc, observer_options());
        state.observer = Some(observer);
        state.scopes.push(doc);
        self.documents.insert(doc, state);

        let frames = self.scan(dom, doc);
        if let Some(state) = self.documents.get_mut(&doc) {
            state.phase = DocumentPhase::Observing;
        }
        Ok(frames)
    }

    fn await_ready(&mut self, dom: &mut DomTree, doc: NodeId) {
        if self.documents.get(&doc).is_some_and(|s| s.ready_listener.is_some()) {
            return;
        }
        let callback = self.register(dom, Handler::ReadyState { document: doc });
        let listener = dom.add_event_listener(doc, EventType::ReadyStateChange, false, callback);
        let state = self.documents.entry(doc).or_insert_with(|| DocumentState::new(DocumentPhase::AwaitingReady));
        state.phase = DocumentPhase::AwaitingReady;
        state.ready_listener = Some((listener, callback));
        tracing::debug!("Document {:?} still loading, waiting", doc);
    }

    pub(crate) fn on_ready_state(&mut self, dom: &mut DomTree, doc: NodeId) -> Result<()> {
        if dom.ready_state(doc) != Some(ReadyState::Complete) {
            return Ok(());
        }
        if let Some((listener, callback)) = self.documents.get_mut(&doc).and_then(|s| s.ready_listener.take()) {
            dom.remove_event_listener(listener);
            self.unregister(callback);
        }
        self.attach(dom, doc);
        Ok(())
    }

    /// Drop listeners and the observer of a previous attachment
    fn release_document(&mut self, dom: &mut DomTree, doc: NodeId) {
        let Some(state) = self.documents.remove(&doc) else {
            return;
        };
        for listener in state.listeners {
            dom.remove_event_listener(listener);
        }
        if let Some((listener, callback)) = state.ready_listener {
            dom.remove_event_listener(listener);
            self.unregister(callback);
        }
        if let Some(observer) = state.observer {
            dom.release_observer(observer);
        }
        for callback in state.callbacks {
            self.unregister(callback);
        }
        tracing::debug!("Superseded previous observation of {:?}", doc);
    }

    fn inject_stylesheet(&self, dom: &mut DomTree, doc: NodeId) -> Result<()> {
        let Some(head) = dom.head(doc) else {
            return Ok(());
        };
        let link = dom.create_element(doc, "link");
        dom.set_attribute(link, "href", &format!("{}assets/css/inject.css", self.extension_url))?;
        dom.set_attribute(link, "type", "text/css")?;
        dom.set_attribute(link, "rel", "stylesheet")?;
        dom.append_child(head, link)?;
        Ok(())
    }

    /// Add a shadow root to the document's observation scope
    fn observe_scope(&mut self, dom: &mut DomTree, doc: NodeId, shadow: NodeId) {
        let Some(state) = self.documents.get_mut(&doc) else {
            return;
        };
        let Some(observer) = state.observer else {
            return;
        };
        if state.scopes.contains(&shadow) {
            return;
        }
        dom.observe(observer, shadow, observer_options());
        state.scopes.push(shadow);
    }

    /// Initial scan of the flattened tree. Returns same-origin frame
    /// documents found on the way.
    fn scan(&mut self, dom: &mut DomTree, doc: NodeId) -> Vec<NodeId> {
        let mut media = Vec::new();
        let mut frames = Vec::new();
        let mut stack = vec![doc];

        while let Some(node) = stack.pop() {
            if dom.has_class(node, CONTROLLER_CLASS) {
                continue;
            }
            if self.qualifies(dom, node) {
                media.push(node);
                continue;
            }
            if dom.is_tag(node, "iframe") {
                match dom.content_document(node) {
                    Ok(Some(frame)) => frames.push(frame),
                    Ok(None) => {}
                    Err(err) => tracing::warn!("Skipping frame {:?}: {}", node, err),
                }
                continue;
            }
            // light children first, then the shadow tree
            if let Some(shadow) = dom.shadow_root(node) {
                self.observe_scope(dom, doc, shadow);
                stack.extend(dom.children(shadow).into_iter().rev());
            }
            stack.extend(dom.children(node).into_iter().rev());
        }

        tracing::debug!("Initial scan of {:?} found {} media elements", doc, media.len());
        for node in media {
            if let Err(err) = self.create_controller(dom, node, None) {
                tracing::warn!("Failed to attach controller to {:?}: {}", node, err);
            }
        }
        frames
    }

    // --- Deferred mutation processing ---

    pub(crate) fn queue_batch(&mut self, document: NodeId, records: Vec<MutationRecord>) {
        if records.is_empty() {
            return;
        }
        self.pending.push_back((document, records));
        if self.idle_deadline.is_none() {
            self.idle_deadline = Some(self.schedule(IDLE_TIMEOUT_MS, TimerTask::IdleDeadline));
        }
    }

    /// Process every queued batch in receipt order
    pub(crate) fn run_idle(&mut self, dom: &mut DomTree) {
        let deadline = self.idle_deadline.take();
        self.cancel_timer(deadline);
        while let Some((doc, records)) = self.pending.pop_front() {
            self.process_batch(dom, doc, records);
        }
    }

    fn process_batch(&mut self, dom: &mut DomTree, doc: NodeId, records: Vec<MutationRecord>) {
        if !self.documents.contains_key(&doc) {
            return;
        }
        for record in &records {
            match record.mutation_type {
                MutationType::ChildList => {
                    for &node in &record.added_nodes {
                        if dom.document_element(doc) == Some(node) {
                            tracing::info!("Document {:?} was rewritten, attaching again", doc);
                            self.attach(dom, doc);
                        } else {
                            self.check_node(dom, doc, node, record.target, true);
                        }
                    }
                }
                MutationType::Attributes => self.rescan_for_attribute(dom, doc, record.target),
            }
        }
        for record in records.iter().filter(|r| r.mutation_type == MutationType::ChildList) {
            for &node in &record.removed_nodes {
                self.check_node(dom, doc, node, record.target, false);
            }
        }
    }

    /// Walk an added or removed subtree
    fn check_node(&mut self, dom: &mut DomTree, doc: NodeId, root: NodeId, parent: NodeId, added: bool) {
        // moved, possibly into another attached document
        if !added && dom.connected_document(root).is_some_and(|d| self.documents.contains_key(&d)) {
            return;
        }
        let mut stack = vec![(root, parent)];
        while let Some((node, parent)) = stack.pop() {
            if dom.has_class(node, CONTROLLER_CLASS) {
                continue;
            }
            if self.qualifies(dom, node) {
                if added {
                    if let Err(err) = self.create_controller(dom, node, Some(parent)) {
                        tracing::warn!("Failed to attach controller to {:?}: {}", node, err);
                    }
                } else {
                    self.remove_controller(dom, node);
                }
                continue;
            }
            if added && dom.is_tag(node, "iframe") {
                match dom.content_document(node) {
                    Ok(Some(frame)) => self.attach(dom, frame),
                    Ok(None) => {}
                    Err(err) => tracing::warn!("Skipping frame {:?}: {}", node, err),
                }
                continue;
            }
            if let Some(shadow) = dom.shadow_root(node) {
                if added {
                    self.observe_scope(dom, doc, shadow);
                }
                stack.extend(dom.children(shadow).into_iter().rev().map(|c| (c, shadow)));
            }
            stack.extend(dom.children(node).into_iter().rev().map(|c| (c, node)));
        }
    }

    fn rescan_for_attribute(&mut self, dom: &mut DomTree, doc: NodeId, target: NodeId) {
        let Some(rule) = rescan_rule(dom, target) else {
            return;
        };
        let Some(body) = dom.body(doc) else {
            return;
        };
        for video in flattened_videos(dom, body) {
            match rule {
                RescanRule::AttachMissing if self.tracked.contains(video) => continue,
                RescanRule::AttachMissing => {}
                RescanRule::ForceReattach => {
                    self.remove_controller(dom, video);
                }
            }
            if let Err(err) = self.create_controller(dom, video, None) {
                tracing::warn!("Failed to attach controller to {:?}: {}", video, err);
            }
        }
    }

    pub(crate) fn document_phase(&self, doc: NodeId) -> Option<DocumentPhase> {
        self.documents.get(&doc).map(|s| s.phase)
    }

    pub(crate) fn observed_scopes(&self, doc: NodeId) -> &[NodeId] {
        self.documents.get(&doc).map(|s| s.scopes.as_slice()).unwrap_or(&[])
    }
}

/// `video` elements under `root` including open shadow trees, in
/// document order
fn flattened_videos(dom: &DomTree, root: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if dom.has_class(node, CONTROLLER_CLASS) {
            continue;
        }
        if dom.is_tag(node, "video") {
            out.push(node);
            continue;
        }
        if let Some(shadow) = dom.shadow_root(node) {
            stack.extend(dom.children(shadow).into_iter().rev());
        }
        stack.extend(dom.children(node).into_iter().rev());
    }
    out
}
