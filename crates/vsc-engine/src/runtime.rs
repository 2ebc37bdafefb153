//! Runtime State
//!
//! The single owned state of one content script: settings, bindings,
//! tracked controllers, per-document observation state, timers on a
//! virtual millisecond clock, and the table routing DOM callback ids back
//! to handlers.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use vsc_dom::{CallbackId, Delivery, DomTree, MutationRecord, NodeId, ResizeObserverEntry};

use crate::bindings::{Action, KeyBindingTable};
use crate::blacklist::Blacklist;
use crate::config::{Settings, SettingsStore};
use crate::controller::TrackedElementSet;
use crate::discovery::DocumentState;
use crate::placement::PlacementPolicy;
use crate::site::SiteProfiles;
use crate::{Result, COOLDOWN_MS, DEFAULT_EXTENSION_URL};

/// Handle of a scheduled timer, ordered by due time
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct TimerId {
    due: u64,
    seq: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerTask {
    /// Drop the transient `vcs-show` class
    HideShow(NodeId),
    /// End a blink and hide the overlay again
    HideBlink(NodeId),
    CooldownEnd,
    /// Idle callback timeout for queued mutation batches
    IdleDeadline,
}

#[derive(Debug, Default)]
pub(crate) struct Timers {
    queue: BTreeMap<TimerId, TimerTask>,
    next_seq: u64,
}

impl Timers {
    pub(crate) fn schedule(&mut self, due: u64, task: TimerTask) -> TimerId {
        self.next_seq += 1;
        let id = TimerId { due, seq: self.next_seq };
        self.queue.insert(id, task);
        id
    }

    pub(crate) fn cancel(&mut self, id: TimerId) -> bool {
        self.queue.remove(&id).is_some()
    }

    /// Earliest timer due at or before `until`
    pub(crate) fn pop_due(&mut self, until: u64) -> Option<(u64, TimerTask)> {
        let (&id, _) = self.queue.first_key_value()?;
        if id.due > until {
            return None;
        }
        self.queue.remove(&id).map(|task| (id.due, task))
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.queue.len()
    }
}

/// What a DOM callback id stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Handler {
    ReadyState { document: NodeId },
    KeyDown,
    RateChange,
    DocumentMutations { document: NodeId },
    Playback { media: NodeId },
    SourceAttributes { media: NodeId },
    Resize { media: NodeId },
    OverlayButton { media: NodeId, action: Action },
    OverlayDrag { media: NodeId },
    /// Keeps overlay clicks away from the page
    SwallowPointer,
    DragMove { media: NodeId },
    DragEnd { media: NodeId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Propagation {
    /// `stopPropagation` at this current target
    Stopped(NodeId),
    StoppedImmediately,
}

/// Propagation decisions a handler makes about the event it received
#[derive(Debug, Default)]
pub(crate) struct EventControl {
    pub(crate) propagation: Option<Propagation>,
    pub(crate) default_prevented: bool,
}

impl EventControl {
    pub(crate) fn stop_propagation(&mut self, current_target: NodeId) {
        if self.propagation.is_none() {
            self.propagation = Some(Propagation::Stopped(current_target));
        }
    }

    pub(crate) fn stop_immediate_propagation(&mut self) {
        self.propagation = Some(Propagation::StoppedImmediately);
    }

    pub(crate) fn prevent_default(&mut self) {
        self.default_prevented = true;
    }
}

pub(crate) struct Runtime {
    pub(crate) settings: Settings,
    pub(crate) bindings: KeyBindingTable,
    pub(crate) blacklist: Blacklist,
    pub(crate) placement: PlacementPolicy,
    pub(crate) sites: SiteProfiles,
    pub(crate) tracked: TrackedElementSet,
    pub(crate) documents: HashMap<NodeId, DocumentState>,
    /// Mutation batches waiting for the next idle point
    pub(crate) pending: VecDeque<(NodeId, Vec<MutationRecord>)>,
    pub(crate) idle_deadline: Option<TimerId>,
    pub(crate) cooldown: Option<TimerId>,
    pub(crate) timers: Timers,
    pub(crate) now: u64,
    pub(crate) store: Box<dyn SettingsStore>,
    pub(crate) extension_url: String,
    handlers: HashMap<CallbackId, Handler>,
    /// Unregistered ids whose queued deliveries must be dropped
    retired: HashSet<CallbackId>,
}

impl Runtime {
    pub(crate) fn new(settings: Settings, store: Box<dyn SettingsStore>) -> Self {
        let bindings = KeyBindingTable::new(settings.key_bindings.clone());
        let blacklist = Blacklist::parse(&settings.blacklist);
        Self {
            settings,
            bindings,
            blacklist,
            placement: PlacementPolicy::default(),
            sites: SiteProfiles::default(),
            tracked: TrackedElementSet::default(),
            documents: HashMap::new(),
            pending: VecDeque::new(),
            idle_deadline: None,
            cooldown: None,
            timers: Timers::default(),
            now: 0,
            store,
            extension_url: DEFAULT_EXTENSION_URL.to_string(),
            handlers: HashMap::new(),
            retired: HashSet::new(),
        }
    }

    // --- Callback routing ---

    pub(crate) fn register(&mut self, dom: &mut DomTree, handler: Handler) -> CallbackId {
        let id = dom.allocate_callback();
        self.handlers.insert(id, handler);
        id
    }

    pub(crate) fn unregister(&mut self, id: CallbackId) {
        if self.handlers.remove(&id).is_some() {
            self.retired.insert(id);
        }
    }

    pub(crate) fn is_retired(&self, id: CallbackId) -> bool {
        self.retired.contains(&id)
    }

    /// Forget retired ids once no delivery for them can still be queued
    pub(crate) fn clear_retired(&mut self) {
        self.retired.clear();
    }

    #[cfg(test)]
    pub(crate) fn retired_count(&self) -> usize {
        self.retired.len()
    }

    pub(crate) fn handler(&self, id: CallbackId) -> Option<Handler> {
        self.handlers.get(&id).copied()
    }

    pub(crate) fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    // --- Timers ---

    pub(crate) fn schedule(&mut self, delay_ms: u64, task: TimerTask) -> TimerId {
        self.timers.schedule(self.now.saturating_add(delay_ms), task)
    }

    pub(crate) fn cancel_timer(&mut self, timer: Option<TimerId>) {
        if let Some(id) = timer {
            self.timers.cancel(id);
        }
    }

    /// Restart the window in which native rate changes are suppressed
    pub(crate) fn refresh_cooldown(&mut self) {
        let previous = self.cooldown.take();
        self.cancel_timer(previous);
        self.cooldown = Some(self.schedule(COOLDOWN_MS, TimerTask::CooldownEnd));
    }

    pub(crate) fn fire_timer(&mut self, dom: &mut DomTree, task: TimerTask) -> Result<()> {
        match task {
            TimerTask::HideShow(media) => {
                if let Some(controller) = self.tracked.get_mut(media) {
                    controller.show_timer = None;
                    dom.remove_class(controller.wrapper, "vcs-show");
                    tracing::debug!("Hiding controller");
                }
            }
            TimerTask::HideBlink(media) => {
                if let Some(controller) = self.tracked.get_mut(media) {
                    controller.blink_timer = None;
                    dom.add_class(controller.wrapper, "vsc-hidden");
                }
            }
            TimerTask::CooldownEnd => self.cooldown = None,
            TimerTask::IdleDeadline => {
                self.idle_deadline = None;
                self.run_idle(dom);
            }
        }
        Ok(())
    }

    // --- Dispatch of drained DOM activity ---

    pub(crate) fn handle_event(
        &mut self,
        dom: &mut DomTree,
        handler: Handler,
        delivery: &Delivery,
        control: &mut EventControl,
    ) -> Result<()> {
        let event = delivery.event.as_ref();
        match handler {
            Handler::ReadyState { document } => self.on_ready_state(dom, document),
            Handler::KeyDown => self.on_key_down(dom, event, delivery.current_target, control),
            Handler::RateChange => self.on_rate_change(dom, event, control),
            Handler::Playback { media } => self.on_playback(dom, media),
            Handler::OverlayButton { media, action } => {
                control.stop_propagation(delivery.current_target);
                let value = self.bindings.value(action).unwrap_or(0.0);
                tracing::debug!("Overlay button {} on {:?}", action, media);
                self.dispatch(dom, action, value, Some(event));
                Ok(())
            }
            Handler::OverlayDrag { .. } => {
                control.stop_propagation(delivery.current_target);
                self.dispatch(dom, Action::Drag, 0.0, Some(event));
                Ok(())
            }
            Handler::SwallowPointer => {
                control.stop_propagation(delivery.current_target);
                Ok(())
            }
            Handler::DragMove { media } => {
                self.on_drag_move(dom, media, event);
                Ok(())
            }
            Handler::DragEnd { media } => {
                self.end_drag(dom, media);
                Ok(())
            }
            Handler::DocumentMutations { .. } | Handler::SourceAttributes { .. } | Handler::Resize { .. } => Ok(()),
        }
    }

    pub(crate) fn handle_mutations(&mut self, dom: &mut DomTree, callback: CallbackId, records: Vec<MutationRecord>) {
        match self.handler(callback) {
            Some(Handler::DocumentMutations { document }) => self.queue_batch(document, records),
            Some(Handler::SourceAttributes { media }) => self.on_source_mutation(dom, media, &records),
            _ => tracing::debug!("Dropping {} mutation records for {:?}", records.len(), callback),
        }
    }

    pub(crate) fn handle_resize(&mut self, dom: &mut DomTree, callback: CallbackId, entries: &[ResizeObserverEntry]) {
        if let Some(Handler::Resize { media }) = self.handler(callback) {
            if !entries.is_empty() {
                self.reposition(dom, media);
            }
        }
    }

    /// Qualifying media element: video always, audio when enabled
    pub(crate) fn qualifies(&self, dom: &DomTree, node: NodeId) -> bool {
        dom.is_tag(node, "video") || (self.settings.audio_boolean && dom.is_tag(node, "audio"))
    }
}
