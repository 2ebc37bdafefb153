//! Content Script
//!
//! Public entry point. Owns the runtime, drains queued DOM activity into
//! it and drives the virtual clock.

use std::collections::{HashMap, HashSet};

use url::Url;
use vsc_dom::{Delivery, DomTree, EventId, NodeId};

use crate::bindings::{Action, KeyBindingTable};
use crate::config::{Settings, SettingsStore};
use crate::controller::{ElementController, TrackedElementSet};
use crate::discovery::DocumentPhase;
use crate::placement::PlacementPolicy;
use crate::runtime::{EventControl, Propagation, Runtime};
use crate::site::SiteProfiles;
use crate::Result;

/// What one pump left for the page
#[derive(Debug, Default)]
pub struct Pumped {
    /// Deliveries to listeners the engine does not own, in dispatch order,
    /// without those the engine stopped
    pub page: Vec<Delivery>,
    /// Events an engine handler called `preventDefault` on
    pub default_prevented: HashSet<EventId>,
}

impl Pumped {
    fn merge(&mut self, other: Pumped) {
        self.page.extend(other.page);
        self.default_prevented.extend(other.default_prevented);
    }

    /// Page callbacks that ran, in order
    pub fn page_callbacks(&self) -> Vec<vsc_dom::CallbackId> {
        self.page.iter().map(|d| d.callback).collect()
    }
}

/// Video speed controller content script
pub struct ContentScript {
    rt: Runtime,
}

impl ContentScript {
    pub fn new(settings: Settings, store: Box<dyn SettingsStore>) -> Self {
        Self { rt: Runtime::new(settings, store) }
    }

    /// Build from the settings held in `store`
    pub fn from_store(store: Box<dyn SettingsStore>) -> Self {
        let settings = Settings::load(store.as_ref());
        tracing::debug!("Loaded settings: {:?}", settings);
        Self::new(settings, store)
    }

    /// Base URL for the packaged stylesheets and site scripts
    pub fn with_extension_url(mut self, base: &str) -> Result<Self> {
        let base = Url::parse(base)?;
        let mut base = base.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        self.rt.extension_url = base;
        Ok(self)
    }

    pub fn with_placement(mut self, placement: PlacementPolicy) -> Self {
        self.rt.placement = placement;
        self
    }

    pub fn with_sites(mut self, sites: SiteProfiles) -> Self {
        self.rt.sites = sites;
        self
    }

    /// Attach to the top document and its frames
    pub fn initialize(&mut self, dom: &mut DomTree, top: NodeId) -> Pumped {
        tracing::info!("Initializing on {:?}", dom.url(top).map(|u| u.as_str()).unwrap_or(""));
        self.rt.attach(dom, top);
        self.pump(dom)
    }

    /// Drain event deliveries, mutation records and resize entries until
    /// the DOM has nothing queued
    pub fn pump(&mut self, dom: &mut DomTree) -> Pumped {
        let mut out = Pumped::default();
        // stop point per event: propagation and the capture flag it happened in
        let mut stopped: HashMap<EventId, (Propagation, bool)> = HashMap::new();

        loop {
            let deliveries = dom.take_deliveries();
            let records = dom.take_mutation_records();
            let resizes = dom.take_resize_entries();
            if deliveries.is_empty() && records.is_empty() && resizes.is_empty() {
                break;
            }

            for delivery in deliveries {
                if let Some(&(propagation, capture)) = stopped.get(&delivery.event_id) {
                    match propagation {
                        Propagation::StoppedImmediately => continue,
                        Propagation::Stopped(at) if at != delivery.current_target || capture != delivery.capture => {
                            continue
                        }
                        Propagation::Stopped(_) => {}
                    }
                }
                if self.rt.is_retired(delivery.callback) {
                    continue;
                }
                let Some(handler) = self.rt.handler(delivery.callback) else {
                    out.page.push(delivery);
                    continue;
                };

                let mut control = EventControl::default();
                if let Err(err) = self.rt.handle_event(dom, handler, &delivery, &mut control) {
                    tracing::warn!("Handler {:?} failed: {}", handler, err);
                }
                if control.default_prevented {
                    out.default_prevented.insert(delivery.event_id);
                }
                if let Some(propagation) = control.propagation {
                    let entry = stopped.entry(delivery.event_id).or_insert((propagation, delivery.capture));
                    if propagation == Propagation::StoppedImmediately {
                        entry.0 = propagation;
                    }
                }
            }
            for (callback, batch) in records {
                self.rt.handle_mutations(dom, callback, batch);
            }
            for (callback, entries) in resizes {
                self.rt.handle_resize(dom, callback, &entries);
            }
        }
        // the loop only ends with nothing queued
        self.rt.clear_retired();
        out
    }

    /// Idle point: process every queued mutation batch
    pub fn run_idle(&mut self, dom: &mut DomTree) -> Pumped {
        let mut out = self.pump(dom);
        while !self.rt.pending.is_empty() {
            self.rt.run_idle(dom);
            out.merge(self.pump(dom));
        }
        out
    }

    /// Move the virtual clock forward, firing due timers in order
    pub fn advance(&mut self, dom: &mut DomTree, ms: u64) -> Pumped {
        let until = self.rt.now.saturating_add(ms);
        let mut out = self.pump(dom);
        while let Some((due, task)) = self.rt.timers.pop_due(until) {
            self.rt.now = due;
            if let Err(err) = self.rt.fire_timer(dom, task) {
                tracing::warn!("Timer {:?} failed: {}", task, err);
            }
            out.merge(self.pump(dom));
        }
        self.rt.now = until;
        out
    }

    /// Run `action` against every tracked controller
    pub fn run_action(&mut self, dom: &mut DomTree, action: Action, value: f64) -> Pumped {
        self.rt.dispatch(dom, action, value, None);
        self.pump(dom)
    }

    pub fn controller(&self, media: NodeId) -> Option<&ElementController> {
        self.rt.tracked.get(media)
    }

    pub fn tracked(&self) -> &TrackedElementSet {
        &self.rt.tracked
    }

    pub fn settings(&self) -> &Settings {
        &self.rt.settings
    }

    pub fn bindings(&self) -> &KeyBindingTable {
        &self.rt.bindings
    }

    pub fn last_speed(&self) -> f64 {
        self.rt.settings.last_speed
    }

    /// Remembered speed for a media source URL
    pub fn source_speed(&self, source: &str) -> Option<f64> {
        self.rt.settings.speeds.get(source).copied()
    }

    pub fn store(&self) -> &dyn SettingsStore {
        self.rt.store.as_ref()
    }

    pub fn document_phase(&self, doc: NodeId) -> Option<DocumentPhase> {
        self.rt.document_phase(doc)
    }

    /// Document plus the shadow roots observed for it
    pub fn observed_scopes(&self, doc: NodeId) -> &[NodeId] {
        self.rt.observed_scopes(doc)
    }

    /// Virtual clock in milliseconds
    pub fn now(&self) -> u64 {
        self.rt.now
    }

    pub fn has_pending_mutations(&self) -> bool {
        !self.rt.pending.is_empty()
    }

    /// Whether native rate changes are currently suppressed
    pub fn in_cooldown(&self) -> bool {
        self.rt.cooldown.is_some()
    }

    /// Callbacks registered on the DOM by the engine
    pub fn handler_count(&self) -> usize {
        self.rt.handler_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryStore;
    use vsc_dom::{Event, EventType, KeyboardInit};

    fn setup() -> (DomTree, NodeId, NodeId, ContentScript) {
        let mut dom = DomTree::new();
        let doc = dom.create_document("https://example.com/").unwrap();
        let body = dom.body(doc).unwrap();
        let video = dom.create_element(doc, "video");
        dom.append_child(body, video).unwrap();
        let mut script = ContentScript::new(Settings::default(), Box::new(MemoryStore::new()));
        script.initialize(&mut dom, doc);
        (dom, doc, video, script)
    }

    #[test]
    fn test_page_listeners_are_reported() {
        let (mut dom, doc, video, mut script) = setup();
        let page = dom.allocate_callback();
        dom.add_event_listener(doc, EventType::KeyDown, false, page);

        dom.dispatch_event(Event::key_down(video, KeyboardInit::new(68)));
        let out = script.pump(&mut dom);
        assert_eq!(out.page_callbacks(), vec![page]);
        assert_eq!(dom.media(video).unwrap().playback_rate, 1.1);
    }

    #[test]
    fn test_timers_fire_in_order_on_advance() {
        let (mut dom, _, video, mut script) = setup();
        script.run_action(&mut dom, Action::Faster, 0.1);
        let wrapper = script.controller(video).unwrap().wrapper();
        assert!(dom.has_class(wrapper, "vcs-show"));
        assert!(script.in_cooldown());

        script.advance(&mut dom, 1000);
        assert!(!script.in_cooldown());
        assert!(dom.has_class(wrapper, "vcs-show"));
        script.advance(&mut dom, 1000);
        assert!(!dom.has_class(wrapper, "vcs-show"));
        assert_eq!(script.now(), 2000);
    }

    #[test]
    fn test_retired_callbacks_are_forgotten_after_pump() {
        let (mut dom, _, video, mut script) = setup();
        let handlers = script.handler_count();
        let observers = dom.observer_count();

        dom.remove(video).unwrap();
        script.run_idle(&mut dom);
        assert!(script.tracked().is_empty());
        assert!(script.handler_count() < handlers);
        assert!(dom.observer_count() < observers);
        assert_eq!(script.rt.retired_count(), 0);
    }

    #[test]
    fn test_from_store_reads_settings() {
        let store = MemoryStore::new()
            .with("rememberSpeed", serde_json::json!(true))
            .with("lastSpeed", serde_json::json!(1.5));
        let script = ContentScript::from_store(Box::new(store));
        assert!(script.settings().remember_speed);
        assert_eq!(script.last_speed(), 1.5);
    }

    #[test]
    fn test_extension_url_is_validated() {
        let script = ContentScript::new(Settings::default(), Box::new(MemoryStore::new()));
        assert!(script.with_extension_url("not a url").is_err());

        let script = ContentScript::new(Settings::default(), Box::new(MemoryStore::new()))
            .with_extension_url("moz-extension://1234")
            .unwrap();
        assert_eq!(script.rt.extension_url, "moz-extension://1234/");
    }
}
