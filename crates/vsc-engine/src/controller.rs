//! Element Controllers
//!
//! One controller per tracked media element. It owns the overlay subtree
//! and every listener, observer, timer and callback it registered, and
//! releases all of them in `remove_controller`.

use std::collections::HashMap;

use vsc_dom::{
    CallbackId, DomTree, EventType, ListenerId, MutationObserverInit, MutationRecord, NodeId, ObserverId,
    ShadowRootMode, MAX_PLAYBACK_RATE, MIN_PLAYBACK_RATE,
};

use crate::bindings::Action;
use crate::runtime::{Handler, Runtime, TimerId};
use crate::{Error, Result};

/// Class on every overlay wrapper
pub const CONTROLLER_CLASS: &str = "vsc-controller";

/// Overlay buttons: action, extra class, label
const BUTTONS: [(Action, Option<&str>, &str); 5] = [
    (Action::Rewind, Some("rw"), "«"),
    (Action::Slower, None, "\u{2212}"),
    (Action::Faster, None, "+"),
    (Action::Advance, Some("rw"), "»"),
    (Action::Display, Some("hideButton"), "\u{00d7}"),
];

/// Live drag interaction
#[derive(Debug, Clone)]
pub(crate) struct DragSession {
    pub(crate) container: NodeId,
    pub(crate) pointer_start: (f64, f64),
    pub(crate) panel_start: (f64, f64),
    pub(crate) listeners: Vec<ListenerId>,
    pub(crate) callbacks: Vec<CallbackId>,
}

/// Freshly built overlay subtree, not yet inserted
struct Overlay {
    wrapper: NodeId,
    panel: NodeId,
    label: NodeId,
    listeners: Vec<ListenerId>,
    callbacks: Vec<CallbackId>,
}

/// Per media element controller
#[derive(Debug)]
pub struct ElementController {
    pub(crate) media: NodeId,
    pub(crate) wrapper: NodeId,
    pub(crate) panel: NodeId,
    pub(crate) label: NodeId,
    pub(crate) listeners: Vec<ListenerId>,
    pub(crate) source_observer: ObserverId,
    pub(crate) resize_observer: ObserverId,
    pub(crate) callbacks: Vec<CallbackId>,
    pub(crate) mark: Option<f64>,
    pub(crate) show_timer: Option<TimerId>,
    pub(crate) blink_timer: Option<TimerId>,
    pub(crate) drag: Option<DragSession>,
}

impl ElementController {
    /// Controlled media element
    pub fn media(&self) -> NodeId {
        self.media
    }

    /// Overlay wrapper (`div.vsc-controller`) hosting the shadow root
    pub fn wrapper(&self) -> NodeId {
        self.wrapper
    }

    /// `#controller` panel inside the shadow root
    pub fn panel(&self) -> NodeId {
        self.panel
    }

    /// Speed indicator
    pub fn label(&self) -> NodeId {
        self.label
    }

    pub fn mark(&self) -> Option<f64> {
        self.mark
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// Number of listeners this controller has registered on the DOM
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

/// Insertion-ordered set of controlled media elements
#[derive(Debug, Default)]
pub struct TrackedElementSet {
    order: Vec<NodeId>,
    controllers: HashMap<NodeId, ElementController>,
}

impl TrackedElementSet {
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, media: NodeId) -> bool {
        self.controllers.contains_key(&media)
    }

    pub fn get(&self, media: NodeId) -> Option<&ElementController> {
        self.controllers.get(&media)
    }

    pub(crate) fn get_mut(&mut self, media: NodeId) -> Option<&mut ElementController> {
        self.controllers.get_mut(&media)
    }

    /// Media elements in the order they were attached
    pub fn media(&self) -> &[NodeId] {
        &self.order
    }

    /// Controller whose overlay wrapper is `wrapper`
    pub fn by_wrapper(&self, wrapper: NodeId) -> Option<&ElementController> {
        self.controllers.values().find(|c| c.wrapper == wrapper)
    }

    fn insert(&mut self, controller: ElementController) {
        let media = controller.media;
        if self.controllers.insert(media, controller).is_none() {
            self.order.push(media);
        }
    }

    fn remove(&mut self, media: NodeId) -> Option<ElementController> {
        let controller = self.controllers.remove(&media)?;
        self.order.retain(|&m| m != media);
        Some(controller)
    }
}

/// Two-decimal rounding used for speeds and volume
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl Runtime {
    /// Speed a (re)starting element should play at. With speed memory off
    /// the reset binding is re-aliased to the preferred speed.
    pub(crate) fn stored_speed(&mut self, dom: &DomTree, media: NodeId) -> f64 {
        let source = dom.media(media).map(|m| m.current_src.as_str()).unwrap_or("");
        let per_source = self.settings.speeds.get(source).copied();
        if !self.settings.remember_speed {
            if let Some(fast) = self.bindings.value(Action::Fast) {
                tracing::debug!("Setting reset keybinding to fast");
                self.bindings.set_value(Action::Reset, fast);
            }
        }
        match per_source {
            Some(speed) => speed,
            None if self.settings.remember_speed => self.settings.last_speed,
            None => 1.0,
        }
    }

    /// Attach a controller to `media`. Returns the existing controller when
    /// the element is already tracked.
    pub(crate) fn create_controller(
        &mut self,
        dom: &mut DomTree,
        media: NodeId,
        fallback_parent: Option<NodeId>,
    ) -> Result<&ElementController> {
        if self.tracked.contains(media) {
            return self.tracked.get(media).ok_or(Error::Detached(media));
        }
        let parent = dom.parent_element(media)
            .or(fallback_parent)
            .or_else(|| dom.parent(media))
            .ok_or(Error::Detached(media))?;
        let doc = dom.owner_document(media).ok_or(Error::Detached(media))?;

        let speed = self.stored_speed(dom, media).clamp(MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE);
        let overlay = self.build_overlay(dom, doc, media, speed)?;

        let hostname = dom.connected_document(media).map(|d| dom.hostname(d)).unwrap_or_else(|| dom.hostname(doc));
        let point = self.placement.resolve(hostname, dom, media, parent);
        if let Err(err) = dom.insert_before(point.parent, overlay.wrapper, point.before) {
            self.discard_overlay(dom, overlay);
            return Err(err.into());
        }
        tracing::debug!("Explicitly setting playbackRate to: {}", speed);
        if let Err(err) = dom.set_playback_rate(media, speed) {
            self.discard_overlay(dom, overlay);
            return Err(err.into());
        }

        let Overlay { wrapper, panel, label, mut listeners, mut callbacks } = overlay;

        let playback = self.register(dom, Handler::Playback { media });
        callbacks.push(playback);
        listeners.push(dom.add_event_listener(media, EventType::Play, false, playback));
        listeners.push(dom.add_event_listener(media, EventType::Seeked, false, playback));

        let source = self.register(dom, Handler::SourceAttributes { media });
        callbacks.push(source);
        let source_observer = dom.create_mutation_observer(source);
        dom.observe(source_observer, media, MutationObserverInit {
            attribute_filter: Some(vec!["src".into(), "currentSrc".into()]),
            ..Default::default()
        });

        let resize = self.register(dom, Handler::Resize { media });
        callbacks.push(resize);
        let resize_observer = dom.create_resize_observer(resize);
        dom.observe_resize(resize_observer, media);
        if let Some(body) = dom.body(doc) {
            dom.observe_resize(resize_observer, body);
        }

        tracing::info!("Attached controller to {:?} at {:.2}x", media, speed);
        self.tracked.insert(ElementController {
            media,
            wrapper,
            panel,
            label,
            listeners,
            source_observer,
            resize_observer,
            callbacks,
            mark: None,
            show_timer: None,
            blink_timer: None,
            drag: None,
        });
        self.tracked.get(media).ok_or(Error::Detached(media))
    }

    /// Build the overlay subtree. Listeners are registered only after every
    /// fallible step succeeded.
    fn build_overlay(&mut self, dom: &mut DomTree, doc: NodeId, media: NodeId, speed: f64) -> Result<Overlay> {
        let has_source = dom.media(media).is_some_and(|m| !m.current_src.is_empty());

        let wrapper = dom.create_element(doc, "div");
        dom.add_class(wrapper, CONTROLLER_CLASS);
        if !has_source {
            dom.add_class(wrapper, "vsc-nosource");
        }
        if self.settings.start_hidden {
            dom.add_class(wrapper, "vsc-hidden");
        }
        let shadow = dom.attach_shadow(wrapper, ShadowRootMode::Open)?;

        let style = dom.create_element(doc, "style");
        dom.set_text_content(style, &format!("@import \"{}assets/css/shadow.css\";", self.extension_url))?;
        dom.append_child(shadow, style)?;

        let panel = dom.create_element(doc, "div");
        dom.set_attribute(panel, "id", "controller")?;
        dom.set_style(panel, "top", "0px");
        dom.set_style(panel, "left", "0px");
        dom.set_style(panel, "opacity", &self.settings.controller_opacity.to_string());
        dom.append_child(shadow, panel)?;

        let label = dom.create_element(doc, "span");
        dom.set_attribute(label, "data-action", Action::Drag.as_str())?;
        dom.add_class(label, "draggable");
        dom.set_text_content(label, &format!("{:.2}", round2(speed)))?;
        dom.append_child(panel, label)?;

        let controls = dom.create_element(doc, "span");
        dom.set_attribute(controls, "id", "controls")?;
        dom.append_child(panel, controls)?;

        let mut buttons = Vec::with_capacity(BUTTONS.len());
        for (action, class, text) in BUTTONS {
            let button = dom.create_element(doc, "button");
            dom.set_attribute(button, "data-action", action.as_str())?;
            if let Some(class) = class {
                dom.add_class(button, class);
            }
            dom.set_text_content(button, text)?;
            dom.append_child(controls, button)?;
            buttons.push((button, action));
        }

        let mut listeners = Vec::new();
        let mut callbacks = Vec::new();

        let drag = self.register(dom, Handler::OverlayDrag { media });
        callbacks.push(drag);
        listeners.push(dom.add_event_listener(label, EventType::MouseDown, true, drag));

        for (button, action) in buttons {
            let click = self.register(dom, Handler::OverlayButton { media, action });
            callbacks.push(click);
            listeners.push(dom.add_event_listener(button, EventType::Click, true, click));
        }

        let swallow = self.register(dom, Handler::SwallowPointer);
        callbacks.push(swallow);
        listeners.push(dom.add_event_listener(panel, EventType::Click, false, swallow));
        listeners.push(dom.add_event_listener(panel, EventType::MouseDown, false, swallow));

        Ok(Overlay { wrapper, panel, label, listeners, callbacks })
    }

    /// Undo a built overlay that never became a controller
    fn discard_overlay(&mut self, dom: &mut DomTree, overlay: Overlay) {
        if let Err(err) = dom.remove(overlay.wrapper) {
            tracing::warn!("Failed to detach overlay {:?}: {}", overlay.wrapper, err);
        }
        for listener in overlay.listeners {
            dom.remove_event_listener(listener);
        }
        for callback in overlay.callbacks {
            self.unregister(callback);
        }
    }

    /// Tear down the controller of `media`. Returns false when the element
    /// was not tracked.
    pub(crate) fn remove_controller(&mut self, dom: &mut DomTree, media: NodeId) -> bool {
        let Some(mut controller) = self.tracked.remove(media) else {
            return false;
        };
        if let Some(session) = controller.drag.take() {
            self.release_drag(dom, media, controller.panel, session);
        }
        if let Err(err) = dom.remove(controller.wrapper) {
            tracing::warn!("Failed to detach overlay of {:?}: {}", media, err);
        }
        for listener in controller.listeners.drain(..) {
            dom.remove_event_listener(listener);
        }
        dom.release_observer(controller.source_observer);
        dom.release_observer(controller.resize_observer);
        self.cancel_timer(controller.show_timer.take());
        self.cancel_timer(controller.blink_timer.take());
        for callback in controller.callbacks.drain(..) {
            self.unregister(callback);
        }
        tracing::info!("Removed controller from {:?}", media);
        true
    }

    /// `play` / `seeked`: re-apply the stored speed
    pub(crate) fn on_playback(&mut self, dom: &mut DomTree, media: NodeId) -> Result<()> {
        if !self.tracked.contains(media) {
            return Ok(());
        }
        let speed = self.stored_speed(dom, media);
        self.set_speed(dom, media, speed)
    }

    /// `src` / `currentSrc` changed: toggle the no-source state
    pub(crate) fn on_source_mutation(&mut self, dom: &mut DomTree, media: NodeId, records: &[MutationRecord]) {
        let Some(wrapper) = self.tracked.get(media).map(|c| c.wrapper) else {
            return;
        };
        let relevant = records.iter()
            .any(|r| matches!(r.attribute_name.as_deref(), Some("src" | "currentSrc")));
        if !relevant {
            return;
        }
        let has_src = dom.get_attribute(media, "src").is_some_and(|s| !s.is_empty());
        let has_current = dom.media(media).is_some_and(|m| !m.current_src.is_empty());
        if has_src || has_current {
            dom.remove_class(wrapper, "vsc-nosource");
        } else {
            dom.add_class(wrapper, "vsc-nosource");
        }
    }

    /// Anchor the panel over the media element: client rect minus the
    /// offset parent's client rect, never negative
    pub(crate) fn reposition(&mut self, dom: &mut DomTree, media: NodeId) {
        let Some(panel) = self.tracked.get(media).map(|c| c.panel) else {
            return;
        };
        let rect = dom.bounding_client_rect(media);
        let offset = dom.offset_parent(media).map(|p| dom.bounding_client_rect(p)).unwrap_or_default();
        let top = (rect.top() - offset.top()).max(0.0);
        let left = (rect.left() - offset.left()).max(0.0);
        dom.set_style(panel, "top", &format!("{top}px"));
        dom.set_style(panel, "left", &format!("{left}px"));
    }

    /// Update the speed indicator text
    pub(crate) fn update_label(&self, dom: &mut DomTree, media: NodeId, speed: f64) -> Result<()> {
        if let Some(label) = self.tracked.get(media).map(|c| c.label) {
            dom.set_text_content(label, &format!("{:.2}", round2(speed)))?;
        }
        Ok(())
    }
}
