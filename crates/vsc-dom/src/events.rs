//! DOM Events
//!
//! Listener registration and dispatch. Dispatch does not run handlers: it
//! resolves the propagation path once and queues one `Delivery` per
//! listener, in capture → target → bubble order, for the embedder to drain.

use std::rc::Rc;

use crate::{CallbackId, DomTree, NodeId};

/// Event types the host model fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Play,
    Pause,
    Seeked,
    RateChange,
    VolumeChange,
    KeyDown,
    Click,
    MouseDown,
    MouseMove,
    MouseUp,
    MouseLeave,
    ReadyStateChange,
}

impl EventType {
    /// Whether native events of this type bubble and cross shadow roots
    fn native_propagation(self) -> (bool, bool) {
        match self {
            Self::KeyDown | Self::Click | Self::MouseDown | Self::MouseMove | Self::MouseUp => (true, true),
            _ => (false, false),
        }
    }
}

/// `KeyboardEvent.getModifierState` keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    Alt,
    Ctrl,
    Shift,
    Meta,
    Fn,
    Hyper,
    OS,
}

/// Keyboard event payload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyboardInit {
    pub key_code: u32,
    pub modifiers: Vec<Modifier>,
}

impl KeyboardInit {
    pub fn new(key_code: u32) -> Self {
        Self { key_code, modifiers: Vec::new() }
    }

    pub fn with(mut self, modifier: Modifier) -> Self {
        self.modifiers.push(modifier);
        self
    }

    pub fn get_modifier_state(&self, modifier: Modifier) -> bool {
        self.modifiers.contains(&modifier)
    }
}

/// A dispatched event
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub event_type: EventType,
    /// Original target (`composedPath()[0]`)
    pub target: NodeId,
    pub bubbles: bool,
    pub composed: bool,
    /// `CustomEvent.detail`
    pub detail: Option<serde_json::Value>,
    pub key: Option<KeyboardInit>,
    pub client_x: f64,
    pub client_y: f64,
}

impl Event {
    /// Native event with the platform's propagation flags
    pub fn new(event_type: EventType, target: NodeId) -> Self {
        let (bubbles, composed) = event_type.native_propagation();
        Self {
            event_type,
            target,
            bubbles,
            composed,
            detail: None,
            key: None,
            client_x: 0.0,
            client_y: 0.0,
        }
    }

    /// `CustomEvent` that bubbles and escapes open shadow roots
    pub fn custom(event_type: EventType, target: NodeId, detail: serde_json::Value) -> Self {
        Self {
            bubbles: true,
            composed: true,
            detail: Some(detail),
            ..Self::new(event_type, target)
        }
    }

    pub fn key_down(target: NodeId, key: KeyboardInit) -> Self {
        Self {
            key: Some(key),
            ..Self::new(EventType::KeyDown, target)
        }
    }

    pub fn mouse(event_type: EventType, target: NodeId, client_x: f64, client_y: f64) -> Self {
        Self {
            client_x,
            client_y,
            ..Self::new(event_type, target)
        }
    }
}

/// Identifies one dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub u64);

/// Identifies one listener registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u32);

/// One listener invocation awaiting the embedder
#[derive(Debug, Clone)]
pub struct Delivery {
    pub event_id: EventId,
    pub listener: ListenerId,
    pub callback: CallbackId,
    pub current_target: NodeId,
    pub capture: bool,
    pub event: Rc<Event>,
}

#[derive(Debug, Clone)]
struct Listener {
    id: ListenerId,
    target: NodeId,
    event_type: EventType,
    capture: bool,
    callback: CallbackId,
}

#[derive(Debug, Default)]
pub(crate) struct EventRegistry {
    listeners: Vec<Listener>,
    next_listener: u32,
    next_event: u64,
    deliveries: Vec<Delivery>,
}

impl DomTree {
    /// `addEventListener`
    pub fn add_event_listener(
        &mut self,
        target: NodeId,
        event_type: EventType,
        capture: bool,
        callback: CallbackId,
    ) -> ListenerId {
        let registry = &mut self.events;
        registry.next_listener += 1;
        let id = ListenerId(registry.next_listener);
        registry.listeners.push(Listener { id, target, event_type, capture, callback });
        id
    }

    /// `removeEventListener`; returns false if it was already gone
    pub fn remove_event_listener(&mut self, id: ListenerId) -> bool {
        let before = self.events.listeners.len();
        self.events.listeners.retain(|l| l.id != id);
        before != self.events.listeners.len()
    }

    /// Number of listeners registered on `target`
    pub fn listener_count(&self, target: NodeId) -> usize {
        self.events.listeners.iter().filter(|l| l.target == target).count()
    }

    pub(crate) fn remove_listeners_on(&mut self, target: NodeId) {
        self.events.listeners.retain(|l| l.target != target);
    }

    /// `composedPath()` for an event
    pub fn event_path(&self, event: &Event) -> Vec<NodeId> {
        let mut path = vec![event.target];
        let mut current = event.target;
        loop {
            let next = match self.parent(current) {
                Some(parent) => Some(parent),
                None if event.composed => self.host(current),
                None => None,
            };
            match next {
                Some(node) => {
                    path.push(node);
                    current = node;
                }
                None => break,
            }
        }
        path
    }

    /// `dispatchEvent`: queue a delivery for every listener on the path
    pub fn dispatch_event(&mut self, event: Event) -> EventId {
        let path = self.event_path(&event);
        self.events.next_event += 1;
        let event_id = EventId(self.events.next_event);
        let event = Rc::new(event);

        let mut order: Vec<(NodeId, bool)> = Vec::new();
        for &node in path.iter().skip(1).rev() {
            order.push((node, true));
        }
        order.push((event.target, true));
        order.push((event.target, false));
        if event.bubbles {
            for &node in path.iter().skip(1) {
                order.push((node, false));
            }
        }

        let mut queued = Vec::new();
        for (node, capture) in order {
            for listener in self.events.listeners.iter()
                .filter(|l| l.target == node && l.event_type == event.event_type && l.capture == capture)
            {
                queued.push(Delivery {
                    event_id,
                    listener: listener.id,
                    callback: listener.callback,
                    current_target: node,
                    capture,
                    event: Rc::clone(&event),
                });
            }
        }
        self.events.deliveries.extend(queued);
        event_id
    }

    /// Drain queued deliveries in dispatch order
    pub fn take_deliveries(&mut self) -> Vec<Delivery> {
        std::mem::take(&mut self.events.deliveries)
    }

    pub fn has_pending_deliveries(&self) -> bool {
        !self.events.deliveries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ShadowRootMode;

    #[test]
    fn test_capture_then_target_then_bubble() {
        let mut dom = DomTree::new();
        let doc = dom.create_document("https://example.com/").unwrap();
        let body = dom.body(doc).unwrap();
        let button = dom.create_element(doc, "button");
        dom.append_child(body, button).unwrap();

        let bubble = dom.allocate_callback();
        let capture = dom.allocate_callback();
        let at_target = dom.allocate_callback();
        dom.add_event_listener(doc, EventType::Click, false, bubble);
        dom.add_event_listener(doc, EventType::Click, true, capture);
        dom.add_event_listener(button, EventType::Click, false, at_target);

        dom.dispatch_event(Event::new(EventType::Click, button));
        let order: Vec<_> = dom.take_deliveries().iter().map(|d| d.callback).collect();
        assert_eq!(order, vec![capture, at_target, bubble]);
    }

    #[test]
    fn test_native_media_events_stay_in_shadow_root() {
        let mut dom = DomTree::new();
        let doc = dom.create_document("https://example.com/").unwrap();
        let body = dom.body(doc).unwrap();
        let host = dom.create_element(doc, "div");
        dom.append_child(body, host).unwrap();
        let root = dom.attach_shadow(host, ShadowRootMode::Open).unwrap();
        let video = dom.create_element(doc, "video");
        dom.append_child(root, video).unwrap();

        let listener = dom.allocate_callback();
        dom.add_event_listener(doc, EventType::RateChange, true, listener);

        dom.dispatch_event(Event::new(EventType::RateChange, video));
        assert!(dom.take_deliveries().is_empty());

        dom.dispatch_event(Event::custom(EventType::RateChange, video, serde_json::json!({})));
        let deliveries = dom.take_deliveries();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].event.target, video);
    }

    #[test]
    fn test_removed_listener_gets_nothing() {
        let mut dom = DomTree::new();
        let doc = dom.create_document("https://example.com/").unwrap();
        let video = dom.create_element(doc, "video");
        let callback = dom.allocate_callback();
        let id = dom.add_event_listener(video, EventType::Play, false, callback);
        assert!(dom.remove_event_listener(id));
        assert!(!dom.remove_event_listener(id));
        dom.play(video).unwrap();
        assert!(dom.take_deliveries().is_empty());
    }
}
