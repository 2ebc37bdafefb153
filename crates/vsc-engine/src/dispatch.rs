//! Action Dispatch
//!
//! Routes actions from keys and overlay clicks to controllers, applies
//! speed changes and reacts to rate changes made by the page.

use serde_json::json;
use vsc_dom::{DomTree, Event, EventType, Modifier, NodeId};

use crate::bindings::Action;
use crate::controller::{round2, DragSession};
use crate::runtime::{EventControl, Handler, Runtime, TimerTask};
use crate::{Result, BLINK_MS, MAX_SPEED, MIN_SPEED, SHOW_MS};

/// Custom event origin marking extension-initiated rate changes
pub const RATE_CHANGE_ORIGIN: &str = "videoSpeed";

/// Longest blink a binding value can request
const MAX_BLINK_MS: u64 = 60_000;

/// `parseInt`-style read of a `"12px"` style value
fn parse_px(value: Option<&str>) -> f64 {
    value
        .map(|v| v.trim().trim_end_matches("px"))
        .and_then(|v| v.parse::<f64>().ok())
        .map(f64::trunc)
        .unwrap_or(0.0)
}

impl Runtime {
    /// Run `action` on every tracked controller, or only on the one whose
    /// overlay the `origin` event came from
    pub(crate) fn dispatch(&mut self, dom: &mut DomTree, action: Action, value: f64, origin: Option<&Event>) {
        tracing::debug!("Running action {} ({})", action, value);
        let targets = match origin {
            Some(event) => dom.host(dom.root_node(event.target))
                .and_then(|wrapper| self.tracked.by_wrapper(wrapper))
                .map(|c| vec![c.media])
                .unwrap_or_default(),
            None => self.tracked.media().to_vec(),
        };

        for media in targets {
            let Some(wrapper) = self.tracked.get(media).map(|c| c.wrapper) else {
                continue;
            };
            self.show_controller(dom, media);
            if dom.has_class(media, "vsc-cancelled") {
                continue;
            }
            if let Err(err) = self.apply(dom, media, wrapper, action, value, origin) {
                tracing::warn!("Action {} failed on {:?}: {}", action, media, err);
            }
        }
    }

    fn apply(
        &mut self,
        dom: &mut DomTree,
        media: NodeId,
        wrapper: NodeId,
        action: Action,
        value: f64,
        origin: Option<&Event>,
    ) -> Result<()> {
        let Some(state) = dom.media(media).cloned() else {
            return Ok(());
        };
        match action {
            Action::Rewind => self.sites.seek(dom, media, -value)?,
            Action::Advance => self.sites.seek(dom, media, value)?,
            Action::Faster => {
                let base = if state.playback_rate < 0.1 { 0.0 } else { state.playback_rate };
                self.set_speed(dom, media, (base + value).clamp(MIN_SPEED, MAX_SPEED))?;
            }
            Action::Slower => {
                self.set_speed(dom, media, (state.playback_rate - value).clamp(MIN_SPEED, MAX_SPEED))?;
            }
            Action::Reset => self.reset_speed(dom, media, 1.0)?,
            Action::Fast => self.reset_speed(dom, media, value)?,
            Action::Display => {
                dom.add_class(wrapper, "vsc-manual");
                dom.toggle_class(wrapper, "vsc-hidden");
            }
            Action::Blink => self.blink(dom, media, value),
            Action::Drag => match origin {
                Some(event) => self.start_drag(dom, media, event)?,
                None => tracing::debug!("Drag needs a pointer event"),
            },
            Action::Pause => {
                if state.paused {
                    tracing::debug!("Resuming video");
                    dom.play(media)?;
                } else {
                    tracing::debug!("Pausing video");
                    dom.pause(media)?;
                }
            }
            Action::Muted => dom.set_muted(media, !state.muted)?,
            Action::Louder => dom.set_volume(media, round2(state.volume + value).clamp(0.0, 1.0))?,
            Action::Softer => dom.set_volume(media, round2(state.volume - value).clamp(0.0, 1.0))?,
            Action::Mark => {
                if let Some(controller) = self.tracked.get_mut(media) {
                    tracing::debug!("Adding marker at {}", state.current_time);
                    controller.mark = Some(state.current_time);
                }
            }
            Action::Jump => {
                match self.tracked.get(media).and_then(|c| c.mark) {
                    Some(mark) => dom.set_current_time(media, mark)?,
                    None => tracing::debug!("No marker to jump to"),
                }
            }
        }
        Ok(())
    }

    /// Reveal the overlay for a moment
    pub(crate) fn show_controller(&mut self, dom: &mut DomTree, media: NodeId) {
        let Some(controller) = self.tracked.get_mut(media) else {
            return;
        };
        let wrapper = controller.wrapper;
        let previous = controller.show_timer.take();
        dom.add_class(wrapper, "vcs-show");
        self.cancel_timer(previous);
        let timer = self.schedule(SHOW_MS, TimerTask::HideShow(media));
        if let Some(controller) = self.tracked.get_mut(media) {
            controller.show_timer = Some(timer);
        }
    }

    /// Apply a speed: rounded to two decimals, through a synthetic
    /// `ratechange` when the saved speed is enforced
    pub(crate) fn set_speed(&mut self, dom: &mut DomTree, media: NodeId, speed: f64) -> Result<()> {
        let speed = round2(speed);
        tracing::debug!("setSpeed started: {}", speed);
        if self.settings.force_last_saved_speed {
            dom.dispatch_event(Event::custom(
                EventType::RateChange,
                media,
                json!({"origin": RATE_CHANGE_ORIGIN, "speed": speed}),
            ));
        } else {
            dom.set_playback_rate(media, speed)?;
        }
        self.update_label(dom, media, speed)?;
        self.settings.last_speed = speed;
        self.refresh_cooldown();
        Ok(())
    }

    /// Three-way toggle between a remembered rate, 1.0 and the preferred
    /// speed
    pub(crate) fn reset_speed(&mut self, dom: &mut DomTree, media: NodeId, target: f64) -> Result<()> {
        let rate = dom.media(media).map(|m| m.playback_rate).unwrap_or(1.0);
        let reset = self.bindings.value(Action::Reset);
        if rate == target {
            if reset == Some(rate) {
                if target != 1.0 {
                    tracing::info!("Resetting playback speed to 1.0");
                    self.set_speed(dom, media, 1.0)
                } else {
                    tracing::info!("Toggling playback speed to \"fast\" speed");
                    match self.bindings.value(Action::Fast) {
                        Some(fast) => self.set_speed(dom, media, fast),
                        None => Ok(()),
                    }
                }
            } else {
                tracing::info!("Toggling playback speed to \"reset\" speed");
                match reset {
                    Some(reset) => self.set_speed(dom, media, reset),
                    None => Ok(()),
                }
            }
        } else {
            tracing::info!("Toggling playback speed to \"reset\" speed");
            self.bindings.set_value(Action::Reset, rate);
            self.set_speed(dom, media, target)
        }
    }

    /// Show a hidden overlay for `value` ms; repeated blinks restart the
    /// timer
    fn blink(&mut self, dom: &mut DomTree, media: NodeId, value: f64) {
        let Some(controller) = self.tracked.get_mut(media) else {
            return;
        };
        let wrapper = controller.wrapper;
        if !dom.has_class(wrapper, "vsc-hidden") && controller.blink_timer.is_none() {
            return;
        }
        let previous = controller.blink_timer.take();
        self.cancel_timer(previous);
        dom.remove_class(wrapper, "vsc-hidden");
        let delay = if value > 0.0 { value.min(MAX_BLINK_MS as f64) as u64 } else { BLINK_MS };
        let timer = self.schedule(delay, TimerTask::HideBlink(media));
        if let Some(controller) = self.tracked.get_mut(media) {
            controller.blink_timer = Some(timer);
        }
    }

    fn start_drag(&mut self, dom: &mut DomTree, media: NodeId, event: &Event) -> Result<()> {
        let Some((wrapper, panel)) = self.tracked.get(media).map(|c| (c.wrapper, c.panel)) else {
            return Ok(());
        };
        if let Some(session) = self.tracked.get_mut(media).and_then(|c| c.drag.take()) {
            self.release_drag(dom, media, panel, session);
        }
        let Some(mut container) = dom.parent_element(wrapper) else {
            tracing::debug!("Overlay of {:?} has no element parent to drag in", media);
            return Ok(());
        };
        // nearest ancestor still the same size as the player
        while let Some(up) = dom.parent_element(container) {
            if dom.offset_size(up) != dom.offset_size(container) {
                break;
            }
            container = up;
        }

        dom.add_class(media, "vcs-dragging");
        dom.add_class(panel, "dragging");

        let moved = self.register(dom, Handler::DragMove { media });
        let ended = self.register(dom, Handler::DragEnd { media });
        let listeners = vec![
            dom.add_event_listener(container, EventType::MouseUp, false, ended),
            dom.add_event_listener(container, EventType::MouseLeave, false, ended),
            dom.add_event_listener(container, EventType::MouseMove, false, moved),
        ];
        let session = DragSession {
            container,
            pointer_start: (event.client_x, event.client_y),
            panel_start: (parse_px(dom.style(panel, "left")), parse_px(dom.style(panel, "top"))),
            listeners,
            callbacks: vec![moved, ended],
        };
        if let Some(controller) = self.tracked.get_mut(media) {
            controller.drag = Some(session);
        }
        Ok(())
    }

    pub(crate) fn on_drag_move(&mut self, dom: &mut DomTree, media: NodeId, event: &Event) {
        let Some(controller) = self.tracked.get(media) else {
            return;
        };
        let Some(session) = controller.drag.as_ref() else {
            return;
        };
        let left = session.panel_start.0 + event.client_x - session.pointer_start.0;
        let top = session.panel_start.1 + event.client_y - session.pointer_start.1;
        let panel = controller.panel;
        dom.set_style(panel, "left", &format!("{left}px"));
        dom.set_style(panel, "top", &format!("{top}px"));
    }

    pub(crate) fn end_drag(&mut self, dom: &mut DomTree, media: NodeId) {
        let Some(controller) = self.tracked.get_mut(media) else {
            return;
        };
        let panel = controller.panel;
        if let Some(session) = controller.drag.take() {
            self.release_drag(dom, media, panel, session);
        }
    }

    pub(crate) fn release_drag(&mut self, dom: &mut DomTree, media: NodeId, panel: NodeId, session: DragSession) {
        for listener in session.listeners {
            dom.remove_event_listener(listener);
        }
        for callback in session.callbacks {
            self.unregister(callback);
        }
        dom.remove_class(panel, "dragging");
        dom.remove_class(media, "vcs-dragging");
        tracing::debug!("Drag ended on {:?} in {:?}", media, session.container);
    }

    /// Document-level `ratechange` capture listener
    pub(crate) fn on_rate_change(&mut self, dom: &mut DomTree, event: &Event, control: &mut EventControl) -> Result<()> {
        if self.cooldown.is_some() {
            tracing::info!("Speed event propagation blocked");
            control.stop_immediate_propagation();
        }
        // composedPath()[0], the element itself even inside shadow roots
        let media = event.target;
        if dom.media(media).is_none() {
            return Ok(());
        }

        if self.settings.force_last_saved_speed {
            let requested = event.detail.as_ref()
                .filter(|detail| detail["origin"] == RATE_CHANGE_ORIGIN)
                .and_then(|detail| detail["speed"].as_f64());
            match requested {
                Some(speed) => {
                    dom.set_playback_rate(media, speed)?;
                    self.update_speed_from_event(dom, media)?;
                }
                None => {
                    tracing::debug!("Reverting page rate change to {}", self.settings.last_speed);
                    dom.set_playback_rate(media, self.settings.last_speed)?;
                }
            }
            control.stop_immediate_propagation();
            Ok(())
        } else {
            self.update_speed_from_event(dom, media)
        }
    }

    /// Record an accepted rate change and flash the overlays
    fn update_speed_from_event(&mut self, dom: &mut DomTree, media: NodeId) -> Result<()> {
        if !self.tracked.contains(media) {
            return Ok(());
        }
        let Some(state) = dom.media(media) else {
            return Ok(());
        };
        let speed = round2(state.playback_rate);
        let source = state.current_src.clone();
        tracing::info!("Playback rate changed to {}", speed);

        self.update_label(dom, media, speed)?;
        self.settings.speeds.insert(source, speed);
        self.settings.last_speed = speed;
        self.store.set("lastSpeed", json!(speed));
        self.dispatch(dom, Action::Blink, 0.0, None);
        Ok(())
    }

    /// Document-level `keydown` capture listener
    pub(crate) fn on_key_down(
        &mut self,
        dom: &mut DomTree,
        event: &Event,
        current_target: NodeId,
        control: &mut EventControl,
    ) -> Result<()> {
        let Some(key) = event.key.as_ref() else {
            return Ok(());
        };
        tracing::debug!("Processing keydown event: {}", key.key_code);

        let blocked = [Modifier::Meta, Modifier::Fn, Modifier::Hyper, Modifier::OS];
        if blocked.iter().any(|&m| key.get_modifier_state(m)) {
            tracing::debug!("Keydown event ignored due to active modifier: {}", key.key_code);
            return Ok(());
        }
        let target = event.target;
        if dom.is_tag(target, "input") || dom.is_tag(target, "textarea") || dom.is_content_editable(target) {
            return Ok(());
        }
        if self.tracked.is_empty() {
            return Ok(());
        }

        let Some(binding) = self.bindings.find_by_key(key).cloned() else {
            return Ok(());
        };
        self.dispatch(dom, binding.action, binding.value, None);
        if binding.force {
            control.prevent_default();
            control.stop_propagation(current_target);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MemoryStore, Settings};

    fn setup(settings: Settings) -> (DomTree, Runtime, NodeId) {
        let mut dom = DomTree::new();
        let doc = dom.create_document("https://example.com/").unwrap();
        let body = dom.body(doc).unwrap();
        let video = dom.create_element(doc, "video");
        dom.append_child(body, video).unwrap();
        let mut rt = Runtime::new(settings, Box::new(MemoryStore::new()));
        rt.create_controller(&mut dom, video, None).unwrap();
        (dom, rt, video)
    }

    fn rate(dom: &DomTree, video: NodeId) -> f64 {
        dom.media(video).unwrap().playback_rate
    }

    #[test]
    fn test_clamps() {
        let (mut dom, mut rt, video) = setup(Settings::default());
        rt.dispatch(&mut dom, Action::Faster, 100.0, None);
        assert_eq!(rate(&dom, video), MAX_SPEED);
        rt.dispatch(&mut dom, Action::Slower, 100.0, None);
        assert_eq!(rate(&dom, video), MIN_SPEED);
        // below 0.1 counts as zero
        rt.dispatch(&mut dom, Action::Faster, 0.1, None);
        assert_eq!(rate(&dom, video), 0.1);
    }

    #[test]
    fn test_reset_cycles_three_ways() {
        let (mut dom, mut rt, video) = setup(Settings::default());
        // reset is aliased to fast (1.8) at creation
        assert_eq!(rt.bindings.value(Action::Reset), Some(1.8));
        rt.dispatch(&mut dom, Action::Reset, 1.0, None);
        assert_eq!(rate(&dom, video), 1.8);
        rt.dispatch(&mut dom, Action::Reset, 1.0, None);
        assert_eq!(rate(&dom, video), 1.0);
        rt.dispatch(&mut dom, Action::Reset, 1.0, None);
        assert_eq!(rate(&dom, video), 1.8);

        rt.set_speed(&mut dom, video, 2.5).unwrap();
        rt.dispatch(&mut dom, Action::Reset, 1.0, None);
        assert_eq!(rate(&dom, video), 1.0);
        assert_eq!(rt.bindings.value(Action::Reset), Some(2.5));
        rt.dispatch(&mut dom, Action::Reset, 1.0, None);
        assert_eq!(rate(&dom, video), 2.5);
    }

    #[test]
    fn test_reset_toggles_to_fast_when_bound_to_one() {
        let (mut dom, mut rt, video) = setup(Settings { remember_speed: true, ..Settings::default() });
        assert_eq!(rt.bindings.value(Action::Reset), Some(1.0));
        rt.dispatch(&mut dom, Action::Reset, 1.0, None);
        assert_eq!(rate(&dom, video), 1.8);
        rt.dispatch(&mut dom, Action::Fast, 1.8, None);
        assert_eq!(rate(&dom, video), 1.0);
    }

    #[test]
    fn test_volume_mute_pause() {
        let (mut dom, mut rt, video) = setup(Settings::default());
        rt.dispatch(&mut dom, Action::Softer, 0.3, None);
        assert_eq!(dom.media(video).unwrap().volume, 0.7);
        rt.dispatch(&mut dom, Action::Louder, 0.5, None);
        assert_eq!(dom.media(video).unwrap().volume, 1.0);
        rt.dispatch(&mut dom, Action::Softer, 2.0, None);
        assert_eq!(dom.media(video).unwrap().volume, 0.0);

        rt.dispatch(&mut dom, Action::Muted, 0.0, None);
        assert!(dom.media(video).unwrap().muted);
        rt.dispatch(&mut dom, Action::Pause, 0.0, None);
        assert!(!dom.media(video).unwrap().paused);
        rt.dispatch(&mut dom, Action::Pause, 0.0, None);
        assert!(dom.media(video).unwrap().paused);
    }

    #[test]
    fn test_mark_and_jump() {
        let (mut dom, mut rt, video) = setup(Settings::default());
        dom.set_duration(video, 120.0).unwrap();
        rt.dispatch(&mut dom, Action::Advance, 15.0, None);
        rt.dispatch(&mut dom, Action::Jump, 0.0, None);
        assert_eq!(dom.media(video).unwrap().current_time, 15.0);

        rt.dispatch(&mut dom, Action::Mark, 0.0, None);
        rt.dispatch(&mut dom, Action::Advance, 30.0, None);
        rt.dispatch(&mut dom, Action::Jump, 0.0, None);
        assert_eq!(dom.media(video).unwrap().current_time, 15.0);
        assert_eq!(rt.tracked.get(video).unwrap().mark(), Some(15.0));
    }

    #[test]
    fn test_display_toggles_manual_hidden() {
        let (mut dom, mut rt, video) = setup(Settings::default());
        let wrapper = rt.tracked.get(video).unwrap().wrapper();
        rt.dispatch(&mut dom, Action::Display, 0.0, None);
        assert!(dom.has_class(wrapper, "vsc-manual"));
        assert!(dom.has_class(wrapper, "vsc-hidden"));
        assert!(dom.has_class(wrapper, "vcs-show"));
        rt.dispatch(&mut dom, Action::Display, 0.0, None);
        assert!(!dom.has_class(wrapper, "vsc-hidden"));
    }

    #[test]
    fn test_cancelled_elements_are_only_shown() {
        let (mut dom, mut rt, video) = setup(Settings::default());
        dom.add_class(video, "vsc-cancelled");
        rt.dispatch(&mut dom, Action::Faster, 0.5, None);
        assert_eq!(rate(&dom, video), 1.0);
        let wrapper = rt.tracked.get(video).unwrap().wrapper();
        assert!(dom.has_class(wrapper, "vcs-show"));
    }

    #[test]
    fn test_set_speed_updates_label_and_cooldown() {
        let (mut dom, mut rt, video) = setup(Settings::default());
        rt.set_speed(&mut dom, video, 1.234).unwrap();
        assert_eq!(rate(&dom, video), 1.23);
        assert_eq!(rt.settings.last_speed, 1.23);
        let label = rt.tracked.get(video).unwrap().label();
        assert_eq!(dom.text_content(label), "1.23");
        assert!(rt.cooldown.is_some());
    }

    #[test]
    fn test_forced_speed_goes_through_custom_event() {
        let (mut dom, mut rt, video) = setup(Settings { force_last_saved_speed: true, ..Settings::default() });
        dom.take_deliveries();
        rt.set_speed(&mut dom, video, 2.0).unwrap();
        assert_eq!(rate(&dom, video), 1.0);
        assert_eq!(rt.settings.last_speed, 2.0);
    }

    #[test]
    fn test_parse_px() {
        assert_eq!(parse_px(Some("12px")), 12.0);
        assert_eq!(parse_px(Some("12.7px")), 12.0);
        assert_eq!(parse_px(Some("auto")), 0.0);
        assert_eq!(parse_px(None), 0.0);
    }
}
