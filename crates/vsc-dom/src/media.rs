//! Media Elements
//!
//! Playback state of `<video>`/`<audio>` and the events its setters fire.

use crate::events::{Event, EventType};
use crate::{DomError, DomTree, NodeId, Result};

/// Lowest playback rate the platform accepts
pub const MIN_PLAYBACK_RATE: f64 = 0.0625;
/// Highest playback rate the platform accepts
pub const MAX_PLAYBACK_RATE: f64 = 16.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "video" => Some(Self::Video),
            "audio" => Some(Self::Audio),
            _ => None,
        }
    }
}

/// Base media element state (shared between video/audio)
#[derive(Debug, Clone)]
pub struct MediaState {
    pub kind: MediaKind,
    pub current_src: String,
    pub current_time: f64,
    pub duration: f64,
    pub paused: bool,
    pub muted: bool,
    pub volume: f64,
    pub playback_rate: f64,
}

impl MediaState {
    pub fn new(kind: MediaKind) -> Self {
        Self {
            kind,
            current_src: String::new(),
            current_time: 0.0,
            duration: f64::NAN,
            paused: true,
            muted: false,
            volume: 1.0,
            playback_rate: 1.0,
        }
    }
}

impl DomTree {
    pub fn media(&self, id: NodeId) -> Option<&MediaState> {
        self.element(id)?.media.as_ref()
    }

    fn media_mut(&mut self, id: NodeId) -> Result<&mut MediaState> {
        self.element_mut(id)
            .and_then(|e| e.media.as_mut())
            .ok_or(DomError::NotFound(id))
    }

    /// Set `playbackRate`; fires `ratechange` when the value changes
    pub fn set_playback_rate(&mut self, id: NodeId, rate: f64) -> Result<()> {
        if !(MIN_PLAYBACK_RATE..=MAX_PLAYBACK_RATE).contains(&rate) {
            return Err(DomError::NotSupported(format!("playback rate {rate} is out of range")));
        }
        let media = self.media_mut(id)?;
        if media.playback_rate == rate {
            return Ok(());
        }
        media.playback_rate = rate;
        self.dispatch_event(Event::new(EventType::RateChange, id));
        Ok(())
    }

    /// Set `currentTime` (clamped to the media timeline); fires `seeked`
    pub fn set_current_time(&mut self, id: NodeId, time: f64) -> Result<()> {
        let media = self.media_mut(id)?;
        let mut time = time.max(0.0);
        if media.duration.is_finite() {
            time = time.min(media.duration);
        }
        media.current_time = time;
        self.dispatch_event(Event::new(EventType::Seeked, id));
        Ok(())
    }

    pub fn set_duration(&mut self, id: NodeId, duration: f64) -> Result<()> {
        self.media_mut(id)?.duration = duration;
        Ok(())
    }

    /// `play()`; fires `play` when leaving the paused state
    pub fn play(&mut self, id: NodeId) -> Result<()> {
        let media = self.media_mut(id)?;
        if media.paused {
            media.paused = false;
            self.dispatch_event(Event::new(EventType::Play, id));
        }
        Ok(())
    }

    /// `pause()`; fires `pause` when entering the paused state
    pub fn pause(&mut self, id: NodeId) -> Result<()> {
        let media = self.media_mut(id)?;
        if !media.paused {
            media.paused = true;
            self.dispatch_event(Event::new(EventType::Pause, id));
        }
        Ok(())
    }

    pub fn set_muted(&mut self, id: NodeId, muted: bool) -> Result<()> {
        let media = self.media_mut(id)?;
        if media.muted != muted {
            media.muted = muted;
            self.dispatch_event(Event::new(EventType::VolumeChange, id));
        }
        Ok(())
    }

    /// Set `volume`; values outside [0, 1] are rejected
    pub fn set_volume(&mut self, id: NodeId, volume: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(DomError::NotSupported(format!("volume {volume} is out of range")));
        }
        let media = self.media_mut(id)?;
        if media.volume != volume {
            media.volume = volume;
            self.dispatch_event(Event::new(EventType::VolumeChange, id));
        }
        Ok(())
    }

    /// Set the `src` attribute and resolve `currentSrc`
    pub fn set_src(&mut self, id: NodeId, src: &str) -> Result<()> {
        self.media_mut(id)?.current_src = src.to_string();
        self.set_attribute(id, "src", src)
    }

    /// Drop the source entirely
    pub fn clear_src(&mut self, id: NodeId) -> Result<()> {
        self.media_mut(id)?.current_src.clear();
        self.remove_attribute(id, "src")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video() -> (DomTree, NodeId) {
        let mut dom = DomTree::new();
        let doc = dom.create_document("https://example.com/").unwrap();
        let video = dom.create_element(doc, "video");
        (dom, video)
    }

    #[test]
    fn test_media_defaults() {
        let (dom, video) = video();
        let media = dom.media(video).unwrap();
        assert!(media.paused);
        assert_eq!(media.volume, 1.0);
        assert_eq!(media.playback_rate, 1.0);
        assert_eq!(media.kind, MediaKind::Video);
    }

    #[test]
    fn test_playback_rate_bounds() {
        let (mut dom, video) = video();
        assert!(dom.set_playback_rate(video, 0.01).is_err());
        assert!(dom.set_playback_rate(video, 17.0).is_err());
        dom.set_playback_rate(video, 16.0).unwrap();
        assert_eq!(dom.media(video).unwrap().playback_rate, 16.0);
    }

    #[test]
    fn test_seek_clamps_to_duration() {
        let (mut dom, video) = video();
        dom.set_duration(video, 30.0).unwrap();
        dom.set_current_time(video, 45.0).unwrap();
        assert_eq!(dom.media(video).unwrap().current_time, 30.0);
        dom.set_current_time(video, -5.0).unwrap();
        assert_eq!(dom.media(video).unwrap().current_time, 0.0);
    }

    #[test]
    fn test_non_media_element_is_rejected() {
        let mut dom = DomTree::new();
        let doc = dom.create_document("https://example.com/").unwrap();
        let div = dom.create_element(doc, "div");
        assert!(matches!(dom.play(div), Err(DomError::NotFound(_))));
    }
}
