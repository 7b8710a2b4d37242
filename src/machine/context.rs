use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;

use super::event::{FetchTicket, SeekTarget};
use super::state::ReadySubState;
use crate::recitation::{RecitationData, ReciterId};
use crate::repeat::{RepeatSession, RepeatSettings};

/// Why the machine is in `failure`. The display text is what the UI shows.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlaybackFailure {
    #[error("no chapter or reciter selected")]
    MissingTarget,
    #[error("unable to load recitation: {0}")]
    Fetch(String),
    #[error("audio playback error: {0}")]
    Media(String),
    #[error("playback stalled with no audio source")]
    Stalled,
}

/// Recently resolved recitations, most recent last.
#[derive(Debug, Clone)]
pub struct RecitationCache {
    entries: VecDeque<((ReciterId, u16), Arc<RecitationData>)>,
    capacity: usize,
}

impl RecitationCache {
    pub fn new(capacity: usize) -> Self {
        Self { entries: VecDeque::new(), capacity }
    }

    pub fn get(&self, reciter: ReciterId, chapter: u16) -> Option<Arc<RecitationData>> {
        self.entries
            .iter()
            .find(|(key, _)| *key == (reciter, chapter))
            .map(|(_, data)| Arc::clone(data))
    }

    pub fn insert(&mut self, reciter: ReciterId, chapter: u16, data: Arc<RecitationData>) {
        if self.capacity == 0 {
            return;
        }
        self.entries.retain(|(key, _)| *key != (reciter, chapter));
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(((reciter, chapter), data));
    }
}

/// Everything the machine knows about the current session.
#[derive(Debug, Clone)]
pub struct PlaybackContext {
    pub reciter_id: Option<ReciterId>,
    pub chapter_id: Option<u16>,
    pub verse_number: Option<u16>,
    pub recitation: Option<Arc<RecitationData>>,
    pub elapsed_secs: f64,
    pub duration_secs: f64,
    pub playback_rate: f64,
    pub repeat: Option<RepeatSession>,
    /// Repeat requested before the range's timings were available.
    pub pending_repeat: Option<RepeatSettings>,
    pub pending_seek: Option<SeekTarget>,
    pub resume_sub_state: Option<ReadySubState>,
    pub request: Option<FetchTicket>,
    pub delay_ticket: Option<u64>,
    pub failure: Option<PlaybackFailure>,
    /// Configuration problem from the last intent; does not affect the state.
    pub config_error: Option<String>,
    pub cache: RecitationCache,
}

impl PlaybackContext {
    pub fn new(reciter_id: Option<ReciterId>, cache_capacity: usize) -> Self {
        Self {
            reciter_id,
            chapter_id: None,
            verse_number: None,
            recitation: None,
            elapsed_secs: 0.0,
            duration_secs: 0.0,
            playback_rate: 1.0,
            repeat: None,
            pending_repeat: None,
            pending_seek: None,
            resume_sub_state: None,
            request: None,
            delay_ticket: None,
            failure: None,
            config_error: None,
            cache: RecitationCache::new(cache_capacity),
        }
    }

    /// Metadata for the requested (reciter, chapter), if it is loaded.
    pub fn matching_recitation(&self) -> Option<&Arc<RecitationData>> {
        self.recitation
            .as_ref()
            .filter(|data| Some(data.chapter_id) == self.chapter_id)
    }

    /// Stores position and duration, keeping `0 <= elapsed <= duration`.
    pub fn set_position(&mut self, elapsed: f64, duration: Option<f64>) {
        if let Some(d) = duration {
            self.duration_secs = d;
        }
        let elapsed = if elapsed.is_finite() { elapsed } else { 0.0 };
        self.elapsed_secs = elapsed.clamp(0.0, self.duration_secs.max(0.0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(chapter: u16) -> Arc<RecitationData> {
        Arc::new(RecitationData {
            audio_url: format!("{chapter}.mp3"),
            chapter_id: chapter,
            verse_timings: Vec::new(),
        })
    }

    #[test]
    fn cache_evicts_oldest() {
        let mut cache = RecitationCache::new(2);
        cache.insert(1, 1, data(1));
        cache.insert(2, 1, data(1));
        cache.insert(1, 1, data(1));
        cache.insert(3, 1, data(1));
        assert!(cache.get(2, 1).is_none());
        assert!(cache.get(1, 1).is_some());
        assert!(cache.get(3, 1).is_some());
    }

    #[test]
    fn position_is_clamped() {
        let mut ctx = PlaybackContext::new(Some(7), 0);
        ctx.set_position(130.0, Some(120.0));
        assert_eq!(ctx.elapsed_secs, 120.0);
        ctx.set_position(-4.0, None);
        assert_eq!(ctx.elapsed_secs, 0.0);
        ctx.set_position(f64::NAN, None);
        assert_eq!(ctx.elapsed_secs, 0.0);
    }
}
