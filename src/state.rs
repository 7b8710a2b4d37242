// state.rs: Published view of the playback core for UI consumers

use crate::machine::Machine;
use crate::recitation::{ReciterId, VerseKey, WordSegment};
use crate::repeat::RepeatProgress;

/// What the UI renders. Published through a `watch` channel after every
/// processed event that changed something.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Dotted state name, e.g. `ready.playing`.
    pub state: &'static str,
    pub elapsed: f64,
    pub duration: f64,
    pub verse: Option<VerseKey>,
    pub word: Option<WordSegment>,
    pub is_playing: bool,
    pub is_loading: bool,
    pub has_failed: bool,
    pub failure: Option<String>,
    /// Rejected configuration such as a malformed repeat range.
    pub error: Option<String>,
    pub reciter: Option<ReciterId>,
    pub chapter: Option<u16>,
    pub playback_rate: f64,
    pub repeat: Option<RepeatProgress>,
    pub version: u64, // Incremented on any state change
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            state: "closed",
            elapsed: 0.0,
            duration: 0.0,
            verse: None,
            word: None,
            is_playing: false,
            is_loading: false,
            has_failed: false,
            failure: None,
            error: None,
            reciter: None,
            chapter: None,
            playback_rate: 1.0,
            repeat: None,
            version: 0,
        }
    }
}

impl Snapshot {
    pub fn from_machine(machine: &Machine, version: u64) -> Self {
        let state = machine.state();
        let ctx = machine.context();
        Self {
            state: state.name(),
            elapsed: ctx.elapsed_secs,
            duration: ctx.duration_secs,
            verse: machine.active_verse().map(|v| v.verse_key),
            word: machine.active_word().copied(),
            is_playing: state.is_playing(),
            is_loading: state.is_loading(),
            has_failed: state.has_failed(),
            failure: ctx.failure.as_ref().map(|f| f.to_string()),
            error: ctx.config_error.clone(),
            reciter: ctx.reciter_id,
            chapter: ctx.chapter_id,
            playback_rate: ctx.playback_rate,
            repeat: ctx.repeat.as_ref().map(|r| r.progress()),
            version,
        }
    }

    /// Rebuilds from `machine`; bumps the version and returns true only when
    /// something visible changed.
    pub fn refresh(&mut self, machine: &Machine) -> bool {
        let next = Self::from_machine(machine, self.version);
        if next == *self {
            return false;
        }
        *self = Self { version: self.version + 1, ..next };
        true
    }
}
