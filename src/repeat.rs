// repeat.rs: Bounded verse and range repetition layered over playback.
//
// `evaluate` is the pure reducer; `RepeatSession` tracks which verse of the
// range is being played and turns positions into boundary events for it.

use std::time::Duration;
use thiserror::Error;

use crate::recitation::{VerseKey, VerseTiming};
use crate::timing::{find_adjacent_verse, find_verse, find_verse_at, Direction};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RepeatError {
    #[error("invalid repeat settings: {0}")]
    InvalidSettings(String),
    #[error("invalid repeat range {from}ms..{to}ms")]
    InvalidRange { from: u64, to: u64 },
    #[error("verse {0} is not part of the loaded recitation")]
    UnknownVerse(VerseKey),
}

/// User-configured repetition, immutable for the duration of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct RepeatSettings {
    pub repeat_each_verse: u32,
    pub repeat_range: u32,
    pub delay_multiplier: f64,
    pub range_start: VerseKey,
    pub range_end: VerseKey,
}

impl RepeatSettings {
    pub fn single_verse(verse: VerseKey, times: u32) -> Self {
        Self {
            repeat_each_verse: 1,
            repeat_range: times,
            delay_multiplier: 0.0,
            range_start: verse,
            range_end: verse,
        }
    }

    pub fn validate(&self) -> Result<(), RepeatError> {
        if self.repeat_each_verse == 0 || self.repeat_range == 0 {
            return Err(RepeatError::InvalidSettings("repeat counts must be at least 1".into()));
        }
        if !self.delay_multiplier.is_finite() {
            return Err(RepeatError::InvalidSettings("delay multiplier must be finite".into()));
        }
        if self.range_start.chapter != self.range_end.chapter {
            return Err(RepeatError::InvalidSettings(format!(
                "range {}..{} spans chapters",
                self.range_start, self.range_end
            )));
        }
        if self.range_start > self.range_end {
            return Err(RepeatError::InvalidSettings(format!(
                "range start {} is after range end {}",
                self.range_start, self.range_end
            )));
        }
        Ok(())
    }

    pub fn contains(&self, key: VerseKey) -> bool {
        self.range_start <= key && key <= self.range_end
    }
}

/// Completed plays so far for the current verse and for the whole range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RepeatProgress {
    pub repeat_each_verse: u32,
    pub repeat_range: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Boundary {
    pub verse_ended: bool,
    pub range_ended: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RepeatAction {
    /// Nothing ended.
    None,
    /// Play the same verse again from `seek_to` seconds.
    RepeatVerse { seek_to: f64 },
    /// Restart the range from `seek_to` seconds.
    RepeatRange { seek_to: f64 },
    /// Let playback run on into the next verse.
    Advance,
    /// Range repetition exhausted.
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RepeatOutcome {
    pub progress: RepeatProgress,
    pub action: RepeatAction,
    /// Reflection pause before the next pass starts.
    pub delay: Option<Duration>,
}

/// Pause length for a verse spanning `from_ms..to_ms`. Zero or negative
/// multipliers never pause.
pub fn reflection_delay(multiplier: f64, from_ms: u64, to_ms: u64) -> Option<Duration> {
    let ms = multiplier * to_ms.saturating_sub(from_ms) as f64;
    (ms.is_finite() && ms > 0.0).then(|| Duration::from_millis(ms.round() as u64))
}

/// Applies the four boundary rules to `progress`, all against the incoming
/// counters. The range stop check wins over the range repeat.
pub fn evaluate(
    progress: RepeatProgress,
    settings: &RepeatSettings,
    boundary: Boundary,
    verse_from_ms: u64,
    verse_to_ms: u64,
    range_from_ms: u64,
) -> RepeatOutcome {
    let should_repeat_verse =
        boundary.verse_ended && progress.repeat_each_verse < settings.repeat_each_verse;
    let should_reset_verse_progress =
        boundary.verse_ended && progress.repeat_each_verse >= settings.repeat_each_verse;
    let should_stop_audio = boundary.range_ended && progress.repeat_range >= settings.repeat_range;
    let should_repeat_range = boundary.range_ended && progress.repeat_range < settings.repeat_range;

    let mut next = progress;
    let mut action = if boundary.verse_ended || boundary.range_ended {
        RepeatAction::Advance
    } else {
        RepeatAction::None
    };

    if should_repeat_verse {
        next.repeat_each_verse += 1;
        action = RepeatAction::RepeatVerse { seek_to: verse_from_ms as f64 / 1000.0 };
    }
    if should_reset_verse_progress {
        next.repeat_each_verse = 1;
    }
    if should_stop_audio {
        next.repeat_range = 1;
        action = RepeatAction::Stop;
    } else if should_repeat_range {
        next.repeat_range += 1;
        action = RepeatAction::RepeatRange { seek_to: range_from_ms as f64 / 1000.0 };
    }

    let delay = if !should_stop_audio && (boundary.verse_ended || boundary.range_ended) {
        reflection_delay(settings.delay_multiplier, verse_from_ms, verse_to_ms)
    } else {
        None
    };

    RepeatOutcome { progress: next, action, delay }
}

/// One repeat session over a loaded recitation.
#[derive(Debug, Clone, PartialEq)]
pub struct RepeatSession {
    settings: RepeatSettings,
    progress: RepeatProgress,
    current: VerseKey,
    range_from_ms: u64,
    range_to_ms: u64,
}

impl RepeatSession {
    /// Resolves the range against `timings`. Refuses ranges whose timestamps
    /// are empty or inverted.
    pub fn start(settings: RepeatSettings, timings: &[VerseTiming]) -> Result<Self, RepeatError> {
        settings.validate()?;
        let first = find_verse(timings, settings.range_start)
            .ok_or(RepeatError::UnknownVerse(settings.range_start))?;
        let last = find_verse(timings, settings.range_end)
            .ok_or(RepeatError::UnknownVerse(settings.range_end))?;
        let (from, to) = (first.timestamp_from, last.timestamp_to);
        if from >= to {
            return Err(RepeatError::InvalidRange { from, to });
        }
        Ok(Self {
            current: settings.range_start,
            settings,
            progress: RepeatProgress::default(),
            range_from_ms: from,
            range_to_ms: to,
        })
    }

    pub fn settings(&self) -> &RepeatSettings {
        &self.settings
    }

    pub fn progress(&self) -> RepeatProgress {
        self.progress
    }

    pub fn current_verse(&self) -> VerseKey {
        self.current
    }

    pub fn range_start_secs(&self) -> f64 {
        self.range_from_ms as f64 / 1000.0
    }

    pub fn range_ms(&self) -> (u64, u64) {
        (self.range_from_ms, self.range_to_ms)
    }

    /// Zeroed counters mean nothing has played yet; the first pass counts.
    fn begin_pass(&mut self) {
        self.progress.repeat_each_verse = self.progress.repeat_each_verse.max(1);
        self.progress.repeat_range = self.progress.repeat_range.max(1);
    }

    /// Points the session at the in-range verse playing at `position_ms`
    /// without touching the counters.
    pub fn retarget(&mut self, position_ms: u64, timings: &[VerseTiming]) {
        if let Some(verse) = find_verse_at(timings, position_ms)
            && self.settings.contains(verse.verse_key)
        {
            self.current = verse.verse_key;
        }
    }

    /// An explicit seek or ayah navigation landed at `position_ms`; an in-range
    /// verse there becomes the current one with a fresh count. Returns false
    /// when the position lies in a verse outside the range.
    pub fn observe_seek(&mut self, position_ms: u64, timings: &[VerseTiming]) -> bool {
        let Some(verse) = find_verse_at(timings, position_ms) else {
            return true;
        };
        if !self.settings.contains(verse.verse_key) {
            return false;
        }
        self.begin_pass();
        if verse.verse_key != self.current {
            self.current = verse.verse_key;
            self.progress.repeat_each_verse = 1;
        }
        true
    }

    /// Feeds a playback position. Returns the outcome when the current verse
    /// ended at this position.
    pub fn on_position(&mut self, position_ms: u64, timings: &[VerseTiming]) -> Option<RepeatOutcome> {
        self.begin_pass();
        let current = find_verse(timings, self.current)?;
        if position_ms < current.timestamp_to {
            return None;
        }
        let (from, to) = (current.timestamp_from, current.timestamp_to);

        let range_ended = self.current == self.settings.range_end
            && self.progress.repeat_each_verse >= self.settings.repeat_each_verse;
        let outcome = evaluate(
            self.progress,
            &self.settings,
            Boundary { verse_ended: true, range_ended },
            from,
            to,
            self.range_from_ms,
        );
        self.progress = outcome.progress;

        match outcome.action {
            RepeatAction::RepeatRange { .. } => self.current = self.settings.range_start,
            RepeatAction::Advance => {
                if let Some(next) = find_adjacent_verse(timings, Some(self.current), Direction::Next) {
                    self.current = next.verse_key;
                }
            }
            RepeatAction::RepeatVerse { .. } | RepeatAction::Stop | RepeatAction::None => {}
        }
        Some(outcome)
    }

    /// The audio ran out; treat it as reaching the end of the current verse.
    pub fn on_media_ended(&mut self, timings: &[VerseTiming]) -> Option<RepeatOutcome> {
        let end = find_verse(timings, self.current)?.timestamp_to;
        self.on_position(end, timings)
    }
}
