use std::sync::Arc;
use std::time::Duration;

use crate::element::MediaEvent;
use crate::recitation::{RecitationData, ReciterId, VerseKey, WordLocation};
use crate::repeat::RepeatSettings;

/// Where a seek should land.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeekTarget {
    /// Seconds from the current position; may be negative.
    Relative(f64),
    /// Seconds from the start of the audio.
    Absolute(f64),
    /// Start of a verse.
    Verse(VerseKey),
    /// Start of a word.
    Word(WordLocation),
}

impl SeekTarget {
    /// Folds a newer seek into a queued one. Relative deltas accumulate,
    /// anything else replaces.
    pub fn merge(self, newer: SeekTarget) -> SeekTarget {
        match (self, newer) {
            (SeekTarget::Relative(a), SeekTarget::Relative(b)) => SeekTarget::Relative(a + b),
            (SeekTarget::Absolute(a), SeekTarget::Relative(b)) => SeekTarget::Absolute(a + b),
            (_, newer) => newer,
        }
    }
}

/// Identifies one metadata request so late responses can be recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    pub id: u64,
    pub reciter: ReciterId,
    pub chapter: u16,
}

#[derive(Debug, Clone)]
pub enum Event {
    RequestPlay { chapter: Option<u16>, verse: Option<u16> },
    RequestPause,
    RequestToggle,
    RequestSeek(SeekTarget),
    RequestNextAyah,
    RequestPreviousAyah,
    RequestChangeReciter(ReciterId),
    RequestRepeat(Option<RepeatSettings>),
    RequestPlaybackRate(f64),
    RequestClose,
    RecitationLoaded { id: u64, data: Arc<RecitationData> },
    RecitationFailed { id: u64, reason: String },
    CanPlay,
    Seeked,
    CurrentTimeChanged,
    Buffering,
    Played,
    Ended,
    AudioPlayerError(String),
    AudioPlayerStalled,
    PlayRejected,
    DelayElapsed { ticket: u64 },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::RequestPlay { .. } => "REQUEST_PLAY",
            Event::RequestPause => "REQUEST_PAUSE",
            Event::RequestToggle => "REQUEST_TOGGLE",
            Event::RequestSeek(_) => "REQUEST_SEEK",
            Event::RequestNextAyah => "REQUEST_NEXT_AYAH",
            Event::RequestPreviousAyah => "REQUEST_PREVIOUS_AYAH",
            Event::RequestChangeReciter(_) => "REQUEST_CHANGE_RECITER",
            Event::RequestRepeat(_) => "REQUEST_REPEAT",
            Event::RequestPlaybackRate(_) => "REQUEST_PLAYBACK_RATE",
            Event::RequestClose => "REQUEST_CLOSE",
            Event::RecitationLoaded { .. } => "RECITATION_LOADED",
            Event::RecitationFailed { .. } => "RECITATION_FAILED",
            Event::CanPlay => "CAN_PLAY",
            Event::Seeked => "SEEKED",
            Event::CurrentTimeChanged => "CURRENT_TIME_CHANGED",
            Event::Buffering => "BUFFERING",
            Event::Played => "PLAYED",
            Event::Ended => "ENDED",
            Event::AudioPlayerError(_) => "AUDIO_PLAYER_ERROR",
            Event::AudioPlayerStalled => "AUDIO_PLAYER_STALLED",
            Event::PlayRejected => "PLAY_REJECTED",
            Event::DelayElapsed { .. } => "DELAY_ELAPSED",
        }
    }
}

impl From<MediaEvent> for Event {
    fn from(ev: MediaEvent) -> Self {
        match ev {
            MediaEvent::CanPlay => Event::CanPlay,
            MediaEvent::Seeked => Event::Seeked,
            MediaEvent::TimeUpdate => Event::CurrentTimeChanged,
            MediaEvent::Waiting => Event::Buffering,
            MediaEvent::Playing => Event::Played,
            MediaEvent::Ended => Event::Ended,
            MediaEvent::Error(reason) => Event::AudioPlayerError(reason),
            MediaEvent::Stalled => Event::AudioPlayerStalled,
            MediaEvent::PlayRejected => Event::PlayRejected,
        }
    }
}

/// Side effects requested by a transition, executed by the player driver.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Fetch(FetchTicket),
    CancelFetch,
    BindSource { url: String, duration_hint: Option<f64> },
    Unbind,
    Play,
    Pause,
    SetCurrentTime(f64),
    SetPlaybackRate(f64),
    ScheduleResume { ticket: u64, delay: Duration },
    CancelResume,
}
