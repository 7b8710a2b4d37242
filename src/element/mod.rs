//! The audio element seam.
//!
//! The playback core never constructs an element; the host injects one that
//! implements [`AudioElement`] and forwards its native events as
//! [`MediaEvent`]s. In a browser that is an `HtmlAudioElement` with listeners
//! on `canplay`, `seeked`, `timeupdate`, `waiting`, `playing`, `ended`,
//! `error` and `stalled`.

pub mod simulated;

pub use simulated::SimulatedElement;

/// `HTMLMediaElement.readyState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ReadyState {
    #[default]
    HaveNothing = 0,
    HaveMetadata = 1,
    HaveCurrentData = 2,
    HaveFutureData = 3,
    HaveEnoughData = 4,
}

impl ReadyState {
    pub fn from_raw(raw: u16) -> Self {
        match raw {
            0 => Self::HaveNothing,
            1 => Self::HaveMetadata,
            2 => Self::HaveCurrentData,
            3 => Self::HaveFutureData,
            _ => Self::HaveEnoughData,
        }
    }
}

/// Operations the core performs on the shared element.
pub trait AudioElement {
    fn play(&mut self);
    fn pause(&mut self);
    fn paused(&self) -> bool;
    fn current_time(&self) -> f64;
    fn set_current_time(&mut self, secs: f64);
    /// Duration in seconds; NaN while unknown.
    fn duration(&self) -> f64;
    fn src(&self) -> String;
    /// Binds a new source. `duration_hint` is the end of the timed portion of
    /// the recitation; streaming backends ignore it.
    fn set_src(&mut self, url: &str, duration_hint: Option<f64>);
    fn ready_state(&self) -> ReadyState;
    fn set_playback_rate(&mut self, rate: f64);

    fn snapshot(&self) -> ElementSnapshot {
        ElementSnapshot {
            src: self.src(),
            ready_state: self.ready_state(),
            current_time: self.current_time(),
            duration: self.duration(),
            paused: self.paused(),
        }
    }
}

/// Element properties read once per event, so transitions stay pure.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementSnapshot {
    pub src: String,
    pub ready_state: ReadyState,
    pub current_time: f64,
    pub duration: f64,
    pub paused: bool,
}

impl Default for ElementSnapshot {
    fn default() -> Self {
        Self {
            src: String::new(),
            ready_state: ReadyState::HaveNothing,
            current_time: 0.0,
            duration: f64::NAN,
            paused: true,
        }
    }
}

impl ElementSnapshot {
    pub fn has_source(&self) -> bool {
        !self.src.is_empty()
    }

    pub fn known_duration(&self) -> Option<f64> {
        (self.duration.is_finite() && self.duration >= 0.0).then_some(self.duration)
    }
}

/// Native element signals, mapped 1:1 onto machine events.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    CanPlay,
    Seeked,
    TimeUpdate,
    Waiting,
    Playing,
    Ended,
    Error(String),
    Stalled,
    /// `play()` promise rejected, typically by an autoplay policy.
    PlayRejected,
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;

    /// Records every call the core makes on the element.
    #[derive(Debug, Default)]
    pub struct FakeElement {
        pub state: ElementSnapshot,
        pub play_calls: usize,
        pub pause_calls: usize,
        pub seeks: Vec<f64>,
        pub rate: f64,
    }

    impl AudioElement for FakeElement {
        fn play(&mut self) {
            self.play_calls += 1;
            self.state.paused = false;
        }
        fn pause(&mut self) {
            self.pause_calls += 1;
            self.state.paused = true;
        }
        fn paused(&self) -> bool {
            self.state.paused
        }
        fn current_time(&self) -> f64 {
            self.state.current_time
        }
        fn set_current_time(&mut self, secs: f64) {
            self.seeks.push(secs);
            self.state.current_time = secs;
        }
        fn duration(&self) -> f64 {
            self.state.duration
        }
        fn src(&self) -> String {
            self.state.src.clone()
        }
        fn set_src(&mut self, url: &str, duration_hint: Option<f64>) {
            self.state.src = url.to_string();
            self.state.ready_state = ReadyState::HaveNothing;
            self.state.current_time = 0.0;
            self.state.duration = duration_hint.unwrap_or(f64::NAN);
        }
        fn ready_state(&self) -> ReadyState {
            self.state.ready_state
        }
        fn set_playback_rate(&mut self, rate: f64) {
            self.rate = rate;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_state_ordering() {
        assert!(ReadyState::HaveFutureData < ReadyState::HaveEnoughData);
        assert_eq!(ReadyState::from_raw(4), ReadyState::HaveEnoughData);
        assert_eq!(ReadyState::from_raw(1), ReadyState::HaveMetadata);
    }

    #[test]
    fn default_snapshot_has_no_source() {
        let snap = ElementSnapshot::default();
        assert!(!snap.has_source());
        assert_eq!(snap.known_duration(), None);
    }
}
