use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadingSubState {
    WaitingData,
    WaitingCanPlay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadySubState {
    Paused,
    Playing,
    Buffering,
    Ended,
}

impl ReadySubState {
    /// Sub-state to come back to after a loading pass triggered from here.
    pub fn resume_target(self) -> ReadySubState {
        match self {
            ReadySubState::Playing | ReadySubState::Buffering => ReadySubState::Playing,
            ReadySubState::Paused | ReadySubState::Ended => ReadySubState::Paused,
        }
    }
}

/// Playback lifecycle, one tag per top-level state with a nested sub-state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Closed,
    Loading(LoadingSubState),
    Ready(ReadySubState),
    Failure,
}

impl PlaybackState {
    pub fn name(&self) -> &'static str {
        match self {
            PlaybackState::Closed => "closed",
            PlaybackState::Loading(LoadingSubState::WaitingData) => "loading.waitingData",
            PlaybackState::Loading(LoadingSubState::WaitingCanPlay) => "loading.waitingCanPlay",
            PlaybackState::Ready(ReadySubState::Paused) => "ready.paused",
            PlaybackState::Ready(ReadySubState::Playing) => "ready.playing",
            PlaybackState::Ready(ReadySubState::Buffering) => "ready.buffering",
            PlaybackState::Ready(ReadySubState::Ended) => "ready.ended",
            PlaybackState::Failure => "failure",
        }
    }

    /// Buffering counts as playing; the element still intends to advance.
    pub fn is_playing(&self) -> bool {
        matches!(
            self,
            PlaybackState::Ready(ReadySubState::Playing | ReadySubState::Buffering)
        )
    }

    pub fn is_loading(&self) -> bool {
        matches!(
            self,
            PlaybackState::Loading(_) | PlaybackState::Ready(ReadySubState::Buffering)
        )
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, PlaybackState::Ready(_))
    }

    pub fn has_failed(&self) -> bool {
        matches!(self, PlaybackState::Failure)
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_dotted() {
        assert_eq!(PlaybackState::default().to_string(), "closed");
        assert_eq!(
            PlaybackState::Loading(LoadingSubState::WaitingCanPlay).name(),
            "loading.waitingCanPlay"
        );
        assert_eq!(PlaybackState::Ready(ReadySubState::Ended).name(), "ready.ended");
    }

    #[test]
    fn buffering_is_playing_and_loading() {
        let s = PlaybackState::Ready(ReadySubState::Buffering);
        assert!(s.is_playing());
        assert!(s.is_loading());
        assert!(!PlaybackState::Ready(ReadySubState::Paused).is_playing());
    }
}
