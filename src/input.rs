// input.rs: Keyboard shortcuts for the player

use crate::machine::{Event, SeekTarget};

/// Modifier and focus flags that accompany a key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyModifiers {
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
    pub shift: bool,
    /// Focus is in a text field or other editable target.
    pub editable_target: bool,
}

impl KeyModifiers {
    fn any_held(&self) -> bool {
        self.ctrl || self.alt || self.meta || self.shift
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shortcut {
    Toggle,
    SeekBackward,
    SeekForward,
    NextAyah,
    PreviousAyah,
}

impl Shortcut {
    /// The machine intent for this shortcut; seeks move by `seek_step` seconds.
    pub fn to_event(self, seek_step: f64) -> Event {
        match self {
            Shortcut::Toggle => Event::RequestToggle,
            Shortcut::SeekBackward => Event::RequestSeek(SeekTarget::Relative(-seek_step)),
            Shortcut::SeekForward => Event::RequestSeek(SeekTarget::Relative(seek_step)),
            Shortcut::NextAyah => Event::RequestNextAyah,
            Shortcut::PreviousAyah => Event::RequestPreviousAyah,
        }
    }
}

/// Maps a `KeyboardEvent.key` value to a shortcut.
pub fn shortcut_for_key(key: &str, modifiers: KeyModifiers) -> Option<Shortcut> {
    if modifiers.editable_target {
        return None;
    }
    // media keys work regardless of modifiers
    match key {
        "MediaPlayPause" | "MediaPlay" | "MediaPause" | "AudioPlay" | "AudioPause" => {
            return Some(Shortcut::Toggle);
        }
        "MediaTrackNext" | "MediaNextTrack" | "AudioNext" => return Some(Shortcut::NextAyah),
        "MediaTrackPrevious" | "MediaPreviousTrack" | "AudioPrev" => {
            return Some(Shortcut::PreviousAyah);
        }
        _ => {}
    }
    if modifiers.any_held() {
        return None;
    }
    match key {
        " " | "Spacebar" => Some(Shortcut::Toggle),
        "ArrowLeft" | "Left" => Some(Shortcut::SeekBackward),
        "ArrowRight" | "Right" => Some(Shortcut::SeekForward),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_playback_keys() {
        let none = KeyModifiers::default();
        assert_eq!(shortcut_for_key(" ", none), Some(Shortcut::Toggle));
        assert_eq!(shortcut_for_key("ArrowLeft", none), Some(Shortcut::SeekBackward));
        assert_eq!(shortcut_for_key("ArrowRight", none), Some(Shortcut::SeekForward));
        assert_eq!(shortcut_for_key("MediaTrackNext", none), Some(Shortcut::NextAyah));
        assert_eq!(shortcut_for_key("MediaTrackPrevious", none), Some(Shortcut::PreviousAyah));
        assert_eq!(shortcut_for_key("q", none), None);
    }

    #[test]
    fn ignores_modified_and_editable_input() {
        let ctrl = KeyModifiers { ctrl: true, ..Default::default() };
        assert_eq!(shortcut_for_key("ArrowRight", ctrl), None);
        assert_eq!(shortcut_for_key("MediaPlayPause", ctrl), Some(Shortcut::Toggle));

        let typing = KeyModifiers { editable_target: true, ..Default::default() };
        assert_eq!(shortcut_for_key(" ", typing), None);
        assert_eq!(shortcut_for_key("MediaPlayPause", typing), None);
    }

    #[test]
    fn seek_shortcuts_use_step() {
        match Shortcut::SeekBackward.to_event(5.0) {
            Event::RequestSeek(SeekTarget::Relative(delta)) => assert_eq!(delta, -5.0),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(Shortcut::Toggle.to_event(5.0), Event::RequestToggle));
    }
}
