use crate::recitation::{ReciterId, DEFAULT_API_BASE};

/// What happens when range repetition is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RangeEndAction {
    /// Pause at the end of the range.
    #[default]
    Pause,
    /// Keep playing past the range as normal playback.
    Continue,
}

/// Playback core configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerConfig {
    /// Reciter used until the UI selects one (7 is Mishari Rashid al-`Afasy).
    pub default_reciter: ReciterId,
    pub api_base: String,
    /// Keyboard seek step in seconds.
    pub seek_step_secs: f64,
    pub range_end_action: RangeEndAction,
    /// Resolved recitations kept in memory for reciter switches.
    pub cache_capacity: usize,
    pub command_buffer: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            default_reciter: 7,
            api_base: DEFAULT_API_BASE.to_string(),
            seek_step_secs: 5.0,
            range_end_action: RangeEndAction::Pause,
            cache_capacity: 8,
            command_buffer: 32,
        }
    }
}

impl PlayerConfig {
    /// Defaults with `QURAN_API_BASE` applied when set.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(base) = std::env::var("QURAN_API_BASE")
            && !base.trim().is_empty()
        {
            cfg.api_base = base.trim().to_string();
        }
        cfg
    }
}
