pub mod config;
pub mod element;
pub mod input;
pub mod machine;
pub mod player;
pub mod recitation;
pub mod repeat;
pub mod state;
pub mod timer;
pub mod timing;

pub use config::{PlayerConfig, RangeEndAction};
pub use machine::{Machine, PlaybackState, SeekTarget};
pub use player::{Player, PlayerError, PlayerHandle};
pub use state::Snapshot;
