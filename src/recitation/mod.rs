// recitation/mod.rs - recitation metadata: types, decoding, sources and the local cache
pub mod database;
pub mod parse;
pub mod provider;
pub mod types;

pub use database::CachedSource;
pub use provider::{QuranComSource, RecitationSource, DEFAULT_API_BASE};
pub use types::{
    ParseKeyError, RecitationData, RecitationError, ReciterId, VerseKey, VerseTiming,
    WordLocation, WordSegment,
};
