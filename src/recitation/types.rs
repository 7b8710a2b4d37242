use once_cell::sync::Lazy;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// Shared HTTP client with reasonable defaults for timeouts
static HTTP_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .user_agent("AyahPlayer/0.1")
        .timeout(std::time::Duration::from_secs(10))
        .build()
        .unwrap_or_default()
});

pub(crate) fn http_client() -> &'static Client {
    &HTTP_CLIENT
}

/// Identity of a reciter as known by the recitation backend.
pub type ReciterId = u32;

/// A verse address in `chapter:verse` form, e.g. `2:255`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VerseKey {
    pub chapter: u16,
    pub verse: u16,
}

impl VerseKey {
    pub fn new(chapter: u16, verse: u16) -> Self {
        Self { chapter, verse }
    }
}

impl fmt::Display for VerseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chapter, self.verse)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid key '{input}': expected {expected}")]
pub struct ParseKeyError {
    input: String,
    expected: &'static str,
}

fn parse_part(part: Option<&str>, input: &str, expected: &'static str) -> Result<u16, ParseKeyError> {
    part.and_then(|p| p.trim().parse::<u16>().ok())
        .filter(|n| *n > 0)
        .ok_or_else(|| ParseKeyError { input: input.to_string(), expected })
}

impl FromStr for VerseKey {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const EXPECTED: &str = "chapter:verse";
        let mut parts = s.split(':');
        let chapter = parse_part(parts.next(), s, EXPECTED)?;
        let verse = parse_part(parts.next(), s, EXPECTED)?;
        if parts.next().is_some() {
            return Err(ParseKeyError { input: s.to_string(), expected: EXPECTED });
        }
        Ok(Self { chapter, verse })
    }
}

impl TryFrom<String> for VerseKey {
    type Error = ParseKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<VerseKey> for String {
    fn from(key: VerseKey) -> Self {
        key.to_string()
    }
}

/// A word address in `chapter:verse:word` form. Word positions are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WordLocation {
    pub verse: VerseKey,
    pub word: u16,
}

impl fmt::Display for WordLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.verse, self.word)
    }
}

impl FromStr for WordLocation {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const EXPECTED: &str = "chapter:verse:word";
        let mut parts = s.split(':');
        let chapter = parse_part(parts.next(), s, EXPECTED)?;
        let verse = parse_part(parts.next(), s, EXPECTED)?;
        let word = parse_part(parts.next(), s, EXPECTED)?;
        if parts.next().is_some() {
            return Err(ParseKeyError { input: s.to_string(), expected: EXPECTED });
        }
        Ok(Self { verse: VerseKey::new(chapter, verse), word })
    }
}

/// Timing of a single word inside a verse, in milliseconds from the start of
/// the chapter audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordSegment {
    pub word: u16,
    pub start_ms: u64,
    pub end_ms: u64,
}

/// The `[timestamp_from, timestamp_to)` interval during which a verse is
/// recited, with optional per-word segments for highlighting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerseTiming {
    pub verse_key: VerseKey,
    pub timestamp_from: u64,
    pub timestamp_to: u64,
    #[serde(default)]
    pub segments: Vec<WordSegment>,
}

impl VerseTiming {
    pub fn start_secs(&self) -> f64 {
        self.timestamp_from as f64 / 1000.0
    }

    pub fn duration_ms(&self) -> u64 {
        self.timestamp_to.saturating_sub(self.timestamp_from)
    }
}

/// Audio file plus verse timing table for one (reciter, chapter) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecitationData {
    pub audio_url: String,
    pub chapter_id: u16,
    pub verse_timings: Vec<VerseTiming>,
}

impl RecitationData {
    /// Length of the timed portion of the audio in seconds, if any timings exist.
    pub fn timed_duration_secs(&self) -> Option<f64> {
        self.verse_timings
            .last()
            .map(|t| t.timestamp_to as f64 / 1000.0)
    }
}

#[derive(Error, Debug)]
pub enum RecitationError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("API error: {0}")]
    Api(String),
    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("no recitation for reciter {reciter} chapter {chapter}")]
    NotFound { reciter: ReciterId, chapter: u16 },
    #[error("invalid verse timings: {0}")]
    InvalidTimings(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_verse_keys() {
        assert_eq!("2:255".parse::<VerseKey>(), Ok(VerseKey::new(2, 255)));
        assert!("2".parse::<VerseKey>().is_err());
        assert!("0:1".parse::<VerseKey>().is_err());
        assert!("1:2:3".parse::<VerseKey>().is_err());
        assert!("a:1".parse::<VerseKey>().is_err());
    }

    #[test]
    fn parses_word_locations() {
        let loc: WordLocation = "1:7:3".parse().unwrap();
        assert_eq!(loc.verse, VerseKey::new(1, 7));
        assert_eq!(loc.word, 3);
        assert_eq!(loc.to_string(), "1:7:3");
        assert!("1:7".parse::<WordLocation>().is_err());
    }

    #[test]
    fn verse_key_serializes_as_string() {
        let json = serde_json::to_string(&VerseKey::new(1, 2)).unwrap();
        assert_eq!(json, "\"1:2\"");
        let back: VerseKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, VerseKey::new(1, 2));
        assert!(serde_json::from_str::<VerseKey>("\"x\"").is_err());
    }
}
