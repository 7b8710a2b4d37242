// timing.rs: Maps playback positions to verse and word boundaries.
//
// Every lookup expects the table to be sorted by `timestamp_from` with
// non-overlapping entries; `validate_timings` enforces that when a payload
// is decoded.

use crate::recitation::{VerseKey, VerseTiming, WordLocation, WordSegment};

/// Direction for ayah navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Previous,
}

/// Returns the verse whose `[timestamp_from, timestamp_to)` interval contains
/// `position_ms`, or `None` when the position lies outside every interval.
pub fn find_verse_at(timings: &[VerseTiming], position_ms: u64) -> Option<&VerseTiming> {
    find_index_at(timings, position_ms).map(|idx| &timings[idx])
}

fn find_index_at(timings: &[VerseTiming], position_ms: u64) -> Option<usize> {
    let idx = timings.partition_point(|t| t.timestamp_from <= position_ms);
    if idx == 0 {
        return None;
    }
    let candidate = idx - 1;
    (position_ms < timings[candidate].timestamp_to).then_some(candidate)
}

/// Converts a position in seconds to milliseconds. Negative and non-finite
/// values collapse to zero.
pub fn secs_to_ms(position_secs: f64) -> u64 {
    if !position_secs.is_finite() || position_secs <= 0.0 {
        0
    } else {
        (position_secs * 1000.0).round() as u64
    }
}

fn index_of(timings: &[VerseTiming], key: VerseKey) -> Option<usize> {
    timings.binary_search_by(|t| t.verse_key.cmp(&key)).ok()
}

pub fn find_verse(timings: &[VerseTiming], key: VerseKey) -> Option<&VerseTiming> {
    index_of(timings, key).map(|idx| &timings[idx])
}

/// Finds the verse after or before `current`. Without a current verse the
/// first verse is treated as "next" and there is no "previous".
pub fn find_adjacent_verse(
    timings: &[VerseTiming],
    current: Option<VerseKey>,
    direction: Direction,
) -> Option<&VerseTiming> {
    let Some(current) = current else {
        return match direction {
            Direction::Next => timings.first(),
            Direction::Previous => None,
        };
    };
    let idx = index_of(timings, current)?;
    match direction {
        Direction::Next => timings.get(idx + 1),
        Direction::Previous => idx.checked_sub(1).and_then(|i| timings.get(i)),
    }
}

/// Returns `(start_ms, end_ms)` of a word for highlighting or click-to-seek.
pub fn find_word_segment(timings: &[VerseTiming], location: WordLocation) -> Option<(u64, u64)> {
    find_verse(timings, location.verse)?
        .segments
        .iter()
        .find(|s| s.word == location.word)
        .map(|s| (s.start_ms, s.end_ms))
}

/// Returns the word being recited at `position_ms` within a verse.
pub fn find_word_at(timing: &VerseTiming, position_ms: u64) -> Option<&WordSegment> {
    timing
        .segments
        .iter()
        .find(|s| s.start_ms <= position_ms && position_ms < s.end_ms)
}

/// Checks the ordering invariants every lookup relies on.
pub fn validate_timings(timings: &[VerseTiming]) -> Result<(), String> {
    for t in timings {
        if t.timestamp_from >= t.timestamp_to {
            return Err(format!(
                "verse {} has empty interval {}..{}",
                t.verse_key, t.timestamp_from, t.timestamp_to
            ));
        }
    }
    for pair in timings.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if a.verse_key >= b.verse_key {
            return Err(format!("verse {} listed after {}", b.verse_key, a.verse_key));
        }
        if b.timestamp_from < a.timestamp_to {
            return Err(format!("verse {} overlaps {}", b.verse_key, a.verse_key));
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Builds a contiguous table of `count` verses in chapter 1, each `len_ms` long.
    pub(crate) fn table(count: u16, len_ms: u64) -> Vec<VerseTiming> {
        (0..count)
            .map(|i| {
                let from = i as u64 * len_ms;
                VerseTiming {
                    verse_key: VerseKey::new(1, i + 1),
                    timestamp_from: from,
                    timestamp_to: from + len_ms,
                    segments: vec![
                        WordSegment { word: 1, start_ms: from, end_ms: from + len_ms / 2 },
                        WordSegment { word: 2, start_ms: from + len_ms / 2, end_ms: from + len_ms },
                    ],
                }
            })
            .collect()
    }

    #[test]
    fn finds_exactly_one_verse_inside_intervals() {
        let timings = table(300, 1000);
        for t in [0, 1, 999, 1000, 150_500, 299_999] {
            let hits: Vec<_> = timings
                .iter()
                .filter(|v| v.timestamp_from <= t && t < v.timestamp_to)
                .collect();
            assert_eq!(hits.len(), 1);
            assert_eq!(find_verse_at(&timings, t), Some(hits[0]));
        }
    }

    #[test]
    fn positions_outside_table_are_not_found() {
        let mut timings = table(3, 1000);
        for t in &mut timings {
            t.timestamp_from += 500;
            t.timestamp_to += 500;
        }
        assert_eq!(find_verse_at(&timings, 0), None);
        assert_eq!(find_verse_at(&timings, 499), None);
        assert_eq!(find_verse_at(&timings, 3500), None);
        assert_eq!(find_verse_at(&[], 10), None);
    }

    #[test]
    fn adjacent_verse_navigation() {
        let timings = table(3, 1000);
        let next = find_adjacent_verse(&timings, Some(VerseKey::new(1, 1)), Direction::Next);
        assert_eq!(next.map(|t| t.verse_key), Some(VerseKey::new(1, 2)));
        let prev = find_adjacent_verse(&timings, Some(VerseKey::new(1, 1)), Direction::Previous);
        assert_eq!(prev, None);
        let last = find_adjacent_verse(&timings, Some(VerseKey::new(1, 3)), Direction::Next);
        assert_eq!(last, None);
        let first = find_adjacent_verse(&timings, None, Direction::Next);
        assert_eq!(first.map(|t| t.verse_key), Some(VerseKey::new(1, 1)));
    }

    #[test]
    fn word_segments() {
        let timings = table(2, 1000);
        let loc = WordLocation { verse: VerseKey::new(1, 2), word: 2 };
        assert_eq!(find_word_segment(&timings, loc), Some((1500, 2000)));
        let missing = WordLocation { verse: VerseKey::new(1, 2), word: 9 };
        assert_eq!(find_word_segment(&timings, missing), None);
        assert_eq!(find_word_at(&timings[0], 700).map(|w| w.word), Some(2));
    }

    #[test]
    fn rejects_overlapping_tables() {
        let mut timings = table(3, 1000);
        assert!(validate_timings(&timings).is_ok());
        timings[1].timestamp_from = 900;
        assert!(validate_timings(&timings).is_err());
    }

    #[test]
    fn converts_seconds() {
        assert_eq!(secs_to_ms(1.5), 1500);
        assert_eq!(secs_to_ms(-3.0), 0);
        assert_eq!(secs_to_ms(f64::NAN), 0);
    }
}
