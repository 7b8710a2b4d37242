use serde::Deserialize;

use crate::recitation::types::{
    RecitationData, RecitationError, ReciterId, VerseKey, VerseTiming, WordSegment,
};
use crate::timing::validate_timings;

#[derive(Deserialize)]
struct AudioFilesResponse {
    #[serde(default)]
    audio_files: Vec<AudioFile>,
}

#[derive(Deserialize)]
struct AudioFile {
    chapter_id: u16,
    audio_url: String,
    #[serde(default)]
    verse_timings: Vec<RawVerseTiming>,
}

#[derive(Deserialize)]
struct RawVerseTiming {
    verse_key: VerseKey,
    timestamp_from: u64,
    timestamp_to: u64,
    /// `[word, start_ms, end_ms]` triples; the backend occasionally emits
    /// shorter rows which are skipped.
    #[serde(default)]
    segments: Vec<Vec<f64>>,
}

fn to_segment(row: &[f64]) -> Option<WordSegment> {
    let [word, start, end, ..] = row else {
        return None;
    };
    if !(word.is_finite() && start.is_finite() && end.is_finite()) || *word < 1.0 || start > end {
        return None;
    }
    Some(WordSegment {
        word: *word as u16,
        start_ms: start.round() as u64,
        end_ms: end.round() as u64,
    })
}

/// Decode an `audio_files` payload into recitation data for one chapter.
pub fn parse_audio_files(
    body: &str,
    reciter: ReciterId,
    chapter: u16,
) -> Result<RecitationData, RecitationError> {
    let response: AudioFilesResponse = serde_json::from_str(body)?;
    let file = response
        .audio_files
        .into_iter()
        .find(|f| f.chapter_id == chapter)
        .ok_or(RecitationError::NotFound { reciter, chapter })?;

    let mut verse_timings: Vec<VerseTiming> = file
        .verse_timings
        .into_iter()
        .map(|raw| VerseTiming {
            verse_key: raw.verse_key,
            timestamp_from: raw.timestamp_from,
            timestamp_to: raw.timestamp_to,
            segments: raw.segments.iter().filter_map(|row| to_segment(row)).collect(),
        })
        .collect();
    verse_timings.sort_by_key(|t| t.timestamp_from);

    if let Some(stray) = verse_timings.iter().find(|t| t.verse_key.chapter != chapter) {
        return Err(RecitationError::InvalidTimings(format!(
            "verse {} does not belong to chapter {}",
            stray.verse_key, chapter
        )));
    }
    validate_timings(&verse_timings).map_err(RecitationError::InvalidTimings)?;

    Ok(RecitationData {
        audio_url: file.audio_url,
        chapter_id: file.chapter_id,
        verse_timings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload() -> serde_json::Value {
        json!({
            "audio_files": [{
                "id": 43,
                "chapter_id": 1,
                "file_size": 710_784,
                "format": "mp3",
                "audio_url": "https://download.example.org/7/1.mp3",
                "verse_timings": [
                    {
                        "verse_key": "1:2",
                        "timestamp_from": 6493,
                        "timestamp_to": 11840,
                        "segments": [[1, 6493, 7200], [2, 7200.4, 8000]]
                    },
                    {
                        "verse_key": "1:1",
                        "timestamp_from": 0,
                        "timestamp_to": 6493,
                        "segments": [[1, 0, 630], [2], [3, 1280, 2500]]
                    }
                ]
            }]
        })
    }

    #[test]
    fn decodes_and_sorts_timings() {
        let data = parse_audio_files(&payload().to_string(), 7, 1).unwrap();
        assert_eq!(data.audio_url, "https://download.example.org/7/1.mp3");
        assert_eq!(data.verse_timings.len(), 2);
        assert_eq!(data.verse_timings[0].verse_key, VerseKey::new(1, 1));
        // short segment rows are skipped
        assert_eq!(data.verse_timings[0].segments.len(), 2);
        assert_eq!(data.verse_timings[1].segments[1].start_ms, 7200);
    }

    #[test]
    fn missing_chapter_is_not_found() {
        let err = parse_audio_files(&payload().to_string(), 7, 2).unwrap_err();
        assert!(matches!(err, RecitationError::NotFound { reciter: 7, chapter: 2 }));
    }

    #[test]
    fn overlapping_timings_are_rejected() {
        let mut body = payload();
        body["audio_files"][0]["verse_timings"][0]["timestamp_from"] = json!(6000);
        let err = parse_audio_files(&body.to_string(), 7, 1).unwrap_err();
        assert!(matches!(err, RecitationError::InvalidTimings(_)));
    }

    #[test]
    fn malformed_json_is_a_serde_error() {
        let err = parse_audio_files("{\"audio_files\": 3}", 7, 1).unwrap_err();
        assert!(matches!(err, RecitationError::Serde(_)));
    }
}
