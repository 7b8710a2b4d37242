use std::future::Future;

use crate::recitation::parse::parse_audio_files;
use crate::recitation::types::{http_client, RecitationData, RecitationError, ReciterId};

pub const DEFAULT_API_BASE: &str = "https://api.qurancdn.com/api/qdc";

/// Anything that can resolve recitation metadata for a (reciter, chapter) pair.
///
/// The player spawns fetches onto the runtime, so futures must be `Send`.
pub trait RecitationSource: Send + Sync + 'static {
    fn fetch(
        &self,
        reciter: ReciterId,
        chapter: u16,
    ) -> impl Future<Output = Result<RecitationData, RecitationError>> + Send;
}

/// Fetches chapter audio and verse timings from the Quran.com audio API.
#[derive(Debug, Clone)]
pub struct QuranComSource {
    api_base: String,
}

impl QuranComSource {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self { api_base: api_base.into().trim_end_matches('/').to_string() }
    }
}

impl Default for QuranComSource {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE)
    }
}

/// Build the audio files URL for a chapter with word segments included.
fn build_audio_files_url(api_base: &str, reciter: ReciterId, chapter: u16) -> String {
    format!("{api_base}/audio/reciters/{reciter}/audio_files?chapter={chapter}&segments=true")
}

impl RecitationSource for QuranComSource {
    async fn fetch(&self, reciter: ReciterId, chapter: u16) -> Result<RecitationData, RecitationError> {
        let url = build_audio_files_url(&self.api_base, reciter, chapter);
        tracing::debug!(%url, "fetching recitation");

        let resp = http_client().get(&url).send().await?;

        if resp.status().as_u16() == 404 {
            return Err(RecitationError::NotFound { reciter, chapter });
        }
        if !resp.status().is_success() {
            return Err(RecitationError::Api(format!("audio_files: HTTP {}", resp.status())));
        }

        let body = resp.text().await?;
        parse_audio_files(&body, reciter, chapter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_url_without_double_slash() {
        let source = QuranComSource::new("https://api.example.org/qdc/");
        assert_eq!(
            build_audio_files_url(&source.api_base, 7, 112),
            "https://api.example.org/qdc/audio/reciters/7/audio_files?chapter=112&segments=true"
        );
    }
}
