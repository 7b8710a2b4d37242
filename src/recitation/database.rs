//! Local recitation database.
//!
//! A JSON file cache of recitation metadata keyed by reciter and chapter, so
//! a chapter that was played once starts without a network round-trip.
//!
//! ```text
//! fetch(reciter, chapter)
//!        │
//!        ▼
//!  database lookup ──── hit ────▶ return cached data
//!        │ miss
//!        ▼
//!  inner source fetch ──▶ store + save ──▶ return
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::recitation::provider::RecitationSource;
use crate::recitation::types::{RecitationData, RecitationError, ReciterId};

/// In-memory database structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RecitationDatabase {
    entries: HashMap<String, RecitationData>,
}

impl RecitationDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Format: `reciter|chapter`
    fn cache_key(reciter: ReciterId, chapter: u16) -> String {
        format!("{reciter}|{chapter}")
    }

    pub fn get(&self, reciter: ReciterId, chapter: u16) -> Option<&RecitationData> {
        self.entries.get(&Self::cache_key(reciter, chapter))
    }

    /// Overwrites existing entries with the same key.
    pub fn insert(&mut self, reciter: ReciterId, chapter: u16, data: RecitationData) {
        self.entries.insert(Self::cache_key(reciter, chapter), data);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Loads the database from a JSON file.
///
/// Returns a new empty database if the file doesn't exist or is invalid.
pub async fn load_database(path: &Path) -> RecitationDatabase {
    match load_database_inner(path).await {
        Ok(db) => {
            if !db.is_empty() {
                tracing::info!(path = %path.display(), entries = db.len(), "Loaded recitation database");
            }
            db
        }
        Err(LoadError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "Creating new recitation database");
            RecitationDatabase::new()
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Failed to load database, using empty database"
            );
            RecitationDatabase::new()
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

async fn load_database_inner(path: &Path) -> Result<RecitationDatabase, LoadError> {
    let mut file = fs::File::open(path).await?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).await?;
    Ok(serde_json::from_str(&contents)?)
}

/// Saves the database to a JSON file, creating parent directories.
pub async fn save_database(db: &RecitationDatabase, path: &Path) -> Result<(), LoadError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let json = serde_json::to_string_pretty(db)?;
    let mut file = fs::File::create(path).await?;
    file.write_all(json.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

/// A [`RecitationSource`] that consults the database before `inner`.
pub struct CachedSource<S> {
    inner: S,
    db: Arc<Mutex<RecitationDatabase>>,
    path: PathBuf,
}

impl<S: RecitationSource> CachedSource<S> {
    pub async fn open(inner: S, path: PathBuf) -> Self {
        let db = load_database(&path).await;
        Self { inner, db: Arc::new(Mutex::new(db)), path }
    }
}

impl<S: RecitationSource> RecitationSource for CachedSource<S> {
    async fn fetch(&self, reciter: ReciterId, chapter: u16) -> Result<RecitationData, RecitationError> {
        if let Some(hit) = self.db.lock().await.get(reciter, chapter) {
            tracing::info!(reciter, chapter, "recitation database hit");
            return Ok(hit.clone());
        }

        let data = self.inner.fetch(reciter, chapter).await?;

        let mut guard = self.db.lock().await;
        guard.insert(reciter, chapter, data.clone());
        if let Err(e) = save_database(&guard, &self.path).await {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to save database");
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recitation::types::VerseKey;
    use crate::recitation::VerseTiming;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource(Arc<AtomicUsize>);

    impl RecitationSource for CountingSource {
        async fn fetch(&self, _reciter: ReciterId, chapter: u16) -> Result<RecitationData, RecitationError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(RecitationData {
                audio_url: format!("https://audio.example.org/{chapter}.mp3"),
                chapter_id: chapter,
                verse_timings: vec![VerseTiming {
                    verse_key: VerseKey::new(chapter, 1),
                    timestamp_from: 0,
                    timestamp_to: 4000,
                    segments: Vec::new(),
                }],
            })
        }
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("ayah-player-{}-{name}.json", std::process::id()))
    }

    #[tokio::test]
    async fn second_fetch_is_served_from_disk() {
        let path = temp_path("cache");
        let _ = fs::remove_file(&path).await;
        let calls = Arc::new(AtomicUsize::new(0));

        let source = CachedSource::open(CountingSource(calls.clone()), path.clone()).await;
        source.fetch(7, 112).await.unwrap();
        source.fetch(7, 112).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // a fresh source reads the persisted file
        let reopened = CachedSource::open(CountingSource(calls.clone()), path.clone()).await;
        let data = reopened.fetch(7, 112).await.unwrap();
        assert_eq!(data.chapter_id, 112);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let _ = fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn corrupt_file_loads_empty() {
        let path = temp_path("corrupt");
        fs::write(&path, b"not json").await.unwrap();
        assert!(load_database(&path).await.is_empty());
        let _ = fs::remove_file(&path).await;
    }
}
