mod ui;

use ayah_player::element::SimulatedElement;
use ayah_player::recitation::{
    CachedSource, ParseKeyError, QuranComSource, RecitationSource, ReciterId, VerseKey,
};
use ayah_player::repeat::RepeatSettings;
use ayah_player::{Player, PlayerConfig};
use clap::Parser;
use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Used only when a source is bound without timing data.
const FALLBACK_DURATION_SECS: f64 = 600.0;

/// `chapter:verse-chapter:verse`, or a single `chapter:verse`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct VerseRange {
    start: VerseKey,
    end: VerseKey,
}

fn parse_range(s: &str) -> Result<VerseRange, ParseKeyError> {
    match s.split_once('-') {
        Some((start, end)) => Ok(VerseRange { start: start.parse()?, end: end.parse()? }),
        None => {
            let key: VerseKey = s.parse()?;
            Ok(VerseRange { start: key, end: key })
        }
    }
}

/// Application configuration from CLI
#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct Config {
    /// Chapter (surah) to play
    #[arg(long, default_value_t = 1)]
    chapter: u16,
    /// Verse to start from (defaults to the start of the audio)
    #[arg(long)]
    verse: Option<u16>,
    /// Reciter id. If unset, the QURAN_RECITER env var will be used as a fallback.
    #[arg(long)]
    reciter: Option<ReciterId>,
    /// Times each verse is played
    #[arg(long, default_value_t = 1)]
    repeat_each: u32,
    /// Times the whole range is played
    #[arg(long, default_value_t = 1)]
    repeat_range: u32,
    /// Range to repeat, e.g. "2:255-2:257"
    #[arg(long, value_parser = parse_range)]
    range: Option<VerseRange>,
    /// Reflection pause between passes, as a multiple of the verse length
    #[arg(long, default_value_t = 0.0)]
    delay: f64,
    /// Playback rate
    #[arg(long, default_value_t = 1.0)]
    rate: f64,
    /// Path to local recitation database (optional)
    #[arg(long)]
    database: Option<PathBuf>,
    /// Audio API base URL (falls back to QURAN_API_BASE)
    #[arg(long)]
    api_base: Option<String>,
    /// Simulated element clock step in milliseconds
    #[arg(long, default_value_t = 250)]
    tick_ms: u64,
    /// Enable debug logging to stderr
    #[arg(long)]
    pub debug_log: bool,
}

impl Config {
    /// Repeat settings when any repeat option was given.
    fn repeat_settings(&self) -> Option<RepeatSettings> {
        let wants_repeat = self.range.is_some() || self.repeat_each > 1 || self.repeat_range > 1;
        if !wants_repeat {
            return None;
        }
        let start = VerseKey::new(self.chapter, self.verse.unwrap_or(1));
        let range = self.range.unwrap_or(VerseRange { start, end: start });
        Some(RepeatSettings {
            repeat_each_verse: self.repeat_each,
            repeat_range: self.repeat_range,
            delay_multiplier: self.delay,
            range_start: range.start,
            range_end: range.end,
        })
    }
}

fn reciter_from_env_if_empty(cli: &mut Config) {
    if cli.reciter.is_none()
        && let Ok(s) = std::env::var("QURAN_RECITER")
        && let Ok(id) = s.trim().parse::<ReciterId>()
    {
        cli.reciter = Some(id);
    }
}

fn init_tracing(debug_log: bool) {
    let filter = if debug_log {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into())
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn play<S: RecitationSource>(
    cfg: &Config,
    player_cfg: &PlayerConfig,
    source: S,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let element = SimulatedElement::new(FALLBACK_DURATION_SECS);
    let (media_tx, media_rx) = mpsc::channel(64);
    let clock = element.spawn_clock(media_tx, Duration::from_millis(cfg.tick_ms.max(10)));

    let (player, handle) = Player::new(player_cfg, element, source, media_rx);
    let driver = tokio::spawn(player.run());

    if cfg.rate != 1.0 {
        handle.set_playback_rate(cfg.rate).await?;
    }
    match cfg.repeat_settings() {
        Some(settings) => handle.request_repeat(Some(settings)).await?,
        None => handle.request_play(Some(cfg.chapter), cfg.verse).await?,
    }

    let result = tokio::select! {
        r = crate::ui::pipe::display_verses_pipe(&handle) => r,
        _ = tokio::signal::ctrl_c() => Ok(()),
    };

    let _ = handle.shutdown().await;
    let _ = driver.await;
    clock.abort();
    result
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let mut cfg = Config::parse();
    reciter_from_env_if_empty(&mut cfg);
    init_tracing(cfg.debug_log);

    let mut player_cfg = PlayerConfig::from_env();
    if let Some(base) = &cfg.api_base {
        player_cfg.api_base = base.clone();
    }
    if let Some(reciter) = cfg.reciter {
        player_cfg.default_reciter = reciter;
    }

    let remote = QuranComSource::new(player_cfg.api_base.clone());
    let result = match cfg.database.clone() {
        Some(path) => play(&cfg, &player_cfg, CachedSource::open(remote, path).await).await,
        None => play(&cfg, &player_cfg, remote).await,
    };

    // Print error if any, for better diagnostics
    if let Err(e) = result {
        eprintln!("Error: {}", e);
        return Err(e);
    }
    Ok(())
}
