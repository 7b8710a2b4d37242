// player.rs: Async driver that owns the machine, the element and the timers

use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use tracing::{debug, info};

use crate::config::PlayerConfig;
use crate::element::{AudioElement, MediaEvent};
use crate::input::Shortcut;
use crate::machine::{Effect, Event, FetchTicket, Machine, SeekTarget};
use crate::recitation::{RecitationData, RecitationSource, ReciterId};
use crate::repeat::{RepeatError, RepeatSettings};
use crate::state::Snapshot;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlayerError {
    #[error("player has shut down")]
    Closed,
    #[error(transparent)]
    Repeat(#[from] RepeatError),
}

#[derive(Debug)]
enum Command {
    Event(Event),
    Shutdown,
}

type FetchResult = (u64, Result<Arc<RecitationData>, String>);

/// Drives one [`Machine`] against one element. Everything that touches the
/// element happens inside [`Player::run`], one event at a time.
pub struct Player<E, S> {
    machine: Machine,
    element: E,
    source: Arc<S>,
    commands: mpsc::Receiver<Command>,
    media: mpsc::Receiver<MediaEvent>,
    fetch_tx: mpsc::Sender<FetchResult>,
    fetch_rx: mpsc::Receiver<FetchResult>,
    fetch_task: Option<JoinHandle<()>>,
    resume: Option<(u64, Pin<Box<Sleep>>)>,
    snapshot: Snapshot,
    snapshot_tx: watch::Sender<Snapshot>,
}

impl<E: AudioElement, S: RecitationSource> Player<E, S> {
    pub fn new(
        config: &PlayerConfig,
        element: E,
        source: S,
        media: mpsc::Receiver<MediaEvent>,
    ) -> (Self, PlayerHandle) {
        let machine = Machine::new(config);
        let mut snapshot = Snapshot::default();
        snapshot.refresh(&machine);
        let (snapshot_tx, snapshot_rx) = watch::channel(snapshot.clone());
        let (cmd_tx, commands) = mpsc::channel(config.command_buffer.max(1));
        let (fetch_tx, fetch_rx) = mpsc::channel(4);

        let player = Self {
            machine,
            element,
            source: Arc::new(source),
            commands,
            media,
            fetch_tx,
            fetch_rx,
            fetch_task: None,
            resume: None,
            snapshot,
            snapshot_tx,
        };
        let handle = PlayerHandle {
            tx: cmd_tx,
            snapshot: snapshot_rx,
            seek_step: config.seek_step_secs,
        };
        (player, handle)
    }

    /// Processes commands, media events, fetch completions and the resume
    /// timer until shutdown or until every handle is dropped.
    pub async fn run(mut self) {
        info!("player started");
        loop {
            let event = tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Event(event)) => event,
                    Some(Command::Shutdown) | None => break,
                },
                Some(ev) = self.media.recv() => Event::from(ev),
                Some((id, result)) = self.fetch_rx.recv() => match result {
                    Ok(data) => Event::RecitationLoaded { id, data },
                    Err(reason) => Event::RecitationFailed { id, reason },
                },
                ticket = wait_resume(&mut self.resume) => Event::DelayElapsed { ticket },
            };
            if matches!(event, Event::DelayElapsed { .. }) {
                self.resume = None;
            }
            self.handle(event);
        }
        self.handle(Event::RequestClose);
        if let Some(task) = self.fetch_task.take() {
            task.abort();
        }
        info!("player stopped");
    }

    fn handle(&mut self, event: Event) {
        let element = self.element.snapshot();
        let effects = self.machine.step(event, &element);
        for effect in effects {
            self.execute(effect);
        }
        if self.snapshot.refresh(&self.machine) {
            self.snapshot_tx.send_replace(self.snapshot.clone());
        }
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::Fetch(ticket) => self.spawn_fetch(ticket),
            Effect::CancelFetch => {
                if let Some(task) = self.fetch_task.take() {
                    task.abort();
                }
            }
            Effect::BindSource { url, duration_hint } => {
                debug!(%url, "binding audio source");
                self.element.set_src(&url, duration_hint);
            }
            Effect::Unbind => self.element.set_src("", None),
            Effect::Play => self.element.play(),
            Effect::Pause => self.element.pause(),
            Effect::SetCurrentTime(secs) => self.element.set_current_time(secs),
            Effect::SetPlaybackRate(rate) => self.element.set_playback_rate(rate),
            Effect::ScheduleResume { ticket, delay } => {
                debug!(ticket, ?delay, "scheduling resume");
                self.resume = Some((ticket, Box::pin(tokio::time::sleep(delay))));
            }
            Effect::CancelResume => self.resume = None,
        }
    }

    fn spawn_fetch(&mut self, ticket: FetchTicket) {
        if let Some(task) = self.fetch_task.take() {
            task.abort();
        }
        let source = Arc::clone(&self.source);
        let tx = self.fetch_tx.clone();
        self.fetch_task = Some(tokio::spawn(async move {
            let result = source
                .fetch(ticket.reciter, ticket.chapter)
                .await
                .map(Arc::new)
                .map_err(|e| e.to_string());
            let _ = tx.send((ticket.id, result)).await;
        }));
    }
}

async fn wait_resume(resume: &mut Option<(u64, Pin<Box<Sleep>>)>) -> u64 {
    match resume {
        Some((ticket, sleep)) => {
            sleep.as_mut().await;
            *ticket
        }
        None => std::future::pending().await,
    }
}

/// Cloneable intent sender for UI code.
#[derive(Debug, Clone)]
pub struct PlayerHandle {
    tx: mpsc::Sender<Command>,
    snapshot: watch::Receiver<Snapshot>,
    seek_step: f64,
}

impl PlayerHandle {
    async fn send(&self, event: Event) -> Result<(), PlayerError> {
        self.tx
            .send(Command::Event(event))
            .await
            .map_err(|_| PlayerError::Closed)
    }

    /// Plays `chapter` from `verse`; with neither, resumes the current target.
    pub async fn request_play(&self, chapter: Option<u16>, verse: Option<u16>) -> Result<(), PlayerError> {
        self.send(Event::RequestPlay { chapter, verse }).await
    }

    pub async fn request_pause(&self) -> Result<(), PlayerError> {
        self.send(Event::RequestPause).await
    }

    pub async fn toggle(&self) -> Result<(), PlayerError> {
        self.send(Event::RequestToggle).await
    }

    pub async fn seek(&self, target: SeekTarget) -> Result<(), PlayerError> {
        self.send(Event::RequestSeek(target)).await
    }

    pub async fn request_next_ayah(&self) -> Result<(), PlayerError> {
        self.send(Event::RequestNextAyah).await
    }

    pub async fn request_previous_ayah(&self) -> Result<(), PlayerError> {
        self.send(Event::RequestPreviousAyah).await
    }

    pub async fn request_change_reciter(&self, reciter: ReciterId) -> Result<(), PlayerError> {
        self.send(Event::RequestChangeReciter(reciter)).await
    }

    /// Enters repeat mode, or leaves it with `None`. Settings that can never
    /// be valid are rejected here before reaching the player.
    pub async fn request_repeat(&self, settings: Option<RepeatSettings>) -> Result<(), PlayerError> {
        if let Some(settings) = &settings {
            settings.validate()?;
        }
        self.send(Event::RequestRepeat(settings)).await
    }

    pub async fn set_playback_rate(&self, rate: f64) -> Result<(), PlayerError> {
        self.send(Event::RequestPlaybackRate(rate)).await
    }

    pub async fn close(&self) -> Result<(), PlayerError> {
        self.send(Event::RequestClose).await
    }

    pub async fn apply_shortcut(&self, shortcut: Shortcut) -> Result<(), PlayerError> {
        self.send(shortcut.to_event(self.seek_step)).await
    }

    /// Stops the driver; later intents fail with [`PlayerError::Closed`].
    pub async fn shutdown(&self) -> Result<(), PlayerError> {
        self.tx.send(Command::Shutdown).await.map_err(|_| PlayerError::Closed)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::fake::FakeElement;
    use crate::element::{ElementSnapshot, ReadyState};
    use crate::recitation::{RecitationError, VerseKey};
    use crate::timing::tests::table;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Lets the test inspect the element while the player owns it.
    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<FakeElement>>);

    impl Shared {
        fn with<T>(&self, f: impl FnOnce(&mut FakeElement) -> T) -> T {
            f(&mut self.0.lock().unwrap())
        }
    }

    impl AudioElement for Shared {
        fn play(&mut self) {
            self.with(|el| el.play())
        }
        fn pause(&mut self) {
            self.with(|el| el.pause())
        }
        fn paused(&self) -> bool {
            self.with(|el| el.paused())
        }
        fn current_time(&self) -> f64 {
            self.with(|el| el.current_time())
        }
        fn set_current_time(&mut self, secs: f64) {
            self.with(|el| el.set_current_time(secs))
        }
        fn duration(&self) -> f64 {
            self.with(|el| el.duration())
        }
        fn src(&self) -> String {
            self.with(|el| el.src())
        }
        fn set_src(&mut self, url: &str, duration_hint: Option<f64>) {
            self.with(|el| el.set_src(url, duration_hint))
        }
        fn ready_state(&self) -> ReadyState {
            self.with(|el| el.ready_state())
        }
        fn set_playback_rate(&mut self, rate: f64) {
            self.with(|el| el.set_playback_rate(rate))
        }
        fn snapshot(&self) -> ElementSnapshot {
            self.with(|el| el.snapshot())
        }
    }

    /// Answers after `latency`; chapter 99 does not exist.
    struct ScriptedSource {
        latency: Duration,
        calls: Arc<AtomicUsize>,
    }

    impl RecitationSource for ScriptedSource {
        async fn fetch(&self, reciter: ReciterId, chapter: u16) -> Result<RecitationData, RecitationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.latency).await;
            if chapter == 99 {
                return Err(RecitationError::NotFound { reciter, chapter });
            }
            let mut verse_timings = table(3, 2000);
            for t in &mut verse_timings {
                t.verse_key = VerseKey::new(chapter, t.verse_key.verse);
            }
            Ok(RecitationData {
                audio_url: format!("https://audio.example.org/{reciter}/{chapter}.mp3"),
                chapter_id: chapter,
                verse_timings,
            })
        }
    }

    struct Harness {
        element: Shared,
        handle: PlayerHandle,
        media: mpsc::Sender<MediaEvent>,
        calls: Arc<AtomicUsize>,
    }

    fn start(latency: Duration) -> Harness {
        let element = Shared::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let source = ScriptedSource { latency, calls: Arc::clone(&calls) };
        let (media, media_rx) = mpsc::channel(16);
        let (player, handle) = Player::new(&PlayerConfig::default(), element.clone(), source, media_rx);
        tokio::spawn(player.run());
        Harness { element, handle, media, calls }
    }

    async fn wait_state(handle: &PlayerHandle, state: &str) -> Snapshot {
        let mut rx = handle.subscribe();
        let snap = rx.wait_for(|s| s.state == state).await.unwrap().clone();
        snap
    }

    /// Marks the element buffered and tells the player.
    async fn can_play(h: &Harness) {
        h.element.with(|el| el.state.ready_state = ReadyState::HaveEnoughData);
        h.media.send(MediaEvent::CanPlay).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn plays_after_fetch_and_can_play() {
        let h = start(Duration::from_millis(200));
        h.handle.request_play(Some(1), Some(1)).await.unwrap();

        wait_state(&h.handle, "loading.waitingCanPlay").await;
        assert_eq!(h.element.with(|el| el.state.src.clone()), "https://audio.example.org/7/1.mp3");
        assert_eq!(h.element.with(|el| el.play_calls), 0);

        can_play(&h).await;
        let snap = wait_state(&h.handle, "ready.playing").await;
        assert!(snap.is_playing);
        assert_eq!(snap.verse, Some(VerseKey::new(1, 1)));
        assert_eq!(h.element.with(|el| el.play_calls), 1);
        assert_eq!(h.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_fetch_never_lands() {
        let h = start(Duration::from_millis(500));
        h.handle.request_play(Some(1), None).await.unwrap();
        h.handle.request_play(Some(2), None).await.unwrap();

        let snap = wait_state(&h.handle, "loading.waitingCanPlay").await;
        assert_eq!(snap.chapter, Some(2));
        assert_eq!(h.element.with(|el| el.state.src.clone()), "https://audio.example.org/7/2.mp3");

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(h.handle.snapshot().state, "loading.waitingCanPlay");
        assert_eq!(h.element.with(|el| el.state.src.clone()), "https://audio.example.org/7/2.mp3");
    }

    #[tokio::test(start_paused = true)]
    async fn missing_chapter_surfaces_failure() {
        let h = start(Duration::from_millis(10));
        h.handle.request_play(Some(99), None).await.unwrap();
        let snap = wait_state(&h.handle, "failure").await;
        assert!(snap.has_failed);
        assert!(snap.failure.unwrap().contains("chapter 99"));
    }

    #[tokio::test(start_paused = true)]
    async fn reflection_delay_resumes_once() {
        let h = start(Duration::from_millis(10));
        h.handle.request_play(Some(1), Some(1)).await.unwrap();
        wait_state(&h.handle, "loading.waitingCanPlay").await;
        can_play(&h).await;
        wait_state(&h.handle, "ready.playing").await;

        let verse = VerseKey::new(1, 1);
        let settings = RepeatSettings { repeat_each_verse: 2, delay_multiplier: 0.5, ..RepeatSettings::single_verse(verse, 1) };
        h.handle.request_repeat(Some(settings)).await.unwrap();
        let mut rx = h.handle.subscribe();
        rx.wait_for(|s| s.repeat.is_some()).await.unwrap();
        assert_eq!(h.element.with(|el| el.play_calls), 2);

        h.element.with(|el| el.state.current_time = 2.0);
        h.media.send(MediaEvent::TimeUpdate).await.unwrap();
        let paused_at = tokio::time::Instant::now();
        wait_state(&h.handle, "ready.paused").await;
        assert_eq!(h.element.with(|el| el.seeks.last().copied()), Some(0.0));

        wait_state(&h.handle, "ready.playing").await;
        assert!(paused_at.elapsed() >= Duration::from_millis(1000));
        assert_eq!(h.element.with(|el| el.play_calls), 3);
    }

    #[tokio::test]
    async fn handle_reports_closed_player() {
        let (_media_tx, media_rx) = mpsc::channel(1);
        let source = ScriptedSource { latency: Duration::ZERO, calls: Arc::default() };
        let (player, handle) = Player::new(&PlayerConfig::default(), Shared::default(), source, media_rx);

        let bad = RepeatSettings { repeat_range: 0, ..RepeatSettings::single_verse(VerseKey::new(1, 1), 1) };
        assert!(matches!(
            handle.request_repeat(Some(bad)).await,
            Err(PlayerError::Repeat(RepeatError::InvalidSettings(_)))
        ));

        drop(player);
        assert_eq!(handle.request_pause().await, Err(PlayerError::Closed));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_the_driver() {
        let h = start(Duration::from_millis(10));
        h.handle.shutdown().await.unwrap();
        let mut rx = h.handle.subscribe();
        // the sender is dropped when the driver exits
        assert!(rx.changed().await.is_err());
        assert_eq!(h.handle.toggle().await, Err(PlayerError::Closed));
    }
}
