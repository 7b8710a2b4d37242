//! A software media element for hosts without a real audio backend.
//!
//! It keeps a clock instead of decoding audio: `spawn_clock` periodically
//! advances it and emits the same events a browser element would.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{AudioElement, MediaEvent, ReadyState};
use crate::timer::{sanitize_position, PlaybackTimer};

#[derive(Debug)]
struct Inner {
    src: String,
    duration: f64,
    ready_state: ReadyState,
    timer: PlaybackTimer,
    paused: bool,
    seek_pending: bool,
}

impl Inner {
    fn position(&self) -> f64 {
        let pos = self.timer.estimate();
        if self.duration.is_finite() { pos.min(self.duration) } else { pos }
    }
}

/// Cloneable handle; clones share one element.
#[derive(Debug, Clone)]
pub struct SimulatedElement {
    inner: Arc<Mutex<Inner>>,
    fallback_duration: f64,
}

impl SimulatedElement {
    /// `fallback_duration` is used when a source is bound without a hint.
    pub fn new(fallback_duration: f64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                src: String::new(),
                duration: f64::NAN,
                ready_state: ReadyState::HaveNothing,
                timer: PlaybackTimer::new(),
                paused: true,
                seek_pending: false,
            })),
            fallback_duration,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Advances the element by one clock step and returns the events it fired.
    pub fn tick(&self) -> Vec<MediaEvent> {
        let mut events = Vec::new();
        let mut inner = self.lock();
        if inner.src.is_empty() {
            return events;
        }
        if inner.ready_state < ReadyState::HaveEnoughData {
            inner.ready_state = ReadyState::HaveEnoughData;
            events.push(MediaEvent::CanPlay);
        }
        if inner.seek_pending {
            inner.seek_pending = false;
            events.push(MediaEvent::Seeked);
        }
        if !inner.paused {
            let position = inner.position();
            let duration = inner.duration;
            events.push(MediaEvent::TimeUpdate);
            if duration.is_finite() && position >= duration {
                inner.timer.mark_paused();
                inner.timer.set_position(duration);
                inner.paused = true;
                events.push(MediaEvent::Ended);
            }
        }
        events
    }

    /// Drives the element every `step`, forwarding events until the receiver
    /// goes away.
    pub fn spawn_clock(&self, tx: mpsc::Sender<MediaEvent>, step: Duration) -> JoinHandle<()> {
        let element = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(step);
            loop {
                interval.tick().await;
                for event in element.tick() {
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
            }
        })
    }
}

impl AudioElement for SimulatedElement {
    fn play(&mut self) {
        let mut inner = self.lock();
        if inner.src.is_empty() {
            return;
        }
        inner.paused = false;
        inner.timer.mark_playing();
    }

    fn pause(&mut self) {
        let mut inner = self.lock();
        inner.paused = true;
        inner.timer.mark_paused();
    }

    fn paused(&self) -> bool {
        self.lock().paused
    }

    fn current_time(&self) -> f64 {
        self.lock().position()
    }

    fn set_current_time(&mut self, secs: f64) {
        let mut inner = self.lock();
        let mut target = sanitize_position(secs);
        if inner.duration.is_finite() {
            target = target.min(inner.duration);
        }
        inner.timer.set_position(target);
        inner.seek_pending = true;
    }

    fn duration(&self) -> f64 {
        self.lock().duration
    }

    fn src(&self) -> String {
        self.lock().src.clone()
    }

    fn set_src(&mut self, url: &str, duration_hint: Option<f64>) {
        let fallback = self.fallback_duration;
        let mut inner = self.lock();
        inner.src = url.to_string();
        inner.paused = true;
        inner.seek_pending = false;
        inner.timer.mark_paused();
        inner.timer.set_position(0.0);
        if url.is_empty() {
            inner.ready_state = ReadyState::HaveNothing;
            inner.duration = f64::NAN;
        } else {
            inner.ready_state = ReadyState::HaveMetadata;
            inner.duration = duration_hint.unwrap_or(fallback);
        }
    }

    fn ready_state(&self) -> ReadyState {
        self.lock().ready_state
    }

    fn set_playback_rate(&mut self, rate: f64) {
        self.lock().timer.set_rate(rate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn becomes_ready_then_plays_to_end() {
        let mut el = SimulatedElement::new(60.0);
        el.set_src("https://audio.example.org/1.mp3", Some(2.0));
        assert_eq!(el.ready_state(), ReadyState::HaveMetadata);
        assert_eq!(el.tick(), vec![MediaEvent::CanPlay]);

        el.play();
        tokio::time::advance(Duration::from_millis(1000)).await;
        assert_eq!(el.tick(), vec![MediaEvent::TimeUpdate]);
        assert!((el.current_time() - 1.0).abs() < 1e-6);

        tokio::time::advance(Duration::from_millis(1500)).await;
        assert_eq!(el.tick(), vec![MediaEvent::TimeUpdate, MediaEvent::Ended]);
        assert!(el.paused());
        assert_eq!(el.current_time(), 2.0);
    }

    #[tokio::test(start_paused = true)]
    async fn seeking_reports_seeked_and_clamps() {
        let mut el = SimulatedElement::new(60.0);
        el.set_src("a.mp3", None);
        el.tick();
        el.set_current_time(90.0);
        assert_eq!(el.tick(), vec![MediaEvent::Seeked]);
        assert_eq!(el.current_time(), 60.0);
    }

    #[test]
    fn play_without_source_is_ignored() {
        let mut el = SimulatedElement::new(10.0);
        el.play();
        assert!(el.paused());
        assert!(el.tick().is_empty());
    }
}
