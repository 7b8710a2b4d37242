//! Playback state machine.
//!
//! [`Machine::step`] takes one event plus a snapshot of the element's
//! properties and returns the effects to run on the element. It never touches
//! the element itself, which keeps every transition testable with plain
//! values. Loading is re-evaluated with a fixed guard order: identifiers,
//! then metadata, then element readiness, then play.

pub mod context;
pub mod event;
pub mod state;

use std::sync::Arc;
use tracing::{debug, info, warn};

pub use context::{PlaybackContext, PlaybackFailure};
pub use event::{Effect, Event, FetchTicket, SeekTarget};
pub use state::{LoadingSubState, PlaybackState, ReadySubState};

use crate::config::{PlayerConfig, RangeEndAction};
use crate::element::{ElementSnapshot, ReadyState};
use crate::recitation::{RecitationData, VerseKey, VerseTiming, WordSegment};
use crate::repeat::{RepeatAction, RepeatOutcome, RepeatSession, RepeatSettings};
use crate::timing::{
    find_adjacent_verse, find_verse, find_verse_at, find_word_at, find_word_segment, secs_to_ms,
    Direction,
};

#[derive(Debug)]
pub struct Machine {
    state: PlaybackState,
    ctx: PlaybackContext,
    range_end_action: RangeEndAction,
    next_request_id: u64,
    next_delay_ticket: u64,
    /// An `Unbind` was issued during this step; the snapshot's `src` is stale.
    source_unbound: bool,
}

impl Machine {
    pub fn new(config: &PlayerConfig) -> Self {
        Self {
            state: PlaybackState::Closed,
            ctx: PlaybackContext::new(Some(config.default_reciter), config.cache_capacity),
            range_end_action: config.range_end_action,
            next_request_id: 0,
            next_delay_ticket: 0,
            source_unbound: false,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn context(&self) -> &PlaybackContext {
        &self.ctx
    }

    fn timings(&self) -> Option<&[VerseTiming]> {
        self.ctx.matching_recitation().map(|d| d.verse_timings.as_slice())
    }

    pub fn active_verse(&self) -> Option<&VerseTiming> {
        find_verse_at(self.timings()?, secs_to_ms(self.ctx.elapsed_secs))
    }

    pub fn active_word(&self) -> Option<&WordSegment> {
        find_word_at(self.active_verse()?, secs_to_ms(self.ctx.elapsed_secs))
    }

    /// Processes one event to completion.
    pub fn step(&mut self, event: Event, el: &ElementSnapshot) -> Vec<Effect> {
        let from = self.state;
        let name = event.name();
        let mut fx = Vec::new();
        self.source_unbound = false;
        self.dispatch(event, el, &mut fx);
        if from != self.state {
            debug!(event = name, from = %from, to = %self.state, "transition");
        }
        fx
    }

    fn dispatch(&mut self, event: Event, el: &ElementSnapshot, fx: &mut Vec<Effect>) {
        match event {
            Event::RequestPlay { chapter, verse } => self.request_play(chapter, verse, el, fx),
            Event::RequestPause => self.request_pause(el, fx),
            Event::RequestToggle => {
                let wants_pause = self.state.is_playing()
                    || (matches!(self.state, PlaybackState::Loading(_))
                        && self.ctx.resume_sub_state != Some(ReadySubState::Paused));
                if wants_pause {
                    self.request_pause(el, fx);
                } else {
                    self.request_play(None, None, el, fx);
                }
            }
            Event::RequestSeek(target) => self.request_seek(target, el, fx),
            Event::RequestNextAyah => self.navigate(Direction::Next, el, fx),
            Event::RequestPreviousAyah => self.navigate(Direction::Previous, el, fx),
            Event::RequestChangeReciter(reciter) => self.change_reciter(reciter, el, fx),
            Event::RequestRepeat(settings) => self.request_repeat(settings, el, fx),
            Event::RequestPlaybackRate(rate) => {
                if !(rate.is_finite() && rate > 0.0) {
                    self.ctx.config_error = Some(format!("invalid playback rate {rate}"));
                    return;
                }
                self.ctx.playback_rate = rate;
                if el.has_source() {
                    fx.push(Effect::SetPlaybackRate(rate));
                }
            }
            Event::RequestClose => self.close(el, fx),
            Event::RecitationLoaded { id, data } => self.recitation_loaded(id, data, el, fx),
            Event::RecitationFailed { id, reason } => {
                if self.ctx.request.map(|t| t.id) != Some(id) {
                    debug!(id, "ignoring stale recitation failure");
                    return;
                }
                self.ctx.request = None;
                if self.state == PlaybackState::Loading(LoadingSubState::WaitingData) {
                    self.fail(PlaybackFailure::Fetch(reason), fx);
                }
            }
            Event::CanPlay | Event::Seeked => match self.state {
                PlaybackState::Loading(LoadingSubState::WaitingCanPlay) => {
                    self.evaluate_loading(el, fx)
                }
                PlaybackState::Ready(_) => {
                    self.ctx.set_position(el.current_time, el.known_duration())
                }
                _ => {}
            },
            Event::CurrentTimeChanged => self.time_changed(el, fx),
            Event::Buffering => {
                if self.state == PlaybackState::Ready(ReadySubState::Playing) {
                    self.state = PlaybackState::Ready(ReadySubState::Buffering);
                }
            }
            Event::Played => {
                if self.state == PlaybackState::Ready(ReadySubState::Buffering) {
                    self.state = PlaybackState::Ready(ReadySubState::Playing);
                }
            }
            Event::Ended => self.ended(el, fx),
            Event::AudioPlayerError(reason) => self.fail(PlaybackFailure::Media(reason), fx),
            Event::AudioPlayerStalled => {
                if !el.has_source() {
                    self.fail(PlaybackFailure::Stalled, fx);
                } else if let PlaybackState::Ready(sub) = self.state {
                    self.ctx.resume_sub_state = Some(sub.resume_target());
                    self.state = PlaybackState::Loading(LoadingSubState::WaitingCanPlay);
                }
            }
            Event::PlayRejected => {
                if self.state.is_playing() {
                    warn!("play() was rejected by the element");
                    self.state = PlaybackState::Ready(ReadySubState::Paused);
                }
            }
            Event::DelayElapsed { ticket } => {
                if self.ctx.delay_ticket != Some(ticket) {
                    debug!(ticket, "ignoring superseded resume");
                    return;
                }
                self.ctx.delay_ticket = None;
                if self.state == PlaybackState::Ready(ReadySubState::Paused) {
                    fx.push(Effect::Play);
                    self.state = PlaybackState::Ready(ReadySubState::Playing);
                }
            }
        }
    }

    fn request_play(
        &mut self,
        chapter: Option<u16>,
        verse: Option<u16>,
        el: &ElementSnapshot,
        fx: &mut Vec<Effect>,
    ) {
        self.ctx.config_error = None;
        if self.state == PlaybackState::Failure {
            self.reset_for_retry(el, fx);
        }

        let target_changed = chapter.is_some_and(|c| Some(c) != self.ctx.chapter_id);
        if target_changed {
            self.cancel_fetch(fx);
            self.cancel_resume(fx);
            self.ctx.repeat = None;
            self.ctx.pending_repeat = None;
            self.ctx.pending_seek = None;
            if !el.paused {
                fx.push(Effect::Pause);
            }
        }
        if let Some(c) = chapter {
            self.ctx.chapter_id = Some(c);
        }
        if chapter.is_some() || verse.is_some() {
            self.ctx.verse_number = verse;
        }
        if let (Some(v), Some(c)) = (verse, self.ctx.chapter_id) {
            self.ctx.pending_seek = Some(SeekTarget::Verse(VerseKey::new(c, v)));
        }

        let fresh_target = target_changed || verse.is_some();
        match self.state {
            PlaybackState::Ready(ReadySubState::Ended) if !fresh_target => {
                fx.push(Effect::SetCurrentTime(0.0));
                fx.push(Effect::Play);
                self.ctx.set_position(0.0, el.known_duration());
                self.state = PlaybackState::Ready(ReadySubState::Playing);
                return;
            }
            PlaybackState::Ready(ReadySubState::Playing | ReadySubState::Buffering)
                if !fresh_target =>
            {
                return;
            }
            _ => {}
        }

        self.cancel_resume(fx);
        self.ctx.resume_sub_state = Some(ReadySubState::Playing);
        self.evaluate_loading(el, fx);
    }

    fn request_pause(&mut self, el: &ElementSnapshot, fx: &mut Vec<Effect>) {
        match self.state {
            PlaybackState::Ready(ReadySubState::Playing | ReadySubState::Buffering) => {
                fx.push(Effect::Pause);
                self.ctx.set_position(el.current_time, el.known_duration());
                self.state = PlaybackState::Ready(ReadySubState::Paused);
            }
            PlaybackState::Ready(ReadySubState::Paused) => self.cancel_resume(fx),
            PlaybackState::Loading(_) => self.ctx.resume_sub_state = Some(ReadySubState::Paused),
            _ => {}
        }
    }

    fn request_seek(&mut self, target: SeekTarget, el: &ElementSnapshot, fx: &mut Vec<Effect>) {
        let sub = match self.state {
            PlaybackState::Ready(sub) => sub,
            PlaybackState::Loading(_) => {
                let queued = match self.ctx.pending_seek.take() {
                    Some(prev) => prev.merge(target),
                    None => target,
                };
                self.ctx.pending_seek = Some(queued);
                return;
            }
            PlaybackState::Closed | PlaybackState::Failure => {
                debug!(state = %self.state, "ignoring seek without a loaded recitation");
                return;
            }
        };

        let duration = self.duration_for(el);
        let Some(position) = self.resolve_seek(target, el.current_time, duration) else {
            return;
        };
        let resume = if self.ctx.delay_ticket.is_some() {
            self.cancel_resume(fx);
            ReadySubState::Playing
        } else {
            sub.resume_target()
        };

        fx.push(Effect::SetCurrentTime(position));
        self.ctx.set_position(position, Some(duration));
        self.observe_seek(position);

        if sub == ReadySubState::Ended {
            self.state = PlaybackState::Ready(ReadySubState::Paused);
        } else {
            self.ctx.resume_sub_state = Some(resume);
            self.state = PlaybackState::Loading(LoadingSubState::WaitingCanPlay);
        }
    }

    fn navigate(&mut self, direction: Direction, el: &ElementSnapshot, fx: &mut Vec<Effect>) {
        if !self.state.is_ready() {
            return;
        }
        let Some(timings) = self.timings() else {
            return;
        };
        let position_ms = secs_to_ms(el.current_time);
        let target = match find_verse_at(timings, position_ms) {
            Some(current) => find_adjacent_verse(timings, Some(current.verse_key), direction),
            None => match (direction, timings.last()) {
                (Direction::Previous, Some(last)) if position_ms >= last.timestamp_to => Some(last),
                _ => find_adjacent_verse(timings, None, direction),
            },
        };
        let Some(target) = target else {
            return;
        };
        let (key, position) = (target.verse_key, target.start_secs());

        fx.push(Effect::SetCurrentTime(position));
        self.ctx.verse_number = Some(key.verse);
        self.ctx.set_position(position, el.known_duration());
        self.observe_seek(position);
    }

    fn change_reciter(&mut self, reciter: u32, el: &ElementSnapshot, fx: &mut Vec<Effect>) {
        if self.ctx.reciter_id == Some(reciter) {
            return;
        }
        info!(reciter, "changing reciter");
        let continue_from = self.active_verse().map(|v| v.verse_key);
        self.ctx.reciter_id = Some(reciter);
        self.cancel_fetch(fx);
        self.cancel_resume(fx);
        if let Some(session) = self.ctx.repeat.take() {
            self.ctx.pending_repeat = Some(session.settings().clone());
        }
        self.ctx.recitation = self
            .ctx
            .chapter_id
            .and_then(|chapter| self.ctx.cache.get(reciter, chapter));

        match self.state {
            PlaybackState::Ready(sub) => {
                if !el.paused {
                    fx.push(Effect::Pause);
                }
                self.ctx.resume_sub_state = Some(sub.resume_target());
                self.ctx.pending_seek = continue_from.map(SeekTarget::Verse);
                self.evaluate_loading(el, fx);
            }
            PlaybackState::Loading(_) => {
                if !el.paused {
                    fx.push(Effect::Pause);
                }
                if self.ctx.pending_seek.is_none() {
                    self.ctx.pending_seek = continue_from.map(SeekTarget::Verse);
                }
                self.evaluate_loading(el, fx);
            }
            PlaybackState::Closed | PlaybackState::Failure => {}
        }
    }

    fn request_repeat(
        &mut self,
        settings: Option<RepeatSettings>,
        el: &ElementSnapshot,
        fx: &mut Vec<Effect>,
    ) {
        self.ctx.config_error = None;
        let Some(settings) = settings else {
            self.ctx.repeat = None;
            self.ctx.pending_repeat = None;
            if self.ctx.delay_ticket.is_some() {
                self.cancel_resume(fx);
                if self.state == PlaybackState::Ready(ReadySubState::Paused) {
                    fx.push(Effect::Play);
                    self.state = PlaybackState::Ready(ReadySubState::Playing);
                }
            }
            return;
        };
        if let Err(e) = settings.validate() {
            warn!(error = %e, "rejecting repeat settings");
            self.ctx.config_error = Some(e.to_string());
            return;
        }

        if let Some(data) = self.ctx.matching_recitation()
            && data.chapter_id == settings.range_start.chapter
            && let Err(e) = RepeatSession::start(settings.clone(), &data.verse_timings)
        {
            warn!(error = %e, "refusing repeat session");
            self.ctx.config_error = Some(e.to_string());
            return;
        }

        self.ctx.repeat = None;
        let start = settings.range_start;
        self.request_play(Some(start.chapter), Some(start.verse), el, fx);
        self.ctx.pending_repeat = Some(settings);
        if self.state.is_ready() {
            self.try_start_repeat();
        }
    }

    fn close(&mut self, el: &ElementSnapshot, fx: &mut Vec<Effect>) {
        self.cancel_fetch(fx);
        self.cancel_resume(fx);
        if !el.paused {
            fx.push(Effect::Pause);
        }
        if el.has_source() {
            fx.push(Effect::Unbind);
            self.source_unbound = true;
        }
        self.ctx.chapter_id = None;
        self.ctx.verse_number = None;
        self.ctx.recitation = None;
        self.ctx.repeat = None;
        self.ctx.pending_repeat = None;
        self.ctx.pending_seek = None;
        self.ctx.resume_sub_state = None;
        self.ctx.failure = None;
        self.ctx.set_position(0.0, Some(0.0));
        self.state = PlaybackState::Closed;
    }

    fn recitation_loaded(
        &mut self,
        id: u64,
        data: Arc<RecitationData>,
        el: &ElementSnapshot,
        fx: &mut Vec<Effect>,
    ) {
        let Some(ticket) = self.ctx.request.filter(|t| t.id == id) else {
            debug!(id, "ignoring stale recitation response");
            return;
        };
        self.ctx.request = None;
        info!(
            reciter = ticket.reciter,
            chapter = ticket.chapter,
            verses = data.verse_timings.len(),
            "recitation loaded"
        );
        self.ctx.cache.insert(ticket.reciter, ticket.chapter, Arc::clone(&data));
        self.ctx.recitation = Some(data);
        if self.state == PlaybackState::Loading(LoadingSubState::WaitingData) {
            self.evaluate_loading(el, fx);
        }
    }

    /// Re-evaluates the loading guards in their fixed order.
    fn evaluate_loading(&mut self, el: &ElementSnapshot, fx: &mut Vec<Effect>) {
        let (Some(chapter), Some(reciter)) = (self.ctx.chapter_id, self.ctx.reciter_id) else {
            self.fail(PlaybackFailure::MissingTarget, fx);
            return;
        };

        if self.ctx.matching_recitation().is_none() {
            if let Some(hit) = self.ctx.cache.get(reciter, chapter) {
                debug!(reciter, chapter, "recitation cache hit");
                self.ctx.recitation = Some(hit);
            } else {
                let in_flight = self
                    .ctx
                    .request
                    .is_some_and(|t| t.reciter == reciter && t.chapter == chapter);
                if !in_flight {
                    self.cancel_fetch(fx);
                    self.next_request_id += 1;
                    let ticket = FetchTicket { id: self.next_request_id, reciter, chapter };
                    self.ctx.request = Some(ticket);
                    fx.push(Effect::Fetch(ticket));
                }
                self.state = PlaybackState::Loading(LoadingSubState::WaitingData);
                return;
            }
        }
        let Some(data) = self.ctx.matching_recitation().cloned() else {
            return;
        };

        if self.source_unbound || el.src != data.audio_url {
            self.source_unbound = false;
            fx.push(Effect::BindSource {
                url: data.audio_url.clone(),
                duration_hint: data.timed_duration_secs(),
            });
            if self.ctx.playback_rate != 1.0 {
                fx.push(Effect::SetPlaybackRate(self.ctx.playback_rate));
            }
            self.state = PlaybackState::Loading(LoadingSubState::WaitingCanPlay);
            return;
        }
        if el.ready_state < ReadyState::HaveEnoughData {
            self.state = PlaybackState::Loading(LoadingSubState::WaitingCanPlay);
            return;
        }

        let duration = self.duration_for(el);
        let mut position = el.current_time;
        if let Some(seek) = self.ctx.pending_seek.take()
            && let Some(target) = self.resolve_seek(seek, el.current_time, duration)
        {
            fx.push(Effect::SetCurrentTime(target));
            position = target;
        }
        self.ctx.set_position(position, Some(duration));

        match self.ctx.resume_sub_state.take().unwrap_or(ReadySubState::Playing) {
            ReadySubState::Playing | ReadySubState::Buffering => {
                fx.push(Effect::Play);
                self.state = PlaybackState::Ready(ReadySubState::Playing);
            }
            ReadySubState::Paused | ReadySubState::Ended => {
                if !el.paused {
                    fx.push(Effect::Pause);
                }
                self.state = PlaybackState::Ready(ReadySubState::Paused);
            }
        }
        self.observe_seek(self.ctx.elapsed_secs);
        self.try_start_repeat();
    }

    fn time_changed(&mut self, el: &ElementSnapshot, fx: &mut Vec<Effect>) {
        if !self.state.is_ready() {
            return;
        }
        self.ctx.set_position(el.current_time, el.known_duration());
        if !self.state.is_playing() {
            return;
        }
        let position_ms = secs_to_ms(self.ctx.elapsed_secs);
        let Some(data) = self.ctx.matching_recitation().cloned() else {
            return;
        };
        let outcome = self
            .ctx
            .repeat
            .as_mut()
            .and_then(|session| session.on_position(position_ms, &data.verse_timings));
        if let Some(outcome) = outcome {
            self.apply_repeat(outcome, false, el, fx);
        }
    }

    fn ended(&mut self, el: &ElementSnapshot, fx: &mut Vec<Effect>) {
        if !self.state.is_playing() {
            return;
        }
        self.ctx.set_position(el.current_time, el.known_duration());
        let data = self.ctx.matching_recitation().cloned();
        let outcome = match (self.ctx.repeat.as_mut(), data) {
            (Some(session), Some(data)) => session.on_media_ended(&data.verse_timings),
            _ => None,
        };
        if let Some(outcome) = outcome
            && self.apply_repeat(outcome, true, el, fx)
        {
            return;
        }
        self.state = PlaybackState::Ready(ReadySubState::Ended);
    }

    /// Turns a repeat outcome into effects. Returns whether playback goes on
    /// (always true unless the audio already ended and nothing loops).
    fn apply_repeat(
        &mut self,
        outcome: RepeatOutcome,
        after_end: bool,
        el: &ElementSnapshot,
        fx: &mut Vec<Effect>,
    ) -> bool {
        let seek = match outcome.action {
            RepeatAction::None => return true,
            RepeatAction::Stop => {
                info!("repeat range finished");
                self.ctx.repeat = None;
                if self.range_end_action == RangeEndAction::Pause && !after_end {
                    fx.push(Effect::Pause);
                    self.ctx.set_position(el.current_time, el.known_duration());
                    self.state = PlaybackState::Ready(ReadySubState::Paused);
                }
                return !after_end;
            }
            RepeatAction::RepeatVerse { seek_to } | RepeatAction::RepeatRange { seek_to } => {
                Some(seek_to)
            }
            RepeatAction::Advance => None,
        };
        if after_end && seek.is_none() {
            return false;
        }

        if let Some(delay) = outcome.delay {
            if !after_end {
                fx.push(Effect::Pause);
            }
            if let Some(position) = seek {
                fx.push(Effect::SetCurrentTime(position));
                self.ctx.set_position(position, el.known_duration());
            }
            self.next_delay_ticket += 1;
            let ticket = self.next_delay_ticket;
            self.ctx.delay_ticket = Some(ticket);
            fx.push(Effect::ScheduleResume { ticket, delay });
            self.state = PlaybackState::Ready(ReadySubState::Paused);
            return true;
        }

        if let Some(position) = seek {
            fx.push(Effect::SetCurrentTime(position));
            self.ctx.set_position(position, el.known_duration());
            if after_end {
                fx.push(Effect::Play);
                self.state = PlaybackState::Ready(ReadySubState::Playing);
            }
        }
        true
    }

    fn try_start_repeat(&mut self) {
        let Some(settings) = self.ctx.pending_repeat.take() else {
            return;
        };
        let Some(data) = self.ctx.matching_recitation() else {
            self.ctx.pending_repeat = Some(settings);
            return;
        };
        let position_ms = secs_to_ms(self.ctx.elapsed_secs);
        match RepeatSession::start(settings, &data.verse_timings) {
            Ok(mut session) => {
                session.retarget(position_ms, &data.verse_timings);
                info!(
                    from = %session.settings().range_start,
                    to = %session.settings().range_end,
                    "repeat session started"
                );
                self.ctx.repeat = Some(session);
            }
            Err(e) => {
                warn!(error = %e, "refusing repeat session");
                self.ctx.config_error = Some(e.to_string());
            }
        }
    }

    /// A seek that lands outside the repeat range ends repeat mode.
    fn observe_seek(&mut self, position_secs: f64) {
        let Some(data) = self.ctx.matching_recitation().cloned() else {
            return;
        };
        let position_ms = secs_to_ms(position_secs);
        let left_range = self
            .ctx
            .repeat
            .as_mut()
            .is_some_and(|session| !session.observe_seek(position_ms, &data.verse_timings));
        if left_range {
            info!(position = position_secs, "seek left the repeat range");
            self.ctx.repeat = None;
        }
    }

    fn duration_for(&self, el: &ElementSnapshot) -> f64 {
        el.known_duration()
            .or_else(|| self.ctx.matching_recitation().and_then(|d| d.timed_duration_secs()))
            .unwrap_or(self.ctx.duration_secs)
    }

    /// Resolves a seek target to a clamped absolute position in seconds.
    fn resolve_seek(&self, target: SeekTarget, current: f64, duration: f64) -> Option<f64> {
        let raw = match target {
            SeekTarget::Relative(delta) => current + delta,
            SeekTarget::Absolute(secs) => secs,
            SeekTarget::Verse(key) => find_verse(self.timings()?, key)?.start_secs(),
            SeekTarget::Word(location) => {
                find_word_segment(self.timings()?, location)?.0 as f64 / 1000.0
            }
        };
        if !raw.is_finite() {
            return None;
        }
        Some(raw.clamp(0.0, duration.max(0.0)))
    }

    fn reset_for_retry(&mut self, el: &ElementSnapshot, fx: &mut Vec<Effect>) {
        self.ctx.failure = None;
        self.ctx.recitation = None;
        self.ctx.pending_seek = None;
        self.ctx.resume_sub_state = None;
        if el.has_source() {
            fx.push(Effect::Unbind);
            self.source_unbound = true;
        }
    }

    fn cancel_fetch(&mut self, fx: &mut Vec<Effect>) {
        if self.ctx.request.take().is_some() {
            fx.push(Effect::CancelFetch);
        }
    }

    fn cancel_resume(&mut self, fx: &mut Vec<Effect>) {
        if self.ctx.delay_ticket.take().is_some() {
            fx.push(Effect::CancelResume);
        }
    }

    fn fail(&mut self, failure: PlaybackFailure, fx: &mut Vec<Effect>) {
        warn!(error = %failure, "playback failed");
        self.cancel_fetch(fx);
        self.cancel_resume(fx);
        self.ctx.pending_seek = None;
        self.ctx.resume_sub_state = None;
        self.ctx.failure = Some(failure);
        self.state = PlaybackState::Failure;
    }
}
