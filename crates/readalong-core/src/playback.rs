//! The audio element the engine follows, injected instead of read from a
//! global.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// How often the wall-clock stand-in reports `TimeUpdate`, matching the
/// cadence browsers use for media elements.
const TIME_UPDATE_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    TimeUpdate,
    Seeked,
    Ended,
}

/// Audio surface shared by the engine. Only the seek coordinator calls
/// [`PlaybackContext::seek`]; everything else reads.
pub trait PlaybackContext {
    fn current_time(&self) -> f64;
    fn duration(&self) -> Option<f64>;
    fn seek(&mut self, seconds: f64);
    fn play(&mut self);
    fn pause(&mut self);
    fn is_paused(&self) -> bool;
    /// Events raised since the last poll, oldest first.
    fn poll_events(&mut self) -> Vec<PlaybackEvent>;
}

/// Host-driven playback: position and events change only when the host says
/// so. Seeks are recorded and completed explicitly with
/// [`ManualPlayback::complete_seek`].
#[derive(Debug, Clone, Default)]
pub struct ManualPlayback {
    time: f64,
    duration: Option<f64>,
    paused: bool,
    events: VecDeque<PlaybackEvent>,
    seeks: Vec<f64>,
    pending_seek: bool,
}

impl ManualPlayback {
    pub fn new(duration: Option<f64>) -> Self {
        Self {
            duration,
            paused: true,
            ..Self::default()
        }
    }

    /// Position change reported by the audio element itself.
    pub fn set_time(&mut self, seconds: f64) {
        self.time = seconds.max(0.0);
        self.events.push_back(PlaybackEvent::TimeUpdate);
    }

    pub fn complete_seek(&mut self) {
        if std::mem::take(&mut self.pending_seek) {
            self.events.push_back(PlaybackEvent::Seeked);
        }
    }

    pub fn finish(&mut self) {
        self.paused = true;
        self.events.push_back(PlaybackEvent::Ended);
    }

    /// Every position written through [`PlaybackContext::seek`].
    pub fn seeks(&self) -> &[f64] {
        &self.seeks
    }
}

impl PlaybackContext for ManualPlayback {
    fn current_time(&self) -> f64 {
        self.time
    }

    fn duration(&self) -> Option<f64> {
        self.duration
    }

    fn seek(&mut self, seconds: f64) {
        self.time = seconds.max(0.0);
        self.seeks.push(self.time);
        self.pending_seek = true;
    }

    fn play(&mut self) {
        self.paused = false;
    }

    fn pause(&mut self) {
        self.paused = true;
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn poll_events(&mut self) -> Vec<PlaybackEvent> {
        self.events.drain(..).collect()
    }
}

/// Monotonic-clock stand-in for an audio element, used when no real audio
/// sink is attached (terminal driver, demos).
#[derive(Debug, Clone)]
pub struct WallClockPlayback {
    base: f64,
    started_at: Option<Instant>,
    duration: Option<f64>,
    events: VecDeque<PlaybackEvent>,
    last_time_update: Option<Instant>,
    ended: bool,
}

impl WallClockPlayback {
    pub fn new(duration: Option<f64>) -> Self {
        Self {
            base: 0.0,
            started_at: None,
            duration: duration.filter(|secs| *secs > 0.0),
            events: VecDeque::new(),
            last_time_update: None,
            ended: false,
        }
    }

    fn position_at(&self, now: Instant) -> f64 {
        let running = self
            .started_at
            .map(|started| now.saturating_duration_since(started).as_secs_f64())
            .unwrap_or(0.0);
        let position = self.base + running;
        match self.duration {
            Some(duration) => position.min(duration),
            None => position,
        }
    }
}

impl PlaybackContext for WallClockPlayback {
    fn current_time(&self) -> f64 {
        self.position_at(Instant::now())
    }

    fn duration(&self) -> Option<f64> {
        self.duration
    }

    fn seek(&mut self, seconds: f64) {
        let target = match self.duration {
            Some(duration) => seconds.clamp(0.0, duration),
            None => seconds.max(0.0),
        };
        self.base = target;
        if self.started_at.is_some() {
            self.started_at = Some(Instant::now());
        }
        self.ended = false;
        self.events.push_back(PlaybackEvent::Seeked);
    }

    fn play(&mut self) {
        if self.started_at.is_none() {
            self.started_at = Some(Instant::now());
        }
    }

    fn pause(&mut self) {
        let now = Instant::now();
        self.base = self.position_at(now);
        self.started_at = None;
    }

    fn is_paused(&self) -> bool {
        self.started_at.is_none()
    }

    fn poll_events(&mut self) -> Vec<PlaybackEvent> {
        let now = Instant::now();
        if self.started_at.is_some() {
            let due = self
                .last_time_update
                .is_none_or(|last| now.saturating_duration_since(last) >= TIME_UPDATE_INTERVAL);
            if due {
                self.last_time_update = Some(now);
                self.events.push_back(PlaybackEvent::TimeUpdate);
            }
            let finished = self
                .duration
                .is_some_and(|duration| self.position_at(now) >= duration);
            if finished && !self.ended {
                self.ended = true;
                self.pause();
                self.events.push_back(PlaybackEvent::Ended);
            }
        }
        self.events.drain(..).collect()
    }
}
