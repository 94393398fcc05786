//! Seek coordination. Every write to the audio position goes through
//! [`SeekCoordinator::apply`], and highlight updates pause until the audio
//! element acknowledges the write with exactly one `Seeked` event.

use crate::generation::GenerationCounter;
use crate::playback::PlaybackContext;
use tracing::{debug, info};

pub const DEFAULT_SEEK_TOLERANCE_SECS: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeekPhase {
    Idle,
    /// Waiting for page-info to say which page holds `target`.
    ResolvingPage { target: f64, generation: u64 },
    /// Waiting for the page holding `target` to load.
    AwaitingPage { target: f64, reload_generation: u64 },
    AwaitingSeeked { target: f64 },
}

impl SeekPhase {
    pub fn label(&self) -> &'static str {
        match self {
            SeekPhase::Idle => "idle",
            SeekPhase::ResolvingPage { .. } => "resolving-page",
            SeekPhase::AwaitingPage { .. } => "awaiting-page",
            SeekPhase::AwaitingSeeked { .. } => "awaiting-seeked",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeekPlan {
    /// Already within tolerance of the target.
    NoOp,
    ResolvePage { generation: u64, target: f64 },
    SeekNow { target: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PageResolution {
    Stale,
    SeekNow { target: f64 },
    LoadPage { page: usize, target: f64 },
}

#[derive(Debug, Clone)]
pub struct SeekCoordinator {
    phase: SeekPhase,
    tolerance: f64,
    generations: GenerationCounter,
}

impl Default for SeekCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_SEEK_TOLERANCE_SECS)
    }
}

impl SeekCoordinator {
    pub fn new(tolerance: f64) -> Self {
        Self {
            phase: SeekPhase::Idle,
            tolerance: tolerance.max(0.0),
            generations: GenerationCounter::new(),
        }
    }

    pub fn phase(&self) -> SeekPhase {
        self.phase
    }

    /// Plan a seek to raw audio time `target`. `needs_page` is set when the
    /// target may live on a page that is not loaded.
    pub fn request(&mut self, target: f64, current: f64, needs_page: bool) -> SeekPlan {
        let target = target.max(0.0);
        if (target - current).abs() <= self.tolerance {
            debug!(target, current, "Seek target within tolerance; skipping");
            return SeekPlan::NoOp;
        }
        if needs_page {
            let generation = self.generations.advance();
            self.phase = SeekPhase::ResolvingPage { target, generation };
            return SeekPlan::ResolvePage { generation, target };
        }
        SeekPlan::SeekNow { target }
    }

    /// Write the audio position. Nothing else in the crate calls
    /// [`PlaybackContext::seek`].
    pub fn apply<P: PlaybackContext>(&mut self, playback: &mut P, target: f64) {
        info!(target, "Seeking audio");
        playback.seek(target);
        self.phase = SeekPhase::AwaitingSeeked { target };
    }

    pub fn on_page_resolved(
        &mut self,
        generation: u64,
        result: Result<usize, String>,
        current_page: usize,
    ) -> PageResolution {
        let target = match self.phase {
            SeekPhase::ResolvingPage {
                target,
                generation: expected,
            } if expected == generation => target,
            _ => return PageResolution::Stale,
        };
        match result {
            Ok(page) if page != current_page => PageResolution::LoadPage { page, target },
            Ok(_) => PageResolution::SeekNow { target },
            Err(err) => {
                debug!(target, "Page lookup for seek failed; seeking on current page: {err}");
                PageResolution::SeekNow { target }
            }
        }
    }

    /// Tie the pending seek to the content reload that brings its page in.
    pub fn bind_reload(&mut self, reload_generation: u64) {
        if let SeekPhase::ResolvingPage { target, .. } = self.phase {
            self.phase = SeekPhase::AwaitingPage {
                target,
                reload_generation,
            };
        }
    }

    /// Returns the target to seek to once its page has loaded. A newer
    /// reload from elsewhere abandons the pending seek.
    pub fn on_content_loaded(&mut self, reload_generation: u64) -> Option<f64> {
        let SeekPhase::AwaitingPage {
            target,
            reload_generation: expected,
        } = self.phase
        else {
            return None;
        };
        if expected == reload_generation {
            return Some(target);
        }
        if expected < reload_generation {
            debug!(target, "Pending seek superseded by a newer reload");
            self.phase = SeekPhase::Idle;
        }
        None
    }

    pub fn on_load_failed(&mut self, reload_generation: u64) {
        if let SeekPhase::AwaitingPage {
            reload_generation: expected,
            ..
        } = self.phase
        {
            if expected <= reload_generation {
                self.phase = SeekPhase::Idle;
            }
        }
    }

    /// Returns true when this event completed a seek we issued.
    pub fn on_seeked(&mut self) -> bool {
        if matches!(self.phase, SeekPhase::AwaitingSeeked { .. }) {
            self.phase = SeekPhase::Idle;
            return true;
        }
        false
    }

    pub fn suspends_highlight(&self) -> bool {
        matches!(self.phase, SeekPhase::AwaitingSeeked { .. })
    }

    pub fn cancel(&mut self) {
        self.phase = SeekPhase::Idle;
    }
}

/// Progress bar position to raw audio time.
pub fn progress_target(x: f64, width: f64, duration: Option<f64>) -> Option<f64> {
    let duration = duration.filter(|secs| secs.is_finite() && *secs > 0.0)?;
    if !(width.is_finite() && width > 0.0) || !x.is_finite() {
        return None;
    }
    Some((x / width).clamp(0.0, 1.0) * duration)
}
