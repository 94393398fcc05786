//! Highlight driver: effective time to active sentence.
//!
//! Synthesized speech leaves short silences between words that are not
//! sentence boundaries. A plain range lookup makes the highlight blink at
//! every one of them, so the last matched sentence is held for a short
//! wall-clock window after the clock leaves every known range.

use crate::timing::TimingIndex;
use std::time::{Duration, Instant};

pub const DEFAULT_HIGHLIGHT_HOLD: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HighlightChange {
    pub previous: Option<usize>,
    pub current: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct HighlightDriver {
    current: Option<usize>,
    last_valid_at: Option<Instant>,
    hold: Duration,
}

impl Default for HighlightDriver {
    fn default() -> Self {
        Self::new(DEFAULT_HIGHLIGHT_HOLD)
    }
}

impl HighlightDriver {
    pub fn new(hold: Duration) -> Self {
        Self {
            current: None,
            last_valid_at: None,
            hold,
        }
    }

    pub fn current(&self) -> Option<usize> {
        self.current
    }

    /// Resolve the sentence for `time` without changing which sentence is
    /// active. Any successful match refreshes the hold timestamp.
    pub fn find_current_sentence(
        &mut self,
        index: &TimingIndex,
        time: f64,
        now: Instant,
    ) -> Option<usize> {
        if let Some(active) = self.current.and_then(|idx| index.get(idx)) {
            if active.contains(time) {
                self.last_valid_at = Some(now);
                return Some(active.index);
            }
        }

        if let Some(found) = index.find(time) {
            self.last_valid_at = Some(now);
            return Some(found);
        }

        let held = self.current.filter(|idx| index.get(*idx).is_some());
        match (held, self.last_valid_at) {
            (Some(active), Some(at)) if now.saturating_duration_since(at) < self.hold => {
                Some(active)
            }
            _ => None,
        }
    }

    /// One driver tick. Returns the change when the active sentence moved.
    pub fn tick(&mut self, index: &TimingIndex, time: f64, now: Instant) -> Option<HighlightChange> {
        let next = self.find_current_sentence(index, time, now);
        self.apply(next, now)
    }

    /// Make `sentence` active regardless of the clock (sentence clicks).
    pub fn activate(&mut self, sentence: usize, now: Instant) -> Option<HighlightChange> {
        self.apply(Some(sentence), now)
    }

    /// Drop the active sentence, e.g. when the content it pointed into is
    /// replaced.
    pub fn clear(&mut self) -> Option<HighlightChange> {
        self.last_valid_at = None;
        let previous = self.current.take();
        previous.map(|previous| HighlightChange {
            previous: Some(previous),
            current: None,
        })
    }

    fn apply(&mut self, next: Option<usize>, now: Instant) -> Option<HighlightChange> {
        if next == self.current {
            return None;
        }
        let previous = std::mem::replace(&mut self.current, next);
        if next.is_some() {
            self.last_valid_at = Some(now);
        }
        Some(HighlightChange {
            previous,
            current: next,
        })
    }
}
