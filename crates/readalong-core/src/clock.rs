//! Playback clock adapter: the user's sync offset applied to the raw audio
//! position.

pub const MIN_OFFSET_MS: i32 = -2000;
pub const MAX_OFFSET_MS: i32 = 2000;
pub const OFFSET_STEP_MS: i32 = 50;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackClock {
    offset_ms: i32,
}

impl PlaybackClock {
    pub fn new(offset_ms: i32) -> Self {
        Self {
            offset_ms: snap_offset(offset_ms),
        }
    }

    pub fn offset_ms(&self) -> i32 {
        self.offset_ms
    }

    /// Apply a slider value; returns the offset actually stored.
    pub fn set_offset_ms(&mut self, offset_ms: i32) -> i32 {
        self.offset_ms = snap_offset(offset_ms);
        self.offset_ms
    }

    /// Keyboard nudge by whole steps.
    pub fn nudge(&mut self, steps: i32) -> i32 {
        let delta = steps.saturating_mul(OFFSET_STEP_MS);
        self.set_offset_ms(self.offset_ms.saturating_add(delta))
    }

    /// Time used for every sentence lookup.
    pub fn effective_time(&self, raw_secs: f64) -> f64 {
        (raw_secs - self.offset_secs()).max(0.0)
    }

    /// Audio position that shows `effective_secs` once the offset is applied.
    pub fn raw_time_for(&self, effective_secs: f64) -> f64 {
        (effective_secs + self.offset_secs()).max(0.0)
    }

    fn offset_secs(&self) -> f64 {
        f64::from(self.offset_ms) / 1000.0
    }
}

fn snap_offset(offset_ms: i32) -> i32 {
    let clamped = offset_ms.clamp(MIN_OFFSET_MS, MAX_OFFSET_MS);
    let steps = (f64::from(clamped) / f64::from(OFFSET_STEP_MS)).round() as i32;
    steps * OFFSET_STEP_MS
}
