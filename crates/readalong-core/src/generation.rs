use anyhow::{Result, anyhow};
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

/// Monotonic request generation shared between the session and the workers
/// running its requests. Issuing a new generation supersedes every older one,
/// so a response that resolves late is recognised and dropped.
#[derive(Clone, Debug, Default)]
pub struct GenerationCounter {
    current: Arc<AtomicU64>,
}

impl GenerationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self) -> u64 {
        self.current.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.current() == generation
    }

    pub fn check_current(&self, generation: u64, stage: &'static str) -> Result<()> {
        if !self.is_current(generation) {
            return Err(anyhow!(
                "generation {generation} superseded by {} at stage={stage}",
                self.current()
            ));
        }
        Ok(())
    }
}
