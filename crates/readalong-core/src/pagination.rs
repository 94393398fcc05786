//! Pagination and automatic page navigation.
//!
//! Long documents are fetched one fixed-size page of words at a time. While
//! audio plays the controller periodically asks the backend which page holds
//! the current time and swaps pages when the answer changes. The page math is
//! kept here as plain functions so the session and tests share it.

use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use ts_rs::TS;

/// Minimum allowed page size (words).
pub const MIN_PAGE_SIZE: usize = 50;
/// Maximum allowed page size (words).
pub const MAX_PAGE_SIZE: usize = 5000;
pub const DEFAULT_PAGE_SIZE: usize = 500;
pub const DEFAULT_NAVIGATION_THROTTLE: Duration = Duration::from_millis(2000);
pub const DEFAULT_NAVIGATION_COOLDOWN: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum PagingMode {
    #[default]
    Paged,
    Full,
}

impl std::fmt::Display for PagingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            PagingMode::Paged => "paged",
            PagingMode::Full => "full",
        };
        write!(f, "{}", label)
    }
}

pub fn clamp_page_size(page_size: usize) -> usize {
    page_size.clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE)
}

/// `ceil(total_words / page_size)`, never less than one page.
pub fn total_pages(total_words: usize, page_size: usize) -> usize {
    total_words.div_ceil(page_size.max(1)).max(1)
}

/// Global word indices that make up `page`.
pub fn word_range(total_words: usize, page_size: usize, page: usize) -> Range<usize> {
    let page_size = page_size.max(1);
    let start = page.saturating_mul(page_size).min(total_words);
    let end = start.saturating_add(page_size).min(total_words);
    start..end
}

pub fn page_for_word(global_word: usize, page_size: usize) -> usize {
    global_word / page_size.max(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLayout {
    pub mode: PagingMode,
    pub page_size: usize,
    pub current_page: usize,
    pub total_pages: usize,
    pub total_words: usize,
}

impl PageLayout {
    pub fn new(mode: PagingMode, page_size: usize) -> Self {
        Self {
            mode,
            page_size: clamp_page_size(page_size),
            current_page: 0,
            total_pages: 1,
            total_words: 0,
        }
    }

    pub fn is_multi_page(&self) -> bool {
        self.mode == PagingMode::Paged && self.total_pages > 1
    }

    /// Page parameter for a content request: `None` loads the whole document.
    pub fn request_page(&self, page: usize) -> Option<usize> {
        match self.mode {
            PagingMode::Paged => Some(page.min(self.paged_count().saturating_sub(1))),
            PagingMode::Full => None,
        }
    }

    /// Page count in paged mode, also known while the whole document is
    /// loaded.
    pub fn paged_count(&self) -> usize {
        let computed = total_pages(self.total_words, self.page_size);
        match self.mode {
            PagingMode::Paged => computed.max(self.total_pages),
            PagingMode::Full => computed,
        }
    }

    pub fn word_offset_for(&self, page: usize) -> usize {
        match self.mode {
            PagingMode::Paged => page.saturating_mul(self.page_size),
            PagingMode::Full => 0,
        }
    }

    pub fn global_word(&self, local_word: usize) -> usize {
        self.word_offset_for(self.current_page) + local_word
    }

    /// Record what the backend reported for a freshly loaded page.
    pub fn apply_loaded(&mut self, page: Option<usize>, total_words: usize, reported_pages: usize) {
        self.total_words = total_words;
        match self.mode {
            PagingMode::Full => {
                self.total_pages = 1;
                self.current_page = 0;
            }
            PagingMode::Paged => {
                let computed = total_pages(total_words, self.page_size);
                self.total_pages = if reported_pages > 0 {
                    reported_pages
                } else {
                    computed
                };
                self.current_page = page
                    .unwrap_or(0)
                    .min(self.total_pages.saturating_sub(1));
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationPhase {
    Idle,
    Checking { generation: u64 },
    Reloading { generation: u64, page: usize },
    Cooldown { until: Instant },
}

impl NavigationPhase {
    pub fn label(&self) -> &'static str {
        match self {
            NavigationPhase::Idle => "idle",
            NavigationPhase::Checking { .. } => "checking",
            NavigationPhase::Reloading { .. } => "reloading",
            NavigationPhase::Cooldown { .. } => "cooldown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageInfoOutcome {
    Unchanged,
    SwitchTo(usize),
    Stale,
}

/// Throttled "which page is playing" checks with a re-entrancy guard: only
/// one check or page switch is in flight, and a finished switch is followed
/// by a cooldown that absorbs ticks computed against the old page.
#[derive(Debug, Clone)]
pub struct PaginationController {
    phase: NavigationPhase,
    throttle: Duration,
    cooldown: Duration,
    last_check_at: Option<Instant>,
}

impl Default for PaginationController {
    fn default() -> Self {
        Self::new(DEFAULT_NAVIGATION_THROTTLE, DEFAULT_NAVIGATION_COOLDOWN)
    }
}

impl PaginationController {
    pub fn new(throttle: Duration, cooldown: Duration) -> Self {
        Self {
            phase: NavigationPhase::Idle,
            throttle,
            cooldown,
            last_check_at: None,
        }
    }

    pub fn phase(&self) -> NavigationPhase {
        self.phase
    }

    pub fn is_busy(&self) -> bool {
        !matches!(self.phase, NavigationPhase::Idle)
    }

    /// Whether a page check should start on this tick.
    pub fn poll(&mut self, layout: &PageLayout, now: Instant) -> bool {
        if let NavigationPhase::Cooldown { until } = self.phase {
            if now < until {
                return false;
            }
            self.phase = NavigationPhase::Idle;
        }
        if self.is_busy() || !layout.is_multi_page() {
            return false;
        }
        self.last_check_at
            .is_none_or(|last| now.saturating_duration_since(last) >= self.throttle)
    }

    pub fn begin_check(&mut self, generation: u64, now: Instant) {
        self.phase = NavigationPhase::Checking { generation };
        self.last_check_at = Some(now);
    }

    pub fn on_page_info(
        &mut self,
        generation: u64,
        result: Result<usize, String>,
        layout: &PageLayout,
    ) -> PageInfoOutcome {
        match self.phase {
            NavigationPhase::Checking { generation: expected } if expected == generation => {}
            _ => {
                debug!(generation, phase = self.phase.label(), "Ignoring stale page-info");
                return PageInfoOutcome::Stale;
            }
        }

        self.phase = NavigationPhase::Idle;
        let page = match result {
            Ok(page) => page.min(layout.total_pages.saturating_sub(1)),
            Err(err) => {
                debug!(generation, "Page-info lookup failed; staying on current page: {err}");
                return PageInfoOutcome::Unchanged;
            }
        };
        if page == layout.current_page {
            PageInfoOutcome::Unchanged
        } else {
            info!(
                from = layout.current_page,
                to = page,
                "Playback moved to another page"
            );
            PageInfoOutcome::SwitchTo(page)
        }
    }

    pub fn begin_reload(&mut self, reload_generation: u64, page: usize) {
        self.phase = NavigationPhase::Reloading {
            generation: reload_generation,
            page,
        };
    }

    /// Called for every content load that was accepted. A newer reload from
    /// somewhere else (voice switch, search jump) releases the guard too.
    pub fn on_content_loaded(&mut self, reload_generation: u64, now: Instant) {
        if let NavigationPhase::Reloading { generation, page } = self.phase {
            if generation == reload_generation {
                debug!(page, "Automatic page switch finished");
                self.phase = NavigationPhase::Cooldown {
                    until: now + self.cooldown,
                };
            } else if generation < reload_generation {
                self.phase = NavigationPhase::Idle;
            }
        }
    }

    /// A failed load releases the guard when it was the switch itself or a
    /// reload that superseded it.
    pub fn on_load_failed(&mut self, reload_generation: u64) {
        if let NavigationPhase::Reloading { generation, page } = self.phase {
            if generation <= reload_generation {
                debug!(page, generation, reload_generation, "Page reload failed; automatic navigation resumes");
                self.phase = NavigationPhase::Idle;
            }
        }
    }

    pub fn abandon(&mut self) {
        self.phase = NavigationPhase::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paged_layout(total_words: usize, page_size: usize) -> PageLayout {
        let mut layout = PageLayout::new(PagingMode::Paged, page_size);
        layout.apply_loaded(Some(0), total_words, 0);
        layout
    }

    #[test]
    fn page_count_and_last_page_range() {
        assert_eq!(total_pages(1200, 500), 3);
        assert_eq!(word_range(1200, 500, 2), 1000..1200);
        assert_eq!(word_range(1200, 500, 2).len(), 200);
        assert_eq!(total_pages(0, 500), 1);
        assert_eq!(page_for_word(999, 500), 1);
    }

    #[test]
    fn full_mode_is_single_page_with_absolute_words() {
        let mut layout = PageLayout::new(PagingMode::Full, 500);
        layout.apply_loaded(None, 1200, 3);
        assert_eq!(layout.total_pages, 1);
        assert!(!layout.is_multi_page());
        assert_eq!(layout.global_word(740), 740);
        assert_eq!(layout.request_page(2), None);

        layout.mode = PagingMode::Paged;
        assert_eq!(layout.request_page(2), Some(2));
    }

    #[test]
    fn paged_global_word_adds_page_offset() {
        let mut layout = paged_layout(1200, 500);
        layout.current_page = 2;
        assert_eq!(layout.global_word(10), 1010);
        assert_eq!(layout.request_page(7), Some(2));
    }

    #[test]
    fn checks_are_throttled_and_guarded() {
        let layout = paged_layout(1200, 500);
        let mut controller = PaginationController::default();
        let start = Instant::now();

        assert!(controller.poll(&layout, start));
        controller.begin_check(1, start);
        assert!(!controller.poll(&layout, start + Duration::from_secs(5)));

        assert_eq!(
            controller.on_page_info(1, Ok(0), &layout),
            PageInfoOutcome::Unchanged
        );
        assert!(!controller.poll(&layout, start + Duration::from_millis(1500)));
        assert!(controller.poll(&layout, start + Duration::from_millis(2000)));
    }

    #[test]
    fn single_page_documents_never_check() {
        let layout = paged_layout(300, 500);
        let mut controller = PaginationController::default();
        assert!(!controller.poll(&layout, Instant::now()));
    }

    #[test]
    fn page_switch_holds_cooldown_after_reload() {
        let layout = paged_layout(1200, 500);
        let mut controller = PaginationController::default();
        let start = Instant::now();
        controller.begin_check(4, start);

        assert_eq!(
            controller.on_page_info(4, Ok(1), &layout),
            PageInfoOutcome::SwitchTo(1)
        );
        controller.begin_reload(9, 1);
        assert!(!controller.poll(&layout, start + Duration::from_secs(3)));

        let loaded_at = start + Duration::from_secs(3);
        controller.on_content_loaded(9, loaded_at);
        assert!(!controller.poll(&layout, loaded_at + Duration::from_millis(400)));
        assert!(controller.poll(&layout, loaded_at + Duration::from_millis(600)));
    }

    #[test]
    fn stale_and_failed_answers_leave_page_alone() {
        let layout = paged_layout(1200, 500);
        let mut controller = PaginationController::default();
        controller.begin_check(2, Instant::now());

        assert_eq!(
            controller.on_page_info(1, Ok(2), &layout),
            PageInfoOutcome::Stale
        );
        assert_eq!(
            controller.on_page_info(2, Err("timeout".to_string()), &layout),
            PageInfoOutcome::Unchanged
        );
        assert_eq!(controller.phase(), NavigationPhase::Idle);
    }

    #[test]
    fn failed_reload_releases_guard_unless_older() {
        let mut controller = PaginationController::default();
        controller.begin_reload(6, 1);
        controller.on_load_failed(5);
        assert_eq!(
            controller.phase(),
            NavigationPhase::Reloading {
                generation: 6,
                page: 1
            }
        );

        controller.on_load_failed(7);
        assert_eq!(controller.phase(), NavigationPhase::Idle);
    }

    #[test]
    fn newer_reload_releases_guard() {
        let mut controller = PaginationController::default();
        controller.begin_reload(3, 1);
        controller.on_content_loaded(5, Instant::now());
        assert_eq!(controller.phase(), NavigationPhase::Idle);
    }
}
