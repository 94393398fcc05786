use crate::config::{LogLevel, ThemeMode};
use crate::pagination::{
    DEFAULT_NAVIGATION_COOLDOWN, DEFAULT_NAVIGATION_THROTTLE, DEFAULT_PAGE_SIZE, PagingMode,
};
use crate::timing::{
    DEFAULT_BOUNDARY_PADDING_SECS, DEFAULT_SENTENCE_GAP_SECS, UNTIMED_SENTENCE_SECS,
};

pub(crate) fn default_backend_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

pub(crate) fn default_request_timeout_secs() -> f32 {
    15.0
}

pub(crate) fn default_user_agent() -> String {
    format!("readalong/{}", env!("CARGO_PKG_VERSION"))
}

pub(crate) fn default_boundary_padding_secs() -> f64 {
    DEFAULT_BOUNDARY_PADDING_SECS
}

pub(crate) fn default_untimed_sentence_secs() -> f64 {
    UNTIMED_SENTENCE_SECS
}

pub(crate) fn default_highlight_hold_ms() -> u64 {
    200
}

pub(crate) fn default_frame_interval_ms() -> u64 {
    16
}

pub(crate) fn default_highlighting_enabled() -> bool {
    true
}

pub(crate) fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

pub(crate) fn default_paging_mode() -> PagingMode {
    PagingMode::Paged
}

pub(crate) fn default_navigation_throttle_ms() -> u64 {
    DEFAULT_NAVIGATION_THROTTLE.as_millis() as u64
}

pub(crate) fn default_navigation_cooldown_ms() -> u64 {
    DEFAULT_NAVIGATION_COOLDOWN.as_millis() as u64
}

pub(crate) fn default_sentence_gap_secs() -> f64 {
    DEFAULT_SENTENCE_GAP_SECS
}

pub(crate) fn default_search_debounce_ms() -> u64 {
    250
}

pub(crate) fn default_expand_search_to_full_document() -> bool {
    true
}

pub(crate) fn default_seek_tolerance_secs() -> f64 {
    crate::seek::DEFAULT_SEEK_TOLERANCE_SECS
}

pub(crate) fn default_cache_dir() -> String {
    ".cache".to_string()
}

pub(crate) fn default_theme() -> ThemeMode {
    ThemeMode::Night
}

pub(crate) fn default_log_level() -> LogLevel {
    LogLevel::Debug
}
