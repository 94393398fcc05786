use crate::config::defaults;
use crate::pagination::PagingMode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use ts_rs::TS;

/// Flattened view of every `conf/config.toml` table.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub backend_url: String,
    pub request_timeout_secs: f32,
    pub user_agent: String,
    pub boundary_padding_secs: f64,
    pub untimed_sentence_secs: f64,
    pub highlight_hold_ms: u64,
    pub frame_interval_ms: u64,
    pub highlighting_enabled: bool,
    pub page_size: usize,
    pub paging_mode: PagingMode,
    pub navigation_throttle_ms: u64,
    pub navigation_cooldown_ms: u64,
    pub sentence_gap_secs: f64,
    pub search_debounce_ms: u64,
    pub expand_search_to_full_document: bool,
    pub seek_tolerance_secs: f64,
    pub cache_dir: String,
    pub theme: ThemeMode,
    pub log_level: LogLevel,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            backend_url: defaults::default_backend_url(),
            request_timeout_secs: defaults::default_request_timeout_secs(),
            user_agent: defaults::default_user_agent(),
            boundary_padding_secs: defaults::default_boundary_padding_secs(),
            untimed_sentence_secs: defaults::default_untimed_sentence_secs(),
            highlight_hold_ms: defaults::default_highlight_hold_ms(),
            frame_interval_ms: defaults::default_frame_interval_ms(),
            highlighting_enabled: defaults::default_highlighting_enabled(),
            page_size: defaults::default_page_size(),
            paging_mode: defaults::default_paging_mode(),
            navigation_throttle_ms: defaults::default_navigation_throttle_ms(),
            navigation_cooldown_ms: defaults::default_navigation_cooldown_ms(),
            sentence_gap_secs: defaults::default_sentence_gap_secs(),
            search_debounce_ms: defaults::default_search_debounce_ms(),
            expand_search_to_full_document: defaults::default_expand_search_to_full_document(),
            seek_tolerance_secs: defaults::default_seek_tolerance_secs(),
            cache_dir: defaults::default_cache_dir(),
            theme: defaults::default_theme(),
            log_level: defaults::default_log_level(),
        }
    }
}

impl AppConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::try_from_secs_f32(self.request_timeout_secs.max(0.1)).unwrap_or_else(|_| {
            Duration::from_secs_f32(defaults::default_request_timeout_secs())
        })
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }

    pub fn cache_root(&self) -> PathBuf {
        PathBuf::from(&self.cache_dir)
    }
}

/// Theme mode.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default, TS)]
#[serde(rename_all = "kebab-case")]
#[ts(export)]
pub enum ThemeMode {
    Day,
    #[default]
    Night,
}

impl ThemeMode {
    pub fn toggled(self) -> Self {
        match self {
            ThemeMode::Day => ThemeMode::Night,
            ThemeMode::Night => ThemeMode::Day,
        }
    }
}

impl std::fmt::Display for ThemeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ThemeMode::Day => "Day",
            ThemeMode::Night => "Night",
        };
        write!(f, "{}", label)
    }
}

/// Supported logging verbosity levels.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    #[default]
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_filter_str())
    }
}

impl LogLevel {
    pub fn as_filter_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}
