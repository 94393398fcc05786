use super::defaults;
use super::models::{AppConfig, LogLevel, ThemeMode};
use crate::pagination::{PagingMode, clamp_page_size};
use crate::timing::{MAX_SENTENCE_GAP_SECS, MIN_SENTENCE_GAP_SECS};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub(super) struct ConfigTables {
    #[serde(default)]
    backend: BackendConfig,
    #[serde(default)]
    sync: SyncConfig,
    #[serde(default)]
    pagination: PaginationConfig,
    #[serde(default)]
    search: SearchConfig,
    #[serde(default)]
    seek: SeekConfig,
    #[serde(default)]
    storage: StorageConfig,
    #[serde(default)]
    appearance: AppearanceConfig,
    #[serde(default)]
    logging: LoggingConfig,
}

/// TOML accepts `inf` and `nan`; neither is a usable duration.
fn finite_or(value: f64, fallback: fn() -> f64) -> f64 {
    if value.is_finite() { value } else { fallback() }
}

impl From<ConfigTables> for AppConfig {
    fn from(tables: ConfigTables) -> Self {
        AppConfig {
            backend_url: tables.backend.url,
            request_timeout_secs: Some(tables.backend.request_timeout_secs)
                .filter(|secs| secs.is_finite() && *secs > 0.0)
                .unwrap_or_else(defaults::default_request_timeout_secs),
            user_agent: tables.backend.user_agent,
            boundary_padding_secs: finite_or(
                tables.sync.boundary_padding_secs,
                defaults::default_boundary_padding_secs,
            )
            .max(0.0),
            untimed_sentence_secs: finite_or(
                tables.sync.untimed_sentence_secs,
                defaults::default_untimed_sentence_secs,
            )
            .max(0.0),
            highlight_hold_ms: tables.sync.highlight_hold_ms,
            frame_interval_ms: tables.sync.frame_interval_ms,
            highlighting_enabled: tables.sync.highlighting_enabled,
            page_size: clamp_page_size(tables.pagination.page_size),
            paging_mode: tables.pagination.paging_mode,
            navigation_throttle_ms: tables.pagination.navigation_throttle_ms,
            navigation_cooldown_ms: tables.pagination.navigation_cooldown_ms,
            sentence_gap_secs: finite_or(
                tables.pagination.sentence_gap_secs,
                defaults::default_sentence_gap_secs,
            )
            .clamp(MIN_SENTENCE_GAP_SECS, MAX_SENTENCE_GAP_SECS),
            search_debounce_ms: tables.search.debounce_ms,
            expand_search_to_full_document: tables.search.expand_to_full_document,
            seek_tolerance_secs: finite_or(
                tables.seek.tolerance_secs,
                defaults::default_seek_tolerance_secs,
            )
            .max(0.0),
            cache_dir: tables.storage.cache_dir,
            theme: tables.appearance.theme,
            log_level: tables.logging.log_level,
        }
    }
}

impl From<&AppConfig> for ConfigTables {
    fn from(config: &AppConfig) -> Self {
        ConfigTables {
            backend: BackendConfig {
                url: config.backend_url.clone(),
                request_timeout_secs: config.request_timeout_secs,
                user_agent: config.user_agent.clone(),
            },
            sync: SyncConfig {
                boundary_padding_secs: config.boundary_padding_secs,
                untimed_sentence_secs: config.untimed_sentence_secs,
                highlight_hold_ms: config.highlight_hold_ms,
                frame_interval_ms: config.frame_interval_ms,
                highlighting_enabled: config.highlighting_enabled,
            },
            pagination: PaginationConfig {
                page_size: config.page_size,
                paging_mode: config.paging_mode,
                navigation_throttle_ms: config.navigation_throttle_ms,
                navigation_cooldown_ms: config.navigation_cooldown_ms,
                sentence_gap_secs: config.sentence_gap_secs,
            },
            search: SearchConfig {
                debounce_ms: config.search_debounce_ms,
                expand_to_full_document: config.expand_search_to_full_document,
            },
            seek: SeekConfig {
                tolerance_secs: config.seek_tolerance_secs,
            },
            storage: StorageConfig {
                cache_dir: config.cache_dir.clone(),
            },
            appearance: AppearanceConfig {
                theme: config.theme,
            },
            logging: LoggingConfig {
                log_level: config.log_level,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct BackendConfig {
    #[serde(default = "defaults::default_backend_url")]
    url: String,
    #[serde(default = "defaults::default_request_timeout_secs")]
    request_timeout_secs: f32,
    #[serde(default = "defaults::default_user_agent")]
    user_agent: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig {
            url: defaults::default_backend_url(),
            request_timeout_secs: defaults::default_request_timeout_secs(),
            user_agent: defaults::default_user_agent(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct SyncConfig {
    #[serde(default = "defaults::default_boundary_padding_secs")]
    boundary_padding_secs: f64,
    #[serde(default = "defaults::default_untimed_sentence_secs")]
    untimed_sentence_secs: f64,
    #[serde(default = "defaults::default_highlight_hold_ms")]
    highlight_hold_ms: u64,
    #[serde(default = "defaults::default_frame_interval_ms")]
    frame_interval_ms: u64,
    #[serde(default = "defaults::default_highlighting_enabled")]
    highlighting_enabled: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            boundary_padding_secs: defaults::default_boundary_padding_secs(),
            untimed_sentence_secs: defaults::default_untimed_sentence_secs(),
            highlight_hold_ms: defaults::default_highlight_hold_ms(),
            frame_interval_ms: defaults::default_frame_interval_ms(),
            highlighting_enabled: defaults::default_highlighting_enabled(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct PaginationConfig {
    #[serde(default = "defaults::default_page_size")]
    page_size: usize,
    #[serde(default = "defaults::default_paging_mode")]
    paging_mode: PagingMode,
    #[serde(default = "defaults::default_navigation_throttle_ms")]
    navigation_throttle_ms: u64,
    #[serde(default = "defaults::default_navigation_cooldown_ms")]
    navigation_cooldown_ms: u64,
    #[serde(default = "defaults::default_sentence_gap_secs")]
    sentence_gap_secs: f64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        PaginationConfig {
            page_size: defaults::default_page_size(),
            paging_mode: defaults::default_paging_mode(),
            navigation_throttle_ms: defaults::default_navigation_throttle_ms(),
            navigation_cooldown_ms: defaults::default_navigation_cooldown_ms(),
            sentence_gap_secs: defaults::default_sentence_gap_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct SearchConfig {
    #[serde(default = "defaults::default_search_debounce_ms")]
    debounce_ms: u64,
    #[serde(default = "defaults::default_expand_search_to_full_document")]
    expand_to_full_document: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            debounce_ms: defaults::default_search_debounce_ms(),
            expand_to_full_document: defaults::default_expand_search_to_full_document(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct SeekConfig {
    #[serde(default = "defaults::default_seek_tolerance_secs")]
    tolerance_secs: f64,
}

impl Default for SeekConfig {
    fn default() -> Self {
        SeekConfig {
            tolerance_secs: defaults::default_seek_tolerance_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct StorageConfig {
    #[serde(default = "defaults::default_cache_dir")]
    cache_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            cache_dir: defaults::default_cache_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct AppearanceConfig {
    #[serde(default = "defaults::default_theme")]
    theme: ThemeMode,
}

impl Default for AppearanceConfig {
    fn default() -> Self {
        AppearanceConfig {
            theme: defaults::default_theme(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct LoggingConfig {
    #[serde(default = "defaults::default_log_level")]
    log_level: LogLevel,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            log_level: defaults::default_log_level(),
        }
    }
}
