use super::models::AppConfig;
use super::tables::ConfigTables;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Load configuration from the given path, falling back to defaults on error.
pub fn load_config(path: &Path) -> AppConfig {
    let contents = match fs::read_to_string(path) {
        Ok(data) => {
            info!(path = %path.display(), "Loaded base config");
            data
        }
        Err(err) => {
            warn!(
                path = %path.display(),
                "Falling back to default config: {err}"
            );
            return AppConfig::default();
        }
    };

    match parse_config(&contents) {
        Ok(cfg) => {
            debug!("Parsed configuration from disk");
            cfg
        }
        Err(err) => {
            warn!(path = %path.display(), "Invalid config TOML: {err:#}");
            AppConfig::default()
        }
    }
}

pub fn parse_config(contents: &str) -> Result<AppConfig> {
    let tables: ConfigTables = toml::from_str(contents).context("Failed to parse config TOML")?;
    Ok(tables.into())
}

pub fn serialize_config(config: &AppConfig) -> Result<String> {
    toml::to_string_pretty(&ConfigTables::from(config)).context("Failed to serialize config")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LogLevel, ThemeMode};
    use crate::pagination::PagingMode;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    #[test]
    fn partial_tables_keep_remaining_defaults() {
        let config = parse_config(
            r#"
[backend]
url = "https://reader.example.org"

[pagination]
page_size = 20
paging_mode = "full"

[logging]
log_level = "warn"
"#,
        )
        .expect("valid config");

        assert_eq!(config.backend_url, "https://reader.example.org");
        assert_eq!(config.page_size, 50);
        assert_eq!(config.paging_mode, PagingMode::Full);
        assert_eq!(config.log_level, LogLevel::Warn);
        assert_eq!(config.search_debounce_ms, 250);
        assert!(config.expand_search_to_full_document);
        assert_eq!(config.theme, ThemeMode::Night);
    }

    #[test]
    fn gap_threshold_is_clamped() {
        let config = parse_config("[pagination]\nsentence_gap_secs = 60.0\n").expect("valid");
        assert_eq!(config.sentence_gap_secs, 5.0);
    }

    #[test]
    fn non_finite_numbers_fall_back_to_defaults() {
        let config = parse_config(
            "[backend]\nrequest_timeout_secs = inf\n\n[pagination]\nsentence_gap_secs = nan\n\n[seek]\ntolerance_secs = -inf\n",
        )
        .expect("valid toml");
        assert_eq!(config.request_timeout_secs, 15.0);
        assert_eq!(config.request_timeout(), Duration::from_secs(15));
        assert_eq!(config.sentence_gap_secs, 0.6);
        assert_eq!(config.seek_tolerance_secs, 0.1);
    }

    #[test]
    fn serialized_config_parses_back() {
        let config = AppConfig {
            theme: ThemeMode::Day,
            seek_tolerance_secs: 0.25,
            ..AppConfig::default()
        };
        let text = serialize_config(&config).expect("serialize");
        assert!(text.contains("[seek]"));
        assert_eq!(parse_config(&text).expect("parse"), config);
    }

    #[test]
    fn unreadable_or_invalid_file_yields_defaults() {
        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let dir = std::env::temp_dir().join(format!("readalong-config-test-{nonce}"));
        fs::create_dir_all(&dir).expect("temp dir");
        let path = dir.join("config.toml");

        assert_eq!(load_config(&path), AppConfig::default());
        fs::write(&path, "[pagination\npage_size = ").expect("write");
        assert_eq!(load_config(&path), AppConfig::default());

        let _ = fs::remove_dir_all(&dir);
    }
}
