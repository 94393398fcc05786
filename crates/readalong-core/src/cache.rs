//! Small on-disk store for client preferences and per-track sync offsets.
//!
//! Everything lives under the configured cache root. Global preferences are a
//! single `prefs.toml`; per-track state sits in a directory named by the
//! SHA-256 of the track id so arbitrary ids are safe as paths. Write errors
//! are ignored to keep playback running.

use crate::config::{AppConfig, ThemeMode};
use crate::pagination::{PagingMode, clamp_page_size};
use crate::timing::{MAX_SENTENCE_GAP_SECS, MIN_SENTENCE_GAP_SECS};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Reader preferences that outlive a session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClientPrefs {
    pub theme: ThemeMode,
    pub page_size: usize,
    pub paging_mode: PagingMode,
    pub sentence_gap_secs: f64,
    pub highlighting_enabled: bool,
}

impl ClientPrefs {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            theme: config.theme,
            page_size: config.page_size,
            paging_mode: config.paging_mode,
            sentence_gap_secs: config.sentence_gap_secs,
            highlighting_enabled: config.highlighting_enabled,
        }
    }

    /// Overlay stored preferences onto the configured defaults.
    pub fn apply_to(&self, config: &mut AppConfig) {
        config.theme = self.theme;
        config.page_size = clamp_page_size(self.page_size);
        config.paging_mode = self.paging_mode;
        if self.sentence_gap_secs.is_finite() {
            config.sentence_gap_secs = self
                .sentence_gap_secs
                .clamp(MIN_SENTENCE_GAP_SECS, MAX_SENTENCE_GAP_SECS);
        }
        config.highlighting_enabled = self.highlighting_enabled;
    }
}

#[derive(Serialize, Deserialize)]
struct SyncEntry {
    offset_ms: i32,
}

fn write_toml<T: Serialize>(path: &Path, value: &T) {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    match toml::to_string(value) {
        Ok(contents) => {
            if let Ok(mut file) = fs::File::create(path) {
                let _ = file.write_all(contents.as_bytes());
            }
        }
        Err(err) => debug!(path = %path.display(), "Skipping cache write: {err}"),
    }
}

fn prefs_path(cache_root: &Path) -> PathBuf {
    cache_root.join("prefs.toml")
}

pub fn load_prefs(cache_root: &Path) -> Option<ClientPrefs> {
    let data = fs::read_to_string(prefs_path(cache_root)).ok()?;
    toml::from_str(&data).ok()
}

pub fn save_prefs(cache_root: &Path, prefs: &ClientPrefs) {
    write_toml(&prefs_path(cache_root), prefs);
}

pub fn hash_dir(cache_root: &Path, track_id: &str) -> PathBuf {
    let mut hasher = Sha256::new();
    hasher.update(track_id.as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    cache_root.join(hash)
}

fn sync_path(cache_root: &Path, track_id: &str) -> PathBuf {
    hash_dir(cache_root, track_id).join("sync.toml")
}

pub fn load_sync_offset(cache_root: &Path, track_id: &str) -> Option<i32> {
    let data = fs::read_to_string(sync_path(cache_root, track_id)).ok()?;
    let entry: SyncEntry = toml::from_str(&data).ok()?;
    Some(entry.offset_ms)
}

pub fn save_sync_offset(cache_root: &Path, track_id: &str, offset_ms: i32) {
    write_toml(&sync_path(cache_root, track_id), &SyncEntry { offset_ms });
}
