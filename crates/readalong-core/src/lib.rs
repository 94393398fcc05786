//! Read-along synchronization engine.
//!
//! The crate maps a stream of timed words onto sentences, follows the audio
//! clock to decide which sentence is being spoken, pages long documents in
//! and out as playback moves, and coordinates seeks and searches against the
//! read-along backend. Rendering is left to the host: everything visible is
//! exposed through [`session::ReadAlongSnapshot`].

pub mod backend;
pub mod cache;
pub mod clock;
pub mod config;
pub mod generation;
pub mod highlight;
pub mod pagination;
pub mod playback;
pub mod runtime;
pub mod search;
pub mod seek;
pub mod session;
pub mod timing;
pub mod token;

use std::fs;
use std::path::Path;
use ts_rs::TS;

fn export_single_type<T: TS + 'static>(out_dir: &Path) -> Result<(), String> {
    T::export_all_to(out_dir).map_err(|err| err.to_string())
}

/// Write TypeScript definitions for every type a host UI consumes.
pub fn export_ts_bindings(out_dir: &Path) -> Result<(), String> {
    fs::create_dir_all(out_dir)
        .map_err(|err| format!("Failed to create {}: {err}", out_dir.display()))?;

    for entry in fs::read_dir(out_dir)
        .map_err(|err| format!("Failed to list {}: {err}", out_dir.display()))?
    {
        let entry = entry.map_err(|err| format!("Failed to read entry: {err}"))?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) == Some("ts") {
            fs::remove_file(&path)
                .map_err(|err| format!("Failed to remove {}: {err}", path.display()))?;
        }
    }

    export_single_type::<token::Token>(out_dir)?;
    export_single_type::<token::TokenKind>(out_dir)?;
    export_single_type::<pagination::PagingMode>(out_dir)?;
    export_single_type::<search::SearchMode>(out_dir)?;
    export_single_type::<search::ServerMatch>(out_dir)?;
    export_single_type::<config::ThemeMode>(out_dir)?;
    export_single_type::<session::LoadState>(out_dir)?;
    export_single_type::<session::SentenceView>(out_dir)?;
    export_single_type::<session::TokenSpanView>(out_dir)?;
    export_single_type::<session::SearchView>(out_dir)?;
    export_single_type::<session::PlaybackView>(out_dir)?;
    export_single_type::<session::ReadAlongSnapshot>(out_dir)?;
    Ok(())
}
