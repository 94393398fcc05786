//! Terminal driver for a read-along session.
//!
//! Responsibilities here are intentionally minimal:
//! - Parse command-line arguments.
//! - Load user configuration from `conf/config.toml` plus cached preferences.
//! - Run the session on a frame loop, reading commands from stdin and
//!   printing the highlighted sentence as it moves.

mod commands;

use crate::commands::{DriverCommand, HELP, parse_command};
use anyhow::{Context, Result, anyhow};
use readalong_core::backend::HttpBackend;
use readalong_core::cache::{load_prefs, load_sync_offset};
use readalong_core::config::load_config;
use readalong_core::playback::WallClockPlayback;
use readalong_core::runtime::{EffectRuntime, FrameLoop};
use readalong_core::session::{Effect, LoadState, ReadAlongSession, SyncSettings};
use std::env;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

type ReloadHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;
type Session = ReadAlongSession<WallClockPlayback>;

const USAGE: &str =
    "Usage: readalong <track-id> [--voice ID] [--config PATH] [--duration SECS]";

#[derive(Debug, Clone, PartialEq)]
struct CliArgs {
    track_id: String,
    voice_id: String,
    config_path: PathBuf,
    duration: Option<f64>,
}

fn main() {
    let reload_handle = init_tracing();
    if let Err(err) = run(&reload_handle) {
        error!("{err:?}");
        std::process::exit(1);
    }
}

fn run(reload_handle: &ReloadHandle) -> Result<()> {
    let args = parse_args(env::args().skip(1))?;
    let mut config = load_config(&args.config_path);
    let cache_root = config.cache_root();
    if let Some(prefs) = load_prefs(&cache_root) {
        info!("Loaded reader preferences from cache");
        prefs.apply_to(&mut config);
    }
    set_log_level(reload_handle, config.log_level.as_filter_str());
    info!(
        track = %args.track_id,
        voice = %args.voice_id,
        backend = %config.backend_url,
        level = %config.log_level,
        "Starting read-along driver"
    );

    let offset_ms = load_sync_offset(&cache_root, &args.track_id).unwrap_or(0);
    if offset_ms != 0 {
        info!(offset_ms, "Resuming with cached sync offset");
    }
    let backend = HttpBackend::new(
        &config.backend_url,
        config.request_timeout(),
        &config.user_agent,
    )
    .context("Failed to set up the read-along backend")?;

    let mut session = ReadAlongSession::new(
        args.track_id.clone(),
        args.voice_id.clone(),
        SyncSettings::from(&config),
        WallClockPlayback::new(args.duration),
        offset_ms,
    );
    let runtime = EffectRuntime::new(Arc::new(backend), session.reload_generations(), cache_root);
    let frames = FrameLoop::new(config.frame_interval());

    let stop = frames.stop_handle();
    if let Err(err) = ctrlc::set_handler(move || {
        info!("Received Ctrl+C; stopping the read-along driver");
        stop.store(true, Ordering::SeqCst);
    }) {
        warn!("Failed to install Ctrl+C signal handler: {err}");
    }

    let commands = spawn_stdin_reader();
    let mut view = DriverView::default();
    println!("{HELP}");
    let opened = runtime.dispatch(session.open(Instant::now()));
    view.render(&session, &opened);

    let ticks = frames.run(|now| {
        for completion in runtime.drain() {
            let effects = runtime.dispatch(session.apply_completion(completion, now));
            view.render(&session, &effects);
        }
        loop {
            match commands.try_recv() {
                Ok(DriverCommand::Session(command)) => {
                    let event = session.apply_command(command, now);
                    let effects = runtime.dispatch(event.effects);
                    view.render(&session, &effects);
                }
                Ok(DriverCommand::Status) => print_status(&session),
                Ok(DriverCommand::Help) => println!("{HELP}"),
                Ok(DriverCommand::Quit) | Err(TryRecvError::Disconnected) => return false,
                Err(TryRecvError::Empty) => break,
            }
        }
        let effects = runtime.dispatch(session.on_frame(now));
        view.render(&session, &effects);
        true
    });

    session.close();
    info!(ticks, "Read-along driver stopped");
    Ok(())
}

fn parse_args<I>(args: I) -> Result<CliArgs>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let mut track_id = None;
    let mut voice_id = "default".to_string();
    let mut config_path = PathBuf::from("conf/config.toml");
    let mut duration = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--voice" => voice_id = args.next().ok_or_else(|| anyhow!(USAGE))?,
            "--config" => {
                config_path = args.next().map(PathBuf::from).ok_or_else(|| anyhow!(USAGE))?
            }
            "--duration" => {
                let raw = args.next().ok_or_else(|| anyhow!(USAGE))?;
                let secs: f64 = raw
                    .parse()
                    .map_err(|_| anyhow!("Invalid duration: {raw}"))?;
                duration = Some(secs);
            }
            flag if flag.starts_with("--") => return Err(anyhow!("Unknown flag {flag}\n{USAGE}")),
            other if track_id.is_none() => track_id = Some(other.to_string()),
            _ => return Err(anyhow!(USAGE)),
        }
    }

    Ok(CliArgs {
        track_id: track_id.ok_or_else(|| anyhow!(USAGE))?,
        voice_id,
        config_path,
        duration,
    })
}

/// Commands parsed off stdin. End of input counts as quit.
fn spawn_stdin_reader() -> Receiver<DriverCommand> {
    let (tx, rx) = mpsc::channel();
    let spawned = thread::Builder::new()
        .name("readalong-stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                match parse_command(&line) {
                    Ok(Some(command)) => {
                        let quit = command == DriverCommand::Quit;
                        if tx.send(command).is_err() || quit {
                            return;
                        }
                    }
                    Ok(None) => {}
                    Err(err) => eprintln!("{err}"),
                }
            }
            let _ = tx.send(DriverCommand::Quit);
        });
    if let Err(err) = spawned {
        warn!("Failed to start stdin reader: {err}");
    }
    rx
}

/// What the terminal last showed, so unchanged frames print nothing.
#[derive(Default)]
struct DriverView {
    load_state: Option<LoadState>,
}

impl DriverView {
    fn render(&mut self, session: &Session, effects: &[Effect]) {
        let state = session.load_state();
        if self.load_state.as_ref() != Some(state) {
            self.load_state = Some(state.clone());
            let snapshot = session.snapshot();
            match state {
                LoadState::Ready => println!(
                    "-- page {}/{} ({} words, {} mode)",
                    snapshot.current_page + 1,
                    snapshot.total_pages.max(1),
                    snapshot.total_words,
                    snapshot.paging_mode
                ),
                LoadState::Failed { message } => {
                    println!("-- load failed: {message} (type retry)")
                }
                LoadState::Loading { .. } => println!("-- loading..."),
                LoadState::Empty => {}
            }
        }

        for effect in effects {
            match effect {
                Effect::ScrollIntoView { sentence } => {
                    let snapshot = session.snapshot();
                    if let Some(view) = snapshot.sentences.iter().find(|s| s.index == *sentence) {
                        println!(
                            "[{:>7.2}s] #{} {}",
                            snapshot.playback.effective_time, view.index, view.text
                        );
                    }
                }
                Effect::ScrollToMatch { tokens } => {
                    let snapshot = session.snapshot();
                    let position = snapshot
                        .search
                        .current_match
                        .map(|current| format!("{}/{}", current + 1, snapshot.search.match_count))
                        .unwrap_or_default();
                    println!("-- match {position} at tokens {}..{}", tokens.start, tokens.end);
                }
                _ => {}
            }
        }
    }
}

fn print_status(session: &Session) {
    let snapshot = session.snapshot();
    println!(
        "-- {} / {} | t={:.2}s (raw {:.2}s) offset={}ms {} | page {}/{} {} | sentence {:?} word {:?} | seek {} nav {} | search {:?} [{}] {} matches | theme {} highlight {}",
        snapshot.track_id,
        snapshot.voice_id,
        snapshot.playback.effective_time,
        snapshot.playback.raw_time,
        snapshot.playback.offset_ms,
        if snapshot.playback.paused { "paused" } else { "playing" },
        snapshot.current_page + 1,
        snapshot.total_pages.max(1),
        snapshot.paging_mode,
        snapshot.active_sentence,
        snapshot.active_word,
        snapshot.seek_phase,
        snapshot.navigation_phase,
        snapshot.search.query,
        snapshot.search.phase,
        snapshot.search.match_count,
        snapshot.theme,
        if snapshot.highlighting_enabled { "on" } else { "off" },
    );
}

fn init_tracing() -> ReloadHandle {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    let (filter_layer, handle) = reload::Layer::new(env_filter);
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_filter(filter_layer),
        )
        .init();
    warn!("Logging initialized; override level with config.log_level or RUST_LOG");
    handle
}

fn set_log_level(handle: &ReloadHandle, level: &str) {
    let parsed = EnvFilter::builder()
        .parse(level)
        .unwrap_or_else(|_| EnvFilter::new("debug"));
    if let Err(err) = handle.modify(|filter| *filter = parsed.clone()) {
        warn!(%level, "Failed to update log level from config: {err}");
    } else {
        info!(%level, "Applied log level from config");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<CliArgs> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn parses_track_and_flags() {
        let parsed = args(&["book-7", "--voice", "amy", "--duration", "95.5"]).expect("valid args");
        assert_eq!(parsed.track_id, "book-7");
        assert_eq!(parsed.voice_id, "amy");
        assert_eq!(parsed.duration, Some(95.5));
        assert_eq!(parsed.config_path, PathBuf::from("conf/config.toml"));
    }

    #[test]
    fn rejects_missing_track_and_unknown_flags() {
        assert!(args(&[]).is_err());
        assert!(args(&["book", "--speed", "2"]).is_err());
        assert!(args(&["book", "--voice"]).is_err());
        assert!(args(&["book", "other"]).is_err());
    }
}
