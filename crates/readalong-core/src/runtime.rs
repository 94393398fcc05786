//! Effect execution for hosts without their own async runtime.
//!
//! Network effects run on short-lived worker threads and report back through
//! a channel; local effects (persistence) run inline; UI effects are handed
//! back to the host untouched.

use crate::backend::{ContentRequest, PageInfoRequest, ReadAlongBackend, SearchQuery};
use crate::cache::{save_prefs, save_sync_offset};
use crate::generation::GenerationCounter;
use crate::session::{Completion, Effect, PageQueryPurpose};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum NetworkJob {
    Content {
        generation: u64,
        request: ContentRequest,
    },
    PageInfo {
        generation: u64,
        purpose: PageQueryPurpose,
        request: PageInfoRequest,
    },
    Search {
        generation: u64,
        query: SearchQuery,
    },
}

impl NetworkJob {
    pub fn from_effect(effect: &Effect) -> Option<Self> {
        match effect {
            Effect::FetchContent {
                generation,
                request,
            } => Some(NetworkJob::Content {
                generation: *generation,
                request: request.clone(),
            }),
            Effect::ResolvePage {
                generation,
                purpose,
                request,
            } => Some(NetworkJob::PageInfo {
                generation: *generation,
                purpose: *purpose,
                request: request.clone(),
            }),
            Effect::Search { generation, query } => Some(NetworkJob::Search {
                generation: *generation,
                query: query.clone(),
            }),
            _ => None,
        }
    }

    /// Run the request on the calling thread.
    pub fn run(self, backend: &dyn ReadAlongBackend) -> Completion {
        match self {
            NetworkJob::Content {
                generation,
                request,
            } => Completion::ContentLoaded {
                generation,
                result: backend
                    .fetch_content(&request)
                    .map_err(|err| format!("{err:#}")),
            },
            NetworkJob::PageInfo {
                generation,
                purpose,
                request,
            } => Completion::PageResolved {
                generation,
                purpose,
                result: backend
                    .page_for_time(&request)
                    .map_err(|err| format!("{err:#}")),
            },
            NetworkJob::Search { generation, query } => Completion::SearchFinished {
                generation,
                result: backend.search(&query).map_err(|err| format!("{err:#}")),
            },
        }
    }
}

/// Run a job unless a newer content reload already superseded it.
fn execute_job(
    backend: &dyn ReadAlongBackend,
    reloads: &GenerationCounter,
    job: NetworkJob,
) -> Option<Completion> {
    if let NetworkJob::Content { generation, .. } = &job {
        if let Err(err) = reloads.check_current(*generation, "fetch_content") {
            debug!("Skipping superseded content fetch: {err}");
            return None;
        }
    }
    Some(job.run(backend))
}

pub struct EffectRuntime {
    backend: Arc<dyn ReadAlongBackend>,
    reloads: GenerationCounter,
    cache_root: PathBuf,
    tx: Sender<Completion>,
    rx: Receiver<Completion>,
}

impl EffectRuntime {
    pub fn new(
        backend: Arc<dyn ReadAlongBackend>,
        reloads: GenerationCounter,
        cache_root: PathBuf,
    ) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            backend,
            reloads,
            cache_root,
            tx,
            rx,
        }
    }

    /// Start network effects, persist local ones, and return the effects the
    /// host has to render.
    pub fn dispatch(&self, effects: Vec<Effect>) -> Vec<Effect> {
        let mut host_effects = Vec::new();
        for effect in effects {
            if let Some(job) = NetworkJob::from_effect(&effect) {
                self.spawn(job);
                continue;
            }
            match effect {
                Effect::SavePrefs(prefs) => save_prefs(&self.cache_root, &prefs),
                Effect::SaveSyncOffset {
                    track_id,
                    offset_ms,
                } => save_sync_offset(&self.cache_root, &track_id, offset_ms),
                other => host_effects.push(other),
            }
        }
        host_effects
    }

    fn spawn(&self, job: NetworkJob) {
        let backend = Arc::clone(&self.backend);
        let reloads = self.reloads.clone();
        let tx = self.tx.clone();
        let spawned = thread::Builder::new()
            .name("readalong-fetch".to_string())
            .spawn(move || {
                if let Some(completion) = execute_job(backend.as_ref(), &reloads, job) {
                    let _ = tx.send(completion);
                }
            });
        if let Err(err) = spawned {
            warn!("Failed to spawn fetch worker: {err}");
        }
    }

    /// Completions that arrived since the last call.
    pub fn drain(&self) -> Vec<Completion> {
        self.rx.try_iter().collect()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<Completion> {
        self.rx.recv_timeout(timeout).ok()
    }
}

/// Fixed-interval tick loop with an external stop switch.
#[derive(Debug, Clone)]
pub struct FrameLoop {
    interval: Duration,
    stop: Arc<AtomicBool>,
}

impl FrameLoop {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that ends the loop when set, e.g. from a Ctrl-C handler.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Call `tick` every interval until it returns false or the loop is
    /// stopped. Returns the number of ticks run.
    pub fn run<F>(&self, mut tick: F) -> u64
    where
        F: FnMut(Instant) -> bool,
    {
        let mut ticks = 0u64;
        while !self.is_stopped() {
            let started = Instant::now();
            ticks += 1;
            if !tick(started) {
                break;
            }
            let elapsed = started.elapsed();
            if elapsed < self.interval {
                thread::sleep(self.interval - elapsed);
            }
        }
        ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::load_sync_offset;
    use crate::search::ServerMatch;
    use crate::token::ReadAlongPage;
    use anyhow::{Result, anyhow};
    use std::sync::Mutex;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[derive(Default)]
    struct RecordingBackend {
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl ReadAlongBackend for RecordingBackend {
        fn fetch_content(&self, request: &ContentRequest) -> Result<ReadAlongPage> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(format!("content:{:?}", request.page));
            }
            Ok(ReadAlongPage {
                total_words: 3,
                ..ReadAlongPage::default()
            })
        }

        fn page_for_time(&self, request: &PageInfoRequest) -> Result<usize> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(format!("page-info:{}", request.time));
            }
            Err(anyhow!("service unavailable"))
        }

        fn search(&self, query: &SearchQuery) -> Result<Vec<ServerMatch>> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(format!("search:{}", query.query));
            }
            Ok(vec![ServerMatch {
                word_index: 1,
                page: 0,
            }])
        }
    }

    fn content_request(page: Option<usize>) -> ContentRequest {
        ContentRequest {
            track_id: "t".to_string(),
            voice_id: "v".to_string(),
            page,
            page_size: 500,
        }
    }

    #[test]
    fn superseded_content_fetch_never_reaches_backend() {
        let backend = RecordingBackend::default();
        let calls = Arc::clone(&backend.calls);
        let reloads = GenerationCounter::new();
        let stale = reloads.advance();
        let current = reloads.advance();

        let skipped = execute_job(
            &backend,
            &reloads,
            NetworkJob::Content {
                generation: stale,
                request: content_request(Some(0)),
            },
        );
        assert!(skipped.is_none());

        let done = execute_job(
            &backend,
            &reloads,
            NetworkJob::Content {
                generation: current,
                request: content_request(Some(1)),
            },
        );
        assert!(matches!(
            done,
            Some(Completion::ContentLoaded { generation, result: Ok(_) }) if generation == current
        ));
        assert_eq!(
            calls.lock().map(|calls| calls.clone()).unwrap_or_default(),
            vec!["content:Some(1)".to_string()]
        );
    }

    #[test]
    fn backend_errors_become_completion_errors() {
        let backend = RecordingBackend::default();
        let completion = NetworkJob::PageInfo {
            generation: 4,
            purpose: PageQueryPurpose::AutoNavigate,
            request: PageInfoRequest {
                track_id: "t".to_string(),
                voice_id: "v".to_string(),
                time: 12.5,
                page_size: 500,
            },
        }
        .run(&backend);
        assert!(matches!(
            completion,
            Completion::PageResolved { generation: 4, result: Err(ref message), .. }
                if message.contains("service unavailable")
        ));
    }

    #[test]
    fn dispatch_runs_network_on_workers_and_persists_locally() {
        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let cache_root = std::env::temp_dir().join(format!("readalong-runtime-{nonce}"));
        let runtime = EffectRuntime::new(
            Arc::new(RecordingBackend::default()),
            GenerationCounter::new(),
            cache_root.clone(),
        );

        let host = runtime.dispatch(vec![
            Effect::Search {
                generation: 1,
                query: SearchQuery {
                    track_id: "t".to_string(),
                    voice_id: "v".to_string(),
                    query: "fox".to_string(),
                    page_size: 500,
                },
            },
            Effect::SaveSyncOffset {
                track_id: "t".to_string(),
                offset_ms: 150,
            },
            Effect::ScrollIntoView { sentence: 3 },
        ]);

        assert_eq!(host, vec![Effect::ScrollIntoView { sentence: 3 }]);
        assert_eq!(load_sync_offset(&cache_root, "t"), Some(150));
        let completion = runtime
            .recv_timeout(Duration::from_secs(5))
            .expect("search completion");
        assert!(matches!(
            completion,
            Completion::SearchFinished { generation: 1, result: Ok(ref matches) } if matches.len() == 1
        ));

        let _ = std::fs::remove_dir_all(&cache_root);
    }

    #[test]
    fn frame_loop_stops_when_tick_declines() {
        let frames = FrameLoop::new(Duration::from_millis(1));
        let mut seen = 0;
        let ticks = frames.run(|_| {
            seen += 1;
            seen < 3
        });
        assert_eq!(ticks, 3);

        frames.stop();
        assert_eq!(frames.run(|_| true), 0);
    }
}
