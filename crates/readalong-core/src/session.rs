//! The read-along session: one open document, its audio and every controller
//! that keeps them in step.
//!
//! The session never blocks and never talks to the network. Each entry point
//! takes the caller's `now`, updates state, and returns the [`Effect`]s the
//! host must run. Network effects come back later as [`Completion`]s, tagged
//! with the generation they were issued under so late answers are dropped.

use crate::backend::{ContentRequest, PageInfoRequest, SearchQuery};
use crate::cache::ClientPrefs;
use crate::clock::PlaybackClock;
use crate::config::{AppConfig, ThemeMode};
use crate::generation::GenerationCounter;
use crate::highlight::HighlightDriver;
use crate::pagination::{
    PageInfoOutcome, PageLayout, PaginationController, PagingMode, clamp_page_size,
    page_for_word,
};
use crate::playback::{PlaybackContext, PlaybackEvent};
use crate::search::{
    PageRestore, SearchController, SearchMode, SearchTarget, ServerMatch, resolve_tokens,
};
use crate::seek::{PageResolution, SeekCoordinator, SeekPhase, SeekPlan, progress_target};
use crate::timing::{MAX_SENTENCE_GAP_SECS, MIN_SENTENCE_GAP_SECS, TimingIndex, TimingOptions};
use crate::token::{PageContent, ReadAlongPage};
use serde::Serialize;
use std::ops::Range;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use ts_rs::TS;

/// Engine tuning resolved from [`AppConfig`] and stored preferences.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    pub boundary_padding_secs: f64,
    pub untimed_sentence_secs: f64,
    pub highlight_hold: Duration,
    pub highlighting_enabled: bool,
    pub page_size: usize,
    pub paging_mode: PagingMode,
    pub navigation_throttle: Duration,
    pub navigation_cooldown: Duration,
    pub sentence_gap_secs: f64,
    pub search_debounce: Duration,
    pub expand_search_to_full_document: bool,
    pub seek_tolerance_secs: f64,
    pub theme: ThemeMode,
}

impl From<&AppConfig> for SyncSettings {
    fn from(config: &AppConfig) -> Self {
        SyncSettings {
            boundary_padding_secs: config.boundary_padding_secs,
            untimed_sentence_secs: config.untimed_sentence_secs,
            highlight_hold: Duration::from_millis(config.highlight_hold_ms),
            highlighting_enabled: config.highlighting_enabled,
            page_size: clamp_page_size(config.page_size),
            paging_mode: config.paging_mode,
            navigation_throttle: Duration::from_millis(config.navigation_throttle_ms),
            navigation_cooldown: Duration::from_millis(config.navigation_cooldown_ms),
            sentence_gap_secs: config
                .sentence_gap_secs
                .clamp(MIN_SENTENCE_GAP_SECS, MAX_SENTENCE_GAP_SECS),
            search_debounce: Duration::from_millis(config.search_debounce_ms),
            expand_search_to_full_document: config.expand_search_to_full_document,
            seek_tolerance_secs: config.seek_tolerance_secs,
            theme: config.theme,
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings::from(&AppConfig::default())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, TS)]
#[serde(tag = "state", rename_all = "snake_case")]
#[ts(export)]
pub enum LoadState {
    Empty,
    Loading { generation: u64 },
    Ready,
    Failed { message: String },
}

/// Why a content reload was issued; decides what happens when it lands.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadPurpose {
    Initial,
    Navigate,
    AutoNavigate,
    Seek,
    SearchJump { target: ServerMatch },
    SearchRestore,
    VoiceSwitch { previous_voice: String },
    VoiceRevert,
    Retry,
    ModeChange,
}

impl LoadPurpose {
    pub fn label(&self) -> &'static str {
        match self {
            LoadPurpose::Initial => "initial",
            LoadPurpose::Navigate => "navigate",
            LoadPurpose::AutoNavigate => "auto-navigate",
            LoadPurpose::Seek => "seek",
            LoadPurpose::SearchJump { .. } => "search-jump",
            LoadPurpose::SearchRestore => "search-restore",
            LoadPurpose::VoiceSwitch { .. } => "voice-switch",
            LoadPurpose::VoiceRevert => "voice-revert",
            LoadPurpose::Retry => "retry",
            LoadPurpose::ModeChange => "mode-change",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageQueryPurpose {
    AutoNavigate,
    Seek,
}

/// Work the host runs on the session's behalf.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    FetchContent {
        generation: u64,
        request: ContentRequest,
    },
    ResolvePage {
        generation: u64,
        purpose: PageQueryPurpose,
        request: PageInfoRequest,
    },
    Search {
        generation: u64,
        query: SearchQuery,
    },
    ScrollIntoView {
        sentence: usize,
    },
    ScrollToMatch {
        tokens: Range<usize>,
    },
    SavePrefs(ClientPrefs),
    SaveSyncOffset {
        track_id: String,
        offset_ms: i32,
    },
}

impl Effect {
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            Effect::FetchContent { .. } | Effect::ResolvePage { .. } | Effect::Search { .. }
        )
    }
}

/// Result of a network effect, applied back on the session's thread.
#[derive(Debug, Clone)]
pub enum Completion {
    ContentLoaded {
        generation: u64,
        result: Result<ReadAlongPage, String>,
    },
    PageResolved {
        generation: u64,
        purpose: PageQueryPurpose,
        result: Result<usize, String>,
    },
    SearchFinished {
        generation: u64,
        result: Result<Vec<ServerMatch>, String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    GetSnapshot,
    Play,
    Pause,
    TogglePlayPause,
    SeekTo { seconds: f64 },
    SentenceClick { sentence: usize },
    WordClick { token: usize },
    ProgressBarClick { x: f64, width: f64 },
    SearchSetQuery { query: String },
    SearchNext,
    SearchPrev,
    SearchClear,
    NudgeOffset { steps: i32 },
    SetOffset { offset_ms: i32 },
    SwitchVoice { voice_id: String },
    SetPagingMode { mode: PagingMode },
    SetPageSize { page_size: usize },
    SetSentenceGap { secs: f64 },
    ToggleHighlighting,
    ToggleTheme,
    NextPage,
    PrevPage,
    SetPage { page: usize },
    Retry,
}

impl SessionCommand {
    pub fn action(&self) -> &'static str {
        match self {
            Self::GetSnapshot => "readalong_get_snapshot",
            Self::Play => "readalong_play",
            Self::Pause => "readalong_pause",
            Self::TogglePlayPause => "readalong_toggle_play_pause",
            Self::SeekTo { .. } => "readalong_seek_to",
            Self::SentenceClick { .. } => "readalong_sentence_click",
            Self::WordClick { .. } => "readalong_word_click",
            Self::ProgressBarClick { .. } => "readalong_progress_bar_click",
            Self::SearchSetQuery { .. } => "readalong_search_set_query",
            Self::SearchNext => "readalong_search_next",
            Self::SearchPrev => "readalong_search_prev",
            Self::SearchClear => "readalong_search_clear",
            Self::NudgeOffset { .. } => "readalong_nudge_offset",
            Self::SetOffset { .. } => "readalong_set_offset",
            Self::SwitchVoice { .. } => "readalong_switch_voice",
            Self::SetPagingMode { .. } => "readalong_set_paging_mode",
            Self::SetPageSize { .. } => "readalong_set_page_size",
            Self::SetSentenceGap { .. } => "readalong_set_sentence_gap",
            Self::ToggleHighlighting => "readalong_toggle_highlighting",
            Self::ToggleTheme => "readalong_toggle_theme",
            Self::NextPage => "readalong_next_page",
            Self::PrevPage => "readalong_prev_page",
            Self::SetPage { .. } => "readalong_set_page",
            Self::Retry => "readalong_retry",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    pub action: &'static str,
    pub effects: Vec<Effect>,
}

#[derive(Debug, Clone, Serialize, PartialEq, TS)]
#[ts(export)]
pub struct SentenceView {
    pub index: usize,
    pub text: String,
    pub start_time: f64,
    pub end_time: f64,
    pub first_word: Option<usize>,
    pub word_count: usize,
    pub timed: bool,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, TS)]
#[ts(export)]
pub struct TokenSpanView {
    pub start: usize,
    pub end: usize,
}

impl From<&Range<usize>> for TokenSpanView {
    fn from(range: &Range<usize>) -> Self {
        TokenSpanView {
            start: range.start,
            end: range.end,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, TS)]
#[ts(export)]
pub struct SearchView {
    pub query: String,
    pub phase: String,
    pub mode: Option<SearchMode>,
    pub match_count: usize,
    pub current_match: Option<usize>,
    pub page_matches: Vec<TokenSpanView>,
    pub selected: Option<TokenSpanView>,
}

#[derive(Debug, Clone, Serialize, PartialEq, TS)]
#[ts(export)]
pub struct PlaybackView {
    pub raw_time: f64,
    pub effective_time: f64,
    pub duration: Option<f64>,
    pub paused: bool,
    pub offset_ms: i32,
}

#[derive(Debug, Clone, Serialize, PartialEq, TS)]
#[ts(export)]
pub struct ReadAlongSnapshot {
    pub track_id: String,
    pub voice_id: String,
    pub load_state: LoadState,
    pub theme: ThemeMode,
    pub highlighting_enabled: bool,
    pub paging_mode: PagingMode,
    pub page_size: usize,
    pub current_page: usize,
    pub total_pages: usize,
    pub total_words: usize,
    pub sentence_gap_secs: f64,
    pub navigation_phase: String,
    pub seek_phase: String,
    pub sentences: Vec<SentenceView>,
    pub active_sentence: Option<usize>,
    pub active_word: Option<usize>,
    pub search: SearchView,
    pub playback: PlaybackView,
}

#[derive(Debug, Clone)]
struct PendingLoad {
    generation: u64,
    request: ContentRequest,
    purpose: LoadPurpose,
}

pub struct ReadAlongSession<P: PlaybackContext> {
    track_id: String,
    voice_id: String,
    settings: SyncSettings,
    playback: P,
    clock: PlaybackClock,
    layout: PageLayout,
    content: Option<PageContent>,
    content_generation: u64,
    index: TimingIndex,
    highlight: HighlightDriver,
    pagination: PaginationController,
    search: SearchController,
    seek: SeekCoordinator,
    reloads: GenerationCounter,
    page_queries: GenerationCounter,
    load_state: LoadState,
    pending_load: Option<PendingLoad>,
    last_request: Option<ContentRequest>,
    duration: Option<f64>,
    active_word: Option<usize>,
    selected_match: Option<Range<usize>>,
    open: bool,
}

impl<P: PlaybackContext> ReadAlongSession<P> {
    pub fn new(
        track_id: impl Into<String>,
        voice_id: impl Into<String>,
        settings: SyncSettings,
        playback: P,
        offset_ms: i32,
    ) -> Self {
        let layout = PageLayout::new(settings.paging_mode, settings.page_size);
        Self {
            track_id: track_id.into(),
            voice_id: voice_id.into(),
            highlight: HighlightDriver::new(settings.highlight_hold),
            pagination: PaginationController::new(
                settings.navigation_throttle,
                settings.navigation_cooldown,
            ),
            search: SearchController::new(settings.search_debounce),
            seek: SeekCoordinator::new(settings.seek_tolerance_secs),
            settings,
            playback,
            clock: PlaybackClock::new(offset_ms),
            layout,
            content: None,
            content_generation: 0,
            index: TimingIndex::empty(),
            reloads: GenerationCounter::new(),
            page_queries: GenerationCounter::new(),
            load_state: LoadState::Empty,
            pending_load: None,
            last_request: None,
            duration: None,
            active_word: None,
            selected_match: None,
            open: false,
        }
    }

    pub fn track_id(&self) -> &str {
        &self.track_id
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Counter shared with the workers so they can skip superseded fetches.
    pub fn reload_generations(&self) -> GenerationCounter {
        self.reloads.clone()
    }

    pub fn playback(&self) -> &P {
        &self.playback
    }

    /// Host access to the audio element. Seeks must go through
    /// [`SessionCommand::SeekTo`] instead.
    pub fn playback_mut(&mut self) -> &mut P {
        &mut self.playback
    }

    pub fn load_state(&self) -> &LoadState {
        &self.load_state
    }

    pub fn active_sentence(&self) -> Option<usize> {
        self.highlight.current()
    }

    pub fn prefs(&self) -> ClientPrefs {
        ClientPrefs {
            theme: self.settings.theme,
            page_size: self.layout.page_size,
            paging_mode: self.settings.paging_mode,
            sentence_gap_secs: self.settings.sentence_gap_secs,
            highlighting_enabled: self.settings.highlighting_enabled,
        }
    }

    pub fn open(&mut self, _now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.open {
            return effects;
        }
        info!(track = %self.track_id, voice = %self.voice_id, mode = %self.layout.mode, "Opening read-along session");
        self.open = true;
        self.issue_reload(0, self.voice_id.clone(), LoadPurpose::Initial, &mut effects);
        effects
    }

    /// Stop reacting to anything. Late ticks, events and completions become
    /// no-ops.
    pub fn close(&mut self) {
        if !self.open {
            return;
        }
        info!(track = %self.track_id, "Closing read-along session");
        self.open = false;
        self.playback.pause();
        self.pending_load = None;
        self.seek.cancel();
        self.pagination.abandon();
        self.search.clear();
        self.highlight.clear();
        self.active_word = None;
        self.selected_match = None;
    }

    /// One frame: drain audio events, move the highlight, and run the
    /// time-based controllers.
    pub fn on_frame(&mut self, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();
        if !self.open {
            return effects;
        }
        for event in self.playback.poll_events() {
            self.handle_playback_event(event, now, &mut effects);
        }
        self.tick_highlight(now, &mut effects);
        self.poll_navigation(now, &mut effects);
        if let Some(request) = self.search.poll(now) {
            effects.push(Effect::Search {
                generation: request.generation,
                query: SearchQuery {
                    track_id: self.track_id.clone(),
                    voice_id: self.voice_id.clone(),
                    query: request.query,
                    page_size: self.layout.page_size,
                },
            });
        }
        effects
    }

    /// Drain pending audio events without a full frame.
    pub fn pump(&mut self, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();
        if !self.open {
            return effects;
        }
        for event in self.playback.poll_events() {
            self.handle_playback_event(event, now, &mut effects);
        }
        effects
    }

    pub fn on_playback_event(&mut self, event: PlaybackEvent, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.open {
            self.handle_playback_event(event, now, &mut effects);
        }
        effects
    }

    pub fn apply_command(&mut self, command: SessionCommand, now: Instant) -> SessionEvent {
        let action = command.action();
        let mut effects = Vec::new();
        if !self.open && command != SessionCommand::GetSnapshot {
            debug!(action, "Ignoring command on closed session");
            return SessionEvent { action, effects };
        }
        match command {
            SessionCommand::GetSnapshot => {}
            SessionCommand::Play => self.playback.play(),
            SessionCommand::Pause => self.playback.pause(),
            SessionCommand::TogglePlayPause => {
                if self.playback.is_paused() {
                    self.playback.play();
                } else {
                    self.playback.pause();
                }
            }
            SessionCommand::SeekTo { seconds } => self.handle_seek_to(seconds, &mut effects),
            SessionCommand::SentenceClick { sentence } => {
                self.handle_sentence_click(sentence, now, &mut effects)
            }
            SessionCommand::WordClick { token } => self.handle_word_click(token, now, &mut effects),
            SessionCommand::ProgressBarClick { x, width } => {
                self.handle_progress_bar_click(x, width, &mut effects)
            }
            SessionCommand::SearchSetQuery { query } => {
                self.selected_match = None;
                let restore = self.search.set_query(query, now);
                self.restore_after_search(restore, &mut effects);
            }
            SessionCommand::SearchNext => {
                if let Some(target) = self.search.next() {
                    self.focus_search_target(target, &mut effects);
                }
            }
            SessionCommand::SearchPrev => {
                if let Some(target) = self.search.previous() {
                    self.focus_search_target(target, &mut effects);
                }
            }
            SessionCommand::SearchClear => {
                self.selected_match = None;
                let restore = self.search.clear();
                self.restore_after_search(restore, &mut effects);
            }
            SessionCommand::NudgeOffset { steps } => {
                self.clock.nudge(steps);
                self.handle_offset_changed(now, &mut effects);
            }
            SessionCommand::SetOffset { offset_ms } => {
                self.clock.set_offset_ms(offset_ms);
                self.handle_offset_changed(now, &mut effects);
            }
            SessionCommand::SwitchVoice { voice_id } => {
                self.handle_switch_voice(voice_id, &mut effects)
            }
            SessionCommand::SetPagingMode { mode } => {
                self.handle_set_paging_mode(mode, &mut effects)
            }
            SessionCommand::SetPageSize { page_size } => {
                self.handle_set_page_size(page_size, &mut effects)
            }
            SessionCommand::SetSentenceGap { secs } => {
                self.handle_set_sentence_gap(secs, now, &mut effects)
            }
            SessionCommand::ToggleHighlighting => {
                self.handle_toggle_highlighting(now, &mut effects)
            }
            SessionCommand::ToggleTheme => {
                self.settings.theme = self.settings.theme.toggled();
                info!(theme = %self.settings.theme, "Theme toggled");
                effects.push(Effect::SavePrefs(self.prefs()));
            }
            SessionCommand::NextPage => {
                let page = self.layout.current_page + 1;
                if page < self.layout.total_pages {
                    self.handle_set_page(page, &mut effects);
                }
            }
            SessionCommand::PrevPage => {
                if let Some(page) = self.layout.current_page.checked_sub(1) {
                    self.handle_set_page(page, &mut effects);
                }
            }
            SessionCommand::SetPage { page } => self.handle_set_page(page, &mut effects),
            SessionCommand::Retry => self.handle_retry(&mut effects),
        }
        SessionEvent { action, effects }
    }

    pub fn apply_completion(&mut self, completion: Completion, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();
        if !self.open {
            return effects;
        }
        match completion {
            Completion::ContentLoaded { generation, result } => {
                self.handle_content_loaded(generation, result, now, &mut effects)
            }
            Completion::PageResolved {
                generation,
                purpose: PageQueryPurpose::AutoNavigate,
                result,
            } => match self.pagination.on_page_info(generation, result, &self.layout) {
                PageInfoOutcome::SwitchTo(page) if self.pending_load.is_none() => {
                    let reload = self.issue_reload(
                        page,
                        self.voice_id.clone(),
                        LoadPurpose::AutoNavigate,
                        &mut effects,
                    );
                    self.pagination.begin_reload(reload, page);
                }
                PageInfoOutcome::SwitchTo(page) => {
                    debug!(page, "Another reload is in flight; skipping automatic page switch");
                }
                PageInfoOutcome::Unchanged | PageInfoOutcome::Stale => {}
            },
            Completion::PageResolved {
                generation,
                purpose: PageQueryPurpose::Seek,
                result,
            } => match self
                .seek
                .on_page_resolved(generation, result, self.layout.current_page)
            {
                PageResolution::Stale => debug!(generation, "Ignoring stale seek page lookup"),
                PageResolution::SeekNow { target } => self.seek.apply(&mut self.playback, target),
                PageResolution::LoadPage { page, target } => {
                    debug!(page, target, "Loading page before seeking");
                    let reload = self.issue_reload(
                        page,
                        self.voice_id.clone(),
                        LoadPurpose::Seek,
                        &mut effects,
                    );
                    self.seek.bind_reload(reload);
                }
            },
            Completion::SearchFinished { generation, result } => {
                let content = self
                    .content
                    .as_ref()
                    .map(|content| (self.content_generation, content, &self.index));
                if let Some(target) = self.search.on_server_results(generation, result, content) {
                    self.focus_search_target(target, &mut effects);
                }
            }
        }
        effects
    }

    pub fn snapshot(&self) -> ReadAlongSnapshot {
        let sentences = match (&self.load_state, self.content.as_ref()) {
            (LoadState::Failed { .. }, _) | (_, None) => Vec::new(),
            (_, Some(content)) => self
                .index
                .sentences()
                .iter()
                .map(|sentence| SentenceView {
                    index: sentence.index,
                    text: content.text_for(sentence.tokens.clone()),
                    start_time: sentence.start_time,
                    end_time: sentence.end_time,
                    first_word: sentence.first_word,
                    word_count: sentence.word_count,
                    timed: sentence.timed,
                })
                .collect(),
        };
        let raw_time = self.playback.current_time();
        let results = self.search.results();
        let page_matches = self
            .content
            .as_ref()
            .map(|content| self.search.page_matches(self.content_generation, content))
            .unwrap_or_default();

        ReadAlongSnapshot {
            track_id: self.track_id.clone(),
            voice_id: self.voice_id.clone(),
            load_state: self.load_state.clone(),
            theme: self.settings.theme,
            highlighting_enabled: self.settings.highlighting_enabled,
            paging_mode: self.layout.mode,
            page_size: self.layout.page_size,
            current_page: self.layout.current_page,
            total_pages: self.layout.total_pages,
            total_words: self.layout.total_words,
            sentence_gap_secs: self.settings.sentence_gap_secs,
            navigation_phase: self.pagination.phase().label().to_string(),
            seek_phase: self.seek.phase().label().to_string(),
            sentences,
            active_sentence: self.highlight.current(),
            active_word: self.active_word,
            search: SearchView {
                query: self.search.query().to_string(),
                phase: self.search.phase().label().to_string(),
                mode: results.map(|results| results.mode()),
                match_count: results.map_or(0, |results| results.count()),
                current_match: results.and_then(|results| results.current()),
                page_matches: page_matches.iter().map(TokenSpanView::from).collect(),
                selected: self.selected_match.as_ref().map(TokenSpanView::from),
            },
            playback: PlaybackView {
                raw_time,
                effective_time: self.clock.effective_time(raw_time),
                duration: self.playback.duration().or(self.duration),
                paused: self.playback.is_paused(),
                offset_ms: self.clock.offset_ms(),
            },
        }
    }

    fn timing_options(&self) -> TimingOptions {
        TimingOptions {
            boundary_padding: self.settings.boundary_padding_secs,
            untimed_secs: self.settings.untimed_sentence_secs,
            gap_split: (self.layout.mode == PagingMode::Paged)
                .then_some(self.settings.sentence_gap_secs),
        }
    }

    fn rebuild_index(&mut self) {
        self.index = TimingIndex::from_content(self.content.as_ref(), &self.timing_options());
        self.highlight.clear();
        self.active_word = None;
        debug!(sentences = self.index.len(), "Rebuilt timing index");
    }

    fn effective_time(&self) -> f64 {
        self.clock.effective_time(self.playback.current_time())
    }

    fn page_info_request(&self, time: f64) -> PageInfoRequest {
        PageInfoRequest {
            track_id: self.track_id.clone(),
            voice_id: self.voice_id.clone(),
            time,
            page_size: self.layout.page_size,
        }
    }

    fn issue_reload(
        &mut self,
        page: usize,
        voice_id: String,
        purpose: LoadPurpose,
        effects: &mut Vec<Effect>,
    ) -> u64 {
        let generation = self.reloads.advance();
        let request = ContentRequest {
            track_id: self.track_id.clone(),
            voice_id,
            page: self.layout.request_page(page),
            page_size: self.layout.page_size,
        };
        info!(
            generation,
            page = ?request.page,
            voice = %request.voice_id,
            purpose = purpose.label(),
            "Requesting read-along content"
        );
        self.load_state = LoadState::Loading { generation };
        self.last_request = Some(request.clone());
        self.pending_load = Some(PendingLoad {
            generation,
            request: request.clone(),
            purpose,
        });
        effects.push(Effect::FetchContent {
            generation,
            request,
        });
        generation
    }

    fn handle_content_loaded(
        &mut self,
        generation: u64,
        result: Result<ReadAlongPage, String>,
        now: Instant,
        effects: &mut Vec<Effect>,
    ) {
        let Some(pending) = self
            .pending_load
            .take_if(|pending| pending.generation == generation)
        else {
            debug!(generation, "Dropping superseded content response");
            return;
        };

        let response = match result {
            Ok(response) => response,
            Err(message) => {
                self.pagination.on_load_failed(generation);
                self.seek.on_load_failed(generation);
                match pending.purpose {
                    LoadPurpose::VoiceSwitch { previous_voice } => {
                        warn!(
                            voice = %pending.request.voice_id,
                            "Voice switch failed; reverting to {previous_voice}: {message}"
                        );
                        let page = pending.request.page.unwrap_or(0);
                        self.issue_reload(page, previous_voice, LoadPurpose::VoiceRevert, effects);
                    }
                    purpose => {
                        warn!(
                            generation,
                            purpose = purpose.label(),
                            "Read-along content failed to load: {message}"
                        );
                        self.load_state = LoadState::Failed { message };
                    }
                }
                return;
            }
        };

        let request = pending.request;
        let word_offset = request.page.map_or(0, |page| page * request.page_size);
        let content = PageContent::from_response(response, request.page.unwrap_or(0), word_offset);
        self.layout
            .apply_loaded(request.page, content.total_words, content.total_pages);
        if content.duration.is_some() {
            self.duration = content.duration;
        }
        info!(
            generation,
            page = self.layout.current_page,
            total_pages = self.layout.total_pages,
            words = content.word_count(),
            "Read-along content loaded"
        );
        self.voice_id = request.voice_id;
        self.content = Some(content);
        self.content_generation = generation;
        self.load_state = LoadState::Ready;
        self.selected_match = None;
        self.rebuild_index();
        self.pagination.on_content_loaded(generation, now);
        if let Some(content) = self.content.as_ref() {
            self.search.refresh_local(generation, content, &self.index);
        }

        match pending.purpose {
            LoadPurpose::SearchJump { target } => {
                let token = self
                    .content
                    .as_ref()
                    .and_then(|content| content.token_for_global_word(target.word_index));
                match token {
                    Some(token) => self.select_match(token..token + 1, effects),
                    None => debug!(word = target.word_index, "Search match missing from loaded page"),
                }
            }
            LoadPurpose::VoiceRevert => info!(voice = %self.voice_id, "Reverted to previous voice"),
            _ => {}
        }

        match self.seek.on_content_loaded(generation) {
            Some(target) => self.seek.apply(&mut self.playback, target),
            None => self.tick_highlight(now, effects),
        }
    }

    fn handle_playback_event(&mut self, event: PlaybackEvent, now: Instant, effects: &mut Vec<Effect>) {
        match event {
            PlaybackEvent::TimeUpdate => {}
            PlaybackEvent::Seeked => {
                if self.seek.on_seeked() {
                    debug!("Seek acknowledged; resuming highlight");
                }
            }
            PlaybackEvent::Ended => info!(track = %self.track_id, "Playback ended"),
        }
        self.tick_highlight(now, effects);
    }

    fn tick_highlight(&mut self, now: Instant, effects: &mut Vec<Effect>) {
        if !self.settings.highlighting_enabled || self.seek.suspends_highlight() {
            return;
        }
        let time = self.effective_time();
        if let Some(change) = self.highlight.tick(&self.index, time, now) {
            debug!(previous = ?change.previous, current = ?change.current, time, "Active sentence changed");
            if let Some(sentence) = change.current {
                effects.push(Effect::ScrollIntoView { sentence });
            }
        }
        self.active_word = match (self.highlight.current(), self.content.as_ref()) {
            (Some(sentence), Some(content)) => {
                self.index.active_word(&content.tokens, sentence, time)
            }
            _ => None,
        };
    }

    fn poll_navigation(&mut self, now: Instant, effects: &mut Vec<Effect>) {
        if self.playback.is_paused()
            || self.pending_load.is_some()
            || !matches!(self.seek.phase(), SeekPhase::Idle)
        {
            return;
        }
        if !self.pagination.poll(&self.layout, now) {
            return;
        }
        let generation = self.page_queries.advance();
        self.pagination.begin_check(generation, now);
        effects.push(Effect::ResolvePage {
            generation,
            purpose: PageQueryPurpose::AutoNavigate,
            request: self.page_info_request(self.effective_time()),
        });
    }

    fn handle_seek_to(&mut self, target: f64, effects: &mut Vec<Effect>) {
        let needs_page = self.layout.is_multi_page();
        match self
            .seek
            .request(target, self.playback.current_time(), needs_page)
        {
            SeekPlan::NoOp => {}
            SeekPlan::SeekNow { target } => self.seek.apply(&mut self.playback, target),
            SeekPlan::ResolvePage { generation, target } => {
                effects.push(Effect::ResolvePage {
                    generation,
                    purpose: PageQueryPurpose::Seek,
                    request: self.page_info_request(self.clock.effective_time(target)),
                });
            }
        }
    }

    fn handle_progress_bar_click(&mut self, x: f64, width: f64, effects: &mut Vec<Effect>) {
        let duration = self.playback.duration().or(self.duration);
        match progress_target(x, width, duration) {
            Some(target) => self.handle_seek_to(target, effects),
            None => debug!(x, width, "Progress bar click without a known duration"),
        }
    }

    /// Seek to a point on the loaded page; no page lookup needed.
    fn seek_within_page(&mut self, target: f64) {
        if let SeekPlan::SeekNow { target } =
            self.seek
                .request(target, self.playback.current_time(), false)
        {
            self.seek.apply(&mut self.playback, target);
        }
    }

    fn activate_sentence(&mut self, sentence: usize, now: Instant, effects: &mut Vec<Effect>) {
        if !self.settings.highlighting_enabled {
            return;
        }
        if let Some(change) = self.highlight.activate(sentence, now) {
            if let Some(sentence) = change.current {
                effects.push(Effect::ScrollIntoView { sentence });
            }
        }
    }

    fn handle_sentence_click(&mut self, sentence: usize, now: Instant, effects: &mut Vec<Effect>) {
        let Some(start) = self.index.get(sentence).map(|found| found.start_time) else {
            debug!(sentence, "Click on unknown sentence");
            return;
        };
        self.seek_within_page(self.clock.raw_time_for(start));
        self.activate_sentence(sentence, now, effects);
    }

    fn handle_word_click(&mut self, token: usize, now: Instant, effects: &mut Vec<Effect>) {
        let timing = self
            .content
            .as_ref()
            .and_then(|content| content.tokens.get(token))
            .and_then(|found| found.timing());
        let Some(sentence) = self.index.sentence_for_token(token) else {
            debug!(token, "Click on a token outside every sentence");
            return;
        };
        match timing {
            Some((start, _)) => {
                self.seek_within_page(self.clock.raw_time_for(start));
                self.activate_sentence(sentence, now, effects);
            }
            None => self.handle_sentence_click(sentence, now, effects),
        }
    }

    fn handle_offset_changed(&mut self, now: Instant, effects: &mut Vec<Effect>) {
        let offset_ms = self.clock.offset_ms();
        info!(offset_ms, "Sync offset changed");
        effects.push(Effect::SaveSyncOffset {
            track_id: self.track_id.clone(),
            offset_ms,
        });
        self.tick_highlight(now, effects);
    }

    fn handle_switch_voice(&mut self, voice_id: String, effects: &mut Vec<Effect>) {
        if voice_id == self.voice_id {
            return;
        }
        info!(from = %self.voice_id, to = %voice_id, "Switching voice");
        let previous_voice = self.voice_id.clone();
        self.issue_reload(
            self.layout.current_page,
            voice_id,
            LoadPurpose::VoiceSwitch { previous_voice },
            effects,
        );
    }

    /// First word of the active sentence, or of the loaded page.
    fn anchor_word(&self) -> usize {
        self.highlight
            .current()
            .and_then(|sentence| self.index.get(sentence))
            .and_then(|sentence| sentence.first_word)
            .or_else(|| self.content.as_ref().map(|content| content.word_offset))
            .unwrap_or(0)
    }

    fn handle_set_paging_mode(&mut self, mode: PagingMode, effects: &mut Vec<Effect>) {
        self.settings.paging_mode = mode;
        self.search.discard_restore();
        effects.push(Effect::SavePrefs(self.prefs()));
        if mode == self.layout.mode {
            return;
        }
        let page = match mode {
            PagingMode::Paged => page_for_word(self.anchor_word(), self.layout.page_size),
            PagingMode::Full => 0,
        };
        info!(%mode, page, "Paging mode changed");
        self.layout.mode = mode;
        self.issue_reload(page, self.voice_id.clone(), LoadPurpose::ModeChange, effects);
    }

    fn handle_set_page_size(&mut self, page_size: usize, effects: &mut Vec<Effect>) {
        let page_size = clamp_page_size(page_size);
        if page_size == self.layout.page_size {
            return;
        }
        let anchor = self.anchor_word();
        info!(page_size, "Page size changed");
        self.layout.page_size = page_size;
        self.settings.page_size = page_size;
        effects.push(Effect::SavePrefs(self.prefs()));
        if self.layout.mode == PagingMode::Paged {
            let page = page_for_word(anchor, page_size);
            self.issue_reload(page, self.voice_id.clone(), LoadPurpose::ModeChange, effects);
        }
    }

    fn handle_set_sentence_gap(&mut self, secs: f64, now: Instant, effects: &mut Vec<Effect>) {
        if !secs.is_finite() {
            debug!(secs, "Ignoring non-finite sentence gap");
            return;
        }
        let secs = secs.clamp(MIN_SENTENCE_GAP_SECS, MAX_SENTENCE_GAP_SECS);
        if secs == self.settings.sentence_gap_secs {
            return;
        }
        self.settings.sentence_gap_secs = secs;
        effects.push(Effect::SavePrefs(self.prefs()));
        if self.layout.mode == PagingMode::Paged {
            self.rebuild_index();
            self.tick_highlight(now, effects);
        }
    }

    fn handle_toggle_highlighting(&mut self, now: Instant, effects: &mut Vec<Effect>) {
        self.settings.highlighting_enabled = !self.settings.highlighting_enabled;
        info!(enabled = self.settings.highlighting_enabled, "Highlighting toggled");
        if self.settings.highlighting_enabled {
            self.tick_highlight(now, effects);
        } else {
            self.highlight.clear();
            self.active_word = None;
        }
        effects.push(Effect::SavePrefs(self.prefs()));
    }

    fn handle_set_page(&mut self, page: usize, effects: &mut Vec<Effect>) {
        if self.layout.mode != PagingMode::Paged {
            return;
        }
        let page = page.min(self.layout.total_pages.saturating_sub(1));
        if page == self.layout.current_page && self.pending_load.is_none() {
            return;
        }
        self.issue_reload(page, self.voice_id.clone(), LoadPurpose::Navigate, effects);
    }

    fn handle_retry(&mut self, effects: &mut Vec<Effect>) {
        if !matches!(self.load_state, LoadState::Failed { .. }) {
            return;
        }
        let Some(request) = self.last_request.clone() else {
            return;
        };
        self.layout.mode = match request.page {
            Some(_) => PagingMode::Paged,
            None => PagingMode::Full,
        };
        self.issue_reload(
            request.page.unwrap_or(0),
            request.voice_id,
            LoadPurpose::Retry,
            effects,
        );
    }

    fn select_match(&mut self, tokens: Range<usize>, effects: &mut Vec<Effect>) {
        effects.push(Effect::ScrollToMatch {
            tokens: tokens.clone(),
        });
        self.selected_match = Some(tokens);
    }

    fn focus_search_target(&mut self, target: SearchTarget, effects: &mut Vec<Effect>) {
        let resolved = self
            .content
            .as_ref()
            .and_then(|content| resolve_tokens(&target, self.content_generation, content));
        if let Some(tokens) = resolved {
            self.select_match(tokens, effects);
            return;
        }
        let SearchTarget::Server(found) = target else {
            debug!("Local match no longer matches the loaded content");
            return;
        };

        self.search.remember_restore(PageRestore {
            mode: self.layout.mode,
            page: self.layout.current_page,
        });
        let page = if self.settings.expand_search_to_full_document && self.layout.is_multi_page() {
            info!(word = found.word_index, "Expanding to the full document for a search match");
            self.layout.mode = PagingMode::Full;
            0
        } else {
            found.page
        };
        self.issue_reload(
            page,
            self.voice_id.clone(),
            LoadPurpose::SearchJump { target: found },
            effects,
        );
    }

    fn restore_after_search(&mut self, restore: Option<PageRestore>, effects: &mut Vec<Effect>) {
        let Some(restore) = restore else {
            return;
        };
        if restore.mode == self.layout.mode && restore.page == self.layout.current_page {
            return;
        }
        debug!(mode = %restore.mode, page = restore.page, "Restoring pre-search page");
        self.layout.mode = restore.mode;
        self.issue_reload(
            restore.page,
            self.voice_id.clone(),
            LoadPurpose::SearchRestore,
            effects,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::{total_pages, word_range};
    use crate::playback::ManualPlayback;
    use crate::token::Token;

    const PAGE_SIZE: usize = 500;
    const TOTAL_WORDS: usize = 750;

    /// Words `w{n}` every 0.5 s, a full stop after every tenth word. `w4` is
    /// cut short, leaving a 0.4 s pause before `w5`.
    fn response(page: Option<usize>) -> ReadAlongPage {
        let words = match page {
            Some(page) => word_range(TOTAL_WORDS, PAGE_SIZE, page),
            None => 0..TOTAL_WORDS,
        };
        let mut tokens = Vec::new();
        for global in words {
            let start = global as f64 * 0.5;
            let length = if global == 4 { 0.1 } else { 0.4 };
            tokens.push(Token::timed_word(&format!("w{global}"), start, start + length));
            if global % 10 == 9 {
                tokens.push(Token::punctuation("."));
            }
        }
        ReadAlongPage {
            mapped_tokens: tokens,
            total_words: TOTAL_WORDS,
            total_pages: page.map_or(1, |_| total_pages(TOTAL_WORDS, PAGE_SIZE)),
            duration: Some(TOTAL_WORDS as f64 * 0.5),
            ..ReadAlongPage::default()
        }
    }

    fn settings() -> SyncSettings {
        SyncSettings {
            page_size: PAGE_SIZE,
            paging_mode: PagingMode::Paged,
            search_debounce: Duration::ZERO,
            ..SyncSettings::default()
        }
    }

    fn fetch(effects: &[Effect]) -> Option<(u64, ContentRequest)> {
        effects.iter().find_map(|effect| match effect {
            Effect::FetchContent {
                generation,
                request,
            } => Some((*generation, request.clone())),
            _ => None,
        })
    }

    fn resolve(effects: &[Effect]) -> Option<(u64, PageQueryPurpose, PageInfoRequest)> {
        effects.iter().find_map(|effect| match effect {
            Effect::ResolvePage {
                generation,
                purpose,
                request,
            } => Some((*generation, *purpose, request.clone())),
            _ => None,
        })
    }

    fn loaded(generation: u64, request: &ContentRequest) -> Completion {
        Completion::ContentLoaded {
            generation,
            result: Ok(response(request.page)),
        }
    }

    /// Session with page 0 of the two-page document loaded.
    fn open_session(now: Instant) -> ReadAlongSession<ManualPlayback> {
        open_session_with(settings(), now)
    }

    fn open_session_with(settings: SyncSettings, now: Instant) -> ReadAlongSession<ManualPlayback> {
        let mut session =
            ReadAlongSession::new("track-1", "voice-a", settings, ManualPlayback::new(None), 0);
        let (generation, request) = fetch(&session.open(now)).expect("initial fetch");
        assert_eq!(request.page, Some(0));
        assert_eq!(request.page_size, PAGE_SIZE);
        session.apply_completion(loaded(generation, &request), now);
        session
    }

    #[test]
    fn seek_to_other_page_loads_it_and_highlights_target() {
        let now = Instant::now();
        let mut session = open_session(now);
        assert_eq!(session.snapshot().total_pages, 2);

        let event = session.apply_command(SessionCommand::SeekTo { seconds: 300.0 }, now);
        let (lookup, purpose, request) = resolve(&event.effects).expect("page lookup");
        assert_eq!(purpose, PageQueryPurpose::Seek);
        assert_eq!(request.time, 300.0);

        let effects = session.apply_completion(
            Completion::PageResolved {
                generation: lookup,
                purpose,
                result: Ok(1),
            },
            now,
        );
        let (generation, request) = fetch(&effects).expect("page 1 fetch");
        assert_eq!(request.page, Some(1));

        session.apply_completion(loaded(generation, &request), now);
        assert_eq!(session.playback().seeks(), &[300.0]);
        assert_eq!(session.snapshot().current_page, 1);
        assert_eq!(session.active_sentence(), None);

        session.playback_mut().complete_seek();
        let effects = session.on_frame(now);
        assert!(effects.contains(&Effect::ScrollIntoView { sentence: 10 }));

        let snapshot = session.snapshot();
        assert_eq!(snapshot.active_sentence, Some(10));
        assert!(snapshot.sentences[10].text.starts_with("w600 "));
        assert_eq!(snapshot.seek_phase, "idle");
    }

    #[test]
    fn stale_content_response_is_dropped() {
        let now = Instant::now();
        let mut session = open_session(now);
        let first = fetch(&session.apply_command(SessionCommand::NextPage, now).effects)
            .expect("next page");
        let second = fetch(
            &session
                .apply_command(
                    SessionCommand::SwitchVoice {
                        voice_id: "voice-b".to_string(),
                    },
                    now,
                )
                .effects,
        )
        .expect("voice reload");

        session.apply_completion(loaded(first.0, &first.1), now);
        assert_eq!(session.snapshot().current_page, 0);
        assert_eq!(
            session.snapshot().load_state,
            LoadState::Loading {
                generation: second.0
            }
        );

        session.apply_completion(loaded(second.0, &second.1), now);
        let snapshot = session.snapshot();
        assert_eq!(snapshot.voice_id, "voice-b");
        assert_eq!(snapshot.load_state, LoadState::Ready);
    }

    #[test]
    fn failed_voice_switch_reverts_then_fails_visibly() {
        let now = Instant::now();
        let mut session = open_session(now);
        let (generation, request) = fetch(
            &session
                .apply_command(
                    SessionCommand::SwitchVoice {
                        voice_id: "voice-b".to_string(),
                    },
                    now,
                )
                .effects,
        )
        .expect("voice reload");
        assert_eq!(request.voice_id, "voice-b");

        let effects = session.apply_completion(
            Completion::ContentLoaded {
                generation,
                result: Err("404".to_string()),
            },
            now,
        );
        let (revert, request) = fetch(&effects).expect("revert reload");
        assert_eq!(request.voice_id, "voice-a");

        session.apply_completion(
            Completion::ContentLoaded {
                generation: revert,
                result: Err("500".to_string()),
            },
            now,
        );
        let snapshot = session.snapshot();
        assert_eq!(
            snapshot.load_state,
            LoadState::Failed {
                message: "500".to_string()
            }
        );
        assert!(snapshot.sentences.is_empty());

        let retry = session.apply_command(SessionCommand::Retry, now);
        let (generation, request) = fetch(&retry.effects).expect("retry fetch");
        assert_eq!(request.voice_id, "voice-a");
        session.apply_completion(loaded(generation, &request), now);
        assert_eq!(session.snapshot().load_state, LoadState::Ready);
    }

    #[test]
    fn sentence_click_seeks_through_offset_and_activates() {
        let now = Instant::now();
        let mut session = open_session(now);
        session.apply_command(SessionCommand::SetOffset { offset_ms: 500 }, now);

        let event = session.apply_command(SessionCommand::SentenceClick { sentence: 2 }, now);
        assert!(event.effects.contains(&Effect::ScrollIntoView { sentence: 2 }));
        assert_eq!(session.active_sentence(), Some(2));
        let seeks = session.playback().seeks();
        assert_eq!(seeks.len(), 1);
        assert!((seeks[0] - 10.45).abs() < 1e-9);
    }

    #[test]
    fn word_click_seeks_to_word_and_keeps_parent_sentence() {
        let now = Instant::now();
        let mut session = open_session(now);
        // Sentence 1 holds tokens 11..22; token 14 is w13 at 6.5 s.
        session.apply_command(SessionCommand::WordClick { token: 14 }, now);
        assert_eq!(session.playback().seeks(), &[6.5]);
        assert_eq!(session.active_sentence(), Some(1));
    }

    #[test]
    fn playback_drives_automatic_page_switch() {
        let now = Instant::now();
        let mut session = open_session(now);
        session.apply_command(SessionCommand::Play, now);
        session.playback_mut().set_time(260.0);

        let effects = session.on_frame(now);
        let (lookup, purpose, request) = resolve(&effects).expect("page-info check");
        assert_eq!(purpose, PageQueryPurpose::AutoNavigate);
        assert_eq!(request.time, 260.0);
        assert!(resolve(&session.on_frame(now + Duration::from_millis(16))).is_none());

        let effects = session.apply_completion(
            Completion::PageResolved {
                generation: lookup,
                purpose,
                result: Ok(1),
            },
            now,
        );
        let (generation, request) = fetch(&effects).expect("page switch");
        assert_eq!(request.page, Some(1));
        session.apply_completion(loaded(generation, &request), now);

        let snapshot = session.snapshot();
        assert_eq!(snapshot.current_page, 1);
        assert_eq!(snapshot.navigation_phase, "cooldown");
        assert_eq!(snapshot.active_sentence, Some(2));
    }

    #[test]
    fn paused_playback_does_not_query_pages() {
        let now = Instant::now();
        let mut session = open_session(now);
        session.playback_mut().set_time(260.0);
        assert!(resolve(&session.on_frame(now)).is_none());
    }

    #[test]
    fn search_jump_expands_and_clear_restores_page() {
        let now = Instant::now();
        let mut session = open_session(now);
        session.apply_command(
            SessionCommand::SearchSetQuery {
                query: "w612".to_string(),
            },
            now,
        );
        let effects = session.on_frame(now);
        let generation = effects
            .iter()
            .find_map(|effect| match effect {
                Effect::Search { generation, .. } => Some(*generation),
                _ => None,
            })
            .expect("server search");

        let effects = session.apply_completion(
            Completion::SearchFinished {
                generation,
                result: Ok(vec![ServerMatch {
                    word_index: 612,
                    page: 1,
                }]),
            },
            now,
        );
        let (reload, request) = fetch(&effects).expect("full document fetch");
        assert_eq!(request.page, None);

        let effects = session.apply_completion(loaded(reload, &request), now);
        assert!(effects.iter().any(|effect| matches!(effect, Effect::ScrollToMatch { .. })));
        let snapshot = session.snapshot();
        assert_eq!(snapshot.paging_mode, PagingMode::Full);
        assert_eq!(snapshot.search.match_count, 1);
        assert_eq!(snapshot.search.page_matches.len(), 1);
        assert!(snapshot.search.selected.is_some());

        let cleared = session.apply_command(SessionCommand::SearchClear, now);
        let (generation, request) = fetch(&cleared.effects).expect("restore fetch");
        assert_eq!(request.page, Some(0));
        session.apply_completion(loaded(generation, &request), now);
        let snapshot = session.snapshot();
        assert_eq!(snapshot.paging_mode, PagingMode::Paged);
        assert_eq!(snapshot.current_page, 0);
        assert_eq!(snapshot.search.match_count, 0);
    }

    #[test]
    fn settings_changes_are_persisted() {
        let now = Instant::now();
        let mut session = open_session(now);
        let event = session.apply_command(SessionCommand::ToggleHighlighting, now);
        assert!(matches!(
            event.effects.as_slice(),
            [Effect::SavePrefs(prefs)] if !prefs.highlighting_enabled
        ));

        let event = session.apply_command(SessionCommand::NudgeOffset { steps: -2 }, now);
        assert!(event.effects.contains(&Effect::SaveSyncOffset {
            track_id: "track-1".to_string(),
            offset_ms: -100,
        }));

        let event = session.apply_command(SessionCommand::SetPageSize { page_size: 20 }, now);
        let (_, request) = fetch(&event.effects).expect("reload at new size");
        assert_eq!(request.page_size, 50);
        assert!(
            event
                .effects
                .iter()
                .any(|effect| matches!(effect, Effect::SavePrefs(prefs) if prefs.page_size == 50))
        );
    }

    fn search_generation(effects: &[Effect]) -> Option<u64> {
        effects.iter().find_map(|effect| match effect {
            Effect::Search { generation, .. } => Some(*generation),
            _ => None,
        })
    }

    #[test]
    fn failed_reload_after_page_switch_keeps_following_playback() {
        let now = Instant::now();
        let mut session = open_session(now);
        session.apply_command(SessionCommand::Play, now);
        session.playback_mut().set_time(260.0);

        let (lookup, purpose, _) = resolve(&session.on_frame(now)).expect("page-info check");
        let effects = session.apply_completion(
            Completion::PageResolved {
                generation: lookup,
                purpose,
                result: Ok(1),
            },
            now,
        );
        assert!(fetch(&effects).is_some());
        assert_eq!(session.snapshot().navigation_phase, "reloading");

        let (generation, request) = fetch(
            &session
                .apply_command(SessionCommand::SetPage { page: 1 }, now)
                .effects,
        )
        .expect("manual page fetch");
        assert_eq!(request.page, Some(1));
        session.apply_completion(
            Completion::ContentLoaded {
                generation,
                result: Err("503".to_string()),
            },
            now,
        );

        let snapshot = session.snapshot();
        assert_eq!(snapshot.navigation_phase, "idle");
        assert!(matches!(snapshot.load_state, LoadState::Failed { .. }));
        let later = session.on_frame(now + Duration::from_secs(30));
        assert!(matches!(
            resolve(&later),
            Some((_, PageQueryPurpose::AutoNavigate, _))
        ));
    }

    #[test]
    fn search_jump_without_expansion_loads_match_page() {
        let now = Instant::now();
        let mut session = open_session_with(
            SyncSettings {
                expand_search_to_full_document: false,
                ..settings()
            },
            now,
        );
        session.apply_command(
            SessionCommand::SearchSetQuery {
                query: "w612".to_string(),
            },
            now,
        );
        let generation = search_generation(&session.on_frame(now)).expect("server search");
        let effects = session.apply_completion(
            Completion::SearchFinished {
                generation,
                result: Ok(vec![ServerMatch {
                    word_index: 612,
                    page: 1,
                }]),
            },
            now,
        );
        let (reload, request) = fetch(&effects).expect("match page fetch");
        assert_eq!(request.page, Some(1));

        let effects = session.apply_completion(loaded(reload, &request), now);
        assert!(effects.iter().any(|effect| matches!(effect, Effect::ScrollToMatch { .. })));
        let snapshot = session.snapshot();
        assert_eq!(snapshot.paging_mode, PagingMode::Paged);
        assert_eq!(snapshot.current_page, 1);
        assert!(snapshot.search.selected.is_some());
    }

    #[test]
    fn progress_bar_click_resolves_page_for_scaled_time() {
        let now = Instant::now();
        let mut session = open_session(now);

        let event = session.apply_command(SessionCommand::ProgressBarClick { x: 80.0, width: 100.0 }, now);
        let (_, purpose, request) = resolve(&event.effects).expect("page lookup");
        assert_eq!(purpose, PageQueryPurpose::Seek);
        assert!((request.time - 300.0).abs() < 1e-9);
        assert_eq!(session.snapshot().seek_phase, "resolving-page");

        let mut session = open_session(now);
        let event = session.apply_command(SessionCommand::ProgressBarClick { x: -40.0, width: 100.0 }, now);
        assert!(event.effects.is_empty());
        assert!(session.playback().seeks().is_empty());
    }

    #[test]
    fn sentence_gap_change_rebuilds_paged_index() {
        let now = Instant::now();
        let mut session = open_session(now);
        assert_eq!(session.snapshot().sentences.len(), 50);

        let event = session.apply_command(SessionCommand::SetSentenceGap { secs: 0.3 }, now);
        assert!(event.effects.iter().any(
            |effect| matches!(effect, Effect::SavePrefs(prefs) if prefs.sentence_gap_secs == 0.3)
        ));
        let snapshot = session.snapshot();
        assert_eq!(snapshot.sentences.len(), 51);
        assert_eq!(snapshot.sentences[0].text, "w0 w1 w2 w3 w4");
        assert!(snapshot.sentences[1].text.starts_with("w5 "));

        let event = session.apply_command(SessionCommand::SetSentenceGap { secs: f64::NAN }, now);
        assert!(event.effects.is_empty());
        assert_eq!(session.snapshot().sentence_gap_secs, 0.3);
        assert_eq!(session.prefs().sentence_gap_secs, 0.3);
    }

    #[test]
    fn switching_to_paged_mode_loads_page_of_active_sentence() {
        let now = Instant::now();
        let mut session = open_session(now);
        let event = session.apply_command(
            SessionCommand::SetPagingMode {
                mode: PagingMode::Full,
            },
            now,
        );
        let (generation, request) = fetch(&event.effects).expect("full document fetch");
        assert_eq!(request.page, None);
        session.apply_completion(loaded(generation, &request), now);
        assert_eq!(session.snapshot().sentences.len(), 75);

        session.apply_command(SessionCommand::SentenceClick { sentence: 61 }, now);
        assert_eq!(session.active_sentence(), Some(61));

        let event = session.apply_command(
            SessionCommand::SetPagingMode {
                mode: PagingMode::Paged,
            },
            now,
        );
        let (generation, request) = fetch(&event.effects).expect("paged fetch");
        assert_eq!(request.page, Some(1));
        session.apply_completion(loaded(generation, &request), now);
        let snapshot = session.snapshot();
        assert_eq!(snapshot.paging_mode, PagingMode::Paged);
        assert_eq!(snapshot.current_page, 1);
    }

    #[test]
    fn disabled_highlighting_still_seeks_without_scrolling() {
        let now = Instant::now();
        let mut session = open_session(now);
        session.apply_command(SessionCommand::ToggleHighlighting, now);

        let event = session.apply_command(SessionCommand::SentenceClick { sentence: 2 }, now);
        assert!(
            !event
                .effects
                .iter()
                .any(|effect| matches!(effect, Effect::ScrollIntoView { .. }))
        );
        assert_eq!(session.playback().seeks().len(), 1);
        assert_eq!(session.active_sentence(), None);
        assert!(!session.snapshot().highlighting_enabled);
    }

    #[test]
    fn closed_session_ignores_everything() {
        let now = Instant::now();
        let mut session = open_session(now);
        session.close();
        session.playback_mut().set_time(5.0);
        assert!(session.on_frame(now).is_empty());
        assert!(
            session
                .apply_command(SessionCommand::SeekTo { seconds: 30.0 }, now)
                .effects
                .is_empty()
        );
        assert!(session.playback().seeks().is_empty());
        assert_eq!(session.active_sentence(), None);
    }
}
