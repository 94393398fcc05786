//! Document search: debounced server queries with a local fallback that scans
//! the loaded page only.

use crate::generation::GenerationCounter;
use crate::pagination::PagingMode;
use crate::timing::TimingIndex;
use crate::token::{PageContent, TokenKind};
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use ts_rs::TS;
use unicode_normalization::UnicodeNormalization;

pub const DEFAULT_SEARCH_DEBOUNCE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS)]
#[ts(export)]
pub struct ServerMatch {
    pub word_index: usize,
    pub page: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum SearchMode {
    Server,
    Local,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalMatch {
    pub tokens: Range<usize>,
    pub sentence: Option<usize>,
}

/// Where a selected match lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchTarget {
    /// Global word index plus owning page, from the server.
    Server(ServerMatch),
    /// Token range inside the content it was computed from.
    Local {
        content_generation: u64,
        tokens: Range<usize>,
        sentence: Option<usize>,
    },
}

/// One list of matches with a cursor. Server and local results share the
/// navigation logic through the provided methods.
pub trait SearchResultSource: fmt::Debug + Send {
    fn mode(&self) -> SearchMode;
    fn count(&self) -> usize;
    fn current(&self) -> Option<usize>;
    fn target(&self, idx: usize) -> Option<SearchTarget>;
    fn set_current(&mut self, idx: Option<usize>);

    fn jump_to(&mut self, idx: usize) -> Option<SearchTarget> {
        let target = self.target(idx)?;
        self.set_current(Some(idx));
        Some(target)
    }

    fn next(&mut self) -> Option<SearchTarget> {
        let count = self.count();
        if count == 0 {
            self.set_current(None);
            return None;
        }
        let idx = match self.current() {
            Some(current) => (current + 1) % count,
            None => 0,
        };
        self.jump_to(idx)
    }

    fn previous(&mut self) -> Option<SearchTarget> {
        let count = self.count();
        if count == 0 {
            self.set_current(None);
            return None;
        }
        let idx = match self.current() {
            Some(0) | None => count - 1,
            Some(current) => current - 1,
        };
        self.jump_to(idx)
    }

    fn current_target(&self) -> Option<SearchTarget> {
        self.current().and_then(|idx| self.target(idx))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ServerMatches {
    matches: Vec<ServerMatch>,
    cursor: Option<usize>,
}

impl ServerMatches {
    pub fn new(matches: Vec<ServerMatch>) -> Self {
        let cursor = (!matches.is_empty()).then_some(0);
        Self { matches, cursor }
    }

    pub fn matches(&self) -> &[ServerMatch] {
        &self.matches
    }
}

impl SearchResultSource for ServerMatches {
    fn mode(&self) -> SearchMode {
        SearchMode::Server
    }

    fn count(&self) -> usize {
        self.matches.len()
    }

    fn current(&self) -> Option<usize> {
        self.cursor
    }

    fn target(&self, idx: usize) -> Option<SearchTarget> {
        self.matches.get(idx).copied().map(SearchTarget::Server)
    }

    fn set_current(&mut self, idx: Option<usize>) {
        self.cursor = idx.filter(|idx| *idx < self.matches.len());
    }
}

#[derive(Debug, Clone, Default)]
pub struct LocalMatches {
    content_generation: u64,
    matches: Vec<LocalMatch>,
    cursor: Option<usize>,
}

impl LocalMatches {
    pub fn new(content_generation: u64, matches: Vec<LocalMatch>) -> Self {
        let cursor = (!matches.is_empty()).then_some(0);
        Self {
            content_generation,
            matches,
            cursor,
        }
    }

    pub fn content_generation(&self) -> u64 {
        self.content_generation
    }
}

impl SearchResultSource for LocalMatches {
    fn mode(&self) -> SearchMode {
        SearchMode::Local
    }

    fn count(&self) -> usize {
        self.matches.len()
    }

    fn current(&self) -> Option<usize> {
        self.cursor
    }

    fn target(&self, idx: usize) -> Option<SearchTarget> {
        self.matches.get(idx).map(|found| SearchTarget::Local {
            content_generation: self.content_generation,
            tokens: found.tokens.clone(),
            sentence: found.sentence,
        })
    }

    fn set_current(&mut self, idx: Option<usize>) {
        self.cursor = idx.filter(|idx| *idx < self.matches.len());
    }
}

fn fold(text: &str) -> String {
    text.nfkc().collect::<String>().to_lowercase()
}

/// Case-insensitive scan of one page's tokens. Whitespace in the query
/// matches any run of whitespace between tokens.
pub fn local_matches(
    content: &PageContent,
    index: &TimingIndex,
    query: &str,
) -> Result<Vec<LocalMatch>, regex::Error> {
    let words: Vec<String> = fold(query)
        .split_whitespace()
        .map(regex::escape)
        .collect();
    if words.is_empty() {
        return Ok(Vec::new());
    }
    let pattern = RegexBuilder::new(&words.join(r"\s+"))
        .case_insensitive(true)
        .build()?;

    let mut haystack = String::new();
    let mut spans: Vec<(Range<usize>, usize)> = Vec::new();
    for (idx, token) in content.tokens.iter().enumerate() {
        match token.kind {
            TokenKind::Linebreak | TokenKind::ParagraphBreak => {
                haystack.push(' ');
                continue;
            }
            TokenKind::Word if !haystack.is_empty() && !haystack.ends_with(' ') => {
                haystack.push(' ');
            }
            _ => {}
        }
        let start = haystack.len();
        haystack.push_str(&fold(&token.text));
        spans.push((start..haystack.len(), idx));
    }

    let mut found = Vec::new();
    for hit in pattern.find_iter(&haystack) {
        let covered: Vec<usize> = spans
            .iter()
            .filter(|(span, _)| span.start < hit.end() && hit.start() < span.end)
            .map(|(_, idx)| *idx)
            .collect();
        let (Some(first), Some(last)) = (covered.first(), covered.last()) else {
            continue;
        };
        found.push(LocalMatch {
            tokens: *first..*last + 1,
            sentence: index.sentence_for_token(*first),
        });
    }
    Ok(found)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchPhase {
    Idle,
    Debouncing { query: String, deadline: Instant },
    Querying { query: String, generation: u64 },
    Displaying,
}

impl SearchPhase {
    pub fn label(&self) -> &'static str {
        match self {
            SearchPhase::Idle => "idle",
            SearchPhase::Debouncing { .. } => "debouncing",
            SearchPhase::Querying { .. } => "querying",
            SearchPhase::Displaying => "displaying",
        }
    }
}

/// Paging state captured before the first cross-page jump, restored when the
/// search is cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRestore {
    pub mode: PagingMode,
    pub page: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub generation: u64,
    pub query: String,
}

#[derive(Debug)]
pub struct SearchController {
    phase: SearchPhase,
    query: String,
    debounce: Duration,
    results: Option<Box<dyn SearchResultSource>>,
    generations: GenerationCounter,
    restore: Option<PageRestore>,
}

impl Default for SearchController {
    fn default() -> Self {
        Self::new(DEFAULT_SEARCH_DEBOUNCE)
    }
}

impl SearchController {
    pub fn new(debounce: Duration) -> Self {
        Self {
            phase: SearchPhase::Idle,
            query: String::new(),
            debounce,
            results: None,
            generations: GenerationCounter::new(),
            restore: None,
        }
    }

    pub fn phase(&self) -> &SearchPhase {
        &self.phase
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn results(&self) -> Option<&dyn SearchResultSource> {
        self.results.as_deref()
    }

    /// New input. An empty query clears the search and hands back the paging
    /// state to restore, if a jump changed it.
    pub fn set_query(&mut self, query: String, now: Instant) -> Option<PageRestore> {
        if query.trim().is_empty() {
            return self.clear();
        }
        self.query = query.clone();
        self.results = None;
        self.phase = SearchPhase::Debouncing {
            query,
            deadline: now + self.debounce,
        };
        None
    }

    /// Fire the server query once the debounce window has passed.
    pub fn poll(&mut self, now: Instant) -> Option<SearchRequest> {
        let SearchPhase::Debouncing { query, deadline } = &self.phase else {
            return None;
        };
        if now < *deadline {
            return None;
        }
        let query = query.clone();
        let generation = self.generations.advance();
        debug!(generation, %query, "Search debounce elapsed; querying server");
        self.phase = SearchPhase::Querying {
            query: query.clone(),
            generation,
        };
        Some(SearchRequest { generation, query })
    }

    /// Server answer (or failure). Failures fall back to scanning `content`.
    /// Returns the match to show first.
    pub fn on_server_results(
        &mut self,
        generation: u64,
        result: Result<Vec<ServerMatch>, String>,
        content: Option<(u64, &PageContent, &TimingIndex)>,
    ) -> Option<SearchTarget> {
        let query = match &self.phase {
            SearchPhase::Querying {
                query,
                generation: expected,
            } if *expected == generation => query.clone(),
            _ => {
                debug!(generation, "Ignoring stale search results");
                return None;
            }
        };

        let results: Box<dyn SearchResultSource> = match result {
            Ok(matches) => {
                info!(%query, count = matches.len(), "Server search finished");
                Box::new(ServerMatches::new(matches))
            }
            Err(err) => {
                warn!(%query, "Server search failed; searching the loaded page only: {err}");
                Box::new(Self::scan_local(&query, content))
            }
        };
        self.phase = SearchPhase::Displaying;
        let first = results.current_target();
        self.results = Some(results);
        first
    }

    fn scan_local(query: &str, content: Option<(u64, &PageContent, &TimingIndex)>) -> LocalMatches {
        let Some((content_generation, page, index)) = content else {
            return LocalMatches::new(0, Vec::new());
        };
        let matches = local_matches(page, index, query).unwrap_or_else(|err| {
            debug!("Local search failed: {err}");
            Vec::new()
        });
        LocalMatches::new(content_generation, matches)
    }

    /// Local matches point into one specific content load; after a reload
    /// they are recomputed against the new tokens instead of reused.
    pub fn refresh_local(&mut self, content_generation: u64, content: &PageContent, index: &TimingIndex) {
        let Some(results) = self.results.as_ref() else {
            return;
        };
        if results.mode() != SearchMode::Local {
            return;
        }
        let stale = results
            .current_target()
            .or_else(|| results.target(0))
            .is_none_or(|target| {
                matches!(target, SearchTarget::Local { content_generation: g, .. } if g != content_generation)
            });
        if !stale {
            return;
        }
        let cursor = results.current();
        let mut refreshed = Self::scan_local(&self.query, Some((content_generation, content, index)));
        if let Some(cursor) = cursor {
            refreshed.set_current(Some(cursor.min(refreshed.count().saturating_sub(1))));
        }
        debug!(
            content_generation,
            count = refreshed.count(),
            "Recomputed local search matches after reload"
        );
        self.results = Some(Box::new(refreshed));
    }

    pub fn next(&mut self) -> Option<SearchTarget> {
        self.results.as_mut().and_then(|results| results.next())
    }

    pub fn previous(&mut self) -> Option<SearchTarget> {
        self.results.as_mut().and_then(|results| results.previous())
    }

    pub fn current_target(&self) -> Option<SearchTarget> {
        self.results.as_ref().and_then(|results| results.current_target())
    }

    /// Keep only the first snapshot: later jumps must not overwrite the state
    /// the user had before searching.
    pub fn remember_restore(&mut self, restore: PageRestore) {
        self.restore.get_or_insert(restore);
    }

    /// The user picked a new paging state; clearing must not undo it.
    pub fn discard_restore(&mut self) {
        self.restore = None;
    }

    pub fn clear(&mut self) -> Option<PageRestore> {
        self.phase = SearchPhase::Idle;
        self.query.clear();
        self.results = None;
        self.restore.take()
    }

    /// Token ranges of every match that lies on the loaded page.
    pub fn page_matches(&self, content_generation: u64, content: &PageContent) -> Vec<Range<usize>> {
        let Some(results) = self.results.as_ref() else {
            return Vec::new();
        };
        (0..results.count())
            .filter_map(|idx| results.target(idx))
            .filter_map(|target| resolve_tokens(&target, content_generation, content))
            .collect()
    }
}

/// Token range of `target` inside the loaded content, if it is there.
pub fn resolve_tokens(
    target: &SearchTarget,
    content_generation: u64,
    content: &PageContent,
) -> Option<Range<usize>> {
    match target {
        SearchTarget::Local {
            content_generation: generation,
            tokens,
            ..
        } => (*generation == content_generation).then(|| tokens.clone()),
        SearchTarget::Server(found) => content
            .token_for_global_word(found.word_index)
            .map(|idx| idx..idx + 1),
    }
}
