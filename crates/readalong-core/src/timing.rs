//! Timing index: sentences with derived time ranges, built straight from the
//! loaded page's token stream.

use crate::token::{PageContent, Token, TokenKind};
use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;

/// Padding subtracted from a sentence's first word and added to its last.
pub const DEFAULT_BOUNDARY_PADDING_SECS: f64 = 0.05;
/// Length assumed for a sentence whose words have no timings yet.
pub const UNTIMED_SENTENCE_SECS: f64 = 0.25;
/// Silence between words that closes a sentence in paged mode.
pub const DEFAULT_SENTENCE_GAP_SECS: f64 = 0.6;
pub const MIN_SENTENCE_GAP_SECS: f64 = 0.1;
pub const MAX_SENTENCE_GAP_SECS: f64 = 5.0;

static RE_SENTENCE_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[.!?…]["'”’»)\]]*$"#).unwrap());
static RE_CLOSING_ONLY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^[.!?…"'”’»)\],;:]+$"#).unwrap());

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingOptions {
    pub boundary_padding: f64,
    pub untimed_secs: f64,
    /// Only set while pages are loaded one at a time.
    pub gap_split: Option<f64>,
}

impl Default for TimingOptions {
    fn default() -> Self {
        Self {
            boundary_padding: DEFAULT_BOUNDARY_PADDING_SECS,
            untimed_secs: UNTIMED_SENTENCE_SECS,
            gap_split: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sentence {
    pub index: usize,
    pub start_time: f64,
    pub end_time: f64,
    pub tokens: Range<usize>,
    pub first_word: Option<usize>,
    pub word_count: usize,
    pub timed: bool,
}

impl Sentence {
    pub fn contains(&self, time: f64) -> bool {
        time >= self.start_time && time < self.end_time
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimingIndex {
    sentences: Vec<Sentence>,
}

impl TimingIndex {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Missing content yields an empty index, which means "nothing to
    /// highlight" rather than an error.
    pub fn from_content(content: Option<&PageContent>, options: &TimingOptions) -> Self {
        match content {
            Some(content) => Self::build(&content.tokens, options),
            None => Self::empty(),
        }
    }

    pub fn build(tokens: &[Token], options: &TimingOptions) -> Self {
        let mut sentences = Vec::new();
        let mut previous_end = 0.0_f64;

        for (index, range) in segment(tokens, options.gap_split).into_iter().enumerate() {
            let slice = &tokens[range.clone()];
            let first_timed = slice.iter().find_map(Token::timing);
            let last_timed = slice.iter().rev().find_map(Token::timing);
            let (start_time, end_time, timed) = match (first_timed, last_timed) {
                (Some((start, _)), Some((_, end))) => (
                    (start - options.boundary_padding).max(0.0),
                    end + options.boundary_padding,
                    true,
                ),
                _ => (previous_end, previous_end + options.untimed_secs, false),
            };
            previous_end = end_time;

            sentences.push(Sentence {
                index,
                start_time,
                end_time,
                first_word: slice.iter().find_map(|token| {
                    token.is_word().then_some(token.global_word_index).flatten()
                }),
                word_count: slice.iter().filter(|token| token.is_word()).count(),
                tokens: range,
                timed,
            });
        }

        sentences.sort_by_key(|sentence| sentence.index);
        Self { sentences }
    }

    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    pub fn sentences(&self) -> &[Sentence] {
        &self.sentences
    }

    pub fn get(&self, index: usize) -> Option<&Sentence> {
        self.sentences
            .get(index)
            .filter(|sentence| sentence.index == index)
            .or_else(|| self.sentences.iter().find(|sentence| sentence.index == index))
    }

    /// First sentence whose `[start, end)` range holds `time`.
    pub fn find(&self, time: f64) -> Option<usize> {
        self.sentences
            .iter()
            .find(|sentence| sentence.contains(time))
            .map(|sentence| sentence.index)
    }

    pub fn sentence_for_token(&self, token_idx: usize) -> Option<usize> {
        self.sentences
            .iter()
            .find(|sentence| sentence.tokens.contains(&token_idx))
            .map(|sentence| sentence.index)
    }

    pub fn sentence_for_global_word(&self, global: usize) -> Option<usize> {
        self.sentences
            .iter()
            .rev()
            .find(|sentence| sentence.first_word.is_some_and(|first| first <= global))
            .map(|sentence| sentence.index)
    }

    /// Time range covered by the whole index.
    pub fn span(&self) -> Option<(f64, f64)> {
        let first = self.sentences.first()?;
        let last = self.sentences.last()?;
        Some((first.start_time, last.end_time))
    }

    /// Token index of the word being spoken at `time` inside `sentence`.
    /// Between two words the earlier one stays active.
    pub fn active_word(&self, tokens: &[Token], sentence: usize, time: f64) -> Option<usize> {
        let sentence = self.get(sentence)?;
        let mut active = None;
        for idx in sentence.tokens.clone() {
            let Some((start, end)) = tokens.get(idx).and_then(Token::timing) else {
                continue;
            };
            if start > time {
                break;
            }
            active = Some(idx);
            if time < end {
                break;
            }
        }
        active
    }
}

/// Split tokens into sentence ranges. Paragraph breaks always close a
/// sentence and belong to none.
fn segment(tokens: &[Token], gap_split: Option<f64>) -> Vec<Range<usize>> {
    let mut ranges: Vec<Range<usize>> = Vec::new();
    let mut start = 0usize;
    let mut has_words = false;
    let mut last_word_end: Option<f64> = None;

    for (idx, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::Word => {
                let gap = gap_split.zip(last_word_end).zip(token.timing());
                if let Some(((threshold, previous_end), (word_start, _))) = gap {
                    if has_words && word_start - previous_end >= threshold {
                        ranges.push(start..idx);
                        start = idx;
                    }
                }
                has_words = true;
                if let Some((_, end)) = token.timing() {
                    last_word_end = Some(end);
                }
            }
            TokenKind::Punctuation => {
                if !has_words {
                    let trailing = ranges.last().is_some_and(|last| last.end == idx)
                        && RE_CLOSING_ONLY.is_match(&token.text);
                    if trailing {
                        if let Some(last) = ranges.last_mut() {
                            last.end = idx + 1;
                        }
                        start = idx + 1;
                    }
                    continue;
                }
                if RE_SENTENCE_END.is_match(&token.text) {
                    ranges.push(start..idx + 1);
                    start = idx + 1;
                    has_words = false;
                }
            }
            TokenKind::ParagraphBreak => {
                if has_words {
                    ranges.push(start..idx);
                }
                start = idx + 1;
                has_words = false;
            }
            TokenKind::Linebreak | TokenKind::Other => {
                if !has_words && start == idx {
                    start = idx + 1;
                }
            }
        }
    }

    if has_words {
        ranges.push(start..tokens.len());
    }
    ranges
}
