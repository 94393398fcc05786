//! Wire model of the read-along endpoint and the per-page token stream built
//! from it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Range;
use ts_rs::TS;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(rename_all = "kebab-case")]
#[ts(export)]
pub enum TokenKind {
    Word,
    Punctuation,
    #[serde(alias = "line-break", alias = "line_break")]
    Linebreak,
    #[serde(alias = "paragraph_break", alias = "paragraph")]
    ParagraphBreak,
    #[serde(other)]
    Other,
}

/// One lexical unit of the source text. Only words carry timings, and only
/// once the voice has been synthesized.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Token {
    pub text: String,
    #[serde(rename = "type")]
    pub kind: TokenKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub start_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub end_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub global_word_index: Option<usize>,
}

impl Token {
    pub fn word(text: &str) -> Self {
        Self {
            text: text.to_string(),
            kind: TokenKind::Word,
            start_time: None,
            end_time: None,
            global_word_index: None,
        }
    }

    pub fn timed_word(text: &str, start: f64, end: f64) -> Self {
        Self {
            start_time: Some(start),
            end_time: Some(end),
            ..Self::word(text)
        }
    }

    pub fn punctuation(text: &str) -> Self {
        Self {
            kind: TokenKind::Punctuation,
            ..Self::word(text)
        }
    }

    pub fn paragraph_break() -> Self {
        Self {
            kind: TokenKind::ParagraphBreak,
            ..Self::word("\n\n")
        }
    }

    pub fn is_word(&self) -> bool {
        self.kind == TokenKind::Word
    }

    /// Start/end pair of a timed word; malformed pairs count as untimed.
    pub fn timing(&self) -> Option<(f64, f64)> {
        if !self.is_word() {
            return None;
        }
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) if start.is_finite() && end.is_finite() && end >= start => {
                Some((start, end))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WordTiming {
    #[serde(alias = "wordIndex", alias = "index")]
    pub word_index: usize,
    #[serde(alias = "startTime", alias = "start")]
    pub start_time: f64,
    #[serde(alias = "endTime", alias = "end")]
    pub end_time: f64,
    #[serde(default)]
    pub word: Option<String>,
}

/// Response body of `GET /api/tracks/{id}/read-along/{voiceId}`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ReadAlongPage {
    #[serde(rename = "sourceText", default)]
    pub source_text: String,
    #[serde(rename = "mappedTokens", default)]
    pub mapped_tokens: Vec<Token>,
    #[serde(rename = "wordTimings", default)]
    pub word_timings: Vec<WordTiming>,
    #[serde(default)]
    pub total_words: usize,
    #[serde(default)]
    pub total_pages: usize,
    #[serde(default)]
    pub duration: Option<f64>,
}

/// Tokens of the loaded page with timings merged in and global word
/// indices filled.
#[derive(Debug, Clone, PartialEq)]
pub struct PageContent {
    pub page: usize,
    pub word_offset: usize,
    pub total_words: usize,
    pub total_pages: usize,
    pub duration: Option<f64>,
    pub tokens: Vec<Token>,
}

impl PageContent {
    /// `word_offset` is the global index of the page's first word
    /// (`page * page_size` in paged mode, 0 for the whole document).
    pub fn from_response(response: ReadAlongPage, page: usize, word_offset: usize) -> Self {
        let timings: HashMap<usize, (f64, f64)> = response
            .word_timings
            .iter()
            .map(|timing| (timing.word_index, (timing.start_time, timing.end_time)))
            .collect();

        let mut next_word = word_offset;
        let mut tokens = response.mapped_tokens;
        for token in tokens.iter_mut().filter(|token| token.is_word()) {
            let global = *token.global_word_index.get_or_insert(next_word);
            next_word = global + 1;
            if token.timing().is_none() {
                if let Some(&(start, end)) = timings.get(&global) {
                    token.start_time = Some(start);
                    token.end_time = Some(end);
                }
            }
        }

        let page_words = tokens.iter().filter(|token| token.is_word()).count();
        Self {
            page,
            word_offset,
            total_words: response.total_words.max(word_offset + page_words),
            total_pages: response.total_pages,
            duration: response.duration,
            tokens,
        }
    }

    pub fn word_count(&self) -> usize {
        self.tokens.iter().filter(|token| token.is_word()).count()
    }

    pub fn token_for_global_word(&self, global: usize) -> Option<usize> {
        self.tokens
            .iter()
            .position(|token| token.is_word() && token.global_word_index == Some(global))
    }

    /// Readable text of a token range: words space-separated, punctuation
    /// attached to its neighbour.
    pub fn text_for(&self, range: Range<usize>) -> String {
        let mut out = String::new();
        let end = range.end.min(self.tokens.len());
        let start = range.start.min(end);
        for token in &self.tokens[start..end] {
            match token.kind {
                TokenKind::Linebreak => out.push('\n'),
                TokenKind::ParagraphBreak => out.push_str("\n\n"),
                TokenKind::Word => {
                    let needs_space = out
                        .chars()
                        .last()
                        .is_some_and(|ch| !ch.is_whitespace() && !matches!(ch, '(' | '[' | '“'));
                    if needs_space {
                        out.push(' ');
                    }
                    out.push_str(&token.text);
                }
                TokenKind::Punctuation | TokenKind::Other => out.push_str(&token.text),
            }
        }
        out.trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_backend_payload() {
        let payload = r#"{
            "sourceText": "Hi there.",
            "mappedTokens": [
                {"text": "Hi", "type": "word", "startTime": 0.0, "endTime": 0.3, "globalWordIndex": 0},
                {"text": "there", "type": "word", "globalWordIndex": 1},
                {"text": ".", "type": "punctuation"},
                {"text": "\n\n", "type": "paragraph-break"}
            ],
            "wordTimings": [{"word_index": 1, "start_time": 0.35, "end_time": 0.7}],
            "total_words": 2,
            "total_pages": 1
        }"#;
        let page: ReadAlongPage = serde_json::from_str(payload).expect("payload should parse");
        assert_eq!(page.mapped_tokens.len(), 4);
        assert_eq!(page.mapped_tokens[3].kind, TokenKind::ParagraphBreak);

        let content = PageContent::from_response(page, 0, 0);
        assert_eq!(content.tokens[1].timing(), Some((0.35, 0.7)));
        assert_eq!(content.text_for(0..3), "Hi there.");
    }

    #[test]
    fn fills_missing_global_indices_from_page_offset() {
        let response = ReadAlongPage {
            mapped_tokens: vec![Token::word("a"), Token::punctuation(","), Token::word("b")],
            total_words: 1202,
            total_pages: 3,
            ..ReadAlongPage::default()
        };
        let content = PageContent::from_response(response, 2, 1000);
        assert_eq!(content.tokens[0].global_word_index, Some(1000));
        assert_eq!(content.tokens[1].global_word_index, None);
        assert_eq!(content.tokens[2].global_word_index, Some(1001));
        assert_eq!(content.token_for_global_word(1001), Some(2));
    }

    #[test]
    fn unknown_token_types_do_not_fail_the_page() {
        let token: Token =
            serde_json::from_str(r#"{"text": " ", "type": "space"}"#).expect("token should parse");
        assert_eq!(token.kind, TokenKind::Other);
        assert_eq!(token.timing(), None);
    }
}
