//! Line commands read from stdin by the terminal driver.

use anyhow::{Context, Result, anyhow, bail};
use readalong_core::pagination::PagingMode;
use readalong_core::session::SessionCommand;
use std::str::FromStr;

pub const HELP: &str = "\
commands:
  play | pause | space        control playback
  seek SECS                   seek the audio
  click N | word TOKEN        click a sentence / shift-click a word
  bar X WIDTH                 click the progress bar
  find TEXT | n | p | clear   search, next/previous match, clear
  + | - | offset MS           nudge or set the sync offset
  voice ID | retry            switch voice, retry a failed load
  mode paged|full | size N    paging mode and page size
  gap SECS | hl | theme       sentence gap, highlighting, theme
  next | prev | page N        page navigation
  status | help | q";

#[derive(Debug, Clone, PartialEq)]
pub enum DriverCommand {
    Session(SessionCommand),
    Status,
    Help,
    Quit,
}

fn number<T: FromStr>(value: Option<&str>, what: &str) -> Result<T> {
    let raw = value.ok_or_else(|| anyhow!("missing {what}"))?;
    raw.parse::<T>()
        .map_err(|_| anyhow!("invalid {what}: {raw}"))
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Result<Option<DriverCommand>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = line
        .split_once(char::is_whitespace)
        .map(|(word, rest)| (word, rest.trim()))
        .unwrap_or((line, ""));
    let mut args = rest.split_whitespace();

    let command = match word {
        "play" => SessionCommand::Play,
        "pause" => SessionCommand::Pause,
        "space" => SessionCommand::TogglePlayPause,
        "seek" => SessionCommand::SeekTo {
            seconds: number(args.next(), "seconds")?,
        },
        "click" => SessionCommand::SentenceClick {
            sentence: number(args.next(), "sentence index")?,
        },
        "word" => SessionCommand::WordClick {
            token: number(args.next(), "token index")?,
        },
        "bar" => SessionCommand::ProgressBarClick {
            x: number(args.next(), "x")?,
            width: number(args.next(), "width")?,
        },
        "find" => {
            if rest.is_empty() {
                bail!("missing search text");
            }
            SessionCommand::SearchSetQuery {
                query: rest.to_string(),
            }
        }
        "n" => SessionCommand::SearchNext,
        "p" => SessionCommand::SearchPrev,
        "clear" => SessionCommand::SearchClear,
        "+" => SessionCommand::NudgeOffset { steps: 1 },
        "-" => SessionCommand::NudgeOffset { steps: -1 },
        "offset" => SessionCommand::SetOffset {
            offset_ms: number(args.next(), "offset")?,
        },
        "voice" => SessionCommand::SwitchVoice {
            voice_id: args
                .next()
                .map(str::to_string)
                .context("missing voice id")?,
        },
        "mode" => SessionCommand::SetPagingMode {
            mode: match args.next() {
                Some("paged") => PagingMode::Paged,
                Some("full") => PagingMode::Full,
                other => bail!("expected paged or full, got {}", other.unwrap_or("nothing")),
            },
        },
        "size" => SessionCommand::SetPageSize {
            page_size: number(args.next(), "page size")?,
        },
        "gap" => SessionCommand::SetSentenceGap {
            secs: number(args.next(), "gap")?,
        },
        "hl" => SessionCommand::ToggleHighlighting,
        "theme" => SessionCommand::ToggleTheme,
        "retry" => SessionCommand::Retry,
        "next" => SessionCommand::NextPage,
        "prev" => SessionCommand::PrevPage,
        "page" => SessionCommand::SetPage {
            page: number(args.next(), "page")?,
        },
        "status" => return Ok(Some(DriverCommand::Status)),
        "help" | "?" => return Ok(Some(DriverCommand::Help)),
        "q" | "quit" | "exit" => return Ok(Some(DriverCommand::Quit)),
        other => bail!("unknown command: {other} (try help)"),
    };
    Ok(Some(DriverCommand::Session(command)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(line: &str) -> SessionCommand {
        match parse_command(line) {
            Ok(Some(DriverCommand::Session(command))) => command,
            other => panic!("unexpected parse for {line:?}: {other:?}"),
        }
    }

    #[test]
    fn parses_arguments() {
        assert_eq!(session("seek 12.5"), SessionCommand::SeekTo { seconds: 12.5 });
        assert_eq!(
            session("bar 40 200"),
            SessionCommand::ProgressBarClick {
                x: 40.0,
                width: 200.0
            }
        );
        assert_eq!(
            session("mode full"),
            SessionCommand::SetPagingMode {
                mode: PagingMode::Full
            }
        );
        assert_eq!(session("-"), SessionCommand::NudgeOffset { steps: -1 });
    }

    #[test]
    fn search_keeps_the_whole_query() {
        assert_eq!(
            session("find  the quick fox "),
            SessionCommand::SearchSetQuery {
                query: "the quick fox".to_string()
            }
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse_command("seek soon").is_err());
        assert!(parse_command("mode sideways").is_err());
        assert!(parse_command("find").is_err());
        assert!(parse_command("dance").is_err());
        assert!(matches!(parse_command("   "), Ok(None)));
        assert!(matches!(parse_command("q"), Ok(Some(DriverCommand::Quit))));
    }
}
