//! Source-context enrichment for execution errors.
//!
//! Engine errors end with the position of the failing frame as
//! `(line <N>, position <M>)`. When such a marker is present, the lines
//! around it are appended to the message so callers can see the offending
//! code without cross-referencing their submission.

use regex::Regex;
use std::sync::OnceLock;

/// Lines shown on each side of the failing line.
const CONTEXT_RADIUS: usize = 4;

/// Header of the appended block.
const CONTEXT_HEADER: &str = "Code context:";

static POSITION_MARKER: OnceLock<Option<Regex>> = OnceLock::new();

fn position_marker() -> Option<&'static Regex> {
    POSITION_MARKER
        .get_or_init(|| Regex::new(r"\(line (\d+), position \d+\)").ok())
        .as_ref()
}

/// Returns the line cited by the last position marker in `message`.
///
/// Text thrown by user code can contain its own `line N` phrases; only the
/// engine's `(line N, position M)` markers count, and the engine appends the
/// position of the outermost frame last.
#[must_use]
pub fn cited_line(message: &str) -> Option<usize> {
    position_marker()?
        .captures_iter(message)
        .last()
        .and_then(|captures| captures.get(1))
        .and_then(|number| number.as_str().parse().ok())
}

/// Appends a numbered window of `source` around the line cited by `message`.
///
/// The window is `[max(1, N-4), min(last, N+4)]`. Messages without a marker,
/// or citing a line outside the source, are returned unchanged.
#[must_use]
pub fn enrich(source: &str, message: &str) -> String {
    let Some(line) = cited_line(message).filter(|n| *n > 0) else {
        return message.to_string();
    };

    let lines: Vec<&str> = source.lines().collect();
    let first = line.saturating_sub(CONTEXT_RADIUS).max(1);
    let last = line.saturating_add(CONTEXT_RADIUS).min(lines.len());
    if first > last {
        return message.to_string();
    }

    let context: Vec<String> = (first..=last)
        .map(|number| format!("{}: {}", number, lines[number - 1]))
        .collect();

    format!("{message}\n\n{CONTEXT_HEADER}\n{}", context.join("\n"))
}
