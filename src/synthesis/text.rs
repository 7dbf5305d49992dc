//! Text preparation for read-back
//!
//! Lookup results arrive as markdown. Before they reach the engine the
//! formatting markers are stripped and the text is cut into sentence-aligned
//! segments short enough for engines that truncate long utterances.

use std::sync::LazyLock;

use regex::Regex;

/// Maximum characters handed to the engine as one utterance
pub const MAX_SEGMENT_CHARS: usize = 200;

static MARKDOWN_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\([^)]+\)").expect("valid regex"));

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]+").expect("valid regex"));

/// Strip markdown and normalize whitespace for speaking
///
/// Emphasis and heading markers are dropped, links collapse to their label,
/// paragraph breaks become sentence breaks and every run of whitespace
/// becomes a single space.
#[must_use]
pub fn clean_text(text: &str) -> String {
    let text = text.replace(['*', '#'], "");
    let text = MARKDOWN_LINK.replace_all(&text, "$1");
    let text = text.replace("\r\n", "\n").replace("\n\n", ". ").replace('\n', " ");
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

/// Split cleaned text into sentences
///
/// Each sentence runs up to and including a run of `.`, `!` or `?`; text
/// after the last terminator forms a final sentence of its own. The pieces
/// are contiguous, so joining them gives back the input.
#[must_use]
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for terminator in SENTENCE_END.find_iter(text) {
        sentences.push(&text[start..terminator.end()]);
        start = terminator.end();
    }
    if start < text.len() {
        sentences.push(&text[start..]);
    }

    sentences
}

/// Group sentences into segments of at most `max_chars` characters
///
/// A segment is flushed before a sentence that would push it over the limit
/// and once more at the end, so no trailing text is lost. A single sentence
/// longer than the limit becomes a segment by itself.
#[must_use]
pub fn segment(text: &str, max_chars: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut segments = Vec::new();
    let mut buffer = String::new();
    let mut buffer_chars = 0;

    for sentence in split_sentences(text) {
        let sentence_chars = sentence.chars().count();
        if !buffer.is_empty() && buffer_chars + sentence_chars > max_chars {
            segments.push(std::mem::take(&mut buffer));
            buffer_chars = 0;
        }
        buffer.push_str(sentence);
        buffer_chars += sentence_chars;
    }
    if !buffer.is_empty() {
        segments.push(buffer);
    }

    segments
}

/// Suffix of `text` starting at character `offset`
#[must_use]
pub fn from_char(text: &str, offset: usize) -> &str {
    text.char_indices()
        .nth(offset)
        .map_or("", |(byte, _)| &text[byte..])
}
