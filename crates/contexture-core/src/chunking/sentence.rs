//! Sentence boundary detection.
//!
//! Splits document text into ordered sentences with exact byte spans. The
//! same splitter serves two callers: the corpus builder (sentence units for
//! the window engine) and the groundedness metric (decomposing an answer
//! into statements).

use crate::corpus::types::ByteSpan;
use once_cell::sync::Lazy;
use regex::Regex;

// Matches `. ! ?` runs followed by whitespace or end of string.
// Abbreviations like "Dr. Smith" over-split; acceptable here, since slight
// over-splitting only makes windows a touch wider than intended.
static SENTENCE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]+(?:\s+|$)").expect("Invalid sentence regex pattern"));

/// One detected sentence.
///
/// `text` is exactly `document[span.start..span.end]`: the segment with
/// surrounding whitespace stripped but terminator punctuation kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentenceSeg {
    /// Position in the document's sentence sequence.
    pub ordinal: usize,
    /// Sentence text, terminator included.
    pub text: String,
    /// Byte range within the source document.
    pub span: ByteSpan,
}

/// Splits text into sentences with document-absolute byte spans.
///
/// An unterminated tail ("...and then") becomes a final sentence. Text with
/// no boundaries at all becomes a single sentence. Whitespace-only input
/// yields nothing.
pub fn split_sentences(text: &str) -> Vec<SentenceSeg> {
    let mut sentences = Vec::new();
    let mut last_end = 0;

    for mat in SENTENCE_PATTERN.find_iter(text) {
        push_trimmed(text, last_end, mat.end(), &mut sentences);
        last_end = mat.end();
    }

    // Final sentence without terminating punctuation.
    if last_end < text.len() {
        push_trimmed(text, last_end, text.len(), &mut sentences);
    }

    sentences
}

/// Appends the trimmed sentence in `text[start..end]`, skipping whitespace-only
/// segments, keeping spans pointing at the untrimmed source.
fn push_trimmed(text: &str, start: usize, end: usize, out: &mut Vec<SentenceSeg>) {
    let segment = &text[start..end];
    let stripped = segment.trim_start();
    let leading = segment.len() - stripped.len();
    let stripped = stripped.trim_end();
    if stripped.is_empty() {
        return;
    }
    let span_start = start + leading;
    out.push(SentenceSeg {
        ordinal: out.len(),
        text: stripped.to_string(),
        span: ByteSpan::new(span_start, span_start + stripped.len()),
    });
}

/// Ordinal range `[first, last]` (inclusive) of the window around ordinal
/// `i` with radius `w`, clamped to `[0, count)`.
///
/// Radius 0 degenerates to the sentence itself. Callers guarantee
/// `count > 0` and `i < count`.
pub fn window_range(i: usize, w: usize, count: usize) -> (usize, usize) {
    let first = i.saturating_sub(w);
    let last = (i + w).min(count - 1);
    (first, last)
}
