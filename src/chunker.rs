//! Splits knowledge entries into bounded, title-prefixed chunks.
//!
//! Chunking is deterministic: the same title, content and limits always
//! produce the same chunks, which keeps rebuilds idempotent and checksums
//! stable.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Result, SnapragError};
use crate::text;

/// Sentence terminators searched for in the tail window, in no particular
/// order; the furthest match wins.
const BREAK_DELIMITERS: &[&str] = &[". ", "? ", "! ", "\n"];

/// Characters of chunk text folded into its checksum.
const CHECKSUM_PREFIX_CHARS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkLimits {
    /// Hard cap on a chunk body, in chars.
    pub max_chars: usize,
    /// Chars kept before an early break is allowed.
    pub min_chars: usize,
}

impl Default for ChunkLimits {
    fn default() -> Self {
        Self {
            max_chars: 780,
            min_chars: 420,
        }
    }
}

impl ChunkLimits {
    pub fn validate(&self) -> Result<()> {
        if self.max_chars == 0 {
            return Err(SnapragError::Config("chunking.max_chars must be > 0".into()));
        }
        if self.min_chars >= self.max_chars {
            return Err(SnapragError::Config(format!(
                "chunking.min_chars ({}) must be below max_chars ({})",
                self.min_chars, self.max_chars
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    /// Slice of the cleaned content, at most `max_chars` long.
    pub body: String,
    /// Text that gets embedded: title, blank line, body.
    pub text: String,
}

/// Split `content` into chunks prefixed with `title`.
pub fn chunk_content(title: &str, content: &str, limits: &ChunkLimits) -> Vec<Chunk> {
    let clean = text::collapse_whitespace(&text::strip_html(content));
    if clean.is_empty() || limits.max_chars == 0 {
        return Vec::new();
    }

    let title = title.trim();
    let chars: Vec<char> = clean.chars().collect();
    let total = chars.len();
    let mut offset = 0;
    let mut chunks = Vec::new();

    while offset < total {
        let end = (offset + limits.max_chars).min(total);
        let window = &chars[offset..end];

        let mut cut = window.len();
        if window.len() == limits.max_chars && end < total {
            if let Some(bp) = find_breakpoint(window, limits.min_chars) {
                cut = bp;
            }
        }

        let segment: String = window[..cut].iter().collect();
        offset += cut;

        let body = segment.trim();
        if body.is_empty() {
            continue;
        }

        let text = if title.is_empty() {
            body.to_string()
        } else {
            format!("{}\n\n{}", title, body)
        };
        chunks.push(Chunk {
            index: chunks.len(),
            body: body.to_string(),
            text,
        });
    }

    chunks
}

/// Position to cut a full window at, preferring the furthest sentence end
/// past `min_chars`, then the last space past `min_chars`.
fn find_breakpoint(window: &[char], min_chars: usize) -> Option<usize> {
    let len = window.len();
    if len <= min_chars {
        return None;
    }

    let tail = &window[min_chars..];
    let mut best: Option<usize> = None;
    for delimiter in BREAK_DELIMITERS {
        let pattern: Vec<char> = delimiter.chars().collect();
        if let Some(pos) = tail.windows(pattern.len()).rposition(|w| w == pattern.as_slice()) {
            let candidate = min_chars + pos + pattern.len();
            if candidate > min_chars && candidate < len {
                best = Some(best.map_or(candidate, |b| b.max(candidate)));
            }
        }
    }
    if best.is_some() {
        return best;
    }

    window
        .iter()
        .rposition(|c| *c == ' ')
        .filter(|pos| *pos > min_chars)
}

/// Deterministic identity of a chunk: entry content hash, chunk index and
/// the first chars of the chunk text.
pub fn chunk_checksum(content_hash: &str, index: usize, chunk_text: &str) -> String {
    let prefix: String = chunk_text.chars().take(CHECKSUM_PREFIX_CHARS).collect();
    let mut hasher = Sha256::new();
    hasher.update(format!("{}::{}::{}", content_hash, index, prefix).as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentences(n: usize) -> String {
        (0..n)
            .map(|i| format!("Sentence number {} explains one more detail of the policy.", i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_empty_content_yields_no_chunks() {
        let limits = ChunkLimits::default();
        assert!(chunk_content("Title", "", &limits).is_empty());
        assert!(chunk_content("Title", "  <p> </p> \n ", &limits).is_empty());
    }

    #[test]
    fn test_short_content_is_single_chunk_with_title() {
        let chunks = chunk_content("  FAQ ", "Short answer.", &ChunkLimits::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].body, "Short answer.");
        assert_eq!(chunks[0].text, "FAQ\n\nShort answer.");
    }

    #[test]
    fn test_untitled_chunk_has_no_prefix() {
        let chunks = chunk_content("", "Body only.", &ChunkLimits::default());
        assert_eq!(chunks[0].text, "Body only.");
    }

    #[test]
    fn test_chunking_is_deterministic() {
        let content = sentences(60);
        let limits = ChunkLimits::default();
        let a = chunk_content("Refund Policy", &content, &limits);
        let b = chunk_content("Refund Policy", &content, &limits);
        assert!(a.len() > 1);
        assert_eq!(a, b);
    }

    #[test]
    fn test_chunk_bodies_respect_max_chars() {
        let content = sentences(80);
        let limits = ChunkLimits::default();
        let chunks = chunk_content("T", &content, &limits);
        for c in &chunks {
            assert!(c.body.chars().count() <= limits.max_chars);
        }
        // Every chunk but the last was broken past min_chars.
        for c in &chunks[..chunks.len() - 1] {
            assert!(c.body.chars().count() > limits.min_chars - 1);
        }
    }

    #[test]
    fn test_breaks_at_sentence_end() {
        let content = sentences(40);
        let chunks = chunk_content("", &content, &ChunkLimits::default());
        for c in &chunks[..chunks.len() - 1] {
            assert!(c.body.ends_with('.'), "chunk should end on a sentence: {:?}", c.body);
        }
    }

    #[test]
    fn test_falls_back_to_whitespace_then_hard_cut() {
        let limits = ChunkLimits {
            max_chars: 20,
            min_chars: 5,
        };
        // No sentence terminators: break on the last space past min_chars.
        let chunks = chunk_content("", "alpha beta gamma delta epsilon zeta eta", &limits);
        assert_eq!(chunks[0].body, "alpha beta gamma");
        assert!(chunks.iter().all(|c| c.body.chars().count() <= 20));

        // No whitespace at all: hard cut at max_chars.
        let solid = "x".repeat(45);
        let chunks = chunk_content("", &solid, &limits);
        let lens: Vec<usize> = chunks.iter().map(|c| c.body.len()).collect();
        assert_eq!(lens, vec![20, 20, 5]);
    }

    #[test]
    fn test_chunks_cover_all_content() {
        let content = sentences(30);
        let chunks = chunk_content("", &content, &ChunkLimits::default());
        let rejoined = chunks
            .iter()
            .map(|c| c.body.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        assert_eq!(rejoined, content);
    }

    #[test]
    fn test_multibyte_content_is_split_on_chars() {
        let limits = ChunkLimits {
            max_chars: 10,
            min_chars: 4,
        };
        let content = "ééééééééééééééééééééééé";
        let chunks = chunk_content("", content, &limits);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.body.chars().count() <= 10));
    }

    #[test]
    fn test_limits_validate() {
        assert!(ChunkLimits::default().validate().is_ok());
        assert!(ChunkLimits { max_chars: 0, min_chars: 0 }.validate().is_err());
        assert!(ChunkLimits { max_chars: 100, min_chars: 100 }.validate().is_err());
    }

    #[test]
    fn test_checksum_identity() {
        let a = chunk_checksum("hash", 0, "Refund Policy\n\nBody");
        let b = chunk_checksum("hash", 0, "Refund Policy\n\nBody");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, chunk_checksum("hash", 1, "Refund Policy\n\nBody"));
        assert_ne!(a, chunk_checksum("other", 0, "Refund Policy\n\nBody"));
        assert_ne!(a, chunk_checksum("hash", 0, "Shipping Policy\n\nBody"));
    }
}
