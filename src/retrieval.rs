//! Turning ranked chunks into a bounded knowledge block for an LLM prompt.

use serde::{Deserialize, Serialize};

use crate::embeddings::ScoredChunk;
use crate::error::{Result, SnapragError};
use crate::text;

pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.6;

const KNOWLEDGE_LEAD_IN: &str = "Use the following knowledge base information when relevant:";
const UNCERTAIN_GUIDANCE: &str =
    "If the knowledge matches seem uncertain, ask the user for clarification before proceeding.";
const NO_MATCH_GUIDANCE: &str = "If the request is ambiguous or the knowledge base does not provide matches, ask the user for clarification before answering.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub similarity_threshold: f32,
    /// Chunks fetched from the vector store per message.
    pub match_limit: usize,
    pub max_context_chars: usize,
    pub snippet_chars: usize,
    /// Backup snippets used when nothing clears the threshold.
    pub max_backup_blocks: usize,
    pub max_blocks: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            match_limit: 8,
            max_context_chars: 1800,
            snippet_chars: 650,
            max_backup_blocks: 3,
            max_blocks: 5,
        }
    }
}

impl RetrievalSettings {
    /// The configured threshold, or the default when it is outside (0, 1).
    pub fn effective_threshold(&self) -> f32 {
        let t = self.similarity_threshold;
        if t.is_finite() && t > 0.0 && t < 1.0 {
            t
        } else {
            DEFAULT_SIMILARITY_THRESHOLD
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.match_limit == 0 {
            return Err(SnapragError::Config("match_limit must be at least 1".into()));
        }
        if self.snippet_chars == 0 || self.max_context_chars == 0 {
            return Err(SnapragError::Config(
                "snippet_chars and max_context_chars must be positive".into(),
            ));
        }
        if self.max_blocks == 0 {
            return Err(SnapragError::Config("max_blocks must be at least 1".into()));
        }
        Ok(())
    }
}

/// Knowledge assembled for one user message.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KnowledgeContext {
    /// Snippet blocks joined by a blank line; empty when nothing was used.
    pub content: String,
    /// Best score among all matches, 0 when there were none.
    pub top_score: f32,
    pub matches: Vec<ScoredChunk>,
    /// Set when only below-threshold snippets made it into `content`.
    pub low_confidence: bool,
}

impl KnowledgeContext {
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// System messages to prepend to the model input.
    pub fn guidance(&self, threshold: f32) -> Vec<String> {
        if self.is_empty() {
            return vec![NO_MATCH_GUIDANCE.to_string()];
        }
        let mut messages = vec![format!("{}\n\n{}", KNOWLEDGE_LEAD_IN, self.content)];
        if self.low_confidence || self.top_score < threshold {
            messages.push(UNCERTAIN_GUIDANCE.to_string());
        }
        messages
    }
}

/// `Source: <title> | Category: <category> (<url>)`, leaving out absent parts.
pub fn source_line(title: &str, category: Option<&str>, url: Option<&str>) -> String {
    let mut parts = Vec::new();
    let title = title.trim();
    if !title.is_empty() {
        parts.push(format!("Source: {}", title));
    }
    if let Some(cat) = category.map(str::trim).filter(|c| !c.is_empty()) {
        parts.push(format!("Category: {}", cat));
    }
    let mut line = parts.join(" | ");
    if let Some(url) = url.map(str::trim).filter(|u| !u.is_empty()) {
        if line.is_empty() {
            line = format!("({})", url);
        } else {
            line.push_str(&format!(" ({})", url));
        }
    }
    line
}

/// Collapsed, truncated chunk text followed by its source line.
pub fn format_snippet(scored: &ScoredChunk, snippet_chars: usize) -> String {
    let chunk = &scored.chunk;
    let body = text::truncate_chars(&text::single_line(&chunk.text), snippet_chars);
    let source = source_line(
        &chunk.source_title,
        chunk.source_category.as_deref(),
        chunk.source_url.as_deref(),
    );
    if source.is_empty() {
        body
    } else {
        format!("{}\n{}", body, source)
    }
}

/// Build the knowledge block from ranked matches.
///
/// Matches at or above the threshold are primary and are taken in rank order.
/// A snippet that would exceed the character budget is skipped and later,
/// shorter ones may still fit. With no primary
/// match, the first backup snippets that fit are used instead and the result
/// is marked low confidence.
pub fn assemble_context(matches: Vec<ScoredChunk>, settings: &RetrievalSettings) -> KnowledgeContext {
    let threshold = settings.effective_threshold();
    let top_score = matches.iter().map(|m| m.score).fold(0.0_f32, f32::max);

    let (primary, backup): (Vec<&ScoredChunk>, Vec<&ScoredChunk>) =
        matches.iter().partition(|m| m.score >= threshold);

    let mut blocks: Vec<String> = Vec::new();
    let mut used = 0usize;

    for m in &primary {
        if blocks.len() >= settings.max_blocks {
            break;
        }
        let snippet = format_snippet(m, settings.snippet_chars);
        let len = snippet.chars().count();
        if used + len > settings.max_context_chars {
            continue;
        }
        used += len;
        blocks.push(snippet);
    }

    let mut low_confidence = false;
    if primary.is_empty() {
        let limit = settings.max_backup_blocks.min(settings.max_blocks);
        for m in &backup {
            if blocks.len() >= limit {
                break;
            }
            let snippet = format_snippet(m, settings.snippet_chars);
            let len = snippet.chars().count();
            if used + len > settings.max_context_chars {
                continue;
            }
            used += len;
            blocks.push(snippet);
        }
        low_confidence = !blocks.is_empty();
    }

    KnowledgeContext {
        content: blocks.join("\n\n"),
        top_score,
        matches,
        low_confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::StoredChunk;
    use crate::knowledge::SourceType;

    fn scored(id: u64, score: f32, text: &str) -> ScoredChunk {
        ScoredChunk {
            score,
            chunk: StoredChunk {
                id,
                entry_id: id,
                source_type: SourceType::Custom,
                source_title: format!("Doc {}", id),
                source_url: None,
                source_category: None,
                chunk_index: 0,
                text: text.to_string(),
                checksum: String::new(),
                embedding: vec![1.0],
            },
        }
    }

    #[test]
    fn test_effective_threshold_falls_back() {
        let mut s = RetrievalSettings::default();
        assert_eq!(s.effective_threshold(), 0.6);
        s.similarity_threshold = 0.75;
        assert_eq!(s.effective_threshold(), 0.75);
        for bad in [0.0, 1.0, -0.2, 1.5, f32::NAN] {
            s.similarity_threshold = bad;
            assert_eq!(s.effective_threshold(), DEFAULT_SIMILARITY_THRESHOLD);
        }
    }

    #[test]
    fn test_source_line_omits_missing_parts() {
        assert_eq!(
            source_line("Refund Policy", Some("Support"), Some("https://shop.test/refunds")),
            "Source: Refund Policy | Category: Support (https://shop.test/refunds)"
        );
        assert_eq!(source_line("Refund Policy", None, None), "Source: Refund Policy");
        assert_eq!(source_line("FAQ", Some(" "), Some("/faq")), "Source: FAQ (/faq)");
    }

    #[test]
    fn test_snippet_is_truncated_and_single_line() {
        let m = scored(1, 0.9, &format!("line one\n\n{}", "x".repeat(700)));
        let snippet = format_snippet(&m, 650);
        let (body, source) = snippet.split_once('\n').unwrap();
        assert_eq!(body.chars().count(), 651);
        assert!(body.ends_with('…'));
        assert!(body.starts_with("line one x"));
        assert_eq!(source, "Source: Doc 1");
    }

    #[test]
    fn test_primary_matches_fill_budget_in_order() {
        let long = "word ".repeat(110);
        let matches = vec![
            scored(1, 0.95, &long),
            scored(2, 0.9, &long),
            scored(3, 0.85, &long),
            scored(4, 0.8, &long),
            scored(5, 0.2, "backup"),
        ];
        let ctx = assemble_context(matches, &RetrievalSettings::default());

        assert!(!ctx.low_confidence);
        assert_eq!(ctx.top_score, 0.95);
        assert_eq!(ctx.matches.len(), 5);
        // Each block is 563 chars, so three fit in 1800 while a fourth would not.
        assert_eq!(ctx.content.matches("Source: Doc").count(), 3);
        assert!(!ctx.content.contains("backup"));
        assert!(ctx.content.find("Doc 1").unwrap() < ctx.content.find("Doc 2").unwrap());
    }

    #[test]
    fn test_budget_skips_oversized_primary_snippets() {
        let long = "y".repeat(900);
        let matches = vec![
            scored(1, 0.9, &long),
            scored(2, 0.85, &long),
            scored(3, 0.8, &long),
            scored(4, 0.7, "short"),
        ];
        let ctx = assemble_context(matches, &RetrievalSettings::default());

        let blocks: Vec<&str> = ctx.content.split("\n\n").collect();
        assert_eq!(blocks.len(), 3);
        assert!(blocks[0].starts_with(&"y".repeat(650)));
        assert!(!ctx.content.contains("Doc 3"));
        assert!(blocks[2].starts_with("short"));
        assert!(ctx.content.chars().count() <= 1800 + 2 * 2);
        assert!(!ctx.low_confidence);
    }

    #[test]
    fn test_backup_fallback_is_low_confidence() {
        let matches = (1..=5).map(|i| scored(i, 0.3, "something related")).collect();
        let ctx = assemble_context(matches, &RetrievalSettings::default());

        assert!(ctx.low_confidence);
        assert_eq!(ctx.content.split("\n\n").count(), 3);
        assert!(ctx.content.contains("Doc 1"));
        assert!(!ctx.content.contains("Doc 4"));

        let guidance = ctx.guidance(0.6);
        assert_eq!(guidance.len(), 2);
        assert!(guidance[0].starts_with(KNOWLEDGE_LEAD_IN));
        assert_eq!(guidance[1], UNCERTAIN_GUIDANCE);
    }

    #[test]
    fn test_block_count_is_capped() {
        let matches = (1..=8).map(|i| scored(i, 0.9, "short answer")).collect();
        let ctx = assemble_context(matches, &RetrievalSettings::default());
        assert_eq!(ctx.content.split("\n\n").count(), 5);
    }

    #[test]
    fn test_no_matches_asks_for_clarification() {
        let ctx = assemble_context(Vec::new(), &RetrievalSettings::default());
        assert!(ctx.is_empty());
        assert_eq!(ctx.top_score, 0.0);
        assert!(!ctx.low_confidence);
        assert_eq!(ctx.guidance(0.6), vec![NO_MATCH_GUIDANCE.to_string()]);
    }

    #[test]
    fn test_confident_context_has_single_guidance_message() {
        let ctx = assemble_context(vec![scored(1, 0.92, "refunds take 5 days")], &RetrievalSettings::default());
        let guidance = ctx.guidance(0.6);
        assert_eq!(guidance.len(), 1);
        assert!(guidance[0].contains("refunds take 5 days"));
    }
}
