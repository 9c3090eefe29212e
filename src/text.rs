//! Plain-text helpers shared by the chunker, the knowledge base and context
//! assembly. All lengths are counted in `char`s, never bytes.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

/// Words ignored by keyword extraction and lexical search.
pub const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "about", "what", "how", "when", "where", "why", "is", "are", "was", "were", "be", "been",
    "have", "has", "had", "do", "does", "did", "will", "would", "could", "should", "can", "may",
    "might", "must", "i", "you", "he", "she", "it", "we", "they", "me", "him", "her", "us",
    "them", "my", "your", "his", "hers", "its", "our", "their",
];

/// Remove `<script>`/`<style>` blocks and all remaining tags, then decode the
/// handful of entities that show up in CMS exports.
pub fn strip_html(input: &str) -> String {
    static BLOCK_RE: OnceLock<Regex> = OnceLock::new();
    static TAG_RE: OnceLock<Regex> = OnceLock::new();
    let block_re = BLOCK_RE.get_or_init(|| {
        Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>").expect("static regex")
    });
    let tag_re = TAG_RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("static regex"));

    let without_blocks = block_re.replace_all(input, " ");
    let without_tags = tag_re.replace_all(&without_blocks, " ");
    decode_entities(&without_tags)
}

fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#039;", "'")
        .replace("&amp;", "&")
}

/// Collapse whitespace runs: a run containing a line break becomes one `\n`,
/// any other run one space. Result is trimmed.
pub fn collapse_whitespace(input: &str) -> String {
    static WS_RE: OnceLock<Regex> = OnceLock::new();
    let ws_re = WS_RE.get_or_init(|| Regex::new(r"\s+").expect("static regex"));

    ws_re
        .replace_all(input, |caps: &regex::Captures| {
            if caps[0].contains('\n') {
                "\n"
            } else {
                " "
            }
        })
        .trim()
        .to_string()
}

/// Collapse every whitespace run, line breaks included, into one space.
pub fn single_line(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cut to `limit` chars, appending `…` when something was dropped.
pub fn truncate_chars(input: &str, limit: usize) -> String {
    if input.chars().count() <= limit {
        return input.to_string();
    }
    let head: String = input.chars().take(limit).collect();
    format!("{}…", head.trim_end())
}

/// Reduce markdown to readable text: drop fenced code and images, unwrap
/// inline code, emphasis and links, strip heading and quote markers.
pub fn markdown_to_text(markdown: &str) -> String {
    static RULES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    let rules = RULES.get_or_init(|| {
        [
            (r"(?m)```[\s\S]*?```", ""),
            (r"`([^`]+)`", "$1"),
            (r"!\[[^\]]*\]\(([^)]+)\)", ""),
            (r"\[([^\]]+)\]\(([^)]+)\)", "$1 ($2)"),
            (r"(?m)^>+\s?", ""),
            (r"(?m)^#{1,6}\s*", ""),
            (r"\*\*([^*]+)\*\*", "$1"),
            (r"\*([^*]+)\*", "$1"),
        ]
        .into_iter()
        .map(|(pattern, rep)| (Regex::new(pattern).expect("static regex"), rep))
        .collect()
    });

    let mut text = markdown.to_string();
    for (re, rep) in rules {
        text = re.replace_all(&text, *rep).into_owned();
    }
    let text = text.replace(['_', '#'], " ");
    decode_entities(&text).trim().to_string()
}

/// Lowercased alphabetic words (apostrophes and hyphens kept inside words).
pub fn words(input: &str) -> Vec<String> {
    input
        .split(|c: char| !(c.is_alphabetic() || c == '\'' || c == '-'))
        .map(|w| w.trim_matches(|c| c == '\'' || c == '-'))
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word)
}

/// First `max_words` words of the tag-stripped content.
pub fn excerpt(content: &str, max_words: usize) -> String {
    let plain = strip_html(content);
    let mut it = plain.split_whitespace();
    let head: Vec<&str> = it.by_ref().take(max_words).collect();
    let mut out = head.join(" ");
    if it.next().is_some() {
        out.push('…');
    }
    out
}

/// Most frequent non-stop-words, ties broken alphabetically so the result
/// is stable.
pub fn extract_keywords(content: &str, max_keywords: usize) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for w in words(&strip_html(content)) {
        if w.chars().count() < 3 || is_stop_word(&w) {
            continue;
        }
        *counts.entry(w).or_insert(0) += 1;
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(max_keywords).map(|(w, _)| w).collect()
}

/// Search terms: words longer than two chars that are not stop words, in
/// query order without duplicates.
pub fn search_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for w in words(query) {
        if w.chars().count() > 2 && !is_stop_word(&w) && !terms.contains(&w) {
            terms.push(w);
        }
    }
    terms
}
