/// End-to-end retrieval through the library with a deterministic embedder.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use snaprag::embeddings::EmbedFuture;
use snaprag::{
    Config, Embedder, EmbeddingError, Engine, EntryOptions, EntryStatus, Settings, SnapragError,
};
use tempfile::TempDir;

/// Embeds text as counts of a few topic stems, so related texts point the
/// same way without any network access.
#[derive(Default)]
struct TopicEmbedder {
    offline: AtomicBool,
}

const TOPICS: &[&[&str]] = &[
    &["refund", "money back"],
    &["ship", "deliver", "courier"],
    &["privacy", "personal data"],
    &["password", "account"],
];

impl Embedder for TopicEmbedder {
    fn embed<'a>(&'a self, text: &'a str, _model: &'a str) -> EmbedFuture<'a> {
        Box::pin(async move {
            if self.offline.load(Ordering::SeqCst) {
                return Err(EmbeddingError::Upstream {
                    status: 503,
                    message: "service unavailable".into(),
                });
            }
            let t = text.to_lowercase();
            Ok(TOPICS
                .iter()
                .map(|stems| stems.iter().map(|s| t.matches(s).count()).sum::<usize>() as f32 + 0.1)
                .collect())
        })
    }
}

fn refund_policy() -> String {
    let sentences = [
        "Customers can request a refund within 30 days of purchase.",
        "Refunds are issued to the original payment method.",
        "To get a refund, contact support with your order number.",
        "A refund is usually processed within five business days.",
    ];
    let mut text = String::new();
    let mut i = 0;
    while text.chars().count() < 2000 {
        text.push_str(sentences[i % sentences.len()]);
        text.push(' ');
        i += 1;
    }
    text.trim_end().to_string()
}

fn open(data: &TempDir) -> (Engine, Arc<TopicEmbedder>) {
    let embedder = Arc::new(TopicEmbedder::default());
    let config = Config {
        data_dir: data.path().to_path_buf(),
        settings: Settings::default(),
        api_key: None,
    };
    let engine = Engine::open(config, embedder.clone()).unwrap();
    (engine, embedder)
}

fn seed(engine: &Engine) {
    engine
        .add_content(
            "Refund Policy",
            &refund_policy(),
            EntryOptions {
                category: Some("Support".into()),
                source_url: Some("https://shop.test/refunds".into()),
                ..EntryOptions::default()
            },
        )
        .unwrap();
    engine
        .add_content(
            "Shipping Guide",
            "We ship orders every weekday. Delivery by courier takes two to four days.",
            EntryOptions::default(),
        )
        .unwrap();
    engine
        .add_content(
            "Privacy Notice",
            "We never sell personal data. Read our privacy notice for details.",
            EntryOptions::default(),
        )
        .unwrap();
}

#[tokio::test]
async fn refund_question_retrieves_refund_policy() {
    let data = TempDir::new().unwrap();
    let (engine, _) = open(&data);
    seed(&engine);

    let meta = engine.rebuild_now().await.unwrap();
    assert_eq!(meta.entry_count, 3);
    // ~2000 chars of policy split at 780 chars per chunk, plus two short docs.
    assert!(meta.chunk_count >= 5);

    let threshold = engine.settings().retrieval.effective_threshold();
    let hits = engine.query_text("how do I get a refund", 8).await.unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0].chunk.source_title, "Refund Policy");
    assert!(hits[0].score >= threshold);
    assert!(hits
        .iter()
        .filter(|h| h.chunk.source_title != "Refund Policy")
        .all(|h| h.score < threshold));

    let ctx = engine.retrieve_context("how do I get a refund").await;
    assert!(!ctx.low_confidence);
    assert!(ctx.content.contains(
        "Source: Refund Policy | Category: Support (https://shop.test/refunds)"
    ));
    assert!(ctx.content.chars().count() <= 1800 + 2 * 4);
    assert!(!ctx.content.contains("Shipping Guide"));
}

#[tokio::test]
async fn failed_rebuild_keeps_serving_previous_snapshot() {
    let data = TempDir::new().unwrap();
    let (engine, embedder) = open(&data);
    seed(&engine);
    let first = engine.rebuild_now().await.unwrap();

    engine
        .add_content("Accounts", "Reset your password from the account page.", EntryOptions::default())
        .unwrap();
    embedder.offline.store(true, Ordering::SeqCst);
    let err = engine.rebuild_now().await.unwrap_err();
    assert!(matches!(err, SnapragError::Embedding(_)));

    embedder.offline.store(false, Ordering::SeqCst);
    let status = engine.status().unwrap();
    assert_eq!(status.snapshot.as_ref().unwrap().snapshot_id, first.snapshot_id);
    assert!(status.is_stale());

    let hits = engine.query_text("refund", 8).await.unwrap();
    assert!(hits.iter().all(|h| h.chunk.source_title != "Accounts"));

    let second = engine.rebuild_now().await.unwrap();
    assert_ne!(second.snapshot_id, first.snapshot_id);
    let hits = engine.query_text("forgot my password", 1).await.unwrap();
    assert_eq!(hits[0].chunk.source_title, "Accounts");

    assert_eq!(engine.garbage_collect().await.unwrap(), 1);
}

#[tokio::test]
async fn unrelated_question_falls_back_to_low_confidence() {
    let data = TempDir::new().unwrap();
    let (engine, _) = open(&data);
    seed(&engine);
    engine.rebuild_now().await.unwrap();

    // No topic stem at all: the query vector is uniform, which is close to
    // no document.
    let ctx = engine.retrieve_context("what are your opening hours").await;
    assert!(ctx.top_score < 0.6);
    assert!(ctx.low_confidence);
    assert!(ctx.content.split("\n\n").count() <= 3);

    let messages = engine.prompt_messages("what are your opening hours").await;
    assert_eq!(messages[0], "You are a helpful assistant.");
    assert!(messages.last().unwrap().contains("seem uncertain"));
}

#[tokio::test]
async fn deactivated_entry_disappears_after_rebuild() {
    let data = TempDir::new().unwrap();
    let (engine, _) = open(&data);
    seed(&engine);
    let refund_id = engine.entries()[0].id;

    engine.set_status(refund_id, EntryStatus::Inactive).unwrap();
    engine.rebuild_now().await.unwrap();
    let hits = engine.query_text("refund", 8).await.unwrap();
    assert!(hits.iter().all(|h| h.chunk.entry_id != refund_id));

    engine.set_status(refund_id, EntryStatus::Active).unwrap();
    engine.rebuild_now().await.unwrap();
    let hits = engine.query_text("refund", 8).await.unwrap();
    assert_eq!(hits[0].chunk.entry_id, refund_id);
}

#[tokio::test]
async fn chunk_checksums_survive_unrelated_changes() {
    let data = TempDir::new().unwrap();
    let (engine, _) = open(&data);
    seed(&engine);
    engine.rebuild_now().await.unwrap();

    let refund_checksums = |hits: Vec<snaprag::ScoredChunk>| -> Vec<String> {
        let mut sums: Vec<String> = hits
            .into_iter()
            .filter(|h| h.chunk.source_title == "Refund Policy")
            .map(|h| h.chunk.checksum)
            .collect();
        sums.sort();
        sums
    };
    let before = refund_checksums(engine.query_text("refund", 50).await.unwrap());

    engine
        .add_content("Gift Cards", "Gift cards never expire.", EntryOptions::default())
        .unwrap();
    engine.rebuild_now().await.unwrap();
    let after = refund_checksums(engine.query_text("refund", 50).await.unwrap());

    assert!(!before.is_empty());
    assert_eq!(before, after);
}
