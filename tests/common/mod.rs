#![allow(dead_code)]

use async_trait::async_trait;
use repo_rag::{ExternalError, Embedder, LanguageModel, FALLBACK_ANSWER};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Words the test embedder knows about; every other word is ignored.
pub const VOCABULARY: &[&str] = &[
    "payment", "gateway", "capture", "refund", "logging", "logger", "order", "checkout",
    "database", "migration", "schema", "invoice", "shipping", "cart", "stripe", "webhook",
];

/// Counts vocabulary words. Deterministic and offline.
#[derive(Default)]
pub struct VocabEmbedder {
    calls: AtomicUsize,
}

impl VocabEmbedder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for VocabEmbedder {
    fn model_name(&self) -> &str {
        "vocab-test"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ExternalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut vector = vec![0.0; VOCABULARY.len()];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .map(|w| w.to_lowercase())
        {
            if let Some(i) = VOCABULARY.iter().position(|v| *v == word) {
                vector[i] += 1.0;
            }
        }
        Ok(vector)
    }
}

/// Answers with the rendered context, or the fallback phrase when it is empty.
#[derive(Default)]
pub struct ContextEchoModel {
    calls: AtomicUsize,
}

impl ContextEchoModel {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for ContextEchoModel {
    async fn generate(&self, prompt: &str) -> Result<String, ExternalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let context = prompt
            .split_once("Context: ")
            .and_then(|(_, rest)| rest.split_once("\nQuestion: "))
            .map(|(context, _)| context.trim())
            .unwrap_or_default();

        if context.is_empty() {
            Ok(FALLBACK_ANSWER.to_string())
        } else {
            Ok(context.to_string())
        }
    }
}
