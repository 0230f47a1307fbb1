//! Semantic chunking.
//!
//! Documents are split into sentences, each sentence is embedded together with
//! its neighbours, and a chunk boundary is placed wherever the cosine distance
//! between consecutive sentence windows exceeds a threshold derived from the
//! distribution of all distances in the document.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tracing::debug;

use crate::document::{Chunk, Document};
use crate::external::{Embedder, ExternalError};

#[derive(Error, Debug)]
pub enum ChunkingError {
    #[error("Failed to embed sentences of {source_path}: {error}")]
    Embedding {
        source_path: String,
        #[source]
        error: ExternalError,
    },
}

/// How the breakpoint distance is derived from a document's distances.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "amount", rename_all = "snake_case")]
pub enum BreakpointThreshold {
    /// Split above the given percentile (0-100) of distances.
    Percentile(f64),
    /// Split above mean + n standard deviations.
    StandardDeviation(f64),
    /// Split above mean + n interquartile ranges.
    Interquartile(f64),
}

impl Default for BreakpointThreshold {
    fn default() -> Self {
        BreakpointThreshold::Percentile(95.0)
    }
}

impl BreakpointThreshold {
    /// Build from a strategy name (`percentile`, `standard_deviation`,
    /// `interquartile`) and an optional amount, using each strategy's default amount.
    pub fn from_name(name: &str, amount: Option<f64>) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "percentile" => Some(BreakpointThreshold::Percentile(amount.unwrap_or(95.0))),
            "standard_deviation" => {
                Some(BreakpointThreshold::StandardDeviation(amount.unwrap_or(3.0)))
            }
            "interquartile" => Some(BreakpointThreshold::Interquartile(amount.unwrap_or(1.5))),
            _ => None,
        }
    }

    fn threshold(&self, distances: &[f64]) -> f64 {
        match *self {
            BreakpointThreshold::Percentile(p) => percentile(distances, p),
            BreakpointThreshold::StandardDeviation(n) => {
                let (mean, std) = mean_std(distances);
                mean + n * std
            }
            BreakpointThreshold::Interquartile(n) => {
                let (mean, _) = mean_std(distances);
                let iqr = percentile(distances, 75.0) - percentile(distances, 25.0);
                mean + n * iqr
            }
        }
    }
}

/// Splits documents into chunks that inherit the document's metadata.
#[async_trait]
pub trait Chunker: Send + Sync {
    async fn split_documents(&self, documents: &[Document]) -> Result<Vec<Chunk>, ChunkingError>;
}

pub struct SemanticChunker {
    embedder: Arc<dyn Embedder>,
    threshold: BreakpointThreshold,
    /// Number of neighbouring sentences on each side embedded with a sentence.
    buffer_size: usize,
}

impl SemanticChunker {
    pub fn new(embedder: Arc<dyn Embedder>, threshold: BreakpointThreshold) -> Self {
        Self {
            embedder,
            threshold,
            buffer_size: 1,
        }
    }

    /// Split raw text into semantically coherent pieces.
    pub async fn split_text(&self, text: &str) -> Result<Vec<String>, ExternalError> {
        let sentences = split_sentences(text);
        if sentences.len() <= 1 {
            return Ok(sentences);
        }

        let windows = combine_sentences(&sentences, self.buffer_size);
        let vectors = self.embedder.embed_batch(&windows).await?;

        let distances: Vec<f64> = vectors
            .windows(2)
            .map(|pair| 1.0 - cosine_similarity(&pair[0], &pair[1]))
            .collect();

        let threshold = self.threshold.threshold(&distances);
        let breakpoints: Vec<usize> = distances
            .iter()
            .enumerate()
            .filter(|(_, d)| **d > threshold)
            .map(|(i, _)| i)
            .collect();

        let mut pieces = Vec::with_capacity(breakpoints.len() + 1);
        let mut start = 0;
        for index in breakpoints {
            pieces.push(sentences[start..=index].join(" "));
            start = index + 1;
        }
        if start < sentences.len() {
            pieces.push(sentences[start..].join(" "));
        }

        Ok(pieces)
    }
}

#[async_trait]
impl Chunker for SemanticChunker {
    async fn split_documents(&self, documents: &[Document]) -> Result<Vec<Chunk>, ChunkingError> {
        let mut chunks = Vec::new();
        for document in documents {
            let pieces = self.split_text(&document.content).await.map_err(|error| {
                ChunkingError::Embedding {
                    source_path: document.source().unwrap_or("<unknown>").to_string(),
                    error,
                }
            })?;
            debug!(
                "Split {} into {} chunks",
                document.source().unwrap_or("<unknown>"),
                pieces.len()
            );
            chunks.extend(
                pieces
                    .into_iter()
                    .enumerate()
                    .map(|(i, piece)| Chunk::from_document(document, piece, i)),
            );
        }
        Ok(chunks)
    }
}

fn sentence_boundary() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.?!]\s+").expect("sentence regex is valid"))
}

/// Split text after `.`, `?` or `!` followed by whitespace.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for m in sentence_boundary().find_iter(text) {
        // Keep the punctuation mark with its sentence.
        let end = m.start() + 1;
        push_trimmed(&mut sentences, &text[start..end]);
        start = m.end();
    }
    push_trimmed(&mut sentences, &text[start..]);
    sentences
}

fn push_trimmed(out: &mut Vec<String>, s: &str) {
    let s = s.trim();
    if !s.is_empty() {
        out.push(s.to_string());
    }
}

/// Join each sentence with up to `buffer` neighbours on each side.
fn combine_sentences(sentences: &[String], buffer: usize) -> Vec<String> {
    (0..sentences.len())
        .map(|i| {
            let from = i.saturating_sub(buffer);
            let to = (i + buffer + 1).min(sentences.len());
            sentences[from..to].join(" ")
        })
        .collect()
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| *x as f64 * *y as f64).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Linear-interpolated percentile, `p` in 0..=100.
fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Puts every window mentioning "cat" on one axis and everything else on another.
    struct TopicEmbedder;

    #[async_trait]
    impl Embedder for TopicEmbedder {
        fn model_name(&self) -> &str {
            "topic"
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>, ExternalError> {
            let cats = text.matches("cat").count() as f32;
            let others = text.split_whitespace().count() as f32 - cats;
            Ok(vec![cats, others.max(0.0)])
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        fn model_name(&self) -> &str {
            "failing"
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>, ExternalError> {
            Err(ExternalError::EmbeddingFailed("connection refused".to_string()))
        }
    }

    #[test]
    fn test_split_sentences() {
        let sentences = split_sentences("First one. Second?  Third!\nFourth");
        assert_eq!(sentences, vec!["First one.", "Second?", "Third!", "Fourth"]);
    }

    #[test]
    fn test_split_sentences_keeps_dotted_identifiers() {
        let sentences = split_sentences("Call os.path.join here. Done.");
        assert_eq!(sentences, vec!["Call os.path.join here.", "Done."]);
    }

    #[test]
    fn test_combine_sentences_uses_neighbours() {
        let s: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        assert_eq!(combine_sentences(&s, 1), vec!["a b", "a b c", "b c"]);
    }

    #[test]
    fn test_percentile_interpolates() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&values, 0.0), 1.0);
        assert_eq!(percentile(&values, 100.0), 4.0);
        assert!((percentile(&values, 50.0) - 2.5).abs() < 1e-9);
        assert!((percentile(&[0.1, 0.9, 0.5], 95.0) - 0.86).abs() < 1e-9);
    }

    #[test]
    fn test_statistical_thresholds() {
        let values = [1.0, 1.0, 1.0, 5.0];
        let (mean, std) = mean_std(&values);
        assert_eq!(mean, 2.0);
        assert!((std - 3f64.sqrt()).abs() < 1e-9);

        let t = BreakpointThreshold::StandardDeviation(1.0).threshold(&values);
        assert!((t - (2.0 + 3f64.sqrt())).abs() < 1e-9);

        let t = BreakpointThreshold::Interquartile(1.0).threshold(&values);
        // q1 = 1.0, q3 = 2.0
        assert!((t - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_threshold_from_name() {
        assert_eq!(
            BreakpointThreshold::from_name("percentile", None),
            Some(BreakpointThreshold::Percentile(95.0))
        );
        assert_eq!(
            BreakpointThreshold::from_name("Interquartile", Some(2.0)),
            Some(BreakpointThreshold::Interquartile(2.0))
        );
        assert_eq!(BreakpointThreshold::from_name("gradient", None), None);
    }

    #[test]
    fn test_cosine_similarity_handles_zero_vectors() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_single_sentence_is_one_chunk() {
        let chunker =
            SemanticChunker::new(Arc::new(FailingEmbedder), BreakpointThreshold::default());
        // No embedding call is needed for a single sentence.
        let pieces = chunker.split_text("Only one sentence here").await.unwrap();
        assert_eq!(pieces, vec!["Only one sentence here"]);
    }

    #[tokio::test]
    async fn test_splits_on_topic_change() {
        let chunker = SemanticChunker::new(
            Arc::new(TopicEmbedder),
            BreakpointThreshold::Percentile(50.0),
        );
        let text = "The cat sat. The cat ate. A cat slept. Rust compiles fast code. \
                    Borrowing prevents races. Traits define behaviour.";

        let pieces = chunker.split_text(text).await.unwrap();

        assert!(pieces.len() >= 2, "expected a split, got {:?}", pieces);
        assert!(pieces[0].starts_with("The cat sat."));
        assert!(pieces.last().unwrap().ends_with("Traits define behaviour."));
        // Nothing is lost or duplicated.
        assert_eq!(pieces.join(" "), split_sentences(text).join(" "));
    }

    #[tokio::test]
    async fn test_split_documents_carries_metadata() {
        let mut metadata = HashMap::new();
        metadata.insert("source".to_string(), "docs/guide.md".to_string());
        let doc = Document::new("One. Two. Three.".to_string(), metadata);

        let chunker = SemanticChunker::new(Arc::new(TopicEmbedder), BreakpointThreshold::default());
        let chunks = chunker.split_documents(&[doc.clone()]).await.unwrap();

        assert!(!chunks.is_empty());
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.source(), Some("docs/guide.md"));
            assert_eq!(chunk.metadata["chunk_index"], i.to_string());
            assert_eq!(chunk.source_document_id, doc.id);
        }
    }

    #[tokio::test]
    async fn test_embedding_failure_names_document() {
        let mut metadata = HashMap::new();
        metadata.insert("source".to_string(), "broken.md".to_string());
        let doc = Document::new("One. Two.".to_string(), metadata);

        let chunker =
            SemanticChunker::new(Arc::new(FailingEmbedder), BreakpointThreshold::default());
        let err = chunker.split_documents(&[doc]).await.unwrap_err();

        assert!(err.to_string().contains("broken.md"));
    }
}
