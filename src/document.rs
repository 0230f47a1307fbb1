use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Metadata key holding the path a document was read from.
pub const SOURCE_KEY: &str = "source";
/// Metadata key holding the extension a document was matched by.
pub const EXTENSION_KEY: &str = "extension";
/// Metadata key holding a chunk's position inside its document.
pub const CHUNK_INDEX_KEY: &str = "chunk_index";

/// Anything carrying a text body that can be checked for emptiness.
pub trait HasContent {
    fn content(&self) -> &str;
}

/// A file read from the source tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub content: String,
    pub metadata: HashMap<String, String>,
}

impl Document {
    pub fn new(content: String, metadata: HashMap<String, String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            content,
            metadata,
        }
    }

    /// Path the document was loaded from, if recorded.
    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).map(String::as_str)
    }
}

impl HasContent for Document {
    fn content(&self) -> &str {
        &self.content
    }
}

/// A contiguous span of a document treated as one retrieval unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub metadata: HashMap<String, String>,
    pub source_document_id: Uuid,
}

impl Chunk {
    /// Create the `index`-th chunk of `document`, inheriting its metadata.
    pub fn from_document(document: &Document, content: String, index: usize) -> Self {
        let mut metadata = document.metadata.clone();
        metadata.insert(CHUNK_INDEX_KEY.to_string(), index.to_string());
        Self {
            content,
            metadata,
            source_document_id: document.id,
        }
    }

    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).map(String::as_str)
    }
}

impl HasContent for Chunk {
    fn content(&self) -> &str {
        &self.content
    }
}

/// A chunk paired with its similarity to a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Drop every item whose content is empty after trimming whitespace.
pub fn filter_nonempty<T: HasContent>(items: Vec<T>) -> Vec<T> {
    items
        .into_iter()
        .filter(|item| !item.content().trim().is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(content: &str) -> Document {
        let mut metadata = HashMap::new();
        metadata.insert(SOURCE_KEY.to_string(), "src/lib.py".to_string());
        Document::new(content.to_string(), metadata)
    }

    #[test]
    fn test_filter_drops_blank_documents() {
        let docs = vec![doc("def main(): pass"), doc(""), doc("  \n\t "), doc("# Title")];

        let kept = filter_nonempty(docs);

        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|d| !d.content.trim().is_empty()));
        assert_eq!(kept[0].content, "def main(): pass");
        assert_eq!(kept[1].content, "# Title");
    }

    #[test]
    fn test_filter_applies_to_chunks() {
        let parent = doc("a. b.");
        let chunks = vec![
            Chunk::from_document(&parent, "a.".to_string(), 0),
            Chunk::from_document(&parent, " ".to_string(), 1),
        ];

        let kept = filter_nonempty(chunks);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].content, "a.");
    }

    #[test]
    fn test_filter_on_all_blank_input_is_empty() {
        assert!(filter_nonempty(vec![doc(""), doc("\n")]).is_empty());
    }

    #[test]
    fn test_chunk_inherits_document_metadata() {
        let parent = doc("text");
        let chunk = Chunk::from_document(&parent, "text".to_string(), 3);

        assert_eq!(chunk.source(), Some("src/lib.py"));
        assert_eq!(chunk.metadata[CHUNK_INDEX_KEY], "3");
        assert_eq!(chunk.source_document_id, parent.id);
    }
}
