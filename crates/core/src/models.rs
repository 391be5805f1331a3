use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

/// The statute as read from disk. Replaced wholesale on update.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
    pub checksum: String,
}

impl SourceDocument {
    pub fn from_bytes(path: impl Into<PathBuf>, bytes: Vec<u8>) -> Self {
        let checksum = digest_bytes(&bytes);
        Self {
            path: path.into(),
            bytes,
            checksum,
        }
    }
}

pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Identifies the document version an index was built from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentVersion {
    pub source_path: String,
    pub checksum: String,
    pub extracted_at: DateTime<Utc>,
}

/// Byte span of a heading within the extracted text, plus its citation label.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HeadingMarker {
    pub start: usize,
    pub end: usize,
    pub label: String,
}

/// A contiguous passage of the extracted text; the unit of retrieval.
///
/// `start..end` are byte offsets into the extracted text and `text` is
/// exactly that slice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub chunk_id: String,
    pub position: usize,
    pub start: usize,
    pub end: usize,
    pub text: String,
    pub section_label: Option<String>,
}

impl Chunk {
    pub fn id_for_position(position: usize) -> String {
        format!("chunk-{position:05}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalQuery {
    pub text: String,
    pub k: usize,
    pub min_score: f32,
}

impl RetrievalQuery {
    pub fn new(text: impl Into<String>, k: usize, min_score: f32) -> Self {
        Self {
            text: text.into(),
            k,
            min_score,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievalHit {
    pub chunk: Chunk,
    pub score: f32,
    pub section_label: Option<String>,
}

/// Hits ordered by descending score, ties broken by document order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetrievalResult {
    pub query: String,
    pub index_checksum: Option<String>,
    pub hits: Vec<RetrievalHit>,
}

impl RetrievalResult {
    pub fn empty(query: &str) -> Self {
        Self {
            query: query.to_string(),
            index_checksum: None,
            hits: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// The shape handed to the chat orchestrator by `get_relevant_context`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextPassage {
    pub text: String,
    pub section_label: String,
    pub score: f32,
}
