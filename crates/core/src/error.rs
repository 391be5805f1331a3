use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    Pdf(String),

    #[error("unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("document has no extractable text: {0}")]
    Empty(String),

    #[error("invalid heading pattern: {0}")]
    HeadingPattern(#[from] regex::Error),

    #[error("text normalisation pattern failed to build: {0}")]
    NormalizePattern(regex::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkingError {
    #[error("chunk length must be greater than zero")]
    ZeroLength,

    #[error("overlap {overlap} must be smaller than chunk length {length}")]
    OverlapTooLarge { overlap: usize, length: usize },

    #[error("boundary tolerance {tolerance} must be smaller than length minus overlap ({window})")]
    ToleranceTooLarge { tolerance: usize, window: usize },
}

#[derive(Debug, Error)]
pub enum EmbeddingServiceError {
    #[error("embedding call timed out after {0:?}")]
    Timeout(Duration),

    #[error("http error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("embedding endpoint returned {status}: {body}")]
    Response { status: u16, body: String },

    #[error("malformed embedding response: {0}")]
    Malformed(String),

    #[error("embedder misconfigured: {0}")]
    Config(String),

    #[error("embedding failed after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<EmbeddingServiceError>,
    },
}

impl EmbeddingServiceError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Transport(error) => {
                error.is_timeout() || error.is_connect() || error.is_request() || error.is_body()
            }
            Self::Response { status, .. } => *status == 429 || *status >= 500,
            Self::Malformed(_) | Self::Config(_) | Self::Exhausted { .. } => false,
        }
    }
}

#[derive(Debug, Error)]
#[error("index at {} failed integrity check: {reason}", .path.display())]
pub struct IndexCorruptError {
    pub path: PathBuf,
    pub reason: String,
}

impl IndexCorruptError {
    pub fn new(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata serialize error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("vector encode error: {0}")]
    Vectors(#[from] bincode::Error),

    #[error(transparent)]
    Corrupt(#[from] IndexCorruptError),

    #[error("vector dimension {actual} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid index input: {0}")]
    Invalid(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum QueryError {
    #[error("k must be at least 1")]
    ZeroK,

    #[error("k={k} exceeds the configured maximum of {max}")]
    KTooLarge { k: usize, max: usize },

    #[error("min_score must be a finite value in [-1, 1], got {0}")]
    InvalidMinScore(f32),
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Chunking(#[from] ChunkingError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingServiceError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("an index build is already running")]
    AlreadyBuilding,

    #[error("background build task failed: {0}")]
    Task(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error reading config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Chunking(#[from] ChunkingError),

    #[error(transparent)]
    Headings(#[from] ExtractionError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingServiceError),

    #[error("invalid retrieval config: {0}")]
    Retrieval(String),
}

pub type Result<T, E = BuildError> = std::result::Result<T, E>;
