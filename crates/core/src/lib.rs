pub mod chunking;
pub mod citation;
pub mod config;
pub mod embeddings;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod handle;
pub mod headings;
pub mod index;
pub mod ingest;
pub mod models;
pub mod retriever;
pub mod store;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use chunking::{chunk_document, ChunkingConfig};
pub use citation::{render, CitationResolver, ContextBlock};
pub use config::{EmbeddingConfig, EmbeddingProvider, EngineConfig, RetrievalConfig};
pub use embeddings::{
    build_embedder, embed_all, HashingEmbedder, HttpEmbedder, RetryPolicy, RetryingEmbedder,
    DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use engine::{IndexStatus, RetrievalEngine, SectionSummary};
pub use error::{
    BuildError, ChunkingError, ConfigError, EmbeddingServiceError, ExtractionError,
    IndexCorruptError, IndexError, QueryError,
};
pub use extractor::{
    ExtractedDocument, LopdfExtractor, PlainTextExtractor, SourceExtractor, TextExtractor,
};
pub use handle::{BuildGuard, IndexHandle, IndexState};
pub use headings::{detect_headings, HeadingDetector, HeadingRules};
pub use index::{IndexManifest, SearchCandidate, VectorIndex};
pub use ingest::{BuildPipeline, BuildReport};
pub use models::{
    Chunk, ContextPassage, DocumentVersion, HeadingMarker, RetrievalHit, RetrievalQuery,
    RetrievalResult, SourceDocument,
};
pub use retriever::Retriever;
pub use store::IndexStore;
pub use traits::Embedder;
