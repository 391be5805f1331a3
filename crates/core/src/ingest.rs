use crate::chunking::{chunk_document, ChunkingConfig};
use crate::embeddings::embed_all;
use crate::error::{BuildError, IndexError};
use crate::extractor::SourceExtractor;
use crate::index::VectorIndex;
use crate::models::SourceDocument;
use crate::traits::Embedder;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub source_path: String,
    pub checksum: String,
    pub model_id: String,
    pub chunk_count: usize,
    pub dimensions: usize,
    pub elapsed: Duration,
    /// The published index already matched the source, so nothing was built.
    pub skipped: bool,
}

impl BuildReport {
    pub(crate) fn for_index(index: &VectorIndex, elapsed: Duration, skipped: bool) -> Self {
        let manifest = index.manifest();
        Self {
            source_path: manifest.document.source_path.clone(),
            checksum: manifest.document.checksum.clone(),
            model_id: manifest.model_id.clone(),
            chunk_count: manifest.chunk_count,
            dimensions: manifest.dimensions,
            elapsed,
            skipped,
        }
    }
}

/// Read, extract, chunk and embed one source document into an index.
pub struct BuildPipeline<E: ?Sized> {
    extractor: SourceExtractor,
    chunking: ChunkingConfig,
    embedder: Arc<E>,
    batch_size: usize,
    concurrency: usize,
}

impl<E> BuildPipeline<E>
where
    E: Embedder + ?Sized,
{
    pub fn new(
        extractor: SourceExtractor,
        chunking: ChunkingConfig,
        embedder: Arc<E>,
        batch_size: usize,
        concurrency: usize,
    ) -> Self {
        Self {
            extractor,
            chunking,
            embedder,
            batch_size,
            concurrency,
        }
    }

    pub async fn build(&self, path: &Path) -> Result<(VectorIndex, BuildReport), BuildError> {
        let started = Instant::now();
        let source = tokio::fs::read(path).await?;
        self.build_source(SourceDocument::from_bytes(path, source), started)
            .await
    }

    pub async fn build_document(
        &self,
        source: SourceDocument,
    ) -> Result<(VectorIndex, BuildReport), BuildError> {
        self.build_source(source, Instant::now()).await
    }

    async fn build_source(
        &self,
        source: SourceDocument,
        started: Instant,
    ) -> Result<(VectorIndex, BuildReport), BuildError> {
        info!(
            path = %source.path.display(),
            bytes = source.bytes.len(),
            checksum = %source.checksum,
            "building index"
        );

        let extracted = self.extractor.extract(&source)?;
        debug!(
            chars = extracted.text.len(),
            headings = extracted.headings.len(),
            "extracted text"
        );

        let chunks = chunk_document(&extracted.text, &extracted.headings, &self.chunking)?;
        debug!(chunks = chunks.len(), "chunked text");

        let texts = chunks
            .iter()
            .map(|chunk| chunk.text.clone())
            .collect::<Vec<_>>();
        let embeddings = embed_all(
            &*self.embedder,
            &texts,
            self.batch_size,
            self.concurrency,
        )
        .await?;

        let expected = self.embedder.dimensions();
        if let Some(embedding) = embeddings.iter().find(|vector| vector.len() != expected) {
            return Err(IndexError::DimensionMismatch {
                expected,
                actual: embedding.len(),
            }
            .into());
        }

        let index = VectorIndex::build(
            self.embedder.model_id(),
            extracted.version,
            self.chunking,
            chunks,
            embeddings,
        )?;
        let report = BuildReport::for_index(&index, started.elapsed(), false);

        info!(
            chunks = report.chunk_count,
            dimensions = report.dimensions,
            model = %report.model_id,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "index built"
        );
        Ok((index, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashingEmbedder;
    use crate::error::ExtractionError;
    use crate::headings::{HeadingDetector, HeadingRules};
    use crate::testing::{FlakyEmbedder, STATUTE};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn pipeline<E: Embedder + ?Sized>(embedder: Arc<E>) -> BuildPipeline<E> {
        let extractor =
            SourceExtractor::new(HeadingDetector::new(&HeadingRules::default()).unwrap()).unwrap();
        BuildPipeline::new(extractor, ChunkingConfig::default(), embedder, 4, 2)
    }

    #[tokio::test]
    async fn builds_index_from_file() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = NamedTempFile::new()?;
        file.write_all(STATUTE.as_bytes())?;

        let embedder = Arc::new(HashingEmbedder::new(64));
        let (index, report) = pipeline(embedder).build(file.path()).await?;

        assert!(!report.skipped);
        assert_eq!(report.chunk_count, index.len());
        assert_eq!(report.model_id, "hashing-ngram-v1:64");
        assert_eq!(report.checksum, crate::models::digest_bytes(STATUTE.as_bytes()));
        assert_eq!(index.dimensions(), 64);
        assert!(index
            .chunks()
            .iter()
            .any(|chunk| chunk.section_label.as_deref()
                == Some("Section 19. Interest on delayed payment not deductible")));
        Ok(())
    }

    #[tokio::test]
    async fn same_bytes_build_same_chunks() {
        let embedder = Arc::new(HashingEmbedder::new(32));
        let pipeline = pipeline(embedder);
        let source = || SourceDocument::from_bytes("act.txt", STATUTE.as_bytes().to_vec());

        let (first, _) = pipeline.build_document(source()).await.unwrap();
        let (second, _) = pipeline.build_document(source()).await.unwrap();

        assert_eq!(first.chunks(), second.chunks());
        let query = HashingEmbedder::new(32).vectorize("payment");
        assert_eq!(first.search(&query, 5).unwrap(), second.search(&query, 5).unwrap());
    }

    #[tokio::test]
    async fn blank_source_is_an_extraction_error() {
        let embedder = Arc::new(HashingEmbedder::new(32));
        let result = pipeline(embedder)
            .build_document(SourceDocument::from_bytes("blank.txt", b" \n\n ".to_vec()))
            .await;

        assert!(matches!(
            result,
            Err(BuildError::Extraction(ExtractionError::Empty(_)))
        ));
    }

    #[tokio::test]
    async fn embedder_failure_fails_the_build() {
        let embedder = Arc::new(FlakyEmbedder::malformed());
        let result = pipeline(embedder)
            .build_document(SourceDocument::from_bytes("act.txt", STATUTE.as_bytes().to_vec()))
            .await;

        assert!(matches!(result, Err(BuildError::Embedding(_))));
    }

    #[tokio::test]
    async fn vectors_of_the_wrong_width_are_rejected() {
        struct Lying;

        #[async_trait::async_trait]
        impl Embedder for Lying {
            fn model_id(&self) -> &str {
                "lying"
            }

            fn dimensions(&self) -> usize {
                8
            }

            async fn embed_batch(
                &self,
                inputs: &[String],
            ) -> Result<Vec<Vec<f32>>, crate::error::EmbeddingServiceError> {
                Ok(inputs.iter().map(|_| vec![1.0; 3]).collect())
            }
        }

        let result = pipeline(Arc::new(Lying))
            .build_document(SourceDocument::from_bytes("act.txt", STATUTE.as_bytes().to_vec()))
            .await;

        assert!(matches!(
            result,
            Err(BuildError::Index(IndexError::DimensionMismatch {
                expected: 8,
                actual: 3
            }))
        ));
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let embedder = Arc::new(HashingEmbedder::new(32));
        let result = pipeline(embedder)
            .build(Path::new("/nonexistent/statute.pdf"))
            .await;
        assert!(matches!(result, Err(BuildError::Io(_))));
    }
}
