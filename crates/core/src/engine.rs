//! Owns the index lifecycle for one statute and answers relevance queries.
//!
//! Callers hold a `RetrievalEngine` (usually behind an `Arc`) instead of a
//! process-wide index. Queries are served from the last complete index while
//! a rebuild runs; a failed rebuild leaves that index in place.

use crate::citation::{render, CitationResolver, ContextBlock};
use crate::config::EngineConfig;
use crate::error::{BuildError, ConfigError, IndexError, QueryError};
use crate::extractor::SourceExtractor;
use crate::handle::{IndexHandle, IndexState};
use crate::headings::HeadingDetector;
use crate::index::{IndexManifest, VectorIndex};
use crate::ingest::{BuildPipeline, BuildReport};
use crate::models::{ContextPassage, RetrievalQuery, SourceDocument};
use crate::retriever::Retriever;
use crate::store::IndexStore;
use crate::traits::Embedder;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct SectionSummary {
    pub label: String,
    pub chunks: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStatus {
    pub state: IndexState,
    pub index_dir: PathBuf,
    pub manifest: Option<IndexManifest>,
    pub sections: Vec<SectionSummary>,
}

pub struct RetrievalEngine<E: ?Sized> {
    config: EngineConfig,
    store: IndexStore,
    handle: Arc<IndexHandle>,
    embedder: Arc<E>,
    pipeline: BuildPipeline<E>,
    retriever: Retriever<E>,
    citations: CitationResolver,
}

impl<E> RetrievalEngine<E>
where
    E: Embedder + ?Sized,
{
    /// Validates `config` and serves the persisted index if it is intact and
    /// was built with `embedder`'s model. Anything else starts empty.
    pub fn open(config: EngineConfig, embedder: Arc<E>) -> Result<Self, ConfigError> {
        config.validate()?;

        let extractor = SourceExtractor::new(HeadingDetector::new(&config.headings)?)?;
        let pipeline = BuildPipeline::new(
            extractor,
            config.chunking,
            Arc::clone(&embedder),
            config.embedding.batch_size,
            config.embedding.concurrency,
        );
        let store = IndexStore::new(&config.index_dir);

        let handle = match load_compatible(&store, &*embedder) {
            Some(index) => Arc::new(IndexHandle::with_index(index)),
            None => Arc::new(IndexHandle::new()),
        };

        let retriever = Retriever::new(
            Arc::clone(&handle),
            Arc::clone(&embedder),
            config.retrieval.clone(),
        );
        let citations = CitationResolver::new(config.retrieval.fallback_label.clone());

        Ok(Self {
            config,
            store,
            handle,
            embedder,
            pipeline,
            retriever,
            citations,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn handle(&self) -> &Arc<IndexHandle> {
        &self.handle
    }

    pub fn state(&self) -> IndexState {
        self.handle.state()
    }

    /// Builds an index from `source`, publishes it and swaps it in.
    ///
    /// Without `force`, a source whose checksum and embedding model match the
    /// served index is left alone and the report comes back `skipped`.
    pub async fn rebuild(&self, source: &Path, force: bool) -> Result<BuildReport, BuildError> {
        let started = Instant::now();
        let document = SourceDocument::from_bytes(source, tokio::fs::read(source).await?);

        if !force {
            if let Some(current) = self.handle.snapshot() {
                if self.is_current(&current, &document) {
                    info!(
                        path = %source.display(),
                        checksum = %document.checksum,
                        "index already matches source, skipping build (use force to rebuild)"
                    );
                    return Ok(BuildReport::for_index(&current, started.elapsed(), true));
                }
            }
        }

        let guard = self.handle.begin_build()?;
        let (index, mut report) = self.pipeline.build_document(document).await?;

        let store = self.store.clone();
        let index = tokio::task::spawn_blocking(move || store.publish(&index).map(|_| index))
            .await
            .map_err(|err| BuildError::Task(err.to_string()))??;
        guard.complete(index);

        report.elapsed = started.elapsed();
        Ok(report)
    }

    /// Compares the file on disk with the served index; a changed checksum
    /// marks the index stale. Returns whether a rebuild is needed.
    pub async fn check_source(&self, source: &Path) -> Result<bool, BuildError> {
        let document = SourceDocument::from_bytes(source, tokio::fs::read(source).await?);
        let Some(current) = self.handle.snapshot() else {
            return Ok(true);
        };

        if self.is_current(&current, &document) {
            return Ok(false);
        }

        warn!(
            path = %source.display(),
            indexed = %current.manifest().document.checksum,
            found = %document.checksum,
            "source changed since the index was built"
        );
        self.handle.mark_stale();
        Ok(true)
    }

    fn is_current(&self, index: &VectorIndex, document: &SourceDocument) -> bool {
        let manifest = index.manifest();
        manifest.document.checksum == document.checksum
            && manifest.model_id == self.embedder.model_id()
            && manifest.chunking == self.config.chunking
    }

    /// Relevant statute passages for `query_text`. Only an invalid `k` or
    /// `min_score` is an error; anything else degrades to an empty list.
    pub async fn get_relevant_context(
        &self,
        query_text: &str,
        k: usize,
        min_score: f32,
    ) -> Result<Vec<ContextPassage>, QueryError> {
        Ok(self
            .context_blocks(query_text, k, min_score)
            .await?
            .into_iter()
            .map(ContextPassage::from)
            .collect())
    }

    pub async fn context_blocks(
        &self,
        query_text: &str,
        k: usize,
        min_score: f32,
    ) -> Result<Vec<ContextBlock>, QueryError> {
        let query = RetrievalQuery::new(query_text, k, min_score);
        let result = self.retriever.retrieve(&query).await?;
        Ok(self.citations.resolve(&result))
    }

    /// Rendered `[Source: ...]` blocks using the configured `k` and threshold.
    pub async fn prompt_context(&self, query_text: &str) -> Result<String, QueryError> {
        let retrieval = &self.config.retrieval;
        let blocks = self
            .context_blocks(query_text, retrieval.default_k, retrieval.min_score)
            .await?;
        Ok(render(&blocks))
    }

    pub fn status(&self) -> IndexStatus {
        let snapshot = self.handle.snapshot();
        let sections = snapshot
            .as_deref()
            .map(|index| {
                index
                    .section_counts()
                    .into_iter()
                    .map(|(label, chunks)| SectionSummary {
                        label: label.unwrap_or_else(|| self.citations.fallback_label().to_string()),
                        chunks,
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        IndexStatus {
            state: self.handle.state(),
            index_dir: self.store.current_dir(),
            manifest: snapshot.map(|index| index.manifest().clone()),
            sections,
        }
    }
}

impl<E> RetrievalEngine<E>
where
    E: Embedder + ?Sized + 'static,
{
    /// Rebuilds on a background task; the current index keeps serving.
    pub fn spawn_rebuild(
        self: &Arc<Self>,
        source: PathBuf,
        force: bool,
    ) -> JoinHandle<Result<BuildReport, BuildError>> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = engine.rebuild(&source, force).await;
            if let Err(error) = &outcome {
                error!(path = %source.display(), %error, "background index build failed");
            }
            outcome
        })
    }
}

fn load_compatible<E>(store: &IndexStore, embedder: &E) -> Option<VectorIndex>
where
    E: Embedder + ?Sized,
{
    let index = match store.load() {
        Ok(Some(index)) => index,
        Ok(None) => {
            info!(path = %store.root().display(), "no index published yet");
            return None;
        }
        Err(IndexError::Corrupt(corrupt)) => {
            error!(error = %corrupt, "persisted index is corrupt, a rebuild is required");
            return None;
        }
        Err(error) => {
            error!(%error, "failed to load persisted index, a rebuild is required");
            return None;
        }
    };

    if index.model_id() != embedder.model_id() || index.dimensions() != embedder.dimensions() {
        warn!(
            index_model = %index.model_id(),
            index_dimensions = index.dimensions(),
            embedder_model = %embedder.model_id(),
            embedder_dimensions = embedder.dimensions(),
            "persisted index was built with a different embedding model, not serving it"
        );
        return None;
    }

    info!(
        chunks = index.len(),
        checksum = %index.manifest().document.checksum,
        "loaded persisted index"
    );
    Some(index)
}
