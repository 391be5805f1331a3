use crate::config::RetrievalConfig;
use crate::error::QueryError;
use crate::handle::IndexHandle;
use crate::models::{RetrievalHit, RetrievalQuery, RetrievalResult};
use crate::traits::Embedder;
use std::sync::Arc;
use tracing::{debug, warn};

/// Best-effort semantic lookup against whatever complete index the handle
/// holds. Only contract violations in the query are errors.
pub struct Retriever<E: ?Sized> {
    handle: Arc<IndexHandle>,
    embedder: Arc<E>,
    config: RetrievalConfig,
}

impl<E> Retriever<E>
where
    E: Embedder + ?Sized,
{
    pub fn new(handle: Arc<IndexHandle>, embedder: Arc<E>, config: RetrievalConfig) -> Self {
        Self {
            handle,
            embedder,
            config,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub fn validate(&self, query: &RetrievalQuery) -> Result<(), QueryError> {
        if query.k == 0 {
            return Err(QueryError::ZeroK);
        }
        if query.k > self.config.max_k {
            return Err(QueryError::KTooLarge {
                k: query.k,
                max: self.config.max_k,
            });
        }
        if !query.min_score.is_finite() || !(-1.0..=1.0).contains(&query.min_score) {
            return Err(QueryError::InvalidMinScore(query.min_score));
        }
        Ok(())
    }

    pub async fn retrieve(&self, query: &RetrievalQuery) -> Result<RetrievalResult, QueryError> {
        self.validate(query)?;

        let text = query.text.trim();
        if text.is_empty() {
            return Ok(RetrievalResult::empty(&query.text));
        }

        let Some(index) = self.handle.snapshot() else {
            debug!(state = ?self.handle.state(), "no complete index to query");
            return Ok(RetrievalResult::empty(&query.text));
        };

        if index.model_id() != self.embedder.model_id() {
            warn!(
                index_model = %index.model_id(),
                query_model = %self.embedder.model_id(),
                "query embedder does not match the index model"
            );
            return Ok(RetrievalResult::empty(&query.text));
        }

        let vector = match self.embedder.embed(text).await {
            Ok(vector) => vector,
            Err(error) => {
                warn!(%error, "query embedding failed, returning no context");
                return Ok(RetrievalResult::empty(&query.text));
            }
        };

        let candidates = match index.search(&vector, query.k) {
            Ok(candidates) => candidates,
            Err(error) => {
                warn!(%error, "index search failed, returning no context");
                return Ok(RetrievalResult::empty(&query.text));
            }
        };

        let hits = candidates
            .into_iter()
            .filter(|candidate| candidate.score >= query.min_score)
            .filter_map(|candidate| {
                let chunk = index.chunk(candidate.position)?.clone();
                Some(RetrievalHit {
                    section_label: chunk.section_label.clone(),
                    score: candidate.score,
                    chunk,
                })
            })
            .collect::<Vec<_>>();

        debug!(k = query.k, hits = hits.len(), "retrieved passages");
        Ok(RetrievalResult {
            query: query.text.clone(),
            index_checksum: Some(index.manifest().document.checksum.clone()),
            hits,
        })
    }
}
