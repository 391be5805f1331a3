//! Exact cosine-similarity index over chunk embeddings.
//!
//! An index is immutable once built. On disk it is two files in one
//! directory: `vectors.bin` (bincode-encoded vector block) and
//! `metadata.json` (manifest, vector checksum and typed chunk records).

use crate::chunking::ChunkingConfig;
use crate::error::{IndexCorruptError, IndexError};
use crate::models::{digest_bytes, Chunk, DocumentVersion};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::Path;

pub const INDEX_FORMAT_VERSION: u32 = 1;
pub const VECTORS_FILE: &str = "vectors.bin";
pub const METADATA_FILE: &str = "metadata.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexManifest {
    pub model_id: String,
    pub dimensions: usize,
    pub document: DocumentVersion,
    pub chunking: ChunkingConfig,
    pub chunk_count: usize,
    pub built_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct VectorBlockRef<'a> {
    dimensions: u32,
    count: u64,
    values: &'a [f32],
}

#[derive(Deserialize)]
struct VectorBlock {
    dimensions: u32,
    count: u64,
    values: Vec<f32>,
}

#[derive(Serialize)]
struct MetadataRef<'a> {
    format_version: u32,
    manifest: &'a IndexManifest,
    vectors_sha256: &'a str,
    chunks: &'a [Chunk],
}

#[derive(Deserialize)]
struct Metadata {
    format_version: u32,
    manifest: IndexManifest,
    vectors_sha256: String,
    chunks: Vec<Chunk>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchCandidate {
    pub position: usize,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct VectorIndex {
    manifest: IndexManifest,
    chunks: Vec<Chunk>,
    vectors: Vec<f32>,
    norms: Vec<f32>,
}

impl VectorIndex {
    /// Builds a fresh index; `embeddings[i]` belongs to `chunks[i]`.
    pub fn build(
        model_id: impl Into<String>,
        document: DocumentVersion,
        chunking: ChunkingConfig,
        chunks: Vec<Chunk>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<Self, IndexError> {
        if chunks.is_empty() {
            return Err(IndexError::Invalid(
                "cannot build an index without chunks".to_string(),
            ));
        }
        if chunks.len() != embeddings.len() {
            return Err(IndexError::Invalid(format!(
                "embedding count {} doesn't match chunk count {}",
                embeddings.len(),
                chunks.len()
            )));
        }
        if let Some((position, _)) = chunks
            .iter()
            .enumerate()
            .find(|(position, chunk)| chunk.position != *position)
        {
            return Err(IndexError::Invalid(format!(
                "chunk at slot {position} is out of document order"
            )));
        }

        let dimensions = embeddings[0].len();
        if dimensions == 0 {
            return Err(IndexError::Invalid("embeddings are empty".to_string()));
        }

        let mut vectors = Vec::with_capacity(dimensions * embeddings.len());
        for embedding in &embeddings {
            if embedding.len() != dimensions {
                return Err(IndexError::DimensionMismatch {
                    expected: dimensions,
                    actual: embedding.len(),
                });
            }
            if embedding.iter().any(|value| !value.is_finite()) {
                return Err(IndexError::Invalid(
                    "embedding contains non-finite values".to_string(),
                ));
            }
            vectors.extend_from_slice(embedding);
        }

        let manifest = IndexManifest {
            model_id: model_id.into(),
            dimensions,
            document,
            chunking,
            chunk_count: chunks.len(),
            built_at: Utc::now(),
        };

        Ok(Self::from_parts(manifest, chunks, vectors))
    }

    fn from_parts(manifest: IndexManifest, chunks: Vec<Chunk>, vectors: Vec<f32>) -> Self {
        let norms = vectors
            .chunks_exact(manifest.dimensions)
            .map(norm)
            .collect();
        Self {
            manifest,
            chunks,
            vectors,
            norms,
        }
    }

    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    pub fn model_id(&self) -> &str {
        &self.manifest.model_id
    }

    pub fn dimensions(&self) -> usize {
        self.manifest.dimensions
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn chunk(&self, position: usize) -> Option<&Chunk> {
        self.chunks.get(position)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Up to `k` entries by descending cosine similarity; ties go to the
    /// earlier chunk.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchCandidate>, IndexError> {
        if query.len() != self.manifest.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.manifest.dimensions,
                actual: query.len(),
            });
        }
        if query.iter().any(|value| !value.is_finite()) {
            return Err(IndexError::Invalid(
                "query vector contains non-finite values".to_string(),
            ));
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_norm = norm(query);
        let mut scored = self
            .vectors
            .chunks_exact(self.manifest.dimensions)
            .zip(&self.norms)
            .enumerate()
            .map(|(position, (vector, vector_norm))| SearchCandidate {
                position,
                score: cosine(query, query_norm, vector, *vector_norm),
            })
            .collect::<Vec<_>>();

        scored.sort_by(|left, right| {
            right
                .score
                .total_cmp(&left.score)
                .then(left.position.cmp(&right.position))
        });
        scored.truncate(k);
        Ok(scored)
    }

    /// Chunk counts per section label, in document order.
    pub fn section_counts(&self) -> Vec<(Option<String>, usize)> {
        let mut counts: Vec<(Option<String>, usize)> = Vec::new();
        for chunk in &self.chunks {
            match counts
                .iter_mut()
                .find(|(label, _)| *label == chunk.section_label)
            {
                Some((_, count)) => *count += 1,
                None => counts.push((chunk.section_label.clone(), 1)),
            }
        }
        counts
    }

    pub fn persist(&self, dir: &Path) -> Result<(), IndexError> {
        fs::create_dir_all(dir)?;

        let vector_bytes = bincode::serialize(&VectorBlockRef {
            dimensions: self.manifest.dimensions as u32,
            count: self.chunks.len() as u64,
            values: &self.vectors,
        })?;
        write_synced(&dir.join(VECTORS_FILE), &vector_bytes)?;

        let checksum = digest_bytes(&vector_bytes);
        let metadata = serde_json::to_vec_pretty(&MetadataRef {
            format_version: INDEX_FORMAT_VERSION,
            manifest: &self.manifest,
            vectors_sha256: &checksum,
            chunks: &self.chunks,
        })?;
        write_synced(&dir.join(METADATA_FILE), &metadata)?;

        Ok(())
    }

    pub fn load(dir: &Path) -> Result<Self, IndexError> {
        let corrupt = |reason: String| IndexCorruptError::new(dir, reason);

        let metadata_bytes = read_index_file(dir, METADATA_FILE)?;
        let metadata: Metadata = serde_json::from_slice(&metadata_bytes)
            .map_err(|error| corrupt(format!("unreadable metadata: {error}")))?;
        if metadata.format_version != INDEX_FORMAT_VERSION {
            return Err(corrupt(format!(
                "unsupported format version {}",
                metadata.format_version
            ))
            .into());
        }

        let vector_bytes = read_index_file(dir, VECTORS_FILE)?;
        if digest_bytes(&vector_bytes) != metadata.vectors_sha256 {
            return Err(corrupt("vector file checksum mismatch".to_string()).into());
        }
        let block: VectorBlock = bincode::deserialize(&vector_bytes)
            .map_err(|error| corrupt(format!("unreadable vector file: {error}")))?;

        let manifest = metadata.manifest;
        let dimensions = block.dimensions as usize;
        let count = block.count as usize;

        if dimensions == 0 || dimensions != manifest.dimensions {
            return Err(corrupt(format!(
                "vector dimension {dimensions} does not match manifest {}",
                manifest.dimensions
            ))
            .into());
        }
        if count != metadata.chunks.len() || manifest.chunk_count != metadata.chunks.len() {
            return Err(corrupt(format!(
                "{count} vectors, {} chunk records, manifest count {}",
                metadata.chunks.len(),
                manifest.chunk_count
            ))
            .into());
        }
        if block.values.len() != count * dimensions {
            return Err(corrupt(format!(
                "vector block holds {} values, expected {}",
                block.values.len(),
                count * dimensions
            ))
            .into());
        }
        if let Some(chunk) = metadata
            .chunks
            .iter()
            .enumerate()
            .find(|(position, chunk)| {
                chunk.position != *position || chunk.chunk_id != Chunk::id_for_position(*position)
            })
            .map(|(_, chunk)| chunk)
        {
            return Err(corrupt(format!("chunk record {} is out of order", chunk.chunk_id)).into());
        }
        if block.values.iter().any(|value| !value.is_finite()) {
            return Err(corrupt("vector block contains non-finite values".to_string()).into());
        }

        Ok(Self::from_parts(manifest, metadata.chunks, block.values))
    }
}

fn read_index_file(dir: &Path, name: &str) -> Result<Vec<u8>, IndexError> {
    fs::read(dir.join(name)).map_err(|error| {
        if error.kind() == ErrorKind::NotFound {
            IndexError::Corrupt(IndexCorruptError::new(dir, format!("missing {name}")))
        } else {
            IndexError::Io(error)
        }
    })
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn norm(vector: &[f32]) -> f32 {
    vector.iter().map(|value| value * value).sum::<f32>().sqrt()
}

fn cosine(query: &[f32], query_norm: f32, vector: &[f32], vector_norm: f32) -> f32 {
    if query_norm == 0.0 || vector_norm == 0.0 {
        return 0.0;
    }
    let dot = query.iter().zip(vector).map(|(a, b)| a * b).sum::<f32>();
    (dot / (query_norm * vector_norm)).clamp(-1.0, 1.0)
}
