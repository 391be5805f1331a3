use crate::chunking::ChunkingConfig;
use crate::embeddings::HashingEmbedder;
use crate::error::EmbeddingServiceError;
use crate::index::VectorIndex;
use crate::models::{Chunk, DocumentVersion};
use crate::traits::Embedder;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const STATUTE: &str = "\
THE MICRO AND SMALL ENTERPRISES PAYMENTS ACT

An Act to provide for the facilitation, promotion and development of micro and small enterprises.

CHAPTER I

Section 1. Short title and commencement
This Act may be called the Micro and Small Enterprises Payments Act. It shall come into force on such date as the Central Government may, by notification, appoint.

Section 2. Definitions
In this Act, unless the context otherwise requires, the appointed day means the day following immediately after the expiry of the period of fifteen days from the day of acceptance of any goods or any services by a buyer from a supplier. Buyer means whoever buys any goods or receives any services from a supplier for consideration.

CHAPTER II

Section 7. Classification of enterprises
The Central Government may, by notification, classify any class of enterprises, whether proprietorship, Hindu undivided family, association of persons, co-operative society, partnership firm or company, as a micro enterprise or a small enterprise.

Section 8. Memorandum of micro and small enterprises
Any person who intends to establish a micro or small enterprise may, at his discretion, file the memorandum of the enterprise with such authority as may be specified by the State Government.

CHAPTER V

Section 15. Liability of buyer to make payment
Where any supplier supplies any goods or renders any services to any buyer, the buyer shall make payment therefor on or before the date agreed upon between him and the supplier in writing.

Section 16. Date from which and rate at which interest is payable
Where any buyer fails to make payment of the amount to the supplier, as required under section 15, the buyer shall be liable to pay compound interest with monthly rests to the supplier on that amount from the appointed day at three times of the bank rate notified by the Reserve Bank.

Section 17. Recovery of amount due
For any goods supplied or services rendered by the supplier, the buyer shall be liable to pay the amount with interest thereon as provided under section 16.

Section 18. Reference to Micro and Small Enterprises Facilitation Council
Any party to a dispute may, with regard to any amount due under section 17, make a reference to the Micro and Small Enterprises Facilitation Council. The Council shall either itself conduct arbitration or refer the matter to any institution or centre providing alternate dispute resolution services.

Section 19. Interest on delayed payment not deductible
The amount of interest on delayed payment payable or paid by any buyer under this Act shall not, for the purposes of computation of income, be allowed as deduction.
";

pub fn document_version(checksum: &str) -> DocumentVersion {
    DocumentVersion {
        source_path: "fixtures/statute.txt".to_string(),
        checksum: checksum.to_string(),
        extracted_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    }
}

/// Two-chunk index over 3-dimensional vectors.
pub fn tiny_index(checksum: &str) -> VectorIndex {
    let chunks = ["Section 1. Short title", "Section 2. Definitions"]
        .into_iter()
        .enumerate()
        .map(|(position, text)| Chunk {
            chunk_id: Chunk::id_for_position(position),
            position,
            start: position * 100,
            end: position * 100 + text.len(),
            text: text.to_string(),
            section_label: Some(text.to_string()),
        })
        .collect();

    VectorIndex::build(
        "test-model",
        document_version(checksum),
        ChunkingConfig::default(),
        chunks,
        vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]],
    )
    .unwrap()
}

enum FlakyMode {
    TimeoutFirst(u32),
    Malformed,
}

/// Fails transiently a fixed number of times, then returns 4-dim vectors.
pub struct FlakyEmbedder {
    mode: FlakyMode,
    pub calls: Arc<AtomicU32>,
}

impl FlakyEmbedder {
    pub fn failing_times(failures: u32) -> Self {
        Self {
            mode: FlakyMode::TimeoutFirst(failures),
            calls: Arc::default(),
        }
    }

    pub fn malformed() -> Self {
        Self {
            mode: FlakyMode::Malformed,
            calls: Arc::default(),
        }
    }
}

#[async_trait]
impl Embedder for FlakyEmbedder {
    fn model_id(&self) -> &str {
        "flaky-test:4"
    }

    fn dimensions(&self) -> usize {
        4
    }

    async fn embed_batch(
        &self,
        inputs: &[String],
    ) -> Result<Vec<Vec<f32>>, EmbeddingServiceError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        match self.mode {
            FlakyMode::TimeoutFirst(failures) if call <= failures => {
                Err(EmbeddingServiceError::Timeout(Duration::from_millis(1)))
            }
            FlakyMode::TimeoutFirst(_) => Ok(inputs.iter().map(|_| vec![0.5; 4]).collect()),
            FlakyMode::Malformed => Err(EmbeddingServiceError::Malformed(
                "missing data field".to_string(),
            )),
        }
    }
}

/// Never answers.
#[derive(Default)]
pub struct HangingEmbedder {
    pub calls: Arc<AtomicU32>,
}

#[async_trait]
impl Embedder for HangingEmbedder {
    fn model_id(&self) -> &str {
        "hanging-test:4"
    }

    fn dimensions(&self) -> usize {
        4
    }

    async fn embed_batch(
        &self,
        _inputs: &[String],
    ) -> Result<Vec<Vec<f32>>, EmbeddingServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Vec::new())
    }
}

/// Hashing embedder that counts calls and can be switched to hang, so an
/// index built with it stays compatible with the queries that time out.
pub struct ControlledEmbedder {
    inner: HashingEmbedder,
    hang: AtomicBool,
    pub calls: AtomicU32,
}

impl ControlledEmbedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: HashingEmbedder::default(),
            hang: AtomicBool::new(false),
            calls: AtomicU32::new(0),
        })
    }

    pub fn hang(&self) {
        self.hang.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for ControlledEmbedder {
    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    async fn embed_batch(
        &self,
        inputs: &[String],
    ) -> Result<Vec<Vec<f32>>, EmbeddingServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hang.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        self.inner.embed_batch(inputs).await
    }
}
