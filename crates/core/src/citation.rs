use crate::models::{ContextPassage, RetrievalResult};
use serde::Serialize;

const BLOCK_SEPARATOR: &str = "\n\n---\n\n";

/// A retrieved passage with the citation the chat layer shows for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextBlock {
    pub chunk_id: String,
    pub text: String,
    /// Heading the passage falls under, if any.
    pub section_label: Option<String>,
    /// The label, or the fallback when there is none.
    pub citation: String,
    pub score: f32,
}

impl From<ContextBlock> for ContextPassage {
    fn from(block: ContextBlock) -> Self {
        Self {
            text: block.text,
            section_label: block.citation,
            score: block.score,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CitationResolver {
    fallback_label: String,
}

impl CitationResolver {
    pub fn new(fallback_label: impl Into<String>) -> Self {
        Self {
            fallback_label: fallback_label.into(),
        }
    }

    pub fn fallback_label(&self) -> &str {
        &self.fallback_label
    }

    /// One block per hit, in result order.
    pub fn resolve(&self, result: &RetrievalResult) -> Vec<ContextBlock> {
        result
            .hits
            .iter()
            .map(|hit| ContextBlock {
                chunk_id: hit.chunk.chunk_id.clone(),
                text: hit.chunk.text.clone(),
                section_label: hit.section_label.clone(),
                citation: hit
                    .section_label
                    .as_deref()
                    .map(str::trim)
                    .filter(|label| !label.is_empty())
                    .unwrap_or(self.fallback_label.as_str())
                    .to_string(),
                score: hit.score,
            })
            .collect()
    }
}

/// Prompt-ready text: `[Source: <citation>]` above each passage.
pub fn render(blocks: &[ContextBlock]) -> String {
    blocks
        .iter()
        .map(|block| format!("[Source: {}]\n{}", block.citation, block.text))
        .collect::<Vec<_>>()
        .join(BLOCK_SEPARATOR)
}
