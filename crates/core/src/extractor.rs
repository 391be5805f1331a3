use crate::error::ExtractionError;
use crate::headings::HeadingDetector;
use crate::models::{DocumentVersion, HeadingMarker, SourceDocument};
use chrono::Utc;
use lopdf::Document;
use regex::Regex;

/// Extracted statute text with heading spans at their offsets in `text`.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub text: String,
    pub headings: Vec<HeadingMarker>,
    pub version: DocumentVersion,
}

pub trait TextExtractor {
    fn extract_text(&self, bytes: &[u8]) -> Result<String, ExtractionError>;
}

#[derive(Default)]
pub struct LopdfExtractor;

impl TextExtractor for LopdfExtractor {
    fn extract_text(&self, bytes: &[u8]) -> Result<String, ExtractionError> {
        let document =
            Document::load_mem(bytes).map_err(|error| ExtractionError::Pdf(error.to_string()))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| ExtractionError::Pdf(error.to_string()))?;

            if !text.trim().is_empty() {
                pages.push(text);
            }
        }

        Ok(pages.join("\n\n"))
    }
}

#[derive(Default)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract_text(&self, bytes: &[u8]) -> Result<String, ExtractionError> {
        if bytes.starts_with(&[0xFF, 0xFE]) || bytes.starts_with(&[0xFE, 0xFF]) {
            return Err(ExtractionError::UnsupportedEncoding(
                "utf-16/utf-32 byte order mark".to_string(),
            ));
        }

        let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|error| ExtractionError::UnsupportedEncoding(error.to_string()))
    }
}

/// Picks the extractor by sniffing the bytes, then normalises the text and
/// marks headings.
pub struct SourceExtractor {
    headings: HeadingDetector,
    inline_space: Regex,
    blank_runs: Regex,
}

impl SourceExtractor {
    pub fn new(headings: HeadingDetector) -> Result<Self, ExtractionError> {
        Ok(Self {
            headings,
            inline_space: Regex::new(r"[ \t\u{a0}]+")
                .map_err(ExtractionError::NormalizePattern)?,
            blank_runs: Regex::new(r"\n{3,}").map_err(ExtractionError::NormalizePattern)?,
        })
    }

    pub fn extract(&self, source: &SourceDocument) -> Result<ExtractedDocument, ExtractionError> {
        let raw = if source.bytes.starts_with(b"%PDF-") {
            LopdfExtractor.extract_text(&source.bytes)?
        } else {
            PlainTextExtractor.extract_text(&source.bytes)?
        };

        let text = self.normalize(&raw);
        if text.is_empty() {
            return Err(ExtractionError::Empty(source.path.display().to_string()));
        }

        let headings = self.headings.detect(&text);
        Ok(ExtractedDocument {
            text,
            headings,
            version: DocumentVersion {
                source_path: source.path.to_string_lossy().to_string(),
                checksum: source.checksum.clone(),
                extracted_at: Utc::now(),
            },
        })
    }

    fn normalize(&self, raw: &str) -> String {
        let unified = raw.replace("\r\n", "\n").replace('\r', "\n");
        let lines = unified
            .lines()
            .map(|line| self.inline_space.replace_all(line, " ").trim().to_string())
            .collect::<Vec<_>>()
            .join("\n");

        self.blank_runs
            .replace_all(&lines, "\n\n")
            .trim()
            .to_string()
    }
}
