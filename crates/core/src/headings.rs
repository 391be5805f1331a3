use crate::error::ExtractionError;
use crate::models::HeadingMarker;
use regex::RegexSet;
use serde::{Deserialize, Serialize};

/// Patterns are tested against each trimmed line; a hit makes the line a heading.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HeadingRules {
    pub patterns: Vec<String>,
    pub max_label_chars: usize,
}

impl Default for HeadingRules {
    fn default() -> Self {
        Self {
            patterns: vec![
                r"^(?:CHAPTER|Chapter)\s+[IVXLCDM\d]+\b".to_string(),
                r"^(?:SECTION|Section|Sec\.)\s+\d+[A-Z]?\s*(?:[.:]|[-–—])".to_string(),
                r"^\d{1,3}[A-Z]?\.\s+[A-Z]".to_string(),
                r"^(?:THE\s+)?(?:SCHEDULE|PART\s+[IVXLCDM\d]+)\b".to_string(),
            ],
            max_label_chars: 120,
        }
    }
}

// Statutes often run the section body on after the heading.
const HEADING_SEPARATORS: [&str; 3] = ["—", " – ", " - "];

#[derive(Debug, Clone)]
pub struct HeadingDetector {
    patterns: RegexSet,
    max_label_chars: usize,
}

impl HeadingDetector {
    pub fn new(rules: &HeadingRules) -> Result<Self, ExtractionError> {
        Ok(Self {
            patterns: RegexSet::new(&rules.patterns)?,
            max_label_chars: rules.max_label_chars.max(1),
        })
    }

    /// Scans `text` line by line and returns heading spans in document order.
    pub fn detect(&self, text: &str) -> Vec<HeadingMarker> {
        let mut markers = Vec::new();
        let mut line_offset = 0;

        for line in text.split_inclusive('\n') {
            let offset = line_offset;
            line_offset += line.len();

            let content = line.trim_end_matches(|c| c == '\n' || c == '\r');
            let trimmed = content.trim();
            if trimmed.is_empty() || !self.patterns.is_match(trimmed) {
                continue;
            }

            let span_len = self.heading_span(trimmed);
            let label = normalize_label(&trimmed[..span_len]);
            if label.is_empty() {
                continue;
            }

            let start = offset + (content.len() - content.trim_start().len());
            markers.push(HeadingMarker {
                start,
                end: start + span_len,
                label,
            });
        }

        markers
    }

    fn heading_span(&self, line: &str) -> usize {
        let cut = HEADING_SEPARATORS
            .iter()
            .filter_map(|separator| line.find(separator))
            .min()
            .unwrap_or(line.len());

        match line[..cut].char_indices().nth(self.max_label_chars) {
            Some((byte_index, _)) => byte_index,
            None => cut,
        }
    }
}

/// Pure heading detection over already extracted text.
pub fn detect_headings(
    text: &str,
    rules: &HeadingRules,
) -> Result<Vec<HeadingMarker>, ExtractionError> {
    Ok(HeadingDetector::new(rules)?.detect(text))
}

fn normalize_label(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches(|c: char| c == '.' || c == ':' || c == ',' || c == ';')
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACT: &str = "THE MICRO, SMALL AND MEDIUM ENTERPRISES DEVELOPMENT ACT\n\
CHAPTER V\n\
DELAYED PAYMENTS TO MICRO AND SMALL ENTERPRISES\n\
15. Liability of buyer to make payment.—Where any supplier supplies any goods.\n\
Section 15 of the Act applies to every buyer.\n\
Section 16. Interest on delayed payment\n\
The buyer shall be liable to pay compound interest.\n";

    #[test]
    fn finds_chapter_numbered_and_section_headings() {
        let markers = detect_headings(ACT, &HeadingRules::default()).unwrap();
        let labels: Vec<_> = markers.iter().map(|m| m.label.as_str()).collect();

        assert_eq!(
            labels,
            vec![
                "CHAPTER V",
                "15. Liability of buyer to make payment",
                "Section 16. Interest on delayed payment",
            ]
        );
    }

    #[test]
    fn marker_offsets_point_at_heading_text() {
        let markers = detect_headings(ACT, &HeadingRules::default()).unwrap();
        for marker in &markers {
            let span = &ACT[marker.start..marker.end];
            assert!(span.starts_with(marker.label.split(' ').next().unwrap()));
            assert!(!span.contains('—'));
        }
    }

    #[test]
    fn long_heading_lines_are_capped() {
        let rules = HeadingRules {
            max_label_chars: 10,
            ..HeadingRules::default()
        };
        let markers = detect_headings("Section 9. A very long heading line\n", &rules).unwrap();
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].end - markers[0].start, 10);
        assert_eq!(markers[0].label, "Section 9");
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let rules = HeadingRules {
            patterns: vec!["(unclosed".to_string()],
            ..HeadingRules::default()
        };
        assert!(matches!(
            HeadingDetector::new(&rules),
            Err(ExtractionError::HeadingPattern(_))
        ));
    }
}
