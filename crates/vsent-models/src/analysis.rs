//! Analysis result documents.
//!
//! A completed job persists exactly one [`AnalysisDocument`]: workload
//! metadata plus an ordered list of timestamped segments.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::timestamp::format_timestamp;

/// Result document for one analyzed video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisDocument {
    /// Display name of the analyzed payload
    pub filename: String,
    /// Duration of the video in seconds
    pub duration: f64,
    /// Segments in playback order
    pub segments: Vec<Segment>,
}

/// One timestamped span of dialogue with its annotations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Start offset in seconds
    pub start: f64,
    /// End offset in seconds
    pub end: f64,
    /// Display timestamp of `start`
    pub timestamp: String,
    /// Transcribed text
    pub text: String,
    /// Attributed speaker
    pub speaker: String,
    /// Sentiment score in [-1, 1]
    pub sentiment: f64,
    /// Dominant emotion label
    pub emotion: String,
}

impl Segment {
    /// Build a segment, deriving the display timestamp from `start`.
    pub fn new(
        start: f64,
        end: f64,
        text: impl Into<String>,
        speaker: impl Into<String>,
        sentiment: f64,
        emotion: impl Into<String>,
    ) -> Self {
        Self {
            start,
            end,
            timestamp: format_timestamp(start),
            text: text.into(),
            speaker: speaker.into(),
            sentiment,
            emotion: emotion.into(),
        }
    }
}

/// Structural problems with a result document.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DocumentError {
    #[error("Duration must be positive, got {0}")]
    NonPositiveDuration(f64),

    #[error("Document has no segments")]
    NoSegments,

    #[error("Segment {index} ends before it starts ({start} > {end})")]
    InvertedSegment { index: usize, start: f64, end: f64 },

    #[error("Segment {index} sentiment {value} outside [-1, 1]")]
    SentimentOutOfRange { index: usize, value: f64 },
}

impl AnalysisDocument {
    /// Check the invariants a reader relies on.
    pub fn validate(&self) -> Result<(), DocumentError> {
        if !(self.duration.is_finite() && self.duration > 0.0) {
            return Err(DocumentError::NonPositiveDuration(self.duration));
        }
        if self.segments.is_empty() {
            return Err(DocumentError::NoSegments);
        }
        for (index, segment) in self.segments.iter().enumerate() {
            if segment.end < segment.start {
                return Err(DocumentError::InvertedSegment {
                    index,
                    start: segment.start,
                    end: segment.end,
                });
            }
            if !(-1.0..=1.0).contains(&segment.sentiment) {
                return Err(DocumentError::SentimentOutOfRange {
                    index,
                    value: segment.sentiment,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AnalysisDocument {
        AnalysisDocument {
            filename: "clip1".to_string(),
            duration: 120.0,
            segments: vec![
                Segment::new(0.0, 5.0, "Hello.", "Character A", -0.5, "confusion"),
                Segment::new(62.0, 67.0, "Run!", "Character B", 0.5, "fear"),
            ],
        }
    }

    #[test]
    fn test_segment_timestamp_derived_from_start() {
        let doc = sample();
        assert_eq!(doc.segments[0].timestamp, "0:00");
        assert_eq!(doc.segments[1].timestamp, "1:02");
    }

    #[test]
    fn test_validate_ok() {
        assert_eq!(sample().validate(), Ok(()));
    }

    #[test]
    fn test_validate_rejects_bad_documents() {
        let mut doc = sample();
        doc.duration = 0.0;
        assert_eq!(doc.validate(), Err(DocumentError::NonPositiveDuration(0.0)));

        let mut doc = sample();
        doc.segments.clear();
        assert_eq!(doc.validate(), Err(DocumentError::NoSegments));

        let mut doc = sample();
        doc.segments[1].end = 1.0;
        assert!(matches!(
            doc.validate(),
            Err(DocumentError::InvertedSegment { index: 1, .. })
        ));

        let mut doc = sample();
        doc.segments[0].sentiment = 1.5;
        assert!(matches!(
            doc.validate(),
            Err(DocumentError::SentimentOutOfRange { index: 0, .. })
        ));
    }

    #[test]
    fn test_document_json_shape() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(value["filename"], "clip1");
        assert_eq!(value["segments"][1]["timestamp"], "1:02");
        assert_eq!(value["segments"][0]["speaker"], "Character A");
    }
}
