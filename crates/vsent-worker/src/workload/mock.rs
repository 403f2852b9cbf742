//! Mock video analysis workload.
//!
//! Stands in for a real audio extraction / transcription / sentiment
//! pipeline: each phase sleeps for its configured delay and the result is
//! a fixed two-speaker dialogue.

use std::time::Duration;

use async_trait::async_trait;
use vsent_models::{AnalysisDocument, Segment};

use super::{Workload, WorkloadContext, WorkloadStep};
use crate::config::PhaseDelays;
use crate::error::WorkloadError;

/// Duration reported for every mock analysis.
pub const MOCK_DURATION_SECS: f64 = 120.0;

// (start, end, speaker, text)
const TRANSCRIPT: [(f64, f64, &str, &str); 10] = [
    (0.0, 5.0, "Character A", "I really don't understand why you're doing this."),
    (12.0, 16.0, "Character B", "Trust me, it's going to be worth it in the end."),
    (18.0, 24.0, "Character A", "That's what you always say, but look where we are now."),
    (25.0, 30.0, "Character B", "This time is different. I promise."),
    (32.0, 36.0, "Character A", "You know what? I believe you."),
    (40.0, 45.0, "Character B", "Thank you. That means everything to me."),
    (47.0, 50.0, "Character A", "Don't make me regret it."),
    (55.0, 58.0, "Character B", "I won't. I swear."),
    (62.0, 67.0, "Character A", "We need to move quickly, they're coming!"),
    (70.0, 74.0, "Character B", "Stay calm. We've been through worse."),
];

// (sentiment, emotion), aligned with TRANSCRIPT
const SENTIMENTS: [(f64, &str); 10] = [
    (-0.65, "confusion"),
    (0.45, "confidence"),
    (-0.78, "frustration"),
    (0.32, "hope"),
    (0.58, "trust"),
    (0.85, "gratitude"),
    (-0.25, "caution"),
    (0.62, "determination"),
    (-0.54, "fear"),
    (0.15, "reassurance"),
];

/// The three-phase mock analysis workload.
pub fn mock_analysis(delays: PhaseDelays) -> Workload {
    Workload::new()
        .step(ExtractAudio {
            delay: delays.extract_audio,
        })
        .step(Transcribe {
            delay: delays.transcribe,
        })
        .step(AnalyzeSentiment {
            delay: delays.analyze_sentiment,
        })
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

struct ExtractAudio {
    delay: Duration,
}

#[async_trait]
impl WorkloadStep for ExtractAudio {
    fn label(&self) -> &str {
        "Extracting audio"
    }

    fn progress(&self) -> u8 {
        10
    }

    async fn execute(&self, ctx: &mut WorkloadContext) -> Result<(), WorkloadError> {
        if ctx.source_ref.as_str().trim().is_empty() {
            return Err(WorkloadError::invalid_input("empty source reference"));
        }
        pause(self.delay).await;
        Ok(())
    }
}

struct Transcribe {
    delay: Duration,
}

#[async_trait]
impl WorkloadStep for Transcribe {
    fn label(&self) -> &str {
        "Transcribing audio"
    }

    fn progress(&self) -> u8 {
        30
    }

    async fn execute(&self, ctx: &mut WorkloadContext) -> Result<(), WorkloadError> {
        pause(self.delay).await;
        let segments = TRANSCRIPT
            .iter()
            .map(|&(start, end, speaker, text)| {
                Segment::new(start, end, text, speaker, 0.0, "neutral")
            })
            .collect();
        ctx.output = Some(AnalysisDocument {
            filename: ctx.filename.clone(),
            duration: MOCK_DURATION_SECS,
            segments,
        });
        Ok(())
    }
}

struct AnalyzeSentiment {
    delay: Duration,
}

#[async_trait]
impl WorkloadStep for AnalyzeSentiment {
    fn label(&self) -> &str {
        "Analyzing sentiment"
    }

    fn progress(&self) -> u8 {
        60
    }

    async fn execute(&self, ctx: &mut WorkloadContext) -> Result<(), WorkloadError> {
        pause(self.delay).await;
        let document = ctx
            .output
            .as_mut()
            .ok_or_else(|| WorkloadError::invalid_input("no transcript to analyze"))?;

        for (segment, &(sentiment, emotion)) in document.segments.iter_mut().zip(SENTIMENTS.iter()) {
            segment.sentiment = sentiment;
            segment.emotion = emotion.to_string();
        }
        Ok(())
    }
}
