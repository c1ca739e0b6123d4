//! Situation analysis for the two-phase analyze/execute flow.
//!
//! The analyze call asks the model for a JSON object describing the other
//! party's message; the user confirms (or cancels) the suggested strategy
//! before the execute call generates options. The analysis lives only for
//! the duration of one phase transition and is never persisted.

use serde::{Deserialize, Serialize};

/// Structured result of the analyze phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SituationAnalysis {
    /// One-line reading of the situation
    pub summary: String,
    /// Coarse sentiment score, negative to positive
    #[serde(default)]
    pub emotion_score: i32,
    /// What the other party is likely after
    #[serde(default)]
    pub intent: String,
    /// Suggested reply strategy
    #[serde(default)]
    pub strategy: String,
    /// Model's confidence in this reading, 0.0..=1.0
    #[serde(default)]
    pub confidence: f32,
    /// Whether the input looks like rapid-fire consecutive messages
    #[serde(default)]
    pub burst_detected: bool,
    /// Perceived conversational pressure ("low" / "medium" / "high")
    #[serde(default)]
    pub pressure_level: String,
}

impl SituationAnalysis {
    /// Parses an analysis from raw model output.
    ///
    /// Models frequently wrap JSON in Markdown code fences; those are
    /// stripped before deserializing.
    pub fn from_llm_text(raw: &str) -> Result<Self, serde_json::Error> {
        let cleaned = strip_code_fences(raw);
        serde_json::from_str(cleaned.trim())
    }
}

/// Removes ```json / ``` fence markers the model may emit around a payload.
pub fn strip_code_fences(raw: &str) -> String {
    raw.replace("```json", "").replace("```", "")
}
