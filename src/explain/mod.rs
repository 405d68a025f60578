//! Explanation generation
//!
//! Turns a predicted stage into an operator-facing explanation by prompting an
//! external text-generation service for a four-field JSON object. Every failure
//! here degrades to an `ExplanationOutcome` variant; nothing propagates as an error.

use std::sync::Arc;
use std::time::Duration;

use crate::knowledge::{self, StageCategory, STAGES};
use crate::types::{ExplanationOutcome, StageExplanation};

mod client;
pub use client::{ChatCompletionsClient, GenerationError, GenerationParams, TextGenerator};

/// Keys the service must return, all as strings.
pub const RESPONSE_KEYS: [&str; 4] = ["stage", "crack_length", "description", "recommendation"];

const FIELD_HINTS: [&str; 4] = [
    "Stage number and description",
    "Approximate crack length in mm (if applicable)",
    "What this fault stage means",
    "What engineers should do next",
];

// ---------- Prompt ----------

pub fn build_prompt(stage: usize) -> String {
    let mut meaning = String::new();
    for (lo, hi, cat) in knowledge::category_ranges() {
        if cat == StageCategory::Unspecified {
            continue;
        }
        if lo == hi {
            meaning.push_str(&format!("- Stage {}: {}\n", lo, cat.label()));
        } else {
            meaning.push_str(&format!("- Stage {} to {}: {}\n", lo, hi, cat.label()));
        }
    }

    let mut lengths = String::new();
    for info in STAGES.iter() {
        if let knowledge::CrackLength::Approx(mm) = info.crack_length {
            lengths.push_str(&format!("- Stage {}: {} mm\n", info.stage, mm));
        }
    }

    let this_stage = match knowledge::lookup(stage) {
        Some(info) => format!(
            "Reference for stage {}: {}; approximate crack length: {}.",
            stage,
            info.category.label(),
            info.crack_length
        ),
        None => format!("Stage {} has no entry in the reference table.", stage),
    };

    let fields: Vec<String> = RESPONSE_KEYS
        .iter()
        .zip(FIELD_HINTS)
        .map(|(key, hint)| format!("  \"{}\": \"{}\"", key, hint))
        .collect();
    let schema = format!("{{\n{}\n}}", fields.join(",\n"));

    format!(
        r#"You are a turbine fault expert AI. A Francis-99 turbine is predicted to be in fault stage `{stage}` based on sensor input.

Use the following reference to explain what this stage means:
{meaning}
Crack length mapping (approximate per stage):
{lengths}
{this_stage}

Your task:
- Identify the stage meaning and condition of the turbine.
- Mention approximate crack length if applicable.
- Suggest what the engineer should do next.

Return only a JSON in this format:
{schema}
"#
    )
}

// ---------- Response parsing ----------

/// Drop one surrounding Markdown code fence (```json ... ```), if any.
fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let Some(rest) = rest.strip_suffix("```") else {
        return text;
    };
    // optional language tag, on its own line or inline before the body
    let rest = match rest.find('\n') {
        Some(nl) if !rest[..nl].trim_start().starts_with('{') => &rest[nl + 1..],
        _ => rest,
    };
    let rest = rest.trim_start();
    rest.strip_prefix("json").unwrap_or(rest).trim()
}

/// Strict parse: an object with all four keys as strings, or the raw text back.
pub fn parse_explanation(raw: &str) -> ExplanationOutcome {
    let body = strip_code_fence(raw.trim());
    match serde_json::from_str::<StageExplanation>(body) {
        Ok(explanation) => ExplanationOutcome::Parsed(explanation),
        Err(e) => {
            tracing::warn!(error = %e, "couldn't parse explanation, returning raw text");
            ExplanationOutcome::Unparsed { raw: raw.to_string() }
        }
    }
}

// ---------- Explainer ----------

#[derive(Debug, Clone)]
pub struct ExplainerSettings {
    pub params: GenerationParams,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

pub struct Explainer {
    backend: Option<Arc<dyn TextGenerator>>,
    settings: ExplainerSettings,
}

impl Explainer {
    pub fn new(backend: Arc<dyn TextGenerator>, settings: ExplainerSettings) -> Self {
        Self { backend: Some(backend), settings }
    }

    /// No service configured; every explanation is `Unavailable`.
    pub fn disabled(settings: ExplainerSettings) -> Self {
        Self { backend: None, settings }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// One prompt, bounded retries on transient failures, each attempt under the timeout.
    /// Cancel-safe: dropping the future abandons the in-flight request.
    pub async fn explain(&self, stage: usize) -> ExplanationOutcome {
        let Some(backend) = &self.backend else {
            return ExplanationOutcome::Unavailable {
                reason: "text generation not configured".to_string(),
            };
        };

        let prompt = build_prompt(stage);
        let mut attempt = 0u32;
        loop {
            match self.attempt(backend.as_ref(), &prompt).await {
                Ok(text) => return parse_explanation(&text),
                Err(e) if e.is_transient() && attempt < self.settings.max_retries => {
                    attempt += 1;
                    let wait = self.settings.retry_backoff * attempt;
                    tracing::warn!(
                        error = %e,
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        "explanation request failed, retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, backend = backend.backend_name(), "explanation unavailable");
                    return ExplanationOutcome::Unavailable { reason: e.to_string() };
                }
            }
        }
    }

    async fn attempt(&self, backend: &dyn TextGenerator, prompt: &str) -> Result<String, GenerationError> {
        match tokio::time::timeout(self.settings.timeout, backend.generate(prompt, &self.settings.params)).await {
            Ok(res) => res,
            Err(_) => Err(GenerationError::Timeout(self.settings.timeout)),
        }
    }
}
