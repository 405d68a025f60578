use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::DiagnosisError;

/// Channel identities in the order the scaler and classifier were fitted on.
pub const CHANNELS: [&str; 5] = ["PDT1", "PGV2", "PDT3", "ATB1", "ATB2"];
pub const N_CHANNELS: usize = CHANNELS.len();

// ---------- Readings ----------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub values: [f64; N_CHANNELS],
}

impl SensorReading {
    pub fn new(values: [f64; N_CHANNELS]) -> Self {
        Self { values }
    }

    /// Build a reading from a flat `name -> value` map.
    /// Every channel must be present exactly once and finite; unknown names are rejected.
    pub fn from_named(map: &HashMap<String, f64>) -> Result<Self, DiagnosisError> {
        if let Some(unknown) = map.keys().find(|k| !CHANNELS.contains(&k.as_str())) {
            return Err(DiagnosisError::InvalidReading(format!(
                "unknown channel '{}' (expected {:?})",
                unknown, CHANNELS
            )));
        }

        let mut values = [0.0; N_CHANNELS];
        for (slot, name) in values.iter_mut().zip(CHANNELS) {
            let v = *map
                .get(name)
                .ok_or_else(|| DiagnosisError::InvalidReading(format!("missing channel '{}'", name)))?;
            if !v.is_finite() {
                return Err(DiagnosisError::InvalidReading(format!(
                    "channel '{}' is not a finite number",
                    name
                )));
            }
            *slot = v;
        }
        Ok(Self { values })
    }

    /// Build a reading from a raw JSON body: an object whose values are all numbers.
    pub fn from_json(body: &serde_json::Value) -> Result<Self, DiagnosisError> {
        let obj = body.as_object().ok_or_else(|| {
            DiagnosisError::InvalidReading("body must be a JSON object of channel values".to_string())
        })?;
        let mut map = HashMap::with_capacity(obj.len());
        for (name, v) in obj {
            let x = v.as_f64().ok_or_else(|| {
                DiagnosisError::InvalidReading(format!("channel '{}' is not a number: {}", name, v))
            })?;
            map.insert(name.clone(), x);
        }
        Self::from_named(&map)
    }
}

/// Reading after robust scaling. Same shape, unbounded range.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedReading {
    pub values: Vec<f64>,
}

// ---------- Classifier input/output ----------

/// Row-major (1, steps, channels) window of f32 values.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceWindow {
    data: Vec<f32>,
    steps: usize,
    channels: usize,
}

impl SequenceWindow {
    pub(crate) fn from_parts(data: Vec<f32>, steps: usize, channels: usize) -> Self {
        debug_assert_eq!(data.len(), steps * channels);
        Self { data, steps, channels }
    }

    /// (batch, time-steps, channels)
    pub fn shape(&self) -> [usize; 3] {
        [1, self.steps, self.channels]
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn step(&self, i: usize) -> Option<&[f32]> {
        if i >= self.steps {
            return None;
        }
        let start = i * self.channels;
        Some(&self.data[start..start + self.channels])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StagePrediction {
    pub stage: usize,
    pub probabilities: Vec<f32>,
}

// ---------- Explanation ----------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageExplanation {
    pub stage: String,
    pub crack_length: String,
    pub description: String,
    pub recommendation: String,
}

/// Result of the explanation step. Never an error: degraded outcomes are variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExplanationOutcome {
    Parsed(StageExplanation),
    Unparsed { raw: String },
    Unavailable { reason: String },
}

impl ExplanationOutcome {
    pub fn is_parsed(&self) -> bool {
        matches!(self, Self::Parsed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_orders_channels() {
        let body = json!({ "ATB2": -0.22, "PDT1": 0.12, "PGV2": -0.03, "PDT3": 0.45, "ATB1": 0.01 });
        let r = SensorReading::from_json(&body).unwrap();
        assert_eq!(r.values, [0.12, -0.03, 0.45, 0.01, -0.22]);
    }

    #[test]
    fn test_from_json_rejects_bad_bodies() {
        for body in [
            json!({ "PDT1": "x", "PGV2": 0, "PDT3": 0, "ATB1": 0, "ATB2": 0 }),
            json!({ "PDT1": null, "PGV2": 0, "PDT3": 0, "ATB1": 0, "ATB2": 0 }),
            json!({ "PDT1": 0, "PGV2": 0, "PDT3": 0, "ATB1": 0 }),
            json!({ "PDT1": 0, "PGV2": 0, "PDT3": 0, "ATB1": 0, "ATB2": 0, "ATB3": 0 }),
            json!([0, 0, 0, 0, 0]),
        ] {
            let err = SensorReading::from_json(&body).unwrap_err();
            assert!(matches!(err, DiagnosisError::InvalidReading(_)), "body {}", body);
        }
    }
}
