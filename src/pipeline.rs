use parking_lot::Mutex;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::DiagnosisError;
use crate::explain::{ChatCompletionsClient, Explainer};
use crate::model::{self, StageClassifier};
use crate::scaler::RobustScaler;
use crate::types::{ExplanationOutcome, SensorReading};
use crate::visual::{self, ReferenceImage, VisualOutcome};
use crate::window::build_window;

#[derive(Debug, Default, Clone, Serialize)]
pub struct PipelineStats {
    pub requests: u64,
    pub failed: u64,
    pub image_unavailable: u64,
    pub explanation_parsed: u64,
    pub explanation_unparsed: u64,
    pub explanation_unavailable: u64,
}

/// Process-wide, read-only artifacts plus counters. Build once, share via `Arc`.
pub struct AppContext {
    pub scaler: RobustScaler,
    pub classifier: Arc<dyn StageClassifier>,
    pub reference: Option<ReferenceImage>,
    pub explainer: Explainer,
    stats: Mutex<PipelineStats>,
}

/// Everything one reading produces. Visual and explanation degrade independently.
#[derive(Debug, Clone)]
pub struct Diagnosis {
    pub stage: usize,
    pub probabilities: Vec<f32>,
    pub visual: VisualOutcome,
    pub explanation: ExplanationOutcome,
}

impl AppContext {
    pub fn new(
        scaler: RobustScaler,
        classifier: Arc<dyn StageClassifier>,
        reference: Option<ReferenceImage>,
        explainer: Explainer,
    ) -> Result<Self, DiagnosisError> {
        if scaler.channels() != crate::types::N_CHANNELS {
            return Err(DiagnosisError::Configuration(format!(
                "scaler has {} channels, readings have {}",
                scaler.channels(),
                crate::types::N_CHANNELS
            )));
        }
        if let Some(r) = &reference {
            let (cols, rows) = r.grid();
            if (cols as usize) * (rows as usize) < classifier.class_count() {
                return Err(DiagnosisError::Configuration(format!(
                    "{}x{} reference grid cannot hold {} stages",
                    cols,
                    rows,
                    classifier.class_count()
                )));
            }
        }
        Ok(Self {
            scaler,
            classifier,
            reference,
            explainer,
            stats: Mutex::new(PipelineStats::default()),
        })
    }

    /// Load scaler, reference image and explainer from config around an already-loaded classifier.
    /// A missing reference image or API key degrades; a bad scaler aborts.
    pub fn from_config(cfg: &AppConfig, classifier: Arc<dyn StageClassifier>) -> Result<Self, DiagnosisError> {
        if classifier.window_len() != cfg.window_len || classifier.class_count() != cfg.class_count {
            return Err(DiagnosisError::Configuration(format!(
                "classifier shape (W={}, C={}) disagrees with config (W={}, C={})",
                classifier.window_len(),
                classifier.class_count(),
                cfg.window_len,
                cfg.class_count
            )));
        }

        let scaler = RobustScaler::load(Path::new(&cfg.scaler_path))?;
        tracing::info!(path = %cfg.scaler_path, channels = scaler.channels(), "loaded scaler");

        let reference = match ReferenceImage::open(Path::new(&cfg.reference_image_path), cfg.grid.cols, cfg.grid.rows) {
            Ok(img) => {
                let (w, h) = img.dimensions();
                tracing::info!(path = %cfg.reference_image_path, width = w, height = h, "loaded reference image");
                Some(img)
            }
            Err(e) => {
                let err = format!("{:#}", e);
                tracing::warn!(error = %err, "reference image unavailable; crops disabled");
                None
            }
        };

        let settings = cfg.explainer.settings();
        let explainer = match &cfg.explainer.api_key {
            Some(key) => {
                let client = ChatCompletionsClient::new(&cfg.explainer.base_url, key, settings.timeout)
                    .map_err(|e| DiagnosisError::Configuration(e.to_string()))?;
                tracing::info!(base_url = %client.base_url(), model = %settings.params.model, "text generation enabled");
                Explainer::new(Arc::new(client), settings)
            }
            None => {
                tracing::warn!("GROQ_API_KEY not set; explanations disabled");
                Explainer::disabled(settings)
            }
        };

        Self::new(scaler, classifier, reference, explainer)
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats.lock().clone()
    }

    /// Normalize, classify, then crop and explain. Only classification failures abort.
    pub async fn diagnose(&self, reading: &SensorReading) -> Result<Diagnosis, DiagnosisError> {
        self.stats.lock().requests += 1;

        let prediction = match self.classify(reading) {
            Ok(p) => p,
            Err(e) => {
                self.stats.lock().failed += 1;
                tracing::error!(kind = e.kind(), error = %e, "diagnosis failed");
                return Err(e);
            }
        };
        let stage = prediction.stage;

        let visual = visual::visual_for_stage(self.reference.as_ref(), stage);
        if let VisualOutcome::Unavailable { reason } = &visual {
            self.stats.lock().image_unavailable += 1;
            tracing::warn!(stage, reason = %reason, "stage image unavailable");
        }

        let explanation = self.explainer.explain(stage).await;
        {
            let mut s = self.stats.lock();
            match &explanation {
                ExplanationOutcome::Parsed(_) => s.explanation_parsed += 1,
                ExplanationOutcome::Unparsed { .. } => s.explanation_unparsed += 1,
                ExplanationOutcome::Unavailable { .. } => s.explanation_unavailable += 1,
            }
        }

        Ok(Diagnosis {
            stage,
            probabilities: prediction.probabilities,
            visual,
            explanation,
        })
    }

    /// The synchronous part: reading -> stage.
    pub fn classify(&self, reading: &SensorReading) -> Result<crate::types::StagePrediction, DiagnosisError> {
        let normalized = self.scaler.normalize(reading)?;

        if std::env::var("LOG_PRED").ok().as_deref() == Some("1") {
            let v = &normalized.values;
            let mean = v.iter().sum::<f64>() / v.len().max(1) as f64;
            let max_abs = v.iter().fold(0.0f64, |m, x| m.max(x.abs()));
            tracing::info!(raw = ?reading.values, normalized = ?v, mean, max_abs, "normalized reading");
        }

        let window = build_window(&normalized, self.classifier.window_len());
        let prediction = model::predict(self.classifier.as_ref(), &window)?;
        tracing::debug!(stage = prediction.stage, "classified");
        Ok(prediction)
    }
}
