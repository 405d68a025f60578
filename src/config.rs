use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::{fs, path::Path, time::Duration};

use crate::error::DiagnosisError;
use crate::explain::{ExplainerSettings, GenerationParams};
use crate::window::DEFAULT_WINDOW_LEN;

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct GridConfig {
    pub cols: u32,
    pub rows: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self { cols: 5, rows: 2 }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ExplainerConfig {
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    /// Never read from the config file; comes from `GROQ_API_KEY`.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for ExplainerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "llama3-70b-8192".to_string(),
            max_tokens: 300,
            temperature: 0.4,
            timeout_secs: 30,
            max_retries: 1,
            retry_backoff_ms: 500,
            api_key: None,
        }
    }
}

impl ExplainerConfig {
    pub fn settings(&self) -> ExplainerSettings {
        ExplainerSettings {
            params: GenerationParams {
                model: self.model.clone(),
                max_tokens: self.max_tokens,
                temperature: self.temperature,
            },
            timeout: Duration::from_secs(self.timeout_secs),
            max_retries: self.max_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub model_path: String,
    pub scaler_path: String,
    pub reference_image_path: String,
    pub window_len: usize,
    pub class_count: usize,
    pub grid: GridConfig,
    pub port: u16,
    pub explainer: ExplainerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model_path: "fault_model.pt".to_string(),
            scaler_path: "robust_scaler.json".to_string(),
            reference_image_path: "crackimage.jpg".to_string(),
            window_len: DEFAULT_WINDOW_LEN,
            class_count: 10,
            grid: GridConfig::default(),
            port: 8080,
            explainer: ExplainerConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, DiagnosisError> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("config file not found: {}", path.display()))
            .and_then(|d| serde_json::from_str::<Self>(&d).with_context(|| "invalid config JSON"))
            .map_err(DiagnosisError::config)?;
        data.validate()?;
        Ok(data)
    }

    /// `CONFIG_PATH` file (optional) with environment overrides on top.
    pub fn from_env() -> Result<Self, DiagnosisError> {
        let mut cfg = match std::env::var("CONFIG_PATH") {
            Ok(p) => Self::load(Path::new(&p))?,
            Err(_) => Self::default(),
        };
        cfg.apply_overrides(|k| std::env::var(k).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn apply_overrides<F>(&mut self, get: F) -> Result<(), DiagnosisError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = get("MODEL_PATH") {
            self.model_path = v;
        }
        if let Some(v) = get("SCALER_PATH") {
            self.scaler_path = v;
        }
        if let Some(v) = get("REFERENCE_IMAGE") {
            self.reference_image_path = v;
        }
        if let Some(v) = get("PORT") {
            self.port = v
                .parse()
                .map_err(|_| DiagnosisError::Configuration(format!("PORT is not a port number: {}", v)))?;
        }
        if let Some(v) = get("LLM_BASE_URL") {
            self.explainer.base_url = v;
        }
        if let Some(v) = get("LLM_MODEL") {
            self.explainer.model = v;
        }
        self.explainer.api_key = get("GROQ_API_KEY").filter(|k| !k.trim().is_empty());
        Ok(())
    }

    pub fn validate(&self) -> Result<(), DiagnosisError> {
        self.check().map_err(DiagnosisError::config)
    }

    fn check(&self) -> Result<()> {
        if self.window_len == 0 {
            bail!("window_len must be >= 1");
        }
        if self.class_count == 0 {
            bail!("class_count must be >= 1");
        }
        if self.grid.cols == 0 || self.grid.rows == 0 {
            bail!("grid must have at least one column and one row");
        }
        let cells = self.grid.cols as usize * self.grid.rows as usize;
        if cells < self.class_count {
            bail!("{}x{} grid has {} cells for {} stages", self.grid.cols, self.grid.rows, cells, self.class_count);
        }
        if !(0.0..=2.0).contains(&self.explainer.temperature) {
            bail!("temperature {} outside [0, 2]", self.explainer.temperature);
        }
        if self.explainer.timeout_secs == 0 {
            bail!("explainer timeout_secs must be >= 1");
        }
        if self.explainer.max_tokens == 0 {
            bail!("max_tokens must be >= 1");
        }
        Ok(())
    }
}
