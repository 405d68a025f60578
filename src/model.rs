use crate::error::DiagnosisError;
use crate::types::{SequenceWindow, StagePrediction};

/// Opaque sequence classifier: window -> class scores.
/// Implementations must be read-only after load so a shared instance can serve concurrent requests.
pub trait StageClassifier: Send + Sync {
    /// Number of output classes the artifact was trained with.
    fn class_count(&self) -> usize;

    /// Time-steps of the declared input shape (1, W, C).
    fn window_len(&self) -> usize;

    fn forward(&self, window: &SequenceWindow) -> anyhow::Result<Vec<f32>>;
}

/// Run the classifier and take the arg-max class as the stage.
pub fn predict(
    classifier: &dyn StageClassifier,
    window: &SequenceWindow,
) -> Result<StagePrediction, DiagnosisError> {
    if window.steps() != classifier.window_len() {
        return Err(DiagnosisError::Inference(format!(
            "window has {} steps, classifier expects {}",
            window.steps(),
            classifier.window_len()
        )));
    }

    let probabilities = classifier
        .forward(window)
        .map_err(|e| DiagnosisError::Inference(format!("{:#}", e)))?;

    let expected = classifier.class_count();
    if probabilities.len() != expected {
        return Err(DiagnosisError::Inference(format!(
            "model returned {} scores, expected {}",
            probabilities.len(),
            expected
        )));
    }

    let stage = argmax(&probabilities).ok_or_else(|| {
        DiagnosisError::Inference("model returned no finite scores".to_string())
    })?;
    Ok(StagePrediction { stage, probabilities })
}

/// First index of the maximum; NaN scores are skipped.
fn argmax(scores: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &s) in scores.iter().enumerate() {
        if s.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if s <= b => {}
            _ => best = Some((i, s)),
        }
    }
    best.map(|(i, _)| i)
}

#[cfg(feature = "torch")]
pub use torch::TorchClassifier;

#[cfg(feature = "torch")]
mod torch {
    use anyhow::{bail, Context, Result};
    use tch::{kind::Kind, CModule, Device, Tensor};

    use super::StageClassifier;
    use crate::error::DiagnosisError;
    use crate::types::SequenceWindow;

    /// TorchScript export of the sequence classifier, run on CPU.
    pub struct TorchClassifier {
        model: CModule,
        device: Device,
        window_len: usize,
        channels: usize,
        n_classes: usize,
    }

    impl TorchClassifier {
        pub fn load(
            model_path: &str,
            window_len: usize,
            channels: usize,
            n_classes: usize,
        ) -> Result<Self, DiagnosisError> {
            Self::load_inner(model_path, window_len, channels, n_classes)
                .map_err(DiagnosisError::config)
        }

        fn load_inner(
            model_path: &str,
            window_len: usize,
            channels: usize,
            n_classes: usize,
        ) -> Result<Self> {
            let device = Device::Cpu;

            let model = CModule::load_on_device(model_path, device)
                .with_context(|| format!("failed to load TorchScript {}", model_path))?;

            // Probe output shape with a zero window — expect [B=1, C]
            let dummy = Tensor::zeros([1, window_len as i64, channels as i64], (Kind::Float, device));
            let t = model
                .forward_ts(&[dummy])
                .with_context(|| "warmup forward failed")?;
            let sz = t.size();
            if sz != [1, n_classes as i64] {
                bail!("unexpected model output size: {:?}, expected [1, {}]", sz, n_classes);
            }

            Ok(Self {
                model,
                device,
                window_len,
                channels,
                n_classes,
            })
        }
    }

    impl StageClassifier for TorchClassifier {
        fn class_count(&self) -> usize {
            self.n_classes
        }

        fn window_len(&self) -> usize {
            self.window_len
        }

        fn forward(&self, window: &SequenceWindow) -> Result<Vec<f32>> {
            if window.channels() != self.channels {
                bail!(
                    "window has {} channels, model expects {}",
                    window.channels(),
                    self.channels
                );
            }

            let input = Tensor::from_slice(window.as_slice())
                .reshape([1, window.steps() as i64, window.channels() as i64])
                .to_device(self.device);

            // Forward: [1, C]
            let t = self.model.forward_ts(&[input])?;
            let sz = t.size();
            if sz.len() != 2 || sz[0] != 1 {
                bail!("unexpected model output size: {:?}", sz);
            }

            let flat = t.to_kind(Kind::Float).view([-1]);
            Ok(Vec::<f32>::try_from(&flat)?)
        }
    }
}
