use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::{fs, path::Path};

use crate::error::DiagnosisError;
use crate::types::{NormalizedReading, SensorReading, CHANNELS};

#[derive(Deserialize)]
struct ScalerJson {
    #[serde(default)]
    feature_names: Option<Vec<String>>,
    center: Vec<f64>,
    scale: Vec<f64>,
}

/// Pre-fitted per-channel robust scaling: `(x - median) / IQR`.
#[derive(Debug, Clone, PartialEq)]
pub struct RobustScaler {
    center: Vec<f64>,
    scale: Vec<f64>,
}

impl RobustScaler {
    /// Zero scales are replaced by 1.0 so constant channels pass through centered.
    pub fn new(center: Vec<f64>, scale: Vec<f64>) -> Result<Self, DiagnosisError> {
        if center.len() != scale.len() {
            return Err(DiagnosisError::Configuration(format!(
                "scaler center/scale length mismatch: {} vs {}",
                center.len(),
                scale.len()
            )));
        }
        let scale = scale
            .into_iter()
            .map(|s| if s == 0.0 { 1.0 } else { s })
            .collect();
        Ok(Self { center, scale })
    }

    pub fn load(path: &Path) -> Result<Self, DiagnosisError> {
        Self::load_inner(path).map_err(DiagnosisError::config)
    }

    fn load_inner(path: &Path) -> Result<Self> {
        let txt = fs::read_to_string(path)
            .with_context(|| format!("failed to read scaler at {}", path.display()))?;
        let raw: ScalerJson =
            serde_json::from_str(&txt).with_context(|| "failed to parse scaler json")?;

        if raw.center.len() != CHANNELS.len() {
            bail!(
                "scaler fitted on {} channels, expected {}",
                raw.center.len(),
                CHANNELS.len()
            );
        }
        if let Some(names) = &raw.feature_names {
            if names.iter().map(String::as_str).ne(CHANNELS) {
                bail!("scaler channel order {:?} != {:?}", names, CHANNELS);
            }
        }
        Ok(Self::new(raw.center, raw.scale)?)
    }

    pub fn channels(&self) -> usize {
        self.center.len()
    }

    pub fn normalize(&self, reading: &SensorReading) -> Result<NormalizedReading, DiagnosisError> {
        if reading.values.len() != self.channels() {
            return Err(DiagnosisError::Configuration(format!(
                "scaler expects {} channels, reading has {}",
                self.channels(),
                reading.values.len()
            )));
        }
        let values = reading
            .values
            .iter()
            .zip(self.center.iter().zip(&self.scale))
            .map(|(x, (c, s))| (x - c) / s)
            .collect();
        Ok(NormalizedReading { values })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn scaler() -> RobustScaler {
        RobustScaler::new(vec![0.1, 0.0, 0.4, 0.0, -0.2], vec![0.5, 2.0, 1.0, 0.0, 0.1]).unwrap()
    }

    #[test]
    fn test_affine_per_channel() {
        let r = SensorReading::new([0.6, 4.0, 0.4, 3.0, -0.1]);
        let n = scaler().normalize(&r).unwrap();
        assert!((n.values[0] - 1.0).abs() < 1e-12);
        assert!((n.values[1] - 2.0).abs() < 1e-12);
        assert_eq!(n.values[2], 0.0);
        // zero scale -> 1.0
        assert!((n.values[3] - 3.0).abs() < 1e-12);
        assert!((n.values[4] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_deterministic_bits() {
        let s = scaler();
        let r = SensorReading::new([0.12, -0.03, 0.45, 0.01, -0.22]);
        let a = s.normalize(&r).unwrap();
        let b = s.normalize(&r).unwrap();
        for (x, y) in a.values.iter().zip(&b.values) {
            assert_eq!(x.to_bits(), y.to_bits());
        }
    }

    #[test]
    fn test_extreme_values_pass_through() {
        let r = SensorReading::new([1e9, -1e9, 0.0, 0.0, 0.0]);
        let n = scaler().normalize(&r).unwrap();
        assert!(n.values[0] > 1e8);
        assert!(n.values[1] < -1e8);
    }

    #[test]
    fn test_arity_mismatch_is_configuration_error() {
        let s = RobustScaler::new(vec![0.0; 4], vec![1.0; 4]).unwrap();
        let err = s.normalize(&SensorReading::new([0.0; 5])).unwrap_err();
        assert!(matches!(err, DiagnosisError::Configuration(_)));
    }

    #[test]
    fn test_load_json() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(
            f,
            r#"{{"feature_names":["PDT1","PGV2","PDT3","ATB1","ATB2"],"center":[0,0,0,0,0],"scale":[1,1,1,1,2]}}"#
        )
        .unwrap();
        let s = RobustScaler::load(f.path()).unwrap();
        let n = s.normalize(&SensorReading::new([1.0, 1.0, 1.0, 1.0, 1.0])).unwrap();
        assert_eq!(n.values, vec![1.0, 1.0, 1.0, 1.0, 0.5]);
    }

    #[test]
    fn test_load_rejects_wrong_order_and_arity() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(
            f,
            r#"{{"feature_names":["PGV2","PDT1","PDT3","ATB1","ATB2"],"center":[0,0,0,0,0],"scale":[1,1,1,1,1]}}"#
        )
        .unwrap();
        assert!(matches!(RobustScaler::load(f.path()), Err(DiagnosisError::Configuration(_))));

        let mut g = tempfile::NamedTempFile::new().unwrap();
        write!(g, r#"{{"center":[0,0,0],"scale":[1,1,1]}}"#).unwrap();
        assert!(matches!(RobustScaler::load(g.path()), Err(DiagnosisError::Configuration(_))));

        let missing = Path::new("/nonexistent/robust_scaler.json");
        assert!(matches!(RobustScaler::load(missing), Err(DiagnosisError::Configuration(_))));
    }
}
