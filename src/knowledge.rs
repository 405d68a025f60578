use serde::Serialize;
use std::fmt;

/// Qualitative meaning of a fault stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageCategory {
    /// No meaning is assigned to this stage in the reference material.
    Unspecified,
    CrackGrowth,
    DetachedFragment,
    EnlargedOpening,
}

impl StageCategory {
    pub fn label(self) -> &'static str {
        match self {
            Self::Unspecified => "No defined fault meaning",
            Self::CrackGrowth => "Crack growth stage",
            Self::DetachedFragment => "Detached fragment",
            Self::EnlargedOpening => "Enlarged opening of the detached fragment",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "mm", rename_all = "snake_case")]
pub enum CrackLength {
    Approx(u32),
    NotApplicable,
}

impl fmt::Display for CrackLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Approx(mm) => write!(f, "{} mm", mm),
            Self::NotApplicable => f.write_str("not applicable"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageInfo {
    pub stage: usize,
    pub category: StageCategory,
    pub crack_length: CrackLength,
}

use CrackLength::{Approx, NotApplicable};
use StageCategory::*;

/// Static stage table for the Francis-99 blade crack progression.
/// Stages 0 and 9 carry no crack length.
pub static STAGES: [StageInfo; 10] = [
    StageInfo { stage: 0, category: Unspecified, crack_length: NotApplicable },
    StageInfo { stage: 1, category: CrackGrowth, crack_length: Approx(15) },
    StageInfo { stage: 2, category: CrackGrowth, crack_length: Approx(30) },
    StageInfo { stage: 3, category: CrackGrowth, crack_length: Approx(50) },
    StageInfo { stage: 4, category: CrackGrowth, crack_length: Approx(72) },
    StageInfo { stage: 5, category: CrackGrowth, crack_length: Approx(95) },
    StageInfo { stage: 6, category: CrackGrowth, crack_length: Approx(115) },
    StageInfo { stage: 7, category: CrackGrowth, crack_length: Approx(140) },
    StageInfo { stage: 8, category: DetachedFragment, crack_length: Approx(170) },
    StageInfo { stage: 9, category: EnlargedOpening, crack_length: NotApplicable },
];

pub fn lookup(stage: usize) -> Option<&'static StageInfo> {
    STAGES.get(stage)
}

/// Contiguous runs of stages sharing a category, e.g. `(1, 7, CrackGrowth)`.
pub fn category_ranges() -> Vec<(usize, usize, StageCategory)> {
    let mut out: Vec<(usize, usize, StageCategory)> = Vec::new();
    for info in STAGES.iter() {
        if let Some(last) = out.last_mut() {
            if last.2 == info.category && last.1 + 1 == info.stage {
                last.1 = info.stage;
                continue;
            }
        }
        out.push((info.stage, info.stage, info.category));
    }
    out
}
