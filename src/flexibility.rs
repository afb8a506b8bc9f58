use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::catalogue::AngleRange;
use crate::metrics::MetricKind;

/// 比の指標は角度マージンをこの係数で縮めて広げる（±7° → ±0.07）
const RATIO_MARGIN_SCALE: f64 = 0.01;

/// 柔軟性ティア。柔軟性が低いほど理想範囲を広く取る
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Flexibility {
    Low,
    #[default]
    Medium,
    High,
}

impl Flexibility {
    /// 片側の拡張幅（度）
    pub fn margin(&self) -> f64 {
        match self {
            Flexibility::Low => 10.0,
            Flexibility::Medium => 7.0,
            Flexibility::High => 5.0,
        }
    }

    /// カタログの範囲を対称に広げる
    pub fn personalize(&self, range: AngleRange, kind: MetricKind) -> AngleRange {
        let margin = match kind {
            MetricKind::Angle => self.margin(),
            MetricKind::Ratio => self.margin() * RATIO_MARGIN_SCALE,
        };
        range.widen(margin)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Flexibility::Low => "low",
            Flexibility::Medium => "medium",
            Flexibility::High => "high",
        }
    }
}

impl fmt::Display for Flexibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Flexibility {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Flexibility::Low),
            "medium" => Ok(Flexibility::Medium),
            "high" => Ok(Flexibility::High),
            other => anyhow::bail!("Unknown flexibility tier: {}", other),
        }
    }
}
