use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::warn;

use crate::flexibility::Flexibility;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    /// 柔軟性ティア (low / medium / high)
    #[serde(default)]
    pub flexibility: Flexibility,
    /// これ未満の関節数は InsufficientLandmarks
    #[serde(default = "default_min_visible_joints")]
    pub min_visible_joints: usize,
    /// 姿勢カタログ (JSON)。未指定なら組み込み
    #[serde(default)]
    pub catalogue_path: Option<String>,
    /// 知識テーブル (JSON)。未指定なら組み込み
    #[serde(default)]
    pub knowledge_path: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DetectorConfig {
    /// ONNXモデルのパス
    #[serde(default = "default_model_path")]
    pub model_path: String,
    /// これ未満の信頼度の関節はスナップショットから除く
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// 信頼できる関節がこれ未満なら「姿勢なし」
    #[serde(default = "default_min_joints")]
    pub min_joints: usize,
}

fn default_min_visible_joints() -> usize { 4 }
fn default_model_path() -> String { "models/movenet_lightning.onnx".to_string() }
fn default_confidence_threshold() -> f64 { 0.3 }
fn default_min_joints() -> usize { 8 }

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            flexibility: Flexibility::default(),
            min_visible_joints: default_min_visible_joints(),
            catalogue_path: None,
            knowledge_path: None,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            confidence_threshold: default_confidence_threshold(),
            min_joints: default_min_joints(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content).context("Failed to parse config")?;
        Ok(config)
    }

    /// ファイルが無い・壊れている場合はデフォルト
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{:#}", e), "using default config");
                Self::default()
            }
        }
    }
}
