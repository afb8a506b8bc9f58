//! 解析パイプラインのエラー型

use thiserror::Error;

use crate::metrics::MetricSet;

/// 解析の終端結果のうち、レポートを返せないもの
///
/// 未定義の指標や `Unknown` ラベルはエラーではない。
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// 上流の検出器が姿勢を見つけられなかった
    #[error("no pose detected")]
    NoPoseDetected,

    /// 姿勢はあるが、指標を計算するには関節が少なすぎる
    #[error("insufficient landmarks: {visible} joints visible, {} metrics computable", metrics.defined_count())]
    InsufficientLandmarks {
        /// 見えていた関節数
        visible: usize,
        /// 計算できた分の指標（大半は未定義）
        metrics: MetricSet,
    },

    /// 検出器そのものが失敗した（モデル・画像デコードなど）
    #[error("pose detection failed: {0}")]
    Detection(String),
}

impl AnalysisError {
    /// 外部出力用の短い識別子
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::NoPoseDetected => "no_pose_detected",
            AnalysisError::InsufficientLandmarks { .. } => "insufficient_landmarks",
            AnalysisError::Detection(_) => "detection_failed",
        }
    }
}

/// 外部カタログ・知識テーブルの読み込み失敗
///
/// 呼び出し側には伝播せず、組み込みのデフォルトに戻すために使う。
#[derive(Debug, Error)]
pub enum CatalogueError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid catalogue: {0}")]
    Invalid(String),
}
