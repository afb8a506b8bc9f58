use anyhow::{Context, Result};
use ndarray::Array4;
use opencv::{core::Mat, prelude::*};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;

use super::keypoint::{gate_keypoints, Joint, PoseSnapshot, RawKeypoints};
use super::preprocess::preprocess_for_movenet;
use super::source::PoseSource;
use crate::config::DetectorConfig;

/// MoveNet を使用した姿勢検出器
pub struct PoseDetector {
    session: Session,
    confidence_threshold: f64,
    min_joints: usize,
}

impl PoseDetector {
    /// ONNXモデルを読み込んで初期化
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        Self::from_config(model_path, &DetectorConfig::default())
    }

    pub fn from_config<P: AsRef<Path>>(model_path: P, config: &DetectorConfig) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(model_path.as_ref())
            .context("Failed to load ONNX model")?;

        Ok(Self {
            session,
            confidence_threshold: config.confidence_threshold,
            min_joints: config.min_joints,
        })
    }

    /// 前処理済みテンソルから正規化キーポイントを推論
    ///
    /// 入力: [1, 192, 192, 3] の f32 テンソル
    /// 出力: 17個の (x, y, confidence)、座標は 0.0〜1.0
    fn infer(&mut self, input: Array4<f32>) -> Result<RawKeypoints> {
        let input_tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs!["serving_default_input_0" => input_tensor])
            .context("Inference failed")?;

        // MoveNet の出力は [1, 1, 17, 3] (y, x, confidence)
        let output: ndarray::ArrayViewD<f32> = outputs["StatefulPartitionedCall_0"]
            .try_extract_array()
            .context("Failed to extract output tensor")?;

        let mut raw = [(0.0, 0.0, 0.0); Joint::COUNT];
        for (i, slot) in raw.iter_mut().enumerate() {
            let y = output[[0, 0, i, 0]];
            let x = output[[0, 0, i, 1]];
            let confidence = output[[0, 0, i, 2]];
            *slot = (x, y, confidence);
        }
        Ok(raw)
    }
}

impl PoseSource for PoseDetector {
    type Image = Mat;

    fn detect(&mut self, frame: &Mat) -> Result<Option<PoseSnapshot>> {
        if frame.empty() {
            return Ok(None);
        }
        let width = frame.cols().max(0) as u32;
        let height = frame.rows().max(0) as u32;

        let input = preprocess_for_movenet(frame)?;
        let raw = self.infer(input)?;
        Ok(gate_keypoints(&raw, self.confidence_threshold, self.min_joints, width, height))
    }
}
