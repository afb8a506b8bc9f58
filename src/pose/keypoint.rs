use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// MoveNet の 17 関節名
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(usize)]
pub enum Joint {
    Nose = 0,
    LeftEye = 1,
    RightEye = 2,
    LeftEar = 3,
    RightEar = 4,
    LeftShoulder = 5,
    RightShoulder = 6,
    LeftElbow = 7,
    RightElbow = 8,
    LeftWrist = 9,
    RightWrist = 10,
    LeftHip = 11,
    RightHip = 12,
    LeftKnee = 13,
    RightKnee = 14,
    LeftAnkle = 15,
    RightAnkle = 16,
}

impl Joint {
    pub const COUNT: usize = 17;

    pub const ALL: [Joint; Joint::COUNT] = [
        Joint::Nose,
        Joint::LeftEye,
        Joint::RightEye,
        Joint::LeftEar,
        Joint::RightEar,
        Joint::LeftShoulder,
        Joint::RightShoulder,
        Joint::LeftElbow,
        Joint::RightElbow,
        Joint::LeftWrist,
        Joint::RightWrist,
        Joint::LeftHip,
        Joint::RightHip,
        Joint::LeftKnee,
        Joint::RightKnee,
        Joint::LeftAnkle,
        Joint::RightAnkle,
    ];

    /// モデル出力のインデックスから変換
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Joint::Nose => "nose",
            Joint::LeftEye => "left_eye",
            Joint::RightEye => "right_eye",
            Joint::LeftEar => "left_ear",
            Joint::RightEar => "right_ear",
            Joint::LeftShoulder => "left_shoulder",
            Joint::RightShoulder => "right_shoulder",
            Joint::LeftElbow => "left_elbow",
            Joint::RightElbow => "right_elbow",
            Joint::LeftWrist => "left_wrist",
            Joint::RightWrist => "right_wrist",
            Joint::LeftHip => "left_hip",
            Joint::RightHip => "right_hip",
            Joint::LeftKnee => "left_knee",
            Joint::RightKnee => "right_knee",
            Joint::LeftAnkle => "left_ankle",
            Joint::RightAnkle => "right_ankle",
        }
    }
}

impl fmt::Display for Joint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 単一関節の2D座標
///
/// 奥行きは扱わない。信頼度は上流の検出器が閾値判定に使うだけで、
/// 解析側では保持して引き回すのみ。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointPoint {
    /// X座標（画像座標、右が正）
    pub x: f64,
    /// Y座標（画像座標、下が正）
    pub y: f64,
    /// 信頼度スコア (0.0〜1.0)
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 { 1.0 }

impl JointPoint {
    pub fn new(x: f64, y: f64, confidence: f64) -> Self {
        Self { x, y, confidence }
    }

    pub fn position(&self) -> Point2<f64> {
        Point2::new(self.x, self.y)
    }
}

/// 検出器が「見えている」と判断した関節だけを持つ姿勢
///
/// キーが無い関節は「不明」であり、0座標として補完してはならない。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoseSnapshot {
    joints: BTreeMap<Joint, JointPoint>,
}

impl PoseSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// 関節を追加（ビルダー形式）
    pub fn with(mut self, joint: Joint, point: JointPoint) -> Self {
        self.joints.insert(joint, point);
        self
    }

    pub fn insert(&mut self, joint: Joint, point: JointPoint) {
        self.joints.insert(joint, point);
    }

    pub fn remove(&mut self, joint: Joint) -> Option<JointPoint> {
        self.joints.remove(&joint)
    }

    pub fn get(&self, joint: Joint) -> Option<&JointPoint> {
        self.joints.get(&joint)
    }

    /// 関節の位置（無ければ None）
    pub fn point(&self, joint: Joint) -> Option<Point2<f64>> {
        self.get(joint).map(JointPoint::position)
    }

    pub fn contains(&self, joint: Joint) -> bool {
        self.joints.contains_key(&joint)
    }

    /// 見えている関節数
    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Joint, &JointPoint)> {
        self.joints.iter().map(|(joint, point)| (*joint, point))
    }
}

impl FromIterator<(Joint, JointPoint)> for PoseSnapshot {
    fn from_iter<I: IntoIterator<Item = (Joint, JointPoint)>>(iter: I) -> Self {
        Self {
            joints: iter.into_iter().collect(),
        }
    }
}

/// 肩と腰は角度計算の土台なので、どれか欠けたら「姿勢なし」とする
pub const ANCHOR_JOINTS: [Joint; 4] = [
    Joint::LeftShoulder,
    Joint::RightShoulder,
    Joint::LeftHip,
    Joint::RightHip,
];

/// 検出器の生出力 (x, y, confidence)、座標は 0.0〜1.0
pub type RawKeypoints = [(f32, f32, f32); Joint::COUNT];

/// 正規化キーポイントを閾値で絞り込み、ピクセル座標のスナップショットにする
///
/// ピクセル座標にしないと非正方形フレームで角度が歪む。
pub fn gate_keypoints(
    raw: &RawKeypoints,
    confidence_threshold: f64,
    min_joints: usize,
    width: u32,
    height: u32,
) -> Option<PoseSnapshot> {
    let snapshot: PoseSnapshot = raw
        .iter()
        .enumerate()
        .filter_map(|(i, &(x, y, confidence))| {
            let joint = Joint::from_index(i)?;
            let confidence = f64::from(confidence);
            if confidence < confidence_threshold {
                return None;
            }
            let px = f64::from(x) * f64::from(width);
            let py = f64::from(y) * f64::from(height);
            Some((joint, JointPoint::new(px, py, confidence)))
        })
        .collect();

    if !ANCHOR_JOINTS.iter().all(|&j| snapshot.contains(j)) {
        debug!(visible = snapshot.len(), "shoulders or hips not visible");
        return None;
    }
    if snapshot.len() < min_joints {
        debug!(visible = snapshot.len(), min = min_joints, "too few reliable joints");
        return None;
    }
    Some(snapshot)
}
