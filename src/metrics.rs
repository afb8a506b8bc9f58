use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

use crate::geometry::{
    angle_at_vertex, distance, line_angle_from_vertical, line_tilt_from_horizontal, midpoint,
};
use crate::pose::{Joint, PoseSnapshot};

/// 指標の単位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// 角度（度）
    Angle,
    /// 無次元の比
    Ratio,
}

/// 関節マップから導出するスカラー指標
///
/// カタログ・分類器・検証器が共有する固定語彙。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(usize)]
pub enum Metric {
    LeftElbow = 0,
    RightElbow = 1,
    LeftKnee = 2,
    RightKnee = 3,
    LeftHip = 4,
    RightHip = 5,
    LeftShoulder = 6,
    RightShoulder = 7,
    TrunkFromVertical = 8,
    AnkleToHipRatio = 9,
    ShoulderTilt = 10,
    HipTilt = 11,
}

impl Metric {
    pub const COUNT: usize = 12;

    pub const ALL: [Metric; Metric::COUNT] = [
        Metric::LeftElbow,
        Metric::RightElbow,
        Metric::LeftKnee,
        Metric::RightKnee,
        Metric::LeftHip,
        Metric::RightHip,
        Metric::LeftShoulder,
        Metric::RightShoulder,
        Metric::TrunkFromVertical,
        Metric::AnkleToHipRatio,
        Metric::ShoulderTilt,
        Metric::HipTilt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::LeftElbow => "left_elbow",
            Metric::RightElbow => "right_elbow",
            Metric::LeftKnee => "left_knee",
            Metric::RightKnee => "right_knee",
            Metric::LeftHip => "left_hip",
            Metric::RightHip => "right_hip",
            Metric::LeftShoulder => "left_shoulder",
            Metric::RightShoulder => "right_shoulder",
            Metric::TrunkFromVertical => "trunk_from_vertical",
            Metric::AnkleToHipRatio => "ankle_to_hip_ratio",
            Metric::ShoulderTilt => "shoulder_tilt",
            Metric::HipTilt => "hip_tilt",
        }
    }

    /// 表示用の名前（"left knee" など）
    pub fn label(&self) -> String {
        self.as_str().replace('_', " ")
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            Metric::AnkleToHipRatio => MetricKind::Ratio,
            _ => MetricKind::Angle,
        }
    }

    /// ハイライト用の代表関節（角度の頂点）
    pub fn focus_joints(&self) -> &'static [Joint] {
        use Joint::*;
        match self {
            Metric::LeftElbow => &[LeftElbow],
            Metric::RightElbow => &[RightElbow],
            Metric::LeftKnee => &[LeftKnee],
            Metric::RightKnee => &[RightKnee],
            Metric::LeftHip => &[LeftHip],
            Metric::RightHip => &[RightHip],
            Metric::LeftShoulder => &[LeftShoulder],
            Metric::RightShoulder => &[RightShoulder],
            Metric::TrunkFromVertical => &[LeftShoulder, RightShoulder],
            Metric::AnkleToHipRatio => &[LeftAnkle, RightAnkle],
            Metric::ShoulderTilt => &[LeftShoulder, RightShoulder],
            Metric::HipTilt => &[LeftHip, RightHip],
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 指標ごとの値。None は「関節が欠けていて未定義」
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricSet {
    values: [Option<f64>; Metric::COUNT],
}

impl MetricSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// (指標, 値) の列から作成。列に無い指標は未定義
    pub fn from_values<I: IntoIterator<Item = (Metric, f64)>>(values: I) -> Self {
        let mut set = Self::new();
        for (metric, value) in values {
            set.set(metric, Some(value));
        }
        set
    }

    pub fn get(&self, metric: Metric) -> Option<f64> {
        self.values[metric as usize]
    }

    /// 非有限値は未定義として扱う
    pub fn set(&mut self, metric: Metric, value: Option<f64>) {
        self.values[metric as usize] = value.filter(|v| v.is_finite());
    }

    pub fn iter(&self) -> impl Iterator<Item = (Metric, Option<f64>)> + '_ {
        Metric::ALL.iter().map(move |&m| (m, self.get(m)))
    }

    /// 定義済みの指標数
    pub fn defined_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }
}

impl Serialize for MetricSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Metric::COUNT))?;
        for (metric, value) in self.iter() {
            map.serialize_entry(metric.as_str(), &value)?;
        }
        map.end()
    }
}

/// 関節マップから全指標を計算
///
/// 必要な関節が1つでも欠けた指標は未定義のまま。0などで埋めない。
pub fn extract(snapshot: &PoseSnapshot) -> MetricSet {
    let mut set = MetricSet::new();
    for metric in Metric::ALL {
        set.set(metric, compute(snapshot, metric));
    }
    set
}

fn compute(snapshot: &PoseSnapshot, metric: Metric) -> Option<f64> {
    use Joint::*;
    let angle = |a: Joint, b: Joint, c: Joint| {
        angle_at_vertex(snapshot.point(a)?, snapshot.point(b)?, snapshot.point(c)?)
    };
    match metric {
        Metric::LeftElbow => angle(LeftShoulder, LeftElbow, LeftWrist),
        Metric::RightElbow => angle(RightShoulder, RightElbow, RightWrist),
        Metric::LeftKnee => angle(LeftHip, LeftKnee, LeftAnkle),
        Metric::RightKnee => angle(RightHip, RightKnee, RightAnkle),
        Metric::LeftHip => angle(LeftShoulder, LeftHip, LeftKnee),
        Metric::RightHip => angle(RightShoulder, RightHip, RightKnee),
        Metric::LeftShoulder => angle(LeftElbow, LeftShoulder, LeftHip),
        Metric::RightShoulder => angle(RightElbow, RightShoulder, RightHip),
        Metric::TrunkFromVertical => trunk_from_vertical(snapshot),
        Metric::AnkleToHipRatio => ankle_to_hip_ratio(snapshot),
        Metric::ShoulderTilt => {
            line_tilt_from_horizontal(snapshot.point(LeftShoulder)?, snapshot.point(RightShoulder)?)
        }
        Metric::HipTilt => {
            line_tilt_from_horizontal(snapshot.point(LeftHip)?, snapshot.point(RightHip)?)
        }
    }
}

/// 腰中点→肩中点ベクトルの鉛直からの傾き（0 = 直立）
fn trunk_from_vertical(snapshot: &PoseSnapshot) -> Option<f64> {
    let mid_shoulder = midpoint(
        snapshot.point(Joint::LeftShoulder)?,
        snapshot.point(Joint::RightShoulder)?,
    );
    let mid_hip = midpoint(snapshot.point(Joint::LeftHip)?, snapshot.point(Joint::RightHip)?);
    line_angle_from_vertical(mid_hip, mid_shoulder)
}

/// 足首間距離 / 腰幅（スタンス幅の代理指標）
fn ankle_to_hip_ratio(snapshot: &PoseSnapshot) -> Option<f64> {
    let hip_width = distance(snapshot.point(Joint::LeftHip)?, snapshot.point(Joint::RightHip)?);
    if hip_width == 0.0 {
        return None;
    }
    let ankle_width = distance(
        snapshot.point(Joint::LeftAnkle)?,
        snapshot.point(Joint::RightAnkle)?,
    );
    Some(ankle_width / hip_width)
}
