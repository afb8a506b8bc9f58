//! 姿勢分類器
//!
//! 1. 優先順位付きのヒューリスティック述語を順に評価し、最初に一致したものを採用
//! 2. どれにも一致しなければ、カタログの範囲からの平均逸脱で最も近い姿勢を選ぶ

use serde::{Serialize, Serializer};
use std::fmt;
use tracing::debug;

use crate::catalogue::{
    Catalogue, CompositeOutcome, CompositeRule, PostureDefinition, DOWNWARD_DOG, KNEES_COMBO, TADASANA, TRIKONASANA,
    WARRIOR_II,
};
use crate::metrics::{Metric, MetricSet};

pub const UNKNOWN_LABEL: &str = "Unknown";

/// どの姿勢とも判断できなかった場合の信頼度
const UNKNOWN_CONFIDENCE: f64 = 0.2;
/// 近似マッチの信頼度の下限・上限
const SOFT_MATCH_FLOOR: f64 = 0.3;
const SOFT_MATCH_CEILING: f64 = 0.8;
/// 平均逸脱（度）をスコアに変換するスケール
const SOFT_MATCH_SCALE: f64 = 50.0;

/// 分類ラベル。カタログ名か Unknown のどちらか
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostureLabel {
    Posture(String),
    Unknown,
}

impl PostureLabel {
    pub fn as_str(&self) -> &str {
        match self {
            PostureLabel::Posture(name) => name,
            PostureLabel::Unknown => UNKNOWN_LABEL,
        }
    }

    /// Unknown なら None
    pub fn posture(&self) -> Option<&str> {
        match self {
            PostureLabel::Posture(name) => Some(name),
            PostureLabel::Unknown => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, PostureLabel::Unknown)
    }
}

impl fmt::Display for PostureLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for PostureLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// ラベルを決めた経路
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Heuristic,
    SoftMatch,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub label: PostureLabel,
    /// 0.0〜1.0（確率ではなく一致の強さ）
    pub confidence: f64,
    pub matched_by: MatchKind,
}

impl Classification {
    fn unknown() -> Self {
        Self {
            label: PostureLabel::Unknown,
            confidence: UNKNOWN_CONFIDENCE,
            matched_by: MatchKind::None,
        }
    }
}

/// 述語とスコア関数の組
///
/// 述語はカタログの範囲から自動生成せず、姿勢ごとに手で書いた閾値の論理積。
/// 複合ルールだけはカタログ側のエントリ（第2引数）から読む。
#[derive(Clone)]
pub struct Heuristic {
    pub posture: &'static str,
    pub predicate: fn(&MetricSet, &PostureDefinition) -> bool,
    pub scorer: fn(&MetricSet, &PostureDefinition) -> Option<f64>,
}

impl fmt::Debug for Heuristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heuristic").field("posture", &self.posture).finish()
    }
}

fn within(m: &MetricSet, metric: Metric, low: f64, high: f64) -> bool {
    m.get(metric).is_some_and(|v| low <= v && v <= high)
}

fn at_least(m: &MetricSet, metric: Metric, min: f64) -> bool {
    m.get(metric).is_some_and(|v| v >= min)
}

fn at_most(m: &MetricSet, metric: Metric, max: f64) -> bool {
    m.get(metric).is_some_and(|v| v <= max)
}

fn greater_than(m: &MetricSet, metric: Metric, min: f64) -> bool {
    m.get(metric).is_some_and(|v| v > min)
}

/// 理想中心からのずれを 1 − |dev|/100 で信頼度にし、[floor, ceiling] に収める
fn centered_confidence(deviation: f64, floor: f64, ceiling: f64) -> f64 {
    ((100.0 - deviation.abs()) / 100.0).clamp(floor, ceiling)
}

fn knees_straight(m: &MetricSet) -> bool {
    at_least(m, Metric::LeftKnee, 165.0) && at_least(m, Metric::RightKnee, 165.0)
}

fn limbs_straight(m: &MetricSet) -> bool {
    knees_straight(m) && at_least(m, Metric::LeftElbow, 165.0) && at_least(m, Metric::RightElbow, 165.0)
}

/// カタログ側の knees_combo。エントリに無ければ組み込みの閾値
fn knees_combo(m: &MetricSet, posture: &PostureDefinition) -> CompositeOutcome {
    match posture.composite_rules.iter().find(|r| r.name() == KNEES_COMBO) {
        Some(rule) => rule.evaluate(m),
        None => CompositeRule::knees_combo().evaluate(m),
    }
}

fn downward_dog_predicate(m: &MetricSet, _: &PostureDefinition) -> bool {
    within(m, Metric::LeftHip, 80.0, 110.0) && within(m, Metric::RightHip, 80.0, 110.0) && limbs_straight(m)
}

fn downward_dog_score(m: &MetricSet, _: &PostureDefinition) -> Option<f64> {
    let mean_hip = (m.get(Metric::LeftHip)? + m.get(Metric::RightHip)?) / 2.0;
    Some(centered_confidence(mean_hip - 95.0, 0.5, 0.95))
}

fn warrior_ii_predicate(m: &MetricSet, posture: &PostureDefinition) -> bool {
    knees_combo(m, posture).ok == Some(true)
        && within(m, Metric::LeftShoulder, 80.0, 110.0)
        && within(m, Metric::RightShoulder, 80.0, 110.0)
}

fn warrior_ii_score(m: &MetricSet, posture: &PostureDefinition) -> Option<f64> {
    let bent = knees_combo(m, posture).bent_side?;
    Some(centered_confidence(m.get(bent)? - 90.0, 0.5, 0.9))
}

fn tadasana_predicate(m: &MetricSet, _: &PostureDefinition) -> bool {
    limbs_straight(m)
        && at_most(m, Metric::TrunkFromVertical, 12.0)
        && at_most(m, Metric::AnkleToHipRatio, 0.5)
}

fn tadasana_score(m: &MetricSet, _: &PostureDefinition) -> Option<f64> {
    Some(centered_confidence(m.get(Metric::TrunkFromVertical)?, 0.4, 0.85))
}

/// 両脚まっすぐで体幹が横に倒れている
fn trikonasana_predicate(m: &MetricSet, _: &PostureDefinition) -> bool {
    knees_straight(m) && greater_than(m, Metric::TrunkFromVertical, 12.0)
}

fn trikonasana_score(m: &MetricSet, _: &PostureDefinition) -> Option<f64> {
    let mean_knee = (m.get(Metric::LeftKnee)? + m.get(Metric::RightKnee)?) / 2.0;
    Some(centered_confidence(mean_knee - 180.0, 0.6, 0.8))
}

/// 組み込みのカスケード
///
/// 幾何的に紛れにくいものから順に並べる（股関節90°は「全部まっすぐ」より識別しやすい）。
pub fn default_heuristics() -> Vec<Heuristic> {
    vec![
        Heuristic {
            posture: DOWNWARD_DOG,
            predicate: downward_dog_predicate,
            scorer: downward_dog_score,
        },
        Heuristic {
            posture: WARRIOR_II,
            predicate: warrior_ii_predicate,
            scorer: warrior_ii_score,
        },
        Heuristic {
            posture: TADASANA,
            predicate: tadasana_predicate,
            scorer: tadasana_score,
        },
        Heuristic {
            posture: TRIKONASANA,
            predicate: trikonasana_predicate,
            scorer: trikonasana_score,
        },
    ]
}

#[derive(Debug, Clone)]
pub struct Classifier {
    heuristics: Vec<Heuristic>,
}

impl Classifier {
    pub fn new() -> Self {
        Self::with_heuristics(default_heuristics())
    }

    pub fn with_heuristics(heuristics: Vec<Heuristic>) -> Self {
        Self { heuristics }
    }

    pub fn classify(&self, metrics: &MetricSet, catalogue: &Catalogue) -> Classification {
        for heuristic in &self.heuristics {
            // カタログに無い姿勢名は返さない
            let Some(posture) = catalogue.get(heuristic.posture) else {
                continue;
            };
            if !(heuristic.predicate)(metrics, posture) {
                continue;
            }
            if let Some(confidence) = (heuristic.scorer)(metrics, posture) {
                debug!(posture = heuristic.posture, confidence, "heuristic match");
                return Classification {
                    label: PostureLabel::Posture(heuristic.posture.to_string()),
                    confidence: confidence.clamp(0.0, 1.0),
                    matched_by: MatchKind::Heuristic,
                };
            }
        }
        self.soft_match(metrics, catalogue)
    }

    /// 範囲外への逸脱の平均が最も小さい姿勢を選ぶ
    ///
    /// 未定義の指標は分子・分母ともに除外する。同点は宣言順で先のものが勝つ。
    fn soft_match(&self, metrics: &MetricSet, catalogue: &Catalogue) -> Classification {
        let mut best: Option<(&str, f64)> = None;
        for posture in catalogue.iter() {
            let deviations: Vec<f64> = posture
                .ranges
                .iter()
                .filter_map(|(metric, range)| metrics.get(*metric).map(|v| range.deviation(v)))
                .collect();
            if deviations.is_empty() {
                continue;
            }
            let mean = deviations.iter().sum::<f64>() / deviations.len() as f64;
            let score = 1.0 / (1.0 + mean / SOFT_MATCH_SCALE);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((posture.name.as_str(), score));
            }
        }

        match best {
            Some((name, score)) => {
                debug!(posture = name, score, "soft match");
                Classification {
                    label: PostureLabel::Posture(name.to_string()),
                    confidence: score.clamp(SOFT_MATCH_FLOOR, SOFT_MATCH_CEILING),
                    matched_by: MatchKind::SoftMatch,
                }
            }
            None => {
                debug!("no evaluable metric for any posture");
                Classification::unknown()
            }
        }
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}
