//! 理想範囲に対する指標ごとの検証

use serde::Serialize;
use tracing::debug;

use crate::catalogue::{AngleRange, Catalogue, CompositeOutcome};
use crate::classifier::PostureLabel;
use crate::flexibility::Flexibility;
use crate::metrics::{Metric, MetricSet};

/// 範囲のどちら側に外れたか
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Below,
    Above,
}

/// 1指標の検証結果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricCheck {
    pub metric: Metric,
    /// None = 未定義（関節欠損）
    pub value: Option<f64>,
    /// 柔軟性で広げた後の範囲
    pub range: AngleRange,
    /// 値が定義済みかつ範囲内
    pub ok: bool,
    /// 近い方の境界からの超過量。範囲内・未定義なら0、常に非負
    pub delta: f64,
    /// 外れた向き（delta の符号に相当）
    pub side: Option<Side>,
}

impl MetricCheck {
    pub fn evaluate(metric: Metric, value: Option<f64>, range: AngleRange) -> Self {
        let (ok, delta, side) = match value {
            None => (false, 0.0, None),
            Some(v) if v < range.low => (false, range.low - v, Some(Side::Below)),
            Some(v) if v > range.high => (false, v - range.high, Some(Side::Above)),
            Some(_) => (true, 0.0, None),
        };
        Self { metric, value, range, ok, delta, side }
    }

    /// 値が定義されていて判定に使えるか
    pub fn is_evaluable(&self) -> bool {
        self.value.is_some()
    }

    /// 評価可能かつ範囲外
    pub fn is_failing(&self) -> bool {
        self.is_evaluable() && !self.ok
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationResult {
    /// カタログの宣言順（指標順）
    pub metrics: Vec<MetricCheck>,
    /// 複合ルールは指標マップに混ぜず別に持つ
    pub composites: Vec<CompositeOutcome>,
}

impl ValidationResult {
    pub fn metric(&self, metric: Metric) -> Option<&MetricCheck> {
        self.metrics.iter().find(|c| c.metric == metric)
    }

    pub fn composite(&self, name: &str) -> Option<&CompositeOutcome> {
        self.composites.iter().find(|c| c.name == name)
    }

    /// 評価可能で失敗した指標
    pub fn failing(&self) -> impl Iterator<Item = &MetricCheck> {
        self.metrics.iter().filter(|c| c.is_failing())
    }

    /// 評価可能で失敗した複合ルール
    pub fn failing_composites(&self) -> impl Iterator<Item = &CompositeOutcome> {
        self.composites.iter().filter(|c| c.ok == Some(false))
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty() && self.composites.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Validator {
    flexibility: Flexibility,
}

impl Validator {
    pub fn new(flexibility: Flexibility) -> Self {
        Self { flexibility }
    }

    pub fn flexibility(&self) -> Flexibility {
        self.flexibility
    }

    /// Unknown やカタログに無い姿勢は空の結果（比べる基準が無い）
    pub fn validate(
        &self,
        label: &PostureLabel,
        metrics: &MetricSet,
        catalogue: &Catalogue,
    ) -> ValidationResult {
        let Some(posture) = label.posture().and_then(|name| catalogue.get(name)) else {
            return ValidationResult::default();
        };

        let checks: Vec<MetricCheck> = posture
            .ranges
            .iter()
            .map(|(&metric, &base)| {
                let range = self.flexibility.personalize(base, metric.kind());
                MetricCheck::evaluate(metric, metrics.get(metric), range)
            })
            .collect();
        let composites: Vec<CompositeOutcome> = posture
            .composite_rules
            .iter()
            .map(|rule| rule.evaluate(metrics))
            .collect();

        let result = ValidationResult { metrics: checks, composites };
        debug!(
            posture = %label,
            flexibility = %self.flexibility,
            failing = result.failing().count(),
            "validated"
        );
        result
    }
}
