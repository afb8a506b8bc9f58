//! 検証結果から修正メッセージとハイライト関節を作る

use serde::Serialize;
use std::collections::BTreeSet;

use crate::catalogue::{AngleRange, Catalogue, DOWNWARD_DOG, KNEES_COMBO, TADASANA, TRIKONASANA, WARRIOR_II};
use crate::classifier::PostureLabel;
use crate::knowledge::KnowledgeBase;
use crate::metrics::{Metric, MetricKind, MetricSet};
use crate::pose::Joint;
use crate::validation::ValidationResult;

/// 汎用アライメントチェックの許容傾き（度）
const LEVEL_TOLERANCE: f64 = 10.0;

const UNKNOWN_POSTURE_CUE: &str = "Hold a clear shape; stand tall and breathe evenly.";

/// 姿勢に関係なく評価するチェック。score はこれだけから計算する
struct GenericCheck {
    metric: Metric,
    max: f64,
    message: &'static str,
    joints: &'static [Joint],
}

const GENERIC_CHECKS: [GenericCheck; 2] = [
    GenericCheck {
        metric: Metric::ShoulderTilt,
        max: LEVEL_TOLERANCE,
        message: "Lengthen both sides of torso; keep chest open.",
        joints: &[Joint::LeftShoulder, Joint::RightShoulder],
    },
    GenericCheck {
        metric: Metric::HipTilt,
        max: LEVEL_TOLERANCE,
        message: "Level the pelvis; draw both hip points evenly forward.",
        joints: &[Joint::LeftHip, Joint::RightHip],
    },
];

/// 姿勢別の修正チェックが参照する検証項目
#[derive(Debug, Clone, Copy)]
enum CheckRef {
    Metric(Metric),
    /// どれか1つでも失敗したら1メッセージ
    AnyMetric(&'static [Metric]),
    Composite(&'static str),
}

/// 検証項目1つにつきメッセージ1つ
struct Cue {
    check: CheckRef,
    message: &'static str,
    joints: &'static [Joint],
}

const fn metric_cue(metric: Metric, message: &'static str, joints: &'static [Joint]) -> Cue {
    Cue { check: CheckRef::Metric(metric), message, joints }
}

const TADASANA_CUES: &[Cue] = &[
    metric_cue(
        Metric::TrunkFromVertical,
        "Stack ears over shoulders over hips; lengthen through crown.",
        &[Joint::LeftShoulder, Joint::RightShoulder, Joint::LeftHip, Joint::RightHip],
    ),
    metric_cue(Metric::LeftKnee, "Engage left quadriceps to fully extend the knee.", &[Joint::LeftKnee]),
    metric_cue(Metric::RightKnee, "Engage right quadriceps; lift kneecaps.", &[Joint::RightKnee]),
    metric_cue(
        Metric::AnkleToHipRatio,
        "Bring inner feet to touch or hip-width parallel.",
        &[Joint::LeftAnkle, Joint::RightAnkle],
    ),
];

const DOWNWARD_DOG_CUES: &[Cue] = &[
    metric_cue(Metric::LeftHip, "Lift hips to lengthen spine; aim for ~90° at hips.", &[Joint::LeftHip]),
    metric_cue(Metric::RightHip, "Pike more at hips; press thighs back.", &[Joint::RightHip]),
    metric_cue(Metric::LeftKnee, "Straighten left leg; press left heel toward mat.", &[Joint::LeftKnee]),
    metric_cue(Metric::RightKnee, "Straighten right leg; root right heel.", &[Joint::RightKnee]),
    metric_cue(
        Metric::LeftElbow,
        "Firm arms; externally rotate shoulders and spin triceps down.",
        &[Joint::LeftElbow],
    ),
    metric_cue(
        Metric::RightElbow,
        "Engage arms; wrap outer upper arms toward floor.",
        &[Joint::RightElbow],
    ),
];

const WARRIOR_II_CUES: &[Cue] = &[
    Cue {
        check: CheckRef::Composite(KNEES_COMBO),
        message: "Bend front knee to ~90° and straighten back leg.",
        joints: &[Joint::LeftKnee, Joint::RightKnee],
    },
    metric_cue(
        Metric::LeftShoulder,
        "Reach arms long; keep shoulders level and away from ears.",
        &[Joint::LeftShoulder, Joint::LeftElbow],
    ),
    metric_cue(
        Metric::RightShoulder,
        "Broaden collarbones; extend through fingertips.",
        &[Joint::RightShoulder, Joint::RightElbow],
    ),
];

const TRIKONASANA_CUES: &[Cue] = &[Cue {
    check: CheckRef::AnyMetric(&[Metric::LeftKnee, Metric::RightKnee]),
    message: "Lengthen both legs; avoid hyperextension in knees.",
    joints: &[Joint::LeftKnee, Joint::RightKnee],
}];

fn posture_cues(posture: &str) -> Option<&'static [Cue]> {
    match posture {
        TADASANA => Some(TADASANA_CUES),
        DOWNWARD_DOG => Some(DOWNWARD_DOG_CUES),
        WARRIOR_II => Some(WARRIOR_II_CUES),
        TRIKONASANA => Some(TRIKONASANA_CUES),
        _ => None,
    }
}

fn format_range(range: AngleRange, kind: MetricKind) -> String {
    match kind {
        MetricKind::Angle => format!("{:.0}°–{:.0}°", range.low, range.high),
        MetricKind::Ratio => format!("{:.2}–{:.2}", range.low, range.high),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeedbackReport {
    /// 汎用チェック → 姿勢別の修正 → Tip/Avoid/Effect の順
    pub messages: Vec<String>,
    pub highlight_joints: BTreeSet<Joint>,
    /// 評価できた汎用チェックの合否の平均。評価できるものが無ければ0.0
    pub score: f64,
}

#[derive(Default)]
struct ReportBuilder {
    report: FeedbackReport,
}

impl ReportBuilder {
    fn flag(&mut self, message: String, joints: &[Joint]) {
        self.report.messages.push(message);
        self.report.highlight_joints.extend(joints.iter().copied());
    }

    fn note(&mut self, message: String) {
        self.report.messages.push(message);
    }
}

pub struct FeedbackGenerator<'a> {
    catalogue: &'a Catalogue,
    knowledge: &'a KnowledgeBase,
}

impl<'a> FeedbackGenerator<'a> {
    pub fn new(catalogue: &'a Catalogue, knowledge: &'a KnowledgeBase) -> Self {
        Self { catalogue, knowledge }
    }

    pub fn generate(
        &self,
        label: &PostureLabel,
        metrics: &MetricSet,
        validation: &ValidationResult,
    ) -> FeedbackReport {
        let mut builder = ReportBuilder::default();

        builder.report.score = self.generic_checks(metrics, &mut builder);

        match label.posture() {
            None => builder.note(UNKNOWN_POSTURE_CUE.to_string()),
            Some(posture) => {
                match posture_cues(posture) {
                    Some(cues) => Self::posture_specific(cues, validation, &mut builder),
                    None => self.templated(posture, validation, &mut builder),
                }
                self.knowledge_cues(posture, &mut builder);
            }
        }

        builder.report
    }

    /// 汎用チェックを評価し、合否の平均を返す
    ///
    /// 未定義の指標は分子・分母の両方から除外する。
    fn generic_checks(&self, metrics: &MetricSet, builder: &mut ReportBuilder) -> f64 {
        let mut evaluated = 0usize;
        let mut passed = 0usize;
        for check in &GENERIC_CHECKS {
            let Some(value) = metrics.get(check.metric) else {
                continue;
            };
            evaluated += 1;
            if value <= check.max {
                passed += 1;
            } else {
                builder.flag(check.message.to_string(), check.joints);
            }
        }
        if evaluated == 0 {
            0.0
        } else {
            passed as f64 / evaluated as f64
        }
    }

    /// 固定のチェック順で、失敗した項目のメッセージを追加
    fn posture_specific(cues: &[Cue], validation: &ValidationResult, builder: &mut ReportBuilder) {
        for cue in cues {
            let failed = match cue.check {
                CheckRef::Metric(metric) => validation.metric(metric).is_some_and(|c| c.is_failing()),
                CheckRef::AnyMetric(metrics) => metrics
                    .iter()
                    .any(|&m| validation.metric(m).is_some_and(|c| c.is_failing())),
                CheckRef::Composite(name) => validation.composite(name).is_some_and(|c| c.ok == Some(false)),
            };
            if failed {
                builder.flag(cue.message.to_string(), cue.joints);
            }
        }
    }

    /// 専用の文言が無い姿勢は "Adjust {metric} toward ideal range {range}"
    fn templated(&self, posture: &str, validation: &ValidationResult, builder: &mut ReportBuilder) {
        for check in validation.failing() {
            let message = format!(
                "Adjust {} toward ideal range {}",
                check.metric.label(),
                format_range(check.range, check.metric.kind())
            );
            builder.flag(message, check.metric.focus_joints());
        }

        let rules = self.catalogue.get(posture).map(|p| p.composite_rules.as_slice()).unwrap_or_default();
        for outcome in validation.failing_composites() {
            match rules.iter().find(|r| r.name() == outcome.name) {
                Some(rule) => builder.flag(
                    format!("Adjust {}: {}", outcome.name.replace('_', " "), rule.describe()),
                    &rule.joints(),
                ),
                None => builder.note(format!("Adjust {}", outcome.name.replace('_', " "))),
            }
        }
    }

    /// 各カテゴリの先頭1件だけを追加
    fn knowledge_cues(&self, posture: &str, builder: &mut ReportBuilder) {
        let Some(info) = self.knowledge.get(posture) else {
            return;
        };
        if let Some(tip) = info.alignment.first() {
            builder.note(format!("Tip: {}", tip));
        }
        if let Some(mistake) = info.mistakes.first() {
            builder.note(format!("Avoid: {}", mistake));
        }
        if let Some(effect) = info.effects.first() {
            builder.note(format!("Effect: {}", effect));
        }
    }
}
