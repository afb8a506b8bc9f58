//! 姿勢スナップショット → 指標 → 分類 → 検証 → フィードバック
//!
//! 呼び出し間で状態を持たない。カタログと知識テーブルは読み取り専用なので
//! 1つの `Analyzer` を複数スレッドから同時に使ってよい。

use serde::Serialize;
use std::collections::BTreeSet;
use tracing::debug;

use crate::catalogue::Catalogue;
use crate::classifier::{Classifier, MatchKind, PostureLabel};
use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::feedback::FeedbackGenerator;
use crate::flexibility::Flexibility;
use crate::knowledge::KnowledgeBase;
use crate::metrics::{self, MetricSet};
use crate::pose::{Joint, PoseSnapshot, PoseSource};
use crate::validation::{ValidationResult, Validator};

/// 表示・送信側に渡す解析結果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub label: PostureLabel,
    pub confidence: f64,
    pub matched_by: MatchKind,
    pub flexibility: Flexibility,
    pub metrics: MetricSet,
    pub validation: ValidationResult,
    pub messages: Vec<String>,
    pub highlight_joints: BTreeSet<Joint>,
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct Analyzer {
    catalogue: Catalogue,
    knowledge: KnowledgeBase,
    classifier: Classifier,
    validator: Validator,
    min_visible_joints: usize,
}

impl Analyzer {
    pub fn new(catalogue: Catalogue, knowledge: KnowledgeBase, flexibility: Flexibility) -> Self {
        Self {
            catalogue,
            knowledge,
            classifier: Classifier::new(),
            validator: Validator::new(flexibility),
            min_visible_joints: AnalysisConfig::default().min_visible_joints,
        }
    }

    /// 設定から作成。外部カタログ・知識テーブルが読めなければ組み込みを使う
    pub fn from_config(config: &AnalysisConfig) -> Self {
        let catalogue = Catalogue::load_or_default(config.catalogue_path.as_deref());
        let knowledge = KnowledgeBase::load_or_default(config.knowledge_path.as_deref());
        Self::new(catalogue, knowledge, config.flexibility)
            .with_min_visible_joints(config.min_visible_joints)
    }

    pub fn with_flexibility(mut self, flexibility: Flexibility) -> Self {
        self.validator = Validator::new(flexibility);
        self
    }

    pub fn with_min_visible_joints(mut self, min: usize) -> Self {
        self.min_visible_joints = min;
        self
    }

    pub fn catalogue(&self) -> &Catalogue {
        &self.catalogue
    }

    pub fn flexibility(&self) -> Flexibility {
        self.validator.flexibility()
    }

    /// 検出結果（None = 姿勢なし）を解析
    pub fn analyze_detection(&self, detection: Option<&PoseSnapshot>) -> Result<AnalysisReport, AnalysisError> {
        match detection {
            Some(snapshot) => self.analyze(snapshot),
            None => Err(AnalysisError::NoPoseDetected),
        }
    }

    /// 画像を検出器に通してから解析
    pub fn analyze_source<S: PoseSource>(
        &self,
        source: &mut S,
        image: &S::Image,
    ) -> Result<AnalysisReport, AnalysisError> {
        let detection = source
            .detect(image)
            .map_err(|e| AnalysisError::Detection(format!("{:#}", e)))?;
        self.analyze_detection(detection.as_ref())
    }

    pub fn analyze(&self, snapshot: &PoseSnapshot) -> Result<AnalysisReport, AnalysisError> {
        let metrics = metrics::extract(snapshot);
        if snapshot.len() < self.min_visible_joints || metrics.defined_count() == 0 {
            debug!(visible = snapshot.len(), defined = metrics.defined_count(), "insufficient landmarks");
            return Err(AnalysisError::InsufficientLandmarks {
                visible: snapshot.len(),
                metrics,
            });
        }

        let classification = self.classifier.classify(&metrics, &self.catalogue);
        let validation = self.validator.validate(&classification.label, &metrics, &self.catalogue);
        let feedback = FeedbackGenerator::new(&self.catalogue, &self.knowledge).generate(
            &classification.label,
            &metrics,
            &validation,
        );

        debug!(
            label = %classification.label,
            confidence = classification.confidence,
            messages = feedback.messages.len(),
            score = feedback.score,
            "analysis complete"
        );

        Ok(AnalysisReport {
            label: classification.label,
            confidence: classification.confidence,
            matched_by: classification.matched_by,
            flexibility: self.validator.flexibility(),
            metrics,
            validation,
            messages: feedback.messages,
            highlight_joints: feedback.highlight_joints,
            score: feedback.score,
        })
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new(Catalogue::built_in(), KnowledgeBase::built_in(), Flexibility::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::{DOWNWARD_DOG, TADASANA, WARRIOR_II};
    use crate::metrics::Metric;
    use crate::pose::{JointPoint, StaticSource};
    use Joint::*;

    type P = (f64, f64);

    /// 画像座標で、数学的な角度（反時計回り・上が正）の方向へ len 進んだ点
    fn toward(from: P, deg: f64, len: f64) -> P {
        let rad = deg.to_radians();
        (from.0 + len * rad.cos(), from.1 - len * rad.sin())
    }

    /// 画像座標の p1→p2 の数学的な角度
    fn direction(p1: P, p2: P) -> f64 {
        f64::atan2(-(p2.1 - p1.1), p2.0 - p1.0).to_degrees()
    }

    fn snapshot(points: &[(Joint, P)]) -> PoseSnapshot {
        points.iter().map(|&(j, (x, y))| (j, JointPoint::new(x, y, 0.9))).collect()
    }

    fn mirror(p: P) -> P {
        (200.0 - p.0, p.1)
    }

    /// 直立: 膝・肘・股関節 ≈180°、体幹 ≈0°、足首/腰幅 ≈0.1
    fn standing() -> PoseSnapshot {
        let shoulder = (84.6, 50.0);
        let elbow = (84.6, 80.0);
        let wrist = (84.6, 110.0);
        let hip = (90.0, 110.0);
        let knee = (94.5, 160.0);
        let ankle = (99.0, 210.0);
        snapshot(&[
            (Nose, (100.0, 20.0)),
            (LeftShoulder, shoulder),
            (RightShoulder, mirror(shoulder)),
            (LeftElbow, elbow),
            (RightElbow, mirror(elbow)),
            (LeftWrist, wrist),
            (RightWrist, mirror(wrist)),
            (LeftHip, hip),
            (RightHip, mirror(hip)),
            (LeftKnee, knee),
            (RightKnee, mirror(knee)),
            (LeftAnkle, ankle),
            (RightAnkle, mirror(ankle)),
        ])
    }

    /// 横から見た逆V字: 股関節 ≈95°、膝・肘はまっすぐ
    fn downward_dog() -> PoseSnapshot {
        let hip = (100.0, 50.0);
        let knee = toward(hip, -60.0, 50.0);
        let ankle = toward(knee, -60.0, 50.0);
        let shoulder = toward(hip, -155.0, 60.0);
        let elbow = toward(shoulder, -155.0, 30.0);
        let wrist = toward(elbow, -155.0, 30.0);
        let shift = |p: P| (p.0 + 4.0, p.1);
        snapshot(&[
            (LeftHip, hip),
            (RightHip, shift(hip)),
            (LeftKnee, knee),
            (RightKnee, shift(knee)),
            (LeftAnkle, ankle),
            (RightAnkle, shift(ankle)),
            (LeftShoulder, shoulder),
            (RightShoulder, shift(shoulder)),
            (LeftElbow, elbow),
            (RightElbow, shift(elbow)),
            (LeftWrist, wrist),
            (RightWrist, shift(wrist)),
        ])
    }

    /// 左膝 ≈90°、右膝 ≈178°、両肩 ≈95°
    fn warrior_ii() -> PoseSnapshot {
        let ls = (80.0, 50.0);
        let rs = (120.0, 50.0);
        let lh = (90.0, 110.0);
        let rh = (110.0, 110.0);

        let left_arm = direction(ls, lh) - 95.0;
        let right_arm = direction(rs, rh) + 95.0;
        let le = toward(ls, left_arm, 30.0);
        let lw = toward(le, left_arm, 30.0);
        let re = toward(rs, right_arm, 30.0);
        let rw = toward(re, right_arm, 30.0);

        let lk = (50.0, 110.0);
        let la = (50.0, 160.0);
        let rk = toward(rh, -60.0, 50.0);
        let ra = toward(rk, -58.0, 50.0);

        snapshot(&[
            (LeftShoulder, ls),
            (RightShoulder, rs),
            (LeftElbow, le),
            (RightElbow, re),
            (LeftWrist, lw),
            (RightWrist, rw),
            (LeftHip, lh),
            (RightHip, rh),
            (LeftKnee, lk),
            (RightKnee, rk),
            (LeftAnkle, la),
            (RightAnkle, ra),
        ])
    }

    #[test]
    fn test_fixture_angles() {
        let m = metrics::extract(&warrior_ii());
        assert!((m.get(Metric::LeftKnee).unwrap() - 90.0).abs() < 1e-6);
        assert!((m.get(Metric::RightKnee).unwrap() - 178.0).abs() < 1e-6);
        assert!((m.get(Metric::LeftShoulder).unwrap() - 95.0).abs() < 1e-6);
        assert!((m.get(Metric::RightShoulder).unwrap() - 95.0).abs() < 1e-6);

        let m = metrics::extract(&downward_dog());
        assert!((m.get(Metric::LeftHip).unwrap() - 95.0).abs() < 1e-6);
        assert!((m.get(Metric::RightElbow).unwrap() - 180.0).abs() < 1e-6);

        let m = metrics::extract(&standing());
        assert!((m.get(Metric::AnkleToHipRatio).unwrap() - 0.1).abs() < 1e-9);
        assert!((m.get(Metric::LeftHip).unwrap() - 180.0).abs() < 1e-6);
    }

    #[test]
    fn test_scenario_standing() {
        let report = Analyzer::default().analyze(&standing()).unwrap();
        assert_eq!(report.label.as_str(), TADASANA);
        assert!(report.confidence >= 0.7);
        assert_eq!(report.validation.failing().count(), 0);
        assert_eq!(report.validation.metrics.len(), 8);
        assert!(report.validation.metrics.iter().all(|c| c.ok));
        assert!(report.highlight_joints.is_empty());
        assert_eq!(report.score, 1.0);
        // 修正なし、知識テーブルの3行のみ
        assert_eq!(report.messages.len(), 3);
    }

    #[test]
    fn test_scenario_downward_dog() {
        let report = Analyzer::default().analyze(&downward_dog()).unwrap();
        assert_eq!(report.label.as_str(), DOWNWARD_DOG);
        assert!(report.confidence >= 0.5);
        assert_eq!(report.matched_by, MatchKind::Heuristic);
        assert_eq!(report.validation.failing().count(), 0);
    }

    #[test]
    fn test_scenario_warrior_ii() {
        let report = Analyzer::default().analyze(&warrior_ii()).unwrap();
        assert_eq!(report.label.as_str(), WARRIOR_II);
        assert!(report.confidence >= 0.5);
        let combo = report.validation.composite("knees_combo").unwrap();
        assert_eq!(combo.ok, Some(true));
        assert_eq!(combo.bent_side, Some(Metric::LeftKnee));
        assert!(!report.messages.iter().any(|m| m.starts_with("Bend front knee")));
    }

    #[test]
    fn test_scenario_missing_wrists() {
        let mut pose = standing();
        pose.remove(LeftWrist);
        pose.remove(RightWrist);
        let report = Analyzer::default().analyze(&pose).unwrap();

        assert_eq!(report.metrics.get(Metric::LeftElbow), None);
        assert_eq!(report.metrics.get(Metric::RightElbow), None);
        assert!(report.metrics.get(Metric::LeftKnee).is_some());
        assert_eq!(report.label.as_str(), TADASANA);
        assert_eq!(report.matched_by, MatchKind::SoftMatch);

        let elbow = report.validation.metric(Metric::LeftElbow).unwrap();
        assert!(!elbow.is_evaluable());
        assert_eq!(elbow.delta, 0.0);
        for message in &report.messages {
            let lower = message.to_lowercase();
            assert!(!lower.contains("elbow") && !lower.contains(" arm"), "{}", message);
        }
        assert!(!report.highlight_joints.contains(&LeftElbow));
        assert!(!report.highlight_joints.contains(&RightElbow));
    }

    #[test]
    fn test_scenario_no_pose() {
        let analyzer = Analyzer::default();
        assert!(matches!(analyzer.analyze_detection(None), Err(AnalysisError::NoPoseDetected)));

        let mut source = StaticSource::new(None);
        assert!(matches!(
            analyzer.analyze_source(&mut source, &()),
            Err(AnalysisError::NoPoseDetected)
        ));
    }

    #[test]
    fn test_source_with_pose() {
        let mut source = StaticSource::new(Some(downward_dog()));
        let report = Analyzer::default().analyze_source(&mut source, &()).unwrap();
        assert_eq!(report.label.as_str(), DOWNWARD_DOG);
    }

    #[test]
    fn test_insufficient_landmarks() {
        let analyzer = Analyzer::default();
        let two = snapshot(&[(LeftHip, (0.0, 0.0)), (RightHip, (10.0, 0.0))]);
        match analyzer.analyze(&two) {
            Err(AnalysisError::InsufficientLandmarks { visible, metrics }) => {
                assert_eq!(visible, 2);
                assert!(metrics.get(Metric::HipTilt).is_some());
                assert_eq!(metrics.get(Metric::LeftKnee), None);
            }
            other => panic!("unexpected {:?}", other),
        }

        // 関節は十分だがどの指標にも使えない
        let face = snapshot(&[
            (Nose, (50.0, 50.0)),
            (LeftEye, (45.0, 45.0)),
            (RightEye, (55.0, 45.0)),
            (LeftEar, (40.0, 50.0)),
            (RightEar, (60.0, 50.0)),
        ]);
        assert!(matches!(
            analyzer.analyze(&face),
            Err(AnalysisError::InsufficientLandmarks { visible: 5, .. })
        ));
    }

    #[test]
    fn test_flexibility_changes_validation_only() {
        let mut pose = standing();
        // 右膝を少し曲げる
        let hip = mirror((90.0, 110.0));
        let knee = toward(hip, -95.0, 50.0);
        pose.insert(RightKnee, JointPoint::new(knee.0, knee.1, 0.9));
        pose.insert(RightAnkle, {
            let a = toward(knee, -72.0, 50.0);
            JointPoint::new(a.0, a.1, 0.9)
        });

        let low = Analyzer::default().with_flexibility(Flexibility::Low).analyze(&pose).unwrap();
        let high = Analyzer::default().with_flexibility(Flexibility::High).analyze(&pose).unwrap();
        assert_eq!(low.label, high.label);
        assert_eq!(low.confidence, high.confidence);
        let low_range = low.validation.metric(Metric::RightKnee).unwrap().range;
        let high_range = high.validation.metric(Metric::RightKnee).unwrap().range;
        assert!(low_range.low < high_range.low);
    }

    #[test]
    fn test_report_json() {
        let report = Analyzer::default().analyze(&warrior_ii()).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["label"], WARRIOR_II);
        assert_eq!(json["flexibility"], "medium");
        assert!(json["metrics"]["left_knee"].is_number());
        assert!(json["highlight_joints"].is_array());
        assert!(json["messages"].is_array());
    }

    #[test]
    fn test_analyzer_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Analyzer>();

        let analyzer = &Analyzer::default();
        let pose = &standing();
        std::thread::scope(|s| {
            let handles: Vec<_> = (0..4).map(|_| s.spawn(move || analyzer.analyze(pose).unwrap())).collect();
            for h in handles {
                assert_eq!(h.join().unwrap().label.as_str(), TADASANA);
            }
        });
    }
}
