//! 姿勢カタログ
//!
//! 姿勢名 → 指標ごとの理想範囲 + 複合ルール。起動時に一度だけ読み込み、
//! 以降は不変のまま各コンポーネントに明示的に渡す。

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::CatalogueError;
use crate::metrics::{Metric, MetricSet};
use crate::pose::Joint;

pub const TADASANA: &str = "Tadasana";
pub const DOWNWARD_DOG: &str = "Adho Mukha Svanasana";
pub const WARRIOR_II: &str = "Virabhadrasana II";
pub const TRIKONASANA: &str = "Trikonasana";

/// 戦士のポーズの膝の複合ルール名
pub const KNEES_COMBO: &str = "knees_combo";

/// 閉区間 [low, high]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct AngleRange {
    pub low: f64,
    pub high: f64,
}

impl AngleRange {
    pub const fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.low <= value && value <= self.high
    }

    /// 両側に margin だけ広げる
    pub fn widen(&self, margin: f64) -> Self {
        Self::new(self.low - margin, self.high + margin)
    }

    /// 範囲外への距離（範囲内なら0、常に非負）
    pub fn deviation(&self, value: f64) -> f64 {
        if value < self.low {
            self.low - value
        } else if value > self.high {
            value - self.high
        } else {
            0.0
        }
    }

    fn is_valid(&self) -> bool {
        self.low.is_finite() && self.high.is_finite() && self.low <= self.high
    }
}

impl From<[f64; 2]> for AngleRange {
    fn from([low, high]: [f64; 2]) -> Self {
        Self::new(low, high)
    }
}

impl From<AngleRange> for [f64; 2] {
    fn from(range: AngleRange) -> Self {
        [range.low, range.high]
    }
}

/// 単独の指標範囲では書けない条件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompositeRule {
    /// 左右どちらか一方が `bent` 内、もう一方が `straight_min` 以上
    ///
    /// `straight_min` は `bent.high` より大きくなければならない（両膝が同時に成立しないように）
    OneBentOneStraight {
        name: String,
        left: Metric,
        right: Metric,
        bent: AngleRange,
        straight_min: f64,
    },
}

/// 複合ルールの評価結果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositeOutcome {
    pub name: String,
    /// 判定に使った左右の値
    pub values: [Option<f64>; 2],
    /// None = どちらかの値が未定義で評価できない
    pub ok: Option<bool>,
    /// 曲がっている側（成立時のみ）
    pub bent_side: Option<Metric>,
}

impl CompositeRule {
    /// 膝の組み合わせ（片膝 ~90°、もう一方はまっすぐ）
    pub fn knees_combo() -> Self {
        CompositeRule::OneBentOneStraight {
            name: KNEES_COMBO.to_string(),
            left: Metric::LeftKnee,
            right: Metric::RightKnee,
            bent: AngleRange::new(80.0, 110.0),
            straight_min: 165.0,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            CompositeRule::OneBentOneStraight { name, .. } => name,
        }
    }

    pub fn metrics(&self) -> [Metric; 2] {
        match self {
            CompositeRule::OneBentOneStraight { left, right, .. } => [*left, *right],
        }
    }

    /// 汎用フィードバック用の説明
    pub fn describe(&self) -> String {
        match self {
            CompositeRule::OneBentOneStraight { left, right, bent, straight_min, .. } => format!(
                "one of {} / {} near {:.0}-{:.0}°, the other at least {:.0}°",
                left.label(),
                right.label(),
                bent.low,
                bent.high,
                straight_min
            ),
        }
    }

    /// 失敗時にハイライトする関節
    pub fn joints(&self) -> Vec<Joint> {
        self.metrics()
            .iter()
            .flat_map(|m| m.focus_joints().iter().copied())
            .collect()
    }

    pub fn evaluate(&self, metrics: &MetricSet) -> CompositeOutcome {
        match self {
            CompositeRule::OneBentOneStraight { name, left, right, bent, straight_min } => {
                let l = metrics.get(*left);
                let r = metrics.get(*right);
                let (ok, bent_side) = match (l, r) {
                    (Some(l), Some(r)) => {
                        if bent.contains(l) && r >= *straight_min {
                            (true, Some(*left))
                        } else if bent.contains(r) && l >= *straight_min {
                            (true, Some(*right))
                        } else {
                            (false, None)
                        }
                    }
                    _ => return CompositeOutcome { name: name.clone(), values: [l, r], ok: None, bent_side: None },
                };
                CompositeOutcome { name: name.clone(), values: [l, r], ok: Some(ok), bent_side }
            }
        }
    }

    fn is_valid(&self) -> bool {
        match self {
            CompositeRule::OneBentOneStraight { bent, straight_min, .. } => {
                bent.is_valid() && straight_min.is_finite() && *straight_min > bent.high
            }
        }
    }
}

/// カタログの1エントリ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostureDefinition {
    pub name: String,
    /// 指標 → 理想範囲（度、比の指標は無次元）
    pub ranges: BTreeMap<Metric, AngleRange>,
    #[serde(default)]
    pub composite_rules: Vec<CompositeRule>,
}

impl PostureDefinition {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ranges: BTreeMap::new(),
            composite_rules: Vec::new(),
        }
    }

    pub fn range(mut self, metric: Metric, low: f64, high: f64) -> Self {
        self.ranges.insert(metric, AngleRange::new(low, high));
        self
    }

    /// 左右の指標に同じ範囲を設定
    pub fn symmetric(self, left: Metric, right: Metric, low: f64, high: f64) -> Self {
        self.range(left, low, high).range(right, low, high)
    }

    pub fn rule(mut self, rule: CompositeRule) -> Self {
        self.composite_rules.push(rule);
        self
    }
}

/// 宣言順を保持する姿勢テーブル（同点時は先に宣言された姿勢が勝つ）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalogue {
    postures: Vec<PostureDefinition>,
}

impl Catalogue {
    pub fn new(postures: Vec<PostureDefinition>) -> Result<Self, CatalogueError> {
        let catalogue = Self { postures };
        catalogue.validate()?;
        Ok(catalogue)
    }

    /// 組み込みの4姿勢
    pub fn built_in() -> Self {
        use Metric::*;
        Self {
            postures: vec![
                PostureDefinition::new(TADASANA)
                    .symmetric(LeftKnee, RightKnee, 170.0, 190.0)
                    .symmetric(LeftElbow, RightElbow, 165.0, 195.0)
                    .symmetric(LeftHip, RightHip, 170.0, 190.0)
                    .range(TrunkFromVertical, 0.0, 10.0)
                    // 足をほぼ揃える
                    .range(AnkleToHipRatio, 0.0, 0.4),
                PostureDefinition::new(DOWNWARD_DOG)
                    .symmetric(LeftKnee, RightKnee, 170.0, 190.0)
                    .symmetric(LeftElbow, RightElbow, 170.0, 190.0)
                    .symmetric(LeftHip, RightHip, 80.0, 110.0),
                PostureDefinition::new(WARRIOR_II)
                    // 腕はほぼ水平
                    .symmetric(LeftShoulder, RightShoulder, 80.0, 110.0)
                    .rule(CompositeRule::knees_combo()),
                PostureDefinition::new(TRIKONASANA)
                    // 両脚まっすぐ
                    .symmetric(LeftKnee, RightKnee, 165.0, 190.0),
            ],
        }
    }

    /// JSONファイルから読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CatalogueError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let content = fs::read_to_string(path).map_err(|source| CatalogueError::Io {
            path: display.clone(),
            source,
        })?;
        let postures: Vec<PostureDefinition> = serde_json::from_str(&content)
            .map_err(|source| CatalogueError::Parse { path: display, source })?;
        Self::new(postures)
    }

    /// 読み込みに失敗したら組み込みカタログに戻す
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Self {
        let Some(path) = path else {
            return Self::built_in();
        };
        match Self::load(&path) {
            Ok(catalogue) => {
                debug!(postures = catalogue.len(), path = %path.as_ref().display(), "catalogue loaded");
                catalogue
            }
            Err(e) => {
                warn!(error = %e, "falling back to built-in catalogue");
                Self::built_in()
            }
        }
    }

    fn validate(&self) -> Result<(), CatalogueError> {
        if self.postures.is_empty() {
            return Err(CatalogueError::Invalid("no postures".to_string()));
        }
        let mut seen = HashSet::new();
        for posture in &self.postures {
            if posture.name.trim().is_empty() || posture.name == crate::classifier::UNKNOWN_LABEL {
                return Err(CatalogueError::Invalid(format!("reserved or empty name {:?}", posture.name)));
            }
            if !seen.insert(posture.name.as_str()) {
                return Err(CatalogueError::Invalid(format!("duplicate posture {}", posture.name)));
            }
            if let Some((metric, _)) = posture.ranges.iter().find(|(_, r)| !r.is_valid()) {
                return Err(CatalogueError::Invalid(format!(
                    "{}: invalid range for {}",
                    posture.name, metric
                )));
            }
            if posture.composite_rules.iter().any(|r| !r.is_valid()) {
                return Err(CatalogueError::Invalid(format!("{}: invalid composite rule", posture.name)));
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&PostureDefinition> {
        self.postures.iter().find(|p| p.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// 宣言順
    pub fn iter(&self) -> impl Iterator<Item = &PostureDefinition> {
        self.postures.iter()
    }

    pub fn len(&self) -> usize {
        self.postures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postures.is_empty()
    }
}

impl Default for Catalogue {
    fn default() -> Self {
        Self::built_in()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_built_in_order() {
        let catalogue = Catalogue::built_in();
        let names: Vec<&str> = catalogue.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec![TADASANA, DOWNWARD_DOG, WARRIOR_II, TRIKONASANA]);
    }

    #[test]
    fn test_built_in_is_valid() {
        assert!(Catalogue::built_in().validate().is_ok());
    }

    #[test]
    fn test_range_deviation() {
        let r = AngleRange::new(80.0, 110.0);
        assert_eq!(r.deviation(95.0), 0.0);
        assert_eq!(r.deviation(70.0), 10.0);
        assert_eq!(r.deviation(115.0), 5.0);
        assert!(r.contains(80.0) && r.contains(110.0));
    }

    #[test]
    fn test_knees_combo_either_side() {
        let rule = CompositeRule::knees_combo();
        let left_bent = MetricSet::from_values([(Metric::LeftKnee, 90.0), (Metric::RightKnee, 178.0)]);
        let out = rule.evaluate(&left_bent);
        assert_eq!(out.ok, Some(true));
        assert_eq!(out.bent_side, Some(Metric::LeftKnee));

        let right_bent = MetricSet::from_values([(Metric::LeftKnee, 170.0), (Metric::RightKnee, 100.0)]);
        let out = rule.evaluate(&right_bent);
        assert_eq!(out.ok, Some(true));
        assert_eq!(out.bent_side, Some(Metric::RightKnee));
        assert_eq!(out.values, [Some(170.0), Some(100.0)]);
    }

    #[test]
    fn test_knees_combo_fails() {
        let rule = CompositeRule::knees_combo();
        let both_bent = MetricSet::from_values([(Metric::LeftKnee, 90.0), (Metric::RightKnee, 95.0)]);
        assert_eq!(rule.evaluate(&both_bent).ok, Some(false));
        let both_straight = MetricSet::from_values([(Metric::LeftKnee, 179.0), (Metric::RightKnee, 180.0)]);
        assert_eq!(rule.evaluate(&both_straight).ok, Some(false));
    }

    #[test]
    fn test_knees_combo_undefined() {
        let rule = CompositeRule::knees_combo();
        let one_missing = MetricSet::from_values([(Metric::LeftKnee, 90.0)]);
        let out = rule.evaluate(&one_missing);
        assert_eq!(out.ok, None);
        assert_eq!(out.values, [Some(90.0), None]);
    }

    #[test]
    fn test_json_roundtrip_shape() {
        let json = serde_json::to_value(Catalogue::built_in()).unwrap();
        assert_eq!(json[0]["name"], TADASANA);
        assert_eq!(json[0]["ranges"]["left_knee"][0], 170.0);
        assert_eq!(json[2]["composite_rules"][0]["kind"], "one_bent_one_straight");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"name": "Chair", "ranges": {{"left_knee": [100, 130], "right_knee": [100, 130]}}}}]"#
        )
        .unwrap();
        let catalogue = Catalogue::load(file.path()).unwrap();
        assert_eq!(catalogue.len(), 1);
        assert!(catalogue.get("Chair").unwrap().composite_rules.is_empty());
    }

    #[test]
    fn test_malformed_falls_back() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(Catalogue::load(file.path()), Err(CatalogueError::Parse { .. })));
        assert_eq!(Catalogue::load_or_default(Some(file.path())), Catalogue::built_in());
    }

    #[test]
    fn test_inverted_range_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"name": "Bad", "ranges": {{"left_knee": [130, 100]}}}}]"#).unwrap();
        assert!(matches!(Catalogue::load(file.path()), Err(CatalogueError::Invalid(_))));
    }

    #[test]
    fn test_missing_file_and_empty_rejected() {
        assert!(matches!(
            Catalogue::load("/nonexistent/catalogue.json"),
            Err(CatalogueError::Io { .. })
        ));
        assert_eq!(Catalogue::load_or_default(Some("/nonexistent/catalogue.json")), Catalogue::built_in());
        assert_eq!(Catalogue::load_or_default(None::<&str>), Catalogue::built_in());
        assert!(Catalogue::new(Vec::new()).is_err());
    }

    #[test]
    fn test_overlapping_composite_rejected() {
        // straight_min が bent の範囲内だと両膝 105° でも「片方曲げ・片方まっすぐ」になってしまう
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"name": "Lunge", "ranges": {{}}, "composite_rules": [{{"kind": "one_bent_one_straight", "name": "knees_combo", "left": "left_knee", "right": "right_knee", "bent": [80, 110], "straight_min": 100}}]}}]"#
        )
        .unwrap();
        assert!(matches!(Catalogue::load(file.path()), Err(CatalogueError::Invalid(_))));

        let touching = CompositeRule::OneBentOneStraight {
            name: KNEES_COMBO.to_string(),
            left: Metric::LeftKnee,
            right: Metric::RightKnee,
            bent: AngleRange::new(80.0, 110.0),
            straight_min: 110.0,
        };
        assert!(Catalogue::new(vec![PostureDefinition::new("Lunge").rule(touching)]).is_err());
    }

    #[test]
    fn test_retuned_composite_accepted() {
        let rule = CompositeRule::OneBentOneStraight {
            name: KNEES_COMBO.to_string(),
            left: Metric::LeftKnee,
            right: Metric::RightKnee,
            bent: AngleRange::new(60.0, 120.0),
            straight_min: 160.0,
        };
        let catalogue = Catalogue::new(vec![PostureDefinition::new("Lunge").rule(rule)]).unwrap();
        let both = MetricSet::from_values([(Metric::LeftKnee, 105.0), (Metric::RightKnee, 105.0)]);
        let outcome = catalogue.get("Lunge").unwrap().composite_rules[0].evaluate(&both);
        assert_eq!(outcome.ok, Some(false));
    }

    #[test]
    fn test_reserved_name_rejected() {
        let result = Catalogue::new(vec![PostureDefinition::new("Unknown").range(Metric::LeftKnee, 0.0, 1.0)]);
        assert!(result.is_err());
    }
}
