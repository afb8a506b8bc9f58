//! 姿勢ごとの静的な知識テーブル（アライメントのコツ・よくある間違い・効果）

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use crate::catalogue::{DOWNWARD_DOG, TADASANA, TRIKONASANA, WARRIOR_II};
use crate::error::CatalogueError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostureKnowledge {
    #[serde(default)]
    pub alignment: Vec<String>,
    #[serde(default)]
    pub mistakes: Vec<String>,
    #[serde(default)]
    pub effects: Vec<String>,
}

impl PostureKnowledge {
    fn new(alignment: &[&str], mistakes: &[&str], effects: &[&str]) -> Self {
        let owned = |items: &[&str]| -> Vec<String> { items.iter().map(|s| s.to_string()).collect() };
        Self {
            alignment: owned(alignment),
            mistakes: owned(mistakes),
            effects: owned(effects),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KnowledgeBase {
    entries: BTreeMap<String, PostureKnowledge>,
}

impl KnowledgeBase {
    pub fn built_in() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(
            TADASANA.to_string(),
            PostureKnowledge::new(
                &[
                    "Spread weight evenly across both feet; lift through the crown.",
                    "Draw the shoulder blades down the back; arms relaxed at the sides.",
                ],
                &[
                    "Locking the knees and tipping the pelvis forward.",
                    "Lifting the chin and collapsing the lower back.",
                ],
                &["Improves posture and body awareness; strengthens thighs and ankles."],
            ),
        );
        entries.insert(
            DOWNWARD_DOG.to_string(),
            PostureKnowledge::new(
                &[
                    "Press the hands firmly; send the hips up and back.",
                    "Keep the spine long before working the heels toward the floor.",
                ],
                &[
                    "Rounding the back to force the heels down.",
                    "Sinking into the shoulders instead of pushing the floor away.",
                ],
                &["Lengthens hamstrings and calves; strengthens arms and shoulders."],
            ),
        );
        entries.insert(
            WARRIOR_II.to_string(),
            PostureKnowledge::new(
                &[
                    "Front knee over ankle; back leg straight and strong.",
                    "Arms extend parallel to the floor; gaze over front hand.",
                ],
                &[
                    "Front knee collapsing inward; slumping shoulders.",
                    "Back foot collapsing; pelvis not neutral.",
                ],
                &["Builds leg strength and stability; opens hips and chest."],
            ),
        );
        entries.insert(
            TRIKONASANA.to_string(),
            PostureKnowledge::new(
                &[
                    "Keep both legs straight; lengthen both sides of the torso.",
                    "Stack shoulders; top arm vertical over bottom arm.",
                ],
                &[
                    "Collapsing the bottom side waist; hyperextending the front knee.",
                    "Letting the chest face the floor instead of opening to the side.",
                ],
                &["Stretches hamstrings and groins; tones legs and core."],
            ),
        );
        Self { entries }
    }

    /// JSON（姿勢名 → {alignment, mistakes, effects}）から読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CatalogueError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let content = fs::read_to_string(path).map_err(|source| CatalogueError::Io {
            path: display.clone(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| CatalogueError::Parse { path: display, source })
    }

    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Self {
        let Some(path) = path else {
            return Self::built_in();
        };
        match Self::load(&path) {
            Ok(kb) => {
                debug!(entries = kb.entries.len(), path = %path.as_ref().display(), "knowledge loaded");
                kb
            }
            Err(e) => {
                warn!(error = %e, "falling back to built-in knowledge table");
                Self::built_in()
            }
        }
    }

    pub fn get(&self, posture: &str) -> Option<&PostureKnowledge> {
        self.entries.get(posture)
    }
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        Self::built_in()
    }
}
