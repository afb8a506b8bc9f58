use anyhow::Result;

use super::keypoint::PoseSnapshot;

/// 画像から姿勢を取り出す外部コラボレータ
///
/// `Ok(None)` は「信頼できる姿勢が見つからない」を表し、
/// 関節が少ないだけのスナップショットとは区別される。
/// `Err` は推論そのものの失敗（モデル読み込み・テンソル変換など）。
pub trait PoseSource {
    type Image: ?Sized;

    fn detect(&mut self, image: &Self::Image) -> Result<Option<PoseSnapshot>>;
}

/// 事前に用意したスナップショットをそのまま返すソース（JSON入力・テスト用）
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    snapshot: Option<PoseSnapshot>,
}

impl StaticSource {
    pub fn new(snapshot: Option<PoseSnapshot>) -> Self {
        Self { snapshot }
    }
}

impl PoseSource for StaticSource {
    type Image = ();

    fn detect(&mut self, _image: &()) -> Result<Option<PoseSnapshot>> {
        Ok(self.snapshot.clone())
    }
}
