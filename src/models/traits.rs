use std::any::Any;
use std::fmt;

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::logging::NodeLogger;
use crate::models::common::{Location, VisibleNode};
use crate::node::{NodeClass, NodeType};
use crate::tle::OrbitalElements;
use crate::topology::StepSnapshot;

/// モデルの機能分類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelTag {
    /// 軌道（衛星位置の提供元）
    Orbital,
    /// 視野計算
    ViewOfNode,
    /// CDN キャッシュ提供側
    CdnProvider,
    /// CDN 利用側
    CdnUser,
}

/// ノードに割り当てられる全モデルが実装する基本インターフェース
pub trait SimModel: Send + fmt::Debug {
    /// 実装名（シナリオの `iname` と一致）
    fn iname(&self) -> &str;

    fn tag(&self) -> ModelTag;

    /// 対応するノードクラス。空の場合は全ノードに対応
    fn supported_node_classes(&self) -> &'static [NodeClass] {
        &[]
    }

    /// 依存するモデル名のグループ
    ///
    /// 各グループ内のいずれか1つが同じノードに存在すれば、そのグループは満たされます。
    fn dependencies(&self) -> &'static [&'static [&'static str]] {
        &[]
    }

    /// 1ステップの処理実行
    fn execute(&mut self, ctx: &ModelContext<'_>);

    fn as_any(&self) -> &dyn Any;
}

/// モデル実行時にノードから渡される情報
pub struct ModelContext<'a> {
    pub node_id: u32,
    pub node_class: NodeClass,
    pub step: u64,
    pub time: NaiveDateTime,
    /// 現在時刻におけるノード自身の位置（不明な場合は None）
    pub location: Option<Location>,
    /// 衛星ノードの軌道要素
    pub orbit: Option<&'a OrbitalElements>,
    /// 同じノードの視野モデルの最低仰角
    pub fov_min_elevation: Option<f64>,
    pub snapshot: &'a StepSnapshot,
    pub logger: &'a NodeLogger,
}

impl ModelContext<'_> {
    /// 指定種別のノードのうち視野内にあるものを取得
    ///
    /// 視野モデルが無い、または自身の位置が不明な場合は None。
    pub fn view(&self, target: NodeType) -> Option<Vec<VisibleNode>> {
        let min_elevation = self.fov_min_elevation?;
        self.snapshot.view_from(self.node_id, target, min_elevation)
    }
}

/// モデル生成エラー
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("未登録のモデルです: {0}")]
    Unknown(String),
    #[error("モデル {iname} のパラメータを解析できません: {source}")]
    Params {
        iname: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("モデル {iname} の設定値が不正です: {reason}")]
    InvalidValue { iname: String, reason: String },
}
