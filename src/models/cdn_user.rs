use std::any::Any;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::fov::FOV_WITH_ELEVATION;
use crate::models::traits::{ModelContext, ModelError, ModelTag, SimModel};
use crate::node::{NodeClass, NodeType};
use crate::scenario::ModelConfig;

pub const CDN_USER: &str = "ModelCDNUser";

/// アクセス生成関数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AccessGeneration {
    /// アクセスパターンの確率分布に従って生成
    #[default]
    #[serde(rename = "generate_by_distribution")]
    ByDistribution,
}

/// 接続先衛星の選択方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SchedulingStrategy {
    /// 仰角の大きい衛星を優先
    #[default]
    #[serde(rename = "schdeule_by_largest_elevation", alias = "schedule_by_largest_elevation")]
    LargestElevation,
}

fn default_one() -> u32 {
    1
}

/// CDN 利用側モデルの設定
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CdnUserConfig {
    pub access_pattern_file: PathBuf,
    #[serde(default)]
    pub access_generation_function: AccessGeneration,
    #[serde(default)]
    pub scheduling_strategy_function: SchedulingStrategy,
    /// 1ステップあたりのアクセス数
    #[serde(default = "default_one")]
    pub num_access_to_gen: u32,
    /// 同時に割り当てる衛星数
    #[serde(default = "default_one")]
    pub satellites_to_schedule: u32,
}

/// 衛星カバレッジの集計
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CoverageStats {
    /// 視野内に衛星があったステップ数
    pub in_service_steps: u64,
    /// 視野内に衛星が無かったステップ数
    pub out_of_service_steps: u64,
    /// 位置が不明で判定できなかったステップ数
    pub unknown_steps: u64,
}

/// 地上局の CDN 利用モデル
///
/// 毎ステップ視野内の衛星を確認し、カバレッジを記録します。
/// リクエストの生成・衛星への振り分けは行いません。
///
/// `GSBasic` ノード専用で、同じノードに `ModelHelperFoVWithElevation` が
/// 割り当てられている必要があります。衛星ノードへの割り当ては構築時にエラーになります。
#[derive(Debug, Clone)]
pub struct CdnUser {
    config: CdnUserConfig,
    coverage: CoverageStats,
}

impl CdnUser {
    pub fn new(config: CdnUserConfig) -> Result<Self, ModelError> {
        if config.satellites_to_schedule == 0 {
            return Err(ModelError::InvalidValue {
                iname: CDN_USER.to_string(),
                reason: "satellites_to_schedule は1以上である必要があります".to_string(),
            });
        }
        if config.access_pattern_file.as_os_str().is_empty() {
            return Err(ModelError::InvalidValue {
                iname: CDN_USER.to_string(),
                reason: "access_pattern_file が空です".to_string(),
            });
        }
        if !config.access_pattern_file.exists() {
            warn!(
                "アクセスパターンファイルが見つかりません: {}",
                config.access_pattern_file.display()
            );
        }
        Ok(Self {
            config,
            coverage: CoverageStats::default(),
        })
    }

    pub fn config(&self) -> &CdnUserConfig {
        &self.config
    }

    pub fn coverage(&self) -> CoverageStats {
        self.coverage
    }
}

impl SimModel for CdnUser {
    fn iname(&self) -> &str {
        CDN_USER
    }

    fn tag(&self) -> ModelTag {
        ModelTag::CdnUser
    }

    fn supported_node_classes(&self) -> &'static [NodeClass] {
        &[NodeClass::GsBasic]
    }

    fn dependencies(&self) -> &'static [&'static [&'static str]] {
        &[&[FOV_WITH_ELEVATION]]
    }

    fn execute(&mut self, ctx: &ModelContext<'_>) {
        match ctx.view(NodeType::Sat) {
            None => {
                self.coverage.unknown_steps += 1;
                ctx.logger.trace(&ctx.time, "位置または視野モデルが無いため衛星の視野を判定できません");
            }
            Some(visible) if visible.is_empty() => {
                self.coverage.out_of_service_steps += 1;
                ctx.logger.info(&ctx.time, "サービス圏外: 視野内に衛星がありません");
            }
            Some(visible) => {
                self.coverage.in_service_steps += 1;
                if let Some(best) = visible
                    .iter()
                    .max_by(|a, b| a.elevation_deg.total_cmp(&b.elevation_deg))
                {
                    let range_km = ctx
                        .location
                        .zip(ctx.snapshot.location_of(best.node_id))
                        .map(|(own, sat)| own.distance(&sat) / 1000.0);
                    ctx.logger.info(
                        &ctx.time,
                        format!(
                            "視野内の衛星: {}機 (最大仰角 {:.1}度, 衛星 {}, 距離 {:.1}km)",
                            visible.len(),
                            best.elevation_deg,
                            best.node_id,
                            range_km.unwrap_or(f64::NAN)
                        ),
                    );
                }
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub fn create(config: &ModelConfig) -> Result<Box<dyn SimModel>, ModelError> {
    let user: CdnUserConfig = config.params_as().map_err(|source| ModelError::Params {
        iname: config.iname.clone(),
        source,
    })?;
    Ok(Box::new(CdnUser::new(user)?))
}
