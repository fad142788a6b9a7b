use std::any::Any;

use serde::Deserialize;

use crate::models::traits::{ModelContext, ModelError, ModelTag, SimModel};
use crate::scenario::ModelConfig;

pub const FOV_WITH_ELEVATION: &str = "ModelHelperFoVWithElevation";

#[derive(Debug, Deserialize)]
struct FovParams {
    min_elevation: f64,
}

/// 仰角による視野判定の補助モデル
///
/// 地上ノードからは上空の衛星、衛星ノードからは地上ノードの視野を提供します。
/// 衛星同士・地上同士の視野は対象外です。
/// `execute` は何もせず、同じノードの他モデルが [`ModelContext::view`] 経由で利用します。
#[derive(Debug, Clone)]
pub struct FovWithElevation {
    min_elevation_deg: f64,
}

impl FovWithElevation {
    pub fn new(min_elevation_deg: f64) -> Result<Self, ModelError> {
        if !(-90.0..=90.0).contains(&min_elevation_deg) {
            return Err(ModelError::InvalidValue {
                iname: FOV_WITH_ELEVATION.to_string(),
                reason: format!("min_elevation {} は -90〜90度の範囲外です", min_elevation_deg),
            });
        }
        Ok(Self { min_elevation_deg })
    }

    pub fn min_elevation_deg(&self) -> f64 {
        self.min_elevation_deg
    }
}

impl SimModel for FovWithElevation {
    fn iname(&self) -> &str {
        FOV_WITH_ELEVATION
    }

    fn tag(&self) -> ModelTag {
        ModelTag::ViewOfNode
    }

    fn execute(&mut self, _ctx: &ModelContext<'_>) {}

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub fn create(config: &ModelConfig) -> Result<Box<dyn SimModel>, ModelError> {
    let params: FovParams = config.params_as().map_err(|source| ModelError::Params {
        iname: config.iname.clone(),
        source,
    })?;
    Ok(Box::new(FovWithElevation::new(params.min_elevation)?))
}
