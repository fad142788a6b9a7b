use std::any::Any;

use crate::models::traits::{ModelContext, ModelError, ModelTag, SimModel};
use crate::node::NodeClass;
use crate::scenario::ModelConfig;

/// 軌道モデルとして受け付ける実装名
pub const ORBIT_INAMES: [&str; 3] = ["ModelOrbit", "ModelOrbitOneFullUpdate", "ModelFixedOrbit"];

/// 軌道モデル
///
/// 衛星ノードの軌道要素（TLE）に紐づくモデルです。軌道伝搬は行わず、
/// 衛星位置はノードへ外部から与えられたエフェメリスのみを参照します。
#[derive(Debug, Clone)]
pub struct OrbitModel {
    iname: String,
    /// 軌道要素をログへ出力済みか
    reported: bool,
}

impl OrbitModel {
    pub fn new(iname: &str) -> Result<Self, ModelError> {
        if !ORBIT_INAMES.contains(&iname) {
            return Err(ModelError::Unknown(iname.to_string()));
        }
        Ok(Self {
            iname: iname.to_string(),
            reported: false,
        })
    }
}

impl SimModel for OrbitModel {
    fn iname(&self) -> &str {
        &self.iname
    }

    fn tag(&self) -> ModelTag {
        ModelTag::Orbital
    }

    fn supported_node_classes(&self) -> &'static [NodeClass] {
        &[NodeClass::SatelliteBasic]
    }

    fn execute(&mut self, ctx: &ModelContext<'_>) {
        if !self.reported {
            if let Some(elements) = ctx.orbit {
                ctx.logger.info(
                    &ctx.time,
                    format!(
                        "軌道要素: 衛星番号 {}, エポック {}, 傾斜角 {:.4}度, 周期 {:.2}分, 軌道長半径 {:.1}km",
                        elements.catalog_number,
                        elements.epoch,
                        elements.inclination_deg,
                        elements.period_minutes(),
                        elements.semi_major_axis_km()
                    ),
                );
            }
            self.reported = true;
        }

        match ctx.location {
            Some(location) => ctx.logger.debug(
                &ctx.time,
                format!("位置: ({:.1}, {:.1}, {:.1})", location.x, location.y, location.z),
            ),
            None => ctx.logger.trace(&ctx.time, "エフェメリス未設定のため位置は不明"),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub fn create(config: &ModelConfig) -> Result<Box<dyn SimModel>, ModelError> {
    Ok(Box::new(OrbitModel::new(&config.iname)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orbit_inames() {
        for iname in ORBIT_INAMES {
            let model = OrbitModel::new(iname).unwrap();
            assert_eq!(model.iname(), iname);
            assert_eq!(model.tag(), ModelTag::Orbital);
            assert_eq!(model.supported_node_classes(), &[NodeClass::SatelliteBasic]);
        }
        assert!(matches!(OrbitModel::new("ModelSgp4"), Err(ModelError::Unknown(_))));
    }
}
