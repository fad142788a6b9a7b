use std::collections::HashMap;

use crate::models::traits::{ModelError, SimModel};
use crate::models::{cdn_provider, cdn_user, fov, orbit};
use crate::scenario::ModelConfig;

/// モデル設定からインスタンスを生成する関数
pub type ModelFactory = fn(&ModelConfig) -> Result<Box<dyn SimModel>, ModelError>;

/// `iname` とモデル生成関数の対応表
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    factories: HashMap<String, ModelFactory>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 組み込みモデルを登録済みのレジストリ
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for iname in orbit::ORBIT_INAMES {
            registry.register(iname, orbit::create);
        }
        registry.register(fov::FOV_WITH_ELEVATION, fov::create);
        registry.register(cdn_provider::CDN_PROVIDER, cdn_provider::create);
        registry.register(cdn_user::CDN_USER, cdn_user::create);
        registry
    }

    /// 生成関数を登録。同名の登録があれば置き換える
    pub fn register(&mut self, iname: &str, factory: ModelFactory) {
        self.factories.insert(iname.to_string(), factory);
    }

    pub fn contains(&self, iname: &str) -> bool {
        self.factories.contains_key(iname)
    }

    pub fn inames(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn create(&self, config: &ModelConfig) -> Result<Box<dyn SimModel>, ModelError> {
        let factory = self
            .factories
            .get(&config.iname)
            .ok_or_else(|| ModelError::Unknown(config.iname.clone()))?;
        factory(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtin_inames() {
        let registry = ModelRegistry::builtin();
        assert_eq!(
            registry.inames(),
            vec![
                "ModelCDNProvider",
                "ModelCDNUser",
                "ModelFixedOrbit",
                "ModelHelperFoVWithElevation",
                "ModelOrbit",
                "ModelOrbitOneFullUpdate",
            ]
        );
    }

    #[test]
    fn test_create_unknown_model() {
        let registry = ModelRegistry::builtin();
        let config: ModelConfig = serde_json::from_value(json!({ "iname": "ModelPower" })).unwrap();
        assert!(matches!(registry.create(&config), Err(ModelError::Unknown(name)) if name == "ModelPower"));
    }

    #[test]
    fn test_register_custom_factory() {
        let mut registry = ModelRegistry::new();
        assert!(!registry.contains("ModelFixedOrbit"));
        registry.register("ModelFixedOrbit", orbit::create);

        let config: ModelConfig = serde_json::from_value(json!({ "iname": "ModelFixedOrbit" })).unwrap();
        let model = registry.create(&config).unwrap();
        assert_eq!(model.iname(), "ModelFixedOrbit");
    }
}
