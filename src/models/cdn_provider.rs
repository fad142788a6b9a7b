use std::any::Any;

use serde::{Deserialize, Serialize};

use crate::models::traits::{ModelContext, ModelError, ModelTag, SimModel};
use crate::node::NodeClass;
use crate::scenario::ModelConfig;

pub const CDN_PROVIDER: &str = "ModelCDNProvider";

/// キャッシュ追い出し方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EvictionStrategy {
    #[default]
    #[serde(rename = "LRU")]
    Lru,
}

/// リクエスト処理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HandleRequestsStrategy {
    /// 自衛星のキャッシュのみを確認
    #[default]
    #[serde(rename = "check_local_cache_only")]
    CheckLocalCacheOnly,
}

/// 能動的なコンテンツ配置方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ActiveSchedulingStrategy {
    #[default]
    #[serde(rename = "no_op")]
    NoOp,
}

/// CDN 提供側モデルのキャッシュ設定
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CdnProviderConfig {
    /// キャッシュ容量（コンテンツ数）
    #[serde(alias = "cache_capacity")]
    pub cache_size: u64,
    #[serde(default)]
    pub cache_eviction_strategy: EvictionStrategy,
    #[serde(default)]
    pub handle_requests_strategy: HandleRequestsStrategy,
    #[serde(default)]
    pub active_scheduling_strategy: ActiveSchedulingStrategy,
}

/// 衛星上の CDN キャッシュ提供モデル
///
/// キャッシュ設定を検証して保持します。キャッシュ本体と追い出し処理は持ちません。
/// `SatelliteBasic` ノード専用です。
#[derive(Debug, Clone)]
pub struct CdnProvider {
    config: CdnProviderConfig,
}

impl CdnProvider {
    pub fn new(config: CdnProviderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CdnProviderConfig {
        &self.config
    }
}

impl SimModel for CdnProvider {
    fn iname(&self) -> &str {
        CDN_PROVIDER
    }

    fn tag(&self) -> ModelTag {
        ModelTag::CdnProvider
    }

    fn supported_node_classes(&self) -> &'static [NodeClass] {
        &[NodeClass::SatelliteBasic]
    }

    fn execute(&mut self, ctx: &ModelContext<'_>) {
        if ctx.step == 0 {
            ctx.logger.debug(
                &ctx.time,
                format!(
                    "CDNキャッシュ設定: 容量 {}, 追い出し {:?}, 処理 {:?}, 配置 {:?}",
                    self.config.cache_size,
                    self.config.cache_eviction_strategy,
                    self.config.handle_requests_strategy,
                    self.config.active_scheduling_strategy
                ),
            );
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub fn create(config: &ModelConfig) -> Result<Box<dyn SimModel>, ModelError> {
    let provider: CdnProviderConfig = config.params_as().map_err(|source| ModelError::Params {
        iname: config.iname.clone(),
        source,
    })?;
    Ok(Box::new(CdnProvider::new(provider)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(params: serde_json::Value) -> ModelConfig {
        let mut value = params;
        value["iname"] = json!(CDN_PROVIDER);
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_create_with_named_strategies() {
        let model = create(&config(json!({
            "cache_size": 15,
            "cache_eviction_strategy": "LRU",
            "handle_requests_strategy": "check_local_cache_only",
            "active_scheduling_strategy": "no_op"
        })))
        .unwrap();
        let provider = model.as_any().downcast_ref::<CdnProvider>().unwrap();
        assert_eq!(provider.config().cache_size, 15);
        assert_eq!(provider.config().cache_eviction_strategy, EvictionStrategy::Lru);
        assert_eq!(model.supported_node_classes(), &[NodeClass::SatelliteBasic]);
    }

    #[test]
    fn test_cache_capacity_alias_and_defaults() {
        let model = create(&config(json!({ "cache_capacity": 100, "min_elevation": 25 }))).unwrap();
        let provider = model.as_any().downcast_ref::<CdnProvider>().unwrap();
        assert_eq!(provider.config().cache_size, 100);
        assert_eq!(
            provider.config().handle_requests_strategy,
            HandleRequestsStrategy::CheckLocalCacheOnly
        );
    }

    #[test]
    fn test_unknown_strategy_is_rejected() {
        let err = create(&config(json!({ "cache_size": 15, "cache_eviction_strategy": "FIFO" }))).unwrap_err();
        assert!(matches!(err, ModelError::Params { ref iname, .. } if iname == CDN_PROVIDER));
        assert!(create(&config(json!({ "cache_eviction_strategy": "LRU" }))).is_err());
    }
}
