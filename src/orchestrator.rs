//! # Orchestrator モジュール
//!
//! シナリオ設定からトポロジーとノードを構築し、`iname` で指定された
//! モデルをノードへ割り当てます。
//!
//! 割り当て時の確認事項:
//!
//! 1. モデルが登録済みで、パラメータが解析できること
//! 2. モデルがノードクラスに対応していること（対応リストが空なら全クラス対応）
//! 3. 同名モデルの重複は警告して最初のものを採用
//! 4. 各モデルの依存グループ（いずれか1つ）が同じノード内で満たされること
//!
//! 依存関係を解決済みのモデル名集合（2要素以上）は記録し、同じ集合のノードでは再確認しません。

use std::collections::BTreeSet;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::logging::NodeLogger;
use crate::models::{Location, ModelError, ModelRegistry, SimModel};
use crate::node::{Node, NodeClass, NodeType};
use crate::scenario::{NodeConfig, ScenarioConfig, ScenarioError};
use crate::simtime::SimClock;
use crate::tle::{OrbitalElements, TleError};
use crate::topology::{IslGraph, Topology, TopologyError};

/// 構築済みのシミュレーション環境
#[derive(Debug)]
pub struct SimEnv {
    pub topologies: Vec<Topology>,
    pub clock: SimClock,
}

pub struct Orchestrator {
    config: ScenarioConfig,
    registry: ModelRegistry,
    resolved_sets: Vec<BTreeSet<String>>,
}

impl Orchestrator {
    pub fn new(config: ScenarioConfig) -> Self {
        Self {
            config,
            registry: ModelRegistry::builtin(),
            resolved_sets: Vec::new(),
        }
    }

    pub fn with_registry(mut self, registry: ModelRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// 依存関係を解決済みとして記録されたモデル名集合
    pub fn resolved_sets(&self) -> &[BTreeSet<String>] {
        &self.resolved_sets
    }

    pub fn build(&mut self) -> Result<SimEnv, OrchestratorError> {
        let Self {
            config,
            registry,
            resolved_sets,
        } = self;
        config.validate()?;
        let clock = config.simtime.clock().map_err(ScenarioError::from)?;

        let mut topologies = Vec::with_capacity(config.topologies.len());
        for topology_config in &config.topologies {
            let mut topology = Topology::new(topology_config.name.clone(), topology_config.id);
            if let Some(path) = &topology_config.isl_topology {
                topology = topology.with_isl(IslGraph::from_file(path)?);
                debug!("衛星間リンクを読み込み: {}", path.display());
            }

            for node_config in &topology_config.nodes {
                let logger_name = format!(
                    "{}_{}_{}_{}",
                    topology_config.name,
                    topology_config.id,
                    node_config.type_name(),
                    node_config.node_id()
                );
                let logger = NodeLogger::new(logger_name, node_config.log_level());
                let mut node = create_node(node_config, topology_config.id, clock.clone(), logger)?;

                let models = create_models(registry, resolved_sets, node.class(), node.id(), node_config)?;
                node.add_models(models);
                topology.add_node(node)?;
            }

            info!(
                "トポロジー構築: {} (ID: {}, ノード数: {})",
                topology.name(),
                topology.id(),
                topology.nodes().len()
            );
            topologies.push(topology);
        }

        Ok(SimEnv { topologies, clock })
    }
}

fn create_models(
    registry: &ModelRegistry,
    resolved_sets: &mut Vec<BTreeSet<String>>,
    class: NodeClass,
    node_id: u32,
    node_config: &NodeConfig,
) -> Result<Vec<Box<dyn SimModel>>, OrchestratorError> {
    let mut models: Vec<Box<dyn SimModel>> = Vec::new();
    let mut names = BTreeSet::new();

    for model_config in node_config.models() {
        let model = registry.create(model_config).map_err(|source| OrchestratorError::Model {
            node_id,
            source,
        })?;

        let supported = model.supported_node_classes();
        if !supported.is_empty() && !supported.contains(&class) {
            return Err(OrchestratorError::UnsupportedNode {
                model: model.iname().to_string(),
                node_class: class.iname(),
                node_id,
            });
        }

        if names.contains(model.iname()) {
            warn!("モデル {} がノード {} に重複して指定されています", model.iname(), node_id);
            continue;
        }
        names.insert(model.iname().to_string());
        models.push(model);
    }

    if !resolved_sets.contains(&names) {
        for model in &models {
            let unresolved = model
                .dependencies()
                .iter()
                .find(|group| !group.iter().any(|name| names.contains(*name)));
            if let Some(group) = unresolved {
                return Err(OrchestratorError::Dependency {
                    model: model.iname().to_string(),
                    node_id,
                    wanted: group.join(" | "),
                });
            }
        }
        if names.len() > 1 {
            resolved_sets.push(names);
        }
    }

    Ok(models)
}

fn create_node(
    node_config: &NodeConfig,
    topology_id: u32,
    clock: SimClock,
    logger: NodeLogger,
) -> Result<Node, OrchestratorError> {
    let node_id = node_config.node_id();
    let class = NodeClass::from_iname(node_config.iname());
    let expected = match node_config {
        NodeConfig::Satellite(_) => NodeType::Sat,
        NodeConfig::GroundStation(_) => NodeType::Gs,
    };
    if class.map(|c| c.node_type()) != Some(expected) {
        return Err(OrchestratorError::NodeClass {
            iname: node_config.iname().to_string(),
            node_type: node_config.type_name(),
            node_id,
        });
    }

    let node = match node_config {
        NodeConfig::Satellite(sat) => {
            let orbit = OrbitalElements::parse(&sat.tle_line1, &sat.tle_line2)
                .map_err(|source| OrchestratorError::Tle { node_id, source })?;
            Node::satellite(node_id, topology_id, clock, orbit, logger)
        }
        NodeConfig::GroundStation(gs) => {
            let location = Location::from_geodetic(gs.latitude, gs.longitude, gs.elevation);
            Node::ground_station(node_id, topology_id, clock, location, logger)
        }
    };
    Ok(node)
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
    #[error(transparent)]
    Topology(#[from] TopologyError),
    #[error("ノード {node_id} の実装 {iname} は種別 {node_type} に使用できません")]
    NodeClass {
        iname: String,
        node_type: &'static str,
        node_id: u32,
    },
    #[error("ノード {node_id} のTLEが不正です: {source}")]
    Tle {
        node_id: u32,
        #[source]
        source: TleError,
    },
    #[error("ノード {node_id} のモデル初期化エラー: {source}")]
    Model {
        node_id: u32,
        #[source]
        source: ModelError,
    },
    #[error("モデル {model} はノード {node_id} ({node_class}) に対応していません")]
    UnsupportedNode {
        model: String,
        node_class: &'static str,
        node_id: u32,
    },
    #[error("モデル {model} の依存関係を解決できません (ノード {node_id}, 必要: {wanted})")]
    Dependency {
        model: String,
        node_id: u32,
        wanted: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CdnUser, ModelTag};
    use crate::scenario::fixtures::cdn_scenario_json;
    use serde_json::{json, Value};

    fn scenario(value: &Value) -> ScenarioConfig {
        ScenarioConfig::from_json_str(&value.to_string()).unwrap()
    }

    fn fixture() -> Value {
        serde_json::from_str(&cdn_scenario_json()).unwrap()
    }

    #[test]
    fn test_build_cdn_scenario() {
        let mut orchestrator = Orchestrator::new(scenario(&fixture()));
        let env = orchestrator.build().unwrap();

        assert_eq!(env.clock.num_steps, 6);
        assert_eq!(env.topologies.len(), 1);
        let topology = &env.topologies[0];
        assert_eq!(topology.name(), "Constln1");

        let sat = topology.node(1).unwrap();
        assert_eq!(sat.logger().name(), "Constln1_0_SAT_1");
        assert_eq!(sat.models().len(), 3);
        assert_eq!(sat.fov_min_elevation(), Some(25.0));
        assert!(sat.model_by_tag(ModelTag::Orbital).is_some());

        let gs = topology.node(2).unwrap();
        assert_eq!(gs.logger().name(), "Constln1_0_GS_2");
        let user = gs.model_by_tag(ModelTag::CdnUser).unwrap();
        assert!(user.as_any().downcast_ref::<CdnUser>().is_some());

        // 衛星と地上局のモデル集合がそれぞれ記録される
        assert_eq!(orchestrator.resolved_sets().len(), 2);
    }

    #[test]
    fn test_duplicate_model_is_skipped() {
        let mut value = fixture();
        value["topologies"][0]["nodes"][1]["models"]
            .as_array_mut()
            .unwrap()
            .push(json!({ "iname": "ModelHelperFoVWithElevation", "min_elevation": 40 }));

        let env = Orchestrator::new(scenario(&value)).build().unwrap();
        let gs = env.topologies[0].node(2).unwrap();
        assert_eq!(gs.models().len(), 2);
        assert_eq!(gs.fov_min_elevation(), Some(25.0));
    }

    #[test]
    fn test_missing_dependency() {
        let mut value = fixture();
        value["topologies"][0]["nodes"][1]["models"]
            .as_array_mut()
            .unwrap()
            .retain(|model| model["iname"] != "ModelHelperFoVWithElevation");

        let err = Orchestrator::new(scenario(&value)).build().unwrap_err();
        match err {
            OrchestratorError::Dependency { model, node_id, wanted } => {
                assert_eq!(model, "ModelCDNUser");
                assert_eq!(node_id, 2);
                assert_eq!(wanted, "ModelHelperFoVWithElevation");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unsupported_node_class() {
        let mut value = fixture();
        value["topologies"][0]["nodes"][1]["models"]
            .as_array_mut()
            .unwrap()
            .push(json!({ "iname": "ModelFixedOrbit" }));

        let err = Orchestrator::new(scenario(&value)).build().unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::UnsupportedNode { ref model, node_class: "GSBasic", node_id: 2 } if model == "ModelFixedOrbit"
        ));

        // CDN 利用モデルは衛星ノードに割り当てられない
        let mut value = fixture();
        let user_model = value["topologies"][0]["nodes"][1]["models"]
            .as_array()
            .unwrap()
            .iter()
            .find(|model| model["iname"] == "ModelCDNUser")
            .cloned()
            .unwrap();
        value["topologies"][0]["nodes"][0]["models"]
            .as_array_mut()
            .unwrap()
            .push(user_model);

        let err = Orchestrator::new(scenario(&value)).build().unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::UnsupportedNode { ref model, node_class: "SatelliteBasic", node_id: 1 } if model == "ModelCDNUser"
        ));
    }

    #[test]
    fn test_unknown_model_and_node_class() {
        let mut value = fixture();
        value["topologies"][0]["nodes"][0]["models"] = json!([{ "iname": "ModelPower" }]);
        let err = Orchestrator::new(scenario(&value)).build().unwrap_err();
        assert!(matches!(err, OrchestratorError::Model { node_id: 1, source: ModelError::Unknown(_) }));

        let mut value = fixture();
        value["topologies"][0]["nodes"][0]["iname"] = json!("GSBasic");
        let err = Orchestrator::new(scenario(&value)).build().unwrap_err();
        assert!(matches!(err, OrchestratorError::NodeClass { node_type: "SAT", node_id: 1, .. }));
    }

    #[test]
    fn test_custom_registry() {
        let mut registry = ModelRegistry::builtin();
        registry.register("ModelOrbitSgp4Stub", crate::models::fov::create);
        assert!(registry.contains("ModelOrbitSgp4Stub"));

        let mut value = fixture();
        value["topologies"][0]["nodes"][0]["models"] = json!([{ "iname": "ModelOrbitSgp4Stub", "min_elevation": 5 }]);
        let env = Orchestrator::new(scenario(&value))
            .with_registry(registry)
            .build()
            .unwrap();
        assert_eq!(env.topologies[0].node(1).unwrap().fov_min_elevation(), Some(5.0));
    }

    #[test]
    fn test_isl_topology_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let isl_path = dir.path().join("isl.json");
        std::fs::write(&isl_path, r#"{ "1": [] }"#).unwrap();

        let mut value = fixture();
        value["topologies"][0]["isl_topology"] = json!(isl_path);
        let mut env = Orchestrator::new(scenario(&value)).build().unwrap();
        let isl = env.topologies[0].isl_mut().unwrap();
        assert_eq!(isl.hop_distance(1, 1), Some(0));

        value["topologies"][0]["isl_topology"] = json!(dir.path().join("missing.json"));
        let err = Orchestrator::new(scenario(&value)).build().unwrap_err();
        assert!(matches!(err, OrchestratorError::Topology(TopologyError::IslIo(..))));
    }
}
