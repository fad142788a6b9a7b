//! # Scenario モジュール
//!
//! シナリオ設定ファイル（JSON、または YAML）を読み込み、型付きの構造体へ変換して検証します。
//!
//! シナリオは一度読み込んだら変更されない静的なドキュメントです。
//! トポロジー（衛星コンステレーション）ごとにノード（衛星 `SAT` / 地上局 `GS`）を持ち、
//! 各ノードには `iname` で指定されたモデルが割り当てられます。
//! モデルのパラメータは自由形式のキー・値として保持し、モデル生成時に型付けします。

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::logging::NodeLogLevel;
use crate::simtime::{SimClock, SimTimeError};
use crate::tle::OrbitalElements;

/// 完全なシナリオ設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScenarioConfig {
    pub topologies: Vec<TopologyConfig>,
    pub simtime: SimTimeConfig,
    pub simlogsetup: SimLogSetup,
}

/// トポロジー（コンステレーション）設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TopologyConfig {
    pub name: String,
    pub id: u32,
    /// 衛星間リンクの隣接リスト（JSON）へのパス
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isl_topology: Option<PathBuf>,
    pub nodes: Vec<NodeConfig>,
}

/// ノード設定。`type` フィールドで種別を判別
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum NodeConfig {
    #[serde(rename = "SAT")]
    Satellite(SatelliteConfig),
    #[serde(rename = "GS")]
    GroundStation(GroundStationConfig),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SatelliteConfig {
    #[serde(default = "default_satellite_iname")]
    pub iname: String,
    #[serde(rename = "nodeid")]
    pub node_id: u32,
    #[serde(rename = "loglevel", default)]
    pub log_level: NodeLogLevel,
    #[serde(rename = "tle_1")]
    pub tle_line1: String,
    #[serde(rename = "tle_2")]
    pub tle_line2: String,
    #[serde(rename = "additionalargs", default)]
    pub additional_args: Value,
    #[serde(default)]
    pub models: Vec<ModelConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GroundStationConfig {
    #[serde(default = "default_ground_station_iname")]
    pub iname: String,
    #[serde(rename = "nodeid")]
    pub node_id: u32,
    #[serde(rename = "loglevel", default)]
    pub log_level: NodeLogLevel,
    pub latitude: f64,
    pub longitude: f64,
    /// 楕円体高（m）
    #[serde(default)]
    pub elevation: f64,
    #[serde(rename = "additionalargs", default)]
    pub additional_args: Value,
    #[serde(default)]
    pub models: Vec<ModelConfig>,
}

fn default_satellite_iname() -> String {
    "SatelliteBasic".to_string()
}

fn default_ground_station_iname() -> String {
    "GSBasic".to_string()
}

impl NodeConfig {
    pub fn node_id(&self) -> u32 {
        match self {
            NodeConfig::Satellite(sat) => sat.node_id,
            NodeConfig::GroundStation(gs) => gs.node_id,
        }
    }

    pub fn iname(&self) -> &str {
        match self {
            NodeConfig::Satellite(sat) => &sat.iname,
            NodeConfig::GroundStation(gs) => &gs.iname,
        }
    }

    /// シナリオ上の種別文字列（"SAT" / "GS"）
    pub fn type_name(&self) -> &'static str {
        match self {
            NodeConfig::Satellite(_) => "SAT",
            NodeConfig::GroundStation(_) => "GS",
        }
    }

    pub fn log_level(&self) -> NodeLogLevel {
        match self {
            NodeConfig::Satellite(sat) => sat.log_level,
            NodeConfig::GroundStation(gs) => gs.log_level,
        }
    }

    pub fn models(&self) -> &[ModelConfig] {
        match self {
            NodeConfig::Satellite(sat) => &sat.models,
            NodeConfig::GroundStation(gs) => &gs.models,
        }
    }
}

/// モデル設定。`iname` 以外のキーは自由形式のパラメータ
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelConfig {
    pub iname: String,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl ModelConfig {
    /// パラメータをモデル固有の型へ変換
    pub fn params_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.params.clone()))
    }
}

/// シミュレーション時間設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimTimeConfig {
    #[serde(rename = "starttime")]
    pub start_time: String,
    #[serde(rename = "endtime")]
    pub end_time: String,
    /// 時間刻み（秒）
    pub delta: f64,
}

impl SimTimeConfig {
    pub fn clock(&self) -> Result<SimClock, SimTimeError> {
        SimClock::new(&self.start_time, &self.end_time, self.delta)
    }
}

/// ログ出力設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimLogSetup {
    #[serde(rename = "loghandler")]
    pub log_handler: String,
    #[serde(rename = "logfolder", default = "default_log_folder")]
    pub log_folder: PathBuf,
    #[serde(rename = "logchunksize", default, skip_serializing_if = "Option::is_none")]
    pub log_chunk_size: Option<u64>,
}

fn default_log_folder() -> PathBuf {
    PathBuf::from("logs")
}

impl ScenarioConfig {
    /// シナリオファイルを読み込み
    ///
    /// 拡張子が `.yaml` / `.yml` の場合は YAML、それ以外は JSON として解析します。
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();

        // ファイル存在チェック
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.to_path_buf()));
        }

        let contents = fs::read_to_string(path).map_err(|e| ScenarioError::Io(path.to_path_buf(), e))?;

        let is_yaml = matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("yaml") | Some("yml")
        );
        let config: ScenarioConfig = if is_yaml {
            serde_yaml::from_str(&contents).map_err(|e| ScenarioError::Yaml(path.to_path_buf(), e))?
        } else {
            serde_json::from_str(&contents).map_err(|e| ScenarioError::Json(path.to_path_buf(), e))?
        };

        config.validate()?;
        Ok(config)
    }

    /// JSON 文字列から読み込み
    pub fn from_json_str(contents: &str) -> Result<Self, ScenarioError> {
        let config: ScenarioConfig =
            serde_json::from_str(contents).map_err(|e| ScenarioError::Json(PathBuf::from("<memory>"), e))?;
        config.validate()?;
        Ok(config)
    }

    /// 設定の検証
    pub fn validate(&self) -> Result<(), ScenarioError> {
        // 時間設定の検証
        self.simtime.clock()?;

        if self.topologies.is_empty() {
            return Err(ScenarioError::Validation("topologies must not be empty".to_string()));
        }

        let mut topology_ids = HashSet::new();
        for topology in &self.topologies {
            if topology.name.trim().is_empty() {
                return Err(ScenarioError::Validation(format!(
                    "topology {} has an empty name",
                    topology.id
                )));
            }
            if !topology_ids.insert(topology.id) {
                return Err(ScenarioError::Validation(format!(
                    "duplicate topology id {}",
                    topology.id
                )));
            }

            let mut node_ids = HashSet::new();
            for node in &topology.nodes {
                if !node_ids.insert(node.node_id()) {
                    return Err(ScenarioError::Validation(format!(
                        "duplicate node id {} in topology {}",
                        node.node_id(),
                        topology.id
                    )));
                }
                self.validate_node(topology, node)?;
            }
        }

        Ok(())
    }

    fn validate_node(&self, topology: &TopologyConfig, node: &NodeConfig) -> Result<(), ScenarioError> {
        match node {
            NodeConfig::Satellite(sat) => {
                OrbitalElements::parse(&sat.tle_line1, &sat.tle_line2).map_err(|e| {
                    ScenarioError::Validation(format!(
                        "satellite {} in topology {}: {}",
                        sat.node_id, topology.id, e
                    ))
                })?;
            }
            NodeConfig::GroundStation(gs) => {
                if !(-90.0..=90.0).contains(&gs.latitude) {
                    return Err(ScenarioError::Validation(format!(
                        "ground station {} latitude {} out of range [-90, 90]",
                        gs.node_id, gs.latitude
                    )));
                }
                if !(-180.0..=180.0).contains(&gs.longitude) {
                    return Err(ScenarioError::Validation(format!(
                        "ground station {} longitude {} out of range [-180, 180]",
                        gs.node_id, gs.longitude
                    )));
                }
            }
        }

        if let Some(model) = node.models().iter().find(|m| m.iname.trim().is_empty()) {
            return Err(ScenarioError::Validation(format!(
                "node {} in topology {} has a model without iname ({:?})",
                node.node_id(),
                topology.id,
                model.params
            )));
        }

        Ok(())
    }

    /// 全トポロジーのノード数
    pub fn node_count(&self) -> usize {
        self.topologies.iter().map(|t| t.nodes.len()).sum()
    }

    /// モデル iname ごとの割り当て数
    pub fn model_usage(&self) -> BTreeMap<&str, usize> {
        let mut usage = BTreeMap::new();
        for node in self.topologies.iter().flat_map(|t| &t.nodes) {
            for model in node.models() {
                *usage.entry(model.iname.as_str()).or_insert(0) += 1;
            }
        }
        usage
    }

    /// シナリオの概要を表示
    pub fn print_summary(&self) {
        println!("=== シミュレーション時間 ===");
        println!("開始時刻: {}", self.simtime.start_time);
        println!("終了時刻: {}", self.simtime.end_time);
        println!("時間刻み: {:.3}秒", self.simtime.delta);
        if let Ok(clock) = self.simtime.clock() {
            println!("ステップ数: {}", clock.num_steps);
        }
        println!();

        println!("=== トポロジー ===");
        for topology in &self.topologies {
            let satellites = topology
                .nodes
                .iter()
                .filter(|n| matches!(n, NodeConfig::Satellite(_)))
                .count();
            let ground_stations = topology.nodes.len() - satellites;
            println!(
                "  {} (ID: {}): 衛星 {}機, 地上局 {}局",
                topology.name, topology.id, satellites, ground_stations
            );
            if let Some(isl) = &topology.isl_topology {
                println!("    衛星間リンク: {}", isl.display());
            }
        }
        println!();

        println!("=== モデル ===");
        for (iname, count) in self.model_usage() {
            println!("  {}: {}ノード", iname, count);
        }
        println!();

        println!("=== ログ設定 ===");
        println!("ハンドラ: {}", self.simlogsetup.log_handler);
        println!("出力フォルダ: {}", self.simlogsetup.log_folder.display());
        if let Some(chunk_size) = self.simlogsetup.log_chunk_size {
            println!("チャンクサイズ: {}", chunk_size);
        }
    }
}

/// シナリオ読み込みエラー
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("シナリオファイルが見つかりません: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("ファイル読み込みエラー {}: {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),
    #[error("JSON解析エラー {}: {}", .0.display(), .1)]
    Json(PathBuf, #[source] serde_json::Error),
    #[error("YAML解析エラー {}: {}", .0.display(), .1)]
    Yaml(PathBuf, #[source] serde_yaml::Error),
    #[error("時間設定エラー: {0}")]
    SimTime(#[from] SimTimeError),
    #[error("設定検証エラー: {0}")]
    Validation(String),
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_cdn_scenario() {
        let config = ScenarioConfig::from_json_str(&cdn_scenario_json()).unwrap();
        assert_eq!(config.topologies.len(), 1);
        assert_eq!(config.node_count(), 2);

        let topology = &config.topologies[0];
        assert_eq!(topology.name, "Constln1");
        assert!(topology.isl_topology.is_none());

        match &topology.nodes[0] {
            NodeConfig::Satellite(sat) => {
                assert_eq!(sat.node_id, 1);
                assert_eq!(sat.log_level, NodeLogLevel::All);
                assert_eq!(sat.models.len(), 3);
                assert_eq!(sat.models[1].params["cache_size"], 15);
                assert_eq!(sat.models[1].params["cache_eviction_strategy"], "LRU");
            }
            other => panic!("expected satellite, got {:?}", other),
        }
        match &topology.nodes[1] {
            NodeConfig::GroundStation(gs) => {
                assert_eq!(gs.iname, "GSBasic");
                assert_eq!(gs.log_level, NodeLogLevel::Info);
                assert_eq!(gs.models[0].iname, "ModelCDNUser");
                assert!(!gs.models[0].params.contains_key("iname"));
            }
            other => panic!("expected ground station, got {:?}", other),
        }

        assert_eq!(config.simtime.delta, 10.0);
        assert_eq!(config.simtime.clock().unwrap().num_steps, 6);
        assert_eq!(config.simlogsetup.log_chunk_size, Some(1_000_000));

        let usage = config.model_usage();
        assert_eq!(usage["ModelHelperFoVWithElevation"], 2);
        assert_eq!(usage["ModelCDNProvider"], 1);
    }

    #[test]
    fn test_defaults_for_optional_fields() {
        let json = cdn_scenario_json()
            .replace(r#""iname": "GSBasic","#, "")
            .replace(r#""loglevel": "info","#, "");
        let config = ScenarioConfig::from_json_str(&json).unwrap();
        let gs = &config.topologies[0].nodes[1];
        assert_eq!(gs.iname(), "GSBasic");
        assert_eq!(gs.log_level(), NodeLogLevel::Info);
        assert_eq!(gs.type_name(), "GS");
    }

    #[test]
    fn test_unknown_node_type_is_rejected() {
        let json = cdn_scenario_json().replace(r#""type": "GS""#, r#""type": "BALLOON""#);
        assert!(matches!(
            ScenarioConfig::from_json_str(&json),
            Err(ScenarioError::Json(..))
        ));
    }

    #[test]
    fn test_validation_errors() {
        let dup = cdn_scenario_json().replace(r#""nodeid": 2"#, r#""nodeid": 1"#);
        assert!(matches!(
            ScenarioConfig::from_json_str(&dup),
            Err(ScenarioError::Validation(msg)) if msg.contains("duplicate node id 1")
        ));

        let lat = cdn_scenario_json().replace(r#""latitude": 0.0"#, r#""latitude": 91.0"#);
        assert!(matches!(
            ScenarioConfig::from_json_str(&lat),
            Err(ScenarioError::Validation(msg)) if msg.contains("latitude")
        ));

        let tle = cdn_scenario_json().replace("9994", "9990");
        assert!(matches!(
            ScenarioConfig::from_json_str(&tle),
            Err(ScenarioError::Validation(msg)) if msg.contains("satellite 1")
        ));

        let delta = cdn_scenario_json().replace(r#""delta": 10.0"#, r#""delta": -1.0"#);
        assert!(matches!(
            ScenarioConfig::from_json_str(&delta),
            Err(ScenarioError::SimTime(SimTimeError::NonPositiveDelta(_)))
        ));

        let empty_iname = cdn_scenario_json().replace(r#""iname": "ModelFixedOrbit""#, r#""iname": """#);
        assert!(matches!(
            ScenarioConfig::from_json_str(&empty_iname),
            Err(ScenarioError::Validation(msg)) if msg.contains("without iname")
        ));

        let lon = cdn_scenario_json().replace(r#""longitude": 0.0"#, r#""longitude": 181.0"#);
        assert!(matches!(
            ScenarioConfig::from_json_str(&lon),
            Err(ScenarioError::Validation(msg)) if msg.contains("longitude 181")
        ));

        let blank_name = cdn_scenario_json().replace(r#""name": "Constln1""#, r#""name": "  ""#);
        assert!(matches!(
            ScenarioConfig::from_json_str(&blank_name),
            Err(ScenarioError::Validation(msg)) if msg.contains("topology 0 has an empty name")
        ));

        let no_topologies = edit_topologies(|topologies| topologies.clear());
        assert!(matches!(
            ScenarioConfig::from_json_str(&no_topologies),
            Err(ScenarioError::Validation(msg)) if msg.contains("topologies must not be empty")
        ));

        let dup_topology = edit_topologies(|topologies| {
            let mut second = topologies[0].clone();
            second["name"] = Value::from("Constln2");
            topologies.push(second);
        });
        assert!(matches!(
            ScenarioConfig::from_json_str(&dup_topology),
            Err(ScenarioError::Validation(msg)) if msg.contains("duplicate topology id 0")
        ));
    }

    /// テスト用シナリオの `topologies` 配列を書き換える
    fn edit_topologies(edit: impl FnOnce(&mut Vec<Value>)) -> String {
        let mut doc: Value = serde_json::from_str(&cdn_scenario_json()).unwrap();
        edit(doc["topologies"].as_array_mut().unwrap());
        doc.to_string()
    }

    #[test]
    fn test_from_file_json_and_yaml() {
        let dir = tempfile::tempdir().unwrap();

        let json_path = dir.path().join("scenario.json");
        let mut file = fs::File::create(&json_path).unwrap();
        file.write_all(cdn_scenario_json().as_bytes()).unwrap();
        let from_json = ScenarioConfig::from_file(&json_path).unwrap();

        let yaml_path = dir.path().join("scenario.yaml");
        fs::write(&yaml_path, serde_yaml::to_string(&from_json).unwrap()).unwrap();
        let from_yaml = ScenarioConfig::from_file(&yaml_path).unwrap();
        assert_eq!(from_yaml.node_count(), 2);
        assert_eq!(from_yaml.topologies[0].nodes[0].models()[1].params["cache_size"], 15);

        let yml_path = dir.path().join("scenario.yml");
        fs::copy(&yaml_path, &yml_path).unwrap();
        let from_yml = ScenarioConfig::from_file(&yml_path).unwrap();
        assert_eq!(from_yml.topologies[0].name, "Constln1");
        assert_eq!(from_yml.node_count(), 2);

        // .yml は YAML として解析される
        let broken_yml = dir.path().join("broken.yml");
        fs::write(&broken_yml, "topologies: [").unwrap();
        assert!(matches!(
            ScenarioConfig::from_file(&broken_yml),
            Err(ScenarioError::Yaml(..))
        ));

        assert!(matches!(
            ScenarioConfig::from_file(dir.path().join("missing.json")),
            Err(ScenarioError::FileNotFound(_))
        ));
    }
}
