use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;

use crate::logging::NodeLogger;
use crate::models::fov::FovWithElevation;
use crate::models::{Location, ModelContext, ModelTag, SimModel};
use crate::simtime::SimClock;
use crate::tle::OrbitalElements;
use crate::topology::StepSnapshot;

/// ノード種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Sat,
    Gs,
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeType::Sat => write!(f, "SAT"),
            NodeType::Gs => write!(f, "GS"),
        }
    }
}

/// ノードの実装クラス（シナリオの `iname`）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeClass {
    SatelliteBasic,
    GsBasic,
}

impl NodeClass {
    pub fn iname(&self) -> &'static str {
        match self {
            NodeClass::SatelliteBasic => "SatelliteBasic",
            NodeClass::GsBasic => "GSBasic",
        }
    }

    pub fn from_iname(iname: &str) -> Option<Self> {
        match iname {
            "SatelliteBasic" => Some(NodeClass::SatelliteBasic),
            "GSBasic" => Some(NodeClass::GsBasic),
            _ => None,
        }
    }

    pub fn node_type(&self) -> NodeType {
        match self {
            NodeClass::SatelliteBasic => NodeType::Sat,
            NodeClass::GsBasic => NodeType::Gs,
        }
    }
}

/// ノード位置の取得元
#[derive(Debug, Clone, PartialEq)]
pub enum NodePosition {
    /// 地上局などの固定位置
    Fixed(Location),
    /// 時刻ごとに外部から与えられる位置
    Ephemeris(BTreeMap<NaiveDateTime, Location>),
}

/// シミュレーション上のノード
#[derive(Debug)]
pub struct Node {
    id: u32,
    topology_id: u32,
    class: NodeClass,
    clock: SimClock,
    step: u64,
    timestamp: NaiveDateTime,
    position: NodePosition,
    orbit: Option<OrbitalElements>,
    models: Vec<Box<dyn SimModel>>,
    logger: NodeLogger,
}

impl Node {
    /// 衛星ノード。位置は `update_position` で与えられるまで不明
    pub fn satellite(
        id: u32,
        topology_id: u32,
        clock: SimClock,
        orbit: OrbitalElements,
        logger: NodeLogger,
    ) -> Self {
        Self::new(
            id,
            topology_id,
            NodeClass::SatelliteBasic,
            clock,
            NodePosition::Ephemeris(BTreeMap::new()),
            Some(orbit),
            logger,
        )
    }

    /// 地上局ノード
    pub fn ground_station(
        id: u32,
        topology_id: u32,
        clock: SimClock,
        location: Location,
        logger: NodeLogger,
    ) -> Self {
        Self::new(
            id,
            topology_id,
            NodeClass::GsBasic,
            clock,
            NodePosition::Fixed(location),
            None,
            logger,
        )
    }

    fn new(
        id: u32,
        topology_id: u32,
        class: NodeClass,
        clock: SimClock,
        position: NodePosition,
        orbit: Option<OrbitalElements>,
        logger: NodeLogger,
    ) -> Self {
        let timestamp = clock.start;
        Self {
            id,
            topology_id,
            class,
            clock,
            step: 0,
            timestamp,
            position,
            orbit,
            models: Vec::new(),
            logger,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn topology_id(&self) -> u32 {
        self.topology_id
    }

    pub fn class(&self) -> NodeClass {
        self.class
    }

    pub fn node_type(&self) -> NodeType {
        self.class.node_type()
    }

    /// 次に実行する時刻
    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    pub fn logger(&self) -> &NodeLogger {
        &self.logger
    }

    pub fn tle(&self) -> Option<&OrbitalElements> {
        self.orbit.as_ref()
    }

    pub fn add_models(&mut self, models: impl IntoIterator<Item = Box<dyn SimModel>>) {
        self.models.extend(models);
    }

    pub fn models(&self) -> &[Box<dyn SimModel>] {
        &self.models
    }

    pub fn model_by_name(&self, iname: &str) -> Option<&dyn SimModel> {
        self.models
            .iter()
            .find(|model| model.iname() == iname)
            .map(|model| model.as_ref())
    }

    pub fn model_by_tag(&self, tag: ModelTag) -> Option<&dyn SimModel> {
        self.models
            .iter()
            .find(|model| model.tag() == tag)
            .map(|model| model.as_ref())
    }

    /// 指定時刻の位置。エフェメリスに該当時刻が無ければ None
    pub fn position_at(&self, time: &NaiveDateTime) -> Option<Location> {
        match &self.position {
            NodePosition::Fixed(location) => Some(*location),
            NodePosition::Ephemeris(ephemeris) => ephemeris.get(time).copied(),
        }
    }

    /// エフェメリスへ位置を登録。固定位置のノードでは false
    pub fn update_position(&mut self, time: NaiveDateTime, location: Location) -> bool {
        match &mut self.position {
            NodePosition::Fixed(_) => false,
            NodePosition::Ephemeris(ephemeris) => {
                ephemeris.insert(time, location);
                true
            }
        }
    }

    /// 視野モデルの最低仰角
    pub fn fov_min_elevation(&self) -> Option<f64> {
        self.model_by_tag(ModelTag::ViewOfNode)?
            .as_any()
            .downcast_ref::<FovWithElevation>()
            .map(FovWithElevation::min_elevation_deg)
    }

    /// 現在時刻でモデルを順に1回実行し、時刻を1刻み進める
    ///
    /// 終了時刻を過ぎている場合は何もせず false を返します。
    pub fn execute(&mut self, snapshot: &StepSnapshot) -> bool {
        if self.timestamp > self.clock.end {
            return false;
        }

        let time = self.timestamp;
        self.logger.trace(&time, "実行");

        let ctx = ModelContext {
            node_id: self.id,
            node_class: self.class,
            step: self.step,
            time,
            location: self.position_at(&time),
            orbit: self.orbit.as_ref(),
            fov_min_elevation: self.fov_min_elevation(),
            snapshot,
            logger: &self.logger,
        };
        for model in self.models.iter_mut() {
            model.execute(&ctx);
        }

        self.step += 1;
        self.timestamp = self.clock.time_at(self.step);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::NodeLogLevel;
    use crate::models::fov::FOV_WITH_ELEVATION;
    use crate::models::ModelRegistry;
    use crate::scenario::fixtures::{SAT_TLE_1, SAT_TLE_2};
    use crate::scenario::ModelConfig;
    use crate::simtime::parse_time;
    use serde_json::json;

    fn clock() -> SimClock {
        SimClock::new("2022-10-17 12:00:00", "2022-10-17 12:00:30", 10.0).unwrap()
    }

    fn empty_snapshot(time: NaiveDateTime) -> StepSnapshot {
        StepSnapshot::new(0, time, Vec::new())
    }

    #[test]
    fn test_node_class_inames() {
        assert_eq!(NodeClass::from_iname("SatelliteBasic"), Some(NodeClass::SatelliteBasic));
        assert_eq!(NodeClass::from_iname("GSBasic"), Some(NodeClass::GsBasic));
        assert_eq!(NodeClass::from_iname("TrafficScheduler"), None);
        assert_eq!(NodeClass::GsBasic.iname(), "GSBasic");
        assert_eq!(NodeClass::GsBasic.node_type().to_string(), "GS");
    }

    #[test]
    fn test_satellite_ephemeris() {
        let orbit = OrbitalElements::parse(SAT_TLE_1, SAT_TLE_2).unwrap();
        let mut node = Node::satellite(1, 0, clock(), orbit, NodeLogger::new("t_0_SAT_1", NodeLogLevel::Info));
        let t = parse_time("2022-10-17 12:00:10").unwrap();

        assert_eq!(node.position_at(&t), None);
        assert!(node.update_position(t, Location::new(7.0e6, 0.0, 0.0)));
        assert_eq!(node.position_at(&t), Some(Location::new(7.0e6, 0.0, 0.0)));
        assert_eq!(node.tle().map(|tle| tle.catalog_number), Some(50985));
    }

    #[test]
    fn test_ground_station_position_is_fixed() {
        let location = Location::from_geodetic(35.0, 139.0, 0.0);
        let mut node = Node::ground_station(2, 0, clock(), location, NodeLogger::new("t_0_GS_2", NodeLogLevel::Info));
        let t = parse_time("2022-10-17 12:00:20").unwrap();

        assert_eq!(node.position_at(&t), Some(location));
        assert!(!node.update_position(t, Location::new(0.0, 0.0, 0.0)));
        assert!(node.tle().is_none());
    }

    #[test]
    fn test_execute_advances_until_end_time() {
        let location = Location::from_geodetic(0.0, 0.0, 0.0);
        let mut node = Node::ground_station(2, 0, clock(), location, NodeLogger::new("t_0_GS_2", NodeLogLevel::Info));

        // 12:00:00, :10, :20, :30 の4回
        for _ in 0..4 {
            let snapshot = empty_snapshot(node.timestamp());
            assert!(node.execute(&snapshot));
        }
        assert_eq!(node.timestamp(), parse_time("2022-10-17 12:00:40").unwrap());
        assert!(!node.execute(&empty_snapshot(node.timestamp())));
    }

    #[test]
    fn test_model_lookup() {
        let registry = ModelRegistry::builtin();
        let fov: ModelConfig =
            serde_json::from_value(json!({ "iname": FOV_WITH_ELEVATION, "min_elevation": 10.0 })).unwrap();
        let location = Location::from_geodetic(0.0, 0.0, 0.0);
        let mut node = Node::ground_station(2, 0, clock(), location, NodeLogger::new("t_0_GS_2", NodeLogLevel::Info));

        assert_eq!(node.fov_min_elevation(), None);
        node.add_models([registry.create(&fov).unwrap()]);
        assert_eq!(node.models().len(), 1);
        assert!(node.model_by_name(FOV_WITH_ELEVATION).is_some());
        assert!(node.model_by_tag(ModelTag::CdnUser).is_none());
        assert_eq!(node.fov_min_elevation(), Some(10.0));
    }
}
