use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::models::{visible_nodes, Location, VisibleNode};
use crate::node::{Node, NodeType};

/// あるステップ時刻における全ノード位置の写し
///
/// ノードの実行中はこの写しのみを参照し、他ノードの状態を直接読みません。
#[derive(Debug, Clone, PartialEq)]
pub struct StepSnapshot {
    pub topology_id: u32,
    pub time: NaiveDateTime,
    entries: Vec<SnapshotEntry>,
}

/// 位置が判明しているノード
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapshotEntry {
    pub node_id: u32,
    pub node_type: NodeType,
    pub location: Location,
}

impl StepSnapshot {
    pub fn new(topology_id: u32, time: NaiveDateTime, entries: Vec<SnapshotEntry>) -> Self {
        Self {
            topology_id,
            time,
            entries,
        }
    }

    pub fn entries(&self) -> &[SnapshotEntry] {
        &self.entries
    }

    pub fn location_of(&self, node_id: u32) -> Option<Location> {
        self.entry(node_id).map(|entry| entry.location)
    }

    fn entry(&self, node_id: u32) -> Option<&SnapshotEntry> {
        self.entries.iter().find(|entry| entry.node_id == node_id)
    }

    /// 観測ノードから最低仰角以上に見える指定種別のノード
    ///
    /// 観測ノードの位置が不明な場合は None。観測ノード自身は含みません。
    pub fn view_from(&self, observer: u32, target: NodeType, min_elevation_deg: f64) -> Option<Vec<VisibleNode>> {
        let observer = self.entry(observer)?;
        let candidates = self
            .entries
            .iter()
            .filter(|entry| entry.node_type == target && entry.node_id != observer.node_id)
            .map(|entry| (entry.node_id, entry.location));
        Some(visible_nodes(
            &observer.location,
            observer.node_type == NodeType::Gs,
            candidates,
            min_elevation_deg,
        ))
    }
}

/// 衛星間リンクの隣接グラフ
///
/// JSON 形式 `{ "<ノードID>": ["<ノードID>", ...] }` から読み込みます。
#[derive(Debug, Clone, Default)]
pub struct IslGraph {
    adjacency: HashMap<u32, Vec<u32>>,
    /// 始点ごとの BFS 結果
    distances: HashMap<u32, HashMap<u32, u32>>,
}

impl IslGraph {
    pub fn new(adjacency: HashMap<u32, Vec<u32>>) -> Self {
        Self {
            adjacency,
            distances: HashMap::new(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, TopologyError> {
        let contents = fs::read_to_string(path).map_err(|e| TopologyError::IslIo(path.to_path_buf(), e))?;
        Self::from_json_str(&contents).map_err(|e| match e {
            TopologyError::IslFormat(_, reason) => TopologyError::IslFormat(path.to_path_buf(), reason),
            other => other,
        })
    }

    pub fn from_json_str(contents: &str) -> Result<Self, TopologyError> {
        let format_error = |reason: String| TopologyError::IslFormat(PathBuf::new(), reason);
        let raw: HashMap<String, Vec<String>> =
            serde_json::from_str(contents).map_err(|e| format_error(e.to_string()))?;

        let parse_id = |id: &str| {
            id.trim()
                .parse::<u32>()
                .map_err(|_| format_error(format!("ノードIDが整数ではありません: {}", id)))
        };

        let mut adjacency = HashMap::with_capacity(raw.len());
        for (node, neighbors) in &raw {
            let neighbors = neighbors
                .iter()
                .map(|id| parse_id(id))
                .collect::<Result<Vec<_>, _>>()?;
            adjacency.insert(parse_id(node)?, neighbors);
        }
        Ok(Self::new(adjacency))
    }

    pub fn neighbors(&self, node_id: u32) -> &[u32] {
        self.adjacency.get(&node_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 最短ホップ数。到達できない場合は None
    pub fn hop_distance(&mut self, from: u32, to: u32) -> Option<u32> {
        if !self.distances.contains_key(&from) {
            let table = self.bfs(from);
            self.distances.insert(from, table);
        }
        self.distances.get(&from)?.get(&to).copied()
    }

    fn bfs(&self, from: u32) -> HashMap<u32, u32> {
        let mut distances = HashMap::new();
        let mut queue = VecDeque::new();
        distances.insert(from, 0);
        queue.push_back(from);

        while let Some(current) = queue.pop_front() {
            let hops = distances[&current];
            for &neighbor in self.neighbors(current) {
                if !distances.contains_key(&neighbor) {
                    distances.insert(neighbor, hops + 1);
                    queue.push_back(neighbor);
                }
            }
        }
        distances
    }
}

/// ノードの集合（コンステレーション）
#[derive(Debug)]
pub struct Topology {
    id: u32,
    name: String,
    nodes: Vec<Node>,
    index: HashMap<u32, usize>,
    isl: Option<IslGraph>,
}

impl Topology {
    pub fn new(name: impl Into<String>, id: u32) -> Self {
        Self {
            id,
            name: name.into(),
            nodes: Vec::new(),
            index: HashMap::new(),
            isl: None,
        }
    }

    pub fn with_isl(mut self, isl: IslGraph) -> Self {
        self.isl = Some(isl);
        self
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_node(&mut self, node: Node) -> Result<(), TopologyError> {
        if self.index.contains_key(&node.id()) {
            return Err(TopologyError::DuplicateNode {
                topology: self.name.clone(),
                node_id: node.id(),
            });
        }
        self.index.insert(node.id(), self.nodes.len());
        self.nodes.push(node);
        Ok(())
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub(crate) fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.iter_mut()
    }

    pub fn node(&self, node_id: u32) -> Option<&Node> {
        self.index.get(&node_id).map(|&i| &self.nodes[i])
    }

    pub fn node_mut(&mut self, node_id: u32) -> Option<&mut Node> {
        self.index.get(&node_id).map(|&i| &mut self.nodes[i])
    }

    pub fn nodes_of_type(&self, node_type: NodeType) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(move |node| node.node_type() == node_type)
    }

    /// 衛星間リンク。ホップ数の計算結果を保持するため可変参照で返す
    pub fn isl_mut(&mut self) -> Option<&mut IslGraph> {
        self.isl.as_mut()
    }

    /// ノードを取り出す。戻すまでトポロジーは空になる
    pub(crate) fn take_nodes(&mut self) -> Vec<Node> {
        std::mem::take(&mut self.nodes)
    }

    /// `take_nodes` で取り出したノードを戻し、索引を作り直す
    ///
    /// 取り出し後に失われたノードは索引からも消えます。
    pub(crate) fn restore_nodes(&mut self, nodes: Vec<Node>) {
        self.index = nodes.iter().enumerate().map(|(i, node)| (node.id(), i)).collect();
        self.nodes = nodes;
    }

    /// 衛星位置を外部から与える
    pub fn update_position(
        &mut self,
        node_id: u32,
        time: NaiveDateTime,
        location: Location,
    ) -> Result<(), TopologyError> {
        let topology = self.name.clone();
        let node = self
            .node_mut(node_id)
            .ok_or(TopologyError::NodeNotFound { topology, node_id })?;
        if !node.update_position(time, location) {
            return Err(TopologyError::FixedPosition(node_id));
        }
        Ok(())
    }

    pub fn snapshot(&self, time: NaiveDateTime) -> StepSnapshot {
        let entries = self
            .nodes
            .iter()
            .filter_map(|node| {
                node.position_at(&time).map(|location| SnapshotEntry {
                    node_id: node.id(),
                    node_type: node.node_type(),
                    location,
                })
            })
            .collect();
        StepSnapshot::new(self.id, time, entries)
    }

    /// 指定ノードの視野モデルを用いて、時刻 `time` に見える指定種別のノードを取得
    ///
    /// 視野モデルが無い、または位置が不明な場合は Ok(None)。
    pub fn view_from(
        &self,
        node_id: u32,
        time: NaiveDateTime,
        target: NodeType,
    ) -> Result<Option<Vec<VisibleNode>>, TopologyError> {
        let node = self.node(node_id).ok_or_else(|| TopologyError::NodeNotFound {
            topology: self.name.clone(),
            node_id,
        })?;
        let Some(min_elevation) = node.fov_min_elevation() else {
            return Ok(None);
        };
        Ok(self.snapshot(time).view_from(node_id, target, min_elevation))
    }
}

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("トポロジー {topology} にノードID {node_id} が重複しています")]
    DuplicateNode { topology: String, node_id: u32 },
    #[error("トポロジー {topology} にノードID {node_id} がありません")]
    NodeNotFound { topology: String, node_id: u32 },
    #[error("ノード {0} は固定位置のため位置を更新できません")]
    FixedPosition(u32),
    #[error("衛星間リンクファイルを読み込めません {}: {}", .0.display(), .1)]
    IslIo(PathBuf, #[source] std::io::Error),
    #[error("衛星間リンクファイルの形式が不正です {}: {}", .0.display(), .1)]
    IslFormat(PathBuf, String),
}
