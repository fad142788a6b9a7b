//! # Simulation モジュール
//!
//! 固定時間刻みでノードを実行するシミュレーションエンジンを提供します。
//!
//! ## 1ステップの処理
//!
//! 各トポロジーについて以下を行います：
//!
//! 1. **位置の写し作成**: ステップ時刻における全ノードの位置を [`StepSnapshot`] にまとめる
//! 2. **ノード実行**: 各ノードのモデルを設定順に実行し、ノードの時刻を1刻み進める
//!
//! ワーカー数が2以上の場合、ノードは tokio のブロッキングスレッド上で並列に実行され、
//! ステップの終わりで全ノードの完了を待ち合わせます。
//!
//! ## 使用例
//!
//! ```no_run
//! use satsim::orchestrator::Orchestrator;
//! use satsim::scenario::ScenarioConfig;
//! use satsim::simulation::SimulationEngine;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ScenarioConfig::from_file("scenarios/cdn.json")?;
//! let env = Orchestrator::new(config).build()?;
//! let mut engine = SimulationEngine::new(env, 4)?;
//! engine.run()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use chrono::NaiveDateTime;
use thiserror::Error;
use tokio::runtime::Runtime;
use tokio::task::JoinError;
use tracing::{debug, info, trace};

use crate::models::Location;
use crate::node::Node;
use crate::orchestrator::SimEnv;
use crate::simtime::{format_time, SimClock};
use crate::topology::{StepSnapshot, Topology, TopologyError};

/// `node_info` で取得する情報の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoType {
    Time,
    Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeInfo {
    /// ノードが次に実行する時刻
    Time(NaiveDateTime),
    /// ノードの現在時刻における位置（不明なら None）
    Position(Option<Location>),
}

pub struct SimulationEngine {
    topologies: Vec<Topology>,
    clock: SimClock,
    workers: usize,
    current_step: u64,
    runtime: Option<Runtime>,
    /// 並列実行中にノードが失われたか
    halted: bool,
}

impl SimulationEngine {
    pub fn new(env: SimEnv, workers: usize) -> Result<Self, SimulationError> {
        let workers = workers.max(1);
        let runtime = if workers > 1 {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(workers)
                .max_blocking_threads(workers)
                .thread_name("satsim-worker")
                .build()
                .map_err(SimulationError::Runtime)?;
            Some(runtime)
        } else {
            None
        };

        Ok(Self {
            topologies: env.topologies,
            clock: env.clock,
            workers,
            current_step: 0,
            runtime,
            halted: false,
        })
    }

    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// 実行済みステップ数
    pub fn current_step(&self) -> u64 {
        self.current_step
    }

    /// ノードの異常終了により停止している場合は true
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    fn ensure_running(&self) -> Result<(), SimulationError> {
        if self.halted {
            return Err(SimulationError::Halted);
        }
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.current_step >= self.clock.num_steps
    }

    pub fn topologies(&self) -> &[Topology] {
        &self.topologies
    }

    pub fn topology(&self, topology_id: u32) -> Option<&Topology> {
        self.topologies.iter().find(|t| t.id() == topology_id)
    }

    fn topology_mut(&mut self, topology_id: u32) -> Result<&mut Topology, SimulationError> {
        self.topologies
            .iter_mut()
            .find(|t| t.id() == topology_id)
            .ok_or(SimulationError::TopologyNotFound(topology_id))
    }

    /// 全ステップを実行
    pub fn run(&mut self) -> Result<(), SimulationError> {
        info!("=== シミュレーション実行開始 ===");
        info!(
            "期間: {} 〜 {} (刻み {}秒, {}ステップ, ワーカー {})",
            format_time(&self.clock.start),
            format_time(&self.clock.end),
            self.clock.delta_s,
            self.clock.num_steps,
            self.workers
        );

        while self.run_one_step()? {}

        info!("=== シミュレーション完了 ===");
        info!("総ステップ数: {}", self.current_step);
        Ok(())
    }

    /// 指定ステップに到達するまで実行して停止
    ///
    /// 既に到達済み、または総ステップ数を超える場合はそれぞれ何もしない・最後まで実行します。
    pub fn run_until(&mut self, step: u64) -> Result<(), SimulationError> {
        while self.current_step < step && self.run_one_step()? {}
        debug!("ステップ {} で停止", self.current_step);
        Ok(())
    }

    /// 1ステップ実行。全ステップ実行済みなら false
    ///
    /// 並列実行中にノードが異常終了した場合、残りのノードを戻したうえでエラーを返し、
    /// 以降の操作はすべて [`SimulationError::Halted`] になります。
    pub fn run_one_step(&mut self) -> Result<bool, SimulationError> {
        self.ensure_running()?;
        if self.is_finished() {
            return Ok(false);
        }

        let time = self.clock.time_at(self.current_step);
        trace!("ステップ {} ({})", self.current_step, format_time(&time));

        for topology in &mut self.topologies {
            let snapshot = topology.snapshot(time);
            match &self.runtime {
                Some(runtime) => {
                    let nodes = topology.take_nodes();
                    let (nodes, failure) = execute_parallel(runtime, nodes, Arc::new(snapshot));
                    topology.restore_nodes(nodes);
                    if let Some(e) = failure {
                        self.halted = true;
                        return Err(SimulationError::Worker(e));
                    }
                }
                None => {
                    for node in topology.nodes_mut() {
                        node.execute(&snapshot);
                    }
                }
            }
        }

        self.current_step += 1;
        self.log_progress();
        Ok(true)
    }

    fn log_progress(&self) {
        let interval = (self.clock.num_steps / 10).max(1);
        if self.current_step % interval == 0 || self.is_finished() {
            let progress = self.current_step as f64 / self.clock.num_steps as f64 * 100.0;
            info!(
                "進行状況: {:.1}% ({}/{}ステップ)",
                progress, self.current_step, self.clock.num_steps
            );
        }
    }

    pub fn node_info(
        &self,
        topology_id: u32,
        node_id: u32,
        info_type: InfoType,
    ) -> Result<NodeInfo, SimulationError> {
        self.ensure_running()?;
        let topology = self
            .topology(topology_id)
            .ok_or(SimulationError::TopologyNotFound(topology_id))?;
        let node = topology.node(node_id).ok_or_else(|| TopologyError::NodeNotFound {
            topology: topology.name().to_string(),
            node_id,
        })?;

        let info = match info_type {
            InfoType::Time => NodeInfo::Time(node.timestamp()),
            InfoType::Position => NodeInfo::Position(node.position_at(&node.timestamp())),
        };
        Ok(info)
    }

    /// 衛星位置を外部から与える
    pub fn update_position(
        &mut self,
        topology_id: u32,
        node_id: u32,
        time: NaiveDateTime,
        location: Location,
    ) -> Result<(), SimulationError> {
        self.ensure_running()?;
        self.topology_mut(topology_id)?
            .update_position(node_id, time, location)?;
        Ok(())
    }
}

/// ノードをブロッキングスレッドへ移して実行し、元の順序で返す
///
/// 全タスクの完了を待ち、異常終了したノードを除いて返します。失敗は最初の1件のみ返します。
fn execute_parallel(
    runtime: &Runtime,
    nodes: Vec<Node>,
    snapshot: Arc<StepSnapshot>,
) -> (Vec<Node>, Option<JoinError>) {
    runtime.block_on(async move {
        let handles: Vec<_> = nodes
            .into_iter()
            .map(|mut node| {
                let snapshot = Arc::clone(&snapshot);
                tokio::task::spawn_blocking(move || {
                    node.execute(&snapshot);
                    node
                })
            })
            .collect();

        let mut executed = Vec::with_capacity(handles.len());
        let mut failure = None;
        for handle in handles {
            match handle.await {
                Ok(node) => executed.push(node),
                Err(e) if failure.is_none() => failure = Some(e),
                Err(_) => {}
            }
        }
        (executed, failure)
    })
}

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("ワーカーランタイムを作成できません: {0}")]
    Runtime(#[source] std::io::Error),
    #[error("ノードの並列実行に失敗しました: {0}")]
    Worker(#[from] JoinError),
    #[error("ノードの異常終了により停止しています")]
    Halted,
    #[error("トポロジーID {0} がありません")]
    TopologyNotFound(u32),
    #[error(transparent)]
    Topology(#[from] TopologyError),
}
