//! # satsim
//!
//! 衛星コンステレーションと地上局からなるネットワーク上で、CDN キャッシュの
//! シナリオを固定時間刻みで実行するシミュレータです。
//!
//! - [`scenario`]: シナリオ設定（JSON / YAML）の読み込みと検証
//! - [`orchestrator`]: トポロジー・ノードの構築とモデルの割り当て
//! - [`simulation`]: シミュレーションエンジン
//!
//! 軌道伝搬、キャッシュ追い出し、リクエストの振り分けは実装せず、
//! それらの設定値の解析と検証のみを行います。

pub mod logging;
pub mod models;
pub mod node;
pub mod orchestrator;
pub mod scenario;
pub mod simtime;
pub mod simulation;
pub mod tle;
pub mod topology;
