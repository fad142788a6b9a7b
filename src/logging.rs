//! # Logging モジュール
//!
//! 衛星ネットワークシミュレーションのログ管理機能を提供します。
//!
//! tracing-appender による非同期ファイル出力とコンソール出力を組み合わせ、
//! シナリオの `simlogsetup` セクションで出力先とログフォルダを選択します。
//! ノードごとのログレベル（`loglevel`）は [`NodeLogger`] で判定し、
//! 各イベントにはノード名とシミュレーション時刻がフィールドとして付与されます。
//!
//! ## 設定可能な出力先
//!
//! - `Console`: コンソールのみ（`LoggerCmd`）
//! - `File`: ファイルのみ（`LoggerFile`, `LoggerFileChunkwise`）
//! - `Both`: コンソールとファイルの両方（`LoggerBoth`）

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace, warn, Level};
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt as tracing_fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::simtime::format_time;

/// ログ出力先の設定
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogOutput {
    /// コンソールのみ
    Console,
    /// ファイルのみ
    File,
    /// コンソールとファイルの両方
    Both,
}

impl LogOutput {
    /// シナリオの `loghandler` 名から出力先を決定
    pub fn from_log_handler(handler: &str) -> Result<Self, String> {
        match handler {
            "LoggerCmd" => Ok(LogOutput::Console),
            "LoggerFile" | "LoggerFileChunkwise" => Ok(LogOutput::File),
            "LoggerBoth" => Ok(LogOutput::Both),
            other => other.parse(),
        }
    }
}

impl FromStr for LogOutput {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "console" | "stdout" => Ok(LogOutput::Console),
            "file" => Ok(LogOutput::File),
            "both" | "all" => Ok(LogOutput::Both),
            _ => Err(format!(
                "無効な出力先: {}. 利用可能: LoggerCmd, LoggerFile, LoggerFileChunkwise, LoggerBoth, console, file, both",
                s
            )),
        }
    }
}

/// ログ設定構造体
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// ログレベル
    pub level: Level,
    /// 出力先
    pub output: LogOutput,
    /// ログファイルのディレクトリ（Fileまたは Bothの場合）
    pub log_dir: PathBuf,
    /// ログファイル名のプレフィックス
    pub file_prefix: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            output: LogOutput::Console,
            log_dir: PathBuf::from("logs"),
            file_prefix: "satsim".to_string(),
        }
    }
}

/// ログシステムを初期化
///
/// ファイル出力を伴う場合は非同期書き込みのガードを返します。
/// ガードが破棄されるとバッファがフラッシュされるため、呼び出し側で保持してください。
///
/// ```no_run
/// use satsim::logging::{init_logging, LogConfig, LogOutput};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = LogConfig {
///     output: LogOutput::Both,
///     ..LogConfig::default()
/// };
/// let _guard = init_logging(config)?;
/// # Ok(())
/// # }
/// ```
pub fn init_logging(config: LogConfig) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error>> {
    // 環境変数またはconfigからログレベルを設定
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.level.to_string()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = || {
        tracing_fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
    };

    match config.output {
        LogOutput::Console => {
            Registry::default().with(env_filter).with(console_layer()).try_init()?;
            Ok(None)
        }
        LogOutput::File | LogOutput::Both => {
            ensure_log_directory(&config.log_dir)?;
            let file_appender = rolling::daily(&config.log_dir, &config.file_prefix);
            let (non_blocking_appender, guard) = non_blocking(file_appender);
            let file_layer = tracing_fmt::layer()
                .with_writer(non_blocking_appender)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .json();

            let console = (config.output == LogOutput::Both).then(console_layer);
            Registry::default()
                .with(env_filter)
                .with(console)
                .with(file_layer)
                .try_init()?;
            Ok(Some(guard))
        }
    }
}

/// ログレベルを文字列から解析
///
/// 無効な文字列の場合はINFO
pub fn parse_log_level(level_str: &str) -> Level {
    match level_str.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            eprintln!("警告: 無効なログレベル '{}'. INFOを使用します", level_str);
            Level::INFO
        }
    }
}

/// ログディレクトリが存在しない場合に作成
pub fn ensure_log_directory(log_dir: &Path) -> Result<(), std::io::Error> {
    std::fs::create_dir_all(log_dir)?;
    Ok(())
}

/// ノードごとのログレベル（シナリオの `loglevel`）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeLogLevel {
    All,
    Logic,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl NodeLogLevel {
    pub fn as_filter(&self) -> LevelFilter {
        match self {
            NodeLogLevel::All => LevelFilter::TRACE,
            NodeLogLevel::Logic | NodeLogLevel::Debug => LevelFilter::DEBUG,
            NodeLogLevel::Info => LevelFilter::INFO,
            NodeLogLevel::Warn => LevelFilter::WARN,
            NodeLogLevel::Error => LevelFilter::ERROR,
        }
    }
}

/// ノード単位のロガー
///
/// 名前は `<トポロジー名>_<トポロジーID>_<種別>_<ノードID>` 形式。
#[derive(Debug, Clone)]
pub struct NodeLogger {
    name: String,
    level: LevelFilter,
}

impl NodeLogger {
    pub fn new(name: impl Into<String>, level: NodeLogLevel) -> Self {
        Self {
            name: name.into(),
            level: level.as_filter(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn enabled(&self, level: Level) -> bool {
        level <= self.level
    }

    pub fn log(&self, level: Level, time: &NaiveDateTime, message: impl fmt::Display) {
        if !self.enabled(level) {
            return;
        }
        let sim_time = format_time(time);
        match level {
            Level::ERROR => error!(node = %self.name, sim_time = %sim_time, "{}", message),
            Level::WARN => warn!(node = %self.name, sim_time = %sim_time, "{}", message),
            Level::INFO => info!(node = %self.name, sim_time = %sim_time, "{}", message),
            Level::DEBUG => debug!(node = %self.name, sim_time = %sim_time, "{}", message),
            _ => trace!(node = %self.name, sim_time = %sim_time, "{}", message),
        }
    }

    pub fn info(&self, time: &NaiveDateTime, message: impl fmt::Display) {
        self.log(Level::INFO, time, message);
    }

    pub fn debug(&self, time: &NaiveDateTime, message: impl fmt::Display) {
        self.log(Level::DEBUG, time, message);
    }

    pub fn warn(&self, time: &NaiveDateTime, message: impl fmt::Display) {
        self.log(Level::WARN, time, message);
    }

    pub fn trace(&self, time: &NaiveDateTime, message: impl fmt::Display) {
        self.log(Level::TRACE, time, message);
    }
}
