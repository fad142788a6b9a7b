use std::path::{Path, PathBuf};

use clap::{Arg, ArgAction, Command};
use tracing::{info, Level};

use satsim::logging::{init_logging, parse_log_level, LogConfig, LogOutput};
use satsim::orchestrator::Orchestrator;
use satsim::scenario::ScenarioConfig;
use satsim::simulation::SimulationEngine;

fn main() {
    // コマンドライン引数の解析
    let matches = Command::new("satsim")
        .version(env!("CARGO_PKG_VERSION"))
        .about("衛星ネットワーク CDN シミュレーション")
        .long_about("衛星コンステレーションと地上局からなるネットワークのシナリオを\n\
                     固定時間刻みで実行します。")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .required(true)
                .help("シナリオ設定ファイル(.json / .yaml)のパスを指定")
        )
        .arg(
            Arg::new("info")
                .short('i')
                .long("info")
                .action(ArgAction::SetTrue)
                .help("シナリオの情報のみ表示して終了")
        )
        .arg(
            Arg::new("workers")
                .short('w')
                .long("workers")
                .value_name("N")
                .value_parser(clap::value_parser!(usize))
                .default_value("1")
                .help("ノードを並列実行するワーカー数")
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("詳細出力レベル (-v: デバッグ, -vv: トレース)")
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("ログレベルを指定 (trace, debug, info, warn, error)。-v より優先")
        )
        .arg(
            Arg::new("log-output")
                .long("log-output")
                .value_name("OUTPUT")
                .value_parser(clap::value_parser!(LogOutput))
                .help("ログ出力先を上書き (console, file, both)")
        )
        .get_matches();

    let config_path = matches
        .get_one::<String>("config")
        .map(PathBuf::from)
        .unwrap_or_default();
    let options = RunOptions {
        info_only: matches.get_flag("info"),
        workers: matches.get_one::<usize>("workers").copied().unwrap_or(1),
        verbose_level: matches.get_count("verbose"),
        log_output: matches.get_one::<LogOutput>("log-output").copied(),
        log_level: matches.get_one::<String>("log-level").map(|level| parse_log_level(level)),
    };

    if let Err(e) = run(&config_path, &options) {
        eprintln!("エラー: {}", e);
        std::process::exit(1);
    }
}

struct RunOptions {
    info_only: bool,
    workers: usize,
    verbose_level: u8,
    log_output: Option<LogOutput>,
    log_level: Option<Level>,
}

/// シナリオファイルを読み込んで実行
fn run(config_path: &Path, options: &RunOptions) -> Result<(), Box<dyn std::error::Error>> {
    let scenario = ScenarioConfig::from_file(config_path)?;

    if options.info_only {
        scenario.print_summary();
        return Ok(());
    }

    let output = match options.log_output {
        Some(output) => output,
        None => LogOutput::from_log_handler(&scenario.simlogsetup.log_handler)?,
    };
    let level = options.log_level.unwrap_or(match options.verbose_level {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    });
    // ガードを保持している間のみファイルへ書き出される
    let _guard = init_logging(LogConfig {
        level,
        output,
        log_dir: scenario.simlogsetup.log_folder.clone(),
        ..LogConfig::default()
    })?;

    info!("シナリオファイル読み込み完了: {}", config_path.display());
    if options.verbose_level > 0 {
        scenario.print_summary();
    }

    let env = Orchestrator::new(scenario).build()?;
    let mut engine = SimulationEngine::new(env, options.workers)?;
    engine.run()?;

    Ok(())
}
