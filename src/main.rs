mod logging;
mod models;
mod scenario;
mod simulation;

use std::str::FromStr;

use clap::{Arg, Command};

use logging::{LogConfig, LogOutput, init_logging, level_from_verbosity};
use scenario::ScenarioConfig;
use simulation::{MissionSession, MissionSnapshot};

fn main() {
    // コマンドライン引数の解析
    let matches = Command::new("fleetsim")
        .version("0.1.0")
        .about("自律フリートミッションシミュレータ (Autonomous Fleet Mission Simulator)")
        .long_about(
            "ウェイポイント追従と反応型障害物回避を行う自律エージェント群の\n\
             ミッションを時間駆動型シミュレーションで再現します。\n\
             センサー喪失・通信断の故障注入に対する挙動も評価できます。",
        )
        .arg(
            Arg::new("scenario")
                .short('s')
                .long("scenario")
                .value_name("FILE")
                .help("シナリオファイル(.yaml)のパスを指定")
                .long_help(
                    "実行するシナリオファイル(.yaml)のパスを指定します。\n\
                     指定しない場合、組み込みデモシナリオで実行されます。",
                ),
        )
        .arg(
            Arg::new("info")
                .short('i')
                .long("info")
                .action(clap::ArgAction::SetTrue)
                .help("シナリオの情報のみ表示して終了"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(clap::ArgAction::Count)
                .help("詳細出力レベル (-v: デバッグ, -vv: トレース)"),
        )
        .arg(
            Arg::new("log-output")
                .long("log-output")
                .value_name("DEST")
                .default_value("console")
                .help("ログ出力先 (console, file, both)"),
        )
        .get_matches();

    println!("自律フリートミッションシミュレータ - fleetsim v0.1.0");
    println!();

    // ログシステムの初期化
    let verbose_level = matches.get_count("verbose");
    let output_arg = matches
        .get_one::<String>("log-output")
        .map(String::as_str)
        .unwrap_or("console");
    let output = match LogOutput::from_str(output_arg) {
        Ok(output) => output,
        Err(e) => {
            eprintln!("エラー: {}", e);
            std::process::exit(1);
        }
    };
    let log_config = LogConfig {
        level: level_from_verbosity(verbose_level),
        output,
        ..LogConfig::default()
    };
    if let Err(e) = init_logging(log_config) {
        eprintln!("エラー: ログ初期化に失敗しました: {}", e);
        std::process::exit(1);
    }

    // シナリオの読み込みと実行
    let result = match matches.get_one::<String>("scenario") {
        Some(path) => run_scenario(path, matches.get_flag("info")),
        None => {
            println!("シナリオファイル未指定のため組み込みデモシナリオを使用します。");
            println!();
            execute_mission(ScenarioConfig::builtin_demo(), matches.get_flag("info"))
        }
    };

    if let Err(e) = result {
        eprintln!("エラー: {}", e);
        std::process::exit(1);
    }
}

/// シナリオファイルを読み込んで実行
fn run_scenario(scenario_path: &str, info_only: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = ScenarioConfig::from_file(scenario_path)?;
    execute_mission(config, info_only)
}

/// ミッションの実行
fn execute_mission(config: ScenarioConfig, info_only: bool) -> Result<(), Box<dyn std::error::Error>> {
    config.print_summary();
    println!();

    if info_only {
        return Ok(());
    }

    let mut session = MissionSession::create(config)?;
    let snapshots = session.run();

    if let Some(last) = snapshots.last() {
        print_final_report(last);
    }

    Ok(())
}

/// ミッション終了時のフリート状況を表示
fn print_final_report(snapshot: &MissionSnapshot) {
    println!();
    println!("=== ミッション終了時のフリート状況 (ステップ {}) ===", snapshot.step);
    for agent in &snapshot.agents {
        println!(
            "{}: mode={} 位置=({:.1},{:.1})",
            agent.id, agent.mode, agent.x, agent.y
        );
        for line in &agent.recent_log {
            println!("    {}", line);
        }
    }
}
