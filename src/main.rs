use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use asana_coach::analysis::Analyzer;
use asana_coach::config::Config;
use asana_coach::flexibility::Flexibility;
use asana_coach::pose::{PoseSnapshot, StaticSource};

const CONFIG_PATH: &str = "config.toml";

/// 関節座標のJSONから姿勢を判定し、フィードバックを出力する
#[derive(Debug, Parser)]
#[command(name = "asana-coach", version, about)]
struct Cli {
    /// 姿勢スナップショットのJSON（関節名 → {x, y, confidence}、null = 姿勢なし）。省略時は標準入力
    input: Option<PathBuf>,

    /// 柔軟性ティア（設定ファイルより優先）
    #[arg(short, long, value_enum)]
    flexibility: Option<Flexibility>,

    /// 設定ファイル
    #[arg(short, long, default_value = CONFIG_PATH)]
    config: PathBuf,

    /// 姿勢カタログ (JSON)
    #[arg(long)]
    catalogue: Option<String>,

    /// 知識テーブル (JSON)
    #[arg(long)]
    knowledge: Option<String>,

    /// 整形して出力
    #[arg(long)]
    pretty: bool,

    /// デバッグログを出す
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Serialize)]
struct ErrorOutput<'a> {
    error: &'a str,
    message: String,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(io::stderr)
        .init();

    let mut config = Config::load_or_default(&cli.config);
    if let Some(flexibility) = cli.flexibility {
        config.analysis.flexibility = flexibility;
    }
    if cli.catalogue.is_some() {
        config.analysis.catalogue_path = cli.catalogue.clone();
    }
    if cli.knowledge.is_some() {
        config.analysis.knowledge_path = cli.knowledge.clone();
    }

    let analyzer = Analyzer::from_config(&config.analysis);
    info!(
        postures = analyzer.catalogue().len(),
        flexibility = %analyzer.flexibility(),
        "analyzer ready"
    );

    let detection = read_snapshot(cli.input.as_ref())?;
    debug!(joints = detection.as_ref().map(|s| s.len()), "snapshot loaded");

    let mut source = StaticSource::new(detection);
    let (json, code) = match analyzer.analyze_source(&mut source, &()) {
        Ok(report) => (to_json(&report, cli.pretty)?, ExitCode::SUCCESS),
        Err(e) => {
            let output = ErrorOutput { error: e.kind(), message: e.to_string() };
            (to_json(&output, cli.pretty)?, ExitCode::FAILURE)
        }
    };
    println!("{}", json);
    Ok(code)
}

fn read_snapshot(path: Option<&PathBuf>) -> Result<Option<PoseSnapshot>> {
    let content = match path {
        Some(path) if path.as_os_str() != "-" => fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot {}", path.display()))?,
        _ => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf).context("Failed to read stdin")?;
            buf
        }
    };
    serde_json::from_str(&content).context("Failed to parse snapshot JSON")
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(json)
}
