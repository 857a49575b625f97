//! PCBDXF 命令行程序
//!
//! - `pcbdxf inspect board.dxf`：列出图层、实体类型与单位检测结果
//! - `pcbdxf import board.dxf -o board.py`：生成 JITX 板子代码

mod config;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use pcbdxf_core::prelude::*;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use crate::config::{AppConfig, Overrides};

#[derive(Parser)]
#[command(name = "pcbdxf", version)]
#[command(about = "Import DXF mechanical drawings as JITX board definitions")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Inspect a DXF file and print an entity/layer summary
    Inspect(InspectArgs),
    /// Import a DXF file and generate JITX Python code
    Import(ImportArgs),
}

#[derive(Args)]
struct InspectArgs {
    /// Path to the DXF file
    input: PathBuf,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,

    /// Force unit interpretation (mm, in, mil)
    #[arg(long)]
    unit: Option<LengthUnit>,

    /// Endpoint matching tolerance in drawing units
    #[arg(long)]
    tolerance: Option<f64>,
}

#[derive(Args)]
struct ImportArgs {
    /// Path to the DXF file
    input: PathBuf,

    /// Output Python file path (default: print to stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Name of the generated Board class
    #[arg(long)]
    class_name: Option<String>,

    /// Output only shape expressions instead of a full Board class
    #[arg(long)]
    snippet: bool,

    /// Map a DXF layer to a role (outline, cutout, hole, keepout, soldermask, ignore); repeatable
    #[arg(long = "layer-map", value_name = "LAYER=ROLE", action = ArgAction::Append)]
    layer_map: Vec<String>,

    /// Force unit interpretation (mm, in, mil)
    #[arg(long)]
    unit: Option<LengthUnit>,

    /// Keep drawing coordinates instead of centering the outline at the origin
    #[arg(long)]
    no_recenter: bool,

    /// Endpoint matching tolerance in drawing units
    #[arg(long)]
    tolerance: Option<f64>,

    /// Config file (default: ./pcbdxf.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // 日志写到 stderr，stdout 留给生成的代码
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match cli.command {
        Command::Inspect(args) => run_inspect(&args),
        Command::Import(args) => run_import(&args),
    }
}

fn load(input: &Path) -> Result<Inventory> {
    if !input.is_file() {
        anyhow::bail!("input file not found: {}", input.display());
    }
    pcbdxf_file::load_inventory(input).with_context(|| format!("failed to read {}", input.display()))
}

fn run_inspect(args: &InspectArgs) -> Result<()> {
    let inventory = load(&args.input)?;
    let assembly = AssemblyConfig {
        tolerance: args.tolerance,
        ..Default::default()
    };
    let inspection = inspect(&inventory, &assembly, args.unit);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&inspection)?);
    } else {
        println!("DXF File: {}", args.input.display());
        println!("{}", inspection);
    }
    Ok(())
}

fn run_import(args: &ImportArgs) -> Result<()> {
    let config = AppConfig::load(args.config.as_deref())?;
    let overrides = Overrides {
        class_name: args.class_name.clone(),
        snippet: args.snippet,
        no_recenter: args.no_recenter,
        tolerance: args.tolerance,
        unit: args.unit,
        layer_map: args.layer_map.clone(),
    };
    let mut settings = config.resolve(&overrides)?;

    let inventory = load(&args.input)?;
    let import = import(&inventory, &settings.import)?;

    let file_name = args
        .input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned());
    settings.codegen.module_name = file_name.clone();
    let code = import.generate(&settings.codegen);

    eprintln!("Classified DXF entities from: {}", file_name.unwrap_or_default());
    eprintln!("{}", import.summary());

    match &args.output {
        Some(path) => {
            fs::write(path, &code).with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("  Written to:   {}", path.display());
            info!(path = %path.display(), "wrote board code");
        }
        None => print!("{}", code),
    }
    Ok(())
}
