//! SchedOpt Command Line Interface
//!
//! Usage:
//!   schedopt [OPTIONS] <input-file>
//!   schedopt --help
//!
//! Examples:
//!   schedopt gemm.json                          # Optimize with defaults, print the tree
//!   schedopt --target=avx512 gemm.json          # Size kernels for AVX-512
//!   schedopt --tile-sizes=64,64,32 stencil.json # Custom first-level tile sizes
//!   schedopt --emit=order --params=16 copy.json # Dump the execution order for N = 16

use clap::{Parser, ValueEnum};
use schedopt::prelude::*;
use std::path::PathBuf;
use std::fs;
use anyhow::{bail, Context, Result};
use log::{info, debug, error};

/// SchedOpt - Schedule Tree Optimizer
#[derive(Parser, Debug)]
#[command(name = "schedopt")]
#[command(author = "SchedOpt Contributors")]
#[command(version)]
#[command(about = "Tiling, prevectorization and matmul blocking of polyhedral schedule trees", long_about = None)]
struct Cli {
    /// Input scop (.json format)
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Output file (defaults to stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Pipeline configuration (.json); flags below override it
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Target machine
    #[arg(short, long, default_value = "generic")]
    target: TargetArg,

    /// First-level tile sizes (comma-separated)
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    tile_sizes: Option<Vec<i64>>,

    /// First-level tile size for members without an explicit size
    #[arg(long)]
    default_tile_size: Option<i64>,

    /// Disable loop tiling
    #[arg(long)]
    no_tiling: bool,

    /// Enable second-level tiling
    #[arg(long)]
    second_level_tiling: bool,

    /// Enable register tiling
    #[arg(long)]
    register_tiling: bool,

    /// Disable prevectorization
    #[arg(long)]
    no_vectorize: bool,

    /// Vector width used when no target is given
    #[arg(long)]
    vector_width: Option<i64>,

    /// Disable matrix-multiply pattern matching
    #[arg(long)]
    no_pattern_matching: bool,

    /// What to emit
    #[arg(long, default_value = "tree")]
    emit: EmitKind,

    /// Parameter values for --emit=order (comma-separated, scop order)
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    params: Option<Vec<i64>>,

    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress warnings)
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TargetArg {
    /// SSE-class core
    Generic,
    /// AVX2 core
    Avx2,
    /// AVX-512 core
    Avx512,
    /// No target; vector width comes from the configuration
    None,
}

impl TargetArg {
    fn info(self) -> Option<TargetInfo> {
        match self {
            TargetArg::Generic => Some(TargetInfo::generic()),
            TargetArg::Avx2 => Some(TargetInfo::avx2()),
            TargetArg::Avx512 => Some(TargetInfo::avx512()),
            TargetArg::None => None,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EmitKind {
    /// Optimized schedule tree
    Tree,
    /// Scop with the optimized schedule (JSON)
    Json,
    /// Statement instances in execution order
    Order,
    /// Per-band decisions (JSON)
    Report,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.quiet {
        log::LevelFilter::Error
    } else {
        match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    info!("SchedOpt v{}", schedopt::VERSION);
    debug!("Input file: {:?}", cli.input);

    let source = fs::read_to_string(&cli.input)
        .with_context(|| format!("Failed to read input file: {:?}", cli.input))?;
    let scop = schedopt::load_scop(&source)?;

    let config = build_config(&cli)?;
    debug!("Pipeline config: {:?}", config);
    let target = cli.target.info();

    info!("Optimizing {}...", scop.name);
    let result = match schedopt::optimize(&scop, &config, target.as_ref()) {
        Ok(result) => result,
        Err(e) => {
            error!("Optimization failed: {:#}", e);
            return Err(e);
        }
    };
    info!("Optimization complete ({} bands)", result.decisions.len());

    let output = render(&cli, &scop, &result)?;
    write_output(&cli.output, &output)
}

fn build_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration: {:?}", path))?,
        None => PipelineConfig::default(),
    };

    // Override with CLI flags
    if cli.no_tiling {
        config.enable_tiling = false;
    }
    if let Some(ref sizes) = cli.tile_sizes {
        config.first_level.tile_sizes = sizes.clone();
    }
    if let Some(size) = cli.default_tile_size {
        config.first_level.default_tile_size = size;
    }
    if cli.second_level_tiling {
        config.second_level.enabled = true;
    }
    if cli.register_tiling {
        config.register_tiling.enabled = true;
    }
    if cli.no_vectorize {
        config.enable_vectorization = false;
    }
    if let Some(width) = cli.vector_width {
        config.prevector_width = width;
    }
    if cli.no_pattern_matching {
        config.enable_pattern_matching = false;
    }
    Ok(config)
}

fn render(cli: &Cli, scop: &Scop, result: &OptimizationResult) -> Result<String> {
    let text = match cli.emit {
        EmitKind::Tree => NamedTree::new(&result.schedule, scop).pretty(),
        EmitKind::Json => {
            let optimized = Scop { schedule: result.schedule.clone(), ..scop.clone() };
            serde_json::to_string_pretty(&optimized)?
        }
        EmitKind::Report => serde_json::to_string_pretty(&result.decisions)?,
        EmitKind::Order => {
            let Some(params) = &cli.params else {
                bail!("--emit=order needs --params for {:?}", scop.parameters);
            };
            let order = result.schedule.execution_order(params)
                .context("Failed to evaluate the optimized schedule")?;
            order.iter()
                .map(|inst| {
                    let point: Vec<String> = inst.point.iter().map(|v| v.to_string()).collect();
                    format!("{}[{}]", inst.stmt, point.join(", "))
                })
                .collect::<Vec<_>>()
                .join("\n")
        }
    };
    Ok(text)
}

fn write_output(path: &Option<PathBuf>, content: &str) -> Result<()> {
    match path {
        Some(p) => {
            fs::write(p, content)
                .with_context(|| format!("Failed to write output file: {:?}", p))?;
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
