/* src/main.rs */
#![warn(missing_docs)]
//! # Lumistab CLI - Adaptive Stabilization Control Loop
//!
//! Command-line front end for the lumistab engine: runs the control loop against
//! the synthetic metrics source and a simulated apparatus, and exposes the balance
//! penalty and the symmetry evaluator for offline inspection.
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use tracing::{info, warn, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use lumistab::{
    balance::BalanceReport,
    synthetic::SyntheticMetricsSource,
    ApparatusController, EmissionParameters, MagicSumTarget, PerformanceSnapshot, RunSummary,
    StabilizationEngine, StabilizerConfig, SymmetryBreakdown, SymmetryEvaluator, SystemMatrix, ZeroObjective,
};

// =====================================================================================
// CLI CONFIGURATION & ARGUMENTS
// =====================================================================================

/// Lumistab CLI - Adaptive Stabilization Control Loop
#[derive(Parser, Debug)]
#[command(
    name = "lumistab",
    version = env!("CARGO_PKG_VERSION"),
    author = "Lord Xyn <lord.xyn@proton.me>",
    about = "Adaptive multi-objective optimizer and distributed balance stabilizer for light-source control loops"
)]
struct Args {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Log level
    #[arg(long, default_value = "info", global = true)]
    log_level: LogLevel,

    /// Log line format
    #[arg(long, default_value = "text", global = true)]
    log_format: LogFormat,

    /// Configuration file path (.yaml/.yml or .json)
    #[arg(short, long, global = true, env = "LUMISTAB_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, default_value = "json", global = true)]
    output_format: OutputFormat,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the control loop against the synthetic source and a simulated apparatus
    Run {
        /// Number of cycles to run
        #[arg(short = 'n', long, default_value = "100")]
        cycles: u64,

        /// Base seed, overrides the configured one
        #[arg(short, long)]
        seed: Option<u64>,

        /// Inject an energy outlier on this cycle
        #[arg(long)]
        outlier_at: Option<u64>,

        /// Output file path (stdout if not specified)
        #[arg(short = 'O', long)]
        output: Option<PathBuf>,
    },

    /// Compute the magic-sum balance penalty of a square matrix
    Penalty {
        /// Matrix as JSON rows, e.g. '[[2,7,6],[9,5,1],[4,3,8]]'
        #[arg(short, long)]
        matrix: String,
    },

    /// Score a performance snapshot read from a JSON file
    Score {
        /// Snapshot file path
        #[arg(short, long)]
        snapshot: PathBuf,
    },

    /// Validate and print the effective configuration
    Config {
        /// Print the built-in defaults instead of the loaded configuration
        #[arg(long)]
        emit_default: bool,
    },
}

/// Log level configuration
#[derive(ValueEnum, Clone, Debug)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

/// Log line format
#[derive(ValueEnum, Clone, Debug, PartialEq)]
enum LogFormat {
    Text,
    Json,
}

/// Output format options
#[derive(ValueEnum, Clone, Debug, PartialEq)]
enum OutputFormat {
    Json,
    Yaml,
    Binary,
    Text,
}

// =====================================================================================
// APPLICATION CONFIGURATION
// =====================================================================================

/// Application configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct AppConfig {
    /// Stabilizer policy constants
    pub stabilizer: StabilizerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct LoggingConfig {
    pub file_logging: bool,
    pub log_directory: PathBuf,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file_logging: false,
            log_directory: PathBuf::from("logs"),
            file_prefix: "lumistab.log".to_string(),
        }
    }
}

// =====================================================================================
// OUTPUT
// =====================================================================================

/// Writes `value` in the requested format; `text` renders the human form.
fn emit<T: Serialize>(
    value: &T,
    format: &OutputFormat,
    output: Option<&Path>,
    text: impl FnOnce(&T) -> String,
) -> Result<()> {
    let bytes = match format {
        OutputFormat::Json => {
            let mut json = serde_json::to_vec_pretty(value).context("Failed to serialize JSON output")?;
            json.push(b'\n');
            json
        }
        OutputFormat::Yaml => serde_yaml::to_string(value).context("Failed to serialize YAML output")?.into_bytes(),
        OutputFormat::Binary => bincode::serialize(value).context("Failed to serialize binary output")?,
        OutputFormat::Text => format!("{}\n", text(value)).into_bytes(),
    };

    match output {
        Some(path) => {
            fs::write(path, &bytes).with_context(|| format!("Failed to write output to: {}", path.display()))?;
            info!("Results written to: {}", path.display());
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(&bytes).context("Failed to write to stdout")?;
            stdout.flush()?;
        }
    }
    Ok(())
}

// =====================================================================================
// RUN COMMAND IMPLEMENTATION
// =====================================================================================

/// Execute the control loop
async fn cmd_run(
    mut stabilizer: StabilizerConfig,
    cycles: u64,
    seed: Option<u64>,
    outlier_at: Option<u64>,
    output: Option<PathBuf>,
    output_format: OutputFormat,
) -> Result<()> {
    if let Some(seed) = seed {
        stabilizer.seed = seed;
    }
    let limits = stabilizer.apparatus;
    let source_seed = stabilizer.seed;

    let mut engine = StabilizationEngine::new(stabilizer, Arc::new(ZeroObjective))
        .context("Failed to initialize stabilization engine")?;

    let cancel = engine.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            cancel.cancel();
        }
    });

    let mut apparatus = ApparatusController::new(limits);
    apparatus.power_on().context("Failed to power on apparatus")?;
    apparatus.calibrate().context("Failed to calibrate apparatus")?;
    apparatus
        .start_emission(EmissionParameters::continuous(limits.max_power_w * 0.5))
        .context("Failed to start emission")?;

    let mut source = SyntheticMetricsSource::new(source_seed);
    if let Some(cycle) = outlier_at {
        source = source.with_outlier_at(cycle);
    }

    let started = Instant::now();
    let outcome = engine.run(&mut source, &mut apparatus, Some(cycles)).await;
    apparatus.power_off();
    let summary = outcome.context("Stabilization run aborted")?;

    info!(
        "Run completed in {:.2}s: {} cycles, final state {}",
        started.elapsed().as_secs_f64(),
        summary.cycles,
        summary.final_state
    );

    emit(&summary, &output_format, output.as_deref(), render_summary)
}

fn render_summary(summary: &RunSummary) -> String {
    let stats = &summary.stats;
    let rows: Vec<String> = summary
        .best_matrix
        .to_rows()
        .iter()
        .map(|row| row.iter().map(|v| format!("{v:>9.3}")).collect::<Vec<_>>().join(" "))
        .collect();
    format!(
        "Run {}\n  Cycles: {} (completed {}, skipped {}, failed {})\n  Alerts: {}\n  \
         States: explore {} / exploit {} / converge {} / recal {}\n  Final state: {}\n  \
         Best penalty: {:.6}\n  Best fitness: {:.6}\n  Fingerprint: {}\n  Cancelled: {}\n  Policy: {}\n{}",
        summary.run_id,
        summary.cycles,
        stats.completed,
        stats.skipped,
        stats.failed,
        stats.alerts,
        stats.state_cycles.exploration,
        stats.state_cycles.exploitation,
        stats.state_cycles.convergence,
        stats.state_cycles.recalibration,
        summary.final_state,
        summary.best_penalty.value(),
        summary.best_fitness,
        summary.best_fingerprint,
        summary.cancelled,
        summary.policy,
        rows.join("\n")
    )
}

// =====================================================================================
// INSPECTION COMMANDS
// =====================================================================================

#[derive(Debug, Serialize, Deserialize)]
struct PenaltyOutput {
    dimension: usize,
    target: f64,
    penalty: f64,
    balanced: bool,
    worst_line: String,
    worst_deviation: f64,
    report: BalanceReport,
}

/// Execute the penalty command
fn cmd_penalty(matrix: &str, output_format: OutputFormat) -> Result<()> {
    let rows: Vec<Vec<f64>> = serde_json::from_str(matrix).context("Matrix must be JSON rows of numbers")?;
    let matrix = SystemMatrix::from_rows(rows).context("Invalid matrix")?;
    let target = MagicSumTarget::for_dimension(matrix.dimension());
    let report = BalanceReport::compute(&matrix, target);
    let (worst_line, worst_deviation) = report.worst_line();

    let result = PenaltyOutput {
        dimension: matrix.dimension(),
        target: target.value(),
        penalty: report.penalty.value(),
        balanced: report.penalty.is_balanced(),
        worst_line,
        worst_deviation,
        report,
    };

    emit(&result, &output_format, None, |r| {
        format!(
            "D={} target={} penalty={} balanced={} worst={} ({:+})",
            r.dimension, r.target, r.penalty, r.balanced, r.worst_line, r.worst_deviation
        )
    })
}

/// Execute the score command
fn cmd_score(stabilizer: &StabilizerConfig, snapshot: &Path, output_format: OutputFormat) -> Result<()> {
    let content = fs::read_to_string(snapshot)
        .with_context(|| format!("Failed to read snapshot file: {}", snapshot.display()))?;
    let snapshot: PerformanceSnapshot = serde_json::from_str(&content).context("Failed to parse snapshot JSON")?;

    let breakdown = SymmetryEvaluator::new(stabilizer.weights)
        .evaluate_detailed(&snapshot)
        .context("Snapshot rejected")?;

    emit(&breakdown, &output_format, None, |b: &SymmetryBreakdown| {
        format!(
            "score={:.6} temporal={:.6} spatial={:.6} energy={:.6}",
            b.score.value(),
            b.temporal,
            b.spatial,
            b.energy
        )
    })
}

/// Execute the config command
fn cmd_config(config: &AppConfig, emit_default: bool, output_format: OutputFormat) -> Result<()> {
    let config = if emit_default { AppConfig::default() } else { config.clone() };
    config.stabilizer.validate().context("Configuration is invalid")?;
    emit(&config, &output_format, None, |c| c.stabilizer.policy_summary())
}

// =====================================================================================
// MAIN APPLICATION ENTRY POINT
// =====================================================================================

/// Setup logging configuration; the returned guard flushes the file writer on drop.
fn setup_logging(args: &Args, logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let level = Level::from(args.log_level.clone());

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    let text_layer = (args.log_format == LogFormat::Text).then(|| {
        fmt::layer()
            .with_writer(io::stderr)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
    });
    let json_layer = (args.log_format == LogFormat::Json).then(|| fmt::layer().json().with_writer(io::stderr));

    let (file_layer, guard) = if logging.file_logging {
        fs::create_dir_all(&logging.log_directory).with_context(|| {
            format!("Failed to create log directory: {}", logging.log_directory.display())
        })?;
        let appender = tracing_appender::rolling::daily(&logging.log_directory, &logging.file_prefix);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        (Some(fmt::layer().json().with_ansi(false).with_writer(writer)), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(text_layer)
        .with(json_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

/// Load application configuration
fn load_config(config_path: Option<&Path>) -> Result<AppConfig> {
    match config_path {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;

            let config: AppConfig = match path.extension().and_then(|s| s.to_str()) {
                Some("yaml" | "yml") => serde_yaml::from_str(&content).context("Failed to parse YAML config")?,
                _ => serde_json::from_str(&content).context("Failed to parse JSON config")?,
            };
            config.stabilizer.validate().context("Configuration is invalid")?;
            Ok(config)
        }
        None => Ok(AppConfig::default()),
    }
}

// =====================================================================================
// MAIN FUNCTION
// =====================================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(args.config.as_deref())?;

    let _guard = setup_logging(&args, &config.logging)?;

    match &args.command {
        Commands::Run { cycles, seed, outlier_at, output } => {
            cmd_run(
                config.stabilizer.clone(),
                *cycles,
                *seed,
                *outlier_at,
                output.clone(),
                args.output_format.clone(),
            )
            .await?;
        }
        Commands::Penalty { matrix } => {
            cmd_penalty(matrix, args.output_format.clone())?;
        }
        Commands::Score { snapshot } => {
            cmd_score(&config.stabilizer, snapshot, args.output_format.clone())?;
        }
        Commands::Config { emit_default } => {
            cmd_config(&config, *emit_default, args.output_format.clone())?;
        }
    }

    Ok(())
}
