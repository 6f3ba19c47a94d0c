//! roiforge: ROI estimation for binary classifiers
//!
//! Main entry point for the command-line application.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use roiforge::adapters::{load_records, HttpOracle, HttpOracleConfig, JsonRegistry, LogisticOracle};
use roiforge::application::{OptimizationRequest, OptimizationService, OptimizerConfig, RoiService};
use roiforge::domain::{
    rank_by_roi, BinningStrategy, Intervention, ModelEvaluation, PositiveClass,
};
use roiforge::ports::{ModelRegistry, ScoringOracle};
use roiforge::{OptimizationReport, PayoffMatrix, Population};

#[derive(Parser)]
#[command(name = "roiforge")]
#[command(version)]
#[command(about = "Return-on-investment estimation for binary classifiers", long_about = None)]
struct Cli {
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct TableArgs {
    /// Model registry export (JSON)
    #[arg(short, long, value_name = "FILE", env = "ROIFORGE_REGISTRY")]
    registry: PathBuf,

    /// Number of cases the model will be applied to
    #[arg(long, default_value_t = 1000.0)]
    cases: f64,

    /// Share of positive cases in the population
    #[arg(long, default_value_t = 0.01)]
    baserate: f64,

    /// Evaluate only the first N models in registry order
    #[arg(long, default_value_t = 1)]
    num_models: usize,

    /// Sort the table by ROI instead of registry order
    #[arg(long)]
    rank: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Pick thresholds from a raw cost/benefit matrix
    CostBenefit {
        #[command(flatten)]
        table: TableArgs,

        /// Payoff of a true positive
        #[arg(long, default_value_t = 1000.0, allow_hyphen_values = true)]
        tp: f64,

        /// Payoff of a false positive
        #[arg(long, default_value_t = -200.0, allow_hyphen_values = true)]
        fp: f64,

        /// Payoff of a true negative
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        tn: f64,

        /// Payoff of a false negative
        #[arg(long = "fn", default_value_t = 0.0, allow_hyphen_values = true)]
        fn_: f64,
    },

    /// Pick thresholds from intervention economics
    Intervention {
        #[command(flatten)]
        table: TableArgs,

        /// Cost of intervening on one case
        #[arg(long, default_value_t = 10.0)]
        cost: f64,

        /// Probability the intervention works on a true positive
        #[arg(long, default_value_t = 0.1)]
        succrate: f64,

        /// Probability the intervention backfires on a false positive
        #[arg(long, default_value_t = 0.03)]
        backfire: f64,

        /// Value of a successful intervention
        #[arg(long, default_value_t = 1000.0, allow_hyphen_values = true)]
        payoff: f64,

        /// Value of a backfired intervention
        #[arg(long, default_value_t = -400.0, allow_hyphen_values = true)]
        payback: f64,
    },

    /// Find the two-feature setting that maximizes predicted outcomes
    Optimize(OptimizeArgs),
}

#[derive(Args)]
struct OptimizeArgs {
    /// Model registry export (JSON)
    #[arg(short, long, value_name = "FILE", env = "ROIFORGE_REGISTRY")]
    registry: PathBuf,

    /// Model to score with
    #[arg(short, long)]
    model: String,

    /// Records to optimize (.csv or .tsv)
    #[arg(short, long, value_name = "FILE")]
    data: PathBuf,

    /// First feature to vary
    #[arg(long)]
    first: String,

    /// Second feature to vary
    #[arg(long)]
    second: String,

    /// Target column (defaults to the project's)
    #[arg(long)]
    target: Option<String>,

    /// Positive class label (defaults to the project's)
    #[arg(long)]
    positive_class: Option<String>,

    /// Prediction service base URL
    #[arg(long, env = "ROIFORGE_ORACLE_URL", conflicts_with = "model_file")]
    oracle_url: Option<String>,

    /// Score locally with a logistic model file or directory instead
    #[arg(long, value_name = "PATH")]
    model_file: Option<PathBuf>,

    /// Maximum time to wait for a prediction job, in seconds
    #[arg(long)]
    max_wait_secs: Option<u64>,

    /// Seed for down-sampling
    #[arg(long)]
    seed: Option<u64>,

    /// Binning for dispersed numeric features (equal-frequency, equal-width)
    #[arg(long)]
    binning: Option<BinningStrategy>,
}

fn main() -> Result<()> {
    // Logs go to stderr unless a log file is requested, keeping stdout for results.
    let log_mode = std::env::var("ROIFORGE_LOG_MODE").unwrap_or_else(|_| "auto".to_string());
    let log_file = std::env::var("ROIFORGE_LOG_FILE").ok();

    let use_file = match log_mode.as_str() {
        "file" => true,
        "stderr" => false,
        // auto
        _ => log_file.is_some(),
    };

    let (writer, _guard) = if use_file {
        let log_file = log_file.unwrap_or_else(|| "roiforge.log".to_string());
        if let Some(parent) = Path::new(&log_file).parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .with_context(|| format!("Failed to open log file {log_file}"))?;
        tracing_appender::non_blocking(file)
    } else {
        tracing_appender::non_blocking(std::io::stderr())
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(writer))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::CostBenefit { table, tp, fp, tn, fn_ } => {
            let matrix = PayoffMatrix::new(tp, fp, tn, fn_);
            let (service, population) = table_service(&table)?;
            let rows = service.evaluate_models(&matrix, &population, table.num_models)?;
            print_table(&matrix, &rows, table.rank, cli.json)?;
        }
        Commands::Intervention {
            table,
            cost,
            succrate,
            backfire,
            payoff,
            payback,
        } => {
            let intervention = Intervention {
                cost,
                payoff,
                payback,
                success_rate: succrate,
                backfire_rate: backfire,
            };
            let (service, population) = table_service(&table)?;
            let (matrix, rows) =
                service.evaluate_intervention(&intervention, &population, table.num_models)?;
            print_table(&matrix, &rows, table.rank, cli.json)?;
        }
        Commands::Optimize(args) => run_optimize(&args, cli.json)?,
    }

    Ok(())
}

fn table_service(args: &TableArgs) -> Result<(RoiService<JsonRegistry>, Population)> {
    let registry = JsonRegistry::from_file(&args.registry)?;
    let population = Population {
        cases: args.cases,
        base_rate: args.baserate,
    };
    Ok((RoiService::new(Arc::new(registry)), population))
}

fn print_table(matrix: &PayoffMatrix, rows: &[ModelEvaluation], rank: bool, json: bool) -> Result<()> {
    let ordered: Vec<&ModelEvaluation> = if rank {
        rank_by_roi(rows)
    } else {
        rows.iter().collect()
    };

    if json {
        let body = serde_json::json!({ "payoff_matrix": matrix, "models": ordered });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    println!(
        "Payoffs: TP {} | FP {} | TN {} | FN {}",
        matrix.true_positive, matrix.false_positive, matrix.true_negative, matrix.false_negative
    );
    println!(
        "{:>3}  {:<28} {:<32} {:>7} {:<28} {:>8} {:>9} {:>10}",
        "#", "Model ID", "Model Type", "Sample%", "Feature List", "Metric", "Threshold", "ROI"
    );
    for row in ordered {
        println!(
            "{:>3}  {:<28} {:<32} {:>7} {:<28} {:>8} {:>9} {:>10}",
            row.index,
            row.model_id,
            row.model_type,
            row.sample_pct.map_or_else(|| "-".to_string(), |p| format!("{p:.1}")),
            row.featurelist_name,
            row.metric.map_or_else(|| "-".to_string(), |m| format!("{m:.4}")),
            row.threshold_label(),
            row.roi_label()
        );
    }
    Ok(())
}

fn run_optimize(args: &OptimizeArgs, json: bool) -> Result<()> {
    let registry = JsonRegistry::from_file(&args.registry)?;
    let project = registry.project()?;
    registry
        .model(&args.model)
        .with_context(|| format!("Model {} is not in the registry", args.model))?;

    let mut request = OptimizationRequest::for_project(&project, &args.model, &args.first, &args.second);
    if let Some(target) = &args.target {
        request.target.clone_from(target);
    }
    if let Some(label) = &args.positive_class {
        request.positive_class = PositiveClass::new(label);
    }

    let records = load_records(&args.data)?;

    let mut config = OptimizerConfig::from_env_or_default();
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    if let Some(binning) = args.binning {
        config.binning = binning;
    }

    let report = if let Some(path) = &args.model_file {
        let mut oracle = LogisticOracle::new();
        oracle.load(path)?;
        optimize_with(oracle, config, &request, &records)?
    } else {
        let mut oracle_config = HttpOracleConfig::from_env_or_default();
        if let Some(url) = &args.oracle_url {
            oracle_config.base_url.clone_from(url);
        }
        if let Some(secs) = args.max_wait_secs {
            if secs == 0 {
                bail!("--max-wait-secs must be positive");
            }
            oracle_config.max_wait = Duration::from_secs(secs);
        }
        let oracle = HttpOracle::new(oracle_config)?;
        optimize_with(oracle, config, &request, &records)?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn optimize_with<O: ScoringOracle>(
    oracle: O,
    config: OptimizerConfig,
    request: &OptimizationRequest,
    records: &roiforge::RecordSet,
) -> Result<OptimizationReport> {
    let service = OptimizationService::new(Arc::new(oracle), config);
    Ok(service.optimize(request, records)?)
}

fn print_report(report: &OptimizationReport) {
    let cal = &report.calibration;
    println!("Model: {}", report.model_id);
    println!(
        "Records: {} ({} sampled, {} simulated rows)",
        report.total_records, report.sampled_records, report.simulated_rows
    );
    println!("Actual positives: {}", report.actual_total);
    println!("Predicted positives: {:.1}", report.baseline_total);
    let (raw_lo, raw_hi) = cal.raw_error_bounds();
    let (adj_lo, adj_hi) = cal.adjusted_error_bounds();
    println!("Raw error: {raw_lo}% to {raw_hi}%");
    println!("Adjusted error: {adj_lo}% to {adj_hi}%");
    println!("Optimized positives (raw): {:.1}", report.optimized_total);
    println!(
        "Optimized positives (calibrated): {:.1} to {:.1}",
        report.lower_bound, report.upper_bound
    );
    println!("Mean uplift per record: {:.4}", report.mean_uplift());

    for shift in [&report.first, &report.second] {
        println!();
        println!("{} (KL divergence {:.4})", shift.feature, shift.divergence);
        println!("  {:<24} {:>10} {:>10}", "value", "original", "optimized");
        for ((value, original), optimized) in shift.values.iter().zip(&shift.original).zip(&shift.optimized) {
            println!("  {:<24} {:>10} {:>10}", value.to_string(), original, optimized);
        }
    }
}
