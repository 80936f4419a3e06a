//! Microregime - Market Regime Classification and Lead/Lag Testing
//!
//! The main entry point for `mr`, handling:
//! - Feature assembly and Gaussian HMM fitting per instrument
//! - Decoding stored models against new data
//! - Cross-instrument causal significance tests
//! - Synthetic data generation and configuration management

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use mr_bundle::ModelBundle;
use mr_common::{
    CausalTestResult, ColumnData, Error, ErrorCategory, OutputFormat, RawColumn, RawTable,
    RegimeModelParameters, RunId, StructuredError,
};
use mr_config::{
    load_config, validate_pipeline, LoadedConfig, PipelineConfig, PresetName,
    CONFIG_SCHEMA_VERSION,
};
use mr_core::exit_codes::ExitCode;
use mr_core::logging::{init_logging, LogConfig, LogFormat, LogLevel};
use mr_core::pipeline::{
    simulate_table, synthetic_model, write_raw_csv, CausalityOutcome, CausalityRequest,
    FitOutcome, FitRequest, RegimePipeline,
};
use mr_core::quality::MetricOutcome;
use serde::Serialize;

/// Microregime - Regime classification and cross-instrument lead/lag tests
#[derive(Parser)]
#[command(name = "mr")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Configuration file (TOML, or JSON by extension)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "human")]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log format on stderr
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build features, fit a regime model and write the bundle and tables
    Fit(FitArgs),

    /// Decode two instruments with their models and test for lead/lag
    Causality(CausalityArgs),

    /// Verify a model bundle and print its summary
    Inspect(InspectArgs),

    /// Write a synthetic feature table drawn from a sticky HMM
    Simulate(SimulateArgs),

    /// Configuration management
    Config(ConfigArgs),

    /// Print version information
    Version,
}

// ============================================================================
// Command argument structs
// ============================================================================

#[derive(Args, Debug)]
struct FitArgs {
    /// Input feature table (CSV or Parquet); repeat for several files
    #[arg(long, short, required = true)]
    input: Vec<PathBuf>,

    /// Keep only rows of this instrument
    #[arg(long)]
    instrument: Option<String>,

    /// Directory for the bundle and tables
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// Number of regimes (overrides the configuration)
    #[arg(long)]
    states: Option<usize>,

    /// Built-in preset instead of a configuration file
    #[arg(long)]
    preset: Option<String>,

    /// Also export decoded rows as CSV
    #[arg(long)]
    csv: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct CausalityArgs {
    /// Model bundle of the hypothesized leader
    #[arg(long)]
    source: PathBuf,

    /// Feature table decoded with the source model
    #[arg(long)]
    source_input: PathBuf,

    /// Model bundle of the hypothesized follower
    #[arg(long)]
    target: PathBuf,

    /// Feature table decoded with the target model
    #[arg(long)]
    target_input: PathBuf,

    /// Directory for the causality table
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// Built-in preset instead of a configuration file
    #[arg(long)]
    preset: Option<String>,

    /// Results shown in human output
    #[arg(long, default_value = "10")]
    top: usize,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// Path to the `.mrb` bundle
    bundle: PathBuf,
}

#[derive(Args, Debug)]
struct SimulateArgs {
    #[arg(long, default_value = "3")]
    states: usize,

    #[arg(long, default_value = "4")]
    features: usize,

    #[arg(long, default_value = "1000")]
    rows: usize,

    #[arg(long, default_value = "45")]
    seed: u64,

    /// Output CSV
    #[arg(long)]
    out: PathBuf,

    /// Also write the generating regime labels here
    #[arg(long)]
    labels: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show the resolved configuration
    Show {
        /// Built-in preset instead of a configuration file
        #[arg(long)]
        preset: Option<String>,
    },
    /// Validate a configuration file
    Validate {
        /// Path to validate (defaults to the resolved configuration)
        path: Option<PathBuf>,
    },
    /// Print a JSON Schema
    Schema {
        #[arg(long, value_enum, default_value = "config")]
        target: SchemaTarget,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SchemaTarget {
    /// Pipeline configuration file
    Config,
    /// `parameters.json` inside a model bundle
    Parameters,
}

fn main() {
    let cli = Cli::parse();

    let log_format = cli
        .global
        .log_format
        .or((cli.global.format == OutputFormat::Json).then_some(LogFormat::Jsonl));
    let log_level = LogLevel::from_verbosity(cli.global.verbose, cli.global.quiet);
    init_logging(&LogConfig::from_env(log_level, log_format));

    let exit_code = match &cli.command {
        Commands::Fit(args) => run_fit(&cli.global, args),
        Commands::Causality(args) => run_causality(&cli.global, args),
        Commands::Inspect(args) => run_inspect(&cli.global, args),
        Commands::Simulate(args) => run_simulate(&cli.global, args),
        Commands::Config(args) => run_config(&cli.global, args),
        Commands::Version => {
            print_version(&cli.global);
            ExitCode::Ok
        }
    };

    std::process::exit(exit_code.as_i32());
}

// ============================================================================
// Command implementations
// ============================================================================

fn run_fit(global: &GlobalOpts, args: &FitArgs) -> ExitCode {
    let result = resolve(global, args.preset.as_deref(), |cfg| {
        if let Some(k) = args.states {
            cfg.model.n_states = k;
        }
    })
    .and_then(|loaded| {
        let snapshot = loaded.snapshot();
        let request = FitRequest {
            inputs: args.input.clone(),
            instrument: args.instrument.clone(),
            out_dir: args.out_dir.clone(),
            csv: args.csv.clone(),
        };
        RegimePipeline::new(loaded.config, RunId::new())
            .with_snapshot(snapshot)
            .fit(&request)
            .map_err(CliError::from)
    });
    emit(global, "fit", result, print_fit)
}

fn run_causality(global: &GlobalOpts, args: &CausalityArgs) -> ExitCode {
    let result = resolve(global, args.preset.as_deref(), |_| {}).and_then(|loaded| {
        let request = CausalityRequest {
            source_bundle: args.source.clone(),
            source_input: args.source_input.clone(),
            target_bundle: args.target.clone(),
            target_input: args.target_input.clone(),
            out_dir: args.out_dir.clone(),
        };
        RegimePipeline::new(loaded.config, RunId::new())
            .causality(&request)
            .map_err(CliError::from)
    });
    emit(global, "causality", result, |outcome| {
        print_causality(outcome, args.top)
    })
}

#[derive(Serialize)]
struct BundleView {
    path: PathBuf,
    run_id: String,
    summary: mr_common::ModelSummary,
    parameters: RegimeModelParameters,
    input_features: Vec<String>,
    components: Option<usize>,
    config_hash: Option<String>,
    config_consistent: Option<bool>,
}

fn run_inspect(global: &GlobalOpts, args: &InspectArgs) -> ExitCode {
    let result = ModelBundle::load(&args.bundle)
        .map_err(CliError::from)
        .map(|bundle| BundleView {
            path: args.bundle.clone(),
            input_features: bundle.input_feature_names().to_vec(),
            components: bundle.projection.as_ref().map(|p| p.n_components()),
            config_hash: bundle.config.as_ref().map(|c| c.config_hash.clone()),
            config_consistent: bundle.config.as_ref().map(|c| c.is_consistent()),
            run_id: bundle.run_id,
            summary: bundle.summary,
            parameters: bundle.parameters,
        });
    emit(global, "inspect", result, print_bundle)
}

#[derive(Serialize)]
struct SimulateView {
    out: PathBuf,
    labels: Option<PathBuf>,
    rows: usize,
    states: usize,
    features: usize,
    seed: u64,
    occupancy: Vec<usize>,
}

fn run_simulate(global: &GlobalOpts, args: &SimulateArgs) -> ExitCode {
    let result = simulate(args).map_err(CliError::from);
    emit(global, "simulate", result, |view| {
        println!(
            "wrote {} rows ({} features, {} regimes, seed {}) to {}",
            view.rows,
            view.features,
            view.states,
            view.seed,
            view.out.display()
        );
        println!("occupancy: {}", format_occupancy(&view.occupancy));
        if let Some(path) = &view.labels {
            println!("labels:    {}", path.display());
        }
    })
}

fn simulate(args: &SimulateArgs) -> Result<SimulateView, mr_core::PipelineError> {
    let timestamp_column = PipelineConfig::default().features.timestamp_column;
    let model = synthetic_model(args.states, args.features)?;
    let (table, labels) = simulate_table(&model, args.rows, args.seed, &timestamp_column)?;
    write_raw_csv(&args.out, &table)?;
    if let Some(path) = &args.labels {
        let timestamps = table
            .column(&timestamp_column)
            .map(|c| c.data.clone())
            .unwrap_or(ColumnData::Int(Vec::new()));
        let label_table = RawTable::new(vec![
            RawColumn::new(timestamp_column.as_str(), timestamps),
            RawColumn::new(
                "regime",
                ColumnData::Int(labels.labels().iter().map(|&k| k as i64).collect()),
            ),
        ])?;
        write_raw_csv(path, &label_table)?;
    }
    Ok(SimulateView {
        out: args.out.clone(),
        labels: args.labels.clone(),
        rows: args.rows,
        states: args.states,
        features: args.features,
        seed: args.seed,
        occupancy: labels.occupancy(),
    })
}

fn run_config(global: &GlobalOpts, args: &ConfigArgs) -> ExitCode {
    match &args.command {
        ConfigCommands::Show { preset } => run_config_show(global, preset.as_deref()),
        ConfigCommands::Validate { path } => run_config_validate(global, path.as_deref()),
        ConfigCommands::Schema { target } => {
            let schema = match target {
                SchemaTarget::Config => serde_json::to_value(schemars::schema_for!(PipelineConfig)),
                SchemaTarget::Parameters => {
                    serde_json::to_value(schemars::schema_for!(RegimeModelParameters))
                }
            };
            match schema {
                Ok(value) => {
                    print_json(&value);
                    ExitCode::Ok
                }
                Err(e) => output_error(global, &CliError::from(Error::from(e))),
            }
        }
    }
}

#[derive(Serialize)]
struct ConfigView {
    source: String,
    path: Option<PathBuf>,
    config_hash: String,
    config: PipelineConfig,
}

fn run_config_show(global: &GlobalOpts, preset: Option<&str>) -> ExitCode {
    let result = resolve(global, preset, |_| {}).map(|loaded| ConfigView {
        config_hash: loaded.snapshot().config_hash,
        source: loaded.source.to_string(),
        path: loaded.path,
        config: loaded.config,
    });
    emit(global, "config show", result, |view| {
        let origin = view
            .path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "built-in defaults".to_string());
        println!("# source: {} ({})", view.source, origin);
        println!("# hash:   {}", view.config_hash);
        match view.config.to_toml_string() {
            Ok(text) => print!("{text}"),
            Err(e) => eprintln!("cannot render configuration: {e}"),
        }
    })
}

#[derive(Serialize)]
struct ValidationView {
    status: &'static str,
    source: String,
    path: Option<PathBuf>,
    schema_version: String,
}

fn run_config_validate(global: &GlobalOpts, path: Option<&Path>) -> ExitCode {
    let path = path.or(global.config.as_deref());
    let result = load_config(path, None)
        .map_err(|e| CliError::from(Error::from(e)))
        .map(|loaded| ValidationView {
            status: "valid",
            source: loaded.source.to_string(),
            schema_version: loaded.config.schema_version.clone(),
            path: loaded.path,
        });
    emit(global, "config validate", result, |view| {
        let origin = view
            .path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "built-in defaults".to_string());
        println!("configuration valid: {origin} (schema {})", view.schema_version);
    })
}

fn print_version(global: &GlobalOpts) {
    let version_info = serde_json::json!({
        "mr_version": env!("CARGO_PKG_VERSION"),
        "config_schema_version": CONFIG_SCHEMA_VERSION,
        "parameters_format_version": mr_common::PARAMETERS_FORMAT_VERSION,
        "bundle_version": mr_bundle::BUNDLE_VERSION,
        "tables_schema_version": mr_tables::SCHEMA_VERSION,
    });

    match global.format {
        OutputFormat::Json => print_json(&version_info),
        OutputFormat::Human => {
            println!("mr {}", env!("CARGO_PKG_VERSION"));
            println!("config schema version: {}", CONFIG_SCHEMA_VERSION);
        }
    }
}

// ============================================================================
// Configuration and error plumbing
// ============================================================================

/// Errors reported by the CLI, with the exit code they map to.
#[derive(Debug)]
struct CliError {
    exit: ExitCode,
    detail: StructuredError,
}

impl From<Error> for CliError {
    fn from(err: Error) -> Self {
        CliError {
            exit: ExitCode::from(&err),
            detail: StructuredError::from(&err),
        }
    }
}

impl From<mr_core::PipelineError> for CliError {
    fn from(err: mr_core::PipelineError) -> Self {
        Error::from(err).into()
    }
}

impl From<mr_bundle::BundleError> for CliError {
    fn from(err: mr_bundle::BundleError) -> Self {
        Error::from(err).into()
    }
}

impl CliError {
    fn args(message: impl Into<String>) -> Self {
        CliError {
            exit: ExitCode::ArgsError,
            detail: StructuredError {
                code: 11,
                category: ErrorCategory::Config,
                message: message.into(),
                recoverable: true,
            },
        }
    }
}

/// JSON error envelope written to stderr.
#[derive(Serialize)]
struct ErrorResponse<'a> {
    status: &'static str,
    error: ErrorBody<'a>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    exit_name: &'static str,
    exit_code: i32,
    #[serde(flatten)]
    detail: &'a StructuredError,
}

/// Loads the configuration, applies command-line overrides and validates
/// the result.
fn resolve(
    global: &GlobalOpts,
    preset: Option<&str>,
    overrides: impl FnOnce(&mut PipelineConfig),
) -> Result<LoadedConfig, CliError> {
    let preset = match preset {
        Some(name) => Some(PresetName::parse(name).ok_or_else(|| {
            let known: Vec<&str> = PresetName::ALL.iter().map(|p| p.as_str()).collect();
            CliError::args(format!(
                "unknown preset '{name}' (available: {})",
                known.join(", ")
            ))
        })?),
        None => None,
    };
    let mut loaded =
        load_config(global.config.as_deref(), preset).map_err(|e| CliError::from(Error::from(e)))?;
    overrides(&mut loaded.config);
    validate_pipeline(&loaded.config).map_err(|e| CliError::from(Error::from(e)))?;
    Ok(loaded)
}

fn emit<T: Serialize>(
    global: &GlobalOpts,
    command: &str,
    result: Result<T, CliError>,
    human: impl FnOnce(&T),
) -> ExitCode {
    match result {
        Ok(payload) => {
            match global.format {
                OutputFormat::Json => print_json(&serde_json::json!({
                    "command": command,
                    "status": "ok",
                    "generated_at": chrono::Utc::now().to_rfc3339(),
                    "result": payload,
                })),
                OutputFormat::Human => human(&payload),
            }
            ExitCode::Ok
        }
        Err(err) => output_error(global, &err),
    }
}

/// Output an error in the appropriate format.
fn output_error(global: &GlobalOpts, error: &CliError) -> ExitCode {
    let message = &error.detail.message;
    match global.format {
        OutputFormat::Json => {
            let response = ErrorResponse {
                status: "error",
                error: ErrorBody {
                    exit_name: error.exit.code_name(),
                    exit_code: error.exit.as_i32(),
                    detail: &error.detail,
                },
            };
            match serde_json::to_string_pretty(&response) {
                Ok(text) => eprintln!("{text}"),
                Err(_) => eprintln!("error: {message}"),
            }
        }
        OutputFormat::Human => eprintln!("error: {message}"),
    }
    error.exit
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => eprintln!("cannot serialize output: {e}"),
    }
}

// ============================================================================
// Human output
// ============================================================================

fn format_metric(outcome: &MetricOutcome) -> String {
    match outcome {
        MetricOutcome::Computed { value } => format!("{value:.4}"),
        MetricOutcome::Failed { error } => format!("n/a ({error})"),
    }
}

fn format_occupancy(counts: &[usize]) -> String {
    counts
        .iter()
        .enumerate()
        .map(|(k, n)| format!("{k}={n}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn print_fit(outcome: &FitOutcome) {
    let s = &outcome.summary;
    println!(
        "[{}] {} regimes over {} rows ({} features, {} segments){}",
        outcome.run_id,
        s.n_states,
        s.n_samples,
        s.n_features,
        s.n_segments,
        outcome
            .instrument
            .as_ref()
            .map(|i| format!(" for {i}"))
            .unwrap_or_default()
    );
    let status = if s.converged { "converged" } else { "stopped" };
    println!(
        "log-likelihood {:.3}  AIC {:.3}  BIC {:.3}  ({status} after {} iterations)",
        s.log_likelihood, s.aic, s.bic, s.iterations
    );
    println!(
        "silhouette {}  davies-bouldin {}  calinski-harabasz {}",
        format_metric(&outcome.quality.silhouette),
        format_metric(&outcome.quality.davies_bouldin),
        format_metric(&outcome.quality.calinski_harabasz)
    );
    println!("occupancy: {}", format_occupancy(&outcome.occupancy));
    for d in &outcome.quality.durations {
        if let Some(mean) = d.mean {
            println!("  regime {}: {} runs, mean duration {:.1}", d.regime, d.runs, mean);
        }
    }
    if let Some(c) = outcome.components {
        println!("projection: {c} components");
    }
    if outcome.dropped_rows > 0 {
        println!("dropped rows: {}", outcome.dropped_rows);
    }
    println!("bundle: {}", outcome.bundle_path.display());
    for path in &outcome.table_paths {
        println!("table:  {}", path.display());
    }
    if let Some(path) = &outcome.csv_path {
        println!("csv:    {}", path.display());
    }
}

/// Columns of the results table shown on the terminal.
const SUMMARY_COLUMNS: [&str; 7] = [
    "test",
    "direction",
    "source_column",
    "target_column",
    "lag",
    "statistic",
    "p_value",
];

fn results_table(run_id: &RunId, results: &[CausalTestResult]) -> mr_tables::Result<String> {
    let batch = mr_tables::causality_results_batch(run_id.as_str(), results)?;
    let schema = batch.schema();
    let indices = SUMMARY_COLUMNS
        .iter()
        .map(|name| schema.index_of(name))
        .collect::<Result<Vec<_>, _>>()?;
    mr_tables::render(&[batch.project(&indices)?])
}

fn print_causality(outcome: &CausalityOutcome, top: usize) {
    let report = &outcome.report;
    println!(
        "[{}] {} -> {}: {} aligned rows in {} segments ({} / {} input rows)",
        report.run_id,
        report.source,
        report.target,
        report.n_rows,
        report.n_segments,
        outcome.source_rows,
        outcome.target_rows
    );
    println!(
        "{} cells, {} skipped, {} with p < 0.05",
        report.results.len(),
        report.skipped(),
        report.significant(0.05).count()
    );
    let mut computed: Vec<CausalTestResult> = report
        .results
        .iter()
        .filter(|r| !r.outcome.is_skipped())
        .cloned()
        .collect();
    computed.sort_by(|a, b| {
        let (pa, pb) = (a.p_value().unwrap_or(1.0), b.p_value().unwrap_or(1.0));
        pa.total_cmp(&pb)
    });
    computed.truncate(top);
    if !computed.is_empty() {
        match results_table(&report.run_id, &computed) {
            Ok(table) => println!("{table}"),
            Err(e) => eprintln!("cannot render results: {e}"),
        }
    }
    println!("table: {}", outcome.table_path.display());
}

fn print_bundle(view: &BundleView) {
    let s = &view.summary;
    println!("bundle {} (run {})", view.path.display(), view.run_id);
    println!(
        "{} regimes, {} covariance, {} features, fitted on {} rows in {} segments",
        s.n_states, s.covariance_type, s.n_features, s.n_samples, s.n_segments
    );
    println!(
        "log-likelihood {:.3}  AIC {:.3}  BIC {:.3}  converged {} after {} iterations",
        s.log_likelihood, s.aic, s.bic, s.converged, s.iterations
    );
    println!("inputs: {}", view.input_features.join(", "));
    if let Some(c) = view.components {
        println!("projection: {c} components");
    }
    if let Some(hash) = &view.config_hash {
        let note = if view.config_consistent == Some(true) {
            ""
        } else {
            " (hash mismatch)"
        };
        println!("config: {hash}{note}");
    }
    println!("transition matrix:");
    for row in &view.parameters.transition_matrix {
        let cells: Vec<String> = row.iter().map(|p| format!("{p:.4}")).collect();
        println!("  {}", cells.join("  "));
    }
}
