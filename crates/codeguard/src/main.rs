use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use codeguard_architecture::ArchitectureAnalyzer;
use codeguard_core::analyzer::Analyzer;
use codeguard_core::config::{Config, CONFIG_FILE_NAME};
use codeguard_core::types::{AnalyzerKind, Severity};
use codeguard_core::{AnalysisPipeline, PipelineError};
use codeguard_csharp::CSharpParser;
use codeguard_quality::QualityAnalyzer;
use codeguard_report::ctrf::CtrfReport;
use codeguard_report::{json, text};
use codeguard_security::SecurityAnalyzer;

#[derive(Parser)]
#[command(name = "codeguard")]
#[command(about = "Static validation for C# codebases: quality, security, and architecture")]
#[command(version, args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    check: CheckArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a default .codeguard.toml configuration file
    Init {
        /// Overwrite existing config
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args)]
struct CheckArgs {
    /// Directory or single file to analyze
    #[arg(long, default_value = ".")]
    path: PathBuf,
    /// List every finding
    #[arg(short, long)]
    verbose: bool,
    /// Analyzers to skip: quality, security, architecture
    #[arg(long, value_name = "ANALYZER", num_args = 1.., value_delimiter = ',')]
    skip: Vec<AnalyzerKind>,
    /// Write a CTRF JSON report to this file
    #[arg(long, visible_alias = "ctrf", value_name = "FILE")]
    report: Option<PathBuf>,
    /// Minimum severity that fails the run (overrides the config file)
    #[arg(long, value_name = "SEVERITY")]
    fail_on: Option<Severity>,
    /// Config file path (defaults to .codeguard.toml in the scanned tree or an ancestor)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Console output format
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,
    /// Worker threads
    #[arg(long)]
    jobs: Option<usize>,
    /// Per-file parse timeout in milliseconds; 0 disables it
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,
    /// Log filter, e.g. `info` or `codeguard_core=debug`; RUST_LOG wins when set
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

/// A failed command, split by exit code.
enum Failure {
    /// Bad invocation: missing path, invalid config, bad arguments.
    Usage(anyhow::Error),
    /// The run itself could not complete.
    Runtime(anyhow::Error),
}

impl Failure {
    fn exit_code(&self) -> i32 {
        match self {
            Failure::Usage(_) => 2,
            Failure::Runtime(_) => 3,
        }
    }

    fn error(&self) -> &anyhow::Error {
        match self {
            Failure::Usage(e) | Failure::Runtime(e) => e,
        }
    }
}

impl From<PipelineError> for Failure {
    fn from(e: PipelineError) -> Self {
        if e.is_usage_error() {
            Failure::Usage(e.into())
        } else {
            Failure::Runtime(e.into())
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let log_level = match &cli.command {
        Some(_) => "warn",
        None => cli.check.log_level.as_str(),
    };
    if let Err(e) = init_logging(log_level) {
        eprintln!("error: {e:#}");
        process::exit(2);
    }

    let result = match cli.command {
        Some(Commands::Init { force }) => cmd_init(force).map_err(Failure::Usage),
        None => cmd_check(&cli.check),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(failure) => {
            eprintln!("error: {:#}", failure.error());
            process::exit(failure.exit_code());
        }
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(env) if !env.is_empty() => EnvFilter::try_new(env),
        _ => EnvFilter::try_new(level),
    }
    .with_context(|| format!("invalid log filter '{level}'"))?;
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install log subscriber")?;
    Ok(())
}

fn cmd_init(force: bool) -> Result<i32> {
    let target = PathBuf::from(CONFIG_FILE_NAME);
    if target.exists() && !force {
        anyhow::bail!("{CONFIG_FILE_NAME} already exists. Use --force to overwrite.");
    }
    std::fs::write(&target, Config::default_toml())
        .with_context(|| format!("failed to write {CONFIG_FILE_NAME}"))?;
    println!("Created {CONFIG_FILE_NAME} with default configuration.");
    Ok(0)
}

fn load_config(args: &CheckArgs) -> Result<Config> {
    let mut config = match &args.config {
        Some(p) => Config::load(p)?,
        None => Config::discover(&args.path)?,
    };
    if let Some(fail_on) = args.fail_on {
        config.rules.fail_on = fail_on;
    }
    if let Some(jobs) = args.jobs {
        config.project.jobs = Some(jobs);
    }
    if let Some(ms) = args.timeout_ms {
        config.project.parse_timeout_ms = ms;
    }
    Ok(config)
}

fn build_pipeline(config: Config, skip: &[AnalyzerKind]) -> Result<AnalysisPipeline> {
    let parser = CSharpParser::new().context("failed to initialize C# parser")?;
    let analyzers: Vec<Box<dyn Analyzer>> = vec![
        Box::new(QualityAnalyzer::new(config.quality.clone())),
        Box::new(SecurityAnalyzer::new(&config.security)?),
        Box::new(ArchitectureAnalyzer::new(
            &config.layers,
            config.architecture.clone(),
        )?),
    ];
    Ok(AnalysisPipeline::new(Arc::new(parser), analyzers, config).with_skipped(skip.iter().copied()))
}

fn cmd_check(args: &CheckArgs) -> Result<i32, Failure> {
    if !args.path.exists() {
        return Err(PipelineError::PathNotFound(args.path.clone()).into());
    }
    let config = load_config(args).map_err(Failure::Usage)?;
    let pipeline = build_pipeline(config, &args.skip).map_err(Failure::Usage)?;

    let run = pipeline.run(&args.path)?;
    tracing::info!(
        findings = run.summary.total_findings,
        failing = run.failing_findings().count(),
        elapsed_ms = run.duration().as_millis() as u64,
        "analysis complete"
    );

    match args.format {
        Format::Text => print!("{}", text::format_report(&run, args.verbose)),
        Format::Json => {
            let out = json::format_report(&run, false)
                .map_err(|e| Failure::Runtime(e.into()))?;
            println!("{out}");
        }
    }

    if let Some(report_path) = &args.report {
        write_ctrf(&run, report_path).map_err(Failure::Runtime)?;
    }

    Ok(if run.passed() { 0 } else { 1 })
}

fn write_ctrf(run: &codeguard_core::AnalysisRun, path: &Path) -> Result<()> {
    let report = CtrfReport::build(run, env!("CARGO_PKG_VERSION"));
    report.write(path)?;
    tracing::info!(path = %path.display(), "CTRF report written");
    Ok(())
}
