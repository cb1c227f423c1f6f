use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use ralphloop::agent::{Agent, CommandAgent};
use ralphloop::cli::{Cli, Command, OutputFormat, get_log_path};
use ralphloop::config::Config;
use ralphloop::domain::SpecDocument;
use ralphloop::r#loop::{LoopEngine, QualityGate};
use ralphloop::report::{collect_status, render_json, render_status_text, render_tasks};
use ralphloop::state::SpecRepo;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    // Append so consecutive runs over the same spec keep their history
    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .context("Failed to open log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> Result<u8> {
    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());

    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.apply_env_overrides()?;

    let repo = SpecRepo::new(&cli.project, &config.specs_dir, &config.context.store_path);

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Init => cmd_init(&repo),
        Command::Run {
            spec,
            max_iterations,
            gates,
            format,
        } => cmd_run(&config, &repo, &spec, max_iterations, gates, format).await,
        Command::Status { format } => cmd_status(&repo, format),
        Command::Tasks { spec } => cmd_tasks(&repo, &spec),
    }
}

fn cmd_init(repo: &SpecRepo) -> Result<u8> {
    debug!(root = ?repo.root(), "cmd_init: called");
    let report = repo.init()?;

    let mark = |created: bool| if created { "created".green() } else { "exists".dimmed() };
    println!("{:>8}  {}", mark(report.created_specs_dir), repo.specs_dir().display());
    println!("{:>8}  {}", mark(report.created_store), repo.store_path().display());
    Ok(0)
}

async fn cmd_run(
    config: &Config,
    repo: &SpecRepo,
    spec: &str,
    max_iterations: Option<u32>,
    gates: Vec<QualityGate>,
    format: OutputFormat,
) -> Result<u8> {
    debug!(%spec, ?max_iterations, gates = gates.len(), %format, "cmd_run: called");
    let spec_path = repo.resolve(spec)?;

    let mut loop_config = config.loop_config.clone();
    if let Some(max) = max_iterations {
        loop_config.max_iterations = max;
    }

    // Gates given on the command line replace the configured set
    let gates = if gates.is_empty() { config.gates.clone() } else { gates };

    let agent: Arc<dyn Agent> = Arc::new(CommandAgent::from_config(&config.agent));
    let engine = LoopEngine::new(&spec_path, repo.root(), loop_config, agent)?
        .with_gates(gates)
        .with_store(repo.store_path(), config.context.limits.clone());
    info!(run_id = %engine.run_id(), ?spec_path, "Starting loop");

    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::spawn(async move {
            tokio::select! {
                _ = sigint.recv() => warn!("SIGINT received"),
                _ = sigterm.recv() => warn!("SIGTERM received"),
            }
            let _ = shutdown_tx.send(()).await;
        });
    }

    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Ctrl+C received");
                let _ = shutdown_tx.send(()).await;
            }
        });
    }

    let summary = engine.run(&mut shutdown_rx).await?;
    info!(status = %summary.status, iterations = summary.iterations, "Loop finished");

    match format {
        OutputFormat::Text => print!("{}", summary.render_text()),
        OutputFormat::Json => println!("{}", render_json(&summary)?),
    }
    Ok(summary.status.exit_code())
}

fn cmd_status(repo: &SpecRepo, format: OutputFormat) -> Result<u8> {
    debug!(%format, "cmd_status: called");
    let records = collect_status(repo)?;
    match format {
        OutputFormat::Text => println!("{}", render_status_text(&records).trim_end()),
        OutputFormat::Json => println!("{}", render_json(&records)?),
    }
    Ok(0)
}

fn cmd_tasks(repo: &SpecRepo, spec: &str) -> Result<u8> {
    debug!(%spec, "cmd_tasks: called");
    let path: PathBuf = repo.resolve(spec)?;
    let doc = SpecDocument::load(&path).context(format!("Failed to load spec {}", path.display()))?;
    print!("{}", render_tasks(&doc));
    Ok(0)
}
