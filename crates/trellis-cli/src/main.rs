//! The trellis command line entry point
//!
//! Thin adapter around the core: reads definitions, wires the repository,
//! resolver, plugin loader and scheduler, and maps the build report to an
//! exit code. Exit code 0 only if every in-scope module reaches
//! `Completed` through the requested stage.

mod execute;
mod plugins;
mod workspace;

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use trellis_model::Stage;
use trellis_pipeline::{BuildReport, ModuleState};

#[derive(Parser)]
#[command(
    name = "trellis",
    version,
    about = "Staged build orchestrator for multi-module projects"
)]
struct Cli {
    /// Lifecycle stage to build through (clean, compile, resources, test,
    /// archive, publish)
    stage: String,

    /// Workspace root containing trellis.json
    #[arg(long, default_value = ".")]
    path: PathBuf,

    /// Component repository directory (default: ~/.trellis/repository)
    #[arg(long, env = "TRELLIS_REPOSITORY")]
    repository: Option<PathBuf>,

    /// Worker count; 0 means one per core
    #[arg(long, default_value_t = 0)]
    jobs: usize,

    /// Keep dispatching independent work after the first failure
    #[arg(long)]
    no_fail_fast: bool,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(report) => {
            print_summary(&report);
            if report.success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<BuildReport> {
    let stage: Stage = cli
        .stage
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))
        .context("invalid target stage")?;

    let repository = match cli.repository {
        Some(path) => path,
        None => default_repository()?,
    };

    let workspace = workspace::load(&cli.path)?;
    let options = execute::BuildOptions {
        stage,
        jobs: cli.jobs,
        fail_fast: !cli.no_fail_fast,
        repository,
    };
    execute::build(&workspace, &options, &plugins::registry())
}

fn default_repository() -> anyhow::Result<PathBuf> {
    let home = std::env::var_os("HOME")
        .map(PathBuf::from)
        .context("HOME is not set; pass --repository")?;
    Ok(home.join(".trellis").join("repository"))
}

fn print_summary(report: &BuildReport) {
    for (coordinate, outcome) in &report.modules {
        let label = match outcome.state {
            ModuleState::Completed => "completed".to_string(),
            ModuleState::Failed => "failed".to_string(),
            ModuleState::Pending => "skipped".to_string(),
            ModuleState::Running(stage) => format!("stopped at {}", stage),
        };
        println!("{:>12}  {}", label, coordinate);
    }
    if let Some(failure) = &report.first_failure {
        eprintln!("error: {}", failure);
    }
    println!(
        "build {} in {:.2}s",
        if report.success() { "succeeded" } else { "failed" },
        report.elapsed.as_secs_f64()
    );
}
