//! CLI binary for RIFT governance validation and script orchestration.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use riftgov_exec::{CommandRunner, LocalRunner};
use riftgov_governance::{GovernancePaths, GovernanceValidator, LockChecker, PipelineValidator};
use riftgov_orchestrator::{
    governed_run, Orchestrator, OrchestratorOptions, RegistryConfig, DEFAULT_CONFIG_PATH,
};
use riftgov_types::RunContext;

#[derive(Parser)]
#[command(name = "rift-gov", version, about = "RIFT stage governance and script orchestration")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate governance descriptors for stages 0-6 and custom stages
    Validate {
        /// Project root holding the .riftrc descriptors (default: current directory)
        #[arg(long)]
        project_root: Option<PathBuf>,

        /// Script registry whose governance section supplies tool and fallback settings
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print the report as JSON instead of a table
        #[arg(long)]
        json: bool,

        /// Also write the JSON report to this file
        #[arg(long)]
        report_out: Option<PathBuf>,
    },

    /// Show the execution order for a target without running anything
    Plan {
        /// Script name from the registry
        target: String,

        /// Script registry file
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },

    /// Validate governance, then execute a target and its dependencies
    Run {
        /// Script name from the registry
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        target: Option<String>,

        /// Run every script in the registry
        #[arg(long)]
        all: bool,

        /// Script registry file
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Project root (default: registry setting, then current directory)
        #[arg(long)]
        project_root: Option<PathBuf>,

        /// Check permissions and governance but invoke no hooks or scripts
        #[arg(long)]
        dry_run: bool,

        /// Print the status report as JSON
        #[arg(long)]
        json: bool,

        /// Also write the JSON status report to this file
        #[arg(long)]
        report_out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let code = match cli.command {
        Commands::Validate {
            project_root,
            config,
            json,
            report_out,
        } => cmd_validate(project_root, config.as_deref(), json, report_out.as_deref()).await?,
        Commands::Plan { target, config } => cmd_plan(&target, &config)?,
        Commands::Run {
            target,
            all,
            config,
            project_root,
            dry_run,
            json,
            report_out,
        } => {
            let target = if all { None } else { target };
            cmd_run(
                target.as_deref(),
                &config,
                project_root,
                dry_run,
                json,
                report_out.as_deref(),
            )
            .await?
        }
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<RegistryConfig> {
    let config = RegistryConfig::load(path)?;
    tracing::debug!(
        registry = %config.metadata.name,
        scripts = config.scripts.len(),
        "Loaded script registry"
    );
    Ok(config)
}

/// `--project-root`, then the registry's `governance.project_root`, then the
/// current directory.
fn resolve_project_root(
    flag: Option<PathBuf>,
    config: Option<&RegistryConfig>,
) -> anyhow::Result<PathBuf> {
    let root = match flag.or_else(|| config.and_then(RegistryConfig::configured_project_root)) {
        Some(root) => root,
        None => std::env::current_dir()?,
    };
    Ok(std::fs::canonicalize(&root)?)
}

fn pipeline_validator(
    root: &Path,
    config: Option<&RegistryConfig>,
    runner: Arc<dyn CommandRunner>,
) -> PipelineValidator {
    let mut paths = GovernancePaths::new(root);
    let mut lock = LockChecker::new(runner);
    if let Some(config) = config {
        paths = paths.with_fallback_dir(&config.governance.fallback_dir);
        lock = lock.with_tool(&config.governance.semverx_tool);
    }
    PipelineValidator::new(GovernanceValidator::new(paths, lock))
}

fn write_json(path: &Path, json: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, json)?;
    tracing::info!(path = %path.display(), "Report written");
    Ok(())
}

async fn cmd_validate(
    project_root: Option<PathBuf>,
    config: Option<&Path>,
    json: bool,
    report_out: Option<&Path>,
) -> anyhow::Result<i32> {
    let config = config.map(load_config).transpose()?;
    let root = resolve_project_root(project_root, config.as_ref())?;
    let runner: Arc<dyn CommandRunner> = Arc::new(LocalRunner::new());

    tracing::info!(project_root = %root.display(), "Validating stage governance");
    let pipeline = pipeline_validator(&root, config.as_ref(), runner);
    let ctx = RunContext::new();
    let report = pipeline.generate_report(&ctx).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.render_text());
    }
    if let Some(path) = report_out {
        report.save(path).await?;
        tracing::info!(path = %path.display(), "Report written");
    }

    Ok(report.exit_code())
}

fn cmd_plan(target: &str, config_path: &Path) -> anyhow::Result<i32> {
    let config = load_config(config_path)?;
    let graph = riftgov_orchestrator::DependencyGraph::from_config(&config)?;
    let order = graph.resolve(target)?;

    println!("Registry: {} {}", config.metadata.name, config.metadata.version);
    println!("Target: {target}");
    println!("\nExecution order:");
    for (i, node) in order.iter().enumerate() {
        let deps = if node.depends_on.is_empty() {
            String::new()
        } else {
            format!(" after {}", node.depends_on.join(", "))
        };
        println!(
            "  {:>2}. {} [stage {}] {}{}",
            i + 1,
            node.name,
            node.stage,
            node.path.display(),
            deps
        );
    }
    Ok(0)
}

async fn cmd_run(
    target: Option<&str>,
    config_path: &Path,
    project_root: Option<PathBuf>,
    dry_run: bool,
    json: bool,
    report_out: Option<&Path>,
) -> anyhow::Result<i32> {
    let config = load_config(config_path)?;
    let root = resolve_project_root(project_root, Some(&config))?;
    let runner: Arc<dyn CommandRunner> = Arc::new(LocalRunner::new());

    let mut options = OrchestratorOptions::new(&root);
    options.dry_run = dry_run;
    let orchestrator = Orchestrator::from_config(&config, &options, runner.clone())?;
    let pipeline = pipeline_validator(&root, Some(&config), runner);

    if !json {
        println!("Running {} in {}", target.unwrap_or("all scripts"), root.display());
        if dry_run {
            println!("(dry run mode -- no hooks or scripts invoked)");
        }
    }

    let ctx = RunContext::new();
    let status = governed_run(&ctx, &pipeline, &orchestrator, target).await?;

    let rendered = serde_json::to_string_pretty(&status)?;
    if json {
        println!("{rendered}");
    } else {
        print!("{}", status.render_text());
    }
    if let Some(path) = report_out {
        write_json(path, &rendered)?;
    }

    Ok(status.exit_code())
}
