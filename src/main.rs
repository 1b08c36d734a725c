//! hostprep CLI entrypoint.
//!
//! This is the main entrypoint for the hostprep command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use hostprep::cli::{Cli, Commands, ConsoleReporter, LockCommands, OutputFormat, OutputFormatter, policy_override};
use hostprep::config::{ConfigParser, ConfigValidator, ProvisionConfig, find_config_file};
use hostprep::error::{LockError, Result};
use hostprep::lock::TargetLock;
use hostprep::planner::{CancellationToken, FailurePolicy, Plan, PlanExecutor};
use hostprep::remote::{RemoteExecutor, Target, connector_for};
use hostprep::report::{Reporter, TracingReporter};

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<ExitCode> {
    let formatter = OutputFormatter::new(cli.output);

    match cli.command {
        Commands::Init { path, force } => cmd_init(&path, force).map(|()| ExitCode::SUCCESS),
        Commands::Validate { warnings } => cmd_validate(cli.config.as_ref(), warnings, &formatter),
        Commands::Plan { only } => cmd_plan(cli.config.as_ref(), &only, &formatter).map(|()| ExitCode::SUCCESS),
        Commands::Apply {
            yes,
            continue_on_failure,
            stop_on_failure,
            only,
        } => {
            let policy = policy_override(continue_on_failure, stop_on_failure);
            cmd_apply(cli.config.as_ref(), yes, policy, &only, &formatter).await
        }
        Commands::Lock { command } => cmd_lock(cli.config.as_ref(), command, &formatter)
            .await
            .map(|()| ExitCode::SUCCESS),
    }
}

/// Initialize a new project.
fn cmd_init(path: &PathBuf, force: bool) -> Result<()> {
    info!("Initializing new hostprep project in: {}", path.display());

    let config_path = path.join("hostprep.yaml");
    let env_path = path.join(".env.example");
    let gitignore_path = path.join(".gitignore");

    // Check if files exist
    if !force && config_path.exists() {
        eprintln!("Configuration file already exists: {}", config_path.display());
        eprintln!("Use --force to overwrite.");
        return Ok(());
    }

    // Create directory if needed
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }

    // Write config template
    std::fs::write(&config_path, include_str!("../templates/hostprep.yaml"))?;
    eprintln!("Created: {}", config_path.display());

    // Write the sample upload source
    let files_dir = path.join("files");
    std::fs::create_dir_all(&files_dir)?;
    let vimrc_path = files_dir.join("vimrc");
    if force || !vimrc_path.exists() {
        std::fs::write(&vimrc_path, include_str!("../templates/files/vimrc"))?;
        eprintln!("Created: {}", vimrc_path.display());
    }

    // Write .env.example
    std::fs::write(&env_path, include_str!("../templates/.env.example"))?;
    eprintln!("Created: {}", env_path.display());

    // Keep .env out of version control
    if gitignore_path.exists() {
        let existing = std::fs::read_to_string(&gitignore_path)?;
        if !existing.lines().any(|l| l.trim() == ".env") {
            let mut file = std::fs::OpenOptions::new().append(true).open(&gitignore_path)?;
            writeln!(file, "\n# hostprep\n.env")?;
            eprintln!("Updated: {}", gitignore_path.display());
        }
    } else {
        std::fs::write(&gitignore_path, ".env\n")?;
        eprintln!("Created: {}", gitignore_path.display());
    }

    eprintln!("\nProject initialized successfully!");
    eprintln!("Next steps:");
    eprintln!("  1. Copy .env.example to .env and set the target host and user");
    eprintln!("  2. Edit hostprep.yaml with your steps");
    eprintln!("  3. Run 'hostprep validate' to check your configuration");
    eprintln!("  4. Run 'hostprep plan' to see the ordered steps");
    eprintln!("  5. Run 'hostprep apply' to provision the host");

    Ok(())
}

/// Validate configuration.
fn cmd_validate(config_path: Option<&PathBuf>, show_warnings: bool, formatter: &OutputFormatter) -> Result<ExitCode> {
    let (config, parser) = load_config(config_path)?;

    let result = ConfigValidator::new()
        .with_base_path(parser.base_path())
        .check(&config);
    println!("{}", formatter.format_validation(&result, show_warnings));

    if formatter.format() == OutputFormat::Text && result.is_valid() {
        eprintln!("Configuration summary:");
        eprintln!("  Plan: {}", config.name);
        eprintln!("  Target: {}", Target::from_config(&config.target).destination());
        eprintln!("  Steps: {}", config.steps.len());
        eprintln!("  Policy: {}", config.policy);
    }

    Ok(if result.is_valid() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Show the ordered steps.
fn cmd_plan(config_path: Option<&PathBuf>, only: &[String], formatter: &OutputFormatter) -> Result<()> {
    let (config, parser) = load_config(config_path)?;
    let plan = build_plan(&config, &parser, only)?;

    let target = Target::from_config(&config.target);
    println!("{}", formatter.format_plan(&plan, &target.destination()));

    Ok(())
}

/// Run the plan against the target.
async fn cmd_apply(
    config_path: Option<&PathBuf>,
    auto_approve: bool,
    policy: Option<FailurePolicy>,
    only: &[String],
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let (config, parser) = load_config(config_path)?;
    let mut plan = build_plan(&config, &parser, only)?;
    if let Some(policy) = policy {
        plan = plan.with_policy(policy);
    }

    let target = Target::from_config(&config.target);

    // Show plan
    if formatter.format() == OutputFormat::Text {
        eprintln!("{}", formatter.format_plan(&plan, &target.destination()));
    }

    // Confirm
    if !auto_approve {
        eprint!("Do you want to apply this plan? [y/N]: ");
        std::io::stderr().flush()?;
        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            eprintln!("Apply cancelled.");
            return Ok(ExitCode::SUCCESS);
        }
    }

    // Ctrl-C stops the run before the next step
    let cancellation = CancellationToken::new();
    let on_interrupt = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted: stopping after the current step");
            on_interrupt.cancel();
        }
    });

    let connector = connector_for(target.transport);
    let console = ConsoleReporter;
    let tracing_reporter = TracingReporter;
    let reporter: &dyn Reporter = match formatter.format() {
        OutputFormat::Text => &console,
        OutputFormat::Json => &tracing_reporter,
    };

    let executor = PlanExecutor::new(connector.as_ref())
        .with_reporter(reporter)
        .with_cancellation(cancellation);
    let result = executor.execute_plan(&target, &plan).await?;

    println!("{}", formatter.format_result(&result));

    Ok(if result.success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Target lock commands.
async fn cmd_lock(config_path: Option<&PathBuf>, command: LockCommands, formatter: &OutputFormatter) -> Result<()> {
    let (config, _parser) = load_config(config_path)?;
    let target = Target::from_config(&config.target);
    let destination = target.destination();

    let connector = connector_for(target.transport);
    let transport = connector.connect(&target).await?;
    let executor = RemoteExecutor::new(transport.as_ref(), &target);

    let outcome = match command {
        LockCommands::Show => TargetLock::inspect(&executor, &target.lock)
            .await
            .map(|lock| println!("{}", formatter.format_lock(&destination, lock.as_ref()))),
        LockCommands::Release { force } => release_lock(&executor, force, formatter).await,
    };

    if let Err(e) = transport.close().await {
        warn!("Failed to close session to {destination}: {e}");
    }

    Ok(outcome?)
}

/// Removes the target lock; an unexpired lock needs `--force`.
async fn release_lock(
    executor: &RemoteExecutor<'_>,
    force: bool,
    formatter: &OutputFormatter,
) -> std::result::Result<(), LockError> {
    let settings = &executor.target().lock;

    match TargetLock::inspect(executor, settings).await? {
        None => {
            println!("{}", formatter.warning("No lock held."));
            Ok(())
        }
        Some(lock) if !force && !lock.is_expired() => Err(LockError::LockedByOther {
            holder: lock.holder,
            since: lock.acquired_at.to_rfc3339(),
        }),
        Some(lock) => {
            TargetLock::force_release(executor, settings).await?;
            println!("{}", formatter.success(&format!("Released lock {} held by {}", lock.lock_id, lock.holder)));
            Ok(())
        }
    }
}

/// Locates, loads and overrides the configuration.
fn load_config(config_path: Option<&PathBuf>) -> Result<(ProvisionConfig, ConfigParser)> {
    let config_file = resolve_config_path(config_path)?;
    info!("Using configuration: {}", config_file.display());

    let parser = ConfigParser::new().with_base_path(config_file.parent().unwrap_or_else(|| Path::new(".")));
    parser.load_dotenv()?;

    let config = parser.load_with_env(&config_file)?;
    Ok((config, parser))
}

/// Validates the configuration and compiles the selected steps.
fn build_plan(config: &ProvisionConfig, parser: &ConfigParser, only: &[String]) -> Result<Plan> {
    let validation = ConfigValidator::new()
        .with_base_path(parser.base_path())
        .validate(config)?;
    for warning in &validation.warnings {
        warn!("{warning}");
    }

    let plan = Plan::from_config(config, parser)?;
    Ok(plan.select(only)?)
}

/// Resolves the configuration file path.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    match config_path {
        Some(path) => Ok(path.clone()),
        None => find_config_file(std::env::current_dir()?),
    }
}
