#![forbid(unsafe_code)]

mod cmd;
mod output;

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use beanpod_core::BeanStore;
use beanpod_core::config;
use beanpod_core::notify::CollectingNotifier;
use clap::{CommandFactory, Parser, Subcommand};
use output::{CliError, OutputMode};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "beanpod: self-healing front end for beans workspaces",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Workspace root (defaults to the current directory).
    #[arg(short = 'C', long, global = true, value_name = "DIR")]
    workspace: Option<PathBuf>,

    /// Override the `beans` program used as the backend.
    #[arg(long, global = true, value_name = "PROGRAM")]
    backend: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        OutputMode::from_flag(self.json)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Read",
        about = "List beans",
        long_about = "List beans, repairing or quarantining malformed ones on the way.",
        after_help = "EXAMPLES:\n    # List everything\n    bp list\n\n    # Open bugs only\n    bp list --status todo --status in-progress --type bug\n\n    # Emit machine-readable output\n    bp list --json"
    )]
    List(cmd::list::ListArgs),

    #[command(
        next_help_heading = "Read",
        about = "Run a repair pass and report what it fixed",
        after_help = "EXAMPLES:\n    # Check the workspace in the current directory\n    bp check\n\n    # Emit machine-readable output\n    bp check --json"
    )]
    Check,

    #[command(
        next_help_heading = "Lifecycle",
        about = "Update a bean",
        long_about = "Update a bean. Status changes that close or start a bean cascade to its descendants.",
        after_help = "EXAMPLES:\n    # Start an epic and everything under it\n    bp update beans-ab12 --status in-progress\n\n    # Rename\n    bp update beans-ab12 --title \"Fix: relay chatter\""
    )]
    Update(cmd::update::UpdateArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Create a bean",
        after_help = "EXAMPLES:\n    # Create a task\n    bp create \"Wire the pump\"\n\n    # Create a bug under an epic\n    bp create \"Relay chatters\" --type bug --parent beans-ab12"
    )]
    Create(cmd::create::CreateArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Delete a bean",
        after_help = "EXAMPLES:\n    # Delete a bean\n    bp delete beans-ab12"
    )]
    Delete(cmd::delete::DeleteArgs),

    #[command(
        next_help_heading = "Project Maintenance",
        about = "Generate shell completion scripts",
        after_help = "EXAMPLES:\n    # Generate bash completions\n    bp completions bash"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("BEANPOD_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "beanpod=debug,info"
        } else {
            "beanpod=info,warn"
        })
    });

    let format = env::var("BEANPOD_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn open_store(cli: &Cli, notifier: Arc<CollectingNotifier>) -> anyhow::Result<BeanStore> {
    let workspace = match &cli.workspace {
        Some(dir) => dir.clone(),
        None => env::current_dir().context("resolving current directory")?,
    };
    let workspace_config = config::load_workspace_config(&workspace)
        .with_context(|| format!("loading workspace config in {}", workspace.display()))?;
    let mut engine = config::load_engine_config().context("loading beanpod config")?;
    if let Some(program) = &cli.backend {
        engine.backend_program.clone_from(program);
    }
    Ok(BeanStore::open_with(&workspace, workspace_config, &engine, notifier))
}

fn run(cli: &Cli, notifier: &Arc<CollectingNotifier>) -> anyhow::Result<()> {
    let output = cli.output_mode();
    if let Commands::Completions(args) = &cli.command {
        let mut command = Cli::command();
        return cmd::completions::run_completions(args.shell, &mut command);
    }

    let store = open_store(cli, Arc::clone(notifier))?;
    match &cli.command {
        Commands::List(args) => cmd::list::run_list(args, output, &store),
        Commands::Check => cmd::check::run_check(output, &store),
        Commands::Update(args) => cmd::update::run_update(args, output, &store),
        Commands::Create(args) => cmd::create::run_create(args, output, &store),
        Commands::Delete(args) => cmd::delete::run_delete(args, output, &store),
        Commands::Completions(_) => Ok(()),
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let output = cli.output_mode();
    let notifier = Arc::new(CollectingNotifier::new());
    let result = run(&cli, &notifier);
    output::render_notifications(output, &notifier.drain())?;

    if let Err(err) = result {
        output::render_error(output, &CliError::from(&err))?;
        std::process::exit(1);
    }
    Ok(())
}
