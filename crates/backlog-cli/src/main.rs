mod cmd;
mod context;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    config::ConfigSubcommand, github::GithubSubcommand, issues::IssuesSubcommand,
    map::MapSubcommand, report::ReportSubcommand, sync::SyncSubcommand,
};
use context::{Context, JiraArgs};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "backlog",
    about = "Keep a markdown backlog, a JSON issue cache and Jira in step",
    version,
    propagate_version = true
)]
struct Cli {
    /// Repository root (default: auto-detect from .github/ or .git/)
    #[arg(long, global = true, env = "BACKLOG_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Pause between API calls in milliseconds (overrides the config)
    #[arg(long, global = true, value_name = "MS")]
    delay_ms: Option<u64>,

    /// Jira base URL (default: JIRA_URL)
    #[arg(long, global = true)]
    jira_url: Option<String>,

    /// Jira account email (default: JIRA_EMAIL)
    #[arg(long, global = true)]
    jira_email: Option<String>,

    /// Jira API token (default: JIRA_API_TOKEN)
    #[arg(long, global = true)]
    jira_api_token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse the backlog document and show its structure
    Parse {
        /// Backlog file (default: from config)
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Create tracker issues for backlog items missing from the mapping
    Import {
        #[arg(long)]
        file: Option<PathBuf>,
        /// Show what would be created
        #[arg(long)]
        dry_run: bool,
    },

    /// Build mapping files between the backlog and the tracker
    Map {
        #[command(subcommand)]
        subcommand: MapSubcommand,
    },

    /// Update the backlog document from tracker or verification state
    Sync {
        #[command(subcommand)]
        subcommand: SyncSubcommand,
    },

    /// Read and change tracker issues
    Issues {
        #[command(subcommand)]
        subcommand: IssuesSubcommand,
    },

    /// Render markdown reports
    Report {
        #[command(subcommand)]
        subcommand: ReportSubcommand,
    },

    /// GitHub housekeeping
    Github {
        #[command(subcommand)]
        subcommand: GithubSubcommand,
    },

    /// Show or validate .github/backlog.yaml
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

impl Commands {
    /// Commands that call a remote API to change state log at INFO.
    fn mutates_remote(&self) -> bool {
        match self {
            Commands::Import { dry_run, .. } => !dry_run,
            Commands::Issues { subcommand } => subcommand.mutates_remote(),
            Commands::Github { subcommand } => subcommand.mutates_remote(),
            _ => false,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.command.mutates_remote() {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());
    let jira = JiraArgs {
        url: cli.jira_url,
        email: cli.jira_email,
        api_token: cli.jira_api_token,
    };

    let result = Context::load(root, cli.json, cli.delay_ms, jira).and_then(|ctx| match cli.command {
        Commands::Parse { file } => cmd::parse::run(&ctx, file.as_deref()),
        Commands::Import { file, dry_run } => cmd::import::run(&ctx, file.as_deref(), dry_run),
        Commands::Map { subcommand } => cmd::map::run(&ctx, subcommand),
        Commands::Sync { subcommand } => cmd::sync::run(&ctx, subcommand),
        Commands::Issues { subcommand } => cmd::issues::run(&ctx, subcommand),
        Commands::Report { subcommand } => cmd::report::run(&ctx, subcommand),
        Commands::Github { subcommand } => cmd::github::run(&ctx, subcommand),
        Commands::Config { subcommand } => cmd::config::run(&ctx, subcommand),
    });

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
