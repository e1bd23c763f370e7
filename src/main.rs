use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use remedy_core::analyzer::AnalyzerKind;
use remedy_core::config::RemedyConfig;
use remedy_core::mcp::McpServer;
use remedy_core::remediation::Operation;
use remedy_core::{Outcome, Remediator};

#[derive(Parser)]
#[command(
    name = "remedy-core",
    version,
    about = "Analyze, fix, back up and restore Python sources"
)]
struct Cli {
    /// Workspace root (overrides REMEDY_WORKSPACE and the config file)
    #[arg(short, long, global = true)]
    workspace: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List issues without modifying anything
    Analyze {
        path: String,
        /// Check docstrings instead of general style
        #[arg(long)]
        docstrings: bool,
    },
    /// Back up a file, then apply automatic fixes
    Fix {
        path: String,
        /// Fix docstrings instead of general style
        #[arg(long)]
        docstrings: bool,
    },
    /// Create a backup of a file
    Backup { path: String },
    /// Restore a file from backup (newest unless --version is given)
    Restore {
        path: String,
        /// 1-based backup number as shown by `backups`, 1 = newest
        #[arg(long = "version", value_name = "N")]
        backup_version: Option<usize>,
    },
    /// List backups of a file, newest first
    Backups { path: String },
    /// Serve the remediation tools as JSON-RPC over stdio
    Serve,
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print JSON schema for configuration
    Schema,
    /// Print the effective configuration
    Show,
}

fn kind(docstrings: bool) -> AnalyzerKind {
    if docstrings {
        AnalyzerKind::Docstrings
    } else {
        AnalyzerKind::Style
    }
}

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "remedy_core=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut cfg = RemedyConfig::load_or_default();
    if let Some(workspace) = cli.workspace {
        cfg.workspace = workspace;
        cfg = cfg.with_workspace_overrides();
    }

    let (op, path, version) = match cli.command {
        Commands::Analyze { path, docstrings } => (Operation::Analyze(kind(docstrings)), path, None),
        Commands::Fix { path, docstrings } => (Operation::Fix(kind(docstrings)), path, None),
        Commands::Backup { path } => (Operation::Backup, path, None),
        Commands::Restore {
            path,
            backup_version,
        } => (Operation::Restore, path, backup_version),
        Commands::Backups { path } => (Operation::ListBackups, path, None),
        Commands::Serve => {
            McpServer::from_config(&cfg).run_stdio()?;
            return Ok(ExitCode::SUCCESS);
        }
        Commands::Config { action } => {
            match action {
                ConfigAction::Schema => println!("{}", RemedyConfig::json_schema()),
                ConfigAction::Show => println!("{}", serde_json::to_string_pretty(&cfg)?),
            }
            return Ok(ExitCode::SUCCESS);
        }
    };

    let remediator = Remediator::new(&cfg);
    let outcome: Outcome = op.run(&remediator, &path, version);
    if outcome.success {
        println!("{}", outcome.message);
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("{}", outcome.message);
        Ok(ExitCode::FAILURE)
    }
}
