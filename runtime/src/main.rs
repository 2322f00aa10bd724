// Copyright 2026 CWCOT Scout Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use scout_runtime::cli;

#[derive(Parser)]
#[command(
    name = "cwcot-scout",
    about = "CWCOT Scout: find a listing's purchase agreement addendum and check it for CWCOT terms",
    version,
    after_help = "Run 'cwcot-scout <command> --help' for details on each command."
)]
struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Path to a JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a listing page and print its outcome as JSON
    Resolve {
        /// Listing page address
        url: String,
        /// First-phase time budget in milliseconds
        #[arg(long)]
        budget_ms: Option<u64>,
        /// Extension granted after the budget lapses, in milliseconds
        #[arg(long)]
        extension_ms: Option<u64>,
        /// Show the browser window (useful when the site needs a manual sign-in)
        #[arg(long)]
        headed: bool,
    },
    /// Extract and classify a PDF from a file or URL
    Classify {
        /// File path or http(s) address
        source: String,
        /// Filename hint (defaults to the last path segment)
        #[arg(long)]
        hint: Option<String>,
        /// Pages of text to classify
        #[arg(long, default_value = "3")]
        pages: usize,
        /// Download timeout in milliseconds
        #[arg(long, default_value = "30000")]
        timeout: u64,
    },
    /// Print the category of a document tile label
    Label {
        /// Label text
        text: String,
    },
    /// Check environment and diagnose issues
    Doctor,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let config = cli.config.as_deref();
    let result = match cli.command {
        Commands::Resolve {
            url,
            budget_ms,
            extension_ms,
            headed,
        } => {
            cli::resolve_cmd::run(cli::resolve_cmd::ResolveArgs {
                url: &url,
                config_path: config,
                budget_ms,
                extension_ms,
                headless: !headed,
            })
            .await
        }
        Commands::Classify {
            source,
            hint,
            pages,
            timeout,
        } => cli::classify_cmd::run(&source, hint.as_deref(), pages, timeout).await,
        Commands::Label { text } => cli::label_cmd::run(&text).await,
        Commands::Doctor => cli::doctor::run(config).await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "cwcot-scout", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = &result {
        eprintln!("  Error: {e:#}");
        std::process::exit(1);
    }

    result
}
