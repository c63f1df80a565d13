mod dispatch;
mod logging;
mod serve;
mod tools;

use std::path::PathBuf;

use anyhow::Result;
use caldav_mcp_core::{CalDavConnector, ConfigResolver, DEFAULT_CONFIG_PATH, Gateway};
use clap::{Parser, Subcommand};
use tracing::debug;

use crate::tools::{ToolCommand, Tools};

#[derive(Parser)]
#[command(name = "caldav-mcp")]
#[command(about = "CalDAV events, to-dos and journals over line-delimited JSON-RPC")]
struct Cli {
    /// Settings file (JSON). Environment variables override its values.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer JSON-RPC requests from stdin, one per line (default)
    Serve,
    /// Run a single operation and print its JSON result
    Tool {
        #[command(subcommand)]
        tool: ToolCommand,
    },
}

// Requests are handled strictly one at a time.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let resolver = ConfigResolver::load(cli.config.clone());
    let settings = resolver.settings();
    logging::init(&settings.log_level);
    debug!("Loaded settings from {}", resolver.path().display());

    let gateway = Gateway::new(CalDavConnector, settings);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve::serve_stdio(gateway).await,
        Commands::Tool { tool } => {
            let mut tools = Tools::new(gateway);
            let output = tools.run(tool).await;
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
    }
}
