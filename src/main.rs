//! Command-line front end.
//!
//! - `version` prints the crate version.
//! - `list-tools` builds the server and prints the registered tool names without binding.
//! - `run` builds the server and serves the selected transport.
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use mnemomcp::{
    config::{AdapterConfig, ServerConfig},
    logging,
    server::MemoryServer,
};

#[derive(Parser)]
#[command(name = "mnemo-mcp", about = "Memory tools over stdio, HTTP, and WebSocket")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the version and exit.
    Version,
    /// Print registered tool names, one per line.
    ListTools(ServerArgs),
    /// Serve the selected transport.
    Run(RunArgs),
}

#[derive(Args)]
struct ServerArgs {
    /// Directory holding persisted memories.
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,
    /// Transport: stdio, http, or websocket.
    #[arg(long, default_value = "stdio")]
    transport: String,
    /// Serve only the flat-file memory tools.
    #[arg(long)]
    fallback: bool,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    server: ServerArgs,
    /// Name reported by `server_status` and `/health`.
    #[arg(long, default_value = "mnemo_mcp")]
    server_name: String,
    /// Port for the HTTP and WebSocket transports.
    #[arg(long, default_value_t = 8000)]
    port: u16,
    /// Interface for the HTTP and WebSocket transports.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Version => {
            println!("mnemo-mcp {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Command::ListTools(args) => {
            logging::init_tracing();
            let server = build_server(&args, "mnemo_mcp", 8000, "127.0.0.1")?;
            for name in server.registry().names() {
                println!("{name}");
            }
            Ok(())
        }
        Command::Run(args) => {
            logging::init_tracing();
            let server = build_server(&args.server, &args.server_name, args.port, &args.host)?;
            server
                .run()
                .await
                .context("server terminated with an error")
        }
    }
}

fn build_server(args: &ServerArgs, server_name: &str, port: u16, host: &str) -> Result<MemoryServer> {
    let config = ServerConfig::new(&args.data_dir, server_name, port, &args.transport)?
        .with_host(host)
        .with_fallback(args.fallback);
    let adapter_config =
        AdapterConfig::from_env(&args.data_dir).context("invalid MNEMO_* environment")?;
    MemoryServer::new(config, adapter_config).context("failed to start server")
}
