//! CLI entry point — the composition root.
//!
//! Loads the environment, initializes logging, and dispatches to the
//! gateway. All wiring happens in `crossbar_axum::bootstrap`.

use clap::{Parser, Subcommand};
use crossbar_core::{BackendRegistry, Settings};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "crossbar", version, about = "Local AI gateway")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway (default).
    Serve {
        /// Override GATEWAY_HOST.
        #[arg(long)]
        host: Option<String>,
        /// Override GATEWAY_PORT.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Load and validate configuration, then exit.
    CheckConfig,
    /// Print the effective backend registry as JSON, then exit.
    PrintRegistry,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Serve {
        host: None,
        port: None,
    });

    match command {
        Commands::Serve { host, port } => {
            let mut settings = Settings::from_env()?;
            if let Some(host) = host {
                settings.host = host;
            }
            if let Some(port) = port {
                settings.port = port;
            }
            crossbar_axum::start_server(settings).await
        }
        Commands::CheckConfig => {
            let settings = Settings::from_env()?;
            let registry = match &settings.backends_path {
                Some(path) => BackendRegistry::load(path)?,
                None => BackendRegistry::builtin_default(),
            };
            println!(
                "configuration ok: {} backend(s), images backend {}",
                registry.iter().count(),
                settings.images_backend.as_str()
            );
            Ok(())
        }
        Commands::PrintRegistry => {
            let settings = Settings::from_env()?;
            let registry = match &settings.backends_path {
                Some(path) => BackendRegistry::load(path)?,
                None => BackendRegistry::builtin_default(),
            };
            let backends: Vec<_> = registry.iter().collect();
            println!("{}", serde_json::to_string_pretty(&backends)?);
            Ok(())
        }
    }
}
