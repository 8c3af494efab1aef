//! recipient-flow daemon and experimenter CLI
//!
//! ```bash
//! # Serve the participant API
//! recipient-flow --config recipient-flow.toml
//!
//! # Load the dictator pool, then check it
//! recipient-flow import-pool dictator_rounds.json
//! recipient-flow pool-status
//!
//! # Payment export
//! recipient-flow export --format csv > payments.csv
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use recipient_flow::api::{create_router, AppState};
use recipient_flow::cli::{self, Commands};
use recipient_flow::{AllocationDb, Config};

#[derive(Parser)]
#[command(name = "recipient-flow")]
#[command(about = "Recipient-side survey flow for the dictator game")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "recipient-flow.toml")]
    config: String,

    /// SQLite database file (overrides config file)
    #[arg(long, env = "RECIPIENT_DB_PATH")]
    db_path: Option<String>,

    /// HTTP port (overrides config file)
    #[arg(long, env = "RECIPIENT_HTTP_PORT")]
    http_port: Option<u16>,

    /// Token for admin endpoints (overrides config file)
    #[arg(long, env = "RECIPIENT_ADMIN_TOKEN", hide_env_values = true)]
    admin_token: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("recipient_flow=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    // Load or create default config
    let mut config = if Path::new(&cli.config).exists() {
        info!("Config file: {}", cli.config);
        Config::load(Path::new(&cli.config))?
    } else {
        info!("Config file not found, using defaults");
        Config::default()
    };

    // Apply CLI overrides
    if let Some(db_path) = cli.db_path {
        config.database.path = PathBuf::from(db_path);
    }
    if let Some(port) = cli.http_port {
        config.server.http_port = port;
    }
    if let Some(token) = cli.admin_token {
        config.server.admin_token = Some(token);
    }
    config.validate()?;

    let db = Arc::new(AllocationDb::open(
        &config.database.path,
        Duration::from_millis(config.database.busy_timeout_ms),
    )?);

    match cli.command {
        None | Some(Commands::Serve) => serve(config, db).await,
        Some(cmd) => {
            let output = cli::execute_command(&db, &config, cmd)?;
            println!("{}", output);
            Ok(())
        }
    }
}

async fn serve(config: Config, db: Arc<AllocationDb>) -> anyhow::Result<()> {
    info!(
        target_count = config.assignment.target_count,
        policy = ?config.assignment.exhaustion_policy,
        selection = ?config.assignment.selection,
        "Assignment settings"
    );
    if config.server.admin_token.is_none() {
        info!("No admin token configured, admin endpoints are open");
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.http_port));
    let state = Arc::new(AppState::new(config, db));
    let app = create_router(state);

    info!("API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
