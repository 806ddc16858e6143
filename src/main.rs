//! rowbridge - a read-only query bridge for legacy embedded SQL engines.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rowbridge::auth::{generate_key, StaticCredentialStore};
use rowbridge::caller::PaginationProber;
use rowbridge::cli::{Cli, Command};
use rowbridge::config::Config;
use rowbridge::db::driver_for;
use rowbridge::descriptor::QueryDescriptor;
use rowbridge::error::{BridgeError, Result};
use rowbridge::logging;
use rowbridge::query::QueryService;
use rowbridge::transport::server::{self, AppState};
use rowbridge::transport::{AgentClient, QueryResponse, QueryTransport};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();

    if cli.log_file {
        logging::init_file_logging();
    } else {
        logging::init_stderr_logging();
    }

    if let Err(e) = run(cli).await {
        error!("{}: {}", e.category(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Command::Serve { .. } => serve(load_config(&cli)?).await,
        Command::Keygen { name } => keygen(name.clone()),
        Command::Check => check(&cli.config_path(), load_config(&cli)?).await,
        Command::Query {
            agent,
            key,
            file,
            page_size,
            timeout,
        } => remote_query(agent, key, file, *page_size, *timeout).await,
    }
}

/// Loads configuration with precedence CLI flags > environment > file > defaults.
fn load_config(cli: &Cli) -> Result<Config> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());

    let mut config = Config::load_from_file(&config_path)?;
    config.apply_env_overrides();
    cli.apply_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

fn build_service(config: &Config) -> Result<QueryService> {
    let driver = driver_for(&config.database)?;
    Ok(QueryService::from_config(config, driver))
}

async fn serve(config: Config) -> Result<()> {
    info!("rowbridge agent v{} starting", env!("CARGO_PKG_VERSION"));
    info!("Database: {}", config.database.display_string());
    info!("Allowed tables: {}", config.allowlist.tables.join(", "));

    let service = build_service(&config)?;
    let credentials = StaticCredentialStore::new(config.credentials.clone());
    if credentials.is_empty() {
        warn!("No credentials configured; every /query request will be rejected. Run `rowbridge keygen`.");
    }

    let listener = tokio::net::TcpListener::bind(&config.agent.bind)
        .await
        .map_err(|e| BridgeError::config(format!("Cannot listen on {}: {e}", config.agent.bind)))?;

    let state = Arc::new(AppState::new(service, Arc::new(credentials)));
    server::serve(listener, state).await?;
    info!("rowbridge agent stopped");
    Ok(())
}

fn keygen(name: Option<String>) -> Result<()> {
    let generated = generate_key(name);
    println!("A new agent key has been generated. It is shown only once:");
    println!();
    println!("  {}", generated.key);
    println!();
    println!("Add this entry to the agent config:");
    println!();
    print!("{}", generated.to_toml()?);
    Ok(())
}

async fn check(config_path: &Path, config: Config) -> Result<()> {
    println!("Config:      {}", config_path.display());
    println!("Database:    {}", config.database.display_string());
    println!("Dialect:     {}", config.database.dialect.as_str());
    println!("Listen:      {}", config.agent.bind);
    println!("Credentials: {}", config.credentials.len());
    println!("Allowed tables:");
    for table in &config.allowlist.tables {
        match config.allowlist.columns.get(table) {
            Some(columns) => println!("  {table} ({})", columns.join(", ")),
            None => println!("  {table} (all columns)"),
        }
    }

    let report = build_service(&config)?.health().await;
    let rendered = serde_json::to_string_pretty(&report)
        .map_err(|e| BridgeError::internal(format!("Failed to render health report: {e}")))?;
    println!("{rendered}");

    if report.is_healthy() {
        Ok(())
    } else {
        Err(BridgeError::connection(
            report
                .message
                .unwrap_or_else(|| "Database connection failed".to_string()),
        ))
    }
}

async fn remote_query(
    agent: &str,
    key: &str,
    file: &Path,
    page_size: Option<u32>,
    timeout_secs: u64,
) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .map_err(|e| BridgeError::config(format!("Failed to read {}: {e}", file.display())))?;
    let descriptor: QueryDescriptor = serde_json::from_str(&content)
        .map_err(|e| BridgeError::bad_request(format!("Invalid descriptor in {}: {e}", file.display())))?;

    let client = AgentClient::new(agent, key, Duration::from_secs(timeout_secs))?;
    if !client.is_healthy().await {
        return Err(BridgeError::transport(format!(
            "Agent at {} is unreachable or unhealthy",
            client.base_url()
        )));
    }

    let result = match page_size {
        Some(size) => {
            PaginationProber::new(&client, size)
                .fetch_all(&descriptor)
                .await?
        }
        None => client.query(&descriptor).await?,
    };

    let rendered = serde_json::to_string_pretty(&QueryResponse::success(result))
        .map_err(|e| BridgeError::internal(format!("Failed to render result: {e}")))?;
    println!("{rendered}");
    Ok(())
}
