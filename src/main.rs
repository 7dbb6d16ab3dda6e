use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hashchat::config::{AppConfig, ConfigService, EnvOverrides};
use hashchat::mcp::{McpManager, RegistryCatalog, SearchOptions};
use hashchat::secrets::{ScryptAesCipher, SecretCipher};

#[derive(Parser)]
#[command(name = "hashchat")]
#[command(about = "Service core of the hashchat desktop app", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the resolved configuration (secrets redacted)
    Config {
        /// Print the config file path instead of the contents
        #[arg(long)]
        path: bool,
    },
    /// List configured MCP servers
    Servers,
    /// Validate a configured MCP server
    Validate {
        /// Server id from the configured list
        server_id: String,
    },
    /// Validate and connect to a configured MCP server
    Connect {
        server_id: String,
    },
    /// Search the bundled server catalog
    Search {
        query: Option<String>,
    },
    /// Install a catalog entry into the configured servers
    Install {
        /// Catalog entry id
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hashchat=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { path } => show_config(path).await?,
        Commands::Servers => list_servers().await?,
        Commands::Validate { server_id } => validate_server(&server_id).await?,
        Commands::Connect { server_id } => connect_server(&server_id).await?,
        Commands::Search { query } => search_catalog(query)?,
        Commands::Install { id } => install_entry(&id).await?,
    }

    Ok(())
}

/// Cipher keyed from the environment; without a master key the config is
/// stored in the clear, matching platforms without secret storage.
fn cipher_from_env() -> Arc<dyn SecretCipher> {
    let master_key = std::env::var("HASHCHAT_MASTER_KEY").unwrap_or_default();
    Arc::new(ScryptAesCipher::new(master_key))
}

fn config_service() -> Result<ConfigService> {
    Ok(ConfigService::new(
        ConfigService::default_path()?,
        cipher_from_env(),
    ))
}

fn servers_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().context("could not determine data directory")?;
    Ok(data_dir
        .join("hashchat")
        .join(hashchat::mcp::store::SERVERS_FILE_NAME))
}

async fn show_config(path_only: bool) -> Result<()> {
    let service = config_service()?;
    if path_only {
        println!("{}", service.path().display());
        return Ok(());
    }

    let mut config = service.load().await;
    EnvOverrides::capture().apply(&mut config);
    redact(&mut config);
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn redact(config: &mut AppConfig) {
    for value in [
        &mut config.hedera.private_key,
        &mut config.openai.api_key,
        &mut config.anthropic.api_key,
    ] {
        if !value.is_empty() {
            *value = "<set>".to_string();
        }
    }
}

async fn list_servers() -> Result<()> {
    let manager = McpManager::open(servers_path()?).await;
    for server in manager.store().list().await {
        println!(
            "{}  {}  [{}]{}",
            server.id,
            server.name,
            server.config.type_name(),
            if server.enabled { "" } else { "  (disabled)" }
        );
    }
    Ok(())
}

async fn validate_server(server_id: &str) -> Result<()> {
    let manager = McpManager::open(servers_path()?).await;
    let result = manager.validate(server_id).await?;

    if result.valid {
        println!("valid");
    } else {
        for message in manager.validator().error_messages(&result.errors) {
            println!("error: {message}");
        }
    }
    for message in manager.validator().warning_messages(&result.warnings) {
        println!("warning: {message}");
    }
    Ok(())
}

async fn connect_server(server_id: &str) -> Result<()> {
    let manager = McpManager::open(servers_path()?).await;
    let result = manager.connect(server_id).await?;

    if result.success {
        println!("connected, {} tool(s):", result.tools.len());
        for tool in &result.tools {
            if let Some(name) = tool.get("name").and_then(|v| v.as_str()) {
                println!("  - {name}");
            }
        }
    } else {
        println!(
            "connection failed: {}",
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

fn search_catalog(query: Option<String>) -> Result<()> {
    let result = RegistryCatalog::bundled().search(&SearchOptions {
        query,
        ..Default::default()
    });
    for entry in &result.servers {
        println!("{}  {}  {}", entry.id, entry.name, entry.description);
    }
    println!("{} result(s)", result.total);
    Ok(())
}

async fn install_entry(id: &str) -> Result<()> {
    let manager = McpManager::open(servers_path()?).await;
    let installed = RegistryCatalog::bundled()
        .install(manager.store(), id)
        .await?;
    println!("installed as {}", installed.id);
    Ok(())
}
