//! Data MCP Server
//!
//! A Model Context Protocol (MCP) server for SQL databases and web content.
//! Exposes database connection, query, and introspection tools alongside
//! web fetching and analysis tools over stdio.

use std::sync::Arc;

use clap::Parser;
use futures::FutureExt;
use tracing::info;

use data_mcp_server::config::Config;
use data_mcp_server::error::Result;
use data_mcp_server::mcp::registry::ToolRegistry;
use data_mcp_server::mcp::server::McpServer;
use data_mcp_server::mcp::transport::StdioTransport;
use data_mcp_server::modules::database::DatabaseModule;
use data_mcp_server::modules::web::WebModule;
use data_mcp_server::modules::ModuleManager;

const SERVER_NAME: &str = "data-mcp-server";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Data MCP Server
#[derive(Parser)]
#[command(name = "data-mcp-server")]
#[command(author, version, about = "Data MCP Server - A Model Context Protocol server for SQL databases and web content")]
struct Cli {
    /// Override the configured log level
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        eprintln!("Failed to start MCP server: {err}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::new()?;

    let log_level = cli.log_level.clone().unwrap_or_else(|| config.log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Starting MCP server initialization");
    validate_environment();
    tracing::debug!(
        leak_detection_ms = config.db_leak_detection_ms,
        "Pool leak detection threshold accepted (not enforced by the pool backend)"
    );

    let registry = Arc::new(ToolRegistry::new());
    let module_manager = ModuleManager::new(Arc::clone(&registry));

    let database_module = Arc::new(DatabaseModule::new(&config));
    let connection_manager = database_module.connection_manager();
    let web_module = Arc::new(WebModule::new(&config)?);

    module_manager.register_module(database_module)?;
    module_manager.register_module(web_module)?;

    for module in module_manager.module_info() {
        info!(
            module = %module.name,
            version = %module.version,
            description = module.description.as_deref().unwrap_or("No description"),
            "Registered module"
        );
    }

    let server = Arc::new(McpServer::new(SERVER_NAME, SERVER_VERSION, Arc::clone(&registry)));
    let transport = StdioTransport::new();

    let handler_server = Arc::clone(&server);
    transport.set_message_handler(Arc::new(move |message| {
        let server = Arc::clone(&handler_server);
        async move { Some(server.handle_message(&message).await) }.boxed()
    }));

    transport.start()?;
    info!(
        pid = std::process::id(),
        tools = registry.len(),
        "Server connected and ready"
    );

    tokio::select! {
        _ = transport.wait() => {}
        _ = tokio::signal::ctrl_c() => {}
    }

    info!("Graceful shutdown initiated");
    transport.stop();
    module_manager.shutdown();
    connection_manager.shutdown().await;

    Ok(())
}

fn validate_environment() {
    let environment = std::env::var("ENV").unwrap_or_else(|_| "production".to_string());
    info!(environment = %environment, "Environment validation completed");
}
