//! `supplyerpd`: the supply ERP policy analytics server.
//!
//! Usage:
//!   supplyerpd serve -c <context-name-or-path> [--listen <addr>]
//!   supplyerpd token -c <context-name-or-path> --sub <id> [--permission P]... [--root]
//!
//! The context name resolves to `/etc/supplyerp/<name>.toml`.
//! If a path with `/` or a `.toml` suffix is given, it's used directly.

mod bootstrap;
mod config;
mod jwt;
mod routes;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use supplyerp_core::{Authenticator, Module};
use tracing::info;

use config::ServerConfig;

const DEFAULT_LISTEN: &str = "0.0.0.0:8080";

/// Supply ERP analytics server.
#[derive(Parser, Debug)]
#[command(name = "supplyerpd", about = "Supply ERP policy analytics server")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server.
    Serve {
        /// Context name or path to config file.
        #[arg(short = 'c', long = "config", required = true)]
        config: String,

        /// Listen address (overrides `[server] listen` and 0.0.0.0:8080).
        #[arg(long = "listen")]
        listen: Option<String>,
    },

    /// Issue a bearer token signed with the configured secret.
    Token {
        #[arg(short = 'c', long = "config", required = true)]
        config: String,

        /// Subject recorded as the audit actor.
        #[arg(long)]
        sub: String,

        /// Granted permission; repeatable. `policy:*` grants everything.
        #[arg(long = "permission")]
        permissions: Vec<String>,

        /// Attach the root role.
        #[arg(long)]
        root: bool,

        /// Lifetime in seconds (defaults to `[jwt] expire_secs`).
        #[arg(long)]
        ttl: Option<u64>,
    },
}

fn load_config(name_or_path: &str) -> anyhow::Result<ServerConfig> {
    let config_path = ServerConfig::resolve_path(name_or_path);
    info!("Loading configuration from {}", config_path.display());
    let server_config = ServerConfig::load(&config_path)?;
    bootstrap::verify_config(&server_config)?;
    Ok(server_config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so `token` output stays pipeable.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    match Cli::parse().command {
        Command::Serve { config, listen } => serve(&config, listen.as_deref()).await,
        Command::Token {
            config,
            sub,
            permissions,
            root,
            ttl,
        } => {
            let server_config = load_config(&config)?;
            let roles = if root {
                vec![bootstrap::ROOT_ROLE_ID.to_string()]
            } else {
                Vec::new()
            };
            let token = jwt::issue_token(
                &server_config.jwt.secret,
                &sub,
                permissions,
                roles,
                ttl.unwrap_or(server_config.jwt.expire_secs),
            )?;
            println!("{}", token);
            Ok(())
        }
    }
}

async fn serve(config: &str, listen: Option<&str>) -> anyhow::Result<()> {
    let server_config = load_config(config)?;
    let listen = server_config.listen_addr(listen, DEFAULT_LISTEN);

    // Initialize storage.
    let data_dir = PathBuf::from(&server_config.storage.data_dir);
    std::fs::create_dir_all(&data_dir)?;

    let core_config = supplyerp_core::ServiceConfig {
        data_dir: Some(data_dir),
        sqlite_path: server_config.storage.sqlite_path.as_ref().map(PathBuf::from),
        listen: listen.clone(),
    };

    let sqlite_path = core_config.resolve_sqlite_path();
    let sql: Arc<dyn supplyerp_sql::SQLStore> = Arc::new(
        supplyerp_sql::SqliteStore::open(&sqlite_path)
            .map_err(|e| anyhow::anyhow!("failed to open SQL store: {}", e))?,
    );
    info!("SQL store opened at {}", sqlite_path.display());

    let authenticator: Arc<dyn Authenticator> =
        Arc::new(jwt::JwtAuthenticator::new(&server_config.jwt.secret));

    let analytics_module = analytics::AnalyticsModule::new(
        Arc::clone(&sql),
        authenticator,
        server_config.analytics.clone(),
    )
    .map_err(|e| anyhow::anyhow!("failed to initialize analytics module: {}", e))?;
    info!("Analytics module initialized");

    let module_routes = vec![(analytics_module.name(), analytics_module.routes())];
    let app = routes::build_router(module_routes);

    // Start server.
    let listener = tokio::net::TcpListener::bind(&core_config.listen).await?;
    info!("supplyerpd listening on {}", core_config.listen);
    axum::serve(listener, app).await?;

    Ok(())
}
