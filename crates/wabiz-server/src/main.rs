use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Context, Result, eyre};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;
use wabiz_db::{FieldCipher, WabizDb};
use wabiz_graph::{GraphClient, HttpAutoReply};
use wabiz_worker::WabizWorker;

mod auth;
mod config;
mod error;
mod extract;
mod routes;
mod state;

use config::{Config, LoggingConfig};
use state::{AppState, WebhookSecrets};

const LOG_TARGETS: [&str; 4] = ["wabiz_server", "wabiz_worker", "wabiz_graph", "wabiz_db"];

/// Multi-tenant WhatsApp Business messaging backend.
#[derive(Debug, Parser)]
#[command(name = "wabiz-server", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file (defaults to ./wabiz.toml when present)
    #[arg(short, long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,

    /// Issue an API token and print it once
    CreateToken {
        /// Owner of the token
        #[arg(value_name = "USER_ID")]
        user_id: String,

        /// Label shown when listing tokens
        #[arg(value_name = "NAME")]
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).wrap_err("Failed to load configuration")?;
    init_tracing(&config.logging)?;
    config.validate().wrap_err("Invalid configuration")?;

    let worker = build_worker(&config).await.wrap_err("Failed to create worker")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&config, worker).await,
        Command::CreateToken { user_id, name } => {
            let (token, plaintext) = worker
                .create_api_token(&user_id, &name)
                .await
                .wrap_err("Failed to create token")?;
            tracing::info!(user_id = %user_id, token_id = %token.id, "API token issued");
            println!("{plaintext}");
            Ok(())
        }
    }
}

fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = if std::env::var(EnvFilter::DEFAULT_ENV).is_ok() {
        EnvFilter::builder().from_env_lossy()
    } else {
        let level = config.level.as_deref().unwrap_or("info");
        let mut filter = EnvFilter::new("warn");
        for target in LOG_TARGETS {
            let directive = format!("{target}={level}")
                .parse::<Directive>()
                .wrap_err_with(|| format!("Invalid logging.level: {level}"))?;
            filter = filter.add_directive(directive);
        }
        filter
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.json {
        builder.json().init();
    } else {
        builder.pretty().init();
    }
    Ok(())
}

async fn build_worker(config: &Config) -> Result<WabizWorker> {
    let db = match &config.database.path {
        Some(path) => WabizDb::new_with_path(path).await?,
        None => WabizDb::new().await?,
    };

    let master_key = config
        .security
        .master_key
        .as_deref()
        .ok_or_else(|| eyre!("security.master_key is not set"))?;
    let cipher = FieldCipher::from_hex(master_key)?;

    let provider = GraphClient::new(config.graph_config()).wrap_err("Failed to build Graph client")?;
    let auto_reply = HttpAutoReply::new(Duration::from_secs(config.graph.auto_reply_timeout_secs))
        .wrap_err("Failed to build auto-reply client")?;

    Ok(WabizWorker::new(
        db,
        Arc::new(provider),
        Arc::new(auto_reply),
        cipher,
        config.worker_settings(),
    ))
}

async fn serve(config: &Config, worker: WabizWorker) -> Result<()> {
    let addr = config.bind_addr()?;
    let db = worker.db().clone();
    let state = AppState::new(
        worker,
        WebhookSecrets {
            verify_token: config.graph.verify_token.clone(),
            app_secret: config.graph.app_secret.clone(),
        },
    );
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("Failed to bind {addr}"))?;
    tracing::info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .wrap_err("Server error")?;

    db.close().await;
    tracing::info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down...");
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("wabiz-server").chain(args.iter().copied()))
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_to_serve() {
        let cli = parse(&[]).unwrap();
        assert!(cli.config.is_none());
        assert!(matches!(cli.command.unwrap_or(Command::Serve), Command::Serve));
    }

    #[test]
    fn reads_config_and_token_command() {
        let cli = parse(&["--config", "/etc/wabiz.toml", "create-token", "u1", "ci"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/wabiz.toml")));
        assert!(matches!(
            cli.command,
            Some(Command::CreateToken { ref user_id, ref name }) if user_id == "u1" && name == "ci"
        ));

        let cli = parse(&["serve", "-c", "local.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("local.toml")));
    }

    #[test]
    fn rejects_unknown_commands() {
        assert!(parse(&["frobnicate"]).is_err());
        assert!(parse(&["--config"]).is_err());
        assert!(parse(&["create-token", "u1"]).is_err());
    }
}
