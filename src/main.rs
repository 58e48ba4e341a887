//! passkey-rp server binary

use anyhow::Context;
use clap::{Parser, Subcommand};
use passkey_rp::database::SqliteCredentialRepository;
use passkey_rp::web::{create_router, AppState};
use passkey_rp::{
    ClientBindingVerifier, MemoryCredentialRepository, MemorySessionStore, RelyingParty, RpConfig,
    SessionStore, VerificationGateway,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relying party server (default)
    Serve {
        /// Port to listen on (overrides the configured port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Keep credentials in memory instead of SQLite
        #[arg(long)]
        in_memory: bool,
    },

    /// Generate an example configuration file
    Init {
        /// Output path for configuration
        #[arg(short, long, default_value = "passkey-rp.toml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "passkey_rp=debug,tower_http=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve {
        port: None,
        in_memory: false,
    }) {
        Commands::Serve { port, in_memory } => serve(port, in_memory).await,
        Commands::Init { output } => generate_config(output).await,
    }
}

async fn serve(port: Option<u16>, in_memory: bool) -> anyhow::Result<()> {
    let mut config = RpConfig::from_env().unwrap_or_else(|e| {
        error!("Failed to load config: {}. Using defaults.", e);
        RpConfig::default()
    });
    if let Some(port) = port {
        config.port = port;
    }

    info!("Configuration loaded for: {}", config.app_name);
    info!("RP id: {}, origin: {}", config.rp_id, config.rp_origin);

    let sessions = Arc::new(MemorySessionStore::new(config.challenge_ttl));

    // Periodic reaper: challenge endpoints are unauthenticated, so consumed
    // and expired session records must not pile up.
    let reaper = sessions.clone();
    let reap_every = config.challenge_ttl;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(reap_every);
        loop {
            interval.tick().await;
            reaper.cleanup_expired().await;
        }
    });
    let gateway = VerificationGateway::new(
        Arc::new(ClientBindingVerifier::new()),
        config.rp_origin.clone(),
        config.rp_id.clone(),
    );

    let rp = if in_memory {
        info!("Using in-memory credential store (volatile)");
        RelyingParty::new(sessions, Arc::new(MemoryCredentialRepository::new()), gateway)
    } else {
        let repository = SqliteCredentialRepository::connect(&config.database_url)
            .await
            .with_context(|| format!("opening database {}", config.database_url))?;
        info!("Database initialized: {}", config.database_url);
        RelyingParty::new(sessions, Arc::new(repository), gateway)
    };

    let state = AppState {
        rp: Arc::new(rp),
        config: Arc::new(config.clone()),
    };
    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    info!("Relying party listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn generate_config(output: PathBuf) -> anyhow::Result<()> {
    if output.exists() {
        error!("Configuration file already exists: {:?}", output);
        anyhow::bail!("file already exists");
    }

    let example = r#"app_name = "passkey-rp"
host = "127.0.0.1"
port = 3001
database_url = "sqlite://passkey-rp.db"
rp_id = "localhost"
rp_name = "Passkey RP"
rp_origin = "http://localhost:3001"

[challenge_ttl]
secs = 60
nanos = 0
"#;

    tokio::fs::write(&output, example).await?;
    info!("Generated configuration file: {:?}", output);
    info!("Edit it, then run: passkey-rp serve");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_without_a_port_flag_keeps_the_configured_port() {
        let cli = Cli::try_parse_from(["passkey-rp", "serve"]).unwrap();
        match cli.command {
            Some(Commands::Serve { port, .. }) => assert_eq!(port, None),
            _ => panic!("expected serve command"),
        }
    }

    #[test]
    fn serve_port_flag_overrides() {
        let cli = Cli::try_parse_from(["passkey-rp", "serve", "--port", "4000"]).unwrap();
        match cli.command {
            Some(Commands::Serve { port, .. }) => assert_eq!(port, Some(4000)),
            _ => panic!("expected serve command"),
        }
    }
}
