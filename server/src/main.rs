use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::service::TowerToHyperService;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tower::Layer;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use server::AppState;
use server::handlers::PageService;
use server::tower_middle::EdgeGuardLayer;
use shared::access::{TokenSigner, unix_now};
use shared::config::load_config;
use shared::types::{Claims, Role};

#[derive(Parser, Debug)]
#[command(author, version, about = "Seat-desk edge server")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve pages behind the access gate (default)
    Serve,
    /// Sign a session token with the configured secret, for local testing
    MintToken {
        /// `admin`, `student`, or any other role string
        #[arg(long, default_value = "admin")]
        role: String,
        #[arg(long, default_value = "dev-user")]
        user_id: String,
        /// Lifetime in seconds; negative values mint an already-expired token
        #[arg(long, default_value_t = 3600)]
        ttl: i64,
        #[arg(long)]
        master: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&cli.config).await,
        Command::MintToken {
            role,
            user_id,
            ttl,
            master,
        } => mint_token(&cli.config, role, user_id, ttl, master),
    }
}

fn mint_token(config_path: &str, role: String, user_id: String, ttl: i64, master: bool) -> Result<()> {
    let config = load_config(config_path).context("Failed to load configuration")?;
    let secret = config
        .auth
        .resolved_jwt_secret()
        .context("jwt_secret is not set")?;

    let claims = Claims::new(user_id, Role::from(role), unix_now() + ttl).with_master(master);
    let token = TokenSigner::new(&secret)
        .sign(&claims)
        .context("Failed to sign token")?;

    println!("{}", token);
    Ok(())
}

async fn serve(config_path: &str) -> Result<()> {
    let config = load_config(config_path).context("Failed to load configuration")?;
    let addr = config.server.addr();
    let max_connections = config.server.max_connections;

    let state = AppState::new(config).context("Failed to build access control")?;
    let service = EdgeGuardLayer::new(state.guard.clone()).layer(PageService::new(state.clone()));

    #[cfg(unix)]
    spawn_reload_on_hangup(config_path.to_string(), state.clone())?;

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    let limiter = Arc::new(Semaphore::new(max_connections));

    info!("Listening on http://{}", addr);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    warn!("Accept failed: {}", e);
                    continue;
                }
            },
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
        };

        let permit = match limiter.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!("Connection limit reached, dropping {}", peer);
                continue;
            }
        };

        let io = TokioIo::new(stream);
        let svc = TowerToHyperService::new(service.clone());

        tokio::task::spawn(async move {
            debug!("Connection from {}", peer);
            if let Err(err) = http1::Builder::new()
                .timer(TokioTimer::new())
                .serve_connection(io, svc)
                .await
            {
                error!("Error serving connection from {}: {:?}", peer, err);
            }
            drop(permit);
        });
    }

    info!("Server closed");
    Ok(())
}

/// Re-read `[paths]` on SIGHUP. Route tables and the secret stay as loaded.
#[cfg(unix)]
fn spawn_reload_on_hangup(config_path: String, state: AppState) -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            match load_config(&config_path) {
                Ok(fresh) => {
                    state.reload_paths(fresh).await;
                    info!("Reloaded page settings from {}", config_path);
                }
                Err(e) => error!("Reload failed, keeping current settings: {}", e),
            }
        }
    });
    Ok(())
}
