use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use shared::access::AccessControl;
use shared::config::load_config;

use shell::machine::View;
use shell::storage::{self, expand_tilde};
use shell::{HttpSessionApi, RuntimeOptions, ShellCommand, ShellRuntime};

#[derive(Parser, Debug)]
#[command(author, version, about = "Seat-desk client shell")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// First page to open
    #[arg(default_value = "/")]
    start: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config).context("Failed to load configuration")?;
    let secret = config
        .auth
        .resolved_jwt_secret()
        .context("jwt_secret is not set")?;

    let access = AccessControl::from_config(&config, &secret)
        .context("Failed to build access control")?;
    let state_dir = expand_tilde(&config.shell.state_dir);
    let store = storage::open(
        &state_dir,
        Duration::from_secs(config.auth.token_ttl_secs),
    );
    let api = HttpSessionApi::new(&config.api);

    info!("Session state in {}", state_dir.display());

    let mut runtime = ShellRuntime::new(access, store, api, RuntimeOptions::from_config(&config));
    tokio::spawn(print_views(runtime.subscribe()));

    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(read_commands(tx));

    runtime.start();
    runtime.navigate(cli.start);
    runtime.run(rx).await;

    info!("Shell closed");
    Ok(())
}

/// One command per stdin line until `quit` or EOF.
async fn read_commands(tx: mpsc::Sender<ShellCommand>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("stdin: {}", e);
                break;
            }
        };

        match line.trim() {
            "" => continue,
            "quit" | "exit" => break,
            other => match other.parse::<ShellCommand>() {
                Ok(cmd) => {
                    if tx.send(cmd).await.is_err() {
                        break;
                    }
                }
                Err(e) => eprintln!("{} (try: go <path>, retry, signin <token> [redirect], signout, quit)", e),
            },
        }
    }
}

async fn print_views(mut views: watch::Receiver<View>) {
    while views.changed().await.is_ok() {
        let view = views.borrow_and_update().clone();
        match view {
            View::Loader => println!("[loading]"),
            View::Page { path, chrome: None } => println!("[page] {}", path),
            View::Page {
                path,
                chrome: Some(chrome),
            } => {
                println!("[page] {} | {}", path, chrome.title);
                if let Some(photo) = &chrome.profile_image {
                    println!("  avatar: {}", photo);
                }
                for link in chrome.paths() {
                    println!("  - {}", link);
                }
            }
            View::Unavailable { message } => println!("[unavailable] {} (type `retry`)", message),
            View::Halted { message } => println!("[halted] {}", message),
        }
    }
}
