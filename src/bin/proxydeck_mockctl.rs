//! Command-line driver for the ProxyDeck interception core.
//!
//! Boots a console runtime against the SQLite preference file, applies the
//! stored preference, runs one command and prints the resulting status as
//! JSON on stdout.
//!
//! Usage:
//! ```text
//! cargo run --bin proxydeck_mockctl -- --storage-path ./proxydeck_data start
//! cargo run --bin proxydeck_mockctl -- set-backend api.example.com 443
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context};
use proxydeck_core::api::ConsoleRuntime;
use proxydeck_core::config::ConsoleConfig;
use proxydeck_core::models::BackendEndpoint;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::FmtSubscriber;

#[derive(Debug)]
enum Command {
    Status,
    Start,
    Stop,
    Reset,
    SetBackend(Option<BackendEndpoint>),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let (storage_path, command) = parse_args()?;

    let mut config = ConsoleConfig::from_env().context("reading PROXYDECK_* environment")?;
    if let Some(path) = storage_path {
        config.storage_path = path;
    }
    tracing::info!(
        "Starting proxydeck_mockctl (storage={})",
        config.storage_path.display()
    );

    let runtime = ConsoleRuntime::open(config)?;
    runtime.bootstrap().await;

    let controller = runtime.controller();
    let outcome = match &command {
        Command::Status => Ok(controller.state()),
        Command::Start => controller.request_start().await,
        Command::Stop => controller.request_stop().await,
        Command::Reset => controller.request_force_reset().await,
        Command::SetBackend(endpoint) => runtime
            .set_backend(endpoint.clone())
            .map(|url| {
                tracing::info!("Backend now {}", url);
                controller.state()
            }),
    };
    if let Err(err) = &outcome {
        tracing::error!("{:?} failed: {}", command, err);
    }

    let status = runtime.status().await;
    println!("{}", serde_json::to_string_pretty(&status)?);

    outcome?;
    Ok(())
}

fn init_tracing() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(LevelFilter::INFO)
        .with_writer(std::io::stderr) // stdout carries the status JSON
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn parse_args() -> anyhow::Result<(Option<PathBuf>, Command)> {
    let mut args = std::env::args().skip(1);
    let mut storage_path = None;
    let mut command = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--storage-path" => match args.next() {
                Some(path) => storage_path = Some(PathBuf::from(path)),
                None => bail!("--storage-path needs a value"),
            },
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "status" => command = Some(Command::Status),
            "start" => command = Some(Command::Start),
            "stop" => command = Some(Command::Stop),
            "reset" => command = Some(Command::Reset),
            "set-backend" => {
                let endpoint = match args.next() {
                    Some(host) if host == "--clear" => None,
                    Some(host) => Some(BackendEndpoint::new(host, args.next().unwrap_or_default())),
                    None => bail!("set-backend needs <HOST> [PORT] or --clear"),
                };
                command = Some(Command::SetBackend(endpoint));
            }
            _ => {
                eprintln!("Unknown argument: {arg}");
            }
        }
    }

    Ok((storage_path, command.unwrap_or(Command::Status)))
}

fn print_help() {
    eprintln!("ProxyDeck interception control");
    eprintln!();
    eprintln!("Usage: proxydeck_mockctl [OPTIONS] [COMMAND]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  status                     Print interception status (default)");
    eprintln!("  start                      Start the interception worker");
    eprintln!("  stop                       Stop the interception worker");
    eprintln!("  reset                      Clear every worker registration and start fresh");
    eprintln!("  set-backend <HOST> [PORT]  Save a backend override");
    eprintln!("  set-backend --clear        Remove the backend override");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --storage-path <PATH>      Preference directory (default: PROXYDECK_STORAGE_PATH or the user data dir)");
    eprintln!("  --help, -h                 Show this help");
}
