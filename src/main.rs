mod channels;
mod config;
mod core;
mod daemon;
mod engine;
mod errors;
mod escalation;
mod history;
mod knowledge;
mod matching;
mod purge;
mod router;
mod session;
mod traits;
mod types;
pub mod utils;

#[cfg(test)]
mod testing;

use std::path::PathBuf;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config_path = PathBuf::from("config.toml");
    let mut install = false;

    // Handle CLI arguments
    let args: Vec<String> = std::env::args().collect();
    let mut rest = args.iter().skip(1);
    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("faqdaemon {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "--config" | "-c" => match rest.next() {
                Some(path) => config_path = PathBuf::from(path),
                None => anyhow::bail!("--config needs a path"),
            },
            "install-service" => install = true,
            other => {
                eprintln!("Unknown argument: '{}'\n", other);
                print_help();
                std::process::exit(2);
            }
        }
    }

    if install {
        return daemon::install_service(&config_path);
    }

    let config = config::AppConfig::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    // Run async
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(crate::core::run(config))
}

fn print_help() {
    println!("faqdaemon {}", env!("CARGO_PKG_VERSION"));
    println!("{}\n", env!("CARGO_PKG_DESCRIPTION"));
    println!("Usage: faqdaemon [OPTIONS] [COMMAND]\n");
    println!("Commands:");
    println!("  install-service       Install as a system service (launchd/systemd) using --config");
    println!("\nOptions:");
    println!("  -c, --config <PATH>  Config file (default: config.toml)");
    println!("  -h, --help           Print help");
    println!("  -V, --version        Print version");
}
