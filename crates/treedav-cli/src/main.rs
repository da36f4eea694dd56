#![forbid(unsafe_code)]

mod config;

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
#[cfg(feature = "tokio-console")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use treedav_core::{FsResource, MemoryResource};
use treedav_webdav::{MountTable, ServerConfig, WebDavServer};

use crate::config::{Config, MountSpec, merge_mounts, parse_fs_mount, parse_memory_mount};

/// Port used when neither the flags nor the config file name one.
const DEFAULT_PORT: u16 = 8080;

/// Prefix of the fallback mount when nothing is configured.
const DEFAULT_PREFIX: &str = "webdav";

#[derive(Parser)]
#[command(name = "treedav")]
#[command(author, version, about = "Serve directories and scratch trees over WebDAV")]
struct Cli {
    /// Configuration file (defaults to the platform config dir)
    #[arg(long, env = "TREEDAV_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long)]
    bind: Option<IpAddr>,

    /// Port to listen on (0 picks a free port)
    #[arg(short, long)]
    port: Option<u16>,

    /// Serve a host directory, as PREFIX=DIR (repeatable)
    #[arg(long = "fs", value_name = "PREFIX=DIR", value_parser = parse_fs_mount)]
    fs_mounts: Vec<MountSpec>,

    /// Serve an empty in-memory tree under PREFIX (repeatable)
    #[arg(long = "memory", value_name = "PREFIX", value_parser = parse_memory_mount)]
    memory_mounts: Vec<MountSpec>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load(cli.config.as_deref())?;

    let mut from_flags = cli.fs_mounts;
    from_flags.extend(cli.memory_mounts);
    let mut specs = merge_mounts(config.mount_specs()?, from_flags);
    if specs.is_empty() {
        let cwd = std::env::current_dir().context("Failed to determine current directory")?;
        tracing::info!(root = %cwd.display(), "no mounts configured, serving current directory");
        specs.push(MountSpec::Filesystem {
            prefix: DEFAULT_PREFIX.to_string(),
            root: cwd,
        });
    }
    let mounts = build_mounts(&specs)?;

    let server_config = ServerConfig {
        port: cli.port.or(config.server.port).unwrap_or(DEFAULT_PORT),
        bind_address: cli
            .bind
            .or(config.server.bind)
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST)),
    };
    let server = WebDavServer::start(mounts, server_config)
        .await
        .context("Failed to start WebDAV server")?;

    for prefix in server.prefixes() {
        println!("Serving {prefix} at {}", server.mount_url(prefix));
    }
    println!("Press Ctrl+C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    tracing::info!("Shutting down");
    server.stop().await;
    Ok(())
}

/// Register every mount, failing on the first unusable one.
fn build_mounts(specs: &[MountSpec]) -> Result<MountTable> {
    let mut mounts = MountTable::new();
    for spec in specs {
        match spec {
            MountSpec::Filesystem { prefix, root } => {
                if !root.is_dir() {
                    anyhow::bail!(
                        "Root of mount '{prefix}' is not a directory: {}",
                        root.display()
                    );
                }
                mounts
                    .mount(Box::new(FsResource::new_root(prefix.as_str(), root)))
                    .with_context(|| format!("Failed to mount '{prefix}'"))?;
            }
            MountSpec::Memory { prefix } => {
                mounts
                    .mount(Box::new(MemoryResource::new_root(prefix.as_str())))
                    .with_context(|| format!("Failed to mount '{prefix}'"))?;
            }
        }
    }
    Ok(mounts)
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    #[cfg(feature = "tokio-console")]
    {
        use std::net::SocketAddr;
        use tracing_subscriber::Layer;

        let console_port: u16 = std::env::var("TOKIO_CONSOLE_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(6669);
        let console_addr: SocketAddr = ([127, 0, 0, 1], console_port).into();
        let fmt_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

        let console_layer = console_subscriber::ConsoleLayer::builder()
            .server_addr(console_addr)
            .spawn();
        tracing_subscriber::registry()
            .with(console_layer)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_filter(fmt_filter),
            )
            .init();
        tracing::info!("tokio-console enabled, connect with: tokio-console http://{console_addr}");
    }

    #[cfg(not(feature = "tokio-console"))]
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(std::io::stderr)
        .init();
}
