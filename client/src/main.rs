use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use fuser::MountOption;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use client::cache::CacheManager;
use client::config::Config;
use client::fs::RemoteFs;

#[derive(Parser, Debug)]
#[command(about = "Mounts a cache-coherent view of a remote file tree")]
struct Args {
    /// Local directory to mount the filesystem at.
    mountpoint: PathBuf,

    /// Path to the client's TOML configuration file.
    #[arg(long, default_value = "./client.toml")]
    config: PathBuf,

    /// Detach from the controlling terminal and run in the background.
    #[arg(long)]
    daemon: bool,
}

fn main() {
    let args = Args::parse();

    let config = match Config::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("could not load config {:?}: {e}", args.config);
            std::process::exit(1);
        }
    };

    if args.daemon {
        if let Err(e) = daemonize::Daemonize::new().start() {
            eprintln!("failed to daemonize: {e}");
            std::process::exit(1);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "client=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = std::fs::create_dir_all(&config.path_to_cache) {
        tracing::error!("could not create cache dir {:?}: {}", config.path_to_cache, e);
        std::process::exit(1);
    }

    let runtime = Arc::new(
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .expect("failed to start client runtime"),
    );

    let manager = Arc::new(CacheManager::new(
        config.path_to_cache.clone(),
        Duration::from_secs(config.cache_interval),
        config.server_url.clone(),
    ));

    let fs = RemoteFs::new(
        manager,
        runtime,
        Duration::from_secs(config.kernel_attr_timeout_seconds),
        Duration::from_secs(config.kernel_entry_timeout_seconds),
    );

    let options = vec![MountOption::AutoUnmount, MountOption::FSName("remotefs".to_string())];
    tracing::info!("mounting {:?} against {}", args.mountpoint, config.server_url);
    if let Err(e) = fuser::mount2(fs, &args.mountpoint, &options) {
        tracing::error!("mount failed: {e}");
        std::process::exit(1);
    }
}
