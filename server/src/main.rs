use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use server::state::{ensure_persist_dir, ServerState};

#[derive(Parser, Debug)]
#[command(about = "Arbitrates access to a shared, cache-coherent file tree")]
struct Args {
    /// Directory the server persists files under.
    #[arg(long, default_value = "./server-data")]
    persist_dir: PathBuf,

    /// Address to bind the RPC listener to.
    #[arg(long, default_value = "127.0.0.1:8080")]
    listen: SocketAddr,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    if let Err(e) = ensure_persist_dir(&args.persist_dir) {
        tracing::error!("could not create persist dir {:?}: {}", args.persist_dir, e);
        std::process::exit(1);
    }

    let state = Arc::new(ServerState::new(args.persist_dir.clone()));
    let app = server::build_router(state).layer(TraceLayer::new_for_http());

    tracing::info!("persisting under {:?}, listening on {}", args.persist_dir, args.listen);
    let listener = tokio::net::TcpListener::bind(args.listen).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
