//! autoplan API server - plan, execute and inspect runs over HTTP.

mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::Router;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use autoplan::io::config::load_settings;

use crate::state::AppState;

#[derive(Parser)]
#[command(name = "autoplan-api")]
#[command(about = "HTTP interface to the autoplan engine")]
struct Args {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Port to listen on
    #[arg(long, default_value = "8000")]
    port: u16,

    /// Settings file (defaults apply when missing)
    #[arg(long, default_value = "autoplan.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("autoplan_api=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let settings = load_settings(&args.config)?;
    info!(
        state_dir = %settings.state_dir.display(),
        output_dir = %settings.output_dir.display(),
        "starting autoplan-api"
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .nest("/api", routes::api_router())
        .layer(cors)
        .with_state(AppState::new(settings));

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
