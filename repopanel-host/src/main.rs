use std::path::PathBuf;

use clap::Parser;
use repopanel_host::{HostFixture, HostState, serve};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "repopanel-host")]
struct HostArgs {
    #[arg(long, default_value = "127.0.0.1:8787")]
    bind_address: String,
    /// JSON fixture with bundles, runs, secrets and indexes.
    #[arg(long)]
    fixture: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = HostArgs::parse();
    let fixture = match &args.fixture {
        Some(path) => match HostFixture::load(path) {
            Ok(fixture) => fixture,
            Err(err) => {
                error!("{err}");
                std::process::exit(1);
            }
        },
        None => HostFixture::default(),
    };
    info!(
        bundles = fixture.bundles.len(),
        debug_runs = fixture.debug_runs.len(),
        indexes = fixture.pinecone_indexes.len(),
        "fixture loaded"
    );

    let listener = match tokio::net::TcpListener::bind(&args.bind_address).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("failed to bind {}: {}", args.bind_address, err);
            std::process::exit(1);
        }
    };

    info!("host starting on {}", args.bind_address);
    if let Err(err) = serve(listener, HostState::new(fixture)).await {
        warn!("host server exited: {}", err);
    }
}
