use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use lloggs::LoggingArgs;
use tracing::info;

use iconvault::{Config, FsStore, PassthroughResizer, api};

#[derive(Parser)]
#[command(name = "iconvault")]
#[command(about = "Icon blob store with a derived JSON catalog and thumbnail cache")]
struct Args {
    /// Address to listen on
    #[arg(long, short, default_value = "127.0.0.1:3000")]
    listen: SocketAddr,

    /// Storage directory path
    #[arg(long, short)]
    storage: PathBuf,

    /// Public base URL prepended to catalog entry links; empty for
    /// root-relative links
    #[arg(long, default_value = "")]
    public_base: String,

    /// Catalog title
    #[arg(long, default_value = "Icons")]
    title: String,

    /// Catalog description
    #[arg(long, default_value = "Derived index of the stored icons")]
    description: String,

    #[command(flatten)]
    logging: LoggingArgs,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    let _guard = args.logging.setup(|v| match v {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    })?;

    info!(listen = %args.listen, storage = ?args.storage, "Starting server");

    let store = FsStore::new(&args.storage);
    store.init().await?;

    let config = Config {
        public_base: args.public_base,
        title: args.title,
        description: args.description,
        ..Config::default()
    };

    // No transform engine is bundled; thumbnails pass the source through
    // until a real resizer is wired in here.
    let app = api::router(store, Arc::new(PassthroughResizer), config);

    let listener = tokio::net::TcpListener::bind(&args.listen).await?;
    info!("Listening on {}", args.listen);
    axum::serve(listener, app).await?;

    Ok(())
}
