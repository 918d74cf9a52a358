use azure_item_gateway::config::AppConfig;
use azure_item_gateway::infrastructure::{database, identity, storage};
use azure_item_gateway::services::item_service::ItemService;
use azure_item_gateway::{AppState, create_app};
use clap::Parser;
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind the HTTP server to
    #[arg(long, default_value = "0.0.0.0")]
    host: std::net::IpAddr,

    /// Port for the HTTP server
    #[arg(short, long, default_value_t = 8000)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "azure_item_gateway=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting Azure Item Gateway...");

    let config = AppConfig::from_env()?;
    info!(
        "⚙️  Config: Max Upload={}MB, Default Partition Key='{}', Skip Provisioning={}",
        config.max_upload_size / 1024 / 1024,
        config.default_partition_key,
        config.skip_provisioning
    );

    let http = reqwest::Client::builder()
        .user_agent(concat!("azure-item-gateway/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let credential = identity::setup_credential(http.clone());

    let item_store = database::setup_item_store(http.clone(), credential.clone(), &config)
        .await
        .inspect_err(|e| error!("❌ {:#}", e))?;
    let blob_store = storage::setup_blob_store(http, credential, &config)
        .await
        .inspect_err(|e| error!("❌ {:#}", e))?;

    let state = AppState {
        items: Arc::new(ItemService::new(item_store, &config)),
        blobs: blob_store,
        config: config.clone(),
    };

    let app = create_app(state);
    let addr = SocketAddr::new(args.host, args.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("✅ Server listening on: http://{}", addr);
    info!("📖 Swagger UI documentation: http://{}/swagger-ui", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 Gateway exited cleanly.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, initiating graceful shutdown...");
        },
    }
}
