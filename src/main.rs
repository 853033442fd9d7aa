use clap::{Parser, ValueEnum};
use dotenvy::dotenv;
use secure_upload_backend::config::SecurityConfig;
use secure_upload_backend::services::storage::{LocalStorageService, StorageService};
use secure_upload_backend::services::worker::BackgroundWorker;
use secure_upload_backend::{AppState, create_app};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    Api,
    Sweeper,
    All,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Profile {
    Default,
    Development,
    Production,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Service type to run
    #[arg(short, long, value_enum, default_value_t = Mode::All)]
    mode: Mode,

    /// Configuration preset; environment variables still override it
    #[arg(long, value_enum, default_value_t = Profile::Default)]
    profile: Profile,

    /// Port for the API server
    #[arg(short, long, default_value_t = 3000)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Environment & logging
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "secure_upload_backend=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "🚀 Starting Secure Upload Backend [Mode: {:?}, Profile: {:?}]...",
        args.mode, args.profile
    );

    let security_config = match args.profile {
        Profile::Default => SecurityConfig::from_env(),
        Profile::Development => SecurityConfig::development().with_env_overrides(),
        Profile::Production => SecurityConfig::production().with_env_overrides(),
    };
    info!(
        "🛡️  Security Config: Image Max={}KB, PDF Max={}KB, Signature Prefix={}B, Storage={}",
        security_config.max_image_size / 1024,
        security_config.max_pdf_size / 1024,
        security_config.signature_prefix_len,
        security_config.storage_root.display()
    );

    // 2. Storage area
    let storage: Arc<dyn StorageService> =
        Arc::new(LocalStorageService::init(&security_config.storage_root).await?);

    // 3. Shutdown channel
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let mut handles = Vec::new();

    // 4. Staging sweeper
    if matches!(args.mode, Mode::Sweeper | Mode::All) {
        let worker = BackgroundWorker::new(storage.clone(), &security_config, shutdown_rx.clone());
        // leftovers from a previous run
        match worker.sweep_once().await {
            Ok(0) => {}
            Ok(n) => info!("🧹 Purged {} staged file(s) left from a previous run", n),
            Err(e) => error!("❌ Startup sweep failed: {:?}", e),
        }
        handles.push(tokio::spawn(worker.run()));
        info!("👷 Staging sweeper initialized.");
    }

    // 5. API server
    if matches!(args.mode, Mode::Api | Mode::All) {
        let state = AppState::new(security_config.clone(), storage.clone());

        let trace_layer = TraceLayer::new_for_http()
            .make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            })
            .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
                info!("📥 {} {}", request.method(), request.uri());
            })
            .on_response(
                |response: &axum::http::Response<_>,
                 latency: std::time::Duration,
                 _span: &tracing::Span| {
                    info!(
                        "📤 Finished in {:?} with status {}",
                        latency,
                        response.status()
                    );
                },
            );

        let app = create_app(state).layer(trace_layer);
        let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
        let listener = tokio::net::TcpListener::bind(addr).await?;

        info!("✅ API Server listening on: http://0.0.0.0:{}", args.port);
        info!("📖 Swagger UI documentation: http://localhost:{}/swagger-ui", args.port);

        let mut server_shutdown = shutdown_rx.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = server_shutdown.changed().await;
                })
                .await
            {
                error!("❌ Server runtime error: {}", e);
            }
        }));
    }

    // 6. Wait for the signal, then stop everything
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);

    info!("🛑 Shutting down backend services...");
    for handle in handles {
        if let Err(e) = handle.await {
            error!("❌ Service task failed: {}", e);
        }
    }

    info!("👋 Backend exited cleanly.");
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
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
