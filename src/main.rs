use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};
use ytmp3_backend::{
    config::{AppConfig, BackendConfig, ConfigError},
    error::ConversionError,
    http::{AppState, build_cors_layer, build_router},
    job::Converter,
    local::{LocalConverter, YtDlp, validate_cookie_file},
    remote::RemoteConverter,
    store::TempStore,
};

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error("{context}: {source}")]
    Io {
        context: String,
        source: std::io::Error,
    },
}

#[tokio::main]
async fn main() {
    if let Err(error) = dotenvy::dotenv()
        && !error.not_found()
    {
        eprintln!("Could not load .env: {error}");
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "ytmp3_backend=info,tower_http=info".to_string()),
        )
        .init();

    if let Err(error) = run().await {
        eprintln!("Server error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), StartupError> {
    let config = AppConfig::from_env()?;
    let converter = build_converter(&config.backend).await?;
    let cors = build_cors_layer(&config.allowed_origins);
    let app = build_router(AppState::new(converter), cors);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .map_err(|source| StartupError::Io {
            context: format!("could not bind {}", config.bind_addr),
            source,
        })?;

    info!("Backend ready on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .map_err(|source| StartupError::Io {
            context: "HTTP server error".to_string(),
            source,
        })
}

async fn build_converter(backend: &BackendConfig) -> Result<Arc<dyn Converter>, StartupError> {
    match backend {
        BackendConfig::Local(local) => {
            info!("Getting cookies from: {:?}", local.cookies_path);
            validate_cookie_file(&local.cookies_path).await?;

            let store = TempStore::open(&local.temp_dir)
                .await
                .map_err(|source| StartupError::Io {
                    context: format!("could not create temp directory {:?}", local.temp_dir),
                    source,
                })?;
            store.sweep_stale(local.stale_after).await;

            Ok(Arc::new(LocalConverter::new(
                store,
                Arc::new(YtDlp::from_config(local)),
                local.stale_after,
            )))
        }
        BackendConfig::Remote(remote) => {
            if remote.endpoint.starts_with("http://") {
                warn!("RAPIDAPI_ENDPOINT uses plain http: {}", remote.endpoint);
            }
            Ok(Arc::new(RemoteConverter::from_config(remote)?))
        }
    }
}
