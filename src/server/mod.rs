//! HTTP service: axum router over a shared [`Converter`].
//!
//! | Route                     | Handler                      |
//! |---------------------------|------------------------------|
//! | `POST /upload`            | [`handlers::upload`]         |
//! | `POST /convert-text`      | [`handlers::convert_text`]   |
//! | `POST /cancel`            | [`handlers::cancel`]         |
//! | `GET /download/{filename}`| [`handlers::download`]       |
//! | `GET /api/config-presets` | [`handlers::config_presets`] |
//! | `GET /health`             | [`handlers::health`]         |

pub mod error;
pub mod files;
pub mod handlers;

use std::future::Future;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::convert::Converter;
use crate::error::Md2PdfError;
use crate::settings::ServiceSettings;

pub use error::ApiError;

/// State shared by every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub converter: Converter,
    pub settings: Arc<ServiceSettings>,
}

impl AppState {
    pub fn new(settings: ServiceSettings) -> Self {
        let converter = Converter::new(settings.converter.clone());
        Self {
            converter,
            settings: Arc::new(settings),
        }
    }

    /// Use a pre-built converter (shared registry, progress hooks).
    pub fn with_converter(settings: ServiceSettings, converter: Converter) -> Self {
        Self {
            converter,
            settings: Arc::new(settings),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.settings.max_body_bytes;
    Router::new()
        .route("/upload", post(handlers::upload))
        .route("/convert-text", post(handlers::convert_text))
        .route("/cancel", post(handlers::cancel))
        .route("/download/{filename}", get(handlers::download))
        .route("/api/config-presets", get(handlers::config_presets))
        .route("/health", get(handlers::health))
        .fallback(handlers::not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind, serve until `shutdown` resolves, then cancel whatever is still
/// converting.
pub async fn serve<F>(state: AppState, shutdown: F) -> Result<(), Md2PdfError>
where
    F: Future<Output = ()> + Send + 'static,
{
    state.settings.ensure_directories().await?;
    let addr = state.settings.bind;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Md2PdfError::InvalidConfig(format!("cannot bind {addr}: {e}")))?;
    info!("md2pdf listening on {}", addr);
    info!("Uploads: {}", state.settings.upload_dir.display());
    info!("Outputs: {}", state.settings.output_dir.display());

    let registry = Arc::clone(state.converter.registry());
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Md2PdfError::Internal(format!("server error: {e}")))?;

    let cancelled = registry.cancel_all().await;
    if cancelled > 0 {
        info!("Cancelled {} conversion(s) at shutdown", cancelled);
    }
    info!("Server shutdown complete");
    Ok(())
}
