//! HTTP boundary for the playpen sandbox service.
//!
//! This crate exposes the execution pipeline over a small JSON API plus an
//! embedded browser page. The design keeps the boundary deliberately thin:
//! handlers translate pipeline outcomes into status codes and bodies, and
//! everything that decides what actually happens to a submission lives in
//! `playpen-core`. That split keeps the HTTP layer testable with a stub
//! executor and leaves the core reusable behind other transports.

pub mod error;
pub mod page;

pub use error::{Result, ServerError};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, Json};
use axum::routing::{get, options, post};
use axum::{middleware, Router};
use serde::Serialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use playpen_core::executors::EXECUTION_FAILED_MESSAGE;
use playpen_core::{ExecutionOutcome, ExecutionPipeline};

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
}

/// Configuration for the playpen server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Enable CORS
    pub enable_cors: bool,
    /// Enable request logging
    pub enable_logging: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5000".parse().unwrap(),
            enable_cors: true,
            enable_logging: true,
        }
    }
}

impl ServerConfig {
    /// Create a new server configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bind address.
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Parse and set the bind address from a string.
    pub fn with_bind_addr_str(mut self, addr: &str) -> Result<Self> {
        self.bind_addr = addr
            .parse()
            .map_err(|e| ServerError::config_error(format!("Invalid bind address: {}", e)))?;
        Ok(self)
    }

    /// Enable or disable CORS.
    pub fn with_cors(mut self, enable: bool) -> Self {
        self.enable_cors = enable;
        self
    }

    /// Enable or disable request logging.
    pub fn with_logging(mut self, enable: bool) -> Self {
        self.enable_logging = enable;
        self
    }
}

/// Shared application state containing the pipeline and configuration.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ExecutionPipeline>,
    pub config: ServerConfig,
}

/// Handler for the / GET endpoint.
async fn index_handler(State(app_state): State<AppState>) -> Html<String> {
    Html(page::render_index(&app_state.pipeline.registry().supported()))
}

/// Handler for the /run POST endpoint.
///
/// The body is taken raw so the pipeline owns all payload validation,
/// malformed JSON included.
async fn run_handler(
    State(app_state): State<AppState>,
    body: Bytes,
) -> std::result::Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let result = match app_state.pipeline.submit(&body).await {
        Ok(result) => result,
        Err(rejection) => {
            log::warn!("Rejected submission: {}", rejection);
            return Err((
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": rejection.to_string() })),
            ));
        }
    };

    match result.outcome {
        ExecutionOutcome::Success => Ok(Json(json!({ "output": result.stdout }))),
        ExecutionOutcome::NonZeroExit => Err((
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": EXECUTION_FAILED_MESSAGE,
                "details": result.stderr,
            })),
        )),
        ExecutionOutcome::Timeout => Err((
            StatusCode::REQUEST_TIMEOUT,
            Json(json!({ "error": result.error })),
        )),
        ExecutionOutcome::InfrastructureFailure => {
            let mut payload = json!({ "error": result.error });
            if !result.stderr.is_empty() {
                payload["details"] = json!(result.stderr);
            }
            Err((StatusCode::INTERNAL_SERVER_ERROR, Json(payload)))
        }
    }
}

/// Handler for the /history GET endpoint.
async fn history_handler(State(app_state): State<AppState>) -> Json<serde_json::Value> {
    let entries = app_state.pipeline.journal().list_newest_first().await;
    Json(json!({ "history": entries }))
}

/// Handler for the /history/clear POST endpoint.
async fn history_clear_handler(State(app_state): State<AppState>) -> Json<serde_json::Value> {
    app_state.pipeline.journal().clear().await;
    log::info!("Execution history cleared");
    Json(json!({ "status": "ok" }))
}

/// The playpen HTTP server.
pub struct PlaypenServer {
    pipeline: Arc<ExecutionPipeline>,
    config: ServerConfig,
}

impl PlaypenServer {
    /// Create a new server with the given pipeline and default configuration.
    pub fn new(pipeline: Arc<ExecutionPipeline>) -> Self {
        Self {
            pipeline,
            config: ServerConfig::default(),
        }
    }

    /// Create a new server with custom configuration.
    pub fn with_config(pipeline: Arc<ExecutionPipeline>, config: ServerConfig) -> Self {
        Self { pipeline, config }
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the Axum router with all routes and middleware.
    pub fn build_router(&self) -> Router {
        let state = AppState {
            pipeline: Arc::clone(&self.pipeline),
            config: self.config.clone(),
        };

        let mut router = Router::new()
            .route("/", get(index_handler))
            .route("/health", get(|| async {
                Json(HealthResponse {
                    status: "healthy".to_string(),
                    timestamp: chrono::Utc::now(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                })
            }))
            .route("/run", post(run_handler))
            .route("/history", get(history_handler))
            .route("/history/clear", post(history_clear_handler))
            // CORS preflight
            .route("/run", options(|| async { StatusCode::OK }))
            .route("/history/clear", options(|| async { StatusCode::OK }))
            .with_state(state);

        if self.config.enable_logging {
            router = router.layer(middleware::from_fn(
                |request: axum::http::Request<axum::body::Body>,
                 next: axum::middleware::Next| async {
                    let request_id = uuid::Uuid::new_v4().to_string();
                    let method = request.method().clone();
                    let uri = request.uri().clone();

                    // Health checks poll; keep them out of the info log.
                    if uri.path() == "/health" {
                        log::debug!("Request {} {} {}", request_id, method, uri);
                    } else {
                        log::info!("Request {} {} {}", request_id, method, uri);
                    }

                    let start = std::time::Instant::now();
                    let response = next.run(request).await;
                    let duration = start.elapsed();

                    if uri.path() == "/health" {
                        log::debug!("Response {} completed in {:?}", request_id, duration);
                    } else {
                        log::info!("Response {} completed in {:?}", request_id, duration);
                    }

                    response
                },
            ));
        }

        router = router.layer(TraceLayer::new_for_http());

        if self.config.enable_cors {
            router = router.layer(CorsLayer::permissive());
        }

        router
    }

    /// Start the server and listen for connections.
    ///
    /// This method will block until the server is shut down.
    pub async fn serve(self) -> Result<()> {
        let router = self.build_router();
        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|e| {
                ServerError::config_error(format!(
                    "Failed to bind to {}: {}",
                    self.config.bind_addr, e
                ))
            })?;

        log::info!("playpen server starting on {}", self.config.bind_addr);
        log::info!("Run endpoint: http://{}/run", self.config.bind_addr);
        log::info!("History endpoint: http://{}/history", self.config.bind_addr);
        log::info!("Health check: http://{}/health", self.config.bind_addr);

        axum::serve(listener, router)
            .await
            .map_err(|e| ServerError::internal(format!("Server error: {}", e)))?;

        Ok(())
    }

    /// Start the server with graceful shutdown support.
    ///
    /// The server will shut down when the provided shutdown signal is received.
    pub async fn serve_with_shutdown<F>(self, shutdown_signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let router = self.build_router();
        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|e| {
                ServerError::config_error(format!(
                    "Failed to bind to {}: {}",
                    self.config.bind_addr, e
                ))
            })?;

        log::info!(
            "playpen server starting on {} with graceful shutdown",
            self.config.bind_addr
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ServerError::internal(format!("Server error: {}", e)))?;

        log::info!("playpen server shut down gracefully");
        Ok(())
    }
}

/// Utility function to create a shutdown signal from Ctrl+C.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            log::info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            log::info!("Received SIGTERM, shutting down...");
        },
    }
}
