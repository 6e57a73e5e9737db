use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use nupi_adapter_agent::{IntentService, Status};
use nupi_adapter_core::protocol::{EmbeddingRequest, EmbeddingResponse, ResolveIntentRequest};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    tasks: Vec<String>,
    version: &'static str,
}

/// HTTP mapping of an intent [`Status`].
struct ApiError(Status);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = match self.0 {
            Status::FailedPrecondition(_) => StatusCode::PRECONDITION_FAILED,
            Status::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            code: self.0.code(),
            message: self.0.message().to_string(),
        };
        (code, Json(body)).into_response()
    }
}

async fn handle_resolve_intent(
    State(service): State<IntentService>,
    Json(request): Json<ResolveIntentRequest>,
) -> Result<Response, ApiError> {
    let response = service.resolve_intent(request).await.map_err(ApiError)?;
    Ok(Json(response).into_response())
}

async fn handle_embeddings(
    State(service): State<IntentService>,
    Json(request): Json<EmbeddingRequest>,
) -> Json<EmbeddingResponse> {
    Json(service.embed(request).await)
}

async fn handle_health(State(service): State<IntentService>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        tasks: service.router().config().task_keys(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn app(service: IntentService) -> Router {
    Router::new()
        .route("/v1/intent/resolve", post(handle_resolve_intent))
        .route("/v1/embeddings", post(handle_embeddings))
        .route("/v1/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

pub async fn serve(listener: tokio::net::TcpListener, service: IntentService) -> anyhow::Result<()> {
    axum::serve(listener, app(service))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
