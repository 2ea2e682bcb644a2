use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::controller::LifecycleController;

#[derive(Clone)]
pub struct HttpState {
    controller: Option<LifecycleController>,
}

/// `controller` is `None` when the feature is disabled; commands then get 404.
pub fn router(controller: Option<LifecycleController>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/controller/command", post(command_endpoint))
        .with_state(HttpState { controller })
        .layer(middleware::from_fn(log_http_request))
}

pub async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn command_endpoint(State(state): State<HttpState>, body: Bytes) -> Response {
    let Some(controller) = state.controller else {
        tracing::warn!(
            event = "http.command.disabled",
            "msu controller is disabled, ignoring command"
        );
        return (StatusCode::NOT_FOUND, "msu controller is disabled").into_response();
    };
    match protocol::parse(&body) {
        Ok(command) => {
            tracing::info!(
                event = "http.command",
                command = %command.kind(),
                "command received via http"
            );
            controller.apply(command).await;
            StatusCode::NO_CONTENT.into_response()
        }
        Err(reason) => {
            tracing::error!(
                event = "http.command.rejected",
                error = %reason,
                payload = %String::from_utf8_lossy(&body),
                "rejecting invalid command"
            );
            (StatusCode::UNPROCESSABLE_ENTITY, reason.to_string()).into_response()
        }
    }
}

async fn log_http_request(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let response = next.run(req).await;
    tracing::info!(
        event = "http.request",
        method = %method,
        uri = %uri,
        status = %response.status(),
        "http request"
    );
    response
}
