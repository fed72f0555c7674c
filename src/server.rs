//! HTTP adapter
//!
//! Routes map one-to-one onto [`SigningGateway`] calls. The body reaches the
//! gateway as raw bytes so the authentication hash covers exactly what was
//! sent.

use crate::auth::{AuthHeaders, SignedRequest, HEADER_NONCE, HEADER_SIGNATURE, HEADER_TIMESTAMP};
use crate::gateway::{GatewayResponse, SigningGateway};
use crate::Result;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, OriginalUri, Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

pub fn router(gateway: Arc<SigningGateway>) -> Router {
    Router::new()
        .route("/sign", post(sign))
        .route("/status", get(status))
        .route("/status/full-address", get(full_address))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(middleware::from_fn(request_id))
        .with_state(gateway)
}

/// Bind and serve until the process is interrupted.
pub async fn serve(gateway: Arc<SigningGateway>, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "remote signer listening");
    axum::serve(listener, router(gateway))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("remote signer stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}

async fn request_id(request: Request, next: Next) -> Response {
    let id = Uuid::new_v4().to_string();
    let span = tracing::info_span!(
        "request",
        request_id = %id,
        method = %request.method(),
        path = %request.uri().path(),
    );
    let mut response = next.run(request).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

async fn sign(
    State(gateway): State<Arc<SigningGateway>>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path_and_query = path_and_query(&uri);
    let request = SignedRequest {
        method: method.as_str(),
        path_and_query: &path_and_query,
        body: &body,
    };
    into_json(gateway.sign(request, &auth_headers(&headers)).await)
}

async fn status(State(gateway): State<Arc<SigningGateway>>) -> Response {
    into_pretty_json(gateway.status().await)
}

async fn full_address(
    State(gateway): State<Arc<SigningGateway>>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path_and_query = path_and_query(&uri);
    let request = SignedRequest {
        method: method.as_str(),
        path_and_query: &path_and_query,
        body: &body,
    };
    let response = gateway.full_address(request, &auth_headers(&headers)).await;
    if response.status == 200 {
        into_pretty_json(response)
    } else {
        into_json(response)
    }
}

fn path_and_query(uri: &axum::http::Uri) -> String {
    uri.path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string())
}

fn auth_headers(headers: &HeaderMap) -> AuthHeaders {
    let read = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    AuthHeaders {
        timestamp: read(HEADER_TIMESTAMP),
        nonce: read(HEADER_NONCE),
        signature: read(HEADER_SIGNATURE),
    }
}

fn status_code(response: &GatewayResponse) -> StatusCode {
    StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn into_json(response: GatewayResponse) -> Response {
    (status_code(&response), Json(response.body)).into_response()
}

fn into_pretty_json(response: GatewayResponse) -> Response {
    let status = status_code(&response);
    match serde_json::to_string_pretty(&response.body) {
        Ok(text) => (
            status,
            [(header::CONTENT_TYPE, "application/json; charset=utf-8")],
            text,
        )
            .into_response(),
        Err(_) => (status, Json(response.body)).into_response(),
    }
}
