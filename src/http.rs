//! HTTP surface of the ingress.
//!
//! | Route | Answer |
//! | ----- | ------ |
//! | `GET /` | `Hi` |
//! | `POST /values` `{"index": 5}` | `{"working": true}`, or 422 `Index too high` |
//! | `GET /values/all` | `[{"number": 5}, ...]` from the durable log |
//! | `GET /values/current` | `{"5": "8", "6": "Nothing yet!"}` from the fast cache |
use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::Deserialize;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;
use tracing::info;

use crate::error::Error;
use crate::error::Result;
use crate::ingress::Ingress;
use crate::ingress::Submission;
use crate::types::DurableRecord;
use crate::types::MAX_INDEX;

/// Body of `POST /values`. The index may come as a JSON number or as a numeric string, the way HTML forms send it.
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    #[serde(default)]
    pub index: Value,
}

impl SubmitRequest {
    pub fn index(&self) -> Result<i64> {
        match &self.index {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_u64().map(|_| i64::MAX))
                .ok_or_else(|| Error::NotAnIndex(n.to_string())),
            Value::String(s) => s.trim().parse::<i64>().map_err(|_| Error::NotAnIndex(s.clone())),
            other => Err(Error::NotAnIndex(other.to_string())),
        }
    }
}

/// Maps crate errors onto responses. Only rejected submissions are reported in detail.
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0 {
            Error::OutOfRange(index) if index > MAX_INDEX => {
                (StatusCode::UNPROCESSABLE_ENTITY, "Index too high").into_response()
            }
            Error::OutOfRange(_) => (StatusCode::UNPROCESSABLE_ENTITY, "Index too low").into_response(),
            Error::NotAnIndex(_) => (StatusCode::UNPROCESSABLE_ENTITY, "Index must be an integer").into_response(),
            err => {
                error!("Request failed: {err}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
        }
    }
}

pub fn router(ingress: Arc<Ingress>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/values", post(submit))
        .route("/values/all", get(all))
        .route("/values/current", get(current))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(ingress)
}

/// Serve until `shutdown` is cancelled.
pub async fn serve(listener: TcpListener, ingress: Arc<Ingress>, shutdown: CancellationToken) -> Result<()> {
    info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, router(ingress))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}

async fn root() -> &'static str {
    "Hi"
}

async fn submit(
    State(ingress): State<Arc<Ingress>>,
    body: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<Json<Submission>, ApiError> {
    let Json(request) = body.map_err(|rejection| Error::NotAnIndex(rejection.body_text()))?;
    Ok(Json(ingress.submit(request.index()?).await?))
}

async fn all(State(ingress): State<Arc<Ingress>>) -> Result<Json<Vec<DurableRecord>>, ApiError> {
    Ok(Json(ingress.list_all().await?))
}

async fn current(State(ingress): State<Arc<Ingress>>) -> Result<Json<BTreeMap<String, String>>, ApiError> {
    Ok(Json(
        ingress
            .list_current()
            .await?
            .into_iter()
            .map(|(index, value)| (index.to_string(), value.to_string()))
            .collect(),
    ))
}
