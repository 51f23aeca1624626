//! HTTP adapter - REST API を core のサービスに割り当てる
//!
//! | Method | Path                          | 動作                         |
//! |--------|-------------------------------|------------------------------|
//! | GET    | `/`                           | バナー                       |
//! | GET    | `/healthz`                    | キューとストレージの疎通     |
//! | POST   | `/apiv1/separate`             | base64 の mp3 を投入         |
//! | GET    | `/apiv1/queue`                | 待ち行列の先頭を参照         |
//! | GET    | `/apiv1/track/:id/:part`      | 出力パートを取得             |
//! | DELETE | `/apiv1/remove/:id/:part`     | 出力パートを削除             |

use axum::Json;
use axum::Router;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{delete, get, post};
use serde_json::json;

use stemsep_core::app::{Services, SubmitRequest};
use stemsep_core::domain::{RetrievalError, SubmitError};

/// ハンドラから返すエラー。本文は `{"error": "..."}`
#[derive(Debug)]
pub enum ApiError {
    Submit(SubmitError),
    Retrieval(RetrievalError),
    Rejected { status: StatusCode, message: String },
}

impl From<SubmitError> for ApiError {
    fn from(e: SubmitError) -> Self {
        ApiError::Submit(e)
    }
}

impl From<RetrievalError> for ApiError {
    fn from(e: RetrievalError) -> Self {
        ApiError::Retrieval(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Submit(e) => {
                let status = match &e {
                    SubmitError::Validation(_) => StatusCode::BAD_REQUEST,
                    SubmitError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                    SubmitError::DependencyUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                };
                (status, e.to_string())
            }
            ApiError::Retrieval(e) => {
                let status = match &e {
                    RetrievalError::Validation(_) => StatusCode::BAD_REQUEST,
                    RetrievalError::NotFound { .. } => StatusCode::NOT_FOUND,
                    RetrievalError::DependencyUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                };
                (status, e.to_string())
            }
            ApiError::Rejected { status, message } => (status, message),
        };
        if status.is_server_error() {
            tracing::warn!(%status, error = %message, "request failed");
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// base64 は 4/3 倍に膨らむので、その分と JSON の余白を足す
pub fn request_body_limit(max_payload_bytes: usize) -> usize {
    max_payload_bytes / 3 * 4 + 4 + 64 * 1024
}

pub fn router(services: Services) -> Router {
    let body_limit = request_body_limit(services.submission.max_payload_bytes());
    Router::new()
        .route("/", get(index))
        .route("/healthz", get(healthz))
        .route("/apiv1/separate", post(separate))
        .route("/apiv1/queue", get(queue))
        .route("/apiv1/track/:id/:part", get(track))
        .route("/apiv1/remove/:id/:part", delete(remove))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(services)
}

async fn index() -> Html<&'static str> {
    Html("<h1>stemsep</h1><p>POST base64 audio to <code>/apiv1/separate</code>.</p>")
}

async fn healthz(State(services): State<Services>) -> Response {
    match services.retrieval.health().await {
        Ok(()) => Json(json!({ "ok": true })).into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "ok": false, "error": e.to_string() })),
        )
            .into_response(),
    }
}

async fn separate(
    State(services): State<Services>,
    body: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(request) = body?;
    let id = services.submission.submit_request(request).await?;
    Ok(Json(json!({ "hash": id, "reason": "enqueued" })))
}

async fn queue(State(services): State<Services>) -> Result<Json<serde_json::Value>, ApiError> {
    let entries = services.retrieval.pending(services.inspect_limit).await?;
    Ok(Json(json!({ "queue": entries })))
}

async fn track(
    State(services): State<Services>,
    Path((id, part)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let (key, bytes) = services.retrieval.fetch_part(&id, &part).await?;
    let headers = [
        (header::CONTENT_TYPE, "audio/mpeg".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{key}\""),
        ),
    ];
    Ok((headers, bytes).into_response())
}

async fn remove(
    State(services): State<Services>,
    Path((id, part)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let key = services.retrieval.remove_part(&id, &part).await?;
    Ok(Json(json!({ "removed": key })))
}
