use std::sync::Arc;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use keyword_types::{KeywordOutput, KeywordRecord};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{error, info};

use crate::engine::{ClusterReport, Engine};
use crate::records::{self, InputFormat, RecordFault};

pub const DEFAULT_MAX_RECORDS: usize = 20_000;

const REJECTED_HEADER: HeaderName = HeaderName::from_static("x-rejected-records");

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub max_records: usize,
}

#[derive(Deserialize)]
pub struct DedupRequest {
    pub records: Vec<RecordInput>,
}

/// One submitted record. Accepts both `{key, score}` and the short
/// `{k, t}` output shape, so a previous response can be fed back in.
#[derive(Deserialize)]
pub struct RecordInput {
    #[serde(default, alias = "k")]
    pub key: String,
    #[serde(default, alias = "t")]
    pub score: Value,
}

impl RecordInput {
    fn into_record(self) -> Result<KeywordRecord, RecordFault> {
        let key = self.key.trim();
        if key.is_empty() {
            return Err(RecordFault::EmptyKey);
        }
        let score = match &self.score {
            Value::Null => return Err(RecordFault::MissingScore),
            Value::Number(n) => n
                .as_u64()
                .ok_or_else(|| RecordFault::InvalidScore(n.to_string()))?,
            Value::String(s) => records::parse_score(s)?,
            other => return Err(RecordFault::InvalidScore(other.to_string())),
        };
        Ok(KeywordRecord::new(key, score))
    }
}

#[derive(Debug, Serialize)]
pub struct RejectedRecord {
    pub index: usize,
    pub error: String,
}

#[derive(Serialize)]
pub struct DedupResponse {
    items: Vec<KeywordOutput>,
    merged: usize,
    clusters: Vec<ClusterReport>,
    rejected: Vec<RejectedRecord>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/dedup", post(dedup_json))
        .route("/v1/dedup/csv", post(dedup_csv))
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    "ok"
}

async fn dedup_json(
    State(state): State<AppState>,
    payload: Result<Json<DedupRequest>, JsonRejection>,
) -> Result<Json<DedupResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    check_len(request.records.len(), state.max_records)?;

    let mut accepted = Vec::with_capacity(request.records.len());
    let mut rejected = Vec::new();
    for (index, input) in request.records.into_iter().enumerate() {
        match input.into_record() {
            Ok(record) => accepted.push(record),
            Err(fault) => rejected.push(RejectedRecord {
                index,
                error: fault.to_string(),
            }),
        }
    }

    let engine = Arc::clone(&state.engine);
    let response = run_blocking(move || {
        let dedup = engine.run(&accepted);
        DedupResponse {
            items: dedup.outputs(),
            merged: dedup.merged_count(),
            clusters: dedup.report(),
            rejected,
        }
    })
    .await?;
    info!(
        items = response.items.len(),
        merged = response.merged,
        rejected = response.rejected.len(),
        "dedup request"
    );
    Ok(Json(response))
}

async fn dedup_csv(State(state): State<AppState>, body: String) -> Result<Response, ApiError> {
    let parsed = records::parse_records(&body, InputFormat::Csv);
    check_len(parsed.records.len() + parsed.rejected.len(), state.max_records)?;

    let engine = Arc::clone(&state.engine);
    let records = parsed.records;
    let csv = run_blocking(move || records::to_csv_string(engine.run(&records).representatives()))
        .await?;

    let headers = [
        (
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/csv; charset=utf-8"),
        ),
        (REJECTED_HEADER, HeaderValue::from(parsed.rejected.len())),
    ];
    Ok((headers, csv).into_response())
}

fn check_len(len: usize, max: usize) -> Result<(), ApiError> {
    if len > max {
        return Err(ApiError::bad_request(format!(
            "too many records: {len} (limit {max})"
        )));
    }
    Ok(())
}

/// Clustering is CPU-bound; keep it off the async workers.
async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("dedup task failed: {e}");
        ApiError::Internal
    })
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("internal server error")]
    Internal,
}

impl ApiError {
    fn bad_request<T: Into<String>>(msg: T) -> Self {
        ApiError::BadRequest(msg.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(msg) => {
                let body = Json(ErrorResponse { error: msg });
                (StatusCode::BAD_REQUEST, body).into_response()
            }
            ApiError::Internal => {
                let body = Json(json!({ "error": "internal server error" }));
                (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
            }
        }
    }
}
