use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::contracts::{
    CounterRow, CounterStore, IdentifierIndex, PeriodType, SequenceError, SequenceType,
    StorageError,
};
use crate::generator::SequenceNumberGenerator;
use crate::metrics::MetricsRegistry;

/// HTTP-level request counters.
#[derive(Default)]
pub struct Metrics {
    pub requests_total: AtomicU64,
    pub errors_total: AtomicU64,
    pub start_time: std::sync::OnceLock<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        let m = Self::default();
        let _ = m.start_time.set(Instant::now());
        m
    }

    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
    }

    fn uptime_secs(&self) -> f64 {
        self.start_time
            .get()
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

/// Application state shared across handlers.
pub struct AppState<C: CounterStore, I: IdentifierIndex> {
    pub generator: SequenceNumberGenerator<C, I>,
    pub metrics: Arc<Metrics>,
    pub metrics_registry: Arc<MetricsRegistry>,
    /// Backend name reported by health and stats endpoints
    pub storage_name: String,
}

impl<C: CounterStore, I: IdentifierIndex> AppState<C, I> {
    /// Wraps `generator`; the registry shares the generator's metrics.
    pub fn new(generator: SequenceNumberGenerator<C, I>, storage_name: impl Into<String>) -> Self {
        let metrics_registry = Arc::new(MetricsRegistry {
            generator: Arc::clone(generator.metrics()),
        });
        Self {
            generator,
            metrics: Arc::new(Metrics::new()),
            metrics_registry,
            storage_name: storage_name.into(),
        }
    }
}

/// Request body for number generation.
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub sequence_type: Option<String>,
    pub period_type: Option<String>,
}

/// Successful generation.
#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub success: bool,
    pub number: String,
    pub count: u64,
    pub period: String,
    pub prefix: String,
}

/// Error envelope shared by all endpoints.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collision: Option<bool>,
}

/// API error type.
pub enum ApiError {
    Sequence(SequenceError),
    BadRequest(String),
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, code, error, collision) = match self {
            ApiError::Sequence(SequenceError::Validation(msg)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg, None)
            }
            ApiError::Sequence(e @ SequenceError::ConcurrencyConflict { .. }) => (
                StatusCode::CONFLICT,
                "CONCURRENCY_CONFLICT",
                format!("{}. Please retry", e),
                None,
            ),
            ApiError::Sequence(e @ SequenceError::DuplicateIdentifier { .. }) => (
                StatusCode::CONFLICT,
                "DUPLICATE_IDENTIFIER",
                format!("{}. Please retry", e),
                Some(true),
            ),
            ApiError::Sequence(e) => {
                tracing::error!(error = %e, "Number generation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    e.to_string(),
                    None,
                )
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg, None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg, None),
        };

        let body = ErrorResponse {
            success: false,
            error,
            code: code.into(),
            collision,
        };
        (status, Json(body)).into_response()
    }
}

impl From<SequenceError> for ApiError {
    fn from(e: SequenceError) -> Self {
        ApiError::Sequence(e)
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        ApiError::Sequence(SequenceError::Storage(e))
    }
}

/// POST /sequences/generate
/// Issues the next number for `sequence_type` in the current period.
pub async fn generate_number<C: CounterStore, I: IdentifierIndex>(
    State(state): State<Arc<AppState<C, I>>>,
    body: Bytes,
) -> Result<Json<GenerateResponse>, ApiError> {
    state.metrics.record_request();

    let result = generate_from_body(&state, &body).await;
    if result.is_err() {
        state.metrics.record_error();
    }
    result
}

async fn generate_from_body<C: CounterStore, I: IdentifierIndex>(
    state: &AppState<C, I>,
    body: &[u8],
) -> Result<Json<GenerateResponse>, ApiError> {
    let request: GenerateRequest = serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid JSON: {}", e)))?;

    let sequence_type = request.sequence_type.ok_or_else(|| {
        ApiError::Sequence(SequenceError::Validation(
            "sequence_type is required. Must be 'order' or 'sale'".into(),
        ))
    })?;

    let issued = state
        .generator
        .generate(&sequence_type, request.period_type.as_deref())
        .await?;

    Ok(Json(GenerateResponse {
        success: true,
        number: issued.number,
        count: issued.count,
        period: issued.period,
        prefix: issued.prefix,
    }))
}

/// Query parameters for listing counters.
#[derive(Debug, Deserialize)]
pub struct ListCountersQuery {
    pub sequence_type: Option<String>,
}

/// Response for counter listing.
#[derive(Debug, Serialize)]
pub struct ListCountersResponse {
    pub counters: Vec<CounterRow>,
    pub count: usize,
}

/// GET /sequences
/// Lists counter rows, optionally for one sequence type.
pub async fn list_counters<C: CounterStore, I: IdentifierIndex>(
    State(state): State<Arc<AppState<C, I>>>,
    Query(query): Query<ListCountersQuery>,
) -> Result<Json<ListCountersResponse>, ApiError> {
    let sequence_type = query
        .sequence_type
        .as_deref()
        .map(str::parse::<SequenceType>)
        .transpose()?;

    let counters = state
        .generator
        .counters()
        .list_counters(sequence_type)
        .await?;

    Ok(Json(ListCountersResponse {
        count: counters.len(),
        counters,
    }))
}

/// GET /sequences/{sequence_type}/{period_type}
/// Returns the counter of the current period without advancing it.
pub async fn get_current_counter<C: CounterStore, I: IdentifierIndex>(
    State(state): State<Arc<AppState<C, I>>>,
    Path((sequence_type, period_type)): Path<(String, String)>,
) -> Result<Json<CounterRow>, ApiError> {
    let sequence_type: SequenceType = sequence_type.parse()?;
    let period_type: PeriodType = period_type.parse()?;

    state
        .generator
        .peek(sequence_type, period_type)
        .await?
        .map(Json)
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "No {} {} number issued in the current period",
                period_type, sequence_type
            ))
        })
}

/// Request body for registering an externally created identifier.
#[derive(Debug, Deserialize)]
pub struct RecordIdentifierRequest {
    pub field: String,
    pub value: String,
}

/// Response for identifier registration.
#[derive(Debug, Serialize)]
pub struct RecordIdentifierResponse {
    pub collection: String,
    pub field: String,
    pub value: String,
}

/// POST /collections/{collection}/identifiers
/// Makes an identifier created outside the generator (e.g. an import) visible
/// to the duplicate check.
pub async fn record_identifier<C: CounterStore, I: IdentifierIndex>(
    State(state): State<Arc<AppState<C, I>>>,
    Path(collection): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<RecordIdentifierResponse>), ApiError> {
    let request: RecordIdentifierRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid JSON: {}", e)))?;

    if request.field.trim().is_empty() || request.value.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "field and value must not be empty".into(),
        ));
    }

    state
        .generator
        .identifiers()
        .record_identifier(&collection, &request.field, &request.value)
        .await?;

    tracing::info!(
        collection = %collection,
        field = %request.field,
        value = %request.value,
        "Recorded external identifier"
    );

    Ok((
        StatusCode::CREATED,
        Json(RecordIdentifierResponse {
            collection,
            field: request.field,
            value: request.value,
        }),
    ))
}

/// GET /health
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy"
    }))
}

/// GET /health/live
/// Liveness probe; OK whenever the process answers.
pub async fn health_live() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Response for readiness endpoint.
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub storage: ComponentHealth,
}

/// Health status for a single component.
#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub backend: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// GET /health/ready
/// Readiness probe; verifies the counter store answers reads.
pub async fn health_ready<C: CounterStore, I: IdentifierIndex>(
    State(state): State<Arc<AppState<C, I>>>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    let probe = state.generator.counters().list_counters(None).await;

    let storage = ComponentHealth {
        backend: state.storage_name.clone(),
        status: if probe.is_ok() { "ok" } else { "error" }.into(),
        error: probe.as_ref().err().map(|e| e.to_string()),
    };

    if probe.is_ok() {
        Ok(Json(ReadinessResponse {
            status: "ready".into(),
            storage,
        }))
    } else {
        Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                status: "not_ready".into(),
                storage,
            }),
        ))
    }
}

/// Response for stats endpoint.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub uptime_secs: f64,
    pub storage: String,
    pub requests_total: u64,
    pub errors_total: u64,
    pub generator: GeneratorStats,
}

#[derive(Debug, Serialize)]
pub struct GeneratorStats {
    pub issued_total: u64,
    pub validation_errors_total: u64,
    pub cas_retries_total: u64,
    pub conflicts_total: u64,
    pub collisions_total: u64,
    pub last_number_errors_total: u64,
    pub avg_latency_us: f64,
}

/// GET /stats
pub async fn get_stats<C: CounterStore, I: IdentifierIndex>(
    State(state): State<Arc<AppState<C, I>>>,
) -> impl IntoResponse {
    let g = &state.metrics_registry.generator;

    Json(StatsResponse {
        uptime_secs: state.metrics.uptime_secs(),
        storage: state.storage_name.clone(),
        requests_total: state.metrics.requests_total.load(Ordering::Relaxed),
        errors_total: state.metrics.errors_total.load(Ordering::Relaxed),
        generator: GeneratorStats {
            issued_total: g.issued_total.load(Ordering::Relaxed),
            validation_errors_total: g.validation_errors_total.load(Ordering::Relaxed),
            cas_retries_total: g.cas_retries_total.load(Ordering::Relaxed),
            conflicts_total: g.conflicts_total.load(Ordering::Relaxed),
            collisions_total: g.collisions_total.load(Ordering::Relaxed),
            last_number_errors_total: g.last_number_errors_total.load(Ordering::Relaxed),
            avg_latency_us: safe_avg(
                g.generate_duration_us.sum(),
                g.generate_duration_us.count(),
            ),
        },
    })
}

/// GET /metrics
/// Prometheus text exposition format.
pub async fn metrics<C: CounterStore, I: IdentifierIndex>(
    State(state): State<Arc<AppState<C, I>>>,
) -> impl IntoResponse {
    let mut output = format!(
        "# HELP seqmint_uptime_secs Server uptime in seconds\n\
         # TYPE seqmint_uptime_secs gauge\n\
         seqmint_uptime_secs {:.3}\n\
         \n\
         # HELP seqmint_http_requests_total Total generate requests\n\
         # TYPE seqmint_http_requests_total counter\n\
         seqmint_http_requests_total {}\n\
         \n\
         # HELP seqmint_http_errors_total Generate requests answered with an error\n\
         # TYPE seqmint_http_errors_total counter\n\
         seqmint_http_errors_total {}\n\
         \n",
        state.metrics.uptime_secs(),
        state.metrics.requests_total.load(Ordering::Relaxed),
        state.metrics.errors_total.load(Ordering::Relaxed),
    );

    output.push_str(&state.metrics_registry.format_prometheus());

    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        output,
    )
}

/// Calculates average, returning 0.0 if count is zero.
#[inline]
fn safe_avg(sum: u64, count: u64) -> f64 {
    if count > 0 {
        sum as f64 / count as f64
    } else {
        0.0
    }
}
