//! JSON HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/context/analyze` | Start (or serve cached) website analysis |
//! | `GET`  | `/context/{id}` | Poll a context record |
//! | `POST` | `/scrape-website` | Fetch and extract one page |
//! | `POST` | `/context/{id}/chat` | Ask a question grounded in a completed context |
//! | `GET`  | `/leads` | List leads (`?stats=true` for aggregates) |
//! | `POST` | `/leads` | `action: "create"` or `"update_status"` |
//! | `PUT`  | `/leads` | Alias for `update_status` |
//! | `GET`/`POST` | `/consultation-requests` | List / submit consultation requests |
//! | `GET`/`POST` | `/case-studies` | List / create case studies |
//! | `POST` | `/quick-chat` | Short search-grounded marketing answer |
//! | `POST` | `/marketing-content` | Marketing copy for a URL |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "URL is required" } }
//! ```
//!
//! | Code | Status |
//! |------|--------|
//! | `bad_request`, `not_ready` | 400 |
//! | `not_found` | 404 |
//! | `method_not_allowed` | 405 |
//! | `upstream_error`, `scrape_failed`, `internal` | 500 |
//! | `service_unavailable` | 503 |
//!
//! Outside `server.environment = "development"`, upstream and internal
//! messages are replaced with a generic text; the detail is only logged.
//! Bodies that fail JSON extraction are answered with `bad_request`.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{rejection::JsonRejection, FromRequest, Path, Query, Request, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use site_context_core::models::{ContextSummary, FetchedPage};
use site_context_core::SiteError;

use crate::case_studies::NewCaseStudy;
use crate::config::Config;
use crate::consultations::NewConsultationRequest;
use crate::leads::{LeadFilters, NewLead, RequestMetadata};
use crate::pipeline::AnalyzeOutcome;
use crate::services::Services;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    services: Arc<Services>,
    development: bool,
}

/// Start the server with production services built from `config`.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let services = Services::from_config(config).await?;
    run_server_with_services(config, services).await
}

/// Start the server with caller-supplied services.
///
/// Binds to `[server].bind` and runs until the process is terminated.
pub async fn run_server_with_services(config: &Config, services: Services) -> anyhow::Result<()> {
    let app = router(services, config.server.is_development());

    let listener = TcpListener::bind(&config.server.bind).await?;
    info!(
        bind = %config.server.bind,
        environment = %config.server.environment,
        "server listening"
    );
    if let Some(public_url) = &config.server.public_url {
        info!(%public_url, "public base URL");
    }

    axum::serve(listener, app).await?;
    Ok(())
}

/// Build the router with every route and the CORS layer.
pub fn router(services: Services, development: bool) -> Router {
    let state = AppState {
        services: Arc::new(services),
        development,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/context/analyze", post(handle_analyze))
        .route("/context/{id}", get(handle_get_context))
        .route("/context/{id}/chat", post(handle_chat))
        .route("/scrape-website", post(handle_scrape_website))
        .route(
            "/leads",
            get(handle_list_leads)
                .post(handle_post_lead)
                .put(handle_put_lead)
                .delete(handle_delete_lead),
        )
        .route(
            "/consultation-requests",
            get(handle_list_consultations).post(handle_submit_consultation),
        )
        .route(
            "/case-studies",
            get(handle_list_case_studies).post(handle_create_case_study),
        )
        .route("/quick-chat", post(handle_quick_chat))
        .route("/marketing-content", post(handle_marketing_content))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

/// [`Json`] extractor whose rejections use the API error envelope.
struct JsonBody<T>(T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(bad_request(rejection.body_text())),
        }
    }
}

/// Map a [`SiteError`] to a response, redacting upstream and internal
/// detail unless running in development.
fn site_error(err: SiteError, development: bool) -> AppError {
    let status = match &err {
        SiteError::Validation(_) | SiteError::State(_) => StatusCode::BAD_REQUEST,
        SiteError::NotFound(_) => StatusCode::NOT_FOUND,
        SiteError::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
        SiteError::Upstream(_)
        | SiteError::Store(_)
        | SiteError::Scrape(_)
        | SiteError::Search { .. }
        | SiteError::Synthesis(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!(code = err.code(), error = %err, "request failed");
        if development {
            err.to_string()
        } else if matches!(err, SiteError::Upstream(_)) {
            "Failed to generate response".to_string()
        } else {
            "Internal server error".to_string()
        }
    } else {
        err.to_string()
    };

    AppError {
        status,
        code: err.code().to_string(),
        message,
    }
}

impl AppState {
    fn fail(&self, err: impl Into<SiteError>) -> AppError {
        site_error(err.into(), self.development)
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ /context ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeRequest {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeStarted {
    success: bool,
    context_id: String,
    status: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeCached {
    success: bool,
    context_id: String,
    cached: bool,
    summary: ContextSummary,
}

/// `202` with the new record id, or `200` with a cached summary.
async fn handle_analyze(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<AnalyzeRequest>,
) -> Result<Response, AppError> {
    let url = req.url.unwrap_or_default();
    let user_id = req.user_id.as_deref().filter(|u| !u.trim().is_empty());

    let outcome = state
        .services
        .queue
        .submit(&url, user_id)
        .await
        .map_err(|e| state.fail(e))?;

    let response = match outcome {
        AnalyzeOutcome::Started { id, .. } => (
            StatusCode::ACCEPTED,
            Json(AnalyzeStarted {
                success: true,
                context_id: id,
                status: "processing",
            }),
        )
            .into_response(),
        AnalyzeOutcome::Cached { context, summary } => (
            StatusCode::OK,
            Json(AnalyzeCached {
                success: true,
                context_id: context.id,
                cached: true,
                summary,
            }),
        )
            .into_response(),
    };
    Ok(response)
}

// ============ POST /scrape-website ============

#[derive(Deserialize)]
struct ScrapeRequest {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Serialize)]
struct ScrapeResponse {
    success: bool,
    data: FetchedPage,
}

async fn handle_scrape_website(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<ScrapeRequest>,
) -> Result<Json<ScrapeResponse>, AppError> {
    let url = req.url.unwrap_or_default();
    let page = state
        .services
        .pipeline()
        .scrape(&url)
        .await
        .map_err(|e| state.fail(e))?;
    Ok(Json(ScrapeResponse {
        success: true,
        data: page,
    }))
}

async fn handle_get_context(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let context = state
        .services
        .store()
        .get(&id)
        .await
        .map_err(|e| state.fail(e))?
        .ok_or_else(|| state.fail(SiteError::NotFound("Context not found".into())))?;
    Ok(Json(context).into_response())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    #[serde(default)]
    question: String,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    model_name: Option<String>,
}

async fn handle_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<ChatRequest>,
) -> Result<Response, AppError> {
    let answer = state
        .services
        .chat
        .ask(
            &id,
            &req.question,
            req.model.as_deref(),
            req.model_name.as_deref(),
        )
        .await
        .map_err(|e| state.fail(e))?;
    Ok(Json(answer).into_response())
}

// ============ /leads ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LeadsQuery {
    email: Option<String>,
    domain: Option<String>,
    status: Option<String>,
    conversation_id: Option<String>,
    limit: Option<i64>,
    stats: Option<String>,
}

async fn handle_list_leads(
    State(state): State<AppState>,
    Query(query): Query<LeadsQuery>,
) -> Result<Json<Value>, AppError> {
    let leads = &state.services.leads;

    if query.stats.as_deref() == Some("true") {
        let stats = leads.stats().await.map_err(|e| state.fail(e))?;
        return Ok(Json(json!({ "success": true, "stats": stats })));
    }

    let filters = LeadFilters {
        email: query.email,
        domain: query.domain,
        status: query.status,
        conversation_id: query.conversation_id,
        limit: query.limit,
    };
    let found = leads.list(&filters).await.map_err(|e| state.fail(e))?;
    Ok(Json(json!({
        "success": true,
        "count": found.len(),
        "leads": found,
    })))
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct LeadRequest {
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    website: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    conversation_id: Option<String>,
    #[serde(default)]
    lead_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

fn request_metadata(headers: &HeaderMap) -> RequestMetadata {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string()
    };
    let forwarded = header("x-forwarded-for");
    RequestMetadata {
        user_agent: header("user-agent"),
        ip: if forwarded.is_empty() {
            header("x-real-ip")
        } else {
            forwarded
        },
        referer: header("referer"),
        accept_language: header("accept-language"),
        timestamp: Utc::now().to_rfc3339(),
    }
}

async fn handle_post_lead(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(req): JsonBody<LeadRequest>,
) -> Result<Json<Value>, AppError> {
    match req.action.as_deref() {
        Some("create") => create_lead(&state, &headers, req).await,
        Some("update_status") => update_lead_status(&state, req).await,
        _ => Err(bad_request(
            "Invalid action. Use \"create\" or \"update_status\"",
        )),
    }
}

async fn handle_put_lead(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<LeadRequest>,
) -> Result<Json<Value>, AppError> {
    update_lead_status(&state, req).await
}

async fn handle_delete_lead() -> AppError {
    AppError {
        status: StatusCode::METHOD_NOT_ALLOWED,
        code: "method_not_allowed".to_string(),
        message: "Delete operation not allowed".to_string(),
    }
}

async fn create_lead(
    state: &AppState,
    headers: &HeaderMap,
    req: LeadRequest,
) -> Result<Json<Value>, AppError> {
    let input = NewLead {
        website: req.website.unwrap_or_default(),
        email: req.email.unwrap_or_default(),
        conversation_id: req.conversation_id,
    };
    let created = state
        .services
        .leads
        .create(&input, &request_metadata(headers))
        .await
        .map_err(|e| state.fail(e))?;

    let message = if created.is_update {
        "Lead updated successfully"
    } else {
        "Lead created successfully"
    };
    Ok(Json(json!({
        "success": true,
        "lead": created.lead,
        "isUpdate": created.is_update,
        "message": message,
    })))
}

async fn update_lead_status(state: &AppState, req: LeadRequest) -> Result<Json<Value>, AppError> {
    let lead = state
        .services
        .leads
        .update_status(
            req.lead_id.as_deref().unwrap_or(""),
            req.status.as_deref().unwrap_or(""),
        )
        .await
        .map_err(|e| state.fail(e))?;
    Ok(Json(json!({
        "success": true,
        "lead": lead,
        "message": "Lead status updated successfully",
    })))
}

// ============ /consultation-requests ============

async fn handle_submit_consultation(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<NewConsultationRequest>,
) -> Result<Json<Value>, AppError> {
    let stored = state
        .services
        .consultations
        .submit(&req)
        .await
        .map_err(|e| state.fail(e))?;
    Ok(Json(json!({
        "success": true,
        "data": stored,
        "message": "Consultation request submitted successfully",
    })))
}

async fn handle_list_consultations(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let data = state
        .services
        .consultations
        .list()
        .await
        .map_err(|e| state.fail(e))?;
    Ok(Json(json!({ "data": data })))
}

// ============ /case-studies ============

async fn handle_create_case_study(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<NewCaseStudy>,
) -> Result<Json<Value>, AppError> {
    let stored = state
        .services
        .case_studies
        .create(&req)
        .await
        .map_err(|e| state.fail(e))?;
    Ok(Json(json!({
        "success": true,
        "data": stored,
        "message": "Case study created successfully",
    })))
}

async fn handle_list_case_studies(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let data = state
        .services
        .case_studies
        .list()
        .await
        .map_err(|e| state.fail(e))?;
    Ok(Json(json!({ "data": data })))
}

// ============ Assistant ============

#[derive(Deserialize)]
struct QuickChatRequest {
    #[serde(default)]
    question: String,
}

async fn handle_quick_chat(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<QuickChatRequest>,
) -> Result<Response, AppError> {
    let reply = state
        .services
        .assistant
        .quick_chat(&req.question)
        .await
        .map_err(|e| state.fail(e))?;
    Ok(Json(reply).into_response())
}

#[derive(Deserialize)]
struct MarketingContentRequest {
    #[serde(default)]
    url: String,
    #[serde(default)]
    prompt: String,
}

async fn handle_marketing_content(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<MarketingContentRequest>,
) -> Result<Response, AppError> {
    let reply = state
        .services
        .assistant
        .marketing_content(&req.url, &req.prompt)
        .await
        .map_err(|e| state.fail(e))?;
    Ok(Json(reply).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_redacted_outside_development() {
        let err = site_error(SiteError::Upstream("401 invalid key sk-abc".into()), false);
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code, "upstream_error");
        assert!(!err.message.contains("sk-abc"));

        let err = site_error(SiteError::Upstream("401 invalid key sk-abc".into()), true);
        assert!(err.message.contains("sk-abc"));
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (SiteError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (SiteError::State("x".into()), StatusCode::BAD_REQUEST),
            (SiteError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (SiteError::Config("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (anyhow::anyhow!("db").into(), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(site_error(err, false).status, status);
        }
    }

    #[tokio::test]
    async fn test_json_rejection_is_bad_request() {
        let req = Request::builder()
            .method("POST")
            .header("content-type", "application/json")
            .body(axum::body::Body::from(r#"{"url": 123}"#))
            .unwrap();
        let err = match JsonBody::<ScrapeRequest>::from_request(req, &()).await {
            Ok(_) => panic!("integer url should be rejected"),
            Err(err) => err,
        };
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, "bad_request");
        assert!(err.message.contains("invalid type"), "message: {}", err.message);

        let req = Request::builder()
            .method("POST")
            .body(axum::body::Body::from(r#"{"url": "example.com"}"#))
            .unwrap();
        let err = match JsonBody::<ScrapeRequest>::from_request(req, &()).await {
            Ok(_) => panic!("missing content type should be rejected"),
            Err(err) => err,
        };
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_metadata_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "10.0.0.2".parse().unwrap());
        assert_eq!(request_metadata(&headers).ip, "10.0.0.2");

        headers.insert("x-forwarded-for", "203.0.113.9".parse().unwrap());
        headers.insert("user-agent", "curl/8".parse().unwrap());
        let meta = request_metadata(&headers);
        assert_eq!(meta.ip, "203.0.113.9");
        assert_eq!(meta.user_agent, "curl/8");
    }
}
