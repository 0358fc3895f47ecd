//! HTTP Endpoints
//!
//! REST API for the student support assistant.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Json, Path, Query, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use campus_assist_agent::ChatRequest;
use campus_assist_core::{EmailRequest, ProblemClassification, StudentInfo};

use crate::client::client_identifier;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use crate::ServerError;

const READY_CHECK_TIMEOUT: Duration = Duration::from_secs(campus_assist_config::constants::timeouts::CHECK_SECS);

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let (cors_layer, timeout) = {
        let config = state.get_config();
        (
            build_cors_layer(&config.server.cors_origins, config.server.cors_enabled),
            Duration::from_secs(config.server.timeout_seconds),
        )
    };

    Router::new()
        // Dialogue
        .route("/api/chat", post(chat))
        .route("/api/chat/stream", post(chat_stream))
        // Sessions
        .route("/api/sessions", get(list_sessions))
        .route("/api/sessions/:id", get(get_session).delete(delete_session))
        // Taxonomy and knowledge
        .route("/api/categories", get(list_categories))
        .route("/api/categories/knowledge", get(knowledge_categories))
        .route("/api/categories/:category/subcategories", get(list_subcategories))
        .route("/api/classify", post(classify))
        .route("/api/search", post(search))
        // Email drafting
        .route("/api/email/generate", post(generate_email))
        // Contact directory
        .route("/api/contacts", get(list_contacts))
        .route("/api/contacts/emergency", get(emergency_contacts))
        .route("/api/contacts/search", get(search_contacts))
        // Health check
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        // Prometheus metrics
        .route("/metrics", get(metrics_handler))
        // Admin endpoints
        .route("/admin/reload-config", post(reload_config))
        .route("/admin/reload-corpus", post(reload_corpus))
        .route("/admin/ingest", post(ingest))
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors_layer)
        .with_state(state)
}

/// Build CORS layer from configured origins
///
/// - If cors_enabled is false, returns permissive layer (for dev)
/// - If no configured origin parses, defaults to localhost:3000
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled - allowing all origins (NOT FOR PRODUCTION)");
        return CorsLayer::permissive();
    }

    let parsed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!("Invalid CORS origin: {}", origin);
                None
            })
        })
        .collect();

    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    if parsed_origins.is_empty() {
        tracing::info!("No usable CORS origins configured, defaulting to localhost:3000");
        return base.allow_origin(HeaderValue::from_static("http://localhost:3000"));
    }

    tracing::info!("CORS configured with {} origins", parsed_origins.len());
    base.allow_origin(parsed_origins)
}

/// POST /api/chat
async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<impl IntoResponse, ServerError> {
    let client = client_identifier(&headers);
    let response = state.engine.handle(request, &client).await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamRequest {
    #[serde(alias = "userMessage")]
    message: String,
    #[serde(default, alias = "conversationId")]
    session_id: Option<String>,
}

/// POST /api/chat/stream
///
/// Emits `token` events with `{delta}`, then one `done` event. Closing the
/// connection drops the stream and stops the upstream completion.
async fn chat_stream(
    State(state): State<AppState>,
    Json(request): Json<StreamRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ServerError> {
    let stream = state
        .engine
        .answer_stream(&request.message, request.session_id.as_deref())
        .await?;

    let events = stream.map(|item| {
        let event = match item {
            Ok(chunk) if chunk.is_final => Event::default()
                .event("done")
                .data(serde_json::json!({ "finishReason": chunk.finish_reason }).to_string()),
            Ok(chunk) => Event::default()
                .event("token")
                .data(serde_json::json!({ "delta": chunk.delta }).to_string()),
            Err(e) => {
                tracing::warn!(error = %e, "Answer stream failed");
                Event::default()
                    .event("error")
                    .data(serde_json::json!({ "error": e.to_string() }).to_string())
            },
        };
        Ok(event)
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// GET /api/sessions
async fn list_sessions(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ServerError> {
    let sessions = state.engine.list_sessions(&client_identifier(&headers)).await?;
    Ok(Json(serde_json::json!({
        "count": sessions.len(),
        "sessions": sessions,
    })))
}

/// GET /api/sessions/:id
async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    let session = state
        .engine
        .get_session(&id)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("session {}", id)))?;
    Ok(Json(serde_json::json!({
        "sessionId": id,
        "session": session,
    })))
}

/// DELETE /api/sessions/:id
async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ServerError> {
    if state.engine.delete_session(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ServerError::NotFound(format!("session {}", id)))
    }
}

/// GET /api/categories
async fn list_categories(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "categories": state.domain.categories(),
    }))
}

/// GET /api/categories/:category/subcategories
async fn list_subcategories(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    let found = state
        .domain
        .category(&category)
        .ok_or_else(|| ServerError::NotFound(format!("category {}", category)))?;
    Ok(Json(serde_json::json!({
        "category": found.name,
        "subcategories": found.subcategories,
        "department": state.domain.department_or_fallback(&found.name).name,
    })))
}

/// GET /api/categories/knowledge
async fn knowledge_categories(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "categories": state.corpus.categories(),
        "documents": state.corpus.len(),
    }))
}

#[derive(Debug, Deserialize)]
struct ClassifyRequest {
    message: String,
    #[serde(default)]
    history: Vec<String>,
}

/// POST /api/classify
async fn classify(
    State(state): State<AppState>,
    Json(request): Json<ClassifyRequest>,
) -> Result<impl IntoResponse, ServerError> {
    if request.message.trim().is_empty() {
        return Err(ServerError::InvalidRequest("message is required".to_string()));
    }
    let classification = state
        .engine
        .classifier()
        .classify(&request.message, &request.history)
        .await;
    let contact = state.engine.contacts().quick_contact(&classification.category);
    Ok(Json(serde_json::json!({
        "classification": classification,
        "contact": contact,
    })))
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    limit: Option<usize>,
}

/// POST /api/search
async fn search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<impl IntoResponse, ServerError> {
    if request.query.trim().is_empty() {
        return Err(ServerError::InvalidRequest("query is required".to_string()));
    }
    let limit = request
        .limit
        .unwrap_or_else(|| state.get_config().rag.default_limit);
    let results = state.engine.retriever().search(&request.query, limit).await?;
    Ok(Json(serde_json::json!({
        "query": request.query,
        "count": results.len(),
        "results": results,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateEmailRequest {
    message: String,
    #[serde(default)]
    student_info: StudentInfo,
    #[serde(default)]
    classification: Option<ProblemClassification>,
    #[serde(default)]
    slots: BTreeMap<String, String>,
}

/// POST /api/email/generate
async fn generate_email(
    State(state): State<AppState>,
    Json(request): Json<GenerateEmailRequest>,
) -> Result<impl IntoResponse, ServerError> {
    if request.message.trim().is_empty() {
        return Err(ServerError::InvalidRequest("message is required".to_string()));
    }
    let classification = match request.classification {
        Some(c) => c,
        None => state.engine.classifier().classify(&request.message, &[]).await,
    };
    let email_request = EmailRequest {
        student: request.student_info,
        classification,
        message: request.message,
        slots: request.slots,
    };
    let draft = state.engine.drafter().draft(&email_request).await?;
    Ok(Json(serde_json::json!({
        "display": draft.to_display(),
        "email": draft,
    })))
}

/// GET /api/contacts
async fn list_contacts(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "departments": state.engine.contacts().all(),
    }))
}

/// GET /api/contacts/emergency
async fn emergency_contacts(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "emergency": state.engine.contacts().emergency(),
    }))
}

#[derive(Debug, Deserialize)]
struct ContactSearchQuery {
    #[serde(default)]
    q: String,
}

/// GET /api/contacts/search?q=
async fn search_contacts(
    State(state): State<AppState>,
    Query(query): Query<ContactSearchQuery>,
) -> impl IntoResponse {
    let results = state.engine.contacts().search(&query.q);
    Json(serde_json::json!({
        "query": query.q,
        "count": results.len(),
        "results": results,
    }))
}

/// Liveness
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Readiness: completion provider reachable and a corpus loaded
async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let llm = state.engine.llm();
    let llm_status = match tokio::time::timeout(READY_CHECK_TIMEOUT, llm.is_available()).await {
        Ok(true) => "ok",
        Ok(false) => "unreachable",
        Err(_) => "timeout",
    };

    let corpus_loaded = state.corpus.is_loaded();
    let ready = llm_status == "ok" && corpus_loaded;

    let status_code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(serde_json::json!({
            "status": if ready { "ready" } else { "not_ready" },
            "checks": {
                "llm": { "status": llm_status, "model": llm.model_name() },
                "corpus": {
                    "status": if corpus_loaded { "ok" } else { "missing" },
                    "documents": state.corpus.len(),
                },
            },
        })),
    )
}

/// POST /admin/reload-config
///
/// Providers and CORS keep their startup values.
async fn reload_config(State(state): State<AppState>) -> Result<impl IntoResponse, ServerError> {
    state.reload_config()?;
    Ok(Json(serde_json::json!({
        "status": "success",
        "message": "Configuration reloaded successfully",
    })))
}

/// POST /admin/reload-corpus
async fn reload_corpus(State(state): State<AppState>) -> Result<impl IntoResponse, ServerError> {
    let documents = state.reload_corpus().await?;
    Ok(Json(serde_json::json!({
        "status": "success",
        "documents": documents,
    })))
}

/// POST /admin/ingest
async fn ingest(State(state): State<AppState>) -> Result<impl IntoResponse, ServerError> {
    let report = state.ingest().await?;
    Ok(Json(serde_json::json!({
        "status": "success",
        "report": report,
    })))
}
