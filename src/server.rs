use std::collections::BTreeMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use futures::stream::Stream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;

use crate::agent::{Agent, RunEvent, RunOptions};
use crate::api::ApiResponse;
use crate::config::ServerConfig;
use crate::error::{AgnoError, Result};
use crate::time::current_utc_str;

const API_VERSION_PREFIX: &str = "/v1";

/// Named agents shared by the HTTP handlers.
#[derive(Clone, Default)]
pub struct AgentRegistry {
    agents: Arc<RwLock<BTreeMap<String, Arc<Agent>>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, name: impl Into<String>, agent: Agent) {
        self.agents.write().await.insert(name.into(), Arc::new(agent));
    }

    pub async fn get(&self, name: &str) -> Option<Arc<Agent>> {
        self.agents.read().await.get(name).cloned()
    }

    pub async fn names(&self) -> Vec<String> {
        self.agents.read().await.keys().cloned().collect()
    }
}

#[derive(Serialize)]
struct AgentSummary {
    name: String,
    model: String,
    tools: Vec<String>,
}

async fn summaries(registry: &AgentRegistry) -> Vec<AgentSummary> {
    registry
        .agents
        .read()
        .await
        .iter()
        .map(|(name, agent)| AgentSummary {
            name: name.clone(),
            model: agent.model_id().to_string(),
            tools: agent.tool_names(),
        })
        .collect()
}

struct ApiError(AgnoError);

impl From<AgnoError> for ApiError {
    fn from(err: AgnoError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AgnoError::InvalidInput(_) | AgnoError::UnknownVariant { .. } => {
                StatusCode::BAD_REQUEST
            }
            AgnoError::LanguageModel(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}

fn not_found(kind: &str, name: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"error": format!("{kind} `{name}` not found")})),
    )
        .into_response()
}

/// `GET /health` and `GET /ping`.
pub fn health_router() -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ping", get(ping))
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "success", "utc": current_utc_str()}))
}

async fn ping() -> impl IntoResponse {
    Json(json!({"ping": "pong"}))
}

#[derive(Debug, Deserialize)]
struct RunRequest {
    message: String,
    #[serde(default)]
    stream: bool,
}

/// `GET /agents` and `POST /agents/:name/runs`.
pub fn agents_router(registry: AgentRegistry) -> Router {
    Router::new()
        .route("/agents", get(list_agents))
        .route("/agents/:name/runs", post(create_run))
        .with_state(registry)
}

async fn list_agents(State(registry): State<AgentRegistry>) -> impl IntoResponse {
    Json(summaries(&registry).await)
}

async fn create_run(
    State(registry): State<AgentRegistry>,
    Path(name): Path<String>,
    Json(req): Json<RunRequest>,
) -> Response {
    let Some(agent) = registry.get(&name).await else {
        return not_found("agent", &name);
    };
    let options = RunOptions {
        stream: req.stream,
        ..agent.default_options()
    };
    tracing::info!(agent = %name, stream = req.stream, "starting run");

    if req.stream {
        match agent.run_stream(req.message, &options).await {
            Ok(stream) => Sse::new(stream.map(sse_event)).into_response(),
            Err(err) => ApiError(err).into_response(),
        }
    } else {
        match agent.run(req.message, &options).await {
            Ok(response) => Json(response).into_response(),
            Err(err) => ApiError(err).into_response(),
        }
    }
}

fn sse_event(item: Result<RunEvent>) -> std::result::Result<Event, Infallible> {
    let (kind, data) = match item {
        Ok(RunEvent::RunContent(text)) => ("run_content", json!({"content": text})),
        Ok(RunEvent::ToolCallStarted(call)) => ("tool_call_started", json!(call)),
        Ok(RunEvent::ToolCallCompleted(result)) => ("tool_call_completed", json!(result)),
        Ok(RunEvent::RunCompleted(response)) => ("run_completed", json!(response)),
        Err(err) => ("run_error", json!({"error": err.to_string()})),
    };
    Ok(Event::default().event(kind).data(data.to_string()))
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    assistant: String,
    message: String,
}

/// `GET /assistants` and `POST /assistants/chat`; chat replies use the [`ApiResponse`] envelope.
pub fn assistants_router(registry: AgentRegistry) -> Router {
    Router::new()
        .route("/assistants", get(list_assistants))
        .route("/assistants/chat", post(chat))
        .with_state(registry)
}

async fn list_assistants(State(registry): State<AgentRegistry>) -> impl IntoResponse {
    Json(summaries(&registry).await)
}

async fn chat(
    State(registry): State<AgentRegistry>,
    payload: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> (StatusCode, Json<ApiResponse>) {
    let Ok(Json(req)) = payload else {
        return (StatusCode::BAD_REQUEST, Json(ApiResponse::default()));
    };
    let Some(assistant) = registry.get(&req.assistant).await else {
        return (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::fail(format!(
                "assistant `{}` not found",
                req.assistant
            ))),
        );
    };

    match assistant.run(req.message, &assistant.default_options()).await {
        Ok(response) => {
            let log = response
                .tool_calls
                .iter()
                .map(|execution| execution.call.signature())
                .collect();
            (
                StatusCode::OK,
                Json(ApiResponse::ok(response.content).with_log(log)),
            )
        }
        Err(AgnoError::InvalidInput(message)) => {
            (StatusCode::BAD_REQUEST, Json(ApiResponse::fail(message)))
        }
        Err(err) => {
            tracing::error!(assistant = %req.assistant, error = %err, "chat failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::fail(err.to_string())),
            )
        }
    }
}

/// Health and agent routes mounted under `/v1`.
pub fn v1_agents_router(registry: AgentRegistry) -> Router {
    Router::new().nest(
        API_VERSION_PREFIX,
        health_router().merge(agents_router(registry)),
    )
}

/// Health and assistant routes mounted under `/v1`.
pub fn v1_assistants_router(registry: AgentRegistry) -> Router {
    Router::new().nest(
        API_VERSION_PREFIX,
        health_router().merge(assistants_router(registry)),
    )
}

/// Every route group under the configured `api_prefix`.
pub fn api_router(config: &ServerConfig, registry: AgentRegistry) -> Router {
    Router::new().nest(
        &config.api_prefix,
        health_router()
            .merge(agents_router(registry.clone()))
            .merge(assistants_router(registry)),
    )
}

/// Binds `config.host:config.port` and serves `app` until the listener fails.
pub async fn serve(config: &ServerConfig, app: Router) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|err| AgnoError::Config(format!("invalid listen address: {err}")))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "serving agent api");
    axum::serve(listener, app.into_make_service())
        .await
        .map_err(|err| AgnoError::Protocol(format!("server error: {err}")))?;
    Ok(())
}
