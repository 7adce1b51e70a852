//! Webhook and queue frontend for the wasm-exec pipeline.
//!
//! Transport glue only: authenticate the webhook, parse the message, hand
//! the submission to the service, and deliver whatever comes back. Nothing
//! here inspects or interprets untrusted program output beyond passing it
//! on as text.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use base64::Engine as _;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use wasm_exec::{ExecService, Submission};

/// Header carrying the webhook secret, set when registering the webhook.
pub const SECRET_HEADER: &str = "X-Telegram-Bot-Api-Secret-Token";

/// Command prefix that marks a message as a submission.
const RUN_COMMAND: &str = "/run";

/// Reply for a bare command with no code attached.
const EMPTY_SOURCE_PROMPT: &str = "Luke, I need the code for the Death Star's system.";

#[derive(Debug, Deserialize)]
struct Update {
    message: Option<IncomingMessage>,
}

#[derive(Debug, Deserialize)]
struct IncomingMessage {
    message_id: i64,
    chat: Chat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

/// Job payload carried inside a queue push envelope.
#[derive(Debug, Deserialize)]
struct Job {
    chat_id: i64,
    message_id: i64,
    source: String,
}

/// Where a run's result goes back to.
#[derive(Debug, Clone, Copy)]
pub struct ReplyTarget {
    pub chat_id: i64,
    pub message_id: i64,
}

/// Delivery collaborator: fire-and-forget, failures are logged and never
/// propagated back into the pipeline.
#[derive(Clone)]
pub struct Delivery {
    client: reqwest::Client,
    token: String,
}

impl Delivery {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: token.into(),
        }
    }

    pub async fn deliver(&self, reply: ReplyTarget, text: &str) {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.token);
        let body = json!({
            "chat_id": reply.chat_id,
            "reply_to_message_id": reply.message_id,
            "allow_sending_without_reply": true,
            "text": text,
        });

        match self.client.post(&url).json(&body).send().await {
            Ok(response) if !response.status().is_success() => {
                error!(status = %response.status(), chat_id = reply.chat_id, "delivery rejected");
            }
            Ok(_) => debug!(chat_id = reply.chat_id, "result delivered"),
            Err(err) => error!(error = %err, chat_id = reply.chat_id, "delivery failed"),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    service: Arc<ExecService>,
    delivery: Delivery,
    secret: Arc<str>,
}

pub fn create_app(service: ExecService, delivery: Delivery, secret: impl Into<String>) -> Router {
    let state = AppState {
        service: Arc::new(service),
        delivery,
        secret: secret.into().into(),
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/", post(webhook))
        .route("/push", post(push))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(app: Router, addr: std::net::SocketAddr) -> std::io::Result<()> {
    info!("Starting submission frontend on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

/// Webhook endpoint: authenticates the shared secret, extracts the command
/// text, and dispatches the run on its own task so a stalled run cannot
/// block the webhook.
async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(update): Json<Update>,
) -> StatusCode {
    let provided = headers
        .get(SECRET_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if !secret_matches(provided, &state.secret) {
        info!("rejected webhook call with bad secret");
        return StatusCode::UNAUTHORIZED;
    }

    let Some(message) = update.message else {
        return StatusCode::OK;
    };
    let Some(text) = message.text else {
        return StatusCode::OK;
    };
    let Some(source) = text.strip_prefix(RUN_COMMAND) else {
        return StatusCode::OK;
    };

    let reply = ReplyTarget {
        chat_id: message.chat.id,
        message_id: message.message_id,
    };
    let source = source.trim().to_string();
    if source.is_empty() {
        let delivery = state.delivery.clone();
        tokio::spawn(async move { delivery.deliver(reply, EMPTY_SOURCE_PROMPT).await });
        return StatusCode::OK;
    }

    spawn_run(&state, source, reply);
    StatusCode::OK
}

/// Queue-consumer endpoint: unwraps a Pub/Sub-style push envelope
/// (`{"message": {"data": base64(job)}}`) and dispatches the job.
async fn push(State(state): State<AppState>, Json(envelope): Json<Value>) -> StatusCode {
    let Some(data) = envelope
        .get("message")
        .and_then(|message| message.get("data"))
        .and_then(|data| data.as_str())
    else {
        info!("received push without a message payload");
        return StatusCode::BAD_REQUEST;
    };

    let decoded = match base64::engine::general_purpose::STANDARD.decode(data) {
        Ok(bytes) => bytes,
        Err(err) => {
            info!(error = %err, "push payload is not base64");
            return StatusCode::BAD_REQUEST;
        }
    };
    let job: Job = match serde_json::from_slice(&decoded) {
        Ok(job) => job,
        Err(err) => {
            info!(error = %err, "push payload is not a job");
            return StatusCode::BAD_REQUEST;
        }
    };

    let reply = ReplyTarget {
        chat_id: job.chat_id,
        message_id: job.message_id,
    };
    spawn_run(&state, job.source, reply);
    StatusCode::OK
}

fn spawn_run(state: &AppState, source: String, reply: ReplyTarget) {
    let service = state.service.clone();
    let delivery = state.delivery.clone();
    tokio::spawn(async move {
        let submission = Submission::new(source, format!("chat:{}", reply.chat_id));
        let delivered = service.run(submission).await;
        delivery.deliver(reply, delivered.as_text()).await;
    });
}

/// Constant-time secret comparison; an absent or empty secret never matches.
fn secret_matches(provided: &str, expected: &str) -> bool {
    if provided.is_empty() || expected.is_empty() {
        return false;
    }
    ring::constant_time::verify_slices_are_equal(provided.as_bytes(), expected.as_bytes()).is_ok()
}
