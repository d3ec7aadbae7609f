//! `POST /chat`: run an agent and stream its events.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use helixrun_core::RunRequest;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::server::AppState;
use crate::transport;

/// Request body. `agent_id` and `message` are required and non-blank.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub agent_id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

fn bad_request(message: impl Into<String>) -> Response {
    let message = message.into();
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

pub async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let Json(body) = match payload {
        Ok(body) => body,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "rejected chat request");
            return bad_request(rejection.body_text());
        }
    };
    if body.agent_id.trim().is_empty() || body.message.trim().is_empty() {
        return bad_request("agent_id and message are required");
    }

    let mut request = RunRequest::new(body.agent_id, body.message);
    request.user_id = body.user_id;
    request.session_id = body.session_id;
    let agent_id = request.agent_id.clone();

    match state.engine.run(request, state.shutdown.child_token()).await {
        Ok(events) => {
            info!(
                request_id = %events.request_id(),
                agent_id = %agent_id,
                session = %events.session(),
                "chat stream opened"
            );
            let request_id = events.request_id().to_string();
            transport::frames(request_id, events).into_response()
        }
        Err(err) => {
            warn!(agent_id = %agent_id, error = %err, "chat run failed to start");
            transport::single_error(&err.to_string()).into_response()
        }
    }
}
