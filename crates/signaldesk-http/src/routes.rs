//! REST handlers for the agent console.
//!
//! Every response uses the same envelope: `{success, data?, error?}`.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use signaldesk_core::access::{AccessError, Role};
use signaldesk_core::chat::{ConversationStatus, Priority};
use signaldesk_core::managers::ConsoleError;

use crate::HttpSharedState;

type ApiResult = (StatusCode, Json<InvokeResponse>);

#[derive(Serialize, Deserialize)]
pub struct InvokeResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn ok<T: Serialize>(data: T) -> ApiResult {
    (
        StatusCode::OK,
        Json(InvokeResponse {
            success: true,
            data: Some(serde_json::to_value(data).unwrap_or_default()),
            error: None,
        }),
    )
}

fn fail(status: StatusCode, error: impl Into<String>) -> ApiResult {
    (
        status,
        Json(InvokeResponse {
            success: false,
            data: None,
            error: Some(error.into()),
        }),
    )
}

fn console_error(e: ConsoleError) -> ApiResult {
    let status = match e {
        ConsoleError::NotFound(_) => StatusCode::NOT_FOUND,
        ConsoleError::EmptyMessage => StatusCode::BAD_REQUEST,
        ConsoleError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    fail(status, e.to_string())
}

fn required_str<'a>(args: &'a serde_json::Value, name: &str) -> Result<&'a str, ApiResult> {
    args.get(name).and_then(|v| v.as_str()).ok_or_else(|| {
        fail(
            StatusCode::BAD_REQUEST,
            format!("Missing required argument: {name}"),
        )
    })
}

fn required<T: serde::de::DeserializeOwned>(
    args: &serde_json::Value,
    name: &str,
) -> Result<T, ApiResult> {
    let raw = required_str(args, name)?;
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .map_err(|_| fail(StatusCode::BAD_REQUEST, format!("Invalid {name}: {raw}")))
}

// ============================================================================
// AUTH
// ============================================================================

/// POST /api/auth/mpin `{role, mpin}`
pub async fn auth_mpin(
    State(state): State<Arc<HttpSharedState>>,
    Json(args): Json<serde_json::Value>,
) -> ApiResult {
    let role: Role = match required_str(&args, "role") {
        Ok(raw) => match raw.parse() {
            Ok(role) => role,
            Err(e) => return fail(StatusCode::BAD_REQUEST, e),
        },
        Err(resp) => return resp,
    };
    let mpin = match required_str(&args, "mpin") {
        Ok(pin) => pin,
        Err(resp) => return resp,
    };

    match state.context.pin_gate.authenticate(role, mpin).await {
        Ok(redirect) => {
            let token = state.issue_token(role);
            ok(serde_json::json!({ "token": token, "redirect": redirect }))
        }
        Err(e @ AccessError::IncompletePin) => fail(StatusCode::BAD_REQUEST, e.to_string()),
        Err(e @ AccessError::InvalidPin) => fail(StatusCode::UNAUTHORIZED, e.to_string()),
        Err(e @ AccessError::Store(_)) => {
            fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// POST /api/auth/logout
pub async fn logout(State(state): State<Arc<HttpSharedState>>, headers: HeaderMap) -> ApiResult {
    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let Some(token) = token else {
        return fail(StatusCode::BAD_REQUEST, "Logout requires a bearer token");
    };

    if let Some(role) = state.token_role(token) {
        if let Err(e) = state.context.pin_gate.lock(role) {
            log::warn!("Failed to clear {} unlock: {}", role, e);
        }
    }
    ok(state.revoke_token(token))
}

// ============================================================================
// CONVERSATIONS
// ============================================================================

#[derive(Deserialize, Default)]
pub struct ListQuery {
    status: Option<ConversationStatus>,
}

/// GET /api/conversations[?status=active|closed]
pub async fn list_conversations(
    State(state): State<Arc<HttpSharedState>>,
    Query(query): Query<ListQuery>,
) -> ApiResult {
    let mut conversations = state.context.console.list();
    if let Some(status) = query.status {
        conversations.retain(|c| c.status == status);
    }
    ok(conversations)
}

/// GET /api/conversations/{id}
pub async fn get_conversation(
    State(state): State<Arc<HttpSharedState>>,
    Path(chat_id): Path<String>,
) -> ApiResult {
    match state.context.console.conversation(&chat_id) {
        Ok(conv) => ok(conv),
        Err(e) => console_error(e),
    }
}

/// POST /api/conversations/{id}/messages `{text}`
pub async fn post_message(
    State(state): State<Arc<HttpSharedState>>,
    Path(chat_id): Path<String>,
    Json(args): Json<serde_json::Value>,
) -> ApiResult {
    let text = match required_str(&args, "text") {
        Ok(text) => text,
        Err(resp) => return resp,
    };
    match state.context.console.reply(&chat_id, text) {
        Ok(message) => ok(message),
        Err(e) => console_error(e),
    }
}

/// POST /api/conversations/{id}/status `{status}`
pub async fn set_status(
    State(state): State<Arc<HttpSharedState>>,
    Path(chat_id): Path<String>,
    Json(args): Json<serde_json::Value>,
) -> ApiResult {
    let status: ConversationStatus = match required(&args, "status") {
        Ok(status) => status,
        Err(resp) => return resp,
    };
    match state.context.console.set_status(&chat_id, status) {
        Ok(conv) => ok(conv),
        Err(e) => console_error(e),
    }
}

/// POST /api/conversations/{id}/priority `{priority}`
pub async fn set_priority(
    State(state): State<Arc<HttpSharedState>>,
    Path(chat_id): Path<String>,
    Json(args): Json<serde_json::Value>,
) -> ApiResult {
    let priority: Priority = match required(&args, "priority") {
        Ok(priority) => priority,
        Err(resp) => return resp,
    };
    match state.context.console.set_priority(&chat_id, priority) {
        Ok(conv) => ok(conv),
        Err(e) => console_error(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoke_response_serialization() {
        let (status, Json(response)) = ok(serde_json::json!({"key": "value"}));
        assert_eq!(status, StatusCode::OK);
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"success\":true"));
        assert!(json.contains("\"key\":\"value\""));
        assert!(!json.contains("error"));
    }

    #[test]
    fn invoke_response_error_serialization() {
        let (status, Json(response)) = fail(StatusCode::NOT_FOUND, "gone");
        assert_eq!(status, StatusCode::NOT_FOUND);
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"success\":false"));
        assert!(!json.contains("data"));
    }

    #[test]
    fn console_errors_map_to_status_codes() {
        assert_eq!(
            console_error(ConsoleError::NotFound("c1".into())).0,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            console_error(ConsoleError::EmptyMessage).0,
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn required_rejects_unknown_variant() {
        let args = serde_json::json!({"priority": "urgent"});
        let err = required::<Priority>(&args, "priority").err().unwrap();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);

        let args = serde_json::json!({"priority": "high"});
        assert_eq!(required::<Priority>(&args, "priority").ok(), Some(Priority::High));
    }
}
