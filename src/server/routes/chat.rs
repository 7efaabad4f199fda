use std::sync::Arc;

use anyhow::Result;
use hyper::{Body, Request, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::database::{Visitor, SENDER_ADMIN, SENDER_VISITOR};
use crate::mail::welcome_email;
use crate::server::routes::{error_response, json_response, query_param, read_json_body};
use crate::server::AppState;
use crate::utils::generate_chat_key;

#[derive(Debug, Deserialize)]
struct PostMessageRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    chat_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AdminReplyRequest {
    #[serde(default)]
    chat_key: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MarkReadRequest {
    #[serde(default)]
    chat_key: Option<String>,
}

/// Handler for POST /api/message - a visitor sends a chat message.
///
/// A missing or unknown chat key starts a new thread: the visitor is created
/// with a fresh key and is welcomed by email. Welcome delivery failures are
/// logged but never fail the request.
pub async fn post_message(req: Request<Body>, state: Arc<AppState>) -> Result<Response<Body>> {
    let body: PostMessageRequest = match read_json_body(req).await {
        Ok(body) => body,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "Invalid request body"),
    };

    let (Some(email), Some(message)) = (body.email.as_deref(), body.message.as_deref()) else {
        return error_response(StatusCode::BAD_REQUEST, "Email and message are required.");
    };
    if email.is_empty() || message.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Email and message are required.");
    }

    let existing = match body.chat_key.as_deref() {
        Some(chat_key) => state.db_client.find_visitor_by_chat_key(chat_key).await?,
        None => None,
    };

    let visitor = match existing {
        Some(visitor) => visitor,
        None => {
            let visitor = create_visitor(&state, body.name.as_deref(), email).await?;
            send_welcome(&state, &visitor).await;
            visitor
        }
    };

    state
        .db_client
        .insert_chat_message(visitor.id, SENDER_VISITOR, message, false)
        .await?;

    json_response(
        StatusCode::CREATED,
        &json!({ "success": true, "chat_key": visitor.chat_key }),
    )
}

async fn create_visitor(
    state: &AppState,
    name: Option<&str>,
    email: &str,
) -> Result<Visitor> {
    // Chat keys have ~2^42 possible values; retry the unlikely collision a
    // few times before giving up.
    for _ in 0..5 {
        let chat_key = generate_chat_key();
        if state
            .db_client
            .find_visitor_by_chat_key(&chat_key)
            .await?
            .is_none()
        {
            info!("Creating visitor with chat key {}", chat_key);
            return state.db_client.create_visitor(&chat_key, name, email).await;
        }
    }

    Err(anyhow::anyhow!("Could not allocate a unique chat key"))
}

async fn send_welcome(state: &AppState, visitor: &Visitor) {
    let Some(mailer) = &state.mailer else {
        warn!("Mail disabled; skipping welcome email for {}", visitor.chat_key);
        return;
    };

    let (subject, text, html) = welcome_email(&visitor.chat_key, &state.env_config.site_name);
    match mailer
        .send(&visitor.email, &subject, &text, Some(&html))
        .await
    {
        Ok(()) => {
            if let Err(e) = state
                .db_client
                .insert_mail(visitor.id, SENDER_ADMIN, &subject, &text, Some(&html))
                .await
            {
                warn!("Failed to record welcome email: {:#}", e);
            }
        }
        Err(e) => warn!("Failed to send welcome email: {:#}", e),
    }
}

/// Handler for GET /api/message?chat_key= - a visitor's thread, oldest first.
pub async fn get_thread(req: Request<Body>, state: Arc<AppState>) -> Result<Response<Body>> {
    let Some(chat_key) = query_param(&req, "chat_key") else {
        return error_response(StatusCode::BAD_REQUEST, "chat_key is required");
    };

    let Some(visitor) = state.db_client.find_visitor_by_chat_key(&chat_key).await? else {
        return error_response(StatusCode::NOT_FOUND, "visitor not found");
    };

    let messages = state.db_client.list_chat_messages(visitor.id).await?;
    json_response(StatusCode::OK, &json!({ "communications": messages }))
}

/// Handler for GET /api/visitor?chat_key= - resume a chat from its key.
pub async fn get_visitor(req: Request<Body>, state: Arc<AppState>) -> Result<Response<Body>> {
    let Some(chat_key) = query_param(&req, "chat_key") else {
        return error_response(StatusCode::BAD_REQUEST, "chat_key is required");
    };

    let Some(visitor) = state.db_client.find_visitor_by_chat_key(&chat_key).await? else {
        return error_response(StatusCode::NOT_FOUND, "visitor not found");
    };

    json_response(
        StatusCode::OK,
        &json!({ "name": visitor.name, "email": visitor.email }),
    )
}

/// Handler for GET /api/admin/visitors - all visitors, unread threads first.
pub async fn list_visitors(state: Arc<AppState>) -> Result<Response<Body>> {
    let visitors = state.db_client.list_visitor_summaries().await?;
    json_response(StatusCode::OK, &json!({ "visitors": visitors }))
}

/// Handler for POST /api/admin/message - admin replies in a visitor's thread.
pub async fn admin_reply(req: Request<Body>, state: Arc<AppState>) -> Result<Response<Body>> {
    let body: AdminReplyRequest = match read_json_body(req).await {
        Ok(body) => body,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "Invalid request body"),
    };

    let (Some(chat_key), Some(message)) = (body.chat_key.as_deref(), body.message.as_deref())
    else {
        return error_response(StatusCode::BAD_REQUEST, "chat_key and message are required.");
    };

    let Some(visitor) = state.db_client.find_visitor_by_chat_key(chat_key).await? else {
        return error_response(StatusCode::NOT_FOUND, "visitor not found");
    };

    // Admin replies are born read; the unread flag tracks the admin's inbox.
    state
        .db_client
        .insert_chat_message(visitor.id, SENDER_ADMIN, message, true)
        .await?;

    json_response(StatusCode::CREATED, &json!({ "success": true }))
}

/// Handler for GET /api/admin/message/count - total chat message count.
pub async fn message_count(state: Arc<AppState>) -> Result<Response<Body>> {
    let count = state.db_client.count_chat_messages().await?;
    json_response(StatusCode::OK, &json!({ "count": count }))
}

/// Handler for POST /api/admin/message/read - mark a thread as read.
pub async fn mark_read(req: Request<Body>, state: Arc<AppState>) -> Result<Response<Body>> {
    let body: MarkReadRequest = match read_json_body(req).await {
        Ok(body) => body,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "Invalid request body"),
    };

    let Some(chat_key) = body.chat_key.as_deref() else {
        return error_response(StatusCode::BAD_REQUEST, "chat_key is required");
    };

    let Some(visitor) = state.db_client.find_visitor_by_chat_key(chat_key).await? else {
        return error_response(StatusCode::NOT_FOUND, "visitor not found");
    };

    let updated = state.db_client.mark_thread_read(visitor.id).await?;
    json_response(StatusCode::OK, &json!({ "updated": updated }))
}
