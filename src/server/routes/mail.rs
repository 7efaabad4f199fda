use std::sync::Arc;

use anyhow::Result;
use hyper::{Body, Request, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::database::SENDER_ADMIN;
use crate::server::routes::{error_response, json_response, query_param, read_json_body};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
struct SendMailRequest {
    #[serde(default)]
    chat_key: Option<String>,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    html: Option<String>,
}

/// Handler for GET /api/admin/mail?chat_key= - a visitor's mail history.
pub async fn mail_history(req: Request<Body>, state: Arc<AppState>) -> Result<Response<Body>> {
    let Some(chat_key) = query_param(&req, "chat_key") else {
        return error_response(StatusCode::BAD_REQUEST, "chat_key is required");
    };

    let Some(visitor) = state.db_client.find_visitor_by_chat_key(&chat_key).await? else {
        return error_response(StatusCode::NOT_FOUND, "visitor not found");
    };

    let mail = state.db_client.list_mail(visitor.id).await?;
    json_response(StatusCode::OK, &json!({ "mail": mail }))
}

/// Handler for POST /api/admin/mail - send a one-off email to a visitor and
/// record it in their mail history.
pub async fn send_mail(req: Request<Body>, state: Arc<AppState>) -> Result<Response<Body>> {
    let body: SendMailRequest = match read_json_body(req).await {
        Ok(body) => body,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "Invalid request body"),
    };

    let (Some(chat_key), Some(subject), Some(text)) = (
        body.chat_key.as_deref(),
        body.subject.as_deref(),
        body.text.as_deref(),
    ) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "chat_key, subject and text are required.",
        );
    };

    let Some(visitor) = state.db_client.find_visitor_by_chat_key(chat_key).await? else {
        return error_response(StatusCode::NOT_FOUND, "visitor not found");
    };

    let Some(mailer) = &state.mailer else {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "mail is not configured");
    };

    if let Err(e) = mailer
        .send(&visitor.email, subject, text, body.html.as_deref())
        .await
    {
        warn!("Mail delivery to {} failed: {:#}", visitor.email, e);
        return error_response(StatusCode::BAD_GATEWAY, "failed to send mail");
    }

    state
        .db_client
        .insert_mail(visitor.id, SENDER_ADMIN, subject, text, body.html.as_deref())
        .await?;

    json_response(StatusCode::CREATED, &json!({ "success": true }))
}

/// Handler for GET /api/admin/mail/visitors - recipients for a broadcast.
pub async fn mail_visitors(state: Arc<AppState>) -> Result<Response<Body>> {
    let visitors = state.db_client.list_visitors().await?;
    json_response(StatusCode::OK, &json!({ "visitors": visitors }))
}

/// Handler for POST /api/admin/mail/latest-post - email the latest post's
/// preview to every visitor on record. Per-recipient failures are counted,
/// not fatal.
pub async fn broadcast_latest_post(state: Arc<AppState>) -> Result<Response<Body>> {
    let Some(post) = state.posts.latest()? else {
        return error_response(StatusCode::NOT_FOUND, "no posts available");
    };

    let Some(mailer) = &state.mailer else {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "mail is not configured");
    };

    let subject = format!("New post: {}", post.meta.title);
    let text = format!(
        "{}\n\nRead it at {}/blog/{}",
        post.meta.description,
        state.env_config.base_url.trim_end_matches('/'),
        post.meta.slug
    );
    let html = state.posts.email_preview(&state.env_config.base_url)?;

    let visitors = state.db_client.list_visitors().await?;
    let mut sent = 0u64;
    let mut failed = 0u64;

    for visitor in &visitors {
        match mailer
            .send(&visitor.email, &subject, &text, Some(&html))
            .await
        {
            Ok(()) => {
                sent += 1;
                if let Err(e) = state
                    .db_client
                    .insert_mail(visitor.id, SENDER_ADMIN, &subject, &text, Some(&html))
                    .await
                {
                    warn!("Failed to record broadcast for {}: {:#}", visitor.chat_key, e);
                }
            }
            Err(e) => {
                failed += 1;
                warn!("Broadcast to {} failed: {:#}", visitor.email, e);
            }
        }
    }

    info!(
        "Broadcast '{}' finished: {} sent, {} failed",
        subject, sent, failed
    );

    json_response(StatusCode::OK, &json!({ "sent": sent, "failed": failed }))
}
