use std::sync::Arc;

use anyhow::Result;
use hyper::{Body, Request, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::auth::{generate_session_token, verify_session_token};
use crate::server::routes::{error_response, json_response, query_param, read_json_body};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
struct SignInRequest {
    email: String,
    key: String,
}

/// Handler for POST /api/admin/auth - exchanges admin credentials for an
/// opaque session token.
pub async fn sign_in(req: Request<Body>, state: Arc<AppState>) -> Result<Response<Body>> {
    let body: SignInRequest = match read_json_body(req).await {
        Ok(body) => body,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "Email and key are required."),
    };

    if body.email.is_empty() || body.key.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Email and key are required.");
    }

    if body.email == state.env_config.admin_email && body.key == state.env_config.admin_key {
        info!("Admin signed in");
        let session = generate_session_token(&state.env_config.session_secret);
        return json_response(StatusCode::OK, &json!({ "session": session }));
    }

    warn!("Rejected admin sign-in attempt for {}", crate::utils::sanitize_for_logging(&body.email));
    error_response(StatusCode::UNAUTHORIZED, "invalid authentication")
}

/// Handler for GET /api/admin/auth?session= - reports whether a session token
/// is still active. Used by the admin UI to decide when to re-authenticate.
pub async fn check_session(req: Request<Body>, state: Arc<AppState>) -> Result<Response<Body>> {
    let Some(session) = query_param(&req, "session") else {
        return error_response(StatusCode::BAD_REQUEST, "session is required");
    };

    if verify_session_token(&state.env_config.session_secret, &session) {
        json_response(StatusCode::OK, &json!({ "response": "session is active" }))
    } else {
        json_response(
            StatusCode::UNAUTHORIZED,
            &json!({ "response": "session expired" }),
        )
    }
}
