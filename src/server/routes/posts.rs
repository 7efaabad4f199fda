use std::sync::Arc;

use anyhow::Result;
use hyper::{Body, Response, StatusCode};
use serde_json::json;

use crate::server::routes::{error_response, json_response};
use crate::server::AppState;

/// Handler for GET /api/posts - post metadata, newest first.
pub async fn list_posts(state: Arc<AppState>) -> Result<Response<Body>> {
    let posts = state.posts.load_all()?;
    let metas: Vec<_> = posts.into_iter().map(|p| p.meta).collect();
    json_response(StatusCode::OK, &json!({ "posts": metas }))
}

/// Handler for GET /api/posts/{slug} - one post with its raw Markdown body.
pub async fn get_post(slug: &str, state: Arc<AppState>) -> Result<Response<Body>> {
    match state.posts.find_by_slug(slug)? {
        Some(post) => json_response(StatusCode::OK, &post),
        None => error_response(StatusCode::NOT_FOUND, "post not found"),
    }
}
