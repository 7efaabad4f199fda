use anyhow::Result;
use hyper::{Body, Request, Response, StatusCode};
use serde::Serialize;

pub mod auth;
pub mod chat;
pub mod mail;
pub mod posts;

/// Builds a JSON response from any serializable body.
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Result<Response<Body>> {
    let json = serde_json::to_string(body)?;

    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Body::from(json))
        .unwrap())
}

/// Builds the error envelope used by every handler.
pub fn error_response(status: StatusCode, message: &str) -> Result<Response<Body>> {
    json_response(status, &serde_json::json!({ "error": message }))
}

/// Extracts a query-string parameter from the request URI.
pub fn query_param(req: &Request<Body>, name: &str) -> Option<String> {
    let query = req.uri().query()?;
    for pair in query.split('&') {
        let mut parts = pair.splitn(2, '=');
        if parts.next() == Some(name) {
            return Some(parts.next().unwrap_or("").to_string());
        }
    }
    None
}

/// Reads and deserializes a JSON request body.
pub async fn read_json_body<T: serde::de::DeserializeOwned>(req: Request<Body>) -> Result<T> {
    let body_bytes = hyper::body::to_bytes(req.into_body()).await?;
    serde_json::from_slice(&body_bytes).map_err(|e| anyhow::anyhow!("Invalid request body: {}", e))
}
