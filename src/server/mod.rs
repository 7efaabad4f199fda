use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use hyper::server::conn::Http;
use hyper::service::service_fn;
use hyper::{Body, Method, Request, Response, StatusCode};
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::auth;
use crate::config::env_config::EnvConfig;
use crate::content::PostStore;
use crate::database::DatabaseClient;
use crate::mail::Mailer;

pub mod routes;

/// Shared state handed to every request handler.
pub struct AppState {
    pub env_config: EnvConfig,
    pub db_client: DatabaseClient,
    pub mailer: Option<Arc<dyn Mailer>>,
    pub posts: PostStore,
}

/// The site's HTTP server.
pub struct SiteServer {
    state: Arc<AppState>,
}

impl SiteServer {
    pub fn new(
        env_config: EnvConfig,
        db_client: DatabaseClient,
        mailer: Option<Arc<dyn Mailer>>,
    ) -> Self {
        let posts = PostStore::new(env_config.posts_dir.clone());
        Self {
            state: Arc::new(AppState {
                env_config,
                db_client,
                mailer,
                posts,
            }),
        }
    }

    pub async fn start(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.state.env_config.http_port).parse::<SocketAddr>()?;
        let listener = TcpListener::bind(addr).await?;
        info!("Starting HTTP server on {}", addr);

        // Accept and serve connections
        loop {
            let (stream, _remote_addr) = match listener.accept().await {
                Ok((stream, addr)) => (stream, addr),
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    continue;
                }
            };

            let state = Arc::clone(&self.state);

            tokio::spawn(async move {
                if let Err(e) = Http::new()
                    .serve_connection(
                        stream,
                        service_fn(move |req| {
                            let state = Arc::clone(&state);
                            async move { handle_request(req, state).await }
                        }),
                    )
                    .await
                {
                    error!("Error serving connection: {}", e);
                }
            });
        }
    }
}

/// Handle an incoming request: health check and public routes pass through,
/// everything under /api/admin/ except the auth endpoints requires a valid
/// bearer session token.
pub async fn handle_request(
    req: Request<Body>,
    state: Arc<AppState>,
) -> Result<Response<Body>, hyper::Error> {
    let path = req.uri().path();

    if path == "/health" || path == "/status" {
        return Ok(Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "application/json")
            .body(Body::from(r#"{"status":"ok"}"#))
            .unwrap());
    }

    if requires_admin_session(path) {
        if let Err(e) = authenticate_request(&req, &state.env_config.session_secret) {
            // Expired, tampered and malformed tokens are deliberately
            // indistinguishable here; deny uniformly.
            debug!("Authentication failed: {}", e);

            return Ok(Response::builder()
                .status(StatusCode::UNAUTHORIZED)
                .header("WWW-Authenticate", "Bearer")
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"error":"Unauthorized"}"#))
                .unwrap());
        }
    }

    match route_request(req, state).await {
        Ok(response) => Ok(response),
        Err(e) => {
            error!("Error handling request: {:#}", e);

            Ok(Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"error":"Internal server error"}"#))
                .unwrap())
        }
    }
}

/// The sign-in and session-check endpoints are the only admin paths reachable
/// without a token.
fn requires_admin_session(path: &str) -> bool {
    path.starts_with("/api/admin/") && path != "/api/admin/auth"
}

/// Authenticate a request from its bearer session token.
fn authenticate_request(req: &Request<Body>, session_secret: &str) -> Result<()> {
    let auth_header = req
        .headers()
        .get("Authorization")
        .ok_or_else(|| anyhow::anyhow!("Missing Authorization header"))?;

    let auth_str = auth_header.to_str()?;
    let token = auth::bearer_token(auth_str)
        .ok_or_else(|| anyhow::anyhow!("Invalid Authorization header format"))?;

    if !auth::verify_session_token(session_secret, token) {
        return Err(anyhow::anyhow!("Invalid or expired session token"));
    }

    Ok(())
}

/// Route a request to the appropriate handler.
async fn route_request(req: Request<Body>, state: Arc<AppState>) -> Result<Response<Body>> {
    let path = req.uri().path().to_string();
    let method = req.method().clone();

    match (&method, path.as_str()) {
        (&Method::GET, "/api/posts") => routes::posts::list_posts(state).await,
        (&Method::GET, path) if path.starts_with("/api/posts/") => {
            let slug = &path["/api/posts/".len()..];
            routes::posts::get_post(slug, state).await
        }

        (&Method::POST, "/api/message") => routes::chat::post_message(req, state).await,
        (&Method::GET, "/api/message") => routes::chat::get_thread(req, state).await,
        (&Method::GET, "/api/visitor") => routes::chat::get_visitor(req, state).await,

        (&Method::POST, "/api/admin/auth") => routes::auth::sign_in(req, state).await,
        (&Method::GET, "/api/admin/auth") => routes::auth::check_session(req, state).await,

        (&Method::GET, "/api/admin/visitors") => routes::chat::list_visitors(state).await,
        (&Method::POST, "/api/admin/message") => routes::chat::admin_reply(req, state).await,
        (&Method::GET, "/api/admin/message/count") => routes::chat::message_count(state).await,
        (&Method::POST, "/api/admin/message/read") => routes::chat::mark_read(req, state).await,

        (&Method::GET, "/api/admin/mail") => routes::mail::mail_history(req, state).await,
        (&Method::POST, "/api/admin/mail") => routes::mail::send_mail(req, state).await,
        (&Method::GET, "/api/admin/mail/visitors") => routes::mail::mail_visitors(state).await,
        (&Method::POST, "/api/admin/mail/latest-post") => {
            routes::mail::broadcast_latest_post(state).await
        }

        _ => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .header("Content-Type", "application/json")
            .body(Body::from(r#"{"error":"Not Found"}"#))
            .unwrap()),
    }
}
