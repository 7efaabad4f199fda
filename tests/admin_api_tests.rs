mod admin_api_tests {
    use std::sync::Arc;
    use std::sync::Mutex;

    use anyhow::Result;
    use async_trait::async_trait;
    use hyper::{Body, Request, Response, StatusCode};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    use plumehost::auth::generate_session_token;
    use plumehost::config::env_config::EnvConfig;
    use plumehost::content::PostStore;
    use plumehost::database::DatabaseClient;
    use plumehost::mail::Mailer;
    use plumehost::server::routes::{auth, chat, mail};
    use plumehost::server::{handle_request, AppState};

    struct RecordingMailer {
        sent: Mutex<Vec<(String, String)>>,
    }

    impl RecordingMailer {
        fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
            }
        }

        fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(
            &self,
            to: &str,
            subject: &str,
            _text: &str,
            _html: Option<&str>,
        ) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), subject.to_string()));
            Ok(())
        }
    }

    const SESSION_SECRET: &str = "test-secret";

    fn test_env_config(posts_dir: &str) -> EnvConfig {
        EnvConfig {
            log_level: "info".to_string(),
            http_port: 0,
            site_name: "Test Site".to_string(),
            base_url: "https://example.com".to_string(),
            admin_email: "admin@example.com".to_string(),
            admin_key: "correct-horse".to_string(),
            session_secret: SESSION_SECRET.to_string(),
            db_url: String::new(),
            posts_dir: posts_dir.to_string(),
            smtp: None,
        }
    }

    async fn create_test_env() -> (TempDir, Arc<AppState>, Arc<RecordingMailer>) {
        let tmp = TempDir::new().unwrap();
        let db_url = format!("sqlite://{}/test.db", tmp.path().display());
        let db_client = DatabaseClient::new(&db_url).await.unwrap();
        let mailer = Arc::new(RecordingMailer::new());

        let posts_dir = tmp.path().join("posts");
        std::fs::create_dir_all(&posts_dir).unwrap();

        let state = Arc::new(AppState {
            env_config: test_env_config(posts_dir.to_str().unwrap()),
            db_client,
            mailer: Some(mailer.clone() as Arc<dyn Mailer>),
            posts: PostStore::new(posts_dir),
        });

        (tmp, state, mailer)
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn response_to_json(response: Response<Body>) -> Value {
        let body_bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        serde_json::from_slice(&body_bytes).unwrap()
    }

    async fn seed_visitor(state: &Arc<AppState>, email: &str, message: &str) -> String {
        let req = json_request(
            "POST",
            "/api/message",
            json!({ "email": email, "message": message }),
        );
        let resp = chat::post_message(req, state.clone()).await.unwrap();
        response_to_json(resp).await["chat_key"]
            .as_str()
            .unwrap()
            .to_string()
    }

    fn write_post(dir: &std::path::Path, slug: &str, date: &str) {
        let source = format!(
            "---\ntitle: Post {slug}\ndescription: About {slug}\nslug: {slug}\npublishedAt: {date}\ntags:\n  - travel\n---\n\nBody of {slug}.\n",
        );
        std::fs::write(dir.join(format!("{}.md", slug)), source).unwrap();
    }

    #[tokio::test]
    async fn sign_in_issues_a_working_session() {
        let (_tmp, state, _mailer) = create_test_env().await;

        let req = json_request(
            "POST",
            "/api/admin/auth",
            json!({ "email": "admin@example.com", "key": "correct-horse" }),
        );
        let resp = auth::sign_in(req, state.clone()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let session = response_to_json(resp).await["session"]
            .as_str()
            .unwrap()
            .to_string();

        // The issued token passes the session check endpoint
        let req = Request::builder()
            .method("GET")
            .uri(format!("/api/admin/auth?session={}", session))
            .body(Body::empty())
            .unwrap();
        let resp = auth::check_session(req, state.clone()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn wrong_credentials_are_rejected() {
        let (_tmp, state, _mailer) = create_test_env().await;

        let req = json_request(
            "POST",
            "/api/admin/auth",
            json!({ "email": "admin@example.com", "key": "wrong" }),
        );
        let resp = auth::sign_in(req, state.clone()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = json_request("POST", "/api/admin/auth", json!({ "email": "a@b.c" }));
        let resp = auth::sign_in(req, state.clone()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn stale_session_check_returns_unauthorized() {
        let (_tmp, state, _mailer) = create_test_env().await;

        let req = Request::builder()
            .method("GET")
            .uri("/api/admin/auth?session=garbage")
            .body(Body::empty())
            .unwrap();
        let resp = auth::check_session(req, state.clone()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn admin_routes_require_a_bearer_token() {
        let (_tmp, state, _mailer) = create_test_env().await;

        // No Authorization header
        let req = Request::builder()
            .method("GET")
            .uri("/api/admin/visitors")
            .body(Body::empty())
            .unwrap();
        let resp = handle_request(req, state.clone()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        // Tampered token
        let req = Request::builder()
            .method("GET")
            .uri("/api/admin/visitors")
            .header("Authorization", "Bearer not-a-real-token")
            .body(Body::empty())
            .unwrap();
        let resp = handle_request(req, state.clone()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        // Valid token
        let token = generate_session_token(SESSION_SECRET);
        let req = Request::builder()
            .method("GET")
            .uri("/api/admin/visitors")
            .header("Authorization", format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        let resp = handle_request(req, state.clone()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn token_signed_with_another_secret_is_rejected() {
        let (_tmp, state, _mailer) = create_test_env().await;

        let token = generate_session_token("other-secret");
        let req = Request::builder()
            .method("GET")
            .uri("/api/admin/message/count")
            .header("Authorization", format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        let resp = handle_request(req, state.clone()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn reply_marks_thread_activity_and_counts() {
        let (_tmp, state, _mailer) = create_test_env().await;
        let chat_key = seed_visitor(&state, "ada@example.com", "hello").await;

        let req = json_request(
            "POST",
            "/api/admin/message",
            json!({ "chat_key": chat_key, "message": "hi Ada" }),
        );
        let resp = chat::admin_reply(req, state.clone()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let resp = chat::message_count(state.clone()).await.unwrap();
        let body = response_to_json(resp).await;
        assert_eq!(body["count"], json!(2));

        // Unknown visitor
        let req = json_request(
            "POST",
            "/api/admin/message",
            json!({ "chat_key": "nop-nop-nop", "message": "hi" }),
        );
        let resp = chat::admin_reply(req, state.clone()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unread_threads_sort_first_and_can_be_marked_read() {
        let (_tmp, state, _mailer) = create_test_env().await;

        let unread_key = seed_visitor(&state, "unread@example.com", "new message").await;
        let read_key = seed_visitor(&state, "read@example.com", "old message").await;

        // Clear the second visitor's thread
        let req = json_request("POST", "/api/admin/message/read", json!({ "chat_key": read_key }));
        let resp = chat::mark_read(req, state.clone()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(response_to_json(resp).await["updated"], json!(1));

        let resp = chat::list_visitors(state.clone()).await.unwrap();
        let body = response_to_json(resp).await;
        let visitors = body["visitors"].as_array().unwrap();
        assert_eq!(visitors.len(), 2);
        assert_eq!(visitors[0]["chat_key"].as_str().unwrap(), unread_key);
        assert_eq!(visitors[0]["read"], json!(false));
        assert_eq!(visitors[1]["read"], json!(true));

        // Marking again touches nothing
        let req = json_request(
            "POST",
            "/api/admin/message/read",
            json!({ "chat_key": visitors[1]["chat_key"] }),
        );
        let resp = chat::mark_read(req, state.clone()).await.unwrap();
        assert_eq!(response_to_json(resp).await["updated"], json!(0));
    }

    #[tokio::test]
    async fn direct_mail_is_sent_and_recorded() {
        let (_tmp, state, mailer) = create_test_env().await;
        let chat_key = seed_visitor(&state, "ada@example.com", "hello").await;
        let welcome_count = mailer.sent().len();

        let req = json_request(
            "POST",
            "/api/admin/mail",
            json!({
                "chat_key": chat_key,
                "subject": "Follow-up",
                "text": "Thanks again!",
                "html": "<p>Thanks again!</p>"
            }),
        );
        let resp = mail::send_mail(req, state.clone()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let sent = mailer.sent();
        assert_eq!(sent.len(), welcome_count + 1);
        assert_eq!(sent.last().unwrap().1, "Follow-up");

        let req = Request::builder()
            .method("GET")
            .uri(format!("/api/admin/mail?chat_key={}", chat_key))
            .body(Body::empty())
            .unwrap();
        let resp = mail::mail_history(req, state.clone()).await.unwrap();
        let body = response_to_json(resp).await;
        let history = body["mail"].as_array().unwrap();
        assert_eq!(
            history.last().unwrap()["subject"],
            json!("Follow-up")
        );
    }

    #[tokio::test]
    async fn latest_post_broadcast_reaches_every_visitor() {
        let (tmp, state, mailer) = create_test_env().await;

        seed_visitor(&state, "one@example.com", "hi").await;
        seed_visitor(&state, "two@example.com", "hi").await;
        let welcome_count = mailer.sent().len();

        let posts_dir = tmp.path().join("posts");
        write_post(&posts_dir, "older", "2024-01-01");
        write_post(&posts_dir, "newer", "2024-06-01");

        let resp = mail::broadcast_latest_post(state.clone()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = response_to_json(resp).await;
        assert_eq!(body["sent"], json!(2));
        assert_eq!(body["failed"], json!(0));

        let sent = mailer.sent();
        assert_eq!(sent.len(), welcome_count + 2);
        // The newest post is the one announced
        assert!(sent.last().unwrap().1.contains("newer"));
    }

    #[tokio::test]
    async fn broadcast_without_posts_is_a_404() {
        let (_tmp, state, _mailer) = create_test_env().await;
        seed_visitor(&state, "one@example.com", "hi").await;

        let resp = mail::broadcast_latest_post(state.clone()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
