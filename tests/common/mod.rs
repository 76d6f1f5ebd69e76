#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    extract::ConnectInfo,
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use exam_attempt_backend::{
    config::{Config, LogFormat, StorageBackend},
    models::exam::{AccessMode, DisplayMode, Exam},
    routes::{self, RouterLimits},
    store::MemoryAttemptStore,
    AppState,
};
use rust_decimal::Decimal;
use serde_json::{json, Value as JsonValue};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

pub const JWT_SECRET: &str = "test_secret_key";

pub fn test_config() -> Config {
    Config {
        server_address: "127.0.0.1:0".into(),
        storage_backend: StorageBackend::Memory,
        database_url: None,
        jwt_secret: JWT_SECRET.into(),
        public_rps: 10_000,
        admin_rps: 10_000,
        save_interval_seconds: 10,
        save_debounce_ms: 800,
        abandon_after_minutes: 180,
        grading_max_attempts: 5,
        log_format: LogFormat::Text,
        trusted_proxies: Vec::new(),
    }
}

pub struct TestApp {
    pub store: MemoryAttemptStore,
    pub state: AppState,
    pub config: Config,
    router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let store = MemoryAttemptStore::new();
        let state = AppState::new(Arc::new(store.clone()), &config);
        let router = routes::router(
            state.clone(),
            RouterLimits {
                public_rps: config.public_rps,
                admin_rps: config.admin_rps,
            },
        );
        Self {
            store,
            state,
            config,
            router,
        }
    }

    pub async fn send(&self, req: Request<Body>) -> (StatusCode, JsonValue) {
        let resp = self.router.clone().oneshot(req).await.expect("router response");
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.expect("body");
        let body = if bytes.is_empty() {
            JsonValue::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, body)
    }

    pub async fn call(&self, method: Method, uri: &str, body: Option<JsonValue>) -> (StatusCode, JsonValue) {
        self.send(json_request(method, uri, body)).await
    }

    pub async fn seed_exam(&self, access_mode: AccessMode) -> Exam {
        let exam = exam(access_mode);
        self.store.put_exam(exam.clone()).await;
        exam
    }

    pub async fn start_open_attempt(&self, exam_id: Uuid) -> Uuid {
        let (status, body) = self
            .call(
                Method::POST,
                &format!("/api/public/exams/{}/attempts", exam_id),
                Some(json!({ "access": { "mode": "open", "student_id": Uuid::new_v4() } })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["attempt_id"].as_str().unwrap().parse().unwrap()
    }

    pub async fn get_state(&self, attempt_id: Uuid) -> (StatusCode, JsonValue) {
        self.call(Method::GET, &format!("/api/public/attempts/{}", attempt_id), None)
            .await
    }

    pub async fn save(&self, attempt_id: Uuid, answers: JsonValue, expected_version: i64) -> (StatusCode, JsonValue) {
        self.call(
            Method::PUT,
            &format!("/api/public/attempts/{}/answers", attempt_id),
            Some(json!({
                "answers": answers,
                "auto_save_data": { "current_question": 0 },
                "expected_version": expected_version
            })),
        )
        .await
    }

    pub async fn submit(&self, attempt_id: Uuid) -> (StatusCode, JsonValue) {
        self.call(
            Method::POST,
            &format!("/api/public/attempts/{}/submit", attempt_id),
            None,
        )
        .await
    }
}

pub fn json_request(method: Method, uri: &str, body: Option<JsonValue>) -> Request<Body> {
    let builder = Request::builder().method(method).uri(uri);
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Attaches the TCP peer address the server would record from the socket.
pub fn from_peer(mut req: Request<Body>, peer: &str) -> Request<Body> {
    let addr = SocketAddr::new(peer.parse().expect("peer ip"), 40_000);
    req.extensions_mut().insert(ConnectInfo(addr));
    req
}

pub fn exam(access_mode: AccessMode) -> Exam {
    Exam {
        id: Uuid::new_v4(),
        title: "Physics midterm".into(),
        description: Some("Chapters 1-4".into()),
        duration_minutes: 60,
        display_mode: DisplayMode::AllAtOnce,
        shuffle_questions: false,
        access_mode,
        allowed_ip_ranges: Vec::new(),
        passing_score: Decimal::from(50),
        is_active: true,
        questions: json!([
            {"id": "q1", "type": "single_choice", "prompt": "Unit of force?", "options": ["joule", "newton"], "correct": 1, "points": 2, "position": 1},
            {"id": "q2", "type": "multiple_choice", "prompt": "Vectors?", "options": ["speed", "velocity", "force"], "correct": [1, 2], "points": 2, "position": 2},
            {"id": "q3", "type": "short_answer", "prompt": "Symbol for mass?", "correct": ["m"], "position": 3},
            {"id": "q4", "type": "essay", "prompt": "Explain inertia.", "points": 5, "position": 4}
        ]),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}
