use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::utils::client_ip::{peer_addr, ClientIpResolver};

const WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct WindowState {
    start: Instant,
    count: u32,
}

/// Fixed one-second windows per resolved client address. Requests with no
/// known address share a single window.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    rps: u32,
    resolver: ClientIpResolver,
    windows: Arc<Mutex<HashMap<Option<IpAddr>, WindowState>>>,
}

impl RateLimiter {
    pub fn new(rps: u32, resolver: ClientIpResolver) -> Self {
        Self {
            rps: rps.max(1),
            resolver,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn allow(&self, client: Option<IpAddr>, now: Instant) -> bool {
        let mut windows = match self.windows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if windows.len() > 10_000 {
            windows.retain(|_, w| now.duration_since(w.start) < WINDOW);
        }

        let window = windows.entry(client).or_insert(WindowState { start: now, count: 0 });
        if now.duration_since(window.start) >= WINDOW {
            window.start = now;
            window.count = 0;
        }
        if window.count < self.rps {
            window.count += 1;
            true
        } else {
            false
        }
    }
}

pub async fn rps_middleware(
    State(limiter): State<RateLimiter>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let client = limiter.resolver.resolve(peer_addr(req.extensions()), req.headers());
    if !limiter.allow(client, Instant::now()) {
        tracing::debug!(?client, "rate limit exceeded");
        return (StatusCode::TOO_MANY_REQUESTS, "rate_limit_exceeded").into_response();
    }
    next.run(req).await
}
