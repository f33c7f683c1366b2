//! Per-client fixed-window request limiter.
//!
//! Each client key gets `max` requests per `window`; the window starts with
//! the client's first request. Clients are keyed by peer address; the first
//! `X-Forwarded-For` hop is used only when the service runs behind a trusted
//! proxy. The state is one mutex-guarded map holding at most `MAX_CLIENTS`
//! entries: expired windows are pruned first, then the oldest are evicted.

use std::{
  collections::HashMap,
  net::SocketAddr,
  sync::Arc,
  time::{Duration, Instant},
};

use axum::{
  extract::{ConnectInfo, Request, State},
  middleware::Next,
  response::{IntoResponse, Response},
};
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::ApiError;

const MAX_CLIENTS: usize = 10_000;

#[derive(Debug)]
struct Window {
  started: Instant,
  count: u32,
}

#[derive(Debug)]
pub struct RateLimiter {
  window: Duration,
  max: u32,
  trust_proxy: bool,
  capacity: usize,
  clients: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
  pub fn new(window: Duration, max: u32, trust_proxy: bool) -> Self {
    Self { window, max, trust_proxy, capacity: MAX_CLIENTS, clients: Mutex::new(HashMap::new()) }
  }

  /// Count one request for `key`; false once the key exhausted its window.
  pub async fn check(&self, key: &str) -> bool {
    self.check_at(key, Instant::now()).await
  }

  async fn check_at(&self, key: &str, now: Instant) -> bool {
    let mut clients = self.clients.lock().await;
    if !clients.contains_key(key) && clients.len() >= self.capacity {
      let window = self.window;
      clients.retain(|_, w| now.duration_since(w.started) < window);
      while clients.len() >= self.capacity {
        let Some(oldest) = clients.iter().min_by_key(|(_, w)| w.started).map(|(k, _)| k.clone()) else { break };
        clients.remove(&oldest);
      }
    }
    let entry = clients.entry(key.to_string()).or_insert(Window { started: now, count: 0 });
    if now.duration_since(entry.started) >= self.window {
      *entry = Window { started: now, count: 0 };
    }
    entry.count += 1;
    entry.count <= self.max
  }
}

/// Peer address, or the first `X-Forwarded-For` hop behind a trusted proxy.
/// Requests without either share one bucket.
pub fn client_key(req: &Request, trust_proxy: bool) -> String {
  if let Some(forwarded) = trust_proxy
    .then(|| req.headers().get("x-forwarded-for"))
    .flatten()
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.split(',').next())
    .map(str::trim)
    .filter(|v| !v.is_empty())
  {
    return forwarded.to_string();
  }
  req
    .extensions()
    .get::<ConnectInfo<SocketAddr>>()
    .map(|ci| ci.0.ip().to_string())
    .unwrap_or_else(|| "unknown".into())
}

/// axum middleware: reject with 429 once a client's window is used up.
pub async fn enforce(State(limiter): State<Arc<RateLimiter>>, req: Request, next: Next) -> Response {
  let key = client_key(&req, limiter.trust_proxy);
  if !limiter.check(&key).await {
    warn!(target: "exam_forge", client = %key, "Rate limit exceeded");
    return ApiError::TooManyRequests.into_response();
  }
  next.run(req).await
}
