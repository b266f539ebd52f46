//! Camera stream keepalive
//!
//! The camera is consumed as a long-lived image request (MJPEG-style). When
//! the consumer reports that the image failed to load, the controller waits
//! [`RETRY_DELAY`] and then issues a fresh cache-busting token, which turns
//! into a new stream URL and therefore a brand-new request. There is no retry
//! limit.
//!
//! ```text
//!            load failure                 retry timer fires (new token)
//! Streaming ─────────────► RetryPending ─────────────────────────────► Streaming
//!     ▲                         │
//!     └──────── load ok ────────┘  (pending retry cancelled)
//! ```
//!
//! Failures reported while a retry is already pending are ignored, so a burst
//! of error events schedules exactly one retry.

use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::settings::EndpointSettings;
use crate::status::PrinterId;

/// Delay between a load failure and the next stream request
pub const RETRY_DELAY: Duration = Duration::from_millis(3000);

/// Keepalive state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Current URL is live
    Streaming,
    /// Waiting to issue a new token
    RetryPending,
    /// Torn down; all events are ignored
    Stopped,
}

/// Opaque cache-busting token, derived from the wall clock in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct StreamToken(u64);

impl StreamToken {
    /// Token for the current time, strictly newer than `previous`
    fn fresh(previous: Option<StreamToken>) -> Self {
        let now = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
        match previous {
            Some(StreamToken(prev)) if now <= prev => StreamToken(prev + 1),
            _ => StreamToken(now),
        }
    }

    /// Raw token value as placed in the URL
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Builds camera stream URLs from the configured endpoint template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEndpoint {
    base_url: String,
    path_template: String,
}

impl StreamEndpoint {
    /// Endpoint from a base URL and a path template
    pub fn new(base_url: impl Into<String>, path_template: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            path_template: path_template.into(),
        }
    }

    /// Endpoint from the configured settings
    pub fn from_settings(endpoints: &EndpointSettings) -> Self {
        Self::new(&endpoints.api_base_url, &endpoints.stream_path_template)
    }

    /// Stream URL for one printer, frame rate and token
    pub fn url(&self, printer_id: PrinterId, fps: u32, token: StreamToken) -> String {
        let path = self
            .path_template
            .replace("{printer_id}", &printer_id.to_string())
            .replace("{fps}", &fps.to_string())
            .replace("{token}", &token.value().to_string());
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

struct Inner {
    state: StreamState,
    retry: Option<JoinHandle<()>>,
    /// Bumped whenever a retry is scheduled or cancelled
    generation: u64,
    scheduled_retries: u64,
}

/// Keeps the camera stream URL fresh across load failures
pub struct StreamKeepalive {
    endpoint: StreamEndpoint,
    printer_id: PrinterId,
    fps: u32,
    inner: Arc<Mutex<Inner>>,
    token: Arc<watch::Sender<StreamToken>>,
}

impl StreamKeepalive {
    /// Keepalive for one printer's stream, starting in `Streaming`
    pub fn new(endpoint: StreamEndpoint, printer_id: PrinterId, fps: u32) -> Self {
        let (token, _rx) = watch::channel(StreamToken::fresh(None));
        Self {
            endpoint,
            printer_id,
            fps,
            inner: Arc::new(Mutex::new(Inner {
                state: StreamState::Streaming,
                retry: None,
                generation: 0,
                scheduled_retries: 0,
            })),
            token: Arc::new(token),
        }
    }

    /// URL the image element should currently request
    pub fn current_url(&self) -> String {
        self.endpoint
            .url(self.printer_id, self.fps, *self.token.borrow())
    }

    /// Current token
    pub fn token(&self) -> StreamToken {
        *self.token.borrow()
    }

    /// Receiver notified whenever a retry issues a new token
    pub fn subscribe(&self) -> watch::Receiver<StreamToken> {
        self.token.subscribe()
    }

    /// Current state
    pub fn state(&self) -> StreamState {
        lock(&self.inner).state
    }

    /// Number of retries scheduled since creation
    pub fn scheduled_retries(&self) -> u64 {
        lock(&self.inner).scheduled_retries
    }

    /// The image failed to load
    ///
    /// Schedules one retry unless one is already pending. Must be called
    /// within a Tokio runtime. Returns whether a retry was scheduled.
    pub fn on_load_failure(&self) -> bool {
        let mut inner = lock(&self.inner);
        if inner.state != StreamState::Streaming {
            return false;
        }
        inner.state = StreamState::RetryPending;
        inner.scheduled_retries += 1;
        debug!(
            printer_id = self.printer_id,
            retry = inner.scheduled_retries,
            "camera stream failed, retrying in {:?}",
            RETRY_DELAY
        );

        inner.generation += 1;
        let generation = inner.generation;
        let shared = Arc::clone(&self.inner);
        let token = Arc::clone(&self.token);
        inner.retry = Some(tokio::spawn(async move {
            tokio::time::sleep(RETRY_DELAY).await;
            fire_retry(&shared, &token, generation);
        }));
        true
    }

    /// The image loaded; cancels a pending retry
    pub fn on_load_success(&self) {
        let mut inner = lock(&self.inner);
        if inner.state == StreamState::RetryPending {
            if let Some(retry) = inner.retry.take() {
                retry.abort();
            }
            inner.generation += 1;
            inner.state = StreamState::Streaming;
        }
    }

    /// Cancel any pending retry and ignore all further events
    pub fn shutdown(&self) {
        let mut inner = lock(&self.inner);
        if let Some(retry) = inner.retry.take() {
            retry.abort();
        }
        inner.generation += 1;
        inner.state = StreamState::Stopped;
    }
}

impl Drop for StreamKeepalive {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Issue a new token if the retry scheduled as `generation` is still the pending one
///
/// An aborted retry task may already be past its sleep and waiting on the
/// lock; the generation check turns it into a no-op.
fn fire_retry(shared: &Mutex<Inner>, token: &watch::Sender<StreamToken>, generation: u64) -> bool {
    let mut inner = lock(shared);
    if inner.state != StreamState::RetryPending || inner.generation != generation {
        return false;
    }
    token.send_modify(|current| *current = StreamToken::fresh(Some(*current)));
    inner.state = StreamState::Streaming;
    inner.retry = None;
    true
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    // The state stays consistent even if a holder panicked mid-update.
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    fn keepalive() -> StreamKeepalive {
        StreamKeepalive::new(
            StreamEndpoint::new(
                "http://printers.local:8000/",
                "/api/v1/printers/{printer_id}/camera/stream?fps={fps}&t={token}",
            ),
            3,
            15,
        )
    }

    #[test]
    fn url_is_built_from_template() {
        let endpoint = StreamEndpoint::new("http://h:8000", "/cam/{printer_id}?fps={fps}&t={token}");
        assert_eq!(endpoint.url(9, 24, StreamToken(1700)), "http://h:8000/cam/9?fps=24&t=1700");
    }

    #[test]
    fn fresh_tokens_strictly_increase() {
        let far_future = StreamToken(u64::MAX - 1);
        assert_eq!(StreamToken::fresh(Some(far_future)), StreamToken(u64::MAX));
        let a = StreamToken::fresh(None);
        let b = StreamToken::fresh(Some(a));
        assert!(b > a);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_retries_once_after_delay_with_new_token() {
        let keepalive = keepalive();
        let before = keepalive.current_url();
        let mut tokens = keepalive.subscribe();
        let started = Instant::now();

        assert!(keepalive.on_load_failure());
        assert_eq!(keepalive.state(), StreamState::RetryPending);
        assert_eq!(keepalive.current_url(), before);

        tokens.changed().await.unwrap();
        let waited = started.elapsed();
        assert!(waited >= RETRY_DELAY && waited < RETRY_DELAY + Duration::from_millis(5));
        assert_eq!(keepalive.state(), StreamState::Streaming);
        assert_ne!(keepalive.current_url(), before);
        assert!(keepalive.current_url().contains("/printers/3/camera/stream?fps=15&t="));
        assert_eq!(keepalive.scheduled_retries(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_failures_schedules_one_retry() {
        let keepalive = keepalive();
        let first = keepalive.token();
        assert!(keepalive.on_load_failure());
        assert!(!keepalive.on_load_failure());
        assert!(!keepalive.on_load_failure());

        tokio::time::sleep(RETRY_DELAY * 3).await;
        assert_eq!(keepalive.scheduled_retries(), 1);
        assert!(keepalive.token() > first);

        // Streaming again, so the next failure schedules the next retry
        assert!(keepalive.on_load_failure());
        assert_eq!(keepalive.scheduled_retries(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn successful_load_cancels_pending_retry() {
        let keepalive = keepalive();
        let token = keepalive.token();
        keepalive.on_load_failure();
        keepalive.on_load_success();
        assert_eq!(keepalive.state(), StreamState::Streaming);

        tokio::time::sleep(RETRY_DELAY * 2).await;
        assert_eq!(keepalive.token(), token);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_retry_and_ignores_events() {
        let keepalive = keepalive();
        let token = keepalive.token();
        keepalive.on_load_failure();
        keepalive.shutdown();

        tokio::time::sleep(RETRY_DELAY * 2).await;
        assert_eq!(keepalive.token(), token);
        assert!(!keepalive.on_load_failure());
        assert_eq!(keepalive.state(), StreamState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_retry_does_not_fire() {
        let keepalive = keepalive();
        let token = keepalive.token();

        // First retry cancelled by a load, second one pending
        keepalive.on_load_failure();
        keepalive.on_load_success();
        keepalive.on_load_failure();

        // The cancelled retry waking late must not bump the token or clear the pending one
        assert!(!fire_retry(&keepalive.inner, &keepalive.token, 1));
        assert_eq!(keepalive.token(), token);
        assert_eq!(keepalive.state(), StreamState::RetryPending);
        assert!(lock(&keepalive.inner).retry.is_some());

        tokio::time::sleep(RETRY_DELAY + Duration::from_millis(5)).await;
        assert!(keepalive.token() > token);
        assert_eq!(keepalive.state(), StreamState::Streaming);
    }
}
