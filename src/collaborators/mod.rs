//! External collaborator seams
//!
//! The overlay talks to three external services, each behind a small
//! capability trait:
//!
//! - [`StatusSource`] - status fetch by printer id (the poll path)
//! - [`PrinterDirectory`] - printer metadata fetch (display name)
//! - [`PushTransport`] - server-initiated push frames (the push path)
//!
//! Each trait is async (`#[async_trait]`), thread-safe (`Send + Sync`) and
//! reports failures with `anyhow::Result`. Callers in this crate absorb those
//! failures; nothing here is surfaced to the viewer.

pub mod mock;
pub mod websocket;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;

use crate::status::{PrinterId, PrinterInfo, PrinterStatus};

pub use websocket::WebSocketPushTransport;

/// Raw text frames delivered by an open push subscription.
///
/// Dropping the stream closes the subscription.
pub type PushSubscription = BoxStream<'static, String>;

/// Capability: fetch the current status of one printer
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Current status of `printer_id`
    async fn fetch_status(&self, printer_id: PrinterId) -> Result<PrinterStatus>;
}

/// Capability: look up printer metadata
#[async_trait]
pub trait PrinterDirectory: Send + Sync {
    /// Metadata for `printer_id`
    async fn fetch_printer(&self, printer_id: PrinterId) -> Result<PrinterInfo>;
}

/// Capability: open a push subscription
///
/// One subscription is opened per mounted view. The stream ends when the
/// remote side closes; no reconnect is attempted by callers.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Open a new subscription
    async fn subscribe(&self) -> Result<PushSubscription>;
}

/// The set of collaborators a view is mounted against
#[derive(Clone)]
pub struct Collaborators {
    /// Polled status endpoint
    pub status: Arc<dyn StatusSource>,
    /// Printer metadata lookup
    pub directory: Arc<dyn PrinterDirectory>,
    /// Push channel
    pub push: Arc<dyn PushTransport>,
}

impl Collaborators {
    /// Bundle the three collaborators
    pub fn new(
        status: Arc<dyn StatusSource>,
        directory: Arc<dyn PrinterDirectory>,
        push: Arc<dyn PushTransport>,
    ) -> Self {
        Self {
            status,
            directory,
            push,
        }
    }
}
