//! Simulated collaborators
//!
//! Stand-ins for the fleet-manager API used by tests and by the CLI `demo`
//! command.
//!
//! # Available Mocks
//!
//! - `SimulatedPrinter` - status source and printer directory for one printer
//!   that advances its job on every fetch
//! - `ChannelPushTransport` - push transport fed from in-process `send` calls

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use super::{PrinterDirectory, PushSubscription, PushTransport, StatusSource};
use crate::status::{PrinterId, PrinterInfo, PrinterStatus};

// =============================================================================
// SimulatedPrinter
// =============================================================================

/// Simulated printer
///
/// While its state is `RUNNING`, every successful fetch advances progress by
/// `step` percent, moves one layer up and takes one minute off the remaining
/// time. Fetches and metadata lookups are counted so tests can assert that
/// nothing was requested.
///
/// # Example
///
/// ```rust,ignore
/// let printer = SimulatedPrinter::printing(3, "Voron", "benchy.gcode.3mf");
/// let status = printer.fetch_status(3).await?;
/// assert!(status.is_printing());
/// ```
pub struct SimulatedPrinter {
    id: PrinterId,
    name: String,
    status: Mutex<PrinterStatus>,
    step: f64,
    failing: AtomicBool,
    status_fetches: AtomicUsize,
    directory_fetches: AtomicUsize,
}

impl SimulatedPrinter {
    /// Create an idle, connected printer
    pub fn new(id: PrinterId, name: impl Into<String>) -> Self {
        Self::with_status(
            id,
            name,
            PrinterStatus {
                connected: true,
                state: Some("IDLE".to_string()),
                ..Default::default()
            },
        )
    }

    /// Create a printer halfway through a job
    pub fn printing(id: PrinterId, name: impl Into<String>, file: impl Into<String>) -> Self {
        Self::with_status(
            id,
            name,
            PrinterStatus {
                connected: true,
                state: Some("RUNNING".to_string()),
                progress: 50.0,
                current_print: Some(file.into()),
                remaining_time: Some(95),
                layer_num: Some(120),
                total_layers: Some(240),
                stg_cur_name: None,
            },
        )
    }

    /// Create a printer reporting an explicit status
    pub fn with_status(id: PrinterId, name: impl Into<String>, status: PrinterStatus) -> Self {
        Self {
            id,
            name: name.into(),
            status: Mutex::new(status),
            step: 0.5,
            failing: AtomicBool::new(false),
            status_fetches: AtomicUsize::new(0),
            directory_fetches: AtomicUsize::new(0),
        }
    }

    /// Set the progress increment applied per fetch (0 freezes the job)
    pub fn with_step(mut self, step: f64) -> Self {
        self.step = step;
        self
    }

    /// Replace the reported status
    pub fn set_status(&self, status: PrinterStatus) {
        if let Ok(mut current) = self.status.lock() {
            *current = status;
        }
    }

    /// Make every subsequent fetch fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of status fetches issued, failed ones included
    pub fn status_fetches(&self) -> usize {
        self.status_fetches.load(Ordering::SeqCst)
    }

    /// Number of metadata lookups issued
    pub fn directory_fetches(&self) -> usize {
        self.directory_fetches.load(Ordering::SeqCst)
    }

    fn advance(status: &mut PrinterStatus, step: f64) {
        if status.state.as_deref() != Some("RUNNING") || step <= 0.0 {
            return;
        }
        status.progress = (status.progress + step).min(100.0);
        if let (Some(layer), Some(total)) = (status.layer_num, status.total_layers) {
            status.layer_num = Some((layer + 1).min(total));
        }
        if let Some(remaining) = status.remaining_time {
            status.remaining_time = Some((remaining - 1).max(0));
        }
        if status.progress >= 100.0 {
            status.state = Some("FINISH".to_string());
        }
    }
}

#[async_trait]
impl StatusSource for SimulatedPrinter {
    async fn fetch_status(&self, printer_id: PrinterId) -> Result<PrinterStatus> {
        self.status_fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("simulated fetch failure"));
        }
        if printer_id != self.id {
            return Err(anyhow!("printer {} not found", printer_id));
        }

        let mut status = self
            .status
            .lock()
            .map_err(|_| anyhow!("simulated printer state poisoned"))?;
        let snapshot = status.clone();
        Self::advance(&mut status, self.step);
        Ok(snapshot)
    }
}

#[async_trait]
impl PrinterDirectory for SimulatedPrinter {
    async fn fetch_printer(&self, printer_id: PrinterId) -> Result<PrinterInfo> {
        self.directory_fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("simulated lookup failure"));
        }
        if printer_id != self.id {
            return Err(anyhow!("printer {} not found", printer_id));
        }
        Ok(PrinterInfo {
            id: self.id,
            name: self.name.clone(),
        })
    }
}

// =============================================================================
// ChannelPushTransport
// =============================================================================

/// In-process push transport
///
/// Every open subscription receives every frame passed to [`send`](Self::send)
/// after it subscribed.
pub struct ChannelPushTransport {
    tx: broadcast::Sender<String>,
    refusing: AtomicBool,
    subscribes: AtomicUsize,
}

impl ChannelPushTransport {
    /// Create a transport with no open subscriptions
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(64);
        Self {
            tx,
            refusing: AtomicBool::new(false),
            subscribes: AtomicUsize::new(0),
        }
    }

    /// Deliver a raw frame to all open subscriptions, returning how many got it
    pub fn send(&self, frame: impl Into<String>) -> usize {
        self.tx.send(frame.into()).unwrap_or(0)
    }

    /// Make subscribe fail, as if the transport could not be established
    pub fn set_refusing(&self, refusing: bool) {
        self.refusing.store(refusing, Ordering::SeqCst);
    }

    /// Number of subscribe calls, refused ones included
    pub fn subscribe_calls(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst)
    }

    /// Number of subscriptions that have not been dropped yet
    pub fn open_subscriptions(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ChannelPushTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PushTransport for ChannelPushTransport {
    async fn subscribe(&self) -> Result<PushSubscription> {
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        if self.refusing.load(Ordering::SeqCst) {
            return Err(anyhow!("simulated transport refusal"));
        }
        let frames = BroadcastStream::new(self.tx.subscribe())
            .filter_map(|frame| futures::future::ready(frame.ok()));
        Ok(frames.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn running_printer_advances_per_fetch() {
        let printer = SimulatedPrinter::printing(1, "Voron", "cube.gcode").with_step(1.0);
        let first = printer.fetch_status(1).await.unwrap();
        let second = printer.fetch_status(1).await.unwrap();

        assert_eq!(first.progress, 50.0);
        assert_eq!(second.progress, 51.0);
        assert_eq!(second.layer_num, Some(121));
        assert_eq!(second.remaining_time, Some(94));
        assert_eq!(printer.status_fetches(), 2);
    }

    #[tokio::test]
    async fn idle_printer_does_not_advance() {
        let printer = SimulatedPrinter::new(1, "Voron");
        printer.fetch_status(1).await.unwrap();
        let status = printer.fetch_status(1).await.unwrap();
        assert_eq!(status.progress, 0.0);
        assert_eq!(status.state.as_deref(), Some("IDLE"));
    }

    #[tokio::test]
    async fn failing_printer_still_counts_fetches() {
        let printer = SimulatedPrinter::new(1, "Voron");
        printer.set_failing(true);
        assert!(printer.fetch_status(1).await.is_err());
        assert!(printer.fetch_printer(1).await.is_err());
        assert_eq!(printer.status_fetches(), 1);
        assert_eq!(printer.directory_fetches(), 1);
    }

    #[tokio::test]
    async fn unknown_printer_is_an_error() {
        let printer = SimulatedPrinter::new(1, "Voron");
        assert!(printer.fetch_status(2).await.is_err());
        assert_eq!(printer.fetch_printer(1).await.unwrap().name, "Voron");
    }

    #[tokio::test]
    async fn channel_transport_fans_out_and_tracks_drops() {
        let transport = ChannelPushTransport::new();
        let mut a = transport.subscribe().await.unwrap();
        let b = transport.subscribe().await.unwrap();
        assert_eq!(transport.open_subscriptions(), 2);

        assert_eq!(transport.send("hello"), 2);
        assert_eq!(a.next().await.as_deref(), Some("hello"));

        drop(b);
        assert_eq!(transport.open_subscriptions(), 1);
    }

    #[tokio::test]
    async fn refusing_transport_fails_subscribe() {
        let transport = ChannelPushTransport::new();
        transport.set_refusing(true);
        assert!(transport.subscribe().await.is_err());
        assert_eq!(transport.subscribe_calls(), 1);
        assert_eq!(transport.open_subscriptions(), 0);
    }
}
