//! Status synchronizer
//!
//! Owns the live status cell of one mounted view and keeps it current through
//! two independent producers:
//!
//! 1. **Poll** - fetches the status every [`POLL_INTERVAL`] (first fetch
//!    immediately on start). Always runs, even while push is healthy.
//! 2. **Push** - one transport subscription; frames of kind `printer_status`
//!    for this printer are forwarded, everything else is dropped.
//!
//! Both producers send into one `mpsc` queue drained by a writer task, which
//! is the only holder of the `watch::Sender`. The cell therefore reflects
//! whichever update *arrived* last, regardless of channel. There is no
//! sequence comparison: a poll response landing after a fresher push update
//! overwrites it, and the next push or poll corrects it within one interval.
//!
//! Push failures (refused subscription, closed stream, garbage frames) never
//! stop polling and are never surfaced to the viewer.

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info_span, trace, warn, Instrument};

use crate::collaborators::{PushTransport, StatusSource};
use crate::error::{AppResult, OverlayError};
use crate::status::{parse_push_message, PrinterId, PrinterStatus, PushMessage};

/// Interval between status fetches
pub const POLL_INTERVAL: Duration = Duration::from_millis(2000);

const UPDATE_QUEUE_CAPACITY: usize = 16;

/// Which producer delivered a status value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateSource {
    /// Periodic fetch
    Poll,
    /// Push subscription
    Push,
}

/// Current content of the status cell
#[derive(Debug, Clone, PartialEq)]
pub struct LiveStatus {
    /// Status value
    pub status: PrinterStatus,
    /// Channel that delivered it
    pub source: UpdateSource,
    /// When the writer stored it
    pub received_at: Instant,
}

#[derive(Debug)]
struct StatusUpdate {
    status: PrinterStatus,
    source: UpdateSource,
}

/// Live status of one printer, fed by poll and push
///
/// Readers get snapshots through [`current`](Self::current) or a
/// `watch::Receiver` from [`subscribe`](Self::subscribe); only the internal
/// writer task mutates the cell.
pub struct StatusSynchronizer {
    printer_id: PrinterId,
    cell: watch::Receiver<Option<LiveStatus>>,
    poll_shutdown: Option<oneshot::Sender<()>>,
    push_shutdown: Option<oneshot::Sender<()>>,
    tasks: Vec<JoinHandle<()>>,
}

impl StatusSynchronizer {
    /// Start polling and subscribe to push updates for `printer_id`
    ///
    /// Must be called within a Tokio runtime. Fails only for ids that cannot
    /// name a printer (zero or negative); in that case nothing is fetched or
    /// subscribed.
    pub fn start(
        printer_id: PrinterId,
        source: Arc<dyn StatusSource>,
        transport: Arc<dyn PushTransport>,
    ) -> AppResult<Self> {
        if printer_id <= 0 {
            return Err(OverlayError::InvalidPrinterId(printer_id));
        }

        let (cell_tx, cell_rx) = watch::channel(None);
        let (update_tx, update_rx) = mpsc::channel(UPDATE_QUEUE_CAPACITY);
        let (poll_shutdown, poll_shutdown_rx) = oneshot::channel();
        let (push_shutdown, push_shutdown_rx) = oneshot::channel();
        let span = info_span!("status_sync", printer_id);

        let tasks = vec![
            tokio::spawn(run_writer(update_rx, cell_tx).instrument(span.clone())),
            tokio::spawn(
                run_poll_loop(printer_id, source, update_tx.clone(), poll_shutdown_rx)
                    .instrument(span.clone()),
            ),
            tokio::spawn(
                run_push_loop(printer_id, transport, update_tx, push_shutdown_rx)
                    .instrument(span),
            ),
        ];

        Ok(Self {
            printer_id,
            cell: cell_rx,
            poll_shutdown: Some(poll_shutdown),
            push_shutdown: Some(push_shutdown),
            tasks,
        })
    }

    /// Printer this synchronizer tracks
    pub fn printer_id(&self) -> PrinterId {
        self.printer_id
    }

    /// Latest status, `None` until the first update arrives
    pub fn current(&self) -> Option<PrinterStatus> {
        self.cell.borrow().as_ref().map(|live| live.status.clone())
    }

    /// Latest cell content including which channel delivered it
    pub fn current_live(&self) -> Option<LiveStatus> {
        self.cell.borrow().clone()
    }

    /// Receiver notified on every write to the cell
    pub fn subscribe(&self) -> watch::Receiver<Option<LiveStatus>> {
        self.cell.clone()
    }

    /// Whether poll and push have been told to stop
    pub fn is_stopped(&self) -> bool {
        self.poll_shutdown.is_none() && self.push_shutdown.is_none()
    }

    /// Stop polling, close the push subscription and wait for all tasks
    ///
    /// Safe to call more than once.
    pub async fn shutdown(&mut self) {
        self.signal_shutdown();
        for handle in self.tasks.drain(..) {
            if let Err(err) = handle.await {
                if !err.is_cancelled() {
                    warn!(printer_id = self.printer_id, ?err, "status task panicked");
                }
            }
        }
    }

    fn signal_shutdown(&mut self) {
        if let Some(tx) = self.poll_shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(tx) = self.push_shutdown.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for StatusSynchronizer {
    fn drop(&mut self) {
        self.signal_shutdown();
        for handle in &self.tasks {
            handle.abort();
        }
    }
}

async fn run_writer(
    mut updates: mpsc::Receiver<StatusUpdate>,
    cell: watch::Sender<Option<LiveStatus>>,
) {
    while let Some(update) = updates.recv().await {
        trace!(source = ?update.source, "status cell updated");
        cell.send_replace(Some(LiveStatus {
            status: update.status,
            source: update.source,
            received_at: Instant::now(),
        }));
    }
}

async fn run_poll_loop(
    printer_id: PrinterId,
    source: Arc<dyn StatusSource>,
    updates: mpsc::Sender<StatusUpdate>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,
            _ = ticker.tick() => {}
        }

        let fetched = tokio::select! {
            _ = &mut shutdown_rx => break,
            result = source.fetch_status(printer_id) => result,
        };

        match fetched {
            Ok(status) => {
                let update = StatusUpdate {
                    status,
                    source: UpdateSource::Poll,
                };
                if updates.send(update).await.is_err() {
                    break;
                }
            }
            Err(err) => {
                let err = OverlayError::Fetch(format!("{err:#}"));
                warn!(%err, "status poll failed");
            }
        }
    }
    debug!("status polling stopped");
}

async fn run_push_loop(
    printer_id: PrinterId,
    transport: Arc<dyn PushTransport>,
    updates: mpsc::Sender<StatusUpdate>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let subscribed = tokio::select! {
        _ = &mut shutdown_rx => return,
        result = transport.subscribe() => result,
    };
    let mut frames = match subscribed {
        Ok(frames) => frames,
        Err(err) => {
            warn!(?err, "push channel unavailable, continuing with polling only");
            return;
        }
    };

    loop {
        let frame = tokio::select! {
            _ = &mut shutdown_rx => break,
            frame = frames.next() => frame,
        };
        let Some(frame) = frame else {
            debug!("push channel ended, continuing with polling only");
            break;
        };
        if let Some(status) = accept_push_frame(printer_id, &frame) {
            let update = StatusUpdate {
                status,
                source: UpdateSource::Push,
            };
            if updates.send(update).await.is_err() {
                break;
            }
        }
    }
    // Dropping `frames` closes the subscription.
    debug!("push subscription closed");
}

/// Status carried by `frame` if it is a status update for `printer_id`
///
/// Malformed frames and frames for other kinds or printers yield `None`.
fn accept_push_frame(printer_id: PrinterId, frame: &str) -> Option<PrinterStatus> {
    match parse_push_message(frame) {
        Ok(PushMessage::Status {
            printer_id: addressed_to,
            status,
        }) if addressed_to == printer_id => Some(status),
        Ok(PushMessage::Status { printer_id: addressed_to, .. }) => {
            trace!(addressed_to, "ignoring status for another printer");
            None
        }
        Ok(PushMessage::Ignored { kind }) => {
            trace!(%kind, "ignoring push message");
            None
        }
        Err(err) => {
            debug!(%err, "discarding malformed push message");
            None
        }
    }
}
