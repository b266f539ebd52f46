//! Overlay view
//!
//! An [`OverlayView`] is one mounted overlay for one printer. Mounting wires
//! the pieces together:
//!
//! - printer metadata is fetched once in the background for the name line
//! - a [`StatusSynchronizer`] keeps the live status current
//! - a [`StreamKeepalive`] keeps the camera URL fresh, only when the camera
//!   is shown
//!
//! The host renders with [`OverlayView::frame`] or [`OverlayView::html`],
//! reports image load events back, and re-renders whenever
//! [`OverlayView::changes`] ticks.

pub mod config;
pub mod format;
pub mod keepalive;
pub mod render;

use chrono::{DateTime, TimeZone};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::collaborators::Collaborators;
use crate::error::OverlayError;
use crate::settings::{BrandingSettings, Settings};
use crate::status::{PrinterId, PrinterStatus};
use crate::sync::{LiveStatus, StatusSynchronizer};
use config::OverlayConfig;
use keepalive::{StreamEndpoint, StreamKeepalive, StreamToken};
use render::{FrameContext, OverlayFrame};

/// Everything that only exists for a valid printer id
struct Live {
    sync: StatusSynchronizer,
    keepalive: Option<StreamKeepalive>,
    printer_name: watch::Receiver<Option<String>>,
    tasks: Vec<JoinHandle<()>>,
}

/// One mounted overlay
pub struct OverlayView {
    printer_id: PrinterId,
    config: OverlayConfig,
    branding: BrandingSettings,
    live: Option<Live>,
    revision: Arc<watch::Sender<u64>>,
    torn_down: bool,
}

impl OverlayView {
    /// Mount an overlay for `printer_id`
    ///
    /// Ids of zero or below yield a view stuck in the invalid state; nothing
    /// is fetched, subscribed or scheduled for it. Must be called within a
    /// Tokio runtime.
    pub fn mount(
        printer_id: PrinterId,
        config: OverlayConfig,
        settings: &Settings,
        collaborators: Collaborators,
    ) -> Self {
        let (revision, _rx) = watch::channel(0u64);
        let revision = Arc::new(revision);

        let sync = match StatusSynchronizer::start(
            printer_id,
            Arc::clone(&collaborators.status),
            Arc::clone(&collaborators.push),
        ) {
            Ok(sync) => sync,
            Err(err) => {
                warn!(printer_id, "not mounting overlay: {err}");
                return Self {
                    printer_id,
                    config,
                    branding: settings.branding.clone(),
                    live: None,
                    revision,
                    torn_down: false,
                };
            }
        };

        let keepalive = config.show_camera.then(|| {
            StreamKeepalive::new(
                StreamEndpoint::from_settings(&settings.endpoints),
                printer_id,
                config.frame_rate,
            )
        });

        let (name_tx, name_rx) = watch::channel(None);
        let directory = Arc::clone(&collaborators.directory);
        let metadata = tokio::spawn(async move {
            match directory.fetch_printer(printer_id).await {
                Ok(info) => {
                    let _ = name_tx.send(Some(info.name));
                }
                Err(err) => {
                    let err = OverlayError::Fetch(format!("{err:#}"));
                    debug!(printer_id, %err, "printer metadata unavailable");
                }
            }
        });

        let forwarder = tokio::spawn(forward_changes(
            sync.subscribe(),
            Some(name_rx.clone()),
            keepalive.as_ref().map(StreamKeepalive::subscribe),
            Arc::clone(&revision),
        ));

        info!(
            printer_id,
            size = config.size.as_str(),
            fps = config.frame_rate,
            camera = config.show_camera,
            "overlay mounted"
        );

        Self {
            printer_id,
            config,
            branding: settings.branding.clone(),
            live: Some(Live {
                sync,
                keepalive,
                printer_name: name_rx,
                tasks: vec![metadata, forwarder],
            }),
            revision,
            torn_down: false,
        }
    }

    /// Printer this view was mounted for
    pub fn printer_id(&self) -> PrinterId {
        self.printer_id
    }

    /// Resolved configuration
    pub fn config(&self) -> &OverlayConfig {
        &self.config
    }

    /// Whether the view is in the terminal invalid-printer state
    pub fn is_invalid(&self) -> bool {
        self.live.is_none()
    }

    /// Latest status, if any has arrived
    pub fn status(&self) -> Option<PrinterStatus> {
        self.live.as_ref().and_then(|live| live.sync.current())
    }

    /// Latest status together with the channel that delivered it
    pub fn live_status(&self) -> Option<LiveStatus> {
        self.live.as_ref().and_then(|live| live.sync.current_live())
    }

    /// Printer display name, once the metadata lookup succeeded
    pub fn printer_name(&self) -> Option<String> {
        self.live
            .as_ref()
            .and_then(|live| live.printer_name.borrow().clone())
    }

    /// Current camera URL; `None` when the camera is hidden or the id is invalid
    pub fn camera_url(&self) -> Option<String> {
        self.keepalive().map(StreamKeepalive::current_url)
    }

    /// Keepalive controller; `None` when the camera is hidden or the id is invalid
    pub fn keepalive(&self) -> Option<&StreamKeepalive> {
        self.live.as_ref().and_then(|live| live.keepalive.as_ref())
    }

    /// Receiver that ticks whenever the rendered output may have changed
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Compose the current frame
    pub fn frame<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> OverlayFrame
    where
        Tz::Offset: std::fmt::Display,
    {
        let Some(live) = &self.live else {
            return OverlayFrame::InvalidPrinter;
        };
        let context = FrameContext {
            printer_name: live.printer_name.borrow().clone(),
            camera_url: live.keepalive.as_ref().map(StreamKeepalive::current_url),
            branding: self.branding.clone(),
        };
        render::compose(&self.config, live.sync.current().as_ref(), &context, now)
    }

    /// Render the current frame as an HTML document
    pub fn html<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> String
    where
        Tz::Offset: std::fmt::Display,
    {
        self.frame(now).to_html()
    }

    /// The camera image failed to load. Returns whether a retry was scheduled.
    pub fn image_failed(&self) -> bool {
        self.keepalive()
            .map(StreamKeepalive::on_load_failure)
            .unwrap_or(false)
    }

    /// The camera image loaded
    pub fn image_loaded(&self) {
        if let Some(keepalive) = self.keepalive() {
            keepalive.on_load_success();
        }
    }

    /// Stop polling, close the push subscription and cancel pending retries
    ///
    /// Safe to call more than once.
    pub async fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        if let Some(live) = &mut self.live {
            if let Some(keepalive) = &live.keepalive {
                keepalive.shutdown();
            }
            for task in live.tasks.drain(..) {
                task.abort();
            }
            live.sync.shutdown().await;
            info!(printer_id = self.printer_id, "overlay torn down");
        }
    }

    /// Whether `teardown` has run
    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }
}

impl Drop for OverlayView {
    fn drop(&mut self) {
        if let Some(live) = &mut self.live {
            for task in live.tasks.drain(..) {
                task.abort();
            }
        }
    }
}

async fn forward_changes(
    mut status: watch::Receiver<Option<LiveStatus>>,
    mut name: Option<watch::Receiver<Option<String>>>,
    mut token: Option<watch::Receiver<StreamToken>>,
    revision: Arc<watch::Sender<u64>>,
) {
    loop {
        tokio::select! {
            res = status.changed() => {
                if res.is_err() {
                    break;
                }
            }
            open = changed(&mut name) => {
                if !open {
                    name = None;
                    continue;
                }
            }
            open = changed(&mut token) => {
                if !open {
                    token = None;
                    continue;
                }
            }
        }
        revision.send_modify(|rev| *rev += 1);
    }
}

/// Waits for the next change; pends forever on `None`
async fn changed<T>(rx: &mut Option<watch::Receiver<T>>) -> bool {
    match rx {
        Some(rx) => rx.changed().await.is_ok(),
        None => std::future::pending().await,
    }
}
