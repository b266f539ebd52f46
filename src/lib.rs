//! # Printer Overlay Core Library
//!
//! Live status overlay for 3D printers, meant to be composited over a camera
//! feed in a streaming tool. Each mounted overlay shows one printer: a camera
//! background plus a panel with the printer name, file, status, progress,
//! layers and arrival estimate.
//!
//! ## Crate Structure
//!
//! - **`view`**: the overlay itself. `view::config` resolves query parameters,
//!   `view::format` turns raw values into display text, `view::keepalive`
//!   keeps the camera stream alive, `view::render` composes frames, and
//!   `view::OverlayView` ties them to one mounted printer.
//! - **`sync`**: the `StatusSynchronizer`, merging polled and pushed status
//!   into one live cell.
//! - **`status`**: the status model and the push wire format.
//! - **`collaborators`**: capability traits for the fleet manager (status
//!   source, printer directory, push transport), a WebSocket transport and
//!   in-process mocks.
//! - **`settings`**: service settings loaded with `figment`.
//! - **`logging`**: `tracing` subscriber setup.
//! - **`error`**: the `OverlayError` enum shared across modules.

pub mod collaborators;
pub mod error;
pub mod logging;
pub mod settings;
pub mod status;
pub mod sync;
pub mod view;

pub use error::{AppResult, OverlayError};
pub use view::OverlayView;
