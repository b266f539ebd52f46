//! Custom error types for the overlay service.
//!
//! `OverlayError` is the single error type crossing module boundaries. Almost
//! nothing in the overlay core is allowed to fail outward: malformed query
//! input resolves to defaults, malformed push messages are discarded, transport
//! failures degrade to polling and image failures are retried. The variants
//! below exist so that those absorbed failures can still be logged with a
//! precise cause, and so the CLI and settings loader have something typed to
//! return.
//!
//! ## Error Hierarchy
//!
//! - **`InvalidPrinterId`**: the only user-visible terminal state of a view.
//! - **`Fetch`**: a status or metadata fetch failed (poll path, mount).
//! - **`Transport`**: the push subscription could not be opened or broke.
//! - **`MalformedMessage`**: a push frame was not a valid envelope.
//! - **`Settings`** / **`SettingsValidation`**: service settings could not be
//!   loaded, or loaded but are semantically wrong.
//! - **`Io`**: reading status documents from disk.

use thiserror::Error;

/// Convenience alias for results using the overlay error type.
pub type AppResult<T> = std::result::Result<T, OverlayError>;

/// Errors raised by the overlay service
#[derive(Error, Debug)]
pub enum OverlayError {
    /// Printer id of zero or below
    #[error("Invalid printer ID: {0}")]
    InvalidPrinterId(i64),

    /// A collaborator fetch failed
    #[error("Status fetch failed: {0}")]
    Fetch(String),

    /// Push channel could not be opened or broke
    #[error("Push transport error: {0}")]
    Transport(String),

    /// Push frame or status document could not be decoded
    #[error("Malformed push message: {0}")]
    MalformedMessage(String),

    /// Settings file or environment could not be read
    #[error("Settings error: {0}")]
    Settings(#[from] Box<figment::Error>),

    /// Settings loaded but are invalid
    #[error("Settings validation error: {0}")]
    SettingsValidation(String),

    /// File access failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for OverlayError {
    fn from(value: figment::Error) -> Self {
        OverlayError::Settings(Box::new(value))
    }
}

impl From<serde_json::Error> for OverlayError {
    fn from(value: serde_json::Error) -> Self {
        OverlayError::MalformedMessage(value.to_string())
    }
}
