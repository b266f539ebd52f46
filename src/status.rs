//! Printer status data model
//!
//! `PrinterStatus` mirrors the JSON the fleet manager returns from its
//! status endpoint and embeds in `printer_status` push envelopes. Only the
//! fields the overlay displays are modelled; unknown fields are ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::error::{AppResult, OverlayError};

/// Printer identifier as used by the fleet-manager API.
pub type PrinterId = i64;

/// Push envelope kind carrying a status update.
pub const PRINTER_STATUS_KIND: &str = "printer_status";

/// Operating state of a printer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatingState {
    /// Connected, no job
    Idle,
    /// Printing
    Running,
    /// Job paused
    Paused,
    /// Job finished
    Finished,
    /// Job failed
    Failed,
    /// Any state string the overlay has no label for, kept verbatim
    Other(String),
}

impl OperatingState {
    /// Parse a raw firmware state string (case-insensitive)
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "IDLE" => OperatingState::Idle,
            "RUNNING" => OperatingState::Running,
            "PAUSE" | "PAUSED" => OperatingState::Paused,
            "FINISH" | "FINISHED" => OperatingState::Finished,
            "FAILED" => OperatingState::Failed,
            _ => OperatingState::Other(raw.to_string()),
        }
    }

    /// Running or paused: the only states where progress, layers and ETA mean anything
    pub fn is_printing(&self) -> bool {
        matches!(self, OperatingState::Running | OperatingState::Paused)
    }
}

/// Live status of one printer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrinterStatus {
    /// Whether the fleet manager currently has a connection to the printer
    #[serde(default)]
    pub connected: bool,
    /// Raw operating state string, see [`PrinterStatus::operating_state`]
    #[serde(default)]
    pub state: Option<String>,
    /// Job progress, 0-100
    #[serde(default)]
    pub progress: f64,
    /// Name of the file being printed
    #[serde(default)]
    pub current_print: Option<String>,
    /// Remaining time in minutes
    #[serde(default)]
    pub remaining_time: Option<i64>,
    /// Current layer
    #[serde(default)]
    pub layer_num: Option<u32>,
    /// Total layers of the job
    #[serde(default)]
    pub total_layers: Option<u32>,
    /// Human-readable stage label reported by the printer
    #[serde(default)]
    pub stg_cur_name: Option<String>,
}

impl PrinterStatus {
    /// Parsed operating state, `None` when the printer reported no state at all
    pub fn operating_state(&self) -> Option<OperatingState> {
        self.state.as_deref().map(OperatingState::parse)
    }

    /// Whether a job is running or paused
    pub fn is_printing(&self) -> bool {
        self.operating_state()
            .is_some_and(|state| state.is_printing())
    }
}

/// Printer metadata returned by the printer directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterInfo {
    /// Printer id
    pub id: PrinterId,
    /// Display name
    pub name: String,
}

/// Wire shape of a push frame: `{type, printer_id, status}`
#[derive(Debug, Clone, Deserialize)]
struct PushEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    printer_id: Option<PrinterId>,
    #[serde(default)]
    status: Value,
}

/// A decoded push frame
#[derive(Debug, Clone, PartialEq)]
pub enum PushMessage {
    /// Status update for one printer
    Status {
        printer_id: PrinterId,
        status: PrinterStatus,
    },
    /// A well-formed envelope of some other kind
    Ignored { kind: String },
}

/// Decode one push frame.
///
/// Envelopes of any kind other than `printer_status` decode to
/// [`PushMessage::Ignored`] without inspecting their payload. A
/// `printer_status` envelope without a printer id or with a status payload
/// that does not match [`PrinterStatus`] is malformed.
pub fn parse_push_message(text: &str) -> AppResult<PushMessage> {
    let envelope: PushEnvelope = serde_json::from_str(text)?;
    if envelope.kind != PRINTER_STATUS_KIND {
        return Ok(PushMessage::Ignored {
            kind: envelope.kind,
        });
    }

    let printer_id = envelope.printer_id.ok_or_else(|| {
        OverlayError::MalformedMessage("printer_status envelope without printer_id".into())
    })?;
    let status = serde_json::from_value::<PrinterStatus>(envelope.status)?;
    Ok(PushMessage::Status { printer_id, status })
}

/// Read a status document, as returned by the status endpoint, from disk
pub fn read_status_file(path: &Path) -> AppResult<PrinterStatus> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}
