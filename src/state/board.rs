//! Physical dart board lifecycle tracked from device telemetry.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Lifecycle reported by the board hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum BoardStatus {
    /// Board is not connected.
    Offline,
    /// Firmware update in progress.
    Updating,
    /// Board is booting.
    Initializing,
    /// Camera calibration in progress.
    Calibrating,
    /// Board accepts throws.
    Ready,
    /// Board reported a fault.
    Error,
}

/// Throw/takeout cycle, meaningful only while the board is [`BoardStatus::Ready`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum BoardPhase {
    /// Waiting for darts.
    Throw,
    /// Player is pulling darts out of the board.
    Takeout,
}

/// Device credentials, opaque to scoring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BoardCredentials {
    /// No serial/token registered yet.
    #[default]
    Unconfigured,
    /// Serial number and a reference to the stored access token.
    Configured {
        /// Hardware serial number.
        serial: String,
        /// Token reference (the token itself is kept by the storage layer).
        token_ref: String,
    },
}

impl BoardCredentials {
    /// Build credentials from optional parts; both must be present and non-blank.
    pub fn from_parts(serial: Option<String>, token_ref: Option<String>) -> Self {
        match (serial, token_ref) {
            (Some(serial), Some(token_ref))
                if !serial.trim().is_empty() && !token_ref.trim().is_empty() =>
            {
                BoardCredentials::Configured {
                    serial: serial.trim().to_owned(),
                    token_ref: token_ref.trim().to_owned(),
                }
            }
            _ => BoardCredentials::Unconfigured,
        }
    }

    /// Serial number, when configured.
    pub fn serial(&self) -> Option<&str> {
        match self {
            BoardCredentials::Configured { serial, .. } => Some(serial),
            BoardCredentials::Unconfigured => None,
        }
    }

    /// Token reference, when configured.
    pub fn token_ref(&self) -> Option<&str> {
        match self {
            BoardCredentials::Configured { token_ref, .. } => Some(token_ref),
            BoardCredentials::Unconfigured => None,
        }
    }
}

/// Dart detection angle reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ThrowAngle {
    /// Vertical angle in degrees (-90..=90).
    pub vertical: f64,
    /// Horizontal angle in degrees (-90..=90).
    pub horizontal: f64,
}

/// Throw notification as parsed by the device adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ThrowPayload {
    /// Sector token, e.g. `T20`, `25`, `Bull`, `None`. Blank when the device sent none.
    #[serde(default)]
    pub sector: String,
    /// Landing position in millimetres from the bull.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Vec<f64>>)]
    pub coordinates: Option<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angle: Option<ThrowAngle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounceout: Option<bool>,
    /// Device timestamp (RFC 3339), if the device sent one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detection_time: Option<String>,
}

impl ThrowPayload {
    /// Minimal payload carrying only a sector token.
    pub fn sector(sector: impl Into<String>) -> Self {
        Self {
            sector: sector.into(),
            coordinates: None,
            angle: None,
            bounceout: None,
            detection_time: None,
        }
    }
}

/// Last throw seen on a board.
#[derive(Debug, Clone, PartialEq)]
pub struct LastThrow {
    /// Payload as received.
    pub payload: ThrowPayload,
    /// Detection time, falling back to server time.
    pub at: String,
}

/// Current view of one board.
#[derive(Debug, Clone, PartialEq)]
pub struct Board {
    /// Stable board identifier (e.g. `board-1`).
    pub id: String,
    /// Display name.
    pub name: String,
    pub status: BoardStatus,
    pub phase: Option<BoardPhase>,
    pub last_throw: Option<LastThrow>,
    pub last_update: SystemTime,
    pub credentials: BoardCredentials,
}

impl Board {
    /// New board, ready for throws.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: BoardStatus::Ready,
            phase: Some(BoardPhase::Throw),
            last_throw: None,
            last_update: SystemTime::now(),
            credentials: BoardCredentials::Unconfigured,
        }
    }

    /// Default display name for a board created on first reference.
    pub fn default_name(id: &str) -> String {
        format!("Board {id}")
    }

    /// Refresh the update timestamp.
    pub fn touch(&mut self) {
        self.last_update = SystemTime::now();
    }

    /// Move to `status`; phase is cleared outside of `Ready`.
    pub fn set_status(&mut self, status: BoardStatus) {
        self.status = status;
        self.phase = match status {
            BoardStatus::Ready => Some(self.phase.unwrap_or(BoardPhase::Throw)),
            _ => None,
        };
        self.touch();
    }

    /// A dart landed: the board is necessarily ready and in throw phase.
    pub fn record_throw(&mut self, payload: ThrowPayload, server_time: String) {
        self.status = BoardStatus::Ready;
        self.phase = Some(BoardPhase::Throw);
        let at = payload.detection_time.clone().unwrap_or(server_time);
        self.last_throw = Some(LastThrow { payload, at });
        self.touch();
    }

    /// Player started pulling darts.
    pub fn start_takeout(&mut self) {
        self.phase = Some(BoardPhase::Takeout);
        self.touch();
    }

    /// Takeout completed; the board waits for the next throw.
    pub fn finish_takeout(&mut self) {
        self.phase = Some(BoardPhase::Throw);
        self.touch();
    }
}
