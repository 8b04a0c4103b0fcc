//! Bodies accepted by the device adapter ingress.

use serde::Deserialize;
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

use crate::state::board::{BoardStatus, ThrowPayload};

/// Register a board, or rename it and update its credentials.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterBoardRequest {
    #[serde(default)]
    #[validate(custom(function = "validate_board_id"))]
    pub board_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
}

impl RegisterBoardRequest {
    /// Whether any credential part was sent.
    pub fn has_credentials(&self) -> bool {
        self.serial_number.is_some() || self.access_token.is_some()
    }
}

/// Dart detected on a board.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SimThrowRequest {
    #[serde(default)]
    #[validate(custom(function = "validate_board_id"))]
    pub board_id: String,
    #[serde(flatten)]
    #[validate(custom(function = "validate_sector"))]
    pub throw: ThrowPayload,
}

/// Event addressed to a board without further payload.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BoardRef {
    #[serde(default)]
    #[validate(custom(function = "validate_board_id"))]
    pub board_id: String,
}

/// Takeout completed on a board.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TakeoutFinishedRequest {
    #[serde(default)]
    #[validate(custom(function = "validate_board_id"))]
    pub board_id: String,
    /// The board reported a takeout although no dart was pulled.
    #[serde(default)]
    pub false_takeout: bool,
}

/// Lifecycle status reported by a board.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BoardStatusRequest {
    #[serde(default)]
    #[validate(custom(function = "validate_board_id"))]
    pub board_id: String,
    pub status: BoardStatus,
}

fn validate_board_id(board_id: &str) -> Result<(), ValidationError> {
    if board_id.trim().is_empty() {
        let mut err = ValidationError::new("board_id_required");
        err.message = Some("boardId is required".into());
        return Err(err);
    }
    Ok(())
}

fn validate_sector(payload: &ThrowPayload) -> Result<(), ValidationError> {
    if payload.sector.trim().is_empty() {
        let mut err = ValidationError::new("sector_required");
        err.message = Some("sector is required".into());
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throw_requests_flatten_the_device_payload() {
        let request: SimThrowRequest =
            serde_json::from_str(r#"{"boardId":"board-1","sector":"T20","bounceout":false}"#)
                .unwrap();
        assert!(request.validate().is_ok());
        assert_eq!(request.throw.sector, "T20");
        assert_eq!(request.throw.bounceout, Some(false));
    }

    #[test]
    fn missing_board_or_sector_fails_validation() {
        let request: SimThrowRequest = serde_json::from_str(r#"{"sector":"T20"}"#).unwrap();
        assert!(request.validate().unwrap_err().field_errors().contains_key("board_id"));

        let request: SimThrowRequest = serde_json::from_str(r#"{"boardId":"b"}"#).unwrap();
        assert!(request.validate().is_err());

        let request: TakeoutFinishedRequest = serde_json::from_str("{}").unwrap();
        assert!(request.validate().is_err());
    }

    #[test]
    fn credentials_are_optional_on_registration() {
        let request: RegisterBoardRequest =
            serde_json::from_str(r#"{"boardId":"board-3","name":"Oche"}"#).unwrap();
        assert!(request.validate().is_ok());
        assert!(!request.has_credentials());
    }
}
