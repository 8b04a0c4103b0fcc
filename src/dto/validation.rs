//! Validated inputs accepted by the match engine.

use serde::Deserialize;
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

use crate::state::{
    matches::{DEFAULT_LEGS_TARGET, DEFAULT_START_SCORE, LegsFormat, LegsMode},
    scoring::OutMode,
};

/// Request to create a match between two players.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct CreateMatchRequest {
    #[validate(custom(function = "validate_player_name"))]
    pub player_a: String,
    #[validate(custom(function = "validate_player_name"))]
    pub player_b: String,
    /// Board to bind the match to.
    #[serde(default)]
    pub board_id: Option<String>,
    #[serde(default = "default_start_score")]
    #[validate(range(min = 2, max = 10_001))]
    pub start_score: u32,
    #[serde(default)]
    pub out_mode: OutMode,
    #[serde(default)]
    pub legs_mode: LegsMode,
    #[serde(default = "default_legs_target")]
    #[validate(range(min = 1, max = 99))]
    pub legs_target: u32,
}

impl CreateMatchRequest {
    /// Two players on the default 501 / double-out / best-of-3 format.
    pub fn new(player_a: impl Into<String>, player_b: impl Into<String>) -> Self {
        Self {
            player_a: player_a.into(),
            player_b: player_b.into(),
            board_id: None,
            start_score: DEFAULT_START_SCORE,
            out_mode: OutMode::Double,
            legs_mode: LegsMode::BestOf,
            legs_target: DEFAULT_LEGS_TARGET,
        }
    }

    /// Bind the match to `board_id`.
    pub fn on_board(mut self, board_id: impl Into<String>) -> Self {
        self.board_id = Some(board_id.into());
        self
    }

    /// Override the legs format.
    pub fn legs(mut self, mode: LegsMode, target: u32) -> Self {
        self.legs_mode = mode;
        self.legs_target = target;
        self
    }

    /// Legs format of the request.
    pub fn legs_format(&self) -> LegsFormat {
        LegsFormat {
            mode: self.legs_mode,
            target: self.legs_target,
        }
    }
}

fn default_start_score() -> u32 {
    DEFAULT_START_SCORE
}

fn default_legs_target() -> u32 {
    DEFAULT_LEGS_TARGET
}

/// Player names must contain something other than whitespace.
pub fn validate_player_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        let mut err = ValidationError::new("player_name_blank");
        err.message = Some("Player name must not be empty".into());
        return Err(err);
    }
    Ok(())
}
