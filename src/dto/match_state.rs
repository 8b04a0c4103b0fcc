use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::{
    leg::PlayerSide,
    matches::{LegsMode, MatchStatus},
    scoring::OutMode,
};

/// Read-model of a match broadcast to observers and returned by polling.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct MatchState {
    pub id: Uuid,
    pub board_id: Option<String>,
    pub player_a: String,
    pub player_b: String,
    pub start_score: u32,
    pub status: MatchStatus,
    pub out_mode: OutMode,
    pub legs_mode: LegsMode,
    pub legs_target: u32,
    /// Legs a player must win to take the match.
    pub wins_needed: u32,
    pub legs_won_a: u32,
    pub legs_won_b: u32,
    pub winner: Option<PlayerSide>,
    /// Identifier of the leg in progress, if any.
    pub current_leg_id: Option<Uuid>,
    pub current_leg_number: Option<u32>,
    /// Counters of the current (or last played) leg.
    pub live: Option<LiveLegStats>,
    /// Statistics derived from the visit log.
    pub stats: MatchStats,
    /// RFC 3339 timestamp of the last mutation.
    pub updated_at: String,
}

/// Live counters of the leg being played.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct LiveLegStats {
    pub leg_number: u32,
    pub current_player: PlayerSide,
    pub darts_in_visit: u8,
    pub a: PlayerLegStats,
    pub b: PlayerLegStats,
}

/// Per-player counters within a leg.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PlayerLegStats {
    pub remaining: u32,
    pub darts: u32,
    pub points: u32,
    /// Three-dart average, two decimals.
    pub avg3: f64,
    pub checkout_attempts: u32,
    pub checkout_hits: u32,
    /// Checkout percentage, one decimal.
    pub checkout_pct: f64,
}

/// Match-wide statistics computed over the visit log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct MatchStats {
    pub three_dart_avg: f64,
    pub first9_avg_a: f64,
    pub first9_avg_b: f64,
    pub checkout_pct: f64,
    pub highest_finish: u32,
    pub visits_count: usize,
}
