use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

use crate::state::{
    board::{Board, BoardCredentials},
    leg::{LegRuntime, PlayerCounters, PlayerSide},
    matches::{LegSlot, LegStatus, LegsFormat, LegsMode, Match, MatchStatus, Visit},
    scoring::{OutMode, Sector},
};

/// Board row: identity, display name and device credentials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoardEntity {
    /// Stable board identifier.
    pub id: String,
    pub name: String,
    pub serial_number: Option<String>,
    /// Reference to the device access token.
    pub access_token_ref: Option<String>,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

/// Match row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchEntity {
    /// Primary key of the match.
    pub id: Uuid,
    pub player_a: String,
    pub player_b: String,
    pub start_score: u32,
    pub board_id: Option<String>,
    pub status: MatchStatus,
    pub out_mode: OutMode,
    pub legs_mode: LegsMode,
    pub legs_target: u32,
    pub legs_won_a: u32,
    pub legs_won_b: u32,
    pub next_starter: PlayerSide,
    pub winner: Option<PlayerSide>,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

/// Leg row, mirroring the live runtime so play survives a restart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LegEntity {
    /// Primary key of the leg.
    pub id: Uuid,
    pub match_id: Uuid,
    /// Ordinal of the leg within its match, starting at 1.
    pub number: u32,
    pub status: LegStatus,
    pub current_player: PlayerSide,
    pub darts_in_visit: u8,
    pub visit_start_score: u32,
    pub visit_points: u32,
    #[serde(default)]
    pub visit_attempt: bool,
    /// Darts already thrown in the visit in progress.
    #[serde(default)]
    pub pending_darts: Vec<Sector>,
    pub player_a: PlayerCounters,
    pub player_b: PlayerCounters,
    pub winner: Option<PlayerSide>,
    pub started_at: SystemTime,
    pub finished_at: Option<SystemTime>,
}

/// Append-only visit log row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VisitEntity {
    /// Primary key of the visit.
    pub id: Uuid,
    pub match_id: Uuid,
    pub leg_number: u32,
    pub player: PlayerSide,
    pub darts: Vec<Sector>,
    pub score_before: u32,
    pub score_after: u32,
    pub bust: bool,
    pub checkout: bool,
    pub created_at: SystemTime,
}

impl From<&Board> for BoardEntity {
    fn from(board: &Board) -> Self {
        Self {
            id: board.id.clone(),
            name: board.name.clone(),
            serial_number: board.credentials.serial().map(str::to_owned),
            access_token_ref: board.credentials.token_ref().map(str::to_owned),
            created_at: board.last_update,
            updated_at: board.last_update,
        }
    }
}

impl From<BoardEntity> for Board {
    fn from(entity: BoardEntity) -> Self {
        let mut board = Board::new(entity.id, entity.name);
        board.credentials =
            BoardCredentials::from_parts(entity.serial_number, entity.access_token_ref);
        board
    }
}

impl From<&Match> for MatchEntity {
    fn from(value: &Match) -> Self {
        Self {
            id: value.id,
            player_a: value.player_a.clone(),
            player_b: value.player_b.clone(),
            start_score: value.start_score,
            board_id: value.board_id.clone(),
            status: value.status,
            out_mode: value.out_mode,
            legs_mode: value.legs.mode,
            legs_target: value.legs.target,
            legs_won_a: value.legs_won_a,
            legs_won_b: value.legs_won_b,
            next_starter: value.next_starter,
            winner: value.winner,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

impl From<MatchEntity> for Match {
    fn from(value: MatchEntity) -> Self {
        Self {
            id: value.id,
            player_a: value.player_a,
            player_b: value.player_b,
            start_score: value.start_score,
            board_id: value.board_id,
            status: value.status,
            out_mode: value.out_mode,
            legs: LegsFormat {
                mode: value.legs_mode,
                target: value.legs_target,
            },
            legs_won_a: value.legs_won_a,
            legs_won_b: value.legs_won_b,
            next_starter: value.next_starter,
            winner: value.winner,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

impl LegEntity {
    /// Snapshot `leg` of match `match_id`.
    pub fn snapshot(match_id: Uuid, leg: &LegSlot) -> Self {
        let runtime = &leg.runtime;
        Self {
            id: leg.id,
            match_id,
            number: leg.number,
            status: leg.status,
            current_player: runtime.current,
            darts_in_visit: runtime.darts_in_visit,
            visit_start_score: runtime.visit_start_score,
            visit_points: runtime.visit_points,
            visit_attempt: runtime.visit_attempt,
            pending_darts: leg.pending_darts.clone(),
            player_a: runtime.a,
            player_b: runtime.b,
            winner: leg.winner,
            started_at: leg.started_at,
            finished_at: leg.finished_at,
        }
    }

    /// Rebuild the live leg, restoring the in-flight visit counters verbatim.
    pub fn into_slot(self, out_mode: OutMode) -> LegSlot {
        LegSlot {
            id: self.id,
            number: self.number,
            status: self.status,
            runtime: LegRuntime {
                current: self.current_player,
                darts_in_visit: self.darts_in_visit,
                a: self.player_a,
                b: self.player_b,
                visit_attempt: self.visit_attempt,
                visit_start_score: self.visit_start_score,
                visit_points: self.visit_points,
                out_mode,
            },
            pending_darts: self.pending_darts,
            winner: self.winner,
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}

impl From<&Visit> for VisitEntity {
    fn from(value: &Visit) -> Self {
        Self {
            id: value.id,
            match_id: value.match_id,
            leg_number: value.leg_number,
            player: value.player,
            darts: value.darts.clone(),
            score_before: value.score_before,
            score_after: value.score_after,
            bust: value.bust,
            checkout: value.checkout,
            created_at: value.created_at,
        }
    }
}

impl From<VisitEntity> for Visit {
    fn from(value: VisitEntity) -> Self {
        Self {
            id: value.id,
            match_id: value.match_id,
            leg_number: value.leg_number,
            player: value.player,
            darts: value.darts,
            score_before: value.score_before,
            score_after: value.score_after,
            bust: value.bust,
            checkout: value.checkout,
            created_at: value.created_at,
        }
    }
}
