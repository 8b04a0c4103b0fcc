use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{MongoDaoError, MongoResult};
use crate::{
    dao::models::{BoardEntity, LegEntity, MatchEntity, VisitEntity},
    state::{
        leg::{PlayerCounters, PlayerSide},
        matches::{LegStatus, LegsMode, MatchStatus},
        scoring::{OutMode, Sector},
    },
};

pub const BOARD_COLLECTION: &str = "boards";
pub const MATCH_COLLECTION: &str = "matches";
pub const LEG_COLLECTION: &str = "legs";
pub const VISIT_COLLECTION: &str = "visits";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoBoardDocument {
    #[serde(rename = "_id")]
    id: String,
    name: String,
    serial_number: Option<String>,
    access_token_ref: Option<String>,
    created_at: DateTime,
    updated_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoMatchDocument {
    #[serde(rename = "_id")]
    id: String,
    player_a: String,
    player_b: String,
    start_score: u32,
    board_id: Option<String>,
    status: MatchStatus,
    out_mode: OutMode,
    legs_mode: LegsMode,
    legs_target: u32,
    legs_won_a: u32,
    legs_won_b: u32,
    next_starter: PlayerSide,
    winner: Option<PlayerSide>,
    created_at: DateTime,
    updated_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoLegDocument {
    #[serde(rename = "_id")]
    id: String,
    match_id: String,
    number: u32,
    status: LegStatus,
    current_player: PlayerSide,
    darts_in_visit: u8,
    visit_start_score: u32,
    visit_points: u32,
    #[serde(default)]
    visit_attempt: bool,
    #[serde(default)]
    pending_darts: Vec<Sector>,
    player_a: PlayerCounters,
    player_b: PlayerCounters,
    winner: Option<PlayerSide>,
    started_at: DateTime,
    finished_at: Option<DateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoVisitDocument {
    #[serde(rename = "_id")]
    id: String,
    match_id: String,
    leg_number: u32,
    player: PlayerSide,
    darts: Vec<Sector>,
    score_before: u32,
    score_after: u32,
    bust: bool,
    checkout: bool,
    created_at: DateTime,
}

pub fn doc_id(id: impl ToString) -> Document {
    doc! {"_id": id.to_string()}
}

fn parse_uuid(collection: &'static str, raw: &str) -> MongoResult<Uuid> {
    Uuid::parse_str(raw).map_err(|err| MongoDaoError::Malformed {
        collection,
        id: raw.to_owned(),
        reason: err.to_string(),
    })
}

impl From<BoardEntity> for MongoBoardDocument {
    fn from(value: BoardEntity) -> Self {
        Self {
            id: value.id,
            name: value.name,
            serial_number: value.serial_number,
            access_token_ref: value.access_token_ref,
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl From<MongoBoardDocument> for BoardEntity {
    fn from(value: MongoBoardDocument) -> Self {
        Self {
            id: value.id,
            name: value.name,
            serial_number: value.serial_number,
            access_token_ref: value.access_token_ref,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
        }
    }
}

impl From<MatchEntity> for MongoMatchDocument {
    fn from(value: MatchEntity) -> Self {
        Self {
            id: value.id.to_string(),
            player_a: value.player_a,
            player_b: value.player_b,
            start_score: value.start_score,
            board_id: value.board_id,
            status: value.status,
            out_mode: value.out_mode,
            legs_mode: value.legs_mode,
            legs_target: value.legs_target,
            legs_won_a: value.legs_won_a,
            legs_won_b: value.legs_won_b,
            next_starter: value.next_starter,
            winner: value.winner,
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl TryFrom<MongoMatchDocument> for MatchEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoMatchDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_uuid(MATCH_COLLECTION, &value.id)?,
            player_a: value.player_a,
            player_b: value.player_b,
            start_score: value.start_score,
            board_id: value.board_id,
            status: value.status,
            out_mode: value.out_mode,
            legs_mode: value.legs_mode,
            legs_target: value.legs_target,
            legs_won_a: value.legs_won_a,
            legs_won_b: value.legs_won_b,
            next_starter: value.next_starter,
            winner: value.winner,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
        })
    }
}

impl From<LegEntity> for MongoLegDocument {
    fn from(value: LegEntity) -> Self {
        Self {
            id: value.id.to_string(),
            match_id: value.match_id.to_string(),
            number: value.number,
            status: value.status,
            current_player: value.current_player,
            darts_in_visit: value.darts_in_visit,
            visit_start_score: value.visit_start_score,
            visit_points: value.visit_points,
            visit_attempt: value.visit_attempt,
            pending_darts: value.pending_darts,
            player_a: value.player_a,
            player_b: value.player_b,
            winner: value.winner,
            started_at: DateTime::from_system_time(value.started_at),
            finished_at: value.finished_at.map(DateTime::from_system_time),
        }
    }
}

impl TryFrom<MongoLegDocument> for LegEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoLegDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_uuid(LEG_COLLECTION, &value.id)?,
            match_id: parse_uuid(LEG_COLLECTION, &value.match_id)?,
            number: value.number,
            status: value.status,
            current_player: value.current_player,
            darts_in_visit: value.darts_in_visit,
            visit_start_score: value.visit_start_score,
            visit_points: value.visit_points,
            visit_attempt: value.visit_attempt,
            pending_darts: value.pending_darts,
            player_a: value.player_a,
            player_b: value.player_b,
            winner: value.winner,
            started_at: value.started_at.to_system_time(),
            finished_at: value.finished_at.map(|at| at.to_system_time()),
        })
    }
}

impl From<VisitEntity> for MongoVisitDocument {
    fn from(value: VisitEntity) -> Self {
        Self {
            id: value.id.to_string(),
            match_id: value.match_id.to_string(),
            leg_number: value.leg_number,
            player: value.player,
            darts: value.darts,
            score_before: value.score_before,
            score_after: value.score_after,
            bust: value.bust,
            checkout: value.checkout,
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl TryFrom<MongoVisitDocument> for VisitEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoVisitDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_uuid(VISIT_COLLECTION, &value.id)?,
            match_id: parse_uuid(VISIT_COLLECTION, &value.match_id)?,
            leg_number: value.leg_number,
            player: value.player,
            darts: value.darts,
            score_before: value.score_before,
            score_after: value.score_after,
            bust: value.bust,
            checkout: value.checkout,
            created_at: value.created_at.to_system_time(),
        })
    }
}
