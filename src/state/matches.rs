//! Match-level domain types: lifecycle, legs format and the visit log.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::{
    leg::{LegRuntime, PlayerSide, ThrowOutcome},
    scoring::{OutMode, Sector},
};

/// Default starting score of a leg.
pub const DEFAULT_START_SCORE: u32 = 501;
/// Default legs target when none is supplied.
pub const DEFAULT_LEGS_TARGET: u32 = 3;

/// Lifecycle of a match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum MatchStatus {
    /// Created, no leg started yet (or the last leg was closed manually).
    #[default]
    Idle,
    /// A leg is being played.
    Running,
    /// Suspended by an operator; throws are ignored.
    Paused,
    /// Terminal: a player reached the required number of legs.
    Finished,
}

/// How the number of legs needed to win is derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LegsMode {
    /// Win a majority of `target` legs.
    #[default]
    BestOf,
    /// First to win `target` legs.
    RaceTo,
}

/// Legs mode together with its numeric target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LegsFormat {
    pub mode: LegsMode,
    pub target: u32,
}

impl Default for LegsFormat {
    fn default() -> Self {
        Self {
            mode: LegsMode::BestOf,
            target: DEFAULT_LEGS_TARGET,
        }
    }
}

impl LegsFormat {
    /// Legs a player must win to take the match.
    pub fn wins_needed(&self) -> u32 {
        match self.mode {
            LegsMode::RaceTo => self.target.max(1),
            LegsMode::BestOf => self.target / 2 + 1,
        }
    }
}

/// Persisted lifecycle of a leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum LegStatus {
    InProgress,
    Finished,
}

/// A match between two players.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub id: Uuid,
    pub player_a: String,
    pub player_b: String,
    pub start_score: u32,
    /// Board the match is played on, if bound.
    pub board_id: Option<String>,
    pub status: MatchStatus,
    pub out_mode: OutMode,
    pub legs: LegsFormat,
    pub legs_won_a: u32,
    pub legs_won_b: u32,
    /// Player who throws first in the next leg.
    pub next_starter: PlayerSide,
    /// Set once the match is finished.
    pub winner: Option<PlayerSide>,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

impl Match {
    /// Freshly created match in [`MatchStatus::Idle`].
    pub fn new(
        player_a: String,
        player_b: String,
        start_score: u32,
        board_id: Option<String>,
        out_mode: OutMode,
        legs: LegsFormat,
    ) -> Self {
        let now = SystemTime::now();
        Self {
            id: Uuid::new_v4(),
            player_a,
            player_b,
            start_score,
            board_id,
            status: MatchStatus::Idle,
            out_mode,
            legs,
            legs_won_a: 0,
            legs_won_b: 0,
            next_starter: PlayerSide::A,
            winner: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Legs won by `side`.
    pub fn legs_won(&self, side: PlayerSide) -> u32 {
        match side {
            PlayerSide::A => self.legs_won_a,
            PlayerSide::B => self.legs_won_b,
        }
    }

    /// Record a leg win and report whether it decided the match.
    pub fn record_leg_win(&mut self, side: PlayerSide) -> bool {
        match side {
            PlayerSide::A => self.legs_won_a += 1,
            PlayerSide::B => self.legs_won_b += 1,
        }
        self.next_starter = side.opponent();
        if self.legs_won(side) >= self.legs.wins_needed() {
            self.status = MatchStatus::Finished;
            self.winner = Some(side);
            true
        } else {
            false
        }
    }

    /// Whether the match still holds its board.
    pub fn is_active(&self) -> bool {
        self.status != MatchStatus::Finished
    }

    pub fn touch(&mut self) {
        self.updated_at = SystemTime::now();
    }
}

/// A completed visit (one to three darts by one player).
#[derive(Debug, Clone, PartialEq)]
pub struct Visit {
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

impl Visit {
    /// Points the visit took off the player's score.
    pub fn scored(&self) -> u32 {
        self.score_before.saturating_sub(self.score_after)
    }

    /// Points the darts would have scored, busted or not.
    pub fn thrown_points(&self) -> u32 {
        self.darts.iter().map(|dart| dart.points()).sum()
    }
}

/// Leg currently attached to a match, with its in-flight visit.
#[derive(Debug, Clone, PartialEq)]
pub struct LegSlot {
    pub id: Uuid,
    pub number: u32,
    pub status: LegStatus,
    pub runtime: LegRuntime,
    /// Darts of the visit in progress.
    pub pending_darts: Vec<Sector>,
    pub winner: Option<PlayerSide>,
    pub started_at: SystemTime,
    pub finished_at: Option<SystemTime>,
}

impl LegSlot {
    /// New leg in progress.
    pub fn start(number: u32, start_score: u32, first: PlayerSide, out_mode: OutMode) -> Self {
        Self {
            id: Uuid::new_v4(),
            number,
            status: LegStatus::InProgress,
            runtime: LegRuntime::new(start_score, first, out_mode),
            pending_darts: Vec::new(),
            winner: None,
            started_at: SystemTime::now(),
            finished_at: None,
        }
    }

    /// Whether throws may still be applied.
    pub fn in_progress(&self) -> bool {
        self.status == LegStatus::InProgress
    }

    /// Mark the leg finished, optionally with a winner.
    pub fn finish(&mut self, winner: Option<PlayerSide>) {
        self.status = LegStatus::Finished;
        self.winner = winner;
        self.pending_darts.clear();
        self.finished_at = Some(SystemTime::now());
    }

    /// Apply a dart; when it closes the visit, the visit is returned for the log.
    pub fn throw_dart(&mut self, match_id: Uuid, sector: Sector) -> (ThrowOutcome, Option<Visit>) {
        let player = self.runtime.current;
        let score_before = if self.runtime.darts_in_visit == 0 {
            self.runtime.remaining(player)
        } else {
            self.runtime.visit_start_score
        };

        let outcome = self.runtime.apply_throw(sector);
        self.pending_darts.push(sector);
        if !outcome.visit_ended {
            return (outcome, None);
        }

        let visit = Visit {
            id: Uuid::new_v4(),
            match_id,
            leg_number: self.number,
            player,
            darts: std::mem::take(&mut self.pending_darts),
            score_before,
            score_after: self.runtime.remaining(player),
            bust: outcome.bust,
            checkout: outcome.leg_winner.is_some(),
            created_at: SystemTime::now(),
        };
        (outcome, Some(visit))
    }

    /// Hand the turn over without scoring. Returns the cut visit if any dart was thrown.
    pub fn cut_visit(&mut self, match_id: Uuid) -> Option<Visit> {
        let player = self.runtime.current;
        let score_before = self.runtime.visit_start_score;
        if !self.runtime.end_visit() {
            self.pending_darts.clear();
            return None;
        }

        Some(Visit {
            id: Uuid::new_v4(),
            match_id,
            leg_number: self.number,
            player,
            darts: std::mem::take(&mut self.pending_darts),
            score_before,
            score_after: self.runtime.remaining(player),
            bust: false,
            checkout: false,
            created_at: SystemTime::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(mode: LegsMode, target: u32) -> LegsFormat {
        LegsFormat { mode, target }
    }

    #[test]
    fn best_of_needs_a_majority() {
        assert_eq!(format(LegsMode::BestOf, 5).wins_needed(), 3);
        assert_eq!(format(LegsMode::BestOf, 3).wins_needed(), 2);
        assert_eq!(format(LegsMode::BestOf, 4).wins_needed(), 3);
        assert_eq!(format(LegsMode::BestOf, 1).wins_needed(), 1);
    }

    #[test]
    fn race_to_needs_exactly_the_target() {
        assert_eq!(format(LegsMode::RaceTo, 3).wins_needed(), 3);
        assert_eq!(format(LegsMode::RaceTo, 0).wins_needed(), 1);
    }

    #[test]
    fn leg_wins_finish_the_match_at_the_threshold() {
        let mut m = Match::new(
            "Ann".into(),
            "Bob".into(),
            501,
            None,
            OutMode::Double,
            format(LegsMode::RaceTo, 2),
        );
        assert!(!m.record_leg_win(PlayerSide::A));
        assert_eq!(m.next_starter, PlayerSide::B);
        assert!(!m.record_leg_win(PlayerSide::B));
        assert_eq!(m.next_starter, PlayerSide::A);
        assert!(m.record_leg_win(PlayerSide::A));
        assert_eq!(m.status, MatchStatus::Finished);
        assert_eq!(m.winner, Some(PlayerSide::A));
        assert!(!m.is_active());
    }

    #[test]
    fn visits_are_logged_when_they_close() {
        let match_id = Uuid::new_v4();
        let mut leg = LegSlot::start(1, 501, PlayerSide::A, OutMode::Double);

        assert!(leg.throw_dart(match_id, Sector::parse("T20")).1.is_none());
        assert!(leg.throw_dart(match_id, Sector::parse("S5")).1.is_none());
        assert_eq!(leg.pending_darts.len(), 2);

        let (_, visit) = leg.throw_dart(match_id, Sector::parse("S1"));
        let visit = visit.unwrap();
        assert_eq!(visit.player, PlayerSide::A);
        assert_eq!(visit.darts.len(), 3);
        assert_eq!((visit.score_before, visit.score_after), (501, 435));
        assert_eq!(visit.scored(), 66);
        assert!(leg.pending_darts.is_empty());
    }

    #[test]
    fn busted_visit_keeps_thrown_points_but_scores_nothing() {
        let match_id = Uuid::new_v4();
        let mut leg = LegSlot::start(1, 40, PlayerSide::A, OutMode::Double);

        leg.throw_dart(match_id, Sector::parse("S20"));
        let (outcome, visit) = leg.throw_dart(match_id, Sector::parse("T20"));
        let visit = visit.unwrap();
        assert!(outcome.bust);
        assert!(visit.bust);
        assert_eq!(visit.scored(), 0);
        assert_eq!(visit.thrown_points(), 80);
        assert_eq!(leg.runtime.current, PlayerSide::B);
    }

    #[test]
    fn cutting_a_visit_logs_only_thrown_darts() {
        let match_id = Uuid::new_v4();
        let mut leg = LegSlot::start(1, 501, PlayerSide::A, OutMode::Double);
        assert!(leg.cut_visit(match_id).is_none());
        assert_eq!(leg.runtime.current, PlayerSide::B);

        leg.throw_dart(match_id, Sector::parse("D10"));
        let visit = leg.cut_visit(match_id).unwrap();
        assert_eq!(visit.player, PlayerSide::B);
        assert_eq!(visit.darts, vec![Sector::parse("D10")]);
        assert_eq!(visit.score_after, 481);
        assert_eq!(leg.runtime.current, PlayerSide::A);
    }

    #[test]
    fn legs_mode_wire_names() {
        assert_eq!(serde_json::to_string(&LegsMode::BestOf).unwrap(), "\"BEST_OF\"");
        assert_eq!(serde_json::to_string(&LegsMode::RaceTo).unwrap(), "\"RACE_TO\"");
        assert_eq!(serde_json::to_string(&OutMode::Double).unwrap(), "\"DOUBLE\"");
    }
}
