//! Live progress of a single leg, advanced one dart at a time.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::scoring::{MAX_CHECKOUT, OutMode, Sector, will_bust};

/// Darts allowed in one visit.
pub const DARTS_PER_VISIT: u8 = 3;

/// One of the two players of a match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum PlayerSide {
    /// First named player; throws first in leg one.
    #[default]
    A,
    /// Second named player.
    B,
}

impl PlayerSide {
    /// The other player.
    pub fn opponent(self) -> Self {
        match self {
            PlayerSide::A => PlayerSide::B,
            PlayerSide::B => PlayerSide::A,
        }
    }
}

/// Running counters kept for one player during a leg.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PlayerCounters {
    /// Score still required to finish the leg.
    pub remaining: u32,
    /// Points counted towards the average (busted visits excluded).
    pub points: u32,
    /// Darts thrown, busted ones included.
    pub darts: u32,
    /// Visits started within checkout range.
    pub checkout_attempts: u32,
    /// Checkout attempts that finished the leg.
    pub checkout_hits: u32,
}

impl PlayerCounters {
    fn starting_at(score: u32) -> Self {
        Self {
            remaining: score,
            ..Self::default()
        }
    }
}

/// Result of feeding one dart into a [`LegRuntime`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrowOutcome {
    /// Player who threw the dart.
    pub player: PlayerSide,
    /// The visit busted and its score was discarded.
    pub bust: bool,
    /// Set when the dart finished the leg.
    pub leg_winner: Option<PlayerSide>,
    /// The dart closed the visit (bust, checkout or third dart).
    pub visit_ended: bool,
}

/// Authoritative in-memory state of a leg being played.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegRuntime {
    /// Player whose visit is in progress.
    pub current: PlayerSide,
    /// Darts already thrown in the current visit (0..3).
    pub darts_in_visit: u8,
    /// Counters for player A.
    pub a: PlayerCounters,
    /// Counters for player B.
    pub b: PlayerCounters,
    /// The current visit already counted a checkout attempt.
    pub visit_attempt: bool,
    /// Remaining score of the current player when the visit began.
    pub visit_start_score: u32,
    /// Points scored so far in the current visit.
    pub visit_points: u32,
    /// Finishing rule for this leg.
    pub out_mode: OutMode,
}

impl LegRuntime {
    /// Fresh leg where both players start from `start_score` and `first` throws first.
    pub fn new(start_score: u32, first: PlayerSide, out_mode: OutMode) -> Self {
        Self {
            current: first,
            darts_in_visit: 0,
            a: PlayerCounters::starting_at(start_score),
            b: PlayerCounters::starting_at(start_score),
            visit_attempt: false,
            visit_start_score: start_score,
            visit_points: 0,
            out_mode,
        }
    }

    /// Counters of `side`.
    pub fn counters(&self, side: PlayerSide) -> &PlayerCounters {
        match side {
            PlayerSide::A => &self.a,
            PlayerSide::B => &self.b,
        }
    }

    fn counters_mut(&mut self, side: PlayerSide) -> &mut PlayerCounters {
        match side {
            PlayerSide::A => &mut self.a,
            PlayerSide::B => &mut self.b,
        }
    }

    /// Remaining score of `side`.
    pub fn remaining(&self, side: PlayerSide) -> u32 {
        self.counters(side).remaining
    }

    /// Apply one dart for the current player.
    pub fn apply_throw(&mut self, sector: Sector) -> ThrowOutcome {
        let player = self.current;

        if self.darts_in_visit == 0 {
            self.visit_start_score = self.remaining(player);
            self.visit_points = 0;
            if self.visit_start_score <= MAX_CHECKOUT {
                self.visit_attempt = true;
                self.counters_mut(player).checkout_attempts += 1;
            }
        }

        let points = sector.points();
        let remaining = self.remaining(player);
        self.counters_mut(player).darts += 1;

        if will_bust(remaining, sector, self.out_mode) {
            let visit_start = self.visit_start_score;
            let visit_points = self.visit_points;
            let counters = self.counters_mut(player);
            counters.remaining = visit_start;
            counters.points -= visit_points;
            self.close_visit(player.opponent());
            return ThrowOutcome {
                player,
                bust: true,
                leg_winner: None,
                visit_ended: true,
            };
        }

        let after = remaining - points;
        {
            let counters = self.counters_mut(player);
            counters.remaining = after;
            counters.points += points;
        }
        self.visit_points += points;
        self.darts_in_visit += 1;

        if after == 0 {
            if self.visit_attempt {
                self.counters_mut(player).checkout_hits += 1;
            }
            self.close_visit(player);
            return ThrowOutcome {
                player,
                bust: false,
                leg_winner: Some(player),
                visit_ended: true,
            };
        }

        if self.darts_in_visit >= DARTS_PER_VISIT {
            self.close_visit(player.opponent());
            return ThrowOutcome {
                player,
                bust: false,
                leg_winner: None,
                visit_ended: true,
            };
        }

        ThrowOutcome {
            player,
            bust: false,
            leg_winner: None,
            visit_ended: false,
        }
    }

    /// End the current visit early and hand the turn over without scoring.
    ///
    /// Returns `false` when no dart of the visit had been thrown yet.
    pub fn end_visit(&mut self) -> bool {
        let mid_visit = self.darts_in_visit > 0;
        self.close_visit(self.current.opponent());
        mid_visit
    }

    fn close_visit(&mut self, next: PlayerSide) {
        self.darts_in_visit = 0;
        self.visit_attempt = false;
        self.visit_points = 0;
        self.current = next;
        self.visit_start_score = self.remaining(next);
    }
}

/// Three-dart average for `points` scored over `darts`.
pub fn three_dart_avg(points: u32, darts: u32) -> f64 {
    if darts == 0 {
        return 0.0;
    }
    f64::from(points) / f64::from(darts) * 3.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn throw(rt: &mut LegRuntime, token: &str) -> ThrowOutcome {
        rt.apply_throw(Sector::parse(token))
    }

    #[test]
    fn three_scoring_darts_close_the_visit() {
        let mut rt = LegRuntime::new(501, PlayerSide::A, OutMode::Double);
        assert!(!throw(&mut rt, "T20").visit_ended);
        assert!(!throw(&mut rt, "T20").visit_ended);
        assert_eq!(rt.darts_in_visit, 2);
        let outcome = throw(&mut rt, "T20");
        assert!(outcome.visit_ended);
        assert!(!outcome.bust);
        assert_eq!(rt.darts_in_visit, 0);
        assert_eq!(rt.current, PlayerSide::B);
        assert_eq!(rt.a.remaining, 321);
        assert_eq!(rt.a.points, 180);
        assert_eq!(rt.a.darts, 3);
    }

    #[test]
    fn every_non_finishing_visit_switches_turn() {
        let mut rt = LegRuntime::new(501, PlayerSide::A, OutMode::Double);
        for visit in 0..6 {
            for _ in 0..3 {
                throw(&mut rt, "S1");
            }
            assert_eq!(rt.darts_in_visit, 0);
            let expected = if visit % 2 == 0 { PlayerSide::B } else { PlayerSide::A };
            assert_eq!(rt.current, expected);
        }
    }

    #[test]
    fn bust_on_first_dart_still_ends_the_turn() {
        let mut rt = LegRuntime::new(501, PlayerSide::A, OutMode::Double);
        rt.a.remaining = 20;
        let outcome = throw(&mut rt, "S20");
        assert!(outcome.bust);
        assert!(outcome.visit_ended);
        assert_eq!(rt.a.remaining, 20);
        assert_eq!(rt.a.points, 0);
        assert_eq!(rt.a.darts, 1);
        assert_eq!(rt.current, PlayerSide::B);
        assert_eq!(rt.darts_in_visit, 0);
    }

    #[test]
    fn bust_discards_the_whole_visit() {
        let mut rt = LegRuntime::new(501, PlayerSide::A, OutMode::Double);
        rt.a.remaining = 41;
        throw(&mut rt, "S20");
        assert_eq!(rt.a.remaining, 21);
        let outcome = throw(&mut rt, "S20");
        assert!(outcome.bust);
        assert_eq!(rt.a.remaining, 41);
        assert_eq!(rt.a.points, 0);
        assert_eq!(rt.a.darts, 2);
        assert_eq!(rt.current, PlayerSide::B);
    }

    #[test]
    fn maximums_then_overshoot_reverts_to_visit_start() {
        let mut rt = LegRuntime::new(501, PlayerSide::A, OutMode::Double);
        let mut remaining = Vec::new();
        for _ in 0..2 {
            for _ in 0..3 {
                throw(&mut rt, "T20");
            }
            remaining.push(rt.a.remaining);
            for _ in 0..3 {
                throw(&mut rt, "S1");
            }
        }
        assert_eq!(remaining, vec![321, 141]);

        throw(&mut rt, "T20");
        throw(&mut rt, "T20");
        let outcome = throw(&mut rt, "T20");
        assert!(outcome.bust);
        assert_eq!(rt.a.remaining, 141);
        assert_eq!(rt.a.points, 360);
        assert_eq!(rt.current, PlayerSide::B);
    }

    #[test]
    fn single_to_zero_busts_in_double_out() {
        let mut rt = LegRuntime::new(501, PlayerSide::A, OutMode::Double);
        rt.a.remaining = 1;
        let outcome = throw(&mut rt, "S1");
        assert!(outcome.bust);
        assert_eq!(rt.a.remaining, 1);
        assert_eq!(rt.current, PlayerSide::B);

        let mut rt = LegRuntime::new(501, PlayerSide::A, OutMode::Double);
        rt.a.remaining = 20;
        assert!(throw(&mut rt, "S20").bust);
        assert_eq!(rt.a.remaining, 20);
    }

    #[test]
    fn double_twenty_checks_out_forty() {
        let mut rt = LegRuntime::new(501, PlayerSide::A, OutMode::Double);
        rt.a.remaining = 40;
        let outcome = throw(&mut rt, "D20");
        assert_eq!(outcome.leg_winner, Some(PlayerSide::A));
        assert!(!outcome.bust);
        assert_eq!(rt.a.remaining, 0);
        assert_eq!(rt.a.checkout_attempts, 1);
        assert_eq!(rt.a.checkout_hits, 1);
        assert_eq!(rt.darts_in_visit, 0);
        assert_eq!(rt.current, PlayerSide::A);
    }

    #[test]
    fn double_one_is_a_valid_finish() {
        let mut rt = LegRuntime::new(501, PlayerSide::A, OutMode::Double);
        rt.a.remaining = 2;
        let outcome = throw(&mut rt, "D1");
        assert_eq!(outcome.leg_winner, Some(PlayerSide::A));
        assert_eq!(rt.a.checkout_hits, 1);
    }

    #[test]
    fn checkout_attempt_is_counted_once_per_visit() {
        let mut rt = LegRuntime::new(501, PlayerSide::A, OutMode::Double);
        rt.a.remaining = 170;
        throw(&mut rt, "S1");
        throw(&mut rt, "S1");
        throw(&mut rt, "S1");
        assert_eq!(rt.a.checkout_attempts, 1);
        assert_eq!(rt.a.checkout_hits, 0);
    }

    #[test]
    fn no_attempt_above_checkout_range() {
        let mut rt = LegRuntime::new(501, PlayerSide::A, OutMode::Double);
        rt.a.remaining = 171;
        throw(&mut rt, "S1");
        assert_eq!(rt.a.checkout_attempts, 0);
    }

    #[test]
    fn win_after_entering_range_mid_visit_is_not_a_hit() {
        let mut rt = LegRuntime::new(501, PlayerSide::A, OutMode::Single);
        rt.a.remaining = 180;
        throw(&mut rt, "T20");
        throw(&mut rt, "T20");
        let outcome = throw(&mut rt, "T20");
        assert_eq!(outcome.leg_winner, Some(PlayerSide::A));
        assert_eq!(rt.a.checkout_attempts, 0);
        assert_eq!(rt.a.checkout_hits, 0);
    }

    #[test]
    fn single_out_allows_finishing_on_a_single() {
        let mut rt = LegRuntime::new(301, PlayerSide::B, OutMode::Single);
        rt.b.remaining = 1;
        let outcome = throw(&mut rt, "S1");
        assert_eq!(outcome.leg_winner, Some(PlayerSide::B));
    }

    #[test]
    fn end_visit_switches_turn_without_scoring() {
        let mut rt = LegRuntime::new(501, PlayerSide::A, OutMode::Double);
        throw(&mut rt, "T20");
        assert!(rt.end_visit());
        assert_eq!(rt.current, PlayerSide::B);
        assert_eq!(rt.darts_in_visit, 0);
        assert_eq!(rt.a.remaining, 441);
        assert!(!rt.end_visit());
        assert_eq!(rt.current, PlayerSide::A);
    }

    #[test]
    fn three_dart_average() {
        assert_eq!(three_dart_avg(0, 0), 0.0);
        assert_eq!(three_dart_avg(180, 3), 180.0);
        assert_eq!(three_dart_avg(100, 6), 50.0);
    }
}
