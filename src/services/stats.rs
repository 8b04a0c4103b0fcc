//! Builds the [`MatchState`] read-model from a match, its current leg and its visit log.

use crate::{
    dto::{
        format_system_time,
        match_state::{LiveLegStats, MatchState, MatchStats, PlayerLegStats},
    },
    state::{
        leg::{PlayerCounters, PlayerSide, three_dart_avg},
        matches::{LegSlot, Match, Visit},
    },
};

/// Derive the read-model. `leg` is the current or last played leg.
pub fn build_state(record: &Match, leg: Option<&LegSlot>, visits: &[Visit]) -> MatchState {
    let current = leg.filter(|leg| leg.in_progress());
    MatchState {
        id: record.id,
        board_id: record.board_id.clone(),
        player_a: record.player_a.clone(),
        player_b: record.player_b.clone(),
        start_score: record.start_score,
        status: record.status,
        out_mode: record.out_mode,
        legs_mode: record.legs.mode,
        legs_target: record.legs.target,
        wins_needed: record.legs.wins_needed(),
        legs_won_a: record.legs_won_a,
        legs_won_b: record.legs_won_b,
        winner: record.winner,
        current_leg_id: current.map(|leg| leg.id),
        current_leg_number: current.map(|leg| leg.number),
        live: leg.map(live_stats),
        stats: match_stats(visits),
        updated_at: format_system_time(record.updated_at),
    }
}

fn live_stats(leg: &LegSlot) -> LiveLegStats {
    LiveLegStats {
        leg_number: leg.number,
        current_player: leg.runtime.current,
        darts_in_visit: leg.runtime.darts_in_visit,
        a: player_stats(&leg.runtime.a),
        b: player_stats(&leg.runtime.b),
    }
}

fn player_stats(counters: &PlayerCounters) -> PlayerLegStats {
    let checkout_pct = if counters.checkout_attempts == 0 {
        0.0
    } else {
        f64::from(counters.checkout_hits) / f64::from(counters.checkout_attempts) * 100.0
    };
    PlayerLegStats {
        remaining: counters.remaining,
        darts: counters.darts,
        points: counters.points,
        avg3: round_to(three_dart_avg(counters.points, counters.darts), 2),
        checkout_attempts: counters.checkout_attempts,
        checkout_hits: counters.checkout_hits,
        checkout_pct: round_to(checkout_pct, 1),
    }
}

/// Match-wide statistics over the visit log, busted visits excluded from averages.
pub fn match_stats(visits: &[Visit]) -> MatchStats {
    let scoring: Vec<&Visit> = visits.iter().filter(|visit| !visit.bust).collect();

    let first_nine = |side: PlayerSide| {
        let (points, darts) = scoring
            .iter()
            .filter(|visit| visit.player == side)
            .take(3)
            .fold((0, 0), |(points, darts), visit| {
                (points + visit.scored(), darts + visit.darts.len() as u32)
            });
        round_to(three_dart_avg(points, darts), 2)
    };

    let (points, darts) = scoring.iter().fold((0, 0), |(points, darts), visit| {
        (points + visit.scored(), darts + visit.darts.len() as u32)
    });

    let hits = visits.iter().filter(|visit| visit.checkout).count();
    let attempts = visits
        .iter()
        .filter(|visit| visit.checkout || (visit.bust && visit.thrown_points() > 0))
        .count();
    let checkout_pct = if attempts == 0 {
        0.0
    } else {
        hits as f64 * 100.0 / attempts as f64
    };

    let highest_finish = visits
        .iter()
        .filter(|visit| visit.checkout && visit.score_after == 0)
        .map(|visit| visit.score_before)
        .max()
        .unwrap_or(0);

    MatchStats {
        three_dart_avg: round_to(three_dart_avg(points, darts), 2),
        first9_avg_a: first_nine(PlayerSide::A),
        first9_avg_b: first_nine(PlayerSide::B),
        checkout_pct: round_to(checkout_pct, 1),
        highest_finish,
        visits_count: visits.len(),
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
