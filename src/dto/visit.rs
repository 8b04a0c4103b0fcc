//! Visit log projection and manual visit entry.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::format_system_time,
    state::{leg::PlayerSide, matches::Visit, scoring::Sector},
};

/// Visits returned when no limit is given.
pub const DEFAULT_VISITS_LIMIT: usize = 50;
/// Upper bound on the visits returned by one call.
pub const MAX_VISITS_LIMIT: usize = 200;

/// One logged visit as exposed over HTTP.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct VisitView {
    pub id: Uuid,
    pub match_id: Uuid,
    pub leg_number: u32,
    pub player: PlayerSide,
    /// Sector tokens in throwing order, e.g. `T20`, `Bull`, `None`.
    pub darts: Vec<String>,
    pub score_before: u32,
    pub score_after: u32,
    pub scored: u32,
    pub bust: bool,
    pub checkout: bool,
    pub created_at: String,
}

impl From<&Visit> for VisitView {
    fn from(visit: &Visit) -> Self {
        Self {
            id: visit.id,
            match_id: visit.match_id,
            leg_number: visit.leg_number,
            player: visit.player,
            darts: visit.darts.iter().map(ToString::to_string).collect(),
            score_before: visit.score_before,
            score_after: visit.score_after,
            scored: visit.scored(),
            bust: visit.bust,
            checkout: visit.checkout,
            created_at: format_system_time(visit.created_at),
        }
    }
}

/// Query string of the visit log endpoint.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct VisitsQuery {
    /// Maximum visits to return, newest first (1..=200, default 50).
    pub limit: Option<usize>,
}

impl VisitsQuery {
    /// Requested limit clamped to the accepted range.
    pub fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_VISITS_LIMIT)
            .clamp(1, MAX_VISITS_LIMIT)
    }
}

/// Darts of one visit scored by hand.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct RecordVisitRequest {
    /// One to three sector tokens; unknown tokens count as a miss.
    #[validate(length(min = 1, max = 3))]
    pub darts: Vec<String>,
}

impl RecordVisitRequest {
    /// Visit made of `darts`.
    pub fn new<I, S>(darts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            darts: darts.into_iter().map(Into::into).collect(),
        }
    }

    /// Decoded darts, in throwing order.
    pub fn sectors(&self) -> Vec<Sector> {
        self.darts.iter().map(|token| Sector::parse(token)).collect()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(None, 50)]
    #[case(Some(0), 1)]
    #[case(Some(10), 10)]
    #[case(Some(5000), 200)]
    fn visits_limit_is_clamped(#[case] limit: Option<usize>, #[case] expected: usize) {
        assert_eq!(VisitsQuery { limit }.effective_limit(), expected);
    }

    #[test]
    fn visit_requests_hold_one_to_three_darts() {
        assert!(RecordVisitRequest::new(["T20"]).validate().is_ok());
        assert!(RecordVisitRequest::new(["T20", "T20", "T20"]).validate().is_ok());
        assert!(RecordVisitRequest::new(Vec::<String>::new()).validate().is_err());
        assert!(RecordVisitRequest::new(["S1", "S1", "S1", "S1"]).validate().is_err());
    }

    #[test]
    fn view_renders_tokens_and_points() {
        let visit = Visit {
            id: Uuid::new_v4(),
            match_id: Uuid::new_v4(),
            leg_number: 2,
            player: PlayerSide::B,
            darts: vec![Sector::parse("T20"), Sector::parse("50"), Sector::Miss],
            score_before: 301,
            score_after: 191,
            bust: false,
            checkout: false,
            created_at: std::time::SystemTime::now(),
        };
        let view = VisitView::from(&visit);
        assert_eq!(view.darts, vec!["T20", "Bull", "None"]);
        assert_eq!(view.scored, 110);
    }
}
