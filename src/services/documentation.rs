use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI document for Dart Live Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::stream,
        crate::routes::matches::list_matches,
        crate::routes::matches::match_state,
        crate::routes::matches::record_visit,
        crate::routes::matches::list_visits,
        crate::routes::sim::register_board,
        crate::routes::sim::board_status,
        crate::routes::sim::throw,
        crate::routes::sim::takeout_start,
        crate::routes::sim::takeout_finish,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::health::StorageHealth,
            crate::dto::match_state::MatchState,
            crate::dto::match_state::LiveLegStats,
            crate::dto::match_state::PlayerLegStats,
            crate::dto::match_state::MatchStats,
            crate::dto::sse::BoardView,
            crate::dto::sse::LastThrowView,
            crate::dto::sse::CredentialsView,
            crate::dto::sse::BoardsSnapshot,
            crate::dto::sse::MatchesSnapshot,
            crate::dto::validation::CreateMatchRequest,
            crate::dto::visit::VisitView,
            crate::dto::visit::RecordVisitRequest,
            crate::dto::sim::RegisterBoardRequest,
            crate::dto::sim::BoardStatusRequest,
            crate::dto::sim::SimThrowRequest,
            crate::dto::sim::BoardRef,
            crate::dto::sim::TakeoutFinishedRequest,
            crate::state::board::ThrowPayload,
            crate::state::board::ThrowAngle,
            crate::state::board::BoardStatus,
            crate::state::board::BoardPhase,
            crate::state::matches::MatchStatus,
            crate::state::matches::LegsMode,
            crate::state::leg::PlayerSide,
            crate::state::scoring::OutMode,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Live board and match events"),
        (name = "matches", description = "Match read-model polling and manual scoring"),
        (name = "sim", description = "Device adapter ingress"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/healthcheck",
            "/sse",
            "/matches",
            "/matches/{id}/state",
            "/matches/{id}/visit",
            "/matches/{id}/visits",
            "/sim/board/register",
            "/sim/throw",
            "/sim/takeout/finish",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
