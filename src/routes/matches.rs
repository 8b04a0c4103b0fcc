use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    dto::{
        match_state::MatchState,
        visit::{RecordVisitRequest, VisitView, VisitsQuery},
    },
    error::AppError,
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/matches",
    responses((status = 200, description = "Every active match", body = [MatchState]))
)]
/// Poll the read-model of every active match.
pub async fn list_matches(State(state): State<SharedState>) -> Json<Vec<MatchState>> {
    Json(state.engine().list_active_states().await)
}

#[utoipa::path(
    get,
    path = "/matches/{id}/state",
    params(("id" = Uuid, Path, description = "Match identifier")),
    responses(
        (status = 200, description = "Match read-model", body = MatchState),
        (status = 404, description = "Unknown match"),
        (status = 503, description = "Storage unavailable")
    )
)]
/// Poll the read-model of one match.
pub async fn match_state(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MatchState>, AppError> {
    let match_state = state.engine().get_state(id).await?;
    Ok(Json(match_state))
}

#[utoipa::path(
    post,
    path = "/matches/{id}/visit",
    params(("id" = Uuid, Path, description = "Match identifier")),
    request_body = RecordVisitRequest,
    responses(
        (status = 200, description = "Read-model after the visit", body = MatchState),
        (status = 400, description = "Not one to three darts"),
        (status = 404, description = "Unknown match"),
        (status = 409, description = "Match paused, finished or mid-visit on its board"),
        (status = 503, description = "Storage unavailable")
    )
)]
/// Score a visit entered by hand for the player to throw.
pub async fn record_visit(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(request): Json<RecordVisitRequest>,
) -> Result<Json<MatchState>, AppError> {
    let match_state = state.engine().record_visit(id, request).await?;
    Ok(Json(match_state))
}

#[utoipa::path(
    get,
    path = "/matches/{id}/visits",
    params(("id" = Uuid, Path, description = "Match identifier"), VisitsQuery),
    responses(
        (status = 200, description = "Visit log, newest first", body = [VisitView]),
        (status = 404, description = "Unknown match"),
        (status = 503, description = "Storage unavailable")
    )
)]
/// Read the visit log of one match.
pub async fn list_visits(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Query(query): Query<VisitsQuery>,
) -> Result<Json<Vec<VisitView>>, AppError> {
    let visits = state
        .engine()
        .list_visits(id, query.effective_limit())
        .await?;
    Ok(Json(visits))
}

/// Configure the match polling and manual scoring routes.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/matches", get(list_matches))
        .route("/matches/{id}/state", get(match_state))
        .route("/matches/{id}/visit", post(record_visit))
        .route("/matches/{id}/visits", get(list_visits))
}
