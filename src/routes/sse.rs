use std::convert::Infallible;

use axum::{
    Router,
    extract::{Query, State},
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{services::sse_service, state::SharedState};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StreamQuery {
    /// Only receive `board.update` events for this board.
    #[serde(rename = "boardId")]
    #[param(rename = "boardId")]
    pub board_id: Option<String>,
}

#[utoipa::path(
    get,
    path = "/sse",
    params(StreamQuery),
    responses((status = 200, description = "Live board and match events", content_type = "text/event-stream", body = String))
)]
/// Stream snapshots, then incremental board and match updates.
pub async fn stream(
    State(state): State<SharedState>,
    Query(query): Query<StreamQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = sse_service::open_subscription(&state, query.board_id).await;
    sse_service::to_sse_stream(subscription)
}

/// Configure the SSE endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sse", get(stream))
}
