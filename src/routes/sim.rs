//! Thin ingress for device adapters: each call is one parsed device notification.

use axum::{Json, Router, extract::State, routing::post};
use validator::Validate;

use crate::{
    dto::{
        sim::{
            BoardRef, BoardStatusRequest, RegisterBoardRequest, SimThrowRequest,
            TakeoutFinishedRequest,
        },
        sse::BoardView,
    },
    error::{AppError, ServiceError},
    state::SharedState,
};

fn validated<T: Validate>(request: T) -> Result<T, AppError> {
    request.validate().map_err(ServiceError::from)?;
    Ok(request)
}

#[utoipa::path(
    post,
    path = "/sim/board/register",
    request_body = RegisterBoardRequest,
    responses(
        (status = 200, description = "Registered board", body = BoardView),
        (status = 400, description = "Missing boardId")
    )
)]
/// Create or rename a board and store its device credentials.
pub async fn register_board(
    State(state): State<SharedState>,
    Json(request): Json<RegisterBoardRequest>,
) -> Result<Json<BoardView>, AppError> {
    let request = validated(request)?;
    let board_id = request.board_id.trim();
    let mut board = state.boards().upsert(board_id, request.name.clone()).await;
    if request.has_credentials() {
        board = state
            .boards()
            .set_credentials(board_id, request.serial_number, request.access_token)
            .await;
    }
    Ok(Json(BoardView::from(&board)))
}

#[utoipa::path(
    post,
    path = "/sim/board/status",
    request_body = BoardStatusRequest,
    responses(
        (status = 200, description = "Board after the transition", body = BoardView),
        (status = 400, description = "Missing boardId")
    )
)]
/// Report a lifecycle status change.
pub async fn board_status(
    State(state): State<SharedState>,
    Json(request): Json<BoardStatusRequest>,
) -> Result<Json<BoardView>, AppError> {
    let request = validated(request)?;
    let board = state
        .boards()
        .set_status(request.board_id.trim(), request.status);
    Ok(Json(BoardView::from(&board)))
}

#[utoipa::path(
    post,
    path = "/sim/throw",
    request_body = SimThrowRequest,
    responses(
        (status = 200, description = "Board after the throw", body = BoardView),
        (status = 400, description = "Missing boardId or sector")
    )
)]
/// Report a detected dart; the bound match scores it asynchronously.
pub async fn throw(
    State(state): State<SharedState>,
    Json(request): Json<SimThrowRequest>,
) -> Result<Json<BoardView>, AppError> {
    let request = validated(request)?;
    let board = state
        .boards()
        .apply_throw(request.board_id.trim(), request.throw);
    Ok(Json(BoardView::from(&board)))
}

#[utoipa::path(
    post,
    path = "/sim/takeout/start",
    request_body = BoardRef,
    responses(
        (status = 200, description = "Board in takeout", body = BoardView),
        (status = 400, description = "Missing boardId")
    )
)]
/// Report that a player started pulling darts.
pub async fn takeout_start(
    State(state): State<SharedState>,
    Json(request): Json<BoardRef>,
) -> Result<Json<BoardView>, AppError> {
    let request = validated(request)?;
    let board = state.boards().takeout_start(request.board_id.trim());
    Ok(Json(BoardView::from(&board)))
}

#[utoipa::path(
    post,
    path = "/sim/takeout/finish",
    request_body = TakeoutFinishedRequest,
    responses(
        (status = 200, description = "Board waiting for darts", body = BoardView),
        (status = 400, description = "Missing boardId")
    )
)]
/// Report the end of a takeout; a real one ends the visit in progress.
pub async fn takeout_finish(
    State(state): State<SharedState>,
    Json(request): Json<TakeoutFinishedRequest>,
) -> Result<Json<BoardView>, AppError> {
    let request = validated(request)?;
    let board = state
        .boards()
        .takeout_finish(request.board_id.trim(), request.false_takeout);
    Ok(Json(BoardView::from(&board)))
}

/// Configure the device adapter ingress.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/sim/board/register", post(register_board))
        .route("/sim/board/status", post(board_status))
        .route("/sim/throw", post(throw))
        .route("/sim/takeout/start", post(takeout_start))
        .route("/sim/takeout/finish", post(takeout_finish))
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;
    use crate::{
        config::AppConfig,
        dao::match_store::memory::InMemoryMatchStore,
        dto::validation::CreateMatchRequest,
        state::{
            AppState,
            board::{BoardPhase, BoardStatus, ThrowPayload},
        },
    };

    fn throw_request(board_id: &str, sector: &str) -> SimThrowRequest {
        SimThrowRequest {
            board_id: board_id.into(),
            throw: ThrowPayload::sector(sector),
        }
    }

    #[tokio::test]
    async fn register_creates_boards_and_masks_tokens() {
        let state = AppState::new(AppConfig::default());
        let Json(view) = register_board(
            State(state.clone()),
            Json(RegisterBoardRequest {
                board_id: " board-7 ".into(),
                name: None,
                serial_number: Some("SN-7".into()),
                access_token: Some("secret-token".into()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(view.id, "board-7");
        assert_eq!(view.name, "Board board-7");
        assert!(view.credentials.configured);
        assert_eq!(view.credentials.access_token_masked.as_deref(), Some("secr…en"));
        assert!(state.boards().get("board-7").is_some());

        let err = register_board(
            State(state),
            Json(RegisterBoardRequest {
                board_id: "  ".into(),
                name: None,
                serial_number: None,
                access_token: None,
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn blank_sector_is_rejected() {
        let state = AppState::new(AppConfig::default());
        let err = throw(State(state), Json(throw_request("board-1", " ")))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn takeout_cycle_moves_the_board_phase() {
        let state = AppState::new(AppConfig::default());
        let Json(view) = takeout_start(
            State(state.clone()),
            Json(BoardRef {
                board_id: "board-1".into(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(view.phase, Some(BoardPhase::Takeout));

        let Json(view) = takeout_finish(
            State(state.clone()),
            Json(TakeoutFinishedRequest {
                board_id: "board-1".into(),
                false_takeout: false,
            }),
        )
        .await
        .unwrap();
        assert_eq!(view.phase, Some(BoardPhase::Throw));

        let Json(view) = board_status(
            State(state),
            Json(BoardStatusRequest {
                board_id: "board-1".into(),
                status: BoardStatus::Calibrating,
            }),
        )
        .await
        .unwrap();
        assert_eq!(view.status, BoardStatus::Calibrating);
        assert_eq!(view.phase, None);
    }

    #[tokio::test]
    async fn ingress_throws_score_the_bound_match() {
        let state = AppState::new(AppConfig::default());
        state
            .install_store(Arc::new(InMemoryMatchStore::new()))
            .await;
        let workers = state.start();
        let created = state
            .engine()
            .create_match(CreateMatchRequest::new("Ann", "Bob").on_board("board-1"))
            .await
            .unwrap();

        let Json(view) = throw(State(state.clone()), Json(throw_request("board-1", "T20")))
            .await
            .unwrap();
        assert_eq!(view.last_throw.unwrap().payload.sector, "T20");

        let mut remaining = None;
        for _ in 0..100 {
            let live = state.engine().get_state(created.id).await.unwrap().live;
            remaining = live.map(|live| live.a.remaining);
            if remaining == Some(441) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(remaining, Some(441));

        for worker in workers {
            worker.abort();
        }
    }
}
