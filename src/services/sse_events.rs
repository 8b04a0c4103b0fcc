use serde::Serialize;
use tokio::{sync::broadcast::error::RecvError, task::JoinHandle};
use tracing::{debug, warn};

use crate::{
    dto::{
        match_state::MatchState,
        sse::{BoardView, ServerEvent},
    },
    state::{
        EventBus, SseHub,
        board::Board,
        bus::{BoardEvent, BusEvent},
    },
};

pub const EVENT_BOARD_UPDATE: &str = "board.update";
pub const EVENT_MATCH_UPDATE: &str = "match.update";
pub const EVENT_BOARDS_SNAPSHOT: &str = "boards.snapshot";
pub const EVENT_MATCHES_SNAPSHOT: &str = "matches.snapshot";

/// Relay bus events to SSE subscribers until the bus closes.
///
/// Subscribes before spawning so nothing published after this call is missed.
pub fn spawn_relay(bus: &EventBus, hub: SseHub) -> JoinHandle<()> {
    let mut receiver = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => relay(&hub, &event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "SSE relay lagged behind the event bus");
                }
                Err(RecvError::Closed) => {
                    debug!("event bus closed; SSE relay stopping");
                    break;
                }
            }
        }
    })
}

fn relay(hub: &SseHub, event: &BusEvent) {
    match event {
        BusEvent::Board(BoardEvent { board, .. }) => broadcast_board_update(hub, board),
        BusEvent::MatchUpdate { state, .. } => broadcast_match_update(hub, state),
    }
}

/// Broadcast the public view of `board`, scoped to that board.
pub fn broadcast_board_update(hub: &SseHub, board: &Board) {
    if let Some(event) = encode(EVENT_BOARD_UPDATE, &BoardView::from(board)) {
        hub.broadcast(event.for_board(board.id.clone()));
    }
}

/// Broadcast a match read-model to every subscriber.
pub fn broadcast_match_update(hub: &SseHub, state: &MatchState) {
    if let Some(event) = encode(EVENT_MATCH_UPDATE, state) {
        hub.broadcast(event);
    }
}

/// Serialize `payload` as a named event; failures are logged and yield `None`.
pub fn encode(event: &str, payload: &impl Serialize) -> Option<ServerEvent> {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => Some(event),
        Err(err) => {
            warn!(event, error = %err, "failed to serialize SSE payload");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use tokio::time::timeout;

    use super::*;
    use crate::state::bus::BoardEventKind;

    #[tokio::test]
    async fn board_events_become_scoped_board_updates() {
        let bus = EventBus::default();
        let hub = SseHub::new(16, Duration::from_secs(60));
        let mut subscription = hub.subscribe();
        let relay = spawn_relay(&bus, hub.clone());

        bus.publish(BusEvent::Board(BoardEvent {
            kind: BoardEventKind::TakeoutStarted,
            board: Board::new("board-2", "Board 2"),
            at: SystemTime::now(),
        }));

        let event = timeout(Duration::from_secs(1), subscription.receiver.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.event.as_deref(), Some(EVENT_BOARD_UPDATE));
        assert_eq!(event.board_id.as_deref(), Some("board-2"));
        assert!(event.data.contains("\"id\":\"board-2\""));
        relay.abort();
    }
}
