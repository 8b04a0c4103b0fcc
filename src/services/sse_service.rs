use std::convert::Infallible;

use axum::response::sse::{Event, Sse};
use futures::{Stream, StreamExt};
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

use crate::{
    dto::sse::{BoardView, BoardsSnapshot, MatchesSnapshot, ServerEvent},
    services::sse_events::{EVENT_BOARDS_SNAPSHOT, EVENT_MATCHES_SNAPSHOT, encode},
    state::{SharedState, Subscription},
};

/// A registered SSE subscriber together with the snapshots it must receive first.
pub struct SseSubscription {
    subscription: Subscription,
    snapshots: Vec<ServerEvent>,
    filter: Option<String>,
}

impl SseSubscription {
    /// Snapshot events, in sending order.
    pub fn snapshots(&self) -> &[ServerEvent] {
        &self.snapshots
    }
}

/// Register a subscriber, optionally restricted to one board, and build its snapshots.
///
/// The subscriber is registered before the snapshots are taken, so an update
/// racing the connection is delivered at worst twice, never lost.
pub async fn open_subscription(state: &SharedState, filter: Option<String>) -> SseSubscription {
    let filter = filter
        .map(|id| id.trim().to_owned())
        .filter(|id| !id.is_empty());
    let subscription = state.sse().subscribe();

    let boards = state
        .boards()
        .list()
        .iter()
        .filter(|board| filter.as_deref().is_none_or(|wanted| board.id == wanted))
        .map(BoardView::from)
        .collect();
    let matches = state.engine().list_active_states().await;

    let snapshots = [
        encode(EVENT_BOARDS_SNAPSHOT, &BoardsSnapshot { boards }),
        encode(EVENT_MATCHES_SNAPSHOT, &MatchesSnapshot { matches }),
    ]
    .into_iter()
    .flatten()
    .collect();

    info!(board_filter = ?filter, "SSE subscriber connected");
    SseSubscription {
        subscription,
        snapshots,
        filter,
    }
}

/// Convert a subscription into an SSE response: snapshots first, then filtered updates.
pub fn to_sse_stream(
    subscription: SseSubscription,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = spawn_forwarder(subscription);
    // when the client disconnects axum drops this stream, which stops the forwarder
    Sse::new(
        ReceiverStream::new(events).map(|payload| Ok::<_, Infallible>(to_event(payload))),
    )
}

/// Spawn the task feeding one subscriber: its snapshots, then every live event
/// visible through its board filter.
///
/// The task owns the subscription; it ends, unregistering the subscriber, once
/// the returned receiver is dropped.
pub fn spawn_forwarder(subscription: SseSubscription) -> mpsc::Receiver<ServerEvent> {
    let SseSubscription {
        subscription,
        snapshots,
        filter,
    } = subscription;
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<ServerEvent>(8);

    tokio::spawn(async move {
        let mut subscription = subscription;
        let mut connected = true;
        for snapshot in snapshots {
            if tx.send(snapshot).await.is_err() {
                connected = false;
                break;
            }
        }

        while connected {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = subscription.receiver.recv() => {
                    match recv_result {
                        Ok(payload) => {
                            if !payload.visible_to(filter.as_deref()) {
                                continue;
                            }
                            if tx.send(payload).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(skipped)) => {
                            // Skip lagged messages but keep the stream alive.
                            debug!(skipped, "SSE subscriber lagged");
                            continue;
                        }
                    }
                }
            }
        }

        info!(board_filter = ?filter, "SSE subscriber disconnected");
    });

    rx
}

fn to_event(payload: ServerEvent) -> Event {
    let event = Event::default().data(payload.data);
    match payload.event {
        Some(name) => event.event(name),
        None => event,
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use tokio::time::timeout;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::match_store::memory::InMemoryMatchStore,
        dto::validation::CreateMatchRequest,
        services::sse_events::{EVENT_BOARD_UPDATE, EVENT_MATCH_UPDATE, broadcast_board_update},
        state::{AppState, board::Board},
    };

    #[tokio::test]
    async fn snapshots_respect_the_board_filter() {
        let state = AppState::new(AppConfig::default());
        state
            .install_store(Arc::new(InMemoryMatchStore::new()))
            .await;
        state.boards().upsert("board-1", None).await;
        state.boards().upsert("board-2", None).await;
        state
            .engine()
            .create_match(CreateMatchRequest::new("Ann", "Bob").on_board("board-1"))
            .await
            .unwrap();

        let subscription = open_subscription(&state, Some(" board-2 ".into())).await;
        let snapshots = subscription.snapshots();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].event.as_deref(), Some(EVENT_BOARDS_SNAPSHOT));
        assert!(snapshots[0].data.contains("board-2"));
        assert!(!snapshots[0].data.contains("board-1"));
        assert_eq!(snapshots[1].event.as_deref(), Some(EVENT_MATCHES_SNAPSHOT));
        assert!(snapshots[1].data.contains("Ann"));
        assert_eq!(state.sse().subscriber_count(), 1);

        drop(subscription);
        assert_eq!(state.sse().subscriber_count(), 0);
    }

    async fn next(events: &mut mpsc::Receiver<ServerEvent>) -> ServerEvent {
        timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn forwarder_sends_snapshots_then_filtered_updates() {
        let state = AppState::new(AppConfig::default());
        let subscription = open_subscription(&state, Some("board-2".into())).await;
        let mut events = spawn_forwarder(subscription);

        assert_eq!(next(&mut events).await.event.as_deref(), Some(EVENT_BOARDS_SNAPSHOT));
        assert_eq!(next(&mut events).await.event.as_deref(), Some(EVENT_MATCHES_SNAPSHOT));

        broadcast_board_update(state.sse(), &Board::new("board-1", "Board 1"));
        broadcast_board_update(state.sse(), &Board::new("board-2", "Board 2"));
        state
            .sse()
            .broadcast(ServerEvent::json(Some(EVENT_MATCH_UPDATE.to_string()), &"m").unwrap());

        let delivered = next(&mut events).await;
        assert_eq!(delivered.event.as_deref(), Some(EVENT_BOARD_UPDATE));
        assert_eq!(delivered.board_id.as_deref(), Some("board-2"));
        let delivered = next(&mut events).await;
        assert_eq!(delivered.event.as_deref(), Some(EVENT_MATCH_UPDATE));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropping_the_stream_unregisters_the_subscriber() {
        let state = AppState::new(AppConfig::default());
        let subscription = open_subscription(&state, None).await;
        let events = spawn_forwarder(subscription);
        assert_eq!(state.sse().subscriber_count(), 1);

        drop(events);
        for _ in 0..100 {
            if state.sse().subscriber_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(state.sse().subscriber_count(), 0);
    }
}
