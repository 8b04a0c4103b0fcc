//! Board registry: applies device notifications to the board state machine and
//! publishes every transition on the bus.

use std::time::SystemTime;

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::{
    config::BoardSeed,
    dao::models::BoardEntity,
    dto::format_system_time,
    error::ServiceError,
    state::{
        StoreSlot,
        board::{Board, BoardCredentials, BoardStatus, ThrowPayload},
        bus::{BoardEvent, BoardEventKind, BusEvent, EventBus},
    },
};

/// Owns every known board. Unknown ids are created on first reference.
pub struct BoardManager {
    boards: DashMap<String, Board>,
    bus: EventBus,
    store: StoreSlot,
}

impl BoardManager {
    pub fn new(bus: EventBus, store: StoreSlot) -> Self {
        Self {
            boards: DashMap::new(),
            bus,
            store,
        }
    }

    /// All boards, ordered by id.
    pub fn list(&self) -> Vec<Board> {
        let mut boards: Vec<Board> = self.boards.iter().map(|entry| entry.value().clone()).collect();
        boards.sort_by(|a, b| a.id.cmp(&b.id));
        boards
    }

    pub fn get(&self, id: &str) -> Option<Board> {
        self.boards.get(id).map(|entry| entry.value().clone())
    }

    /// Create or touch a board, renaming it when `name` is given.
    pub async fn upsert(&self, id: &str, name: Option<String>) -> Board {
        let board = self.mutate(id, BoardEventKind::StatusChanged, |board| {
            if let Some(name) = name.filter(|name| !name.trim().is_empty()) {
                board.name = name.trim().to_owned();
            }
            board.touch();
        });
        self.persist(&board).await;
        board
    }

    /// Lifecycle status reported by the device.
    pub fn set_status(&self, id: &str, status: BoardStatus) -> Board {
        self.mutate(id, BoardEventKind::StatusChanged, |board| {
            board.set_status(status)
        })
    }

    /// Register device credentials; both parts must be present to be `Configured`.
    pub async fn set_credentials(
        &self,
        id: &str,
        serial: Option<String>,
        token: Option<String>,
    ) -> Board {
        let board = self.mutate(id, BoardEventKind::StatusChanged, |board| {
            board.credentials = BoardCredentials::from_parts(serial, token);
            board.touch();
        });
        self.persist(&board).await;
        board
    }

    /// A dart landed on the board.
    pub fn apply_throw(&self, id: &str, payload: ThrowPayload) -> Board {
        let server_time = format_system_time(SystemTime::now());
        let kind = BoardEventKind::ThrowDetected(payload.clone());
        self.mutate(id, kind, |board| board.record_throw(payload, server_time))
    }

    pub fn takeout_start(&self, id: &str) -> Board {
        self.mutate(id, BoardEventKind::TakeoutStarted, Board::start_takeout)
    }

    pub fn takeout_finish(&self, id: &str, false_takeout: bool) -> Board {
        self.mutate(
            id,
            BoardEventKind::TakeoutFinished { false_takeout },
            Board::finish_takeout,
        )
    }

    /// Register configured boards in memory without touching storage.
    pub fn register_seeds(&self, seeds: &[BoardSeed]) {
        for seed in seeds {
            let mut board = Board::new(seed.id.clone(), seed.name.clone());
            board.credentials = seed.credentials.clone();
            self.boards.insert(seed.id.clone(), board);
        }
    }

    /// Pull stored boards into the registry, then write the configured seeds back.
    ///
    /// Seeds win over stored values; live status and phase are left untouched.
    pub async fn sync_with_store(&self, seeds: &[BoardSeed]) -> Result<usize, ServiceError> {
        let store = self.store.require().await?;
        let stored = store.list_boards().await?;
        let count = stored.len();

        for entity in stored {
            if seeds.iter().any(|seed| seed.id == entity.id) {
                continue;
            }
            let restored = Board::from(entity);
            self.boards
                .entry(restored.id.clone())
                .and_modify(|board| {
                    board.name = restored.name.clone();
                    board.credentials = restored.credentials.clone();
                })
                .or_insert(restored);
        }

        for seed in seeds {
            if let Some(board) = self.get(&seed.id) {
                store.save_board(BoardEntity::from(&board)).await?;
            }
        }

        debug!(stored = count, seeded = seeds.len(), "board registry synchronised");
        Ok(count)
    }

    /// Apply `change` to the board (creating it on demand) and publish `kind`.
    fn mutate(&self, id: &str, kind: BoardEventKind, change: impl FnOnce(&mut Board)) -> Board {
        let snapshot = {
            let mut entry = self
                .boards
                .entry(id.to_owned())
                .or_insert_with(|| Board::new(id, Board::default_name(id)));
            change(entry.value_mut());
            entry.value().clone()
        };

        self.bus.publish(BusEvent::Board(BoardEvent {
            kind,
            board: snapshot.clone(),
            at: SystemTime::now(),
        }));
        snapshot
    }

    async fn persist(&self, board: &Board) {
        let Some(store) = self.store.current().await else {
            debug!(board_id = %board.id, "storage unavailable; board kept in memory only");
            return;
        };
        if let Err(err) = store.save_board(BoardEntity::from(board)).await {
            warn!(board_id = %board.id, error = %err, "failed to persist board");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        dao::match_store::{MatchStore, memory::InMemoryMatchStore},
        state::board::BoardPhase,
    };

    fn manager() -> BoardManager {
        BoardManager::new(EventBus::default(), StoreSlot::new())
    }

    #[test]
    fn unknown_boards_are_created_on_first_reference() {
        let boards = manager();
        let board = boards.takeout_start("board-7");
        assert_eq!(board.name, "Board board-7");
        assert_eq!(board.status, BoardStatus::Ready);
        assert_eq!(board.phase, Some(BoardPhase::Takeout));
        assert_eq!(boards.list().len(), 1);
    }

    #[tokio::test]
    async fn each_transition_is_published() {
        let boards = manager();
        let mut rx = boards.bus.subscribe();

        boards.set_status("b", BoardStatus::Calibrating);
        boards.apply_throw("b", ThrowPayload::sector("T20"));
        boards.takeout_start("b");
        boards.takeout_finish("b", true);

        let names: Vec<&str> = [
            rx.recv().await.unwrap(),
            rx.recv().await.unwrap(),
            rx.recv().await.unwrap(),
            rx.recv().await.unwrap(),
        ]
        .iter()
        .map(BusEvent::name)
        .collect();
        assert_eq!(
            names,
            ["status.changed", "throw.detected", "takeout.started", "takeout.finished"]
        );
    }

    #[tokio::test]
    async fn throw_event_carries_payload_and_ready_board() {
        let boards = manager();
        let mut rx = boards.bus.subscribe();
        boards.set_status("b", BoardStatus::Offline);
        rx.recv().await.unwrap();

        boards.apply_throw("b", ThrowPayload::sector("D16"));
        let BusEvent::Board(event) = rx.recv().await.unwrap() else {
            panic!("expected a board event");
        };
        assert_eq!(
            event.kind,
            BoardEventKind::ThrowDetected(ThrowPayload::sector("D16"))
        );
        assert_eq!(event.board.status, BoardStatus::Ready);
        assert_eq!(event.board.phase, Some(BoardPhase::Throw));
        assert!(event.board.last_throw.is_some());
    }

    #[tokio::test]
    async fn credentials_and_names_are_persisted_when_storage_is_up() {
        let store = Arc::new(InMemoryMatchStore::new());
        let boards = BoardManager::new(
            EventBus::default(),
            StoreSlot::with_store(store.clone()).await,
        );

        boards.upsert("board-1", Some("Stage".into())).await;
        boards
            .set_credentials("board-1", Some("SN-1".into()), Some("token-123456".into()))
            .await;

        let stored = store.find_board("board-1".into()).await.unwrap().unwrap();
        assert_eq!(stored.name, "Stage");
        assert_eq!(stored.serial_number.as_deref(), Some("SN-1"));
        assert_eq!(stored.access_token_ref.as_deref(), Some("token-123456"));
    }

    #[tokio::test]
    async fn sync_restores_stored_boards_and_writes_seeds() {
        let store = Arc::new(InMemoryMatchStore::new());
        let mut stored = Board::new("board-5", "Corner");
        stored.credentials = BoardCredentials::from_parts(Some("SN".into()), Some("tok".into()));
        store.save_board(BoardEntity::from(&stored)).await.unwrap();

        let boards = BoardManager::new(
            EventBus::default(),
            StoreSlot::with_store(store.clone()).await,
        );
        let seeds = vec![BoardSeed {
            id: "board-1".into(),
            name: "Main".into(),
            credentials: BoardCredentials::Unconfigured,
        }];
        boards.register_seeds(&seeds);
        boards.sync_with_store(&seeds).await.unwrap();

        assert_eq!(boards.get("board-5").unwrap().name, "Corner");
        assert_eq!(boards.get("board-5").unwrap().credentials.serial(), Some("SN"));
        assert!(store.find_board("board-1".into()).await.unwrap().is_some());
    }
}
