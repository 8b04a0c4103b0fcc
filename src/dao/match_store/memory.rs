use std::sync::Arc;

use futures::future::BoxFuture;
use indexmap::IndexMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    dao::{
        match_store::MatchStore,
        models::{BoardEntity, LegEntity, MatchEntity, VisitEntity},
        storage::StorageResult,
    },
    state::matches::MatchStatus,
};

#[derive(Default)]
struct Tables {
    boards: IndexMap<String, BoardEntity>,
    matches: IndexMap<Uuid, MatchEntity>,
    legs: IndexMap<Uuid, LegEntity>,
    visits: Vec<VisitEntity>,
}

/// Process-local [`MatchStore`], used when no database is configured and in tests.
#[derive(Clone, Default)]
pub struct InMemoryMatchStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryMatchStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MatchStore for InMemoryMatchStore {
    fn save_board(&self, board: BoardEntity) -> BoxFuture<'static, StorageResult<()>> {
        let tables = self.tables.clone();
        Box::pin(async move {
            let mut guard = tables.write().await;
            let created_at = guard
                .boards
                .get(&board.id)
                .map(|existing| existing.created_at)
                .unwrap_or(board.created_at);
            guard.boards.insert(
                board.id.clone(),
                BoardEntity {
                    created_at,
                    ..board
                },
            );
            Ok(())
        })
    }

    fn find_board(&self, id: String) -> BoxFuture<'static, StorageResult<Option<BoardEntity>>> {
        let tables = self.tables.clone();
        Box::pin(async move { Ok(tables.read().await.boards.get(&id).cloned()) })
    }

    fn list_boards(&self) -> BoxFuture<'static, StorageResult<Vec<BoardEntity>>> {
        let tables = self.tables.clone();
        Box::pin(async move { Ok(tables.read().await.boards.values().cloned().collect()) })
    }

    fn save_match(&self, entity: MatchEntity) -> BoxFuture<'static, StorageResult<()>> {
        let tables = self.tables.clone();
        Box::pin(async move {
            tables.write().await.matches.insert(entity.id, entity);
            Ok(())
        })
    }

    fn find_match(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>> {
        let tables = self.tables.clone();
        Box::pin(async move { Ok(tables.read().await.matches.get(&id).cloned()) })
    }

    fn list_unfinished_matches(&self) -> BoxFuture<'static, StorageResult<Vec<MatchEntity>>> {
        let tables = self.tables.clone();
        Box::pin(async move {
            let guard = tables.read().await;
            let mut rows: Vec<MatchEntity> = guard
                .matches
                .values()
                .filter(|row| row.status != MatchStatus::Finished)
                .cloned()
                .collect();
            rows.sort_by_key(|row| row.created_at);
            Ok(rows)
        })
    }

    fn find_active_match_for_board(
        &self,
        board_id: String,
        exclude: Option<Uuid>,
    ) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>> {
        let tables = self.tables.clone();
        Box::pin(async move {
            let guard = tables.read().await;
            Ok(guard
                .matches
                .values()
                .find(|row| {
                    row.board_id.as_deref() == Some(board_id.as_str())
                        && row.status != MatchStatus::Finished
                        && Some(row.id) != exclude
                })
                .cloned())
        })
    }

    fn save_leg(&self, leg: LegEntity) -> BoxFuture<'static, StorageResult<()>> {
        let tables = self.tables.clone();
        Box::pin(async move {
            tables.write().await.legs.insert(leg.id, leg);
            Ok(())
        })
    }

    fn latest_leg(&self, match_id: Uuid) -> BoxFuture<'static, StorageResult<Option<LegEntity>>> {
        let tables = self.tables.clone();
        Box::pin(async move {
            let guard = tables.read().await;
            Ok(guard
                .legs
                .values()
                .filter(|leg| leg.match_id == match_id)
                .max_by_key(|leg| leg.number)
                .cloned())
        })
    }

    fn count_legs(&self, match_id: Uuid) -> BoxFuture<'static, StorageResult<u32>> {
        let tables = self.tables.clone();
        Box::pin(async move {
            let guard = tables.read().await;
            let count = guard
                .legs
                .values()
                .filter(|leg| leg.match_id == match_id)
                .count();
            Ok(count as u32)
        })
    }

    fn insert_visit(&self, visit: VisitEntity) -> BoxFuture<'static, StorageResult<()>> {
        let tables = self.tables.clone();
        Box::pin(async move {
            tables.write().await.visits.push(visit);
            Ok(())
        })
    }

    fn list_visits(&self, match_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<VisitEntity>>> {
        let tables = self.tables.clone();
        Box::pin(async move {
            let guard = tables.read().await;
            Ok(guard
                .visits
                .iter()
                .filter(|visit| visit.match_id == match_id)
                .cloned()
                .collect())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::*;
    use crate::state::{leg::PlayerSide, matches::LegsMode, scoring::OutMode};

    fn match_row(board: Option<&str>, status: MatchStatus, age: u64) -> MatchEntity {
        let at = SystemTime::UNIX_EPOCH + Duration::from_secs(age);
        MatchEntity {
            id: Uuid::new_v4(),
            player_a: "Ann".into(),
            player_b: "Bob".into(),
            start_score: 501,
            board_id: board.map(str::to_owned),
            status,
            out_mode: OutMode::Double,
            legs_mode: LegsMode::BestOf,
            legs_target: 3,
            legs_won_a: 0,
            legs_won_b: 0,
            next_starter: PlayerSide::A,
            winner: None,
            created_at: at,
            updated_at: at,
        }
    }

    #[tokio::test]
    async fn unfinished_matches_are_listed_oldest_first() {
        let store = InMemoryMatchStore::new();
        let newer = match_row(None, MatchStatus::Running, 20);
        let older = match_row(None, MatchStatus::Idle, 10);
        let done = match_row(None, MatchStatus::Finished, 5);
        for row in [newer.clone(), older.clone(), done] {
            store.save_match(row).await.unwrap();
        }

        let ids: Vec<Uuid> = store
            .list_unfinished_matches()
            .await
            .unwrap()
            .into_iter()
            .map(|row| row.id)
            .collect();
        assert_eq!(ids, vec![older.id, newer.id]);
    }

    #[tokio::test]
    async fn board_lookup_ignores_finished_and_excluded_matches() {
        let store = InMemoryMatchStore::new();
        let finished = match_row(Some("board-1"), MatchStatus::Finished, 1);
        store.save_match(finished).await.unwrap();
        assert!(
            store
                .find_active_match_for_board("board-1".into(), None)
                .await
                .unwrap()
                .is_none()
        );

        let active = match_row(Some("board-1"), MatchStatus::Idle, 2);
        store.save_match(active.clone()).await.unwrap();
        let found = store
            .find_active_match_for_board("board-1".into(), None)
            .await
            .unwrap();
        assert_eq!(found.map(|row| row.id), Some(active.id));
        assert!(
            store
                .find_active_match_for_board("board-1".into(), Some(active.id))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn board_upsert_keeps_creation_time() {
        let store = InMemoryMatchStore::new();
        let first = SystemTime::UNIX_EPOCH + Duration::from_secs(1);
        let later = SystemTime::UNIX_EPOCH + Duration::from_secs(9);
        let row = BoardEntity {
            id: "board-1".into(),
            name: "Board 1".into(),
            serial_number: None,
            access_token_ref: None,
            created_at: first,
            updated_at: first,
        };
        store.save_board(row.clone()).await.unwrap();
        store
            .save_board(BoardEntity {
                name: "Stage".into(),
                created_at: later,
                updated_at: later,
                ..row
            })
            .await
            .unwrap();

        let stored = store.find_board("board-1".into()).await.unwrap().unwrap();
        assert_eq!(stored.name, "Stage");
        assert_eq!(stored.created_at, first);
        assert_eq!(stored.updated_at, later);
        assert_eq!(store.list_boards().await.unwrap().len(), 1);
    }
}
