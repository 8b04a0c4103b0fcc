pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use crate::dao::models::{BoardEntity, LegEntity, MatchEntity, VisitEntity};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;
use uuid::Uuid;

/// Abstraction over the persistence layer for boards, matches, legs and visits.
///
/// Saves are upserts keyed by primary key, so retrying a failed write is safe.
/// Visits are append-only.
pub trait MatchStore: Send + Sync {
    fn save_board(&self, board: BoardEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn find_board(&self, id: String) -> BoxFuture<'static, StorageResult<Option<BoardEntity>>>;
    fn list_boards(&self) -> BoxFuture<'static, StorageResult<Vec<BoardEntity>>>;
    fn save_match(&self, entity: MatchEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn find_match(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>>;
    /// Every match whose status is not `Finished`, oldest first.
    fn list_unfinished_matches(&self) -> BoxFuture<'static, StorageResult<Vec<MatchEntity>>>;
    /// A non-finished match bound to `board_id`, other than `exclude`.
    fn find_active_match_for_board(
        &self,
        board_id: String,
        exclude: Option<Uuid>,
    ) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>>;
    fn save_leg(&self, leg: LegEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Leg with the highest number for `match_id`.
    fn latest_leg(&self, match_id: Uuid) -> BoxFuture<'static, StorageResult<Option<LegEntity>>>;
    fn count_legs(&self, match_id: Uuid) -> BoxFuture<'static, StorageResult<u32>>;
    fn insert_visit(&self, visit: VisitEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Visits of `match_id` in insertion order.
    fn list_visits(&self, match_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<VisitEntity>>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
