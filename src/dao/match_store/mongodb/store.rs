use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{Document, doc},
    options::IndexOptions,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{
        BOARD_COLLECTION, LEG_COLLECTION, MATCH_COLLECTION, MongoBoardDocument, MongoLegDocument,
        MongoMatchDocument, MongoVisitDocument, VISIT_COLLECTION, doc_id,
    },
};
use crate::dao::{
    match_store::MatchStore,
    models::{BoardEntity, LegEntity, MatchEntity, VisitEntity},
    storage::StorageResult,
};

const FINISHED: &str = "Finished";

/// [`MatchStore`] backed by MongoDB, one collection per entity.
#[derive(Clone)]
pub struct MongoMatchStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) = establish_connection(&self.config).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoMatchStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) = establish_connection(&config).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.database().await;
        let indexes: [(&'static str, &'static str, Document, bool); 4] = [
            (MATCH_COLLECTION, "board_status", doc! {"board_id": 1, "status": 1}, false),
            (MATCH_COLLECTION, "created_at", doc! {"created_at": 1}, false),
            (LEG_COLLECTION, "match_number", doc! {"match_id": 1, "number": 1}, true),
            (VISIT_COLLECTION, "match_created", doc! {"match_id": 1, "created_at": 1}, false),
        ];

        for (collection, index, keys, unique) in indexes {
            let model = IndexModel::builder()
                .keys(keys)
                .options(
                    IndexOptions::builder()
                        .name(Some(format!("{index}_idx")))
                        .unique(Some(unique))
                        .build(),
                )
                .build();
            database
                .collection::<Document>(collection)
                .create_index(model)
                .await
                .map_err(|source| MongoDaoError::EnsureIndex {
                    collection,
                    index,
                    source,
                })?;
        }

        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.database().await.collection::<T>(name)
    }

    async fn save_board(&self, board: BoardEntity) -> MongoResult<()> {
        let id = board.id.clone();
        let collection = self.collection::<MongoBoardDocument>(BOARD_COLLECTION).await;
        let created_at = collection
            .find_one(doc_id(&id))
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: BOARD_COLLECTION,
                source,
            })?
            .map(BoardEntity::from)
            .map(|existing| existing.created_at)
            .unwrap_or(board.created_at);
        let document: MongoBoardDocument = BoardEntity { created_at, ..board }.into();

        collection
            .replace_one(doc_id(&id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::Write {
                collection: BOARD_COLLECTION,
                id,
                source,
            })?;
        Ok(())
    }

    async fn find_board(&self, id: String) -> MongoResult<Option<BoardEntity>> {
        let collection = self.collection::<MongoBoardDocument>(BOARD_COLLECTION).await;
        let document = collection
            .find_one(doc_id(&id))
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: BOARD_COLLECTION,
                source,
            })?;
        Ok(document.map(Into::into))
    }

    async fn list_boards(&self) -> MongoResult<Vec<BoardEntity>> {
        let collection = self.collection::<MongoBoardDocument>(BOARD_COLLECTION).await;
        let read_err = |source| MongoDaoError::Read {
            collection: BOARD_COLLECTION,
            source,
        };
        let documents: Vec<MongoBoardDocument> = collection
            .find(doc! {})
            .sort(doc! {"_id": 1})
            .await
            .map_err(read_err)?
            .try_collect()
            .await
            .map_err(read_err)?;
        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn save_match(&self, entity: MatchEntity) -> MongoResult<()> {
        let id = entity.id;
        let document: MongoMatchDocument = entity.into();
        self.collection::<MongoMatchDocument>(MATCH_COLLECTION)
            .await
            .replace_one(doc_id(id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::Write {
                collection: MATCH_COLLECTION,
                id: id.to_string(),
                source,
            })?;
        Ok(())
    }

    async fn find_match(&self, id: Uuid) -> MongoResult<Option<MatchEntity>> {
        let document = self
            .collection::<MongoMatchDocument>(MATCH_COLLECTION)
            .await
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: MATCH_COLLECTION,
                source,
            })?;
        document.map(MatchEntity::try_from).transpose()
    }

    async fn find_matches(&self, filter: Document) -> MongoResult<Vec<MatchEntity>> {
        let read_err = |source| MongoDaoError::Read {
            collection: MATCH_COLLECTION,
            source,
        };
        let documents: Vec<MongoMatchDocument> = self
            .collection::<MongoMatchDocument>(MATCH_COLLECTION)
            .await
            .find(filter)
            .sort(doc! {"created_at": 1})
            .await
            .map_err(read_err)?
            .try_collect()
            .await
            .map_err(read_err)?;
        documents.into_iter().map(MatchEntity::try_from).collect()
    }

    async fn find_active_match_for_board(
        &self,
        board_id: String,
        exclude: Option<Uuid>,
    ) -> MongoResult<Option<MatchEntity>> {
        let mut filter = doc! {"board_id": board_id, "status": {"$ne": FINISHED}};
        if let Some(exclude) = exclude {
            filter.insert("_id", doc! {"$ne": exclude.to_string()});
        }
        Ok(self.find_matches(filter).await?.into_iter().next())
    }

    async fn save_leg(&self, leg: LegEntity) -> MongoResult<()> {
        let id = leg.id;
        let document: MongoLegDocument = leg.into();
        self.collection::<MongoLegDocument>(LEG_COLLECTION)
            .await
            .replace_one(doc_id(id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::Write {
                collection: LEG_COLLECTION,
                id: id.to_string(),
                source,
            })?;
        Ok(())
    }

    async fn latest_leg(&self, match_id: Uuid) -> MongoResult<Option<LegEntity>> {
        let document = self
            .collection::<MongoLegDocument>(LEG_COLLECTION)
            .await
            .find_one(doc! {"match_id": match_id.to_string()})
            .sort(doc! {"number": -1})
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: LEG_COLLECTION,
                source,
            })?;
        document.map(LegEntity::try_from).transpose()
    }

    async fn count_legs(&self, match_id: Uuid) -> MongoResult<u32> {
        let count = self
            .collection::<MongoLegDocument>(LEG_COLLECTION)
            .await
            .count_documents(doc! {"match_id": match_id.to_string()})
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: LEG_COLLECTION,
                source,
            })?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn insert_visit(&self, visit: VisitEntity) -> MongoResult<()> {
        let id = visit.id;
        let document: MongoVisitDocument = visit.into();
        self.collection::<MongoVisitDocument>(VISIT_COLLECTION)
            .await
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::Write {
                collection: VISIT_COLLECTION,
                id: id.to_string(),
                source,
            })?;
        Ok(())
    }

    async fn list_visits(&self, match_id: Uuid) -> MongoResult<Vec<VisitEntity>> {
        let read_err = |source| MongoDaoError::Read {
            collection: VISIT_COLLECTION,
            source,
        };
        let documents: Vec<MongoVisitDocument> = self
            .collection::<MongoVisitDocument>(VISIT_COLLECTION)
            .await
            .find(doc! {"match_id": match_id.to_string()})
            .sort(doc! {"created_at": 1, "leg_number": 1})
            .await
            .map_err(read_err)?
            .try_collect()
            .await
            .map_err(read_err)?;
        documents.into_iter().map(VisitEntity::try_from).collect()
    }
}

impl MatchStore for MongoMatchStore {
    fn save_board(&self, board: BoardEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_board(board).await.map_err(Into::into) })
    }

    fn find_board(&self, id: String) -> BoxFuture<'static, StorageResult<Option<BoardEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_board(id).await.map_err(Into::into) })
    }

    fn list_boards(&self) -> BoxFuture<'static, StorageResult<Vec<BoardEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_boards().await.map_err(Into::into) })
    }

    fn save_match(&self, entity: MatchEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_match(entity).await.map_err(Into::into) })
    }

    fn find_match(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_match(id).await.map_err(Into::into) })
    }

    fn list_unfinished_matches(&self) -> BoxFuture<'static, StorageResult<Vec<MatchEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_matches(doc! {"status": {"$ne": FINISHED}})
                .await
                .map_err(Into::into)
        })
    }

    fn find_active_match_for_board(
        &self,
        board_id: String,
        exclude: Option<Uuid>,
    ) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_active_match_for_board(board_id, exclude)
                .await
                .map_err(Into::into)
        })
    }

    fn save_leg(&self, leg: LegEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_leg(leg).await.map_err(Into::into) })
    }

    fn latest_leg(&self, match_id: Uuid) -> BoxFuture<'static, StorageResult<Option<LegEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.latest_leg(match_id).await.map_err(Into::into) })
    }

    fn count_legs(&self, match_id: Uuid) -> BoxFuture<'static, StorageResult<u32>> {
        let store = self.clone();
        Box::pin(async move { store.count_legs(match_id).await.map_err(Into::into) })
    }

    fn insert_visit(&self, visit: VisitEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_visit(visit).await.map_err(Into::into) })
    }

    fn list_visits(&self, match_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<VisitEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_visits(match_id).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
