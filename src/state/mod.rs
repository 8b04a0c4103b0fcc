pub mod board;
pub mod bus;
pub mod leg;
pub mod matches;
pub mod scoring;
mod sse;

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tokio::{
    sync::{RwLock, watch},
    task::JoinHandle,
};
use tracing::{info, warn};

use crate::{
    config::AppConfig,
    dao::match_store::MatchStore,
    error::ServiceError,
    services::{board_service::BoardManager, match_engine::MatchEngine, sse_events},
};

pub use self::bus::EventBus;
pub use self::sse::{PING_DATA, PING_EVENT, SseHub, Subscription};

pub type SharedState = Arc<AppState>;

/// Capacity of the SSE broadcast channel.
const SSE_CAPACITY: usize = 256;

/// Swappable handle on the storage backend, shared by every service that persists.
///
/// Empty means degraded mode.
#[derive(Clone)]
pub struct StoreSlot {
    inner: Arc<StoreSlotInner>,
}

struct StoreSlotInner {
    store: RwLock<Option<Arc<dyn MatchStore>>>,
    degraded: watch::Sender<bool>,
}

impl Default for StoreSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreSlot {
    /// Empty slot, starting in degraded mode.
    pub fn new() -> Self {
        let (degraded, _rx) = watch::channel(true);
        Self {
            inner: Arc::new(StoreSlotInner {
                store: RwLock::new(None),
                degraded,
            }),
        }
    }

    /// Slot already holding `store`.
    pub async fn with_store(store: Arc<dyn MatchStore>) -> Self {
        let slot = Self::new();
        slot.install(store).await;
        slot
    }

    /// Obtain a handle to the current store, if one is installed.
    pub async fn current(&self) -> Option<Arc<dyn MatchStore>> {
        let guard = self.inner.store.read().await;
        guard.as_ref().cloned()
    }

    /// Current store or [`ServiceError::Degraded`].
    pub async fn require(&self) -> Result<Arc<dyn MatchStore>, ServiceError> {
        self.current().await.ok_or(ServiceError::Degraded)
    }

    /// Install a store and leave degraded mode.
    pub async fn install(&self, store: Arc<dyn MatchStore>) {
        {
            let mut guard = self.inner.store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current store and enter degraded mode.
    pub async fn clear(&self) {
        {
            let mut guard = self.inner.store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.inner.degraded.borrow()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.inner.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// Subscribe to degraded mode updates.
    pub fn watcher(&self) -> watch::Receiver<bool> {
        self.inner.degraded.subscribe()
    }
}

/// Composition root: owns the bus, the board registry, the match engine and the fan-out hub.
pub struct AppState {
    config: AppConfig,
    store: StoreSlot,
    bus: EventBus,
    boards: Arc<BoardManager>,
    engine: Arc<MatchEngine>,
    sse: SseHub,
    booted: AtomicBool,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    /// Seeded boards are registered in memory right away.
    pub fn new(config: AppConfig) -> SharedState {
        let store = StoreSlot::new();
        let bus = EventBus::default();
        let boards = Arc::new(BoardManager::new(bus.clone(), store.clone()));
        boards.register_seeds(&config.boards);
        let engine = Arc::new(MatchEngine::new(bus.clone(), store.clone()));
        let sse = SseHub::new(SSE_CAPACITY, config.keep_alive);

        Arc::new(Self {
            config,
            store,
            bus,
            boards,
            engine,
            sse,
            booted: AtomicBool::new(false),
        })
    }

    /// Spawn the background consumers of the bus: engine lanes and the SSE relay.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        vec![
            self.engine.spawn_dispatcher(),
            sse_events::spawn_relay(&self.bus, self.sse.clone()),
        ]
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Board registry and state machine.
    pub fn boards(&self) -> &Arc<BoardManager> {
        &self.boards
    }

    /// Match orchestrator.
    pub fn engine(&self) -> &Arc<MatchEngine> {
        &self.engine
    }

    /// Broadcast hub used for the SSE stream.
    pub fn sse(&self) -> &SseHub {
        &self.sse
    }

    pub fn store(&self) -> &StoreSlot {
        &self.store
    }

    /// Obtain the current store or fail in degraded mode.
    pub async fn require_store(&self) -> Result<Arc<dyn MatchStore>, ServiceError> {
        self.store.require().await
    }

    /// Install a store and leave degraded mode.
    ///
    /// The first installation also restores boards and unfinished matches from it.
    pub async fn install_store(&self, store: Arc<dyn MatchStore>) {
        self.store.install(store.clone()).await;
        if self.booted.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Err(err) = self.boards.sync_with_store(&self.config.boards).await {
            warn!(error = %err, "failed to restore boards from storage");
        }
        match self.engine.load_from_db_on_boot().await {
            Ok(count) => info!(count, "restored unfinished matches from storage"),
            Err(err) => {
                warn!(error = %err, "failed to restore matches from storage");
                self.booted.store(false, Ordering::SeqCst);
            }
        }
    }

    /// Remove the current store and enter degraded mode.
    pub async fn clear_store(&self) {
        self.store.clear().await;
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        self.store.is_degraded()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.store.update_degraded(value);
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.store.watcher()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;
    use crate::{
        dao::match_store::memory::InMemoryMatchStore, dto::validation::CreateMatchRequest,
        state::board::ThrowPayload,
    };

    #[tokio::test]
    async fn store_slot_toggles_degraded_mode() {
        let slot = StoreSlot::new();
        let mut watcher = slot.watcher();
        assert!(slot.is_degraded());
        assert!(matches!(slot.require().await, Err(ServiceError::Degraded)));

        slot.install(Arc::new(InMemoryMatchStore::new())).await;
        assert!(!slot.is_degraded());
        assert!(watcher.has_changed().unwrap());
        assert!(!*watcher.borrow_and_update());
        assert!(slot.require().await.is_ok());

        slot.clear().await;
        assert!(slot.is_degraded());
        assert!(slot.current().await.is_none());
    }

    #[tokio::test]
    async fn seeded_boards_exist_before_storage() {
        let mut config = AppConfig::default();
        config.apply_env(|key| (key == "BOARD_2_NAME").then(|| "Side".to_owned()));
        let state = AppState::new(config);

        assert!(state.is_degraded());
        let board = state.boards().get("board-2").unwrap();
        assert_eq!(board.name, "Side");
    }

    #[tokio::test]
    async fn device_throws_flow_through_to_subscribers() {
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

        let mut subscription = state.sse().subscribe();
        state
            .boards()
            .apply_throw("board-1", ThrowPayload::sector("T20"));

        let mut seen_board_update = false;
        let live = loop {
            let event = timeout(Duration::from_secs(1), subscription.receiver.recv())
                .await
                .unwrap()
                .unwrap();
            match event.event.as_deref() {
                Some("board.update") => seen_board_update = true,
                Some("match.update") => break event.data,
                _ => {}
            }
        };
        assert!(seen_board_update);
        assert!(live.contains(&created.id.to_string()));
        assert!(live.contains("\"remaining\":441"));

        for worker in workers {
            worker.abort();
        }
    }
}
