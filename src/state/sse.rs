use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use tokio::{sync::broadcast, task::JoinHandle, time::MissedTickBehavior};
use tracing::debug;

use crate::dto::sse::ServerEvent;

/// Name of the keep-alive event.
pub const PING_EVENT: &str = "ping";
/// Payload of the keep-alive event, a JSON string like every other payload.
pub const PING_DATA: &str = "\"keepalive\"";

/// Broadcast hub behind the SSE endpoint.
///
/// A single keep-alive task runs while at least one subscriber is connected.
#[derive(Clone)]
pub struct SseHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    sender: broadcast::Sender<ServerEvent>,
    keep_alive: Duration,
    pinger: Mutex<Pinger>,
}

#[derive(Default)]
struct Pinger {
    subscribers: usize,
    task: Option<JoinHandle<()>>,
}

impl HubInner {
    fn pinger(&self) -> MutexGuard<'_, Pinger> {
        self.pinger.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A live subscription; dropping it unregisters the subscriber.
pub struct Subscription {
    pub receiver: broadcast::Receiver<ServerEvent>,
    _guard: SubscriberGuard,
}

struct SubscriberGuard {
    hub: Arc<HubInner>,
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        let mut pinger = self.hub.pinger();
        pinger.subscribers = pinger.subscribers.saturating_sub(1);
        if pinger.subscribers > 0 {
            return;
        }
        if let Some(task) = pinger.task.take() {
            task.abort();
            debug!("last SSE subscriber left; keep-alive stopped");
        }
    }
}

impl SseHub {
    /// Construct a new hub backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize, keep_alive: Duration) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(HubInner {
                sender,
                keep_alive,
                pinger: Mutex::new(Pinger::default()),
            }),
        }
    }

    /// Register a new subscriber that will receive subsequent events.
    ///
    /// Must be called from within a Tokio runtime: the first subscriber starts the keep-alive.
    pub fn subscribe(&self) -> Subscription {
        let receiver = self.inner.sender.subscribe();
        let mut pinger = self.inner.pinger();
        pinger.subscribers += 1;
        if pinger.task.is_none() {
            pinger.task = Some(spawn_keep_alive(
                self.inner.sender.clone(),
                self.inner.keep_alive,
            ));
            debug!("first SSE subscriber; keep-alive started");
        }
        drop(pinger);

        Subscription {
            receiver,
            _guard: SubscriberGuard {
                hub: self.inner.clone(),
            },
        }
    }

    /// Send an event to all current subscribers, ignoring delivery errors.
    pub fn broadcast(&self, event: ServerEvent) {
        let _ = self.inner.sender.send(event);
    }

    /// Number of connected subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.pinger().subscribers
    }

    /// Whether the keep-alive task is running.
    pub fn is_pinging(&self) -> bool {
        self.inner.pinger().task.is_some()
    }
}

fn spawn_keep_alive(sender: broadcast::Sender<ServerEvent>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let _ = sender.send(ServerEvent {
                event: Some(PING_EVENT.to_owned()),
                data: PING_DATA.to_owned(),
                board_id: None,
            });
        }
    })
}
