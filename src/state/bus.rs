//! Typed in-process publish/subscribe channel between device handling, the
//! match engine and the fan-out relay.

use std::time::SystemTime;

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{
    dto::match_state::MatchState,
    state::board::{Board, ThrowPayload},
};

/// Capacity of the bus; slow subscribers past this lag and lose events.
pub const BUS_CAPACITY: usize = 1024;

/// What happened to a board.
#[derive(Debug, Clone, PartialEq)]
pub enum BoardEventKind {
    /// Board created, renamed, re-credentialed or its lifecycle status moved.
    StatusChanged,
    /// A dart was detected.
    ThrowDetected(ThrowPayload),
    /// The player started pulling darts.
    TakeoutStarted,
    /// Takeout completed; a false takeout did not remove real darts.
    TakeoutFinished {
        /// The takeout did not correspond to a real dart removal.
        false_takeout: bool,
    },
}

/// Board transition together with the board state right after it.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardEvent {
    pub kind: BoardEventKind,
    pub board: Board,
    pub at: SystemTime,
}

/// Message carried on the bus.
#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    Board(BoardEvent),
    /// A match read-model changed.
    MatchUpdate {
        match_id: Uuid,
        state: Box<MatchState>,
    },
}

impl BusEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            BusEvent::Board(event) => match event.kind {
                BoardEventKind::StatusChanged => "status.changed",
                BoardEventKind::ThrowDetected(_) => "throw.detected",
                BoardEventKind::TakeoutStarted => "takeout.started",
                BoardEventKind::TakeoutFinished { .. } => "takeout.finished",
            },
            BusEvent::MatchUpdate { .. } => "match.update",
        }
    }

    /// Board the event concerns, if any.
    pub fn board_id(&self) -> Option<&str> {
        match self {
            BusEvent::Board(event) => Some(&event.board.id),
            BusEvent::MatchUpdate { .. } => None,
        }
    }
}

/// Broadcast bus owned by the composition root and handed to producers and consumers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BusEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(BUS_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event; having no subscriber is not an error.
    pub fn publish(&self, event: BusEvent) {
        let _ = self.sender.send(event);
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.sender.subscribe()
    }
}
