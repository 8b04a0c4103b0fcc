//! Match orchestration: owns every live match, applies device events to the
//! leg runtime, persists the result and publishes read-model updates.
//!
//! Device events are processed on one lane per board, in arrival order. Each
//! match is additionally guarded by its own async mutex, held across the
//! persistence writes, so a throw never runs against a snapshot that a pending
//! write could later overwrite.

use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use tokio::{
    sync::{Mutex, broadcast::error::RecvError, mpsc},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::{
        match_store::MatchStore,
        models::{LegEntity, MatchEntity, VisitEntity},
    },
    dto::{
        match_state::MatchState,
        validation::CreateMatchRequest,
        visit::{RecordVisitRequest, VisitView},
    },
    error::ServiceError,
    services::stats,
    state::{
        StoreSlot,
        board::ThrowPayload,
        bus::{BoardEventKind, BusEvent, EventBus},
        leg::{DARTS_PER_VISIT, ThrowOutcome},
        matches::{LegSlot, Match, MatchStatus, Visit},
        scoring::Sector,
    },
};

/// Device notification routed to the match bound to a board.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    Throw(ThrowPayload),
    TakeoutFinished { false_takeout: bool },
}

/// In-memory state of one match.
struct MatchSession {
    record: Match,
    /// Current leg, or the last one played.
    leg: Option<LegSlot>,
    visits: Vec<Visit>,
}

impl MatchSession {
    fn state(&self) -> MatchState {
        stats::build_state(&self.record, self.leg.as_ref(), &self.visits)
    }

    fn active_leg(&mut self) -> Option<&mut LegSlot> {
        self.leg.as_mut().filter(|leg| leg.in_progress())
    }

    fn log_visit(&mut self, visit: Visit, writes: &mut Writes) {
        writes.visits.push(visit.clone());
        self.visits.push(visit);
    }

    /// Queue a snapshot of the leg in progress, if any.
    fn snapshot_active_leg(&mut self, writes: &mut Writes) {
        let match_id = self.record.id;
        if let Some(leg) = self.active_leg() {
            writes.legs.push(LegEntity::snapshot(match_id, leg));
        }
    }
}

/// Writes issued after a mutation; the match row itself is always saved.
#[derive(Default)]
struct Writes {
    visits: Vec<Visit>,
    legs: Vec<LegEntity>,
}

impl Writes {
    fn leg(match_id: Uuid, leg: &LegSlot) -> Self {
        Self {
            visits: Vec::new(),
            legs: vec![LegEntity::snapshot(match_id, leg)],
        }
    }
}

/// Orchestrator for every match known to the process.
pub struct MatchEngine {
    bus: EventBus,
    store: StoreSlot,
    sessions: DashMap<Uuid, Arc<Mutex<MatchSession>>>,
    by_board: DashMap<String, Uuid>,
    lanes: DashMap<String, mpsc::UnboundedSender<DeviceEvent>>,
}

impl MatchEngine {
    pub fn new(bus: EventBus, store: StoreSlot) -> Self {
        Self {
            bus,
            store,
            sessions: DashMap::new(),
            by_board: DashMap::new(),
            lanes: DashMap::new(),
        }
    }

    /// Consume board events from the bus and feed them to the per-board lanes.
    ///
    /// The bus holds [`crate::state::bus::BUS_CAPACITY`] events. The dispatcher only
    /// forwards to unbounded lanes, so it lags only if the runtime starves it for
    /// that many events; the skipped throws are then lost and logged as errors.
    pub fn spawn_dispatcher(self: &Arc<Self>) -> JoinHandle<()> {
        let mut receiver = self.bus.subscribe();
        let engine = self.clone();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(BusEvent::Board(event)) => {
                        let device = match event.kind {
                            BoardEventKind::ThrowDetected(payload) => DeviceEvent::Throw(payload),
                            BoardEventKind::TakeoutFinished { false_takeout } => {
                                DeviceEvent::TakeoutFinished { false_takeout }
                            }
                            BoardEventKind::StatusChanged | BoardEventKind::TakeoutStarted => {
                                continue;
                            }
                        };
                        engine.route(&event.board.id, device);
                    }
                    Ok(BusEvent::MatchUpdate { .. }) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        error!(
                            skipped,
                            "match engine lagged behind the event bus; device events lost"
                        );
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// Queue a device event on the lane of `board_id`, starting the lane if needed.
    pub fn route(self: &Arc<Self>, board_id: &str, event: DeviceEvent) {
        let sender = self
            .lanes
            .entry(board_id.to_owned())
            .or_insert_with(|| self.spawn_lane(board_id.to_owned()))
            .clone();
        if sender.send(event).is_err() {
            warn!(board_id, "board lane closed; dropping device event");
            self.lanes.remove(board_id);
        }
    }

    fn spawn_lane(self: &Arc<Self>, board_id: String) -> mpsc::UnboundedSender<DeviceEvent> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let engine = self.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(err) = engine.handle_device_event(&board_id, event).await {
                    warn!(board_id = %board_id, error = %err, "device event handling failed; event dropped");
                }
            }
        });
        tx
    }

    /// Apply a device event to the match bound to `board_id`, if any.
    pub async fn handle_device_event(
        &self,
        board_id: &str,
        event: DeviceEvent,
    ) -> Result<(), ServiceError> {
        let Some(match_id) = self.by_board.get(board_id).map(|entry| *entry.value()) else {
            debug!(board_id, "no match bound to board; ignoring device event");
            return Ok(());
        };
        let Some(session) = self.sessions.get(&match_id).map(|entry| entry.value().clone()) else {
            debug!(
                board_id,
                match_id = %match_id,
                "board claimed by a match not yet registered; ignoring device event"
            );
            return Ok(());
        };
        let mut session = session.lock().await;
        if session.record.board_id.as_deref() != Some(board_id) {
            debug!(board_id, match_id = %match_id, "match moved to another board; ignoring device event");
            return Ok(());
        }

        match event {
            DeviceEvent::Throw(payload) => {
                self.on_throw(&mut session, Sector::parse(&payload.sector)).await
            }
            DeviceEvent::TakeoutFinished {
                false_takeout: true,
            } => Ok(()),
            DeviceEvent::TakeoutFinished {
                false_takeout: false,
            } => self.on_takeout_finished(&mut session).await,
        }
    }

    /// Create a match in `Idle`, optionally bound to a board.
    pub async fn create_match(
        &self,
        request: CreateMatchRequest,
    ) -> Result<MatchState, ServiceError> {
        request.validate()?;
        let store = self.store.require().await?;

        let board_id = request
            .board_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_owned);
        let record = Match::new(
            request.player_a.trim().to_owned(),
            request.player_b.trim().to_owned(),
            request.start_score,
            board_id.clone(),
            request.out_mode,
            request.legs_format(),
        );
        let match_id = record.id;

        if let Some(board_id) = &board_id {
            self.claim_board(&store, board_id, match_id).await?;
        }

        if let Err(err) = store.save_match(MatchEntity::from(&record)).await {
            if let Some(board_id) = &board_id {
                self.release_board(board_id, match_id);
            }
            return Err(err.into());
        }

        let session = MatchSession {
            record,
            leg: None,
            visits: Vec::new(),
        };
        let state = session.state();
        self.sessions.insert(match_id, Arc::new(Mutex::new(session)));
        info!(match_id = %match_id, board_id = ?board_id, "match created");
        self.publish(&state);
        Ok(state)
    }

    /// Bind the match to `board_id`, or unbind it with `None`.
    pub async fn assign_board(
        &self,
        match_id: Uuid,
        board_id: Option<String>,
    ) -> Result<MatchState, ServiceError> {
        let session = self.session(match_id)?;
        let mut session = session.lock().await;
        if session.record.status == MatchStatus::Finished {
            return Err(ServiceError::Conflict(format!(
                "match {match_id} is finished"
            )));
        }

        let board_id = board_id
            .map(|id| id.trim().to_owned())
            .filter(|id| !id.is_empty());
        let previous = session.record.board_id.clone();
        if previous == board_id {
            return Ok(session.state());
        }

        let store = self.store.require().await?;
        if let Some(board_id) = &board_id {
            self.claim_board(&store, board_id, match_id).await?;
        }
        if let Some(previous) = &previous {
            self.release_board(previous, match_id);
        }

        session.record.board_id = board_id;
        session.record.touch();
        info!(match_id = %match_id, board_id = ?session.record.board_id, "match board reassigned");
        self.commit(&session, Writes::default()).await
    }

    /// Start the next leg; the player due to start throws first.
    pub async fn start_leg(&self, match_id: Uuid) -> Result<MatchState, ServiceError> {
        let session = self.session(match_id)?;
        let mut session = session.lock().await;
        if session.record.status == MatchStatus::Finished {
            return Err(ServiceError::Conflict(format!(
                "match {match_id} is finished"
            )));
        }
        if session.active_leg().is_some() {
            return Err(ServiceError::Conflict(format!(
                "match {match_id} already has a leg in progress"
            )));
        }

        self.open_leg(&mut session).await?;
        let state = session.state();
        self.publish(&state);
        Ok(state)
    }

    /// Close the leg in progress without a winner; the match returns to `Idle`.
    pub async fn finish_leg(&self, match_id: Uuid) -> Result<MatchState, ServiceError> {
        let session = self.session(match_id)?;
        let mut session = session.lock().await;
        let Some(leg) = session.active_leg() else {
            return Err(ServiceError::NotFound(format!(
                "match {match_id} has no active leg"
            )));
        };

        leg.finish(None);
        let writes = Writes::leg(match_id, leg);
        session.record.status = MatchStatus::Idle;
        session.record.touch();
        info!(match_id = %match_id, "leg closed manually");
        self.commit(&session, writes).await
    }

    /// Hand the turn to the other player without scoring.
    pub async fn next_turn(&self, match_id: Uuid) -> Result<MatchState, ServiceError> {
        let session = self.session(match_id)?;
        let mut session = session.lock().await;
        let Some(leg) = session.active_leg() else {
            return Err(ServiceError::NotFound(format!(
                "match {match_id} has no active leg"
            )));
        };

        let visit = leg.cut_visit(match_id);
        let mut writes = Writes::leg(match_id, leg);
        if let Some(visit) = visit {
            session.log_visit(visit, &mut writes);
        }
        session.record.touch();
        self.commit(&session, writes).await
    }

    /// Score a whole visit entered by hand on the player to throw.
    ///
    /// Darts after a bust or checkout are ignored. A visit shorter than three
    /// darts that neither busts nor checks out still hands the turn over.
    pub async fn record_visit(
        &self,
        match_id: Uuid,
        request: RecordVisitRequest,
    ) -> Result<MatchState, ServiceError> {
        request.validate()?;
        let darts = request.sectors();
        let session = self.session(match_id)?;
        let mut session = session.lock().await;
        match session.record.status {
            MatchStatus::Paused => {
                return Err(ServiceError::Conflict(format!("match {match_id} is paused")));
            }
            MatchStatus::Finished => {
                return Err(ServiceError::Conflict(format!(
                    "match {match_id} is finished"
                )));
            }
            MatchStatus::Idle | MatchStatus::Running => {}
        }
        if let Some(leg) = session.active_leg() {
            if leg.runtime.darts_in_visit > 0 {
                return Err(ServiceError::Conflict(format!(
                    "match {match_id} has {} of {DARTS_PER_VISIT} darts of a visit on the board",
                    leg.runtime.darts_in_visit
                )));
            }
        }

        if session.active_leg().is_none() {
            self.open_leg(&mut session).await?;
        }
        session.record.status = MatchStatus::Running;

        let mut writes = Writes::default();
        let mut visit_ended = false;
        for sector in darts {
            let Some(outcome) = self.apply_dart(&mut session, sector, &mut writes) else {
                break;
            };
            if outcome.visit_ended {
                visit_ended = true;
                break;
            }
        }
        if !visit_ended {
            let visit = session.active_leg().and_then(|leg| leg.cut_visit(match_id));
            if let Some(visit) = visit {
                session.log_visit(visit, &mut writes);
            }
        }
        session.snapshot_active_leg(&mut writes);
        session.record.touch();
        info!(match_id = %match_id, "manual visit recorded");
        self.commit(&session, writes).await
    }

    /// Suspend a running match; throws are ignored until it resumes.
    pub async fn pause(&self, match_id: Uuid) -> Result<MatchState, ServiceError> {
        let session = self.session(match_id)?;
        let mut session = session.lock().await;
        if session.record.status != MatchStatus::Running {
            return Err(ServiceError::Conflict(format!(
                "match {match_id} is not running"
            )));
        }
        session.record.status = MatchStatus::Paused;
        session.record.touch();
        self.commit(&session, Writes::default()).await
    }

    /// Resume a paused match.
    pub async fn resume(&self, match_id: Uuid) -> Result<MatchState, ServiceError> {
        let session = self.session(match_id)?;
        let mut session = session.lock().await;
        if session.record.status != MatchStatus::Paused {
            return Err(ServiceError::Conflict(format!(
                "match {match_id} is not paused"
            )));
        }
        session.record.status = if session.active_leg().is_some() {
            MatchStatus::Running
        } else {
            MatchStatus::Idle
        };
        session.record.touch();
        self.commit(&session, Writes::default()).await
    }

    /// Read-model of one match, from memory or else from storage.
    pub async fn get_state(&self, match_id: Uuid) -> Result<MatchState, ServiceError> {
        if let Some(session) = self.sessions.get(&match_id).map(|entry| entry.value().clone()) {
            return Ok(session.lock().await.state());
        }

        let store = self.store.require().await?;
        let Some(entity) = store.find_match(match_id).await? else {
            return Err(ServiceError::NotFound(format!("match {match_id}")));
        };
        let session = Self::load_session(&store, Match::from(entity)).await?;
        Ok(session.state())
    }

    /// Logged visits of one match, newest first, from memory or else from storage.
    pub async fn list_visits(
        &self,
        match_id: Uuid,
        limit: usize,
    ) -> Result<Vec<VisitView>, ServiceError> {
        if let Some(session) = self.sessions.get(&match_id).map(|entry| entry.value().clone()) {
            let session = session.lock().await;
            return Ok(session.visits.iter().rev().take(limit).map(VisitView::from).collect());
        }

        let store = self.store.require().await?;
        if store.find_match(match_id).await?.is_none() {
            return Err(ServiceError::NotFound(format!("match {match_id}")));
        }
        let visits = store.list_visits(match_id).await?;
        Ok(visits
            .into_iter()
            .rev()
            .take(limit)
            .map(|entity| VisitView::from(&Visit::from(entity)))
            .collect())
    }

    /// Read-models of every in-memory match that is not finished, oldest first.
    pub async fn list_active_states(&self) -> Vec<MatchState> {
        let sessions: Vec<Arc<Mutex<MatchSession>>> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let mut records = Vec::with_capacity(sessions.len());
        for session in sessions {
            let session = session.lock().await;
            if session.record.is_active() {
                records.push((session.record.created_at, session.state()));
            }
        }
        records.sort_by_key(|(created_at, _)| *created_at);
        records.into_iter().map(|(_, state)| state).collect()
    }

    /// Rebuild every unfinished match from storage, leg runtime included.
    ///
    /// Running it again without intervening throws yields the same states.
    pub async fn load_from_db_on_boot(&self) -> Result<usize, ServiceError> {
        let store = self.store.require().await?;
        let records = store.list_unfinished_matches().await?;

        let mut sessions = Vec::with_capacity(records.len());
        for entity in records {
            sessions.push(Self::load_session(&store, Match::from(entity)).await?);
        }

        let count = sessions.len();
        for session in sessions {
            let match_id = session.record.id;
            if let Some(board_id) = &session.record.board_id {
                self.by_board.insert(board_id.clone(), match_id);
            }
            match self.sessions.get(&match_id).map(|entry| entry.value().clone()) {
                Some(existing) => *existing.lock().await = session,
                None => {
                    self.sessions
                        .insert(match_id, Arc::new(Mutex::new(session)));
                }
            }
        }
        Ok(count)
    }

    async fn load_session(
        store: &Arc<dyn MatchStore>,
        record: Match,
    ) -> Result<MatchSession, ServiceError> {
        let leg = store
            .latest_leg(record.id)
            .await?
            .map(|entity| entity.into_slot(record.out_mode));
        let visits = store
            .list_visits(record.id)
            .await?
            .into_iter()
            .map(Visit::from)
            .collect();
        Ok(MatchSession {
            record,
            leg,
            visits,
        })
    }

    async fn on_throw(
        &self,
        session: &mut MatchSession,
        sector: Sector,
    ) -> Result<(), ServiceError> {
        let match_id = session.record.id;
        match session.record.status {
            MatchStatus::Paused | MatchStatus::Finished => {
                debug!(match_id = %match_id, status = ?session.record.status, "throw ignored");
                return Ok(());
            }
            MatchStatus::Idle | MatchStatus::Running => {}
        }

        if session.active_leg().is_none() {
            self.open_leg(session).await?;
        }
        session.record.status = MatchStatus::Running;

        let mut writes = Writes::default();
        if self.apply_dart(session, sector, &mut writes).is_none() {
            return Ok(());
        }
        session.snapshot_active_leg(&mut writes);
        session.record.touch();
        self.commit(session, writes).await.map(|_| ())
    }

    /// Apply one dart to the leg in progress and settle a leg win.
    ///
    /// Queues the closed visit and the finished leg; the caller snapshots the
    /// leg left in progress. `None` when no leg is in progress.
    fn apply_dart(
        &self,
        session: &mut MatchSession,
        sector: Sector,
        writes: &mut Writes,
    ) -> Option<ThrowOutcome> {
        let match_id = session.record.id;
        let leg = session.active_leg()?;
        let (outcome, visit) = leg.throw_dart(match_id, sector);
        let finished_number = leg.number;
        if let Some(winner) = outcome.leg_winner {
            leg.finish(Some(winner));
            writes.legs.push(LegEntity::snapshot(match_id, leg));
        }
        debug!(
            match_id = %match_id,
            player = ?outcome.player,
            sector = %sector,
            bust = outcome.bust,
            "dart applied"
        );
        if let Some(visit) = visit {
            session.log_visit(visit, writes);
        }

        let Some(winner) = outcome.leg_winner else {
            return Some(outcome);
        };
        let decided = session.record.record_leg_win(winner);
        info!(
            match_id = %match_id,
            leg = finished_number,
            winner = ?winner,
            legs_a = session.record.legs_won_a,
            legs_b = session.record.legs_won_b,
            "leg won"
        );
        if decided {
            if let Some(board_id) = &session.record.board_id {
                self.release_board(board_id, match_id);
            }
            info!(match_id = %match_id, winner = ?winner, "match finished");
        } else {
            session.leg = Some(LegSlot::start(
                finished_number + 1,
                session.record.start_score,
                session.record.next_starter,
                session.record.out_mode,
            ));
        }
        Some(outcome)
    }

    async fn on_takeout_finished(&self, session: &mut MatchSession) -> Result<(), ServiceError> {
        let match_id = session.record.id;
        if session.record.status != MatchStatus::Running {
            return Ok(());
        }
        let Some(leg) = session.active_leg() else {
            return Ok(());
        };
        if leg.runtime.darts_in_visit == 0 {
            return Ok(());
        }

        let visit = leg.cut_visit(match_id);
        let mut writes = Writes::leg(match_id, leg);
        if let Some(visit) = visit {
            session.log_visit(visit, &mut writes);
        }
        session.record.touch();
        debug!(match_id = %match_id, "takeout ended the visit early");
        self.commit(session, writes).await.map(|_| ())
    }

    /// Persist a new leg numbered after the stored ones and make it current.
    async fn open_leg(&self, session: &mut MatchSession) -> Result<(), ServiceError> {
        let store = self.store.require().await?;
        let match_id = session.record.id;
        let number = store.count_legs(match_id).await? + 1;
        let leg = LegSlot::start(
            number,
            session.record.start_score,
            session.record.next_starter,
            session.record.out_mode,
        );
        store.save_leg(LegEntity::snapshot(match_id, &leg)).await?;

        session.leg = Some(leg);
        session.record.status = MatchStatus::Running;
        session.record.touch();
        store
            .save_match(MatchEntity::from(&session.record))
            .await?;
        info!(match_id = %match_id, leg = number, "leg started");
        Ok(())
    }

    /// Persist the writes, then publish the new read-model whatever the outcome.
    ///
    /// On a storage failure memory stays authoritative and the error is returned.
    async fn commit(
        &self,
        session: &MatchSession,
        writes: Writes,
    ) -> Result<MatchState, ServiceError> {
        let persisted = self.persist(&session.record, writes).await;
        let state = session.state();
        self.publish(&state);
        if let Err(err) = &persisted {
            warn!(match_id = %session.record.id, error = %err, "match state is ahead of storage");
        }
        persisted.map(|()| state)
    }

    async fn persist(&self, record: &Match, writes: Writes) -> Result<(), ServiceError> {
        let store = self.store.require().await?;
        for visit in &writes.visits {
            store.insert_visit(VisitEntity::from(visit)).await?;
        }
        for leg in writes.legs {
            store.save_leg(leg).await?;
        }
        store.save_match(MatchEntity::from(record)).await?;
        Ok(())
    }

    fn publish(&self, state: &MatchState) {
        self.bus.publish(BusEvent::MatchUpdate {
            match_id: state.id,
            state: Box::new(state.clone()),
        });
    }

    fn session(&self, match_id: Uuid) -> Result<Arc<Mutex<MatchSession>>, ServiceError> {
        self.sessions
            .get(&match_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ServiceError::NotFound(format!("match {match_id}")))
    }

    /// Reserve `board_id` for `match_id`, enforcing one active match per board.
    async fn claim_board(
        &self,
        store: &Arc<dyn MatchStore>,
        board_id: &str,
        match_id: Uuid,
    ) -> Result<(), ServiceError> {
        match self.by_board.entry(board_id.to_owned()) {
            Entry::Occupied(entry) if *entry.get() != match_id => {
                return Err(ServiceError::Conflict(format!(
                    "board {board_id} already has active match {}",
                    entry.get()
                )));
            }
            Entry::Occupied(_) => {}
            Entry::Vacant(entry) => {
                entry.insert(match_id);
            }
        }

        match store
            .find_active_match_for_board(board_id.to_owned(), Some(match_id))
            .await
        {
            Ok(None) => Ok(()),
            Ok(Some(other)) => {
                self.release_board(board_id, match_id);
                Err(ServiceError::Conflict(format!(
                    "board {board_id} already has active match {}",
                    other.id
                )))
            }
            Err(err) => {
                self.release_board(board_id, match_id);
                Err(err.into())
            }
        }
    }

    fn release_board(&self, board_id: &str, match_id: Uuid) {
        self.by_board
            .remove_if(board_id, |_, owner| *owner == match_id);
    }
}
