//! Session/progress controller and vote sync buffer.
//!
//! One [`SessionController`] exists per participant session. It owns the
//! participant's position in the pair sequence and the vote records not yet
//! persisted to the remote store. All state transitions are strictly
//! forward: the cursor advances exactly once per recorded decision or
//! defective-pair skip and never rolls back, not even when persistence
//! fails.

use std::sync::Arc;

use catalog::{Catalog, PairEntry};
use chrono::Utc;
use shared::{
    domain::{PairId, SessionId, VoteRecord, Winner},
    error::{SessionError, StoreError},
};
use store::VoteStore;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

/// Whether the pre-flush read of existing remote rows may use a cached view.
///
/// Fresh reads are required whenever multiple flush cycles append to the
/// same sheet: the store's read-modify-rewrite is not atomic, so a stale
/// read silently drops rows written in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsistencyMode {
    CachedRead,
    #[default]
    FreshRead,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub sheet_name: String,
    /// Buffered record count that triggers an automatic flush. Clamped to a
    /// minimum of 1.
    pub flush_threshold: usize,
    pub consistency_mode: ConsistencyMode,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sheet_name: "Sheet1".to_string(),
            flush_threshold: 5,
            consistency_mode: ConsistencyMode::FreshRead,
        }
    }
}

/// Receives human-readable flush failure reports. Implementations must not
/// block or panic.
pub trait ObservabilitySink: Send + Sync {
    fn report(&self, message: &str);
}

/// Default sink: structured warning log.
pub struct TracingSink;

impl ObservabilitySink for TracingSink {
    fn report(&self, message: &str) {
        warn!(target: "session::sync", "{message}");
    }
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    VoteRecorded { pair_id: PairId },
    DefectiveSkipped { pair_id: PairId },
    FlushSucceeded { rows_flushed: usize },
    FlushFailed { message: String },
    Completed,
}

/// Outcome of a recorded decision, from the hosting UI's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionOutcome {
    Advanced,
    /// The sequence ended with this decision. `synced` reports whether the
    /// mandatory completion flush landed; when false the UI should tell the
    /// participant to wait and retry via [`SessionController::flush`].
    Complete { synced: bool },
}

/// Not-yet-persisted vote records, in decision order. Contents are always a
/// suffix of the session's full vote history: a flush removes all current
/// records and nothing else.
#[derive(Debug, Default)]
struct SyncBuffer {
    records: Vec<VoteRecord>,
}

impl SyncBuffer {
    fn push(&mut self, record: VoteRecord) {
        self.records.push(record);
    }

    fn len(&self) -> usize {
        self.records.len()
    }

    fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn records(&self) -> &[VoteRecord] {
        &self.records
    }

    fn clear(&mut self) {
        self.records.clear();
    }
}

struct ControllerState {
    cursor: usize,
    started: bool,
    buffer: SyncBuffer,
    /// Most recent flush failure message; cleared by a successful flush.
    sync_warning: Option<String>,
}

/// Point-in-time view of a session for the rendering layer.
#[derive(Debug, Clone)]
pub struct ControllerSnapshot {
    pub session_id: SessionId,
    pub started: bool,
    pub cursor: usize,
    pub total_pairs: usize,
    pub complete: bool,
    pub progress: f64,
    pub pending_votes: usize,
    pub sync_warning: Option<String>,
    pub current: Option<PairEntry>,
}

pub struct SessionController {
    session_id: SessionId,
    catalog: Arc<Catalog>,
    store: Arc<dyn VoteStore>,
    sink: Arc<dyn ObservabilitySink>,
    config: SessionConfig,
    // One UI event at a time: every operation takes this lock for its full
    // duration, including the network calls inside a flush.
    inner: Mutex<ControllerState>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionController {
    pub fn new(
        session_id: SessionId,
        catalog: Arc<Catalog>,
        store: Arc<dyn VoteStore>,
        sink: Arc<dyn ObservabilitySink>,
        mut config: SessionConfig,
    ) -> Self {
        config.flush_threshold = config.flush_threshold.max(1);
        let (events, _) = broadcast::channel(256);
        Self {
            session_id,
            catalog,
            store,
            sink,
            config,
            inner: Mutex::new(ControllerState {
                cursor: 0,
                started: false,
                buffer: SyncBuffer::default(),
                sync_warning: None,
            }),
            events,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Opens the instructions gate. No-op if already started. Skips any
    /// leading defective pairs so the first pair shown is votable, and runs
    /// the mandatory completion flush if that exhausts the sequence.
    pub async fn begin(&self) {
        let mut state = self.inner.lock().await;
        if state.started {
            return;
        }
        state.started = true;
        info!(session_id = %self.session_id, "session started");
        self.advance_past_defective(&mut state);
        if self.is_complete_locked(&state) {
            self.complete_locked(&mut state).await;
        }
    }

    /// Records the participant's decision for the pair at the current
    /// cursor and advances. The submitted `pair_id` must match the current
    /// pair; a duplicate or out-of-date submission is rejected rather than
    /// double-voted.
    ///
    /// Persistence failures never fail this operation: threshold flushes
    /// report through the observability sink, and the completion flush
    /// reports through [`DecisionOutcome::Complete`].
    pub async fn record_decision(
        &self,
        pair_id: &PairId,
        winner: Winner,
    ) -> Result<DecisionOutcome, SessionError> {
        let mut state = self.inner.lock().await;
        if !state.started {
            return Err(SessionError::NotStarted);
        }
        let Some(current) = self.catalog.get(state.cursor) else {
            return Err(SessionError::AlreadyComplete);
        };
        if current.pair_id != *pair_id {
            return Err(SessionError::StalePair {
                submitted: pair_id.0.clone(),
                current: current.pair_id.0.clone(),
            });
        }

        let record = VoteRecord::new(
            self.session_id.clone(),
            pair_id.clone(),
            winner,
            Utc::now(),
        )
        .map_err(|e| SessionError::InvalidVote(e.to_string()))?;

        state.buffer.push(record);
        state.cursor += 1;
        debug!(session_id = %self.session_id, pair_id = %pair_id, cursor = state.cursor, "vote recorded");
        let _ = self.events.send(SessionEvent::VoteRecorded {
            pair_id: pair_id.clone(),
        });

        self.advance_past_defective(&mut state);

        if self.is_complete_locked(&state) {
            let synced = self.complete_locked(&mut state).await;
            return Ok(DecisionOutcome::Complete { synced });
        }

        if state.buffer.len() >= self.config.flush_threshold {
            // Fire-and-forget relative to cursor advancement: the cursor is
            // already past the voted pair, so a failure only delays sync.
            let _ = self.flush_locked(&mut state).await;
        }
        Ok(DecisionOutcome::Advanced)
    }

    /// Advances past the pair at the current cursor without recording a
    /// vote, for pairs the catalog reported as defective. Only valid for
    /// the pair at the current cursor, and only when that pair actually
    /// lacks a full set of images; a votable pair must receive a vote.
    pub async fn skip_defective(&self, pair_id: &PairId) -> Result<DecisionOutcome, SessionError> {
        let mut state = self.inner.lock().await;
        if !state.started {
            return Err(SessionError::NotStarted);
        }
        let Some(current) = self.catalog.get(state.cursor) else {
            return Err(SessionError::AlreadyComplete);
        };
        if current.pair_id != *pair_id {
            return Err(SessionError::StalePair {
                submitted: pair_id.0.clone(),
                current: current.pair_id.0.clone(),
            });
        }
        if !current.is_defective() {
            return Err(SessionError::PairNotDefective(current.pair_id.0.clone()));
        }

        self.skip_current_locked(&mut state);
        self.advance_past_defective(&mut state);

        if self.is_complete_locked(&state) {
            let synced = self.complete_locked(&mut state).await;
            return Ok(DecisionOutcome::Complete { synced });
        }
        Ok(DecisionOutcome::Advanced)
    }

    /// Reconciles the buffer with the remote store: read existing rows
    /// (consistency mode permitting a cached view), append the buffered
    /// records after them, rewrite the sheet, clear the buffer. On failure
    /// the buffer is retained untouched and the failure is reported to the
    /// observability sink; retrying later is safe.
    ///
    /// An empty buffer is a complete no-op: no read, no write.
    pub async fn flush(&self) -> Result<usize, StoreError> {
        let mut state = self.inner.lock().await;
        self.flush_locked(&mut state).await
    }

    pub async fn is_complete(&self) -> bool {
        let state = self.inner.lock().await;
        self.is_complete_locked(&state)
    }

    pub async fn snapshot(&self) -> ControllerSnapshot {
        let state = self.inner.lock().await;
        let total = self.catalog.len();
        let complete = self.is_complete_locked(&state);
        let progress = if total == 0 {
            1.0
        } else {
            state.cursor as f64 / total as f64
        };
        ControllerSnapshot {
            session_id: self.session_id.clone(),
            started: state.started,
            cursor: state.cursor,
            total_pairs: total,
            complete,
            progress,
            pending_votes: state.buffer.len(),
            sync_warning: state.sync_warning.clone(),
            current: if state.started && !complete {
                self.catalog.get(state.cursor).cloned()
            } else {
                None
            },
        }
    }

    fn is_complete_locked(&self, state: &ControllerState) -> bool {
        state.cursor >= self.catalog.len()
    }

    fn skip_current_locked(&self, state: &mut ControllerState) {
        if let Some(entry) = self.catalog.get(state.cursor) {
            debug!(session_id = %self.session_id, pair_id = %entry.pair_id, "skipping defective pair");
            let _ = self.events.send(SessionEvent::DefectiveSkipped {
                pair_id: entry.pair_id.clone(),
            });
        }
        state.cursor += 1;
    }

    /// Defective pairs are invisible to the participant: advance until the
    /// cursor rests on a votable pair or the sequence ends.
    fn advance_past_defective(&self, state: &mut ControllerState) {
        while let Some(entry) = self.catalog.get(state.cursor) {
            if !entry.is_defective() {
                break;
            }
            self.skip_current_locked(state);
        }
    }

    /// Mandatory completion flush; bypasses the threshold. Returns whether
    /// every buffered record is now durable.
    async fn complete_locked(&self, state: &mut ControllerState) -> bool {
        info!(session_id = %self.session_id, "session complete");
        let _ = self.events.send(SessionEvent::Completed);
        self.flush_locked(state).await.is_ok()
    }

    async fn flush_locked(&self, state: &mut ControllerState) -> Result<usize, StoreError> {
        if state.buffer.is_empty() {
            return Ok(0);
        }
        let fresh = self.config.consistency_mode == ConsistencyMode::FreshRead;
        let sheet = &self.config.sheet_name;

        let result = async {
            let existing = self.store.read(sheet, fresh).await?;
            let mut combined = existing;
            combined.extend(state.buffer.records().iter().map(Into::into));
            self.store.write(sheet, &combined).await?;
            Ok::<usize, StoreError>(state.buffer.len())
        }
        .await;

        match result {
            Ok(flushed) => {
                state.buffer.clear();
                state.sync_warning = None;
                info!(session_id = %self.session_id, flushed, "buffer flushed");
                let _ = self.events.send(SessionEvent::FlushSucceeded {
                    rows_flushed: flushed,
                });
                Ok(flushed)
            }
            Err(error) => {
                let message = format!(
                    "failed to sync {} vote(s) for session {}: {error}",
                    state.buffer.len(),
                    self.session_id
                );
                self.sink.report(&message);
                state.sync_warning = Some(message.clone());
                let _ = self.events.send(SessionEvent::FlushFailed { message });
                Err(error)
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
