// queue/resolution_queue.rs - Batched instance label resolution
//
// Turns scattered "resolve this id" requests into a small number of bulk
// summary calls.
//
// Scheduling (re-evaluated on every insertion and after every dispatch):
// - pending set empty            -> cancel the debounce
// - pending < high_water_mark    -> (re)schedule the debounce
// - pending >= high_water_mark   -> cancel the debounce, dispatch now
//
// Dispatch takes up to batch_size ids in arrival order. At most one dispatch
// is in flight; the dispatch gate is try-locked by scheduled dispatches and
// awaited by flush_now(). Ids of the current batch stay in `in_flight` until
// their result has been applied to the cache.
//
// Phases: Idle -> Scheduled -> Dispatching -> Idle

use indexmap::IndexSet;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::AbortHandle;

use crate::cache::{InstanceCache, ResolutionState};
use crate::config::QueueConfig;
use crate::errors::{ResolverError, Result};
use crate::queue::timer::{Timer, TokioTimer};
use crate::transport::{SummarySlot, SummaryTransport};

/// Scheduling phase of the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePhase {
    Idle,
    Scheduled,
    Dispatching,
}

struct QueueState {
    pending: IndexSet<String>,
    in_flight: HashSet<String>,
    phase: QueuePhase,
    generation: u64,
    debounce: Option<AbortHandle>,
}

impl QueueState {
    fn new() -> Self {
        Self {
            pending: IndexSet::new(),
            in_flight: HashSet::new(),
            phase: QueuePhase::Idle,
            generation: 0,
            debounce: None,
        }
    }

    /// Cancel any scheduled debounce. Bumping the generation also voids a
    /// timer that already woke up but has not yet claimed the dispatch.
    fn cancel_debounce(&mut self) {
        self.generation += 1;
        if let Some(handle) = self.debounce.take() {
            handle.abort();
        }
        if self.phase == QueuePhase::Scheduled {
            self.phase = QueuePhase::Idle;
        }
    }
}

/// Reject ids that can never name an instance (empty or whitespace-only)
pub fn validate_instance_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(ResolverError::InvalidInstanceId(id.to_string()));
    }
    Ok(())
}

/// Batched label resolution queue
///
/// Must be used from within a tokio runtime: scheduling spawns the debounce
/// timer and dispatch tasks.
pub struct ResolutionQueue {
    cache: Arc<InstanceCache>,
    transport: Arc<dyn SummaryTransport>,
    timer: Arc<dyn Timer>,
    config: QueueConfig,
    state: Mutex<QueueState>,
    dispatch_gate: tokio::sync::Mutex<()>,
}

impl ResolutionQueue {
    /// Create a queue driven by the tokio clock
    pub fn new(
        cache: Arc<InstanceCache>,
        transport: Arc<dyn SummaryTransport>,
        config: QueueConfig,
    ) -> Arc<Self> {
        Self::with_timer(cache, transport, Arc::new(TokioTimer), config)
    }

    /// Create a queue with an explicit debounce timer
    pub fn with_timer(
        cache: Arc<InstanceCache>,
        transport: Arc<dyn SummaryTransport>,
        timer: Arc<dyn Timer>,
        config: QueueConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            cache,
            transport,
            timer,
            config,
            state: Mutex::new(QueueState::new()),
            dispatch_gate: tokio::sync::Mutex::new(()),
        })
    }

    pub fn cache(&self) -> &Arc<InstanceCache> {
        &self.cache
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn phase(&self) -> QueuePhase {
        self.lock_state().phase
    }

    /// Ids waiting for a dispatch
    pub fn pending_len(&self) -> usize {
        self.lock_state().pending.len()
    }

    /// Ids of the batch currently on the wire
    pub fn in_flight_len(&self) -> usize {
        self.lock_state().in_flight.len()
    }

    pub fn is_queued(&self, id: &str) -> bool {
        let state = self.lock_state();
        state.pending.contains(id) || state.in_flight.contains(id)
    }

    /// Ask for `id` to be resolved
    ///
    /// Creates the cache record if needed. No-op when the record is already
    /// fetching or fetched, or when the id is already pending. Errored
    /// records are queued again. Fetch failures never surface here; they end
    /// up in the record's `fetch_error`.
    pub fn request_resolution(self: &Arc<Self>, id: &str) -> Result<()> {
        validate_instance_id(id)?;

        let record = self.cache.get_or_create(id);
        if record.is_fetching || record.is_fetched {
            tracing::trace!(id, "already resolved or fetching");
            return Ok(());
        }

        self.enqueue(id);
        Ok(())
    }

    /// Re-queue a record whose last fetch failed
    ///
    /// Returns false when the record is not in the errored state.
    pub fn retry(self: &Arc<Self>, id: &str) -> Result<bool> {
        validate_instance_id(id)?;

        match self.cache.get(id).map(|record| record.state()) {
            Some(ResolutionState::Errored) => Ok(self.enqueue(id)),
            _ => Ok(false),
        }
    }

    /// Dispatch everything pending now, bypassing the debounce
    ///
    /// Waits for an in-flight dispatch to finish first, then sends batch
    /// after batch until the pending set is empty.
    pub async fn flush_now(self: &Arc<Self>) {
        self.lock_state().cancel_debounce();

        let gate = self.dispatch_gate.lock().await;
        while self.dispatch_batch().await > 0 {}
        drop(gate);

        self.process_queue();
    }

    /// Callers have checked that the record is not fetching. An id can still
    /// be in flight when its record was invalidated and recreated; it is
    /// queued again and the stale result is dropped by the cache.
    fn enqueue(self: &Arc<Self>, id: &str) -> bool {
        {
            let mut state = self.lock_state();
            if !state.pending.insert(id.to_string()) {
                return false;
            }
        }

        self.process_queue();
        true
    }

    fn process_queue(self: &Arc<Self>) {
        let mut state = self.lock_state();
        let pending = state.pending.len();

        if pending == 0 {
            state.cancel_debounce();
        } else if pending < self.config.high_water_mark {
            state.cancel_debounce();
            let generation = state.generation;
            let sleep = self.timer.sleep(self.config.debounce());
            let queue = Arc::clone(self);
            let task = tokio::spawn(async move {
                sleep.await;
                queue.on_debounce_elapsed(generation).await;
            });
            state.debounce = Some(task.abort_handle());
            if state.phase == QueuePhase::Idle {
                state.phase = QueuePhase::Scheduled;
            }
        } else {
            state.cancel_debounce();
            drop(state);
            tracing::debug!(pending, "high-water mark reached; dispatching immediately");
            let queue = Arc::clone(self);
            tokio::spawn(async move {
                queue.dispatch().await;
            });
        }
    }

    async fn on_debounce_elapsed(self: &Arc<Self>, generation: u64) {
        {
            let mut state = self.lock_state();
            if state.generation != generation {
                return;
            }
            // Claimed: a later cancel can no longer abort this task
            state.debounce = None;
        }

        self.dispatch().await;
    }

    /// Scheduled dispatch. Deferred if another dispatch holds the gate; the
    /// holder re-evaluates the pending set when it finishes.
    async fn dispatch(self: &Arc<Self>) {
        let Ok(gate) = self.dispatch_gate.try_lock() else {
            tracing::trace!("dispatch in flight; deferring");
            return;
        };

        self.dispatch_batch().await;
        drop(gate);

        self.process_queue();
    }

    /// Send one batch and apply its results. Caller must hold the gate.
    /// Returns the number of ids sent.
    async fn dispatch_batch(&self) -> usize {
        let batch: Vec<String> = {
            let mut state = self.lock_state();
            let take = state.pending.len().min(self.config.batch_size);
            if take == 0 {
                return 0;
            }

            let batch: Vec<String> = state.pending.drain(..take).collect();
            state.in_flight.extend(batch.iter().cloned());
            state.phase = QueuePhase::Dispatching;
            batch
        };

        self.cache.mark_fetching(&batch);
        tracing::debug!(batch_size = batch.len(), "dispatching summary batch");

        match self.transport.resolve_batch(&batch).await {
            Ok(response) => {
                for id in &batch {
                    match response.slot(id) {
                        Some(SummarySlot::Entry(entry)) => match &entry.error {
                            Some(error) => self.cache.apply_error(id, error.render()),
                            None => self.cache.apply_summary(id, entry),
                        },
                        Some(slot) if !slot.is_null() => {
                            tracing::warn!(id = %id, "malformed summary entry");
                            self.cache.apply_error(
                                id,
                                format!("Error fetching instance {} (malformed summary entry)", id),
                            );
                        }
                        _ => self
                            .cache
                            .apply_error(id, format!("Error fetching instance {}", id)),
                    }
                    self.lock_state().in_flight.remove(id);
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, batch_size = batch.len(), "summary request failed");
                for id in &batch {
                    self.cache
                        .apply_error(id, format!("Error fetching instance {} ({})", id, err));
                    self.lock_state().in_flight.remove(id);
                }
            }
        }

        let mut state = self.lock_state();
        state.phase = if state.debounce.is_some() {
            QueuePhase::Scheduled
        } else {
            QueuePhase::Idle
        };

        batch.len()
    }

    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
