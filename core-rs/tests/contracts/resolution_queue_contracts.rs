// Resolution Queue Contract Tests
//
// These tests verify INVARIANTS of the label resolution queue that callers
// (link chips, dropdown rows, table rows) rely on. They run on tokio's paused
// clock: time only moves when every task is idle, so debounce behaviour is
// deterministic.

use async_trait::async_trait;
use kg_labels::transport::{FieldDescriptor, SummaryError, SummaryFields, SummarySlot};
use kg_labels::{
    InstanceCache, QueueConfig, QueuePhase, ResolutionQueue, ResolutionState, ResolverError, Result, SummaryEntry,
    SummaryResponse, SummaryTransport, NAME_FIELD,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

type Responder = Box<dyn Fn(usize, &[String]) -> Result<SummaryResponse> + Send + Sync>;

/// Transport that records batches, tracks overlap, and can be held closed
struct ScriptedTransport {
    batches: Mutex<Vec<Vec<String>>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    gate: Option<Semaphore>,
    responder: Responder,
}

impl ScriptedTransport {
    fn echo() -> Arc<Self> {
        Self::build(None, Box::new(|_: usize, ids: &[String]| Ok(named(ids))))
    }

    fn gated() -> Arc<Self> {
        Self::build(Some(Semaphore::new(0)), Box::new(|_: usize, ids: &[String]| Ok(named(ids))))
    }

    fn responding(responder: Responder) -> Arc<Self> {
        Self::build(None, responder)
    }

    fn build(gate: Option<Semaphore>, responder: Responder) -> Arc<Self> {
        Arc::new(Self {
            batches: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            gate,
            responder,
        })
    }

    fn open(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }

    fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SummaryTransport for ScriptedTransport {
    async fn resolve_batch(&self, ids: &[String]) -> Result<SummaryResponse> {
        let call = {
            let mut batches = self.batches.lock().unwrap();
            batches.push(ids.to_vec());
            batches.len() - 1
        };
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
        (self.responder)(call, ids)
    }
}

fn named(ids: &[String]) -> SummaryResponse {
    let mut response = SummaryResponse::default();
    for id in ids {
        response.insert(
            id.clone(),
            SummaryEntry {
                name: Some(format!("Name of {}", id)),
                ..Default::default()
            },
        );
    }
    response
}

fn queue_with(transport: Arc<ScriptedTransport>, high_water_mark: usize, batch_size: usize) -> Arc<ResolutionQueue> {
    ResolutionQueue::new(
        Arc::new(InstanceCache::new()),
        transport,
        QueueConfig {
            debounce_ms: 250,
            high_water_mark,
            batch_size,
        },
    )
}

async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

async fn wait(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

/// WHY: Many rows render the same linked instance at once
/// REASON: Each row asks independently; the backend must see the id once
/// BREAKS: Duplicate ids in a batch, wasted backend work
#[tokio::test(start_paused = true)]
async fn repeated_requests_dispatch_id_once() {
    let transport = ScriptedTransport::echo();
    let queue = queue_with(transport.clone(), 100, 100);

    queue.request_resolution("A").unwrap();
    queue.request_resolution("A").unwrap();
    queue.request_resolution("A").unwrap();

    assert_eq!(queue.pending_len(), 1);
    wait(300).await;

    assert_eq!(transport.batches(), vec![vec!["A".to_string()]]);
    assert_eq!(queue.cache().len(), 1);
}

/// WHY: A record that is fetching must not be fetched again concurrently
/// REASON: At most one request per id may be on the wire
/// BREAKS: Out-of-order responses overwriting each other
#[tokio::test(start_paused = true)]
async fn fetching_id_is_not_requeued() {
    let transport = ScriptedTransport::gated();
    let queue = queue_with(transport.clone(), 100, 100);

    queue.request_resolution("A").unwrap();
    wait(300).await;

    assert!(queue.cache().get("A").unwrap().is_fetching);
    assert_eq!(queue.phase(), QueuePhase::Dispatching);

    queue.request_resolution("A").unwrap();
    assert_eq!(queue.pending_len(), 0);
    assert_eq!(queue.in_flight_len(), 1);

    transport.open(10);
    wait(1000).await;

    assert_eq!(transport.batches().len(), 1);
    assert!(!queue.cache().get("A").unwrap().is_fetching);
}

/// WHY: Requests arriving within the debounce window share one request
/// REASON: A list of linked chips mounts in a burst
/// BREAKS: One HTTP call per chip
#[tokio::test(start_paused = true)]
async fn debounce_coalesces_burst_into_one_batch() {
    let transport = ScriptedTransport::echo();
    let queue = queue_with(transport.clone(), 100, 100);

    queue.request_resolution("A").unwrap();
    wait(100).await;
    queue.request_resolution("B").unwrap();
    wait(100).await;
    queue.request_resolution("C").unwrap();

    // 200ms since A, but the debounce restarted on C
    wait(200).await;
    assert!(transport.batches().is_empty());
    assert_eq!(queue.phase(), QueuePhase::Scheduled);

    wait(100).await;
    assert_eq!(
        transport.batches(),
        vec![vec!["A".to_string(), "B".to_string(), "C".to_string()]]
    );
    assert_eq!(queue.phase(), QueuePhase::Idle);
}

/// WHY: The pending set must not grow without bound while waiting
/// REASON: Back-pressure; reaching the high-water mark dispatches at once
/// BREAKS: Huge requests and a UI stuck waiting for the debounce
#[tokio::test(start_paused = true)]
async fn high_water_mark_dispatches_immediately() {
    let transport = ScriptedTransport::echo();
    let queue = queue_with(transport.clone(), 5, 100);
    let start = tokio::time::Instant::now();

    for i in 0..5 {
        queue.request_resolution(&format!("id-{}", i)).unwrap();
    }
    settle().await;

    assert!(start.elapsed() < Duration::from_millis(250));
    assert_eq!(transport.batches().len(), 1);
    assert_eq!(transport.batches()[0].len(), 5);
    assert_eq!(queue.pending_len(), 0);
}

/// WHY: A single request carries at most batch_size ids
/// REASON: The backend bounds request size
/// BREAKS: Rejected oversized requests, every id errored
#[tokio::test(start_paused = true)]
async fn batch_cap_leaves_remainder_pending() {
    let transport = ScriptedTransport::echo();
    let queue = queue_with(transport.clone(), 100, 3);

    for i in 0..8 {
        queue.request_resolution(&format!("id-{}", i)).unwrap();
    }

    wait(260).await;
    assert_eq!(transport.batches().len(), 1);
    assert_eq!(transport.batches()[0].len(), 3);
    assert_eq!(queue.pending_len(), 5);

    wait(1000).await;
    let sizes: Vec<usize> = transport.batches().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![3, 3, 2]);
    assert_eq!(queue.pending_len(), 0);

    // FIFO by arrival order
    let order: Vec<String> = transport.batches().concat();
    let expected: Vec<String> = (0..8).map(|i| format!("id-{}", i)).collect();
    assert_eq!(order, expected);
}

/// WHY: One bad id must not poison the rest of its batch
/// REASON: Per-id error isolation
/// BREAKS: Whole tables showing errors because of one missing instance
#[tokio::test(start_paused = true)]
async fn partial_failure_is_isolated_per_id() {
    let transport = ScriptedTransport::responding(Box::new(|_: usize, _: &[String]| {
        let mut response = SummaryResponse::default();
        response.insert(
            "X".to_string(),
            SummaryEntry {
                name: Some("Experiment".to_string()),
                ..Default::default()
            },
        );
        response.insert(
            "Y".to_string(),
            SummaryEntry {
                error: Some(SummaryError {
                    message: json!("Access denied"),
                }),
                ..Default::default()
            },
        );
        Ok(response)
    }));
    let queue = queue_with(transport.clone(), 100, 100);

    for id in ["X", "Y", "Z"] {
        queue.request_resolution(id).unwrap();
    }
    queue.flush_now().await;

    let x = queue.cache().get("X").unwrap();
    assert!(x.is_fetched);
    assert!(x.fetch_error.is_none());

    let y = queue.cache().get("Y").unwrap();
    assert_eq!(y.fetch_error.as_deref(), Some("Access denied"));
    assert!(!y.is_fetched);
    assert!(y.fields.is_empty());

    let z = queue.cache().get("Z").unwrap();
    assert_eq!(z.fetch_error.as_deref(), Some("Error fetching instance Z"));

    for record in [x, y, z] {
        assert!(!record.is_fetching);
    }
    assert_eq!(queue.in_flight_len(), 0);
}

/// WHY: A null or malformed entry is one id's problem
/// REASON: Entries are parsed independently of each other
/// BREAKS: One broken record erroring every label in the batch
#[tokio::test(start_paused = true)]
async fn bad_entry_is_isolated_per_id() {
    let transport = ScriptedTransport::responding(Box::new(|_: usize, _: &[String]| {
        let mut response = SummaryResponse::default();
        response.insert(
            "X",
            SummaryEntry {
                name: Some("Experiment".to_string()),
                ..Default::default()
            },
        );
        response.data.insert("Z".to_string(), SummarySlot::Malformed(Value::Null));
        response.data.insert("N".to_string(), SummarySlot::Malformed(json!({"name": 42})));
        Ok(response)
    }));
    let queue = queue_with(transport, 100, 100);

    for id in ["X", "Z", "N"] {
        queue.request_resolution(id).unwrap();
    }
    queue.flush_now().await;

    assert_eq!(queue.cache().get("X").unwrap().state(), ResolutionState::Resolved);
    assert_eq!(
        queue.cache().get("Z").unwrap().fetch_error.as_deref(),
        Some("Error fetching instance Z")
    );
    assert_eq!(
        queue.cache().get("N").unwrap().fetch_error.as_deref(),
        Some("Error fetching instance N (malformed summary entry)")
    );
    assert_eq!(queue.in_flight_len(), 0);
}

/// WHY: A failed request degrades to per-id errors
/// REASON: Records must never stay in a perpetual loading state
/// BREAKS: Spinners that never stop after a network failure
#[tokio::test(start_paused = true)]
async fn transport_failure_marks_every_id() {
    let transport = ScriptedTransport::responding(Box::new(|_: usize, _: &[String]| {
        Err(ResolverError::Transport("network down".to_string()))
    }));
    let queue = queue_with(transport.clone(), 100, 100);

    queue.request_resolution("X").unwrap();
    queue.request_resolution("Y").unwrap();
    wait(300).await;

    for id in ["X", "Y"] {
        let record = queue.cache().get(id).unwrap();
        let error = record.fetch_error.unwrap();
        assert!(error.contains("network down"), "unexpected error: {}", error);
        assert!(error.starts_with(&format!("Error fetching instance {}", id)));
        assert!(!record.is_fetching);
        assert!(!record.is_fetched);
    }

    // Failed ids are not retried automatically
    wait(10_000).await;
    assert_eq!(transport.batches().len(), 1);
}

/// WHY: A failed batch must not stop later batches
/// REASON: The loop degrades, it does not abort
/// BREAKS: Every later request hanging after one network blip
#[tokio::test(start_paused = true)]
async fn transport_failure_does_not_stop_the_loop() {
    let transport = ScriptedTransport::responding(Box::new(|call: usize, ids: &[String]| {
        if call == 0 {
            Err(ResolverError::Transport("network down".to_string()))
        } else {
            Ok(named(ids))
        }
    }));
    let queue = queue_with(transport.clone(), 100, 100);

    queue.request_resolution("X").unwrap();
    wait(300).await;
    assert!(queue.cache().get("X").unwrap().fetch_error.is_some());

    queue.request_resolution("Y").unwrap();
    // Caller-initiated retry of the failed id
    assert!(queue.retry("X").unwrap());
    wait(300).await;

    assert_eq!(transport.batches().len(), 2);
    assert_eq!(transport.batches()[1], vec!["Y".to_string(), "X".to_string()]);
    for id in ["X", "Y"] {
        let record = queue.cache().get(id).unwrap();
        assert!(record.is_fetched);
        assert!(record.fetch_error.is_none());
    }
}

/// WHY: Dispatches never overlap
/// REASON: A stale response must not clobber a newer one
/// BREAKS: Result ordering, the single-writer guarantee
#[tokio::test(start_paused = true)]
async fn dispatch_never_overlaps() {
    let transport = ScriptedTransport::gated();
    let queue = queue_with(transport.clone(), 100, 100);

    queue.request_resolution("A").unwrap();
    wait(300).await;
    assert_eq!(transport.batches().len(), 1);

    // B arrives while A's batch is on the wire; its debounce fires and defers
    queue.request_resolution("B").unwrap();
    wait(400).await;
    assert_eq!(transport.batches().len(), 1);
    assert_eq!(queue.pending_len(), 1);

    transport.open(10);
    wait(1000).await;

    assert_eq!(
        transport.batches(),
        vec![vec!["A".to_string()], vec!["B".to_string()]]
    );
    assert_eq!(transport.max_active(), 1);
    assert!(queue.cache().get("B").unwrap().is_fetched);
}

/// WHY: Back-pressure still applies while a batch is on the wire
/// REASON: The deferred dispatch is picked up as soon as the gate frees
/// BREAKS: A full pending set waiting out a debounce it should skip
#[tokio::test(start_paused = true)]
async fn high_water_mark_during_dispatch_sends_next_batch_on_completion() {
    let transport = ScriptedTransport::gated();
    let queue = queue_with(transport.clone(), 3, 100);
    let start = tokio::time::Instant::now();

    for id in ["A", "B", "C"] {
        queue.request_resolution(id).unwrap();
    }
    settle().await;
    assert_eq!(transport.batches().len(), 1);

    // Reaches the mark again while A, B, C are in flight: dispatch defers
    for id in ["D", "E", "F"] {
        queue.request_resolution(id).unwrap();
    }
    settle().await;
    assert_eq!(transport.batches().len(), 1);
    assert_eq!(queue.pending_len(), 3);
    assert_eq!(queue.phase(), QueuePhase::Dispatching);

    transport.open(10);
    settle().await;

    assert_eq!(
        transport.batches(),
        vec![
            vec!["A".to_string(), "B".to_string(), "C".to_string()],
            vec!["D".to_string(), "E".to_string(), "F".to_string()],
        ]
    );
    assert!(start.elapsed() < Duration::from_millis(250));
    assert_eq!(transport.max_active(), 1);
    assert_eq!(queue.pending_len(), 0);
}

/// WHY: Invalidating a record drops the result of its in-flight request
/// REASON: The recreated record asked again; only the new request may fill it
/// BREAKS: Stale labels after a refresh, re-requests silently swallowed
#[tokio::test(start_paused = true)]
async fn request_after_invalidation_in_flight_is_queued_again() {
    let transport = ScriptedTransport::build(
        Some(Semaphore::new(0)),
        Box::new(|call: usize, ids: &[String]| {
            let mut response = SummaryResponse::default();
            let name = if call == 0 { "stale" } else { "fresh" };
            for id in ids {
                response.insert(
                    id.clone(),
                    SummaryEntry {
                        name: Some(name.to_string()),
                        ..Default::default()
                    },
                );
            }
            Ok(response)
        }),
    );
    let queue = queue_with(transport.clone(), 100, 100);

    queue.request_resolution("A").unwrap();
    wait(300).await;
    assert_eq!(queue.in_flight_len(), 1);

    queue.cache().invalidate("A");
    queue.request_resolution("A").unwrap();
    assert_eq!(queue.pending_len(), 1);

    transport.open(1);
    settle().await;

    let record = queue.cache().get("A").unwrap();
    assert_eq!(record.state(), ResolutionState::Unresolved);
    assert!(record.name.is_none());
    assert_eq!(queue.pending_len(), 1);

    transport.open(1);
    wait(300).await;

    assert_eq!(transport.batches().len(), 2);
    let record = queue.cache().get("A").unwrap();
    assert_eq!(record.state(), ResolutionState::Resolved);
    assert_eq!(record.label(), "fresh");
}

/// WHY: flush_now waits for an in-flight dispatch instead of overlapping it
/// REASON: Same single-dispatch rule for the explicit flush
/// BREAKS: Two concurrent requests from one queue
#[tokio::test(start_paused = true)]
async fn flush_now_waits_for_in_flight_dispatch() {
    let transport = ScriptedTransport::gated();
    let queue = queue_with(transport.clone(), 100, 100);

    queue.request_resolution("A").unwrap();
    wait(300).await;
    queue.request_resolution("B").unwrap();

    let flusher = {
        let queue = queue.clone();
        tokio::spawn(async move { queue.flush_now().await })
    };
    settle().await;
    assert_eq!(transport.batches().len(), 1);
    assert!(!flusher.is_finished());

    transport.open(10);
    flusher.await.unwrap();

    assert_eq!(
        transport.batches(),
        vec![vec!["A".to_string()], vec!["B".to_string()]]
    );
    assert_eq!(transport.max_active(), 1);
    assert_eq!(queue.pending_len(), 0);
}

/// WHY: Every resolved record carries a display-name field
/// REASON: Views read the label from the same key for every type
/// BREAKS: Blank labels for types whose backend fields lack a name
#[tokio::test(start_paused = true)]
async fn resolved_record_has_synthesized_name_field() {
    let transport = ScriptedTransport::responding(Box::new(|_: usize, _: &[String]| {
        let mut fields = indexmap::IndexMap::new();
        fields.insert(NAME_FIELD.to_string(), FieldDescriptor::new("Backend name", json!("stale")));
        fields.insert("https://schema.org/description".to_string(), FieldDescriptor::new("Description", json!("text")));

        let mut response = SummaryResponse::default();
        response.insert(
            "X".to_string(),
            SummaryEntry {
                name: Some("Real name".to_string()),
                fields: Some(SummaryFields::Map(fields)),
                ..Default::default()
            },
        );
        Ok(response)
    }));
    let queue = queue_with(transport, 100, 100);

    queue.request_resolution("X").unwrap();
    queue.flush_now().await;

    let record = queue.cache().get("X").unwrap();
    let name = &record.fields[NAME_FIELD];
    assert_eq!(name.name, "Name");
    assert_eq!(name.value, json!("Real name"));
    assert_eq!(record.fields["https://schema.org/description"].value, json!("text"));
}
