//! Priority queue of pending restoration tasks.

use chrono::{DateTime, Utc};
use oldpho_core::ProcessingResult;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tokio::sync::oneshot;

use crate::orchestrator::OrchestratorError;

/// One restoration job as it moves through the orchestrator.
#[derive(Debug, Clone)]
pub struct RestorationRequest {
    /// Generated at enqueue time
    pub id: String,
    pub image: Vec<u8>,

    /// Higher is served first
    pub priority: i32,

    pub enqueued_at: DateTime<Utc>,

    /// Full passes over the providers already spent
    pub retry_count: u32,
    pub max_retries: u32,

    /// Provider currently (or last) attempted
    pub assigned_provider: Option<String>,
}

impl RestorationRequest {
    pub fn new(image: Vec<u8>, priority: i32, max_retries: u32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            image,
            priority,
            enqueued_at: Utc::now(),
            retry_count: 0,
            max_retries,
            assigned_provider: None,
        }
    }
}

pub(crate) type Responder = oneshot::Sender<Result<ProcessingResult, OrchestratorError>>;

/// A request plus the channel its caller waits on.
pub(crate) struct QueuedTask {
    pub request: RestorationRequest,
    pub responder: Responder,
    seq: i64,
}

impl QueuedTask {
    pub fn new(request: RestorationRequest, responder: Responder) -> Self {
        Self {
            request,
            responder,
            seq: 0,
        }
    }

    /// Deliver the outcome. A caller that stopped waiting is ignored.
    pub fn respond(self, outcome: Result<ProcessingResult, OrchestratorError>) {
        let _ = self.responder.send(outcome);
    }
}

// Max-heap order: higher priority first, then lower sequence number.
impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        self.request
            .priority
            .cmp(&other.request.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedTask {}

/// Tasks ordered by descending priority, FIFO within a priority.
///
/// Once closed the queue accepts nothing; rejected pushes hand the task
/// back so the caller can be answered.
#[derive(Default)]
pub(crate) struct TaskQueue {
    heap: BinaryHeap<QueuedTask>,
    back_seq: i64,
    front_seq: i64,
    closed: bool,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue behind every task of the same priority.
    pub fn push(&mut self, mut task: QueuedTask) -> Result<(), QueuedTask> {
        if self.closed {
            return Err(task);
        }
        task.seq = self.back_seq;
        self.back_seq += 1;
        self.heap.push(task);
        Ok(())
    }

    /// Enqueue ahead of every task of the same priority.
    pub fn push_front(&mut self, mut task: QueuedTask) -> Result<(), QueuedTask> {
        if self.closed {
            return Err(task);
        }
        self.front_seq -= 1;
        task.seq = self.front_seq;
        self.heap.push(task);
        Ok(())
    }

    /// Next task whose caller is still waiting. Abandoned tasks are dropped.
    pub fn pop_live(&mut self) -> Option<QueuedTask> {
        while let Some(task) = self.heap.pop() {
            if !task.responder.is_closed() {
                return Some(task);
            }
            tracing::debug!(request_id = %task.request.id, "Dropping abandoned request");
        }
        None
    }

    /// Refuse further pushes and hand back everything still queued.
    pub fn close(&mut self) -> Vec<QueuedTask> {
        self.closed = true;
        self.heap.drain().collect()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }
}
