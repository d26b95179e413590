//! The best-effort, non-blocking event recorder (§4.4): a process-wide
//! singleton (§9 "global mutable state ... explicit lifecycle-managed
//! collaborators") that decouples SSE emission latency from storage
//! latency. `enqueue` never awaits a database write; a background worker
//! drains the bounded buffer and calls the real `RunEventRepository`.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use uuid::Uuid;

use ports::{EventChannel, RunEventRepository};

const TERMINAL_KINDS: &[&str] = &["final", "error", "run-completed", "run-failed"];

fn is_terminal(kind: &str) -> bool {
    TERMINAL_KINDS.contains(&kind)
}

struct QueuedEvent {
    run_id: Uuid,
    channel: EventChannel,
    kind: String,
    payload: serde_json::Value,
}

struct Inner {
    buffer: Mutex<VecDeque<QueuedEvent>>,
    notify: Notify,
    capacity: usize,
}

/// A non-blocking `enqueue` handle backed by a bounded in-memory buffer.
///
/// Queue-full policy (§4.4): drop the oldest *non-terminal* event and log a
/// warning; terminal events (`final`, `error`, `run-completed`,
/// `run-failed`) are never dropped, even if that means briefly exceeding
/// `capacity`.
#[derive(Clone)]
pub struct EventRecorder {
    inner: Arc<Inner>,
}

impl EventRecorder {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                buffer: Mutex::new(VecDeque::with_capacity(capacity)),
                notify: Notify::new(),
                capacity,
            }),
        }
    }

    /// Enqueue an event for asynchronous persistence. Never blocks on I/O.
    pub fn enqueue(&self, run_id: Uuid, channel: EventChannel, kind: impl Into<String>, payload: serde_json::Value) {
        let kind = kind.into();
        let terminal = is_terminal(&kind);
        let mut buffer = self.inner.buffer.lock();

        if buffer.len() >= self.inner.capacity {
            if let Some(pos) = buffer.iter().position(|e| !is_terminal(&e.kind)) {
                buffer.remove(pos);
                tracing::warn!(run_id = %run_id, "event queue saturated, dropped oldest non-terminal event");
            } else if !terminal {
                tracing::warn!(run_id = %run_id, kind, "event queue saturated with terminal events, dropping non-terminal event");
                return;
            } else {
                tracing::warn!(run_id = %run_id, "event queue saturated with terminal events, growing buffer to avoid dropping a terminal event");
            }
        }

        buffer.push_back(QueuedEvent { run_id, channel, kind, payload });
        drop(buffer);
        self.inner.notify.notify_one();
    }

    pub fn queue_len(&self) -> usize {
        self.inner.buffer.lock().len()
    }

    /// Spawn the single background consumer task that drains the buffer into
    /// `repo`. The consumer is the only writer touching the underlying
    /// storage for best-effort events, avoiding write contention (§5).
    pub fn spawn_worker(&self, repo: Arc<dyn RunEventRepository>) -> JoinHandle<()> {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            loop {
                let next = {
                    let mut buffer = inner.buffer.lock();
                    buffer.pop_front()
                };
                let Some(event) = next else {
                    inner.notify.notified().await;
                    continue;
                };
                if let Err(err) = repo.append(event.run_id, event.channel, &event.kind, event.payload).await {
                    tracing::error!(run_id = %event.run_id, error = %err, "best-effort event append failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ports::testing::InMemoryRunEventRepository;

    #[tokio::test]
    async fn worker_drains_enqueued_events_in_order() {
        let recorder = EventRecorder::new(16);
        let repo: Arc<dyn RunEventRepository> = Arc::new(InMemoryRunEventRepository::new());
        let handle = recorder.spawn_worker(repo.clone());

        let run_id = Uuid::new_v4();
        for i in 0..5 {
            recorder.enqueue(run_id, EventChannel::Execution, "node-progress", serde_json::json!({ "i": i }));
        }
        recorder.enqueue(run_id, EventChannel::Execution, "final", serde_json::json!({}));

        // Give the background worker a chance to drain.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        handle.abort();

        let events = repo.list_after(run_id, 0).await.unwrap();
        assert_eq!(events.len(), 6);
        assert_eq!(events.last().unwrap().kind, "final");
    }

    #[test]
    fn saturated_queue_drops_oldest_non_terminal_not_terminal() {
        let recorder = EventRecorder::new(2);
        let run_id = Uuid::new_v4();
        recorder.enqueue(run_id, EventChannel::Execution, "node-start", serde_json::json!({}));
        recorder.enqueue(run_id, EventChannel::Execution, "final", serde_json::json!({}));
        // Buffer full (2/2): enqueueing a third event must evict the
        // non-terminal "node-start", never the "final".
        recorder.enqueue(run_id, EventChannel::Execution, "node-progress", serde_json::json!({}));

        let buffer = recorder.inner.buffer.lock();
        assert!(buffer.iter().any(|e| e.kind == "final"));
        assert!(!buffer.iter().any(|e| e.kind == "node-start"));
    }
}
