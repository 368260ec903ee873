/// In-memory notification queue
///
/// Accepts notification envelopes from producer code, deduplicates them
/// inside a sliding window, keeps them in priority/FIFO order, and drives a
/// single delivery worker with exponential-backoff retries. Best-effort by
/// design: state is process-local and lost on restart, and no failure ever
/// propagates back to the `enqueue` caller.
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::QueueConfig;
use crate::metrics;
use crate::models::{Envelope, EnqueueOptions, NotificationPriority, PriorityBreakdown, QueueStatus};
use crate::services::delivery;
use crate::websocket::ConnectionRegistry;

/// Envelope identity for deduplication: a stable hash of `(type, payload)`.
/// The enqueue timestamp is deliberately left out so that resubmissions of
/// the same content inside the window actually collide.
fn identity_hash(kind: &str, payload: &serde_json::Value) -> u64 {
    let mut hasher = DefaultHasher::new();
    kind.hash(&mut hasher);
    payload.to_string().hash(&mut hasher);
    hasher.finish()
}

struct DedupEntry {
    id: String,
    inserted_at: Instant,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Envelope>,
    dedup: HashMap<u64, DedupEntry>,
    processing: bool,
    shutting_down: bool,
    delivered_total: u64,
    retried_total: u64,
    dropped_total: u64,
}

/// Cheap-to-clone handle to one process-wide queue instance. Constructed at
/// startup and passed to producers and the WebSocket layer explicitly.
#[derive(Clone)]
pub struct NotificationQueue {
    state: Arc<Mutex<QueueState>>,
    registry: ConnectionRegistry,
    config: QueueConfig,
    sweeper: Arc<std::sync::Mutex<Option<JoinHandle<()>>>>,
}

impl NotificationQueue {
    /// Create a queue and start its periodic expiry/dedup sweeper.
    /// Must be called from within a tokio runtime.
    pub fn new(registry: ConnectionRegistry, config: QueueConfig) -> Self {
        let queue = NotificationQueue {
            state: Arc::new(Mutex::new(QueueState::default())),
            registry,
            config,
            sweeper: Arc::new(std::sync::Mutex::new(None)),
        };

        let sweeper = {
            let queue = queue.clone();
            let interval = queue.config.cleanup_interval();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    queue.sweep().await;
                }
            })
        };
        *queue.sweeper.lock().expect("sweeper lock poisoned") = Some(sweeper);

        queue
    }

    /// Queue a notification for delivery. Returns the envelope id
    /// synchronously; delivery itself is asynchronous and best-effort.
    ///
    /// A repeat of the same `(type, payload)` inside the dedup window is a
    /// no-op that returns the id of the first submission. When the queue is
    /// full the oldest low-priority envelope is evicted to make room; with
    /// no low-priority victim the new envelope is dropped instead.
    pub async fn enqueue(
        &self,
        kind: impl Into<String>,
        payload: serde_json::Value,
        options: EnqueueOptions,
    ) -> String {
        let kind = kind.into();
        let identity = identity_hash(&kind, &payload);
        let now = Utc::now();

        let mut state = self.state.lock().await;

        if let Some(entry) = state.dedup.get(&identity) {
            if entry.inserted_at.elapsed() < self.config.dedup_window() {
                tracing::debug!(id = %entry.id, kind = %kind, "duplicate suppressed inside dedup window");
                return entry.id.clone();
            }
        }

        let id = format!("{}-{:x}", now.timestamp_millis(), identity);

        if state.pending.len() >= self.config.max_queue_size {
            let victim = state
                .pending
                .iter()
                .position(|e| e.priority == NotificationPriority::Low);
            match victim {
                Some(pos) => {
                    let evicted = state.pending.remove(pos).expect("victim position is valid");
                    state.dropped_total += 1;
                    metrics::envelope_dropped("evicted");
                    tracing::warn!(
                        id = %evicted.id,
                        kind = %evicted.kind,
                        "queue full, evicted oldest low-priority envelope"
                    );
                }
                None => {
                    state.dropped_total += 1;
                    metrics::envelope_dropped("capacity");
                    tracing::warn!(
                        id = %id,
                        kind = %kind,
                        depth = state.pending.len(),
                        "queue full with no low-priority victim, rejecting envelope"
                    );
                    return id;
                }
            }
        }

        let envelope = Envelope {
            id: id.clone(),
            kind,
            payload,
            priority: options.priority,
            enqueued_at: now,
            retry_count: 0,
            max_retries: options
                .max_retries
                .unwrap_or(self.config.default_max_retries),
            expires_at: options.expires_at,
            target_clients: options.target_clients,
            metadata: options.metadata,
        };

        // Priority bands, FIFO inside each band: insert before the first
        // entry of strictly lower rank
        let rank = envelope.priority.rank();
        let pos = state
            .pending
            .iter()
            .position(|e| e.priority.rank() < rank)
            .unwrap_or(state.pending.len());
        state.pending.insert(pos, envelope);

        state.dedup.insert(
            identity,
            DedupEntry {
                id: id.clone(),
                inserted_at: Instant::now(),
            },
        );
        metrics::envelope_enqueued();

        if !state.processing {
            state.processing = true;
            let queue = self.clone();
            tokio::spawn(async move { queue.process_loop().await });
        }

        id
    }

    /// Single delivery worker. Never runs two envelopes concurrently; goes
    /// idle when the queue drains and is restarted by the next `enqueue`.
    async fn process_loop(self) {
        loop {
            let head = {
                let mut state = self.state.lock().await;
                if state.shutting_down {
                    state.processing = false;
                    break;
                }
                match state.pending.front() {
                    Some(envelope) => envelope.clone(),
                    None => {
                        state.processing = false;
                        break;
                    }
                }
            };

            if head.is_expired(Utc::now()) {
                let mut state = self.state.lock().await;
                if remove_pending(&mut state.pending, &head.id) {
                    state.dropped_total += 1;
                    metrics::envelope_dropped("expired");
                    tracing::info!(id = %head.id, kind = %head.kind, "envelope expired before delivery");
                }
                continue;
            }

            let report = delivery::deliver(&self.registry, &head).await;

            if report.succeeded() {
                let mut state = self.state.lock().await;
                if remove_pending(&mut state.pending, &head.id) {
                    state.delivered_total += 1;
                    metrics::envelope_delivered();
                    tracing::debug!(
                        id = %head.id,
                        kind = %head.kind,
                        delivered = report.delivered,
                        failed = report.failed,
                        "envelope delivered"
                    );
                }
            } else if let Some(delay) = self.handle_failure(&head.id).await {
                // Head-of-line backoff: the whole queue waits out this
                // envelope's delay before the next attempt
                tokio::time::sleep(delay).await;
            }
        }
    }

    /// Retry accounting for a failed attempt. Returns the backoff delay when
    /// the envelope was requeued, `None` when it was dropped terminally or
    /// had already been removed.
    async fn handle_failure(&self, id: &str) -> Option<Duration> {
        let mut state = self.state.lock().await;

        let pos = state.pending.iter().position(|e| e.id == id)?;
        let mut envelope = state.pending.remove(pos).expect("position is valid");

        envelope.retry_count += 1;
        if envelope.retry_count > envelope.max_retries {
            state.dropped_total += 1;
            metrics::envelope_dropped("retries_exhausted");
            tracing::warn!(
                id = %envelope.id,
                kind = %envelope.kind,
                attempts = envelope.retry_count,
                "dropping envelope after exhausting retries"
            );
            return None;
        }

        state.retried_total += 1;
        metrics::envelope_retried();

        let exponent = envelope.retry_count.saturating_sub(1).min(16);
        let delay = std::cmp::min(
            self.config.base_retry_delay().saturating_mul(1 << exponent),
            self.config.max_retry_delay(),
        );

        tracing::info!(
            id = %envelope.id,
            kind = %envelope.kind,
            attempt = envelope.retry_count,
            max_retries = envelope.max_retries,
            delay_ms = delay.as_millis() as u64,
            "delivery failed, requeueing at tail"
        );

        // Tail of the whole queue on purpose: a stuck envelope must not pin
        // the head slot against newer high-priority work
        state.pending.push_back(envelope);
        Some(delay)
    }

    /// Remove expired envelopes and stale dedup entries
    async fn sweep(&self) {
        let now = Utc::now();
        let window = self.config.dedup_window();
        let mut state = self.state.lock().await;

        let before = state.pending.len();
        state.pending.retain(|e| !e.is_expired(now));
        let expired = before - state.pending.len();
        if expired > 0 {
            state.dropped_total += expired as u64;
            for _ in 0..expired {
                metrics::envelope_dropped("expired");
            }
            tracing::info!(expired, "expiry sweep removed envelopes");
        }

        state
            .dedup
            .retain(|_, entry| entry.inserted_at.elapsed() < window);
    }

    /// Observability snapshot; no side effects
    pub async fn status(&self) -> QueueStatus {
        let connected_clients = self.registry.client_count().await;
        let state = self.state.lock().await;

        let mut by_priority = PriorityBreakdown::default();
        for envelope in &state.pending {
            match envelope.priority {
                NotificationPriority::Low => by_priority.low += 1,
                NotificationPriority::Normal => by_priority.normal += 1,
                NotificationPriority::High => by_priority.high += 1,
                NotificationPriority::Critical => by_priority.critical += 1,
            }
        }

        QueueStatus {
            depth: state.pending.len(),
            processing: state.processing,
            connected_clients,
            oldest_enqueued_at: state.pending.iter().map(|e| e.enqueued_at).min(),
            newest_enqueued_at: state.pending.iter().map(|e| e.enqueued_at).max(),
            by_priority,
            delivered_total: state.delivered_total,
            retried_total: state.retried_total,
            dropped_total: state.dropped_total,
        }
    }

    /// Cancel a still-pending envelope. Idempotent; returns whether one was
    /// removed. Has no effect on an envelope already delivered or currently
    /// mid-delivery.
    pub async fn remove(&self, id: &str) -> bool {
        let mut state = self.state.lock().await;
        remove_pending(&mut state.pending, id)
    }

    /// Fetch a pending envelope by id
    pub async fn get(&self, id: &str) -> Option<Envelope> {
        let state = self.state.lock().await;
        state.pending.iter().find(|e| e.id == id).cloned()
    }

    /// Empty the queue and the dedup set
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.pending.clear();
        state.dedup.clear();
    }

    /// Graceful shutdown: stop the sweeper, clear all state, and let the
    /// worker exit at its next iteration
    pub async fn destroy(&self) {
        if let Some(handle) = self.sweeper.lock().expect("sweeper lock poisoned").take() {
            handle.abort();
        }

        let mut state = self.state.lock().await;
        state.shutting_down = true;
        state.pending.clear();
        state.dedup.clear();

        tracing::info!("notification queue destroyed");
    }
}

fn remove_pending(pending: &mut VecDeque<Envelope>, id: &str) -> bool {
    match pending.iter().position(|e| e.id == id) {
        Some(pos) => {
            pending.remove(pos);
            true
        }
        None => false,
    }
}
