//! Outbound pipeline (C9): send queue, pending-ack table, and
//! ack-timeout re-queue.
//!
//! Producers (the task engine, the dispatcher's `pong` replies) never
//! block on disconnection: [`OutboundHandle::enqueue`] always succeeds
//! immediately by pushing onto an unbounded queue. The drainer task (run
//! by [`crate::session`]) is the only consumer, and only sends while the
//! session is `Connected`.

use crate::types::{PendingMessage, ACK_TIMEOUT_SECS};
use crate::wire::{OutboundEnvelope, OutboundPayload};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

struct Shared {
    seq: AtomicU64,
    queue_tx: mpsc::UnboundedSender<OutboundEnvelope>,
    pending_ack: DashMap<String, PendingMessage>,
    cancel: CancellationToken,
}

/// Cheaply-cloneable producer handle into the outbound pipeline. Held by
/// the task engine and the inbound dispatcher (for `pong` replies).
#[derive(Clone)]
pub struct OutboundHandle {
    shared: Arc<Shared>,
}

impl OutboundHandle {
    /// Wraps `payload` in an envelope with the next sequence number and
    /// pushes it onto the outbound queue. Never blocks.
    pub fn enqueue(&self, payload: OutboundPayload) {
        let seq = self.shared.seq.fetch_add(1, Ordering::Relaxed);
        let envelope = OutboundEnvelope::new(seq, payload);
        self.requeue(envelope);
    }

    /// Pushes an already-built envelope back onto the queue, preserving
    /// its original `id` (used for both first sends and ack-timeout
    /// re-sends).
    pub fn requeue(&self, envelope: OutboundEnvelope) {
        if self.shared.queue_tx.send(envelope).is_err() {
            // The drainer is gone, which only happens after the pipeline
            // itself has been dropped; nothing left to do.
            warn!("outbound queue has no consumer, dropping envelope");
        }
    }

    /// Clears the pending-ack entry for `id` and returns `true` if there
    /// was one. Called by the dispatcher when an `ACK` frame arrives.
    pub fn acknowledge(&self, id: &str) -> bool {
        self.shared.pending_ack.remove(id).is_some()
    }
}

/// Owns the outbound queue and pending-ack table; the drainer task reads
/// from this, the session supervisor owns it.
pub struct OutboundPipeline {
    shared: Arc<Shared>,
    queue_rx: mpsc::UnboundedReceiver<OutboundEnvelope>,
}

impl OutboundPipeline {
    /// Builds a fresh pipeline. `cancel` is the session-wide shutdown
    /// token; the drainer and ack-timeout watchers stop at their next
    /// checkpoint once it is cancelled.
    pub fn new(cancel: CancellationToken) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(Shared {
                seq: AtomicU64::new(0),
                queue_tx,
                pending_ack: DashMap::new(),
                cancel,
            }),
            queue_rx,
        }
    }

    /// A producer handle into this pipeline.
    pub fn handle(&self) -> OutboundHandle {
        OutboundHandle {
            shared: self.shared.clone(),
        }
    }

    /// Pops the next queued envelope, waiting indefinitely if the queue
    /// is empty. Returns `None` as soon as the pipeline is cancelled, even
    /// if messages are still sitting in the queue: once `Shutdown` fires,
    /// no further frames are sent, the backlog is not flushed first.
    pub async fn next(&mut self) -> Option<OutboundEnvelope> {
        if self.shared.cancel.is_cancelled() {
            return None;
        }

        tokio::select! {
            biased;
            _ = self.shared.cancel.cancelled() => None,
            envelope = self.queue_rx.recv() => envelope,
        }
    }

    /// Records `envelope` as sent and arms its ack-timeout watcher. Call
    /// this immediately after a successful write to the session socket.
    pub fn record_sent(&self, envelope: OutboundEnvelope) {
        let id = envelope.id.clone();
        self.shared.pending_ack.insert(
            id.clone(),
            PendingMessage {
                envelope: envelope.clone(),
                sent_at: Instant::now(),
            },
        );

        let shared = self.shared.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shared.cancel.cancelled() => {}
                _ = tokio::time::sleep(std::time::Duration::from_secs(ACK_TIMEOUT_SECS)) => {
                    if let Some((_, pending)) = shared.pending_ack.remove(&id) {
                        debug!(message_id = %id, "ack timed out, re-queueing");
                        let _ = shared.queue_tx.send(pending.envelope);
                    }
                }
            }
        });
    }
}
