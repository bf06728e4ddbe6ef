//! The caller-side channel endpoint.
//!
//! Monotonic correlation ids, a pending table with deadlines, immediate
//! backpressure past `max_concurrent_operations`, and cooperative
//! cancellation raised toward the execution domain on timeout. The handle
//! is the only place internal errors become caller-visible `WireError`s.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use quarry_core::cancel::CancelFlag;
use quarry_core::config::ControlConfig;

use crate::message::{Method, Response, WireError};
use crate::metrics::{ControlMetrics, ControlMetricsSnapshot};

const STATE_OPEN: u8 = 0;
const STATE_CLOSED: u8 = 1;
const STATE_TERMINATED: u8 = 2;

/// A request crossing to the execution domain.
pub(crate) struct Envelope {
    pub id: u64,
    pub method: Method,
    pub cancel: CancelFlag,
}

pub(crate) struct Pending {
    responder: oneshot::Sender<Result<serde_json::Value, WireError>>,
    cancel: CancelFlag,
}

pub(crate) type PendingTable = DashMap<u64, Pending>;

/// Match a response against the pending table. Responses whose id is no
/// longer pending (timed out, cancelled, or never issued) are logged and
/// dropped.
pub(crate) fn deliver(pending: &PendingTable, response: Response) {
    match pending.remove(&response.id) {
        Some((_, entry)) => {
            let payload = match response.error {
                Some(error) => Err(error),
                None => Ok(response.result.unwrap_or(serde_json::Value::Null)),
            };
            let _ = entry.responder.send(payload);
        }
        None => {
            debug!(id = response.id, "response for unknown correlation id dropped");
        }
    }
}

/// Caller-side handle to a running engine. Cloneable; all clones share
/// one channel, one pending table, and one in-flight budget.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<Envelope>,
    pending: Arc<PendingTable>,
    next_id: Arc<AtomicU64>,
    state: Arc<AtomicU8>,
    cfg: ControlConfig,
    metrics: Arc<ControlMetrics>,
}

impl EngineHandle {
    pub(crate) fn new(
        tx: mpsc::UnboundedSender<Envelope>,
        pending: Arc<PendingTable>,
        cfg: ControlConfig,
        metrics: Arc<ControlMetrics>,
    ) -> Self {
        Self {
            tx,
            pending,
            next_id: Arc::new(AtomicU64::new(0)),
            state: Arc::new(AtomicU8::new(STATE_OPEN)),
            cfg,
            metrics,
        }
    }

    /// Issue a request and await its response or deadline.
    pub async fn call(&self, method: Method) -> Result<serde_json::Value, WireError> {
        match self.state.load(Ordering::SeqCst) {
            STATE_CLOSED => {
                return Err(WireError {
                    code: "closed".into(),
                    message: "channel closed".into(),
                })
            }
            STATE_TERMINATED => {
                return Err(WireError {
                    code: "terminated".into(),
                    message: "channel terminated".into(),
                })
            }
            _ => {}
        }

        // Backpressure: past the cap, fail synchronously instead of
        // queueing unboundedly.
        let in_flight = self.pending.len();
        if in_flight >= self.cfg.max_concurrent_operations {
            self.metrics.record_rejected();
            return Err(WireError {
                code: "rate_limit".into(),
                message: format!(
                    "too many in-flight operations: {in_flight} >= {}",
                    self.cfg.max_concurrent_operations
                ),
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancelFlag::new();
        let (responder, receiver) = oneshot::channel();
        self.pending.insert(
            id,
            Pending {
                responder,
                cancel: cancel.clone(),
            },
        );

        let method_name = method.name();
        if self.tx.send(Envelope { id, method, cancel }).is_err() {
            // Transport refused the send: no state is retained.
            self.pending.remove(&id);
            return Err(WireError {
                code: "send_error".into(),
                message: format!("transport send failed for {method_name}"),
            });
        }

        let t0 = Instant::now();
        let deadline = Duration::from_millis(self.cfg.operation_timeout_ms.max(1));
        match tokio::time::timeout(deadline, receiver).await {
            Ok(Ok(Ok(value))) => {
                self.metrics.record_success(t0.elapsed().as_micros() as u64);
                Ok(value)
            }
            Ok(Ok(Err(error))) => {
                self.metrics.record_error(t0.elapsed().as_micros() as u64);
                Err(error)
            }
            Ok(Err(_dropped)) => {
                // The execution domain dropped our responder: fatal
                // channel failure from this call's perspective.
                self.pending.remove(&id);
                self.metrics.record_error(t0.elapsed().as_micros() as u64);
                Err(WireError {
                    code: "channel_error".into(),
                    message: format!("response channel dropped for {method_name}"),
                })
            }
            Err(_elapsed) => {
                // Deadline: remove the pending entry (a late response is
                // now an unknown id) and raise the cooperative cancel.
                if let Some((_, entry)) = self.pending.remove(&id) {
                    entry.cancel.cancel();
                }
                self.metrics.record_timeout(t0.elapsed().as_micros() as u64);
                Err(WireError {
                    code: "timeout".into(),
                    message: format!(
                        "{method_name} exceeded {}ms deadline",
                        self.cfg.operation_timeout_ms
                    ),
                })
            }
        }
    }

    /// Graceful close: no new calls; every pending request rejects with
    /// `closed`.
    pub fn close(&self) {
        self.state.store(STATE_CLOSED, Ordering::SeqCst);
        self.reject_all("closed", "channel closed", false);
    }

    /// Hard stop: pending requests reject with `terminated` and their
    /// cancellation flags are raised toward in-flight work.
    pub fn terminate(&self) {
        self.state.store(STATE_TERMINATED, Ordering::SeqCst);
        self.reject_all("terminated", "channel terminated", true);
    }

    /// A fatal transport error: reject everything pending with
    /// `channel_error` and close the channel. Transports call this when
    /// the underlying medium dies.
    pub fn fail_all(&self, reason: &str) {
        self.state.store(STATE_CLOSED, Ordering::SeqCst);
        self.reject_all("channel_error", reason, true);
    }

    fn reject_all(&self, code: &str, message: &str, cancel_in_flight: bool) {
        let ids: Vec<u64> = self.pending.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Some((_, entry)) = self.pending.remove(&id) {
                if cancel_in_flight {
                    entry.cancel.cancel();
                }
                let _ = entry.responder.send(Err(WireError {
                    code: code.into(),
                    message: message.into(),
                }));
            }
        }
    }

    pub fn pending_depth(&self) -> usize {
        self.pending.len()
    }

    pub fn metrics(&self) -> ControlMetricsSnapshot {
        self.metrics.snapshot(self.pending.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle_with_timeout(
        timeout_ms: u64,
        cap: usize,
    ) -> (EngineHandle, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cfg = ControlConfig {
            operation_timeout_ms: timeout_ms,
            max_concurrent_operations: cap,
            ..ControlConfig::default()
        };
        let handle = EngineHandle::new(
            tx,
            Arc::new(DashMap::new()),
            cfg,
            Arc::new(ControlMetrics::default()),
        );
        (handle, rx)
    }

    #[tokio::test]
    async fn unanswered_requests_time_out_and_cancel() {
        let (handle, mut rx) = handle_with_timeout(50, 16);
        let err = handle.call(Method::ListCollections).await.unwrap_err();
        assert_eq!(err.code, "timeout");

        // The envelope crossed the channel and its cancel flag is raised.
        let envelope = rx.recv().await.unwrap();
        assert!(envelope.cancel.is_cancelled());
        // Pending table is clean: a late response now targets an unknown id.
        assert_eq!(handle.pending_depth(), 0);
        assert_eq!(handle.metrics().timeouts, 1);
    }

    #[tokio::test]
    async fn late_responses_for_unknown_ids_are_dropped() {
        let (handle, mut rx) = handle_with_timeout(50, 16);
        let _ = handle.call(Method::ListCollections).await;
        let envelope = rx.recv().await.unwrap();

        // Delivering after expiry must be a silent no-op.
        deliver(
            &handle.pending,
            Response::success(envelope.id, serde_json::Value::Null),
        );
        assert_eq!(handle.pending_depth(), 0);
    }

    #[tokio::test]
    async fn responses_resolve_their_caller() {
        let (handle, mut rx) = handle_with_timeout(5_000, 16);
        let pending = handle.pending.clone();

        let responder = tokio::spawn(async move {
            let envelope = rx.recv().await.unwrap();
            deliver(
                &pending,
                Response::success(envelope.id, serde_json::json!({"ok": true})),
            );
        });

        let value = handle.call(Method::ListCollections).await.unwrap();
        assert_eq!(value["ok"], true);
        responder.await.unwrap();
        assert_eq!(handle.metrics().total_calls, 1);
        assert_eq!(handle.metrics().errors, 0);
    }

    #[tokio::test]
    async fn correlation_ids_are_monotonic() {
        let (handle, mut rx) = handle_with_timeout(10, 16);
        let _ = handle.call(Method::ListCollections).await;
        let _ = handle.call(Method::ListCollections).await;
        let first = rx.recv().await.unwrap().id;
        let second = rx.recv().await.unwrap().id;
        assert!(second > first);
    }

    #[tokio::test]
    async fn backpressure_rejects_synchronously() {
        let (handle, _rx) = handle_with_timeout(5_000, 0);
        let err = handle.call(Method::ListCollections).await.unwrap_err();
        assert_eq!(err.code, "rate_limit");
        assert_eq!(handle.metrics().rejected, 1);
    }

    #[tokio::test]
    async fn send_failure_retains_no_state() {
        let (handle, rx) = handle_with_timeout(5_000, 16);
        drop(rx);
        let err = handle.call(Method::ListCollections).await.unwrap_err();
        assert_eq!(err.code, "send_error");
        assert_eq!(handle.pending_depth(), 0);
    }

    #[tokio::test]
    async fn close_rejects_new_and_pending() {
        let (handle, _rx) = handle_with_timeout(60_000, 16);
        let in_flight = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.call(Method::ListCollections).await })
        };
        // Let the in-flight call register.
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.close();

        let pending_result = in_flight.await.unwrap().unwrap_err();
        assert_eq!(pending_result.code, "closed");
        let err = handle.call(Method::ListCollections).await.unwrap_err();
        assert_eq!(err.code, "closed");
    }

    #[tokio::test]
    async fn terminate_cancels_in_flight() {
        let (handle, mut rx) = handle_with_timeout(60_000, 16);
        let in_flight = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.call(Method::ListCollections).await })
        };
        let envelope = rx.recv().await.unwrap();
        handle.terminate();

        let result = in_flight.await.unwrap().unwrap_err();
        assert_eq!(result.code, "terminated");
        assert!(envelope.cancel.is_cancelled());
    }
}
