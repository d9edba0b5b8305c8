//! Per-channel heartbeat: a liveness timer bound 1:1 to a channel's
//! lifetime.

use std::{sync::Arc, time::Duration};

use tokio::sync::mpsc;
use tracing::debug;

use crate::{server::ServerError, transport::CallChannel};

/// Handle to a channel's liveness timer.
///
/// Started when the channel opens; cancelled when it closes. Dropping the
/// guard also aborts the task, so no timer can outlive its channel
/// whatever the teardown path.
pub struct HeartbeatGuard {
    task: Option<tokio::task::JoinHandle<()>>,
}

impl HeartbeatGuard {
    /// Spawn a timer emitting one liveness signal per `interval` over the
    /// channel. A failed signal is forwarded to the server's error stream
    /// and stops the timer; the channel itself stays under the control of
    /// its call's completion.
    pub fn spawn(
        interval: Duration,
        channel: Arc<dyn CallChannel>,
        failures: mpsc::UnboundedSender<ServerError>,
    ) -> Self {
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick of a tokio interval fires immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = channel.heartbeat() {
                    debug!(channel = channel.id(), error = %e, "heartbeat lost");
                    let _ = failures.send(ServerError::Heartbeat {
                        channel: channel.id(),
                        source: e,
                    });
                    break;
                }
            }
        });
        Self { task: Some(task) }
    }

    /// A guard with no timer, for channels that do not heartbeat.
    pub fn noop() -> Self {
        Self { task: None }
    }

    /// Stop the timer. Idempotent: aborting an already-finished or
    /// already-aborted task is a no-op.
    pub fn cancel(&self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

impl Drop for HeartbeatGuard {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    use manifold_protocol::{ResultFrame, TransportError};

    use super::*;

    struct BeatCounter {
        beats: AtomicU64,
        fail: AtomicBool,
    }

    impl BeatCounter {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                beats: AtomicU64::new(0),
                fail: AtomicBool::new(false),
            })
        }
    }

    impl CallChannel for BeatCounter {
        fn id(&self) -> u64 {
            1
        }

        fn send(&self, _frame: ResultFrame) -> Result<(), TransportError> {
            Ok(())
        }

        fn heartbeat(&self) -> Result<(), TransportError> {
            if self.fail.load(Ordering::Acquire) {
                return Err(TransportError::Closed);
            }
            self.beats.fetch_add(1, Ordering::AcqRel);
            Ok(())
        }

        fn close(&self) {}
    }

    #[tokio::test]
    async fn beats_until_cancelled_then_stops() {
        let channel = BeatCounter::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let guard = HeartbeatGuard::spawn(
            Duration::from_millis(10),
            Arc::clone(&channel) as Arc<dyn CallChannel>,
            tx,
        );

        tokio::time::sleep(Duration::from_millis(55)).await;
        let seen = channel.beats.load(Ordering::Acquire);
        assert!(seen >= 2, "expected ticks before cancel, saw {seen}");

        guard.cancel();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(
            channel.beats.load(Ordering::Acquire),
            seen,
            "no ticks may follow cancellation"
        );
    }

    #[tokio::test]
    async fn failure_is_forwarded_once_and_timer_stops() {
        let channel = BeatCounter::new();
        channel.fail.store(true, Ordering::Release);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _guard = HeartbeatGuard::spawn(
            Duration::from_millis(5),
            Arc::clone(&channel) as Arc<dyn CallChannel>,
            tx,
        );

        let err = rx.recv().await.expect("failure should be forwarded");
        assert!(matches!(err, ServerError::Heartbeat { channel: 1, .. }));
        // Timer stopped after the failure: the sender side is gone.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let channel = BeatCounter::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let guard = HeartbeatGuard::spawn(
            Duration::from_millis(10),
            channel as Arc<dyn CallChannel>,
            tx,
        );
        guard.cancel();
        guard.cancel();
    }
}
