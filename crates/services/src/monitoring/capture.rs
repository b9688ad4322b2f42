use std::sync::Arc;
use std::time::Duration;

use exam_core::Clock;
use exam_core::model::{AttemptId, Snapshot};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

use super::host::{CameraStream, HostError};
use crate::config::MIN_CAPTURE_PERIOD;
use super::reporter::BehaviorReporter;

/// Called once when the camera stream dies for good.
pub type FailureHook = Arc<dyn Fn() + Send + Sync>;

/// Periodic still-frame capture from a live camera stream.
#[derive(Debug, Clone)]
pub struct CaptureScheduler {
    period: Duration,
    clock: Clock,
}

impl CaptureScheduler {
    /// Periods shorter than `MIN_CAPTURE_PERIOD` are raised to it.
    #[must_use]
    pub fn new(period: Duration, clock: Clock) -> Self {
        if period < MIN_CAPTURE_PERIOD {
            tracing::warn!(?period, min = ?MIN_CAPTURE_PERIOD, "capture period too short; using minimum");
        }
        Self {
            period: period.max(MIN_CAPTURE_PERIOD),
            clock,
        }
    }

    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Spawn the capture task on the current runtime.
    ///
    /// The first frame is taken as soon as the stream reports ready, then one
    /// every `period`. Each frame goes to `reporter` as a snapshot.
    #[must_use]
    pub fn start(
        &self,
        session_id: AttemptId,
        stream: Arc<dyn CameraStream>,
        reporter: BehaviorReporter,
        on_failure: FailureHook,
    ) -> CaptureHandle {
        let (cancel, cancelled) = watch::channel(false);
        let task = tokio::spawn(run_capture(
            session_id,
            stream,
            reporter,
            on_failure,
            self.period,
            self.clock,
            cancelled,
        ));
        CaptureHandle { cancel, task }
    }
}

/// Owner of a running capture task. Dropping it stops the timer.
#[derive(Debug)]
pub struct CaptureHandle {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl CaptureHandle {
    /// Cancel the pending timer. A capture already in flight still completes
    /// and is reported.
    pub fn stop(&self) {
        self.cancel.send_replace(true);
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_capture(
    session_id: AttemptId,
    stream: Arc<dyn CameraStream>,
    reporter: BehaviorReporter,
    on_failure: FailureHook,
    period: Duration,
    clock: Clock,
    mut cancelled: watch::Receiver<bool>,
) {
    tokio::select! {
        biased;
        _ = cancelled.wait_for(|stop| *stop) => return,
        ready = stream.ready() => {
            if let Err(err) = ready {
                tracing::warn!(attempt_id = %session_id, error = %err, "camera stream never became ready");
                on_failure();
                return;
            }
        }
    }

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancelled.wait_for(|stop| *stop) => break,
            _ = ticker.tick() => {}
        }

        // Outside the select so a stop never interrupts a capture.
        match stream.capture_frame().await {
            Ok(frame) => {
                tracing::debug!(attempt_id = %session_id, bytes = frame.bytes.len(), "snapshot captured");
                reporter.report_snapshot(
                    session_id,
                    Snapshot {
                        captured_at: clock.now(),
                        mime_type: frame.mime_type,
                        bytes: frame.bytes,
                    },
                );
            }
            Err(HostError::StreamEnded) => {
                tracing::warn!(attempt_id = %session_id, "camera stream ended");
                on_failure();
                break;
            }
            Err(err) => {
                tracing::warn!(attempt_id = %session_id, error = %err, "snapshot skipped");
            }
        }
    }
    tracing::debug!(attempt_id = %session_id, "capture task finished");
}
