use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use api::BehaviorApi;
use exam_core::model::{AttemptId, MonitoringEvent, Snapshot};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::MAX_REPORT_QUEUE_CAPACITY;

/// One-way work item handed to the reporter worker.
enum ReportJob {
    Event {
        session_id: AttemptId,
        event: MonitoringEvent,
    },
    Snapshot {
        session_id: AttemptId,
        snapshot: Snapshot,
    },
    Flush(oneshot::Sender<()>),
}

#[derive(Debug, Default)]
struct ReporterStats {
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Delivery counters of a reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReportCounts {
    pub delivered: u64,
    /// Sent but rejected or lost by the backend.
    pub failed: u64,
    /// Never sent because the queue was full or closed.
    pub dropped: u64,
}

/// Best-effort, at-most-once forwarder of monitoring signals to the backend.
///
/// Callers enqueue and return immediately. A single worker task sends jobs in
/// order; failures are logged and counted, never retried and never surfaced.
#[derive(Clone)]
pub struct BehaviorReporter {
    jobs: mpsc::Sender<ReportJob>,
    stats: Arc<ReporterStats>,
}

impl BehaviorReporter {
    /// Spawn the worker on the current tokio runtime.
    ///
    /// The worker exits once every clone of the reporter is dropped and the
    /// queue is drained.
    #[must_use]
    pub fn spawn(api: Arc<dyn BehaviorApi>, capacity: usize) -> Self {
        let (jobs, rx) = mpsc::channel(capacity.clamp(1, MAX_REPORT_QUEUE_CAPACITY));
        let stats = Arc::new(ReporterStats::default());
        let _worker: JoinHandle<()> = tokio::spawn(run_worker(api, rx, Arc::clone(&stats)));
        Self { jobs, stats }
    }

    pub fn report(&self, session_id: AttemptId, event: MonitoringEvent) {
        self.enqueue(ReportJob::Event { session_id, event });
    }

    pub fn report_snapshot(&self, session_id: AttemptId, snapshot: Snapshot) {
        self.enqueue(ReportJob::Snapshot {
            session_id,
            snapshot,
        });
    }

    fn enqueue(&self, job: ReportJob) {
        if let Err(err) = self.jobs.try_send(job) {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            let reason = match err {
                mpsc::error::TrySendError::Full(_) => "queue full",
                mpsc::error::TrySendError::Closed(_) => "reporter closed",
            };
            tracing::warn!(reason, "dropping monitoring report");
        }
    }

    /// Wait until every job enqueued before this call has been attempted.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.jobs.send(ReportJob::Flush(done)).await.is_ok() {
            let _ = wait.await;
        }
    }

    #[must_use]
    pub fn counts(&self) -> ReportCounts {
        ReportCounts {
            delivered: self.stats.delivered.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
        }
    }
}

async fn run_worker(api: Arc<dyn BehaviorApi>, mut rx: mpsc::Receiver<ReportJob>, stats: Arc<ReporterStats>) {
    while let Some(job) = rx.recv().await {
        let outcome = match job {
            ReportJob::Event { session_id, event } => api
                .record_behavior(session_id, &event)
                .await
                .map_err(|err| (session_id, event.event_type().as_str(), err)),
            ReportJob::Snapshot {
                session_id,
                snapshot,
            } => api
                .upload_snapshot(session_id, &snapshot)
                .await
                .map_err(|err| (session_id, "snapshot", err)),
            ReportJob::Flush(done) => {
                let _ = done.send(());
                continue;
            }
        };

        match outcome {
            Ok(()) => {
                stats.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Err((session_id, kind, err)) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(attempt_id = %session_id, kind, error = %err, "monitoring report not delivered");
            }
        }
    }
    tracing::debug!("behavior reporter stopped");
}
