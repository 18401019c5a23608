// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Job scheduler: recurring loops and a retrying ad-hoc queue.
//!
//! Recurring jobs run on fixed cadences; jobs marked single-leader take a
//! lease in the store before each run so only one instance across the
//! deployment executes. Ad-hoc jobs are enqueued by the payment engine
//! and operators, and re-enqueued with per-job backoff schedules on
//! failure.
//!
//! Every loop follows the cancellation pattern of a `tokio::select!` over
//! the interval tick and a shared `CancellationToken`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::tasks::TransactionMonitor;
use crate::storage::Database;

/// Retry schedule for an ad-hoc job.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delays: &'static [Duration],
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based). Attempts beyond the
    /// schedule reuse the last delay.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.delays
            .get(attempt as usize)
            .or_else(|| self.delays.last())
            .copied()
            .unwrap_or(Duration::from_secs(60))
    }
}

const WAIT_CONFIRMATION_RETRY: RetryPolicy = RetryPolicy {
    max_retries: 5,
    delays: &[
        Duration::from_secs(10),
        Duration::from_secs(30),
        Duration::from_secs(60),
        Duration::from_secs(120),
        Duration::from_secs(300),
    ],
};

const REFRESH_BALANCE_RETRY: RetryPolicy = RetryPolicy {
    max_retries: 3,
    delays: &[
        Duration::from_secs(10),
        Duration::from_secs(30),
        Duration::from_secs(60),
    ],
};

const ROTATE_KEYS_RETRY: RetryPolicy = RetryPolicy {
    max_retries: 3,
    delays: &[
        Duration::from_secs(60),
        Duration::from_secs(300),
        Duration::from_secs(900),
    ],
};

/// Lease TTL for `rotate_keys` (also its run timeout).
const ROTATE_KEYS_LEASE_SECS: i64 = 3_600;

/// One-shot jobs enqueued by the engine or operators.
#[derive(Debug, Clone)]
pub enum AdhocJob {
    /// Watch a submitted transaction until the chain confirms it.
    WaitConfirmation { tx_id: Uuid },
    /// Force-refresh one wallet's balances.
    RefreshWalletBalance { pubkey: String },
    /// Rotate every wallet still wrapped under `old_version`. Single
    /// instance at a time.
    RotateKeys { old_version: String },
}

impl AdhocJob {
    pub fn name(&self) -> &'static str {
        match self {
            AdhocJob::WaitConfirmation { .. } => "wait_confirmation",
            AdhocJob::RefreshWalletBalance { .. } => "refresh_wallet_balance",
            AdhocJob::RotateKeys { .. } => "rotate_keys",
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            AdhocJob::WaitConfirmation { .. } => WAIT_CONFIRMATION_RETRY,
            AdhocJob::RefreshWalletBalance { .. } => REFRESH_BALANCE_RETRY,
            AdhocJob::RotateKeys { .. } => ROTATE_KEYS_RETRY,
        }
    }
}

#[derive(Debug)]
struct QueuedJob {
    job: AdhocJob,
    attempt: u32,
}

/// Producer handle for the ad-hoc queue.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::UnboundedSender<QueuedJob>,
}

impl JobQueue {
    pub fn enqueue(&self, job: AdhocJob) {
        let name = job.name();
        if self.tx.send(QueuedJob { job, attempt: 0 }).is_err() {
            tracing::warn!(job = name, "job queue closed, dropping job");
        }
    }

    fn enqueue_retry(&self, job: AdhocJob, attempt: u32) {
        let name = job.name();
        if self.tx.send(QueuedJob { job, attempt }).is_err() {
            tracing::warn!(job = name, "job queue closed, dropping retry");
        }
    }
}

/// Recurring and ad-hoc job runner.
pub struct Scheduler;

impl Scheduler {
    /// Spawn all recurring loops and the ad-hoc worker. Returns the queue
    /// handle for enqueuing ad-hoc jobs.
    pub fn start(
        db: Arc<Database>,
        monitor: Arc<TransactionMonitor>,
        shutdown: CancellationToken,
    ) -> JobQueue {
        let holder = format!("stablepay-{}", Uuid::new_v4());
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = JobQueue { tx };

        {
            let m = monitor.clone();
            spawn_recurring(
                "process_pending",
                Duration::from_secs(30),
                Duration::from_secs(60),
                true,
                db.clone(),
                holder.clone(),
                shutdown.clone(),
                move || {
                    let m = m.clone();
                    async move { m.process_pending().await.map(|_| ()) }
                },
            );
        }
        {
            let m = monitor.clone();
            spawn_recurring(
                "mark_stale",
                Duration::from_secs(300),
                Duration::from_secs(300),
                true,
                db.clone(),
                holder.clone(),
                shutdown.clone(),
                move || {
                    let m = m.clone();
                    async move { m.mark_stale().await.map(|_| ()) }
                },
            );
        }
        {
            let m = monitor.clone();
            spawn_recurring(
                "refresh_active_balances",
                Duration::from_secs(300),
                Duration::from_secs(300),
                false,
                db.clone(),
                holder.clone(),
                shutdown.clone(),
                move || {
                    let m = m.clone();
                    async move { m.refresh_active_balances().await.map(|_| ()) }
                },
            );
        }
        {
            let m = monitor.clone();
            spawn_recurring(
                "check_fee_sol",
                Duration::from_secs(86_400),
                Duration::from_secs(3_600),
                false,
                db.clone(),
                holder.clone(),
                shutdown.clone(),
                move || {
                    let m = m.clone();
                    async move { m.check_fee_sol().await.map(|_| ()) }
                },
            );
        }
        {
            let m = monitor.clone();
            spawn_recurring(
                "validate_encryptions",
                Duration::from_secs(604_800),
                Duration::from_secs(7_200),
                true,
                db.clone(),
                holder.clone(),
                shutdown.clone(),
                move || {
                    let m = m.clone();
                    async move { m.validate_encryptions().await.map(|_| ()) }
                },
            );
        }
        {
            let m = monitor.clone();
            spawn_recurring(
                "log_key_version_stats",
                Duration::from_secs(86_400),
                Duration::from_secs(3_600),
                false,
                db.clone(),
                holder.clone(),
                shutdown.clone(),
                move || {
                    let m = m.clone();
                    async move { m.log_key_version_stats().await.map(|_| ()) }
                },
            );
        }

        tokio::spawn(run_adhoc_worker(
            rx,
            queue.clone(),
            db,
            monitor,
            holder,
            shutdown,
        ));

        queue
    }
}

/// Spawn one recurring loop. `timeout` bounds each run; single-leader
/// jobs take (and release) a store lease around every run.
#[allow(clippy::too_many_arguments)]
fn spawn_recurring<F, Fut>(
    name: &'static str,
    period: Duration,
    timeout: Duration,
    single_leader: bool,
    db: Arc<Database>,
    holder: String,
    shutdown: CancellationToken,
    task: F,
) where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), super::tasks::MonitorError>> + Send,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // Consume the immediate first tick so jobs start one period in.
        interval.tick().await;

        tracing::info!(job = name, period_secs = period.as_secs(), "recurring job started");

        loop {
            tokio::select! {
                _ = interval.tick() => {},
                _ = shutdown.cancelled() => {
                    tracing::info!(job = name, "recurring job shutting down");
                    return;
                }
            }

            if single_leader {
                match db.acquire_lease(name, &holder, timeout.as_secs() as i64) {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::debug!(job = name, "lease held elsewhere, skipping run");
                        continue;
                    }
                    Err(e) => {
                        tracing::error!(job = name, error = %e, "lease acquisition failed");
                        continue;
                    }
                }
            }

            match tokio::time::timeout(timeout, task()).await {
                Ok(Ok(())) => tracing::debug!(job = name, "run complete"),
                Ok(Err(e)) => tracing::error!(job = name, error = %e, "run failed"),
                Err(_) => tracing::error!(job = name, timeout_secs = timeout.as_secs(), "run timed out"),
            }

            if single_leader {
                if let Err(e) = db.release_lease(name, &holder) {
                    tracing::warn!(job = name, error = %e, "lease release failed");
                }
            }
        }
    });
}

/// Drain the ad-hoc queue, retrying failed jobs on their schedules.
async fn run_adhoc_worker(
    mut rx: mpsc::UnboundedReceiver<QueuedJob>,
    queue: JobQueue,
    db: Arc<Database>,
    monitor: Arc<TransactionMonitor>,
    holder: String,
    shutdown: CancellationToken,
) {
    tracing::info!("ad-hoc job worker started");

    loop {
        let queued = tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("ad-hoc job worker shutting down");
                return;
            }
            received = rx.recv() => match received {
                Some(job) => job,
                None => return,
            }
        };

        let result = match &queued.job {
            AdhocJob::WaitConfirmation { tx_id } => monitor.wait_confirmation(*tx_id).await,
            AdhocJob::RefreshWalletBalance { pubkey } => {
                monitor.refresh_wallet_balance(pubkey).await
            }
            AdhocJob::RotateKeys { old_version } => {
                // Single instance: the lease doubles as the 1h run timeout.
                match db.acquire_lease("rotate_keys", &holder, ROTATE_KEYS_LEASE_SECS) {
                    Ok(true) => {
                        let result = monitor.rotate_keys(old_version).await.map(|_| ());
                        let _ = db.release_lease("rotate_keys", &holder);
                        result
                    }
                    Ok(false) => Err(super::tasks::MonitorError::Busy(
                        "rotate_keys already running".to_string(),
                    )),
                    Err(e) => Err(e.into()),
                }
            }
        };

        if let Err(e) = result {
            let policy = queued.job.retry_policy();
            if queued.attempt < policy.max_retries {
                let delay = policy.delay_for(queued.attempt);
                let next_attempt = queued.attempt + 1;
                tracing::warn!(
                    job = queued.job.name(),
                    attempt = next_attempt,
                    delay_secs = delay.as_secs(),
                    error = %e,
                    "ad-hoc job failed, scheduling retry"
                );

                let retry_queue = queue.clone();
                let job = queued.job.clone();
                let retry_shutdown = shutdown.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {
                            retry_queue.enqueue_retry(job, next_attempt);
                        }
                        _ = retry_shutdown.cancelled() => {}
                    }
                });
            } else {
                tracing::error!(
                    job = queued.job.name(),
                    attempts = queued.attempt + 1,
                    error = %e,
                    "ad-hoc job exhausted retries"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_schedules_match_policy() {
        let policy = WAIT_CONFIRMATION_RETRY;
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.delay_for(0), Duration::from_secs(10));
        assert_eq!(policy.delay_for(4), Duration::from_secs(300));
        // Past the schedule, the last delay repeats
        assert_eq!(policy.delay_for(9), Duration::from_secs(300));

        let rotate = ROTATE_KEYS_RETRY;
        assert_eq!(rotate.max_retries, 3);
        assert_eq!(rotate.delay_for(2), Duration::from_secs(900));
    }

    #[test]
    fn job_names_are_stable() {
        assert_eq!(
            AdhocJob::WaitConfirmation { tx_id: Uuid::new_v4() }.name(),
            "wait_confirmation"
        );
        assert_eq!(
            AdhocJob::RotateKeys { old_version: "v1".to_string() }.name(),
            "rotate_keys"
        );
    }

    #[tokio::test]
    async fn queue_delivers_jobs_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let queue = JobQueue { tx };

        queue.enqueue(AdhocJob::RefreshWalletBalance {
            pubkey: "a".to_string(),
        });
        queue.enqueue(AdhocJob::RefreshWalletBalance {
            pubkey: "b".to_string(),
        });

        let first = rx.recv().await.unwrap();
        assert_eq!(first.attempt, 0);
        match first.job {
            AdhocJob::RefreshWalletBalance { pubkey } => assert_eq!(pubkey, "a"),
            other => panic!("unexpected job {other:?}"),
        }
        assert!(rx.recv().await.is_some());
    }
}
