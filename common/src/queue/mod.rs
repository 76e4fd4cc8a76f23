pub mod names;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use tokio::{sync::Mutex, task::JoinHandle, time::sleep};
use tokio_cron_scheduler::{Job as CronJob, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::job::{Job, JobErrorInfo, JobPayload, DEFAULT_LEASE_SECS},
    },
};

/// Work performed for each job claimed from a queue.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<(), AppError>;
}

/// Exponential backoff applied between attempts of a failed job.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base_delay_secs: u64,
    pub max_delay_secs: u64,
    pub cap_exponent: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_secs: 30,
            max_delay_secs: 15 * 60,
            cap_exponent: 5,
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self, attempt: u32) -> Duration {
        let capped_attempt = attempt.saturating_sub(1).min(self.cap_exponent);
        let multiplier = 2_u64.pow(capped_attempt);
        let delay = self.base_delay_secs.saturating_mul(multiplier);

        Duration::from_secs(delay.min(self.max_delay_secs))
    }
}

#[derive(Debug, Clone)]
pub struct WorkOptions {
    /// Independent worker loops polling the queue.
    pub concurrency: usize,
    /// Jobs claimed per poll by a single loop.
    pub batch_size: usize,
    pub lease: Duration,
    pub idle_backoff: Duration,
    pub retry: RetryPolicy,
}

impl Default for WorkOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            batch_size: 1,
            lease: Duration::from_secs(u64::try_from(DEFAULT_LEASE_SECS).unwrap_or(300)),
            idle_backoff: Duration::from_millis(500),
            retry: RetryPolicy::default(),
        }
    }
}

impl WorkOptions {
    pub fn with_concurrency(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            ..Self::default()
        }
    }
}

/// Durable job queue backed by the `job` table.
///
/// Queues are identified by name only; jobs on different queues never interfere. Workers
/// registered through [`JobQueue::work`] keep polling until [`JobQueue::close`] is called.
pub struct JobQueue {
    db: Arc<SurrealDbClient>,
    shutdown: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
    scheduler: Mutex<Option<JobScheduler>>,
}

impl JobQueue {
    pub async fn connect(db: Arc<SurrealDbClient>) -> Result<Arc<Self>, AppError> {
        db.ensure_initialized().await?;

        Ok(Arc::new(Self {
            db,
            shutdown: CancellationToken::new(),
            workers: Mutex::new(Vec::new()),
            scheduler: Mutex::new(None),
        }))
    }

    pub fn db(&self) -> &Arc<SurrealDbClient> {
        &self.db
    }

    pub async fn send(&self, queue: &str, payload: JobPayload) -> Result<Job, AppError> {
        let job = Job::enqueue(queue, payload, &self.db).await?;
        debug!(queue, job_id = %job.id, "job enqueued");
        Ok(job)
    }

    /// Enqueues only when the queue has no unfinished job. Returns `None` when skipped.
    pub async fn send_singleton(
        &self,
        queue: &str,
        payload: JobPayload,
    ) -> Result<Option<Job>, AppError> {
        send_singleton(&self.db, queue, payload).await
    }

    pub async fn queue_depth(&self, queue: &str) -> Result<u64, AppError> {
        Job::unfinished_count(queue, &self.db).await
    }

    /// Spawns `options.concurrency` worker loops consuming `queue`.
    pub async fn work(
        &self,
        queue: &str,
        options: WorkOptions,
        handler: Arc<dyn JobHandler>,
    ) -> Result<(), AppError> {
        if self.shutdown.is_cancelled() {
            return Err(AppError::InternalError("job queue is closed".into()));
        }

        let mut workers = self.workers.lock().await;
        for _ in 0..options.concurrency.max(1) {
            let worker_id = format!("{queue}-worker-{}", Uuid::new_v4());
            workers.push(tokio::spawn(run_worker_loop(
                Arc::clone(&self.db),
                queue.to_owned(),
                worker_id,
                options.clone(),
                Arc::clone(&handler),
                self.shutdown.child_token(),
            )));
        }
        info!(queue, concurrency = options.concurrency, "queue workers started");
        Ok(())
    }

    /// Registers a cron schedule that enqueues `payload` as a singleton on `queue`.
    /// Six-field cron expressions (with seconds) are expected.
    pub async fn schedule(
        &self,
        queue: &str,
        cron: &str,
        payload: JobPayload,
    ) -> Result<(), AppError> {
        let mut guard = self.scheduler.lock().await;
        let scheduler = match guard.as_ref() {
            Some(scheduler) => scheduler.clone(),
            None => {
                let scheduler = JobScheduler::new().await?;
                *guard = Some(scheduler.clone());
                scheduler
            }
        };

        let db = Arc::clone(&self.db);
        let queue_name = queue.to_owned();
        let cron_job = CronJob::new_async(cron, move |_id, _scheduler| {
            let db = Arc::clone(&db);
            let queue_name = queue_name.clone();
            let payload = payload.clone();
            Box::pin(async move {
                match send_singleton(&db, &queue_name, payload).await {
                    Ok(Some(job)) => info!(queue = %queue_name, job_id = %job.id, "scheduled job enqueued"),
                    Ok(None) => debug!(queue = %queue_name, "previous run still active; skipping"),
                    Err(err) => error!(queue = %queue_name, error = %err, "failed to enqueue scheduled job"),
                }
            })
        })?;

        scheduler.add(cron_job).await?;
        info!(queue, cron, "schedule registered");
        Ok(())
    }

    /// Starts the cron scheduler, if any schedule was registered.
    pub async fn start(&self) -> Result<(), AppError> {
        if let Some(scheduler) = self.scheduler.lock().await.as_ref() {
            scheduler.start().await?;
        }
        Ok(())
    }

    /// Stops claiming new jobs and waits for in-flight work to finish.
    pub async fn close(&self) -> Result<(), AppError> {
        self.shutdown.cancel();

        if let Some(mut scheduler) = self.scheduler.lock().await.take() {
            scheduler.shutdown().await?;
        }

        let workers = std::mem::take(&mut *self.workers.lock().await);
        let count = workers.len();
        for worker in workers {
            if let Err(err) = worker.await {
                warn!(error = %err, "worker loop ended abnormally");
            }
        }
        info!(workers = count, "job queue closed");
        Ok(())
    }
}

async fn send_singleton(
    db: &SurrealDbClient,
    queue: &str,
    payload: JobPayload,
) -> Result<Option<Job>, AppError> {
    if Job::unfinished_count(queue, db).await? > 0 {
        return Ok(None);
    }
    Job::enqueue(queue, payload, db).await.map(Some)
}

async fn run_worker_loop(
    db: Arc<SurrealDbClient>,
    queue: String,
    worker_id: String,
    options: WorkOptions,
    handler: Arc<dyn JobHandler>,
    shutdown: CancellationToken,
) {
    let batch_size = options.batch_size.max(1);

    while !shutdown.is_cancelled() {
        let mut batch = Vec::with_capacity(batch_size);
        let mut claim_failed = false;

        while batch.len() < batch_size {
            match Job::claim_next_ready(&db, &queue, &worker_id, Utc::now(), options.lease).await {
                Ok(Some(job)) => {
                    debug!(%worker_id, job_id = %job.id, attempt = job.attempts, "claimed job");
                    batch.push(job);
                }
                Ok(None) => break,
                Err(err) => {
                    error!(%worker_id, %queue, error = %err, "failed to claim job");
                    claim_failed = true;
                    break;
                }
            }
        }

        if batch.is_empty() {
            let backoff = if claim_failed {
                Duration::from_secs(1)
            } else {
                options.idle_backoff
            };
            tokio::select! {
                () = shutdown.cancelled() => break,
                () = sleep(backoff) => continue,
            }
        }

        for job in batch {
            let job_id = job.id.clone();
            if let Err(err) = process_job(&db, job, handler.as_ref(), &options.retry).await {
                debug!(%worker_id, %job_id, error = %err, "job did not complete");
            }
        }
    }

    debug!(%worker_id, %queue, "worker loop stopped");
}

/// Runs `handler` for a reserved job and records the outcome.
///
/// Retryable failures are rescheduled with backoff while attempts remain; everything else is
/// moved to the dead letter state.
#[tracing::instrument(
    skip_all,
    fields(
        queue = %job.queue,
        job_id = %job.id,
        attempt = job.attempts,
        worker_id = job.worker_id.as_deref().unwrap_or("unknown-worker")
    )
)]
pub async fn process_job(
    db: &SurrealDbClient,
    job: Job,
    handler: &dyn JobHandler,
    retry: &RetryPolicy,
) -> Result<(), AppError> {
    let processing = job.mark_processing(db).await?;

    match handler.handle(&processing).await {
        Ok(()) => {
            processing.mark_succeeded(db).await?;
            info!(
                job_id = %processing.id,
                attempt = processing.attempts,
                "job succeeded"
            );
            Ok(())
        }
        Err(err) => {
            let reason = err.to_string();
            let error_info = JobErrorInfo {
                code: None,
                message: reason.clone(),
            };

            if err.is_retryable() && processing.can_retry() {
                let delay = retry.delay(processing.attempts);
                processing.mark_failed(error_info, delay, db).await?;
                warn!(
                    job_id = %processing.id,
                    attempt = processing.attempts,
                    retry_in_secs = delay.as_secs(),
                    error = %reason,
                    "job failed; scheduled retry"
                );
            } else {
                let failed = processing
                    .mark_failed(error_info.clone(), Duration::from_secs(0), db)
                    .await?;
                failed.mark_dead_letter(error_info, db).await?;
                warn!(
                    job_id = %failed.id,
                    attempt = failed.attempts,
                    error = %reason,
                    "job failed; moved to dead letter"
                );
            }

            Err(AppError::Processing(reason))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::job::JobState;
    use tokio::sync::mpsc;

    async fn queue() -> Arc<JobQueue> {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory surrealdb");
        JobQueue::connect(Arc::new(db)).await.expect("connect")
    }

    struct Outcome(fn() -> Result<(), AppError>);

    #[async_trait]
    impl JobHandler for Outcome {
        async fn handle(&self, _job: &Job) -> Result<(), AppError> {
            (self.0)()
        }
    }

    async fn claim(queue: &JobQueue, name: &str) -> Job {
        Job::claim_next_ready(queue.db(), name, "w1", Utc::now(), Duration::from_secs(60))
            .await
            .expect("claim")
            .expect("claimed")
    }

    #[test]
    fn retry_delay_grows_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(1), Duration::from_secs(30));
        assert_eq!(policy.delay(2), Duration::from_secs(60));
        assert_eq!(policy.delay(4), Duration::from_secs(240));
        assert_eq!(policy.delay(6), Duration::from_secs(900));
        assert_eq!(policy.delay(40), Duration::from_secs(900));
    }

    #[tokio::test]
    async fn singleton_skips_while_a_job_is_unfinished() {
        let queue = queue().await;
        let first = queue
            .send_singleton(names::SYNC, JobPayload::Sync)
            .await
            .expect("send");
        assert!(first.is_some());

        let second = queue
            .send_singleton(names::SYNC, JobPayload::Sync)
            .await
            .expect("send");
        assert!(second.is_none());
        assert_eq!(queue.queue_depth(names::SYNC).await.expect("depth"), 1);
    }

    #[tokio::test]
    async fn retryable_failure_is_rescheduled() {
        let queue = queue().await;
        queue
            .send("translate-jp", JobPayload::article("a1"))
            .await
            .expect("send");

        let job = claim(&queue, "translate-jp").await;
        let handler = Outcome(|| Err(AppError::Upstream("503".into())));
        let result = process_job(queue.db(), job.clone(), &handler, &RetryPolicy::default()).await;
        assert!(result.is_err());

        let stored: Job = queue
            .db()
            .get_item(&job.id)
            .await
            .expect("get")
            .expect("job");
        assert_eq!(stored.state, JobState::Failed);
        assert!(stored.scheduled_at > Utc::now());
        assert_eq!(stored.error_message.as_deref(), Some("Upstream service error: 503"));
    }

    #[tokio::test]
    async fn non_retryable_failure_is_dead_lettered() {
        let queue = queue().await;
        queue
            .send("summarize-jp", JobPayload::article("a1"))
            .await
            .expect("send");

        let job = claim(&queue, "summarize-jp").await;
        let handler = Outcome(|| Err(AppError::Precondition("not translated".into())));
        process_job(queue.db(), job.clone(), &handler, &RetryPolicy::default())
            .await
            .expect_err("precondition failure");

        let stored: Job = queue
            .db()
            .get_item(&job.id)
            .await
            .expect("get")
            .expect("job");
        assert_eq!(stored.state, JobState::DeadLetter);
        assert_eq!(queue.queue_depth("summarize-jp").await.expect("depth"), 0);
    }

    struct Forward(mpsc::UnboundedSender<String>);

    #[async_trait]
    impl JobHandler for Forward {
        async fn handle(&self, job: &Job) -> Result<(), AppError> {
            let _ = self.0.send(job.payload.article_id().unwrap_or_default().to_owned());
            Ok(())
        }
    }

    #[tokio::test]
    async fn workers_consume_until_closed() {
        let queue = queue().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let options = WorkOptions {
            idle_backoff: Duration::from_millis(20),
            ..WorkOptions::with_concurrency(2)
        };
        queue
            .work("embed-us", options, Arc::new(Forward(tx)))
            .await
            .expect("work");

        queue
            .send("embed-us", JobPayload::article("a7"))
            .await
            .expect("send");

        let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("job delivered in time");
        assert_eq!(received.as_deref(), Some("a7"));

        queue.close().await.expect("close");
        assert!(queue
            .work("embed-us", WorkOptions::default(), Arc::new(Outcome(|| Ok(()))))
            .await
            .is_err());
    }
}
