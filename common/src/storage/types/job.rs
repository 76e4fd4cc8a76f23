use std::time::Duration;

use chrono::Duration as ChronoDuration;
use state_machines::state_machine;
use surrealdb::sql::Datetime as SurrealDatetime;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

pub const MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_LEASE_SECS: i64 = 300;

#[derive(Debug, Default, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub enum JobState {
    #[default]
    Pending,
    Reserved,
    Processing,
    Succeeded,
    Failed,
    DeadLetter,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "Pending",
            JobState::Reserved => "Reserved",
            JobState::Processing => "Processing",
            JobState::Succeeded => "Succeeded",
            JobState::Failed => "Failed",
            JobState::DeadLetter => "DeadLetter",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::DeadLetter)
    }

    /// States a job can be in while it still counts towards queue depth.
    pub fn unfinished() -> Vec<&'static str> {
        vec![
            JobState::Pending.as_str(),
            JobState::Reserved.as_str(),
            JobState::Processing.as_str(),
            JobState::Failed.as_str(),
        ]
    }
}

/// Work item carried by a job. Stage jobs only reference the article.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    Sync,
    Article { article_id: String },
}

impl JobPayload {
    pub fn article(article_id: impl Into<String>) -> Self {
        JobPayload::Article {
            article_id: article_id.into(),
        }
    }

    pub fn article_id(&self) -> Option<&str> {
        match self {
            JobPayload::Article { article_id } => Some(article_id),
            JobPayload::Sync => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum JobTransition {
    Reserve,
    StartProcessing,
    Succeed,
    Fail,
    DeadLetter,
}

impl JobTransition {
    fn as_str(self) -> &'static str {
        match self {
            JobTransition::Reserve => "reserve",
            JobTransition::StartProcessing => "start_processing",
            JobTransition::Succeed => "succeed",
            JobTransition::Fail => "fail",
            JobTransition::DeadLetter => "deadletter",
        }
    }
}

mod lifecycle {
    use super::state_machine;

    state_machine! {
        name: JobLifecycleMachine,
        initial: Pending,
        states: [Pending, Reserved, Processing, Succeeded, Failed, DeadLetter],
        events {
            reserve {
                transition: { from: Pending, to: Reserved }
                transition: { from: Failed, to: Reserved }
                transition: { from: Reserved, to: Reserved }
                transition: { from: Processing, to: Reserved }
            }
            start_processing {
                transition: { from: Reserved, to: Processing }
            }
            succeed {
                transition: { from: Processing, to: Succeeded }
            }
            fail {
                transition: { from: Processing, to: Failed }
            }
            deadletter {
                transition: { from: Failed, to: DeadLetter }
            }
        }
    }

    pub(super) fn pending() -> JobLifecycleMachine<(), Pending> {
        JobLifecycleMachine::new(())
    }
}

fn invalid_transition(state: JobState, event: JobTransition) -> AppError {
    AppError::Validation(format!(
        "Invalid job transition: {} -> {}",
        state.as_str(),
        event.as_str()
    ))
}

/// Walks the lifecycle machine from `Pending` to `state`, then applies `event`.
fn compute_next_state(state: JobState, event: JobTransition) -> Result<JobState, AppError> {
    let invalid = |_| invalid_transition(state, event);
    let pending = lifecycle::pending();

    match (state, event) {
        (JobState::Pending, JobTransition::Reserve) => {
            pending.reserve().map(|_| JobState::Reserved).map_err(invalid)
        }
        (JobState::Reserved, JobTransition::Reserve) => pending
            .reserve()
            .map_err(invalid)?
            .reserve()
            .map(|_| JobState::Reserved)
            .map_err(|_| invalid_transition(state, event)),
        (JobState::Reserved, JobTransition::StartProcessing) => pending
            .reserve()
            .map_err(invalid)?
            .start_processing()
            .map(|_| JobState::Processing)
            .map_err(|_| invalid_transition(state, event)),
        (JobState::Processing, JobTransition::Reserve) => pending
            .reserve()
            .map_err(invalid)?
            .start_processing()
            .map_err(|_| invalid_transition(state, event))?
            .reserve()
            .map(|_| JobState::Reserved)
            .map_err(|_| invalid_transition(state, event)),
        (JobState::Processing, JobTransition::Succeed) => pending
            .reserve()
            .map_err(invalid)?
            .start_processing()
            .map_err(|_| invalid_transition(state, event))?
            .succeed()
            .map(|_| JobState::Succeeded)
            .map_err(|_| invalid_transition(state, event)),
        (JobState::Processing, JobTransition::Fail) => pending
            .reserve()
            .map_err(invalid)?
            .start_processing()
            .map_err(|_| invalid_transition(state, event))?
            .fail()
            .map(|_| JobState::Failed)
            .map_err(|_| invalid_transition(state, event)),
        (JobState::Failed, JobTransition::Reserve) => pending
            .reserve()
            .map_err(invalid)?
            .start_processing()
            .map_err(|_| invalid_transition(state, event))?
            .fail()
            .map_err(|_| invalid_transition(state, event))?
            .reserve()
            .map(|_| JobState::Reserved)
            .map_err(|_| invalid_transition(state, event)),
        (JobState::Failed, JobTransition::DeadLetter) => pending
            .reserve()
            .map_err(invalid)?
            .start_processing()
            .map_err(|_| invalid_transition(state, event))?
            .fail()
            .map_err(|_| invalid_transition(state, event))?
            .deadletter()
            .map(|_| JobState::DeadLetter)
            .map_err(|_| invalid_transition(state, event)),
        _ => Err(invalid_transition(state, event)),
    }
}

/// Error details recorded on a failed job.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq, Default)]
pub struct JobErrorInfo {
    pub code: Option<String>,
    pub message: String,
}

stored_object!(Job, "job", {
    queue: String,
    payload: JobPayload,
    state: JobState,
    attempts: u32,
    max_attempts: u32,
    #[serde(serialize_with = "serialize_datetime", deserialize_with = "deserialize_datetime")]
    scheduled_at: DateTime<Utc>,
    #[serde(
        serialize_with = "serialize_option_datetime",
        deserialize_with = "deserialize_option_datetime",
        default
    )]
    locked_at: Option<DateTime<Utc>>,
    lease_duration_secs: i64,
    worker_id: Option<String>,
    error_code: Option<String>,
    error_message: Option<String>,
    #[serde(
        serialize_with = "serialize_option_datetime",
        deserialize_with = "deserialize_option_datetime",
        default
    )]
    last_error_at: Option<DateTime<Utc>>
});

impl Job {
    pub fn new(queue: impl Into<String>, payload: JobPayload) -> Self {
        let now = Utc::now();

        Self {
            id: Uuid::new_v4().to_string(),
            queue: queue.into(),
            payload,
            state: JobState::Pending,
            attempts: 0,
            max_attempts: MAX_ATTEMPTS,
            scheduled_at: now,
            locked_at: None,
            lease_duration_secs: DEFAULT_LEASE_SECS,
            worker_id: None,
            error_code: None,
            error_message: None,
            last_error_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }

    pub async fn enqueue(
        queue: impl Into<String>,
        payload: JobPayload,
        db: &SurrealDbClient,
    ) -> Result<Job, AppError> {
        let job = Self::new(queue, payload);
        db.store_item(job.clone()).await?;
        Ok(job)
    }

    /// Number of jobs on `queue` that have not reached a terminal state.
    pub async fn unfinished_count(queue: &str, db: &SurrealDbClient) -> Result<u64, AppError> {
        #[derive(serde::Deserialize)]
        struct CountRow {
            count: u64,
        }

        let mut response = db
            .query(
                "SELECT count() AS count FROM type::table($table) \
                 WHERE queue = $queue AND state IN $active_states GROUP ALL",
            )
            .bind(("table", Self::table_name()))
            .bind(("queue", queue.to_owned()))
            .bind(("active_states", JobState::unfinished()))
            .await?;

        let row: Option<CountRow> = response.take(0)?;
        Ok(row.map_or(0, |r| r.count))
    }

    /// Leases the next runnable job on `queue`.
    ///
    /// Pending and retry-scheduled jobs are claimable once `scheduled_at` has passed; reserved or
    /// processing jobs become claimable again when their lease expires.
    pub async fn claim_next_ready(
        db: &SurrealDbClient,
        queue: &str,
        worker_id: &str,
        now: DateTime<Utc>,
        lease_duration: Duration,
    ) -> Result<Option<Job>, AppError> {
        debug_assert!(compute_next_state(JobState::Pending, JobTransition::Reserve).is_ok());
        debug_assert!(compute_next_state(JobState::Failed, JobTransition::Reserve).is_ok());
        debug_assert!(compute_next_state(JobState::Processing, JobTransition::Reserve).is_ok());

        const CLAIM_QUERY: &str = r#"
            UPDATE (
                SELECT * FROM type::table($table)
                WHERE queue = $queue
                  AND state IN $candidate_states
                  AND scheduled_at <= $now
                  AND (
                        attempts < max_attempts
                        OR state IN $sticky_states
                  )
                  AND (
                        locked_at = NONE
                        OR time::unix($now) - time::unix(locked_at) >= lease_duration_secs
                  )
                ORDER BY scheduled_at ASC, created_at ASC
                LIMIT 1
            )
            SET state = $reserved_state,
                attempts = if state IN $increment_states THEN
                    if attempts + 1 > max_attempts THEN max_attempts ELSE attempts + 1 END
                ELSE
                    attempts
                END,
                locked_at = $now,
                worker_id = $worker_id,
                lease_duration_secs = $lease_secs,
                updated_at = $now
            RETURN *;
        "#;

        let mut result = db
            .client
            .query(CLAIM_QUERY)
            .bind(("table", Self::table_name()))
            .bind(("queue", queue.to_owned()))
            .bind((
                "candidate_states",
                vec![
                    JobState::Pending.as_str(),
                    JobState::Failed.as_str(),
                    JobState::Reserved.as_str(),
                    JobState::Processing.as_str(),
                ],
            ))
            .bind((
                "sticky_states",
                vec![JobState::Reserved.as_str(), JobState::Processing.as_str()],
            ))
            .bind((
                "increment_states",
                vec![JobState::Pending.as_str(), JobState::Failed.as_str()],
            ))
            .bind(("reserved_state", JobState::Reserved.as_str()))
            .bind(("now", SurrealDatetime::from(now)))
            .bind(("worker_id", worker_id.to_string()))
            .bind((
                "lease_secs",
                i64::try_from(lease_duration.as_secs()).unwrap_or(DEFAULT_LEASE_SECS),
            ))
            .await?;

        let job: Option<Job> = result.take(0)?;
        Ok(job)
    }

    pub async fn mark_processing(&self, db: &SurrealDbClient) -> Result<Job, AppError> {
        compute_next_state(self.state, JobTransition::StartProcessing)?;

        const START_PROCESSING_QUERY: &str = r#"
            UPDATE type::thing($table, $id)
            SET state = $processing,
                updated_at = $now,
                locked_at = $now
            WHERE state = $reserved AND worker_id = $worker_id
            RETURN *;
        "#;

        let now = Utc::now();
        let mut result = db
            .client
            .query(START_PROCESSING_QUERY)
            .bind(("table", Self::table_name()))
            .bind(("id", self.id.clone()))
            .bind(("processing", JobState::Processing.as_str()))
            .bind(("reserved", JobState::Reserved.as_str()))
            .bind(("now", SurrealDatetime::from(now)))
            .bind(("worker_id", self.worker_id.clone().unwrap_or_default()))
            .await?;

        let updated: Option<Job> = result.take(0)?;
        updated.ok_or_else(|| invalid_transition(self.state, JobTransition::StartProcessing))
    }

    pub async fn mark_succeeded(&self, db: &SurrealDbClient) -> Result<Job, AppError> {
        compute_next_state(self.state, JobTransition::Succeed)?;

        const COMPLETE_QUERY: &str = r#"
            UPDATE type::thing($table, $id)
            SET state = $succeeded,
                updated_at = $now,
                locked_at = NONE,
                worker_id = NONE,
                error_code = NONE,
                error_message = NONE,
                last_error_at = NONE
            WHERE state = $processing AND worker_id = $worker_id
            RETURN *;
        "#;

        let now = Utc::now();
        let mut result = db
            .client
            .query(COMPLETE_QUERY)
            .bind(("table", Self::table_name()))
            .bind(("id", self.id.clone()))
            .bind(("succeeded", JobState::Succeeded.as_str()))
            .bind(("processing", JobState::Processing.as_str()))
            .bind(("now", SurrealDatetime::from(now)))
            .bind(("worker_id", self.worker_id.clone().unwrap_or_default()))
            .await?;

        let updated: Option<Job> = result.take(0)?;
        updated.ok_or_else(|| invalid_transition(self.state, JobTransition::Succeed))
    }

    pub async fn mark_failed(
        &self,
        error: JobErrorInfo,
        retry_delay: Duration,
        db: &SurrealDbClient,
    ) -> Result<Job, AppError> {
        compute_next_state(self.state, JobTransition::Fail)?;

        let now = Utc::now();
        let retry_at = now
            + ChronoDuration::from_std(retry_delay).unwrap_or_else(|_| ChronoDuration::seconds(30));

        const FAIL_QUERY: &str = r#"
            UPDATE type::thing($table, $id)
            SET state = $failed,
                updated_at = $now,
                locked_at = NONE,
                worker_id = NONE,
                scheduled_at = $retry_at,
                error_code = $error_code,
                error_message = $error_message,
                last_error_at = $now
            WHERE state = $processing AND worker_id = $worker_id
            RETURN *;
        "#;

        let mut result = db
            .client
            .query(FAIL_QUERY)
            .bind(("table", Self::table_name()))
            .bind(("id", self.id.clone()))
            .bind(("failed", JobState::Failed.as_str()))
            .bind(("processing", JobState::Processing.as_str()))
            .bind(("now", SurrealDatetime::from(now)))
            .bind(("retry_at", SurrealDatetime::from(retry_at)))
            .bind(("error_code", error.code))
            .bind(("error_message", error.message))
            .bind(("worker_id", self.worker_id.clone().unwrap_or_default()))
            .await?;

        let updated: Option<Job> = result.take(0)?;
        updated.ok_or_else(|| invalid_transition(self.state, JobTransition::Fail))
    }

    pub async fn mark_dead_letter(
        &self,
        error: JobErrorInfo,
        db: &SurrealDbClient,
    ) -> Result<Job, AppError> {
        compute_next_state(self.state, JobTransition::DeadLetter)?;

        const DEAD_LETTER_QUERY: &str = r#"
            UPDATE type::thing($table, $id)
            SET state = $dead,
                updated_at = $now,
                locked_at = NONE,
                worker_id = NONE,
                scheduled_at = $now,
                error_code = $error_code,
                error_message = $error_message,
                last_error_at = $now
            WHERE state = $failed
            RETURN *;
        "#;

        let now = Utc::now();
        let mut result = db
            .client
            .query(DEAD_LETTER_QUERY)
            .bind(("table", Self::table_name()))
            .bind(("id", self.id.clone()))
            .bind(("dead", JobState::DeadLetter.as_str()))
            .bind(("failed", JobState::Failed.as_str()))
            .bind(("now", SurrealDatetime::from(now)))
            .bind(("error_code", error.code))
            .bind(("error_message", error.message))
            .await?;

        let updated: Option<Job> = result.take(0)?;
        updated.ok_or_else(|| invalid_transition(self.state, JobTransition::DeadLetter))
    }
}
