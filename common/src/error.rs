use async_openai::error::OpenAIError;
use thiserror::Error;
use tokio::task::JoinError;

// Core internal errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),
    #[error("OpenAI error: {0}")]
    OpenAI(#[from] OpenAIError),
    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Precondition failed: {0}")]
    Precondition(String),
    #[error("Authorization error: {0}")]
    Auth(String),
    #[error("LLM parsing error: {0}")]
    LLMParsing(String),
    #[error("Upstream service error: {0}")]
    Upstream(String),
    #[error("Task join error: {0}")]
    Join(#[from] JoinError),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] tokio_cron_scheduler::JobSchedulerError),
    #[error("Processing error: {0}")]
    Processing(String),
    #[error("DOM smoothie error: {0}")]
    DomSmoothie(#[from] dom_smoothie::ReadabilityError),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

impl AppError {
    /// Whether redelivering the same job could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            AppError::Validation(_) | AppError::Precondition(_) | AppError::NotFound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precondition_and_validation_are_terminal() {
        assert!(!AppError::Precondition("no translation".into()).is_retryable());
        assert!(!AppError::Validation("bad payload".into()).is_retryable());
        assert!(AppError::Upstream("503 from translator".into()).is_retryable());
        assert!(AppError::LLMParsing("missing tldr".into()).is_retryable());
    }
}
