#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod pipeline;
pub mod requeue;
pub mod sync;
pub mod utils;
pub mod workers;

pub use pipeline::{ContentPipeline, DefaultPipelineServices, PipelineConfig, PipelineServices};
pub use requeue::{backfill_embeddings, requeue_pending, requeue_stage, BackfillReport, RequeueReport};
pub use sync::{FeedSync, SyncReport};
pub use utils::images::{ImagePersister, ImageStore};
pub use workers::{register_workers, start_schedules, StageHandler, SyncHandler};
