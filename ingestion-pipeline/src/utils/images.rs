use std::{fmt::Write as _, sync::Arc};

use async_trait::async_trait;
use common::{
    clients::{web::image_extension, WebFetcher},
    error::AppError,
    storage::store::StorageManager,
};
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Best-effort download and persistence of article images.
#[async_trait]
pub trait ImagePersister: Send + Sync {
    /// Returns the public URL of the stored copy, or `None` when anything went wrong.
    async fn persist(&self, article_id: &str, image_url: &str) -> Option<String>;
}

/// Object key for an image: article id plus a short content hash, so re-downloads of the same
/// bytes land on the same key.
pub fn image_key(article_id: &str, bytes: &[u8], content_type: &str) -> String {
    let digest = Sha256::digest(bytes);
    let hash = digest.iter().take(4).fold(String::with_capacity(8), |mut acc, byte| {
        let _ = write!(acc, "{byte:02x}");
        acc
    });
    format!(
        "articles/{article_id}-{hash}.{}",
        image_extension(content_type)
    )
}

pub struct ImageStore {
    fetcher: Arc<dyn WebFetcher>,
    storage: StorageManager,
    bucket_ready: OnceCell<bool>,
}

impl ImageStore {
    pub fn new(fetcher: Arc<dyn WebFetcher>, storage: StorageManager) -> Self {
        Self {
            fetcher,
            storage,
            bucket_ready: OnceCell::new(),
        }
    }

    /// Provisions the bucket before the first upload. An unreachable endpoint disables images
    /// for the process; a failed create is retried on the next call.
    async fn is_available(&self) -> bool {
        match self
            .bucket_ready
            .get_or_try_init(|| self.storage.ensure_bucket())
            .await
        {
            Ok(ready) => *ready,
            Err(err) => {
                warn!(error = %err, "failed to provision image bucket");
                false
            }
        }
    }

    async fn download_and_store(
        &self,
        article_id: &str,
        image_url: &str,
    ) -> Result<Option<String>, AppError> {
        let Some(image) = self.fetcher.fetch_image(image_url).await? else {
            return Ok(None);
        };

        let key = image_key(article_id, &image.bytes, &image.content_type);
        let size = image.bytes.len();
        let public_url = self
            .storage
            .put(&key, image.bytes, &image.content_type)
            .await?;
        info!(%article_id, %key, size, "article image stored");
        Ok(Some(public_url))
    }
}

#[async_trait]
impl ImagePersister for ImageStore {
    async fn persist(&self, article_id: &str, image_url: &str) -> Option<String> {
        if !self.is_available().await {
            return None;
        }

        match self.download_and_store(article_id, image_url).await {
            Ok(stored) => {
                if stored.is_none() {
                    debug!(%article_id, %image_url, "image skipped");
                }
                stored
            }
            Err(err) => {
                warn!(%article_id, %image_url, error = %err, "failed to download article image");
                None
            }
        }
    }
}
