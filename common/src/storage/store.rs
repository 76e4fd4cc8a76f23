use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::{path::Path as ObjPath, Attribute, Attributes, ObjectStore, PutOptions};

use crate::{
    error::AppError,
    storage::bucket::{ensure_bucket, BucketAdmin, BucketReadiness, S3BucketAdmin},
    utils::config::{AppConfig, StorageKind},
};

pub type DynStore = Arc<dyn ObjectStore>;

/// Object storage for article media plus the public URL scheme it is served under.
#[derive(Clone)]
pub struct StorageManager {
    store: DynStore,
    backend_kind: StorageKind,
    public_base: String,
    local_base: Option<PathBuf>,
    bucket_admin: Option<Arc<dyn BucketAdmin>>,
}

impl StorageManager {
    /// Create a new StorageManager with the specified configuration.
    pub async fn new(cfg: &AppConfig) -> object_store::Result<Self> {
        let backend_kind = cfg.storage.clone();
        let (store, local_base) = create_storage_backend(cfg).await?;
        let bucket_admin: Option<Arc<dyn BucketAdmin>> = match cfg.storage {
            StorageKind::S3 => Some(Arc::new(S3BucketAdmin::from_config(cfg))),
            StorageKind::Local | StorageKind::Memory => None,
        };

        Ok(Self {
            store,
            backend_kind,
            public_base: resolve_public_base(cfg),
            local_base,
            bucket_admin,
        })
    }

    /// Create a StorageManager with a custom storage backend.
    pub fn with_backend(store: DynStore, backend_kind: StorageKind, public_base: &str) -> Self {
        Self {
            store,
            backend_kind,
            public_base: public_base.trim_end_matches('/').to_string(),
            local_base: None,
            bucket_admin: None,
        }
    }

    /// Attach bucket administration, checked by [`Self::ensure_bucket`] before uploads.
    pub fn with_bucket_admin(mut self, admin: Arc<dyn BucketAdmin>) -> Self {
        self.bucket_admin = Some(admin);
        self
    }

    /// In-memory storage, mainly for tests and ephemeral runs.
    pub fn in_memory(public_base: &str) -> Self {
        Self::with_backend(Arc::new(InMemory::new()), StorageKind::Memory, public_base)
    }

    pub fn backend_kind(&self) -> &StorageKind {
        &self.backend_kind
    }

    pub fn local_base_path(&self) -> Option<&std::path::Path> {
        self.local_base.as_deref()
    }

    /// URL under which `location` is publicly reachable.
    pub fn public_url(&self, location: &str) -> String {
        format!("{}/{}", self.public_base, location.trim_start_matches('/'))
    }

    /// Store bytes with a content type and return their public URL.
    pub async fn put(
        &self,
        location: &str,
        data: Bytes,
        content_type: &str,
    ) -> object_store::Result<String> {
        let path = ObjPath::from(location);
        // The local filesystem store rejects object attributes.
        let mut attributes = Attributes::new();
        if !matches!(self.backend_kind, StorageKind::Local) {
            attributes.insert(Attribute::ContentType, content_type.to_string().into());
        }
        let opts = PutOptions {
            attributes,
            ..PutOptions::default()
        };

        self.store.put_opts(&path, data.into(), opts).await?;
        Ok(self.public_url(location))
    }

    /// Retrieve bytes from the specified location.
    pub async fn get(&self, location: &str) -> object_store::Result<Bytes> {
        let path = ObjPath::from(location);
        let result = self.store.get(&path).await?;
        result.bytes().await
    }

    /// Check if an object exists at the specified location.
    pub async fn exists(&self, location: &str) -> object_store::Result<bool> {
        let path = ObjPath::from(location);
        self.store
            .head(&path)
            .await
            .map(|_| true)
            .or_else(|e| match e {
                object_store::Error::NotFound { .. } => Ok(false),
                _ => Err(e),
            })
    }

    /// Makes sure the bucket exists and is publicly readable, creating it when missing.
    ///
    /// `Ok(false)` means the endpoint is unreachable and uploads should be skipped. Backends
    /// without buckets are always ready.
    pub async fn ensure_bucket(&self) -> Result<bool, AppError> {
        match &self.bucket_admin {
            None => Ok(true),
            Some(admin) => Ok(ensure_bucket(admin.as_ref()).await? == BucketReadiness::Ready),
        }
    }
}

fn resolve_public_base(cfg: &AppConfig) -> String {
    let base = match (&cfg.public_media_url, &cfg.storage, &cfg.s3_endpoint) {
        (Some(url), _, _) => url.clone(),
        (None, StorageKind::S3, Some(endpoint)) => {
            format!("{}/{}", endpoint.trim_end_matches('/'), cfg.s3_bucket)
        }
        (None, StorageKind::S3, None) => {
            format!("https://{}.s3.{}.amazonaws.com", cfg.s3_bucket, cfg.s3_region)
        }
        (None, _, _) => "/media".to_string(),
    };
    base.trim_end_matches('/').to_string()
}

/// Create a storage backend based on configuration.
async fn create_storage_backend(
    cfg: &AppConfig,
) -> object_store::Result<(DynStore, Option<PathBuf>)> {
    match cfg.storage {
        StorageKind::Local => {
            let base = PathBuf::from(&cfg.data_dir);
            if !base.exists() {
                tokio::fs::create_dir_all(&base).await.map_err(|e| {
                    object_store::Error::Generic {
                        store: "LocalFileSystem",
                        source: e.into(),
                    }
                })?;
            }
            let store = LocalFileSystem::new_with_prefix(base.clone())?;
            Ok((Arc::new(store), Some(base)))
        }
        StorageKind::Memory => Ok((Arc::new(InMemory::new()), None)),
        StorageKind::S3 => {
            let mut builder = AmazonS3Builder::new()
                .with_bucket_name(&cfg.s3_bucket)
                .with_region(&cfg.s3_region)
                .with_allow_http(true);
            if let Some(endpoint) = &cfg.s3_endpoint {
                builder = builder
                    .with_endpoint(endpoint)
                    .with_virtual_hosted_style_request(false);
            }
            if let Some(key) = &cfg.s3_access_key {
                builder = builder.with_access_key_id(key);
            }
            if let Some(secret) = &cfg.s3_secret_key {
                builder = builder.with_secret_access_key(secret);
            }
            Ok((Arc::new(builder.build()?), None))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::bucket::{tests::ScriptedBucket, BucketState};

    #[tokio::test]
    async fn put_returns_public_url_and_persists_bytes() {
        let storage = StorageManager::in_memory("https://media.example.com/kaiwa-images/");
        let url = storage
            .put("articles/a1-deadbeef.png", Bytes::from_static(b"png"), "image/png")
            .await
            .expect("put");

        assert_eq!(
            url,
            "https://media.example.com/kaiwa-images/articles/a1-deadbeef.png"
        );
        assert!(storage
            .exists("articles/a1-deadbeef.png")
            .await
            .expect("exists"));
        assert_eq!(
            storage.get("articles/a1-deadbeef.png").await.expect("get"),
            Bytes::from_static(b"png")
        );
        assert!(storage.ensure_bucket().await.expect("memory backend needs no bucket"));
    }

    #[tokio::test]
    async fn ensure_bucket_creates_a_missing_bucket_before_use() {
        let admin = Arc::new(ScriptedBucket::new(BucketState::Missing));
        let storage = StorageManager::in_memory("http://minio:9000/images")
            .with_bucket_admin(Arc::clone(&admin) as _);

        assert!(storage.ensure_bucket().await.expect("ensure"));
        let calls = admin.calls();
        assert_eq!(&calls[..2], &["head".to_string(), "create".to_string()]);
        assert!(calls[2].starts_with("policy "));
    }

    #[tokio::test]
    async fn ensure_bucket_reports_unreachable_endpoints() {
        let admin = Arc::new(ScriptedBucket::new(BucketState::Unreachable(
            "dns error".into(),
        )));
        let storage = StorageManager::in_memory("/media").with_bucket_admin(admin);
        assert!(!storage.ensure_bucket().await.expect("ensure"));
    }

    #[tokio::test]
    async fn s3_storage_manages_its_bucket() {
        let cfg = AppConfig {
            storage: StorageKind::S3,
            s3_endpoint: Some("http://127.0.0.1:9000".into()),
            s3_access_key: Some("minio".into()),
            s3_secret_key: Some("minio-secret".into()),
            ..AppConfig::default()
        };
        let storage = StorageManager::new(&cfg).await.expect("storage");
        assert!(storage.bucket_admin.is_some());

        let local = StorageManager::in_memory("/media");
        assert!(local.bucket_admin.is_none());
    }

    #[tokio::test]
    async fn local_backend_writes_under_data_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = AppConfig {
            storage: StorageKind::Local,
            data_dir: dir.path().to_string_lossy().into_owned(),
            ..AppConfig::default()
        };
        let storage = StorageManager::new(&cfg).await.expect("storage");

        let url = storage
            .put("articles/x.jpg", Bytes::from_static(b"jpg"), "image/jpeg")
            .await
            .expect("put");
        assert_eq!(url, "/media/articles/x.jpg");
        assert!(dir.path().join("articles/x.jpg").exists());
    }

    #[test]
    fn s3_public_base_defaults_to_endpoint_and_bucket() {
        let cfg = AppConfig {
            storage: StorageKind::S3,
            s3_endpoint: Some("http://minio:9000/".into()),
            ..AppConfig::default()
        };
        assert_eq!(resolve_public_base(&cfg), "http://minio:9000/kaiwa-images");
    }
}
