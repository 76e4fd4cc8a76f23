use async_trait::async_trait;
use aws_sdk_s3::{
    config::{BehaviorVersion, Credentials, Region},
    error::{DisplayErrorContext, SdkError},
    types::{BucketLocationConstraint, CreateBucketConfiguration},
    Client,
};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::{error::AppError, utils::config::AppConfig};

/// What a bucket existence check found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BucketState {
    Exists,
    Missing,
    /// The storage endpoint could not be reached at all.
    Unreachable(String),
}

/// Outcome of [`ensure_bucket`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketReadiness {
    Ready,
    /// The endpoint is unreachable; callers stop trying for the rest of the process.
    Disabled,
}

/// Bucket-level administration, separate from object reads and writes.
#[async_trait]
pub trait BucketAdmin: Send + Sync {
    fn bucket(&self) -> &str;
    async fn head_bucket(&self) -> BucketState;
    async fn create_bucket(&self) -> Result<(), AppError>;
    async fn put_bucket_policy(&self, policy: &str) -> Result<(), AppError>;
}

/// Anonymous `s3:GetObject` on every key of `bucket`.
pub fn public_read_policy(bucket: &str) -> String {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": "*",
            "Action": ["s3:GetObject"],
            "Resource": [format!("arn:aws:s3:::{bucket}/*")],
        }],
    })
    .to_string()
}

/// Existence check, then create and open for public reads when missing.
///
/// A failed create is returned as an error so the next call tries again. A failed policy
/// update is only logged: objects still upload, they are just not publicly readable.
pub async fn ensure_bucket(admin: &dyn BucketAdmin) -> Result<BucketReadiness, AppError> {
    let bucket = admin.bucket();
    match admin.head_bucket().await {
        BucketState::Exists => {
            debug!(%bucket, "bucket exists");
            Ok(BucketReadiness::Ready)
        }
        BucketState::Unreachable(reason) => {
            warn!(%bucket, %reason, "object storage unreachable; image persistence disabled");
            Ok(BucketReadiness::Disabled)
        }
        BucketState::Missing => {
            admin.create_bucket().await?;
            if let Err(err) = admin.put_bucket_policy(&public_read_policy(bucket)).await {
                warn!(%bucket, error = %err, "failed to set public-read bucket policy");
            }
            info!(%bucket, "created bucket");
            Ok(BucketReadiness::Ready)
        }
    }
}

/// S3 / MinIO bucket administration through the AWS SDK.
pub struct S3BucketAdmin {
    client: Client,
    bucket: String,
    region: String,
}

impl S3BucketAdmin {
    pub fn from_config(cfg: &AppConfig) -> Self {
        let credentials = Credentials::new(
            cfg.s3_access_key.clone().unwrap_or_default(),
            cfg.s3_secret_key.clone().unwrap_or_default(),
            None,
            None,
            "app-config",
        );
        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(cfg.s3_region.clone()))
            .credentials_provider(credentials);
        if let Some(endpoint) = &cfg.s3_endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
            bucket: cfg.s3_bucket.clone(),
            region: cfg.s3_region.clone(),
        }
    }
}

#[async_trait]
impl BucketAdmin for S3BucketAdmin {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn head_bucket(&self) -> BucketState {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => BucketState::Exists,
            Err(err @ (SdkError::DispatchFailure(_) | SdkError::TimeoutError(_))) => {
                BucketState::Unreachable(DisplayErrorContext(&err).to_string())
            }
            Err(err) => {
                debug!(bucket = %self.bucket, error = %DisplayErrorContext(&err), "head bucket failed");
                BucketState::Missing
            }
        }
    }

    async fn create_bucket(&self) -> Result<(), AppError> {
        let mut request = self.client.create_bucket().bucket(&self.bucket);
        // us-east-1 is the implicit location and must not be sent.
        if self.region != "us-east-1" {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => Ok(()),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_bucket_already_owned_by_you()) =>
            {
                Ok(())
            }
            Err(err) => Err(AppError::Upstream(format!(
                "failed to create bucket {}: {}",
                self.bucket,
                DisplayErrorContext(&err)
            ))),
        }
    }

    async fn put_bucket_policy(&self, policy: &str) -> Result<(), AppError> {
        self.client
            .put_bucket_policy()
            .bucket(&self.bucket)
            .policy(policy)
            .send()
            .await
            .map(|_| ())
            .map_err(|err| {
                AppError::Upstream(format!(
                    "failed to set policy on bucket {}: {}",
                    self.bucket,
                    DisplayErrorContext(&err)
                ))
            })
    }
}
