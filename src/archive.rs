//! Durable storage for CI run logs.
//!
//! Logs are written to `logs/<runName>` in an S3 bucket with a public-read
//! ACL so the link relayed to the registrant resolves without credentials.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use tracing::info;

use crate::dispatch::StorageCredentials;
use crate::github::{RemoteCallError, RemoteResult};

/// Stores a run log and returns a public URL for it.
#[async_trait]
pub trait LogArchive: Send + Sync {
    async fn store(&self, run_name: &str, log: String) -> RemoteResult<String>;
}

/// Object key a run's log is stored under.
pub fn log_key(run_name: &str) -> String {
    format!("logs/{}", run_name)
}

/// Public URL of an archived log.
pub fn public_url(bucket: &str, run_name: &str) -> String {
    format!("http://{}.s3.amazonaws.com/{}", bucket, log_key(run_name))
}

/// S3-backed [`LogArchive`].
#[derive(Debug, Clone)]
pub struct S3LogArchive {
    client: Client,
    bucket: String,
}

impl S3LogArchive {
    /// Builds a client from the credentials forwarded in the dispatch payload.
    pub fn new(credentials: &StorageCredentials, region: &str) -> Self {
        let static_credentials = Credentials::new(
            &credentials.access_id,
            &credentials.access_key,
            None,
            None,
            "sentinel-relay",
        );
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .credentials_provider(static_credentials)
            .build();

        Self {
            client: Client::from_conf(config),
            bucket: credentials.bucket.clone(),
        }
    }
}

#[async_trait]
impl LogArchive for S3LogArchive {
    async fn store(&self, run_name: &str, log: String) -> RemoteResult<String> {
        let key = log_key(run_name);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(log.into_bytes()))
            .content_type("text/plain; charset=utf-8")
            .acl(ObjectCannedAcl::PublicRead)
            .send()
            .await
            .map_err(|e| RemoteCallError::Storage(e.to_string()))?;

        info!("Uploaded run log to s3://{}/{}", self.bucket, key);
        Ok(public_url(&self.bucket, run_name))
    }
}
