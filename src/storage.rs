use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    presigning::PresigningConfig,
    Client,
};
use bytes::Bytes;

/// Object Stager boundary: staging a time-boxed write credential for one key,
/// and fetching the object back during processing.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Presigned PUT URL scoped to exactly `key`, valid for `expires`.
    async fn presign_put(&self, key: &str, expires: Duration) -> anyhow::Result<String>;

    /// `None` when the object does not exist.
    async fn fetch(&self, key: &str) -> anyhow::Result<Option<Bytes>>;
}

#[derive(Clone)]
pub struct Storage {
    client: Client,
    bucket: String,
}

impl Storage {
    pub async fn new(
        endpoint: &str,
        bucket: &str,
        access_key: &str,
        secret_key: &str,
        region: &str,
    ) -> anyhow::Result<Self> {
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .credentials_provider(Credentials::new(
                access_key, secret_key, None, None, "static",
            ))
            .endpoint_url(endpoint)
            .load()
            .await;

        let conf = S3ConfigBuilder::from(&shared)
            .endpoint_url(endpoint)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(conf),
            bucket: bucket.to_string(),
        })
    }
}

#[async_trait]
impl ObjectStore for Storage {
    async fn presign_put(&self, key: &str, expires: Duration) -> anyhow::Result<String> {
        let req = self.client.put_object().bucket(&self.bucket).key(key);
        let presigned = req
            .presigned(PresigningConfig::expires_in(expires)?)
            .await
            .context("s3 presign_put")?;
        Ok(presigned.uri().to_string())
    }

    async fn fetch(&self, key: &str) -> anyhow::Result<Option<Bytes>> {
        let out = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match out {
            Ok(obj) => {
                let data = obj.body.collect().await.context("read s3 object body")?;
                Ok(Some(data.into_bytes()))
            }
            Err(e) => {
                if e.as_service_error().map(|se| se.is_no_such_key()) == Some(true) {
                    return Ok(None);
                }
                Err(e).context("s3 get_object")
            }
        }
    }
}
