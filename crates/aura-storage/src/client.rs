//! DigitalOcean Spaces client.

use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::upload::{content_type_for, object_key_for, ArtifactUploader};

/// Configuration for the Spaces client.
#[derive(Debug, Clone)]
pub struct SpacesConfig {
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Space (bucket) name
    pub space_name: String,
    /// Datacenter region, e.g. `sgp1`
    pub region: String,
    /// S3 API endpoint; derived from the region when unset
    pub endpoint_url: Option<String>,
}

impl SpacesConfig {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            access_key_id: std::env::var("ACCESS_KEY_ID")
                .map_err(|_| StorageError::config_error("ACCESS_KEY_ID not set"))?,
            secret_access_key: std::env::var("SECRET_KEY")
                .map_err(|_| StorageError::config_error("SECRET_KEY not set"))?,
            space_name: std::env::var("SPACE_NAME")
                .map_err(|_| StorageError::config_error("SPACE_NAME not set"))?,
            region: std::env::var("SPACES_REGION").unwrap_or_else(|_| "sgp1".to_string()),
            endpoint_url: std::env::var("SPACES_ENDPOINT_URL").ok(),
        })
    }

    pub fn endpoint(&self) -> String {
        self.endpoint_url
            .clone()
            .unwrap_or_else(|| format!("https://{}.digitaloceanspaces.com", self.region))
    }

    /// Public CDN URL of `key` in this Space.
    pub fn public_url(&self, key: &str) -> String {
        format!(
            "https://{}.{}.cdn.digitaloceanspaces.com/{}",
            self.space_name, self.region, key
        )
    }
}

#[derive(Clone)]
pub struct SpacesClient {
    client: Client,
    config: SpacesConfig,
}

impl SpacesClient {
    pub fn new(config: SpacesConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "spaces",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(config.endpoint())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(sdk_config),
            config,
        }
    }

    pub fn from_env() -> StorageResult<Self> {
        Ok(Self::new(SpacesConfig::from_env()?))
    }

    pub fn config(&self) -> &SpacesConfig {
        &self.config
    }

    /// Create the Space if it does not exist yet.
    pub async fn ensure_space(&self) -> StorageResult<()> {
        let bucket = &self.config.space_name;
        if self.client.head_bucket().bucket(bucket).send().await.is_ok() {
            debug!(space = %bucket, "Space exists");
            return Ok(());
        }

        match self.client.create_bucket().bucket(bucket).send().await {
            Ok(_) => {
                info!(space = %bucket, "Space created");
                Ok(())
            }
            Err(e) => {
                let already_there = e.as_service_error().is_some_and(|se| {
                    se.is_bucket_already_owned_by_you() || se.is_bucket_already_exists()
                });
                if already_there {
                    Ok(())
                } else {
                    Err(StorageError::bucket_failed(e.to_string()))
                }
            }
        }
    }

    /// Upload `path` under a random key and return its public URL.
    pub async fn upload_file(&self, path: &Path) -> StorageResult<String> {
        let content_type = content_type_for(path)?;
        let key = object_key_for(path);
        debug!("Uploading {} to {}", path.display(), key);

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.config.space_name)
            .key(&key)
            .body(body)
            .acl(ObjectCannedAcl::PublicRead)
            .content_type(content_type)
            .content_disposition("inline")
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        info!("Uploaded {} to {}", path.display(), key);
        Ok(self.config.public_url(&key))
    }
}

#[async_trait]
impl ArtifactUploader for SpacesClient {
    async fn upload(&self, path: &Path) -> StorageResult<String> {
        self.upload_file(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SpacesConfig {
        SpacesConfig {
            access_key_id: "key".to_string(),
            secret_access_key: "secret".to_string(),
            space_name: "ganaura".to_string(),
            region: "sgp1".to_string(),
            endpoint_url: None,
        }
    }

    #[test]
    fn test_endpoint_derived_from_region() {
        assert_eq!(config().endpoint(), "https://sgp1.digitaloceanspaces.com");

        let custom = SpacesConfig {
            endpoint_url: Some("http://localhost:9000".to_string()),
            ..config()
        };
        assert_eq!(custom.endpoint(), "http://localhost:9000");
    }

    #[test]
    fn test_public_url() {
        assert_eq!(
            config().public_url("abc.mp4"),
            "https://ganaura.sgp1.cdn.digitaloceanspaces.com/abc.mp4"
        );
    }

    #[tokio::test]
    async fn test_rejects_non_media_before_network() {
        let client = SpacesClient::new(config());
        let err = tokio_test::assert_err!(client.upload_file(Path::new("/tmp/sound.mp3")).await);
        assert!(matches!(err, StorageError::UnsupportedContentType(_)));
    }
}
