use async_trait::async_trait;
use kernel::{
    BackupCreated, BackupId, DatasetListing, IpfsData, META_KEY_HEADER, META_TOKEN_HEADER,
    RebuildResult,
};
use reqwest::{Client, RequestBuilder};

use crate::config::MetaConf;
use crate::error::{Error, Result};
use crate::resource::Resource;
use crate::service::ArchiveService;
use crate::{failure_reply, http_client};

const API_ROOT: &str = "meta/v1";

/// HTTP client of the metadata archive.
///
/// Construction never fails: a bad server address or HTTP setup surfaces as a
/// [`Error::Configuration`] from the first call.
pub struct ArchiveClient {
    http: Result<Client>,
    key: String,
    token: String,
    server_address: String,
}

impl ArchiveClient {
    #[must_use]
    pub fn new(key: &str, token: &str, conf: &MetaConf) -> Self {
        Self {
            http: http_client(conf.timeout),
            key: key.to_owned(),
            token: token.to_owned(),
            server_address: conf.server_address.clone(),
        }
    }

    fn endpoint(&self, path: &str) -> Result<Resource> {
        if self.server_address.is_empty() {
            return Err(Error::Configuration(
                "metadata archive server address is not set".to_owned(),
            ));
        }
        let mut resource = Resource::new(&self.server_address)?;
        resource.append_path(API_ROOT).append_path(path);
        Ok(resource)
    }

    fn dataset_endpoint(&self, dataset: &str) -> Result<Resource> {
        let mut resource = self.endpoint("datasets")?;
        resource.append_segment(dataset).append_path("backups");
        Ok(resource)
    }

    fn client(&self) -> Result<&Client> {
        self.http
            .as_ref()
            .map_err(|e| Error::Configuration(e.to_string()))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header(META_KEY_HEADER, &self.key)
            .header(META_TOKEN_HEADER, &self.token)
    }

    async fn send<T>(&self, resource: &Resource, request: RequestBuilder) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| Error::ArchivalService(format!("request to {resource} failed: {e}")))?;

        if !response.status().is_success() {
            let (status, message) = failure_reply(response).await;
            return Err(Error::archive_status(status, message));
        }
        response
            .json()
            .await
            .map_err(|e| Error::ArchivalService(format!("malformed reply from {resource}: {e}")))
    }
}

/// Rejects list windows the archive cannot serve.
pub fn validate_page(limit: u64) -> Result<()> {
    if limit == 0 {
        return Err(Error::InvalidInput(
            "listing limit must be greater than zero".to_owned(),
        ));
    }
    Ok(())
}

#[async_trait]
impl ArchiveService for ArchiveClient {
    async fn backup(&self, dataset: &str, data: &IpfsData) -> Result<BackupId> {
        let resource = self.dataset_endpoint(dataset)?;
        let request = self.client()?.post(resource.as_url().clone()).json(data);
        let created: BackupCreated = self.send(&resource, request).await?;
        tracing::debug!("dataset {dataset} backed up as {}", created.backup_id);
        Ok(created.backup_id)
    }

    async fn list(&self, dataset: &str, offset: u64, limit: u64) -> Result<DatasetListing> {
        validate_page(limit)?;
        let mut resource = self.dataset_endpoint(dataset)?;
        resource
            .append_query("offset", &offset.to_string())
            .append_query("limit", &limit.to_string());
        let request = self.client()?.get(resource.as_url().clone());
        self.send(&resource, request).await
    }

    async fn rebuild(&self, backup_id: &BackupId) -> Result<RebuildResult> {
        let mut resource = self.endpoint("backups")?;
        resource
            .append_segment(backup_id.as_str())
            .append_path("rebuild");
        let request = self.client()?.post(resource.as_url().clone());
        self.send(&resource, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::time::Duration;

    fn client(server: &str) -> ArchiveClient {
        let conf = MetaConf {
            key: String::new(),
            token: String::new(),
            server_address: server.to_owned(),
            timeout: Duration::from_secs(1),
        };
        ArchiveClient::new("key", "token", &conf)
    }

    #[test]
    fn dataset_endpoint_escapes_dataset() {
        // Arrange
        let c = client("http://localhost:5000");

        // Act
        let resource = c.dataset_endpoint("my dataset").unwrap();

        // Assert
        assert_eq!(
            resource.to_string(),
            "http://localhost:5000/meta/v1/datasets/my%20dataset/backups"
        );
    }

    #[rstest]
    #[case("")]
    #[case("not a url")]
    #[trace]
    fn bad_server_address_is_configuration_error(#[case] server: &str) {
        // Arrange
        let c = client(server);

        // Act
        let result = c.endpoint("backups");

        // Assert
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[tokio::test]
    async fn list_with_zero_limit_is_rejected() {
        // Arrange
        let c = client("http://localhost:5000");

        // Act
        let result = c.list("ds1", 0, 0).await;

        // Assert
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn backup_without_server_is_configuration_error() {
        // Arrange
        let c = client("");
        let data = IpfsData {
            download_url: "https://gw.example/ipfs/cidX".to_owned(),
        };

        // Act
        let result = c.backup("ds1", &data).await;

        // Assert
        assert!(matches!(result, Err(Error::Configuration(_))));
    }
}
