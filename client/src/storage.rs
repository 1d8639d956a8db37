use std::path::Path;

use async_trait::async_trait;
use kernel::{Bucket, ContentRecord, Credentials, Gateway, Session};
use reqwest::{Client, StatusCode};
use tokio::fs::File;
use tokio_util::io::ReaderStream;

use crate::config::StorageConfig;
use crate::error::{Error, Result};
use crate::resource::Resource;
use crate::service::StorageService;
use crate::{failure_reply, http_client};

const API_ROOT: &str = "api/v1";

/// HTTP client of the bucket storage service.
pub struct StorageClient {
    http: Client,
    base: Resource,
}

impl StorageClient {
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let mut base = Resource::new(&config.uri)?;
        base.append_path(API_ROOT);
        Ok(Self {
            http: http_client(config.timeout)?,
            base,
        })
    }

    fn endpoint(&self, path: &str) -> Resource {
        let mut resource = self.base.clone();
        resource.append_path(path);
        resource
    }

    fn object_endpoint(&self, bucket: &str, object: &str) -> Resource {
        let mut resource = self.endpoint("buckets");
        resource.append_segment(bucket).append_segment(object);
        resource
    }
}

fn transport(resource: &Resource, e: &reqwest::Error) -> Error {
    Error::Storage(format!("request to {resource} failed: {e}"))
}

/// Every failed upload is a storage error, whatever the status.
fn upload_failure(status: StatusCode, subject: &str, message: String) -> Error {
    match Error::storage_status(status, subject, message) {
        Error::Auth(m) => Error::Storage(format!("unauthorized: {m}")),
        Error::NotFound(m) => Error::Storage(m),
        Error::AlreadyExists(m) => Error::Storage(format!("{m} already exists")),
        e => e,
    }
}

#[async_trait]
impl StorageService for StorageClient {
    async fn login(&self, credentials: &Credentials) -> Result<Session> {
        let resource = self.endpoint("login");
        let response = self
            .http
            .post(resource.as_url().clone())
            .json(credentials)
            .send()
            .await
            .map_err(|e| transport(&resource, &e))?;

        if !response.status().is_success() {
            let (status, message) = failure_reply(response).await;
            return Err(Error::storage_status(status, "session", message));
        }
        let session: Session = response
            .json()
            .await
            .map_err(|e| Error::Auth(format!("malformed login reply: {e}")))?;
        tracing::debug!("logged in to {}", self.base);
        Ok(session)
    }

    async fn create_bucket(&self, session: &Session, name: &str) -> Result<Bucket> {
        let resource = self.endpoint("buckets");
        let response = self
            .http
            .post(resource.as_url().clone())
            .bearer_auth(&session.token)
            .json(&Bucket {
                name: name.to_owned(),
            })
            .send()
            .await
            .map_err(|e| transport(&resource, &e))?;

        if !response.status().is_success() {
            let (status, message) = failure_reply(response).await;
            return Err(Error::storage_status(
                status,
                &format!("bucket {name}"),
                message,
            ));
        }
        response
            .json()
            .await
            .map_err(|e| Error::Storage(format!("malformed bucket reply: {e}")))
    }

    async fn upload_file(
        &self,
        session: &Session,
        bucket: &str,
        object: &str,
        path: &Path,
        overwrite: bool,
    ) -> Result<()> {
        let mut resource = self.object_endpoint(bucket, object);
        resource.append_query("overwrite", if overwrite { "true" } else { "false" });

        let f = File::open(path)
            .await
            .map_err(|e| Error::Storage(format!("cannot open {}: {e}", path.display())))?;
        let stream = ReaderStream::new(f);
        let body = reqwest::Body::wrap_stream(stream);

        let response = self
            .http
            .put(resource.as_url().clone())
            .bearer_auth(&session.token)
            .body(body)
            .send()
            .await
            .map_err(|e| transport(&resource, &e))?;

        if !response.status().is_success() {
            let (status, message) = failure_reply(response).await;
            return Err(upload_failure(
                status,
                &format!("object {bucket}/{object}"),
                message,
            ));
        }
        tracing::info!(
            "file {} uploaded as {bucket}/{object}. Status: {}",
            path.display(),
            response.status()
        );
        Ok(())
    }

    async fn get_file(
        &self,
        session: &Session,
        bucket: &str,
        object: &str,
    ) -> Result<ContentRecord> {
        let resource = self.object_endpoint(bucket, object);
        let response = self
            .http
            .get(resource.as_url().clone())
            .bearer_auth(&session.token)
            .send()
            .await
            .map_err(|e| transport(&resource, &e))?;

        if !response.status().is_success() {
            let (status, message) = failure_reply(response).await;
            return Err(Error::storage_status(
                status,
                &format!("object {bucket}/{object}"),
                message,
            ));
        }
        response
            .json()
            .await
            .map_err(|e| Error::Storage(format!("malformed object reply: {e}")))
    }

    async fn get_gateway(&self, session: &Session) -> Result<String> {
        let resource = self.endpoint("gateway");
        let response = self
            .http
            .get(resource.as_url().clone())
            .bearer_auth(&session.token)
            .send()
            .await
            .map_err(|e| transport(&resource, &e))?;

        match response.status() {
            s if s.is_success() => {
                let gateway: Gateway = response
                    .json()
                    .await
                    .map_err(|e| Error::Storage(format!("malformed gateway reply: {e}")))?;
                Ok(gateway.gateway)
            }
            StatusCode::NOT_FOUND => {
                let (_, message) = failure_reply(response).await;
                Err(Error::Configuration(format!(
                    "no gateway configured for the account: {message}"
                )))
            }
            _ => {
                let (status, message) = failure_reply(response).await;
                Err(Error::storage_status(status, "gateway", message))
            }
        }
    }
}
