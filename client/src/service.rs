use std::path::Path;

use async_trait::async_trait;
use kernel::{
    BackupId, Bucket, ContentRecord, Credentials, DatasetListing, IpfsData, RebuildResult, Session,
};

use crate::error::Result;

/// Bucket storage with a content-addressed retrieval gateway.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Exchanges an API key for a session used by every other call.
    async fn login(&self, credentials: &Credentials) -> Result<Session>;

    /// Creates a bucket. Fails with [`crate::Error::AlreadyExists`] when the name is taken.
    async fn create_bucket(&self, session: &Session, name: &str) -> Result<Bucket>;

    /// Uploads a local file as `object` into `bucket`.
    ///
    /// With `overwrite` unset an existing object of the same name is a conflict.
    async fn upload_file(
        &self,
        session: &Session,
        bucket: &str,
        object: &str,
        path: &Path,
        overwrite: bool,
    ) -> Result<()>;

    async fn get_file(&self, session: &Session, bucket: &str, object: &str)
    -> Result<ContentRecord>;

    /// Base URL of the account's retrieval gateway.
    async fn get_gateway(&self, session: &Session) -> Result<String>;
}

/// Backup index of dataset content.
#[async_trait]
pub trait ArchiveService: Send + Sync {
    /// Registers a new backup under `dataset`. Never deduplicates.
    async fn backup(&self, dataset: &str, data: &IpfsData) -> Result<BackupId>;

    /// Page of backups recorded under `dataset`, oldest first.
    async fn list(&self, dataset: &str, offset: u64, limit: u64) -> Result<DatasetListing>;

    async fn rebuild(&self, backup_id: &BackupId) -> Result<RebuildResult>;
}
