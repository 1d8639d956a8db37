//! Ingestion, archival and recovery chained into one run.
//!
//! A run walks `Init → BucketReady → Uploaded → InfoFetched → GatewayResolved →
//! Archived → Listed` and ends in `Rebuilt`, or in `Skipped` when the dataset
//! listing comes back empty. The first failing call stops the run; nothing done
//! before it is undone.

use std::fmt;
use std::path::PathBuf;

use kernel::{BackupId, ContentRecord, Credentials, DatasetListing, IpfsData, Page, RebuildResult};
use thiserror::Error;

use crate::archive::ArchiveClient;
use crate::config::WorkflowConfig;
use crate::error::{Error, Result};
use crate::service::{ArchiveService, StorageService};
use crate::storage::StorageClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Init,
    BucketReady,
    Uploaded,
    InfoFetched,
    GatewayResolved,
    Archived,
    Listed,
    Rebuilt,
    Skipped,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Run failure: the operation that failed and the last state reached before it.
#[derive(Debug, Error)]
#[error("{operation} failed after reaching {state}: {error}")]
pub struct WorkflowFailure {
    pub state: State,
    pub operation: &'static str,
    #[source]
    pub error: Error,
}

/// A local file to place into a bucket.
#[derive(Debug, Clone)]
pub struct FileJob {
    pub bucket: String,
    pub object: String,
    pub path: PathBuf,
    pub overwrite: bool,
}

impl FileJob {
    /// Job that stores `path` under its own file name, replacing an existing object.
    pub fn new(bucket: impl Into<String>, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let object = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                Error::InvalidInput(format!("{} has no usable file name", path.display()))
            })?;
        Ok(Self {
            bucket: bucket.into(),
            object: object_name(object)?,
            path,
            overwrite: true,
        })
    }

    pub fn with_object(mut self, object: &str) -> Result<Self> {
        self.object = object_name(object)?;
        Ok(self)
    }

    #[must_use]
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

/// Dot segments would be dropped from the request path.
fn object_name(name: &str) -> Result<String> {
    match name {
        "" | "." | ".." => Err(Error::InvalidInput(format!(
            "`{name}` is not a valid object name"
        ))),
        _ => Ok(name.to_owned()),
    }
}

/// Input of a whole run.
#[derive(Debug, Clone)]
pub struct RunJob {
    pub file: FileJob,
    pub dataset: String,
    pub page: Page,
}

/// Result of the ingestion stage.
#[derive(Debug, Clone)]
pub struct Ingested {
    pub record: ContentRecord,
    pub gateway: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct WorkflowReport {
    pub state: State,
    pub ingested: Ingested,
    pub backup_id: BackupId,
    pub listing: DatasetListing,
    /// `None` when the rebuild was skipped
    pub rebuild: Option<RebuildResult>,
}

struct Tracker {
    state: State,
}

impl Tracker {
    fn new() -> Self {
        Self { state: State::Init }
    }

    fn advance(&mut self, next: State, operation: &str) {
        if next != self.state {
            tracing::info!("{} -> {next} ({operation})", self.state);
            self.state = next;
        }
    }

    fn check<T>(
        &mut self,
        operation: &'static str,
        result: Result<T>,
        next: State,
    ) -> std::result::Result<T, WorkflowFailure> {
        match result {
            Ok(value) => {
                self.advance(next, operation);
                Ok(value)
            }
            Err(error) => {
                tracing::error!("{operation} failed in state {}: {error}", self.state);
                Err(WorkflowFailure {
                    state: self.state,
                    operation,
                    error,
                })
            }
        }
    }
}

/// Orchestrates a storage service and a metadata archive.
pub struct Workflow<S, A> {
    credentials: Credentials,
    storage: S,
    archive: A,
}

impl Workflow<StorageClient, ArchiveClient> {
    /// Workflow over the HTTP clients of both services.
    pub fn from_config(config: &WorkflowConfig) -> Result<Self> {
        let storage = StorageClient::new(&config.storage)?;
        let archive = ArchiveClient::new(&config.archive.key, &config.archive.token, &config.archive);
        Ok(Self::new(config.storage.credentials(), storage, archive))
    }
}

impl<S: StorageService, A: ArchiveService> Workflow<S, A> {
    pub fn new(credentials: Credentials, storage: S, archive: A) -> Self {
        Self {
            credentials,
            storage,
            archive,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn archive(&self) -> &A {
        &self.archive
    }

    /// Creates the bucket unless it is already there.
    pub async fn ensure_bucket(&self, session: &kernel::Session, name: &str) -> Result<()> {
        match self.storage.create_bucket(session, name).await {
            Ok(bucket) => {
                tracing::info!("bucket {} created", bucket.name);
                Ok(())
            }
            Err(Error::AlreadyExists(_)) => {
                tracing::info!("bucket {name} already exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Runs the ingestion stage alone.
    pub async fn ingest(&self, job: &FileJob) -> std::result::Result<Ingested, WorkflowFailure> {
        let mut tracker = Tracker::new();
        self.ingest_tracked(&mut tracker, job).await
    }

    async fn ingest_tracked(
        &self,
        tracker: &mut Tracker,
        job: &FileJob,
    ) -> std::result::Result<Ingested, WorkflowFailure> {
        let session = tracker.check(
            "login",
            self.storage.login(&self.credentials).await,
            State::Init,
        )?;
        tracker.check(
            "create bucket",
            self.ensure_bucket(&session, &job.bucket).await,
            State::BucketReady,
        )?;
        tracker.check(
            "upload",
            self.storage
                .upload_file(&session, &job.bucket, &job.object, &job.path, job.overwrite)
                .await,
            State::Uploaded,
        )?;
        let record = tracker.check(
            "get file",
            self.storage.get_file(&session, &job.bucket, &job.object).await,
            State::InfoFetched,
        )?;
        tracing::info!("uploaded info: {record:?}");
        let gateway = tracker.check(
            "get gateway",
            self.storage.get_gateway(&session).await,
            State::GatewayResolved,
        )?;

        let url = record.retrieval_url(&gateway);
        tracing::info!("download url: {url}");
        Ok(Ingested {
            record,
            gateway,
            url,
        })
    }

    /// Backs `url` up under `dataset`.
    pub async fn backup(&self, dataset: &str, url: &str) -> Result<BackupId> {
        let data = IpfsData {
            download_url: url.to_owned(),
        };
        let backup_id = self.archive.backup(dataset, &data).await?;
        tracing::info!("backup id: {backup_id}");
        Ok(backup_id)
    }

    pub async fn list(&self, dataset: &str, page: Page) -> Result<DatasetListing> {
        let listing = self.archive.list(dataset, page.offset, page.limit).await?;
        tracing::info!(
            "backup list of {dataset}: {} of {} entries",
            listing.entries.len(),
            listing.total
        );
        Ok(listing)
    }

    pub async fn rebuild(&self, backup_id: &BackupId) -> Result<RebuildResult> {
        let result = self.archive.rebuild(backup_id).await?;
        tracing::info!(
            "rebuild of {backup_id}: {} of {} entries restored",
            result.restored(),
            result.outcomes.len()
        );
        Ok(result)
    }

    /// Runs all stages. The rebuild targets the backup created by this run.
    pub async fn run(&self, job: &RunJob) -> std::result::Result<WorkflowReport, WorkflowFailure> {
        let mut tracker = Tracker::new();
        let ingested = self.ingest_tracked(&mut tracker, &job.file).await?;

        let backup_id = tracker.check(
            "backup",
            self.backup(&job.dataset, &ingested.url).await,
            State::Archived,
        )?;
        let listing = tracker.check(
            "list",
            self.list(&job.dataset, job.page).await,
            State::Listed,
        )?;

        let rebuild = if listing.is_empty() {
            tracing::info!("dataset {} has no backups", job.dataset);
            tracker.advance(State::Skipped, "rebuild");
            None
        } else {
            Some(tracker.check(
                "rebuild",
                self.rebuild(&backup_id).await,
                State::Rebuilt,
            )?)
        };

        Ok(WorkflowReport {
            state: tracker.state,
            ingested,
            backup_id,
            listing,
            rebuild,
        })
    }
}
