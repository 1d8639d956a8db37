#![warn(clippy::unwrap_in_result)]
#![warn(clippy::unwrap_used)]

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Path segment the retrieval gateway resolves content identifiers under.
pub const GATEWAY_PATH: &str = "ipfs";

/// Header carrying the metadata archive key.
pub const META_KEY_HEADER: &str = "x-meta-key";
/// Header carrying the metadata archive token.
pub const META_TOKEN_HEADER: &str = "x-meta-token";

/// Builds the public retrieval URL of a payload.
///
/// The result is `{gateway}/ipfs/{cid}` verbatim. Neither part is normalized, so a
/// gateway that ends with a slash produces a double slash exactly as the gateway
/// itself would expect it.
#[must_use]
pub fn retrieval_url(gateway: &str, payload_cid: &str) -> String {
    format!("{gateway}/{GATEWAY_PATH}/{payload_cid}")
}

/// Bearer token issued by the storage service on login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Session {
    pub token: String,
}

/// Storage login request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Credentials {
    pub api_key: String,
    /// Optional account (network) hint. Empty means the key's default account.
    #[serde(default)]
    pub account: String,
}

/// A storage bucket. Names are unique within the storage namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Bucket {
    pub name: String,
}

/// Metadata of one uploaded object.
///
/// Created by the storage service when an upload succeeds and never changed
/// afterwards. The payload content identifier is derived from the object bytes,
/// so two uploads of identical bytes share it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ContentRecord {
    /// Bucket containing the object
    pub bucket: String,
    /// Object name, unique within the bucket
    pub name: String,
    /// Content identifier of the object payload
    pub payload_cid: String,
    /// Payload size in bytes
    pub size: u64,
}

impl ContentRecord {
    /// Retrieval URL of this record behind the given gateway.
    #[must_use]
    pub fn retrieval_url(&self, gateway: &str) -> String {
        retrieval_url(gateway, &self.payload_cid)
    }
}

/// Base URL of the retrieval gateway configured for a storage account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Gateway {
    pub gateway: String,
}

/// Opaque identifier assigned by the archival service to one backup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct BackupId(String);

impl BackupId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BackupId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Payload of a backup request: where the archived content can be downloaded from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct IpfsData {
    pub download_url: String,
}

/// Answer of a backup request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BackupCreated {
    pub backup_id: BackupId,
}

/// One archived backup.
///
/// Several entries may share a dataset name. `sequence` grows with every backup the
/// archive registers and gives the creation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DatasetEntry {
    pub dataset: String,
    pub backup_id: BackupId,
    pub source_url: String,
    pub sequence: i64,
}

/// A page of backups recorded under one dataset name, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DatasetListing {
    pub dataset: String,
    pub offset: u64,
    pub limit: u64,
    /// Number of entries under the dataset name regardless of the page window
    pub total: u64,
    pub entries: Vec<DatasetEntry>,
}

impl DatasetListing {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Query window of a dataset listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Page {
    pub offset: u64,
    pub limit: u64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 10,
        }
    }
}

/// Outcome of rebuilding one dataset entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RebuildStatus {
    /// Content is available again under the given content identifier
    Restored { payload_cid: String },
    /// Content could not be restored
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RebuildOutcome {
    pub backup_id: BackupId,
    pub source_url: String,
    pub status: RebuildStatus,
}

impl RebuildOutcome {
    #[must_use]
    pub fn is_restored(&self) -> bool {
        matches!(self.status, RebuildStatus::Restored { .. })
    }
}

/// Outcomes of a rebuild, one per dataset entry found for the requested backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RebuildResult {
    pub backup_id: BackupId,
    pub dataset: String,
    pub outcomes: Vec<RebuildOutcome>,
}

impl RebuildResult {
    #[must_use]
    pub fn restored(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_restored()).count()
    }
}

/// Error body returned by both services.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorReply {
    pub error: String,
    pub status: u16,
}
