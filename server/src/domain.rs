use std::fmt::{Debug, Display};

use kernel::{
    BackupId, ContentRecord, DatasetEntry, DatasetListing, GATEWAY_PATH, RebuildOutcome,
    RebuildResult, RebuildStatus,
};

/// Result of storing an object.
#[derive(Debug)]
pub enum PutOutcome {
    Stored(ContentRecord),
    /// Object exists and overwriting was not requested
    Conflict,
    MissingBucket,
}

/// Persistence of the sandbox: buckets, content-addressed blobs, objects,
/// backups and login sessions.
pub trait Store {
    type Err: Debug + Display;

    fn new_database(&self) -> Result<(), Self::Err>;

    /// Records a new session token. Every login adds a row and sessions never
    /// expire, so the table grows for the lifetime of the sandbox database.
    fn open_session(&mut self, token: &str) -> Result<(), Self::Err>;

    fn has_session(&self, token: &str) -> Result<bool, Self::Err>;

    /// Returns `false` when the bucket already exists.
    fn create_bucket(&mut self, name: &str) -> Result<bool, Self::Err>;

    fn put_object(
        &mut self,
        bucket: &str,
        name: &str,
        data: Vec<u8>,
        overwrite: bool,
    ) -> Result<PutOutcome, Self::Err>;

    fn get_object(&self, bucket: &str, name: &str) -> Result<Option<ContentRecord>, Self::Err>;

    fn get_blob(&self, cid: &str) -> Result<Option<Vec<u8>>, Self::Err>;

    fn has_blob(&self, cid: &str) -> Result<bool, Self::Err>;

    fn add_backup(
        &mut self,
        backup_id: &BackupId,
        dataset: &str,
        source_url: &str,
    ) -> Result<DatasetEntry, Self::Err>;

    fn list_backups(
        &self,
        dataset: &str,
        offset: u64,
        limit: u64,
    ) -> Result<DatasetListing, Self::Err>;

    fn get_backup(&self, backup_id: &BackupId) -> Result<Option<DatasetEntry>, Self::Err>;

    /// All backups of a dataset, oldest first.
    fn dataset_backups(&self, dataset: &str) -> Result<Vec<DatasetEntry>, Self::Err>;
}

/// Content identifier a retrieval URL points at, i.e. what follows its last `/ipfs/`.
#[must_use]
pub fn cid_from_url(url: &str) -> Option<&str> {
    let marker = format!("/{GATEWAY_PATH}/");
    let ix = url.rfind(&marker)?;
    let cid = &url[ix + marker.len()..];
    if cid.is_empty() || cid.contains(['/', '?', '#']) {
        None
    } else {
        Some(cid)
    }
}

/// Rebuilds the dataset a backup belongs to.
///
/// Every backup of that dataset whose content the gateway still holds is restored.
/// Returns `None` for an unknown backup identifier.
pub fn rebuild<S: Store>(store: &S, backup_id: &BackupId) -> Result<Option<RebuildResult>, S::Err> {
    let Some(backup) = store.get_backup(backup_id)? else {
        return Ok(None);
    };

    let mut outcomes = Vec::new();
    for entry in store.dataset_backups(&backup.dataset)? {
        let status = match cid_from_url(&entry.source_url) {
            Some(cid) if store.has_blob(cid)? => RebuildStatus::Restored {
                payload_cid: cid.to_owned(),
            },
            Some(cid) => RebuildStatus::Failed {
                reason: format!("content {cid} is not held by the gateway"),
            },
            None => RebuildStatus::Failed {
                reason: "source url has no content identifier".to_owned(),
            },
        };
        outcomes.push(RebuildOutcome {
            backup_id: entry.backup_id,
            source_url: entry.source_url,
            status,
        });
    }

    Ok(Some(RebuildResult {
        backup_id: backup_id.clone(),
        dataset: backup.dataset,
        outcomes,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("https://gw.example/ipfs/cidX", Some("cidX"))]
    #[case("http://localhost:5000/ipfs/af13", Some("af13"))]
    #[case("https://gw.example/ipfs/a/ipfs/b", Some("b"))]
    #[case("https://gw.example/ipfs/", None)]
    #[case("https://gw.example/ipfs/cid/file", None)]
    #[case("https://gw.example/cidX", None)]
    #[case("", None)]
    #[trace]
    fn cid_from_url_tests(#[case] url: &str, #[case] expected: Option<&str>) {
        // Act
        let cid = cid_from_url(url);

        // Assert
        assert_eq!(cid, expected);
    }
}
