use reqwest::StatusCode;
use thiserror::Error;

/// Failures of the storage and archive clients.
///
/// Every variant is fatal to a workflow run: callers stop at the first one.
#[derive(Debug, Error)]
pub enum Error {
    /// Credentials were rejected by the storage service
    #[error("authentication failed: {0}")]
    Auth(String),

    /// A bucket or object operation failed
    #[error("storage operation failed: {0}")]
    Storage(String),

    /// A storage name conflict: the bucket or object is already there
    #[error("storage operation failed: {0} already exists")]
    AlreadyExists(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Gateway or service address is missing or malformed
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("archival service error: {0}")]
    ArchivalService(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Storage failures including name conflicts.
    #[must_use]
    pub fn is_storage(&self) -> bool {
        matches!(self, Error::Storage(_) | Error::AlreadyExists(_))
    }

    /// Maps a failed storage reply. `subject` names the bucket or object a conflict is about.
    pub(crate) fn storage_status(status: StatusCode, subject: &str, message: String) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Auth(message),
            StatusCode::NOT_FOUND => Error::NotFound(message),
            StatusCode::CONFLICT => Error::AlreadyExists(subject.to_owned()),
            _ => Error::Storage(format!("{status}: {message}")),
        }
    }

    pub(crate) fn archive_status(status: StatusCode, message: String) -> Self {
        Error::ArchivalService(format!("{status}: {message}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(StatusCode::UNAUTHORIZED, "Auth")]
    #[case(StatusCode::FORBIDDEN, "Auth")]
    #[case(StatusCode::NOT_FOUND, "NotFound")]
    #[case(StatusCode::CONFLICT, "AlreadyExists")]
    #[case(StatusCode::INTERNAL_SERVER_ERROR, "Storage")]
    #[case(StatusCode::BAD_REQUEST, "Storage")]
    #[trace]
    fn storage_status_mapping(#[case] status: StatusCode, #[case] expected: &str) {
        // Arrange

        // Act
        let err = Error::storage_status(status, "bucket b1", "x".to_owned());

        // Assert
        let kind = format!("{err:?}");
        assert!(kind.starts_with(expected), "{kind}");
    }

    #[rstest]
    #[case(StatusCode::UNAUTHORIZED)]
    #[case(StatusCode::NOT_FOUND)]
    #[case(StatusCode::BAD_GATEWAY)]
    fn archive_status_is_always_service_error(#[case] status: StatusCode) {
        // Act
        let err = Error::archive_status(status, "x".to_owned());

        // Assert
        assert!(matches!(err, Error::ArchivalService(_)));
    }

    #[test]
    fn conflict_counts_as_storage_failure() {
        // Arrange
        let err = Error::AlreadyExists("bucket b1".to_owned());

        // Act
        let storage = err.is_storage();

        // Assert
        assert!(storage);
        assert_eq!(
            err.to_string(),
            "storage operation failed: bucket b1 already exists"
        );
    }
}
