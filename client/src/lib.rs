#![warn(clippy::unwrap_in_result)]
#![warn(clippy::unwrap_used)]

use std::time::Duration;

use kernel::ErrorReply;
use reqwest::{Client, Response, StatusCode};

pub mod archive;
pub mod config;
pub mod error;
pub mod resource;
pub mod service;
pub mod storage;
pub mod table;
pub mod workflow;

pub use archive::ArchiveClient;
pub use config::{MetaConf, StorageConfig, WorkflowConfig};
pub use error::{Error, Result};
pub use service::{ArchiveService, StorageService};
pub use storage::StorageClient;
pub use workflow::{FileJob, Ingested, RunJob, State, Workflow, WorkflowFailure, WorkflowReport};

fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Configuration(format!("HTTP client setup failed: {e}")))
}

/// Status and message of a failed reply. Services answer with an [`ErrorReply`]
/// body; anything else is passed on as plain text.
async fn failure_reply(response: Response) -> (StatusCode, String) {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorReply>(&text) {
        Ok(reply) => reply.error,
        Err(_) if text.is_empty() => status.to_string(),
        Err(_) => text,
    };
    (status, message)
}
