#![allow(clippy::unused_async)]
use crate::content_reply::ContentReply;
use crate::domain::{self, PutOutcome, Store};
use crate::error::ApiError;
use crate::sqlite::{Mode, Sqlite};
use crate::AppState;
use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::{extract::Path, http::StatusCode};
use futures::{Stream, TryStreamExt};
use futures_util::StreamExt;
use kernel::{
    BackupCreated, BackupId, Bucket, ContentRecord, Credentials, DatasetListing, ErrorReply,
    Gateway, IpfsData, META_KEY_HEADER, META_TOKEN_HEADER, RebuildResult, Session,
};
use serde::Deserialize;
use std::io;
use std::path::Path as FsPath;
use std::time::Instant;
use tokio_util::io::StreamReader;
use utoipa::IntoParams;
use uuid::Uuid;

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UploadParams {
    /// Replace an existing object of the same name
    #[serde(default)]
    overwrite: bool,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListParams {
    /// Number of entries to skip
    #[serde(default)]
    offset: u64,
    /// Maximum number of entries returned, greater than zero
    #[serde(default = "default_limit")]
    limit: u64,
}

fn default_limit() -> u64 {
    10
}

/// Exchanges an API key for a session token.
#[utoipa::path(
    post,
    path = "/api/v1/login",
    tag = "storage",
    request_body = Credentials,
    responses(
        (status = 200, description = "Logged in", body = Session),
        (status = 401, description = "Unknown API key", body = ErrorReply)
    ),
)]
pub async fn login(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> Result<impl IntoResponse, ApiError> {
    if credentials.api_key != state.settings.api_key {
        tracing::error!("login with an unknown api key refused");
        return Err(ApiError::unauthorized("invalid api key"));
    }
    let token = Uuid::new_v4().to_string();
    execute(&state.db, Mode::ReadWrite, |mut repository| {
        repository.open_session(&token)?;
        Ok(())
    })?;
    tracing::info!("session opened for account '{}'", credentials.account);
    Ok(Json(Session { token }))
}

/// Creates a bucket.
#[utoipa::path(
    post,
    path = "/api/v1/buckets",
    tag = "storage",
    request_body = Bucket,
    responses(
        (status = 201, description = "Bucket created", body = Bucket),
        (status = 401, description = "No valid session", body = ErrorReply),
        (status = 409, description = "Bucket already exists", body = ErrorReply)
    ),
)]
pub async fn create_bucket(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(bucket): Json<Bucket>,
) -> Result<impl IntoResponse, ApiError> {
    if bucket.name.trim().is_empty() {
        return Err(ApiError::bad_request("bucket name must not be empty"));
    }
    execute(&state.db, Mode::ReadWrite, move |mut repository| {
        authorize_session(&repository, &headers)?;
        if repository.create_bucket(&bucket.name)? {
            tracing::info!("create bucket: {}", bucket.name);
            Ok((StatusCode::CREATED, Json(bucket)))
        } else {
            Err(ApiError::conflict(format!(
                "bucket `{}` already exists",
                bucket.name
            )))
        }
    })
}

/// Uploads an object into a bucket.
#[utoipa::path(
    put,
    path = "/api/v1/buckets/{bucket}/{object}",
    tag = "storage",
    request_body(content = String, content_type = "application/octet-stream", description = "Object bytes"),
    responses(
        (status = 201, description = "Object stored", body = ContentRecord),
        (status = 401, description = "No valid session", body = ErrorReply),
        (status = 404, description = "Bucket not found", body = ErrorReply),
        (status = 409, description = "Object exists and overwrite was not requested", body = ErrorReply)
    ),
    params(
        ("bucket" = String, Path, description = "Bucket name"),
        ("object" = String, Path, description = "Object name inside bucket")
    ),
)]
pub async fn put_object(
    Path((bucket, object)): Path<(String, String)>,
    Query(params): Query<UploadParams>,
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, ApiError> {
    execute(&state.db, Mode::ReadOnly, |repository| {
        authorize_session(&repository, &headers)
    })?;

    let (data, read_bytes) = read_from_stream(body.into_data_stream()).await?;

    execute(&state.db, Mode::ReadWrite, move |mut repository| {
        match repository.put_object(&bucket, &object, data, params.overwrite)? {
            PutOutcome::Stored(record) => {
                tracing::info!(
                    "object: {bucket}/{object} read: {read_bytes} cid: {}",
                    record.payload_cid
                );
                Ok((StatusCode::CREATED, Json(record)))
            }
            PutOutcome::Conflict => Err(ApiError::conflict(format!(
                "object `{object}` already exists in bucket `{bucket}`"
            ))),
            PutOutcome::MissingBucket => {
                Err(ApiError::not_found(format!("bucket `{bucket}` not found")))
            }
        }
    })
}

/// Gets object metadata.
#[utoipa::path(
    get,
    path = "/api/v1/buckets/{bucket}/{object}",
    tag = "storage",
    responses(
        (status = 200, description = "Object found", body = ContentRecord),
        (status = 401, description = "No valid session", body = ErrorReply),
        (status = 404, description = "Object not found", body = ErrorReply)
    ),
    params(
        ("bucket" = String, Path, description = "Bucket name"),
        ("object" = String, Path, description = "Object name inside bucket")
    ),
)]
pub async fn get_object(
    Path((bucket, object)): Path<(String, String)>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    execute(&state.db, Mode::ReadOnly, move |repository| {
        authorize_session(&repository, &headers)?;
        repository
            .get_object(&bucket, &object)?
            .map(Json)
            .ok_or_else(|| {
                ApiError::not_found(format!("object `{object}` not found in bucket `{bucket}`"))
            })
    })
}

/// Gets the account's retrieval gateway.
#[utoipa::path(
    get,
    path = "/api/v1/gateway",
    tag = "storage",
    responses(
        (status = 200, description = "Gateway configured", body = Gateway),
        (status = 401, description = "No valid session", body = ErrorReply),
        (status = 404, description = "No gateway configured", body = ErrorReply)
    ),
)]
pub async fn get_gateway(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    execute(&state.db, Mode::ReadOnly, |repository| {
        authorize_session(&repository, &headers)
    })?;
    state
        .settings
        .gateway
        .clone()
        .map(|gateway| Json(Gateway { gateway }))
        .ok_or_else(|| ApiError::not_found("no gateway configured"))
}

/// Gets payload bytes by content identifier.
#[utoipa::path(
    get,
    path = "/ipfs/{cid}",
    tag = "gateway",
    responses(
        (status = 200, description = "Payload bytes"),
        (status = 404, description = "Content not found", body = ErrorReply)
    ),
    params(
        ("cid" = String, Path, description = "Payload content identifier")
    ),
)]
pub async fn get_content(
    Path(cid): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    execute(&state.db, Mode::ReadOnly, move |repository| {
        let data = repository
            .get_blob(&cid)?
            .ok_or_else(|| ApiError::not_found(format!("content `{cid}` not found")))?;
        tracing::info!("content {cid} size {}", data.len());
        Ok(ContentReply::new(data, cid))
    })
}

/// Registers a backup of downloadable content under a dataset.
#[utoipa::path(
    post,
    path = "/meta/v1/datasets/{dataset}/backups",
    tag = "archive",
    request_body = IpfsData,
    responses(
        (status = 201, description = "Backup created", body = BackupCreated),
        (status = 400, description = "No download url", body = ErrorReply),
        (status = 401, description = "Bad key or token", body = ErrorReply)
    ),
    params(
        ("dataset" = String, Path, description = "Dataset name")
    ),
)]
pub async fn create_backup(
    Path(dataset): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(data): Json<IpfsData>,
) -> Result<impl IntoResponse, ApiError> {
    authorize_archive(&state, &headers)?;
    if data.download_url.is_empty() {
        return Err(ApiError::bad_request("download url must not be empty"));
    }
    let backup_id = BackupId::new(Uuid::new_v4().to_string());
    execute(&state.db, Mode::ReadWrite, move |mut repository| {
        let entry = repository.add_backup(&backup_id, &dataset, &data.download_url)?;
        tracing::info!(
            "dataset: {dataset} backup: {} sequence: {}",
            entry.backup_id,
            entry.sequence
        );
        Ok((
            StatusCode::CREATED,
            Json(BackupCreated {
                backup_id: entry.backup_id,
            }),
        ))
    })
}

/// Lists the backups of a dataset, oldest first.
#[utoipa::path(
    get,
    path = "/meta/v1/datasets/{dataset}/backups",
    tag = "archive",
    responses(
        (status = 200, description = "Page of backups, possibly empty", body = DatasetListing),
        (status = 400, description = "Zero limit", body = ErrorReply),
        (status = 401, description = "Bad key or token", body = ErrorReply)
    ),
    params(
        ("dataset" = String, Path, description = "Dataset name")
    ),
)]
pub async fn list_backups(
    Path(dataset): Path<String>,
    Query(params): Query<ListParams>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<DatasetListing>, ApiError> {
    authorize_archive(&state, &headers)?;
    if params.limit == 0 {
        return Err(ApiError::bad_request("limit must be greater than zero"));
    }
    execute(&state.db, Mode::ReadOnly, move |repository| {
        let listing = repository.list_backups(&dataset, params.offset, params.limit)?;
        Ok(Json(listing))
    })
}

/// Rebuilds the dataset a backup belongs to.
#[utoipa::path(
    post,
    path = "/meta/v1/backups/{backup_id}/rebuild",
    tag = "archive",
    responses(
        (status = 200, description = "Rebuild outcomes", body = RebuildResult),
        (status = 401, description = "Bad key or token", body = ErrorReply),
        (status = 404, description = "Unknown backup", body = ErrorReply)
    ),
    params(
        ("backup_id" = String, Path, description = "Backup identifier")
    ),
)]
pub async fn rebuild(
    Path(backup_id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<RebuildResult>, ApiError> {
    authorize_archive(&state, &headers)?;
    let backup_id = BackupId::new(backup_id);
    execute(&state.db, Mode::ReadOnly, move |repository| {
        let result = domain::rebuild(&repository, &backup_id)?
            .ok_or_else(|| ApiError::not_found(format!("backup `{backup_id}` not found")))?;
        tracing::info!(
            "rebuild of {backup_id}: {} of {} restored",
            result.restored(),
            result.outcomes.len()
        );
        Ok(Json(result))
    })
}

fn authorize_session<S: Store>(repository: &S, headers: &HeaderMap) -> Result<(), ApiError>
where
    ApiError: From<S::Err>,
{
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::unauthorized("missing bearer token"))?;
    if repository.has_session(token)? {
        Ok(())
    } else {
        Err(ApiError::unauthorized("unknown session"))
    }
}

fn authorize_archive(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let settings = &state.settings;
    if header(META_KEY_HEADER) == Some(settings.meta_key.as_str())
        && header(META_TOKEN_HEADER) == Some(settings.meta_token.as_str())
    {
        Ok(())
    } else {
        tracing::error!("archive request with bad credentials refused");
        Err(ApiError::unauthorized("invalid key or token"))
    }
}

fn execute<F, R>(db: &FsPath, mode: Mode, action: F) -> Result<R, ApiError>
where
    F: FnOnce(Sqlite) -> Result<R, ApiError>,
{
    let start = Instant::now();
    let repository = Sqlite::open(db, mode).map_err(|e| {
        tracing::error!("{e}");
        ApiError::from(e)
    })?;
    let res = action(repository);
    let duration = start.elapsed();
    tracing::debug!("DB query time: {:?}", duration);
    res
}

async fn read_from_stream<S, E>(stream: S) -> io::Result<(Vec<u8>, usize)>
where
    S: Stream<Item = Result<Bytes, E>> + StreamExt,
    E: Sync + std::error::Error + Send + 'static,
{
    // Convert the stream into an `AsyncRead`.
    let body_with_io_error = stream.map_err(io::Error::other);
    let body_reader = StreamReader::new(body_with_io_error);
    futures::pin_mut!(body_reader);
    let mut buffer = Vec::new();

    let copied_bytes = tokio::io::copy(&mut body_reader, &mut buffer).await?;
    let copied_bytes = usize::try_from(copied_bytes).unwrap_or(usize::MAX);
    Ok((buffer, copied_bytes))
}
