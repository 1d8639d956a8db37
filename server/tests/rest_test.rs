use futures::channel::oneshot;
use futures::channel::oneshot::Sender;
use kernel::{
    BackupCreated, ContentRecord, DatasetListing, ErrorReply, Gateway, META_KEY_HEADER,
    META_TOKEN_HEADER, RebuildResult, RebuildStatus, Session,
};
use rand::Rng;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::json;
use serial_test::serial;
use server::Settings;
use std::{env, path::PathBuf};
use test_context::{AsyncTestContext, test_context};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ\
                            abcdefghijklmnopqrstuvwxyz\
                            0123456789_";
const DB_LEN: usize = 20;
const API_KEY: &str = "key-1";
const META_KEY: &str = "meta-key";
const META_TOKEN: &str = "meta-token";

struct SandboxAsyncContext {
    db: PathBuf,
    base: String,
    client: Client,
    shutdown: Sender<()>,
    join: JoinHandle<()>,
}

impl SandboxAsyncContext {
    async fn remove_db(db_path: PathBuf) {
        tokio::fs::remove_file(db_path.clone())
            .await
            .unwrap_or_default();
        let base_db_file = db_path.as_os_str().to_str().unwrap().to_owned();
        let shm_file = base_db_file.clone() + "-shm";
        let wal_file = base_db_file + "-wal";
        tokio::fs::remove_file(shm_file).await.unwrap_or_default();
        tokio::fs::remove_file(wal_file).await.unwrap_or_default();
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base)
    }

    fn archive(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header(META_KEY_HEADER, META_KEY)
            .header(META_TOKEN_HEADER, META_TOKEN)
    }

    async fn login(&self) -> String {
        let session: Session = self
            .client
            .post(self.url("api/v1/login"))
            .json(&json!({ "api_key": API_KEY, "account": "0xabc" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        session.token
    }

    async fn create_bucket(&self, token: &str, name: &str) -> StatusCode {
        self.client
            .post(self.url("api/v1/buckets"))
            .bearer_auth(token)
            .json(&json!({ "name": name }))
            .send()
            .await
            .unwrap()
            .status()
    }

    async fn upload(
        &self,
        token: &str,
        bucket: &str,
        object: &str,
        data: &'static [u8],
    ) -> ContentRecord {
        let uri = self.url(&format!("api/v1/buckets/{bucket}/{object}?overwrite=true"));
        let response = self
            .client
            .put(uri)
            .bearer_auth(token)
            .body(data)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        response.json().await.unwrap()
    }

    async fn backup(&self, dataset: &str, url: &str) -> BackupCreated {
        let response = self
            .archive(
                self.client
                    .post(self.url(&format!("meta/v1/datasets/{dataset}/backups"))),
            )
            .json(&json!({ "download_url": url }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        response.json().await.unwrap()
    }
}

impl AsyncTestContext for SandboxAsyncContext {
    async fn setup() -> SandboxAsyncContext {
        let db_file: String = (10..DB_LEN)
            .map(|_| {
                let idx = rand::thread_rng().gen_range(0..CHARSET.len());
                CHARSET[idx] as char
            })
            .collect();

        let db = env::temp_dir().join(db_file + ".db");
        if db.exists() {
            SandboxAsyncContext::remove_db(db.clone()).await;
        }
        server::init_database(&db).expect("Database file cannot be created");

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let base = format!("http://localhost:{port}");

        let settings = Settings {
            api_key: API_KEY.to_owned(),
            meta_key: META_KEY.to_owned(),
            meta_token: META_TOKEN.to_owned(),
            gateway: Some(base.clone()),
        };

        let (send, recv) = oneshot::channel::<()>();

        let cloned_db = db.clone();
        let task = tokio::spawn(async move {
            server::serve(listener, cloned_db, settings, async {
                recv.await.unwrap_or_default();
            })
            .await
            .unwrap();
        });

        SandboxAsyncContext {
            db,
            base,
            client: Client::new(),
            shutdown: send,
            join: task,
        }
    }

    async fn teardown(self) {
        self.shutdown.send(()).unwrap_or_default();
        self.join.await.unwrap_or_default();
        SandboxAsyncContext::remove_db(self.db).await;
    }
}

#[test_context(SandboxAsyncContext)]
#[tokio::test]
#[serial]
async fn login_with_known_key(ctx: &mut SandboxAsyncContext) {
    // Arrange

    // Act
    let token = ctx.login().await;

    // Assert
    assert!(!token.is_empty());
}

#[test_context(SandboxAsyncContext)]
#[tokio::test]
#[serial]
async fn login_with_unknown_key(ctx: &mut SandboxAsyncContext) {
    // Arrange
    let uri = ctx.url("api/v1/login");

    // Act
    let response = ctx
        .client
        .post(uri)
        .json(&json!({ "api_key": "nope" }))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let reply: ErrorReply = response.json().await.unwrap();
    assert_eq!(reply.status, 401);
}

#[test_context(SandboxAsyncContext)]
#[tokio::test]
#[serial]
async fn create_bucket_twice(ctx: &mut SandboxAsyncContext) {
    // Arrange
    let token = ctx.login().await;

    // Act
    let first = ctx.create_bucket(&token, "b1").await;
    let second = ctx.create_bucket(&token, "b1").await;

    // Assert
    assert_eq!(first, StatusCode::CREATED);
    assert_eq!(second, StatusCode::CONFLICT);
}

#[test_context(SandboxAsyncContext)]
#[tokio::test]
#[serial]
async fn create_bucket_without_session(ctx: &mut SandboxAsyncContext) {
    // Arrange

    // Act
    let status = ctx.create_bucket("unknown-token", "b1").await;

    // Assert
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[test_context(SandboxAsyncContext)]
#[tokio::test]
#[serial]
async fn upload_then_get_object_and_content(ctx: &mut SandboxAsyncContext) {
    // Arrange
    let token = ctx.login().await;
    ctx.create_bucket(&token, "b1").await;
    let expected_cid = blake3::hash(b"hello").to_hex().to_string();

    // Act
    let uploaded = ctx.upload(&token, "b1", "report.txt", b"hello").await;
    let record: ContentRecord = ctx
        .client
        .get(ctx.url("api/v1/buckets/b1/report.txt"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let gateway: Gateway = ctx
        .client
        .get(ctx.url("api/v1/gateway"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let content = ctx
        .client
        .get(record.retrieval_url(&gateway.gateway))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(uploaded.payload_cid, expected_cid);
    assert_eq!(record.payload_cid, expected_cid);
    assert_eq!(record.size, 5);
    assert_eq!(gateway.gateway, ctx.base);
    assert_eq!(content.status(), StatusCode::OK);
    assert_eq!(content.bytes().await.unwrap().as_ref(), b"hello");
}

#[test_context(SandboxAsyncContext)]
#[tokio::test]
#[serial]
async fn upload_into_missing_bucket(ctx: &mut SandboxAsyncContext) {
    // Arrange
    let token = ctx.login().await;

    // Act
    let response = ctx
        .client
        .put(ctx.url("api/v1/buckets/nope/report.txt"))
        .bearer_auth(&token)
        .body("hello")
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[test_context(SandboxAsyncContext)]
#[tokio::test]
#[serial]
async fn upload_without_overwrite_conflicts(ctx: &mut SandboxAsyncContext) {
    // Arrange
    let token = ctx.login().await;
    ctx.create_bucket(&token, "b1").await;
    ctx.upload(&token, "b1", "report.txt", b"hello").await;

    // Act
    let response = ctx
        .client
        .put(ctx.url("api/v1/buckets/b1/report.txt"))
        .bearer_auth(&token)
        .body("other")
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[test_context(SandboxAsyncContext)]
#[tokio::test]
#[serial]
async fn get_missing_content(ctx: &mut SandboxAsyncContext) {
    // Arrange

    // Act
    let response = ctx.client.get(ctx.url("ipfs/nope")).send().await.unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[test_context(SandboxAsyncContext)]
#[tokio::test]
#[serial]
async fn backup_list_and_rebuild(ctx: &mut SandboxAsyncContext) {
    // Arrange
    let token = ctx.login().await;
    ctx.create_bucket(&token, "b1").await;
    let record = ctx.upload(&token, "b1", "report.txt", b"hello").await;
    let url = record.retrieval_url(&ctx.base);

    // Act
    let first = ctx.backup("ds1", &url).await;
    let second = ctx.backup("ds1", "https://gw.example/ipfs/missing").await;
    let listing: DatasetListing = ctx
        .archive(
            ctx.client
                .get(ctx.url("meta/v1/datasets/ds1/backups?offset=0&limit=10")),
        )
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let rebuilt: RebuildResult = ctx
        .archive(ctx.client.post(ctx.url(&format!(
            "meta/v1/backups/{}/rebuild",
            first.backup_id
        ))))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    // Assert
    assert_ne!(first.backup_id, second.backup_id);
    assert_eq!(listing.total, 2);
    assert_eq!(listing.entries.len(), 2);
    assert_eq!(listing.entries[0].backup_id, first.backup_id);
    assert_eq!(listing.entries[0].source_url, url);
    assert_eq!(rebuilt.dataset, "ds1");
    assert_eq!(rebuilt.outcomes.len(), 2);
    assert_eq!(rebuilt.restored(), 1);
    assert_eq!(
        rebuilt.outcomes[0].status,
        RebuildStatus::Restored {
            payload_cid: record.payload_cid
        }
    );
}

#[test_context(SandboxAsyncContext)]
#[tokio::test]
#[serial]
async fn list_unknown_dataset_is_empty(ctx: &mut SandboxAsyncContext) {
    // Arrange

    // Act
    let listing: DatasetListing = ctx
        .archive(ctx.client.get(ctx.url("meta/v1/datasets/nope/backups")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    // Assert
    assert!(listing.is_empty());
    assert_eq!(listing.total, 0);
    assert_eq!(listing.limit, 10);
}

#[test_context(SandboxAsyncContext)]
#[tokio::test]
#[serial]
async fn list_with_zero_limit(ctx: &mut SandboxAsyncContext) {
    // Arrange

    // Act
    let response = ctx
        .archive(
            ctx.client
                .get(ctx.url("meta/v1/datasets/ds1/backups?limit=0")),
        )
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[test_context(SandboxAsyncContext)]
#[tokio::test]
#[serial]
async fn archive_with_bad_token(ctx: &mut SandboxAsyncContext) {
    // Arrange

    // Act
    let response = ctx
        .client
        .get(ctx.url("meta/v1/datasets/ds1/backups"))
        .header(META_KEY_HEADER, META_KEY)
        .header(META_TOKEN_HEADER, "wrong")
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[test_context(SandboxAsyncContext)]
#[tokio::test]
#[serial]
async fn rebuild_unknown_backup(ctx: &mut SandboxAsyncContext) {
    // Arrange

    // Act
    let response = ctx
        .archive(ctx.client.post(ctx.url("meta/v1/backups/nope/rebuild")))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[test_context(SandboxAsyncContext)]
#[tokio::test]
#[serial]
async fn openapi_document_is_served(ctx: &mut SandboxAsyncContext) {
    // Arrange

    // Act
    let doc: serde_json::Value = ctx
        .client
        .get(ctx.url("api-docs/openapi.json"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    // Assert
    assert!(doc["paths"]["/api/v1/login"].is_object());
    assert!(doc["paths"]["/meta/v1/backups/{backup_id}/rebuild"].is_object());
}

#[test_context(SandboxAsyncContext)]
#[tokio::test]
#[serial]
async fn gateway_missing_when_not_configured(ctx: &mut SandboxAsyncContext) {
    // Arrange
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://localhost:{}", listener.local_addr().unwrap().port());
    let settings = Settings {
        api_key: API_KEY.to_owned(),
        meta_key: META_KEY.to_owned(),
        meta_token: META_TOKEN.to_owned(),
        gateway: None,
    };
    let (send, recv) = oneshot::channel::<()>();
    let db = ctx.db.clone();
    let task = tokio::spawn(async move {
        server::serve(listener, db, settings, async {
            recv.await.unwrap_or_default();
        })
        .await
        .unwrap();
    });
    let session: Session = ctx
        .client
        .post(format!("{base}/api/v1/login"))
        .json(&json!({ "api_key": API_KEY }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    // Act
    let response = ctx
        .client
        .get(format!("{base}/api/v1/gateway"))
        .bearer_auth(&session.token)
        .send()
        .await
        .unwrap();

    // Assert
    let status = response.status();
    let reply: ErrorReply = response.json().await.unwrap();
    send.send(()).unwrap_or_default();
    task.await.unwrap_or_default();
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(reply.status, 404);
}

#[test_context(SandboxAsyncContext)]
#[tokio::test]
#[serial]
async fn every_login_opens_a_usable_session(ctx: &mut SandboxAsyncContext) {
    // Arrange
    let first = ctx.login().await;

    // Act
    let second = ctx.login().await;

    // Assert
    assert_ne!(first, second);
    assert_eq!(ctx.create_bucket(&first, "b1").await, StatusCode::CREATED);
    assert_eq!(ctx.create_bucket(&second, "b2").await, StatusCode::CREATED);
}
