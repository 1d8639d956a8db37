use std::path::Path;

use kernel::{BackupId, ContentRecord, DatasetEntry, DatasetListing};
use rusqlite::{params, Connection, Error, OpenFlags, OptionalExtension, Row};

use crate::domain::{PutOutcome, Store};

const CACHE_SIZE: &str = "4096";

pub enum Mode {
    ReadWrite,
    ReadOnly,
}

pub struct Sqlite {
    conn: Connection,
}

impl Store for Sqlite {
    type Err = Error;

    fn new_database(&self) -> Result<(), Self::Err> {
        self.pragma_update("encoding", "UTF-8")?;

        self.conn.execute_batch(
            "CREATE TABLE blob (
                  blake3_hash    TEXT PRIMARY KEY,
                  data           BLOB NOT NULL
                  );
             CREATE TABLE bucket (
                  name           TEXT PRIMARY KEY
                  );
             CREATE TABLE object (
                  id           INTEGER PRIMARY KEY AUTOINCREMENT,
                  bucket       TEXT NOT NULL REFERENCES bucket(name) ON DELETE RESTRICT ON UPDATE RESTRICT,
                  name         TEXT NOT NULL,
                  blake3_hash  TEXT NOT NULL REFERENCES blob(blake3_hash) ON DELETE RESTRICT ON UPDATE RESTRICT,
                  size         INTEGER NOT NULL
                  );
             CREATE UNIQUE INDEX unique_bucket_object_ix ON object(bucket, name);
             CREATE TABLE backup (
                  sequence     INTEGER PRIMARY KEY AUTOINCREMENT,
                  backup_id    TEXT NOT NULL UNIQUE,
                  dataset      TEXT NOT NULL,
                  source_url   TEXT NOT NULL
                  );
             CREATE INDEX backup_dataset_ix ON backup(dataset, sequence);
             CREATE TABLE session (
                  token        TEXT PRIMARY KEY
                  );",
        )?;

        Ok(())
    }

    fn open_session(&mut self, token: &str) -> Result<(), Self::Err> {
        self.conn
            .execute("INSERT INTO session (token) VALUES (?1)", params![token])?;
        Ok(())
    }

    fn has_session(&self, token: &str) -> Result<bool, Self::Err> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT token FROM session WHERE token = ?1")?;
        stmt.exists(params![token])
    }

    fn create_bucket(&mut self, name: &str) -> Result<bool, Self::Err> {
        let inserted = self
            .conn
            .execute("INSERT OR IGNORE INTO bucket (name) VALUES (?1)", params![name])?;
        Ok(inserted > 0)
    }

    fn put_object(
        &mut self,
        bucket: &str,
        name: &str,
        data: Vec<u8>,
        overwrite: bool,
    ) -> Result<PutOutcome, Self::Err> {
        self.assign_cache_size()?;
        self.enable_foreign_keys()?;
        self.pragma_update("synchronous", "FULL")?;

        let hash = blake3::hash(&data).to_string();
        let size = data.len() as u64;

        let tx = self.conn.transaction()?;

        let bucket_exists = tx
            .prepare_cached("SELECT name FROM bucket WHERE name = ?1")?
            .exists(params![bucket])?;
        if !bucket_exists {
            return Ok(PutOutcome::MissingBucket);
        }

        let object_exists = tx
            .prepare_cached("SELECT id FROM object WHERE bucket = ?1 AND name = ?2")?
            .exists(params![bucket, name])?;
        if object_exists && !overwrite {
            return Ok(PutOutcome::Conflict);
        }

        tx.execute(
            "INSERT OR IGNORE INTO blob (blake3_hash, data) VALUES (?1, ?2)",
            params![&hash, data],
        )?;
        tx.execute(
            "INSERT INTO object (bucket, name, blake3_hash, size) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(bucket, name) DO UPDATE SET blake3_hash = excluded.blake3_hash, size = excluded.size",
            params![bucket, name, &hash, clamp(size)],
        )?;

        tx.commit()?;

        Ok(PutOutcome::Stored(ContentRecord {
            bucket: bucket.to_owned(),
            name: name.to_owned(),
            payload_cid: hash,
            size,
        }))
    }

    fn get_object(&self, bucket: &str, name: &str) -> Result<Option<ContentRecord>, Self::Err> {
        self.conn
            .query_row(
                "SELECT bucket, name, blake3_hash, size FROM object WHERE bucket = ?1 AND name = ?2",
                params![bucket, name],
                |row| {
                    let size: i64 = row.get(3)?;
                    Ok(ContentRecord {
                        bucket: row.get(0)?,
                        name: row.get(1)?,
                        payload_cid: row.get(2)?,
                        size: u64::try_from(size).unwrap_or_default(),
                    })
                },
            )
            .optional()
    }

    fn get_blob(&self, cid: &str) -> Result<Option<Vec<u8>>, Self::Err> {
        self.conn
            .query_row(
                "SELECT data FROM blob WHERE blake3_hash = ?1",
                params![cid],
                |row| row.get(0),
            )
            .optional()
    }

    fn has_blob(&self, cid: &str) -> Result<bool, Self::Err> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT blake3_hash FROM blob WHERE blake3_hash = ?1")?;
        stmt.exists(params![cid])
    }

    fn add_backup(
        &mut self,
        backup_id: &BackupId,
        dataset: &str,
        source_url: &str,
    ) -> Result<DatasetEntry, Self::Err> {
        self.conn.execute(
            "INSERT INTO backup (backup_id, dataset, source_url) VALUES (?1, ?2, ?3)",
            params![backup_id.as_str(), dataset, source_url],
        )?;
        Ok(DatasetEntry {
            dataset: dataset.to_owned(),
            backup_id: backup_id.clone(),
            source_url: source_url.to_owned(),
            sequence: self.conn.last_insert_rowid(),
        })
    }

    fn list_backups(
        &self,
        dataset: &str,
        offset: u64,
        limit: u64,
    ) -> Result<DatasetListing, Self::Err> {
        let total: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM backup WHERE dataset = ?1",
            params![dataset],
            |row| row.get(0),
        )?;

        let mut stmt = self.conn.prepare_cached(
            "SELECT sequence, backup_id, dataset, source_url FROM backup
                 WHERE dataset = ?1 ORDER BY sequence LIMIT ?2 OFFSET ?3",
        )?;
        let entries = stmt
            .query_map(
                params![dataset, clamp(limit), clamp(offset)],
                Self::dataset_entry,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(DatasetListing {
            dataset: dataset.to_owned(),
            offset,
            limit,
            total: u64::try_from(total).unwrap_or_default(),
            entries,
        })
    }

    fn get_backup(&self, backup_id: &BackupId) -> Result<Option<DatasetEntry>, Self::Err> {
        self.conn
            .query_row(
                "SELECT sequence, backup_id, dataset, source_url FROM backup WHERE backup_id = ?1",
                params![backup_id.as_str()],
                Self::dataset_entry,
            )
            .optional()
    }

    fn dataset_backups(&self, dataset: &str) -> Result<Vec<DatasetEntry>, Self::Err> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT sequence, backup_id, dataset, source_url FROM backup
                 WHERE dataset = ?1 ORDER BY sequence",
        )?;
        let entries = stmt
            .query_map(params![dataset], Self::dataset_entry)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

/// SQLite integers are signed.
fn clamp(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl Sqlite {
    pub fn open<P: AsRef<Path>>(path: P, mode: Mode) -> Result<Self, Error> {
        let c = match mode {
            Mode::ReadWrite => Connection::open(path),
            Mode::ReadOnly => Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY),
        };
        Ok(Self { conn: c? })
    }

    fn dataset_entry(row: &Row) -> Result<DatasetEntry, Error> {
        let backup_id: String = row.get(1)?;
        Ok(DatasetEntry {
            sequence: row.get(0)?,
            backup_id: BackupId::new(backup_id),
            dataset: row.get(2)?,
            source_url: row.get(3)?,
        })
    }

    fn enable_foreign_keys(&self) -> Result<(), Error> {
        self.pragma_update("foreign_keys", "ON")
    }

    fn assign_cache_size(&self) -> Result<(), Error> {
        self.pragma_update("cache_size", CACHE_SIZE)
    }

    fn pragma_update(&self, name: &str, value: &str) -> Result<(), Error> {
        self.conn.pragma_update(None, name, value)
    }
}
