//! SQLite implementation of the AccessRegistry trait.
//!
//! This is the primary registry backend. It uses rusqlite with bundled
//! SQLite, wrapped in async via tokio::spawn_blocking. Every mutation runs in
//! an IMMEDIATE transaction so the version check and the write are atomic
//! even when several processes share the database file.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use medvault_core::{now_millis, ContentAddress, DocumentId, KeyVersion, RecipientId, TokenId};
use medvault_crypto::{WrappedKey, WrappedKeySet};

use crate::error::{RegistryError, Result};
use crate::migration;
use crate::record::{validate_rewrap, validate_rollback, AccessRecord, Genesis};
use crate::traits::AccessRegistry;

/// SQLite-based registry implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteRegistry {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRegistry {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking operation on the connection off the async runtime.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|_| RegistryError::LockPoisoned)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| {
            RegistryError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                Some(format!("spawn_blocking failed: {}", e)),
            ))
        })?
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row helpers
// ─────────────────────────────────────────────────────────────────────────────

struct DocumentRow {
    content_address: ContentAddress,
    token_id: TokenId,
    owner: RecipientId,
    current: KeyVersion,
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)
        .map_err(|e| RegistryError::Serialization(e.to_string()))?;
    Ok(buf)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::from_reader(bytes).map_err(|e| RegistryError::Serialization(e.to_string()))
}

fn blob32(bytes: Vec<u8>, column: &str) -> Result<[u8; 32]> {
    bytes
        .try_into()
        .map_err(|_| RegistryError::Serialization(format!("{} is not 32 bytes", column)))
}

fn load_header(conn: &Connection, document_id: &DocumentId) -> Result<Option<DocumentRow>> {
    let row = conn
        .query_row(
            "SELECT content_address, token_id, owner, current_version
             FROM documents WHERE document_id = ?1",
            params![document_id.as_bytes().as_slice()],
            |row| {
                Ok((
                    row.get::<_, Vec<u8>>(0)?,
                    row.get::<_, u64>(1)?,
                    row.get::<_, Vec<u8>>(2)?,
                    row.get::<_, u64>(3)?,
                ))
            },
        )
        .optional()?;

    row.map(|(address, token, owner, current)| {
        Ok(DocumentRow {
            content_address: ContentAddress::from_bytes(blob32(address, "content_address")?),
            token_id: TokenId(token),
            owner: RecipientId::from_bytes(blob32(owner, "owner")?),
            current: KeyVersion(current),
        })
    })
    .transpose()
}

fn load_key_set(
    conn: &Connection,
    document_id: &DocumentId,
    version: KeyVersion,
) -> Result<Option<WrappedKeySet>> {
    let custodian: Option<Vec<u8>> = conn
        .query_row(
            "SELECT custodian FROM key_sets WHERE document_id = ?1 AND version = ?2",
            params![document_id.as_bytes().as_slice(), version.get()],
            |row| row.get(0),
        )
        .optional()?;

    let Some(custodian) = custodian else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT wrapped FROM wrapped_keys
         WHERE document_id = ?1 AND version = ?2
         ORDER BY recipient",
    )?;
    let blobs = stmt
        .query_map(
            params![document_id.as_bytes().as_slice(), version.get()],
            |row| row.get::<_, Vec<u8>>(0),
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let recipients = blobs
        .iter()
        .map(|b| decode::<WrappedKey>(b))
        .collect::<Result<Vec<_>>>()?;

    Ok(Some(WrappedKeySet::new(
        version,
        recipients,
        decode(&custodian)?,
    )))
}

fn load_record(conn: &Connection, document_id: &DocumentId) -> Result<AccessRecord> {
    let header = load_header(conn, document_id)?.ok_or(RegistryError::NotFound(*document_id))?;
    let keys = load_key_set(conn, document_id, header.current)?.ok_or_else(|| {
        RegistryError::InvariantViolation(format!(
            "{} has no key set at {}",
            document_id, header.current
        ))
    })?;

    Ok(AccessRecord::from_parts(
        *document_id,
        header.content_address,
        header.token_id,
        header.owner,
        keys,
    ))
}

fn insert_key_set(
    conn: &Connection,
    document_id: &DocumentId,
    keys: &WrappedKeySet,
    now: i64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO key_sets (document_id, version, digest, custodian, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            document_id.as_bytes().as_slice(),
            keys.key_version.get(),
            keys.digest().as_bytes().as_slice(),
            encode(&keys.custodian)?,
            now,
        ],
    )?;

    for key in &keys.recipients {
        conn.execute(
            "INSERT INTO wrapped_keys (document_id, version, recipient, wrapped)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                document_id.as_bytes().as_slice(),
                key.key_version.get(),
                key.recipient.as_bytes().as_slice(),
                encode(key)?,
            ],
        )?;
    }

    Ok(())
}

#[async_trait]
impl AccessRegistry for SqliteRegistry {
    async fn create(&self, genesis: Genesis) -> Result<AccessRecord> {
        genesis.validate()?;

        self.blocking(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let document_id = genesis.document_id;

            if load_header(&tx, &document_id)?.is_some() {
                return Err(RegistryError::DuplicateDocument(document_id));
            }

            let now = now_millis();
            tx.execute(
                "INSERT INTO documents
                 (document_id, content_address, token_id, owner, current_version,
                  created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![
                    document_id.as_bytes().as_slice(),
                    genesis.content_address.as_bytes().as_slice(),
                    genesis.token_id.0,
                    genesis.owner.as_bytes().as_slice(),
                    KeyVersion::INITIAL.get(),
                    now,
                ],
            )?;
            insert_key_set(&tx, &document_id, &genesis.keys, now)?;

            let record = load_record(&tx, &document_id)?;
            tx.commit()?;
            debug!(document = %document_id, token = %genesis.token_id, "registered document");
            Ok(record)
        })
        .await
    }

    async fn get(&self, document_id: &DocumentId) -> Result<AccessRecord> {
        let document_id = *document_id;
        self.blocking(move |conn| load_record(conn, &document_id))
            .await
    }

    async fn apply_rewrap(
        &self,
        document_id: &DocumentId,
        keys: &WrappedKeySet,
    ) -> Result<AccessRecord> {
        let document_id = *document_id;
        let keys = keys.clone();

        self.blocking(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let header =
                load_header(&tx, &document_id)?.ok_or(RegistryError::NotFound(document_id))?;

            validate_rewrap(&document_id, header.current, &keys)?;

            let now = now_millis();
            insert_key_set(&tx, &document_id, &keys, now)?;
            tx.execute(
                "UPDATE documents SET current_version = ?2, updated_at = ?3
                 WHERE document_id = ?1",
                params![document_id.as_bytes().as_slice(), keys.key_version.get(), now],
            )?;

            let record = load_record(&tx, &document_id)?;
            tx.commit()?;
            debug!(document = %document_id, version = %keys.key_version, "applied re-wrap");
            Ok(record)
        })
        .await
    }

    async fn rollback(
        &self,
        document_id: &DocumentId,
        version: KeyVersion,
    ) -> Result<AccessRecord> {
        let document_id = *document_id;

        self.blocking(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let header =
                load_header(&tx, &document_id)?.ok_or(RegistryError::NotFound(document_id))?;

            let restored = validate_rollback(&document_id, header.current, version)?;
            if load_key_set(&tx, &document_id, restored)?.is_none() {
                return Err(RegistryError::InvariantViolation(format!(
                    "{} has no key set at {} to restore",
                    document_id, restored
                )));
            }

            tx.execute(
                "DELETE FROM wrapped_keys WHERE document_id = ?1 AND version = ?2",
                params![document_id.as_bytes().as_slice(), version.get()],
            )?;
            tx.execute(
                "DELETE FROM key_sets WHERE document_id = ?1 AND version = ?2",
                params![document_id.as_bytes().as_slice(), version.get()],
            )?;
            tx.execute(
                "UPDATE documents SET current_version = ?2, updated_at = ?3
                 WHERE document_id = ?1",
                params![document_id.as_bytes().as_slice(), restored.get(), now_millis()],
            )?;

            let record = load_record(&tx, &document_id)?;
            tx.commit()?;
            debug!(document = %document_id, discarded = %version, "rolled back re-wrap");
            Ok(record)
        })
        .await
    }

    async fn history(&self, document_id: &DocumentId) -> Result<Vec<WrappedKey>> {
        let document_id = *document_id;

        self.blocking(move |conn| {
            if load_header(conn, &document_id)?.is_none() {
                return Err(RegistryError::NotFound(document_id));
            }

            let mut stmt = conn.prepare(
                "SELECT wrapped FROM wrapped_keys
                 WHERE document_id = ?1
                 ORDER BY version, recipient",
            )?;
            let blobs = stmt
                .query_map(params![document_id.as_bytes().as_slice()], |row| {
                    row.get::<_, Vec<u8>>(0)
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            blobs.iter().map(|b| decode::<WrappedKey>(b)).collect()
        })
        .await
    }

    async fn list_documents(&self) -> Result<Vec<DocumentId>> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare("SELECT document_id FROM documents ORDER BY document_id")?;
            let blobs = stmt
                .query_map([], |row| row.get::<_, Vec<u8>>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            blobs
                .into_iter()
                .map(|b| Ok(DocumentId::from_bytes(blob32(b, "document_id")?)))
                .collect()
        })
        .await
    }
}
