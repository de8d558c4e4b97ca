//! SQLite schema versioning.
//!
//! `MIGRATIONS[n]` moves a database from schema `n` to `n + 1`. The applied
//! version lives in `schema_migrations`; a file written by a newer build is
//! refused rather than silently reused.

use rusqlite::{params, Connection, OptionalExtension};

use medvault_core::now_millis;

use crate::error::{RegistryError, Result};

type Step = fn(&Connection) -> Result<()>;

const MIGRATIONS: &[Step] = &[apply_v1];

/// Schema version this build writes.
pub const CURRENT_VERSION: u32 = MIGRATIONS.len() as u32;

/// Bring `conn` up to [`CURRENT_VERSION`]. Safe to call on every open.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        );",
    )?;

    let found: u32 = conn
        .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get::<_, Option<u32>>(0)
        })
        .optional()?
        .flatten()
        .unwrap_or(0);

    if found > CURRENT_VERSION {
        return Err(RegistryError::Migration(format!(
            "schema version {} is newer than supported version {}",
            found, CURRENT_VERSION
        )));
    }
    if found == CURRENT_VERSION {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for (index, step) in MIGRATIONS.iter().enumerate().skip(found as usize) {
        step(&tx)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            params![index as u32 + 1, now_millis()],
        )?;
    }
    tx.commit()?;
    Ok(())
}

/// v1: documents, retained key sets and per-recipient copies.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- One row per registered document
        CREATE TABLE documents (
            document_id BLOB PRIMARY KEY,      -- 32 bytes, derived from owner + address
            content_address BLOB NOT NULL,     -- 32 bytes
            token_id INTEGER NOT NULL,         -- ledger token
            owner BLOB NOT NULL,               -- 32 bytes, Ed25519 verifying key
            current_version INTEGER NOT NULL,  -- authoritative key version
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        -- One row per retained key version
        CREATE TABLE key_sets (
            document_id BLOB NOT NULL REFERENCES documents(document_id),
            version INTEGER NOT NULL,
            digest BLOB NOT NULL,              -- 32 bytes, WrappedKeySet digest
            custodian BLOB NOT NULL,           -- CBOR WrappedKey
            created_at INTEGER NOT NULL,
            PRIMARY KEY (document_id, version)
        );

        -- Recipient copies, one per (version, recipient)
        CREATE TABLE wrapped_keys (
            document_id BLOB NOT NULL,
            version INTEGER NOT NULL,
            recipient BLOB NOT NULL,           -- 32 bytes
            wrapped BLOB NOT NULL,             -- CBOR WrappedKey
            PRIMARY KEY (document_id, version, recipient),
            FOREIGN KEY (document_id, version) REFERENCES key_sets(document_id, version)
        );

        CREATE INDEX idx_wrapped_keys_recipient ON wrapped_keys(recipient);
        CREATE INDEX idx_documents_token ON documents(token_id);
        "#,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_creates_tables() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        // Verify tables exist
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"documents".to_string()));
        assert!(tables.contains(&"key_sets".to_string()));
        assert!(tables.contains(&"wrapped_keys".to_string()));
        assert!(tables.contains(&"schema_migrations".to_string()));
    }

    #[test]
    fn test_migration_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap(); // Should not error
        migrate(&mut conn).unwrap(); // Still should not error

        // Verify version is 1
        let version: u32 = conn
            .query_row(
                "SELECT MAX(version) FROM schema_migrations",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn test_newer_schema_is_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (99, 0)",
            [],
        )
        .unwrap();

        assert!(matches!(
            migrate(&mut conn),
            Err(RegistryError::Migration(_))
        ));
    }
}
