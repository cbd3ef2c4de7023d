//! Ledger document store contract and SQLite implementation.
//!
//! # Responsibility
//! - Load and save the whole ledger document as one JSON payload.
//! - Keep unreadable payloads in a quarantine table instead of dropping them.
//!
//! # Invariants
//! - `save` is a compare-and-swap on `revision`: a stale expected revision is
//!   rejected with `StoreError::Conflict` and nothing is written.
//! - A failed `save` leaves the previously committed document untouched.
//! - Quarantining a payload and replacing the document commit together.
//! - Revisions start at 1 for the first stored document and only grow.

use crate::db::migrations::{current_user_version, latest_version};
use crate::db::DbError;
use crate::model::ledger::LedgerTree;
use log::{error, info, warn};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::cell::RefCell;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by ledger store implementations.
#[derive(Debug)]
pub enum StoreError {
    /// Storage transport failure (persist failure on writes).
    Db(DbError),
    /// The caller's loaded revision is no longer current.
    Conflict { expected: u64, actual: u64 },
    /// The tree could not be encoded for persistence.
    Encode(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Persisted metadata cannot be converted (e.g. negative revision).
    InvalidData(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Conflict { expected, actual } => write!(
                f,
                "ledger was modified concurrently: loaded revision {expected}, stored revision {actual}"
            ),
            Self::Encode(message) => write!(f, "failed to encode ledger: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "ledger store requires schema version {expected_version}, got {actual_version}"
            ),
            Self::InvalidData(message) => write!(f, "invalid stored ledger data: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Raw persisted document as read from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    /// Revision of the stored row; authoritative over any payload field.
    pub revision: u64,
    /// Unparsed payload text.
    pub payload: String,
}

/// One quarantined payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuarantineRecord {
    pub id: i64,
    pub payload: String,
    pub reason: String,
    /// Epoch milliseconds.
    pub quarantined_at: i64,
}

/// Persistence boundary used by the ledger service.
pub trait LedgerStore {
    /// Returns the stored document, or `None` when nothing was saved yet.
    fn load(&self) -> StoreResult<Option<StoredDocument>>;
    /// Writes `tree` if the stored revision still equals `expected_revision`
    /// (0 = nothing stored). Returns the new revision.
    fn save(&self, tree: &LedgerTree, expected_revision: u64) -> StoreResult<u64>;
    /// Keeps an unreadable payload for later inspection and replaces the
    /// stored document with `tree`, atomically and under the same revision
    /// check as `save`. Returns the new revision.
    fn quarantine_and_replace(
        &self,
        payload: &str,
        reason: &str,
        tree: &LedgerTree,
        expected_revision: u64,
    ) -> StoreResult<u64>;
    /// Lists quarantined payloads, oldest first.
    fn quarantined(&self) -> StoreResult<Vec<QuarantineRecord>>;
}

impl<S: LedgerStore + ?Sized> LedgerStore for &S {
    fn load(&self) -> StoreResult<Option<StoredDocument>> {
        (**self).load()
    }

    fn save(&self, tree: &LedgerTree, expected_revision: u64) -> StoreResult<u64> {
        (**self).save(tree, expected_revision)
    }

    fn quarantine_and_replace(
        &self,
        payload: &str,
        reason: &str,
        tree: &LedgerTree,
        expected_revision: u64,
    ) -> StoreResult<u64> {
        (**self).quarantine_and_replace(payload, reason, tree, expected_revision)
    }

    fn quarantined(&self) -> StoreResult<Vec<QuarantineRecord>> {
        (**self).quarantined()
    }
}

/// SQLite-backed ledger store.
///
/// Writes take `&self`; the connection is kept in a `RefCell` so an
/// immediate transaction can be opened per save.
pub struct SqliteLedgerStore<'conn> {
    conn: RefCell<&'conn mut Connection>,
}

impl<'conn> SqliteLedgerStore<'conn> {
    /// Wraps a migrated connection.
    pub fn try_new(conn: &'conn mut Connection) -> StoreResult<Self> {
        ensure_store_connection_ready(conn)?;
        Ok(Self {
            conn: RefCell::new(conn),
        })
    }

    /// Compare-and-swap write of `tree`, optionally quarantining a payload in
    /// the same transaction.
    fn write_document(
        &self,
        tree: &LedgerTree,
        expected_revision: u64,
        quarantine: Option<(&str, &str)>,
    ) -> StoreResult<u64> {
        let next_revision = expected_revision + 1;
        let mut stamped = tree.clone();
        stamped.revision = next_revision;
        let document =
            serde_json::to_string(&stamped).map_err(|err| StoreError::Encode(err.to_string()))?;

        let mut conn = self.conn.borrow_mut();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let stored: Option<i64> = tx
            .query_row(
                "SELECT revision FROM ledger_document WHERE id = 1;",
                [],
                |row| row.get(0),
            )
            .optional()?;
        let actual = stored.map(revision_from_db).transpose()?.unwrap_or(0);
        if actual != expected_revision {
            warn!(
                "event=ledger_save module=store status=conflict expected_revision={expected_revision} actual_revision={actual}"
            );
            return Err(StoreError::Conflict {
                expected: expected_revision,
                actual,
            });
        }

        if let Some((payload, reason)) = quarantine {
            tx.execute(
                "INSERT INTO quarantined_payloads (payload, reason) VALUES (?1, ?2);",
                params![payload, reason],
            )?;
            warn!(
                "event=ledger_quarantine module=store status=ok payload_bytes={}",
                payload.len()
            );
        }

        let next_db_revision = revision_to_db(next_revision)?;
        let written = tx.execute(
            "INSERT INTO ledger_document (id, revision, payload)
             VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET
                revision = excluded.revision,
                payload = excluded.payload,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![next_db_revision, document],
        );
        if let Err(err) = written {
            error!(
                "event=ledger_save module=store status=error error_code=write_failed error={err}"
            );
            return Err(err.into());
        }
        tx.commit()?;

        info!(
            "event=ledger_save module=store status=ok revision={next_revision} payload_bytes={}",
            document.len()
        );
        Ok(next_revision)
    }
}

impl LedgerStore for SqliteLedgerStore<'_> {
    fn load(&self) -> StoreResult<Option<StoredDocument>> {
        let conn = self.conn.borrow();
        let row = conn
            .query_row(
                "SELECT revision, payload FROM ledger_document WHERE id = 1;",
                [],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        row.map(|(revision, payload)| {
            Ok(StoredDocument {
                revision: revision_from_db(revision)?,
                payload,
            })
        })
        .transpose()
    }

    fn save(&self, tree: &LedgerTree, expected_revision: u64) -> StoreResult<u64> {
        self.write_document(tree, expected_revision, None)
    }

    fn quarantine_and_replace(
        &self,
        payload: &str,
        reason: &str,
        tree: &LedgerTree,
        expected_revision: u64,
    ) -> StoreResult<u64> {
        self.write_document(tree, expected_revision, Some((payload, reason)))
    }

    fn quarantined(&self) -> StoreResult<Vec<QuarantineRecord>> {
        let conn = self.conn.borrow();
        let mut stmt = conn.prepare(
            "SELECT id, payload, reason, quarantined_at
             FROM quarantined_payloads
             ORDER BY id ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(QuarantineRecord {
                id: row.get("id")?,
                payload: row.get("payload")?,
                reason: row.get("reason")?,
                quarantined_at: row.get("quarantined_at")?,
            });
        }
        Ok(records)
    }
}

fn revision_from_db(value: i64) -> StoreResult<u64> {
    u64::try_from(value)
        .map_err(|_| StoreError::InvalidData(format!("negative revision `{value}`")))
}

fn revision_to_db(value: u64) -> StoreResult<i64> {
    i64::try_from(value)
        .map_err(|_| StoreError::InvalidData(format!("revision `{value}` exceeds storage range")))
}

fn ensure_store_connection_ready(conn: &Connection) -> StoreResult<()> {
    let expected_version = latest_version();
    let actual_version = current_user_version(conn)?;
    if actual_version != expected_version {
        return Err(StoreError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{LedgerStore, SqliteLedgerStore, StoreError};
    use crate::db::open_db_in_memory;
    use crate::model::ledger::LedgerTree;
    use rusqlite::Connection;

    #[test]
    fn rejects_unmigrated_connection() {
        let mut conn = Connection::open_in_memory().unwrap();
        let err = SqliteLedgerStore::try_new(&mut conn).err().unwrap();
        assert!(matches!(
            err,
            StoreError::UninitializedConnection {
                actual_version: 0,
                ..
            }
        ));
    }

    #[test]
    fn first_save_starts_at_revision_one() {
        let mut conn = open_db_in_memory().unwrap();
        let store = SqliteLedgerStore::try_new(&mut conn).unwrap();
        assert!(store.load().unwrap().is_none());

        let revision = store.save(&LedgerTree::default(), 0).unwrap();
        assert_eq!(revision, 1);

        let stored = store.load().unwrap().unwrap();
        assert_eq!(stored.revision, 1);
        let value: serde_json::Value = serde_json::from_str(&stored.payload).unwrap();
        assert_eq!(value["revision"], 1);
    }

    #[test]
    fn stale_revision_is_rejected_without_overwrite() {
        let mut conn = open_db_in_memory().unwrap();
        let store = SqliteLedgerStore::try_new(&mut conn).unwrap();
        store.save(&LedgerTree::default(), 0).unwrap();
        let before = store.load().unwrap().unwrap();

        let err = store.save(&LedgerTree::default(), 0).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict {
                expected: 0,
                actual: 1
            }
        ));
        assert_eq!(store.load().unwrap().unwrap(), before);
    }

    #[test]
    fn quarantine_keeps_payloads_in_order_and_replaces_document() {
        let mut conn = open_db_in_memory().unwrap();
        let store = SqliteLedgerStore::try_new(&mut conn).unwrap();
        let empty = LedgerTree::default();
        store
            .quarantine_and_replace("{not json", "invalid JSON", &empty, 0)
            .unwrap();
        let revision = store
            .quarantine_and_replace("[]", "expected object", &empty, 1)
            .unwrap();
        assert_eq!(revision, 2);

        let records = store.quarantined().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].payload, "{not json");
        assert_eq!(records[1].reason, "expected object");
        assert_eq!(store.load().unwrap().unwrap().revision, 2);
    }

    #[test]
    fn stale_quarantine_writes_nothing() {
        let mut conn = open_db_in_memory().unwrap();
        let store = SqliteLedgerStore::try_new(&mut conn).unwrap();
        store.save(&LedgerTree::default(), 0).unwrap();
        let before = store.load().unwrap().unwrap();

        let err = store
            .quarantine_and_replace("{}", "partially unreadable", &LedgerTree::default(), 0)
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { expected: 0, actual: 1 }));
        assert!(store.quarantined().unwrap().is_empty());
        assert_eq!(store.load().unwrap().unwrap(), before);
    }
}
