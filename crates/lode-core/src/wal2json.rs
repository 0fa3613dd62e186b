//! Decoder for the wal2json v1 text JSON payload format.
//!
//! Payloads are produced by the wal2json output plugin with
//! `include-lsn`, `include-timestamp` and `include-type-oids` enabled
//! and pretty-printing disabled, so every WAL message carries a single
//! JSON object per line.

use serde::Deserialize;

use crate::error::{Error, Result};

/// A decoded wal2json message covering one committed transaction.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangeRecord {
    /// Position of the next WAL record, used to acknowledge this one.
    #[serde(rename = "nextlsn")]
    pub next_lsn: String,

    /// Server-side commit timestamp, passed through verbatim.
    pub timestamp: String,

    /// Row-level changes in commit order. Empty for transactions that
    /// touched no replicated rows.
    #[serde(default, rename = "change")]
    pub changes: Vec<Change>,
}

/// Operation kind of a single change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A single row-level change within a [`ChangeRecord`].
///
/// The column vectors are co-indexed: `column_values[i]` belongs to
/// `column_names[i]` of type `column_types[i]`. Deletes carry no column
/// values; the affected key arrives in `old_keys` instead.
#[derive(Debug, Clone, Deserialize)]
pub struct Change {
    pub kind: ChangeKind,

    pub schema: String,
    pub table: String,

    #[serde(default, rename = "columnnames")]
    pub column_names: Vec<String>,

    /// Human-readable column types.
    #[serde(default, rename = "columntypes")]
    pub column_types: Vec<String>,

    /// Column types in Postgres OID format.
    #[serde(default, rename = "columntypeoids")]
    pub column_type_oids: Vec<u32>,

    /// Column values after the operation, preserved as raw JSON values.
    #[serde(default, rename = "columnvalues")]
    pub column_values: Vec<serde_json::Value>,

    /// Present on update and delete operations. Contains the affected
    /// keys and, if the table replica identity is set to FULL, the
    /// previous values of all columns.
    #[serde(default, rename = "oldkeys")]
    pub old_keys: Option<OldKeys>,
}

/// Key columns identifying the old row of an update or delete.
#[derive(Debug, Clone, Deserialize)]
pub struct OldKeys {
    #[serde(rename = "keynames")]
    pub key_names: Vec<String>,

    #[serde(default, rename = "keytypes")]
    pub key_types: Vec<String>,

    #[serde(default, rename = "keytypeoids")]
    pub key_type_oids: Vec<u32>,

    #[serde(default, rename = "keyvalues")]
    pub key_values: Vec<serde_json::Value>,
}

/// Decode a wal2json payload as carried in the WAL data of a
/// replication frame.
///
/// Fails on malformed JSON, on a payload without `nextlsn`, and on
/// change entries with an unknown kind.
pub fn decode(payload: &[u8]) -> Result<ChangeRecord> {
    serde_json::from_slice(payload).map_err(Error::from)
}
