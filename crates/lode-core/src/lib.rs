mod error;
mod lsn;
mod wal2json;

pub use error::{Error, Result};
pub use lsn::{format_lsn, parse_lsn, Lsn};
pub use wal2json::{decode, Change, ChangeKind, ChangeRecord, OldKeys};
