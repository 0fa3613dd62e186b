//! LSN (Log Sequence Number) utilities for PostgreSQL replication.

use crate::error::{Error, Result};

/// A position in the PostgreSQL write-ahead log. Zero means "unset".
pub type Lsn = u64;

/// Parse LSN from "X/Y" format to u64.
pub fn parse_lsn(lsn: &str) -> Result<Lsn> {
    let parts: Vec<&str> = lsn.split('/').collect();
    if parts.len() != 2 {
        return Err(Error::InvalidLsn(lsn.to_string()));
    }

    let high =
        u64::from_str_radix(parts[0], 16).map_err(|_| Error::InvalidLsn(lsn.to_string()))?;
    let low =
        u64::from_str_radix(parts[1], 16).map_err(|_| Error::InvalidLsn(lsn.to_string()))?;

    if high > u32::MAX as u64 || low > u32::MAX as u64 {
        return Err(Error::InvalidLsn(lsn.to_string()));
    }

    Ok((high << 32) | low)
}

/// Format u64 LSN to "X/Y" format.
pub fn format_lsn(lsn: Lsn) -> String {
    let high = lsn >> 32;
    let low = lsn & 0xFFFFFFFF;
    format!("{:X}/{:X}", high, low)
}
