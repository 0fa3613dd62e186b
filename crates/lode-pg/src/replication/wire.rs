//! Byte-level codec for replication CopyData payloads.
//!
//! See the streaming replication protocol documentation:
//! <https://www.postgresql.org/docs/current/protocol-replication.html>

use std::time::{Duration, SystemTime};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use lode_core::Lsn;

use crate::error::{PgError, PgResult};
use crate::replication::conn::{ReplicationFrame, ServerKeepalive, WalMessage};

const XLOG_DATA_TAG: u8 = b'w';
const PRIMARY_KEEPALIVE_TAG: u8 = b'k';
const STANDBY_STATUS_TAG: u8 = b'r';

/// Seconds between the Unix epoch and the Postgres epoch (2000-01-01).
const POSTGRES_EPOCH_UNIX_SECS: u64 = 946_684_800;

/// Parse a CopyData payload received on the replication stream.
pub(crate) fn parse_frame(mut data: Bytes) -> PgResult<ReplicationFrame> {
    if data.is_empty() {
        return Err(PgError::Protocol("empty replication frame".to_string()));
    }

    match data.get_u8() {
        XLOG_DATA_TAG => {
            if data.remaining() < 24 {
                return Err(PgError::Protocol("truncated XLogData frame".to_string()));
            }
            let wal_start = data.get_u64();
            let wal_end = data.get_u64();
            let server_time = data.get_i64();
            let payload = data.copy_to_bytes(data.remaining());
            Ok(ReplicationFrame::Wal(WalMessage {
                wal_start,
                wal_end,
                server_time,
                data: payload,
            }))
        }
        PRIMARY_KEEPALIVE_TAG => {
            if data.remaining() < 17 {
                return Err(PgError::Protocol("truncated keepalive frame".to_string()));
            }
            let wal_end = data.get_u64();
            let server_time = data.get_i64();
            let reply_requested = data.get_u8() != 0;
            Ok(ReplicationFrame::Keepalive(ServerKeepalive {
                wal_end,
                server_time,
                reply_requested,
            }))
        }
        other => Ok(ReplicationFrame::Other(other)),
    }
}

/// Encode a standby status update as a full CopyData frame. The given
/// position is reported as written, flushed and applied; no reply is
/// requested.
pub(crate) fn encode_standby_status(lsn: Lsn) -> BytesMut {
    let mut payload = BytesMut::with_capacity(34);
    payload.put_u8(STANDBY_STATUS_TAG);
    payload.put_u64(lsn);
    payload.put_u64(lsn);
    payload.put_u64(lsn);
    payload.put_i64(postgres_epoch_micros());
    payload.put_u8(0);

    let mut frame = BytesMut::with_capacity(1 + 4 + payload.len());
    frame.put_u8(b'd');
    frame.put_i32((payload.len() + 4) as i32);
    frame.put_slice(&payload);
    frame
}

/// Client clock in microseconds since the Postgres epoch.
fn postgres_epoch_micros() -> i64 {
    let pg_epoch = SystemTime::UNIX_EPOCH + Duration::from_secs(POSTGRES_EPOCH_UNIX_SECS);
    SystemTime::now()
        .duration_since(pg_epoch)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}
