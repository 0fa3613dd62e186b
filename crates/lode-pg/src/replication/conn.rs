//! Driver contract for the replication half of a session.
//!
//! The stream loop, heartbeat task and slot manager only ever talk to a
//! [`ReplicationConnection`]; the production implementation is
//! [`crate::ReplicationClient`], tests use [`crate::MockReplicationConn`].

use std::future::Future;

use bytes::Bytes;
use lode_core::Lsn;

use crate::error::PgResult;

/// Result of creating a logical replication slot on the server.
#[derive(Debug, Clone)]
pub struct CreatedSlot {
    pub slot_name: String,
    /// The earliest point the new slot can stream from, in textual form.
    pub consistent_point: String,
    pub snapshot_name: Option<String>,
    pub output_plugin: Option<String>,
}

/// Server-initiated keepalive message.
#[derive(Debug, Clone, Copy)]
pub struct ServerKeepalive {
    pub wal_end: Lsn,
    /// Server clock in microseconds since the Postgres epoch.
    pub server_time: i64,
    /// Set when the server wants an immediate standby status reply.
    pub reply_requested: bool,
}

/// A WAL data message carrying one output plugin payload.
#[derive(Debug, Clone)]
pub struct WalMessage {
    pub wal_start: Lsn,
    pub wal_end: Lsn,
    pub server_time: i64,
    pub data: Bytes,
}

/// One frame received on the replication stream.
#[derive(Debug, Clone)]
pub enum ReplicationFrame {
    Keepalive(ServerKeepalive),
    Wal(WalMessage),
    /// Anything else; callers ignore these and keep waiting.
    Other(u8),
}

/// Operations the engine requires from a replication connection.
///
/// Writes are serialised internally so the heartbeat task can send
/// standby statuses while the stream loop awaits the next frame.
pub trait ReplicationConnection: Send + Sync {
    /// Create a logical replication slot bound to the given output plugin.
    fn create_replication_slot(
        &self,
        slot_name: &str,
        output_plugin: &str,
    ) -> impl Future<Output = PgResult<CreatedSlot>> + Send;

    /// Start streaming the slot at the given position with the given
    /// output plugin options.
    fn start_replication(
        &self,
        slot_name: &str,
        start_lsn: Lsn,
        plugin_options: &[(&str, &str)],
    ) -> impl Future<Output = PgResult<()>> + Send;

    /// Wait for the next replication frame.
    fn next_frame(&self) -> impl Future<Output = PgResult<ReplicationFrame>> + Send;

    /// Send a standby status update reporting the given position as
    /// written, flushed and applied.
    fn send_standby_status(&self, lsn: Lsn) -> impl Future<Output = PgResult<()>> + Send;

    /// Whether the connection is still usable.
    fn is_alive(&self) -> bool;

    /// Why the connection died, if it did.
    fn cause_of_death(&self) -> Option<String>;

    /// Close the connection. Best-effort; the session facade logs errors.
    fn close(&self) -> impl Future<Output = PgResult<()>> + Send;
}
