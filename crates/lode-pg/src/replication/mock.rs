use std::sync::{Arc, Mutex as StdMutex};

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::Mutex;

use lode_core::Lsn;

use crate::error::{PgError, PgResult};
use crate::replication::conn::{
    CreatedSlot, ReplicationConnection, ReplicationFrame, ServerKeepalive, WalMessage,
};

/// A mock replication connection for testing.
///
/// Tests push frames that the stream loop will receive and inspect the
/// standby statuses the engine sent back. Failures and liveness are
/// scriptable.
#[derive(Clone)]
pub struct MockReplicationConn {
    state: Arc<StdMutex<MockState>>,
    frames: Arc<Mutex<mpsc::UnboundedReceiver<PgResult<ReplicationFrame>>>>,
    frames_tx: mpsc::UnboundedSender<PgResult<ReplicationFrame>>,
}

struct MockState {
    /// Standby status positions in send order.
    statuses: Vec<Lsn>,
    /// Recorded START_REPLICATION call, if any.
    started: Option<StartedReplication>,
    /// Recorded slot creations as (slot_name, output_plugin).
    created_slots: Vec<(String, String)>,
    /// Consistent point returned for slot creations.
    consistent_point: String,
    alive: bool,
    death: Option<String>,
    closed: bool,
    /// If set, standby status sends fail with this message.
    fail_sends: Option<String>,
    /// If set, slot creation fails with this message.
    fail_slot_creation: Option<String>,
}

/// Arguments of a recorded START_REPLICATION call.
#[derive(Debug, Clone)]
pub struct StartedReplication {
    pub slot_name: String,
    pub start_lsn: Lsn,
    pub plugin_options: Vec<(String, String)>,
}

impl Default for MockReplicationConn {
    fn default() -> Self {
        Self::new()
    }
}

impl MockReplicationConn {
    pub fn new() -> Self {
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        Self {
            state: Arc::new(StdMutex::new(MockState {
                statuses: Vec::new(),
                started: None,
                created_slots: Vec::new(),
                consistent_point: "0/16B3748".to_string(),
                alive: true,
                death: None,
                closed: false,
                fail_sends: None,
                fail_slot_creation: None,
            })),
            frames: Arc::new(Mutex::new(frames_rx)),
            frames_tx,
        }
    }

    /// Queue a frame for the stream loop to receive.
    pub fn push_frame(&self, frame: ReplicationFrame) {
        let _ = self.frames_tx.send(Ok(frame));
    }

    /// Queue a WAL message carrying the given payload.
    pub fn push_wal(&self, payload: impl Into<Bytes>) {
        self.push_frame(ReplicationFrame::Wal(WalMessage {
            wal_start: 0,
            wal_end: 0,
            server_time: 0,
            data: payload.into(),
        }));
    }

    /// Queue a server keepalive.
    pub fn push_keepalive(&self, reply_requested: bool) {
        self.push_frame(ReplicationFrame::Keepalive(ServerKeepalive {
            wal_end: 0,
            server_time: 0,
            reply_requested,
        }));
    }

    /// Queue a read error.
    pub fn push_error(&self, message: impl Into<String>) {
        let _ = self.frames_tx.send(Err(PgError::Protocol(message.into())));
    }

    /// Standby status positions sent so far, in order.
    pub fn sent_statuses(&self) -> Vec<Lsn> {
        self.state.lock().unwrap().statuses.clone()
    }

    /// The recorded START_REPLICATION call, if replication was started.
    pub fn started(&self) -> Option<StartedReplication> {
        self.state.lock().unwrap().started.clone()
    }

    /// Recorded slot creations as (slot_name, output_plugin).
    pub fn created_slots(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().created_slots.clone()
    }

    /// Override the consistent point returned on slot creation.
    pub fn set_consistent_point(&self, lsn: impl Into<String>) {
        self.state.lock().unwrap().consistent_point = lsn.into();
    }

    /// Make all standby status sends fail.
    pub fn fail_sends(&self, message: impl Into<String>) {
        self.state.lock().unwrap().fail_sends = Some(message.into());
    }

    /// Make slot creation fail.
    pub fn fail_slot_creation(&self, message: impl Into<String>) {
        self.state.lock().unwrap().fail_slot_creation = Some(message.into());
    }

    /// Mark the connection as dead with the given cause.
    pub fn kill(&self, cause: impl Into<String>) {
        let mut state = self.state.lock().unwrap();
        state.alive = false;
        state.death = Some(cause.into());
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }
}

impl ReplicationConnection for MockReplicationConn {
    async fn create_replication_slot(
        &self,
        slot_name: &str,
        output_plugin: &str,
    ) -> PgResult<CreatedSlot> {
        let mut state = self.state.lock().unwrap();

        if let Some(ref message) = state.fail_slot_creation {
            return Err(PgError::Protocol(message.clone()));
        }

        state
            .created_slots
            .push((slot_name.to_string(), output_plugin.to_string()));

        Ok(CreatedSlot {
            slot_name: slot_name.to_string(),
            consistent_point: state.consistent_point.clone(),
            snapshot_name: Some("mock_snapshot".to_string()),
            output_plugin: Some(output_plugin.to_string()),
        })
    }

    async fn start_replication(
        &self,
        slot_name: &str,
        start_lsn: Lsn,
        plugin_options: &[(&str, &str)],
    ) -> PgResult<()> {
        let mut state = self.state.lock().unwrap();
        state.started = Some(StartedReplication {
            slot_name: slot_name.to_string(),
            start_lsn,
            plugin_options: plugin_options
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
        });
        Ok(())
    }

    async fn next_frame(&self) -> PgResult<ReplicationFrame> {
        let mut frames = self.frames.lock().await;
        match frames.recv().await {
            Some(frame) => frame,
            // No producer left; behave like an idle stream.
            None => std::future::pending().await,
        }
    }

    async fn send_standby_status(&self, lsn: Lsn) -> PgResult<()> {
        let mut state = self.state.lock().unwrap();

        if let Some(ref message) = state.fail_sends {
            return Err(PgError::Protocol(message.clone()));
        }

        state.statuses.push(lsn);
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.state.lock().unwrap().alive
    }

    fn cause_of_death(&self) -> Option<String> {
        self.state.lock().unwrap().death.clone()
    }

    async fn close(&self) -> PgResult<()> {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        state.alive = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_records_statuses() {
        let conn = MockReplicationConn::new();

        conn.send_standby_status(10).await.unwrap();
        conn.send_standby_status(20).await.unwrap();

        assert_eq!(conn.sent_statuses(), vec![10, 20]);
    }

    #[tokio::test]
    async fn test_mock_delivers_frames_in_order() {
        let conn = MockReplicationConn::new();
        conn.push_keepalive(true);
        conn.push_wal(&br#"{"nextlsn":"0/1"}"#[..]);

        assert!(matches!(
            conn.next_frame().await.unwrap(),
            ReplicationFrame::Keepalive(ServerKeepalive {
                reply_requested: true,
                ..
            })
        ));
        assert!(matches!(
            conn.next_frame().await.unwrap(),
            ReplicationFrame::Wal(_)
        ));
    }

    #[tokio::test]
    async fn test_mock_failing_sends() {
        let conn = MockReplicationConn::new();
        conn.fail_sends("simulated failure");

        assert!(conn.send_standby_status(10).await.is_err());
        assert!(conn.sent_statuses().is_empty());
    }

    #[tokio::test]
    async fn test_mock_records_started_replication() {
        let conn = MockReplicationConn::new();
        conn.start_replication("lode_main", 42, &[("include-lsn", "true")])
            .await
            .unwrap();

        let started = conn.started().unwrap();
        assert_eq!(started.slot_name, "lode_main");
        assert_eq!(started.start_lsn, 42);
        assert_eq!(
            started.plugin_options,
            vec![("include-lsn".to_string(), "true".to_string())]
        );
    }

    #[tokio::test]
    async fn test_mock_kill_and_close() {
        let conn = MockReplicationConn::new();
        assert!(conn.is_alive());

        conn.kill("connection reset");
        assert!(!conn.is_alive());
        assert_eq!(conn.cause_of_death().as_deref(), Some("connection reset"));

        conn.close().await.unwrap();
        assert!(conn.is_closed());
    }
}
