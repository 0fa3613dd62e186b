//! Standby status reporting.
//!
//! Standby statuses double as acknowledgements and as the liveness
//! heartbeat: the stream loop sends one after every processed WAL
//! message and on server request, the heartbeat task sends one every
//! interval so the walsender keeps the session open during idle
//! stretches.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use lode_core::format_lsn;

use crate::error::{PgError, PgResult};
use crate::replication::conn::ReplicationConnection;
use crate::replication::slot::SessionState;

/// How often the heartbeat task reports the committed position. Well
/// within the server's default wal_sender_timeout of 60 seconds.
pub(crate) const STANDBY_STATUS_INTERVAL: Duration = Duration::from_secs(10);

/// Send a standby status carrying the committed position.
///
/// The state lock is held across the send, so positions reach the
/// server in the same non-decreasing order they were committed in.
pub(crate) async fn send_standby_status<C: ReplicationConnection>(
    conn: &C,
    state: &Mutex<SessionState>,
) -> PgResult<()> {
    let state = state.lock().await;

    trace!(lsn = %format_lsn(state.committed_lsn), "Sending standby status");

    conn.send_standby_status(state.committed_lsn)
        .await
        .map_err(|e| PgError::Ack(e.to_string()))
}

/// Report the committed position on a fixed interval until cancelled.
///
/// Returns the first send error; the caller collapses the stream loop
/// when that happens.
pub(crate) async fn run_heartbeat<C: ReplicationConnection>(
    conn: Arc<C>,
    state: Arc<Mutex<SessionState>>,
    cancel: CancellationToken,
    interval: Duration,
) -> PgResult<()> {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = tokio::time::sleep(interval) => {
                send_standby_status(conn.as_ref(), &state).await?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replication::mock::MockReplicationConn;

    fn shared_state(lsn: u64) -> Arc<Mutex<SessionState>> {
        Arc::new(Mutex::new(SessionState::new(lsn)))
    }

    #[tokio::test]
    async fn test_send_standby_status_reports_committed_lsn() {
        let conn = MockReplicationConn::new();
        let state = shared_state(0x16B3748);

        send_standby_status(&conn, &state).await.unwrap();

        assert_eq!(conn.sent_statuses(), vec![0x16B3748]);
    }

    #[tokio::test]
    async fn test_send_standby_status_maps_errors_to_ack() {
        let conn = MockReplicationConn::new();
        conn.fail_sends("broken pipe");
        let state = shared_state(1);

        let err = send_standby_status(&conn, &state).await.unwrap_err();
        assert!(matches!(err, PgError::Ack(_)));
    }

    #[tokio::test]
    async fn test_heartbeat_sends_on_interval() {
        let conn = Arc::new(MockReplicationConn::new());
        let state = shared_state(42);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_heartbeat(
            Arc::clone(&conn),
            Arc::clone(&state),
            cancel.clone(),
            Duration::from_millis(20),
        ));

        tokio::time::sleep(Duration::from_millis(130)).await;
        cancel.cancel();
        task.await.unwrap().unwrap();

        let statuses = conn.sent_statuses();
        assert!(
            (3..=8).contains(&statuses.len()),
            "expected roughly one status per interval, got {}",
            statuses.len()
        );
        assert!(statuses.iter().all(|&lsn| lsn == 42));
    }

    #[tokio::test]
    async fn test_heartbeat_observes_position_advances() {
        let conn = Arc::new(MockReplicationConn::new());
        let state = shared_state(1);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_heartbeat(
            Arc::clone(&conn),
            Arc::clone(&state),
            cancel.clone(),
            Duration::from_millis(15),
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        state.lock().await.committed_lsn = 7;
        tokio::time::sleep(Duration::from_millis(50)).await;

        cancel.cancel();
        task.await.unwrap().unwrap();

        let statuses = conn.sent_statuses();
        assert!(!statuses.is_empty());
        // Positions never move backwards across sends.
        assert!(statuses.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(*statuses.last().unwrap(), 7);
    }

    #[tokio::test]
    async fn test_heartbeat_stops_on_send_failure() {
        let conn = Arc::new(MockReplicationConn::new());
        conn.fail_sends("connection reset");
        let state = shared_state(1);
        let cancel = CancellationToken::new();

        let result = tokio::time::timeout(
            Duration::from_millis(500),
            run_heartbeat(conn, state, cancel, Duration::from_millis(10)),
        )
        .await
        .expect("heartbeat should exit promptly on failure");

        assert!(matches!(result.unwrap_err(), PgError::Ack(_)));
    }

    #[tokio::test]
    async fn test_heartbeat_exits_cleanly_on_cancellation() {
        let conn = Arc::new(MockReplicationConn::new());
        let state = shared_state(1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        run_heartbeat(
            Arc::clone(&conn),
            state,
            cancel,
            Duration::from_millis(10),
        )
        .await
        .unwrap();

        assert!(conn.sent_statuses().is_empty());
    }
}
