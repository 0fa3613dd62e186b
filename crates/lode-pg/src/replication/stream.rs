//! The replication stream loop.
//!
//! Multiplexes WAL messages, server keepalives and cancellation on the
//! replication connection, dispatches decoded records to the handler
//! and advances the committed position. A message is acknowledged only
//! after the handler returned success for it, so a failed session
//! re-delivers it from the slot on the next run.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use lode_core::{decode, format_lsn, parse_lsn};

use crate::error::{PgError, PgResult};
use crate::handler::ChangeHandler;
use crate::replication::conn::{ReplicationConnection, ReplicationFrame};
use crate::replication::slot::SessionState;
use crate::replication::status::{run_heartbeat, send_standby_status};

/// wal2json options passed to START_REPLICATION, as documented at
/// <https://github.com/eulerto/wal2json#parameters>.
pub(crate) const WAL2JSON_PLUGIN_OPTIONS: &[(&str, &str)] = &[
    // Include "nextlsn" in every payload so the committed position can
    // advance with each message.
    ("include-lsn", "true"),
    ("pretty-print", "false"),
    ("include-timestamp", "true"),
    ("include-type-oids", "true"),
];

/// Stream changes from the given slot until cancelled or a failure
/// terminates the session.
///
/// Starts replication at the committed position, spawns the heartbeat
/// on a child token and then multiplexes frames. A heartbeat failure
/// cancels only the child token, so the exit error stays distinct from
/// a caller-initiated cancellation.
pub(crate) async fn stream_changes<C, H>(
    conn: Arc<C>,
    slot_name: &str,
    state: Arc<Mutex<SessionState>>,
    handler: Option<H>,
    cancel: CancellationToken,
    heartbeat_interval: Duration,
) -> PgResult<()>
where
    C: ReplicationConnection + 'static,
    H: ChangeHandler,
{
    let start_lsn = state.lock().await.committed_lsn;
    conn.start_replication(slot_name, start_lsn, WAL2JSON_PLUGIN_OPTIONS)
        .await?;

    let heartbeat_cancel = cancel.child_token();
    let heartbeat_error = Arc::new(StdMutex::new(None));

    let heartbeat = tokio::spawn({
        let conn = Arc::clone(&conn);
        let state = Arc::clone(&state);
        let token = heartbeat_cancel.clone();
        let heartbeat_error = Arc::clone(&heartbeat_error);
        async move {
            if let Err(err) = run_heartbeat(conn, state, token.clone(), heartbeat_interval).await {
                error!(error = %err, "Could not send replication heartbeat");
                *heartbeat_error.lock().unwrap() = Some(err);
                // Collapse the stream loop without touching the
                // session token.
                token.cancel();
            }
        }
    });

    trace!("Now streaming changes and waiting for WAL messages");

    let result: PgResult<()> = loop {
        if !conn.is_alive() {
            break Err(PgError::ConnectionDead(
                conn.cause_of_death()
                    .unwrap_or_else(|| "unknown cause".to_string()),
            ));
        }

        let frame = tokio::select! {
            _ = heartbeat_cancel.cancelled() => {
                break Err(exit_error(&cancel, &heartbeat_error));
            }
            frame = conn.next_frame() => match frame {
                Ok(frame) => frame,
                Err(e) => break Err(e),
            },
        };

        match frame {
            ReplicationFrame::Keepalive(keepalive) => {
                trace!(
                    wal_end = %format_lsn(keepalive.wal_end),
                    reply_requested = keepalive.reply_requested,
                    "Got server keepalive"
                );

                if keepalive.reply_requested {
                    if let Err(e) = send_standby_status(conn.as_ref(), &state).await {
                        break Err(e);
                    }
                }
            }
            ReplicationFrame::Wal(message) => {
                let record = match decode(&message.data) {
                    Ok(record) => record,
                    Err(e) => break Err(PgError::from(e)),
                };

                trace!(
                    next_lsn = %record.next_lsn,
                    changes = record.changes.len(),
                    "Got WAL message"
                );

                if let Some(handler) = &handler {
                    trace!("Starting on_message handler");
                    let started = Instant::now();
                    let outcome = handler.handle(&record).await;
                    let elapsed = started.elapsed();
                    trace!(duration = ?elapsed, "Completed on_message handler");

                    if elapsed > Duration::from_secs(1) {
                        debug!(
                            duration = ?elapsed,
                            "Handler took longer than one second to complete; slow handlers keep the session from processing changes in real time"
                        );
                    }

                    if heartbeat_cancel.is_cancelled() {
                        // Cancelled mid-handler: discard the outcome
                        // and do not advance.
                        break Err(exit_error(&cancel, &heartbeat_error));
                    }
                    if let Err(cause) = outcome {
                        break Err(PgError::Handler(cause));
                    }
                }

                let next_lsn = match parse_lsn(&record.next_lsn) {
                    Ok(lsn) => lsn,
                    Err(e) => break Err(PgError::from(e)),
                };

                {
                    let mut state = state.lock().await;
                    debug_assert!(
                        next_lsn >= state.committed_lsn,
                        "nextlsn moved backwards: {} < {}",
                        record.next_lsn,
                        format_lsn(state.committed_lsn)
                    );
                    trace!(lsn = %record.next_lsn, "Advancing committed position");
                    state.committed_lsn = next_lsn;
                }

                // Acknowledge immediately so the server can release WAL.
                if let Err(e) = send_standby_status(conn.as_ref(), &state).await {
                    break Err(e);
                }
            }
            ReplicationFrame::Other(tag) => {
                trace!(tag, "Ignoring replication frame");
            }
        }
    };

    // Stop the heartbeat before the facade reclaims the connection.
    heartbeat_cancel.cancel();
    let _ = heartbeat.await;

    result
}

/// Pick the exit error once the child token fired: caller cancellation
/// wins, otherwise a recorded heartbeat failure.
fn exit_error(
    cancel: &CancellationToken,
    heartbeat_error: &StdMutex<Option<PgError>>,
) -> PgError {
    if cancel.is_cancelled() {
        return PgError::Cancelled;
    }
    heartbeat_error
        .lock()
        .unwrap()
        .take()
        .unwrap_or(PgError::Cancelled)
}
