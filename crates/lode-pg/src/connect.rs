//! Regular (non-replication) Postgres connection with TLS support.
//!
//! The session facade uses this connection for slot lookups; the
//! replication link itself is managed by [`crate::ReplicationClient`].

use std::sync::Arc;

use rustls::ClientConfig;
use tokio_postgres::{Client, NoTls};
use tokio_postgres_rustls::MakeRustlsConnect;

use crate::error::{PgError, PgResult};

/// Connect to Postgres, picking TLS based on the sslmode in the
/// connection string. Spawns the connection task and returns the client.
pub async fn connect_postgres(connection_string: &str) -> PgResult<Client> {
    if requires_tls(connection_string) {
        let config = ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .map_err(|e| PgError::Connection(format!("TLS config error: {}", e)))?
        .with_root_certificates(root_certs())
        .with_no_client_auth();

        let (client, connection) =
            tokio_postgres::connect(connection_string, MakeRustlsConnect::new(config))
                .await
                .map_err(|e| PgError::Connection(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "Postgres connection error");
            }
        });

        Ok(client)
    } else {
        let (client, connection) = tokio_postgres::connect(connection_string, NoTls)
            .await
            .map_err(|e| PgError::Connection(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "Postgres connection error");
            }
        });

        Ok(client)
    }
}

/// Get root certificates from webpki-roots.
fn root_certs() -> rustls::RootCertStore {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    roots
}

/// Check if the connection string requires TLS.
fn requires_tls(connection_string: &str) -> bool {
    connection_string.contains("sslmode=require")
        || connection_string.contains("sslmode=verify-ca")
        || connection_string.contains("sslmode=verify-full")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_tls() {
        assert!(requires_tls("postgres://u:p@host/db?sslmode=require"));
        assert!(requires_tls("host=h user=u sslmode=verify-full"));
        assert!(!requires_tls("postgres://u:p@host/db"));
        assert!(!requires_tls("host=h user=u sslmode=disable"));
    }
}
