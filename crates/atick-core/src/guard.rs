//! Session guard for guaranteed disconnect.
//!
//! An active session must close its connection on every exit path. Normal
//! exits call [`SessionGuard::release`]; if the session future is dropped
//! instead, the guard spawns the disconnect on the current tokio runtime.

use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::connection::ConnectionManager;
use crate::transport::Transport;

/// Stops a connection when the session ends.
///
/// # Example
///
/// ```ignore
/// let guard = SessionGuard::new(Arc::clone(&connection));
/// connection.read_gatt(MODEL_NUMBER).await?;
/// guard.release().await;
/// ```
pub struct SessionGuard<T: Transport> {
    connection: Option<Arc<ConnectionManager<T>>>,
}

impl<T: Transport> SessionGuard<T> {
    /// Guard a connection for the duration of a session.
    pub fn new(connection: Arc<ConnectionManager<T>>) -> Self {
        Self {
            connection: Some(connection),
        }
    }

    /// Stop the connection now and disarm the guard.
    pub async fn release(mut self) {
        if let Some(connection) = self.connection.take() {
            connection.stop().await;
        }
    }
}

impl<T: Transport> Drop for SessionGuard<T> {
    fn drop(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };
        if let Ok(handle) = Handle::try_current() {
            debug!(address = %connection.address(), "Session dropped, disconnecting");
            handle.spawn(async move {
                connection.stop().await;
            });
        } else {
            warn!("No tokio runtime available for disconnect in session guard drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::BackoffConfig;
    use crate::connection::{ConnectionConfig, ConnectionState};
    use crate::mock::MockTransport;

    fn connection(transport: MockTransport) -> Arc<ConnectionManager<MockTransport>> {
        Arc::new(ConnectionManager::new(
            "AA:BB:CC:DD:EE:FF",
            transport,
            ConnectionConfig::default(),
            BackoffConfig::default(),
        ))
    }

    #[tokio::test]
    async fn test_release_stops_connection() {
        let transport = MockTransport::new();
        let stats = transport.stats();
        let connection = connection(transport);

        let guard = SessionGuard::new(Arc::clone(&connection));
        connection.acquire().await.unwrap();
        guard.release().await;

        assert_eq!(connection.state(), ConnectionState::Disconnected);
        assert_eq!(stats.disconnects(), 1);
    }

    #[tokio::test]
    async fn test_drop_spawns_stop() {
        let transport = MockTransport::new();
        let stats = transport.stats();
        let connection = connection(transport);

        {
            let _guard = SessionGuard::new(Arc::clone(&connection));
            connection.acquire().await.unwrap();
        }
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert_eq!(stats.disconnects(), 1);
        assert_eq!(connection.state(), ConnectionState::Disconnected);
    }
}
