//! Lazily connected, shared client handle.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use super::{GremlinClient, GremlinConfig};
use crate::error::Result;

type Connector = dyn Fn(&GremlinConfig) -> Result<Arc<dyn GremlinClient>> + Send + Sync;

/// Builds the client on first use and hands out shared references to it.
///
/// Concurrent first callers race on a write lock; only the winner connects.
/// [`GremlinFactory::close`] drops the client, the next call reconnects.
pub struct GremlinFactory {
    config: GremlinConfig,
    connector: Box<Connector>,
    client: RwLock<Option<Arc<dyn GremlinClient>>>,
}

impl GremlinFactory {
    /// Factory connecting over HTTP with `config`.
    #[cfg(feature = "http")]
    pub fn new(config: GremlinConfig) -> Result<Self> {
        Self::with_connector(config, |config| {
            let client: Arc<dyn GremlinClient> = Arc::new(super::HttpGremlinClient::connect(config)?);
            Ok(client)
        })
    }

    /// Factory using a custom connector.
    pub fn with_connector<F>(config: GremlinConfig, connector: F) -> Result<Self>
    where
        F: Fn(&GremlinConfig) -> Result<Arc<dyn GremlinClient>> + Send + Sync + 'static,
    {
        config.validate()?;
        Ok(Self {
            config,
            connector: Box::new(connector),
            client: RwLock::new(None),
        })
    }

    /// Factory around an existing client; reconnecting yields the same client.
    pub fn from_client(client: Arc<dyn GremlinClient>) -> Self {
        let shared = Arc::clone(&client);
        Self {
            config: GremlinConfig::default(),
            connector: Box::new(move |_: &GremlinConfig| Ok(Arc::clone(&shared))),
            client: RwLock::new(Some(client)),
        }
    }

    /// Connection settings.
    pub fn config(&self) -> &GremlinConfig {
        &self.config
    }

    /// Returns the shared client, connecting first if needed.
    pub fn client(&self) -> Result<Arc<dyn GremlinClient>> {
        if let Some(client) = self.client.read().as_ref() {
            return Ok(Arc::clone(client));
        }
        let mut slot = self.client.write();
        if let Some(client) = slot.as_ref() {
            return Ok(Arc::clone(client));
        }
        let client = (self.connector)(&self.config)?;
        info!(url = %self.config.url(), serializer = %self.config.serializer, "gremlin client connected");
        *slot = Some(Arc::clone(&client));
        Ok(client)
    }

    /// Returns `true` while a client is held.
    pub fn is_connected(&self) -> bool {
        self.client.read().is_some()
    }

    /// Drops the shared client and closes it.
    pub async fn close(&self) -> Result<()> {
        let taken = self.client.write().take();
        if let Some(client) = taken {
            client.close().await?;
            info!("gremlin client closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::GremlinResult;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Noop;

    #[async_trait]
    impl GremlinClient for Noop {
        async fn submit(&self, _statement: &str) -> Result<Vec<GremlinResult>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn connects_once_and_reconnects_after_close() {
        let connects = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&connects);
        let factory = GremlinFactory::with_connector(GremlinConfig::local(), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            let client: Arc<dyn GremlinClient> = Arc::new(Noop);
            Ok(client)
        })
        .expect("factory");

        assert!(!factory.is_connected());
        let first = factory.client().expect("client");
        let second = factory.client().expect("client");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(connects.load(Ordering::SeqCst), 1);

        factory.close().await.expect("close");
        assert!(!factory.is_connected());
        factory.client().expect("reconnect");
        assert_eq!(connects.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn invalid_settings_fail_at_construction() {
        let mut config = GremlinConfig::local();
        config.endpoint.clear();
        let result = GremlinFactory::with_connector(config, |_| {
            let client: Arc<dyn GremlinClient> = Arc::new(Noop);
            Ok(client)
        });
        assert_eq!(result.err().map(|e| e.code()), Some("ConfigurationError"));
    }
}
