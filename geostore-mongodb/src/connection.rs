//! Process-wide connection ownership.

use std::sync::Arc;

use geostore_core::{ConnectionDescriptor, StoreError, StoreResult};
use mongodb::Client;
use tracing::{debug, info, warn};

use crate::config::MongoConfig;
use crate::mongo::MongoStore;
use crate::store::{DocumentStore, StoreHandle};

/// Owns the pooled store handle for the life of the process.
///
/// Built once at startup and passed to every component. [`handle`] clones
/// are cheap and never dial; [`close`] shuts the pool down and every clone
/// observes a connection error afterwards.
///
/// [`handle`]: ConnectionManager::handle
/// [`close`]: ConnectionManager::close
#[derive(Debug)]
pub struct ConnectionManager {
    handle: StoreHandle,
    database: String,
    redacted_uri: String,
}

impl ConnectionManager {
    /// Encode credentials, dial the store and ping it within the connect timeout.
    ///
    /// Malformed credentials surface as `StoreError::MalformedCredential`;
    /// every other failure is a `StoreError::Connection`.
    pub async fn connect(config: MongoConfig) -> StoreResult<Self> {
        let encoded = config.encoded_uri()?;
        let descriptor = ConnectionDescriptor::parse(&encoded)?;
        let redacted_uri = descriptor.redacted();
        let timeout = config.connect_timeout;

        info!(
            uri = %redacted_uri,
            database = %config.database,
            timeout_ms = timeout.as_millis() as u64,
            "connecting to document store"
        );

        let dial = async {
            let options = config.to_client_options().await?;
            let client = Client::with_options(options)
                .map_err(|e| StoreError::connection(format!("failed to create client: {}", e)))?;
            let store = MongoStore::new(client, &config.database);
            store
                .ping()
                .await
                .map_err(|e| StoreError::connection(format!("ping failed: {}", e)))?;
            Ok::<_, StoreError>(store)
        };

        let store = match tokio::time::timeout(timeout, dial).await {
            Ok(Ok(store)) => store,
            Ok(Err(StoreError::MalformedCredential(msg))) => {
                return Err(StoreError::MalformedCredential(msg));
            }
            Ok(Err(err)) => {
                warn!(uri = %redacted_uri, error = %err, "store connection failed");
                return Err(match err {
                    StoreError::Connection(_) => err,
                    other => StoreError::connection(other.to_string()),
                });
            }
            Err(_) => {
                warn!(uri = %redacted_uri, "store did not answer in time");
                return Err(StoreError::connection(format!(
                    "no answer from {} within {}ms",
                    redacted_uri,
                    timeout.as_millis()
                )));
            }
        };

        info!(uri = %redacted_uri, database = %config.database, "document store connected");
        Ok(Self {
            handle: Arc::new(store),
            database: config.database,
            redacted_uri,
        })
    }

    /// Adopt an already-open store, such as a [`crate::MemoryStore`].
    pub fn from_handle(handle: StoreHandle, database: impl Into<String>) -> Self {
        let database = database.into();
        let redacted_uri = format!("{}:///{}", handle.backend(), database);
        debug!(uri = %redacted_uri, "adopting store handle");
        Self {
            handle,
            database,
            redacted_uri,
        }
    }

    /// A shared handle to the store.
    pub fn handle(&self) -> StoreHandle {
        Arc::clone(&self.handle)
    }

    /// The database name.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// The descriptor with the password masked.
    pub fn redacted_uri(&self) -> &str {
        &self.redacted_uri
    }

    /// Check if the store answers a ping.
    pub async fn is_healthy(&self) -> bool {
        self.handle.ping().await.is_ok()
    }

    /// Shut the store down.
    pub async fn close(self) {
        info!(uri = %self.redacted_uri, "closing document store");
        self.handle.shutdown().await;
    }
}
