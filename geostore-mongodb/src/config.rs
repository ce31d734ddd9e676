//! MongoDB connection configuration.

use std::fmt;
use std::time::Duration;

use geostore_core::{StoreError, StoreResult, StoreSettings, credentials, settings};
use mongodb::options::{Acknowledgment, ClientOptions, SelectionCriteria};

/// Default application name reported to the server.
pub const DEFAULT_APP_NAME: &str = "geostore";
/// Pool size used when neither settings nor the builder set one.
pub const DEFAULT_MAX_POOL_SIZE: u32 = 10;

/// Everything needed to dial the marketplace store.
///
/// Built from [`StoreSettings`] at startup or by hand through
/// [`MongoConfig::builder`]. The descriptor is kept as given; credentials are
/// percent-encoded only when the client options are produced.
#[derive(Clone)]
pub struct MongoConfig {
    /// Connection descriptor. Credentials may still be unencoded.
    pub uri: String,
    /// Database holding the marketplace collections.
    pub database: String,
    /// Name reported in the server's connection logs.
    pub app_name: Option<String>,
    /// Upper bound on pooled connections.
    pub max_pool_size: Option<u32>,
    /// Budget for dialing and the startup ping.
    pub connect_timeout: Duration,
    /// How long the driver may wait for a suitable server.
    pub server_selection_timeout: Option<Duration>,
    /// Which members serve reads.
    pub read_preference: ReadPreference,
    /// Acknowledgment required for writes (server default when unset).
    pub write_concern: Option<WriteConcern>,
}

/// Which replica set members serve reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadPreference {
    /// The primary only.
    #[default]
    Primary,
    /// The primary, or a secondary while no primary is elected.
    PrimaryPreferred,
    /// A secondary, or the primary when none is available.
    SecondaryPreferred,
    /// The member with the lowest latency.
    Nearest,
}

impl ReadPreference {
    fn to_criteria(self) -> SelectionCriteria {
        use mongodb::options::{ReadPreference as Driver, ReadPreferenceOptions};

        let options = ReadPreferenceOptions::default();
        SelectionCriteria::ReadPreference(match self {
            Self::Primary => Driver::Primary,
            Self::PrimaryPreferred => Driver::PrimaryPreferred { options },
            Self::SecondaryPreferred => Driver::SecondaryPreferred { options },
            Self::Nearest => Driver::Nearest { options },
        })
    }
}

/// How many members must acknowledge a write.
///
/// Booking numbers are confirmed by the insert itself, so deployments with
/// replicas should use [`WriteConcern::Majority`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteConcern {
    /// A fixed number of members.
    Nodes(u32),
    /// A majority of voting members.
    Majority,
}

impl WriteConcern {
    fn to_driver(self) -> mongodb::options::WriteConcern {
        let acknowledgment = match self {
            Self::Nodes(n) => Acknowledgment::Nodes(n),
            Self::Majority => Acknowledgment::Majority,
        };
        mongodb::options::WriteConcern::builder()
            .w(acknowledgment)
            .build()
    }
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri: settings::DEFAULT_URL.to_string(),
            database: settings::DEFAULT_DATABASE.to_string(),
            app_name: Some(DEFAULT_APP_NAME.to_string()),
            max_pool_size: Some(DEFAULT_MAX_POOL_SIZE),
            connect_timeout: Duration::from_millis(settings::DEFAULT_CONNECT_TIMEOUT_MS),
            server_selection_timeout: None,
            read_preference: ReadPreference::Primary,
            write_concern: None,
        }
    }
}

impl fmt::Debug for MongoConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MongoConfig")
            .field("uri", &credentials::redact(&self.uri))
            .field("database", &self.database)
            .field("app_name", &self.app_name)
            .field("max_pool_size", &self.max_pool_size)
            .field("connect_timeout", &self.connect_timeout)
            .field("read_preference", &self.read_preference)
            .field("write_concern", &self.write_concern)
            .finish_non_exhaustive()
    }
}

impl MongoConfig {
    /// Defaults for everything but the descriptor and database.
    pub fn from_uri(uri: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            database: database.into(),
            ..Self::default()
        }
    }

    /// Configuration derived from loaded settings.
    pub fn from_settings(settings: &StoreSettings) -> Self {
        let defaults = Self::default();
        Self {
            uri: settings.url.clone(),
            database: settings.database.clone(),
            app_name: settings.app_name.clone().or(defaults.app_name),
            max_pool_size: settings.max_pool_size.or(defaults.max_pool_size),
            connect_timeout: settings.connect_timeout(),
            // Server selection must not outlive the startup budget.
            server_selection_timeout: Some(settings.connect_timeout()),
            ..defaults
        }
    }

    /// Start a builder.
    pub fn builder() -> MongoConfigBuilder {
        MongoConfigBuilder::default()
    }

    /// The descriptor with credentials percent-encoded.
    pub fn encoded_uri(&self) -> StoreResult<String> {
        credentials::encode(&self.uri)
    }

    /// Driver options for this configuration.
    ///
    /// Credentials are encoded before the driver parses the descriptor, and
    /// parse failures never echo the password.
    pub async fn to_client_options(&self) -> StoreResult<ClientOptions> {
        let uri = self.encoded_uri()?;
        let mut options = ClientOptions::parse(&uri).await.map_err(|e| {
            StoreError::connection(format!(
                "failed to parse {}: {}",
                credentials::redact(&uri),
                e
            ))
        })?;

        options.app_name = self.app_name.clone().or(options.app_name);
        options.max_pool_size = self.max_pool_size.or(options.max_pool_size);
        options.connect_timeout = Some(self.connect_timeout);
        options.server_selection_timeout = self
            .server_selection_timeout
            .or(options.server_selection_timeout);
        options.selection_criteria = Some(self.read_preference.to_criteria());
        if let Some(concern) = self.write_concern {
            options.write_concern = Some(concern.to_driver());
        }
        Ok(options)
    }
}

/// Builder for [`MongoConfig`].
#[derive(Debug, Default)]
pub struct MongoConfigBuilder {
    uri: Option<String>,
    database: Option<String>,
    app_name: Option<String>,
    max_pool_size: Option<u32>,
    connect_timeout: Option<Duration>,
    server_selection_timeout: Option<Duration>,
    read_preference: Option<ReadPreference>,
    write_concern: Option<WriteConcern>,
}

impl MongoConfigBuilder {
    /// Connection descriptor; credentials may be unencoded.
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Database name (required).
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Name reported to the server.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    /// Upper bound on pooled connections.
    pub fn max_pool_size(mut self, size: u32) -> Self {
        self.max_pool_size = Some(size);
        self
    }

    /// Budget for dialing and the startup ping.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Server selection budget.
    pub fn server_selection_timeout(mut self, timeout: Duration) -> Self {
        self.server_selection_timeout = Some(timeout);
        self
    }

    /// Which members serve reads.
    pub fn read_preference(mut self, preference: ReadPreference) -> Self {
        self.read_preference = Some(preference);
        self
    }

    /// Write acknowledgment.
    pub fn write_concern(mut self, concern: WriteConcern) -> Self {
        self.write_concern = Some(concern);
        self
    }

    /// Validate and build.
    pub fn build(self) -> StoreResult<MongoConfig> {
        let database = self
            .database
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| StoreError::config("database name is required"))?;
        let defaults = MongoConfig::default();

        let connect_timeout = self.connect_timeout.unwrap_or(defaults.connect_timeout);
        if connect_timeout.is_zero() {
            return Err(StoreError::config("connect timeout must be positive"));
        }
        if self.max_pool_size == Some(0) {
            return Err(StoreError::config("max pool size must be positive"));
        }

        Ok(MongoConfig {
            uri: self.uri.unwrap_or(defaults.uri),
            database,
            app_name: self.app_name.or(defaults.app_name),
            max_pool_size: self.max_pool_size.or(defaults.max_pool_size),
            connect_timeout,
            server_selection_timeout: self.server_selection_timeout,
            read_preference: self.read_preference.unwrap_or_default(),
            write_concern: self.write_concern,
        })
    }
}
