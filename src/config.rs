//! Configuration for the relying party

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpConfig {
    /// Application name
    pub app_name: String,

    /// Web server host
    pub host: String,

    /// Web server port
    pub port: u16,

    /// Database URL
    pub database_url: String,

    /// Relying party identifier (effective domain)
    pub rp_id: String,

    /// Relying party display name
    pub rp_name: String,

    /// Origin the client ceremony must run on
    pub rp_origin: String,

    /// How long an issued challenge stays consumable
    pub challenge_ttl: Duration,
}

impl Default for RpConfig {
    fn default() -> Self {
        Self {
            app_name: "passkey-rp".to_string(),
            host: "127.0.0.1".to_string(),
            port: 3001,
            database_url: "sqlite://passkey-rp.db".to_string(),
            rp_id: "localhost".to_string(),
            rp_name: "Passkey RP".to_string(),
            rp_origin: "http://localhost:3001".to_string(),
            challenge_ttl: Duration::from_secs(60),
        }
    }
}

pub struct RpConfigBuilder {
    config: RpConfig,
}

impl RpConfig {
    pub fn builder() -> RpConfigBuilder {
        RpConfigBuilder {
            config: RpConfig::default(),
        }
    }

    /// Load configuration from environment and files
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let mut config = config::Config::builder();

        // Start with default
        config = config.add_source(config::Config::try_from(&RpConfig::default())?);

        // Layer on .env file
        if dotenvy::dotenv().is_ok() {
            config = config.add_source(config::Environment::with_prefix("PASSKEY_RP"));
        }

        // Layer on config file if exists
        if std::path::Path::new("passkey-rp.toml").exists() {
            config = config.add_source(config::File::with_name("passkey-rp"));
        }

        config.build()?.try_deserialize()
    }
}

impl RpConfigBuilder {
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.config.app_name = name.into();
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.config.database_url = url.into();
        self
    }

    pub fn rp_id(mut self, rp_id: impl Into<String>) -> Self {
        self.config.rp_id = rp_id.into();
        self
    }

    pub fn rp_name(mut self, rp_name: impl Into<String>) -> Self {
        self.config.rp_name = rp_name.into();
        self
    }

    pub fn rp_origin(mut self, rp_origin: impl Into<String>) -> Self {
        self.config.rp_origin = rp_origin.into();
        self
    }

    pub fn challenge_ttl(mut self, ttl: Duration) -> Self {
        self.config.challenge_ttl = ttl;
        self
    }

    pub fn build(self) -> RpConfig {
        self.config
    }
}
