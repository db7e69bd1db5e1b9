//! API configuration

use serde::Deserialize;

/// API configuration, loaded from the environment
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Database URL
    pub database_url: String,
    /// Log level
    pub log_level: String,
    /// Card and cash-voucher processor credentials
    pub conekta: ProcessorCredentials,
    /// Wallet checkout processor credentials
    pub mercado_pago: ProcessorCredentials,
    /// Interbank network credentials
    pub stp: NetworkCredentials,
}

/// Credentials for a token-authenticated processor
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProcessorCredentials {
    pub api_key: String,
    pub webhook_secret: String,
    /// Overrides the production base URL when set
    pub base_url: Option<String>,
}

/// Credentials for the order-signing interbank network
#[derive(Debug, Clone, Deserialize, Default)]
pub struct NetworkCredentials {
    /// Registered company name on the network
    pub company: String,
    /// PKCS#8 RSA private key, base64-encoded DER
    pub signing_key: String,
    pub webhook_secret: String,
    pub base_url: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            database_url: "postgres://localhost/aulapay".to_string(),
            log_level: "info".to_string(),
            conekta: ProcessorCredentials::default(),
            mercado_pago: ProcessorCredentials::default(),
            stp: NetworkCredentials::default(),
        }
    }
}

impl ApiConfig {
    /// Loads configuration from environment variables
    ///
    /// Nested provider credentials use double underscores, e.g.
    /// `API_CONEKTA__API_KEY`.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::Environment::with_prefix("API").separator("__"))
            .build()?
            .try_deserialize()
    }

    /// Returns the server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
