//! # Sigil Config
//!
//! Configuration management for the Sigil token service.
//!
//! A [`SigilConfig`] names the issuer, the RSA key material used to sign and
//! verify tokens, token lifetimes and, optionally, the policy-decision
//! service consulted after local verification. It can be built in code, read
//! from JSON or TOML files, or taken from environment variables.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

/// Default refresh token lifetime: 30 days in seconds
pub const DEFAULT_REFRESH_TOKEN_LIFETIME: u64 = 30 * 24 * 60 * 60;

/// Default signing algorithm
pub const DEFAULT_ALGORITHM: &str = "RS256";

/// Signing algorithms accepted in `algorithm`, compared case-insensitively
pub const SUPPORTED_ALGORITHMS: [&str; 3] = ["RS256", "RS384", "RS512"];

/// Configuration for the Sigil token service
///
/// `private_key` and `public_key` hold key sources: inline PEM text, a
/// `file://PATH` reference or a bare path. They are resolved when the
/// service is constructed, not when the configuration is loaded.
///
/// # Examples
///
/// ## Creating a configuration with the builder
///
/// ```no_run
/// # fn main() -> Result<(), sigil_config::ConfigError> {
/// use sigil_config::SigilConfig;
///
/// let config = SigilConfig::builder()
///     .issuer("https://auth.example.com")
///     .private_key("file:///etc/sigil/private.pem")
///     .public_key("file:///etc/sigil/public.pem")
///     .key_id("2024-01")
///     .build()?;
/// # Ok(())
/// # }
/// ```
///
/// ## Loading from a JSON file
///
/// ```no_run
/// use sigil_config::SigilConfig;
///
/// let config = SigilConfig::from_file("./sigil.json")
///     .expect("Failed to load configuration");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigilConfig {
    /// Value of the `iss` claim in issued tokens
    pub issuer: String,
    pub private_key: String,
    pub public_key: String,
    /// One of RS256, RS384 or RS512
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    /// Advertised in the `kid` header of signed tokens
    #[serde(default)]
    pub key_id: Option<String>,
    /// Refresh token lifetime in seconds
    #[serde(default = "default_refresh_token_lifetime")]
    pub refresh_token_lifetime: u64,
    /// Accepted clock skew in seconds when checking `exp` and `nbf`
    #[serde(default)]
    pub leeway: u64,
    /// Base URL of the policy-decision service
    #[serde(default)]
    pub policy_url: Option<String>,
    /// Bearer token presented to the policy-decision service
    #[serde(default)]
    pub policy_client_token: Option<String>,
}

fn default_algorithm() -> String {
    DEFAULT_ALGORITHM.to_string()
}

fn default_refresh_token_lifetime() -> u64 {
    DEFAULT_REFRESH_TOKEN_LIFETIME
}

/// Builder for SigilConfig
///
/// You can also modify an existing configuration:
///
/// ```no_run
/// # fn main() -> Result<(), sigil_config::ConfigError> {
/// # use sigil_config::SigilConfig;
/// # let config = SigilConfig::new("https://auth.example.com", "PRIVATE", "PUBLIC");
/// let new_config = config.to_builder()
///     .leeway(30)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Default, Debug)]
pub struct SigilConfigBuilder {
    issuer: Option<String>,
    private_key: Option<String>,
    public_key: Option<String>,
    algorithm: Option<String>,
    key_id: Option<String>,
    refresh_token_lifetime: Option<u64>,
    leeway: Option<u64>,
    policy_url: Option<String>,
    policy_client_token: Option<String>,
}

impl SigilConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new SigilConfigBuilder from an existing SigilConfig
    pub fn from_config(config: &SigilConfig) -> Self {
        Self {
            issuer: Some(config.issuer.clone()),
            private_key: Some(config.private_key.clone()),
            public_key: Some(config.public_key.clone()),
            algorithm: Some(config.algorithm.clone()),
            key_id: config.key_id.clone(),
            refresh_token_lifetime: Some(config.refresh_token_lifetime),
            leeway: Some(config.leeway),
            policy_url: config.policy_url.clone(),
            policy_client_token: config.policy_client_token.clone(),
        }
    }

    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Set the private key source (PEM text, `file://PATH` or `PATH`)
    pub fn private_key(mut self, private_key: impl Into<String>) -> Self {
        self.private_key = Some(private_key.into());
        self
    }

    /// Set the public key source (PEM text, `file://PATH` or `PATH`)
    pub fn public_key(mut self, public_key: impl Into<String>) -> Self {
        self.public_key = Some(public_key.into());
        self
    }

    pub fn algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.algorithm = Some(algorithm.into());
        self
    }

    pub fn key_id(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = Some(key_id.into());
        self
    }

    pub fn refresh_token_lifetime(mut self, seconds: u64) -> Self {
        self.refresh_token_lifetime = Some(seconds);
        self
    }

    pub fn leeway(mut self, seconds: u64) -> Self {
        self.leeway = Some(seconds);
        self
    }

    pub fn policy_url(mut self, policy_url: impl Into<String>) -> Self {
        self.policy_url = Some(policy_url.into());
        self
    }

    pub fn policy_client_token(mut self, token: impl Into<String>) -> Self {
        self.policy_client_token = Some(token.into());
        self
    }

    /// Build the SigilConfig
    ///
    /// # Errors
    ///
    /// Returns an error if any required field is missing or invalid
    pub fn build(self) -> Result<SigilConfig, ConfigError> {
        let config = SigilConfig {
            issuer: self.issuer.ok_or(ConfigError::MissingIssuer)?,
            private_key: self.private_key.ok_or(ConfigError::MissingPrivateKey)?,
            public_key: self.public_key.ok_or(ConfigError::MissingPublicKey)?,
            algorithm: self.algorithm.unwrap_or_else(default_algorithm),
            key_id: self.key_id,
            refresh_token_lifetime: self
                .refresh_token_lifetime
                .unwrap_or(DEFAULT_REFRESH_TOKEN_LIFETIME),
            leeway: self.leeway.unwrap_or_default(),
            policy_url: self.policy_url,
            policy_client_token: self.policy_client_token,
        };

        config.validate()?;
        Ok(config)
    }
}

/// Errors that can occur when working with Sigil configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Issuer is required but was not provided. Please specify the value of the 'iss' claim.")]
    MissingIssuer,
    #[error("Private key is required but was not provided. Please provide PEM text or a file reference.")]
    MissingPrivateKey,
    #[error("Public key is required but was not provided. Please provide PEM text or a file reference.")]
    MissingPublicKey,
    #[error("Invalid refresh token lifetime. The lifetime must be greater than zero seconds.")]
    InvalidLifetime,
    #[error("Unsupported signing algorithm '{0}'. Must be one of RS256, RS384 or RS512.")]
    InvalidAlgorithm(String),
    #[error("Invalid number: {0}")]
    InvalidNumber(String),
    #[error("I/O error occurred while reading configuration: {0}. Please check file permissions and paths.")]
    IOError(String),
    #[error("Failed to parse configuration data: {0}. Please ensure the configuration format is correct.")]
    ParseError(String),
    #[error("Global configuration has already been initialized. Call get_default_config() to access it or create a new local configuration.")]
    AlreadyInitialized,
    #[error("Environment variable error: {0}. Please ensure all required environment variables are set correctly.")]
    EnvVarError(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(error: std::io::Error) -> Self {
        ConfigError::IOError(error.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(error: serde_json::Error) -> Self {
        ConfigError::ParseError(error.to_string())
    }
}

#[cfg(feature = "toml")]
impl From<toml::de::Error> for ConfigError {
    fn from(error: toml::de::Error) -> Self {
        ConfigError::ParseError(error.to_string())
    }
}

impl From<env::VarError> for ConfigError {
    fn from(error: env::VarError) -> Self {
        ConfigError::EnvVarError(error.to_string())
    }
}

impl SigilConfig {
    /// Create a new configuration with default algorithm, lifetimes and no
    /// policy service
    pub fn new(
        issuer: impl Into<String>,
        private_key: impl Into<String>,
        public_key: impl Into<String>,
    ) -> Self {
        SigilConfig {
            issuer: issuer.into(),
            private_key: private_key.into(),
            public_key: public_key.into(),
            algorithm: default_algorithm(),
            key_id: None,
            refresh_token_lifetime: DEFAULT_REFRESH_TOKEN_LIFETIME,
            leeway: 0,
            policy_url: None,
            policy_client_token: None,
        }
    }

    pub fn builder() -> SigilConfigBuilder {
        SigilConfigBuilder::new()
    }

    /// Convert this configuration to a builder for modification
    pub fn to_builder(&self) -> SigilConfigBuilder {
        SigilConfigBuilder::from_config(self)
    }

    /// Create a configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file_content = fs::read_to_string(path)?;
        let config: SigilConfig = serde_json::from_str(&file_content)?;
        config.validate()?;
        Ok(config)
    }

    /// Create a configuration from a TOML file
    #[cfg(feature = "toml")]
    pub fn from_toml(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file_content = fs::read_to_string(path)?;
        let config: SigilConfig = toml::from_str(&file_content)?;
        config.validate()?;
        Ok(config)
    }

    /// Create a configuration from environment variables
    ///
    /// The environment variables should be named with the given prefix followed by:
    /// - ISSUER: The `iss` claim of issued tokens
    /// - PRIVATE_KEY: The private key source
    /// - PUBLIC_KEY: The public key source
    /// - ALGORITHM: RS256, RS384 or RS512 (optional, defaults to RS256)
    /// - KEY_ID: The `kid` header (optional)
    /// - REFRESH_TOKEN_LIFETIME: Seconds (optional)
    /// - LEEWAY: Seconds (optional)
    /// - POLICY_URL: Policy-decision service base URL (optional)
    /// - POLICY_CLIENT_TOKEN: Bearer token for the policy service (optional)
    ///
    /// For example, with the prefix "SIGIL" the issuer is read from
    /// `SIGIL_ISSUER`.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if any required environment variable is missing or invalid.
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        let var = |name: &str| format!("{}_{}", prefix, name);

        let config = SigilConfig {
            issuer: env::var(var("ISSUER"))?,
            private_key: env::var(var("PRIVATE_KEY"))?,
            public_key: env::var(var("PUBLIC_KEY"))?,
            algorithm: optional_var(&var("ALGORITHM"))?.unwrap_or_else(default_algorithm),
            key_id: optional_var(&var("KEY_ID"))?,
            refresh_token_lifetime: optional_number(&var("REFRESH_TOKEN_LIFETIME"))?
                .unwrap_or(DEFAULT_REFRESH_TOKEN_LIFETIME),
            leeway: optional_number(&var("LEEWAY"))?.unwrap_or_default(),
            policy_url: optional_var(&var("POLICY_URL"))?,
            policy_client_token: optional_var(&var("POLICY_CLIENT_TOKEN"))?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// Checks that the issuer and both key sources are present, that the
    /// algorithm is supported and that the refresh token lifetime is
    /// positive. Key material itself is checked when it is loaded.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.trim().is_empty() {
            return Err(ConfigError::MissingIssuer);
        }
        if self.private_key.trim().is_empty() {
            return Err(ConfigError::MissingPrivateKey);
        }
        if self.public_key.trim().is_empty() {
            return Err(ConfigError::MissingPublicKey);
        }
        if !SUPPORTED_ALGORITHMS
            .iter()
            .any(|supported| supported.eq_ignore_ascii_case(&self.algorithm))
        {
            return Err(ConfigError::InvalidAlgorithm(self.algorithm.clone()));
        }
        if self.refresh_token_lifetime == 0 || i64::try_from(self.refresh_token_lifetime).is_err() {
            return Err(ConfigError::InvalidLifetime);
        }
        Ok(())
    }
}

fn optional_var(name: &str) -> Result<Option<String>, ConfigError> {
    match env::var(name) {
        Ok(value) => Ok(Some(value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn optional_number(name: &str) -> Result<Option<u64>, ConfigError> {
    optional_var(name)?
        .map(|value| {
            value
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidNumber(format!("{}={}", name, value)))
        })
        .transpose()
}

// Global configuration singleton
static DEFAULT_CONFIG: OnceLock<SigilConfig> = OnceLock::new();

/// Set the default global configuration
///
/// Returns an error if a default configuration is already set.
pub fn set_default_config(config: SigilConfig) -> Result<(), ConfigError> {
    config.validate()?;
    DEFAULT_CONFIG
        .set(config)
        .map_err(|_| ConfigError::AlreadyInitialized)
}

/// Get the default global configuration, if set
pub fn get_default_config() -> Option<&'static SigilConfig> {
    DEFAULT_CONFIG.get()
}

fn expand_path(path: &str) -> Option<PathBuf> {
    match path.strip_prefix("~/") {
        Some(stripped) => dirs::home_dir().map(|home| home.join(stripped)),
        None => Some(Path::new(path).to_path_buf()),
    }
}

/// Try to load a default configuration from standard locations
///
/// This function attempts to load a configuration from:
/// 1. Environment variables with the prefix "SIGIL"
/// 2. A file at ./sigil.json
/// 3. A file at ~/.sigil/config.json
/// 4. A file at /etc/sigil/config.json
/// 5. If the "toml" feature is enabled, TOML files at the same paths
///
/// Returns None if no configuration could be found.
pub fn try_load_default_config() -> Option<SigilConfig> {
    if let Ok(config) = SigilConfig::from_env("SIGIL") {
        return Some(config);
    }

    let paths = [
        "./sigil.json",
        "~/.sigil/config.json",
        "/etc/sigil/config.json",
    ];
    for path in paths.iter().filter_map(|path| expand_path(path)) {
        if path.exists() {
            if let Ok(config) = SigilConfig::from_file(&path) {
                return Some(config);
            }
        }
    }

    #[cfg(feature = "toml")]
    {
        let toml_paths = [
            "./sigil.toml",
            "~/.sigil/config.toml",
            "/etc/sigil/config.toml",
        ];
        for path in toml_paths.iter().filter_map(|path| expand_path(path)) {
            if path.exists() {
                if let Ok(config) = SigilConfig::from_toml(&path) {
                    return Some(config);
                }
            }
        }
    }

    None
}
