//! # Sigil SDK
//!
//! Token issuance and verification for the Sigil authorization server.
//!
//! This crate combines functionality from:
//! - `sigil-token`: Key loading, signing, verification and token issuance
//! - `sigil-config`: Configuration management
//! - `sigil-api`: Policy-decision client
//!
//! ## Features
//!
//! - **Flexible configuration**: Load configuration from environment variables, JSON or TOML files
//! - **Pinned algorithms**: Tokens are only accepted under the configured algorithm and key
//! - **Access and refresh tokens**: Every token carries its own `jti`
//! - **Policy decisions**: Optionally consult a remote service after local verification
//!
//! ## Feature Flags
//!
//! - `toml`: Enables configuration loading from TOML files
//!
//! ## Usage
//!
//! ```no_run
//! use chrono::Duration;
//! use sigil_sdk::{Sigil, SdkError};
//!
//! # async fn example() -> Result<(), SdkError> {
//! let sigil = Sigil::builder()
//!     .issuer("https://auth.example.com")
//!     .private_key("file:///etc/sigil/private.pem")
//!     .public_key("file:///etc/sigil/public.pem")
//!     .build()?;
//!
//! let carrier = sigil.claims_carrier("alice", "my-client", Duration::hours(1));
//! let tokens = sigil.generate_access_token(&carrier, true)?;
//!
//! if sigil.authorize(&tokens.access_token, "orders", "read").await? {
//!     println!("alice may read orders");
//! }
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

// Re-export everything from the component crates
pub use sigil_token::{
    load_certificate, merge, names, AccessTokenIssuer, ClaimSet, ClaimValue, ClaimsCarrier,
    HeaderSet, IssuedTokens, KeyPair, SigningAlgorithm, TokenError, TokenSigner, TokenTimeConfig,
    TokenVerifier, VerifiedToken,
};

pub use sigil_config::{
    get_default_config, set_default_config, try_load_default_config, ConfigError, SigilConfig,
    SigilConfigBuilder,
};

pub use sigil_api::{
    bearer_token, AccessRequest, ApiError, PolicyClient, RemotePolicyClient,
    RemotePolicyClientBuilder,
};

/// Errors that can occur in the Sigil SDK
#[derive(Error, Debug)]
pub enum SdkError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Policy client error
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Token error
    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    /// Generic error
    #[error("{0}")]
    Generic(String),
}

/// Sigil SDK instance
///
/// Holds the signer, verifier and policy client built from one
/// configuration. All of them are immutable; share the instance behind an
/// `Arc` to use it from several tasks.
#[derive(Debug)]
pub struct Sigil {
    config: SigilConfig,
    issuer: AccessTokenIssuer,
    verifier: TokenVerifier,
    policy: PolicyClient,
}

impl Sigil {
    /// Create a new Sigil SDK instance from a configuration
    pub fn new(config: SigilConfig) -> Result<Self, SdkError> {
        config.validate()?;

        let algorithm: SigningAlgorithm = config
            .algorithm
            .parse()
            .map_err(|_| ConfigError::InvalidAlgorithm(config.algorithm.clone()))?;
        let (private_key, public_key) =
            KeyPair::load(&config.private_key, &config.public_key)?.into_parts();

        let mut signer = TokenSigner::new(private_key, algorithm);
        if let Some(key_id) = &config.key_id {
            signer = signer.with_key_id(key_id.as_str());
        }
        let refresh_duration = i64::try_from(config.refresh_token_lifetime)
            .map_err(|_| ConfigError::InvalidLifetime)?;
        let issuer =
            AccessTokenIssuer::new(signer).with_time_config(TokenTimeConfig { refresh_duration });
        let verifier = TokenVerifier::new(public_key, algorithm).with_leeway(config.leeway);
        let policy = PolicyClient::from_config(&config)?;

        debug!(
            iss = %config.issuer,
            alg = %algorithm,
            remote_policy = matches!(policy, PolicyClient::Remote(_)),
            "Sigil initialized"
        );

        Ok(Self {
            config,
            issuer,
            verifier,
            policy,
        })
    }

    /// Create a new Sigil SDK instance from a borrowed configuration
    pub fn from_config(config: &SigilConfig) -> Result<Self, SdkError> {
        Self::new(config.clone())
    }

    /// Create a builder for a Sigil SDK instance
    pub fn builder() -> SigilBuilder {
        SigilBuilder::new()
    }

    /// Replace the policy client chosen from the configuration
    pub fn with_policy(mut self, policy: PolicyClient) -> Self {
        self.policy = policy;
        self
    }

    /// Start the claims of a new session for `subject`
    ///
    /// The carrier is issued by the configured issuer, starts now and
    /// expires after `lifetime`. It gets a fresh random session id.
    pub fn claims_carrier(
        &self,
        subject: impl Into<String>,
        audience: impl Into<String>,
        lifetime: Duration,
    ) -> ClaimsCarrier {
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(lifetime)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        ClaimsCarrier::new(
            Uuid::new_v4().to_string(),
            self.config.issuer.as_str(),
            subject,
            audience,
            expires_at,
            now,
            now,
        )
    }

    /// Mint an access token, and optionally a refresh token
    pub fn generate_access_token(
        &self,
        carrier: &ClaimsCarrier,
        include_refresh: bool,
    ) -> Result<IssuedTokens, SdkError> {
        Ok(self.issuer.generate_access_token(carrier, include_refresh)?)
    }

    /// Sign arbitrary claims with the configured key
    pub fn sign_token(&self, claims: &ClaimSet, header: &HeaderSet) -> Result<String, SdkError> {
        Ok(self.issuer.signer().sign_token(claims, header)?)
    }

    /// Verify a token locally
    pub fn verify_token(&self, token: &str) -> Result<VerifiedToken, SdkError> {
        Ok(self.verifier.verify_token(token)?)
    }

    /// Verify a token locally, then ask the policy client whether its
    /// subject may perform `action` on `resource`
    pub async fn authorize(
        &self,
        token: &str,
        resource: &str,
        action: &str,
    ) -> Result<bool, SdkError> {
        let verified = self.verify_token(token)?;
        let subject = verified
            .subject()
            .ok_or_else(|| SdkError::Generic("Token does not carry a subject".to_string()))?;

        let request = AccessRequest::new(subject, resource, action).with_token(token);
        Ok(self.policy.is_allowed(&request).await?)
    }

    /// Authorize an incoming HTTP request by its bearer token
    pub async fn authorize_request<B>(
        &self,
        request: &http::Request<B>,
        resource: &str,
        action: &str,
    ) -> Result<bool, SdkError> {
        let token = bearer_token(request).ok_or(ApiError::MissingToken)?;
        self.authorize(token, resource, action).await
    }

    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    pub fn policy(&self) -> &PolicyClient {
        &self.policy
    }

    pub fn config(&self) -> &SigilConfig {
        &self.config
    }
}

/// Builder for Sigil SDK instances
#[derive(Default)]
pub struct SigilBuilder {
    config_builder: SigilConfigBuilder,
}

impl SigilBuilder {
    /// Create a new Sigil SDK builder
    pub fn new() -> Self {
        Self {
            config_builder: SigilConfig::builder(),
        }
    }

    /// Set the value of the `iss` claim
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.issuer(issuer);
        self
    }

    /// Set the private key source
    pub fn private_key(mut self, private_key: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.private_key(private_key);
        self
    }

    /// Set the public key source
    pub fn public_key(mut self, public_key: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.public_key(public_key);
        self
    }

    /// Set the signing algorithm (RS256, RS384 or RS512)
    pub fn algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.algorithm(algorithm);
        self
    }

    /// Set the `kid` header of signed tokens
    pub fn key_id(mut self, key_id: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.key_id(key_id);
        self
    }

    /// Set the refresh token lifetime in seconds
    pub fn refresh_token_lifetime(mut self, seconds: u64) -> Self {
        self.config_builder = self.config_builder.refresh_token_lifetime(seconds);
        self
    }

    /// Set the accepted clock skew in seconds
    pub fn leeway(mut self, seconds: u64) -> Self {
        self.config_builder = self.config_builder.leeway(seconds);
        self
    }

    /// Set the policy-decision service URL
    pub fn policy_url(mut self, policy_url: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.policy_url(policy_url);
        self
    }

    /// Set the bearer token presented to the policy-decision service
    pub fn policy_client_token(mut self, token: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.policy_client_token(token);
        self
    }

    /// Build a Sigil SDK instance
    pub fn build(self) -> Result<Sigil, SdkError> {
        let config = self.config_builder.build()?;
        Sigil::new(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversions() {
        let err: SdkError = TokenError::Expired.into();
        assert!(matches!(err, SdkError::Token(TokenError::Expired)));
        assert_eq!(err.to_string(), "Token error: Token has expired");

        let err: SdkError = ConfigError::MissingIssuer.into();
        assert!(matches!(err, SdkError::Config(ConfigError::MissingIssuer)));

        let err: SdkError = ApiError::MissingToken.into();
        assert!(matches!(err, SdkError::Api(ApiError::MissingToken)));

        let err = SdkError::Generic("Token does not carry a subject".to_string());
        assert_eq!(err.to_string(), "Token does not carry a subject");
    }

    #[test]
    fn test_builder_requires_keys() {
        match Sigil::builder().issuer("sigil").build() {
            Err(SdkError::Config(ConfigError::MissingPrivateKey)) => {}
            other => panic!("Expected MissingPrivateKey error, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_unknown_algorithm() {
        let built = Sigil::builder()
            .issuer("sigil")
            .private_key("PRIVATE")
            .public_key("PUBLIC")
            .algorithm("HS256")
            .build();
        match built {
            Err(SdkError::Config(ConfigError::InvalidAlgorithm(name))) => assert_eq!(name, "HS256"),
            other => panic!("Expected InvalidAlgorithm error, got {:?}", other.err()),
        }

        // a configuration assembled without the builder is refused before any key is read
        let mut config = SigilConfig::new("sigil", "PRIVATE", "PUBLIC");
        config.algorithm = "none".to_string();
        assert!(matches!(
            Sigil::new(config),
            Err(SdkError::Config(ConfigError::InvalidAlgorithm(_)))
        ));
    }
}
