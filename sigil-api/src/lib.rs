//! # Sigil API
//!
//! Client for the policy-decision service consulted by the Sigil token
//! service.
//!
//! Local token verification answers "was this token issued by us and is it
//! still valid". The policy-decision service answers "may this subject
//! perform this action on this resource". [`PolicyClient`] wraps that second
//! question behind one type, with two fixed-answer variants for tests and
//! for deployments without a policy service.
//!
//! ## Features
//!
//! - Fixed-answer clients: `AlwaysAllow` and `AlwaysDeny`
//! - Remote client over HTTP/1.1 with JSON payloads
//! - Bearer token extraction from incoming `http::Request`s

use http::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use sigil_config::SigilConfig;

// Error type for the policy client
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Access denied: {0}")]
    Denied(String),

    #[error("Request does not carry a bearer token")]
    MissingToken,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Request payload for an access decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRequest {
    /// The subject asking for access, usually the `sub` claim of its token
    pub subject: String,
    /// The resource identifier to decide on
    pub resource: String,
    /// The action to perform on the resource
    pub action: String,
    /// The bearer token presented with the request, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl AccessRequest {
    pub fn new(
        subject: impl Into<String>,
        resource: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            resource: resource.into(),
            action: action.into(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// Response from an access decision
#[derive(Serialize, Deserialize)]
pub struct AllowedResponse {
    pub allowed: bool,
}

/// Request payload for token introspection
#[derive(Serialize, Deserialize)]
pub struct IntrospectRequest {
    pub token: String,
}

/// Response from token introspection
#[derive(Serialize, Deserialize)]
pub struct IntrospectResponse {
    pub active: bool,
}

/// Extract the bearer token from the `Authorization` header of a request
pub fn bearer_token<B>(request: &http::Request<B>) -> Option<&str> {
    let value = request.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// HTTP/1.1 client for a remote policy-decision service
#[derive(Clone, Debug)]
pub struct RemotePolicyClient {
    /// Base URL of the service, without trailing slash
    base_url: String,
    /// Bearer token sent with every request
    client_token: Option<String>,
    client: reqwest::Client,
}

impl RemotePolicyClient {
    /// Create a new client builder
    pub fn builder() -> RemotePolicyClientBuilder {
        RemotePolicyClientBuilder::new()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a request to the policy-decision service
    pub async fn send_request<T, R>(&self, endpoint: &str, request_body: &T) -> Result<R, ApiError>
    where
        T: Serialize,
        R: for<'de> Deserialize<'de>,
    {
        let url = format!("{}/{}", self.base_url, endpoint);

        let mut request = self.client.post(&url).json(request_body);
        if let Some(token) = &self.client_token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(ApiError::HttpClient)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ApiError::InvalidResponse(format!(
                "HTTP error: {} - {}",
                status, error_text
            )));
        }

        let result = response
            .json::<R>()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        Ok(result)
    }
}

/// Builder for creating remote policy clients
#[derive(Default)]
pub struct RemotePolicyClientBuilder {
    base_url: Option<String>,
    client_token: Option<String>,
}

impl RemotePolicyClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the service URL and client token from a SigilConfig
    pub fn from_config(mut self, config: &SigilConfig) -> Self {
        self.base_url = config.policy_url.clone();
        self.client_token = config.policy_client_token.clone();
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the bearer token presented to the service
    pub fn client_token(mut self, client_token: impl Into<String>) -> Self {
        self.client_token = Some(client_token.into());
        self
    }

    /// Build the client
    pub fn build(self) -> Result<RemotePolicyClient, ApiError> {
        let base_url = self
            .base_url
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                ApiError::Internal("Policy service base URL is required".to_string())
            })?;

        let client = reqwest::ClientBuilder::new()
            .build()
            .map_err(ApiError::HttpClient)?;

        Ok(RemotePolicyClient {
            base_url,
            client_token: self.client_token,
            client,
        })
    }
}

/// Policy-decision client
///
/// The variant is chosen once, at construction.
#[derive(Clone, Debug)]
pub enum PolicyClient {
    /// Grants every request
    AlwaysAllow,
    /// Refuses every request with `ApiError::Denied`
    AlwaysDeny,
    /// Delegates decisions to a remote service
    Remote(RemotePolicyClient),
}

impl PolicyClient {
    /// A remote client when `policy_url` is configured, `AlwaysAllow` otherwise
    pub fn from_config(config: &SigilConfig) -> Result<Self, ApiError> {
        match &config.policy_url {
            Some(_) => Ok(PolicyClient::Remote(
                RemotePolicyClient::builder().from_config(config).build()?,
            )),
            None => Ok(PolicyClient::AlwaysAllow),
        }
    }

    /// Ask whether an access request is allowed
    pub async fn is_allowed(&self, request: &AccessRequest) -> Result<bool, ApiError> {
        let allowed = match self {
            PolicyClient::AlwaysAllow => true,
            PolicyClient::AlwaysDeny => return Err(denied()),
            PolicyClient::Remote(client) => {
                client
                    .send_request::<_, AllowedResponse>("allowed", request)
                    .await?
                    .allowed
            }
        };

        debug!(
            sub = %request.subject,
            resource = %request.resource,
            action = %request.action,
            allowed,
            "Access decision"
        );
        Ok(allowed)
    }

    /// Ask whether an incoming HTTP request may perform `action` on `resource`
    ///
    /// The bearer token of the request is forwarded with the decision. A
    /// remote client refuses requests without one.
    pub async fn is_request_allowed<B>(
        &self,
        request: &http::Request<B>,
        subject: &str,
        resource: &str,
        action: &str,
    ) -> Result<bool, ApiError> {
        let mut access_request = AccessRequest::new(subject, resource, action);
        match (self, bearer_token(request)) {
            (_, Some(token)) => access_request = access_request.with_token(token),
            (PolicyClient::Remote(_), None) => {
                warn!(resource, action, "Request without bearer token");
                return Err(ApiError::MissingToken);
            }
            _ => {}
        }
        self.is_allowed(&access_request).await
    }

    /// Ask whether a token is active
    pub async fn is_authenticated(&self, token: &str) -> Result<bool, ApiError> {
        match self {
            PolicyClient::AlwaysAllow => Ok(true),
            PolicyClient::AlwaysDeny => Err(denied()),
            PolicyClient::Remote(client) => {
                let request = IntrospectRequest {
                    token: token.to_string(),
                };
                let response = client
                    .send_request::<_, IntrospectResponse>("introspect", &request)
                    .await?;
                Ok(response.active)
            }
        }
    }
}

fn denied() -> ApiError {
    ApiError::Denied("Policy denies all requests".to_string())
}
