use rsa::pkcs1v15::SigningKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use sha2::{Sha256, Sha384, Sha512};
use tracing::{debug, warn};

use crate::claims::{merge, ClaimSet, ClaimValue, HeaderSet};
use crate::error::TokenError;
use crate::keys::{private_key_from_pem, SigningAlgorithm};
use crate::utils::encode_segment;

pub(crate) const ALGORITHM_HEADER: &str = "alg";
pub(crate) const TYPE_HEADER: &str = "typ";
pub(crate) const KEY_ID_HEADER: &str = "kid";
pub(crate) const TOKEN_TYPE: &str = "JWT";

/// Headers only the signer may set
const RESERVED_HEADERS: [&str; 2] = [ALGORITHM_HEADER, TYPE_HEADER];

/// A private key bound to the one algorithm it signs with.
#[derive(Clone)]
enum PinnedSigningKey {
    Rs256(SigningKey<Sha256>),
    Rs384(SigningKey<Sha384>),
    Rs512(SigningKey<Sha512>),
}

impl PinnedSigningKey {
    fn new(private_key: RsaPrivateKey, algorithm: SigningAlgorithm) -> Self {
        match algorithm {
            SigningAlgorithm::RS256 => PinnedSigningKey::Rs256(SigningKey::new(private_key)),
            SigningAlgorithm::RS384 => PinnedSigningKey::Rs384(SigningKey::new(private_key)),
            SigningAlgorithm::RS512 => PinnedSigningKey::Rs512(SigningKey::new(private_key)),
        }
    }

    fn algorithm(&self) -> SigningAlgorithm {
        match self {
            PinnedSigningKey::Rs256(_) => SigningAlgorithm::RS256,
            PinnedSigningKey::Rs384(_) => SigningAlgorithm::RS384,
            PinnedSigningKey::Rs512(_) => SigningAlgorithm::RS512,
        }
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, rsa::signature::Error> {
        match self {
            PinnedSigningKey::Rs256(key) => key.try_sign(message).map(|s| s.to_vec()),
            PinnedSigningKey::Rs384(key) => key.try_sign(message).map(|s| s.to_vec()),
            PinnedSigningKey::Rs512(key) => key.try_sign(message).map(|s| s.to_vec()),
        }
    }
}

/// Produces compact signed tokens with a fixed private key and algorithm.
///
/// The signer is immutable and can be shared between threads.
#[derive(Clone)]
pub struct TokenSigner {
    key: PinnedSigningKey,
    key_id: Option<String>,
}

impl TokenSigner {
    pub fn new(private_key: RsaPrivateKey, algorithm: SigningAlgorithm) -> Self {
        Self {
            key: PinnedSigningKey::new(private_key, algorithm),
            key_id: None,
        }
    }

    /// Build a signer from PEM text.
    ///
    /// Missing or unparseable key material is reported as
    /// `TokenError::Signing`, since no token can be produced from it.
    pub fn from_pem(private_pem: &str, algorithm: SigningAlgorithm) -> Result<Self, TokenError> {
        let private_key = private_key_from_pem(private_pem)
            .map_err(|e| TokenError::signing(format!("Invalid private key material: {}", e)))?;
        Ok(Self::new(private_key, algorithm))
    }

    /// Advertise a key id in the `kid` header of every token. A `kid` passed
    /// by the caller in `sign_token` takes precedence.
    pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = Some(key_id.into());
        self
    }

    pub fn algorithm(&self) -> SigningAlgorithm {
        self.key.algorithm()
    }

    pub fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    /// Sign `claims` into a compact token.
    ///
    /// # Arguments
    ///
    /// * `claims` - Claims to encode, unmodified. Standard claims are expected
    ///   to be merged in already.
    /// * `header` - Extra header fields. Must not contain `alg` or `typ`.
    ///
    /// # Returns
    ///
    /// * `Ok(String)` - The `header.claims.signature` token
    /// * `Err(TokenError::HeaderInjection)` - A reserved header was supplied
    /// * `Err(TokenError::Signing)` - Encoding or signing failed
    pub fn sign_token(&self, claims: &ClaimSet, header: &HeaderSet) -> Result<String, TokenError> {
        if let Some(name) = RESERVED_HEADERS
            .iter()
            .find(|name| header.contains_key(**name))
        {
            warn!(header = *name, "Rejected attempt to set a reserved token header");
            return Err(TokenError::header_injection(*name));
        }

        if let Some(name) = claims
            .iter()
            .chain(header.iter())
            .find_map(|(name, value)| (!is_finite(value)).then_some(name))
        {
            return Err(TokenError::signing(format!(
                "Value of '{}' is not a finite number",
                name
            )));
        }

        let mut defaults = HeaderSet::new();
        if let Some(key_id) = &self.key_id {
            defaults.insert(KEY_ID_HEADER.to_string(), key_id.as_str().into());
        }
        let mut fixed = HeaderSet::new();
        fixed.insert(
            ALGORITHM_HEADER.to_string(),
            ClaimValue::from(self.algorithm().as_str()),
        );
        fixed.insert(TYPE_HEADER.to_string(), ClaimValue::from(TOKEN_TYPE));
        let header = merge(&merge(&defaults, header), &fixed);

        let header_json = serde_json::to_vec(&header)
            .map_err(|e| TokenError::signing(format!("Failed to encode header: {}", e)))?;
        let claims_json = serde_json::to_vec(claims)
            .map_err(|e| TokenError::signing(format!("Failed to encode claims: {}", e)))?;

        let signing_input = format!(
            "{}.{}",
            encode_segment(&header_json),
            encode_segment(&claims_json)
        );
        let signature = self
            .key
            .sign(signing_input.as_bytes())
            .map_err(|e| TokenError::signing(format!("Failed to sign token: {}", e)))?;

        debug!(alg = %self.algorithm(), claims = claims.len(), "Signed token");
        Ok(format!("{}.{}", signing_input, encode_segment(&signature)))
    }
}

fn is_finite(value: &ClaimValue) -> bool {
    match value {
        ClaimValue::Float(f) => f.is_finite(),
        ClaimValue::List(items) => items.iter().all(is_finite),
        ClaimValue::Map(entries) => entries.values().all(is_finite),
        _ => true,
    }
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("algorithm", &self.algorithm())
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}
