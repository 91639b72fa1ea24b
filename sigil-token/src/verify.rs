use chrono::{DateTime, Utc};
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::signature::Verifier;
use rsa::RsaPublicKey;
use sha2::{Sha256, Sha384, Sha512};
use tracing::{debug, warn};

use crate::claims::{names, ClaimSet, ClaimValue, HeaderSet};
use crate::error::TokenError;
use crate::keys::{public_key_from_pem, SigningAlgorithm};
use crate::sign::ALGORITHM_HEADER;
use crate::utils::decode_segment;

/// A public key bound to the one algorithm it accepts.
///
/// Which variant is used is decided when the verifier is constructed. The
/// `alg` header of a presented token never selects it; the header only has
/// to agree with it.
#[derive(Clone)]
enum PinnedVerifyingKey {
    Rs256(VerifyingKey<Sha256>),
    Rs384(VerifyingKey<Sha384>),
    Rs512(VerifyingKey<Sha512>),
}

impl PinnedVerifyingKey {
    fn new(public_key: RsaPublicKey, algorithm: SigningAlgorithm) -> Self {
        match algorithm {
            SigningAlgorithm::RS256 => PinnedVerifyingKey::Rs256(VerifyingKey::new(public_key)),
            SigningAlgorithm::RS384 => PinnedVerifyingKey::Rs384(VerifyingKey::new(public_key)),
            SigningAlgorithm::RS512 => PinnedVerifyingKey::Rs512(VerifyingKey::new(public_key)),
        }
    }

    fn algorithm(&self) -> SigningAlgorithm {
        match self {
            PinnedVerifyingKey::Rs256(_) => SigningAlgorithm::RS256,
            PinnedVerifyingKey::Rs384(_) => SigningAlgorithm::RS384,
            PinnedVerifyingKey::Rs512(_) => SigningAlgorithm::RS512,
        }
    }

    fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), TokenError> {
        let signature =
            Signature::try_from(signature).map_err(|_| TokenError::InvalidSignature)?;
        let result = match self {
            PinnedVerifyingKey::Rs256(key) => key.verify(message, &signature),
            PinnedVerifyingKey::Rs384(key) => key.verify(message, &signature),
            PinnedVerifyingKey::Rs512(key) => key.verify(message, &signature),
        };
        result.map_err(|_| TokenError::InvalidSignature)
    }
}

/// A token that passed signature and temporal validation
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedToken {
    pub header: HeaderSet,
    pub claims: ClaimSet,
    pub valid: bool,
}

impl VerifiedToken {
    pub fn subject(&self) -> Option<&str> {
        self.claims.get(names::SUBJECT).and_then(ClaimValue::as_str)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.claims
            .get(names::EXPIRES_AT)
            .and_then(ClaimValue::as_i64)
            .and_then(|exp| DateTime::from_timestamp(exp, 0))
    }
}

/// Checks compact tokens against a trusted public key.
///
/// The verifier is immutable and can be shared between threads.
#[derive(Clone)]
pub struct TokenVerifier {
    key: PinnedVerifyingKey,
    leeway: i64,
}

impl TokenVerifier {
    pub fn new(public_key: RsaPublicKey, algorithm: SigningAlgorithm) -> Self {
        Self {
            key: PinnedVerifyingKey::new(public_key, algorithm),
            leeway: 0,
        }
    }

    pub fn from_pem(public_pem: &str, algorithm: SigningAlgorithm) -> Result<Self, TokenError> {
        Ok(Self::new(public_key_from_pem(public_pem)?, algorithm))
    }

    /// Tolerate clock skew of `seconds` on `exp` and `nbf`
    pub fn with_leeway(mut self, seconds: u64) -> Self {
        self.leeway = i64::try_from(seconds).unwrap_or(i64::MAX);
        self
    }

    pub fn algorithm(&self) -> SigningAlgorithm {
        self.key.algorithm()
    }

    /// Verify a compact token against the current time
    pub fn verify_token(&self, token: &str) -> Result<VerifiedToken, TokenError> {
        self.verify_token_at(token, Utc::now())
    }

    /// Verify a compact token against the given point in time.
    ///
    /// # Errors
    ///
    /// - `MalformedToken` if the token is not three base64url segments holding
    ///   JSON objects
    /// - `InvalidSignature` if the signature does not verify with the pinned
    ///   algorithm and key
    /// - `Expired`, `NotYetValid` or `InvalidTemporalClaims` if the temporal
    ///   claims do not admit `now`
    pub fn verify_token_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<VerifiedToken, TokenError> {
        let result = self.check(token, now.timestamp());
        match &result {
            Ok(verified) => debug!(
                alg = %self.algorithm(),
                sub = verified.subject().unwrap_or_default(),
                "Token verified"
            ),
            Err(e) => warn!(alg = %self.algorithm(), error = %e, "Token rejected"),
        }
        result
    }

    fn check(&self, token: &str, now: i64) -> Result<VerifiedToken, TokenError> {
        let segments: Vec<&str> = token.split('.').collect();
        let &[header_segment, claims_segment, signature_segment] = segments.as_slice() else {
            return Err(TokenError::malformed(format!(
                "Expected 3 segments, found {}",
                segments.len()
            )));
        };
        if header_segment.is_empty() || claims_segment.is_empty() {
            return Err(TokenError::malformed("Empty header or claims segment"));
        }

        let header: HeaderSet = parse_object(&decode_segment(header_segment)?, "header")?;
        let claims_json = decode_segment(claims_segment)?;
        let signature = decode_segment(signature_segment)?;

        let declared = header.get(ALGORITHM_HEADER).and_then(ClaimValue::as_str);
        if declared != Some(self.algorithm().as_str()) {
            debug!(
                declared = declared.unwrap_or("<missing>"),
                pinned = %self.algorithm(),
                "Header algorithm does not match the pinned algorithm"
            );
            return Err(TokenError::InvalidSignature);
        }

        // the signing input is the untrusted text exactly as presented
        let signing_input_len = header_segment.len() + 1 + claims_segment.len();
        self.key
            .verify(token[..signing_input_len].as_bytes(), &signature)?;

        let claims: ClaimSet = parse_object(&claims_json, "claims")?;
        validate_time_claims(&claims, now, self.leeway)?;

        Ok(VerifiedToken {
            header,
            claims,
            valid: true,
        })
    }
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("algorithm", &self.algorithm())
            .field("leeway", &self.leeway)
            .finish_non_exhaustive()
    }
}

fn parse_object(bytes: &[u8], what: &str) -> Result<ClaimSet, TokenError> {
    serde_json::from_slice(bytes)
        .map_err(|e| TokenError::malformed(format!("Token {} is not a JSON object: {}", what, e)))
}

fn numeric_claim(claims: &ClaimSet, name: &str) -> Result<Option<i64>, TokenError> {
    match claims.get(name) {
        None => Ok(None),
        Some(value) => value.as_i64().map(Some).ok_or_else(|| {
            TokenError::invalid_temporal_claims(format!("Claim '{}' is not a NumericDate", name))
        }),
    }
}

/// A token is accepted only when `nbf <= now < exp`, with `exp` mandatory.
fn validate_time_claims(claims: &ClaimSet, now: i64, leeway: i64) -> Result<(), TokenError> {
    let expires_at = numeric_claim(claims, names::EXPIRES_AT)?;
    let not_before = numeric_claim(claims, names::NOT_BEFORE)?;

    if let Some(exp) = expires_at {
        if exp <= now.saturating_sub(leeway) {
            return Err(TokenError::Expired);
        }
    }
    if let Some(nbf) = not_before {
        if nbf > now.saturating_add(leeway) {
            return Err(TokenError::NotYetValid);
        }
    }
    if expires_at.is_none() {
        return Err(TokenError::invalid_temporal_claims(
            "Token does not carry an expiry",
        ));
    }
    Ok(())
}
