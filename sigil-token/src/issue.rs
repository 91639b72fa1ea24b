use chrono::Duration;
use tracing::info;
use uuid::Uuid;

use crate::claims::{merge, names, ClaimSet, ClaimValue, ClaimsCarrier, HeaderSet};
use crate::error::TokenError;
use crate::sign::TokenSigner;

const ACCESS_TOKEN_USE: &str = "access";
const REFRESH_TOKEN_USE: &str = "refresh";

/// TokenTimeConfig controls the lifetime of refresh tokens
///
/// Access tokens expire with the session they were issued for
/// (`ClaimsCarrier::expires_at`).
#[derive(Debug, Clone, Copy)]
pub struct TokenTimeConfig {
    /// Refresh token lifetime in seconds, counted from the session's issued-at
    /// time (default: 2592000 seconds = 30 days)
    pub refresh_duration: i64,
}

impl Default for TokenTimeConfig {
    fn default() -> Self {
        Self {
            refresh_duration: 30 * 24 * 60 * 60, // 30 days in seconds
        }
    }
}

/// The tokens minted for one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedTokens {
    pub access_token: String,
    /// Present only when a refresh token was requested
    pub refresh_token: Option<String>,
}

/// Mints access/refresh token pairs from session claims.
#[derive(Debug, Clone)]
pub struct AccessTokenIssuer {
    signer: TokenSigner,
    time_config: TokenTimeConfig,
}

impl AccessTokenIssuer {
    pub fn new(signer: TokenSigner) -> Self {
        Self {
            signer,
            time_config: TokenTimeConfig::default(),
        }
    }

    pub fn with_time_config(mut self, time_config: TokenTimeConfig) -> Self {
        self.time_config = time_config;
        self
    }

    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    /// Mint an access token, and optionally a refresh token, for a session.
    ///
    /// Every token carries its own random `jti`, so the access and refresh
    /// token are never equal even for identical session data.
    ///
    /// # Arguments
    ///
    /// * `carrier` - Standard claims and extra claims of the session
    /// * `include_refresh` - Whether to mint a refresh token as well
    ///
    /// # Returns
    ///
    /// * `Ok(IssuedTokens)` - All requested tokens
    /// * `Err(TokenError::Signing)` - If any token could not be signed; no
    ///   token is returned in that case
    pub fn generate_access_token(
        &self,
        carrier: &ClaimsCarrier,
        include_refresh: bool,
    ) -> Result<IssuedTokens, TokenError> {
        let access_claims = merge(
            carrier.extra_claims(),
            &self.standard_claims(carrier, ACCESS_TOKEN_USE),
        );
        let access_token = self.sign(&access_claims)?;

        let refresh_token = if include_refresh {
            let expires_at = Duration::try_seconds(self.time_config.refresh_duration)
                .and_then(|lifetime| carrier.issued_at().checked_add_signed(lifetime))
                .ok_or_else(|| TokenError::signing("Refresh token lifetime is out of range"))?;
            let mut refresh_claims = self.standard_claims(carrier, REFRESH_TOKEN_USE);
            refresh_claims.insert(names::EXPIRES_AT.into(), expires_at.into());
            Some(self.sign(&refresh_claims)?)
        } else {
            None
        };

        info!(
            sid = carrier.session_id(),
            sub = carrier.subject(),
            refresh = include_refresh,
            "Issued access token"
        );

        Ok(IssuedTokens {
            access_token,
            refresh_token,
        })
    }

    fn standard_claims(&self, carrier: &ClaimsCarrier, token_use: &str) -> ClaimSet {
        let mut claims = carrier.to_claim_set();
        claims.insert(
            names::TOKEN_ID.into(),
            ClaimValue::from(Uuid::new_v4().to_string()),
        );
        claims.insert(names::TOKEN_USE.into(), token_use.into());
        claims
    }

    fn sign(&self, claims: &ClaimSet) -> Result<String, TokenError> {
        self.signer
            .sign_token(claims, &HeaderSet::new())
            .map_err(|e| match e {
                TokenError::Signing(_) => e,
                other => TokenError::signing(other.to_string()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{ISSUER_PRIVATE_KEY, ISSUER_PUBLIC_KEY};
    use crate::keys::SigningAlgorithm;
    use crate::verify::TokenVerifier;
    use chrono::Utc;

    fn issuer() -> AccessTokenIssuer {
        AccessTokenIssuer::new(
            TokenSigner::from_pem(ISSUER_PRIVATE_KEY, SigningAlgorithm::RS256).unwrap(),
        )
    }

    fn verifier() -> TokenVerifier {
        TokenVerifier::from_pem(ISSUER_PUBLIC_KEY, SigningAlgorithm::RS256).unwrap()
    }

    fn carrier() -> ClaimsCarrier {
        let now = Utc::now();
        ClaimsCarrier::new(
            Uuid::new_v4().to_string(),
            "sigil",
            "peter",
            "tests",
            now + Duration::seconds(60),
            now,
            now,
        )
    }

    #[test]
    fn test_generate_access_token() {
        let tokens = issuer().generate_access_token(&carrier(), true).unwrap();
        let refresh_token = tokens.refresh_token.clone().unwrap();
        assert!(!tokens.access_token.is_empty());
        assert!(!refresh_token.is_empty());
        assert_ne!(tokens.access_token, refresh_token);
    }

    #[test]
    fn test_tokens_unique_across_calls() {
        let issuer = issuer();
        let carrier = carrier();
        let first = issuer.generate_access_token(&carrier, true).unwrap();
        let second = issuer.generate_access_token(&carrier, true).unwrap();
        assert_ne!(first.access_token, second.access_token);
        assert_ne!(first.refresh_token, second.refresh_token);
        assert_ne!(Some(first.access_token), second.refresh_token);
    }

    #[test]
    fn test_refresh_token_is_optional() {
        let tokens = issuer().generate_access_token(&carrier(), false).unwrap();
        assert!(tokens.refresh_token.is_none());
        assert!(verifier().verify_token(&tokens.access_token).is_ok());
    }

    #[test]
    fn test_issued_claims() {
        let mut extra = ClaimSet::new();
        extra.insert("sub".into(), "mallory".into());
        extra.insert("scope".into(), "openid".into());
        extra.insert("tenant".into(), "acme".into());
        let carrier = carrier()
            .with_claim("scope", "profile")
            .with_extra_claims(extra)
            .with_claim("scope", "openid offline");
        let issuer = issuer().with_time_config(TokenTimeConfig {
            refresh_duration: 3600,
        });
        let tokens = issuer.generate_access_token(&carrier, true).unwrap();

        let access = verifier().verify_token(&tokens.access_token).unwrap();
        assert_eq!(access.subject(), Some("peter"));
        assert_eq!(access.claims["scope"].as_str(), Some("openid offline"));
        assert_eq!(access.claims["tenant"].as_str(), Some("acme"));
        assert_eq!(access.claims["token_use"].as_str(), Some("access"));
        assert_eq!(access.claims["sid"].as_str(), Some(carrier.session_id()));
        assert_eq!(
            access.expires_at().map(|t| t.timestamp()),
            Some(carrier.expires_at().timestamp())
        );

        let refresh = verifier()
            .verify_token(tokens.refresh_token.as_deref().unwrap())
            .unwrap();
        assert_eq!(refresh.subject(), Some("peter"));
        assert_eq!(refresh.claims["token_use"].as_str(), Some("refresh"));
        assert!(!refresh.claims.contains_key("scope"));
        assert!(!refresh.claims.contains_key("tenant"));
        assert_eq!(
            refresh.claims["exp"].as_i64(),
            Some(carrier.issued_at().timestamp() + 3600)
        );
        assert_ne!(access.claims["jti"], refresh.claims["jti"]);
    }

    #[test]
    fn test_refresh_lifetime_out_of_range() {
        let issuer = issuer().with_time_config(TokenTimeConfig {
            refresh_duration: i64::MAX,
        });
        assert!(matches!(
            issuer.generate_access_token(&carrier(), true),
            Err(TokenError::Signing(_))
        ));
        assert!(issuer.generate_access_token(&carrier(), false).is_ok());
    }
}
