//! # Sigil Token
//!
//! Core token cryptography for the Sigil authorization server.
//!
//! This crate loads RSA key material, signs and verifies compact JWTs and
//! mints access/refresh token pairs. It performs no networking and holds no
//! mutable state, so every type can be shared freely between threads.
//!
//! ## Features
//!
//! - Key loading: Inline PEM, `file://` references or bare paths
//! - Signing: Caller supplied headers, with `alg` and `typ` reserved
//! - Verification: The algorithm is pinned by the verifier, never by the token
//! - Issuance: Access tokens with a unique `jti`, optional refresh tokens
//!
//! ## Usage
//!
//! ```no_run
//! use chrono::{Duration, Utc};
//! use sigil_token::{
//!     AccessTokenIssuer, ClaimsCarrier, KeyPair, SigningAlgorithm, TokenSigner, TokenVerifier,
//! };
//!
//! fn main() -> Result<(), sigil_token::TokenError> {
//!     let (private_key, public_key) =
//!         KeyPair::load("file:///etc/sigil/private.pem", "file:///etc/sigil/public.pem")?
//!             .into_parts();
//!
//!     let issuer = AccessTokenIssuer::new(TokenSigner::new(private_key, SigningAlgorithm::RS256));
//!     let verifier = TokenVerifier::new(public_key, SigningAlgorithm::RS256);
//!
//!     let now = Utc::now();
//!     let carrier = ClaimsCarrier::new(
//!         "session-1",
//!         "https://sigil.example",
//!         "alice",
//!         "my-client",
//!         now + Duration::hours(1),
//!         now,
//!         now,
//!     );
//!
//!     let tokens = issuer.generate_access_token(&carrier, true)?;
//!     let verified = verifier.verify_token(&tokens.access_token)?;
//!     println!("Token issued to {:?}", verified.subject());
//!     Ok(())
//! }
//! ```

mod claims;
mod error;
mod issue;
mod keys;
mod sign;
mod utils;
mod verify;

pub use claims::{merge, names, ClaimSet, ClaimValue, ClaimsCarrier, HeaderSet};
pub use error::TokenError;
pub use issue::{AccessTokenIssuer, IssuedTokens, TokenTimeConfig};
pub use keys::{
    load_certificate, private_key_from_pem, public_key_from_pem, KeyPair, SigningAlgorithm,
};
pub use sign::TokenSigner;
pub use utils::{decode_segment, encode_segment};
pub use verify::{TokenVerifier, VerifiedToken};

// Re-export key types that are needed for public API
pub use rsa::{RsaPrivateKey, RsaPublicKey};

#[cfg(test)]
mod fixtures {
    pub const ISSUER_PRIVATE_KEY: &str = include_str!("../tests/fixtures/issuer_private.pem");
    pub const ISSUER_PRIVATE_KEY_PKCS1: &str =
        include_str!("../tests/fixtures/issuer_private_pkcs1.pem");
    pub const ISSUER_PUBLIC_KEY: &str = include_str!("../tests/fixtures/issuer_public.pem");
    pub const FOREIGN_PRIVATE_KEY: &str = include_str!("../tests/fixtures/foreign_private.pem");
    pub const FOREIGN_PUBLIC_KEY: &str = include_str!("../tests/fixtures/foreign_public.pem");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{ISSUER_PRIVATE_KEY, ISSUER_PUBLIC_KEY};
    use std::sync::Arc;
    use std::thread;

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    fn claims(pairs: &[(&str, ClaimValue)]) -> ClaimSet {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn test_sign_and_verify() {
        let pair = KeyPair::load(ISSUER_PRIVATE_KEY, ISSUER_PUBLIC_KEY).unwrap();
        let (private_key, public_key) = pair.into_parts();
        let signer = TokenSigner::new(private_key, SigningAlgorithm::RS256);
        let verifier = TokenVerifier::new(public_key, SigningAlgorithm::RS256);

        let cases: Vec<(ClaimSet, bool)> = vec![
            (ClaimSet::new(), false),
            (claims(&[("exp", (now() + 3600).into())]), true),
            (claims(&[("exp", (now() - 3600).into())]), false),
            (claims(&[("nbf", (now() + 3600).into())]), false),
            (
                claims(&[
                    ("nbf", (now() - 3600).into()),
                    ("exp", (now() + 3600).into()),
                ]),
                true,
            ),
            (
                claims(&[
                    ("nbf", (now() + 3600).into()),
                    ("exp", (now() + 7200).into()),
                ]),
                false,
            ),
            (
                claims(&[
                    ("exp", (now() + 3600).into()),
                    ("scope", vec![ClaimValue::from("read"), "write".into()].into()),
                    ("admin", false.into()),
                ]),
                true,
            ),
        ];

        for (i, (claims, valid)) in cases.iter().enumerate() {
            let token = signer.sign_token(claims, &HeaderSet::new()).unwrap();
            let result = verifier.verify_token(&token);
            assert_eq!(result.is_ok(), *valid, "Case {}: {:?}", i, result);
            if let Ok(verified) = result {
                assert_eq!(&verified.claims, claims, "Case {}", i);
            }
        }
    }

    #[test]
    fn test_shared_between_threads() {
        let signer = Arc::new(
            TokenSigner::from_pem(ISSUER_PRIVATE_KEY, SigningAlgorithm::RS256)
                .unwrap()
                .with_key_id("shared"),
        );
        let verifier =
            Arc::new(TokenVerifier::from_pem(ISSUER_PUBLIC_KEY, SigningAlgorithm::RS256).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let signer = Arc::clone(&signer);
                let verifier = Arc::clone(&verifier);
                thread::spawn(move || {
                    let claims = claims(&[
                        ("sub", format!("user-{}", i).into()),
                        ("exp", (now() + 60).into()),
                    ]);
                    let token = signer.sign_token(&claims, &HeaderSet::new()).unwrap();
                    let verified = verifier.verify_token(&token).unwrap();
                    assert_eq!(verified.subject(), Some(format!("user-{}", i).as_str()));
                    assert_eq!(verified.header["kid"].as_str(), Some("shared"));
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_validation_errors() {
        let verifier = TokenVerifier::from_pem(ISSUER_PUBLIC_KEY, SigningAlgorithm::RS256).unwrap();
        let err = verifier.verify_token("not-a-token").unwrap_err();
        assert!(err.is_validation_error());
        assert!(!TokenError::header_injection("alg").is_validation_error());
        assert!(!TokenError::certificate("missing").is_validation_error());
    }
}
