use std::fmt;
use std::fs::read_to_string;
use std::str::FromStr;

use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::der::pem;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use tracing::debug;

use crate::error::TokenError;

const PEM_BEGIN: &str = "-----BEGIN ";
const FILE_SCHEME: &str = "file://";

/// Signature algorithms a key pair can be pinned to.
///
/// The algorithm is chosen once, when a signer or verifier is built. A token
/// can only fail to match it, never change it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SigningAlgorithm {
    /// RSASSA-PKCS1-v1_5 using SHA-256
    #[default]
    RS256,
    /// RSASSA-PKCS1-v1_5 using SHA-384
    RS384,
    /// RSASSA-PKCS1-v1_5 using SHA-512
    RS512,
}

impl SigningAlgorithm {
    /// Name used in the `alg` header
    pub fn as_str(&self) -> &'static str {
        match self {
            SigningAlgorithm::RS256 => "RS256",
            SigningAlgorithm::RS384 => "RS384",
            SigningAlgorithm::RS512 => "RS512",
        }
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SigningAlgorithm {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "RS256" => Ok(SigningAlgorithm::RS256),
            "RS384" => Ok(SigningAlgorithm::RS384),
            "RS512" => Ok(SigningAlgorithm::RS512),
            _ => Err(TokenError::certificate(format!(
                "Unsupported algorithm '{}', must be RS256, RS384 or RS512",
                s
            ))),
        }
    }
}

/// Resolve PEM key material from inline text or a file reference.
///
/// `source` is either the PEM text itself, a `file://PATH` reference, or a
/// bare `PATH`. The resolved text must contain a well formed PEM block.
///
/// # Returns
///
/// The PEM text, exactly as it was supplied or stored on disk
pub fn load_certificate(source: &str) -> Result<String, TokenError> {
    let trimmed = source.trim();
    if trimmed.is_empty() {
        return Err(TokenError::certificate("Certificate source is empty"));
    }

    if trimmed.starts_with(PEM_BEGIN) {
        validate_pem(trimmed)?;
        debug!("Resolved inline PEM key material");
        return Ok(source.to_string());
    }

    let path = trimmed.strip_prefix(FILE_SCHEME).unwrap_or(trimmed);
    let contents = read_to_string(path).map_err(|e| {
        TokenError::certificate(format!("Failed to read certificate '{}': {}", path, e))
    })?;
    validate_pem(&contents)?;
    debug!(path, "Resolved PEM key material from file");
    Ok(contents)
}

fn validate_pem(text: &str) -> Result<(), TokenError> {
    let (label, body) = pem::decode_vec(text.trim().as_bytes())
        .map_err(|e| TokenError::certificate(format!("Invalid PEM: {}", e)))?;
    if label.is_empty() {
        return Err(TokenError::certificate("PEM block has an empty label"));
    }
    if body.is_empty() {
        return Err(TokenError::certificate(format!(
            "PEM block {} has an empty body",
            label
        )));
    }
    Ok(())
}

/// Parse an RSA private key from PKCS#8 or PKCS#1 PEM
pub fn private_key_from_pem(pem: &str) -> Result<RsaPrivateKey, TokenError> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|e| TokenError::certificate(format!("Failed to parse private key: {}", e)))
}

/// Parse an RSA public key from SPKI or PKCS#1 PEM
pub fn public_key_from_pem(pem: &str) -> Result<RsaPublicKey, TokenError> {
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| TokenError::certificate(format!("Failed to parse public key: {}", e)))
}

/// An RSA key pair. Immutable once loaded.
#[derive(Clone)]
pub struct KeyPair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl KeyPair {
    pub fn new(private: RsaPrivateKey, public: RsaPublicKey) -> Self {
        Self { private, public }
    }

    pub fn from_pem(private_pem: &str, public_pem: &str) -> Result<Self, TokenError> {
        Ok(Self::new(
            private_key_from_pem(private_pem)?,
            public_key_from_pem(public_pem)?,
        ))
    }

    /// Resolve both halves through [`load_certificate`] and parse them
    pub fn load(private_source: &str, public_source: &str) -> Result<Self, TokenError> {
        let private_pem = load_certificate(private_source)?;
        let public_pem = load_certificate(public_source)?;
        Self::from_pem(&private_pem, &public_pem)
    }

    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    /// Split the pair so the signer and verifier each own their half
    pub fn into_parts(self) -> (RsaPrivateKey, RsaPublicKey) {
        (self.private, self.public)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("modulus_bits", &(self.public.size() * 8))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{
        FOREIGN_PUBLIC_KEY, ISSUER_PRIVATE_KEY, ISSUER_PRIVATE_KEY_PKCS1, ISSUER_PUBLIC_KEY,
    };
    use std::fs;

    #[test]
    fn test_load_certificate() {
        let dir = tempfile::tempdir().unwrap();
        let private_path = dir.path().join("private.pem");
        let public_path = dir.path().join("public.pem");
        fs::write(&private_path, ISSUER_PRIVATE_KEY).unwrap();
        fs::write(&public_path, ISSUER_PUBLIC_KEY).unwrap();

        let cases = [
            (format!("file://{}", private_path.display()), ISSUER_PRIVATE_KEY),
            (public_path.display().to_string(), ISSUER_PUBLIC_KEY),
            (ISSUER_PRIVATE_KEY.to_string(), ISSUER_PRIVATE_KEY),
            (ISSUER_PUBLIC_KEY.to_string(), ISSUER_PUBLIC_KEY),
            (ISSUER_PRIVATE_KEY_PKCS1.to_string(), ISSUER_PRIVATE_KEY_PKCS1),
        ];
        for (source, expected) in cases.iter() {
            let out = load_certificate(source).unwrap();
            assert_eq!(&out, expected);
        }
    }

    #[test]
    fn test_load_certificate_rejects_bad_sources() {
        let dir = tempfile::tempdir().unwrap();
        let not_pem = dir.path().join("notes.txt");
        fs::write(&not_pem, "just some text").unwrap();

        for source in [
            String::new(),
            "   ".to_string(),
            "foobar".to_string(),
            "file:///definitely/not/here.pem".to_string(),
            not_pem.display().to_string(),
            "-----BEGIN PUBLIC KEY-----\n!!!!\n-----END PUBLIC KEY-----".to_string(),
            "-----BEGIN PUBLIC KEY-----\nMIIB\n-----END PRIVATE KEY-----".to_string(),
            "-----BEGIN PUBLIC KEY-----\n-----END PUBLIC KEY-----".to_string(),
            "-----BEGIN PUBLIC KEY-----\nMIIB\n".to_string(),
            "-----BEGIN -----\nMIIB\n-----END -----".to_string(),
            ISSUER_PUBLIC_KEY.replacen('M', "*", 1),
            ISSUER_PRIVATE_KEY_PKCS1.replacen(
                "-----\n",
                "-----\nProc-Type: 4,ENCRYPTED\nDEK-Info: AES-128-CBC,00\n\n",
                1,
            ),
        ] {
            match load_certificate(&source) {
                Err(TokenError::Certificate(_)) => {}
                other => panic!("Expected certificate error for {:?}, got {:?}", source, other),
            }
        }
    }

    #[test]
    fn test_parse_key_formats() {
        let pkcs8 = private_key_from_pem(ISSUER_PRIVATE_KEY).unwrap();
        let pkcs1 = private_key_from_pem(ISSUER_PRIVATE_KEY_PKCS1).unwrap();
        assert_eq!(pkcs8, pkcs1);

        let public = public_key_from_pem(ISSUER_PUBLIC_KEY).unwrap();
        assert_eq!(pkcs8.to_public_key(), public);
        assert_ne!(public_key_from_pem(FOREIGN_PUBLIC_KEY).unwrap(), public);

        assert!(private_key_from_pem(ISSUER_PUBLIC_KEY).is_err());
        assert!(public_key_from_pem("").is_err());
    }

    #[test]
    fn test_key_pair_load() {
        let pair = KeyPair::load(ISSUER_PRIVATE_KEY, ISSUER_PUBLIC_KEY).unwrap();
        assert_eq!(pair.private_key().to_public_key(), *pair.public_key());
        assert!(format!("{:?}", pair).contains("2048"));

        assert!(matches!(
            KeyPair::load("", ISSUER_PUBLIC_KEY),
            Err(TokenError::Certificate(_))
        ));
    }

    #[test]
    fn test_algorithm_names() {
        assert_eq!("rs384".parse::<SigningAlgorithm>().unwrap(), SigningAlgorithm::RS384);
        assert_eq!(SigningAlgorithm::default().to_string(), "RS256");
        assert!("HS256".parse::<SigningAlgorithm>().is_err());
        assert!("none".parse::<SigningAlgorithm>().is_err());
    }
}
