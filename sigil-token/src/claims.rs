use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Claim names understood by the signer, verifier and issuer.
pub mod names {
    pub const ISSUER: &str = "iss";
    pub const SUBJECT: &str = "sub";
    pub const AUDIENCE: &str = "aud";
    pub const EXPIRES_AT: &str = "exp";
    pub const NOT_BEFORE: &str = "nbf";
    pub const ISSUED_AT: &str = "iat";
    pub const TOKEN_ID: &str = "jti";
    pub const SESSION_ID: &str = "sid";
    pub const TOKEN_USE: &str = "token_use";
}

/// A claim or header value.
///
/// Only the shapes a token may carry are representable. Timestamps are
/// stored as integer Unix seconds, see [`ClaimValue::timestamp`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClaimValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<ClaimValue>),
    Map(BTreeMap<String, ClaimValue>),
}

/// Claims of a token, keyed by claim name.
pub type ClaimSet = BTreeMap<String, ClaimValue>;

/// Header fields of a token, keyed by header name.
pub type HeaderSet = BTreeMap<String, ClaimValue>;

impl ClaimValue {
    /// Encode a point in time as a NumericDate (seconds since the epoch)
    pub fn timestamp(at: DateTime<Utc>) -> Self {
        ClaimValue::Integer(at.timestamp())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ClaimValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric value in whole seconds. Fractional NumericDates are truncated.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ClaimValue::Integer(i) => Some(*i),
            ClaimValue::Float(f) if f.is_finite() => Some(f.trunc() as i64),
            _ => None,
        }
    }
}

impl From<&str> for ClaimValue {
    fn from(value: &str) -> Self {
        ClaimValue::String(value.to_string())
    }
}

impl From<String> for ClaimValue {
    fn from(value: String) -> Self {
        ClaimValue::String(value)
    }
}

impl From<i64> for ClaimValue {
    fn from(value: i64) -> Self {
        ClaimValue::Integer(value)
    }
}

impl From<f64> for ClaimValue {
    fn from(value: f64) -> Self {
        ClaimValue::Float(value)
    }
}

impl From<bool> for ClaimValue {
    fn from(value: bool) -> Self {
        ClaimValue::Bool(value)
    }
}

impl From<Vec<ClaimValue>> for ClaimValue {
    fn from(value: Vec<ClaimValue>) -> Self {
        ClaimValue::List(value)
    }
}

impl From<ClaimSet> for ClaimValue {
    fn from(value: ClaimSet) -> Self {
        ClaimValue::Map(value)
    }
}

impl From<DateTime<Utc>> for ClaimValue {
    fn from(value: DateTime<Utc>) -> Self {
        ClaimValue::timestamp(value)
    }
}

/// Combine two claim (or header) sets.
///
/// The result holds every key of `base` and `overlay`. When a key is
/// present in both, the value from `overlay` wins. Neither input is
/// modified.
pub fn merge(base: &ClaimSet, overlay: &ClaimSet) -> ClaimSet {
    let mut merged = base.clone();
    for (name, value) in overlay {
        merged.insert(name.clone(), value.clone());
    }
    merged
}

/// The canonical claims of one issuance event.
///
/// A carrier is built from session data right before tokens are minted and
/// dropped afterwards. Extra claims attached with [`ClaimsCarrier::with_claim`]
/// end up in the access token only, underneath the standard claims.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimsCarrier {
    session_id: String,
    issuer: String,
    subject: String,
    audience: String,
    expires_at: DateTime<Utc>,
    not_before: DateTime<Utc>,
    issued_at: DateTime<Utc>,
    extra: ClaimSet,
}

impl ClaimsCarrier {
    pub fn new(
        session_id: impl Into<String>,
        issuer: impl Into<String>,
        subject: impl Into<String>,
        audience: impl Into<String>,
        expires_at: DateTime<Utc>,
        not_before: DateTime<Utc>,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            issuer: issuer.into(),
            subject: subject.into(),
            audience: audience.into(),
            expires_at,
            not_before,
            issued_at,
            extra: ClaimSet::new(),
        }
    }

    /// Attach caller-supplied claims. Standard claims always take precedence.
    pub fn with_extra_claims(mut self, extra: ClaimSet) -> Self {
        self.extra = merge(&self.extra, &extra);
        self
    }

    pub fn with_claim(mut self, name: impl Into<String>, value: impl Into<ClaimValue>) -> Self {
        self.extra.insert(name.into(), value.into());
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn extra_claims(&self) -> &ClaimSet {
        &self.extra
    }

    /// The standard claims of this session, without extra claims
    pub fn to_claim_set(&self) -> ClaimSet {
        let mut claims = ClaimSet::new();
        claims.insert(names::ISSUER.into(), self.issuer.as_str().into());
        claims.insert(names::SUBJECT.into(), self.subject.as_str().into());
        claims.insert(names::AUDIENCE.into(), self.audience.as_str().into());
        claims.insert(names::EXPIRES_AT.into(), self.expires_at.into());
        claims.insert(names::NOT_BEFORE.into(), self.not_before.into());
        claims.insert(names::ISSUED_AT.into(), self.issued_at.into());
        claims.insert(names::SESSION_ID.into(), self.session_id.as_str().into());
        claims
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn set(pairs: &[(&str, &str)]) -> ClaimSet {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), ClaimValue::from(*v)))
            .collect()
    }

    #[test]
    fn test_merge() {
        let cases = [
            (
                set(&[("foo", "bar")]),
                set(&[("baz", "bar")]),
                set(&[("foo", "bar"), ("baz", "bar")]),
            ),
            (
                set(&[("foo", "bar")]),
                set(&[("foo", "baz")]),
                set(&[("foo", "baz")]),
            ),
            (set(&[]), set(&[("foo", "baz")]), set(&[("foo", "baz")])),
            (
                set(&[("foo", "bar")]),
                set(&[("foo", "baz"), ("bar", "baz")]),
                set(&[("foo", "baz"), ("bar", "baz")]),
            ),
            (set(&[("foo", "bar")]), set(&[]), set(&[("foo", "bar")])),
        ];

        for (i, (base, overlay, expected)) in cases.iter().enumerate() {
            assert_eq!(&merge(base, overlay), expected, "Case {}", i);
        }
    }

    #[test]
    fn test_merge_leaves_inputs_untouched() {
        let base = set(&[("foo", "bar")]);
        let overlay = set(&[("foo", "baz")]);
        let _ = merge(&base, &overlay);
        assert_eq!(base, set(&[("foo", "bar")]));
        assert_eq!(overlay, set(&[("foo", "baz")]));
    }

    #[test]
    fn test_claim_value_json_shapes() {
        let json = r#"{"a":true,"b":12,"c":1.5,"d":"x","e":[1,"y"],"f":{"g":3}}"#;
        let claims: ClaimSet = serde_json::from_str(json).unwrap();
        assert_eq!(claims["a"], ClaimValue::Bool(true));
        assert_eq!(claims["b"], ClaimValue::Integer(12));
        assert_eq!(claims["c"], ClaimValue::Float(1.5));
        assert_eq!(claims["d"].as_str(), Some("x"));
        assert_eq!(
            claims["e"],
            ClaimValue::List(vec![ClaimValue::Integer(1), "y".into()])
        );
        assert!(matches!(claims["f"], ClaimValue::Map(_)));
        assert_eq!(serde_json::to_string(&claims).unwrap(), json);
    }

    #[test]
    fn test_null_is_not_a_claim_value() {
        assert!(serde_json::from_str::<ClaimSet>(r#"{"a":null}"#).is_err());
    }

    #[test]
    fn test_as_i64_truncates_floats() {
        assert_eq!(ClaimValue::Float(10.9).as_i64(), Some(10));
        assert_eq!(ClaimValue::Float(f64::NAN).as_i64(), None);
        assert_eq!(ClaimValue::from("10").as_i64(), None);
    }

    #[test]
    fn test_carrier_claim_set() {
        let now = Utc::now();
        let carrier = ClaimsCarrier::new(
            "session-1",
            "sigil",
            "peter",
            "tests",
            now + Duration::seconds(60),
            now,
            now,
        )
        .with_claim("sub", "mallory")
        .with_claim("scope", "read");

        let claims = carrier.to_claim_set();
        assert_eq!(claims[names::SUBJECT].as_str(), Some("peter"));
        assert_eq!(claims[names::ISSUER].as_str(), Some("sigil"));
        assert_eq!(claims[names::AUDIENCE].as_str(), Some("tests"));
        assert_eq!(claims[names::SESSION_ID].as_str(), Some("session-1"));
        assert_eq!(
            claims[names::EXPIRES_AT].as_i64(),
            Some(now.timestamp() + 60)
        );
        assert!(!claims.contains_key("scope"));

        // extras never replace standard claims once merged underneath them
        let merged = merge(carrier.extra_claims(), &claims);
        assert_eq!(merged[names::SUBJECT].as_str(), Some("peter"));
        assert_eq!(merged["scope"].as_str(), Some("read"));
    }
}
