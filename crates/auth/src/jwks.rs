//! Public JSON Web Key Set derived from the key store.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::keys::{KeyStore, VerificationKey};

/// `Cache-Control` value for the published key set.
pub const JWKS_CACHE_CONTROL: &str = "public, max-age=3600";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(rename = "use")]
    pub key_use: String,
    pub alg: String,
    pub kid: String,
    pub n: String,
    pub e: String,
}

impl From<&VerificationKey> for Jwk {
    fn from(key: &VerificationKey) -> Self {
        Self {
            kty: "RSA".to_string(),
            key_use: "sig".to_string(),
            alg: "RS256".to_string(),
            kid: key.kid().to_string(),
            n: key.modulus_b64().to_string(),
            e: key.exponent_b64().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

impl JwkSet {
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid == kid)
    }
}

/// Publishes every verification key the service currently accepts.
///
/// The set only changes when keys are reloaded, so it is computed once along
/// with its validator tag.
#[derive(Debug, Clone)]
pub struct JwksPublisher {
    set: Arc<JwkSet>,
    etag: Arc<str>,
}

impl JwksPublisher {
    pub fn new(keys: &KeyStore) -> Self {
        let set = JwkSet {
            keys: keys.verification_keys().map(Jwk::from).collect(),
        };
        let etag = etag_for(&set);
        Self {
            set: Arc::new(set),
            etag: etag.into(),
        }
    }

    pub fn publish(&self) -> Arc<JwkSet> {
        self.set.clone()
    }

    /// Weak validator over the published key material, e.g. `W/"3f9a..."`.
    pub fn etag(&self) -> &str {
        &self.etag
    }

    /// Whether an `If-None-Match` header value covers the current set.
    pub fn matches(&self, if_none_match: &str) -> bool {
        if_none_match.split(',').map(str::trim).any(|candidate| {
            candidate == "*" || weak_eq(candidate, &self.etag)
        })
    }
}

fn etag_for(set: &JwkSet) -> String {
    let mut hasher = Sha256::new();
    for key in &set.keys {
        for part in [&key.kid, &key.n, &key.e] {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
    }
    let digest = hasher.finalize();
    let short: String = digest[..16].iter().map(|b| format!("{b:02x}")).collect();
    format!("W/\"{short}\"")
}

/// Weak comparison: the `W/` prefix is ignored on both sides.
fn weak_eq(a: &str, b: &str) -> bool {
    a.trim_start_matches("W/") == b.trim_start_matches("W/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::testkeys::*;
    use crate::keys::{KeyId, load_public_key};

    #[test]
    fn publishes_rsa_signing_key() {
        let store = primary_store();
        let jwks = JwksPublisher::new(&store).publish();

        assert_eq!(jwks.keys.len(), 1);
        let jwk = &jwks.keys[0];
        assert_eq!(jwk.kty, "RSA");
        assert_eq!(jwk.key_use, "sig");
        assert_eq!(jwk.alg, "RS256");
        assert_eq!(jwk.e, "AQAB");
        assert_eq!(jwk.kid, store.current_key_id().as_str());
        // 2048-bit modulus, no sign byte: 256 bytes -> 342 base64url chars.
        assert_eq!(jwk.n.len(), 342);
    }

    #[test]
    fn serializes_use_field() {
        let jwks = JwksPublisher::new(&primary_store()).publish();
        let value = serde_json::to_value(&*jwks).unwrap();
        assert_eq!(value["keys"][0]["use"], "sig");
        assert!(value["keys"][0].get("key_use").is_none());
    }

    #[test]
    fn kid_is_stable_and_changes_with_the_key() {
        let a1 = JwksPublisher::new(&primary_store());
        let a2 = JwksPublisher::new(&primary_store());
        let b = JwksPublisher::new(&secondary_store());

        assert_eq!(a1.publish().keys[0].kid, a2.publish().keys[0].kid);
        assert_ne!(a1.publish().keys[0].kid, b.publish().keys[0].kid);
        assert_eq!(a1.etag(), a2.etag());
        assert_ne!(a1.etag(), b.etag());
    }

    #[test]
    fn retired_keys_are_published_after_the_active_key() {
        let retired = load_public_key(SECONDARY_PUBLIC.as_bytes()).unwrap();
        let retired_kid = KeyId::thumbprint(&retired);
        let store = primary_store().with_retired(retired, None).unwrap();

        let jwks = JwksPublisher::new(&store).publish();
        assert_eq!(jwks.keys.len(), 2);
        assert_eq!(jwks.keys[0].kid, store.current_key_id().as_str());
        assert!(jwks.find(retired_kid.as_str()).is_some());
    }

    #[test]
    fn etag_matching_is_weak() {
        let publisher = JwksPublisher::new(&primary_store());
        let tag = publisher.etag().to_string();
        assert!(tag.starts_with("W/\""));

        assert!(publisher.matches(&tag));
        assert!(publisher.matches(tag.trim_start_matches("W/")));
        assert!(publisher.matches(&format!("\"other\", {tag}")));
        assert!(publisher.matches("*"));
        assert!(!publisher.matches("W/\"stale\""));
    }
}
