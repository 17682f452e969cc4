//! RSA key material: parsing, key ids and the signing/verification key ring.
//!
//! Keys are loaded once at startup and are immutable thereafter. The private
//! half never leaves [`KeyStore`]; callers get signed tokens, not the key.

use std::borrow::Cow;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use chrono::{DateTime, Datelike, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header};
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Signature algorithm for every token issued or accepted.
pub const SIGNING_ALGORITHM: Algorithm = Algorithm::RS256;

/// Key material could not be turned into a usable key.
///
/// Only raised while loading configuration; the service cannot start without
/// valid keys.
#[derive(Debug, Error)]
pub enum KeyParseError {
    #[error("key material is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("invalid PKCS#8 private key: {0}")]
    PrivateKey(#[source] rsa::pkcs8::Error),

    #[error("invalid SubjectPublicKeyInfo public key: {0}")]
    PublicKey(#[source] rsa::pkcs8::spki::Error),

    #[error("public key does not belong to the private key")]
    Mismatch,

    #[error("could not export signing key: {0}")]
    Export(#[source] rsa::pkcs1::Error),

    #[error("could not build verification key: {0}")]
    Verification(#[source] jsonwebtoken::errors::Error),

    #[error("duplicate key id '{0}'")]
    DuplicateKeyId(String),
}

enum Encoded<'a> {
    Pem(&'a str),
    Der(Cow<'a, [u8]>),
}

/// Accepts PEM text, base64-encoded DER (whitespace ignored) or raw DER.
fn classify(bytes: &[u8]) -> Result<Encoded<'_>, KeyParseError> {
    let Ok(text) = std::str::from_utf8(bytes) else {
        return Ok(Encoded::Der(Cow::Borrowed(bytes)));
    };

    let trimmed = text.trim();
    if trimmed.starts_with("-----BEGIN") {
        return Ok(Encoded::Pem(trimmed));
    }

    let compact: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(Encoded::Der(Cow::Owned(STANDARD.decode(compact)?)))
}

/// Parse a PKCS#8 RSA private key.
pub fn load_private_key(bytes: &[u8]) -> Result<RsaPrivateKey, KeyParseError> {
    match classify(bytes)? {
        Encoded::Pem(pem) => RsaPrivateKey::from_pkcs8_pem(pem),
        Encoded::Der(der) => RsaPrivateKey::from_pkcs8_der(&der),
    }
    .map_err(KeyParseError::PrivateKey)
}

/// Parse an X.509 SubjectPublicKeyInfo RSA public key.
pub fn load_public_key(bytes: &[u8]) -> Result<RsaPublicKey, KeyParseError> {
    match classify(bytes)? {
        Encoded::Pem(pem) => RsaPublicKey::from_public_key_pem(pem),
        Encoded::Der(der) => RsaPublicKey::from_public_key_der(&der),
    }
    .map_err(KeyParseError::PublicKey)
}

/// Normalise a big-endian integer to its unsigned form.
///
/// Strips exactly one leading zero byte (the two's-complement sign pad).
/// Anything beyond that is left alone so a malformed key stays visibly
/// malformed.
pub fn unsigned_be(bytes: &[u8]) -> &[u8] {
    match bytes {
        [0, rest @ ..] if !rest.is_empty() => rest,
        _ => bytes,
    }
}

fn modulus_bytes(key: &RsaPublicKey) -> Vec<u8> {
    unsigned_be(&key.n().to_bytes_be()).to_vec()
}

fn exponent_bytes(key: &RsaPublicKey) -> Vec<u8> {
    unsigned_be(&key.e().to_bytes_be()).to_vec()
}

/// How key ids are derived. One scheme serves both the token header and JWKS.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum KeyIdScheme {
    /// SHA-256 over `n || e`, base64url without padding.
    #[default]
    Thumbprint,
    /// `<prefix><yyyy>-<mm>` of the moment the key was loaded.
    Dated { prefix: String },
}

impl KeyIdScheme {
    pub fn derive(&self, key: &RsaPublicKey, loaded_at: DateTime<Utc>) -> KeyId {
        match self {
            KeyIdScheme::Thumbprint => KeyId::thumbprint(key),
            KeyIdScheme::Dated { prefix } => KeyId::dated(prefix, loaded_at),
        }
    }
}

/// Identifier of a verification key, carried in the token header as `kid`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(String);

impl KeyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Deterministic id from the key material alone.
    pub fn thumbprint(key: &RsaPublicKey) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(modulus_bytes(key));
        hasher.update(exponent_bytes(key));
        Self(URL_SAFE_NO_PAD.encode(hasher.finalize()))
    }

    /// `<prefix><yyyy>-<mm>`, e.g. `rolegate-2026-10`.
    pub fn dated(prefix: &str, at: DateTime<Utc>) -> Self {
        Self(format!("{prefix}{:04}-{:02}", at.year(), at.month()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for KeyId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A public key that tokens may be verified against.
#[derive(Clone)]
pub struct VerificationKey {
    kid: KeyId,
    public: RsaPublicKey,
    n: String,
    e: String,
    decoding: DecodingKey,
}

impl VerificationKey {
    pub fn new(kid: KeyId, public: RsaPublicKey) -> Result<Self, KeyParseError> {
        let n = URL_SAFE_NO_PAD.encode(modulus_bytes(&public));
        let e = URL_SAFE_NO_PAD.encode(exponent_bytes(&public));
        let decoding =
            DecodingKey::from_rsa_components(&n, &e).map_err(KeyParseError::Verification)?;
        Ok(Self {
            kid,
            public,
            n,
            e,
            decoding,
        })
    }

    pub fn kid(&self) -> &KeyId {
        &self.kid
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    /// Modulus, base64url, unsigned big-endian.
    pub fn modulus_b64(&self) -> &str {
        &self.n
    }

    /// Public exponent, base64url, unsigned big-endian.
    pub fn exponent_b64(&self) -> &str {
        &self.e
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }
}

impl core::fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("VerificationKey")
            .field("kid", &self.kid)
            .finish_non_exhaustive()
    }
}

/// The active signing pair plus recently retired public keys.
///
/// Retired keys stay verifiable so tokens signed just before a rotation keep
/// working until they expire.
pub struct KeyStore {
    signing: EncodingKey,
    active: VerificationKey,
    retired: Vec<VerificationKey>,
}

impl KeyStore {
    /// Parse and pair configured key material.
    pub fn load(
        private_key: &[u8],
        public_key: &[u8],
        scheme: &KeyIdScheme,
        loaded_at: DateTime<Utc>,
    ) -> Result<Self, KeyParseError> {
        let private = load_private_key(private_key)?;
        let public = load_public_key(public_key)?;
        Self::from_pair(private, public, scheme, loaded_at)
    }

    pub fn from_pair(
        private: RsaPrivateKey,
        public: RsaPublicKey,
        scheme: &KeyIdScheme,
        loaded_at: DateTime<Utc>,
    ) -> Result<Self, KeyParseError> {
        if RsaPublicKey::from(&private) != public {
            return Err(KeyParseError::Mismatch);
        }

        let der = private.to_pkcs1_der().map_err(KeyParseError::Export)?;
        let signing = EncodingKey::from_rsa_der(der.as_bytes());
        let active = VerificationKey::new(scheme.derive(&public, loaded_at), public)?;

        Ok(Self {
            signing,
            active,
            retired: Vec::new(),
        })
    }

    /// Keep accepting tokens signed by a previous key.
    ///
    /// Without an explicit id the thumbprint is used.
    pub fn with_retired(
        mut self,
        public: RsaPublicKey,
        kid: Option<KeyId>,
    ) -> Result<Self, KeyParseError> {
        let kid = kid.unwrap_or_else(|| KeyId::thumbprint(&public));
        if self.verification_key(kid.as_str()).is_some() {
            return Err(KeyParseError::DuplicateKeyId(kid.to_string()));
        }
        self.retired.push(VerificationKey::new(kid, public)?);
        Ok(self)
    }

    /// Id stamped into the header of every token signed now.
    pub fn current_key_id(&self) -> &KeyId {
        &self.active.kid
    }

    pub fn active_key(&self) -> &VerificationKey {
        &self.active
    }

    /// Active key first, then retired keys in the order they were added.
    pub fn verification_keys(&self) -> impl Iterator<Item = &VerificationKey> {
        std::iter::once(&self.active).chain(self.retired.iter())
    }

    pub fn verification_key(&self, kid: &str) -> Option<&VerificationKey> {
        self.verification_keys().find(|k| k.kid.as_str() == kid)
    }

    pub fn retired_key_ids(&self) -> Vec<&KeyId> {
        self.retired.iter().map(|k| &k.kid).collect()
    }

    /// Sign `claims` with the active private key; the header carries its id.
    pub(crate) fn sign<T: Serialize>(&self, claims: &T) -> jsonwebtoken::errors::Result<String> {
        let mut header = Header::new(SIGNING_ALGORITHM);
        header.kid = Some(self.active.kid.to_string());
        jsonwebtoken::encode(&header, claims, &self.signing)
    }
}

impl core::fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("KeyStore")
            .field("active", &self.active)
            .field("retired", &self.retired)
            .finish_non_exhaustive()
    }
}
