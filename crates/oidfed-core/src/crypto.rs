//! Cryptographic primitives for entity statement signing
//!
//! Statements are compact JWS objects signed with Ed25519 (`alg: EdDSA`).
//! Signing uses the dalek key directly; verification goes through
//! `jsonwebtoken` against a published JWK Set, so statements signed by
//! other federation software verify the same way.
//!
//! Key types:
//! - `KeyPair`: Ed25519 key pair for signing statements
//! - `PublicKey`: Ed25519 public key, exportable as an OKP JWK
//! - `JwkSet`: the `jwks` claim carried by entity statements

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Header, Validation};
use rand::rngs::OsRng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{FederationError, Result};

pub use jsonwebtoken::jwk::JwkSet;

/// JWS `typ` of entity configurations and subordinate statements
pub const ENTITY_STATEMENT_TYP: &str = "entity-statement+jwt";

/// JWS `typ` of resolve endpoint responses
pub const RESOLVE_RESPONSE_TYP: &str = "resolve-response+jwt";

/// Ed25519 key pair for signing entity statements
#[derive(Clone)]
pub struct KeyPair {
    /// Key identifier
    kid: String,
    /// Ed25519 signing key (private)
    signing_key: SigningKey,
    /// Ed25519 verifying key (public)
    verifying_key: VerifyingKey,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("kid", &self.kid)
            .field("verifying_key", &"[redacted]")
            .finish()
    }
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate(kid: impl Into<String>) -> Self {
        Self::from_signing_key(kid, SigningKey::generate(&mut OsRng))
    }

    /// Create a key pair from an existing signing key
    pub fn from_signing_key(kid: impl Into<String>, signing_key: SigningKey) -> Self {
        let verifying_key = signing_key.verifying_key();
        Self {
            kid: kid.into(),
            signing_key,
            verifying_key,
        }
    }

    /// Create a key pair from raw secret key bytes
    pub fn from_bytes(kid: impl Into<String>, bytes: &[u8; 32]) -> Self {
        Self::from_signing_key(kid, SigningKey::from_bytes(bytes))
    }

    /// Get the key identifier
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Get the public key
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            kid: self.kid.clone(),
            verifying_key: self.verifying_key,
        }
    }

    /// Get the raw signing key bytes
    pub fn signing_key_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// The public half as a JWK Set with a single key
    pub fn jwks(&self) -> Result<JwkSet> {
        Ok(JwkSet {
            keys: vec![self.public_key().to_jwk()?],
        })
    }

    /// Sign an entity statement payload
    pub fn sign_statement<T: Serialize>(&self, claims: &T) -> Result<String> {
        self.sign_jws(ENTITY_STATEMENT_TYP, claims)
    }

    /// Sign an arbitrary payload as a compact JWS with the given `typ`
    pub fn sign_jws<T: Serialize>(&self, typ: &str, claims: &T) -> Result<String> {
        let mut header = Header::new(Algorithm::EdDSA);
        header.typ = Some(typ.to_string());
        header.kid = Some(self.kid.clone());

        let header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?);
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);
        let signing_input = format!("{}.{}", header, payload);

        let signature = self.signing_key.sign(signing_input.as_bytes());
        Ok(format!(
            "{}.{}",
            signing_input,
            URL_SAFE_NO_PAD.encode(signature.to_bytes())
        ))
    }
}

/// Ed25519 public key for verification
#[derive(Clone)]
pub struct PublicKey {
    /// Key identifier
    kid: String,
    /// Ed25519 verifying key
    verifying_key: VerifyingKey,
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicKey").field("kid", &self.kid).finish()
    }
}

impl PublicKey {
    /// Create a public key from raw bytes
    pub fn from_bytes(kid: impl Into<String>, bytes: &[u8; 32]) -> Result<Self> {
        let verifying_key = VerifyingKey::from_bytes(bytes)?;
        Ok(Self {
            kid: kid.into(),
            verifying_key,
        })
    }

    /// Import an Ed25519 key from an OKP JWK
    pub fn from_jwk(jwk: &Jwk) -> Result<Self> {
        let AlgorithmParameters::OctetKeyPair(params) = &jwk.algorithm else {
            return Err(FederationError::CryptoError(
                "JWK is not an octet key pair".into(),
            ));
        };
        let bytes = URL_SAFE_NO_PAD
            .decode(&params.x)
            .map_err(|e| FederationError::CryptoError(e.to_string()))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| FederationError::CryptoError("Invalid key length".into()))?;
        let kid = jwk.common.key_id.clone().unwrap_or_default();
        Self::from_bytes(kid, &bytes)
    }

    /// Get the key identifier
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Get the raw verifying key bytes
    pub fn to_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Export as an OKP JWK (`crv: Ed25519`, `use: sig`)
    pub fn to_jwk(&self) -> Result<Jwk> {
        let jwk = serde_json::json!({
            "kty": "OKP",
            "crv": "Ed25519",
            "x": URL_SAFE_NO_PAD.encode(self.to_bytes()),
            "kid": self.kid,
            "alg": "EdDSA",
            "use": "sig",
        });
        Ok(serde_json::from_value(jwk)?)
    }
}

/// Decode the payload of a compact JWS without checking its signature
///
/// Note: This does NOT verify the signature. Use [`verify_jws`] for that.
pub fn decode_unverified<T: DeserializeOwned>(jws: &str) -> Result<(Header, T)> {
    let header = decode_header(jws)?;
    let mut validation = Validation::new(header.alg);
    validation.insecure_disable_signature_validation();
    relax_claim_checks(&mut validation);

    let data = decode::<T>(jws, &DecodingKey::from_secret(&[]), &validation)?;
    Ok((data.header, data.claims))
}

/// Verify a compact JWS against a key set and return its payload
///
/// When the header names a `kid` only that key is tried; otherwise every
/// key in the set is tried in order. Time claims are not checked here.
pub fn verify_jws<T: DeserializeOwned>(jws: &str, jwks: &JwkSet) -> Result<T> {
    let header = decode_header(jws)?;

    let candidates: Vec<&Jwk> = match header.kid.as_deref() {
        Some(kid) => jwks.find(kid).into_iter().collect(),
        None => jwks.keys.iter().collect(),
    };
    if candidates.is_empty() {
        return Err(FederationError::SignatureInvalid(format!(
            "no key in set matches kid {:?}",
            header.kid
        )));
    }

    let mut validation = Validation::new(header.alg);
    relax_claim_checks(&mut validation);

    let mut last_error = None;
    for jwk in candidates {
        let key = match DecodingKey::from_jwk(jwk) {
            Ok(key) => key,
            Err(e) => {
                debug!(kid = ?jwk.common.key_id, error = %e, "Skipping unusable JWK");
                last_error = Some(FederationError::from(e));
                continue;
            }
        };
        match decode::<T>(jws, &key, &validation) {
            Ok(data) => return Ok(data.claims),
            Err(e) => last_error = Some(FederationError::from(e)),
        }
    }

    Err(match last_error {
        Some(FederationError::SignatureInvalid(msg)) | Some(FederationError::CryptoError(msg)) => {
            FederationError::SignatureInvalid(msg)
        }
        Some(other) => other,
        None => FederationError::SignatureInvalid("no usable key".into()),
    })
}

fn relax_claim_checks(validation: &mut Validation) {
    // exp/iat are checked by the statement layer against its own clock
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();
}
