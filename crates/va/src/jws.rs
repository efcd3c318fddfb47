//! Compact JWS handling for SimpleHTTP validation documents.
//!
//! The validation response body is a compact-serialized JWS whose protected
//! header embeds the signing key. Before the signature is checked, the
//! embedded key must match the account key on file, compared by RFC 7638
//! thumbprint in constant time.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::jwk::{AlgorithmParameters, EllipticCurve, Jwk};
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Errors from parsing or verifying a validation JWS.
#[derive(Debug, Error)]
pub enum JwsError {
    #[error("response did not parse as a compact JWS: {0}")]
    Parse(String),

    #[error("validation JWS is not signed")]
    Unsigned,

    #[error("too many signatures on validation JWS")]
    ExtraSignatures,

    #[error("protected header did not parse: {0}")]
    Header(String),

    #[error("no key embedded in the protected header")]
    MissingKey,

    #[error("unsupported signing algorithm '{0}'")]
    Algorithm(String),

    #[error("embedded key was not usable: {0}")]
    InvalidKey(String),

    #[error("signature verification failed")]
    BadSignature,
}

#[derive(Debug, Deserialize)]
struct ProtectedHeader {
    alg: String,
    jwk: Option<Jwk>,
}

/// A parsed compact JWS: `base64url(header).base64url(payload).base64url(sig)`.
#[derive(Debug)]
pub struct CompactJws {
    signing_input: String,
    payload: Vec<u8>,
    signature: String,
    header: ProtectedHeader,
}

impl CompactJws {
    /// Parse the three dot-separated segments of a compact JWS. An empty
    /// signature segment counts as unsigned; extra segments count as extra
    /// signatures.
    pub fn parse(body: &str) -> Result<Self, JwsError> {
        let mut segments = body.trim().split('.');
        let (Some(header_b64), Some(payload_b64), Some(signature_b64)) =
            (segments.next(), segments.next(), segments.next())
        else {
            return Err(JwsError::Parse("expected three segments".to_string()));
        };
        if segments.next().is_some() {
            return Err(JwsError::ExtraSignatures);
        }
        if signature_b64.is_empty() {
            return Err(JwsError::Unsigned);
        }

        let header_bytes = URL_SAFE_NO_PAD
            .decode(header_b64)
            .map_err(|e| JwsError::Parse(format!("header segment: {e}")))?;
        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|e| JwsError::Parse(format!("payload segment: {e}")))?;
        URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|e| JwsError::Parse(format!("signature segment: {e}")))?;

        let header: ProtectedHeader = serde_json::from_slice(&header_bytes)
            .map_err(|e| JwsError::Header(e.to_string()))?;

        Ok(Self {
            signing_input: format!("{header_b64}.{payload_b64}"),
            payload,
            signature: signature_b64.to_string(),
            header,
        })
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// The key embedded in the protected header.
    pub fn signer(&self) -> Result<&Jwk, JwsError> {
        self.header.jwk.as_ref().ok_or(JwsError::MissingKey)
    }

    /// Verify the signature over the signing input with the embedded key.
    pub fn verify(&self) -> Result<(), JwsError> {
        let jwk = self.signer()?;
        let algorithm: Algorithm = self
            .header
            .alg
            .parse()
            .map_err(|_| JwsError::Algorithm(self.header.alg.clone()))?;
        let key = DecodingKey::from_jwk(jwk).map_err(|e| JwsError::InvalidKey(e.to_string()))?;
        match jsonwebtoken::crypto::verify(
            &self.signature,
            self.signing_input.as_bytes(),
            &key,
            algorithm,
        ) {
            Ok(true) => Ok(()),
            _ => Err(JwsError::BadSignature),
        }
    }
}

/// RFC 7638 JWK thumbprint: SHA-256 over the canonical JSON of the key's
/// required members.
pub fn key_thumbprint(jwk: &Jwk) -> [u8; 32] {
    let canonical = match &jwk.algorithm {
        AlgorithmParameters::RSA(params) => {
            format!(r#"{{"e":"{}","kty":"RSA","n":"{}"}}"#, params.e, params.n)
        }
        AlgorithmParameters::EllipticCurve(params) => format!(
            r#"{{"crv":"{}","kty":"EC","x":"{}","y":"{}"}}"#,
            curve_name(&params.curve),
            params.x,
            params.y
        ),
        AlgorithmParameters::OctetKeyPair(params) => format!(
            r#"{{"crv":"{}","kty":"OKP","x":"{}"}}"#,
            curve_name(&params.curve),
            params.x
        ),
        AlgorithmParameters::OctetKey(params) => {
            format!(r#"{{"k":"{}","kty":"oct"}}"#, params.value)
        }
    };
    Sha256::digest(canonical.as_bytes()).into()
}

fn curve_name(curve: &EllipticCurve) -> &'static str {
    match curve {
        EllipticCurve::P256 => "P-256",
        EllipticCurve::P384 => "P-384",
        EllipticCurve::P521 => "P-521",
        EllipticCurve::Ed25519 => "Ed25519",
    }
}

/// Constant-time thumbprint equality between two keys.
pub fn keys_match(a: &Jwk, b: &Jwk) -> bool {
    key_thumbprint(a).ct_eq(&key_thumbprint(b)).into()
}
