//! Credential issue/verify. The credential is a compact signed token in three
//! base64url segments (`header.payload.signature`) carrying the claims the
//! gateway needs, authenticated with HMAC-SHA256 over the first two segments.

use crate::types::UserId;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "HS256";
const TOKEN_TYPE: &str = "JWT";

/// Minimum secret length in bytes. Anything shorter is refused at startup.
pub const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CredentialError {
    #[error("credential is malformed")]
    Malformed,
    #[error("credential signature algorithm mismatch")]
    AlgorithmMismatch,
    #[error("credential signature is invalid")]
    InvalidSignature,
    #[error("credential has expired")]
    Expired,
    #[error("credential has been revoked")]
    Revoked,
}

impl CredentialError {
    /// Reason code surfaced when a handshake is refused.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Expired => "Expired",
            Self::Revoked => "Revoked",
            _ => "Unauthorized",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialClaims {
    pub user_id: UserId,
    pub user_email: String,
    pub username: String,
    pub issued_at: i64,
    pub expires_at: i64,
}

fn sign(payload: &[u8], secret: &[u8]) -> Result<Vec<u8>, CredentialError> {
    let mut mac =
        HmacSha256::new_from_slice(secret).map_err(|_| CredentialError::Malformed)?;
    mac.update(payload);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Mint a signed credential. Issuance normally belongs to the identity
/// collaborator; this lives here so the verification format has exactly one
/// definition (the CLI and the tests mint through it).
pub fn issue_credential(
    claims: &CredentialClaims,
    secret: &[u8],
) -> Result<String, CredentialError> {
    let header = Header { alg: ALGORITHM.into(), typ: TOKEN_TYPE.into() };
    let header = serde_json::to_vec(&header).map_err(|_| CredentialError::Malformed)?;
    let payload = serde_json::to_vec(claims).map_err(|_| CredentialError::Malformed)?;

    let mut token = String::new();
    token.push_str(&URL_SAFE_NO_PAD.encode(header));
    token.push('.');
    token.push_str(&URL_SAFE_NO_PAD.encode(payload));

    let signature = sign(token.as_bytes(), secret)?;
    token.push('.');
    token.push_str(&URL_SAFE_NO_PAD.encode(signature));
    Ok(token)
}

/// Verify signature and expiry, returning the embedded claims. Revocation is
/// a separate check against the coordinator cache and the store.
pub fn verify_credential(
    token: &str,
    secret: &[u8],
    now_ms: i64,
) -> Result<CredentialClaims, CredentialError> {
    let mut segments = token.split('.');
    let (header, payload, signature) = match (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) {
        (Some(header), Some(payload), Some(signature), None) => (header, payload, signature),
        _ => return Err(CredentialError::Malformed),
    };

    let header_bytes = URL_SAFE_NO_PAD
        .decode(header)
        .map_err(|_| CredentialError::Malformed)?;
    let header: Header =
        serde_json::from_slice(&header_bytes).map_err(|_| CredentialError::Malformed)?;
    if header.alg != ALGORITHM {
        return Err(CredentialError::AlgorithmMismatch);
    }

    let signed_region_len = token.len() - signature.len() - 1;
    let signature = URL_SAFE_NO_PAD
        .decode(signature)
        .map_err(|_| CredentialError::Malformed)?;
    let mut mac =
        HmacSha256::new_from_slice(secret).map_err(|_| CredentialError::Malformed)?;
    mac.update(token[..signed_region_len].as_bytes());
    mac.verify_slice(&signature)
        .map_err(|_| CredentialError::InvalidSignature)?;

    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| CredentialError::Malformed)?;
    let claims: CredentialClaims =
        serde_json::from_slice(&payload_bytes).map_err(|_| CredentialError::Malformed)?;
    if now_ms >= claims.expires_at {
        return Err(CredentialError::Expired);
    }
    Ok(claims)
}
