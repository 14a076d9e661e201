//! HMAC-signed bearer tokens verified against a shared secret.
//!
//! A token is `hex(claims JSON) + "." + hex(HMAC-SHA256(secret, claims JSON))`.
//! Verification checks the signature, the expiry, and the logout blacklist,
//! in that order; any failure yields a typed [`TokenError`] and no identity.

use chrono::Utc;
use dashmap::DashSet;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;
use uuid::Uuid;

use crate::errors::TokenError;

/// The identity decoded from a verified token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
}

#[derive(Serialize, Deserialize)]
struct Claims {
    sub: Uuid,
    email: String,
    exp: i64,
}

/// Mints and verifies bearer tokens, and tracks logged-out tokens.
///
/// The blacklist is process-local; entries live until the process exits,
/// which is at most the token TTL longer than necessary.
pub struct TokenService {
    secret: Option<String>,
    ttl: Duration,
    blacklist: DashSet<String>,
}

impl TokenService {
    pub fn new(secret: Option<String>, ttl: Duration) -> Self {
        Self {
            secret,
            ttl,
            blacklist: DashSet::new(),
        }
    }

    /// Mint a token for the given identity.
    pub fn mint(&self, id: Uuid, email: &str) -> Result<String, TokenError> {
        let secret = self.secret.as_deref().ok_or(TokenError::SecretMissing)?;
        let claims = Claims {
            sub: id,
            email: email.to_string(),
            exp: Utc::now().timestamp() + self.ttl.as_secs() as i64,
        };
        let payload = serde_json::to_vec(&claims).map_err(|_| TokenError::Malformed)?;
        let sig = hmac_sha256(secret.as_bytes(), &payload);
        Ok(format!("{}.{}", hex::encode(&payload), hex::encode(sig)))
    }

    /// Verify a token and decode the identity it carries.
    pub fn verify(&self, token: &str) -> Result<Identity, TokenError> {
        let secret = self.secret.as_deref().ok_or(TokenError::SecretMissing)?;

        let (payload_hex, sig_hex) = token.split_once('.').ok_or(TokenError::Malformed)?;
        let payload = hex::decode(payload_hex).map_err(|_| TokenError::Malformed)?;
        let sig = hex::decode(sig_hex).map_err(|_| TokenError::Malformed)?;

        let expected = hmac_sha256(secret.as_bytes(), &payload);
        if sig.len() != expected.len() || !constant_time_eq(&sig, &expected) {
            return Err(TokenError::BadSignature);
        }

        let claims: Claims = serde_json::from_slice(&payload).map_err(|_| TokenError::Malformed)?;
        if claims.exp <= Utc::now().timestamp() {
            return Err(TokenError::Expired);
        }
        if self.blacklist.contains(token) {
            return Err(TokenError::Blacklisted);
        }

        Ok(Identity {
            id: claims.sub,
            email: claims.email,
        })
    }

    /// Invalidate a token (logout). Subsequent verifies fail with
    /// [`TokenError::Blacklisted`].
    pub fn revoke(&self, token: &str) {
        self.blacklist.insert(token.to_string());
    }
}

fn hmac_sha256(key: &[u8], message: &[u8]) -> [u8; 32] {
    const BLOCK: usize = 64;

    let mut key_block = [0u8; BLOCK];
    if key.len() > BLOCK {
        key_block[..32].copy_from_slice(&Sha256::digest(key));
    } else {
        key_block[..key.len()].copy_from_slice(key);
    }

    let mut ipad = [0x36u8; BLOCK];
    let mut opad = [0x5cu8; BLOCK];
    for i in 0..BLOCK {
        ipad[i] ^= key_block[i];
        opad[i] ^= key_block[i];
    }

    let inner = Sha256::new()
        .chain_update(ipad)
        .chain_update(message)
        .finalize();
    Sha256::new()
        .chain_update(opad)
        .chain_update(inner)
        .finalize()
        .into()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
