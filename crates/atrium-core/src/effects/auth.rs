//! Token verification adapters

use super::AuthVerifier;
use crate::error::{AtriumError, AtriumResult};
use crate::ids::UserId;
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;

type HmacSha256 = Hmac<Sha256>;

/// Verifies tokens of the form `<user_id>.<hex hmac-sha256(user_id)>`.
///
/// Tokens are issued by the identity service sharing the same key.
#[derive(Clone)]
pub struct HmacTokenVerifier {
    key: Vec<u8>,
}

impl HmacTokenVerifier {
    /// Create a verifier for a shared key. The key must not be empty.
    pub fn new(key: impl Into<Vec<u8>>) -> AtriumResult<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(AtriumError::configuration("token key must not be empty"));
        }
        Ok(Self { key })
    }

    fn mac(&self) -> AtriumResult<HmacSha256> {
        HmacSha256::new_from_slice(&self.key)
            .map_err(|e| AtriumError::configuration(format!("invalid token key: {e}")))
    }

    /// Issue a token for a user. Used by tooling and tests.
    pub fn issue(&self, user: &UserId) -> AtriumResult<String> {
        let mut mac = self.mac()?;
        mac.update(user.as_str().as_bytes());
        let tag = mac.finalize().into_bytes();
        Ok(format!("{}.{}", user, hex::encode(tag)))
    }
}

impl std::fmt::Debug for HmacTokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacTokenVerifier").finish_non_exhaustive()
    }
}

#[async_trait]
impl AuthVerifier for HmacTokenVerifier {
    async fn verify(&self, token: &str) -> AtriumResult<UserId> {
        let (user, tag_hex) = token
            .rsplit_once('.')
            .ok_or_else(|| AtriumError::invalid_auth("malformed token"))?;
        if user.is_empty() {
            return Err(AtriumError::invalid_auth("malformed token"));
        }
        let tag = hex::decode(tag_hex).map_err(|_| AtriumError::invalid_auth("malformed token"))?;
        let mut mac = self.mac()?;
        mac.update(user.as_bytes());
        mac.verify_slice(&tag)
            .map_err(|_| AtriumError::invalid_auth("signature mismatch"))?;
        Ok(UserId::new(user))
    }
}

/// Fixed token table. Intended for tests and local development.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, UserId>,
}

impl StaticTokenVerifier {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a token for a user.
    pub fn with_token(mut self, token: impl Into<String>, user: UserId) -> Self {
        self.tokens.insert(token.into(), user);
        self
    }
}

#[async_trait]
impl AuthVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> AtriumResult<UserId> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| AtriumError::invalid_auth("unknown token"))
    }
}
