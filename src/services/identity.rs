//! Identity backend: bearer-token validation and email lookup.

use crate::{
    db::AdminDb,
    errors::{AppError, AppResult},
    models::UserId,
};
use async_trait::async_trait;
use rand::RngCore;
use sha2::{Digest, Sha256};

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve a bearer token to a user, or fail with `Unauthenticated`.
    async fn authenticate(&self, bearer: &str) -> AppResult<UserId>;

    /// Look up a user by email address.
    async fn resolve_email(&self, email: &str) -> AppResult<Option<UserId>>;
}

/// Users and tokens kept in the service's own SQLite database. Only token
/// hashes are stored.
#[derive(Clone)]
pub struct SqliteIdentity {
    admin: AdminDb,
}

impl SqliteIdentity {
    pub fn new(admin: AdminDb) -> Self {
        Self { admin }
    }

    /// Register a user and return `(id, raw bearer token)`.
    pub async fn register(&self, email: &str) -> AppResult<(UserId, String)> {
        if email.trim().is_empty() || !email.contains('@') {
            return Err(AppError::invalid(format!("`{email}` is not an email address")));
        }
        let user_id = self.admin.create_user(email).await?;
        let token = self.issue_token(user_id).await?;
        tracing::info!(%user_id, "registered user");
        Ok((user_id, token))
    }

    /// Mint another token for an existing user.
    pub async fn issue_token(&self, user_id: UserId) -> AppResult<String> {
        let token = generate_token();
        self.admin.store_token_hash(user_id, &hash_token(&token)).await?;
        Ok(token)
    }
}

#[async_trait]
impl IdentityProvider for SqliteIdentity {
    async fn authenticate(&self, bearer: &str) -> AppResult<UserId> {
        if bearer.is_empty() {
            return Err(AppError::Unauthenticated("missing bearer token".into()));
        }
        self.admin
            .user_by_token_hash(&hash_token(bearer))
            .await?
            .ok_or_else(|| AppError::Unauthenticated("invalid bearer token".into()))
    }

    async fn resolve_email(&self, email: &str) -> AppResult<Option<UserId>> {
        self.admin.user_by_email(email).await
    }
}

/// Hash a token for storage lookup.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// 32 random bytes, hex-encoded.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_tokens_are_distinct_hex() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_token_is_stable() {
        assert_eq!(hash_token("abc"), hash_token("abc"));
        assert_ne!(hash_token("abc"), hash_token("abd"));
    }
}
