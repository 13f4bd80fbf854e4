//! Bearer tokens: one live token per identity, expiring after a fixed TTL.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::RngCore;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{GameError, Result};

/// Random bytes per token; hex-encoded to twice as many characters.
const TOKEN_BYTES: usize = 16;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Credential check shared by HTTP requests and socket upgrades.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// True only for the identity's current, unexpired token.
    async fn validate_token(&self, identity: Uuid, token: &str) -> Result<bool>;

    /// Issue a new token, replacing any previous one for the identity.
    async fn issue_token(&self, identity: Uuid) -> Result<IssuedToken>;

    async fn revoke(&self, identity: Uuid) -> Result<()>;
}

struct TokenEntry {
    token: String,
    expires_at: DateTime<Utc>,
}

pub struct MemoryTokenStore {
    entries: DashMap<Uuid, TokenEntry>,
    ttl: Duration,
}

impl MemoryTokenStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Drop expired tokens, returning how many were removed
    pub fn cleanup(&self) -> usize {
        let now = Utc::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }
}

pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn validate_token(&self, identity: Uuid, token: &str) -> Result<bool> {
        let expired = match self.entries.get(&identity) {
            None => return Ok(false),
            Some(entry) if entry.expires_at <= Utc::now() => true,
            Some(entry) => return Ok(entry.token == token),
        };
        if expired {
            self.entries
                .remove_if(&identity, |_, entry| entry.expires_at <= Utc::now());
            debug!(user_id = %identity, "Rejected expired token");
        }
        Ok(false)
    }

    async fn issue_token(&self, identity: Uuid) -> Result<IssuedToken> {
        let ttl = chrono::Duration::from_std(self.ttl)
            .map_err(|e| GameError::Config(format!("Token TTL out of range: {}", e)))?;
        let issued = IssuedToken {
            token: generate_token(),
            expires_at: Utc::now() + ttl,
        };
        self.entries.insert(
            identity,
            TokenEntry {
                token: issued.token.clone(),
                expires_at: issued.expires_at,
            },
        );
        Ok(issued)
    }

    async fn revoke(&self, identity: Uuid) -> Result<()> {
        self.entries.remove(&identity);
        Ok(())
    }
}

/// Periodically purge expired tokens
pub fn spawn_cleanup_task(store: Arc<MemoryTokenStore>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = store.cleanup();
            if removed > 0 {
                debug!("Token cleanup: removed {} expired tokens", removed);
            }
        }
    });
    info!("Token cleanup task started");
}

/// Parse `Authorization: <identity>:<token>` (an optional `Bearer ` prefix is accepted).
pub fn parse_credentials(header: &str) -> Result<(Uuid, String)> {
    let raw = header.trim();
    let raw = raw.strip_prefix("Bearer ").unwrap_or(raw).trim();

    let (identity, token) = raw
        .split_once(':')
        .ok_or_else(|| GameError::Unauthorized("expected <userId>:<token>".into()))?;
    let identity = Uuid::parse_str(identity.trim())
        .map_err(|_| GameError::Unauthorized("malformed user id".into()))?;
    let token = token.trim();
    if token.is_empty() {
        return Err(GameError::Unauthorized("empty token".into()));
    }
    Ok((identity, token.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_issue_and_validate() {
        let store = MemoryTokenStore::new(Duration::from_secs(60));
        let id = Uuid::new_v4();
        let issued = store.issue_token(id).await.unwrap();

        assert_eq!(issued.token.len(), 32);
        assert!(issued.token.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(store.validate_token(id, &issued.token).await.unwrap());
        assert!(!store.validate_token(id, "0".repeat(32).as_str()).await.unwrap());
        assert!(!store.validate_token(Uuid::new_v4(), &issued.token).await.unwrap());
    }

    #[tokio::test]
    async fn test_reissue_replaces_previous() {
        let store = MemoryTokenStore::new(Duration::from_secs(60));
        let id = Uuid::new_v4();
        let first = store.issue_token(id).await.unwrap();
        let second = store.issue_token(id).await.unwrap();
        assert!(!store.validate_token(id, &first.token).await.unwrap());
        assert!(store.validate_token(id, &second.token).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_token_rejected_and_purged() {
        let store = MemoryTokenStore::new(Duration::ZERO);
        let id = Uuid::new_v4();
        let issued = store.issue_token(id).await.unwrap();
        assert!(!store.validate_token(id, &issued.token).await.unwrap());
        // Already purged by the failed validation
        assert_eq!(store.cleanup(), 0);
    }

    #[tokio::test]
    async fn test_revoke() {
        let store = MemoryTokenStore::new(Duration::from_secs(60));
        let id = Uuid::new_v4();
        let issued = store.issue_token(id).await.unwrap();
        store.revoke(id).await.unwrap();
        assert!(!store.validate_token(id, &issued.token).await.unwrap());
    }

    #[test]
    fn test_parse_credentials() {
        let id = Uuid::new_v4();
        let (parsed, token) = parse_credentials(&format!("{id}:abc123")).unwrap();
        assert_eq!(parsed, id);
        assert_eq!(token, "abc123");

        let (parsed, _) = parse_credentials(&format!("Bearer {id}:abc123")).unwrap();
        assert_eq!(parsed, id);

        assert!(parse_credentials("no-colon").is_err());
        assert!(parse_credentials("not-a-uuid:abc").is_err());
        assert!(parse_credentials(&format!("{id}:")).is_err());
    }
}
