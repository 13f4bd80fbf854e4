//! Authentication: bearer tokens and password hashing
//!
//! Every authenticated HTTP route and the socket upgrade go through
//! [`authenticate`], so both surfaces apply the same admission policy.

pub mod password;
pub mod token;

use uuid::Uuid;

use crate::error::{GameError, Result};

pub use password::{hash_password, validate_password, verify_password};
pub use token::{parse_credentials, IssuedToken, MemoryTokenStore, TokenStore};

/// Resolve an `Authorization` header value to the identity it proves.
pub async fn authenticate(tokens: &dyn TokenStore, header: Option<&str>) -> Result<Uuid> {
    let header =
        header.ok_or_else(|| GameError::Unauthorized("missing Authorization header".into()))?;
    let (identity, token) = parse_credentials(header)?;
    if tokens.validate_token(identity, &token).await? {
        Ok(identity)
    } else {
        Err(GameError::Unauthorized("invalid or expired token".into()))
    }
}
