//! Account lifecycle: sign-up, sign-in, rename and the profile snapshot.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::auth::{self, IssuedToken, TokenStore};
use crate::economy::{Balances, EconomyEngine};
use crate::error::{GameError, Result};
use crate::ledger::{accounts, balances, campaign, quests, units};
use crate::ledger::{AccrualState, NewUser, QuestProgress, UnitRow, UserRow};

pub const MIN_NAME_LEN: usize = 2;
pub const MAX_NAME_LEN: usize = 16;
pub const MAX_EMAIL_LEN: usize = 255;

/// Trimmed display name, 2-16 characters
pub fn normalize_name(name: &str) -> Result<String> {
    let name = name.trim();
    let len = name.chars().count();
    if !(MIN_NAME_LEN..=MAX_NAME_LEN).contains(&len) {
        return Err(GameError::Validation(format!(
            "name must be {}-{} characters",
            MIN_NAME_LEN, MAX_NAME_LEN
        )));
    }
    Ok(name.to_string())
}

/// Trimmed, lowercased address with a non-empty local part and domain
pub fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    let valid = email.len() <= MAX_EMAIL_LEN
        && !email.chars().any(char::is_whitespace)
        && matches!(email.split_once('@'), Some((local, domain))
            if !local.is_empty() && domain.contains('.') && !domain.contains('@')
                && !domain.starts_with('.') && !domain.ends_with('.'));
    if !valid {
        return Err(GameError::Validation("email is not a valid address".into()));
    }
    Ok(email)
}

/// Everything a client needs after signing in
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub user: UserRow,
    pub resources: Balances,
    pub campaign: AccrualState,
    pub daily_quests: Vec<QuestProgress>,
    pub units: Vec<UnitRow>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInResult {
    pub user_id: Uuid,
    #[serde(flatten)]
    pub token: IssuedToken,
    pub profile: Profile,
}

#[derive(Clone)]
pub struct AccountService {
    engine: EconomyEngine,
    tokens: Arc<dyn TokenStore>,
}

impl AccountService {
    pub fn new(engine: EconomyEngine, tokens: Arc<dyn TokenStore>) -> Self {
        Self { engine, tokens }
    }

    pub fn tokens(&self) -> &Arc<dyn TokenStore> {
        &self.tokens
    }

    /// Create an account with all of its ledger, campaign and quest rows
    pub async fn sign_up(&self, name: &str, email: &str, pass: &str, deadline: Instant) -> Result<UserRow> {
        let name = normalize_name(name)?;
        let email = normalize_email(email)?;
        auth::validate_password(pass)?;
        let pass = pass.to_string();

        let engine = self.engine.clone();
        let user = tokio::task::spawn_blocking(move || -> Result<UserRow> {
            let new_user = NewUser {
                id: Uuid::new_v4(),
                name,
                email,
                pass_hash: auth::hash_password(&pass)?,
            };
            let quest_ids: Vec<i64> = engine.content().quests.iter().map(|q| q.id).collect();
            let now = Utc::now().timestamp();

            let ledger = engine.ledger();
            ledger.transaction(Some(deadline), |tx| {
                accounts::create_account(tx, &new_user, &quest_ids, now)?;
                accounts::get_user(tx, new_user.id)?
                    .ok_or_else(|| GameError::Internal("user vanished after insert".into()))
            })
        })
        .await
        .map_err(|e| GameError::Internal(format!("Sign-up task failed: {}", e)))??;

        info!(user_id = %user.id, name = %user.name, "Account created");
        Ok(user)
    }

    /// Verify credentials, issue a token and count the sign-in toward its daily quest
    pub async fn sign_in(&self, email: &str, pass: &str, deadline: Instant) -> Result<SignInResult> {
        let email = email.trim().to_lowercase();
        let pass = pass.to_string();

        let engine = self.engine.clone();
        let user = tokio::task::spawn_blocking(move || -> Result<Option<UserRow>> {
            let Some(user) = engine.ledger().read(|conn| accounts::find_by_email(conn, &email))?
            else {
                return Ok(None);
            };
            Ok(auth::verify_password(&pass, &user.pass_hash)?.then_some(user))
        })
        .await
        .map_err(|e| GameError::Internal(format!("Sign-in task failed: {}", e)))??
        .ok_or_else(|| GameError::Unauthorized("invalid email or password".into()))?;

        let token = self.tokens.issue_token(user.id).await?;
        self.engine.record_sign_in(user.id, deadline).await?;
        let profile = self.profile(user.id).await?;

        info!(user_id = %user.id, "Signed in");
        Ok(SignInResult {
            user_id: user.id,
            token,
            profile,
        })
    }

    /// Drop the caller's token; the next request with it is unauthorized
    pub async fn sign_out(&self, user_id: Uuid) -> Result<()> {
        self.tokens.revoke(user_id).await?;
        info!(user_id = %user_id, "Signed out");
        Ok(())
    }

    /// Create the administrator account unless one with `email` already exists.
    ///
    /// Returns true when a new account was inserted.
    pub async fn ensure_admin(&self, name: &str, email: &str, pass: &str, deadline: Instant) -> Result<bool> {
        let email = normalize_email(email)?;
        let engine = self.engine.clone();
        let lookup = email.clone();
        let existing = tokio::task::spawn_blocking(move || {
            engine.ledger().read(|conn| accounts::find_by_email(conn, &lookup))
        })
        .await
        .map_err(|e| GameError::Internal(format!("Admin lookup failed: {}", e)))??;

        if let Some(admin) = existing {
            info!(user_id = %admin.id, "Admin account already present");
            return Ok(false);
        }

        let admin = self.sign_up(name, &email, pass, deadline).await?;
        info!(user_id = %admin.id, name = %admin.name, email = %admin.email, "Inserted admin account");
        Ok(true)
    }

    pub async fn rename(&self, user_id: Uuid, name: &str, deadline: Instant) -> Result<UserRow> {
        let name = normalize_name(name)?;
        let engine = self.engine.clone();
        tokio::task::spawn_blocking(move || {
            engine.ledger().transaction(Some(deadline), |tx| {
                accounts::rename(tx, user_id, &name)?;
                accounts::get_user(tx, user_id)?
                    .ok_or_else(|| GameError::NotFound(format!("user {}", user_id)))
            })
        })
        .await
        .map_err(|e| GameError::Internal(format!("Rename task failed: {}", e)))?
    }

    pub async fn profile(&self, user_id: Uuid) -> Result<Profile> {
        let engine = self.engine.clone();
        tokio::task::spawn_blocking(move || {
            engine.ledger().read(|conn| {
                let user = accounts::get_user(conn, user_id)?
                    .ok_or_else(|| GameError::NotFound(format!("user {}", user_id)))?;
                Ok(Profile {
                    user,
                    resources: balances::all_balances(conn, user_id)?,
                    campaign: campaign::lock_accrual(conn, user_id)?,
                    daily_quests: quests::list_progress(conn, user_id)?,
                    units: units::list_units(conn, user_id)?,
                })
            })
        })
        .await
        .map_err(|e| GameError::Internal(format!("Profile task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryTokenStore;
    use crate::content::{GameContent, SIGN_IN_QUEST_ID};
    use crate::economy::AccrualPolicy;
    use crate::ledger::LedgerStore;
    use std::time::Duration;

    fn service() -> AccountService {
        let ledger = Arc::new(LedgerStore::open_in_memory().unwrap());
        let engine = EconomyEngine::new(
            ledger,
            Arc::new(GameContent::default()),
            AccrualPolicy::default(),
        );
        AccountService::new(engine, Arc::new(MemoryTokenStore::new(Duration::from_secs(60))))
    }

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    #[test]
    fn test_normalize_inputs() {
        assert_eq!(normalize_name("  Ash  ").unwrap(), "Ash");
        assert!(normalize_name("A").is_err());
        assert!(normalize_name(&"n".repeat(17)).is_err());

        assert_eq!(normalize_email(" Ash@Example.COM ").unwrap(), "ash@example.com");
        assert!(normalize_email("ash@localhost").is_err());
        assert!(normalize_email("@example.com").is_err());
        assert!(normalize_email("a b@example.com").is_err());
    }

    #[tokio::test]
    async fn test_sign_up_then_sign_in() {
        let accounts = service();
        let user = accounts
            .sign_up("ash", "ash@example.com", "pallet-town", deadline())
            .await
            .unwrap();

        let result = accounts
            .sign_in("ASH@example.com", "pallet-town", deadline())
            .await
            .unwrap();
        assert_eq!(result.user_id, user.id);
        assert!(accounts
            .tokens()
            .validate_token(user.id, &result.token.token)
            .await
            .unwrap());

        let sign_in = result
            .profile
            .daily_quests
            .iter()
            .find(|q| q.quest_id == SIGN_IN_QUEST_ID)
            .unwrap();
        assert_eq!(sign_in.count, 1);
        assert_eq!(sign_in.last_completed_at, 0);
        assert_eq!(result.profile.campaign.level, 1);
    }

    #[tokio::test]
    async fn test_wrong_password_unauthorized() {
        let accounts = service();
        accounts
            .sign_up("ash", "ash@example.com", "pallet-town", deadline())
            .await
            .unwrap();

        let err = accounts
            .sign_in("ash@example.com", "viridian-city", deadline())
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::Unauthorized(_)));

        let err = accounts
            .sign_in("nobody@example.com", "pallet-town", deadline())
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_duplicate_name_conflict() {
        let accounts = service();
        accounts
            .sign_up("ash", "ash@example.com", "pallet-town", deadline())
            .await
            .unwrap();
        let err = accounts
            .sign_up("ash", "other@example.com", "pallet-town", deadline())
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_rename() {
        let accounts = service();
        let user = accounts
            .sign_up("ash", "ash@example.com", "pallet-town", deadline())
            .await
            .unwrap();
        let renamed = accounts.rename(user.id, " red ", deadline()).await.unwrap();
        assert_eq!(renamed.name, "red");
    }

    #[tokio::test]
    async fn test_ensure_admin_inserts_once() {
        let accounts = service();
        assert!(accounts
            .ensure_admin("Admin", "admin@idlemon.com", "adminpass", deadline())
            .await
            .unwrap());
        assert!(!accounts
            .ensure_admin("Admin", "ADMIN@idlemon.com", "adminpass", deadline())
            .await
            .unwrap());

        let result = accounts
            .sign_in("admin@idlemon.com", "adminpass", deadline())
            .await
            .unwrap();
        assert_eq!(result.profile.user.name, "Admin");
    }

    #[tokio::test]
    async fn test_sign_out_revokes_token() {
        let accounts = service();
        let user = accounts
            .sign_up("ash", "ash@example.com", "pallet-town", deadline())
            .await
            .unwrap();
        let result = accounts
            .sign_in("ash@example.com", "pallet-town", deadline())
            .await
            .unwrap();

        accounts.sign_out(user.id).await.unwrap();
        assert!(!accounts
            .tokens()
            .validate_token(user.id, &result.token.token)
            .await
            .unwrap());
    }
}
