//! Identity service: login, refresh, registration, profile and password
//! mutations, role administration, and account deletion.
//!
//! Composes the pure auth boundary (credential checks, token issuance, scope
//! resolution, permission matrix) with the account store. Every expected
//! failure is a typed [`CoreError`]; the HTTP adapter maps those to status
//! codes without inspecting messages.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use kata_auth::{
    authorize, credential, ensure_reachable, AccessScope, Action, Ownership, Role, Surface,
    TokenClaims, TokenIssuer, TokenKind, TokenPair,
};
use kata_core::{AccountId, CoreError, CoreResult, ExerciseId};

use crate::lifecycle;
use crate::store::{
    AccountRecord, AccountStatistics, AccountStore, ChallengeRecord, ExerciseRecord,
    LeaderboardRow, NewAccount, StoreError, EXERCISES_TABLE,
};

/// How long a password-reset token stays redeemable.
const RESET_TOKEN_TTL_MINUTES: i64 = 60;

const LEADERBOARD_LIMIT: u32 = 20;

/// Account view returned to callers: never includes the password hash, always
/// carries a freshly resolved access scope.
#[derive(Debug, Clone, Serialize)]
pub struct IdentitySnapshot {
    pub id: AccountId,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub is_email_verified: bool,
    pub access_scope: AccessScope,
    pub created_at: DateTime<Utc>,
}

impl IdentitySnapshot {
    fn of(record: &AccountRecord, now: DateTime<Utc>) -> Self {
        Self {
            id: record.id,
            username: record.username.clone(),
            email: record.email.clone(),
            role: record.role,
            is_email_verified: record.is_email_verified,
            access_scope: AccessScope::resolve(record.created_at, record.is_email_verified, now),
            created_at: record.created_at,
        }
    }
}

/// Everything a successful login produces. The refresh token travels only in
/// the session cookie; the HTTP adapter must never put it in a body.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub tokens: TokenPair,
    pub user: IdentitySnapshot,
}

fn store_err(e: StoreError) -> CoreError {
    match e {
        StoreError::Conflict(msg) => CoreError::Conflict(msg),
        StoreError::NotFound => CoreError::not_found("record"),
        StoreError::Backend(msg) => {
            tracing::error!(error = %msg, "storage failure");
            CoreError::internal("storage failure")
        }
    }
}

/// Stateless per-request orchestrator over an injected store and token issuer.
#[derive(Clone)]
pub struct IdentityService {
    store: Arc<dyn AccountStore>,
    issuer: Arc<TokenIssuer>,
}

impl IdentityService {
    pub fn new(store: Arc<dyn AccountStore>, issuer: Arc<TokenIssuer>) -> Self {
        Self { store, issuer }
    }

    /// The account behind an authenticated username. A token whose subject no
    /// longer exists fails authentication, not lookup.
    async fn account_for(&self, username: &str) -> CoreResult<AccountRecord> {
        self.store
            .find_account_by_username(username)
            .await
            .map_err(store_err)?
            .ok_or(CoreError::Authentication)
    }

    fn scope_of(record: &AccountRecord) -> AccessScope {
        AccessScope::resolve(record.created_at, record.is_email_verified, Utc::now())
    }

    /// Resolve the actor's current scope and check that `surface` is
    /// reachable under it.
    pub async fn ensure_surface(&self, username: &str, surface: Surface) -> CoreResult<()> {
        let record = self.account_for(username).await?;
        ensure_reachable(Self::scope_of(&record), surface)
    }

    // ── Registration & authentication ────────────────────────────────────────

    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> CoreResult<IdentitySnapshot> {
        if self
            .store
            .find_account_by_username(username)
            .await
            .map_err(store_err)?
            .is_some()
        {
            return Err(CoreError::conflict("username already taken"));
        }
        if self
            .store
            .find_account_by_email(email)
            .await
            .map_err(store_err)?
            .is_some()
        {
            return Err(CoreError::conflict("email already registered"));
        }

        let password_hash = credential::hash_password(password)
            .map_err(|_| CoreError::internal("password hashing failed"))?;

        let record = self
            .store
            .insert_account(NewAccount {
                username: username.to_string(),
                email: email.to_string(),
                password_hash,
                role: Role::Learner,
                created_at: Utc::now(),
            })
            .await
            .map_err(store_err)?;

        tracing::info!(username = %record.username, "account registered");
        Ok(IdentitySnapshot::of(&record, Utc::now()))
    }

    /// Verify credentials and mint the access/refresh pair.
    ///
    /// Unknown username and wrong password are deliberately the same error.
    pub async fn login(&self, username: &str, password: &str) -> CoreResult<LoginOutcome> {
        let record = self
            .store
            .find_account_by_username(username)
            .await
            .map_err(store_err)?
            .ok_or(CoreError::Authentication)?;

        if !credential::verify_password(password, &record.password_hash) {
            return Err(CoreError::Authentication);
        }

        let tokens = self
            .issuer
            .issue_pair(&record.username, record.role)
            .map_err(|_| CoreError::internal("token signing failed"))?;

        tracing::info!(username = %record.username, "login succeeded");
        Ok(LoginOutcome {
            tokens,
            user: IdentitySnapshot::of(&record, Utc::now()),
        })
    }

    /// Exchange a refresh token for a new access token.
    ///
    /// Stateless: the new token is bound to the refresh token's own
    /// subject/role, with no store lookup. The refresh token itself stays
    /// valid until its expiry.
    pub fn refresh(&self, refresh_token: &str) -> CoreResult<String> {
        let claims = self
            .issuer
            .decode(refresh_token, TokenKind::Refresh)
            .ok_or(CoreError::Authentication)?;

        self.issuer
            .issue_access(&claims.sub, claims.role)
            .map_err(|_| CoreError::internal("token signing failed"))
    }

    pub async fn current_identity(&self, actor: &TokenClaims) -> CoreResult<IdentitySnapshot> {
        let record = self.account_for(&actor.sub).await?;
        Ok(IdentitySnapshot::of(&record, Utc::now()))
    }

    // ── Account mutations ────────────────────────────────────────────────────

    pub async fn verify_email(&self, actor: &TokenClaims) -> CoreResult<IdentitySnapshot> {
        let record = self.account_for(&actor.sub).await?;
        self.store
            .mark_email_verified(record.id)
            .await
            .map_err(store_err)?;
        let record = self.account_for(&actor.sub).await?;
        Ok(IdentitySnapshot::of(&record, Utc::now()))
    }

    pub async fn change_password(
        &self,
        actor: &TokenClaims,
        current_password: &str,
        new_password: &str,
    ) -> CoreResult<()> {
        let record = self.account_for(&actor.sub).await?;
        if !credential::verify_password(current_password, &record.password_hash) {
            return Err(CoreError::Authentication);
        }

        let password_hash = credential::hash_password(new_password)
            .map_err(|_| CoreError::internal("password hashing failed"))?;
        self.store
            .update_password_hash(record.id, &password_hash)
            .await
            .map_err(store_err)
    }

    /// Store a reset token for the account behind `email`, if any.
    ///
    /// Always succeeds from the caller's point of view so the endpoint cannot
    /// be used to probe which addresses are registered. Delivery of the token
    /// is a collaborator's job.
    pub async fn request_password_reset(&self, email: &str) -> CoreResult<String> {
        let Some(record) = self
            .store
            .find_account_by_email(email)
            .await
            .map_err(store_err)?
        else {
            return Ok(String::new());
        };

        let token = Uuid::new_v4().simple().to_string();
        let expires_at = Utc::now() + Duration::minutes(RESET_TOKEN_TTL_MINUTES);
        self.store
            .set_reset_token(record.id, &token, expires_at)
            .await
            .map_err(store_err)?;
        Ok(token)
    }

    pub async fn reset_password(&self, token: &str, new_password: &str) -> CoreResult<()> {
        let record = self
            .store
            .find_account_by_reset_token(token)
            .await
            .map_err(store_err)?
            .ok_or(CoreError::Authentication)?;

        let still_valid = record
            .reset_token_expires_at
            .is_some_and(|expires| expires > Utc::now());
        if !still_valid {
            return Err(CoreError::Authentication);
        }

        let password_hash = credential::hash_password(new_password)
            .map_err(|_| CoreError::internal("password hashing failed"))?;
        self.store
            .update_password_hash(record.id, &password_hash)
            .await
            .map_err(store_err)?;
        self.store
            .clear_reset_token(record.id)
            .await
            .map_err(store_err)
    }

    // ── Administration ───────────────────────────────────────────────────────

    pub async fn list_accounts(&self, actor: &TokenClaims) -> CoreResult<Vec<IdentitySnapshot>> {
        authorize(actor.role, Action::ListAccounts, Ownership::NotOwner)?;
        let now = Utc::now();
        Ok(self
            .store
            .list_accounts()
            .await
            .map_err(store_err)?
            .iter()
            .map(|record| IdentitySnapshot::of(record, now))
            .collect())
    }

    pub async fn set_role(
        &self,
        actor: &TokenClaims,
        target: AccountId,
        role: Role,
    ) -> CoreResult<()> {
        authorize(actor.role, Action::ChangeAccountRole, Ownership::NotOwner)?;
        let record = self
            .store
            .find_account_by_id(target)
            .await
            .map_err(store_err)?
            .ok_or_else(|| CoreError::not_found("account"))?;
        self.store.set_role(record.id, role).await.map_err(store_err)
    }

    /// Hard-delete an account and every dependent record.
    pub async fn delete_account(&self, actor: &TokenClaims, target: AccountId) -> CoreResult<()> {
        let record = self
            .store
            .find_account_by_id(target)
            .await
            .map_err(store_err)?
            .ok_or_else(|| CoreError::not_found("account"))?;

        let ownership = if record.username == actor.sub {
            Ownership::Owner
        } else {
            Ownership::NotOwner
        };
        authorize(actor.role, Action::DeleteAccount, ownership)?;

        lifecycle::delete_account(self.store.as_ref(), record.id).await
    }

    // ── Exercises ────────────────────────────────────────────────────────────

    pub async fn list_exercises(&self, actor: &TokenClaims) -> CoreResult<Vec<ExerciseRecord>> {
        self.ensure_surface(&actor.sub, Surface::Exercises).await?;
        Ok(self
            .store
            .list_exercises()
            .await
            .map_err(store_err)?
            .into_iter()
            .filter(|e| !e.is_archived)
            .collect())
    }

    pub async fn create_exercise(
        &self,
        actor: &TokenClaims,
        title: &str,
    ) -> CoreResult<ExerciseRecord> {
        authorize(actor.role, Action::CreateExercise, Ownership::NotOwner)?;
        let account = self.account_for(&actor.sub).await?;
        self.store
            .insert_exercise(title, account.id)
            .await
            .map_err(store_err)
    }

    async fn exercise_and_ownership(
        &self,
        actor: &TokenClaims,
        id: ExerciseId,
    ) -> CoreResult<(ExerciseRecord, Ownership)> {
        let exercise = self
            .store
            .find_exercise(id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| CoreError::not_found("exercise"))?;
        let account = self.account_for(&actor.sub).await?;
        let ownership = if exercise.creator_id == account.id {
            Ownership::Owner
        } else {
            Ownership::NotOwner
        };
        Ok((exercise, ownership))
    }

    pub async fn update_exercise(
        &self,
        actor: &TokenClaims,
        id: ExerciseId,
        title: &str,
    ) -> CoreResult<ExerciseRecord> {
        let (exercise, ownership) = self.exercise_and_ownership(actor, id).await?;
        authorize(actor.role, Action::ModifyExercise, ownership)?;
        self.store
            .update_exercise_title(exercise.id, title)
            .await
            .map_err(store_err)?;
        self.store
            .find_exercise(exercise.id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| CoreError::not_found("exercise"))
    }

    pub async fn delete_exercise(&self, actor: &TokenClaims, id: ExerciseId) -> CoreResult<()> {
        let (exercise, ownership) = self.exercise_and_ownership(actor, id).await?;
        authorize(actor.role, Action::DeleteExercise, ownership)?;

        if self
            .store
            .safe_delete(EXERCISES_TABLE, *exercise.id.as_uuid())
            .await
        {
            Ok(())
        } else {
            Err(CoreError::internal("exercise deletion failed"))
        }
    }

    /// Soft-archive: the exercise stays on disk, flagged, and attempts
    /// referencing it remain intact.
    pub async fn archive_exercise(&self, actor: &TokenClaims, id: ExerciseId) -> CoreResult<()> {
        authorize(actor.role, Action::ArchiveExercise, Ownership::NotOwner)?;
        let exercise = self
            .store
            .find_exercise(id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| CoreError::not_found("exercise"))?;

        if self
            .store
            .safe_archive(EXERCISES_TABLE, *exercise.id.as_uuid())
            .await
        {
            Ok(())
        } else {
            Err(CoreError::internal("exercise archival failed"))
        }
    }

    pub async fn attempt_exercise(&self, actor: &TokenClaims, id: ExerciseId) -> CoreResult<()> {
        self.ensure_surface(&actor.sub, Surface::Exercises).await?;
        authorize(actor.role, Action::AttemptExercise, Ownership::NotOwner)?;

        let account = self.account_for(&actor.sub).await?;
        let exercise = self
            .store
            .find_exercise(id)
            .await
            .map_err(store_err)?
            .filter(|e| !e.is_archived)
            .ok_or_else(|| CoreError::not_found("exercise"))?;

        self.store
            .record_attempt(account.id, exercise.id)
            .await
            .map_err(store_err)
    }

    // ── Gated read surfaces ──────────────────────────────────────────────────

    pub async fn statistics(&self, actor: &TokenClaims) -> CoreResult<AccountStatistics> {
        self.ensure_surface(&actor.sub, Surface::Statistics).await?;
        let account = self.account_for(&actor.sub).await?;
        self.store
            .account_statistics(account.id)
            .await
            .map_err(store_err)
    }

    pub async fn leaderboard(&self, actor: &TokenClaims) -> CoreResult<Vec<LeaderboardRow>> {
        self.ensure_surface(&actor.sub, Surface::Leaderboard).await?;
        self.store
            .attempt_leaderboard(LEADERBOARD_LIMIT)
            .await
            .map_err(store_err)
    }

    pub async fn challenges(&self, actor: &TokenClaims) -> CoreResult<Vec<ChallengeRecord>> {
        self.ensure_surface(&actor.sub, Surface::Challenges).await?;
        self.store.list_challenges().await.map_err(store_err)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
