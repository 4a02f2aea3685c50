//! Account store contract.
//!
//! Two implementations, mirroring how the rest of the system is tested and
//! deployed: [`MemoryStore`] for tests/dev and [`PostgresStore`] for real
//! deployments. Dependent-record handling is deliberately generic: the cascade
//! and the safe helpers operate on `(table, fk column)` pairs from the static
//! schema map below, not on business meaning.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use kata_auth::Role;
use kata_core::{AccountId, ExerciseId};

pub const ACCOUNTS_TABLE: &str = "accounts";
pub const EXERCISES_TABLE: &str = "exercises";

/// Tables referencing an account by foreign key, children first.
///
/// The cascade deletes and the post-condition scan both walk this list; a new
/// dependent table only needs an entry here.
pub const DEPENDENT_TABLES: &[(&str, &str)] = &[
    ("exercise_attempts", "account_id"),
    ("progress", "account_id"),
    ("recommendations", "account_id"),
    ("account_achievements", "account_id"),
    ("sessions", "account_id"),
    ("notifications", "account_id"),
    ("challenge_attempts", "account_id"),
    ("exercises", "creator_id"),
];

/// Tables carrying an `is_archived` soft-delete flag. Archiving anything else
/// fails without mutating.
pub const ARCHIVABLE_TABLES: &[&str] = &[EXERCISES_TABLE];

/// Child rows that block a direct parent-row delete when the schema-level
/// cascade cannot be relied on: `(child table, fk column)` per parent table.
pub fn child_tables(table: &str) -> &'static [(&'static str, &'static str)] {
    match table {
        EXERCISES_TABLE => &[("exercise_attempts", "exercise_id")],
        _ => &[],
    }
}

/// Persisted account row.
#[derive(Debug, Clone)]
pub struct AccountRecord {
    pub id: AccountId,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub is_email_verified: bool,
    pub created_at: DateTime<Utc>,
    pub reset_token: Option<String>,
    pub reset_token_expires_at: Option<DateTime<Utc>>,
}

/// Fields supplied at account creation; everything else takes its initial
/// value (unverified, no reset token).
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Ownership/archival metadata of an exercise. Exercise content lives outside
/// this core.
#[derive(Debug, Clone, Serialize)]
pub struct ExerciseRecord {
    pub id: ExerciseId,
    pub title: String,
    pub creator_id: AccountId,
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardRow {
    pub username: String,
    pub attempts: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChallengeRecord {
    pub id: Uuid,
    pub title: String,
}

/// Aggregate badge statistics (cheap, non-authoritative read).
#[derive(Debug, Clone, Serialize)]
pub struct BadgeStats {
    pub total_awarded: u64,
    pub accounts_with_badges: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountStatistics {
    pub attempts: u64,
    pub progress_entries: u64,
    pub achievements: u64,
}

/// Outcome of a committed account cascade: per-table dependent-row counts
/// observed *after* the deletes, before the outer commit. All zeros is the
/// invariant; the lifecycle coordinator enforces it.
#[derive(Debug, Clone)]
pub struct CascadeReport {
    pub remaining: Vec<(&'static str, u64)>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// Unique-constraint violation (duplicate username/email).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The targeted row does not exist.
    #[error("not found")]
    NotFound,

    /// Any other storage-layer failure.
    #[error("backend failure: {0}")]
    Backend(String),
}

/// Persistence contract for accounts, exercises, and dependent records.
///
/// The `safe_*` helpers never raise: all SQL-layer errors are converted into a
/// boolean result so cascade orchestration stays free of low-level exception
/// handling.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn insert_account(&self, account: NewAccount) -> Result<AccountRecord, StoreError>;
    async fn find_account_by_id(&self, id: AccountId) -> Result<Option<AccountRecord>, StoreError>;
    async fn find_account_by_username(
        &self,
        username: &str,
    ) -> Result<Option<AccountRecord>, StoreError>;
    async fn find_account_by_email(&self, email: &str)
        -> Result<Option<AccountRecord>, StoreError>;
    async fn find_account_by_reset_token(
        &self,
        token: &str,
    ) -> Result<Option<AccountRecord>, StoreError>;
    async fn list_accounts(&self) -> Result<Vec<AccountRecord>, StoreError>;
    async fn update_password_hash(
        &self,
        id: AccountId,
        password_hash: &str,
    ) -> Result<(), StoreError>;
    async fn mark_email_verified(&self, id: AccountId) -> Result<(), StoreError>;
    async fn set_role(&self, id: AccountId, role: Role) -> Result<(), StoreError>;
    async fn set_reset_token(
        &self,
        id: AccountId,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
    async fn clear_reset_token(&self, id: AccountId) -> Result<(), StoreError>;

    async fn insert_exercise(
        &self,
        title: &str,
        creator_id: AccountId,
    ) -> Result<ExerciseRecord, StoreError>;
    async fn find_exercise(&self, id: ExerciseId) -> Result<Option<ExerciseRecord>, StoreError>;
    async fn list_exercises(&self) -> Result<Vec<ExerciseRecord>, StoreError>;
    async fn update_exercise_title(&self, id: ExerciseId, title: &str)
        -> Result<(), StoreError>;
    async fn record_attempt(
        &self,
        account_id: AccountId,
        exercise_id: ExerciseId,
    ) -> Result<(), StoreError>;

    /// Delete a row, falling back to explicit child-row deletion when the
    /// direct delete fails. Only both attempts failing reports `false`.
    async fn safe_delete(&self, table: &str, id: Uuid) -> bool;

    /// Set the soft-delete flag. Tables without one report `false` without
    /// mutating anything.
    async fn safe_archive(&self, table: &str, id: Uuid) -> bool;

    /// Delete an account and every dependent record in one transaction
    /// boundary, children before parent, and report the post-delete scan.
    async fn delete_account_cascade(&self, id: AccountId) -> Result<CascadeReport, StoreError>;

    /// Per-table dependent-row counts for an account id.
    async fn count_dependent_rows(
        &self,
        id: AccountId,
    ) -> Result<Vec<(&'static str, u64)>, StoreError>;

    async fn attempt_leaderboard(&self, limit: u32) -> Result<Vec<LeaderboardRow>, StoreError>;
    async fn list_challenges(&self) -> Result<Vec<ChallengeRecord>, StoreError>;
    async fn badge_statistics(&self) -> Result<BadgeStats, StoreError>;
    async fn account_statistics(&self, id: AccountId)
        -> Result<AccountStatistics, StoreError>;
}
