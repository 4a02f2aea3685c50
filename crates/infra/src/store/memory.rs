//! In-memory account store.
//!
//! Intended for tests/dev. Mirrors the Postgres implementation's semantics,
//! including cascade behavior and the safe helpers' boolean outcomes, without
//! a database. Test-only seams (`seed_dependent`, `set_account_created_at`)
//! exist so black-box tests can stage dependent rows and account age.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use async_trait::async_trait;

use kata_auth::Role;
use kata_core::{AccountId, ExerciseId};

use super::{
    child_tables, AccountRecord, AccountStatistics, AccountStore, BadgeStats, CascadeReport,
    ChallengeRecord, ExerciseRecord, LeaderboardRow, NewAccount, StoreError, ARCHIVABLE_TABLES,
    DEPENDENT_TABLES, EXERCISES_TABLE,
};

/// A generic dependent row: who it belongs to, and (when meaningful) which
/// resource it references.
#[derive(Debug, Clone)]
struct DependentRow {
    account_id: Uuid,
    resource_id: Option<Uuid>,
}

#[derive(Debug, Default)]
struct Inner {
    accounts: HashMap<Uuid, AccountRecord>,
    exercises: HashMap<Uuid, ExerciseRecord>,
    dependents: HashMap<&'static str, Vec<DependentRow>>,
    challenges: Vec<ChallengeRecord>,
}

/// In-memory store over `RwLock`ed maps.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    /// Test seam: add a dependent row for an account in one of the generic
    /// dependent tables.
    pub fn seed_dependent(&self, table: &'static str, account_id: AccountId) {
        debug_assert!(
            DEPENDENT_TABLES.iter().any(|(t, _)| *t == table) && table != EXERCISES_TABLE,
            "unknown dependent table '{table}'"
        );
        let mut inner = self.inner.write().expect("lock poisoned");
        inner.dependents.entry(table).or_default().push(DependentRow {
            account_id: *account_id.as_uuid(),
            resource_id: None,
        });
    }

    /// Test seam: rewrite an account's creation timestamp (to exercise the
    /// grace-window transitions without waiting).
    pub fn set_account_created_at(&self, username: &str, created_at: DateTime<Utc>) {
        let mut inner = self.inner.write().expect("lock poisoned");
        if let Some(account) = inner
            .accounts
            .values_mut()
            .find(|a| a.username == username)
        {
            account.created_at = created_at;
        }
    }

    /// Test/dev seam: add a listable challenge.
    pub fn seed_challenge(&self, title: &str) {
        let mut inner = self.inner.write().expect("lock poisoned");
        inner.challenges.push(ChallengeRecord {
            id: Uuid::now_v7(),
            title: title.to_string(),
        });
    }

    fn count_for(inner: &Inner, table: &str, fk: &str, account: Uuid) -> u64 {
        if table == EXERCISES_TABLE {
            debug_assert_eq!(fk, "creator_id");
            inner
                .exercises
                .values()
                .filter(|e| *e.creator_id.as_uuid() == account)
                .count() as u64
        } else {
            inner
                .dependents
                .get(table)
                .map(|rows| rows.iter().filter(|r| r.account_id == account).count() as u64)
                .unwrap_or(0)
        }
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn insert_account(&self, account: NewAccount) -> Result<AccountRecord, StoreError> {
        let mut inner = self.write()?;

        if inner.accounts.values().any(|a| a.username == account.username) {
            return Err(StoreError::Conflict("username already taken".to_string()));
        }
        if inner.accounts.values().any(|a| a.email == account.email) {
            return Err(StoreError::Conflict("email already registered".to_string()));
        }

        let record = AccountRecord {
            id: AccountId::new(),
            username: account.username,
            email: account.email,
            password_hash: account.password_hash,
            role: account.role,
            is_email_verified: false,
            created_at: account.created_at,
            reset_token: None,
            reset_token_expires_at: None,
        };
        inner.accounts.insert(*record.id.as_uuid(), record.clone());
        Ok(record)
    }

    async fn find_account_by_id(&self, id: AccountId) -> Result<Option<AccountRecord>, StoreError> {
        Ok(self.read()?.accounts.get(id.as_uuid()).cloned())
    }

    async fn find_account_by_username(
        &self,
        username: &str,
    ) -> Result<Option<AccountRecord>, StoreError> {
        Ok(self
            .read()?
            .accounts
            .values()
            .find(|a| a.username == username)
            .cloned())
    }

    async fn find_account_by_email(
        &self,
        email: &str,
    ) -> Result<Option<AccountRecord>, StoreError> {
        Ok(self
            .read()?
            .accounts
            .values()
            .find(|a| a.email == email)
            .cloned())
    }

    async fn find_account_by_reset_token(
        &self,
        token: &str,
    ) -> Result<Option<AccountRecord>, StoreError> {
        Ok(self
            .read()?
            .accounts
            .values()
            .find(|a| a.reset_token.as_deref() == Some(token))
            .cloned())
    }

    async fn list_accounts(&self) -> Result<Vec<AccountRecord>, StoreError> {
        let mut accounts: Vec<AccountRecord> = self.read()?.accounts.values().cloned().collect();
        accounts.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(accounts)
    }

    async fn update_password_hash(
        &self,
        id: AccountId,
        password_hash: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        let account = inner
            .accounts
            .get_mut(id.as_uuid())
            .ok_or(StoreError::NotFound)?;
        account.password_hash = password_hash.to_string();
        Ok(())
    }

    async fn mark_email_verified(&self, id: AccountId) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        let account = inner
            .accounts
            .get_mut(id.as_uuid())
            .ok_or(StoreError::NotFound)?;
        account.is_email_verified = true;
        Ok(())
    }

    async fn set_role(&self, id: AccountId, role: Role) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        let account = inner
            .accounts
            .get_mut(id.as_uuid())
            .ok_or(StoreError::NotFound)?;
        account.role = role;
        Ok(())
    }

    async fn set_reset_token(
        &self,
        id: AccountId,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        let account = inner
            .accounts
            .get_mut(id.as_uuid())
            .ok_or(StoreError::NotFound)?;
        account.reset_token = Some(token.to_string());
        account.reset_token_expires_at = Some(expires_at);
        Ok(())
    }

    async fn clear_reset_token(&self, id: AccountId) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        let account = inner
            .accounts
            .get_mut(id.as_uuid())
            .ok_or(StoreError::NotFound)?;
        account.reset_token = None;
        account.reset_token_expires_at = None;
        Ok(())
    }

    async fn insert_exercise(
        &self,
        title: &str,
        creator_id: AccountId,
    ) -> Result<ExerciseRecord, StoreError> {
        let mut inner = self.write()?;
        let record = ExerciseRecord {
            id: ExerciseId::new(),
            title: title.to_string(),
            creator_id,
            is_archived: false,
            created_at: Utc::now(),
        };
        inner.exercises.insert(*record.id.as_uuid(), record.clone());
        Ok(record)
    }

    async fn find_exercise(&self, id: ExerciseId) -> Result<Option<ExerciseRecord>, StoreError> {
        Ok(self.read()?.exercises.get(id.as_uuid()).cloned())
    }

    async fn list_exercises(&self) -> Result<Vec<ExerciseRecord>, StoreError> {
        let mut exercises: Vec<ExerciseRecord> =
            self.read()?.exercises.values().cloned().collect();
        exercises.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(exercises)
    }

    async fn update_exercise_title(
        &self,
        id: ExerciseId,
        title: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        let exercise = inner
            .exercises
            .get_mut(id.as_uuid())
            .ok_or(StoreError::NotFound)?;
        exercise.title = title.to_string();
        Ok(())
    }

    async fn record_attempt(
        &self,
        account_id: AccountId,
        exercise_id: ExerciseId,
    ) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        if !inner.accounts.contains_key(account_id.as_uuid()) {
            return Err(StoreError::NotFound);
        }
        if !inner.exercises.contains_key(exercise_id.as_uuid()) {
            return Err(StoreError::NotFound);
        }
        inner
            .dependents
            .entry("exercise_attempts")
            .or_default()
            .push(DependentRow {
                account_id: *account_id.as_uuid(),
                resource_id: Some(*exercise_id.as_uuid()),
            });
        Ok(())
    }

    async fn safe_delete(&self, table: &str, id: Uuid) -> bool {
        if table != EXERCISES_TABLE {
            tracing::warn!(table, "safe delete requested for unsupported table");
            return false;
        }
        let Ok(mut inner) = self.inner.write() else {
            return false;
        };
        inner.exercises.remove(&id);
        for (child, _fk) in child_tables(table) {
            if let Some(rows) = inner.dependents.get_mut(child) {
                rows.retain(|r| r.resource_id != Some(id));
            }
        }
        true
    }

    async fn safe_archive(&self, table: &str, id: Uuid) -> bool {
        if !ARCHIVABLE_TABLES.contains(&table) {
            return false;
        }
        let Ok(mut inner) = self.inner.write() else {
            return false;
        };
        match inner.exercises.get_mut(&id) {
            Some(exercise) => {
                exercise.is_archived = true;
                true
            }
            None => false,
        }
    }

    async fn delete_account_cascade(&self, id: AccountId) -> Result<CascadeReport, StoreError> {
        let mut inner = self.write()?;
        let account = *id.as_uuid();

        if !inner.accounts.contains_key(&account) {
            return Err(StoreError::NotFound);
        }

        // Children of authored exercises go first, then the generic dependent
        // tables, then the authored exercises, then the account row.
        let authored: Vec<Uuid> = inner
            .exercises
            .values()
            .filter(|e| *e.creator_id.as_uuid() == account)
            .map(|e| *e.id.as_uuid())
            .collect();
        if let Some(rows) = inner.dependents.get_mut("exercise_attempts") {
            rows.retain(|r| !matches!(r.resource_id, Some(ex) if authored.contains(&ex)));
        }

        for rows in inner.dependents.values_mut() {
            rows.retain(|r| r.account_id != account);
        }
        inner.exercises.retain(|_, e| *e.creator_id.as_uuid() != account);
        inner.accounts.remove(&account);

        let remaining = DEPENDENT_TABLES
            .iter()
            .map(|&(table, fk)| (table, Self::count_for(&inner, table, fk, account)))
            .collect();

        Ok(CascadeReport { remaining })
    }

    async fn count_dependent_rows(
        &self,
        id: AccountId,
    ) -> Result<Vec<(&'static str, u64)>, StoreError> {
        let inner = self.read()?;
        Ok(DEPENDENT_TABLES
            .iter()
            .map(|&(table, fk)| (table, Self::count_for(&inner, table, fk, *id.as_uuid())))
            .collect())
    }

    async fn attempt_leaderboard(&self, limit: u32) -> Result<Vec<LeaderboardRow>, StoreError> {
        let inner = self.read()?;
        let mut counts: HashMap<Uuid, u64> = HashMap::new();
        if let Some(rows) = inner.dependents.get("exercise_attempts") {
            for row in rows {
                *counts.entry(row.account_id).or_default() += 1;
            }
        }

        let mut board: Vec<LeaderboardRow> = counts
            .into_iter()
            .filter_map(|(account, attempts)| {
                inner.accounts.get(&account).map(|a| LeaderboardRow {
                    username: a.username.clone(),
                    attempts,
                })
            })
            .collect();
        board.sort_by(|a, b| b.attempts.cmp(&a.attempts).then(a.username.cmp(&b.username)));
        board.truncate(limit as usize);
        Ok(board)
    }

    async fn list_challenges(&self) -> Result<Vec<ChallengeRecord>, StoreError> {
        Ok(self.read()?.challenges.clone())
    }

    async fn badge_statistics(&self) -> Result<BadgeStats, StoreError> {
        let inner = self.read()?;
        let rows = inner.dependents.get("account_achievements");
        let total_awarded = rows.map(|r| r.len() as u64).unwrap_or(0);
        let accounts_with_badges = rows
            .map(|r| {
                r.iter()
                    .map(|row| row.account_id)
                    .collect::<std::collections::HashSet<_>>()
                    .len() as u64
            })
            .unwrap_or(0);
        Ok(BadgeStats {
            total_awarded,
            accounts_with_badges,
        })
    }

    async fn account_statistics(
        &self,
        id: AccountId,
    ) -> Result<AccountStatistics, StoreError> {
        let inner = self.read()?;
        let account = *id.as_uuid();
        let count = |table: &'static str| {
            inner
                .dependents
                .get(table)
                .map(|rows| rows.iter().filter(|r| r.account_id == account).count() as u64)
                .unwrap_or(0)
        };
        Ok(AccountStatistics {
            attempts: count("exercise_attempts"),
            progress_entries: count("progress"),
            achievements: count("account_achievements"),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ACCOUNTS_TABLE;

    fn new_account(username: &str, email: &str) -> NewAccount {
        NewAccount {
            username: username.to_string(),
            email: email.to_string(),
            password_hash: "$argon2id$stub".to_string(),
            role: Role::Learner,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn duplicate_username_conflicts() {
        let store = MemoryStore::new();
        store
            .insert_account(new_account("alice", "alice@example.com"))
            .await
            .unwrap();

        let err = store
            .insert_account(new_account("alice", "other@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let err = store
            .insert_account(new_account("alice2", "alice@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn cascade_deletes_every_dependent_table() {
        let store = MemoryStore::new();
        let account = store
            .insert_account(new_account("bob", "bob@example.com"))
            .await
            .unwrap();

        for &(table, _) in DEPENDENT_TABLES {
            if table != EXERCISES_TABLE {
                store.seed_dependent(table, account.id);
            }
        }
        let exercise = store.insert_exercise("fizzbuzz", account.id).await.unwrap();
        store.record_attempt(account.id, exercise.id).await.unwrap();

        let report = store.delete_account_cascade(account.id).await.unwrap();
        assert!(report.remaining.iter().all(|(_, n)| *n == 0));
        assert!(store
            .find_account_by_username("bob")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn cascade_removes_other_accounts_attempts_on_authored_exercises() {
        let store = MemoryStore::new();
        let author = store
            .insert_account(new_account("author", "author@example.com"))
            .await
            .unwrap();
        let learner = store
            .insert_account(new_account("learner", "learner@example.com"))
            .await
            .unwrap();

        let exercise = store.insert_exercise("two-sum", author.id).await.unwrap();
        store.record_attempt(learner.id, exercise.id).await.unwrap();

        store.delete_account_cascade(author.id).await.unwrap();

        // The learner's attempt pointed at a now-deleted exercise; it must not
        // linger as an orphan.
        let stats = store.account_statistics(learner.id).await.unwrap();
        assert_eq!(stats.attempts, 0);
    }

    #[tokio::test]
    async fn cascade_on_missing_account_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .delete_account_cascade(AccountId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn archive_is_soft_and_flag_gated() {
        let store = MemoryStore::new();
        let account = store
            .insert_account(new_account("carol", "carol@example.com"))
            .await
            .unwrap();
        let exercise = store.insert_exercise("anagrams", account.id).await.unwrap();

        assert!(store.safe_archive(EXERCISES_TABLE, *exercise.id.as_uuid()).await);
        let archived = store.find_exercise(exercise.id).await.unwrap().unwrap();
        assert!(archived.is_archived);

        // Accounts have no soft-delete flag.
        assert!(!store.safe_archive(ACCOUNTS_TABLE, *account.id.as_uuid()).await);
    }

    #[tokio::test]
    async fn leaderboard_orders_by_attempts() {
        let store = MemoryStore::new();
        let a = store
            .insert_account(new_account("amber", "amber@example.com"))
            .await
            .unwrap();
        let b = store
            .insert_account(new_account("blake", "blake@example.com"))
            .await
            .unwrap();
        let exercise = store.insert_exercise("sorting", a.id).await.unwrap();

        store.record_attempt(a.id, exercise.id).await.unwrap();
        store.record_attempt(b.id, exercise.id).await.unwrap();
        store.record_attempt(b.id, exercise.id).await.unwrap();

        let board = store.attempt_leaderboard(10).await.unwrap();
        assert_eq!(board[0].username, "blake");
        assert_eq!(board[0].attempts, 2);
        assert_eq!(board[1].username, "amber");
    }
}
