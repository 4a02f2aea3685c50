//! Postgres-backed account store.
//!
//! All mutating operations run through the [`TransactionManager`]: an outer
//! transaction plus a nested savepoint, committed together on success and
//! rolled back together on any error. The account cascade additionally runs
//! its post-condition scan inside the same outer transaction, so the report it
//! returns describes exactly what was committed.
//!
//! ## Expected schema
//!
//! Migrations are run by collaborators; this store expects:
//!
//! | Table | Columns used here |
//! |---|---|
//! | `accounts` | `id uuid pk`, `username text unique`, `email text unique`, `password_hash text`, `role text`, `is_email_verified bool`, `created_at timestamptz`, `reset_token text null`, `reset_token_expires_at timestamptz null` |
//! | `exercises` | `id uuid pk`, `title text`, `creator_id uuid fk`, `is_archived bool`, `created_at timestamptz` |
//! | `exercise_attempts` | `id uuid pk`, `account_id uuid fk`, `exercise_id uuid fk`, `created_at timestamptz` |
//! | `challenges` | `id uuid pk`, `title text` |
//! | `progress`, `recommendations`, `account_achievements`, `sessions`, `notifications`, `challenge_attempts` | `account_id uuid fk` (touched only generically, by table name) |
//!
//! ## Error mapping
//!
//! | SQLx error | PostgreSQL code | StoreError |
//! |---|---|---|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | RowNotFound | n/a | `NotFound` |
//! | anything else | any | `Backend` |

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::instrument;
use uuid::Uuid;

use async_trait::async_trait;

use kata_auth::Role;
use kata_core::{AccountId, ExerciseId};

use crate::txn::TransactionManager;

use super::{
    child_tables, AccountRecord, AccountStatistics, AccountStore, BadgeStats, CascadeReport,
    ChallengeRecord, ExerciseRecord, LeaderboardRow, NewAccount, StoreError, DEPENDENT_TABLES,
};

/// Postgres store over a shared connection pool.
///
/// `Send + Sync`; the pool handles connection management across workers, and
/// no session outlives a single call.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
    txn: TransactionManager,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        let txn = TransactionManager::new(pool.clone());
        Self { pool, txn }
    }
}

fn map_sqlx_error(op: &str, e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            StoreError::Conflict("username or email already taken".to_string())
        }
        sqlx::Error::RowNotFound => StoreError::NotFound,
        _ => StoreError::Backend(format!("{op}: {e}")),
    }
}

#[derive(Debug, FromRow)]
struct AccountRow {
    id: Uuid,
    username: String,
    email: String,
    password_hash: String,
    role: String,
    is_email_verified: bool,
    created_at: DateTime<Utc>,
    reset_token: Option<String>,
    reset_token_expires_at: Option<DateTime<Utc>>,
}

impl TryFrom<AccountRow> for AccountRecord {
    type Error = StoreError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        // Role text is mapped to the closed enum here, at the persistence
        // edge; policy code never sees the storage representation.
        let role: Role = row
            .role
            .parse()
            .map_err(|_| StoreError::Backend(format!("unknown role '{}'", row.role)))?;

        Ok(AccountRecord {
            id: AccountId::from_uuid(row.id),
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            role,
            is_email_verified: row.is_email_verified,
            created_at: row.created_at,
            reset_token: row.reset_token,
            reset_token_expires_at: row.reset_token_expires_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ExerciseRow {
    id: Uuid,
    title: String,
    creator_id: Uuid,
    is_archived: bool,
    created_at: DateTime<Utc>,
}

impl From<ExerciseRow> for ExerciseRecord {
    fn from(row: ExerciseRow) -> Self {
        ExerciseRecord {
            id: ExerciseId::from_uuid(row.id),
            title: row.title,
            creator_id: AccountId::from_uuid(row.creator_id),
            is_archived: row.is_archived,
            created_at: row.created_at,
        }
    }
}

const ACCOUNT_COLUMNS: &str = "id, username, email, password_hash, role, is_email_verified, \
     created_at, reset_token, reset_token_expires_at";

impl PostgresStore {
    async fn fetch_account_where(
        &self,
        predicate: &str,
        bind: &str,
        op: &str,
    ) -> Result<Option<AccountRecord>, StoreError> {
        let row: Option<AccountRow> = sqlx::query_as(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE {predicate} = $1"
        ))
        .bind(bind)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(op, e))?;

        row.map(AccountRecord::try_from).transpose()
    }

    /// Execute one row-targeted statement inside a savepoint scope, requiring
    /// at least one affected row.
    async fn exec_expecting_row(
        &self,
        op: &str,
        query: sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments>,
    ) -> Result<(), StoreError> {
        let mut scope = self
            .txn
            .scope()
            .await
            .map_err(|e| map_sqlx_error(op, e))?;
        {
            let mut sp = scope.savepoint().await.map_err(|e| map_sqlx_error(op, e))?;
            let affected = query
                .execute(&mut *sp)
                .await
                .map_err(|e| map_sqlx_error(op, e))?
                .rows_affected();
            if affected == 0 {
                return Err(StoreError::NotFound);
            }
            sp.commit().await.map_err(|e| map_sqlx_error(op, e))?;
        }
        scope.commit().await.map_err(|e| map_sqlx_error(op, e))
    }
}

#[async_trait]
impl AccountStore for PostgresStore {
    #[instrument(skip(self, account), fields(username = %account.username))]
    async fn insert_account(&self, account: NewAccount) -> Result<AccountRecord, StoreError> {
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

        let mut scope = self
            .txn
            .scope()
            .await
            .map_err(|e| map_sqlx_error("insert_account", e))?;
        {
            let mut sp = scope
                .savepoint()
                .await
                .map_err(|e| map_sqlx_error("insert_account", e))?;
            sqlx::query(
                "INSERT INTO accounts \
                 (id, username, email, password_hash, role, is_email_verified, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(record.id.as_uuid())
            .bind(&record.username)
            .bind(&record.email)
            .bind(&record.password_hash)
            .bind(record.role.as_str())
            .bind(record.is_email_verified)
            .bind(record.created_at)
            .execute(&mut *sp)
            .await
            .map_err(|e| map_sqlx_error("insert_account", e))?;
            sp.commit()
                .await
                .map_err(|e| map_sqlx_error("insert_account", e))?;
        }
        scope
            .commit()
            .await
            .map_err(|e| map_sqlx_error("insert_account", e))?;

        Ok(record)
    }

    async fn find_account_by_id(&self, id: AccountId) -> Result<Option<AccountRecord>, StoreError> {
        let row: Option<AccountRow> = sqlx::query_as(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_account_by_id", e))?;

        row.map(AccountRecord::try_from).transpose()
    }

    async fn find_account_by_username(
        &self,
        username: &str,
    ) -> Result<Option<AccountRecord>, StoreError> {
        self.fetch_account_where("username", username, "find_account_by_username")
            .await
    }

    async fn find_account_by_email(
        &self,
        email: &str,
    ) -> Result<Option<AccountRecord>, StoreError> {
        self.fetch_account_where("email", email, "find_account_by_email")
            .await
    }

    async fn find_account_by_reset_token(
        &self,
        token: &str,
    ) -> Result<Option<AccountRecord>, StoreError> {
        self.fetch_account_where("reset_token", token, "find_account_by_reset_token")
            .await
    }

    async fn list_accounts(&self) -> Result<Vec<AccountRecord>, StoreError> {
        let rows: Vec<AccountRow> = sqlx::query_as(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_accounts", e))?;

        rows.into_iter().map(AccountRecord::try_from).collect()
    }

    #[instrument(skip(self, password_hash), fields(account_id = %id))]
    async fn update_password_hash(
        &self,
        id: AccountId,
        password_hash: &str,
    ) -> Result<(), StoreError> {
        self.exec_expecting_row(
            "update_password_hash",
            sqlx::query("UPDATE accounts SET password_hash = $1 WHERE id = $2")
                .bind(password_hash)
                .bind(id.as_uuid()),
        )
        .await
    }

    #[instrument(skip(self), fields(account_id = %id))]
    async fn mark_email_verified(&self, id: AccountId) -> Result<(), StoreError> {
        self.exec_expecting_row(
            "mark_email_verified",
            sqlx::query("UPDATE accounts SET is_email_verified = TRUE WHERE id = $1")
                .bind(id.as_uuid()),
        )
        .await
    }

    #[instrument(skip(self), fields(account_id = %id, role = %role))]
    async fn set_role(&self, id: AccountId, role: Role) -> Result<(), StoreError> {
        self.exec_expecting_row(
            "set_role",
            sqlx::query("UPDATE accounts SET role = $1 WHERE id = $2")
                .bind(role.as_str())
                .bind(id.as_uuid()),
        )
        .await
    }

    async fn set_reset_token(
        &self,
        id: AccountId,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.exec_expecting_row(
            "set_reset_token",
            sqlx::query(
                "UPDATE accounts SET reset_token = $1, reset_token_expires_at = $2 WHERE id = $3",
            )
            .bind(token)
            .bind(expires_at)
            .bind(id.as_uuid()),
        )
        .await
    }

    async fn clear_reset_token(&self, id: AccountId) -> Result<(), StoreError> {
        self.exec_expecting_row(
            "clear_reset_token",
            sqlx::query(
                "UPDATE accounts SET reset_token = NULL, reset_token_expires_at = NULL \
                 WHERE id = $1",
            )
            .bind(id.as_uuid()),
        )
        .await
    }

    #[instrument(skip(self, title), fields(creator_id = %creator_id))]
    async fn insert_exercise(
        &self,
        title: &str,
        creator_id: AccountId,
    ) -> Result<ExerciseRecord, StoreError> {
        let record = ExerciseRecord {
            id: ExerciseId::new(),
            title: title.to_string(),
            creator_id,
            is_archived: false,
            created_at: Utc::now(),
        };

        let mut scope = self
            .txn
            .scope()
            .await
            .map_err(|e| map_sqlx_error("insert_exercise", e))?;
        {
            let mut sp = scope
                .savepoint()
                .await
                .map_err(|e| map_sqlx_error("insert_exercise", e))?;
            sqlx::query(
                "INSERT INTO exercises (id, title, creator_id, is_archived, created_at) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(record.id.as_uuid())
            .bind(&record.title)
            .bind(record.creator_id.as_uuid())
            .bind(record.is_archived)
            .bind(record.created_at)
            .execute(&mut *sp)
            .await
            .map_err(|e| map_sqlx_error("insert_exercise", e))?;
            sp.commit()
                .await
                .map_err(|e| map_sqlx_error("insert_exercise", e))?;
        }
        scope
            .commit()
            .await
            .map_err(|e| map_sqlx_error("insert_exercise", e))?;

        Ok(record)
    }

    async fn find_exercise(&self, id: ExerciseId) -> Result<Option<ExerciseRecord>, StoreError> {
        let row: Option<ExerciseRow> = sqlx::query_as(
            "SELECT id, title, creator_id, is_archived, created_at FROM exercises WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_exercise", e))?;

        Ok(row.map(ExerciseRecord::from))
    }

    async fn list_exercises(&self) -> Result<Vec<ExerciseRecord>, StoreError> {
        let rows: Vec<ExerciseRow> = sqlx::query_as(
            "SELECT id, title, creator_id, is_archived, created_at FROM exercises \
             ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_exercises", e))?;

        Ok(rows.into_iter().map(ExerciseRecord::from).collect())
    }

    async fn update_exercise_title(
        &self,
        id: ExerciseId,
        title: &str,
    ) -> Result<(), StoreError> {
        let op = "update_exercise_title";
        let mut scope = self.txn.scope().await.map_err(|e| map_sqlx_error(op, e))?;
        {
            let mut sp = scope.savepoint().await.map_err(|e| map_sqlx_error(op, e))?;
            let affected = sqlx::query("UPDATE exercises SET title = $1 WHERE id = $2")
                .bind(title)
                .bind(id.as_uuid())
                .execute(&mut *sp)
                .await
                .map_err(|e| map_sqlx_error(op, e))?
                .rows_affected();
            if affected == 0 {
                return Err(StoreError::NotFound);
            }
            sp.commit().await.map_err(|e| map_sqlx_error(op, e))?;
        }
        scope.commit().await.map_err(|e| map_sqlx_error(op, e))
    }

    #[instrument(skip(self), fields(account_id = %account_id, exercise_id = %exercise_id))]
    async fn record_attempt(
        &self,
        account_id: AccountId,
        exercise_id: ExerciseId,
    ) -> Result<(), StoreError> {
        let op = "record_attempt";
        let mut scope = self.txn.scope().await.map_err(|e| map_sqlx_error(op, e))?;
        {
            let mut sp = scope.savepoint().await.map_err(|e| map_sqlx_error(op, e))?;
            sqlx::query(
                "INSERT INTO exercise_attempts (id, account_id, exercise_id, created_at) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(Uuid::now_v7())
            .bind(account_id.as_uuid())
            .bind(exercise_id.as_uuid())
            .bind(Utc::now())
            .execute(&mut *sp)
            .await
            .map_err(|e| map_sqlx_error(op, e))?;
            sp.commit().await.map_err(|e| map_sqlx_error(op, e))?;
        }
        scope.commit().await.map_err(|e| map_sqlx_error(op, e))
    }

    async fn safe_delete(&self, table: &str, id: Uuid) -> bool {
        self.txn.safe_delete(table, id, child_tables(table)).await
    }

    async fn safe_archive(&self, table: &str, id: Uuid) -> bool {
        self.txn.safe_archive(table, id).await
    }

    #[instrument(skip(self), fields(account_id = %id))]
    async fn delete_account_cascade(&self, id: AccountId) -> Result<CascadeReport, StoreError> {
        let op = "delete_account_cascade";
        let account = *id.as_uuid();

        let mut scope = self.txn.scope().await.map_err(|e| map_sqlx_error(op, e))?;
        {
            let mut sp = scope.savepoint().await.map_err(|e| map_sqlx_error(op, e))?;

            // Attempts by other accounts on this account's authored exercises
            // block the exercises delete below, so they go first.
            sqlx::query(
                "DELETE FROM exercise_attempts WHERE exercise_id IN \
                 (SELECT id FROM exercises WHERE creator_id = $1)",
            )
            .bind(account)
            .execute(&mut *sp)
            .await
            .map_err(|e| map_sqlx_error(op, e))?;

            for (table, fk) in DEPENDENT_TABLES {
                sqlx::query(&format!("DELETE FROM {table} WHERE {fk} = $1"))
                    .bind(account)
                    .execute(&mut *sp)
                    .await
                    .map_err(|e| map_sqlx_error(op, e))?;
            }

            let affected = sqlx::query("DELETE FROM accounts WHERE id = $1")
                .bind(account)
                .execute(&mut *sp)
                .await
                .map_err(|e| map_sqlx_error(op, e))?
                .rows_affected();
            if affected == 0 {
                return Err(StoreError::NotFound);
            }

            sp.commit().await.map_err(|e| map_sqlx_error(op, e))?;
        }

        // Post-condition scan in the same outer transaction: the report
        // describes exactly the state being committed.
        let mut remaining = Vec::with_capacity(DEPENDENT_TABLES.len());
        for (table, fk) in DEPENDENT_TABLES {
            let count: i64 =
                sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table} WHERE {fk} = $1"))
                    .bind(account)
                    .fetch_one(scope.executor())
                    .await
                    .map_err(|e| map_sqlx_error(op, e))?;
            remaining.push((*table, count as u64));
        }

        scope.commit().await.map_err(|e| map_sqlx_error(op, e))?;
        Ok(CascadeReport { remaining })
    }

    async fn count_dependent_rows(
        &self,
        id: AccountId,
    ) -> Result<Vec<(&'static str, u64)>, StoreError> {
        let mut counts = Vec::with_capacity(DEPENDENT_TABLES.len());
        for (table, fk) in DEPENDENT_TABLES {
            let count: i64 =
                sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table} WHERE {fk} = $1"))
                    .bind(id.as_uuid())
                    .fetch_one(&self.pool)
                    .await
                    .map_err(|e| map_sqlx_error("count_dependent_rows", e))?;
            counts.push((*table, count as u64));
        }
        Ok(counts)
    }

    async fn attempt_leaderboard(&self, limit: u32) -> Result<Vec<LeaderboardRow>, StoreError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT a.username, COUNT(*) AS attempts \
             FROM exercise_attempts ea JOIN accounts a ON a.id = ea.account_id \
             GROUP BY a.username ORDER BY attempts DESC, a.username ASC LIMIT $1",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("attempt_leaderboard", e))?;

        Ok(rows
            .into_iter()
            .map(|(username, attempts)| LeaderboardRow {
                username,
                attempts: attempts as u64,
            })
            .collect())
    }

    async fn list_challenges(&self) -> Result<Vec<ChallengeRecord>, StoreError> {
        let rows: Vec<(Uuid, String)> =
            sqlx::query_as("SELECT id, title FROM challenges ORDER BY title ASC")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("list_challenges", e))?;

        Ok(rows
            .into_iter()
            .map(|(id, title)| ChallengeRecord { id, title })
            .collect())
    }

    async fn badge_statistics(&self) -> Result<BadgeStats, StoreError> {
        let (total, distinct): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COUNT(DISTINCT account_id) FROM account_achievements",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("badge_statistics", e))?;

        Ok(BadgeStats {
            total_awarded: total as u64,
            accounts_with_badges: distinct as u64,
        })
    }

    async fn account_statistics(
        &self,
        id: AccountId,
    ) -> Result<AccountStatistics, StoreError> {
        let (attempts, progress, achievements): (i64, i64, i64) = sqlx::query_as(
            "SELECT \
             (SELECT COUNT(*) FROM exercise_attempts WHERE account_id = $1), \
             (SELECT COUNT(*) FROM progress WHERE account_id = $1), \
             (SELECT COUNT(*) FROM account_achievements WHERE account_id = $1)",
        )
        .bind(id.as_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("account_statistics", e))?;

        Ok(AccountStatistics {
            attempts: attempts as u64,
            progress_entries: progress as u64,
            achievements: achievements as u64,
        })
    }
}
