//! Savepoint-scoped transaction management for the Postgres store.
//!
//! A [`TxnScope`] is a scoped acquisition around an outer transaction: opening
//! it begins the transaction, [`TxnScope::savepoint`] nests a savepoint, and
//! dropping either without an explicit commit rolls it back. That guarantee
//! holds on every exit path, early returns and errors included, because sqlx
//! transactions roll back on drop.
//!
//! The `safe_*` helpers convert every SQL-layer error into a boolean outcome.
//! Table and column names interpolated into statements here come exclusively
//! from the static schema map in [`crate::store`], never from request input.

use sqlx::{Acquire, PgConnection, PgPool, Postgres, Transaction};
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::store::ARCHIVABLE_TABLES;

/// Opens savepoint-backed scopes over a shared connection pool.
#[derive(Debug, Clone)]
pub struct TransactionManager {
    pool: PgPool,
}

impl TransactionManager {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Begin an outer transaction.
    pub async fn scope(&self) -> Result<TxnScope, sqlx::Error> {
        Ok(TxnScope {
            tx: self.pool.begin().await?,
        })
    }

    /// Delete one row, then fall back to explicit child-row deletion.
    ///
    /// The first attempt deletes the parent row alone and relies on
    /// schema-level cascades for children. If that commit fails, a second
    /// attempt deletes the known child rows first and the parent after. Only
    /// both attempts failing reports `false`; neither attempt raises.
    pub async fn safe_delete(
        &self,
        table: &str,
        id: Uuid,
        children: &[(&str, &str)],
    ) -> bool {
        match self.delete_row(table, id).await {
            Ok(()) => return true,
            Err(e) => {
                warn!(table, error = %e, "direct delete failed, retrying with explicit child deletes");
            }
        }

        match self.delete_row_with_children(table, id, children).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(table, error = %e, "both delete attempts failed");
                false
            }
        }
    }

    /// Set the soft-delete flag on a row. Tables without the flag report
    /// `false` without touching the database.
    pub async fn safe_archive(&self, table: &str, id: Uuid) -> bool {
        if !ARCHIVABLE_TABLES.contains(&table) {
            return false;
        }

        let result = async {
            let mut scope = self.scope().await?;
            let affected = {
                let mut sp = scope.savepoint().await?;
                let affected =
                    sqlx::query(&format!("UPDATE {table} SET is_archived = TRUE WHERE id = $1"))
                        .bind(id)
                        .execute(&mut *sp)
                        .await?
                        .rows_affected();
                sp.commit().await?;
                affected
            };
            scope.commit().await?;
            Ok::<u64, sqlx::Error>(affected)
        }
        .await;

        match result {
            Ok(affected) => affected > 0,
            Err(e) => {
                warn!(table, error = %e, "archive failed");
                false
            }
        }
    }

    #[instrument(skip(self))]
    async fn delete_row(&self, table: &str, id: Uuid) -> Result<(), sqlx::Error> {
        let mut scope = self.scope().await?;
        {
            let mut sp = scope.savepoint().await?;
            sqlx::query(&format!("DELETE FROM {table} WHERE id = $1"))
                .bind(id)
                .execute(&mut *sp)
                .await?;
            sp.commit().await?;
        }
        scope.commit().await
    }

    async fn delete_row_with_children(
        &self,
        table: &str,
        id: Uuid,
        children: &[(&str, &str)],
    ) -> Result<(), sqlx::Error> {
        let mut scope = self.scope().await?;
        {
            let mut sp = scope.savepoint().await?;
            for (child, fk) in children {
                sqlx::query(&format!("DELETE FROM {child} WHERE {fk} = $1"))
                    .bind(id)
                    .execute(&mut *sp)
                    .await?;
            }
            sqlx::query(&format!("DELETE FROM {table} WHERE id = $1"))
                .bind(id)
                .execute(&mut *sp)
                .await?;
            sp.commit().await?;
        }
        scope.commit().await
    }
}

/// An open outer transaction plus the means to nest savepoints in it.
///
/// Dropping the scope rolls everything back; callers commit explicitly on the
/// success path.
pub struct TxnScope {
    tx: Transaction<'static, Postgres>,
}

impl TxnScope {
    /// Open a nested savepoint. Committing it releases the savepoint;
    /// dropping it rolls back to the savepoint without aborting the outer
    /// transaction.
    pub async fn savepoint(&mut self) -> Result<Transaction<'_, Postgres>, sqlx::Error> {
        self.tx.begin().await
    }

    /// Run statements directly on the outer transaction (used for
    /// post-commit-of-savepoint verification reads).
    pub fn executor(&mut self) -> &mut PgConnection {
        &mut *self.tx
    }

    /// Commit the outer transaction.
    pub async fn commit(self) -> Result<(), sqlx::Error> {
        self.tx.commit().await
    }

    /// Roll the outer transaction back explicitly (dropping does the same).
    pub async fn rollback(self) -> Result<(), sqlx::Error> {
        self.tx.rollback().await
    }

    /// Hand the open transaction to a composing caller, skipping the outer
    /// commit here. The caller takes over commit/rollback responsibility.
    pub fn into_inner(self) -> Transaction<'static, Postgres> {
        self.tx
    }
}
