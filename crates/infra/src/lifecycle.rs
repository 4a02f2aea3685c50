//! Account lifecycle coordination.
//!
//! Hard account deletion is all-or-nothing: the store's cascade runs the
//! deletes and the post-condition scan inside one transaction boundary, and
//! this coordinator turns the outcome into the single typed failure path
//! callers see. Leftover dependent rows after a *committed* cascade are an
//! invariant violation, not an error value, and abort the process loudly.

use kata_core::{AccountId, CoreError, CoreResult};

use crate::store::{AccountStore, StoreError};

/// Delete `id` and every dependent record, or nothing at all.
pub async fn delete_account(store: &dyn AccountStore, id: AccountId) -> CoreResult<()> {
    let report = match store.delete_account_cascade(id).await {
        Ok(report) => report,
        Err(StoreError::NotFound) => return Err(CoreError::not_found("account")),
        Err(e) => {
            tracing::error!(account_id = %id, error = %e, "account cascade failed, nothing committed");
            return Err(CoreError::internal("account deletion failed"));
        }
    };

    let leftovers: Vec<(&'static str, u64)> = report
        .remaining
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .collect();
    assert!(
        leftovers.is_empty(),
        "cascade committed but dependent rows remain for {id}: {leftovers:?}"
    );

    tracing::info!(account_id = %id, "account and dependents deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, NewAccount, DEPENDENT_TABLES, EXERCISES_TABLE};
    use chrono::Utc;
    use kata_auth::Role;

    #[tokio::test]
    async fn deleting_a_missing_account_is_not_found() {
        let store = MemoryStore::new();
        let err = delete_account(&store, AccountId::new()).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_leaves_no_dependent_rows() {
        let store = MemoryStore::new();
        let account = store
            .insert_account(NewAccount {
                username: "doomed".to_string(),
                email: "doomed@example.com".to_string(),
                password_hash: "$argon2id$stub".to_string(),
                role: Role::Learner,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        for &(table, _) in DEPENDENT_TABLES {
            if table != EXERCISES_TABLE {
                store.seed_dependent(table, account.id);
            }
        }

        delete_account(&store, account.id).await.unwrap();

        let counts = store.count_dependent_rows(account.id).await.unwrap();
        assert!(counts.iter().all(|(_, n)| *n == 0));
    }
}
