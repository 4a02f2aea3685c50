//! `kata-infra` — persistence and orchestration for the identity core.
//!
//! Contains the account store contract with in-memory and Postgres
//! implementations, the savepoint-scoped transaction manager, the account
//! lifecycle coordinator (cascading deletion), the read-through TTL cache, and
//! the identity service that ties credential checks, token issuance, scope
//! resolution, and the permission matrix together.

pub mod cache;
pub mod identity;
pub mod lifecycle;
pub mod store;
pub mod txn;

pub use cache::ReadThroughCache;
pub use identity::{IdentityService, IdentitySnapshot, LoginOutcome};
pub use store::{
    AccountRecord, AccountStatistics, AccountStore, BadgeStats, CascadeReport, ChallengeRecord,
    ExerciseRecord, LeaderboardRow, MemoryStore, NewAccount, PostgresStore, StoreError,
};
pub use txn::{TransactionManager, TxnScope};
