//! Infrastructure wiring: store selection, identity service, and the
//! badge-stats cache.

use std::sync::Arc;
use std::time::Duration;

use kata_auth::TokenIssuer;
use kata_infra::{
    AccountStore, BadgeStats, IdentityService, MemoryStore, PostgresStore, ReadThroughCache,
};

/// Cached badge statistics go stale after this long.
const BADGE_STATS_TTL: Duration = Duration::from_secs(30);

/// Shared per-process services. The cache is constructed once here and handed
/// to handlers by reference; nothing in the process holds global mutable
/// state.
pub struct AppServices {
    pub identity: IdentityService,
    pub store: Arc<dyn AccountStore>,
    pub issuer: Arc<TokenIssuer>,
    pub badge_stats: ReadThroughCache<&'static str, BadgeStats>,
}

/// Select the backing store and assemble services.
///
/// With a database URL the Postgres pool is created lazily, so startup does
/// not require the database to be reachable yet.
pub fn build_services(issuer: Arc<TokenIssuer>, database_url: Option<&str>) -> AppServices {
    let store: Arc<dyn AccountStore> = match database_url {
        Some(url) => {
            let pool = sqlx::PgPool::connect_lazy(url)
                .unwrap_or_else(|e| panic!("invalid DATABASE_URL: {e}"));
            Arc::new(PostgresStore::new(pool))
        }
        None => Arc::new(MemoryStore::new()),
    };

    from_store(store, issuer)
}

/// Assemble services around an existing store (tests pass a pre-seeded
/// in-memory store).
pub fn from_store(store: Arc<dyn AccountStore>, issuer: Arc<TokenIssuer>) -> AppServices {
    AppServices {
        identity: IdentityService::new(store.clone(), issuer.clone()),
        store,
        issuer,
        badge_stats: ReadThroughCache::new(BADGE_STATS_TTL),
    }
}
