//! Access-scope state machine for progressively restricting unverified accounts.
//!
//! Two states, derived per request and never persisted:
//!
//! - `Full`: the initial state, and the terminal state once the email is
//!   verified.
//! - `ExercisesOnly`: entered only when the grace window since account
//!   creation has elapsed **and** the email is still unverified. Verification
//!   exits this state immediately, regardless of elapsed time.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use kata_core::{CoreError, CoreResult};

/// Fixed grace window after account creation during which an unverified
/// account keeps full access.
pub const GRACE_PERIOD_MINUTES: i64 = 45;

fn grace_period() -> Duration {
    Duration::minutes(GRACE_PERIOD_MINUTES)
}

/// Derived authorization tier of an account.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessScope {
    Full,
    ExercisesOnly,
}

impl AccessScope {
    /// Resolve the current scope from account state and the current time.
    ///
    /// Pure function; recomputed on every login and identity lookup. Elapsed
    /// time exactly equal to the grace window still resolves to `Full`.
    pub fn resolve(created_at: DateTime<Utc>, is_email_verified: bool, now: DateTime<Utc>) -> Self {
        if is_email_verified {
            return AccessScope::Full;
        }
        if now - created_at > grace_period() {
            AccessScope::ExercisesOnly
        } else {
            AccessScope::Full
        }
    }
}

impl core::fmt::Display for AccessScope {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            AccessScope::Full => f.write_str("full"),
            AccessScope::ExercisesOnly => f.write_str("exercises_only"),
        }
    }
}

/// A reachable area of the platform, from the scope resolver's point of view.
///
/// Under `ExercisesOnly` a new, not-yet-verified account can still complete a
/// first exercise quickly; only competitive/social surfaces are denied.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Surface {
    Profile,
    Statistics,
    Badges,
    Exercises,
    Leaderboard,
    Challenges,
}

/// Check that `surface` is reachable under `scope`.
///
/// Denials are explicit authorization failures, never silently empty results.
pub fn ensure_reachable(scope: AccessScope, surface: Surface) -> CoreResult<()> {
    match (scope, surface) {
        (AccessScope::Full, _) => Ok(()),
        (
            AccessScope::ExercisesOnly,
            Surface::Profile | Surface::Statistics | Surface::Badges | Surface::Exercises,
        ) => Ok(()),
        (AccessScope::ExercisesOnly, Surface::Leaderboard | Surface::Challenges) => {
            Err(CoreError::authorization(
                "verify your email address to access this area",
            ))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn created(now: DateTime<Utc>, minutes_ago: i64) -> DateTime<Utc> {
        now - Duration::minutes(minutes_ago)
    }

    #[test]
    fn fresh_unverified_account_has_full_access() {
        let now = Utc::now();
        assert_eq!(
            AccessScope::resolve(created(now, 0), false, now),
            AccessScope::Full
        );
    }

    #[test]
    fn boundary_is_inclusive_of_full() {
        let now = Utc::now();
        let at_boundary = now - grace_period();
        assert_eq!(
            AccessScope::resolve(at_boundary, false, now),
            AccessScope::Full
        );

        let past_boundary = at_boundary - Duration::seconds(1);
        assert_eq!(
            AccessScope::resolve(past_boundary, false, now),
            AccessScope::ExercisesOnly
        );
    }

    #[test]
    fn unverified_account_is_restricted_after_grace() {
        let now = Utc::now();
        assert_eq!(
            AccessScope::resolve(created(now, 50), false, now),
            AccessScope::ExercisesOnly
        );
    }

    #[test]
    fn exercises_reachable_under_restriction_but_not_leaderboard() {
        let scope = AccessScope::ExercisesOnly;
        assert!(ensure_reachable(scope, Surface::Exercises).is_ok());
        assert!(ensure_reachable(scope, Surface::Profile).is_ok());
        assert!(ensure_reachable(scope, Surface::Statistics).is_ok());
        assert!(ensure_reachable(scope, Surface::Badges).is_ok());
        assert!(ensure_reachable(scope, Surface::Leaderboard).is_err());
        assert!(ensure_reachable(scope, Surface::Challenges).is_err());
    }

    proptest! {
        /// Property: verification always yields full access, no matter how old
        /// the account is.
        #[test]
        fn verified_is_always_full(minutes_ago in 0i64..1_000_000) {
            let now = Utc::now();
            prop_assert_eq!(
                AccessScope::resolve(created(now, minutes_ago), true, now),
                AccessScope::Full
            );
        }

        /// Property: for unverified accounts, scope is full strictly up to the
        /// grace window and restricted strictly after it.
        #[test]
        fn unverified_scope_matches_grace_window(minutes_ago in 0i64..1_000_000) {
            let now = Utc::now();
            let expected = if minutes_ago > GRACE_PERIOD_MINUTES {
                AccessScope::ExercisesOnly
            } else {
                AccessScope::Full
            };
            prop_assert_eq!(
                AccessScope::resolve(created(now, minutes_ago), false, now),
                expected
            );
        }
    }
}
