//! Account roles (closed set, ascending privilege).

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use kata_core::CoreError;

/// Role of an account, in ascending privilege order.
///
/// The set is closed on purpose: authorization decisions match exhaustively
/// over these variants, so adding a rank is a compile-visible change. Storage
/// engines that persist roles as text map through [`Role::as_str`] and
/// [`Role::from_str`] at the persistence adapter, never inside policy code.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Ordinary learner: browses and attempts exercises.
    Learner,
    /// Content author: additionally creates and maintains own exercises.
    Author,
    /// Moderator: archives any exercise, lists accounts.
    Moderator,
    /// Administrator: everything, including hard account deletion.
    Admin,
}

impl Role {
    /// Numeric rank, 1 (least privileged) through 4.
    pub fn rank(&self) -> u8 {
        match self {
            Role::Learner => 1,
            Role::Author => 2,
            Role::Moderator => 3,
            Role::Admin => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Learner => "learner",
            Role::Author => "author",
            Role::Moderator => "moderator",
            Role::Admin => "admin",
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "learner" => Ok(Role::Learner),
            "author" => Ok(Role::Author),
            "moderator" => Ok(Role::Moderator),
            "admin" => Ok(Role::Admin),
            other => Err(CoreError::internal(format!("unknown role '{other}'"))),
        }
    }
}
