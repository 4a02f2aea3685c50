//! Role permission matrix with ownership overrides.
//!
//! Decisions combine the actor's role with its relationship to the resource:
//! an author may mutate only exercises it created; moderators and admins
//! bypass ownership for archival and account listing; hard account deletion of
//! somebody else's account is reserved to admins. Every denial is an explicit
//! authorization failure.

use kata_core::{CoreError, CoreResult};

use crate::role::Role;

/// Actions subject to role-based authorization.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Action {
    ReadExercise,
    AttemptExercise,
    CreateExercise,
    ModifyExercise,
    DeleteExercise,
    ArchiveExercise,
    ListAccounts,
    ChangeAccountRole,
    DeleteAccount,
}

/// Relationship between the actor and the target resource.
///
/// For actions without a meaningful target (e.g. listing accounts) pass
/// `NotOwner`; the matrix ignores ownership where it does not apply.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Ownership {
    Owner,
    NotOwner,
}

/// Decide whether `role` may perform `action` given `ownership`.
///
/// Pure policy check: no IO, no panics. The match is exhaustive over the
/// closed role set so a new rank cannot silently inherit permissions.
pub fn authorize(role: Role, action: Action, ownership: Ownership) -> CoreResult<()> {
    let allowed = match action {
        Action::ReadExercise | Action::AttemptExercise => true,

        Action::CreateExercise => match role {
            Role::Learner => false,
            Role::Author | Role::Moderator | Role::Admin => true,
        },

        // Authors mutate only what they created. Learners are denied even for
        // content attributed to them.
        Action::ModifyExercise | Action::DeleteExercise => match role {
            Role::Learner => false,
            Role::Author => ownership == Ownership::Owner,
            Role::Moderator | Role::Admin => true,
        },

        Action::ArchiveExercise | Action::ListAccounts => match role {
            Role::Learner | Role::Author => false,
            Role::Moderator | Role::Admin => true,
        },

        Action::ChangeAccountRole => role == Role::Admin,

        // Anyone may delete their own account; deleting another account is
        // admin-only (moderators do not bypass ownership here).
        Action::DeleteAccount => ownership == Ownership::Owner || role == Role::Admin,
    };

    if allowed {
        Ok(())
    } else {
        Err(CoreError::authorization(format!(
            "role '{role}' may not perform this action"
        )))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_ROLES: [Role; 4] = [Role::Learner, Role::Author, Role::Moderator, Role::Admin];

    #[test]
    fn everyone_reads_and_attempts() {
        for role in ALL_ROLES {
            assert!(authorize(role, Action::ReadExercise, Ownership::NotOwner).is_ok());
            assert!(authorize(role, Action::AttemptExercise, Ownership::NotOwner).is_ok());
        }
    }

    #[test]
    fn learners_cannot_create_or_modify_even_own() {
        assert!(authorize(Role::Learner, Action::CreateExercise, Ownership::NotOwner).is_err());
        assert!(authorize(Role::Learner, Action::ModifyExercise, Ownership::Owner).is_err());
        assert!(authorize(Role::Learner, Action::DeleteExercise, Ownership::Owner).is_err());
    }

    #[test]
    fn authors_mutate_only_owned_exercises() {
        assert!(authorize(Role::Author, Action::ModifyExercise, Ownership::Owner).is_ok());
        assert!(authorize(Role::Author, Action::DeleteExercise, Ownership::Owner).is_ok());
        // A different author's exercise is off limits.
        assert!(authorize(Role::Author, Action::ModifyExercise, Ownership::NotOwner).is_err());
        assert!(authorize(Role::Author, Action::DeleteExercise, Ownership::NotOwner).is_err());
    }

    #[test]
    fn moderators_bypass_ownership_for_archive_and_listing() {
        assert!(authorize(Role::Moderator, Action::ArchiveExercise, Ownership::NotOwner).is_ok());
        assert!(authorize(Role::Moderator, Action::ListAccounts, Ownership::NotOwner).is_ok());
        assert!(authorize(Role::Author, Action::ArchiveExercise, Ownership::Owner).is_err());
        assert!(authorize(Role::Learner, Action::ListAccounts, Ownership::NotOwner).is_err());
    }

    #[test]
    fn account_deletion_is_owner_or_admin_only() {
        for role in ALL_ROLES {
            assert!(authorize(role, Action::DeleteAccount, Ownership::Owner).is_ok());
        }
        assert!(authorize(Role::Admin, Action::DeleteAccount, Ownership::NotOwner).is_ok());
        assert!(authorize(Role::Moderator, Action::DeleteAccount, Ownership::NotOwner).is_err());
        assert!(authorize(Role::Author, Action::DeleteAccount, Ownership::NotOwner).is_err());
        assert!(authorize(Role::Learner, Action::DeleteAccount, Ownership::NotOwner).is_err());
    }

    #[test]
    fn role_changes_are_admin_only() {
        assert!(authorize(Role::Admin, Action::ChangeAccountRole, Ownership::NotOwner).is_ok());
        assert!(authorize(Role::Moderator, Action::ChangeAccountRole, Ownership::NotOwner).is_err());
    }

    #[test]
    fn denial_is_an_authorization_error() {
        let err = authorize(Role::Learner, Action::CreateExercise, Ownership::NotOwner)
            .unwrap_err();
        assert!(matches!(err, CoreError::Authorization(_)));
    }
}
