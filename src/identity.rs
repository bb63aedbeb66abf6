//! Caller identity
//!
//! Supplied by the authentication collaborator for every call and trusted
//! verbatim; token validation is outside this crate.

use serde::{Deserialize, Serialize};

/// Role attached to an authenticated identity
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Regular user; may only mutate services they own
    User,
    /// Privileged role; bypasses ownership checks
    Admin,
}

/// An authenticated caller
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    /// Stable user identifier; empty only for unauthenticated callers
    pub user_id: String,
    /// Caller role
    pub role: UserRole,
}

impl Identity {
    /// Create a regular user identity
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: UserRole::User,
        }
    }

    /// Create an admin identity
    pub fn admin(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: UserRole::Admin,
        }
    }

    /// True if this identity may mutate a record owned by `owner_id`
    pub fn may_access(&self, owner_id: &str) -> bool {
        self.role == UserRole::Admin || self.user_id == owner_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_and_admin_have_access_others_do_not() {
        assert!(Identity::user("u1").may_access("u1"));
        assert!(Identity::admin("root").may_access("u1"));
        assert!(!Identity::user("u2").may_access("u1"));
    }
}
