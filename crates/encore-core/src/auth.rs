//! Caller roles, server operating modes and per-command policies.
//!
//! A command's policy has two independent axes: the minimum role of the
//! caller and whether the server must be out of limited mode. Both must pass.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Role of the session issuing a command. Ordered `Guest < User < Admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Guest,
    User,
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Guest => "guest",
            Self::User => "user",
            Self::Admin => "admin",
        })
    }
}

/// Operating mode of the server instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServerMode {
    #[default]
    Normal,
    /// Degraded, public-restricted operation.
    Limited,
}

/// Server mode a command needs, independent of the caller's role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModeRequirement {
    /// Allowed in every mode
    Any,
    /// Refused while the server is limited, even for admins
    Normal,
}

impl ModeRequirement {
    /// Check whether the given server mode satisfies this requirement.
    #[must_use]
    pub fn allows(self, mode: ServerMode) -> bool {
        match self {
            Self::Any => true,
            Self::Normal => mode == ServerMode::Normal,
        }
    }
}

/// Why a command was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    /// The caller's role is below the command's minimum.
    InsufficientRole { required: Role, actual: Role },
    /// The server is in limited mode and the command needs normal mode.
    RestrictedMode,
}

impl Denial {
    /// Machine-readable message key carried in the error response.
    #[must_use]
    pub fn message_key(&self) -> &'static str {
        match self {
            Self::InsufficientRole { .. } => "INSUFFICIENT_ROLE",
            Self::RestrictedMode => "SERVER_IN_LIMITED_MODE",
        }
    }
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientRole { required, actual } => {
                write!(f, "role {actual} is below required role {required}")
            }
            Self::RestrictedMode => f.write_str("server is in limited mode"),
        }
    }
}

/// Minimum requirements a session must meet before a command runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AuthorizationPolicy {
    pub minimum_role: Role,
    pub minimum_mode: ModeRequirement,
}

impl AuthorizationPolicy {
    /// Open to everyone in every mode.
    pub const PUBLIC: Self = Self::new(Role::Guest, ModeRequirement::Any);
    /// Any logged-in user.
    pub const USER: Self = Self::new(Role::User, ModeRequirement::Any);
    /// Admins, also while limited.
    pub const ADMIN: Self = Self::new(Role::Admin, ModeRequirement::Any);
    /// Admins, and only while the server runs in normal mode.
    pub const ADMIN_UNLIMITED: Self = Self::new(Role::Admin, ModeRequirement::Normal);

    #[must_use]
    pub const fn new(minimum_role: Role, minimum_mode: ModeRequirement) -> Self {
        Self { minimum_role, minimum_mode }
    }

    /// Evaluate the policy for a caller.
    ///
    /// # Errors
    /// Returns the first failed axis, role before mode.
    pub fn check(&self, role: Role, mode: ServerMode) -> Result<(), Denial> {
        if role < self.minimum_role {
            return Err(Denial::InsufficientRole { required: self.minimum_role, actual: role });
        }
        if !self.minimum_mode.allows(mode) {
            return Err(Denial::RestrictedMode);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_role_ordering_is_total() {
        assert!(Role::Guest < Role::User);
        assert!(Role::User < Role::Admin);
        assert!(Role::Guest < Role::Admin);
    }

    #[test]
    fn test_admin_rejected_in_limited_mode() {
        let policy = AuthorizationPolicy::ADMIN_UNLIMITED;
        assert_matches!(policy.check(Role::Admin, ServerMode::Limited), Err(Denial::RestrictedMode));
        assert!(policy.check(Role::Admin, ServerMode::Normal).is_ok());
    }

    #[test]
    fn test_user_rejected_in_normal_mode() {
        let policy = AuthorizationPolicy::ADMIN_UNLIMITED;
        assert_matches!(
            policy.check(Role::User, ServerMode::Normal),
            Err(Denial::InsufficientRole { required: Role::Admin, actual: Role::User })
        );
    }

    #[test]
    fn test_denials_are_distinguishable() {
        let policy = AuthorizationPolicy::ADMIN_UNLIMITED;
        let mode = policy.check(Role::Admin, ServerMode::Limited).unwrap_err();
        let role = policy.check(Role::Guest, ServerMode::Normal).unwrap_err();
        assert_ne!(mode.message_key(), role.message_key());
    }

    #[test]
    fn test_admin_policy_ignores_mode() {
        assert!(AuthorizationPolicy::ADMIN.check(Role::Admin, ServerMode::Limited).is_ok());
        assert!(AuthorizationPolicy::PUBLIC.check(Role::Guest, ServerMode::Limited).is_ok());
    }
}
