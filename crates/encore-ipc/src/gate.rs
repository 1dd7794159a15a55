//! Authorization gate evaluated before any command handler runs.

use encore_core::{Role, ServerMode};
use tracing::{debug, warn};

use crate::commands::{CommandDefinition, CommandRegistry};
use crate::messages::{ErrorInfo, codes};

/// Checks every incoming command against its registered policy.
///
/// The gate is keyed by the same registry the clients are compiled against,
/// so a command cannot exist without a policy.
#[derive(Debug, Clone)]
pub struct AuthorizationGate {
    registry: CommandRegistry,
}

impl AuthorizationGate {
    #[must_use]
    pub fn new(registry: CommandRegistry) -> Self {
        Self { registry }
    }

    #[must_use]
    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Authorize a command for a caller.
    ///
    /// # Errors
    /// Returns a 404 for unknown commands and a 403 carrying
    /// `INSUFFICIENT_ROLE` or `SERVER_IN_LIMITED_MODE` for refusals.
    pub fn authorize(
        &self,
        name: &str,
        role: Role,
        mode: ServerMode,
    ) -> Result<&CommandDefinition, ErrorInfo> {
        let Some(definition) = self.registry.get(name) else {
            warn!(command = name, "Unknown command");
            return Err(ErrorInfo::not_found(codes::UNKNOWN_COMMAND));
        };

        if let Err(denial) = definition.policy.check(role, mode) {
            debug!(command = name, %role, ?mode, %denial, "Command refused");
            return Err(ErrorInfo::forbidden(denial));
        }

        Ok(definition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::CommandKind;
    use crate::error::{AuthorizationFailure, IpcError};
    use assert_matches::assert_matches;

    fn gate() -> AuthorizationGate {
        AuthorizationGate::new(CommandRegistry::standard().unwrap())
    }

    #[test]
    fn test_admin_in_limited_mode_is_refused_for_unlimited_commands() {
        let error = gate().authorize("updateSettings", Role::Admin, ServerMode::Limited).unwrap_err();
        assert_eq!(error.code, codes::FORBIDDEN);
        assert_matches!(
            IpcError::from(error),
            IpcError::Authorization(AuthorizationFailure::RestrictedMode)
        );
    }

    #[test]
    fn test_user_in_normal_mode_is_refused_for_admin_commands() {
        let error = gate().authorize("updateSettings", Role::User, ServerMode::Normal).unwrap_err();
        assert_matches!(
            IpcError::from(error),
            IpcError::Authorization(AuthorizationFailure::InsufficientRole)
        );
    }

    #[test]
    fn test_allowed_command_returns_definition() {
        let gate = gate();
        let definition = gate.authorize("setVolume", Role::Admin, ServerMode::Limited).unwrap();
        assert_eq!(definition.kind, CommandKind::SetVolume);

        let definition = gate.authorize("getPlayerStatus", Role::Guest, ServerMode::Limited).unwrap();
        assert_eq!(definition.kind, CommandKind::GetPlayerStatus);
    }

    #[test]
    fn test_unknown_command() {
        let error = gate().authorize("formatDisk", Role::Admin, ServerMode::Normal).unwrap_err();
        assert_eq!(error, ErrorInfo::not_found(codes::UNKNOWN_COMMAND));
    }
}
