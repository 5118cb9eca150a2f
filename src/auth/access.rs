//! Minimum-role checks.

use crate::identity::{Identity, Role};

use super::AuthError;

/// Whether `identity` holds at least `required`. A missing identity never does.
#[must_use]
pub fn has_permission(identity: Option<&Identity>, required: Role) -> bool {
    identity.is_some_and(|identity| identity.role.rank() >= required.rank())
}

/// [`has_permission`] as a `Result` for handlers.
///
/// # Errors
/// Returns `AuthError::Forbidden` when the role is insufficient.
pub fn require_role(identity: &Identity, required: Role) -> Result<(), AuthError> {
    if has_permission(Some(identity), required) {
        Ok(())
    } else {
        Err(AuthError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_role(role: Role) -> Identity {
        let mut identity = Identity::new(
            "someone".to_string(),
            "someone@example.com".to_string(),
            String::new(),
        );
        identity.role = role;
        identity
    }

    #[test]
    fn higher_roles_satisfy_lower_requirements() {
        let admin = with_role(Role::Admin);
        assert!(has_permission(Some(&admin), Role::User));
        assert!(has_permission(Some(&admin), Role::Admin));
        assert!(has_permission(Some(&with_role(Role::User)), Role::Guest));
    }

    #[test]
    fn lower_roles_are_denied() {
        let guest = with_role(Role::Guest);
        assert!(!has_permission(Some(&guest), Role::Admin));
        assert!(!has_permission(Some(&guest), Role::User));
        assert!(!has_permission(Some(&with_role(Role::User)), Role::Admin));
    }

    #[test]
    fn missing_identity_is_denied() {
        for role in [Role::Guest, Role::User, Role::Admin] {
            assert!(!has_permission(None, role));
        }
    }

    #[test]
    fn require_role_maps_denial_to_forbidden() {
        assert!(require_role(&with_role(Role::Admin), Role::Admin).is_ok());
        assert!(matches!(
            require_role(&with_role(Role::User), Role::Admin),
            Err(AuthError::Forbidden)
        ));
    }
}
