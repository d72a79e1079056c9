//! Role, action and resource checks.
//!
//! Decision order for [`has_action`]:
//! 1. `super` or `tenant_admin` grants everything
//! 2. no user denies
//! 3. absent `menu_permissions` falls back to menu visibility (logged)
//! 4. otherwise the action must be listed under the menu

use serde::{Deserialize, Serialize};

use crate::error::AccessError;
use crate::session::{Requirement, RoleSet, SessionContext, SUPER_ROLE, TENANT_ADMIN_ROLE};

/// A parsed `menuName:action` token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceToken {
    pub menu: String,
    pub action: String,
}

/// Decide a requirement against a bare role set.
///
/// `super` satisfies every requirement.
pub fn roles_satisfy(roles: &RoleSet, requirement: &Requirement) -> bool {
    match requirement {
        Requirement::None => true,
        _ if roles.contains(SUPER_ROLE) => true,
        Requirement::One(role) => roles.contains(role),
        Requirement::AnyOf(any) => any.iter().any(|role| roles.contains(role)),
    }
}

/// Role check against the session's user. No user or no usable role set denies.
pub fn has_permission(session: &SessionContext, requirement: &Requirement) -> bool {
    if requirement.is_none() {
        return true;
    }
    session
        .roles()
        .is_some_and(|roles| roles_satisfy(roles, requirement))
}

/// Fine-grained menu action check.
pub fn has_action(session: &SessionContext, menu: &str, action: &str) -> bool {
    if has_permission(session, &Requirement::one(SUPER_ROLE))
        || has_permission(session, &Requirement::one(TENANT_ADMIN_ROLE))
    {
        return true;
    }

    let Some(user) = session.user.as_ref() else {
        return false;
    };

    match user.menu_permissions.as_ref() {
        Some(permissions) => permissions
            .get(menu)
            .is_some_and(|actions| actions.contains(action)),
        None => {
            let visible = session.menus.iter().any(|m| m == menu);
            if visible {
                tracing::warn!(
                    user = %user.username,
                    menu,
                    action,
                    "menu_permissions missing; granting action through legacy menu fallback"
                );
            }
            visible
        }
    }
}

/// `menuName:action` check. Malformed tokens deny and are logged as errors.
pub fn has_resource(session: &SessionContext, resource: &str) -> bool {
    match parse_resource(resource) {
        Ok(token) => has_action(session, &token.menu, &token.action),
        Err(err) => {
            tracing::error!(resource, error = %err, "rejecting malformed resource token");
            false
        }
    }
}

/// Split on `:` and keep the first two segments; both must be non-empty.
/// Segments after the second are ignored.
pub fn parse_resource(resource: &str) -> Result<ResourceToken, AccessError> {
    let mut parts = resource.split(':');
    let menu = parts.next().unwrap_or_default();
    let Some(action) = parts.next() else {
        return Err(AccessError::MalformedInput {
            token: resource.to_string(),
            reason: "expected 'menuName:action'".to_string(),
        });
    };
    if menu.is_empty() || action.is_empty() {
        return Err(AccessError::MalformedInput {
            token: resource.to_string(),
            reason: "menu and action must both be non-empty".to_string(),
        });
    }
    Ok(ResourceToken {
        menu: menu.to_string(),
        action: action.to_string(),
    })
}

/// Borrowing front-end over the free functions for one session.
#[derive(Debug, Clone, Copy)]
pub struct PermissionResolver<'a> {
    session: &'a SessionContext,
}

impl<'a> PermissionResolver<'a> {
    pub fn new(session: &'a SessionContext) -> Self {
        Self { session }
    }

    pub fn has_permission(&self, requirement: impl Into<Requirement>) -> bool {
        has_permission(self.session, &requirement.into())
    }

    pub fn has_action(&self, menu: &str, action: &str) -> bool {
        has_action(self.session, menu, action)
    }

    pub fn has_resource(&self, resource: &str) -> bool {
        has_resource(self.session, resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::UserInfo;

    fn session_with_roles(roles: &[&str]) -> SessionContext {
        SessionContext::for_user(UserInfo::new("tester").with_roles(roles.iter().copied()))
    }

    #[test]
    fn empty_requirement_always_passes() {
        assert!(has_permission(&SessionContext::anonymous(), &Requirement::None));
        assert!(has_permission(&session_with_roles(&[]), &Requirement::one("")));
    }

    #[test]
    fn super_passes_every_requirement() {
        let session = session_with_roles(&[SUPER_ROLE]);
        assert!(has_permission(&session, &Requirement::one("finance")));
        assert!(has_permission(&session, &Requirement::any_of(["x", "y"])));
        assert!(has_permission(&session, &Requirement::AnyOf(Vec::new())));
    }

    #[test]
    fn single_role_requires_membership() {
        let session = session_with_roles(&["sales"]);
        assert!(has_permission(&session, &Requirement::one("sales")));
        assert!(!has_permission(&session, &Requirement::one("admin")));
    }

    #[test]
    fn any_of_requires_intersection() {
        let session = session_with_roles(&["sales", "qc"]);
        assert!(has_permission(&session, &Requirement::any_of(["admin", "qc"])));
        assert!(!has_permission(&session, &Requirement::any_of(["admin", "finance"])));
    }

    #[test]
    fn tenant_admin_does_not_satisfy_other_roles() {
        let session = session_with_roles(&[TENANT_ADMIN_ROLE]);
        assert!(!has_permission(&session, &Requirement::one("admin")));
    }

    #[test]
    fn missing_user_or_roles_denies() {
        assert!(!has_permission(&SessionContext::anonymous(), &Requirement::one("admin")));
        let no_roles = SessionContext::for_user(UserInfo::new("ghost"));
        assert!(!has_permission(&no_roles, &Requirement::one("admin")));
    }

    #[test]
    fn admins_bypass_menu_permissions() {
        for role in [SUPER_ROLE, TENANT_ADMIN_ROLE] {
            let session = SessionContext::for_user(
                UserInfo::new("boss")
                    .with_roles([role])
                    .with_empty_menu_permissions(),
            );
            assert!(has_action(&session, "order", "delete"), "{role} should bypass");
        }
    }

    #[test]
    fn defined_permissions_are_exact() {
        let session = SessionContext::for_user(
            UserInfo::new("li")
                .with_roles(["sales"])
                .with_menu_actions("order", ["view", "create"]),
        )
        .with_menus(["order", "style"]);

        assert!(has_action(&session, "order", "create"));
        assert!(!has_action(&session, "order", "delete"));
        // Visible menu without a grant: defined permissions win over visibility.
        assert!(!has_action(&session, "style", "view"));
    }

    #[test]
    fn empty_permissions_deny_everything() {
        let session = SessionContext::for_user(
            UserInfo::new("li")
                .with_roles(["sales"])
                .with_empty_menu_permissions(),
        )
        .with_menus(["order"]);
        assert!(!has_action(&session, "order", "view"));
    }

    #[test]
    fn absent_permissions_fall_back_to_menu_visibility() {
        let session = SessionContext::for_user(UserInfo::new("li").with_roles(["sales"]))
            .with_menus(["order"]);
        assert!(has_action(&session, "order", "anything"));
        assert!(!has_action(&session, "finance", "view"));
    }

    #[test]
    fn no_user_denies_actions() {
        let session = SessionContext::anonymous().with_menus(["order"]);
        assert!(!has_action(&session, "order", "view"));
    }

    #[test]
    fn resource_matches_action() {
        let session = SessionContext::for_user(
            UserInfo::new("li")
                .with_roles(["sales"])
                .with_menu_actions("admin", ["create"]),
        );
        assert_eq!(
            has_resource(&session, "admin:create"),
            has_action(&session, "admin", "create")
        );
        assert!(has_resource(&session, "admin:create"));
        assert!(!has_resource(&session, "admin:delete"));
    }

    #[test]
    fn malformed_resources_deny_even_for_super() {
        let session = session_with_roles(&[SUPER_ROLE]);
        for token in ["badtoken", "", ":create", "admin:", ":"] {
            assert!(!has_resource(&session, token), "{token:?} should be rejected");
        }
    }

    #[test]
    fn parse_keeps_first_two_segments() {
        let token = parse_resource("order:export:csv").unwrap();
        assert_eq!(token.menu, "order");
        assert_eq!(token.action, "export");
        assert!(matches!(
            parse_resource("badtoken"),
            Err(AccessError::MalformedInput { .. })
        ));
    }

    #[test]
    fn resolver_delegates() {
        let session = session_with_roles(&["admin"]);
        let resolver = PermissionResolver::new(&session);
        assert!(resolver.has_permission("admin"));
        assert!(!resolver.has_permission("finance"));
        assert!(!resolver.has_action("order", "view"));
    }
}
