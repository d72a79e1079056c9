//! Permission resolver for role-gated and menu-action checks.
//!
//! Every decision is a pure function of an explicit [`SessionContext`]; there
//! is no ambient session. Absent or malformed identity data resolves to deny.
//! The single permissive path is the legacy menu fallback in [`has_action`],
//! which logs a warning every time it grants access.

mod error;
mod resolver;
mod session;

pub use error::AccessError;
pub use resolver::{
    has_action, has_permission, has_resource, parse_resource, roles_satisfy, PermissionResolver,
    ResourceToken,
};
pub use session::{
    MenuPermissions, Requirement, RoleSet, SessionContext, UserInfo, SUPER_ROLE,
    TENANT_ADMIN_ROLE,
};
