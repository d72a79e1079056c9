use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Role that passes every permission and action check.
pub const SUPER_ROLE: &str = "super";

/// Role that bypasses fine-grained menu actions (but not role requirements).
pub const TENANT_ADMIN_ROLE: &str = "tenant_admin";

/// Unordered set of role tokens held by a user.
pub type RoleSet = BTreeSet<String>;

/// Menu name -> action tokens granted on that menu.
pub type MenuPermissions = BTreeMap<String, BTreeSet<String>>;

// ──────────────────────────────────────────────
// Requirement
// ──────────────────────────────────────────────

/// What a caller asks of the user's role set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Requirement {
    /// No requirement: always satisfied.
    #[default]
    None,
    /// The user must hold this role.
    One(String),
    /// The user must hold at least one of these roles.
    AnyOf(Vec<String>),
}

impl Requirement {
    /// A single-role requirement. An empty role name means "no requirement".
    pub fn one(role: impl Into<String>) -> Self {
        let role = role.into();
        if role.is_empty() {
            Requirement::None
        } else {
            Requirement::One(role)
        }
    }

    pub fn any_of<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Requirement::AnyOf(roles.into_iter().map(Into::into).collect())
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Requirement::None)
    }
}

impl From<&str> for Requirement {
    fn from(role: &str) -> Self {
        Requirement::one(role)
    }
}

impl From<Option<&str>> for Requirement {
    fn from(role: Option<&str>) -> Self {
        role.map(Requirement::one).unwrap_or_default()
    }
}

impl<'de> Deserialize<'de> for Requirement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            One(String),
            Many(Vec<String>),
        }

        Ok(match Option::<Raw>::deserialize(deserializer)? {
            None => Requirement::None,
            Some(Raw::One(role)) => Requirement::one(role),
            Some(Raw::Many(roles)) => Requirement::AnyOf(roles),
        })
    }
}

impl Serialize for Requirement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Requirement::None => serializer.serialize_none(),
            Requirement::One(role) => serializer.serialize_str(role),
            Requirement::AnyOf(roles) => roles.serialize(serializer),
        }
    }
}

// ──────────────────────────────────────────────
// Session
// ──────────────────────────────────────────────

/// Identity portion of a login response.
///
/// `role` is `None` both when the field is missing and when it is not an
/// array of strings. `menu_permissions` keeps the absent case (`None`)
/// distinct from the defined-but-empty case (`Some(empty)`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub username: String,
    #[serde(
        default,
        deserialize_with = "lenient_roles",
        skip_serializing_if = "Option::is_none"
    )]
    pub role: Option<RoleSet>,
    #[serde(
        default,
        deserialize_with = "lenient_menu_permissions",
        skip_serializing_if = "Option::is_none"
    )]
    pub menu_permissions: Option<MenuPermissions>,
}

impl UserInfo {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Self::default()
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.role = Some(roles.into_iter().map(Into::into).collect());
        self
    }

    /// Grant `actions` on `menu`, defining the permission map if it was absent.
    pub fn with_menu_actions<I, S>(mut self, menu: impl Into<String>, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.menu_permissions
            .get_or_insert_with(MenuPermissions::new)
            .entry(menu.into())
            .or_default()
            .extend(actions.into_iter().map(Into::into));
        self
    }

    /// Mark fine-grained permissions as defined, with nothing granted.
    pub fn with_empty_menu_permissions(mut self) -> Self {
        self.menu_permissions = Some(MenuPermissions::new());
        self
    }
}

/// Everything a permission check may look at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    #[serde(default, alias = "userInfo", alias = "user_info")]
    pub user: Option<UserInfo>,
    /// Names of the menus visible to the user. Only consulted by the legacy
    /// fallback when `menu_permissions` is absent.
    #[serde(default)]
    pub menus: Vec<String>,
}

impl SessionContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn for_user(user: UserInfo) -> Self {
        Self {
            user: Some(user),
            menus: Vec::new(),
        }
    }

    pub fn with_menus<I, S>(mut self, menus: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.menus = menus.into_iter().map(Into::into).collect();
        self
    }

    pub fn roles(&self) -> Option<&RoleSet> {
        self.user.as_ref().and_then(|u| u.role.as_ref())
    }
}

// ──────────────────────────────────────────────
// Lenient field decoding
// ──────────────────────────────────────────────

fn lenient_roles<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<RoleSet>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(roles_from_value(&value))
}

fn roles_from_value(value: &Value) -> Option<RoleSet> {
    match value {
        Value::Null => None,
        Value::Array(items) => {
            let roles: Option<RoleSet> = items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect();
            if roles.is_none() {
                tracing::warn!(role = %value, "role array contains non-string entries; treating as absent");
            }
            roles
        }
        other => {
            tracing::warn!(role = %other, "role field is not an array; treating as absent");
            None
        }
    }
}

fn lenient_menu_permissions<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<MenuPermissions>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(menu_permissions_from_value(&value))
}

/// A malformed map is read as defined-but-empty so that it denies rather
/// than falling through to the permissive legacy path.
fn menu_permissions_from_value(value: &Value) -> Option<MenuPermissions> {
    let map = match value {
        Value::Null => return None,
        Value::Object(map) => map,
        other => {
            tracing::warn!(menu_permissions = %other, "menu_permissions is not an object; denying all actions");
            return Some(MenuPermissions::new());
        }
    };

    let mut permissions = MenuPermissions::new();
    for (menu, actions) in map {
        let granted = permissions.entry(menu.clone()).or_default();
        match actions {
            Value::Array(items) => {
                granted.extend(items.iter().filter_map(|a| a.as_str().map(str::to_string)));
            }
            other => {
                tracing::warn!(menu = %menu, actions = %other, "menu action list is not an array; granting nothing");
            }
        }
    }
    Some(permissions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn requirement_from_json_forms() {
        let none: Requirement = serde_json::from_value(json!(null)).unwrap();
        let one: Requirement = serde_json::from_value(json!("admin")).unwrap();
        let many: Requirement = serde_json::from_value(json!(["admin", "ops"])).unwrap();
        let empty: Requirement = serde_json::from_value(json!("")).unwrap();

        assert_eq!(none, Requirement::None);
        assert_eq!(one, Requirement::One("admin".into()));
        assert_eq!(many, Requirement::any_of(["admin", "ops"]));
        assert_eq!(empty, Requirement::None);
    }

    #[test]
    fn missing_role_is_none() {
        let user: UserInfo = serde_json::from_value(json!({"username": "li"})).unwrap();
        assert_eq!(user.role, None);
        assert_eq!(user.menu_permissions, None);
    }

    #[test]
    fn role_string_is_treated_as_absent() {
        let user: UserInfo =
            serde_json::from_value(json!({"username": "li", "role": "super"})).unwrap();
        assert_eq!(user.role, None);
    }

    #[test]
    fn role_with_mixed_entries_is_treated_as_absent() {
        let user: UserInfo =
            serde_json::from_value(json!({"username": "li", "role": ["admin", 7]})).unwrap();
        assert_eq!(user.role, None);
    }

    #[test]
    fn empty_menu_permissions_stay_defined() {
        let user: UserInfo =
            serde_json::from_value(json!({"username": "li", "menu_permissions": {}})).unwrap();
        assert_eq!(user.menu_permissions, Some(MenuPermissions::new()));
    }

    #[test]
    fn malformed_menu_permissions_fail_closed() {
        let user: UserInfo =
            serde_json::from_value(json!({"username": "li", "menu_permissions": ["order"]}))
                .unwrap();
        assert_eq!(user.menu_permissions, Some(MenuPermissions::new()));

        let user: UserInfo = serde_json::from_value(
            json!({"username": "li", "menu_permissions": {"order": "create", "style": ["view", 3]}}),
        )
        .unwrap();
        let perms = user.menu_permissions.unwrap();
        assert!(perms["order"].is_empty());
        assert_eq!(perms["style"].len(), 1);
    }

    #[test]
    fn session_accepts_login_payload_alias() {
        let session: SessionContext = serde_json::from_value(json!({
            "userInfo": {"username": "li", "role": ["admin"]},
            "menus": ["order"]
        }))
        .unwrap();
        assert_eq!(session.roles().map(|r| r.len()), Some(1));
        assert_eq!(session.menus, vec!["order".to_string()]);
    }
}
