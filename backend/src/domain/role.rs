//! Roles and the static role → permission table.
//!
//! Roles do not inherit from each other. Each role's grant list is written
//! out explicitly, including the admin role's "everything" list, which the
//! test suite checks against [`Permission::ALL`].

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use super::permission::{Permission, PermissionSet};

/// Known roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Platform administrator.
    Admin,
    /// Back-office staff handling orders, feedback and notifications.
    Staff,
    /// Regular customer account.
    User,
}

impl Role {
    /// Every defined role.
    pub const ALL: &'static [Self] = &[Self::Admin, Self::Staff, Self::User];

    /// Wire identifier for this role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Staff => "staff",
            Self::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when parsing an unknown role identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role `{0}`")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "staff" => Ok(Self::Staff),
            "user" => Ok(Self::User),
            _ => Err(UnknownRole(s.to_owned())),
        }
    }
}

const ADMIN_GRANTS: &[Permission] = &[
    Permission::UserRead,
    Permission::UserCreate,
    Permission::UserUpdate,
    Permission::UserDelete,
    Permission::AddressRead,
    Permission::AddressCreate,
    Permission::AddressUpdate,
    Permission::AddressDelete,
    Permission::FavoriteRead,
    Permission::FavoriteCreate,
    Permission::FavoriteDelete,
    Permission::FeedbackRead,
    Permission::FeedbackCreate,
    Permission::FeedbackReply,
    Permission::OrderRead,
    Permission::OrderCreate,
    Permission::OrderUpdate,
    Permission::OrderCancel,
    Permission::OrderDelete,
    Permission::ShareRead,
    Permission::ShareCreate,
    Permission::ShareDelete,
    Permission::NotificationRead,
    Permission::NotificationSend,
    Permission::RegionRead,
    Permission::RegionManage,
    Permission::AuditRead,
    Permission::ConfigRead,
    Permission::ConfigUpdate,
];

const STAFF_GRANTS: &[Permission] = &[
    Permission::UserRead,
    Permission::AddressRead,
    Permission::FeedbackRead,
    Permission::FeedbackReply,
    Permission::OrderRead,
    Permission::OrderUpdate,
    Permission::OrderCancel,
    Permission::NotificationRead,
    Permission::NotificationSend,
    Permission::RegionRead,
    Permission::ConfigRead,
];

const USER_GRANTS: &[Permission] = &[
    Permission::UserRead,
    Permission::UserUpdate,
    Permission::AddressRead,
    Permission::AddressCreate,
    Permission::AddressUpdate,
    Permission::AddressDelete,
    Permission::FavoriteRead,
    Permission::FavoriteCreate,
    Permission::FavoriteDelete,
    Permission::FeedbackRead,
    Permission::FeedbackCreate,
    Permission::OrderRead,
    Permission::OrderCreate,
    Permission::OrderCancel,
    Permission::ShareRead,
    Permission::ShareCreate,
    Permission::ShareDelete,
    Permission::NotificationRead,
    Permission::RegionRead,
];

static NO_PERMISSIONS: PermissionSet = PermissionSet::empty();

static STANDARD: LazyLock<PermissionTable> = LazyLock::new(|| {
    PermissionTable::from_grants([
        (Role::Admin, ADMIN_GRANTS),
        (Role::Staff, STAFF_GRANTS),
        (Role::User, USER_GRANTS),
    ])
});

/// Immutable role → permission mapping.
///
/// Safe for unsynchronised concurrent reads; it is never mutated after
/// construction.
#[derive(Debug, Clone, Default)]
pub struct PermissionTable {
    grants: HashMap<Role, PermissionSet>,
}

impl PermissionTable {
    /// Process-wide table built once from the compiled-in grant lists.
    ///
    /// # Examples
    /// ```
    /// use storefront::domain::{Permission, PermissionTable};
    ///
    /// let table = PermissionTable::standard();
    /// assert!(table.permissions_for("admin").contains(Permission::UserDelete));
    /// assert!(table.permissions_for("nobody").is_empty());
    /// ```
    #[must_use]
    pub fn standard() -> &'static Self {
        &STANDARD
    }

    /// Build a table from explicit grant lists.
    pub fn from_grants<'a, I>(grants: I) -> Self
    where
        I: IntoIterator<Item = (Role, &'a [Permission])>,
    {
        let grants = grants
            .into_iter()
            .map(|(role, permissions)| (role, permissions.iter().copied().collect()))
            .collect();
        Self { grants }
    }

    /// Permissions owned by `role`.
    ///
    /// Total: an unknown role identifier yields the empty set.
    #[must_use]
    pub fn permissions_for(&self, role: &str) -> &PermissionSet {
        role.parse::<Role>()
            .ok()
            .map_or(&NO_PERMISSIONS, |role| self.permissions_for_role(role))
    }

    /// Permissions owned by a parsed [`Role`].
    #[must_use]
    pub fn permissions_for_role(&self, role: Role) -> &PermissionSet {
        self.grants.get(&role).unwrap_or(&NO_PERMISSIONS)
    }
}
