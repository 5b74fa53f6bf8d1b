//! Permission tokens and permission sets.
//!
//! Permissions form a closed enumeration of `resource:action` tokens. The
//! [`define_permissions!`] macro generates the enum together with
//! [`Permission::ALL`], so the universe of permissions cannot drift from the
//! declared variants.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

macro_rules! define_permissions {
    (
        $(
            $(#[$meta:meta])*
            $variant:ident => $token:literal
        ),* $(,)?
    ) => {
        /// Closed set of `resource:action` permission tokens.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum Permission {
            $(
                $(#[$meta])*
                $variant,
            )*
        }

        impl Permission {
            /// Every defined permission, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),*];

            /// Wire token for this permission.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $token,)*
                }
            }
        }

        impl FromStr for Permission {
            type Err = UnknownPermission;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($token => Ok(Self::$variant),)*
                    other => Err(UnknownPermission(other.to_owned())),
                }
            }
        }
    };
}

define_permissions! {
    /// Read user accounts.
    UserRead => "user:read",
    /// Create user accounts.
    UserCreate => "user:create",
    /// Update user accounts.
    UserUpdate => "user:update",
    /// Delete user accounts.
    UserDelete => "user:delete",
    /// Read shipping addresses.
    AddressRead => "address:read",
    /// Create shipping addresses.
    AddressCreate => "address:create",
    /// Update shipping addresses.
    AddressUpdate => "address:update",
    /// Delete shipping addresses.
    AddressDelete => "address:delete",
    /// Read favorites.
    FavoriteRead => "favorite:read",
    /// Add favorites.
    FavoriteCreate => "favorite:create",
    /// Remove favorites.
    FavoriteDelete => "favorite:delete",
    /// Read feedback.
    FeedbackRead => "feedback:read",
    /// Submit feedback.
    FeedbackCreate => "feedback:create",
    /// Reply to feedback.
    FeedbackReply => "feedback:reply",
    /// Read orders.
    OrderRead => "order:read",
    /// Place orders.
    OrderCreate => "order:create",
    /// Update order state.
    OrderUpdate => "order:update",
    /// Cancel orders.
    OrderCancel => "order:cancel",
    /// Delete orders.
    OrderDelete => "order:delete",
    /// Read shares.
    ShareRead => "share:read",
    /// Create shares.
    ShareCreate => "share:create",
    /// Delete shares.
    ShareDelete => "share:delete",
    /// Read notifications.
    NotificationRead => "notification:read",
    /// Send notifications.
    NotificationSend => "notification:send",
    /// Read regions.
    RegionRead => "region:read",
    /// Manage regions.
    RegionManage => "region:manage",
    /// Read the audit trail.
    AuditRead => "audit:read",
    /// Read runtime configuration.
    ConfigRead => "config:read",
    /// Update runtime configuration.
    ConfigUpdate => "config:update",
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Permission {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Permission {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Raised when parsing a token that is not a defined permission.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown permission `{0}`")]
pub struct UnknownPermission(pub String);

/// Ordered set of permissions.
///
/// # Examples
/// ```
/// use storefront::domain::{Permission, PermissionSet};
///
/// let granted = PermissionSet::from_iter([Permission::UserRead]);
/// let required = PermissionSet::from_iter([Permission::UserRead, Permission::UserDelete]);
/// assert_eq!(granted.missing(&required), vec![Permission::UserDelete]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeSet<Permission>);

impl PermissionSet {
    /// Empty set.
    #[must_use]
    pub const fn empty() -> Self {
        Self(BTreeSet::new())
    }

    /// Set containing every defined permission.
    #[must_use]
    pub fn universe() -> Self {
        Permission::ALL.iter().copied().collect()
    }

    /// Add a permission.
    pub fn insert(&mut self, permission: Permission) {
        self.0.insert(permission);
    }

    /// Whether the set holds `permission`.
    #[must_use]
    pub fn contains(&self, permission: Permission) -> bool {
        self.0.contains(&permission)
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of permissions held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether every permission in `required` is held.
    #[must_use]
    pub fn contains_all(&self, required: &Self) -> bool {
        required.0.is_subset(&self.0)
    }

    /// Permissions in `required` that this set lacks, in enumeration order.
    #[must_use]
    pub fn missing(&self, required: &Self) -> Vec<Permission> {
        required.0.difference(&self.0).copied().collect()
    }

    /// Iterate in enumeration order.
    pub fn iter(&self) -> impl Iterator<Item = Permission> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<Permission> for PermissionSet {
    fn extend<I: IntoIterator<Item = Permission>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}
