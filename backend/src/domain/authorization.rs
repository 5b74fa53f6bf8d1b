//! Permission guard.
//!
//! A pure predicate over the required permissions of a route and the calling
//! principal. It holds no per-request state.

use serde_json::json;
use tracing::warn;

use super::{Error, Permission, PermissionSet, PermissionTable, Principal};

/// Message key for requests that need a principal but carry none.
pub const NOT_AUTHENTICATED: &str = "notAuthenticated";

/// Decides whether a principal may invoke a route.
#[derive(Debug, Clone, Copy)]
pub struct PermissionGuard<'a> {
    table: &'a PermissionTable,
}

impl Default for PermissionGuard<'static> {
    fn default() -> Self {
        Self::new(PermissionTable::standard())
    }
}

impl<'a> PermissionGuard<'a> {
    /// Guard backed by `table`.
    #[must_use]
    pub const fn new(table: &'a PermissionTable) -> Self {
        Self { table }
    }

    /// Allow the call or explain why it is refused.
    ///
    /// - An empty requirement always passes, even without a principal.
    /// - A non-empty requirement without a principal yields `401`.
    /// - Otherwise the principal's role must own every required permission;
    ///   an absent or unknown role owns none. Refusals yield `403` listing the
    ///   missing permissions.
    ///
    /// # Examples
    /// ```
    /// use storefront::domain::{
    ///     Permission, PermissionGuard, PermissionSet, Principal, UserId,
    /// };
    ///
    /// let guard = PermissionGuard::default();
    /// let required = PermissionSet::from_iter([Permission::UserDelete]);
    /// let caller = Principal::new(UserId::random(), Some("user".to_owned()));
    ///
    /// let err = guard.check(&required, Some(&caller)).unwrap_err();
    /// assert_eq!(err.status(), 403);
    /// assert!(guard.check(&PermissionSet::empty(), None).is_ok());
    /// ```
    pub fn check(
        &self,
        required: &PermissionSet,
        principal: Option<&Principal>,
    ) -> Result<(), Error> {
        if required.is_empty() {
            return Ok(());
        }
        let Some(principal) = principal else {
            return Err(Error::unauthorized(NOT_AUTHENTICATED));
        };

        let granted = principal
            .role()
            .map_or_else(PermissionSet::empty, |role| {
                self.table.permissions_for(role).clone()
            });
        let missing = granted.missing(required);
        if missing.is_empty() {
            return Ok(());
        }

        let tokens: Vec<&'static str> = missing.iter().copied().map(Permission::as_str).collect();
        warn!(
            principal = %principal.id(),
            role = principal.role().unwrap_or("<none>"),
            missing = ?tokens,
            "authorization denied"
        );
        Err(denied(&tokens))
    }
}

fn denied(tokens: &[&'static str]) -> Error {
    let mut data = serde_json::Map::new();
    data.insert("missingPermissions".to_owned(), json!(tokens));
    Error::forbidden(format!(
        "Authorization denied: missing permissions {}",
        tokens.join(", ")
    ))
    .with_errors(data)
}

#[cfg(test)]
mod tests {
    //! Access is granted iff the required set is a subset of the role's set.
    use super::*;
    use crate::domain::{FaultPayload, Message, Role, UserId};
    use rstest::{fixture, rstest};

    #[fixture]
    fn guard() -> PermissionGuard<'static> {
        PermissionGuard::default()
    }

    fn caller(role: Option<&str>) -> Principal {
        Principal::new(UserId::random(), role.map(str::to_owned))
    }

    fn set(permissions: &[Permission]) -> PermissionSet {
        permissions.iter().copied().collect()
    }

    #[rstest]
    #[case(None)]
    #[case(Some("user"))]
    #[case(Some("nobody"))]
    fn empty_requirement_always_passes(guard: PermissionGuard<'static>, #[case] role: Option<&str>) {
        assert!(guard.check(&PermissionSet::empty(), Some(&caller(role))).is_ok());
        assert!(guard.check(&PermissionSet::empty(), None).is_ok());
    }

    #[rstest]
    fn missing_principal_is_unauthenticated(guard: PermissionGuard<'static>) {
        let err = guard
            .check(&set(&[Permission::UserRead]), None)
            .expect_err("no principal");
        assert_eq!(err.status(), 401);
        assert_eq!(err.to_string(), "401 notAuthenticated");
    }

    #[rstest]
    fn user_role_cannot_delete_users(guard: PermissionGuard<'static>) {
        let err = guard
            .check(&set(&[Permission::UserDelete]), Some(&caller(Some("user"))))
            .expect_err("denied");

        let Error::Http(fault) = err else {
            panic!("expected http fault");
        };
        assert_eq!(fault.status(), 403);
        let FaultPayload::Structured { message, errors, .. } = fault.payload() else {
            panic!("expected structured payload");
        };
        assert_eq!(
            message,
            &Message::from("Authorization denied: missing permissions user:delete")
        );
        assert_eq!(
            errors.as_ref().and_then(|e| e.get("missingPermissions")),
            Some(&json!(["user:delete"]))
        );
    }

    #[rstest]
    #[case(None)]
    #[case(Some("root"))]
    fn absent_or_unknown_role_owns_nothing(
        guard: PermissionGuard<'static>,
        #[case] role: Option<&str>,
    ) {
        let err = guard
            .check(&set(&[Permission::RegionRead]), Some(&caller(role)))
            .expect_err("denied");
        assert_eq!(err.status(), 403);
    }

    #[rstest]
    fn grants_exactly_when_required_is_a_subset(guard: PermissionGuard<'static>) {
        let table = PermissionTable::standard();
        for role in Role::ALL {
            let principal = caller(Some(role.as_str()));
            let owned = table.permissions_for_role(*role);
            for permission in Permission::ALL {
                let required = set(&[*permission]);
                assert_eq!(
                    guard.check(&required, Some(&principal)).is_ok(),
                    owned.contains(*permission),
                    "{role} / {permission}"
                );
            }
        }
    }

    #[rstest]
    fn missing_permissions_are_listed_in_order(guard: PermissionGuard<'static>) {
        let err = guard
            .check(
                &set(&[Permission::ConfigUpdate, Permission::UserDelete, Permission::UserRead]),
                Some(&caller(Some("staff"))),
            )
            .expect_err("denied");
        assert_eq!(
            err.to_string(),
            "403 Authorization denied: missing permissions user:delete, config:update"
        );
    }
}
