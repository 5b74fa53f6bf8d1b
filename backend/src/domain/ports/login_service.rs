//! Driving port for login use-cases.
//!
//! Inbound adapters call it to authenticate credentials without importing the
//! backing infrastructure, so handler tests can substitute a double.

use async_trait::async_trait;

use crate::domain::{Error, LoginCredentials, Principal, UserId};

/// Domain use-case port for authentication.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LoginService: Send + Sync {
    /// Validate credentials and return the authenticated principal.
    async fn authenticate(&self, credentials: &LoginCredentials) -> Result<Principal, Error>;
}

/// Fixed development accounts, one per role.
const FIXTURE_ACCOUNTS: &[(&str, &str, &str)] = &[
    ("admin", "123e4567-e89b-12d3-a456-426614174000", "admin"),
    ("staff", "5b0a8d52-9c4f-4b5e-8c1e-2f1d9a6c7e31", "staff"),
    ("user", "9e2b7f14-3d6a-4c8b-a1f0-6e5d4c3b2a19", "user"),
];

const FIXTURE_PASSWORD: &str = "password";

/// In-memory authenticator used when no user store is configured.
///
/// `admin`, `staff` and `user` authenticate with the password `password` and
/// receive the role of the same name.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureLoginService;

impl FixtureLoginService {
    /// Identifier of the fixture account named `username`.
    #[must_use]
    pub fn fixture_id(username: &str) -> Option<UserId> {
        FIXTURE_ACCOUNTS
            .iter()
            .find(|(name, _, _)| *name == username)
            .and_then(|(_, id, _)| UserId::new(id).ok())
    }
}

#[async_trait]
impl LoginService for FixtureLoginService {
    async fn authenticate(&self, credentials: &LoginCredentials) -> Result<Principal, Error> {
        let account = FIXTURE_ACCOUNTS
            .iter()
            .find(|(name, _, _)| *name == credentials.username());
        match account {
            Some((_, id, role)) if credentials.password() == FIXTURE_PASSWORD => {
                let id = UserId::new(id)
                    .map_err(|err| Error::internal(format!("invalid fixture user id: {err}")))?;
                Ok(Principal::new(id, Some((*role).to_owned())))
            }
            _ => Err(Error::unauthorized("invalidCredentials")),
        }
    }
}
