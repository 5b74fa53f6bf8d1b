//! Request-scoped correlation identifier.
//!
//! `RequestId` follows a request through logs, error envelopes and audit
//! records. The current identifier lives in Tokio task-local storage so it is
//! available without threading it through every call.
//!
//! Task-local values are not inherited by spawned tasks. Wrap detached work in
//! [`RequestId::scope`] to keep the identifier attached.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::task_local;
use uuid::Uuid;

task_local! {
    static REQUEST_ID: RequestId;
}

/// Longest inbound identifier accepted from a client.
pub const MAX_INBOUND_LEN: usize = 128;

/// Per-request correlation identifier.
///
/// # Examples
/// ```
/// use storefront::domain::RequestId;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let id = RequestId::from_header("req-42").expect("accepted");
/// let seen = RequestId::scope(id.clone(), async { RequestId::current() }).await;
/// assert_eq!(seen, Some(id));
/// # });
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(Arc<str>);

impl RequestId {
    /// Generate a fresh UUID v4 identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Arc::from(Uuid::new_v4().to_string()))
    }

    /// Accept a client supplied identifier.
    ///
    /// Returns `None` when the value is blank, too long or contains
    /// characters outside visible ASCII.
    #[must_use]
    pub fn from_header(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let acceptable = !trimmed.is_empty()
            && trimmed.len() <= MAX_INBOUND_LEN
            && trimmed.bytes().all(|b| b.is_ascii_graphic());
        acceptable.then(|| Self(Arc::from(trimmed)))
    }

    /// Identifier in scope for the current task, if any.
    #[must_use]
    pub fn current() -> Option<Self> {
        REQUEST_ID.try_with(Clone::clone).ok()
    }

    /// Run `fut` with `id` in scope.
    pub async fn scope<Fut>(id: Self, fut: Fut) -> Fut::Output
    where
        Fut: Future,
    {
        REQUEST_ID.scope(id, fut).await
    }

    /// Run the synchronous `f` with `id` in scope.
    pub fn sync_scope<F, R>(id: Self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        REQUEST_ID.sync_scope(id, f)
    }

    /// Borrow the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    use super::*;
    use rstest::rstest;

    #[tokio::test]
    async fn generated_ids_are_uuids() {
        let id = RequestId::generate();
        assert!(Uuid::parse_str(id.as_str()).is_ok());
    }

    #[tokio::test]
    async fn current_reflects_scope() {
        let expected = RequestId::generate();
        let observed = RequestId::scope(expected.clone(), async { RequestId::current() }).await;
        assert_eq!(observed, Some(expected));
    }

    #[rstest]
    fn sync_scope_covers_the_closure_only() {
        let id = RequestId::generate();
        let seen = RequestId::sync_scope(id.clone(), RequestId::current);
        assert_eq!(seen, Some(id));
        assert!(RequestId::current().is_none());
    }

    #[tokio::test]
    async fn current_is_none_out_of_scope() {
        assert!(RequestId::current().is_none());
    }

    #[tokio::test]
    async fn spawned_tasks_do_not_inherit_scope() {
        let id = RequestId::generate();
        let seen = RequestId::scope(id, async {
            tokio::spawn(async { RequestId::current() })
                .await
                .expect("task joins")
        })
        .await;
        assert!(seen.is_none());
    }

    #[rstest]
    #[case("abc-123", Some("abc-123"))]
    #[case("  padded  ", Some("padded"))]
    #[case("", None)]
    #[case("has space", None)]
    #[case("naïve", None)]
    fn inbound_values_are_screened(#[case] raw: &str, #[case] expected: Option<&str>) {
        assert_eq!(
            RequestId::from_header(raw).as_ref().map(RequestId::as_str),
            expected
        );
    }

    #[rstest]
    fn overlong_inbound_values_are_rejected() {
        assert!(RequestId::from_header(&"a".repeat(MAX_INBOUND_LEN + 1)).is_none());
    }
}
