//! Users API handlers.
//!
//! ```text
//! GET /api/v1/users
//! GET /api/v1/users/{id}
//! DELETE /api/v1/users/{id}
//! ```

use actix_web::web;
use serde_json::{Map, Value};

use crate::domain::{ApiResult, Error, User, UserId};
use crate::inbound::http::state::HttpState;

fn parse_user_id(raw: &str) -> ApiResult<UserId> {
    UserId::new(raw).map_err(|_| {
        let mut errors = Map::new();
        errors.insert("id".to_owned(), Value::from("invalidUserId"));
        Error::validation(errors)
    })
}

/// List known users.
pub async fn list_users(state: web::Data<HttpState>) -> ApiResult<web::Json<Vec<User>>> {
    let users = state.users.list().await?;
    Ok(web::Json(users))
}

/// Fetch one user.
pub async fn get_user(
    state: web::Data<HttpState>,
    id: web::Path<String>,
) -> ApiResult<web::Json<User>> {
    let id = parse_user_id(&id)?;
    state
        .users
        .find_by_id(&id)
        .await?
        .map(web::Json)
        .ok_or_else(|| Error::not_found("userNotFound"))
}

/// Delete a user and return the removed record.
pub async fn delete_user(
    state: web::Data<HttpState>,
    id: web::Path<String>,
) -> ApiResult<web::Json<User>> {
    let id = parse_user_id(&id)?;
    state
        .users
        .delete(&id)
        .await?
        .map(web::Json)
        .ok_or_else(|| Error::not_found("userNotFound"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{MockUserRepository, UserPersistenceError};
    use crate::inbound::http::test_utils::{SEEDED_ID, seeded_user, test_state};
    use actix_web::http::StatusCode;
    use actix_web::{App, test};
    use rstest::rstest;
    use std::sync::Arc;

    fn test_app(
        state: HttpState,
    ) -> App<
        impl actix_web::dev::ServiceFactory<
            actix_web::dev::ServiceRequest,
            Config = (),
            Response = actix_web::dev::ServiceResponse,
            Error = actix_web::Error,
            InitError = (),
        >,
    > {
        App::new().app_data(web::Data::new(state)).service(
            web::scope("/api/v1")
                .route("/users", web::get().to(list_users))
                .route("/users/{id}", web::get().to(get_user))
                .route("/users/{id}", web::delete().to(delete_user)),
        )
    }

    #[actix_web::test]
    async fn lists_users() {
        let app = test::init_service(test_app(test_state().state)).await;
        let res =
            test::call_service(&app, test::TestRequest::get().uri("/api/v1/users").to_request())
                .await;
        assert_eq!(res.status(), StatusCode::OK);
        let users: Vec<User> = test::read_body_json(res).await;
        assert_eq!(users, vec![seeded_user()]);
    }

    #[rstest]
    #[case(format!("/api/v1/users/{SEEDED_ID}"), StatusCode::OK)]
    #[case("/api/v1/users/0b7d2b70-0d6e-4df5-9d1e-52c3a8d9b0aa".to_owned(), StatusCode::NOT_FOUND)]
    #[case("/api/v1/users/not-a-uuid".to_owned(), StatusCode::BAD_REQUEST)]
    #[actix_web::test]
    async fn get_user_statuses(#[case] uri: String, #[case] expected: StatusCode) {
        let app = test::init_service(test_app(test_state().state)).await;
        let res = test::call_service(&app, test::TestRequest::get().uri(&uri).to_request()).await;
        assert_eq!(res.status(), expected);
    }

    #[actix_web::test]
    async fn delete_removes_the_user_once() {
        let fixture = test_state();
        let app = test::init_service(test_app(fixture.state)).await;
        let uri = format!("/api/v1/users/{SEEDED_ID}");

        let res = test::call_service(&app, test::TestRequest::delete().uri(&uri).to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
        let removed: User = test::read_body_json(res).await;
        assert_eq!(removed, seeded_user());
        assert!(fixture.db.committed_users().is_empty());

        let res = test::call_service(&app, test::TestRequest::delete().uri(&uri).to_request()).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let body: Value = test::read_body_json(res).await;
        assert_eq!(body["message"], "userNotFound");
        assert_eq!(fixture.db.open_connections(), 0);
    }

    #[actix_web::test]
    async fn repository_failures_are_internal_errors() {
        let mut repo = MockUserRepository::new();
        repo.expect_list()
            .times(1)
            .returning(|| Err(UserPersistenceError::connection("pool exhausted")));
        let mut state = test_state().state;
        state.users = Arc::new(repo);

        let app = test::init_service(test_app(state)).await;
        let res =
            test::call_service(&app, test::TestRequest::get().uri("/api/v1/users").to_request())
                .await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = test::read_body_json(res).await;
        assert_eq!(body["message"], "Internal server error");
        assert!(!body.to_string().contains("pool"));
    }
}
