use axum::{
    extract::State,
    http::StatusCode,
};
use blog_backend::{
    AppConfig, AppError, AppState, MemoryDatabase,
    auth::AuthUser,
    extract::{ApiForm, ApiJson, ApiPath, ApiQuery},
    handlers,
    models::{
        Comment, CommentCreate, CommentUpdate, LoginForm, Pagination, Post, PostCreate,
        PostUpdate, Role, SignupRequest, UserUpdate,
    },
};
use std::sync::Arc;

// --- Fixture ---

// Three accounts: two regular users and one admin. Alice owns two posts and one comment.
struct Fixture {
    state: AppState,
    alice: AuthUser,
    bob: AuthUser,
    carol_admin: AuthUser,
    post_1: Post,
    post_2: Post,
    comment_1: Comment,
}

fn state() -> AppState {
    AppState::new(Arc::new(MemoryDatabase::new()), AppConfig::default())
}

async fn signup(state: &AppState, email: &str, role: Option<Role>) {
    let (status, _) = handlers::signup(
        State(state.clone()),
        ApiJson(SignupRequest {
            email: email.to_string(),
            password: "pw".to_string(),
            role,
        }),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::CREATED);
}

async fn login(state: &AppState, email: &str) -> AuthUser {
    let token = handlers::login(
        State(state.clone()),
        ApiForm(LoginForm {
            username: email.to_string(),
            password: "pw".to_string(),
        }),
    )
    .await
    .unwrap()
    .0
    .access_token;
    let id = state.credentials.verify_token(&token).unwrap();
    AuthUser { id }
}

async fn create_post(state: &AppState, auth: AuthUser, title: &str) -> Post {
    handlers::create_post(
        auth,
        State(state.clone()),
        ApiJson(PostCreate {
            title: title.to_string(),
            content: format!("{title} body"),
        }),
    )
    .await
    .unwrap()
    .1
    .0
}

async fn fixture() -> Fixture {
    let state = state();
    signup(&state, "alice@example.com", None).await;
    signup(&state, "bob@example.com", None).await;
    signup(&state, "carol@example.com", Some(Role::Admin)).await;

    let alice = login(&state, "alice@example.com").await;
    let bob = login(&state, "bob@example.com").await;
    let carol_admin = login(&state, "carol@example.com").await;

    let post_1 = create_post(&state, alice, "P1").await;
    let post_2 = create_post(&state, alice, "P2").await;
    let (status, comment_1) = handlers::create_comment(
        alice,
        State(state.clone()),
        ApiPath(post_1.id),
        ApiJson(CommentCreate {
            content: "first!".to_string(),
        }),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::CREATED);

    Fixture {
        state,
        alice,
        bob,
        carol_admin,
        post_1,
        post_2,
        comment_1: comment_1.0,
    }
}

fn retitle(title: &str) -> ApiJson<PostUpdate> {
    ApiJson(PostUpdate {
        title: Some(title.to_string()),
        content: None,
    })
}

// --- Accounts ---

#[tokio::test]
async fn test_signup_twice_is_rejected() {
    let f = fixture().await;

    let result = handlers::signup(
        State(f.state.clone()),
        ApiJson(SignupRequest {
            email: "alice@example.com".to_string(),
            password: "other".to_string(),
            role: None,
        }),
    )
    .await;

    let err = result.unwrap_err();
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    assert_eq!(err.to_string(), "Email already registered.");
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let f = fixture().await;

    let wrong_password = handlers::login(
        State(f.state.clone()),
        ApiForm(LoginForm {
            username: "alice@example.com".to_string(),
            password: "nope".to_string(),
        }),
    )
    .await
    .unwrap_err();
    let unknown_email = handlers::login(
        State(f.state.clone()),
        ApiForm(LoginForm {
            username: "nobody@example.com".to_string(),
            password: "pw".to_string(),
        }),
    )
    .await
    .unwrap_err();

    assert_eq!(wrong_password.status(), StatusCode::BAD_REQUEST);
    assert_eq!(wrong_password.to_string(), unknown_email.to_string());
    assert_eq!(unknown_email.to_string(), "Incorrect email or password");
}

#[tokio::test]
async fn test_signup_defaults_to_user_role() {
    let f = fixture().await;

    let me = handlers::get_me(f.alice, State(f.state.clone())).await.unwrap();

    assert_eq!(me.0.email, "alice@example.com");
    assert_eq!(me.0.role, Role::User);
}

#[tokio::test]
async fn test_user_cannot_promote_self() {
    let f = fixture().await;

    let result = handlers::update_me(
        f.bob,
        State(f.state.clone()),
        ApiJson(UserUpdate {
            role: Some(Role::Admin),
            ..UserUpdate::default()
        }),
    )
    .await;

    assert!(matches!(result, Err(AppError::Forbidden)));
}

#[tokio::test]
async fn test_password_change_takes_effect() {
    let f = fixture().await;

    handlers::update_me(
        f.bob,
        State(f.state.clone()),
        ApiJson(UserUpdate {
            password: Some("new-pw".to_string()),
            ..UserUpdate::default()
        }),
    )
    .await
    .unwrap();

    let old = handlers::login(
        State(f.state.clone()),
        ApiForm(LoginForm {
            username: "bob@example.com".to_string(),
            password: "pw".to_string(),
        }),
    )
    .await;
    let new = handlers::login(
        State(f.state.clone()),
        ApiForm(LoginForm {
            username: "bob@example.com".to_string(),
            password: "new-pw".to_string(),
        }),
    )
    .await;

    assert!(old.is_err());
    assert!(new.is_ok());
}

#[tokio::test]
async fn test_rejected_update_keeps_old_password() {
    let f = fixture().await;

    let result = handlers::update_me(
        f.bob,
        State(f.state.clone()),
        ApiJson(UserUpdate {
            password: Some("new-pw".to_string()),
            role: Some(Role::Admin),
            ..UserUpdate::default()
        }),
    )
    .await;
    assert!(matches!(result, Err(AppError::Forbidden)));

    let old = handlers::login(
        State(f.state.clone()),
        ApiForm(LoginForm {
            username: "bob@example.com".to_string(),
            password: "pw".to_string(),
        }),
    )
    .await;
    let new = handlers::login(
        State(f.state.clone()),
        ApiForm(LoginForm {
            username: "bob@example.com".to_string(),
            password: "new-pw".to_string(),
        }),
    )
    .await;

    assert!(old.is_ok());
    assert!(new.is_err());
}

#[tokio::test]
async fn test_deleted_account_loses_access_and_content() {
    let f = fixture().await;

    let status = handlers::delete_me(f.alice, State(f.state.clone())).await.unwrap();
    assert_eq!(status, StatusCode::NO_CONTENT);

    let me = handlers::get_me(f.alice, State(f.state.clone())).await;
    assert!(matches!(me, Err(AppError::Unauthenticated)));

    let post = handlers::get_post(State(f.state.clone()), ApiPath(f.post_1.id)).await;
    assert!(matches!(post, Err(AppError::NotFound(_))));
}

// --- Posts ---

#[tokio::test]
async fn test_non_owner_cannot_update_post() {
    let f = fixture().await;

    let result = handlers::update_post(
        f.bob,
        State(f.state.clone()),
        ApiPath(f.post_1.id),
        retitle("hijacked"),
    )
    .await;

    let err = result.unwrap_err();
    assert_eq!(err.status(), StatusCode::FORBIDDEN);

    let unchanged = handlers::get_post(State(f.state.clone()), ApiPath(f.post_1.id))
        .await
        .unwrap();
    assert_eq!(unchanged.0.title, "P1");
}

#[tokio::test]
async fn test_admin_can_update_any_post() {
    let f = fixture().await;

    let updated = handlers::update_post(
        f.carol_admin,
        State(f.state.clone()),
        ApiPath(f.post_1.id),
        retitle("moderated"),
    )
    .await
    .unwrap();

    assert_eq!(updated.0.title, "moderated");
    assert_eq!(updated.0.content, "P1 body");
    assert_eq!(updated.0.user_id, f.alice.id, "ownership never changes");
}

#[tokio::test]
async fn test_owner_can_update_post() {
    let f = fixture().await;

    let updated = handlers::update_post(
        f.alice,
        State(f.state.clone()),
        ApiPath(f.post_2.id),
        retitle("P2 edited"),
    )
    .await
    .unwrap();

    assert_eq!(updated.0.title, "P2 edited");
    assert!(updated.0.updated_at >= updated.0.created_at);
}

#[tokio::test]
async fn test_empty_title_is_rejected() {
    let f = fixture().await;

    let result = handlers::update_post(
        f.alice,
        State(f.state.clone()),
        ApiPath(f.post_1.id),
        retitle(""),
    )
    .await;

    assert!(matches!(result, Err(AppError::BadRequest(_))));
}

#[tokio::test]
async fn test_missing_post_is_not_found() {
    let f = fixture().await;

    let get = handlers::get_post(State(f.state.clone()), ApiPath(999)).await;
    let update = handlers::update_post(f.alice, State(f.state.clone()), ApiPath(999), retitle("x")).await;
    let delete = handlers::delete_post(f.carol_admin, State(f.state.clone()), ApiPath(999)).await;

    assert!(matches!(get, Err(AppError::NotFound(_))));
    assert!(matches!(update, Err(AppError::NotFound(_))));
    assert!(matches!(delete, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_delete_post_removes_comments() {
    let f = fixture().await;

    let detail = handlers::delete_post(f.alice, State(f.state.clone()), ApiPath(f.post_1.id))
        .await
        .unwrap();
    assert_eq!(detail.0.detail, "Post deleted.");

    let comment = handlers::get_comment(
        State(f.state.clone()),
        ApiPath((f.post_1.id, f.comment_1.id)),
    )
    .await;
    assert!(matches!(comment, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_list_posts_newest_first() {
    let f = fixture().await;

    let posts = handlers::list_posts(State(f.state.clone()), ApiQuery(Pagination::default()))
        .await
        .unwrap();

    let ids: Vec<i64> = posts.0.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![f.post_2.id, f.post_1.id]);
}

#[tokio::test]
async fn test_invalid_pagination_is_rejected() {
    let f = fixture().await;

    for (skip, limit) in [(-1, 10), (0, 0), (0, 101)] {
        let result =
            handlers::list_posts(State(f.state.clone()), ApiQuery(Pagination { skip, limit })).await;
        assert!(
            matches!(result, Err(AppError::BadRequest(_))),
            "skip={skip} limit={limit}"
        );
    }
}

// --- Comments ---

#[tokio::test]
async fn test_comment_under_wrong_post_is_wrong_access() {
    let f = fixture().await;

    // Even the author gets 400: the path check precedes ownership.
    let result = handlers::delete_comment(
        f.alice,
        State(f.state.clone()),
        ApiPath((f.post_2.id, f.comment_1.id)),
    )
    .await;

    let err = result.unwrap_err();
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    assert_eq!(err.to_string(), "Wrong Access");

    let still_there = handlers::get_comment(
        State(f.state.clone()),
        ApiPath((f.post_1.id, f.comment_1.id)),
    )
    .await
    .unwrap();
    assert_eq!(still_there.0, f.comment_1);
}

#[tokio::test]
async fn test_wrong_access_does_not_depend_on_caller() {
    let f = fixture().await;

    for caller in [f.alice, f.bob, f.carol_admin] {
        let update = handlers::update_comment(
            caller,
            State(f.state.clone()),
            ApiPath((f.post_2.id, f.comment_1.id)),
            ApiJson(CommentUpdate {
                content: Some("moved".to_string()),
            }),
        )
        .await
        .unwrap_err();
        let delete = handlers::delete_comment(
            caller,
            State(f.state.clone()),
            ApiPath((f.post_2.id, f.comment_1.id)),
        )
        .await
        .unwrap_err();

        // Bob would be 403 and the admin 200/204 on the right path; here all get 400.
        assert_eq!(update.to_string(), "Wrong Access", "caller {}", caller.id);
        assert_eq!(delete.status(), StatusCode::BAD_REQUEST, "caller {}", caller.id);
    }

    let untouched = handlers::get_comment(
        State(f.state.clone()),
        ApiPath((f.post_1.id, f.comment_1.id)),
    )
    .await
    .unwrap();
    assert_eq!(untouched.0.content, "first!");
}

#[tokio::test]
async fn test_get_comment_under_wrong_post_is_wrong_access() {
    let f = fixture().await;

    let result = handlers::get_comment(
        State(f.state.clone()),
        ApiPath((f.post_2.id, f.comment_1.id)),
    )
    .await;

    assert!(matches!(result, Err(AppError::BadRequest(_))));
}

#[tokio::test]
async fn test_non_author_cannot_edit_comment() {
    let f = fixture().await;

    let result = handlers::update_comment(
        f.bob,
        State(f.state.clone()),
        ApiPath((f.post_1.id, f.comment_1.id)),
        ApiJson(CommentUpdate {
            content: Some("edited by bob".to_string()),
        }),
    )
    .await;

    assert!(matches!(result, Err(AppError::Forbidden)));
}

#[tokio::test]
async fn test_admin_can_delete_any_comment() {
    let f = fixture().await;

    let status = handlers::delete_comment(
        f.carol_admin,
        State(f.state.clone()),
        ApiPath((f.post_1.id, f.comment_1.id)),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::NO_CONTENT);

    let listed = handlers::list_comments(
        State(f.state.clone()),
        ApiPath(f.post_1.id),
        ApiQuery(Pagination::default()),
    )
    .await
    .unwrap();
    assert!(listed.0.is_empty());
}

#[tokio::test]
async fn test_comment_on_missing_post_is_not_found() {
    let f = fixture().await;

    let create = handlers::create_comment(
        f.bob,
        State(f.state.clone()),
        ApiPath(999),
        ApiJson(CommentCreate {
            content: "into the void".to_string(),
        }),
    )
    .await;
    let list = handlers::list_comments(
        State(f.state.clone()),
        ApiPath(999),
        ApiQuery(Pagination::default()),
    )
    .await;

    assert!(matches!(create, Err(AppError::NotFound(_))));
    assert!(matches!(list, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_comments_listed_oldest_first() {
    let f = fixture().await;

    let (_, second) = handlers::create_comment(
        f.bob,
        State(f.state.clone()),
        ApiPath(f.post_1.id),
        ApiJson(CommentCreate {
            content: "second".to_string(),
        }),
    )
    .await
    .unwrap();

    let listed = handlers::list_comments(
        State(f.state.clone()),
        ApiPath(f.post_1.id),
        ApiQuery(Pagination::default()),
    )
    .await
    .unwrap();

    assert_eq!(listed.0, vec![f.comment_1.clone(), second.0]);
}
