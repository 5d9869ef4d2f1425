use blog_backend::{
    AppError,
    models::{Comment, Role},
    policy::{Actor, authorize_mutation, can_mutate, ensure_comment_in_post},
};
use chrono::Utc;

fn actor(id: i64, role: Role) -> Actor {
    Actor { id, role }
}

fn comment(id: i64, user_id: i64, post_id: i64) -> Comment {
    let now = Utc::now();
    Comment {
        id,
        content: "hello".to_string(),
        user_id,
        post_id,
        created_at: now,
        updated_at: now,
    }
}

// --- Owner-or-Admin ---

#[test]
fn test_owner_user_can_mutate() {
    assert!(can_mutate(&actor(1, Role::User), 1));
}

#[test]
fn test_non_owner_user_cannot_mutate() {
    assert!(!can_mutate(&actor(2, Role::User), 1));
}

#[test]
fn test_owner_admin_can_mutate() {
    assert!(can_mutate(&actor(1, Role::Admin), 1));
}

#[test]
fn test_non_owner_admin_can_mutate() {
    // Either condition suffices; an admin never needs to own the resource.
    assert!(can_mutate(&actor(3, Role::Admin), 1));
}

#[test]
fn test_denial_is_forbidden() {
    let result = authorize_mutation(&actor(2, Role::User), 1);

    let err = result.unwrap_err();
    assert!(matches!(err, AppError::Forbidden));
    assert_eq!(err.status(), axum::http::StatusCode::FORBIDDEN);
    assert_eq!(err.to_string(), "Not enough permissions");
}

#[test]
fn test_allowed_mutation_is_ok() {
    assert!(authorize_mutation(&actor(1, Role::User), 1).is_ok());
    assert!(authorize_mutation(&actor(9, Role::Admin), 1).is_ok());
}

// --- Comment/Post Consistency ---

#[test]
fn test_comment_in_matching_post_passes() {
    assert!(ensure_comment_in_post(&comment(1, 1, 10), 10).is_ok());
}

#[test]
fn test_comment_in_other_post_is_wrong_access() {
    let err = ensure_comment_in_post(&comment(1, 1, 10), 11).unwrap_err();

    assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    assert_eq!(err.to_string(), "Wrong Access");
}
