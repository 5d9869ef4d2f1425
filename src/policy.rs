use crate::{
    error::AppError,
    models::{Comment, Role, User},
};

/// Actor
///
/// The identity a mutation is attempted under: the authenticated user's id and role,
/// as currently stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: i64,
    pub role: Role,
}

impl From<&User> for Actor {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            role: user.role,
        }
    }
}

/// can_mutate
///
/// Owner-or-admin rule for updates and deletes. Reads never go through here.
///
/// Earlier revisions of the post update path combined the two conditions with AND
/// and answered 401; both are treated as defects and not reproduced.
pub fn can_mutate(actor: &Actor, resource_owner_id: i64) -> bool {
    actor.id == resource_owner_id || actor.role == Role::Admin
}

/// Result-returning form of [`can_mutate`], failing with `Forbidden` (403).
pub fn authorize_mutation(actor: &Actor, resource_owner_id: i64) -> Result<(), AppError> {
    if can_mutate(actor, resource_owner_id) {
        Ok(())
    } else {
        tracing::debug!(
            actor_id = actor.id,
            owner_id = resource_owner_id,
            "mutation denied"
        );
        Err(AppError::Forbidden)
    }
}

/// ensure_comment_in_post
///
/// A comment addressed under `/posts/{post_id}/...` must actually belong to that post.
/// A mismatch is a client error (400 "Wrong Access"), independent of who is asking.
pub fn ensure_comment_in_post(comment: &Comment, post_id: i64) -> Result<(), AppError> {
    if comment.post_id == post_id {
        Ok(())
    } else {
        Err(AppError::bad_request("Wrong Access"))
    }
}
