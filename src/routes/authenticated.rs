use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Authenticated Router Module
///
/// Every route here sits behind the `auth_middleware` layer applied in `create_router`,
/// so handlers always receive a verified `AuthUser`. Update and delete handlers then
/// apply the owner-or-admin policy to the loaded resource.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET/PUT/DELETE /users/me
        // The caller's own account. Deleting it cascades to their posts and comments.
        .route(
            "/users/me",
            get(handlers::get_me)
                .put(handlers::update_me)
                .delete(handlers::delete_me),
        )
        // POST /posts
        .route("/posts", post(handlers::create_post))
        // PUT/DELETE /posts/{post_id}
        // Owner or admin only (403 otherwise).
        .route(
            "/posts/{post_id}",
            put(handlers::update_post).delete(handlers::delete_post),
        )
        // POST /posts/{post_id}/comments
        .route("/posts/{post_id}/comments", post(handlers::create_comment))
        // PUT/DELETE /posts/{post_id}/comments/{comment_id}
        // Path post must match the comment's post (400), then owner or admin (403).
        .route(
            "/posts/{post_id}/comments/{comment_id}",
            put(handlers::update_comment).delete(handlers::delete_comment),
        )
}
