use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints that need no bearer token. Reads only check existence; nothing here
/// mutates a post or a comment.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // POST /users/login
        // OAuth2 password form (`username` = email). Returns a bearer access token.
        .route("/users/login", post(handlers::login))
        // POST /users/signup
        // Account creation. Rejects an already-registered email with 400.
        .route("/users/signup", post(handlers::signup))
        // GET /posts?skip=&limit=
        // Newest-first listing.
        .route("/posts", get(handlers::list_posts))
        // GET /posts/{post_id}
        .route("/posts/{post_id}", get(handlers::get_post))
        // GET /posts/{post_id}/comments?skip=&limit=
        // Oldest-first listing of one post's comments.
        .route("/posts/{post_id}/comments", get(handlers::list_comments))
        // GET /posts/{post_id}/comments/{comment_id}
        // 400 "Wrong Access" if the comment belongs to another post.
        .route(
            "/posts/{post_id}/comments/{comment_id}",
            get(handlers::get_comment),
        )
}
