use async_trait::async_trait;
use std::sync::Arc;

use crate::{
    error::AppError,
    models::{Comment, CommentUpdate, NewUser, Page, Post, PostUpdate, User, UserChanges},
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryDatabase;
pub use postgres::PostgresDatabase;

/// UserStore
///
/// Persistence contract for user accounts. Email uniqueness is enforced here, at
/// write time, and surfaces as `AppError::Conflict`.
#[async_trait]
pub trait UserStore: Send {
    async fn create_user(&mut self, new_user: NewUser) -> Result<User, AppError>;
    async fn get_user_by_id(&mut self, id: i64) -> Result<Option<User>, AppError>;
    async fn get_user_by_email(&mut self, email: &str) -> Result<Option<User>, AppError>;
    async fn update_user(&mut self, user: &User, changes: UserChanges) -> Result<User, AppError>;
    /// Removes the account together with its posts, the comments on those posts,
    /// and every comment the user wrote.
    async fn delete_user(&mut self, user: &User) -> Result<(), AppError>;
}

/// PostStore
///
/// Persistence contract for posts. Listings are newest first (id descending).
#[async_trait]
pub trait PostStore: Send {
    async fn create_post(&mut self, owner_id: i64, title: &str, content: &str) -> Result<Post, AppError>;
    async fn get_post(&mut self, id: i64) -> Result<Option<Post>, AppError>;
    async fn list_posts(&mut self, page: Page) -> Result<Vec<Post>, AppError>;
    /// Applies only the provided fields and bumps `updated_at`.
    async fn update_post(&mut self, post: &Post, patch: PostUpdate) -> Result<Post, AppError>;
    /// Removes the post and all of its comments.
    async fn delete_post(&mut self, post: &Post) -> Result<(), AppError>;
}

/// CommentStore
///
/// Persistence contract for comments. Listings are oldest first (id ascending).
#[async_trait]
pub trait CommentStore: Send {
    async fn create_comment(&mut self, author_id: i64, post_id: i64, content: &str) -> Result<Comment, AppError>;
    async fn get_comment(&mut self, id: i64) -> Result<Option<Comment>, AppError>;
    async fn list_comments_by_post(&mut self, post_id: i64, page: Page) -> Result<Vec<Comment>, AppError>;
    async fn list_comments_by_user(&mut self, user_id: i64, page: Page) -> Result<Vec<Comment>, AppError>;
    async fn update_comment(&mut self, comment: &Comment, patch: CommentUpdate) -> Result<Comment, AppError>;
    async fn delete_comment(&mut self, comment: &Comment) -> Result<(), AppError>;
}

/// UnitOfWork
///
/// One request's scoped transaction. All three stores are reachable through it, so a
/// handler performs its reads and its single mutating sequence atomically.
///
/// Nothing is published until `commit` succeeds. Dropping the unit of work on any other
/// path (an early `?`, a business error, a panic) rolls everything back.
#[async_trait]
pub trait UnitOfWork: UserStore + PostStore + CommentStore {
    /// Publishes the staged changes. The unit of work is unusable afterwards.
    async fn commit(&mut self) -> Result<(), AppError>;
}

/// Database
///
/// Factory for units of work. Implemented by the Postgres backend and by the
/// in-memory backend used for local runs and tests.
#[async_trait]
pub trait Database: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, AppError>;
}

/// DatabaseState
///
/// The concrete type used to share the persistence layer across the application state.
pub type DatabaseState = Arc<dyn Database>;
