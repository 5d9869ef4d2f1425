use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection, PgPool, Postgres, Transaction, postgres::PgPoolOptions};

use super::{CommentStore, Database, PostStore, UnitOfWork, UserStore};
use crate::{
    error::AppError,
    models::{Comment, CommentUpdate, NewUser, Page, Post, PostUpdate, User, UserChanges},
};

/// PostgresDatabase
///
/// The production backend. Every unit of work is one `sqlx` transaction on a pooled
/// connection, so isolation and locking follow Postgres' read-committed semantics.
#[derive(Clone)]
pub struct PostgresDatabase {
    pool: PgPool,
}

impl PostgresDatabase {
    /// Creates a new backend using an already initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(db_url: &str) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Applies the embedded schema migrations.
    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Database for PostgresDatabase {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, AppError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx: Some(tx) }))
    }
}

/// PgUnitOfWork
///
/// Wraps the open transaction. `sqlx` rolls a transaction back when it is dropped
/// without `commit`, which gives the release-on-every-exit-path guarantee.
pub struct PgUnitOfWork {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgUnitOfWork {
    fn conn(&mut self) -> Result<&mut PgConnection, AppError> {
        self.tx
            .as_deref_mut()
            .ok_or_else(|| AppError::Internal("unit of work already committed".to_string()))
    }
}

/// UserRecord
///
/// Raw `users` row. The role column is text and is parsed into [`crate::models::Role`].
#[derive(FromRow)]
struct UserRecord {
    id: i64,
    email: String,
    hashed_password: String,
    role: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRecord> for User {
    type Error = AppError;

    fn try_from(rec: UserRecord) -> Result<Self, Self::Error> {
        Ok(User {
            id: rec.id,
            email: rec.email,
            hashed_password: rec.hashed_password,
            role: rec.role.parse()?,
            created_at: rec.created_at,
            updated_at: rec.updated_at,
        })
    }
}

#[async_trait]
impl UserStore for PgUnitOfWork {
    /// create_user
    ///
    /// Checks for an existing email first; the `UNIQUE` constraint backs the check up
    /// against a concurrent signup and is mapped to the same `Conflict`.
    async fn create_user(&mut self, new_user: NewUser) -> Result<User, AppError> {
        if self.get_user_by_email(&new_user.email).await?.is_some() {
            return Err(AppError::Conflict("Email already registered.".to_string()));
        }

        let rec = sqlx::query_as::<_, UserRecord>(
            r#"INSERT INTO users (email, hashed_password, role, created_at, updated_at)
               VALUES ($1, $2, $3, NOW(), NOW())
               RETURNING id, email, hashed_password, role, created_at, updated_at"#,
        )
        .bind(&new_user.email)
        .bind(&new_user.hashed_password)
        .bind(new_user.role.as_str())
        .fetch_one(self.conn()?)
        .await?;

        rec.try_into()
    }

    async fn get_user_by_id(&mut self, id: i64) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, UserRecord>(
            "SELECT id, email, hashed_password, role, created_at, updated_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.conn()?)
        .await?
        .map(User::try_from)
        .transpose()
    }

    async fn get_user_by_email(&mut self, email: &str) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, UserRecord>(
            "SELECT id, email, hashed_password, role, created_at, updated_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(self.conn()?)
        .await?
        .map(User::try_from)
        .transpose()
    }

    /// update_user
    ///
    /// Uses `COALESCE` so that only the provided columns change.
    async fn update_user(&mut self, user: &User, changes: UserChanges) -> Result<User, AppError> {
        if let Some(email) = &changes.email {
            if let Some(existing) = self.get_user_by_email(email).await? {
                if existing.id != user.id {
                    return Err(AppError::Conflict("Email already registered.".to_string()));
                }
            }
        }

        sqlx::query_as::<_, UserRecord>(
            r#"UPDATE users
               SET email = COALESCE($2, email),
                   hashed_password = COALESCE($3, hashed_password),
                   role = COALESCE($4, role),
                   updated_at = GREATEST(NOW(), updated_at)
               WHERE id = $1
               RETURNING id, email, hashed_password, role, created_at, updated_at"#,
        )
        .bind(user.id)
        .bind(changes.email)
        .bind(changes.hashed_password)
        .bind(changes.role.map(|r| r.as_str()))
        .fetch_optional(self.conn()?)
        .await?
        .ok_or(AppError::NotFound("User not found"))?
        .try_into()
    }

    async fn delete_user(&mut self, user: &User) -> Result<(), AppError> {
        let conn = self.conn()?;
        sqlx::query(
            r#"DELETE FROM comments
               WHERE user_id = $1
                  OR post_id IN (SELECT id FROM posts WHERE user_id = $1)"#,
        )
        .bind(user.id)
        .execute(&mut *conn)
        .await?;
        sqlx::query("DELETE FROM posts WHERE user_id = $1")
            .bind(user.id)
            .execute(&mut *conn)
            .await?;
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user.id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl PostStore for PgUnitOfWork {
    async fn create_post(&mut self, owner_id: i64, title: &str, content: &str) -> Result<Post, AppError> {
        let post = sqlx::query_as::<_, Post>(
            r#"INSERT INTO posts (title, content, user_id, created_at, updated_at)
               VALUES ($1, $2, $3, NOW(), NOW())
               RETURNING id, title, content, user_id, created_at, updated_at"#,
        )
        .bind(title)
        .bind(content)
        .bind(owner_id)
        .fetch_one(self.conn()?)
        .await?;
        Ok(post)
    }

    async fn get_post(&mut self, id: i64) -> Result<Option<Post>, AppError> {
        let post = sqlx::query_as::<_, Post>(
            "SELECT id, title, content, user_id, created_at, updated_at FROM posts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.conn()?)
        .await?;
        Ok(post)
    }

    async fn list_posts(&mut self, page: Page) -> Result<Vec<Post>, AppError> {
        let posts = sqlx::query_as::<_, Post>(
            r#"SELECT id, title, content, user_id, created_at, updated_at
               FROM posts
               ORDER BY id DESC
               LIMIT $1 OFFSET $2"#,
        )
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.conn()?)
        .await?;
        Ok(posts)
    }

    async fn update_post(&mut self, post: &Post, patch: PostUpdate) -> Result<Post, AppError> {
        sqlx::query_as::<_, Post>(
            r#"UPDATE posts
               SET title = COALESCE($2, title),
                   content = COALESCE($3, content),
                   updated_at = GREATEST(NOW(), updated_at)
               WHERE id = $1
               RETURNING id, title, content, user_id, created_at, updated_at"#,
        )
        .bind(post.id)
        .bind(patch.title)
        .bind(patch.content)
        .fetch_optional(self.conn()?)
        .await?
        .ok_or(AppError::NotFound("Post not found"))
    }

    async fn delete_post(&mut self, post: &Post) -> Result<(), AppError> {
        let conn = self.conn()?;
        sqlx::query("DELETE FROM comments WHERE post_id = $1")
            .bind(post.id)
            .execute(&mut *conn)
            .await?;
        sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(post.id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CommentStore for PgUnitOfWork {
    async fn create_comment(&mut self, author_id: i64, post_id: i64, content: &str) -> Result<Comment, AppError> {
        let comment = sqlx::query_as::<_, Comment>(
            r#"INSERT INTO comments (content, user_id, post_id, created_at, updated_at)
               VALUES ($1, $2, $3, NOW(), NOW())
               RETURNING id, content, user_id, post_id, created_at, updated_at"#,
        )
        .bind(content)
        .bind(author_id)
        .bind(post_id)
        .fetch_one(self.conn()?)
        .await?;
        Ok(comment)
    }

    async fn get_comment(&mut self, id: i64) -> Result<Option<Comment>, AppError> {
        let comment = sqlx::query_as::<_, Comment>(
            "SELECT id, content, user_id, post_id, created_at, updated_at FROM comments WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.conn()?)
        .await?;
        Ok(comment)
    }

    async fn list_comments_by_post(&mut self, post_id: i64, page: Page) -> Result<Vec<Comment>, AppError> {
        let comments = sqlx::query_as::<_, Comment>(
            r#"SELECT id, content, user_id, post_id, created_at, updated_at
               FROM comments
               WHERE post_id = $1
               ORDER BY id ASC
               LIMIT $2 OFFSET $3"#,
        )
        .bind(post_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.conn()?)
        .await?;
        Ok(comments)
    }

    async fn list_comments_by_user(&mut self, user_id: i64, page: Page) -> Result<Vec<Comment>, AppError> {
        let comments = sqlx::query_as::<_, Comment>(
            r#"SELECT id, content, user_id, post_id, created_at, updated_at
               FROM comments
               WHERE user_id = $1
               ORDER BY id ASC
               LIMIT $2 OFFSET $3"#,
        )
        .bind(user_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.conn()?)
        .await?;
        Ok(comments)
    }

    async fn update_comment(&mut self, comment: &Comment, patch: CommentUpdate) -> Result<Comment, AppError> {
        sqlx::query_as::<_, Comment>(
            r#"UPDATE comments
               SET content = COALESCE($2, content),
                   updated_at = GREATEST(NOW(), updated_at)
               WHERE id = $1
               RETURNING id, content, user_id, post_id, created_at, updated_at"#,
        )
        .bind(comment.id)
        .bind(patch.content)
        .fetch_optional(self.conn()?)
        .await?
        .ok_or(AppError::NotFound("Comment not found."))
    }

    async fn delete_comment(&mut self, comment: &Comment) -> Result<(), AppError> {
        sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(comment.id)
            .execute(self.conn()?)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn commit(&mut self) -> Result<(), AppError> {
        match self.tx.take() {
            Some(tx) => {
                tx.commit().await?;
                Ok(())
            }
            None => Err(AppError::Internal("unit of work already committed".to_string())),
        }
    }
}
