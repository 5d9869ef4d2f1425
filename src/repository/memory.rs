use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{CommentStore, Database, PostStore, UnitOfWork, UserStore};
use crate::{
    error::AppError,
    models::{Comment, CommentUpdate, NewUser, Page, Post, PostUpdate, User, UserChanges},
};

#[derive(Clone, Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    posts: BTreeMap<i64, Post>,
    comments: BTreeMap<i64, Comment>,
    last_user_id: i64,
    last_post_id: i64,
    last_comment_id: i64,
}

/// MemoryDatabase
///
/// In-process backend used when no `DATABASE_URL` is configured locally, and by the
/// test suite. A unit of work holds the table lock for its whole lifetime, which
/// makes every request serializable.
#[derive(Clone, Default)]
pub struct MemoryDatabase {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, AppError> {
        let guard = self.tables.clone().lock_owned().await;
        Ok(Box::new(MemoryUnitOfWork {
            guard,
            staged: None,
            committed: false,
        }))
    }
}

/// MemoryUnitOfWork
///
/// Reads go straight to the locked tables. The first write takes a private copy that
/// `commit` swaps in; dropping the unit of work discards it and releases the lock.
pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<Tables>,
    staged: Option<Tables>,
    committed: bool,
}

impl MemoryUnitOfWork {
    fn ensure_open(&self) -> Result<(), AppError> {
        if self.committed {
            Err(AppError::Internal("unit of work already committed".to_string()))
        } else {
            Ok(())
        }
    }

    fn tables(&self) -> Result<&Tables, AppError> {
        self.ensure_open()?;
        Ok(self.staged.as_ref().unwrap_or(&*self.guard))
    }

    fn tables_mut(&mut self) -> Result<&mut Tables, AppError> {
        self.ensure_open()?;
        let guard = &self.guard;
        Ok(self.staged.get_or_insert_with(|| Tables::clone(guard)))
    }
}

// updated_at never moves backwards, even if the wall clock does.
fn touch(previous: DateTime<Utc>) -> DateTime<Utc> {
    Utc::now().max(previous)
}

fn window<T>(items: impl Iterator<Item = T>, page: Page) -> Vec<T> {
    items
        .skip(page.offset() as usize)
        .take(page.limit() as usize)
        .collect()
}

#[async_trait]
impl UserStore for MemoryUnitOfWork {
    async fn create_user(&mut self, new_user: NewUser) -> Result<User, AppError> {
        let tables = self.tables_mut()?;
        if tables.users.values().any(|u| u.email == new_user.email) {
            return Err(AppError::Conflict("Email already registered.".to_string()));
        }

        tables.last_user_id += 1;
        let now = Utc::now();
        let user = User {
            id: tables.last_user_id,
            email: new_user.email,
            hashed_password: new_user.hashed_password,
            role: new_user.role,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user_by_id(&mut self, id: i64) -> Result<Option<User>, AppError> {
        Ok(self.tables()?.users.get(&id).cloned())
    }

    async fn get_user_by_email(&mut self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .tables()?
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn update_user(&mut self, user: &User, changes: UserChanges) -> Result<User, AppError> {
        let tables = self.tables_mut()?;
        if let Some(email) = &changes.email {
            if tables
                .users
                .values()
                .any(|u| u.id != user.id && &u.email == email)
            {
                return Err(AppError::Conflict("Email already registered.".to_string()));
            }
        }

        let stored = tables
            .users
            .get_mut(&user.id)
            .ok_or(AppError::NotFound("User not found"))?;
        if let Some(email) = changes.email {
            stored.email = email;
        }
        if let Some(hashed) = changes.hashed_password {
            stored.hashed_password = hashed;
        }
        if let Some(role) = changes.role {
            stored.role = role;
        }
        stored.updated_at = touch(stored.updated_at);
        Ok(stored.clone())
    }

    async fn delete_user(&mut self, user: &User) -> Result<(), AppError> {
        let tables = self.tables_mut()?;
        let owned_posts: Vec<i64> = tables
            .posts
            .values()
            .filter(|p| p.user_id == user.id)
            .map(|p| p.id)
            .collect();

        tables
            .comments
            .retain(|_, c| c.user_id != user.id && !owned_posts.contains(&c.post_id));
        tables.posts.retain(|_, p| p.user_id != user.id);
        tables.users.remove(&user.id);
        Ok(())
    }
}

#[async_trait]
impl PostStore for MemoryUnitOfWork {
    async fn create_post(&mut self, owner_id: i64, title: &str, content: &str) -> Result<Post, AppError> {
        let tables = self.tables_mut()?;
        if !tables.users.contains_key(&owner_id) {
            return Err(AppError::NotFound("User not found"));
        }

        tables.last_post_id += 1;
        let now = Utc::now();
        let post = Post {
            id: tables.last_post_id,
            title: title.to_string(),
            content: content.to_string(),
            user_id: owner_id,
            created_at: now,
            updated_at: now,
        };
        tables.posts.insert(post.id, post.clone());
        Ok(post)
    }

    async fn get_post(&mut self, id: i64) -> Result<Option<Post>, AppError> {
        Ok(self.tables()?.posts.get(&id).cloned())
    }

    async fn list_posts(&mut self, page: Page) -> Result<Vec<Post>, AppError> {
        let tables = self.tables()?;
        Ok(window(tables.posts.values().rev().cloned(), page))
    }

    async fn update_post(&mut self, post: &Post, patch: PostUpdate) -> Result<Post, AppError> {
        let stored = self
            .tables_mut()?
            .posts
            .get_mut(&post.id)
            .ok_or(AppError::NotFound("Post not found"))?;
        if let Some(title) = patch.title {
            stored.title = title;
        }
        if let Some(content) = patch.content {
            stored.content = content;
        }
        stored.updated_at = touch(stored.updated_at);
        Ok(stored.clone())
    }

    async fn delete_post(&mut self, post: &Post) -> Result<(), AppError> {
        let tables = self.tables_mut()?;
        tables.comments.retain(|_, c| c.post_id != post.id);
        tables.posts.remove(&post.id);
        Ok(())
    }
}

#[async_trait]
impl CommentStore for MemoryUnitOfWork {
    async fn create_comment(&mut self, author_id: i64, post_id: i64, content: &str) -> Result<Comment, AppError> {
        let tables = self.tables_mut()?;
        if !tables.posts.contains_key(&post_id) {
            return Err(AppError::NotFound("Post not found"));
        }
        if !tables.users.contains_key(&author_id) {
            return Err(AppError::NotFound("User not found"));
        }

        tables.last_comment_id += 1;
        let now = Utc::now();
        let comment = Comment {
            id: tables.last_comment_id,
            content: content.to_string(),
            user_id: author_id,
            post_id,
            created_at: now,
            updated_at: now,
        };
        tables.comments.insert(comment.id, comment.clone());
        Ok(comment)
    }

    async fn get_comment(&mut self, id: i64) -> Result<Option<Comment>, AppError> {
        Ok(self.tables()?.comments.get(&id).cloned())
    }

    async fn list_comments_by_post(&mut self, post_id: i64, page: Page) -> Result<Vec<Comment>, AppError> {
        let tables = self.tables()?;
        let matching = tables
            .comments
            .values()
            .filter(|c| c.post_id == post_id)
            .cloned();
        Ok(window(matching, page))
    }

    async fn list_comments_by_user(&mut self, user_id: i64, page: Page) -> Result<Vec<Comment>, AppError> {
        let tables = self.tables()?;
        let matching = tables
            .comments
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned();
        Ok(window(matching, page))
    }

    async fn update_comment(&mut self, comment: &Comment, patch: CommentUpdate) -> Result<Comment, AppError> {
        let stored = self
            .tables_mut()?
            .comments
            .get_mut(&comment.id)
            .ok_or(AppError::NotFound("Comment not found."))?;
        if let Some(content) = patch.content {
            stored.content = content;
        }
        stored.updated_at = touch(stored.updated_at);
        Ok(stored.clone())
    }

    async fn delete_comment(&mut self, comment: &Comment) -> Result<(), AppError> {
        self.tables_mut()?.comments.remove(&comment.id);
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn commit(&mut self) -> Result<(), AppError> {
        self.ensure_open()?;
        if let Some(staged) = self.staged.take() {
            *self.guard = staged;
        }
        self.committed = true;
        Ok(())
    }
}
