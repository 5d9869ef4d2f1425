use crate::{
    AppState,
    auth::AuthUser,
    error::AppError,
    extract::{ApiForm, ApiJson, ApiPath, ApiQuery},
    models::{
        Comment, CommentCreate, CommentUpdate, Detail, LoginForm, NewUser, Page, Pagination,
        Post, PostCreate, PostUpdate, Role, SignupRequest, TokenResponse, UserChanges, UserRead,
        UserUpdate,
    },
    policy::{self, Actor},
    repository::{CommentStore, PostStore, UserStore},
};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use chrono::Utc;

// --- Lookup Helpers ---

async fn find_post<S>(store: &mut S, id: i64) -> Result<Post, AppError>
where
    S: PostStore + ?Sized,
{
    store
        .get_post(id)
        .await?
        .ok_or(AppError::NotFound("Post not found"))
}

async fn find_comment<S>(store: &mut S, id: i64) -> Result<Comment, AppError>
where
    S: CommentStore + ?Sized,
{
    store
        .get_comment(id)
        .await?
        .ok_or(AppError::NotFound("Comment not found."))
}

// --- Account Handlers ---

/// login
///
/// [Public Route] OAuth2 password flow: `username` is the account email.
/// Unknown email and wrong password produce the same 400 after the same amount of
/// hashing work.
#[utoipa::path(
    post,
    path = "/api/v1/users/login",
    request_body(content = LoginForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Access token", body = TokenResponse),
        (status = 400, description = "Incorrect email or password", body = Detail)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    ApiForm(form): ApiForm<LoginForm>,
) -> Result<Json<TokenResponse>, AppError> {
    let user = {
        let mut uow = state.db.begin().await?;
        uow.get_user_by_email(&form.username).await?
    };

    let verified = match &user {
        Some(user) => state
            .credentials
            .verify_password(&form.password, &user.hashed_password),
        None => state.credentials.reject_unknown_account(&form.password),
    };
    let user = user
        .filter(|_| verified)
        .ok_or_else(|| AppError::bad_request("Incorrect email or password"))?;

    let access_token = state.credentials.issue_token(user.id, Utc::now())?;
    Ok(Json(TokenResponse::bearer(access_token)))
}

/// signup
///
/// [Public Route] Registers a new account. The password is hashed before it reaches
/// the store; a taken email is answered with 400.
#[utoipa::path(
    post,
    path = "/api/v1/users/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Signup Success", body = Detail),
        (status = 400, description = "Email already registered or invalid body", body = Detail)
    )
)]
pub async fn signup(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<SignupRequest>,
) -> Result<(StatusCode, Json<Detail>), AppError> {
    payload.validate()?;
    let hashed_password = state.credentials.hash_password(&payload.password)?;

    let mut uow = state.db.begin().await?;
    let user = uow
        .create_user(NewUser {
            email: payload.email,
            hashed_password,
            role: payload.role.unwrap_or_default(),
        })
        .await?;
    uow.commit().await?;

    tracing::info!(user_id = user.id, role = %user.role, "user registered");
    Ok((StatusCode::CREATED, Json(Detail::new("Signup Success"))))
}

/// get_me
///
/// [Authenticated Route] The caller's own account.
#[utoipa::path(
    get,
    path = "/api/v1/users/me",
    responses(
        (status = 200, description = "Profile", body = UserRead),
        (status = 401, description = "Not authenticated", body = Detail)
    )
)]
pub async fn get_me(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<UserRead>, AppError> {
    let mut uow = state.db.begin().await?;
    let user = auth.load(&mut *uow).await?;
    Ok(Json(user.into()))
}

/// update_me
///
/// [Authenticated Route] Partial profile update. A new password is re-hashed; changing
/// the role requires the caller to already be an admin.
#[utoipa::path(
    put,
    path = "/api/v1/users/me",
    request_body = UserUpdate,
    responses(
        (status = 200, description = "Updated", body = UserRead),
        (status = 400, description = "Email already registered or invalid body", body = Detail),
        (status = 403, description = "Role change not permitted", body = Detail)
    )
)]
pub async fn update_me(
    auth: AuthUser,
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<UserUpdate>,
) -> Result<Json<UserRead>, AppError> {
    payload.validate()?;
    let hashed_password = payload
        .password
        .as_deref()
        .map(|password| state.credentials.hash_password(password))
        .transpose()?;

    let mut uow = state.db.begin().await?;
    let user = auth.load(&mut *uow).await?;

    if let Some(role) = payload.role {
        if role != user.role && user.role != Role::Admin {
            return Err(AppError::Forbidden);
        }
    }

    let updated = uow
        .update_user(
            &user,
            UserChanges {
                email: payload.email,
                hashed_password,
                role: payload.role,
            },
        )
        .await?;
    uow.commit().await?;

    Ok(Json(updated.into()))
}

/// delete_me
///
/// [Authenticated Route] Removes the caller's account, cascading to their posts
/// (with every comment on them) and every comment they wrote.
#[utoipa::path(
    delete,
    path = "/api/v1/users/me",
    responses(
        (status = 204, description = "Deleted"),
        (status = 401, description = "Not authenticated", body = Detail)
    )
)]
pub async fn delete_me(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    let mut uow = state.db.begin().await?;
    let user = auth.load(&mut *uow).await?;
    uow.delete_user(&user).await?;
    uow.commit().await?;

    tracing::info!(user_id = user.id, "account deleted");
    Ok(StatusCode::NO_CONTENT)
}

// --- Post Handlers ---

/// list_posts
///
/// [Public Route] Newest first, paginated with `skip` (default 0) and `limit` (1..=100, default 10).
#[utoipa::path(
    get,
    path = "/api/v1/posts",
    params(Pagination),
    responses(
        (status = 200, description = "Posts", body = [Post]),
        (status = 400, description = "Invalid pagination", body = Detail)
    )
)]
pub async fn list_posts(
    State(state): State<AppState>,
    ApiQuery(pagination): ApiQuery<Pagination>,
) -> Result<Json<Vec<Post>>, AppError> {
    let page = Page::try_from(pagination)?;
    let mut uow = state.db.begin().await?;
    Ok(Json(uow.list_posts(page).await?))
}

/// get_post
///
/// [Public Route] A single post; 404 if absent.
#[utoipa::path(
    get,
    path = "/api/v1/posts/{post_id}",
    params(("post_id" = i64, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Found", body = Post),
        (status = 404, description = "Post not found", body = Detail)
    )
)]
pub async fn get_post(
    State(state): State<AppState>,
    ApiPath(post_id): ApiPath<i64>,
) -> Result<Json<Post>, AppError> {
    let mut uow = state.db.begin().await?;
    Ok(Json(find_post(&mut *uow, post_id).await?))
}

/// create_post
///
/// [Authenticated Route] The caller becomes the post's permanent owner.
#[utoipa::path(
    post,
    path = "/api/v1/posts",
    request_body = PostCreate,
    responses(
        (status = 201, description = "Created", body = Post),
        (status = 401, description = "Not authenticated", body = Detail)
    )
)]
pub async fn create_post(
    auth: AuthUser,
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<PostCreate>,
) -> Result<(StatusCode, Json<Post>), AppError> {
    payload.validate()?;

    let mut uow = state.db.begin().await?;
    let user = auth.load(&mut *uow).await?;
    let post = uow
        .create_post(user.id, &payload.title, &payload.content)
        .await?;
    uow.commit().await?;

    tracing::info!(post_id = post.id, user_id = user.id, "post created");
    Ok((StatusCode::CREATED, Json(post)))
}

/// update_post
///
/// [Authenticated Route] Owner-or-admin partial update.
#[utoipa::path(
    put,
    path = "/api/v1/posts/{post_id}",
    params(("post_id" = i64, Path, description = "Post ID")),
    request_body = PostUpdate,
    responses(
        (status = 200, description = "Updated", body = Post),
        (status = 403, description = "Not owner or admin", body = Detail),
        (status = 404, description = "Post not found", body = Detail)
    )
)]
pub async fn update_post(
    auth: AuthUser,
    State(state): State<AppState>,
    ApiPath(post_id): ApiPath<i64>,
    ApiJson(payload): ApiJson<PostUpdate>,
) -> Result<Json<Post>, AppError> {
    payload.validate()?;

    let mut uow = state.db.begin().await?;
    let user = auth.load(&mut *uow).await?;
    let post = find_post(&mut *uow, post_id).await?;
    policy::authorize_mutation(&Actor::from(&user), post.user_id)?;

    let updated = uow.update_post(&post, payload).await?;
    uow.commit().await?;
    Ok(Json(updated))
}

/// delete_post
///
/// [Authenticated Route] Owner-or-admin delete; the post's comments go with it.
#[utoipa::path(
    delete,
    path = "/api/v1/posts/{post_id}",
    params(("post_id" = i64, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Post deleted.", body = Detail),
        (status = 403, description = "Not owner or admin", body = Detail),
        (status = 404, description = "Post not found", body = Detail)
    )
)]
pub async fn delete_post(
    auth: AuthUser,
    State(state): State<AppState>,
    ApiPath(post_id): ApiPath<i64>,
) -> Result<Json<Detail>, AppError> {
    let mut uow = state.db.begin().await?;
    let user = auth.load(&mut *uow).await?;
    let post = find_post(&mut *uow, post_id).await?;
    policy::authorize_mutation(&Actor::from(&user), post.user_id)?;

    uow.delete_post(&post).await?;
    uow.commit().await?;

    tracing::info!(post_id, user_id = user.id, "post deleted");
    Ok(Json(Detail::new("Post deleted.")))
}

// --- Comment Handlers ---

/// list_comments
///
/// [Public Route] Oldest first, paginated like posts. 404 if the post does not exist.
#[utoipa::path(
    get,
    path = "/api/v1/posts/{post_id}/comments",
    params(("post_id" = i64, Path, description = "Post ID"), Pagination),
    responses(
        (status = 200, description = "Comments", body = [Comment]),
        (status = 404, description = "Post not found", body = Detail)
    )
)]
pub async fn list_comments(
    State(state): State<AppState>,
    ApiPath(post_id): ApiPath<i64>,
    ApiQuery(pagination): ApiQuery<Pagination>,
) -> Result<Json<Vec<Comment>>, AppError> {
    let page = Page::try_from(pagination)?;
    let mut uow = state.db.begin().await?;
    find_post(&mut *uow, post_id).await?;
    Ok(Json(uow.list_comments_by_post(post_id, page).await?))
}

/// get_comment
///
/// [Public Route] A single comment, which must belong to the post in the path.
#[utoipa::path(
    get,
    path = "/api/v1/posts/{post_id}/comments/{comment_id}",
    params(
        ("post_id" = i64, Path, description = "Post ID"),
        ("comment_id" = i64, Path, description = "Comment ID")
    ),
    responses(
        (status = 200, description = "Found", body = Comment),
        (status = 400, description = "Wrong Access", body = Detail),
        (status = 404, description = "Comment not found", body = Detail)
    )
)]
pub async fn get_comment(
    State(state): State<AppState>,
    ApiPath((post_id, comment_id)): ApiPath<(i64, i64)>,
) -> Result<Json<Comment>, AppError> {
    let mut uow = state.db.begin().await?;
    let comment = find_comment(&mut *uow, comment_id).await?;
    policy::ensure_comment_in_post(&comment, post_id)?;
    Ok(Json(comment))
}

/// create_comment
///
/// [Authenticated Route] Attaches a comment to an existing post.
#[utoipa::path(
    post,
    path = "/api/v1/posts/{post_id}/comments",
    params(("post_id" = i64, Path, description = "Post ID")),
    request_body = CommentCreate,
    responses(
        (status = 201, description = "Created", body = Comment),
        (status = 404, description = "Post not found", body = Detail)
    )
)]
pub async fn create_comment(
    auth: AuthUser,
    State(state): State<AppState>,
    ApiPath(post_id): ApiPath<i64>,
    ApiJson(payload): ApiJson<CommentCreate>,
) -> Result<(StatusCode, Json<Comment>), AppError> {
    let mut uow = state.db.begin().await?;
    let user = auth.load(&mut *uow).await?;
    find_post(&mut *uow, post_id).await?;

    let comment = uow
        .create_comment(user.id, post_id, &payload.content)
        .await?;
    uow.commit().await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// update_comment
///
/// [Authenticated Route] Owner-or-admin update. The post check runs before the
/// ownership check, so a mismatched path is 400 for everyone.
#[utoipa::path(
    put,
    path = "/api/v1/posts/{post_id}/comments/{comment_id}",
    params(
        ("post_id" = i64, Path, description = "Post ID"),
        ("comment_id" = i64, Path, description = "Comment ID")
    ),
    request_body = CommentUpdate,
    responses(
        (status = 200, description = "Updated", body = Comment),
        (status = 400, description = "Wrong Access", body = Detail),
        (status = 403, description = "Not author or admin", body = Detail),
        (status = 404, description = "Comment not found", body = Detail)
    )
)]
pub async fn update_comment(
    auth: AuthUser,
    State(state): State<AppState>,
    ApiPath((post_id, comment_id)): ApiPath<(i64, i64)>,
    ApiJson(payload): ApiJson<CommentUpdate>,
) -> Result<Json<Comment>, AppError> {
    let mut uow = state.db.begin().await?;
    let user = auth.load(&mut *uow).await?;
    let comment = find_comment(&mut *uow, comment_id).await?;
    policy::ensure_comment_in_post(&comment, post_id)?;
    policy::authorize_mutation(&Actor::from(&user), comment.user_id)?;

    let updated = uow.update_comment(&comment, payload).await?;
    uow.commit().await?;
    Ok(Json(updated))
}

/// delete_comment
///
/// [Authenticated Route] Owner-or-admin delete, with the same post check as updates.
#[utoipa::path(
    delete,
    path = "/api/v1/posts/{post_id}/comments/{comment_id}",
    params(
        ("post_id" = i64, Path, description = "Post ID"),
        ("comment_id" = i64, Path, description = "Comment ID")
    ),
    responses(
        (status = 204, description = "Deleted"),
        (status = 400, description = "Wrong Access", body = Detail),
        (status = 403, description = "Not author or admin", body = Detail),
        (status = 404, description = "Comment not found", body = Detail)
    )
)]
pub async fn delete_comment(
    auth: AuthUser,
    State(state): State<AppState>,
    ApiPath((post_id, comment_id)): ApiPath<(i64, i64)>,
) -> Result<StatusCode, AppError> {
    let mut uow = state.db.begin().await?;
    let user = auth.load(&mut *uow).await?;
    let comment = find_comment(&mut *uow, comment_id).await?;
    policy::ensure_comment_in_post(&comment, post_id)?;
    policy::authorize_mutation(&Actor::from(&user), comment.user_id)?;

    uow.delete_comment(&comment).await?;
    uow.commit().await?;
    Ok(StatusCode::NO_CONTENT)
}
