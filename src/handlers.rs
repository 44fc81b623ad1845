use crate::{
    AppState,
    auth::{self, AuthError},
    error::ApiError,
    models::{
        CreatePostRequest, CreatedPost, CreatedUser, LoginRequest, LoginResponse, NewPost,
        NewUser, Post, RegisterUserRequest, UserProfile,
    },
    pipeline::PipelineContext,
    repository::RepositoryState,
};
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use uuid::Uuid;

// --- Helpers ---

/// Reads the text fields collected by ingestion into a typed payload.
fn form_payload<T: DeserializeOwned>(fields: &HashMap<String, String>) -> Result<T, ApiError> {
    let value = serde_json::to_value(fields).map_err(|e| ApiError::Internal(e.to_string()))?;
    serde_json::from_value(value).map_err(|_| ApiError::Validation("missing_fields"))
}

/// Runs a CPU-heavy password operation off the async workers.
async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, auth::PasswordError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(|e| ApiError::Internal(e.to_string()))
}

// --- Handlers ---

/// register_user
///
/// [Upload Route, ingest only] Creates a user from the multipart form. The `picture` part,
/// if present, has already been committed by the pipeline; its stored name becomes the
/// user's `picturePath`.
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body(content = RegisterUserRequest, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Registered", body = CreatedUser),
        (status = 400, description = "Invalid form"),
        (status = 409, description = "Email already registered"),
        (status = 413, description = "Body over the configured ceiling")
    )
)]
pub async fn register_user(
    State(state): State<AppState>,
    Extension(ctx): Extension<PipelineContext>,
) -> Result<(StatusCode, Json<CreatedUser>), ApiError> {
    let payload: RegisterUserRequest = form_payload(&ctx.fields)?;
    payload.validate().map_err(ApiError::Validation)?;

    let password = payload.password;
    let password_hash = blocking(move || auth::hash_password(&password)).await?;

    let user = state
        .repo
        .create_user(NewUser {
            first_name: payload.first_name.trim().to_string(),
            last_name: payload.last_name.trim().to_string(),
            email: payload.email.trim().to_string(),
            password_hash,
            picture_path: ctx.attachment.as_ref().map(|a| a.name.clone()),
            location: payload.location,
            occupation: payload.occupation,
        })
        .await?;

    tracing::info!(user_id = %user.id, picture = ?user.picture_path, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(CreatedUser {
            user: user.into(),
            attachment: ctx.attachment,
        }),
    ))
}

/// login
///
/// [Public Route] Exchanges email and password for a bearer credential. Unknown email and
/// wrong password produce the same response.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let user = state
        .repo
        .find_user_by_email(payload.email.trim())
        .await?
        .ok_or(ApiError::InvalidCredentials)?;

    let password = payload.password;
    let hash = user.password_hash.clone();
    if !blocking(move || auth::verify_password(&password, &hash)).await? {
        return Err(ApiError::InvalidCredentials);
    }

    let token = state
        .issuer
        .issue(user.id)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(LoginResponse {
        token,
        user: user.into(),
    }))
}

/// get_user
///
/// [Authenticated Route] Profile of any user by id.
#[utoipa::path(
    get,
    path = "/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Found", body = UserProfile),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_user(
    State(repo): State<RepositoryState>,
    Path(id): Path<Uuid>,
) -> Result<Json<UserProfile>, ApiError> {
    let user = repo
        .get_user(id)
        .await?
        .ok_or(ApiError::NotFound("user_not_found"))?;
    Ok(Json(user.into()))
}

/// create_post
///
/// [Upload Route, verify then ingest] Creates a post owned by the verified subject. The
/// author's name, location and picture are copied onto the post.
#[utoipa::path(
    post,
    path = "/posts",
    request_body(content = CreatePostRequest, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Created", body = CreatedPost),
        (status = 401, description = "Missing credential"),
        (status = 403, description = "Malformed, invalid or expired credential"),
        (status = 404, description = "Credential subject has no user record"),
        (status = 413, description = "Body over the configured ceiling")
    )
)]
pub async fn create_post(
    State(state): State<AppState>,
    Extension(ctx): Extension<PipelineContext>,
) -> Result<(StatusCode, Json<CreatedPost>), ApiError> {
    // Only reachable through a pipeline with a verify stage.
    let subject = ctx
        .subject
        .as_ref()
        .ok_or(AuthError::MissingCredential)?
        .subject;

    let payload: CreatePostRequest = form_payload(&ctx.fields)?;

    let author = state
        .repo
        .get_user(subject)
        .await?
        .ok_or(ApiError::NotFound("unknown_subject"))?;

    let post = state
        .repo
        .create_post(NewPost {
            user_id: author.id,
            first_name: author.first_name,
            last_name: author.last_name,
            location: author.location,
            description: payload.description,
            picture_path: ctx.attachment.as_ref().map(|a| a.name.clone()),
            user_picture_path: author.picture_path,
        })
        .await?;

    tracing::info!(post_id = %post.id, owner = %post.user_id, "post created");

    Ok((
        StatusCode::CREATED,
        Json(CreatedPost {
            post,
            attachment: ctx.attachment,
        }),
    ))
}

/// get_feed
///
/// [Authenticated Route] Every post, newest first.
#[utoipa::path(
    get,
    path = "/posts",
    responses((status = 200, description = "Feed", body = [Post]))
)]
pub async fn get_feed(State(repo): State<RepositoryState>) -> Result<Json<Vec<Post>>, ApiError> {
    Ok(Json(repo.get_feed().await?))
}

/// get_user_posts
///
/// [Authenticated Route] Posts of a single user, newest first.
#[utoipa::path(
    get,
    path = "/posts/{user_id}/posts",
    params(("user_id" = Uuid, Path, description = "Author ID")),
    responses((status = 200, description = "User posts", body = [Post]))
)]
pub async fn get_user_posts(
    State(repo): State<RepositoryState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<Post>>, ApiError> {
    Ok(Json(repo.get_user_posts(user_id).await?))
}
