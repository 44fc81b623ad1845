use crate::models::{NewPost, NewUser, Post, User};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RepoError {
    /// A unique key (the user's email) is already taken.
    #[error("record already exists")]
    Duplicate,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Repository Trait
///
/// The external document store as seen by the handlers: plain create and read operations
/// on users and posts. Handlers never know whether Postgres or the in-memory store sits
/// behind it.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    // Fails with `RepoError::Duplicate` when the email is already registered.
    async fn create_user(&self, user: NewUser) -> Result<User, RepoError>;
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, RepoError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepoError>;

    // --- Posts ---
    async fn create_post(&self, post: NewPost) -> Result<Post, RepoError>;
    // All posts, newest first.
    async fn get_feed(&self) -> Result<Vec<Post>, RepoError>;
    async fn get_user_posts(&self, user_id: Uuid) -> Result<Vec<Post>, RepoError>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

const USER_COLUMNS: &str = "id, first_name, last_name, email, password_hash, picture_path, location, occupation, created_at";
const POST_COLUMNS: &str = "id, user_id, first_name, last_name, location, description, picture_path, user_picture_path, created_at";

/// PostgresRepository
///
/// `Repository` backed by PostgreSQL. The schema lives in `migrations/` and is applied by
/// `migrate` at startup.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    /// create_user
    ///
    /// Inserts the user; the unique index on `email` turns a second registration of the
    /// same address into `RepoError::Duplicate`.
    async fn create_user(&self, user: NewUser) -> Result<User, RepoError> {
        let sql = format!(
            "INSERT INTO users (id, first_name, last_name, email, password_hash, picture_path, location, occupation, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW()) RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(Uuid::new_v4())
            .bind(user.first_name)
            .bind(user.last_name)
            .bind(user.email)
            .bind(user.password_hash)
            .bind(user.picture_path)
            .bind(user.location)
            .bind(user.occupation)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => RepoError::Duplicate,
                other => RepoError::Database(other),
            })
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, RepoError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepoError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_post(&self, post: NewPost) -> Result<Post, RepoError> {
        let sql = format!(
            "INSERT INTO posts (id, user_id, first_name, last_name, location, description, picture_path, user_picture_path, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW()) RETURNING {POST_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Post>(&sql)
            .bind(Uuid::new_v4())
            .bind(post.user_id)
            .bind(post.first_name)
            .bind(post.last_name)
            .bind(post.location)
            .bind(post.description)
            .bind(post.picture_path)
            .bind(post.user_picture_path)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn get_feed(&self) -> Result<Vec<Post>, RepoError> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts ORDER BY created_at DESC");
        Ok(sqlx::query_as::<_, Post>(&sql).fetch_all(&self.pool).await?)
    }

    async fn get_user_posts(&self, user_id: Uuid) -> Result<Vec<Post>, RepoError> {
        let sql = format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE user_id = $1 ORDER BY created_at DESC"
        );
        Ok(sqlx::query_as::<_, Post>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?)
    }
}

/// InMemoryRepository
///
/// `Repository` kept in process memory. Used when no `DATABASE_URL` is configured in local
/// mode, and by the test suite.
#[derive(Default)]
pub struct InMemoryRepository {
    users: RwLock<Vec<User>>,
    posts: RwLock<Vec<Post>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a fully formed user, keeping its id. Test seeding only; skips the
    /// duplicate-email check.
    pub fn insert_user(&self, user: User) {
        self.users
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(user);
    }

    pub fn post_count(&self) -> usize {
        self.posts.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn create_user(&self, user: NewUser) -> Result<User, RepoError> {
        let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);
        if users.iter().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(RepoError::Duplicate);
        }

        let created = User {
            id: Uuid::new_v4(),
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            password_hash: user.password_hash,
            picture_path: user.picture_path,
            location: user.location,
            occupation: user.occupation,
            created_at: Utc::now(),
        };
        users.push(created.clone());
        Ok(created)
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, RepoError> {
        let users = self.users.read().unwrap_or_else(PoisonError::into_inner);
        Ok(users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepoError> {
        let users = self.users.read().unwrap_or_else(PoisonError::into_inner);
        Ok(users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn create_post(&self, post: NewPost) -> Result<Post, RepoError> {
        let created = Post {
            id: Uuid::new_v4(),
            user_id: post.user_id,
            first_name: post.first_name,
            last_name: post.last_name,
            location: post.location,
            description: post.description,
            picture_path: post.picture_path,
            user_picture_path: post.user_picture_path,
            created_at: Utc::now(),
        };
        self.posts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(created.clone());
        Ok(created)
    }

    async fn get_feed(&self) -> Result<Vec<Post>, RepoError> {
        let posts = self.posts.read().unwrap_or_else(PoisonError::into_inner);
        // Insertion order is creation order; newest first.
        Ok(posts.iter().rev().cloned().collect())
    }

    async fn get_user_posts(&self, user_id: Uuid) -> Result<Vec<Post>, RepoError> {
        let posts = self.posts.read().unwrap_or_else(PoisonError::into_inner);
        Ok(posts
            .iter()
            .rev()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect())
    }
}
