#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, Response, header},
};
use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use sociopedia::{
    AppConfig, AppState, InMemoryRepository, LocalDiskStorage,
    auth::{Claims, hash_password},
    config::StorageBackend,
    models::User,
    storage::StorageState,
};
use std::{path::PathBuf, sync::Arc};
use tempfile::TempDir;
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str = "test-secret-value-1234567890";
pub const BOUNDARY: &str = "sociopedia-test-boundary";
pub const SUBJECT_42: Uuid = Uuid::from_u128(42);

/// Signs a credential for `subject` issued now and expiring `exp_offset` seconds from now
/// (negative for an already expired credential).
pub fn create_token(subject: Uuid, exp_offset: i64) -> String {
    create_token_with_secret(subject, exp_offset, TEST_JWT_SECRET)
}

pub fn create_token_with_secret(subject: Uuid, exp_offset: i64, secret: &str) -> String {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: subject,
        iat: now as usize,
        exp: (now + exp_offset) as usize,
    };
    let key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::default(), &claims, &key).unwrap()
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

/// One file part of a multipart body.
pub struct FilePart<'a> {
    pub field: &'a str,
    pub filename: &'a str,
    pub content_type: &'a str,
    pub bytes: &'a [u8],
}

/// Builds a multipart/form-data body; returns the content type header and the bytes.
pub fn multipart_body(fields: &[(&str, &str)], files: &[FilePart<'_>]) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    for file in files {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                file.field, file.filename, file.content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(file.bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    (format!("multipart/form-data; boundary={BOUNDARY}"), body)
}

pub fn picture<'a>(filename: &'a str, bytes: &'a [u8]) -> FilePart<'a> {
    FilePart {
        field: "picture",
        filename,
        content_type: "image/png",
        bytes,
    }
}

pub fn registration_fields(email: &str) -> Vec<(&'static str, String)> {
    vec![
        ("firstName", "Ada".to_string()),
        ("lastName", "Lovelace".to_string()),
        ("email", email.to_string()),
        ("password", "analytical".to_string()),
        ("location", "London".to_string()),
        ("occupation", "Mathematician".to_string()),
    ]
}

pub fn multipart_request(
    uri: &str,
    authorization: Option<&str>,
    fields: &[(&str, &str)],
    files: &[FilePart<'_>],
) -> Request<Body> {
    let (content_type, body) = multipart_body(fields, files);
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, content_type);
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    builder.body(Body::from(body)).unwrap()
}

pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// A user record with a known id, for seeding the in-memory store.
pub fn seeded_user(id: Uuid, email: &str) -> User {
    User {
        id,
        first_name: "Grace".to_string(),
        last_name: "Hopper".to_string(),
        email: email.to_string(),
        password_hash: hash_password("cobol-rules").unwrap(),
        picture_path: Some("grace.png".to_string()),
        location: Some("Arlington".to_string()),
        occupation: Some("Rear Admiral".to_string()),
        created_at: Utc::now(),
    }
}

/// Application state over a temporary disk store and the in-memory repository.
pub struct Harness {
    pub state: AppState,
    pub repo: Arc<InMemoryRepository>,
    pub storage: Arc<LocalDiskStorage>,
    pub dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let assets = dir.path().join("assets");

        let mut config = AppConfig::default();
        config.jwt_secret = TEST_JWT_SECRET.to_string();
        config.staging_root = dir.path().join("staging");
        config.storage = StorageBackend::Disk {
            root: assets.clone(),
        };
        adjust(&mut config);

        let repo = Arc::new(InMemoryRepository::new());
        let storage = Arc::new(LocalDiskStorage::new(assets));
        let state = AppState::new(config, repo.clone(), storage.clone() as StorageState);

        Self {
            state,
            repo,
            storage,
            dir,
        }
    }

    pub fn router(&self) -> axum::Router {
        sociopedia::create_router(self.state.clone())
    }

    pub fn staging_root(&self) -> PathBuf {
        self.state.config.staging_root.clone()
    }

    /// Number of files left in the staging area (zero when the directory was never created).
    pub fn staged_files(&self) -> usize {
        std::fs::read_dir(self.staging_root())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    /// Number of files committed to the disk store.
    pub fn stored_files(&self) -> usize {
        std::fs::read_dir(self.storage.root())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    pub fn seed_user(&self, id: Uuid) -> User {
        let user = seeded_user(id, &format!("user-{id}@example.com"));
        self.repo.insert_user(user.clone());
        user
    }
}

/// Borrows owned form fields as the `(&str, &str)` pairs `multipart_body` takes.
pub fn refs<'a>(fields: &'a [(&'static str, String)]) -> Vec<(&'a str, &'a str)> {
    fields.iter().map(|(k, v)| (*k, v.as_str())).collect()
}
