use std::{
    env,
    path::{Component, Path, PathBuf},
    time::Duration,
};

use thiserror::Error;

/// Default ceiling for an accepted request body (30 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 30 * 1024 * 1024;

/// AppConfig
///
/// Holds the application's entire configuration state. Loaded once at startup and then
/// shared read-only through `AppState`, so the verifier, the ingestor and the handlers all
/// see the same signing secret, body ceiling and storage root.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Runtime environment marker. Controls log format and which variables are mandatory.
    pub env: Env,
    // Postgres connection string. `None` runs against the in-memory store (local only).
    pub db_url: Option<String>,
    // Secret used to sign and verify bearer credentials (HS256).
    pub jwt_secret: String,
    // Lifetime of credentials issued by `/auth/login`.
    pub token_ttl: Duration,
    // Ceiling on any accepted request body, attachment included.
    pub max_upload_bytes: usize,
    // Upper bound on how long one ingestion may hold resources.
    pub ingest_timeout: Duration,
    // Where half-written attachments live until the pipeline commits them.
    // Never inside the disk root; `validate` rejects that.
    pub staging_root: PathBuf,
    pub storage: StorageBackend,
    pub port: u16,
}

/// Env
///
/// Defines the runtime context: pretty logs and relaxed defaults locally,
/// JSON logs and mandatory secrets in production.
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

/// Durable store selection for committed attachments.
#[derive(Clone, Debug, PartialEq)]
pub enum StorageBackend {
    /// Files under `root`, served back under `/assets`.
    Disk { root: PathBuf },
    /// S3-compatible object storage (MinIO, Supabase, AWS).
    S3 {
        endpoint: String,
        region: String,
        access_key: String,
        secret_key: String,
        bucket: String,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set in production")]
    MissingInProduction(&'static str),
    #[error("{0} must be set when STORAGE_BACKEND=s3")]
    MissingS3(&'static str),
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

impl Default for AppConfig {
    /// default
    ///
    /// Safe, non-panicking configuration for test scaffolding: local env, in-memory store,
    /// disk storage under `public/assets`.
    fn default() -> Self {
        Self {
            env: Env::Local,
            db_url: None,
            jwt_secret: "super-secure-test-secret-value-local".to_string(),
            token_ttl: Duration::from_secs(86_400),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            ingest_timeout: Duration::from_secs(60),
            staging_root: PathBuf::from("public/.staging"),
            storage: StorageBackend::Disk {
                root: PathBuf::from("public/assets"),
            },
            port: 6001,
        }
    }
}

impl AppConfig {
    /// try_load
    ///
    /// Reads every parameter from the environment. Production requires `JWT_SECRET` and
    /// `DATABASE_URL`; local mode falls back to development defaults for both.
    pub fn try_load() -> Result<Self, ConfigError> {
        let env = match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        };
        let defaults = Self::default();

        let jwt_secret = match (env::var("JWT_SECRET"), &env) {
            (Ok(secret), _) => secret,
            (Err(_), Env::Production) => return Err(ConfigError::MissingInProduction("JWT_SECRET")),
            (Err(_), Env::Local) => defaults.jwt_secret,
        };

        let db_url = match (env::var("DATABASE_URL"), &env) {
            (Ok(url), _) => Some(url),
            (Err(_), Env::Production) => {
                return Err(ConfigError::MissingInProduction("DATABASE_URL"));
            }
            (Err(_), Env::Local) => None,
        };

        let storage = match env::var("STORAGE_BACKEND").as_deref() {
            Ok("s3") => StorageBackend::S3 {
                endpoint: required_s3("S3_ENDPOINT")?,
                region: env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
                access_key: required_s3("S3_ACCESS_KEY")?,
                secret_key: required_s3("S3_SECRET_KEY")?,
                bucket: env::var("S3_BUCKET_NAME").unwrap_or_else(|_| "sociopedia".to_string()),
            },
            Ok("disk") | Err(_) => StorageBackend::Disk {
                root: env::var("UPLOAD_ROOT")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("public/assets")),
            },
            Ok(other) => {
                return Err(ConfigError::Invalid {
                    name: "STORAGE_BACKEND",
                    value: other.to_string(),
                });
            }
        };

        let config = Self {
            env,
            db_url,
            jwt_secret,
            token_ttl: Duration::from_secs(parsed("TOKEN_TTL_SECS", 86_400)?),
            max_upload_bytes: parsed("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            ingest_timeout: Duration::from_secs(parsed("INGEST_TIMEOUT_SECS", 60)?),
            staging_root: env::var("STAGING_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.staging_root),
            storage,
            port: parsed("PORT", defaults.port)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// validate
    ///
    /// Rejects a staging root that is, or sits under, the served disk root. Staged files
    /// would otherwise be reachable under `/assets` before they are committed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let StorageBackend::Disk { root } = &self.storage {
            if without_cur_dir(&self.staging_root).starts_with(without_cur_dir(root)) {
                return Err(ConfigError::Invalid {
                    name: "STAGING_ROOT",
                    value: self.staging_root.display().to_string(),
                });
            }
        }
        Ok(())
    }

    /// load
    ///
    /// Fail-fast wrapper around `try_load` used by `main`.
    ///
    /// # Panics
    /// Panics if a variable required for the current environment is missing or unparsable,
    /// so the server never starts with an incomplete or insecure configuration.
    pub fn load() -> Self {
        match Self::try_load() {
            Ok(config) => config,
            Err(e) => panic!("FATAL: {e}"),
        }
    }
}

fn without_cur_dir(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

fn required_s3(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::MissingS3(name))
}

fn parsed<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}
