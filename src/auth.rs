use std::time::Duration;

use argon2::{
    Argon2, PasswordHash,
    password_hash::{PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::http::HeaderValue;
use chrono::{DateTime, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Claims
///
/// The payload carried inside every bearer credential. A well-formed credential decodes to
/// exactly one subject and one issuance timestamp; there is no server-side revocation list,
/// so `exp` is the only thing that retires a credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the id of the user the credential was issued to.
    pub sub: Uuid,
    /// Expiration Time (exp), seconds since the epoch.
    pub exp: usize,
    /// Issued At (iat), seconds since the epoch.
    pub iat: usize,
}

/// SubjectIdentity
///
/// The resolved identity of an authenticated request. Produced fresh by the verifier for
/// every request and dropped with it; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectIdentity {
    pub subject: Uuid,
    pub issued_at: DateTime<Utc>,
}

/// Why a request failed credential verification.
///
/// Missing and malformed credentials are reported separately to help client diagnosis;
/// nothing about the signature check itself ever reaches the response.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("no bearer credential supplied")]
    MissingCredential,
    #[error("credential is not a decodable bearer token")]
    MalformedCredential,
    #[error("credential signature is invalid or the credential has expired")]
    InvalidSignatureOrExpired,
}

impl AuthError {
    /// Short machine-readable reason used in error responses.
    pub fn reason(self) -> &'static str {
        match self {
            AuthError::MissingCredential => "missing_credential",
            AuthError::MalformedCredential => "malformed_credential",
            AuthError::InvalidSignatureOrExpired => "invalid_credential",
        }
    }
}

/// CredentialVerifier
///
/// Stateless HS256 verification of `Authorization: Bearer <token>` headers. Verification is a
/// pure computation: no I/O, no retries, and any failure is terminal for the request.
pub struct CredentialVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl CredentialVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// verify
    ///
    /// Resolves the raw `Authorization` header value to a subject identity.
    /// `None` means the header was absent, which is reported differently from a header
    /// that is present but unusable.
    pub fn verify(&self, header: Option<&HeaderValue>) -> Result<SubjectIdentity, AuthError> {
        let raw = header.ok_or(AuthError::MissingCredential)?;
        let raw = raw.to_str().map_err(|_| AuthError::MalformedCredential)?;

        let token = raw
            .strip_prefix("Bearer ")
            .or_else(|| raw.strip_prefix("bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MalformedCredential)?;

        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            tracing::debug!(kind = ?e.kind(), "credential rejected");
            classify(e.kind())
        })?;

        let issued_at = i64::try_from(data.claims.iat)
            .ok()
            .and_then(|iat| DateTime::from_timestamp(iat, 0))
            .ok_or(AuthError::MalformedCredential)?;

        Ok(SubjectIdentity {
            subject: data.claims.sub,
            issued_at,
        })
    }
}

fn classify(kind: &ErrorKind) -> AuthError {
    match kind {
        ErrorKind::InvalidToken
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_) => AuthError::MalformedCredential,
        _ => AuthError::InvalidSignatureOrExpired,
    }
}

/// TokenIssuer
///
/// Signs credentials for `/auth/login` with the same secret the verifier checks against.
pub struct TokenIssuer {
    key: EncodingKey,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            key: EncodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn issue(&self, subject: Uuid) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now().timestamp().max(0) as usize;
        let claims = Claims {
            sub: subject,
            iat: now,
            exp: now + self.ttl.as_secs() as usize,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.key)
    }
}

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("failed to hash password: {0}")]
    Hash(String),
    #[error("stored password hash is not a valid PHC string")]
    InvalidHash,
}

/// Hashes a password with Argon2id and a random salt, returning the PHC string.
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::Hash(e.to_string()))
}

/// Checks a password against a stored PHC string. A mismatch is `Ok(false)`.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(hash).map_err(|_| PasswordError::InvalidHash)?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}
