use std::{collections::HashMap, path::PathBuf, time::Duration};

use axum::{
    Form,
    body::Body,
    extract::{FromRequest, Multipart, Request, multipart::MultipartError},
    http::{StatusCode, header, request::Parts},
};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use serde_json::Value;
use thiserror::Error;

use crate::storage::{StagedFile, StorageError, derive_stored_name};

/// Why attachment ingestion stopped the pipeline.
///
/// Every variant is terminal for the request. None of them leaves bytes reachable
/// under a stored name.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("request body exceeds the {limit} byte ceiling")]
    PayloadTooLarge { limit: usize },
    #[error("attachment could not be written to durable storage")]
    StorageWriteFailed(#[source] StorageError),
    #[error("more than one `{field}` part in a single request")]
    DuplicateAttachment { field: String },
    #[error("declared attachment filename is missing or unusable")]
    InvalidFilename,
    #[error("request body stream failed before completion")]
    StreamFailed,
    #[error("request body is not well-formed")]
    MalformedBody,
    #[error("unsupported request body content type")]
    UnsupportedBody,
    #[error("ingestion exceeded {0:?}")]
    TimedOut(Duration),
}

impl IngestError {
    pub fn status(&self) -> StatusCode {
        match self {
            IngestError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            IngestError::StorageWriteFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            IngestError::UnsupportedBody => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            IngestError::TimedOut(_) => StatusCode::REQUEST_TIMEOUT,
            IngestError::DuplicateAttachment { .. }
            | IngestError::InvalidFilename
            | IngestError::StreamFailed
            | IngestError::MalformedBody => StatusCode::BAD_REQUEST,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            IngestError::PayloadTooLarge { .. } => "payload_too_large",
            IngestError::StorageWriteFailed(_) => "storage_write_failed",
            IngestError::DuplicateAttachment { .. } => "duplicate_attachment",
            IngestError::InvalidFilename => "invalid_filename",
            IngestError::StreamFailed => "attachment_stream_failed",
            IngestError::MalformedBody => "malformed_body",
            IngestError::UnsupportedBody => "unsupported_body",
            IngestError::TimedOut(_) => "ingestion_timed_out",
        }
    }
}

impl From<StorageError> for IngestError {
    fn from(e: StorageError) -> Self {
        IngestError::StorageWriteFailed(e)
    }
}

impl From<std::io::Error> for IngestError {
    fn from(e: std::io::Error) -> Self {
        IngestError::StorageWriteFailed(StorageError::Io(e))
    }
}

/// An attachment whose bytes sit in the staging area, waiting for the pipeline to commit
/// them under `stored_name`.
pub struct StagedAttachment {
    pub file: StagedFile,
    pub stored_name: String,
    pub content_type: String,
}

/// Everything ingestion pulled out of a request body.
#[derive(Default)]
pub struct Ingested {
    pub fields: HashMap<String, String>,
    pub attachment: Option<StagedAttachment>,
}

/// AttachmentIngestor
///
/// Reads a request body into text fields plus at most one attachment. Multipart bodies may
/// carry the attachment; JSON and url-encoded bodies only carry fields. The whole read is
/// bounded by a byte ceiling and a timeout.
pub struct AttachmentIngestor {
    staging_root: PathBuf,
    max_bytes: usize,
    timeout: Duration,
}

impl AttachmentIngestor {
    pub fn new(staging_root: impl Into<PathBuf>, max_bytes: usize, timeout: Duration) -> Self {
        Self {
            staging_root: staging_root.into(),
            max_bytes,
            timeout,
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// ingest
    ///
    /// Consumes `body`. `parts` supplies the content type and any body limit installed by the
    /// router. `field` names the only part that is treated as the attachment.
    pub async fn ingest(&self, parts: &Parts, body: Body, field: &str) -> Result<Ingested, IngestError> {
        let content_type = parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let work = async {
            if content_type.starts_with("multipart/form-data") {
                self.read_multipart(parts, body, field).await
            } else if content_type.starts_with("application/json") {
                self.read_json(body).await
            } else if content_type.starts_with("application/x-www-form-urlencoded") {
                self.read_form(parts, body).await
            } else if content_type.is_empty() {
                // Only an empty body is acceptable without a content type.
                let bytes = self.read_limited(body).await?;
                if bytes.is_empty() {
                    Ok(Ingested::default())
                } else {
                    Err(IngestError::UnsupportedBody)
                }
            } else {
                Err(IngestError::UnsupportedBody)
            }
        };

        // A timeout drops `work`, and with it any staged file.
        tokio::time::timeout(self.timeout, work)
            .await
            .map_err(|_| IngestError::TimedOut(self.timeout))?
    }

    async fn read_multipart(&self, parts: &Parts, body: Body, field: &str) -> Result<Ingested, IngestError> {
        let request = Request::from_parts(parts.clone(), body);
        let mut multipart = Multipart::from_request(request, &())
            .await
            .map_err(|_| IngestError::MalformedBody)?;

        let mut ingested = Ingested::default();
        let mut total = 0usize;

        while let Some(mut part) = multipart.next_field().await.map_err(self.stream_error())? {
            let Some(name) = part.name().map(str::to_owned) else {
                continue;
            };

            if name != field {
                let text = part.text().await.map_err(self.stream_error())?;
                total += text.len();
                self.check_ceiling(total)?;
                ingested.fields.insert(name, text);
                continue;
            }

            if ingested.attachment.is_some() {
                return Err(IngestError::DuplicateAttachment { field: name });
            }

            let stored_name = part
                .file_name()
                .and_then(derive_stored_name)
                .ok_or(IngestError::InvalidFilename)?;
            let content_type = part
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();

            let mut file = StagedFile::create(&self.staging_root).await?;
            while let Some(chunk) = part.chunk().await.map_err(self.stream_error())? {
                total += chunk.len();
                self.check_ceiling(total)?;
                file.write(&chunk).await?;
            }
            file.finish().await?;

            tracing::debug!(stored_name = %stored_name, size = file.size(), "attachment staged");
            ingested.attachment = Some(StagedAttachment {
                file,
                stored_name,
                content_type,
            });
        }

        Ok(ingested)
    }

    async fn read_json(&self, body: Body) -> Result<Ingested, IngestError> {
        let bytes = self.read_limited(body).await?;
        if bytes.is_empty() {
            return Ok(Ingested::default());
        }

        let object: serde_json::Map<String, Value> =
            serde_json::from_slice(&bytes).map_err(|_| IngestError::MalformedBody)?;

        let fields = object
            .into_iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(key, value)| match value {
                Value::String(s) => (key, s),
                other => (key, other.to_string()),
            })
            .collect();

        Ok(Ingested {
            fields,
            attachment: None,
        })
    }

    async fn read_form(&self, parts: &Parts, body: Body) -> Result<Ingested, IngestError> {
        let bytes = self.read_limited(body).await?;
        let request = Request::from_parts(parts.clone(), Body::from(bytes));
        let Form(fields) = Form::<HashMap<String, String>>::from_request(request, &())
            .await
            .map_err(|_| IngestError::MalformedBody)?;

        Ok(Ingested {
            fields,
            attachment: None,
        })
    }

    async fn read_limited(&self, body: Body) -> Result<axum::body::Bytes, IngestError> {
        match Limited::new(body, self.max_bytes).collect().await {
            Ok(collected) => Ok(collected.to_bytes()),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                Err(IngestError::PayloadTooLarge {
                    limit: self.max_bytes,
                })
            }
            Err(_) => Err(IngestError::StreamFailed),
        }
    }

    fn check_ceiling(&self, total: usize) -> Result<(), IngestError> {
        if total > self.max_bytes {
            return Err(IngestError::PayloadTooLarge {
                limit: self.max_bytes,
            });
        }
        Ok(())
    }

    fn stream_error(&self) -> impl Fn(MultipartError) -> IngestError + '_ {
        move |e| {
            if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
                IngestError::PayloadTooLarge {
                    limit: self.max_bytes,
                }
            } else {
                tracing::debug!(error = %e.body_text(), "multipart stream failed");
                IngestError::StreamFailed
            }
        }
    }
}
