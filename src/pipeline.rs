use std::{collections::HashMap, sync::Arc};

use axum::{
    body::Body,
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{
    AppState, auth::SubjectIdentity, error::ApiError, ingest::IngestError, models::AttachmentRef,
};

/// Multipart part name that carries the attachment on upload routes.
pub const PICTURE_FIELD: &str = "picture";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Resolve the bearer credential into a subject identity.
    Verify,
    /// Read the body; the part named `field` is the attachment.
    Ingest { field: &'static str },
}

/// PipelineContext
///
/// Annotations left by upstream stages for the handler. Lives in the request extensions
/// and is dropped with the request.
#[derive(Debug, Clone, Default)]
pub struct PipelineContext {
    pub subject: Option<SubjectIdentity>,
    pub attachment: Option<AttachmentRef>,
    pub fields: HashMap<String, String>,
}

/// Pipeline
///
/// Ordered list of stages fixed when the router is built. For every request the stages run
/// strictly in order; the first failing stage ends the request with its own error response
/// and nothing after it runs. Only when every stage passes is the staged attachment
/// committed and the handler invoked with a populated `PipelineContext`.
#[derive(Debug, Clone)]
pub struct Pipeline {
    stages: Arc<[Stage]>,
}

#[derive(Debug, Default)]
pub struct PipelineBuilder {
    stages: Vec<Stage>,
}

impl PipelineBuilder {
    pub fn verify(mut self) -> Self {
        self.stages.push(Stage::Verify);
        self
    }

    pub fn ingest(mut self, field: &'static str) -> Self {
        self.stages.push(Stage::Ingest { field });
        self
    }

    /// # Panics
    /// Panics if the pipeline verifies or ingests more than once. Pipelines are built while
    /// assembling the router, so this is a wiring mistake, not a request-time failure.
    pub fn build(self) -> Pipeline {
        let count = |wanted: fn(&Stage) -> bool| self.stages.iter().filter(|&s| wanted(s)).count();
        assert!(
            count(|s| matches!(s, Stage::Verify)) <= 1,
            "a pipeline verifies the credential at most once"
        );
        assert!(
            count(|s| matches!(s, Stage::Ingest { .. })) <= 1,
            "a pipeline ingests at most one attachment"
        );

        Pipeline {
            stages: self.stages.into(),
        }
    }
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// run
    ///
    /// Drives `request` through every stage. On success, returns the request with the
    /// context in its extensions (and an empty body if a stage consumed it). On failure,
    /// returns the first stage's error; a staged attachment is dropped, and so removed,
    /// before it was ever reachable.
    pub async fn run(&self, state: &AppState, request: Request) -> Result<Request, ApiError> {
        let (mut parts, body) = request.into_parts();
        let mut body = Some(body);
        let mut ctx = PipelineContext::default();
        let mut staged = None;

        for (index, stage) in self.stages.iter().enumerate() {
            match *stage {
                Stage::Verify => {
                    let identity = state.verifier.verify(parts.headers.get(header::AUTHORIZATION))?;
                    tracing::debug!(subject = %identity.subject, "credential verified");
                    ctx.subject = Some(identity);
                }
                Stage::Ingest { field } => {
                    let body = body.take().unwrap_or_else(Body::empty);
                    let ingested = state.ingestor.ingest(&parts, body, field).await?;
                    ctx.fields = ingested.fields;
                    staged = ingested.attachment;
                }
            }
            tracing::trace!(index, ?stage, "pipeline stage passed");
        }

        if let Some(staged) = staged {
            let size = staged.file.size();
            state
                .storage
                .persist(staged.file, &staged.stored_name, &staged.content_type)
                .await
                .map_err(IngestError::from)?;

            tracing::info!(name = %staged.stored_name, size, "attachment committed");
            ctx.attachment = Some(AttachmentRef {
                url: state.storage.locate(&staged.stored_name),
                name: staged.stored_name,
                content_type: staged.content_type,
                size,
            });
        }

        parts.extensions.insert(ctx);
        Ok(Request::from_parts(parts, body.unwrap_or_else(Body::empty)))
    }
}

/// State handed to [`guard`]: the shared application state plus the route's pipeline.
#[derive(Clone)]
pub struct GuardState {
    pub app: AppState,
    pub pipeline: Pipeline,
}

/// guard
///
/// Middleware that runs the route's pipeline in front of its handler. Attach with
/// `middleware::from_fn_with_state(GuardState { .. }, guard)` as a route layer.
pub async fn guard(State(guard): State<GuardState>, request: Request, next: Next) -> Response {
    match guard.pipeline.run(&guard.app, request).await {
        Ok(request) => next.run(request).await,
        Err(e) => e.into_response(),
    }
}
