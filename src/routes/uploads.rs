use super::guarded;
use crate::{
    AppState, handlers,
    pipeline::{PICTURE_FIELD, Pipeline},
};
use axum::{Router, routing::post};

/// Registration: ingest only. No credential exists yet.
pub fn registration_pipeline() -> Pipeline {
    Pipeline::builder().ingest(PICTURE_FIELD).build()
}

/// Post creation: verify, then ingest. A request without a valid credential is rejected
/// before a single body byte is read.
pub fn post_creation_pipeline() -> Pipeline {
    Pipeline::builder().verify().ingest(PICTURE_FIELD).build()
}

/// Upload Router Module
///
/// The create routes that accept a single `picture` attachment. Whatever the stage order,
/// attachment bytes are only committed to storage after every stage has passed.
pub fn upload_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        // POST /auth/register
        .route(
            "/auth/register",
            guarded(post(handlers::register_user), state, registration_pipeline()),
        )
        // POST /posts
        .route(
            "/posts",
            guarded(post(handlers::create_post), state, post_creation_pipeline()),
        )
}
