use super::guarded;
use crate::{AppState, handlers, pipeline::Pipeline};
use axum::{Router, routing::get};

/// Authenticated Router Module
///
/// Read routes. Each handler sits behind a pipeline with a single verify stage, so it only
/// runs for requests carrying a valid credential.
///
/// `GET /posts` shares its path with the post creation route in `uploads`; both method
/// routers are merged by path and keep their own pipelines.
pub fn authenticated_routes(state: &AppState) -> Router<AppState> {
    let verify_only = || Pipeline::builder().verify().build();

    Router::new()
        // GET /users/{id}
        .route("/users/{id}", guarded(get(handlers::get_user), state, verify_only()))
        // GET /posts
        // The whole feed, newest first.
        .route("/posts", guarded(get(handlers::get_feed), state, verify_only()))
        // GET /posts/{user_id}/posts
        .route(
            "/posts/{user_id}/posts",
            guarded(get(handlers::get_user_posts), state, verify_only()),
        )
}
