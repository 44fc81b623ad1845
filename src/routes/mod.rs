/// Router Module Index
///
/// Routes are grouped by the pipeline standing in front of their handlers, so the order of
/// authentication and attachment ingestion is declared in one place per route.

/// Routes with no pipeline: health check and login.
pub mod public;

/// Read routes behind a verify-only pipeline.
pub mod authenticated;

/// Create routes that accept a `picture` attachment, each with its own stage order.
pub mod uploads;

use axum::{middleware, routing::MethodRouter};

use crate::{
    AppState,
    pipeline::{GuardState, Pipeline, guard},
};

/// guarded
///
/// Puts `pipeline` in front of every handler of `method_router`.
pub fn guarded(
    method_router: MethodRouter<AppState>,
    state: &AppState,
    pipeline: Pipeline,
) -> MethodRouter<AppState> {
    method_router.route_layer(middleware::from_fn_with_state(
        GuardState {
            app: state.clone(),
            pipeline,
        },
        guard,
    ))
}
