pub mod auth;
pub mod error_handling;
pub mod guards;
pub mod logging;

use crate::state::AppState;
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;

/// Upper bound on in-flight requests; beyond this, requests queue on the
/// semaphore instead of piling onto the pool.
const MAX_IN_FLIGHT: usize = 1024;

/// Apply default middleware layers (logging, load shedding)
pub fn with_defaults(router: Router<AppState>) -> Router<AppState> {
    logging::add_tracing(router).layer(ConcurrencyLimitLayer::new(MAX_IN_FLIGHT))
}
