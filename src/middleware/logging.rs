use axum::http;
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::Level;
use uuid::Uuid;

use crate::state::AppState;

/// Request/response tracing. Each request gets a random correlation id in
/// the span so service log lines emitted underneath can be tied back to the
/// access line.
pub fn add_tracing(router: Router<AppState>) -> Router<AppState> {
    router.layer(
        TraceLayer::new_for_http()
            .make_span_with(|req: &http::Request<_>| {
                let request_id = Uuid::new_v4();
                tracing::span!(
                    Level::INFO,
                    "request",
                    %request_id,
                    method = %req.method(),
                    path = %req.uri().path(),
                )
            })
            .on_response(
                |res: &http::Response<_>,
                 latency: std::time::Duration,
                 _span: &tracing::Span| {
                    tracing::info!(
                        status = res.status().as_u16(),
                        elapsed_ms = latency.as_millis() as u64,
                        "request completed"
                    );
                },
            ),
    )
}
