//! Response capture middleware.
//!
//! Wraps every route, outside the guard. When a request carried an
//! idempotency key and the handler produced a 200/201, the body is buffered
//! to completion, parsed as JSON and recorded under the key; an equivalent
//! response is then rebuilt from the buffered bytes, since buffering
//! consumes the original transport body. The store write happens before the
//! response is emitted, so a client retrying right after a 2xx observes the
//! cached value.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::counter;
use tracing::{debug, warn};

use super::guard::REPLAYED_HEADER;
use super::store::{IdempotencyStore, PendingCapture};

pub async fn capture_responses(
    State(store): State<Arc<IdempotencyStore>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;

    // A replay is already served from the store; recording it again would
    // refresh its timestamp as if freshly produced.
    if response.headers().contains_key(REPLAYED_HEADER) {
        return response;
    }

    let Some(pending) = response.extensions_mut().remove::<PendingCapture>() else {
        return response;
    };

    let status = response.status();
    if status != StatusCode::OK && status != StatusCode::CREATED {
        pending.abort();
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, store.max_body_bytes()).await {
        Ok(bytes) => bytes,
        Err(err) => {
            pending.abort();
            warn!(
                target = "nutrichain::idempotency",
                key = pending.key(),
                error = %err,
                "failed to buffer response body for capture"
            );
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match serde_json::from_slice::<serde_json::Value>(&bytes) {
        Ok(value) => {
            pending.fulfill(status.as_u16(), value);
            counter!("nutrichain_idempotency_capture_total").increment(1);
        }
        Err(_) => {
            // Not a structured document; deliver it, just don't cache it.
            pending.abort();
            counter!("nutrichain_idempotency_capture_skipped_total").increment(1);
            debug!(
                target = "nutrichain::idempotency",
                key = pending.key(),
                "response body is not JSON; skipping capture"
            );
        }
    }

    Response::from_parts(parts, Body::from(bytes))
}
