//! Pre-handler idempotency guard.
//!
//! Runs immediately around the report handlers, after authentication and
//! rate limiting. A request without the key header passes through untouched.
//! A known key short-circuits with the recorded response and the replay
//! header; an unknown key is claimed so the capture middleware can record
//! the outcome.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::counter;
use tracing::{debug, info};

use super::store::{CachedEntry, Claim, IdempotencyStore, PendingCapture};

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";
pub const REPLAYED_HEADER: &str = "x-idempotent-replayed";

/// Consult the store for the request's idempotency key.
///
/// A present-but-empty header counts as present: the empty string is a valid
/// key. Only a missing header disables idempotency for the request.
pub async fn idempotency_guard(
    State(store): State<Arc<IdempotencyStore>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let key = match request.headers().get(IDEMPOTENCY_KEY_HEADER) {
        Some(value) => match value.to_str() {
            Ok(key) => key.to_string(),
            Err(_) => {
                debug!(
                    target = "nutrichain::idempotency",
                    "key header is not valid UTF-8; treating request as non-idempotent"
                );
                return next.run(request).await;
            }
        },
        None => return next.run(request).await,
    };

    // Claim-or-join: the first caller for a key executes the handler, any
    // concurrent caller with the same key waits for that claim to settle and
    // then re-resolves (replay if a response was recorded, fresh claim if
    // the first caller finished without caching).
    let ticket = loop {
        match store.claim(&key) {
            Claim::Replay(entry) => {
                counter!("nutrichain_idempotency_replay_total").increment(1);
                info!(
                    target = "nutrichain::idempotency",
                    key = %key,
                    status = entry.status,
                    "serving idempotent replay"
                );
                return replay_response(&entry);
            }
            Claim::Fresh(ticket) => break ticket,
            Claim::Pending(mut settled) => {
                let _ = settled.changed().await;
            }
        }
    };

    let mut response = next.run(request).await;
    response
        .extensions_mut()
        .insert(PendingCapture::new(ticket));
    response
}

/// Rebuild a response from a cached entry, marked as a replay.
fn replay_response(entry: &CachedEntry) -> Response {
    let body = serde_json::to_vec(&entry.body).unwrap_or_default();
    let status = StatusCode::from_u16(entry.status).unwrap_or(StatusCode::OK);

    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .header(REPLAYED_HEADER, "true")
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use time::OffsetDateTime;

    use super::*;

    #[test]
    fn replay_response_carries_marker_and_body() {
        let entry = CachedEntry {
            status: 201,
            body: json!({"report_type": "Orders Report"}),
            recorded_at: OffsetDateTime::now_utc(),
        };
        let response = replay_response(&entry);
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response
                .headers()
                .get(REPLAYED_HEADER)
                .and_then(|v| v.to_str().ok()),
            Some("true")
        );
        assert_eq!(
            response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
            Some("application/json")
        );
    }
}
