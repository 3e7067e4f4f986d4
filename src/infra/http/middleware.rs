use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::counter;
use tracing::{error, warn};
use uuid::Uuid;

use crate::application::auth::Identity;
use crate::application::error::ErrorReport;

use super::error::ApiError;
use super::state::AppState;

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let ctx = RequestContext {
        request_id: request_id.clone(),
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    response.extensions_mut().insert(ctx);
    response
}

/// Validate the bearer credential and stash the caller identity in request
/// extensions. Rejections happen here, before the idempotency guard ever
/// sees the request.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let token = match extract_bearer(request.headers().get(header::AUTHORIZATION)) {
        Some(token) => token,
        None => return ApiError::unauthorized().into_response(),
    };

    let identity = match state.auth.authenticate(&token).await {
        Ok(identity) => identity,
        Err(err) => {
            return ApiError::unauthorized()
                .with_detail(err.to_string())
                .into_response();
        }
    };

    request.extensions_mut().insert(identity);
    next.run(request).await
}

pub async fn rate_limit(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let identity = match request.extensions().get::<Identity>() {
        Some(identity) => identity,
        None => {
            warn!(
                target = "nutrichain::http::rate_limit",
                "missing identity in rate limit middleware"
            );
            return ApiError::unauthorized().into_response();
        }
    };

    if !state.rate_limiter.allow(&identity.username, &path) {
        counter!("nutrichain_rate_limited_total").increment(1);
        return ApiError::rate_limited(state.rate_limiter.retry_after_secs());
    }

    next.run(request).await
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();

    if status.is_client_error() || status.is_server_error() {
        let elapsed_ms = start.elapsed().as_millis();
        let report = response.extensions_mut().remove::<ErrorReport>();
        let (source, messages) = match report {
            Some(report) => (report.source, report.messages),
            None => ("unknown", Vec::new()),
        };
        let detail = messages
            .first()
            .cloned()
            .unwrap_or_else(|| "no diagnostic available".to_string());

        if status.is_server_error() {
            error!(
                target = "nutrichain::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                "request failed",
            );
        } else {
            warn!(
                target = "nutrichain::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                "client request error",
            );
        }
    }

    response
}

fn extract_bearer(header: Option<&axum::http::HeaderValue>) -> Option<String> {
    let raw = header?.to_str().ok()?;
    let bearer = raw.strip_prefix("Bearer ")?;
    Some(bearer.to_string())
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn bearer_extraction_requires_prefix() {
        let value = HeaderValue::from_static("Bearer abc.def");
        assert_eq!(extract_bearer(Some(&value)), Some("abc.def".to_string()));

        let bare = HeaderValue::from_static("abc.def");
        assert_eq!(extract_bearer(Some(&bare)), None);
        assert_eq!(extract_bearer(None), None);
    }
}
