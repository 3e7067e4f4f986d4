#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, header};
use bytes::Bytes;
use http_body_util::BodyExt;
use time::macros::datetime;
use tower::ServiceExt;

use nutrichain_reports::application::auth::SignedTokenValidator;
use nutrichain_reports::application::reports::{RepoError, ReportService, ReportsRepo};
use nutrichain_reports::domain::reports::{
    MovementReportItem, OrderReportItem, ReportRange, StockReportItem,
};
use nutrichain_reports::idempotency::IdempotencyStore;
use nutrichain_reports::infra::http::{ApiRateLimiter, AppState, build_router};
use nutrichain_reports::util::clock::ManualClock;

pub const TEST_SECRET: &str = "test-secret";
pub const TEST_START: time::OffsetDateTime = datetime!(2024-06-01 12:00 UTC);

/// Stub query collaborator that counts invocations and can be flipped into
/// a failing mode.
#[derive(Default)]
pub struct CountingRepo {
    pub stock_calls: AtomicUsize,
    pub movement_calls: AtomicUsize,
    pub order_calls: AtomicUsize,
    pub fail: AtomicBool,
    pub delay_ms: AtomicU64,
}

impl CountingRepo {
    async fn simulate(&self, counter: &AtomicUsize) -> Result<(), RepoError> {
        counter.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(StdDuration::from_millis(delay)).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(RepoError::Persistence("stub failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ReportsRepo for CountingRepo {
    async fn stock_snapshot(&self) -> Result<Vec<StockReportItem>, RepoError> {
        self.simulate(&self.stock_calls).await?;
        Ok(vec![StockReportItem {
            product_id: 1,
            product_name: "Almond Flour".to_string(),
            product_code: "ALM-001".to_string(),
            quantity: 42,
            location: "A-01".to_string(),
            last_updated: datetime!(2024-05-30 08:00 UTC),
        }])
    }

    async fn movements_between(
        &self,
        _range: &ReportRange,
    ) -> Result<Vec<MovementReportItem>, RepoError> {
        self.simulate(&self.movement_calls).await?;
        Ok(vec![MovementReportItem {
            movement_id: 7,
            product_id: 1,
            product_name: "Almond Flour".to_string(),
            movement_type: "entry".to_string(),
            quantity: 5,
            movement_date: datetime!(2024-01-15 10:30 UTC),
            user: "warehouse_bot".to_string(),
        }])
    }

    async fn orders_between(&self, _range: &ReportRange) -> Result<Vec<OrderReportItem>, RepoError> {
        self.simulate(&self.order_calls).await?;
        Ok(vec![OrderReportItem {
            order_id: 99,
            status: "delivered".to_string(),
            total_items: 3,
            order_date: datetime!(2024-01-20 16:45 UTC),
        }])
    }
}

pub struct Harness {
    pub router: Router,
    pub repo: Arc<CountingRepo>,
    pub clock: ManualClock,
    pub store: Arc<IdempotencyStore>,
}

pub fn harness() -> Harness {
    harness_with_rate_limit(1000)
}

pub fn harness_with_rate_limit(max_requests: u32) -> Harness {
    let repo = Arc::new(CountingRepo::default());
    let clock = ManualClock::new(TEST_START);
    let store = Arc::new(IdempotencyStore::new(
        time::Duration::hours(24),
        1024 * 1024,
        Arc::new(clock.clone()),
    ));
    let state = AppState {
        reports: Arc::new(ReportService::new(repo.clone(), Arc::new(clock.clone()))),
        auth: Arc::new(SignedTokenValidator::new(TEST_SECRET)),
        rate_limiter: Arc::new(ApiRateLimiter::new(
            StdDuration::from_secs(60),
            max_requests,
        )),
        idempotency: store.clone(),
    };
    Harness {
        router: build_router(state),
        repo,
        clock,
        store,
    }
}

pub fn bearer(username: &str) -> String {
    format!(
        "Bearer {}",
        SignedTokenValidator::new(TEST_SECRET).issue(username)
    )
}

pub fn get_stock(key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .uri("/api/v1/reports/stock")
        .header(header::AUTHORIZATION, bearer("testuser"));
    if let Some(key) = key {
        builder = builder.header("Idempotency-Key", key);
    }
    builder.body(Body::empty()).expect("request")
}

pub fn post_report(path: &str, body: &str, key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::AUTHORIZATION, bearer("testuser"))
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(key) = key {
        builder = builder.header("Idempotency-Key", key);
    }
    builder.body(Body::from(body.to_string())).expect("request")
}

pub const MOVEMENTS_BODY: &str =
    r#"{"start_date":"2024-01-01T00:00:00Z","end_date":"2024-02-01T00:00:00Z"}"#;

pub async fn send(router: &Router, request: Request<Body>) -> Response<Body> {
    router
        .clone()
        .oneshot(request)
        .await
        .expect("router call is infallible")
}

pub async fn read_body(response: Response<Body>) -> (axum::http::response::Parts, Bytes) {
    let (parts, body) = response.into_parts();
    let bytes = body.collect().await.expect("body collects").to_bytes();
    (parts, bytes)
}

pub fn is_replay(parts: &axum::http::response::Parts) -> bool {
    parts
        .headers
        .get("x-idempotent-replayed")
        .and_then(|v| v.to_str().ok())
        == Some("true")
}
