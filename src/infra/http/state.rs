use std::sync::Arc;

use crate::application::auth::CredentialValidator;
use crate::application::reports::ReportService;
use crate::idempotency::IdempotencyStore;

use super::rate_limit::ApiRateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub reports: Arc<ReportService>,
    pub auth: Arc<dyn CredentialValidator>,
    pub rate_limiter: Arc<ApiRateLimiter>,
    pub idempotency: Arc<IdempotencyStore>,
}
