use std::process;
use std::sync::Arc;
use std::time::Duration;

use nutrichain_reports::{
    application::{auth::SignedTokenValidator, error::AppError, reports::ReportService},
    config,
    idempotency::IdempotencyStore,
    infra::{
        db::PostgresReports,
        error::InfraError,
        http::{self, ApiRateLimiter, AppState},
        telemetry,
    },
    util::clock::{Clock, SystemClock},
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let dispatch = Dispatch::new(
        tracing_fmt::Subscriber::builder()
            .with_max_level(Level::ERROR)
            .finish(),
    );
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (_cli_args, settings) = config::load_with_cli()?;
    telemetry::init(&settings.logging)?;
    serve(settings).await
}

async fn serve(settings: config::Settings) -> Result<(), AppError> {
    let db = PostgresReports::connect(&settings.database).await?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let idempotency = Arc::new(IdempotencyStore::new(
        time::Duration::hours(settings.idempotency.ttl_hours as i64),
        settings.idempotency.max_body_bytes,
        clock.clone(),
    ));
    let state = AppState {
        reports: Arc::new(ReportService::new(Arc::new(db), clock)),
        auth: Arc::new(SignedTokenValidator::new(
            settings.auth.token_secret.clone(),
        )),
        rate_limiter: Arc::new(ApiRateLimiter::new(
            Duration::from_secs(settings.rate_limit.window_secs),
            settings.rate_limit.max_requests,
        )),
        idempotency,
    };

    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %settings.server.addr, "reports service listening");

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
