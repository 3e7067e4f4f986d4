//! Report assembly: validate parameters, query the repository, wrap rows in
//! their envelope with audit metadata.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::reports::{
    AuditInfo, MOVEMENT_REPORT_TYPE, MovementReportItem, MovementReportResponse,
    ORDER_REPORT_TYPE, OrderReportItem, OrderReportResponse, ReportEnvelope, ReportRange,
    STOCK_REPORT_TYPE, StockReportItem, StockReportResponse,
};
use crate::util::clock::Clock;

use super::auth::Identity;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("query timed out")]
    Timeout,
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl RepoError {
    pub fn from_persistence(error: impl std::fmt::Display) -> Self {
        Self::Persistence(error.to_string())
    }
}

/// Read-only query collaborator behind the report handlers.
#[async_trait]
pub trait ReportsRepo: Send + Sync {
    async fn stock_snapshot(&self) -> Result<Vec<StockReportItem>, RepoError>;
    async fn movements_between(
        &self,
        range: &ReportRange,
    ) -> Result<Vec<MovementReportItem>, RepoError>;
    async fn orders_between(
        &self,
        range: &ReportRange,
    ) -> Result<Vec<OrderReportItem>, RepoError>;
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("invalid date range: {0}")]
    InvalidRange(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

pub struct ReportService {
    repo: Arc<dyn ReportsRepo>,
    clock: Arc<dyn Clock>,
}

impl ReportService {
    pub fn new(repo: Arc<dyn ReportsRepo>, clock: Arc<dyn Clock>) -> Self {
        Self { repo, clock }
    }

    pub async fn stock_report(&self, identity: &Identity) -> Result<StockReportResponse, ReportError> {
        let data = self.repo.stock_snapshot().await?;
        Ok(ReportEnvelope {
            metadata: self.audit(identity),
            report_type: STOCK_REPORT_TYPE,
            date_range: None,
            data,
        })
    }

    pub async fn movements_report(
        &self,
        identity: &Identity,
        range: ReportRange,
    ) -> Result<MovementReportResponse, ReportError> {
        self.check_range(&range)?;
        let data = self.repo.movements_between(&range).await?;
        Ok(ReportEnvelope {
            metadata: self.audit(identity),
            report_type: MOVEMENT_REPORT_TYPE,
            date_range: Some(range),
            data,
        })
    }

    pub async fn orders_report(
        &self,
        identity: &Identity,
        range: ReportRange,
    ) -> Result<OrderReportResponse, ReportError> {
        self.check_range(&range)?;
        let data = self.repo.orders_between(&range).await?;
        Ok(ReportEnvelope {
            metadata: self.audit(identity),
            report_type: ORDER_REPORT_TYPE,
            date_range: Some(range),
            data,
        })
    }

    fn check_range(&self, range: &ReportRange) -> Result<(), ReportError> {
        range
            .validate()
            .map_err(|err| ReportError::InvalidRange(err.to_string()))
    }

    fn audit(&self, identity: &Identity) -> AuditInfo {
        AuditInfo {
            requested_by: identity.username.clone(),
            requested_at: self.clock.now(),
        }
    }
}
