//! Report document types.
//!
//! The three report envelopes share the same shape: audit metadata, a fixed
//! report-type label, the echoed date range (absent for the stock snapshot)
//! and the rows themselves. All timestamps serialize as RFC 3339.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::error::DomainError;

pub const STOCK_REPORT_TYPE: &str = "Stock Report";
pub const MOVEMENT_REPORT_TYPE: &str = "Inventory Movement Report";
pub const ORDER_REPORT_TYPE: &str = "Orders Report";

/// Inclusive date range a caller asks a report over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRange {
    #[serde(with = "time::serde::rfc3339")]
    pub start_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_date: OffsetDateTime,
}

impl ReportRange {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.start_date > self.end_date {
            return Err(DomainError::validation(
                "start_date must not be after end_date",
            ));
        }
        Ok(())
    }
}

/// Who asked for a report, and when.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditInfo {
    pub requested_by: String,
    #[serde(with = "time::serde::rfc3339")]
    pub requested_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockReportItem {
    pub product_id: i64,
    pub product_name: String,
    pub product_code: String,
    pub quantity: i64,
    pub location: String,
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementReportItem {
    pub movement_id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub movement_type: String,
    pub quantity: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub movement_date: OffsetDateTime,
    pub user: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderReportItem {
    pub order_id: i64,
    pub status: String,
    pub total_items: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub order_date: OffsetDateTime,
}

/// Envelope wrapping report rows with request metadata.
///
/// `date_range` is `null` for the stock snapshot, which has no parameters.
#[derive(Debug, Clone, Serialize)]
pub struct ReportEnvelope<T> {
    pub metadata: AuditInfo,
    pub report_type: &'static str,
    pub date_range: Option<ReportRange>,
    pub data: Vec<T>,
}

pub type StockReportResponse = ReportEnvelope<StockReportItem>;
pub type MovementReportResponse = ReportEnvelope<MovementReportItem>;
pub type OrderReportResponse = ReportEnvelope<OrderReportItem>;
