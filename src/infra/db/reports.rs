use async_trait::async_trait;
use sqlx::FromRow;
use time::OffsetDateTime;

use crate::application::reports::{RepoError, ReportsRepo};
use crate::domain::reports::{MovementReportItem, OrderReportItem, ReportRange, StockReportItem};

use super::{PostgresReports, map_sqlx_error};

#[derive(Debug, FromRow)]
struct StockRow {
    product_id: i64,
    product_name: String,
    product_code: String,
    quantity: i64,
    location: String,
    last_updated: OffsetDateTime,
}

impl From<StockRow> for StockReportItem {
    fn from(row: StockRow) -> Self {
        Self {
            product_id: row.product_id,
            product_name: row.product_name,
            product_code: row.product_code,
            quantity: row.quantity,
            location: row.location,
            last_updated: row.last_updated,
        }
    }
}

#[derive(Debug, FromRow)]
struct MovementRow {
    movement_id: i64,
    product_id: i64,
    product_name: String,
    movement_type: String,
    quantity: i64,
    movement_date: OffsetDateTime,
    moved_by: String,
}

impl From<MovementRow> for MovementReportItem {
    fn from(row: MovementRow) -> Self {
        Self {
            movement_id: row.movement_id,
            product_id: row.product_id,
            product_name: row.product_name,
            movement_type: row.movement_type,
            quantity: row.quantity,
            movement_date: row.movement_date,
            user: row.moved_by,
        }
    }
}

#[derive(Debug, FromRow)]
struct OrderRow {
    order_id: i64,
    status: String,
    total_items: i64,
    order_date: OffsetDateTime,
}

impl From<OrderRow> for OrderReportItem {
    fn from(row: OrderRow) -> Self {
        Self {
            order_id: row.order_id,
            status: row.status,
            total_items: row.total_items,
            order_date: row.order_date,
        }
    }
}

#[async_trait]
impl ReportsRepo for PostgresReports {
    async fn stock_snapshot(&self) -> Result<Vec<StockReportItem>, RepoError> {
        let rows = sqlx::query_as::<_, StockRow>(
            r#"
            SELECT
                p.id::bigint AS product_id,
                p.name AS product_name,
                p.code AS product_code,
                si.quantity::bigint AS quantity,
                si.location,
                si.updated_at AS last_updated
            FROM stock_items si
            JOIN products p ON si.product_id = p.id
            WHERE si.quantity > 0
            ORDER BY p.name
            "#,
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(StockReportItem::from).collect())
    }

    async fn movements_between(
        &self,
        range: &ReportRange,
    ) -> Result<Vec<MovementReportItem>, RepoError> {
        let rows = sqlx::query_as::<_, MovementRow>(
            r#"
            SELECT
                im.id::bigint AS movement_id,
                p.id::bigint AS product_id,
                p.name AS product_name,
                im.type AS movement_type,
                im.quantity::bigint AS quantity,
                im.created_at AS movement_date,
                im."user" AS moved_by
            FROM inventory_movements im
            JOIN products p ON im.product_id = p.id
            WHERE im.created_at BETWEEN $1 AND $2
            ORDER BY im.created_at DESC
            "#,
        )
        .bind(range.start_date)
        .bind(range.end_date)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(MovementReportItem::from).collect())
    }

    async fn orders_between(&self, range: &ReportRange) -> Result<Vec<OrderReportItem>, RepoError> {
        let rows = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT
                o.id::bigint AS order_id,
                o.status,
                o.created_at AS order_date,
                COALESCE(
                    (SELECT SUM(oi.quantity) FROM order_items oi WHERE oi.order_id = o.id),
                    0
                )::bigint AS total_items
            FROM orders o
            WHERE o.created_at BETWEEN $1 AND $2
            ORDER BY o.created_at DESC
            "#,
        )
        .bind(range.start_date)
        .bind(range.end_date)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(OrderReportItem::from).collect())
    }
}
