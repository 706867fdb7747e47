use super::KpiEngine;
use crate::domain::{
    KpiSet, MonthlyTrendRow, RegionalRevenueRow, Region, RepeatCustomerRow, SilverCustomer,
    SilverOrder, TopCustomerRow,
};
use crate::error::{PipelineError, Result};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::path::Path;
use tracing::debug;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// SQL-backed KPI engine over an embedded SQLite database. The connection
/// is acquired once per Gold invocation and released when the engine is
/// dropped, query failures included. Amounts are stored as integer cents
/// so SQL SUM stays exact.
pub struct RelationalEngine {
    conn: Connection,
}

impl RelationalEngine {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| PipelineError::EngineUnavailable(format!("{}: {e}", path.display())))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS silver_customers (
                customer_id     TEXT PRIMARY KEY,
                customer_name   TEXT NOT NULL,
                mobile_number   TEXT NOT NULL,
                region          TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS silver_orders (
                order_id        TEXT PRIMARY KEY,
                mobile_number   TEXT NOT NULL,
                order_date_time TEXT NOT NULL,
                sku_id          TEXT NOT NULL,
                sku_count       INTEGER NOT NULL,
                amount_cents    INTEGER NOT NULL,
                customer_id     TEXT NOT NULL,
                customer_name   TEXT NOT NULL,
                region          TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_orders_customer ON silver_orders (customer_id);
            CREATE INDEX IF NOT EXISTS idx_orders_date ON silver_orders (order_date_time);
            "#,
        )?;
        Ok(Self { conn })
    }

    /// Silver is recomputed each run, so the tables are replaced wholesale.
    fn load_silver(&self, customers: &[SilverCustomer], orders: &[SilverOrder]) -> Result<()> {
        self.conn
            .execute_batch("DELETE FROM silver_customers; DELETE FROM silver_orders;")?;

        let mut insert_customer = self.conn.prepare(
            "INSERT INTO silver_customers (customer_id, customer_name, mobile_number, region)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for c in customers {
            insert_customer.execute(params![
                c.customer_id,
                c.customer_name,
                c.mobile_number,
                c.region.as_str()
            ])?;
        }

        let mut insert_order = self.conn.prepare(
            "INSERT INTO silver_orders
             (order_id, mobile_number, order_date_time, sku_id, sku_count,
              amount_cents, customer_id, customer_name, region)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )?;
        for o in orders {
            insert_order.execute(params![
                o.order_id,
                o.mobile_number,
                o.order_date_time.format(TIMESTAMP_FORMAT).to_string(),
                o.sku_id,
                o.sku_count,
                to_cents(o.total_amount, &o.order_id)?,
                o.customer_id,
                o.customer_name,
                o.region.as_str()
            ])?;
        }

        debug!(
            "loaded {} customers and {} orders into relational engine",
            customers.len(),
            orders.len()
        );
        Ok(())
    }

    fn repeat_customers(&self) -> Result<Vec<RepeatCustomerRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT customer_id, customer_name, region,
                    COUNT(order_id) AS order_count, SUM(amount_cents) AS spend_cents
             FROM silver_orders
             GROUP BY customer_id, customer_name, region
             HAVING COUNT(order_id) > 1
             ORDER BY order_count DESC, customer_id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(RepeatCustomerRow {
                customer_id: row.get(0)?,
                customer_name: row.get(1)?,
                region: parse_region(&row.get::<_, String>(2)?),
                order_count: row.get::<_, i64>(3)? as u64,
                total_spend: from_cents(row.get(4)?),
            })
        })?;
        collect(rows)
    }

    fn monthly_trends(&self) -> Result<Vec<MonthlyTrendRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT strftime('%Y-%m', order_date_time) AS month,
                    COUNT(order_id), SUM(amount_cents)
             FROM silver_orders
             GROUP BY month
             ORDER BY month ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(MonthlyTrendRow {
                month: row.get(0)?,
                total_orders: row.get::<_, i64>(1)? as u64,
                total_revenue: from_cents(row.get(2)?),
            })
        })?;
        collect(rows)
    }

    fn regional_revenue(&self) -> Result<Vec<RegionalRevenueRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT region, SUM(amount_cents) AS revenue_cents
             FROM silver_orders
             GROUP BY region
             ORDER BY revenue_cents DESC, region ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(RegionalRevenueRow {
                region: parse_region(&row.get::<_, String>(0)?),
                regional_revenue: from_cents(row.get(1)?),
            })
        })?;
        collect(rows)
    }

    fn top_customers(&self, as_of: DateTime<Utc>) -> Result<Vec<TopCustomerRow>> {
        let window_start = (as_of - Duration::days(30)).format(TIMESTAMP_FORMAT).to_string();
        let window_end = as_of.format(TIMESTAMP_FORMAT).to_string();
        let mut stmt = self.conn.prepare(
            "SELECT customer_id, customer_name, SUM(amount_cents) AS spend_cents
             FROM silver_orders
             WHERE order_date_time >= ?1 AND order_date_time <= ?2
             GROUP BY customer_id, customer_name
             ORDER BY spend_cents DESC, customer_id ASC
             LIMIT 10",
        )?;
        let rows = stmt.query_map(params![window_start, window_end], |row| {
            Ok(TopCustomerRow {
                customer_id: row.get(0)?,
                customer_name: row.get(1)?,
                total_spend: from_cents(row.get(2)?),
            })
        })?;
        collect(rows)
    }
}

impl KpiEngine for RelationalEngine {
    fn name(&self) -> &'static str {
        "relational"
    }

    fn compute(
        &self,
        customers: &[SilverCustomer],
        orders: &[SilverOrder],
        as_of: DateTime<Utc>,
    ) -> Result<KpiSet> {
        self.load_silver(customers, orders)?;
        Ok(KpiSet {
            engine: self.name().to_string(),
            as_of,
            repeat_customers: self.repeat_customers()?,
            monthly_trends: self.monthly_trends()?,
            regional_revenue: self.regional_revenue()?,
            top_customers: self.top_customers(as_of)?,
        })
    }
}

fn to_cents(amount: Decimal, order_id: &str) -> Result<i64> {
    (amount * Decimal::ONE_HUNDRED).to_i64().ok_or_else(|| {
        PipelineError::Ingestion(format!("total_amount out of range for order '{order_id}'"))
    })
}

fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

fn parse_region(raw: &str) -> Region {
    raw.parse().unwrap_or(Region::Unknown)
}

fn collect<T>(
    rows: impl Iterator<Item = rusqlite::Result<T>>,
) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}
