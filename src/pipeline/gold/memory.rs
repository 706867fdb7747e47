use super::KpiEngine;
use crate::domain::{
    money, KpiSet, MonthlyTrendRow, RegionalRevenueRow, RepeatCustomerRow, SilverCustomer,
    SilverOrder, TopCustomerRow,
};
use crate::error::Result;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::debug;

/// In-memory relational-algebra engine: group-bys over BTreeMaps so every
/// aggregation iterates in key order, with explicit tie-breaks on the final
/// sorts to match the relational engine row for row.
pub struct MemoryEngine;

impl KpiEngine for MemoryEngine {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn compute(
        &self,
        _customers: &[SilverCustomer],
        orders: &[SilverOrder],
        as_of: DateTime<Utc>,
    ) -> Result<KpiSet> {
        debug!("computing KPIs in memory over {} orders", orders.len());
        Ok(KpiSet {
            engine: self.name().to_string(),
            as_of,
            repeat_customers: repeat_customers(orders),
            monthly_trends: monthly_trends(orders),
            regional_revenue: regional_revenue(orders),
            top_customers: top_customers(orders, as_of),
        })
    }
}

fn repeat_customers(orders: &[SilverOrder]) -> Vec<RepeatCustomerRow> {
    let mut by_customer: BTreeMap<&str, RepeatCustomerRow> = BTreeMap::new();
    for order in orders {
        let entry = by_customer
            .entry(order.customer_id.as_str())
            .or_insert_with(|| RepeatCustomerRow {
                customer_id: order.customer_id.clone(),
                customer_name: order.customer_name.clone(),
                region: order.region,
                order_count: 0,
                total_spend: Decimal::ZERO,
            });
        entry.order_count += 1;
        entry.total_spend += order.total_amount;
    }

    let mut rows: Vec<RepeatCustomerRow> = by_customer
        .into_values()
        .filter(|row| row.order_count > 1)
        .map(|mut row| {
            row.total_spend = money(row.total_spend);
            row
        })
        .collect();
    rows.sort_by(|a, b| {
        b.order_count
            .cmp(&a.order_count)
            .then_with(|| a.customer_id.cmp(&b.customer_id))
    });
    rows
}

fn monthly_trends(orders: &[SilverOrder]) -> Vec<MonthlyTrendRow> {
    let mut by_month: BTreeMap<String, (u64, Decimal)> = BTreeMap::new();
    for order in orders {
        let month = order.order_date_time.format("%Y-%m").to_string();
        let entry = by_month.entry(month).or_insert((0, Decimal::ZERO));
        entry.0 += 1;
        entry.1 += order.total_amount;
    }

    // BTreeMap iteration over "YYYY-MM" keys is already chronological.
    by_month
        .into_iter()
        .map(|(month, (total_orders, total_revenue))| MonthlyTrendRow {
            month,
            total_orders,
            total_revenue: money(total_revenue),
        })
        .collect()
}

fn regional_revenue(orders: &[SilverOrder]) -> Vec<RegionalRevenueRow> {
    let mut by_region: BTreeMap<&str, RegionalRevenueRow> = BTreeMap::new();
    for order in orders {
        let entry = by_region
            .entry(order.region.as_str())
            .or_insert_with(|| RegionalRevenueRow {
                region: order.region,
                regional_revenue: Decimal::ZERO,
            });
        entry.regional_revenue += order.total_amount;
    }

    let mut rows: Vec<RegionalRevenueRow> = by_region
        .into_values()
        .map(|mut row| {
            row.regional_revenue = money(row.regional_revenue);
            row
        })
        .collect();
    rows.sort_by(|a, b| {
        b.regional_revenue
            .cmp(&a.regional_revenue)
            .then_with(|| a.region.as_str().cmp(b.region.as_str()))
    });
    rows
}

fn top_customers(orders: &[SilverOrder], as_of: DateTime<Utc>) -> Vec<TopCustomerRow> {
    let window_start = as_of - Duration::days(30);
    let mut by_customer: BTreeMap<&str, TopCustomerRow> = BTreeMap::new();
    for order in orders {
        if order.order_date_time < window_start || order.order_date_time > as_of {
            continue;
        }
        let entry = by_customer
            .entry(order.customer_id.as_str())
            .or_insert_with(|| TopCustomerRow {
                customer_id: order.customer_id.clone(),
                customer_name: order.customer_name.clone(),
                total_spend: Decimal::ZERO,
            });
        entry.total_spend += order.total_amount;
    }

    let mut rows: Vec<TopCustomerRow> = by_customer
        .into_values()
        .map(|mut row| {
            row.total_spend = money(row.total_spend);
            row
        })
        .collect();
    rows.sort_by(|a, b| {
        b.total_spend
            .cmp(&a.total_spend)
            .then_with(|| a.customer_id.cmp(&b.customer_id))
    });
    rows.truncate(10);
    rows
}
