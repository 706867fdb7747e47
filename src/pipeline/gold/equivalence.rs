use super::{KpiEngine, MemoryEngine, RelationalEngine};
use crate::config::Config;
use crate::domain::{KpiSet, SilverCustomer, SilverOrder};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};

/// A KPI on which the two engines disagree. Always surfaced to the caller;
/// never reconciled silently.
#[derive(Debug, Clone, Serialize)]
pub struct Mismatch {
    pub kpi: String,
    pub detail: String,
}

/// Runs both engines over the same Silver snapshot and reports every KPI
/// whose row set or ordering differs. Amounts are already reconciled to
/// two decimal places by both engines, so comparison is exact.
pub fn verify(
    config: &Config,
    customers: &[SilverCustomer],
    orders: &[SilverOrder],
    as_of: DateTime<Utc>,
) -> Result<Vec<Mismatch>> {
    let in_memory = MemoryEngine.compute(customers, orders, as_of)?;
    let relational = RelationalEngine::open(config.database_path())?
        .compute(customers, orders, as_of)?;

    let mismatches = compare(&in_memory, &relational);
    if mismatches.is_empty() {
        info!("engine equivalence verified over {} orders", orders.len());
    } else {
        for m in &mismatches {
            error!("engine mismatch on {}: {}", m.kpi, m.detail);
        }
    }
    Ok(mismatches)
}

fn compare(a: &KpiSet, b: &KpiSet) -> Vec<Mismatch> {
    let mut mismatches = Vec::new();
    compare_table("repeat_customers", &a.repeat_customers, &b.repeat_customers, &mut mismatches);
    compare_table("monthly_trends", &a.monthly_trends, &b.monthly_trends, &mut mismatches);
    compare_table("regional_revenue", &a.regional_revenue, &b.regional_revenue, &mut mismatches);
    compare_table("top_customers", &a.top_customers, &b.top_customers, &mut mismatches);
    mismatches
}

fn compare_table<T: PartialEq + Serialize>(
    kpi: &str,
    left: &[T],
    right: &[T],
    mismatches: &mut Vec<Mismatch>,
) {
    if left.len() != right.len() {
        mismatches.push(Mismatch {
            kpi: kpi.to_string(),
            detail: format!("row count {} (memory) vs {} (relational)", left.len(), right.len()),
        });
        return;
    }
    for (idx, (l, r)) in left.iter().zip(right).enumerate() {
        if l != r {
            let l_json = serde_json::to_string(l).unwrap_or_default();
            let r_json = serde_json::to_string(r).unwrap_or_default();
            mismatches.push(Mismatch {
                kpi: kpi.to_string(),
                detail: format!("row {idx}: {l_json} (memory) vs {r_json} (relational)"),
            });
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MonthlyTrendRow, RegionalRevenueRow, RepeatCustomerRow, TopCustomerRow};
    use chrono::TimeZone;
    use rust_decimal::Decimal;

    fn empty_set(engine: &str) -> KpiSet {
        KpiSet {
            engine: engine.to_string(),
            as_of: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            repeat_customers: Vec::<RepeatCustomerRow>::new(),
            monthly_trends: Vec::<MonthlyTrendRow>::new(),
            regional_revenue: Vec::<RegionalRevenueRow>::new(),
            top_customers: Vec::<TopCustomerRow>::new(),
        }
    }

    #[test]
    fn identical_sets_produce_no_mismatches() {
        let a = empty_set("memory");
        let b = empty_set("relational");
        assert!(compare(&a, &b).is_empty());
    }

    #[test]
    fn differing_rows_are_reported_per_kpi() {
        let a = empty_set("memory");
        let mut b = empty_set("relational");
        b.monthly_trends.push(MonthlyTrendRow {
            month: "2024-01".to_string(),
            total_orders: 1,
            total_revenue: Decimal::new(1000, 2),
        });

        let mismatches = compare(&a, &b);
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].kpi, "monthly_trends");
        assert!(mismatches[0].detail.contains("row count"));
    }
}
