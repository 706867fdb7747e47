use crate::config::{Config, EngineKind};
use crate::domain::{KpiSet, SilverCustomer, SilverOrder};
use crate::error::{PipelineError, Result};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

pub mod equivalence;
pub mod memory;
pub mod relational;

pub use self::memory::MemoryEngine;
pub use self::relational::RelationalEngine;

/// One KPI computation strategy. Both implementations must produce
/// identical row sets and ordering for the same Silver snapshot.
pub trait KpiEngine {
    fn name(&self) -> &'static str;

    fn compute(
        &self,
        customers: &[SilverCustomer],
        orders: &[SilverOrder],
        as_of: DateTime<Utc>,
    ) -> Result<KpiSet>;
}

/// Resolves the KPI reference timestamp: the configured override when set,
/// otherwise the latest order timestamp so re-runs on unchanged input stay
/// deterministic.
pub fn resolve_as_of(override_ts: Option<DateTime<Utc>>, orders: &[SilverOrder]) -> DateTime<Utc> {
    override_ts
        .or_else(|| orders.iter().map(|o| o.order_date_time).max())
        .unwrap_or_else(Utc::now)
}

/// Runs the Gold stage under the configured engine. When the relational
/// engine cannot be reached and fallback is enabled, the run degrades to
/// the in-memory strategy with a logged warning instead of failing.
pub fn compute(
    config: &Config,
    customers: &[SilverCustomer],
    orders: &[SilverOrder],
    as_of: DateTime<Utc>,
) -> Result<KpiSet> {
    match config.pipeline.engine {
        EngineKind::Memory => MemoryEngine.compute(customers, orders, as_of),
        EngineKind::Relational => match RelationalEngine::open(config.database_path()) {
            Ok(engine) => {
                info!("Gold stage using relational engine at {}", config.database_path().display());
                engine.compute(customers, orders, as_of)
            }
            Err(e) if config.pipeline.fallback_to_memory => {
                warn!("relational engine unavailable ({e}); falling back to in-memory engine");
                MemoryEngine.compute(customers, orders, as_of)
            }
            Err(e) => Err(PipelineError::EngineUnavailable(format!(
                "relational engine unreachable and fallback disabled: {e}"
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::domain::Region;
    use chrono::TimeZone;
    use rust_decimal::Decimal;

    fn silver_order(id: &str, when: DateTime<Utc>) -> SilverOrder {
        SilverOrder {
            order_id: id.to_string(),
            mobile_number: "9876543210".to_string(),
            order_date_time: when,
            sku_id: "SKU1".to_string(),
            sku_count: 1,
            total_amount: Decimal::new(10000, 2),
            customer_id: "CUST001".to_string(),
            customer_name: "Aarav".to_string(),
            region: Region::North,
        }
    }

    #[test]
    fn as_of_prefers_override_then_latest_order() {
        let t1 = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 1, 20, 0, 0, 0).unwrap();
        let orders = vec![silver_order("ORD1", t2), silver_order("ORD2", t1)];

        assert_eq!(resolve_as_of(Some(t1), &orders), t1);
        assert_eq!(resolve_as_of(None, &orders), t2);
    }

    #[test]
    fn unreachable_relational_engine_falls_back_to_memory() {
        let mut config = Config::default();
        config.pipeline.engine = EngineKind::Relational;
        config.pipeline.fallback_to_memory = true;
        // A directory path cannot be opened as a SQLite file.
        let dir = tempfile::tempdir().unwrap();
        config.database.path = Some(dir.path().to_path_buf());

        let as_of = Utc.with_ymd_and_hms(2024, 1, 20, 0, 0, 0).unwrap();
        let kpis = compute(&config, &[], &[], as_of).unwrap();
        assert_eq!(kpis.engine, "memory");

        config.pipeline.fallback_to_memory = false;
        let err = compute(&config, &[], &[], as_of).unwrap_err();
        assert!(matches!(err, PipelineError::EngineUnavailable(_)));
    }
}
