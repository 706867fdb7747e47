use crate::domain::{
    money, RawCustomerRecord, RawOrderRecord, Region, SilverCustomer, SilverOrder,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, warn};

static NON_DIGIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\D").unwrap());

/// Reason a record was excluded from Gold. Serialized as the audit reason
/// code, e.g. `orphan_order`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuarantineReason {
    UnnormalizableMobile,
    InvalidSkuCount,
    InvalidAmount,
    UnparseableDate,
    FutureOrderDate,
    OrphanOrder,
    AmbiguousCustomer,
}

impl fmt::Display for QuarantineReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            QuarantineReason::UnnormalizableMobile => "unnormalizable_mobile",
            QuarantineReason::InvalidSkuCount => "invalid_sku_count",
            QuarantineReason::InvalidAmount => "invalid_amount",
            QuarantineReason::UnparseableDate => "unparseable_date",
            QuarantineReason::FutureOrderDate => "future_order_date",
            QuarantineReason::OrphanOrder => "orphan_order",
            QuarantineReason::AmbiguousCustomer => "ambiguous_customer",
        };
        f.write_str(code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Customer,
    Order,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuarantineEntry {
    pub kind: RecordKind,
    pub business_key: String,
    pub reason: QuarantineReason,
    pub detail: String,
}

/// The primary data-quality signal of a run: every quarantined record with
/// its reason, plus duplicate-drop counts. Returned to the caller, never
/// just logged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuarantineReport {
    pub entries: Vec<QuarantineEntry>,
    pub duplicate_customers: usize,
    pub duplicate_orders: usize,
}

impl QuarantineReport {
    pub fn is_clean(&self) -> bool {
        self.entries.is_empty() && self.duplicate_customers == 0 && self.duplicate_orders == 0
    }

    pub fn quarantined(&self) -> usize {
        self.entries.len()
    }

    fn push(&mut self, kind: RecordKind, key: &str, reason: QuarantineReason, detail: String) {
        warn!("quarantined {:?} '{}': {} ({})", kind, key, reason, detail);
        self.entries.push(QuarantineEntry {
            kind,
            business_key: key.to_string(),
            reason,
            detail,
        });
    }
}

#[derive(Debug)]
pub struct SilverOutput {
    pub customers: Vec<SilverCustomer>,
    pub orders: Vec<SilverOrder>,
    pub quarantine: QuarantineReport,
}

/// Refines Bronze records into typed, business-rule-conformant Silver
/// records: clean, deduplicate, validate, enrich. Total over its input —
/// every rejected record lands in the quarantine report instead of
/// aborting the run.
pub fn refine(
    bronze_customers: &[RawCustomerRecord],
    bronze_orders: &[RawOrderRecord],
) -> SilverOutput {
    let mut quarantine = QuarantineReport::default();

    let customers = refine_customers(bronze_customers, &mut quarantine);
    let orders = refine_orders(bronze_orders, &customers, &mut quarantine);

    info!(
        "Silver refine complete: {} customers, {} orders, {} quarantined, {} duplicates dropped",
        customers.len(),
        orders.len(),
        quarantine.quarantined(),
        quarantine.duplicate_customers + quarantine.duplicate_orders
    );

    SilverOutput {
        customers,
        orders,
        quarantine,
    }
}

fn refine_customers(
    bronze: &[RawCustomerRecord],
    quarantine: &mut QuarantineReport,
) -> Vec<SilverCustomer> {
    // Clean
    struct Cleaned {
        customer: SilverCustomer,
        ingested_at: DateTime<Utc>,
    }

    let mut cleaned = Vec::new();
    for record in bronze {
        let customer_id = record.row.customer_id.trim().to_string();
        let mobile = normalize_mobile(&record.row.mobile_number);
        if mobile.is_empty() {
            quarantine.push(
                RecordKind::Customer,
                &customer_id,
                QuarantineReason::UnnormalizableMobile,
                format!("mobile_number '{}'", record.row.mobile_number),
            );
            continue;
        }
        // Unknown regions standardize to an explicit category, not a rejection.
        let region: Region = record.row.region.parse().unwrap_or(Region::Unknown);
        cleaned.push(Cleaned {
            customer: SilverCustomer {
                customer_id,
                customer_name: title_case(record.row.customer_name.trim()),
                mobile_number: mobile,
                region,
            },
            ingested_at: record.provenance.ingestion_timestamp,
        });
    }

    // Deduplicate by customer_id, most recently ingested wins
    let mut by_key: HashMap<String, Cleaned> = HashMap::new();
    for item in cleaned {
        let key = item.customer.customer_id.clone();
        match by_key.get(&key) {
            Some(existing) if existing.ingested_at > item.ingested_at => {
                debug!("dropping older duplicate customer '{}'", key);
                quarantine.duplicate_customers += 1;
            }
            Some(_) => {
                debug!("replacing duplicate customer '{}' with newer ingest", key);
                quarantine.duplicate_customers += 1;
                by_key.insert(key, item);
            }
            None => {
                by_key.insert(key, item);
            }
        }
    }

    let mut customers: Vec<SilverCustomer> =
        by_key.into_values().map(|item| item.customer).collect();
    customers.sort_by(|a, b| a.customer_id.cmp(&b.customer_id));
    customers
}

fn refine_orders(
    bronze: &[RawOrderRecord],
    customers: &[SilverCustomer],
    quarantine: &mut QuarantineReport,
) -> Vec<SilverOrder> {
    struct Cleaned {
        order_id: String,
        mobile_number: String,
        order_date_time: String,
        sku_id: String,
        sku_count: String,
        total_amount: String,
        ingested_at: DateTime<Utc>,
    }

    // Clean
    let mut cleaned = Vec::new();
    for record in bronze {
        let order_id = record.row.order_id.trim().to_string();
        let mobile = normalize_mobile(&record.row.mobile_number);
        if mobile.is_empty() {
            quarantine.push(
                RecordKind::Order,
                &order_id,
                QuarantineReason::UnnormalizableMobile,
                format!("mobile_number '{}'", record.row.mobile_number),
            );
            continue;
        }
        cleaned.push(Cleaned {
            order_id,
            mobile_number: mobile,
            order_date_time: record.row.order_date_time.trim().to_string(),
            sku_id: record.row.sku_id.trim().to_string(),
            sku_count: record.row.sku_count.trim().to_string(),
            total_amount: record.row.total_amount.trim().to_string(),
            ingested_at: record.provenance.ingestion_timestamp,
        });
    }

    // Deduplicate by order_id, most recently ingested wins
    let mut by_key: HashMap<String, Cleaned> = HashMap::new();
    for item in cleaned {
        let key = item.order_id.clone();
        match by_key.get(&key) {
            Some(existing) if existing.ingested_at > item.ingested_at => {
                debug!("dropping older duplicate order '{}'", key);
                quarantine.duplicate_orders += 1;
            }
            Some(_) => {
                debug!("replacing duplicate order '{}' with newer ingest", key);
                quarantine.duplicate_orders += 1;
                by_key.insert(key, item);
            }
            None => {
                by_key.insert(key, item);
            }
        }
    }

    // Join index: normalized mobile -> customers sharing it
    let mut by_mobile: HashMap<&str, Vec<&SilverCustomer>> = HashMap::new();
    for customer in customers {
        by_mobile
            .entry(customer.mobile_number.as_str())
            .or_default()
            .push(customer);
    }

    let now = Utc::now();
    let mut orders = Vec::new();
    let mut deduped: Vec<Cleaned> = by_key.into_values().collect();
    deduped.sort_by(|a, b| a.order_id.cmp(&b.order_id));

    for item in deduped {
        // Validate
        let sku_count = match item.sku_count.parse::<u32>() {
            Ok(n) if n > 0 => n,
            _ => {
                quarantine.push(
                    RecordKind::Order,
                    &item.order_id,
                    QuarantineReason::InvalidSkuCount,
                    format!("sku_count '{}'", item.sku_count),
                );
                continue;
            }
        };
        let total_amount = match item.total_amount.parse::<Decimal>() {
            Ok(amount) if amount >= Decimal::ZERO => money(amount),
            _ => {
                quarantine.push(
                    RecordKind::Order,
                    &item.order_id,
                    QuarantineReason::InvalidAmount,
                    format!("total_amount '{}'", item.total_amount),
                );
                continue;
            }
        };
        let order_date_time = match parse_order_timestamp(&item.order_date_time) {
            Some(ts) => ts,
            None => {
                quarantine.push(
                    RecordKind::Order,
                    &item.order_id,
                    QuarantineReason::UnparseableDate,
                    format!("order_date_time '{}'", item.order_date_time),
                );
                continue;
            }
        };
        if order_date_time > now {
            quarantine.push(
                RecordKind::Order,
                &item.order_id,
                QuarantineReason::FutureOrderDate,
                format!("order_date_time '{}'", item.order_date_time),
            );
            continue;
        }

        // Enrich: the order must match exactly one customer
        let customer = match by_mobile.get(item.mobile_number.as_str()) {
            Some(matches) if matches.len() == 1 => matches[0],
            Some(matches) => {
                quarantine.push(
                    RecordKind::Order,
                    &item.order_id,
                    QuarantineReason::AmbiguousCustomer,
                    format!(
                        "mobile_number '{}' matches {} customers",
                        item.mobile_number,
                        matches.len()
                    ),
                );
                continue;
            }
            None => {
                quarantine.push(
                    RecordKind::Order,
                    &item.order_id,
                    QuarantineReason::OrphanOrder,
                    format!("no customer with mobile_number '{}'", item.mobile_number),
                );
                continue;
            }
        };

        orders.push(SilverOrder {
            order_id: item.order_id,
            mobile_number: item.mobile_number,
            order_date_time,
            sku_id: item.sku_id,
            sku_count,
            total_amount,
            customer_id: customer.customer_id.clone(),
            customer_name: customer.customer_name.clone(),
            region: customer.region,
        });
    }

    orders
}

/// Canonical digit-only mobile form. Empty when nothing numeric survives.
fn normalize_mobile(raw: &str) -> String {
    NON_DIGIT_RE.replace_all(raw.trim(), "").to_string()
}

fn title_case(name: &str) -> String {
    name.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_order_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    // Whole-second resolution is the canonical timestamp grain; sub-second
    // precision from RFC 3339 inputs is dropped here so every downstream
    // consumer sees the same instant.
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return ts.with_timezone(&Utc).with_nanosecond(0);
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CustomerRow, OrderRow, Provenance};
    use chrono::TimeZone;

    fn provenance(ingested_at: DateTime<Utc>) -> Provenance {
        Provenance {
            ingestion_timestamp: ingested_at,
            source_file: "test".to_string(),
            record_hash: "hash".to_string(),
        }
    }

    fn customer(id: &str, mobile: &str, region: &str) -> RawCustomerRecord {
        RawCustomerRecord {
            row: CustomerRow {
                customer_id: id.to_string(),
                customer_name: "aarav sharma".to_string(),
                mobile_number: mobile.to_string(),
                region: region.to_string(),
            },
            provenance: provenance(Utc::now()),
        }
    }

    fn order(id: &str, mobile: &str, when: &str, amount: &str) -> RawOrderRecord {
        RawOrderRecord {
            row: OrderRow {
                order_id: id.to_string(),
                mobile_number: mobile.to_string(),
                order_date_time: when.to_string(),
                sku_id: "SKU1".to_string(),
                sku_count: "2".to_string(),
                total_amount: amount.to_string(),
            },
            provenance: provenance(Utc::now()),
        }
    }

    #[test]
    fn cleans_mobiles_names_and_regions() {
        let customers = vec![customer("CUST001", " +91-98765 43210 ", "north")];
        let output = refine(&customers, &[]);

        assert_eq!(output.customers.len(), 1);
        let c = &output.customers[0];
        assert_eq!(c.mobile_number, "919876543210");
        assert_eq!(c.customer_name, "Aarav Sharma");
        assert_eq!(c.region, Region::North);
    }

    #[test]
    fn unknown_region_maps_to_unknown_not_rejected() {
        let customers = vec![customer("CUST001", "9876543210", "Central")];
        let output = refine(&customers, &[]);
        assert_eq!(output.customers[0].region, Region::Unknown);
        assert_eq!(output.quarantine.quarantined(), 0);
    }

    #[test]
    fn unnormalizable_mobile_is_quarantined() {
        let customers = vec![customer("CUST001", "not-a-number", "North")];
        let output = refine(&customers, &[]);
        assert!(output.customers.is_empty());
        assert_eq!(
            output.quarantine.entries[0].reason,
            QuarantineReason::UnnormalizableMobile
        );
    }

    #[test]
    fn duplicate_customers_keep_most_recent_ingest() {
        let mut older = customer("CUST001", "9876543210", "North");
        older.provenance.ingestion_timestamp = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        older.row.customer_name = "old name".to_string();
        let mut newer = customer("CUST001", "9876543210", "South");
        newer.provenance.ingestion_timestamp = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();

        let output = refine(&[older, newer], &[]);
        assert_eq!(output.customers.len(), 1);
        assert_eq!(output.customers[0].region, Region::South);
        assert_eq!(output.quarantine.duplicate_customers, 1);
    }

    #[test]
    fn orphan_orders_are_quarantined_not_dropped() {
        let customers = vec![customer("CUST001", "9876543210", "North")];
        let orders = vec![
            order("ORD1", "9876543210", "2024-01-10T10:00:00", "100.00"),
            order("ORD2", "1112223333", "2024-01-11T10:00:00", "50.00"),
        ];
        let output = refine(&customers, &orders);

        assert_eq!(output.orders.len(), 1);
        let entry = &output.quarantine.entries[0];
        assert_eq!(entry.reason, QuarantineReason::OrphanOrder);
        assert_eq!(entry.business_key, "ORD2");
        assert_eq!(entry.reason.to_string(), "orphan_order");
    }

    #[test]
    fn validation_failures_carry_reason_codes() {
        let customers = vec![customer("CUST001", "9876543210", "North")];
        let mut bad_count = order("ORD1", "9876543210", "2024-01-10T10:00:00", "10.00");
        bad_count.row.sku_count = "0".to_string();
        let bad_amount = order("ORD2", "9876543210", "2024-01-10T10:00:00", "-5");
        let bad_date = order("ORD3", "9876543210", "sometime", "10.00");
        let future = order("ORD4", "9876543210", "2999-01-01T00:00:00", "10.00");

        let output = refine(&customers, &[bad_count, bad_amount, bad_date, future]);
        assert!(output.orders.is_empty());
        let reasons: Vec<QuarantineReason> =
            output.quarantine.entries.iter().map(|e| e.reason).collect();
        assert_eq!(
            reasons,
            vec![
                QuarantineReason::InvalidSkuCount,
                QuarantineReason::InvalidAmount,
                QuarantineReason::UnparseableDate,
                QuarantineReason::FutureOrderDate,
            ]
        );
    }

    #[test]
    fn order_timestamps_truncate_to_whole_seconds() {
        let customers = vec![customer("CUST001", "9876543210", "North")];
        let orders = vec![order("ORD1", "9876543210", "2024-01-10T10:00:00.500Z", "10.00")];
        let output = refine(&customers, &orders);

        assert_eq!(
            output.orders[0].order_date_time,
            Utc.with_ymd_and_hms(2024, 1, 10, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn enrichment_denormalizes_customer_fields() {
        let customers = vec![customer("CUST001", "9876543210", "North")];
        let orders = vec![order("ORD1", "98765-43210", "2024-01-10", "100.0")];
        let output = refine(&customers, &orders);

        let o = &output.orders[0];
        assert_eq!(o.customer_id, "CUST001");
        assert_eq!(o.customer_name, "Aarav Sharma");
        assert_eq!(o.region, Region::North);
        assert_eq!(o.total_amount.to_string(), "100.00");
    }

    #[test]
    fn ambiguous_mobile_match_is_quarantined() {
        let customers = vec![
            customer("CUST001", "9876543210", "North"),
            customer("CUST002", "9876543210", "South"),
        ];
        let orders = vec![order("ORD1", "9876543210", "2024-01-10T10:00:00", "10.00")];
        let output = refine(&customers, &orders);

        assert!(output.orders.is_empty());
        assert_eq!(
            output.quarantine.entries[0].reason,
            QuarantineReason::AmbiguousCustomer
        );
    }
}
