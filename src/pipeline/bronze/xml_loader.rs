use super::{file_checksum, LoadManifest, LoadOutcome};
use crate::domain::OrderRow;
use crate::error::{PipelineError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

static ORDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<order\b[^>]*>(.*?)</order>").unwrap());
static FIELD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<(\w+)\s*>([^<]*)</(\w+)>").unwrap());

/// Loads raw order rows from a hierarchical markup (XML) file. Child
/// element order may vary within an `<order>`; a malformed element is
/// rejected on its own and never aborts the rest of the file.
pub fn load_orders<P: AsRef<Path>>(path: P) -> Result<LoadOutcome<OrderRow>> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| {
        PipelineError::Ingestion(format!("cannot read order file '{}': {e}", path.display()))
    })?;
    let content = String::from_utf8_lossy(&bytes);
    let checksum = file_checksum(&bytes);

    let mut rows = Vec::new();
    let mut warnings = Vec::new();
    let mut elements = 0usize;

    for (idx, element) in ORDER_RE.captures_iter(&content).enumerate() {
        elements += 1;
        let body = &element[1];

        let mut fields: HashMap<String, String> = HashMap::new();
        for cap in FIELD_RE.captures_iter(body) {
            // Mismatched open/close tags mean a broken element; keep the
            // well-formed fields and let row-level checks decide.
            if cap[1] != cap[3] {
                continue;
            }
            fields.insert(cap[1].to_lowercase(), cap[2].trim().to_string());
        }

        let get = |name: &str| fields.get(name).cloned().unwrap_or_default();
        let row = OrderRow {
            order_id: get("order_id"),
            mobile_number: get("mobile_number"),
            order_date_time: get("order_date_time"),
            sku_id: get("sku_id"),
            sku_count: get("sku_count"),
            total_amount: get("total_amount"),
        };

        if row.order_id.is_empty() {
            warnings.push(format!("order element {}: missing order_id", idx + 1));
            continue;
        }
        if row.total_amount.parse::<Decimal>().is_err() {
            warnings.push(format!(
                "order element {} ({}): unparsable total_amount '{}'",
                idx + 1,
                row.order_id,
                row.total_amount
            ));
            continue;
        }
        rows.push(row);
    }

    if elements == 0 {
        return Err(PipelineError::Ingestion(format!(
            "order file '{}' contains no <order> elements",
            path.display()
        )));
    }

    for warning in &warnings {
        warn!("order element rejected: {}", warning);
    }
    debug!(
        "Loaded {} order rows from {} ({} rejected)",
        rows.len(),
        path.display(),
        warnings.len()
    );

    let manifest = LoadManifest {
        source_file: path.display().to_string(),
        file_checksum: checksum,
        records_loaded: rows.len(),
        records_rejected: warnings.len(),
        warnings,
    };
    Ok(LoadOutcome { rows, manifest })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_xml(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    const GOOD_ORDER: &str = "<order>\
        <order_id>ORD1</order_id>\
        <mobile_number>9876543210</mobile_number>\
        <order_date_time>2024-01-10T10:00:00</order_date_time>\
        <sku_id>SKU1</sku_id>\
        <sku_count>2</sku_count>\
        <total_amount>100.00</total_amount>\
        </order>";

    #[test]
    fn loads_orders_with_shuffled_child_elements() {
        let file = write_xml(
            "<orders>\
             <order><total_amount>50.00</total_amount><order_id>ORD2</order_id>\
             <mobile_number>9876543210</mobile_number><sku_id>SKU2</sku_id>\
             <sku_count>1</sku_count>\
             <order_date_time>2024-01-20T12:00:00</order_date_time></order>\
             </orders>",
        );
        let outcome = load_orders(file.path()).unwrap();
        assert_eq!(outcome.rows.len(), 1);
        assert_eq!(outcome.rows[0].order_id, "ORD2");
        assert_eq!(outcome.rows[0].total_amount, "50.00");
    }

    #[test]
    fn malformed_element_does_not_abort_the_file() {
        let content = format!(
            "<orders>\
             <order><order_id>ORD9</order_id><total_amount>not-a-number</total_amount></order>\
             {GOOD_ORDER}\
             <order><total_amount>10.00</total_amount></order>\
             </orders>"
        );
        let file = write_xml(&content);
        let outcome = load_orders(file.path()).unwrap();

        assert_eq!(outcome.rows.len(), 1);
        assert_eq!(outcome.rows[0].order_id, "ORD1");
        assert_eq!(outcome.manifest.records_rejected, 2);
        assert!(outcome.manifest.warnings[0].contains("unparsable total_amount"));
        assert!(outcome.manifest.warnings[1].contains("missing order_id"));
    }

    #[test]
    fn file_without_order_elements_is_fatal() {
        let file = write_xml("<orders></orders>");
        assert!(load_orders(file.path()).is_err());
    }
}
