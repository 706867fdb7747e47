use super::{file_checksum, LoadManifest, LoadOutcome};
use crate::domain::CustomerRow;
use crate::error::{PipelineError, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

const REQUIRED_COLUMNS: [&str; 2] = ["customer_id", "mobile_number"];

/// Loads raw customer rows from a tabular (CSV) file. Column order may
/// vary; rows missing a required field are rejected and counted, never
/// fatal. Reads only; writes nothing.
pub fn load_customers<P: AsRef<Path>>(path: P) -> Result<LoadOutcome<CustomerRow>> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| {
        PipelineError::Ingestion(format!("cannot read customer file '{}': {e}", path.display()))
    })?;
    let content = String::from_utf8_lossy(&bytes);
    let checksum = file_checksum(&bytes);

    let mut lines = content.lines().enumerate();
    let header = loop {
        match lines.next() {
            Some((_, line)) if line.trim().is_empty() => continue,
            Some((_, line)) => break line,
            None => {
                return Err(PipelineError::Ingestion(format!(
                    "customer file '{}' is empty",
                    path.display()
                )))
            }
        }
    };

    let columns: HashMap<String, usize> = split_line(header)
        .into_iter()
        .enumerate()
        .map(|(idx, name)| (name.trim().to_lowercase(), idx))
        .collect();

    for required in REQUIRED_COLUMNS {
        if !columns.contains_key(required) {
            return Err(PipelineError::Ingestion(format!(
                "customer file '{}' is missing required column '{required}'",
                path.display()
            )));
        }
    }

    let field = |values: &[String], name: &str| -> String {
        columns
            .get(name)
            .and_then(|idx| values.get(*idx))
            .map(|v| v.trim().to_string())
            .unwrap_or_default()
    };

    let mut rows = Vec::new();
    let mut warnings = Vec::new();
    for (line_no, line) in lines {
        if line.trim().is_empty() {
            continue;
        }
        let values = split_line(line);
        let row = CustomerRow {
            customer_id: field(&values, "customer_id"),
            customer_name: field(&values, "customer_name"),
            mobile_number: field(&values, "mobile_number"),
            region: field(&values, "region"),
        };
        if row.customer_id.is_empty() || row.mobile_number.is_empty() {
            warnings.push(format!(
                "line {}: missing required field (customer_id/mobile_number)",
                line_no + 1
            ));
            continue;
        }
        rows.push(row);
    }

    for warning in &warnings {
        warn!("customer row rejected: {}", warning);
    }
    debug!(
        "Loaded {} customer rows from {} ({} rejected)",
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

/// Splits one CSV line, honoring double-quoted fields with embedded commas
/// and doubled quotes.
fn split_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_rows_regardless_of_column_order() {
        let file = write_csv(
            "region,customer_id,mobile_number,customer_name\n\
             North,CUST001,9876543210,Aarav\n",
        );
        let outcome = load_customers(file.path()).unwrap();
        assert_eq!(outcome.rows.len(), 1);
        let row = &outcome.rows[0];
        assert_eq!(row.customer_id, "CUST001");
        assert_eq!(row.customer_name, "Aarav");
        assert_eq!(row.region, "North");
    }

    #[test]
    fn rejects_rows_missing_required_fields() {
        let file = write_csv(
            "customer_id,customer_name,mobile_number,region\n\
             CUST001,Aarav,9876543210,North\n\
             ,Nobody,1112223333,South\n\
             CUST003,NoPhone,,East\n",
        );
        let outcome = load_customers(file.path()).unwrap();
        assert_eq!(outcome.rows.len(), 1);
        assert_eq!(outcome.manifest.records_rejected, 2);
        assert_eq!(outcome.manifest.warnings.len(), 2);
    }

    #[test]
    fn missing_required_column_is_fatal() {
        let file = write_csv("customer_name,region\nAarav,North\n");
        assert!(load_customers(file.path()).is_err());
    }

    #[test]
    fn handles_quoted_fields_with_commas() {
        let file = write_csv(
            "customer_id,customer_name,mobile_number,region\n\
             CUST001,\"Rao, Aarav\",9876543210,North\n",
        );
        let outcome = load_customers(file.path()).unwrap();
        assert_eq!(outcome.rows[0].customer_name, "Rao, Aarav");
    }
}
