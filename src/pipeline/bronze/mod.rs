use crate::domain::{CustomerRow, OrderRow, Provenance, RawCustomerRecord, RawOrderRecord};
use crate::error::{PipelineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

pub mod csv_loader;
pub mod xml_loader;

/// Summary of one file load: checksum, counts, and per-row parse warnings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadManifest {
    pub source_file: String,
    pub file_checksum: String,
    pub records_loaded: usize,
    pub records_rejected: usize,
    pub warnings: Vec<String>,
}

/// Records plus manifest produced by a raw loader. Loaders only read the
/// file; nothing is written until the Bronze store takes over.
#[derive(Debug)]
pub struct LoadOutcome<T> {
    pub rows: Vec<T>,
    pub manifest: LoadManifest,
}

pub type BronzeSnapshotId = Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BronzeSnapshot<T> {
    pub id: BronzeSnapshotId,
    pub records: Vec<T>,
    pub manifest: LoadManifest,
}

/// Row types the Bronze store can fingerprint and key.
pub trait BronzeRow {
    const KIND: &'static str;
    fn business_key(&self) -> &str;
    /// Canonical string over business fields only. Provenance never
    /// participates, so unchanged sources hash identically across runs.
    fn canonical_fields(&self) -> String;
}

impl BronzeRow for CustomerRow {
    const KIND: &'static str = "customers";

    fn business_key(&self) -> &str {
        &self.customer_id
    }

    fn canonical_fields(&self) -> String {
        [
            self.customer_id.as_str(),
            self.customer_name.as_str(),
            self.mobile_number.as_str(),
            self.region.as_str(),
        ]
        .join("|")
    }
}

impl BronzeRow for OrderRow {
    const KIND: &'static str = "orders";

    fn business_key(&self) -> &str {
        &self.order_id
    }

    fn canonical_fields(&self) -> String {
        [
            self.order_id.as_str(),
            self.mobile_number.as_str(),
            self.order_date_time.as_str(),
            self.sku_id.as_str(),
            self.sku_count.as_str(),
            self.total_amount.as_str(),
        ]
        .join("|")
    }
}

pub fn record_hash<R: BronzeRow>(row: &R) -> String {
    let mut hasher = Sha256::new();
    hasher.update(row.canonical_fields().as_bytes());
    hex::encode(hasher.finalize())
}

pub fn file_checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Append-only raw-record preservation. Each write stamps provenance and
/// persists one immutable JSON snapshot under `<data_dir>/bronze/`.
pub struct BronzeStore {
    root: PathBuf,
}

impl BronzeStore {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            root: data_dir.as_ref().join("bronze"),
        }
    }

    pub fn write_customers(
        &self,
        outcome: LoadOutcome<CustomerRow>,
    ) -> Result<BronzeSnapshot<RawCustomerRecord>> {
        self.write(outcome, |row, provenance| RawCustomerRecord { row, provenance })
    }

    pub fn write_orders(
        &self,
        outcome: LoadOutcome<OrderRow>,
    ) -> Result<BronzeSnapshot<RawOrderRecord>> {
        self.write(outcome, |row, provenance| RawOrderRecord { row, provenance })
    }

    fn write<R, T, F>(&self, outcome: LoadOutcome<R>, make: F) -> Result<BronzeSnapshot<T>>
    where
        R: BronzeRow,
        T: Serialize,
        F: Fn(R, Provenance) -> T,
    {
        // A fully-rejected source still proceeds (row issues are counted,
        // not thrown); only a truly empty one is fatal.
        if outcome.rows.is_empty() && outcome.manifest.records_rejected == 0 {
            return Err(PipelineError::Ingestion(format!(
                "source '{}' contains no {} records",
                outcome.manifest.source_file,
                R::KIND
            )));
        }

        let ingestion_timestamp: DateTime<Utc> = Utc::now();
        let source_file = outcome.manifest.source_file.clone();

        let records: Vec<T> = outcome
            .rows
            .into_iter()
            .map(|row| {
                let provenance = Provenance {
                    ingestion_timestamp,
                    source_file: source_file.clone(),
                    record_hash: record_hash(&row),
                };
                make(row, provenance)
            })
            .collect();

        let snapshot = BronzeSnapshot {
            id: Uuid::new_v4(),
            records,
            manifest: outcome.manifest,
        };

        fs::create_dir_all(&self.root)?;
        let path = self.root.join(format!("{}_{}.json", R::KIND, snapshot.id));
        fs::write(&path, serde_json::to_string_pretty(&snapshot)?)?;
        info!(
            "Bronze snapshot {} written: {} {} records ({} rejected at load)",
            snapshot.id,
            snapshot.records.len(),
            R::KIND,
            snapshot.manifest.records_rejected
        );

        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customer(id: &str) -> CustomerRow {
        CustomerRow {
            customer_id: id.to_string(),
            customer_name: "Aarav".to_string(),
            mobile_number: "9876543210".to_string(),
            region: "North".to_string(),
        }
    }

    fn manifest(loaded: usize, rejected: usize) -> LoadManifest {
        LoadManifest {
            source_file: "customers.csv".to_string(),
            file_checksum: "abc".to_string(),
            records_loaded: loaded,
            records_rejected: rejected,
            warnings: Vec::new(),
        }
    }

    #[test]
    fn record_hash_is_deterministic_and_ignores_provenance() {
        let a = customer("CUST001");
        let b = customer("CUST001");
        assert_eq!(record_hash(&a), record_hash(&b));

        let c = customer("CUST002");
        assert_ne!(record_hash(&a), record_hash(&c));
    }

    #[test]
    fn write_stamps_provenance_on_every_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = BronzeStore::new(dir.path());

        let outcome = LoadOutcome {
            rows: vec![customer("CUST001"), customer("CUST002")],
            manifest: manifest(2, 0),
        };
        let snapshot = store.write_customers(outcome).unwrap();

        assert_eq!(snapshot.records.len(), 2);
        for record in &snapshot.records {
            assert_eq!(record.provenance.source_file, "customers.csv");
            assert_eq!(record.provenance.record_hash.len(), 64);
        }
        assert!(dir.path().join("bronze").read_dir().unwrap().count() == 1);
    }

    #[test]
    fn empty_source_is_fatal_but_fully_rejected_is_not() {
        let dir = tempfile::tempdir().unwrap();
        let store = BronzeStore::new(dir.path());

        let empty = LoadOutcome::<CustomerRow> {
            rows: Vec::new(),
            manifest: manifest(0, 0),
        };
        assert!(store.write_customers(empty).is_err());

        let rejected_only = LoadOutcome::<CustomerRow> {
            rows: Vec::new(),
            manifest: manifest(0, 3),
        };
        let snapshot = store.write_customers(rejected_only).unwrap();
        assert!(snapshot.records.is_empty());
        assert_eq!(snapshot.manifest.records_rejected, 3);
    }
}
