// src/data/mod.rs
//
// CSV ingestion of the three input feeds and the two reconciliation outputs.
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::path::Path;

use crate::errors::ConfigError;
use crate::models::matching::{MatchSource, ReconciledRow, UnmatchedRow};
use crate::models::records::{ContractRecord, MiRecord, RegistrationKeyPair};

pub fn read_records<T: DeserializeOwned, R: std::io::Read>(reader: R) -> Result<Vec<T>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .from_reader(reader);
    let mut records = Vec::new();
    for (idx, row) in rdr.deserialize().enumerate() {
        // +2: header line and 1-based numbering
        let record: T = row.with_context(|| format!("Invalid record on line {}", idx + 2))?;
        records.push(record);
    }
    Ok(records)
}

pub fn load_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.is_file() {
        return Err(ConfigError::MissingFile(path.display().to_string()).into());
    }
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    read_records(file).with_context(|| format!("Failed to read {}", path.display()))
}

pub fn load_contracts(path: &Path) -> Result<Vec<ContractRecord>> {
    load_records(path)
}

pub fn load_mi(path: &Path) -> Result<Vec<MiRecord>> {
    load_records(path)
}

pub fn load_registration_keys(path: &Path) -> Result<Vec<RegistrationKeyPair>> {
    load_records(path)
}

/// Flat output row: contract columns, then the joined spend line if any.
#[derive(Debug, Serialize)]
struct CombinedCsvRow<'a> {
    buyer: &'a str,
    suppliers: &'a str,
    registration_number: &'a str,
    supplier_key: &'a str,
    contract_start: Option<&'a str>,
    contract_end: Option<&'a str>,
    contract_months: Option<f64>,
    contract_title: Option<&'a str>,
    award_value: Option<f64>,
    customer_name: Option<&'a str>,
    financial_year: Option<&'a str>,
    financial_month: Option<&'a str>,
    evidenced_spend: Option<f64>,
    match_source: Option<&'static str>,
    original_customer_name: Option<&'a str>,
}

impl<'a> From<&'a ReconciledRow> for CombinedCsvRow<'a> {
    fn from(row: &'a ReconciledRow) -> Self {
        let spend = row.spend.as_ref();
        let original = match &row.source {
            Some(MatchSource::Oracle { original_name }) => {
                Some(original_name.as_str())
            }
            _ => None,
        };
        Self {
            buyer: &row.contract.buyer,
            suppliers: &row.contract.suppliers,
            registration_number: &row.contract.registration_number,
            supplier_key: &row.supplier_key,
            contract_start: row.contract.contract_start.as_deref(),
            contract_end: row.contract.contract_end.as_deref(),
            contract_months: row.contract.contract_months,
            contract_title: row.contract.contract_title.as_deref(),
            award_value: row.contract.award_value,
            customer_name: spend.map(|s| s.customer_name.as_str()),
            financial_year: spend.and_then(|s| s.financial_year.as_deref()),
            financial_month: spend.and_then(|s| s.financial_month.as_deref()),
            evidenced_spend: spend.and_then(|s| s.evidenced_spend),
            match_source: row.source.as_ref().map(|s| s.label()),
            original_customer_name: original,
        }
    }
}

#[derive(Debug, Serialize)]
struct UnmatchedCsvRow<'a> {
    supplier_name: &'a str,
    supplier_key: &'a str,
    customer_name: &'a str,
    financial_year: Option<&'a str>,
    financial_month: Option<&'a str>,
    evidenced_spend: Option<f64>,
    reason: &'static str,
    oracle_answer: Option<&'a str>,
}

impl<'a> From<&'a UnmatchedRow> for UnmatchedCsvRow<'a> {
    fn from(row: &'a UnmatchedRow) -> Self {
        Self {
            supplier_name: &row.record.supplier_name,
            supplier_key: &row.record.supplier_key,
            customer_name: &row.record.customer_name,
            financial_year: row.record.financial_year.as_deref(),
            financial_month: row.record.financial_month.as_deref(),
            evidenced_spend: row.record.evidenced_spend,
            reason: row.reason.as_str(),
            oracle_answer: row.decision.as_ref().map(|d| d.as_str()),
        }
    }
}

fn write_rows<S: Serialize>(path: &Path, rows: impl Iterator<Item = S>) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("Failed to create {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_combined(path: &Path, rows: &[ReconciledRow]) -> Result<()> {
    write_rows(path, rows.iter().map(CombinedCsvRow::from))
}

pub fn write_unmatched(path: &Path, rows: &[UnmatchedRow]) -> Result<()> {
    write_rows(path, rows.iter().map(UnmatchedCsvRow::from))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::matching::{MatchDecision, UnmatchedReason};
    use crate::models::records::fixtures::{contract, mi};
    use std::fs;

    #[test]
    fn test_contract_headers_and_aliases() {
        let csv = "\
Contracting Authority,Supplier,Supplier Company Registration Number,Award Value
Cabinet Office,Acme Ltd,01234567,
Home Office,Widgets plc,SC99,250000
";
        let contracts: Vec<ContractRecord> = read_records(csv.as_bytes()).unwrap();
        assert_eq!(contracts.len(), 2);
        assert_eq!(contracts[0].buyer, "Cabinet Office");
        assert_eq!(contracts[0].registration_number, "01234567");
        assert_eq!(contracts[0].award_value, None);
        assert_eq!(contracts[1].award_value, Some(250000.0));
    }

    #[test]
    fn test_mi_keys_stay_raw() {
        let csv = "\
SupplierName,SupplierKey,CustomerName,EvidencedSpend
Acme,1.0,Cabinet Office,100.5
Acme,,Home Office,not-a-number
";
        let rows: Vec<MiRecord> = read_records(csv.as_bytes()).unwrap();
        assert_eq!(rows[0].supplier_key, "1.0");
        assert_eq!(rows[1].supplier_key, "");
        assert_eq!(rows[1].evidenced_spend, None);
    }

    #[test]
    fn test_missing_input_is_config_error() {
        let err = load_contracts(Path::new("/no/such/contracts.csv")).unwrap_err();
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }

    #[test]
    fn test_outputs_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let combined = dir.path().join("combined.csv");
        let unmatched = dir.path().join("unmatched.csv");

        let rows = vec![ReconciledRow {
            contract: contract("Department for Work and Pensions", "1"),
            supplier_key: "1".into(),
            spend: Some(mi("1", "DWP")),
            source: Some(MatchSource::Oracle {
                original_name: "DWP".into(),
            }),
        }];
        write_combined(&combined, &rows).unwrap();
        let text = fs::read_to_string(&combined).unwrap();
        assert!(text.lines().next().unwrap().starts_with("buyer,suppliers,"));
        assert!(text.contains(",oracle,DWP"));

        let left = vec![UnmatchedRow {
            record: mi("1", "Mystery Buyer"),
            reason: UnmatchedReason::NoOracleMatch,
            decision: Some(MatchDecision::NoMatch),
        }];
        write_unmatched(&unmatched, &left).unwrap();
        let text = fs::read_to_string(&unmatched).unwrap();
        assert!(text.contains("no_oracle_match,None"));
    }
}
