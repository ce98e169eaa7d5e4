// src/models/records.rs
//
// Row shapes for the three input feeds. Field aliases cover both the
// export headers and the warehouse column names.
use serde::{Deserialize, Serialize};

/// One contract notice from the authoritative contracts feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractRecord {
    #[serde(alias = "Contracting Authority")]
    pub buyer: String,
    #[serde(default, alias = "Supplier")]
    pub suppliers: String,
    #[serde(
        rename = "SupplierCompanyRegistrationNumber",
        alias = "Supplier Company Registration Number"
    )]
    pub registration_number: String,
    #[serde(default, alias = "Contract Start Date")]
    pub contract_start: Option<String>,
    #[serde(default, alias = "Contract End Date")]
    pub contract_end: Option<String>,
    #[serde(
        default,
        alias = "Contract Duration (Months)",
        deserialize_with = "csv::invalid_option"
    )]
    pub contract_months: Option<f64>,
    #[serde(default, alias = "Contract Title")]
    pub contract_title: Option<String>,
    #[serde(default, alias = "Contract Description")]
    pub contract_description: Option<String>,
    #[serde(
        default,
        alias = "Award Value",
        alias = "Total Contract Value - High (GBP)",
        deserialize_with = "csv::invalid_option"
    )]
    pub award_value: Option<f64>,
}

/// One self-reported spend line from the MI feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiRecord {
    #[serde(rename = "SupplierName", default)]
    pub supplier_name: String,
    /// Kept raw: the feed mixes "1", "1.0" and blanks.
    #[serde(rename = "SupplierKey")]
    pub supplier_key: String,
    #[serde(rename = "CustomerName")]
    pub customer_name: String,
    #[serde(rename = "FinancialYear", default)]
    pub financial_year: Option<String>,
    #[serde(rename = "FinancialMonth", default)]
    pub financial_month: Option<String>,
    #[serde(
        rename = "EvidencedSpend",
        default,
        deserialize_with = "csv::invalid_option"
    )]
    pub evidenced_spend: Option<f64>,
}

/// Bridge row linking a company registration number to a supplier key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationKeyPair {
    #[serde(
        rename = "SupplierCompanyRegistrationNumber",
        alias = "CompanyRegistrationNumber"
    )]
    pub registration_number: String,
    #[serde(rename = "SupplierKey")]
    pub supplier_key: String,
}
