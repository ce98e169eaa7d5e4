// src/models/matching.rs
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::models::records::{ContractRecord, MiRecord};

/// The single reserved value meaning "no valid match".
pub const NO_MATCH: &str = "None";

/// Outcome of resolving one residual name. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchDecision {
    Matched(String),
    NoMatch,
}

impl MatchDecision {
    pub fn as_str(&self) -> &str {
        match self {
            MatchDecision::Matched(name) => name.as_str(),
            MatchDecision::NoMatch => NO_MATCH,
        }
    }

    pub fn matched_name(&self) -> Option<&str> {
        match self {
            MatchDecision::Matched(name) => Some(name.as_str()),
            MatchDecision::NoMatch => None,
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, MatchDecision::Matched(_))
    }
}

impl fmt::Display for MatchDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which oracle variant produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OracleKind {
    Local,
    Ollama,
    Azure,
    Http,
}

impl OracleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OracleKind::Local => "local",
            OracleKind::Ollama => "ollama",
            OracleKind::Azure => "azure",
            OracleKind::Http => "http",
        }
    }
}

impl FromStr for OracleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" | "similarity" | "mock" => Ok(OracleKind::Local),
            "ollama" => Ok(OracleKind::Ollama),
            "azure" | "azure_openai" => Ok(OracleKind::Azure),
            "http" | "api" => Ok(OracleKind::Http),
            other => Err(format!("unknown oracle kind '{}'", other)),
        }
    }
}

impl fmt::Display for OracleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an MI row came to be joined onto a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchSource {
    Exact,
    Oracle { original_name: String },
}

impl MatchSource {
    pub fn label(&self) -> &'static str {
        match self {
            MatchSource::Exact => "exact",
            MatchSource::Oracle { .. } => "oracle",
        }
    }
}

/// Why an MI row is still unjoined after both passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnmatchedReason {
    /// Customer name already exists among contract buyers; the supplier key is
    /// what failed, so the row was never escalated.
    IdentifierMismatch,
    MissingSupplierKey,
    NoOracleMatch,
    /// The oracle picked a buyer, but that buyer has no contract with this supplier.
    NoContractForMatch,
    OracleDisabled,
}

impl UnmatchedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnmatchedReason::IdentifierMismatch => "identifier_mismatch",
            UnmatchedReason::MissingSupplierKey => "missing_supplier_key",
            UnmatchedReason::NoOracleMatch => "no_oracle_match",
            UnmatchedReason::NoContractForMatch => "no_contract_for_match",
            UnmatchedReason::OracleDisabled => "oracle_disabled",
        }
    }
}

/// A contract with at most one joined MI line. Contracts without spend
/// appear once with `spend: None`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledRow {
    pub contract: ContractRecord,
    pub supplier_key: String,
    pub spend: Option<MiRecord>,
    pub source: Option<MatchSource>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnmatchedRow {
    pub record: MiRecord,
    pub reason: UnmatchedReason,
    /// The oracle's answer, when one was sought.
    pub decision: Option<MatchDecision>,
}
