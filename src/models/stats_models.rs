// src/models/stats_models.rs
use serde::{Deserialize, Serialize};

/// Counters for one reconciliation run, echoed in the final summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconcileStats {
    pub total_contracts: usize,
    pub keyed_contracts: usize,
    pub total_mi_rows: usize,
    pub candidate_pool_size: usize,
    pub exact_matched_rows: usize,
    pub exempt_rows: usize,
    pub missing_key_rows: usize,
    pub residual_rows: usize,
    pub unique_residual_names: usize,
    pub oracle_matches_accepted: usize,
    pub oracle_matched_rows: usize,
    pub final_unmatched_rows: usize,
    pub join_time: f64,
    pub oracle_time: f64,
}

impl ReconcileStats {
    /// Share of MI rows that ended up joined to a contract.
    pub fn match_rate(&self) -> f64 {
        if self.total_mi_rows == 0 {
            return 0.0;
        }
        (self.exact_matched_rows + self.oracle_matched_rows) as f64 / self.total_mi_rows as f64
    }
}

/// Counters kept by the batch dispatcher across chunks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchStats {
    pub chunks_sent: usize,
    pub names_sent: usize,
    pub cache_hits: usize,
    pub tokens_dispatched: usize,
    pub throttle_waits: usize,
    pub rejected_responses: usize,
    /// Provider calls that failed and were recorded as no match.
    pub failed_requests: usize,
}
