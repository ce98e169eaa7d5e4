// src/evaluation/benchmark.rs
use std::collections::BTreeSet;
use std::path::Path;

use crate::errors::BenchmarkError;
use crate::matching::candidate_pool::{is_null_equivalent, CandidatePool};

pub const INPUT_NAME: &str = "Input Name";
pub const MATCH_OPTION: &str = "Match Option";
pub const ERROR_TYPE: &str = "Error Type";
pub const ENTITY_TYPE: &str = "Entity Type";

/// One labelled case. `ground_truth` is `None` when the label is null-equivalent.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkCase {
    pub input_name: String,
    pub ground_truth: Option<String>,
    pub error_type: String,
    pub entity_type: String,
}

impl BenchmarkCase {
    pub fn is_negative_control(&self) -> bool {
        self.error_type
            .trim()
            .to_lowercase()
            .starts_with("negative control")
            || self.ground_truth.is_none()
    }
}

fn column_index(headers: &csv::StringRecord, column: &str) -> Result<usize, BenchmarkError> {
    let wanted = column.to_lowercase();
    headers
        .iter()
        .position(|h| h.trim().to_lowercase() == wanted)
        .ok_or_else(|| BenchmarkError::MissingColumn {
            column: column.to_string(),
            found: headers.iter().map(|h| h.to_string()).collect(),
        })
}

pub fn read_benchmark<R: std::io::Read>(reader: R) -> Result<Vec<BenchmarkCase>, BenchmarkError> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = rdr.headers()?.clone();
    let input_idx = column_index(&headers, INPUT_NAME)?;
    let match_idx = column_index(&headers, MATCH_OPTION)?;
    let error_idx = column_index(&headers, ERROR_TYPE)?;
    let entity_idx = column_index(&headers, ENTITY_TYPE)?;

    let mut cases = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let field = |idx: usize| record.get(idx).unwrap_or("").trim().to_string();
        let match_option = field(match_idx);
        cases.push(BenchmarkCase {
            input_name: field(input_idx),
            ground_truth: if is_null_equivalent(&match_option) {
                None
            } else {
                Some(match_option)
            },
            error_type: field(error_idx),
            entity_type: field(entity_idx),
        });
    }
    Ok(cases)
}

pub fn load_benchmark(path: &Path) -> Result<Vec<BenchmarkCase>, BenchmarkError> {
    if !path.exists() {
        return Err(BenchmarkError::NotFound(path.display().to_string()));
    }
    read_benchmark(std::fs::File::open(path)?)
}

/// Every labelled ground truth, which is the universe distractors come from.
pub fn benchmark_pool(cases: &[BenchmarkCase]) -> CandidatePool {
    let labels: BTreeSet<&str> = cases
        .iter()
        .filter_map(|c| c.ground_truth.as_deref())
        .collect();
    CandidatePool::from_names(labels)
}
