// src/matching/candidate_pool.rs
use std::collections::{BTreeSet, HashSet};

use crate::models::records::ContractRecord;

const NULL_EQUIVALENTS: [&str; 4] = ["", "n/a", "na", "none"];

/// `""`, `"n/a"`, `"na"` and `"none"`, compared case-insensitively after trimming.
pub fn is_null_equivalent(value: &str) -> bool {
    let lowered = value.trim().to_lowercase();
    NULL_EQUIVALENTS.contains(&lowered.as_str())
}

/// The closed universe of legitimate match targets: distinct, non-null
/// counterparty names held in ascending order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidatePool {
    names: Vec<String>,
    lowered: HashSet<String>,
}

impl CandidatePool {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let distinct: BTreeSet<String> = names
            .into_iter()
            .map(|n| n.as_ref().to_string())
            .filter(|n| !is_null_equivalent(n))
            .collect();
        let lowered = distinct.iter().map(|n| n.to_lowercase()).collect();
        Self {
            names: distinct.into_iter().collect(),
            lowered,
        }
    }

    pub fn from_contracts<'a, I>(contracts: I) -> Self
    where
        I: IntoIterator<Item = &'a ContractRecord>,
    {
        Self::from_names(contracts.into_iter().map(|c| c.buyer.as_str()))
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.binary_search_by(|n| n.as_str().cmp(name)).is_ok()
    }

    pub fn contains_ignore_case(&self, name: &str) -> bool {
        self.lowered.contains(&name.to_lowercase())
    }

    /// The pool in canonical order minus the query itself.
    pub fn candidates_for(&self, input_name: &str) -> Vec<String> {
        self.names
            .iter()
            .filter(|n| n.as_str() != input_name)
            .cloned()
            .collect()
    }
}
