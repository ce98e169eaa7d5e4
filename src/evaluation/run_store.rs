// src/evaluation/run_store.rs
//
// Local run directory store: `<root>/<experiment>/<run_name>/` holding
// predictions.csv, summary.json and a copy of the prompt.
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::evaluation::harness::CasePrediction;

pub const PREDICTIONS_FILE: &str = "predictions.csv";
pub const SUMMARY_FILE: &str = "summary.json";

/// Everything that must match for a previous run to count as this run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunKey {
    pub experiment_name: String,
    pub prompt_sha256: String,
    pub dataset_sha256: String,
    pub oracle: String,
    pub num_distractors: usize,
    pub seed: u64,
    pub similarity_threshold: f64,
}

impl RunKey {
    pub fn matches(&self, summary: &RunSummary) -> bool {
        self.experiment_name == summary.experiment_name
            && self.prompt_sha256 == summary.prompt_sha256
            && self.dataset_sha256 == summary.dataset_sha256
            && self.oracle == summary.oracle
            && self.num_distractors == summary.num_distractors
            && self.seed == summary.seed
            && self.similarity_threshold == summary.similarity_threshold
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub experiment_name: String,
    pub run_name: String,
    pub prompt_file: String,
    pub prompt_sha256: String,
    pub dataset_file: String,
    pub dataset_sha256: String,
    pub oracle: String,
    pub num_distractors: usize,
    pub seed: u64,
    pub similarity_threshold: f64,
    pub rows: usize,
    pub candidate_pool_size: usize,
    pub accuracy_overall: f64,
    pub accuracy_by_error_type: BTreeMap<String, f64>,
    pub accuracy_by_entity_type: BTreeMap<String, f64>,
    pub metrics: BTreeMap<String, f64>,
    pub created_at: DateTime<Utc>,
}

/// `<prompt stem>_<oracle>_<UTC timestamp>`
pub fn run_name(prompt_stem: &str, oracle: &str, now: DateTime<Utc>) -> String {
    format!("{}_{}_{}", prompt_stem, oracle, now.format("%Y%m%d_%H%M%S"))
}

pub struct RunStore {
    root: PathBuf,
}

impl RunStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn experiment_dir(&self, experiment_name: &str) -> PathBuf {
        self.root.join(experiment_name)
    }

    /// First stored run (in directory-name order) whose summary matches `key`.
    pub fn find_existing(&self, key: &RunKey) -> Result<Option<PathBuf>> {
        let dir = self.experiment_dir(&key.experiment_name);
        if !dir.is_dir() {
            return Ok(None);
        }
        let mut run_dirs: Vec<PathBuf> = fs::read_dir(&dir)
            .with_context(|| format!("Failed to list runs in {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_dir())
            .collect();
        run_dirs.sort();

        for run_dir in run_dirs {
            let summary_path = run_dir.join(SUMMARY_FILE);
            let Ok(text) = fs::read_to_string(&summary_path) else {
                continue;
            };
            match serde_json::from_str::<RunSummary>(&text) {
                Ok(summary) if key.matches(&summary) => return Ok(Some(run_dir)),
                Ok(_) => {}
                Err(e) => warn!("Ignoring unreadable run summary {}: {}", summary_path.display(), e),
            }
        }
        Ok(None)
    }

    pub fn persist(
        &self,
        summary: &RunSummary,
        predictions: &[CasePrediction],
        prompt_path: Option<&Path>,
    ) -> Result<PathBuf> {
        let run_dir = self.free_run_dir(&summary.experiment_name, &summary.run_name);
        fs::create_dir_all(&run_dir)
            .with_context(|| format!("Failed to create run directory {}", run_dir.display()))?;

        let predictions_path = run_dir.join(PREDICTIONS_FILE);
        let mut writer = csv::Writer::from_path(&predictions_path)
            .with_context(|| format!("Failed to create {}", predictions_path.display()))?;
        for prediction in predictions {
            writer.serialize(prediction)?;
        }
        writer.flush()?;

        let summary_json = serde_json::to_string_pretty(summary)?;
        fs::write(run_dir.join(SUMMARY_FILE), summary_json)?;

        if let Some(prompt) = prompt_path {
            if let Some(file_name) = prompt.file_name() {
                fs::copy(prompt, run_dir.join(file_name))
                    .with_context(|| format!("Failed to copy prompt {}", prompt.display()))?;
            }
        }
        debug!("Persisted run artifacts to {}", run_dir.display());
        Ok(run_dir)
    }

    fn free_run_dir(&self, experiment_name: &str, run_name: &str) -> PathBuf {
        let base = self.experiment_dir(experiment_name);
        let mut candidate = base.join(run_name);
        let mut n = 1;
        while candidate.exists() {
            candidate = base.join(format!("{}_{}", run_name, n));
            n += 1;
        }
        candidate
    }
}
