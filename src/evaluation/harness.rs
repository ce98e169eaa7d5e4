// src/evaluation/harness.rs
//
// Offline accuracy runs of an oracle over a labelled benchmark.
use anyhow::{Context, Result};
use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{ConfigError, OracleError};
use crate::evaluation::benchmark::{benchmark_pool, load_benchmark, BenchmarkCase};
use crate::evaluation::candidates::build_candidate_list;
use crate::evaluation::run_store::{run_name, RunKey, RunStore, RunSummary};
use crate::matching::candidate_pool::CandidatePool;
use crate::matching::oracle::{resolve_and_validate, MatchOracle};
use crate::models::matching::{MatchDecision, NO_MATCH};
use crate::utils::config::MatchingConfig;
use crate::utils::hashing::file_sha256;
use crate::utils::logging::{Stage, StageLogger};
use crate::utils::progress_config::ProgressConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationSettings {
    pub experiment_name: String,
    pub num_distractors: usize,
    pub seed: u64,
    pub similarity_threshold: f64,
    /// Total attempts per case for retryable oracle errors.
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl EvaluationSettings {
    pub fn from_config(config: &MatchingConfig) -> Self {
        Self {
            experiment_name: config.experiment_name.clone(),
            num_distractors: config.num_distractors,
            seed: config.random_seed,
            similarity_threshold: config.similarity_threshold,
            max_retries: config.oracle_max_retries,
            retry_delay: Duration::from_millis(1000),
        }
    }
}

/// One row of predictions.csv.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CasePrediction {
    pub input_name: String,
    pub ground_truth: String,
    pub prediction: String,
    pub correct: bool,
    pub error_type: String,
    pub entity_type: String,
    pub is_negative_control: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AccuracyReport {
    pub overall: f64,
    pub by_error_type: BTreeMap<String, f64>,
    pub by_entity_type: BTreeMap<String, f64>,
}

pub fn is_correct(decision: &MatchDecision, case: &BenchmarkCase, is_negative: bool) -> bool {
    if is_negative {
        *decision == MatchDecision::NoMatch
    } else {
        decision.matched_name() == case.ground_truth.as_deref()
    }
}

fn group_mean<'a>(items: impl Iterator<Item = (&'a str, bool)>) -> BTreeMap<String, f64> {
    let mut tallies: BTreeMap<String, (usize, usize)> = BTreeMap::new();
    for (group, correct) in items {
        let entry = tallies.entry(group.to_string()).or_default();
        entry.0 += correct as usize;
        entry.1 += 1;
    }
    tallies
        .into_iter()
        .map(|(group, (hits, total))| (group, hits as f64 / total as f64))
        .collect()
}

pub fn score_predictions(predictions: &[CasePrediction]) -> AccuracyReport {
    if predictions.is_empty() {
        return AccuracyReport::default();
    }
    let hits = predictions.iter().filter(|p| p.correct).count();
    AccuracyReport {
        overall: hits as f64 / predictions.len() as f64,
        by_error_type: group_mean(predictions.iter().map(|p| (p.error_type.as_str(), p.correct))),
        by_entity_type: group_mean(predictions.iter().map(|p| (p.entity_type.as_str(), p.correct))),
    }
}

/// Lowercase, with spaces and hyphens turned into underscores.
pub fn sanitize_metric_key(raw: &str) -> String {
    raw.trim().to_lowercase().replace([' ', '-'], "_")
}

pub fn metrics_map(report: &AccuracyReport) -> BTreeMap<String, f64> {
    let mut metrics = BTreeMap::new();
    metrics.insert("accuracy_overall".to_string(), report.overall);
    for (group, value) in &report.by_error_type {
        metrics.insert(format!("accuracy_error_{}", sanitize_metric_key(group)), *value);
    }
    for (group, value) in &report.by_entity_type {
        metrics.insert(format!("accuracy_entity_{}", sanitize_metric_key(group)), *value);
    }
    metrics
}

async fn resolve_with_retry(
    oracle: &dyn MatchOracle,
    input_name: &str,
    candidates: &[String],
    settings: &EvaluationSettings,
    logger: &StageLogger,
) -> Result<MatchDecision, OracleError> {
    let attempts = settings.max_retries.max(1);
    let mut attempt = 1;
    loop {
        match resolve_and_validate(oracle, input_name, candidates).await {
            Ok(decision) => return Ok(decision),
            Err(e) if e.is_retryable() && attempt < attempts => {
                logger.log_warning(&format!(
                    "Attempt {}/{} for {:?} failed: {}. Retrying...",
                    attempt, attempts, input_name, e
                ));
                tokio::time::sleep(settings.retry_delay * attempt).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Runs every case through oracle and validator, in benchmark order.
pub async fn evaluate_cases(
    oracle: &dyn MatchOracle,
    cases: &[BenchmarkCase],
    pool: &CandidatePool,
    settings: &EvaluationSettings,
    progress: &ProgressConfig,
) -> Result<Vec<CasePrediction>, OracleError> {
    let logger = StageLogger::new(Stage::Eval);
    let pb = progress.create_bar(cases.len() as u64, "Evaluating benchmark cases");

    let mut predictions = Vec::with_capacity(cases.len());
    for case in cases {
        let is_negative = case.is_negative_control();
        let candidates = build_candidate_list(
            &case.input_name,
            case.ground_truth.as_deref(),
            pool,
            settings.num_distractors,
            settings.seed,
            is_negative,
        );
        let decision =
            resolve_with_retry(oracle, &case.input_name, &candidates, settings, &logger).await?;
        predictions.push(CasePrediction {
            input_name: case.input_name.clone(),
            ground_truth: case
                .ground_truth
                .clone()
                .unwrap_or_else(|| NO_MATCH.to_string()),
            prediction: decision.to_string(),
            correct: is_correct(&decision, case, is_negative),
            error_type: case.error_type.clone(),
            entity_type: case.entity_type.clone(),
            is_negative_control: is_negative,
        });
        if let Some(pb) = &pb {
            pb.inc(1);
        }
    }
    if let Some(pb) = pb {
        pb.finish_with_message("Benchmark cases evaluated");
    }
    Ok(predictions)
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Skipped { run_dir: PathBuf },
    Completed { run_dir: PathBuf, summary: RunSummary },
}

/// Prompt files in `dir` whose names match `pattern`, sorted by name.
pub fn discover_prompts(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let re = Regex::new(pattern).with_context(|| format!("Invalid prompt pattern {:?}", pattern))?;
    if !dir.is_dir() {
        return Err(ConfigError::MissingFile(dir.display().to_string()).into());
    }
    let mut prompts: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to list prompts in {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .map_or(false, |n| re.is_match(n))
        })
        .collect();
    prompts.sort();
    Ok(prompts)
}

/// Evaluates one prompt against one benchmark file, unless an identical
/// run is already stored and `force` is off.
pub async fn run_evaluation(
    oracle: &dyn MatchOracle,
    prompt_path: &Path,
    dataset_path: &Path,
    settings: &EvaluationSettings,
    store: &RunStore,
    force: bool,
    progress: &ProgressConfig,
) -> Result<RunOutcome> {
    let logger = StageLogger::new(Stage::Eval);
    if !prompt_path.is_file() {
        return Err(ConfigError::MissingFile(prompt_path.display().to_string()).into());
    }
    let cases = load_benchmark(dataset_path)
        .with_context(|| format!("Failed to load benchmark {}", dataset_path.display()))?;
    let pool = benchmark_pool(&cases);
    logger.log_data_loaded(cases.len(), "benchmark");

    let key = RunKey {
        experiment_name: settings.experiment_name.clone(),
        prompt_sha256: file_sha256(prompt_path)?,
        dataset_sha256: file_sha256(dataset_path)?,
        oracle: oracle.kind().to_string(),
        num_distractors: settings.num_distractors,
        seed: settings.seed,
        similarity_threshold: settings.similarity_threshold,
    };
    if !force {
        if let Some(run_dir) = store.find_existing(&key)? {
            logger.log_phase(
                "Skip",
                Some(&format!(
                    "{} unchanged since {}",
                    prompt_path.display(),
                    run_dir.display()
                )),
            );
            return Ok(RunOutcome::Skipped { run_dir });
        }
    }

    logger.log_phase(
        "Evaluate",
        Some(&format!(
            "{} cases, pool of {}, {} distractors, oracle {}",
            cases.len(),
            pool.len(),
            settings.num_distractors,
            oracle.kind()
        )),
    );
    let predictions = evaluate_cases(oracle, &cases, &pool, settings, progress)
        .await
        .with_context(|| format!("Evaluation of {} aborted", prompt_path.display()))?;
    let report = score_predictions(&predictions);

    let now = Utc::now();
    let prompt_stem = prompt_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("prompt");
    let summary = RunSummary {
        experiment_name: key.experiment_name.clone(),
        run_name: run_name(prompt_stem, oracle.kind().as_str(), now),
        prompt_file: prompt_path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string(),
        prompt_sha256: key.prompt_sha256.clone(),
        dataset_file: dataset_path.display().to_string(),
        dataset_sha256: key.dataset_sha256.clone(),
        oracle: key.oracle.clone(),
        num_distractors: settings.num_distractors,
        seed: settings.seed,
        similarity_threshold: settings.similarity_threshold,
        rows: predictions.len(),
        candidate_pool_size: pool.len(),
        accuracy_overall: report.overall,
        metrics: metrics_map(&report),
        accuracy_by_error_type: report.by_error_type,
        accuracy_by_entity_type: report.by_entity_type,
        created_at: now,
    };
    let run_dir = store.persist(&summary, &predictions, Some(prompt_path))?;
    logger.log_completion(&format!(
        "{} accuracy {:.3} over {} cases",
        summary.prompt_file, summary.accuracy_overall, summary.rows
    ));
    Ok(RunOutcome::Completed { run_dir, summary })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::http_oracle::test_support::FakeTransport;
    use crate::matching::http_oracle::HttpMatchOracle;
    use crate::matching::similarity::LocalSimilarityOracle;

    const BENCHMARK: &str = "\
Input Name,Match Option,Error Type,Entity Type
Cabinet Ofice,Cabinet Office,Typo,Central Government
Home Ofice,Home Office,Typo,Central Government
DWP,Department for Work and Pensions,Acronym,Central Government
Acme Widgets Ltd,,Negative Control,Private Sector
";

    fn settings() -> EvaluationSettings {
        EvaluationSettings {
            experiment_name: "test-exp".into(),
            num_distractors: 20,
            seed: 42,
            similarity_threshold: 0.85,
            max_retries: 3,
            retry_delay: Duration::ZERO,
        }
    }

    fn quiet() -> ProgressConfig {
        ProgressConfig {
            enabled: false,
            ..Default::default()
        }
    }

    fn prediction(error: &str, entity: &str, correct: bool) -> CasePrediction {
        CasePrediction {
            input_name: "x".into(),
            ground_truth: "y".into(),
            prediction: "y".into(),
            correct,
            error_type: error.into(),
            entity_type: entity.into(),
            is_negative_control: false,
        }
    }

    #[test]
    fn test_stratified_accuracy() {
        let report = score_predictions(&[
            prediction("Typo", "Council", true),
            prediction("Typo", "Council", false),
            prediction("Acronym", "Central Government", true),
            prediction("Acronym", "Council", true),
        ]);
        assert_eq!(report.overall, 0.75);
        assert_eq!(report.by_error_type["Typo"], 0.5);
        assert_eq!(report.by_error_type["Acronym"], 1.0);
        assert!((report.by_entity_type["Council"] - 2.0 / 3.0).abs() < 1e-9);

        let metrics = metrics_map(&report);
        assert_eq!(metrics["accuracy_overall"], 0.75);
        assert_eq!(metrics["accuracy_error_typo"], 0.5);
        assert_eq!(metrics["accuracy_entity_central_government"], 1.0);
    }

    #[test]
    fn test_metric_keys_are_sanitized() {
        assert_eq!(sanitize_metric_key("Negative Control - Unrelated"), "negative_control___unrelated");
        assert_eq!(sanitize_metric_key("Non-Departmental Body"), "non_departmental_body");
    }

    #[tokio::test]
    async fn test_local_oracle_scores_benchmark() {
        let cases = crate::evaluation::benchmark::read_benchmark(BENCHMARK.as_bytes()).unwrap();
        let pool = benchmark_pool(&cases);
        let oracle = LocalSimilarityOracle::new(0.85);
        let predictions = evaluate_cases(&oracle, &cases, &pool, &settings(), &quiet())
            .await
            .unwrap();

        assert_eq!(predictions.len(), 4);
        assert!(predictions[0].correct);
        assert!(predictions[1].correct);
        // an acronym is beyond plain string similarity
        assert!(!predictions[2].correct);
        assert_eq!(predictions[2].prediction, "None");
        assert!(predictions[3].is_negative_control);
        assert!(predictions[3].correct);
        assert_eq!(predictions[3].ground_truth, "None");
    }

    #[tokio::test]
    async fn test_retryable_errors_are_retried_then_surface() {
        let cases = vec![BenchmarkCase {
            input_name: "DWP".into(),
            ground_truth: Some("Department for Work and Pensions".into()),
            error_type: "Acronym".into(),
            entity_type: "Central Government".into(),
        }];
        let pool = CandidatePool::from_names(["Department for Work and Pensions", "Cabinet Office"]);

        let recovering = HttpMatchOracle::new(
            "http://localhost:8000/match",
            None,
            FakeTransport::new(vec![
                FakeTransport::status(503),
                FakeTransport::ok(r#"{"match":"Department for Work and Pensions"}"#),
            ]),
        )
        .unwrap();
        let predictions = evaluate_cases(&recovering, &cases, &pool, &settings(), &quiet())
            .await
            .unwrap();
        assert!(predictions[0].correct);

        let failing = HttpMatchOracle::new(
            "http://localhost:8000/match",
            None,
            FakeTransport::new(vec![
                FakeTransport::status(500),
                FakeTransport::status(500),
                FakeTransport::status(500),
            ]),
        )
        .unwrap();
        let err = evaluate_cases(&failing, &cases, &pool, &settings(), &quiet())
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::HttpStatus { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_unchanged_run_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let prompts = dir.path().join("prompts");
        fs::create_dir_all(&prompts).unwrap();
        let prompt = prompts.join("buyer_match_v1.txt");
        fs::write(&prompt, "Match {input_name} to one of {candidates}").unwrap();
        let dataset = dir.path().join("benchmark.csv");
        fs::write(&dataset, BENCHMARK).unwrap();
        let store = RunStore::new(dir.path().join("runs"));
        let oracle = LocalSimilarityOracle::new(0.85);

        let first = run_evaluation(&oracle, &prompt, &dataset, &settings(), &store, false, &quiet())
            .await
            .unwrap();
        let RunOutcome::Completed { run_dir, summary } = first else {
            panic!("first run should execute");
        };
        assert_eq!(summary.rows, 4);
        assert_eq!(summary.candidate_pool_size, 3);
        assert_eq!(summary.accuracy_overall, 0.75);
        assert!(summary.run_name.starts_with("buyer_match_v1_local_"));

        let second = run_evaluation(&oracle, &prompt, &dataset, &settings(), &store, false, &quiet())
            .await
            .unwrap();
        assert_eq!(second, RunOutcome::Skipped { run_dir });

        let forced = run_evaluation(&oracle, &prompt, &dataset, &settings(), &store, true, &quiet())
            .await
            .unwrap();
        assert!(matches!(forced, RunOutcome::Completed { .. }));

        let mut changed = settings();
        changed.num_distractors = 1;
        let rerun = run_evaluation(&oracle, &prompt, &dataset, &changed, &store, false, &quiet())
            .await
            .unwrap();
        assert!(matches!(rerun, RunOutcome::Completed { .. }));
    }

    #[tokio::test]
    async fn test_other_oracle_on_same_prompt_is_not_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let prompt = dir.path().join("buyer_match_v1.txt");
        fs::write(&prompt, "Match {input_name} to one of {candidates}").unwrap();
        let dataset = dir.path().join("benchmark.csv");
        fs::write(&dataset, BENCHMARK).unwrap();
        let store = RunStore::new(dir.path().join("runs"));

        let local = LocalSimilarityOracle::new(0.85);
        let first = run_evaluation(&local, &prompt, &dataset, &settings(), &store, false, &quiet())
            .await
            .unwrap();
        assert!(matches!(first, RunOutcome::Completed { .. }));

        let remote = HttpMatchOracle::new(
            "http://localhost:8000/match",
            None,
            FakeTransport::new((0..4).map(|_| FakeTransport::ok(r#"{"match":null}"#)).collect()),
        )
        .unwrap();
        let second = run_evaluation(&remote, &prompt, &dataset, &settings(), &store, false, &quiet())
            .await
            .unwrap();
        let RunOutcome::Completed { summary, .. } = second else {
            panic!("a different oracle must not reuse the local run");
        };
        assert_eq!(summary.oracle, "http");
        assert!(summary.run_name.starts_with("buyer_match_v1_http_"));

        let again = run_evaluation(&remote, &prompt, &dataset, &settings(), &store, false, &quiet())
            .await
            .unwrap();
        assert!(matches!(again, RunOutcome::Skipped { .. }));
    }

    #[test]
    fn test_prompt_discovery_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["buyer_match_v10.txt", "buyer_match_v2.txt", "notes.txt", "buyer_match_v2.txt.bak"] {
            fs::write(dir.path().join(name), "x").unwrap();
        }
        let found = discover_prompts(dir.path(), r"^buyer_match_v\d+\.txt$").unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["buyer_match_v10.txt", "buyer_match_v2.txt"]);
    }
}
