// src/bin/evaluate_buyer_matching.rs
//
// Scores an oracle against the labelled buyer-name benchmark, once per
// prompt file in the prompts directory. Runs whose prompt, dataset and
// settings are unchanged since a stored run are skipped unless --force.

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use reconcile_lib::evaluation::harness::{discover_prompts, run_evaluation, EvaluationSettings, RunOutcome};
use reconcile_lib::evaluation::run_store::RunStore;
use reconcile_lib::matching::factory::build_oracle;
use reconcile_lib::models::matching::OracleKind;
use reconcile_lib::utils::config::MatchingConfig;
use reconcile_lib::utils::progress_config::ProgressConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct EvalArgs {
    /// Benchmark CSV with Input Name, Match Option, Error Type, Entity Type
    #[arg(long, default_value = "data/buyer_matching_benchmark.csv")]
    dataset: PathBuf,

    /// Directory scanned for prompt files
    #[arg(long, default_value = "prompts")]
    prompts_dir: PathBuf,

    /// Evaluate this prompt only
    #[arg(long)]
    prompt: Option<PathBuf>,

    /// Oracle override: local, ollama, azure or http
    #[arg(long)]
    oracle: Option<String>,

    #[arg(long)]
    num_distractors: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long)]
    threshold: Option<f64>,

    #[arg(long)]
    experiment: Option<String>,

    /// Re-run even when an identical run is stored
    #[arg(long)]
    force: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    reconcile_lib::utils::env::load_env();
    env_logger::init();

    let args = EvalArgs::parse();
    let mut config = MatchingConfig::from_env().context("Invalid configuration")?;
    if let Some(kind) = &args.oracle {
        config.oracle_kind = kind.parse::<OracleKind>().map_err(anyhow::Error::msg)?;
    }
    if let Some(n) = args.num_distractors {
        config.num_distractors = n;
    }
    if let Some(seed) = args.seed {
        config.random_seed = seed;
    }
    if let Some(threshold) = args.threshold {
        config
            .set_similarity_threshold(threshold)
            .context("Invalid --threshold")?;
    }
    if let Some(experiment) = &args.experiment {
        config.experiment_name = experiment.clone();
    }

    let prompts = match &args.prompt {
        Some(prompt) => vec![prompt.clone()],
        None => discover_prompts(&args.prompts_dir, &config.prompt_file_pattern)?,
    };
    if prompts.is_empty() {
        warn!(
            "No prompt files matching {} in {}",
            config.prompt_file_pattern,
            args.prompts_dir.display()
        );
        return Ok(());
    }
    info!(
        "Evaluating {} prompt(s) with the {} oracle ({} distractors, seed {}, threshold {:.2})",
        prompts.len(),
        config.oracle_kind,
        config.num_distractors,
        config.random_seed,
        config.similarity_threshold
    );

    let settings = EvaluationSettings::from_config(&config);
    let store = RunStore::new(config.runs_dir.clone());
    let progress = ProgressConfig::from_env();

    let mut completed = 0;
    let mut skipped = 0;
    for prompt in &prompts {
        let oracle = build_oracle(&config, prompt)?;
        let outcome = run_evaluation(
            oracle.as_ref(),
            prompt,
            &args.dataset,
            &settings,
            &store,
            args.force,
            &progress,
        )
        .await
        .with_context(|| format!("Evaluation failed for {}", prompt.display()))?;

        match outcome {
            RunOutcome::Skipped { run_dir } => {
                skipped += 1;
                info!("⏭️  {} unchanged; existing run at {}", prompt.display(), run_dir.display());
            }
            RunOutcome::Completed { run_dir, summary } => {
                completed += 1;
                info!(
                    "✅ {}: accuracy {:.3} over {} cases -> {}",
                    summary.prompt_file,
                    summary.accuracy_overall,
                    summary.rows,
                    run_dir.display()
                );
                for (metric, value) in &summary.metrics {
                    info!("   {} = {:.3}", metric, value);
                }
            }
        }
    }

    info!("=== Evaluation Summary ===");
    info!("Prompts evaluated: {}, skipped: {}", completed, skipped);
    Ok(())
}
