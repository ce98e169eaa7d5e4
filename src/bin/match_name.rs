// src/bin/match_name.rs
//
// Resolves a single name against an explicit candidate list with any oracle.
// HTTP-adapter failures surface as errors here rather than a quiet "None".

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use reconcile_lib::matching::factory::build_oracle;
use reconcile_lib::matching::resolve_and_validate;
use reconcile_lib::models::matching::OracleKind;
use reconcile_lib::utils::config::MatchingConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct MatchArgs {
    /// Name to resolve
    input: String,

    /// Candidate names (repeat the flag)
    #[arg(long = "candidate", required = true)]
    candidates: Vec<String>,

    /// Oracle override: local, ollama, azure or http
    #[arg(long)]
    oracle: Option<String>,

    #[arg(long)]
    prompt: Option<PathBuf>,

    #[arg(long)]
    threshold: Option<f64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    reconcile_lib::utils::env::load_env();
    env_logger::init();

    let args = MatchArgs::parse();
    let mut config = MatchingConfig::from_env().context("Invalid configuration")?;
    if let Some(kind) = &args.oracle {
        config.oracle_kind = kind.parse::<OracleKind>().map_err(anyhow::Error::msg)?;
    }
    if let Some(prompt) = &args.prompt {
        config.prompt_path = prompt.clone();
    }
    if let Some(threshold) = args.threshold {
        config
            .set_similarity_threshold(threshold)
            .context("Invalid --threshold")?;
    }

    let oracle = build_oracle(&config, &config.prompt_path)?;
    info!(
        "Resolving {:?} against {} candidates with the {} oracle",
        args.input,
        args.candidates.len(),
        oracle.kind()
    );
    let decision = resolve_and_validate(oracle.as_ref(), &args.input, &args.candidates)
        .await
        .with_context(|| format!("Failed to resolve {:?}", args.input))?;

    let output = serde_json::json!({
        "input_string": args.input,
        "match": decision.matched_name(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
