use anyhow::{Context, Result};
use clap::Parser;
use indicatif::ProgressBar;
use log::{info, warn};
use reconcile_lib::data::{
    load_contracts, load_mi, load_registration_keys, write_combined, write_unmatched,
};
use reconcile_lib::matching::factory::build_resolver;
use reconcile_lib::matching::reconcile::reconcile_with;
use reconcile_lib::models::matching::OracleKind;
use reconcile_lib::utils::config::MatchingConfig;
use reconcile_lib::utils::env::load_env;
use reconcile_lib::utils::logging::{log_pipeline_phase, log_pipeline_start};
use reconcile_lib::utils::progress_config::{bar_style, ProgressConfig};
use std::fs;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct ReconcileArgs {
    /// Contracts CSV (buyer, supplier registration number, ...)
    #[arg(long, default_value = "data/contracts.csv")]
    contracts: PathBuf,

    /// MI spend CSV (SupplierKey, CustomerName, ...)
    #[arg(long, default_value = "data/mi.csv")]
    mi: PathBuf,

    /// Registration number to supplier key bridge CSV
    #[arg(long, default_value = "data/regkeys.csv")]
    reg_keys: PathBuf,

    #[arg(long, default_value = "output")]
    output_dir: PathBuf,

    /// Oracle override: local, ollama, azure or http
    #[arg(long)]
    oracle: Option<String>,

    /// Prompt template override
    #[arg(long)]
    prompt: Option<PathBuf>,

    /// Similarity threshold override for the local oracle
    #[arg(long)]
    threshold: Option<f64>,

    /// Exact join only; residuals are reported, not resolved
    #[arg(long)]
    no_oracle: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging and environment
    env_logger::init();
    info!("Starting contract / MI spend reconciliation pipeline");
    load_env();

    let args = ReconcileArgs::parse();
    let mut config = MatchingConfig::from_env().context("Invalid configuration")?;
    if let Some(kind) = &args.oracle {
        config.oracle_kind = kind
            .parse::<OracleKind>()
            .map_err(anyhow::Error::msg)?;
    }
    if let Some(prompt) = &args.prompt {
        config.prompt_path = prompt.clone();
    }
    if let Some(threshold) = args.threshold {
        config
            .set_similarity_threshold(threshold)
            .context("Invalid --threshold")?;
    }

    let mut progress_config = ProgressConfig::from_env();
    let multi_progress = progress_config.create_multi_progress();
    let main_pb = multi_progress.as_ref().map(|mp| {
        let pb = mp.add(ProgressBar::new(3));
        pb.set_style(bar_style());
        pb.set_message("Initializing pipeline...");
        pb
    });

    let run_id = Uuid::new_v4().to_string();
    let oracle_label = if args.no_oracle {
        "disabled".to_string()
    } else {
        config.oracle_kind.to_string()
    };
    log_pipeline_start(&run_id, &oracle_label, config.similarity_threshold);

    // Phase 1: Load inputs
    log_pipeline_phase("Phase 1: Loading inputs", None);
    let resolver = if args.no_oracle {
        None
    } else {
        Some(build_resolver(&config, &config.prompt_path).context("Failed to build oracle")?)
    };
    let contracts = load_contracts(&args.contracts)?;
    let mi = load_mi(&args.mi)?;
    let bridge = load_registration_keys(&args.reg_keys)?;
    info!(
        "Loaded {} contracts, {} MI rows, {} registration keys",
        contracts.len(),
        mi.len(),
        bridge.len()
    );
    if let Some(pb) = &main_pb {
        pb.inc(1);
        pb.set_message("Phase 1 complete");
    }

    // Phase 2: Exact join, residual resolution and second pass
    log_pipeline_phase("Phase 2: Reconciliation", Some(&oracle_label));
    let result = reconcile_with(
        &contracts,
        &mi,
        &bridge,
        resolver.as_deref(),
        &progress_config,
    )
    .await
    .context("Reconciliation failed")?;
    if let Some(pb) = &main_pb {
        pb.inc(1);
        pb.set_message("Phase 2 complete");
    }

    // Phase 3: Outputs
    log_pipeline_phase("Phase 3: Writing outputs", None);
    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("Failed to create {}", args.output_dir.display()))?;
    let combined_path = args.output_dir.join("combined.csv");
    let unmatched_path = args.output_dir.join("unmatched.csv");
    write_combined(&combined_path, &result.rows)?;
    write_unmatched(&unmatched_path, &result.unmatched)?;
    if let Some(pb) = &main_pb {
        pb.inc(1);
        pb.finish_with_message("Pipeline complete");
    }

    let stats = &result.stats;
    info!("=== Pipeline Summary ===");
    info!("Run ID: {}", run_id);
    info!("Oracle: {}", oracle_label);
    info!("Contracts: {} ({} keyed)", stats.total_contracts, stats.keyed_contracts);
    info!("Candidate pool: {} buyers", stats.candidate_pool_size);
    info!("MI rows: {}", stats.total_mi_rows);
    info!("  exact matches: {}", stats.exact_matched_rows);
    info!("  exempt (identifier mismatch): {}", stats.exempt_rows);
    info!("  missing supplier key: {}", stats.missing_key_rows);
    info!(
        "  residual: {} rows / {} names, {} names matched, {} rows joined",
        stats.residual_rows,
        stats.unique_residual_names,
        stats.oracle_matches_accepted,
        stats.oracle_matched_rows
    );
    info!("  final unmatched: {}", stats.final_unmatched_rows);
    info!("Match rate: {:.1}%", stats.match_rate() * 100.0);
    info!(
        "Timings: join {:.2}s, oracle {:.2}s",
        stats.join_time, stats.oracle_time
    );
    info!("Outputs: {}, {}", combined_path.display(), unmatched_path.display());
    if stats.final_unmatched_rows > 0 {
        warn!(
            "{} MI rows remain unmatched; see {}",
            stats.final_unmatched_rows,
            unmatched_path.display()
        );
    }

    Ok(())
}
