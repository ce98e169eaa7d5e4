// src/evaluation/candidates.rs
use rand::rngs::StdRng;
use rand::seq::{index, SliceRandom};
use rand::SeedableRng;

use crate::matching::candidate_pool::CandidatePool;
use crate::utils::hashing::stable_hash_str;

const SEED_SPREAD: u64 = 1_000_000;

/// Per-input seed: the global seed offset by a content hash of the name, so
/// the same name gets the same draw in every process.
pub fn case_seed(global_seed: u64, input_name: &str) -> u64 {
    global_seed.wrapping_add(stable_hash_str(input_name) % SEED_SPREAD)
}

/// Candidate list for one benchmark case.
///
/// Distractors are sampled from the pool minus the ground truth and minus the
/// input itself. Positive cases get the ground truth added exactly once; the
/// combined list is then shuffled with the same generator.
pub fn build_candidate_list(
    input_name: &str,
    ground_truth: Option<&str>,
    pool: &CandidatePool,
    num_distractors: usize,
    global_seed: u64,
    is_negative: bool,
) -> Vec<String> {
    let mut rng = StdRng::seed_from_u64(case_seed(global_seed, input_name));

    let eligible: Vec<&String> = pool
        .names()
        .iter()
        .filter(|n| Some(n.as_str()) != ground_truth && n.as_str() != input_name)
        .collect();
    let k = num_distractors.min(eligible.len());
    let mut candidates: Vec<String> = index::sample(&mut rng, eligible.len(), k)
        .into_iter()
        .map(|i| eligible[i].clone())
        .collect();

    if !is_negative {
        if let Some(truth) = ground_truth {
            candidates.insert(0, truth.to_string());
        }
    }
    candidates.shuffle(&mut rng);
    candidates
}
