// src/matching/similarity.rs
use async_trait::async_trait;
use std::str::FromStr;
use strsim::{jaro_winkler, normalized_levenshtein};

use crate::errors::OracleError;
use crate::matching::oracle::MatchOracle;
use crate::models::matching::{OracleKind, NO_MATCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimilarityMetric {
    /// 2·LCS / (|a| + |b|) over characters.
    #[default]
    LcsRatio,
    JaroWinkler,
    NormalizedLevenshtein,
}

impl FromStr for SimilarityMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lcs" | "lcs_ratio" => Ok(SimilarityMetric::LcsRatio),
            "jaro_winkler" | "jaro-winkler" => Ok(SimilarityMetric::JaroWinkler),
            "levenshtein" | "normalized_levenshtein" => Ok(SimilarityMetric::NormalizedLevenshtein),
            other => Err(format!("unknown similarity metric '{}'", other)),
        }
    }
}

impl SimilarityMetric {
    /// Scores two names case-insensitively, in [0, 1].
    pub fn score(&self, a: &str, b: &str) -> f64 {
        let a = a.to_lowercase();
        let b = b.to_lowercase();
        match self {
            SimilarityMetric::LcsRatio => lcs_ratio(&a, &b),
            SimilarityMetric::JaroWinkler => jaro_winkler(&a, &b),
            SimilarityMetric::NormalizedLevenshtein => normalized_levenshtein(&a, &b),
        }
    }
}

pub fn lcs_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for ca in &a {
        for (j, cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    2.0 * prev[b.len()] as f64 / total as f64
}

/// Offline stand-in for the LLM: best-scoring candidate if it clears the
/// threshold, else the sentinel.
#[derive(Debug, Clone)]
pub struct LocalSimilarityOracle {
    threshold: f64,
    metric: SimilarityMetric,
}

impl LocalSimilarityOracle {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            metric: SimilarityMetric::default(),
        }
    }

    pub fn with_metric(mut self, metric: SimilarityMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Ties keep the earliest candidate.
    pub fn best_match<'a>(&self, input_name: &str, candidates: &'a [String]) -> Option<(&'a str, f64)> {
        let mut best: Option<(&'a str, f64)> = None;
        for candidate in candidates {
            let score = self.metric.score(input_name, candidate);
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((candidate.as_str(), score)),
            }
        }
        best
    }
}

#[async_trait]
impl MatchOracle for LocalSimilarityOracle {
    fn kind(&self) -> OracleKind {
        OracleKind::Local
    }

    async fn resolve(&self, input_name: &str, candidates: &[String]) -> Result<String, OracleError> {
        Ok(match self.best_match(input_name, candidates) {
            Some((name, score)) if score >= self.threshold => name.to_string(),
            _ => NO_MATCH.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_lcs_ratio_bounds() {
        assert_eq!(lcs_ratio("", ""), 1.0);
        assert_eq!(lcs_ratio("abc", "abc"), 1.0);
        assert_eq!(lcs_ratio("abc", "xyz"), 0.0);
        assert!((lcs_ratio("ab", "xab") - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_typo_resolves_above_threshold() {
        let oracle = LocalSimilarityOracle::new(0.85);
        let candidates = names(&["Cabinet Office", "Home Office"]);
        let answer = oracle.resolve("Cabinet Ofice", &candidates).await.unwrap();
        assert_eq!(answer, "Cabinet Office");
    }

    #[tokio::test]
    async fn test_acronym_falls_below_threshold() {
        let oracle = LocalSimilarityOracle::new(0.85);
        let candidates = names(&["Department for Work and Pensions", "Cabinet Office"]);
        assert_eq!(oracle.resolve("DWP", &candidates).await.unwrap(), "None");
    }

    #[tokio::test]
    async fn test_ties_keep_first_candidate() {
        let oracle = LocalSimilarityOracle::new(0.8);
        let forward = names(&["xab", "abx"]);
        let backward = names(&["abx", "xab"]);
        assert_eq!(oracle.resolve("ab", &forward).await.unwrap(), "xab");
        assert_eq!(oracle.resolve("ab", &backward).await.unwrap(), "abx");
    }

    #[tokio::test]
    async fn test_threshold_is_inclusive() {
        let oracle = LocalSimilarityOracle::new(0.8);
        assert_eq!(oracle.resolve("ab", &names(&["xab"])).await.unwrap(), "xab");
        let strict = LocalSimilarityOracle::new(0.81);
        assert_eq!(strict.resolve("ab", &names(&["xab"])).await.unwrap(), "None");
    }

    #[test]
    fn test_metric_names() {
        assert_eq!("LCS".parse::<SimilarityMetric>().unwrap(), SimilarityMetric::LcsRatio);
        assert_eq!(
            "jaro-winkler".parse::<SimilarityMetric>().unwrap(),
            SimilarityMetric::JaroWinkler
        );
        assert!("cosine".parse::<SimilarityMetric>().is_err());
    }

    #[test]
    fn test_alternative_metrics_are_case_insensitive() {
        assert_eq!(SimilarityMetric::JaroWinkler.score("HOME OFFICE", "home office"), 1.0);
        assert_eq!(
            SimilarityMetric::NormalizedLevenshtein.score("Home Office", "home office"),
            1.0
        );
    }
}
