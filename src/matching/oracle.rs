// src/matching/oracle.rs
use async_trait::async_trait;

use crate::errors::OracleError;
use crate::matching::validator::validate_response;
use crate::models::matching::{MatchDecision, OracleKind};

/// Any engine that proposes one candidate (or the sentinel) for an input name.
///
/// `candidates` is non-empty and never contains `input_name` itself. The
/// returned string is unvalidated; callers go through [`resolve_and_validate`].
#[async_trait]
pub trait MatchOracle: Send + Sync {
    fn kind(&self) -> OracleKind;

    async fn resolve(&self, input_name: &str, candidates: &[String]) -> Result<String, OracleError>;
}

/// Offers `candidates` minus the input itself, then closes the answer over
/// what was offered. An empty offer is a `NoMatch` without a call.
pub async fn resolve_and_validate(
    oracle: &dyn MatchOracle,
    input_name: &str,
    candidates: &[String],
) -> Result<MatchDecision, OracleError> {
    let offered: Vec<String> = candidates
        .iter()
        .filter(|c| c.as_str() != input_name)
        .cloned()
        .collect();
    if offered.is_empty() {
        return Ok(MatchDecision::NoMatch);
    }
    let raw = oracle.resolve(input_name, &offered).await?;
    Ok(validate_response(input_name, &raw, &offered))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Returns canned answers and records what it was offered.
    pub struct ScriptedOracle {
        answers: HashMap<String, String>,
        pub calls: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl ScriptedOracle {
        pub fn new(answers: &[(&str, &str)]) -> Self {
            Self {
                answers: answers
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn queried_names(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|(n, _)| n.clone()).collect()
        }
    }

    #[async_trait]
    impl MatchOracle for ScriptedOracle {
        fn kind(&self) -> OracleKind {
            OracleKind::Local
        }

        async fn resolve(&self, input_name: &str, candidates: &[String]) -> Result<String, OracleError> {
            self.calls
                .lock()
                .unwrap()
                .push((input_name.to_string(), candidates.to_vec()));
            Ok(self
                .answers
                .get(input_name)
                .cloned()
                .unwrap_or_else(|| "None".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::ScriptedOracle;
    use super::*;

    #[tokio::test]
    async fn test_input_is_never_offered_to_itself() {
        let oracle = ScriptedOracle::new(&[("Cabinet Office", "Cabinet Office")]);
        let candidates = vec!["Cabinet Office".to_string(), "Home Office".to_string()];
        let decision = resolve_and_validate(&oracle, "Cabinet Office", &candidates)
            .await
            .unwrap();
        // the echoed input was not offered, so it is out of pool
        assert_eq!(decision, MatchDecision::NoMatch);
        let calls = oracle.calls.lock().unwrap();
        assert_eq!(calls[0].1, vec!["Home Office".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_offer_skips_oracle() {
        let oracle = ScriptedOracle::new(&[]);
        let decision = resolve_and_validate(&oracle, "A", &["A".to_string()])
            .await
            .unwrap();
        assert_eq!(decision, MatchDecision::NoMatch);
        assert!(oracle.queried_names().is_empty());
    }

    #[tokio::test]
    async fn test_dwp_scenario() {
        let oracle = ScriptedOracle::new(&[("DWP", "Department for Work and Pensions")]);
        let candidates = vec![
            "Department for Work and Pensions".to_string(),
            "Cabinet Office".to_string(),
        ];
        let decision = resolve_and_validate(&oracle, "DWP", &candidates).await.unwrap();
        assert_eq!(decision.as_str(), "Department for Work and Pensions");
    }
}
