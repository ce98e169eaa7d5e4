// src/matching/factory.rs
use std::path::Path;

use anyhow::{Context, Result};

use crate::matching::chat_clients::{AzureOpenAiChatModel, OllamaChatModel};
use crate::matching::dispatcher::{BatchDispatcher, SystemClock, TiktokenCounter};
use crate::matching::http_oracle::HttpMatchOracle;
use crate::matching::llm::{ChatModel, LlmOracle, PromptTemplate};
use crate::matching::oracle::MatchOracle;
use crate::matching::reconcile::ResidualResolver;
use crate::matching::similarity::LocalSimilarityOracle;
use crate::models::matching::OracleKind;
use crate::utils::config::MatchingConfig;

/// Builds the configured oracle. `prompt_path` backs the LLM variants and is
/// forwarded to the HTTP endpoint; the local oracle ignores it.
pub fn build_oracle(config: &MatchingConfig, prompt_path: &Path) -> Result<Box<dyn MatchOracle>> {
    let oracle: Box<dyn MatchOracle> = match config.oracle_kind {
        OracleKind::Local => Box::new(
            LocalSimilarityOracle::new(config.similarity_threshold)
                .with_metric(config.similarity_metric),
        ),
        OracleKind::Ollama => {
            let template = PromptTemplate::load(prompt_path)?;
            let model = OllamaChatModel::new(
                &config.ollama_url,
                &config.ollama_model,
                config.match_api_timeout,
            )?;
            Box::new(LlmOracle::new(model, template))
        }
        OracleKind::Azure => {
            let template = PromptTemplate::load(prompt_path)?;
            let model = AzureOpenAiChatModel::new(config.azure_settings()?, config.match_api_timeout)?;
            Box::new(LlmOracle::new(model, template))
        }
        OracleKind::Http => {
            let url = config.require_match_api_url()?;
            let oracle = HttpMatchOracle::from_url(
                url,
                Some(prompt_path.display().to_string()),
                config.match_api_timeout,
            )
            .with_context(|| format!("Failed to build HTTP oracle for {}", url))?;
            Box::new(oracle)
        }
    };
    Ok(oracle)
}

/// Builds the residual resolver for the reconcile pipeline. Chat-model
/// oracles go through the rate-limited batch dispatcher; the local and HTTP
/// oracles resolve one name at a time.
pub fn build_resolver(
    config: &MatchingConfig,
    prompt_path: &Path,
) -> Result<Box<dyn ResidualResolver>> {
    let resolver: Box<dyn ResidualResolver> = match config.oracle_kind {
        OracleKind::Ollama => {
            let template = PromptTemplate::load(prompt_path)?;
            let model = OllamaChatModel::new(
                &config.ollama_url,
                &config.ollama_model,
                config.match_api_timeout,
            )?;
            Box::new(batch_dispatcher(model, template, config)?)
        }
        OracleKind::Azure => {
            let template = PromptTemplate::load(prompt_path)?;
            let model = AzureOpenAiChatModel::new(config.azure_settings()?, config.match_api_timeout)?;
            Box::new(batch_dispatcher(model, template, config)?)
        }
        OracleKind::Local | OracleKind::Http => Box::new(build_oracle(config, prompt_path)?),
    };
    Ok(resolver)
}

fn batch_dispatcher<M: ChatModel>(
    model: M,
    template: PromptTemplate,
    config: &MatchingConfig,
) -> Result<BatchDispatcher<M, SystemClock, TiktokenCounter>> {
    Ok(BatchDispatcher::new(
        model,
        template,
        TiktokenCounter::cl100k()?,
        SystemClock,
        config.dispatch_chunk_size,
        config.tokens_per_minute,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_oracle_needs_no_prompt() {
        let config = MatchingConfig::default();
        let oracle = build_oracle(&config, Path::new("missing.txt")).unwrap();
        assert_eq!(oracle.kind(), OracleKind::Local);
    }

    #[test]
    fn test_http_oracle_requires_url() {
        let mut config = MatchingConfig::default();
        config.oracle_kind = OracleKind::Http;
        let Err(err) = build_oracle(&config, Path::new("p.txt")) else {
            panic!("HTTP oracle built without a URL");
        };
        assert!(err.to_string().contains("MATCH_STRING_API_URL"));

        config.match_api_url = Some("http://localhost:8000/match".into());
        assert_eq!(
            build_oracle(&config, Path::new("p.txt")).unwrap().kind(),
            OracleKind::Http
        );
    }

    #[test]
    fn test_resolver_follows_oracle_kind() {
        let dir = tempfile::tempdir().unwrap();
        let prompt = dir.path().join("buyer_match_v1.txt");
        std::fs::write(&prompt, "{input_name} {candidates}").unwrap();

        let mut config = MatchingConfig::default();
        assert_eq!(build_resolver(&config, &prompt).unwrap().label(), "local");

        config.oracle_kind = OracleKind::Ollama;
        assert_eq!(build_resolver(&config, &prompt).unwrap().label(), "ollama");

        config.oracle_kind = OracleKind::Azure;
        assert!(build_resolver(&config, &prompt).is_err());
    }

    #[test]
    fn test_llm_oracle_requires_prompt_file() {
        let mut config = MatchingConfig::default();
        config.oracle_kind = OracleKind::Ollama;
        let Err(err) = build_oracle(&config, Path::new("/no/such/prompt.txt")) else {
            panic!("LLM oracle built without a prompt file");
        };
        assert!(err.to_string().contains("does not exist"));
    }
}
