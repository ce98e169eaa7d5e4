// src/utils/config.rs
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::ConfigError;
use crate::matching::similarity::SimilarityMetric;
use crate::models::matching::OracleKind;

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.85;
pub const DEFAULT_NUM_DISTRACTORS: usize = 20;
pub const DEFAULT_RANDOM_SEED: u64 = 42;
pub const DEFAULT_EXPERIMENT_NAME: &str = "EXAMINE_name_matching_updated_scripts";
pub const DEFAULT_RUNS_DIR: &str = "evaluation_runs";
pub const DEFAULT_PROMPT_PATH: &str = "prompts/buyer_match_v2.txt";
pub const DEFAULT_PROMPT_FILE_PATTERN: &str = r"^buyer_match_v\d+\.txt$";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.1";
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-02-01";
pub const DEFAULT_TOKENS_PER_MINUTE: usize = 60_000;
pub const DEFAULT_DISPATCH_CHUNK_SIZE: usize = 20;
pub const DEFAULT_ORACLE_MAX_RETRIES: u32 = 3;
pub const DEFAULT_MATCH_API_TIMEOUT_SECS: u64 = 60;

/// Azure OpenAI deployment settings. All four must be present for the
/// azure oracle to be built.
#[derive(Debug, Clone, PartialEq)]
pub struct AzureSettings {
    pub endpoint: String,
    pub api_key: String,
    pub deployment: String,
    pub api_version: String,
}

/// Run configuration shared by the pipeline and the evaluation binaries.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchingConfig {
    pub similarity_threshold: f64,
    pub similarity_metric: SimilarityMetric,
    pub num_distractors: usize,
    pub random_seed: u64,
    pub experiment_name: String,
    pub runs_dir: PathBuf,
    pub prompt_path: PathBuf,
    pub prompt_file_pattern: String,
    pub oracle_kind: OracleKind,
    pub match_api_url: Option<String>,
    pub match_api_timeout: Duration,
    pub ollama_url: String,
    pub ollama_model: String,
    pub azure_endpoint: Option<String>,
    pub azure_api_key: Option<String>,
    pub azure_deployment: Option<String>,
    pub azure_api_version: String,
    pub tokens_per_minute: usize,
    pub dispatch_chunk_size: usize,
    pub oracle_max_retries: u32,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            similarity_metric: SimilarityMetric::default(),
            num_distractors: DEFAULT_NUM_DISTRACTORS,
            random_seed: DEFAULT_RANDOM_SEED,
            experiment_name: DEFAULT_EXPERIMENT_NAME.to_string(),
            runs_dir: PathBuf::from(DEFAULT_RUNS_DIR),
            prompt_path: PathBuf::from(DEFAULT_PROMPT_PATH),
            prompt_file_pattern: DEFAULT_PROMPT_FILE_PATTERN.to_string(),
            oracle_kind: OracleKind::Local,
            match_api_url: None,
            match_api_timeout: Duration::from_secs(DEFAULT_MATCH_API_TIMEOUT_SECS),
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            ollama_model: DEFAULT_OLLAMA_MODEL.to_string(),
            azure_endpoint: None,
            azure_api_key: None,
            azure_deployment: None,
            azure_api_version: DEFAULT_AZURE_API_VERSION.to_string(),
            tokens_per_minute: DEFAULT_TOKENS_PER_MINUTE,
            dispatch_chunk_size: DEFAULT_DISPATCH_CHUNK_SIZE,
            oracle_max_retries: DEFAULT_ORACLE_MAX_RETRIES,
        }
    }
}

impl MatchingConfig {
    /// Reads every setting from the environment, keeping the default for
    /// anything unset. A set-but-unparseable value is an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let similarity_threshold = check_threshold(parse_var(
            "SIMILARITY_THRESHOLD",
            defaults.similarity_threshold,
        )?)?;

        let oracle_kind = match optional_var("ORACLE_KIND") {
            Some(raw) => raw.parse::<OracleKind>().map_err(|_| ConfigError::InvalidSetting {
                name: "ORACLE_KIND",
                value: raw.clone(),
            })?,
            None => defaults.oracle_kind,
        };

        let dispatch_chunk_size = parse_var("DISPATCH_CHUNK_SIZE", defaults.dispatch_chunk_size)?;
        if dispatch_chunk_size == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "DISPATCH_CHUNK_SIZE",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            similarity_threshold,
            similarity_metric: parse_var("SIMILARITY_METRIC", defaults.similarity_metric)?,
            num_distractors: parse_var("NUM_DISTRACTORS", defaults.num_distractors)?,
            random_seed: parse_var("RANDOM_SEED", defaults.random_seed)?,
            experiment_name: optional_var("EXPERIMENT_NAME").unwrap_or(defaults.experiment_name),
            runs_dir: optional_var("RUNS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.runs_dir),
            prompt_path: optional_var("PROMPT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.prompt_path),
            prompt_file_pattern: optional_var("PROMPT_FILE_PATTERN")
                .unwrap_or(defaults.prompt_file_pattern),
            oracle_kind,
            match_api_url: optional_var("MATCH_STRING_API_URL"),
            match_api_timeout: Duration::from_secs(parse_var(
                "MATCH_API_TIMEOUT_SECS",
                DEFAULT_MATCH_API_TIMEOUT_SECS,
            )?),
            ollama_url: optional_var("OLLAMA_URL").unwrap_or(defaults.ollama_url),
            ollama_model: optional_var("OLLAMA_MODEL").unwrap_or(defaults.ollama_model),
            azure_endpoint: optional_var("AZURE_OPENAI_ENDPOINT"),
            azure_api_key: optional_var("AZURE_OPENAI_KEY"),
            azure_deployment: optional_var("AZURE_OPENAI_DEPLOYMENT_NAME"),
            azure_api_version: optional_var("AZURE_OPENAI_API_VERSION")
                .unwrap_or(defaults.azure_api_version),
            tokens_per_minute: parse_var("TOKENS_PER_MINUTE", defaults.tokens_per_minute)?,
            dispatch_chunk_size,
            oracle_max_retries: parse_var("ORACLE_MAX_RETRIES", defaults.oracle_max_retries)?,
        })
    }

    /// Command-line override, held to the same range as the environment value.
    pub fn set_similarity_threshold(&mut self, value: f64) -> Result<(), ConfigError> {
        self.similarity_threshold = check_threshold(value)?;
        Ok(())
    }

    pub fn require_match_api_url(&self) -> Result<&str, ConfigError> {
        self.match_api_url
            .as_deref()
            .ok_or(ConfigError::MissingSetting("MATCH_STRING_API_URL"))
    }

    pub fn azure_settings(&self) -> Result<AzureSettings, ConfigError> {
        Ok(AzureSettings {
            endpoint: self
                .azure_endpoint
                .clone()
                .ok_or(ConfigError::MissingSetting("AZURE_OPENAI_ENDPOINT"))?,
            api_key: self
                .azure_api_key
                .clone()
                .ok_or(ConfigError::MissingSetting("AZURE_OPENAI_KEY"))?,
            deployment: self
                .azure_deployment
                .clone()
                .ok_or(ConfigError::MissingSetting("AZURE_OPENAI_DEPLOYMENT_NAME"))?,
            api_version: self.azure_api_version.clone(),
        })
    }
}

fn check_threshold(value: f64) -> Result<f64, ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::InvalidSetting {
            name: "SIMILARITY_THRESHOLD",
            value: value.to_string(),
        })
    }
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match optional_var(name) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidSetting { name, value: raw }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Tests run in parallel; each uses its own variable names.

    #[test]
    fn test_parse_var_default_and_override() {
        env::remove_var("TEST_CFG_DISTRACTORS");
        assert_eq!(parse_var("TEST_CFG_DISTRACTORS", 20usize).unwrap(), 20);

        env::set_var("TEST_CFG_DISTRACTORS", " 7 ");
        assert_eq!(parse_var("TEST_CFG_DISTRACTORS", 20usize).unwrap(), 7);
        env::remove_var("TEST_CFG_DISTRACTORS");
    }

    #[test]
    fn test_unparseable_value_is_an_error() {
        env::set_var("TEST_CFG_SEED", "forty-two");
        let err = parse_var("TEST_CFG_SEED", 42u64).unwrap_err();
        match err {
            ConfigError::InvalidSetting { name, value } => {
                assert_eq!(name, "TEST_CFG_SEED");
                assert_eq!(value, "forty-two");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        env::remove_var("TEST_CFG_SEED");
    }

    #[test]
    fn test_defaults() {
        let config = MatchingConfig::default();
        assert_eq!(config.similarity_threshold, 0.85);
        assert_eq!(config.num_distractors, 20);
        assert_eq!(config.random_seed, 42);
        assert_eq!(config.oracle_kind, OracleKind::Local);
        assert!(config.require_match_api_url().is_err());
    }

    #[test]
    fn test_threshold_override_is_range_checked() {
        let mut config = MatchingConfig::default();
        config.set_similarity_threshold(0.9).unwrap();
        assert_eq!(config.similarity_threshold, 0.9);

        for bad in [1.5, -0.1, f64::NAN] {
            assert!(matches!(
                config.set_similarity_threshold(bad),
                Err(ConfigError::InvalidSetting {
                    name: "SIMILARITY_THRESHOLD",
                    ..
                })
            ));
        }
        assert_eq!(config.similarity_threshold, 0.9);
    }

    #[test]
    fn test_azure_settings_require_all_fields() {
        let mut config = MatchingConfig::default();
        config.azure_endpoint = Some("https://example.openai.azure.com".into());
        config.azure_api_key = Some("key".into());
        assert!(matches!(
            config.azure_settings(),
            Err(ConfigError::MissingSetting("AZURE_OPENAI_DEPLOYMENT_NAME"))
        ));
        config.azure_deployment = Some("gpt-4o".into());
        assert_eq!(config.azure_settings().unwrap().deployment, "gpt-4o");
    }
}
