// src/matching/llm.rs
//
// Prompt rendering and the chat-model seam shared by the in-process LLM
// oracle and the batch dispatcher.
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::errors::{ConfigError, OracleError};
use crate::matching::oracle::MatchOracle;
use crate::models::matching::{OracleKind, NO_MATCH};
use crate::utils::logging::{Stage, StageLogger};

const INPUT_TOKEN: &str = "{input_name}";
const CANDIDATES_TOKEN: &str = "{candidates}";

/// Plain-text prompt with `{input_name}` and `{candidates}` placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    text: String,
}

impl PromptTemplate {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)
            .map_err(|_| ConfigError::MissingFile(path.display().to_string()))?;
        Ok(Self { text })
    }

    /// Candidates are rendered as a JSON array of strings.
    pub fn render(&self, input_name: &str, candidates: &[String]) -> String {
        let candidates_json =
            serde_json::to_string(candidates).unwrap_or_else(|_| "[]".to_string());
        self.text
            .replace(INPUT_TOKEN, input_name)
            .replace(CANDIDATES_TOKEN, &candidates_json)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Rendered prompt as the system turn, the raw name as the user turn.
pub fn build_messages(
    template: &PromptTemplate,
    input_name: &str,
    candidates: &[String],
) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(template.render(input_name, candidates)),
        ChatMessage::user(input_name),
    ]
}

/// A chat-completion backend.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn kind(&self) -> OracleKind;

    async fn invoke(&self, messages: &[ChatMessage]) -> Result<String, OracleError>;

    /// One result per conversation, in the order of `conversations`. A
    /// failed call never takes its neighbours down with it.
    async fn batch(
        &self,
        conversations: &[Vec<ChatMessage>],
    ) -> Vec<Result<String, OracleError>> {
        join_all(conversations.iter().map(|messages| self.invoke(messages))).await
    }
}

/// In-process LLM oracle. Provider failures are logged and answered with
/// the sentinel so one bad case never aborts a batch.
pub struct LlmOracle<M: ChatModel> {
    model: M,
    template: PromptTemplate,
    logger: StageLogger,
}

impl<M: ChatModel> LlmOracle<M> {
    pub fn new(model: M, template: PromptTemplate) -> Self {
        Self {
            model,
            template,
            logger: StageLogger::new(Stage::Oracle),
        }
    }
}

#[async_trait]
impl<M: ChatModel> MatchOracle for LlmOracle<M> {
    fn kind(&self) -> OracleKind {
        self.model.kind()
    }

    async fn resolve(&self, input_name: &str, candidates: &[String]) -> Result<String, OracleError> {
        let messages = build_messages(&self.template, input_name, candidates);
        match self.model.invoke(&messages).await {
            Ok(content) => Ok(content.trim().to_string()),
            Err(e) => {
                self.logger
                    .log_warning(&format!("LLM call failed for {:?}: {}", input_name, e));
                Ok(NO_MATCH.to_string())
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::ScriptedChatModel;
    use super::*;
    use crate::matching::oracle::resolve_and_validate;
    use crate::models::matching::MatchDecision;

    fn dwp_candidates() -> Vec<String> {
        vec![
            "Department for Work and Pensions".to_string(),
            "Cabinet Office".to_string(),
        ]
    }

    #[test]
    fn test_render_substitutes_both_tokens() {
        let template = PromptTemplate::new("Match {input_name} against {candidates}.");
        let rendered = template.render("DWP", &dwp_candidates());
        assert_eq!(
            rendered,
            "Match DWP against [\"Department for Work and Pensions\",\"Cabinet Office\"]."
        );
    }

    #[test]
    fn test_missing_prompt_file_is_config_error() {
        let err = PromptTemplate::load(Path::new("/definitely/not/here.txt")).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_messages_are_system_then_user() {
        let template = PromptTemplate::new("{candidates}");
        let messages = build_messages(&template, "DWP", &dwp_candidates());
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, ChatRole::System);
        assert_eq!(messages[1], ChatMessage::user("DWP"));
    }

    #[tokio::test]
    async fn test_llm_answer_is_validated() {
        let model = ScriptedChatModel::new(&[
            ("DWP", "  Department for Work and Pensions \n"),
            ("Made Up Dept", "Ministry of Made-Up"),
        ]);
        let oracle = LlmOracle::new(model, PromptTemplate::new("{input_name} {candidates}"));
        let candidates = dwp_candidates();

        let accepted = resolve_and_validate(&oracle, "DWP", &candidates).await.unwrap();
        assert_eq!(
            accepted,
            MatchDecision::Matched("Department for Work and Pensions".to_string())
        );
        let rejected = resolve_and_validate(&oracle, "Made Up Dept", &candidates)
            .await
            .unwrap();
        assert_eq!(rejected, MatchDecision::NoMatch);
    }

    #[tokio::test]
    async fn test_provider_failure_degrades_to_sentinel() {
        let oracle = LlmOracle::new(ScriptedChatModel::new(&[]), PromptTemplate::new("x"));
        let answer = oracle.resolve("Unknown", &dwp_candidates()).await.unwrap();
        assert_eq!(answer, "None");
    }
}
