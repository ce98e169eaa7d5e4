// src/matching/chat_clients.rs
//
// reqwest-backed chat models: a local Ollama server and an Azure OpenAI
// deployment.
use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::OracleError;
use crate::matching::llm::{ChatMessage, ChatModel};
use crate::models::matching::OracleKind;
use crate::utils::config::AzureSettings;

/// Ollama `/api/chat` request
#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize, Clone, Copy)]
struct OllamaOptions {
    temperature: f32,
    top_p: f32,
    repeat_penalty: f32,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaReplyMessage,
}

#[derive(Deserialize)]
struct OllamaReplyMessage {
    content: String,
}

pub struct OllamaChatModel {
    client: Client,
    base_url: String,
    model: String,
    options: OllamaOptions,
}

impl OllamaChatModel {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self, OracleError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OracleError::Configuration(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            options: OllamaOptions {
                temperature: 0.1,
                top_p: 0.9,
                repeat_penalty: 1.1,
            },
        })
    }
}

#[async_trait]
impl ChatModel for OllamaChatModel {
    fn kind(&self) -> OracleKind {
        OracleKind::Ollama
    }

    async fn invoke(&self, messages: &[ChatMessage]) -> Result<String, OracleError> {
        let request = OllamaChatRequest {
            model: &self.model,
            messages,
            stream: false,
            options: self.options,
        };
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| OracleError::MalformedResponse(e.to_string()))?;
        debug!("Raw Ollama reply: {}", parsed.message.content);
        Ok(parsed.message.content)
    }
}

#[derive(Serialize)]
struct AzureChatRequest<'a> {
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Deserialize)]
struct AzureChatResponse {
    #[serde(default)]
    choices: Vec<AzureChoice>,
}

#[derive(Deserialize)]
struct AzureChoice {
    message: AzureReplyMessage,
}

#[derive(Deserialize)]
struct AzureReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct AzureOpenAiChatModel {
    client: Client,
    settings: AzureSettings,
}

impl AzureOpenAiChatModel {
    pub fn new(settings: AzureSettings, timeout: Duration) -> Result<Self, OracleError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OracleError::Configuration(e.to_string()))?;
        Ok(Self { client, settings })
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.settings.endpoint.trim_end_matches('/'),
            self.settings.deployment,
            self.settings.api_version
        )
    }
}

#[async_trait]
impl ChatModel for AzureOpenAiChatModel {
    fn kind(&self) -> OracleKind {
        OracleKind::Azure
    }

    async fn invoke(&self, messages: &[ChatMessage]) -> Result<String, OracleError> {
        let response = self
            .client
            .post(self.completions_url())
            .header("api-key", &self.settings.api_key)
            .json(&AzureChatRequest {
                messages,
                temperature: 0.0,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: AzureChatResponse = response
            .json()
            .await
            .map_err(|e| OracleError::MalformedResponse(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| OracleError::MalformedResponse("no choices in completion".to_string()))
    }
}
