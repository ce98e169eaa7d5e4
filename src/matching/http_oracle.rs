// src/matching/http_oracle.rs
//
// Out-of-process oracle: `GET <base>?input_string=..&candidates=..&prompt_path=..`
// answering `{"input_string": str, "match": str|null, "raw": str}`.
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use crate::errors::OracleError;
use crate::matching::oracle::MatchOracle;
use crate::models::matching::{OracleKind, NO_MATCH};
use crate::utils::logging::{Stage, StageLogger};

#[derive(Debug, Clone, PartialEq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

/// The single GET the adapter needs, behind a seam so tests can script it.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &Url) -> Result<HttpReply, OracleError>;
}

pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, OracleError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OracleError::Configuration(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &Url) -> Result<HttpReply, OracleError> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpReply { status, body })
    }
}

#[derive(Debug, Deserialize)]
struct MatchApiResponse {
    #[serde(rename = "match", default)]
    matched: Option<String>,
    #[serde(default)]
    raw: Option<String>,
}

/// Status and connectivity errors propagate to the caller; a body that
/// does not parse is logged and read as the sentinel.
pub struct HttpMatchOracle<T: HttpTransport> {
    base_url: Url,
    prompt_path: Option<String>,
    transport: T,
    logger: StageLogger,
}

impl HttpMatchOracle<ReqwestTransport> {
    pub fn from_url(base_url: &str, prompt_path: Option<String>, timeout: Duration) -> Result<Self, OracleError> {
        Self::new(base_url, prompt_path, ReqwestTransport::new(timeout)?)
    }
}

impl<T: HttpTransport> HttpMatchOracle<T> {
    pub fn new(base_url: &str, prompt_path: Option<String>, transport: T) -> Result<Self, OracleError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| OracleError::Configuration(format!("invalid match API URL {base_url:?}: {e}")))?;
        Ok(Self {
            base_url,
            prompt_path,
            transport,
            logger: StageLogger::new(Stage::Oracle),
        })
    }

    pub fn request_url(&self, input_name: &str, candidates: &[String]) -> Url {
        let mut url = self.base_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("input_string", input_name);
            for candidate in candidates.iter().filter(|c| c.as_str() != input_name) {
                query.append_pair("candidates", candidate);
            }
            if let Some(prompt_path) = &self.prompt_path {
                query.append_pair("prompt_path", prompt_path);
            }
        }
        url
    }
}

#[async_trait]
impl<T: HttpTransport> MatchOracle for HttpMatchOracle<T> {
    fn kind(&self) -> OracleKind {
        OracleKind::Http
    }

    async fn resolve(&self, input_name: &str, candidates: &[String]) -> Result<String, OracleError> {
        let url = self.request_url(input_name, candidates);
        let reply = self.transport.get(&url).await?;
        if !(200..300).contains(&reply.status) {
            return Err(OracleError::HttpStatus {
                status: reply.status,
                body: reply.body,
            });
        }

        match serde_json::from_str::<MatchApiResponse>(&reply.body) {
            Ok(parsed) => {
                if let Some(raw) = &parsed.raw {
                    self.logger
                        .log_debug(&format!("raw answer for {:?}: {}", input_name, raw));
                }
                Ok(parsed.matched.unwrap_or_else(|| NO_MATCH.to_string()))
            }
            Err(e) => {
                self.logger.log_warning(&format!(
                    "Malformed match API body for {:?}: {}",
                    input_name, e
                ));
                Ok(NO_MATCH.to_string())
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Mutex;

    /// Replays queued replies and records requested URLs.
    pub struct FakeTransport {
        replies: Mutex<Vec<Result<HttpReply, OracleError>>>,
        pub requested: Mutex<Vec<Url>>,
    }

    impl FakeTransport {
        /// Replies are served first to last.
        pub fn new(mut replies: Vec<Result<HttpReply, OracleError>>) -> Self {
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
                requested: Mutex::new(Vec::new()),
            }
        }

        pub fn ok(body: &str) -> Result<HttpReply, OracleError> {
            Ok(HttpReply {
                status: 200,
                body: body.to_string(),
            })
        }

        pub fn status(status: u16) -> Result<HttpReply, OracleError> {
            Ok(HttpReply {
                status,
                body: "Internal Server Error".to_string(),
            })
        }
    }

    #[async_trait]
    impl HttpTransport for FakeTransport {
        async fn get(&self, url: &Url) -> Result<HttpReply, OracleError> {
            self.requested.lock().unwrap().push(url.clone());
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(OracleError::Transport("no scripted reply".into())))
        }
    }
}
