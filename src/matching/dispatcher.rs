// src/matching/dispatcher.rs
//
// Sends many LLM match requests in fixed-size chunks under a
// tokens-per-minute budget.
use anyhow::Context;
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tiktoken_rs::CoreBPE;

use crate::errors::OracleError;
use crate::matching::candidate_pool::CandidatePool;
use crate::matching::llm::{build_messages, ChatMessage, ChatModel, PromptTemplate};
use crate::matching::reconcile::ResidualResolver;
use crate::matching::validator::{classify_response, Verdict};
use crate::models::matching::{MatchDecision, NO_MATCH};
use crate::models::stats_models::DispatchStats;
use crate::utils::logging::{Stage, StageLogger};
use crate::utils::progress_config::ProgressConfig;

pub const RATE_WINDOW: Duration = Duration::from_secs(60);

#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    async fn sleep(&self, duration: Duration);
}

pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

static CL100K: OnceCell<Arc<CoreBPE>> = OnceCell::new();

/// cl100k_base BPE, the encoding used by current OpenAI chat models.
/// The ranks are parsed once per process and shared between counters.
pub struct TiktokenCounter {
    bpe: Arc<CoreBPE>,
}

impl TiktokenCounter {
    pub fn cl100k() -> anyhow::Result<Self> {
        let bpe = CL100K
            .get_or_try_init(|| tiktoken_rs::cl100k_base().map(Arc::new))
            .context("Failed to load cl100k_base tokenizer")?;
        Ok(Self { bpe: bpe.clone() })
    }
}

impl TokenCounter for TiktokenCounter {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }
}

/// One token per whitespace-separated word.
pub struct WhitespaceTokenCounter;

impl TokenCounter for WhitespaceTokenCounter {
    fn count(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}

/// Fixed one-minute window counter.
#[derive(Debug, Clone)]
pub struct TokenWindow {
    budget: usize,
    window: Duration,
    started: Option<Instant>,
    used: usize,
}

impl TokenWindow {
    pub fn new(budget: usize, window: Duration) -> Self {
        Self {
            budget,
            window,
            started: None,
            used: 0,
        }
    }

    /// How long to wait before `tokens` more may be sent, if at all.
    /// A cost larger than the whole budget is let through on an empty window.
    pub fn wait_needed(&mut self, now: Instant, tokens: usize) -> Option<Duration> {
        let started = match self.started {
            Some(started) if now.duration_since(started) < self.window => started,
            _ => {
                self.started = Some(now);
                self.used = 0;
                now
            }
        };
        if self.used > 0 && self.used + tokens > self.budget {
            Some(self.window - now.duration_since(started))
        } else {
            None
        }
    }

    pub fn record(&mut self, now: Instant, tokens: usize) {
        if self.started.is_none() {
            self.started = Some(now);
        }
        self.used += tokens;
    }

    pub fn reset(&mut self, now: Instant) {
        self.started = Some(now);
        self.used = 0;
    }

    pub fn used(&self) -> usize {
        self.used
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchRequest {
    pub input_name: String,
    pub candidates: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DispatchOutcome {
    /// Every decision known after the run, including those passed in.
    pub memo: HashMap<String, MatchDecision>,
    pub stats: DispatchStats,
}

pub struct BatchDispatcher<M: ChatModel, C: Clock, T: TokenCounter> {
    model: M,
    template: PromptTemplate,
    counter: T,
    clock: C,
    chunk_size: usize,
    tokens_per_minute: usize,
    logger: StageLogger,
}

impl<M: ChatModel, C: Clock, T: TokenCounter> BatchDispatcher<M, C, T> {
    pub fn new(
        model: M,
        template: PromptTemplate,
        counter: T,
        clock: C,
        chunk_size: usize,
        tokens_per_minute: usize,
    ) -> Self {
        Self {
            model,
            template,
            counter,
            clock,
            chunk_size: chunk_size.max(1),
            tokens_per_minute,
            logger: StageLogger::new(Stage::Dispatch),
        }
    }

    fn estimate_tokens(&self, conversations: &[Vec<ChatMessage>]) -> usize {
        conversations
            .iter()
            .flatten()
            .map(|m| self.counter.count(&m.content))
            .sum()
    }

    /// Resolves every request not already in `memo`. Decisions are keyed by
    /// input name. A provider failure for one name is logged and recorded as
    /// no match; only a batch that loses track of its requests is an error.
    pub async fn dispatch(
        &self,
        requests: Vec<DispatchRequest>,
        mut memo: HashMap<String, MatchDecision>,
    ) -> Result<DispatchOutcome, OracleError> {
        let mut stats = DispatchStats::default();
        let mut seen = HashSet::new();
        let mut pending = Vec::new();
        for request in requests {
            if memo.contains_key(&request.input_name) {
                stats.cache_hits += 1;
                continue;
            }
            if !seen.insert(request.input_name.clone()) {
                continue;
            }
            let offered: Vec<String> = request
                .candidates
                .into_iter()
                .filter(|c| *c != request.input_name)
                .collect();
            if offered.is_empty() {
                memo.insert(request.input_name, MatchDecision::NoMatch);
                continue;
            }
            pending.push(DispatchRequest {
                input_name: request.input_name,
                candidates: offered,
            });
        }
        self.logger.log_cache_results(stats.cache_hits, pending.len());

        let total_chunks = (pending.len() + self.chunk_size - 1) / self.chunk_size;
        let mut window = TokenWindow::new(self.tokens_per_minute, RATE_WINDOW);

        for (chunk_idx, chunk) in pending.chunks(self.chunk_size).enumerate() {
            let conversations: Vec<Vec<ChatMessage>> = chunk
                .iter()
                .map(|r| build_messages(&self.template, &r.input_name, &r.candidates))
                .collect();
            let tokens = self.estimate_tokens(&conversations);

            if let Some(wait) = window.wait_needed(self.clock.now(), tokens) {
                self.logger
                    .log_throttle(wait, window.used(), self.tokens_per_minute);
                stats.throttle_waits += 1;
                self.clock.sleep(wait).await;
                window.reset(self.clock.now());
            }
            if tokens > self.tokens_per_minute {
                self.logger.log_warning(&format!(
                    "Chunk {} alone needs {} tokens, over the {} per-minute budget",
                    chunk_idx + 1,
                    tokens,
                    self.tokens_per_minute
                ));
            }

            self.logger.log_debug(&format!(
                "Sending chunk {}/{} ({} names, ~{} tokens)",
                chunk_idx + 1,
                total_chunks,
                chunk.len(),
                tokens
            ));
            let responses = self.model.batch(&conversations).await;
            window.record(self.clock.now(), tokens);
            if responses.len() != chunk.len() {
                return Err(OracleError::MalformedResponse(format!(
                    "batch returned {} responses for {} requests",
                    responses.len(),
                    chunk.len()
                )));
            }

            for (request, response) in chunk.iter().zip(responses) {
                let raw = match response {
                    Ok(raw) => raw,
                    Err(e) => {
                        stats.failed_requests += 1;
                        self.logger.log_warning(&format!(
                            "LLM call failed for {:?}: {}",
                            request.input_name, e
                        ));
                        NO_MATCH.to_string()
                    }
                };
                let verdict = classify_response(&raw, &request.candidates);
                if let Verdict::Rejected(_) = &verdict {
                    stats.rejected_responses += 1;
                    StageLogger::new(Stage::Validate).log_rejection(&request.input_name, &raw);
                }
                memo.insert(request.input_name.clone(), verdict.into_decision());
            }

            stats.chunks_sent += 1;
            stats.names_sent += chunk.len();
            stats.tokens_dispatched += tokens;
            self.logger.log_names_processed(stats.names_sent, pending.len());
        }

        Ok(DispatchOutcome { memo, stats })
    }
}

#[async_trait]
impl<M: ChatModel, C: Clock, T: TokenCounter> ResidualResolver for BatchDispatcher<M, C, T> {
    fn label(&self) -> &'static str {
        self.model.kind().as_str()
    }

    async fn resolve_names(
        &self,
        names: &[String],
        pool: &CandidatePool,
        progress: &ProgressConfig,
    ) -> Result<HashMap<String, MatchDecision>, OracleError> {
        self.logger.log_start(
            self.label(),
            &format!("{} names against {} candidates", names.len(), pool.len()),
        );
        let requests = names
            .iter()
            .map(|name| DispatchRequest {
                input_name: name.clone(),
                candidates: pool.candidates_for(name),
            })
            .collect();
        let outcome = self.dispatch(requests, HashMap::new()).await?;

        let stats = &outcome.stats;
        self.logger.log_completion(&format!(
            "{} chunks, {} names, ~{} tokens, {} throttle waits, {} rejected answers, {} failed calls",
            stats.chunks_sent,
            stats.names_sent,
            stats.tokens_dispatched,
            stats.throttle_waits,
            stats.rejected_responses,
            stats.failed_requests
        ));
        if progress.should_show_cache_stats() {
            self.logger.log_cache_results(stats.cache_hits, stats.names_sent);
        }
        Ok(outcome.memo)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Mutex;

    /// Time only moves when something sleeps.
    pub struct ManualClock {
        origin: Instant,
        offset: Mutex<Duration>,
        pub sleeps: Mutex<Vec<Duration>>,
    }

    impl ManualClock {
        pub fn new() -> Self {
            Self {
                origin: Instant::now(),
                offset: Mutex::new(Duration::ZERO),
                sleeps: Mutex::new(Vec::new()),
            }
        }

        pub fn advance(&self, by: Duration) {
            *self.offset.lock().unwrap() += by;
        }
    }

    #[async_trait]
    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.origin + *self.offset.lock().unwrap()
        }

        async fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
            self.advance(duration);
        }
    }
}
