//! Question generation with bounded retries.
//!
//! Picks a topic from the ledger, asks the source for raw text, normalizes
//! it and refuses repeats. Any failing step burns one attempt against the
//! same topic; when attempts run out the last failure is surfaced.

use crate::config::GameConfig;
use crate::ledger::DedupLedger;
use crate::llm_client::{Difficulty, GenerationRequest, QuestionSource};
use crate::normalizer::{MalformedQuestionError, normalize};
use crate::question::Question;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("question source failed: {0}")]
    Source(String),
    #[error("question source returned empty text")]
    Empty,
    #[error("question source timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Malformed(#[from] MalformedQuestionError),
    #[error("generated question was already asked this session: {0}")]
    Duplicate(String),
    #[error("topic pool is empty")]
    NoTopics,
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<GenerationError>,
    },
}

impl GenerationError {
    /// Failures of the source itself, as opposed to unusable output.
    fn is_transport(&self) -> bool {
        matches!(
            self,
            GenerationError::Source(_) | GenerationError::Timeout(_) | GenerationError::Empty
        )
    }
}

/// Retry and timeout settings for question generation.
#[derive(Debug, Clone)]
pub struct GenerationPolicy {
    /// Total attempts per question, at least 1.
    pub attempts: u32,
    /// Limit on a single call to the source. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Pause before retrying after a transport failure.
    pub retry_delay: Duration,
}

impl Default for GenerationPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            timeout: None,
            retry_delay: Duration::from_millis(500),
        }
    }
}

pub struct QuestionGenerator {
    source: Arc<dyn QuestionSource>,
    policy: GenerationPolicy,
}

impl QuestionGenerator {
    pub fn new(source: Arc<dyn QuestionSource>, policy: GenerationPolicy) -> Self {
        Self { source, policy }
    }

    pub fn policy(&self) -> &GenerationPolicy {
        &self.policy
    }

    /// Produces a fresh, normalized question for the player at `rung`.
    ///
    /// The ledger is only read here; registering the result is up to the
    /// session that issues it.
    pub async fn generate<R: Rng + ?Sized>(
        &self,
        config: &GameConfig,
        ledger: &DedupLedger,
        rung: usize,
        rng: &mut R,
    ) -> Result<Question, GenerationError> {
        let topic = ledger
            .pick_topic(config.topics(), rng)
            .ok_or(GenerationError::NoTopics)?
            .to_string();

        let request = GenerationRequest {
            topic,
            used_questions: ledger.asked_in_order().to_vec(),
            rung,
            difficulty: Difficulty::for_rung(config, rung),
        };

        let attempts = self.policy.attempts.max(1);
        let mut last = GenerationError::Empty;
        for attempt in 1..=attempts {
            match self.attempt(&request, ledger).await {
                Ok(question) => {
                    info!(topic = %request.topic, attempt, "Generated question");
                    return Ok(question);
                }
                Err(e) => {
                    warn!(topic = %request.topic, attempt, error = %e, "Question generation attempt failed");
                    if e.is_transport() && attempt < attempts && !self.policy.retry_delay.is_zero() {
                        tokio::time::sleep(self.policy.retry_delay).await;
                    }
                    last = e;
                }
            }
        }

        Err(GenerationError::Exhausted {
            attempts,
            last: Box::new(last),
        })
    }

    async fn attempt(
        &self,
        request: &GenerationRequest,
        ledger: &DedupLedger,
    ) -> Result<Question, GenerationError> {
        let raw = match self.policy.timeout {
            Some(limit) => tokio::time::timeout(limit, self.source.generate(request))
                .await
                .map_err(|_| GenerationError::Timeout(limit))?,
            None => self.source.generate(request).await,
        }
        .map_err(|e| GenerationError::Source(format!("{:#}", e)))?;

        if raw.trim().is_empty() {
            return Err(GenerationError::Empty);
        }

        let question = normalize(&raw, &request.topic)?;
        if ledger.is_duplicate_question(&question.prompt) {
            return Err(GenerationError::Duplicate(question.prompt));
        }
        Ok(question)
    }
}
