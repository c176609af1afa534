//! Grounded answer generation.
//!
//! A [`LanguageModel`] is the raw completion service; a [`Generator`] turns
//! an [`AugmentedPrompt`] into an [`Answer`] whose citations are exactly the
//! chunks the prompt carried.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::{NoContextPolicy, RagConfig};
use crate::document::Answer;
use crate::error::{RagError, Result};
use crate::prompt::AugmentedPrompt;
use crate::retry::{RetryPolicy, with_timeout};

/// Answer text used when no supporting context was retrieved.
pub const NO_CONTEXT_NOTICE: &str =
    "No supporting context was found in the indexed documents for this question.";

/// A text completion service.
///
/// Implementations report an unreachable service, a non-success response,
/// or an unparseable body as
/// [`RagError::GenerationServiceError`](crate::RagError::GenerationServiceError).
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete `prompt` and return the generated text.
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Model name, used in errors and logs.
    fn name(&self) -> &str;
}

/// Produces grounded answers from augmented prompts.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &AugmentedPrompt) -> Result<Answer>;
}

/// The default [`Generator`]: one [`LanguageModel`] call per answer, under a
/// per-call timeout, retried a bounded number of times.
///
/// Empty model output is treated as a service error and retried like one.
pub struct GroundedGenerator {
    model: Arc<dyn LanguageModel>,
    timeout: Duration,
    retry: RetryPolicy,
    no_context_policy: NoContextPolicy,
}

impl GroundedGenerator {
    /// Create a generator using the default timeouts and policies.
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self::from_config(model, &RagConfig::default())
    }

    /// Create a generator using the generation settings of `config`.
    pub fn from_config(model: Arc<dyn LanguageModel>, config: &RagConfig) -> Self {
        Self {
            model,
            timeout: config.generation_timeout(),
            retry: RetryPolicy { max_attempts: config.generation_max_attempts, ..config.retry },
            no_context_policy: config.no_context_policy,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_no_context_policy(mut self, policy: NoContextPolicy) -> Self {
        self.no_context_policy = policy;
        self
    }

    async fn complete_once(&self, prompt: &str) -> Result<String> {
        let model = self.model.name().to_string();
        let timeout = self.timeout;
        let text = with_timeout(timeout, self.model.complete(prompt), || {
            RagError::GenerationTimeout { model: model.clone(), timeout_ms: timeout.as_millis() as u64 }
        })
        .await?;
        if text.trim().is_empty() {
            return Err(RagError::GenerationServiceError {
                model,
                message: "model returned an empty completion".to_string(),
            });
        }
        Ok(text)
    }
}

#[async_trait]
impl Generator for GroundedGenerator {
    async fn generate(&self, prompt: &AugmentedPrompt) -> Result<Answer> {
        if !prompt.has_context() && self.no_context_policy == NoContextPolicy::Decline {
            debug!(model = self.model.name(), "no context retrieved, declining to generate");
            return Ok(Answer { text: NO_CONTEXT_NOTICE.to_string(), citations: Vec::new() });
        }

        let text = prompt.text.as_str();
        let completed = self.retry.run("generate", move || self.complete_once(text)).await?;
        info!(
            model = self.model.name(),
            retries = completed.retries,
            citation_count = prompt.citations.len(),
            "generated answer"
        );

        let text = if prompt.has_context() {
            completed.value
        } else {
            format!("{NO_CONTEXT_NOTICE}\n\n{}", completed.value)
        };
        Ok(Answer { text, citations: prompt.citations.clone() })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::document::Citation;

    /// Replays scripted outcomes; `None` stalls past any timeout.
    struct ScriptedModel {
        script: Mutex<VecDeque<Option<Result<String>>>>,
        calls: AtomicUsize,
    }

    impl ScriptedModel {
        fn new(script: Vec<Option<Result<String>>>) -> Arc<Self> {
            Arc::new(Self { script: Mutex::new(script.into()), calls: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Some(outcome)) => outcome,
                Some(None) => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok("late".into())
                }
                None => Ok("default answer".into()),
            }
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn grounded_prompt() -> AugmentedPrompt {
        AugmentedPrompt {
            query: "How did North America perform?".into(),
            text: "context and question".into(),
            citations: vec![Citation { chunk_id: "q1_0".into(), document_id: "q1".into(), score: 0.7 }],
            dropped: 0,
        }
    }

    fn empty_prompt() -> AugmentedPrompt {
        AugmentedPrompt { query: "q".into(), text: "no context".into(), citations: vec![], dropped: 0 }
    }

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy { max_attempts, base_delay_ms: 1, max_delay_ms: 1 }
    }

    #[tokio::test]
    async fn citations_are_the_prompt_chunks() {
        let model = ScriptedModel::new(vec![Some(Ok("Revenue grew 25%.".into()))]);
        let answer = GroundedGenerator::new(model).generate(&grounded_prompt()).await.unwrap();
        assert_eq!(answer.text, "Revenue grew 25%.");
        assert_eq!(answer.citations, grounded_prompt().citations);
    }

    #[tokio::test]
    async fn decline_skips_the_model() {
        let model = ScriptedModel::new(vec![]);
        let generator = GroundedGenerator::new(model.clone());
        let answer = generator.generate(&empty_prompt()).await.unwrap();
        assert_eq!(answer.text, NO_CONTEXT_NOTICE);
        assert!(answer.citations.is_empty());
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn hedge_prefixes_the_notice() {
        let model = ScriptedModel::new(vec![Some(Ok("Probably Paris.".into()))]);
        let generator =
            GroundedGenerator::new(model).with_no_context_policy(NoContextPolicy::Hedge);
        let answer = generator.generate(&empty_prompt()).await.unwrap();
        assert!(answer.text.starts_with(NO_CONTEXT_NOTICE));
        assert!(answer.text.ends_with("Probably Paris."));
        assert!(answer.citations.is_empty());
    }

    #[tokio::test]
    async fn empty_output_is_retried_then_reported() {
        let model = ScriptedModel::new(vec![Some(Ok("  ".into())), Some(Ok(String::new()))]);
        let generator = GroundedGenerator::new(model.clone()).with_retry(fast_retry(2));
        let err = generator.generate(&grounded_prompt()).await.unwrap_err();
        assert!(matches!(err, RagError::GenerationServiceError { .. }));
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn transient_failure_then_success() {
        let model = ScriptedModel::new(vec![
            Some(Err(RagError::GenerationServiceError {
                model: "scripted".into(),
                message: "503".into(),
            })),
            Some(Ok("ok".into())),
        ]);
        let generator = GroundedGenerator::new(model.clone()).with_retry(fast_retry(3));
        assert_eq!(generator.generate(&grounded_prompt()).await.unwrap().text, "ok");
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_reported_after_bounded_attempts() {
        let model = ScriptedModel::new(vec![None, None]);
        let generator = GroundedGenerator::new(model.clone())
            .with_timeout(Duration::from_millis(50))
            .with_retry(fast_retry(2));
        let err = generator.generate(&grounded_prompt()).await.unwrap_err();
        assert!(matches!(err, RagError::GenerationTimeout { timeout_ms: 50, .. }));
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    }
}
