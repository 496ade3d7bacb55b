//! LLM Call primitive.
//!
//! A single inference against a backend: each attempt is bounded by a
//! timeout, transient failures are retried per the [`RetryPolicy`], and the
//! result carries an invocation id, timing, and token usage.

use crate::backend::{LlmBackend, LlmRequest, LlmResponse, TokenUsage};
use crate::error::LlmError;
use crate::retry::{RetryPolicy, with_retry};
use chrono::{DateTime, Utc};
use derek_core::LlmInvocationId;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Configuration for an LLM Call.
#[derive(Debug, Clone)]
pub struct LlmCallConfig {
    /// Temperature for sampling.
    pub temperature: Option<f32>,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
    /// Upper bound on a single attempt.
    pub timeout: Duration,
    /// Retry behavior for transient failures.
    pub retry: RetryPolicy,
}

impl Default for LlmCallConfig {
    fn default() -> Self {
        Self {
            temperature: None,
            max_tokens: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
        }
    }
}

impl LlmCallConfig {
    /// Sets the per-attempt timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// The result of an LLM Call.
#[derive(Debug, Clone, Serialize)]
pub struct LlmCallResult {
    /// Unique identifier for this invocation.
    pub id: LlmInvocationId,
    /// The generated text.
    pub content: String,
    /// Token usage statistics.
    pub usage: TokenUsage,
    /// Model that generated the response.
    pub model: String,
    /// When the call completed.
    pub timestamp: DateTime<Utc>,
    /// Wall time across all attempts, in milliseconds.
    pub latency_ms: u64,
    /// Number of attempts made.
    pub attempts: u32,
}

impl LlmCallResult {
    fn from_response(
        id: LlmInvocationId,
        response: LlmResponse,
        latency_ms: u64,
        attempts: u32,
    ) -> Self {
        Self {
            id,
            content: response.content,
            usage: response.usage,
            model: response.model,
            timestamp: Utc::now(),
            latency_ms,
            attempts,
        }
    }
}

/// An LLM Call executor bound to one backend.
#[derive(Clone)]
pub struct LlmCall {
    backend: Arc<dyn LlmBackend>,
    config: LlmCallConfig,
}

impl std::fmt::Debug for LlmCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmCall")
            .field("provider", &self.backend.provider())
            .field("model", &self.backend.model())
            .field("config", &self.config)
            .finish()
    }
}

impl LlmCall {
    /// Creates an executor for the given backend.
    #[must_use]
    pub fn new(backend: Arc<dyn LlmBackend>, config: LlmCallConfig) -> Self {
        Self { backend, config }
    }

    /// Builds the backend request for a prompt.
    #[must_use]
    pub fn build_request(&self, prompt: impl Into<String>) -> LlmRequest {
        let mut request = LlmRequest::new(prompt);

        if let Some(temp) = self.config.temperature {
            request = request.with_temperature(temp);
        }
        if let Some(max_tokens) = self.config.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }

        request
    }

    /// Sends `prompt` to the backend and waits for the reply.
    ///
    /// Dropping the returned future cancels the in-flight attempt.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Timeout`] when the last attempt exceeded the
    /// timeout, otherwise the backend's error.
    pub async fn invoke(&self, prompt: impl Into<String>) -> Result<LlmCallResult, LlmError> {
        let id = LlmInvocationId::new();
        let request = self.build_request(prompt);
        let started = Instant::now();
        let mut attempts = 0;

        let outcome = with_retry(&self.config.retry, |attempt| {
            attempts = attempt;
            let pending = self.backend.generate(&request);
            let timeout = self.config.timeout;
            async move {
                tokio::time::timeout(timeout, pending)
                    .await
                    .unwrap_or(Err(LlmError::Timeout))
            }
        })
        .await;

        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Ok(response) => {
                let result = LlmCallResult::from_response(id, response, latency_ms, attempts);
                tracing::info!(
                    invocation_id = %result.id,
                    model = %result.model,
                    latency_ms,
                    attempts,
                    input_tokens = result.usage.input_tokens,
                    output_tokens = result.usage.output_tokens,
                    "LLM call completed"
                );
                Ok(result)
            }
            Err(err) => {
                tracing::warn!(
                    invocation_id = %id,
                    provider = %self.backend.provider(),
                    error = %err,
                    latency_ms,
                    attempts,
                    "LLM call failed"
                );
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LlmProvider;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays scripted outcomes; an exhausted script hangs forever.
    struct ScriptedBackend {
        script: Mutex<VecDeque<Result<&'static str, LlmError>>>,
        requests: Mutex<Vec<LlmRequest>>,
    }

    impl ScriptedBackend {
        fn new(script: Vec<Result<&'static str, LlmError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmBackend for ScriptedBackend {
        async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
            self.requests.lock().expect("lock").push(request.clone());
            let next = self.script.lock().expect("lock").pop_front();
            match next {
                Some(outcome) => outcome.map(|content| LlmResponse {
                    content: content.to_string(),
                    usage: TokenUsage {
                        input_tokens: 4,
                        output_tokens: 2,
                    },
                    model: "scripted".to_string(),
                }),
                None => std::future::pending().await,
            }
        }

        fn provider(&self) -> LlmProvider {
            LlmProvider::Gemini
        }

        fn model(&self) -> &str {
            "scripted"
        }
    }

    fn config() -> LlmCallConfig {
        LlmCallConfig::default()
            .with_timeout(Duration::from_secs(5))
            .with_retry(RetryPolicy {
                max_attempts: 3,
                initial_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(10),
                jitter_factor: 0.0,
            })
    }

    #[test]
    fn build_request_applies_config() {
        let backend = ScriptedBackend::new(Vec::new());
        let mut cfg = config();
        cfg.temperature = Some(0.3);

        let request = LlmCall::new(backend, cfg).build_request("Hello");
        assert_eq!(request.prompt, "Hello");
        assert_eq!(request.temperature, Some(0.3));
        assert_eq!(request.max_tokens, None);
    }

    #[tokio::test(start_paused = true)]
    async fn returns_backend_reply() {
        let backend = ScriptedBackend::new(vec![Ok("Hi there")]);
        let call = LlmCall::new(backend.clone(), config());

        let result = call.invoke("Hello").await.expect("should succeed");

        assert_eq!(result.content, "Hi there");
        assert_eq!(result.attempts, 1);
        assert_eq!(result.usage.total(), 6);
        assert_eq!(backend.requests.lock().expect("lock")[0].prompt, "Hello");
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_failure() {
        let backend = ScriptedBackend::new(vec![
            Err(LlmError::RateLimited {
                retry_after_secs: None,
            }),
            Ok("second time lucky"),
        ]);
        let call = LlmCall::new(backend.clone(), config());

        let result = call.invoke("Hello").await.expect("should succeed");

        assert_eq!(result.content, "second time lucky");
        assert_eq!(result.attempts, 2);
        assert_eq!(backend.requests.lock().expect("lock").len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_backend_times_out() {
        let backend = ScriptedBackend::new(Vec::new());
        let call = LlmCall::new(backend.clone(), config());

        let err = call.invoke("Hello").await.expect_err("should time out");

        assert_eq!(err, LlmError::Timeout);
        assert_eq!(backend.requests.lock().expect("lock").len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_propagates_unchanged() {
        let backend = ScriptedBackend::new(vec![Err(LlmError::AuthenticationFailed {
            provider: "gemini".to_string(),
        })]);
        let call = LlmCall::new(backend.clone(), config());

        let err = call.invoke("Hello").await.expect_err("should fail");

        assert!(matches!(err, LlmError::AuthenticationFailed { .. }));
        assert_eq!(backend.requests.lock().expect("lock").len(), 1);
    }
}
