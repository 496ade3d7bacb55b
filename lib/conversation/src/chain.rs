//! The conversation chain: history + template + LLM call.
//!
//! One [`ConversationChain::run`] is one chat turn. The history snapshot is
//! taken before the model is called and the turn is written back only after
//! a successful reply, so a failed or cancelled call leaves the session as
//! it was. The store lock is never held while waiting on the model.

use crate::error::ConversationError;
use crate::message::Message;
use crate::session::SessionManager;
use derek_ai::{LlmCall, PromptTemplate};
use derek_core::{ConversationSessionId, LlmInvocationId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

/// The reply to one chat turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    /// The session the turn was recorded in.
    pub session_id: ConversationSessionId,
    /// The assistant's reply.
    pub response: String,
    /// The LLM invocation that produced the reply.
    pub invocation_id: LlmInvocationId,
}

/// Renders the prompt from a session's history and runs it through the LLM.
#[derive(Clone)]
pub struct ConversationChain {
    llm: LlmCall,
    sessions: Arc<dyn SessionManager>,
    template: PromptTemplate,
    verbose: bool,
}

impl std::fmt::Debug for ConversationChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationChain")
            .field("llm", &self.llm)
            .field("template", &self.template.name)
            .field("verbose", &self.verbose)
            .finish_non_exhaustive()
    }
}

impl ConversationChain {
    /// Creates a chain using the default conversation template.
    #[must_use]
    pub fn new(llm: LlmCall, sessions: Arc<dyn SessionManager>) -> Self {
        Self {
            llm,
            sessions,
            template: PromptTemplate::conversation(),
            verbose: false,
        }
    }

    /// Logs every rendered prompt and reply at `info` instead of `debug`.
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// The session store this chain reads and writes.
    #[must_use]
    pub fn sessions(&self) -> &Arc<dyn SessionManager> {
        &self.sessions
    }

    /// Runs one chat turn against `session_id`, or the default session.
    ///
    /// # Errors
    ///
    /// - [`ConversationError::Session`] if the session is unknown or expired
    /// - [`ConversationError::Llm`] if the model call failed
    ///
    /// History is unchanged whenever an error is returned.
    #[instrument(skip(self, input), fields(input_chars = input.chars().count()))]
    pub async fn run(
        &self,
        session_id: Option<ConversationSessionId>,
        input: &str,
    ) -> Result<ChatReply, ConversationError> {
        let id = session_id.unwrap_or_else(|| self.sessions.default_session_id());
        let snapshot = self.sessions.get_session(id).await?;
        let history = snapshot.render_history();

        let prompt = self
            .template
            .try_render(&HashMap::from([("history", history.as_str()), ("input", input)]))?;

        if self.verbose {
            tracing::info!(session_id = %id, %prompt, "Rendered prompt");
        } else {
            tracing::debug!(session_id = %id, %prompt, "Rendered prompt");
        }

        let result = self.llm.invoke(prompt).await?;

        if self.verbose {
            tracing::info!(session_id = %id, response = %result.content, "LLM reply");
        }

        self.sessions
            .append_turn(
                id,
                Message::user(input),
                Message::assistant(result.content.clone()),
            )
            .await?;

        tracing::debug!(
            session_id = %id,
            invocation_id = %result.id,
            history_messages = snapshot.message_count() + 2,
            "Recorded turn"
        );

        Ok(ChatReply {
            session_id: id,
            response: result.content,
            invocation_id: result.id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionError;
    use crate::store::InMemorySessionStore;
    use async_trait::async_trait;
    use derek_ai::{
        LlmBackend, LlmCallConfig, LlmError, LlmProvider, LlmRequest, LlmResponse, RetryPolicy,
        TokenUsage,
    };
    use std::sync::Mutex;

    /// Answers every prompt with `reply`, or fails with `error` when set.
    struct MockBackend {
        reply: String,
        error: Option<LlmError>,
        prompts: Mutex<Vec<String>>,
    }

    impl MockBackend {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                error: None,
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn failing(error: LlmError) -> Arc<Self> {
            Arc::new(Self {
                reply: String::new(),
                error: Some(error),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl LlmBackend for MockBackend {
        async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
            self.prompts.lock().expect("lock").push(request.prompt.clone());
            tokio::task::yield_now().await;
            match &self.error {
                Some(err) => Err(err.clone()),
                None => Ok(LlmResponse {
                    content: self.reply.clone(),
                    usage: TokenUsage::default(),
                    model: "mock".to_string(),
                }),
            }
        }

        fn provider(&self) -> LlmProvider {
            LlmProvider::Gemini
        }

        fn model(&self) -> &str {
            "mock"
        }
    }

    fn chain(backend: Arc<MockBackend>) -> (ConversationChain, Arc<InMemorySessionStore>) {
        let store = Arc::new(InMemorySessionStore::default());
        let llm = LlmCall::new(
            backend,
            LlmCallConfig::default().with_retry(RetryPolicy::no_retry()),
        );
        (ConversationChain::new(llm, store.clone()), store)
    }

    #[tokio::test]
    async fn second_turn_sees_first_turn() {
        let backend = MockBackend::replying("Hi there!");
        let (chain, store) = chain(backend.clone());

        let first = chain.run(None, "Hello").await.expect("first turn");
        let second = chain.run(None, "Hello").await.expect("second turn");

        assert_eq!(first.response, "Hi there!");
        assert_eq!(first.session_id, store.default_session_id());
        assert_eq!(second.session_id, first.session_id);
        assert_ne!(first.invocation_id, second.invocation_id);

        let prompts = backend.prompts();
        assert_eq!(
            prompts[0],
            "You are a helpful assistant. Here is the conversation so far:\n\nUser: Hello\nAssistant:"
        );
        assert!(prompts[1].contains("User: Hello\nAssistant: Hi there!\nUser: Hello\nAssistant:"));

        let session = store.get_session(first.session_id).await.expect("session");
        assert_eq!(session.message_count(), 4);
    }

    #[tokio::test]
    async fn empty_message_is_sent_and_recorded() {
        let backend = MockBackend::replying("Could you say more?");
        let (chain, store) = chain(backend.clone());

        let reply = chain.run(None, "").await.expect("empty message is a valid turn");

        assert_eq!(reply.response, "Could you say more?");
        let prompts = backend.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].ends_with("User: \nAssistant:"));

        let session = store.get_session(reply.session_id).await.expect("session");
        assert_eq!(session.message_count(), 2);
        assert_eq!(session.messages[0].content, "");
        assert_eq!(session.messages[1].content, "Could you say more?");
    }

    #[tokio::test]
    async fn llm_failure_leaves_history_untouched() {
        let backend = MockBackend::failing(LlmError::AuthenticationFailed {
            provider: "gemini".to_string(),
        });
        let (chain, store) = chain(backend.clone());

        let err = chain.run(None, "Hello").await.expect_err("llm fails");

        assert!(matches!(
            err,
            ConversationError::Llm(LlmError::AuthenticationFailed { .. })
        ));
        assert_eq!(backend.prompts().len(), 1);
        let session = store
            .get_session(store.default_session_id())
            .await
            .expect("session");
        assert!(session.messages.is_empty());
    }

    #[tokio::test]
    async fn unknown_session_is_reported() {
        let backend = MockBackend::replying("unused");
        let (chain, _store) = chain(backend.clone());
        let id = ConversationSessionId::new();

        let err = chain.run(Some(id), "Hello").await.expect_err("unknown");

        assert_eq!(err, ConversationError::Session(SessionError::NotFound { id }));
        assert!(backend.prompts().is_empty());
    }

    #[tokio::test]
    async fn sessions_have_separate_histories() {
        let backend = MockBackend::replying("ok");
        let (chain, store) = chain(backend.clone());
        let other = store.create_session().await.expect("create");

        chain.run(None, "about cats").await.expect("default turn");
        chain.run(Some(other.id), "about dogs").await.expect("other turn");

        let prompts = backend.prompts();
        assert!(!prompts[1].contains("cats"));

        let other = store.get_session(other.id).await.expect("session");
        assert_eq!(other.render_history(), "User: about dogs\nAssistant: ok");
        assert_eq!(other.metadata.title.as_deref(), Some("about dogs"));
    }

    #[tokio::test]
    async fn concurrent_turns_are_both_recorded_from_stale_snapshots() {
        let backend = MockBackend::replying("ack");
        let (chain, store) = chain(backend.clone());

        let (a, b) = tokio::join!(chain.run(None, "first"), chain.run(None, "second"));
        a.expect("first turn");
        b.expect("second turn");

        let session = store
            .get_session(store.default_session_id())
            .await
            .expect("session");
        assert_eq!(session.message_count(), 4);
        for pair in session.messages.chunks(2) {
            assert!(pair[0].content == "first" || pair[0].content == "second");
            assert_eq!(pair[1].content, "ack");
        }
        let mut asked: Vec<_> = session
            .messages
            .iter()
            .step_by(2)
            .map(|m| m.content.as_str())
            .collect();
        asked.sort_unstable();
        assert_eq!(asked, vec!["first", "second"]);

        // Both turns snapshot the history before either appends, so neither
        // prompt carries the other turn.
        let prompts = backend.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts.iter().all(|p| !p.contains("Assistant: ack")));
        let (with_first, with_second): (Vec<_>, Vec<_>) =
            prompts.iter().partition(|p| p.contains("User: first"));
        assert_eq!(with_first.len(), 1);
        assert!(!with_first[0].contains("User: second"));
        assert!(!with_second[0].contains("User: first"));
    }
}
