//! Chat turn handling
//!
//! One turn: detect the language of the input, replay the conversation to
//! the completion provider with the new message last, commit both turns,
//! then flush usage. A failed completion leaves the session untouched.

use crate::completion::CompletionProvider;
use crate::errors::{AppError, Result};
use crate::language::{self, LanguageDetector};
use crate::metrics::{self, TurnOutcome};
use crate::session::{Session, Turn};
use crate::usage::UsageAggregator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

/// Reply to one chat turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub reply: String,
    pub lang: String,
    pub lang_label: String,
}

/// Composes detection, completion and usage accounting
pub struct ChatService {
    detector: Arc<dyn LanguageDetector>,
    provider: Arc<dyn CompletionProvider>,
    usage: UsageAggregator,
}

impl ChatService {
    pub fn new(
        detector: Arc<dyn LanguageDetector>,
        provider: Arc<dyn CompletionProvider>,
        usage: UsageAggregator,
    ) -> Self {
        Self {
            detector,
            provider,
            usage,
        }
    }

    /// Model the provider completes with
    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Run one turn against `session`.
    ///
    /// The caller must hold the session's lease for the duration of the call.
    #[instrument(skip(self, session, message), fields(uid = %session.uid()))]
    pub async fn handle_turn(
        &self,
        session: &mut Session,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<ChatReply> {
        let text = message.trim();
        if text.is_empty() {
            metrics::record_chat_turn(TurnOutcome::Rejected);
            return Err(AppError::Validation {
                message: "Message must not be empty".to_string(),
                field: Some("message".to_string()),
            });
        }

        let lang = language::detect_or_unknown(self.detector.as_ref(), text);
        metrics::record_language(&lang);

        let pending = Turn::user(text, lang.clone());
        let history = session.history_with(&pending);

        let reply = match self.provider.complete(&history).await {
            Ok(reply) => reply,
            Err(e) => {
                metrics::record_chat_turn(TurnOutcome::ProviderError);
                return Err(match e {
                    AppError::Provider { .. } => e,
                    other => AppError::Provider {
                        message: other.to_string(),
                    },
                });
            }
        };

        session.record_exchange(pending, Turn::assistant(reply.clone(), lang.clone()));
        self.usage.flush_best_effort(session, now).await;
        metrics::record_chat_turn(TurnOutcome::Success);

        info!(
            lang = %lang,
            turns = session.messages().len(),
            total_user_messages = session.total_user_messages(),
            "Chat turn completed"
        );

        Ok(ChatReply {
            lang_label: language::label(&lang),
            lang,
            reply,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::MockProvider;
    use crate::db::failing::FailingStore;
    use crate::db::{DocumentStore, MemoryStore};
    use crate::session::{FlushCursor, Role};
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::Mutex;
    use tokio_test::{assert_err, assert_ok};

    struct FixedDetector(&'static str);

    impl LanguageDetector for FixedDetector {
        fn detect(&self, _text: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    /// Records every history it is asked to complete
    #[derive(Default)]
    struct RecordingProvider {
        calls: Mutex<Vec<Vec<Turn>>>,
    }

    #[async_trait]
    impl CompletionProvider for RecordingProvider {
        async fn complete(&self, history: &[Turn]) -> Result<String> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(history.to_vec());
            Ok(format!("reply {}", calls.len()))
        }

        fn model_name(&self) -> &str {
            "recording"
        }
    }

    fn service(provider: Arc<dyn CompletionProvider>) -> (ChatService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let service = ChatService::new(
            Arc::new(FixedDetector("te")),
            provider,
            UsageAggregator::new(store.clone()),
        );
        (service, store)
    }

    #[tokio::test]
    async fn test_turn_appends_both_sides_and_flushes() {
        let (chat, store) = service(Arc::new(MockProvider::new()));
        let start = Utc::now();
        let mut session = Session::start("uid-1", start);

        let reply = chat
            .handle_turn(&mut session, "  namaskaram  ", start + Duration::seconds(10))
            .await
            .unwrap();

        assert_eq!(reply.lang, "te");
        assert_eq!(reply.lang_label, "Telugu (te)");
        assert_eq!(reply.reply, "echo (1 turns): namaskaram");

        assert_eq!(session.messages().len(), 2);
        assert_eq!(session.messages()[0].content, "namaskaram");
        assert_eq!(session.messages()[1].role, Role::Assistant);
        assert_eq!(session.total_user_messages(), 1);

        let usage = store.get_usage("uid-1").await.unwrap().unwrap();
        assert_eq!(usage.total_messages, 1);
        assert_eq!(usage.total_session_seconds, 10);
    }

    #[tokio::test]
    async fn test_history_replayed_in_order_with_new_turn_once() {
        let provider = Arc::new(RecordingProvider::default());
        let (chat, _store) = service(provider.clone());
        let now = Utc::now();
        let mut session = Session::start("uid-1", now);

        assert_ok!(chat.handle_turn(&mut session, "first", now).await);
        assert_ok!(chat.handle_turn(&mut session, "second", now).await);

        let calls = provider.calls.lock().unwrap();
        let second = &calls[1];
        let contents: Vec<&str> = second.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "reply 1", "second"]);
        assert_eq!(second.iter().filter(|t| t.content == "second").count(), 1);
    }

    #[tokio::test]
    async fn test_empty_message_is_rejected_without_mutation() {
        let (chat, store) = service(Arc::new(MockProvider::new()));
        let now = Utc::now();
        let mut session = Session::start("uid-1", now);

        let err = assert_err!(chat.handle_turn(&mut session, "   ", now).await);
        assert!(matches!(err, AppError::Validation { .. }));
        assert!(session.messages().is_empty());
        assert!(store.get_usage("uid-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_provider_failure_rolls_back_pending_turn() {
        let (chat, store) = service(Arc::new(MockProvider::failing()));
        let now = Utc::now();
        let mut session = Session::start("uid-1", now);
        let before = session.clone();

        let err = assert_err!(chat.handle_turn(&mut session, "hello", now).await);
        assert!(matches!(err, AppError::Provider { .. }));
        assert_eq!(session, before);
        assert!(store.get_usage("uid-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_flush_does_not_fail_the_turn() {
        let store = Arc::new(FailingStore::failing());
        let chat = ChatService::new(
            Arc::new(FixedDetector("en")),
            Arc::new(MockProvider::new()),
            UsageAggregator::new(store.clone()),
        );
        let start = Utc::now();
        let mut session = Session::start("uid-1", start);

        let reply = assert_ok!(
            chat.handle_turn(&mut session, "hello", start + Duration::seconds(5))
                .await
        );
        assert_eq!(reply.reply, "echo (1 turns): hello");
        assert_eq!(session.messages().len(), 2);
        assert_eq!(session.total_user_messages(), 1);
        assert_eq!(session.flushed(), FlushCursor::default());
        assert!(store.get_usage("uid-1").await.unwrap().is_none());

        store.set_failing(false);
        assert_ok!(
            chat.handle_turn(&mut session, "again", start + Duration::seconds(9))
                .await
        );

        let usage = store.get_usage("uid-1").await.unwrap().unwrap();
        assert_eq!(usage.total_messages, 2);
        assert_eq!(usage.total_session_seconds, 9);
    }

    #[tokio::test]
    async fn test_undetectable_input_uses_unknown() {
        let store = Arc::new(MemoryStore::new());
        let chat = ChatService::new(
            Arc::new(crate::language::WhatlangDetector),
            Arc::new(MockProvider::new()),
            UsageAggregator::new(store),
        );
        let now = Utc::now();
        let mut session = Session::start("uid-1", now);

        let reply = chat.handle_turn(&mut session, "1234 !!!", now).await.unwrap();
        assert_eq!(reply.lang, "unknown");
        assert_eq!(reply.lang_label, "Unknown");
    }
}
