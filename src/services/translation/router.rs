// Dispatch between the contextual chat backend and the stateless translator

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::{ChatBackend, ConversationHistory, StatelessTranslator};
use crate::core::errors::{TranslationError, TranslationResult};
use crate::core::types::TranslationMethod;

/// Owns the running conversation. Callers must serialize access; the region
/// worker holds the only instance.
pub struct TranslationRouter {
    chat: Option<Arc<dyn ChatBackend>>,
    stateless: Option<Arc<dyn StatelessTranslator>>,
    history: ConversationHistory,
    target_lang: String,
    timeout: Duration,
}

impl TranslationRouter {
    pub fn new(
        chat: Option<Arc<dyn ChatBackend>>,
        stateless: Option<Arc<dyn StatelessTranslator>>,
        target_lang: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            chat,
            stateless,
            history: ConversationHistory::default(),
            target_lang: target_lang.into(),
            timeout,
        }
    }

    pub fn with_history(mut self, history: ConversationHistory) -> Self {
        self.history = history;
        self
    }

    pub fn is_available(&self, method: TranslationMethod) -> bool {
        match method {
            TranslationMethod::Contextual => self.chat.is_some(),
            TranslationMethod::Stateless => self.stateless.is_some(),
        }
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn reset_history(&mut self) {
        self.history.reset();
    }

    pub async fn translate(
        &mut self,
        text: &str,
        method: TranslationMethod,
    ) -> TranslationResult<String> {
        match method {
            TranslationMethod::Contextual => self.translate_contextual(text).await,
            TranslationMethod::Stateless => self.translate_stateless(text).await,
        }
    }

    /// Send history plus the new user turn; commit both turns only once the
    /// stream has finished cleanly.
    async fn translate_contextual(&mut self, text: &str) -> TranslationResult<String> {
        let chat = self
            .chat
            .clone()
            .ok_or(TranslationError::BackendUnavailable(TranslationMethod::Contextual))?;

        let working = self.history.with_pending_user(text);
        let mut translation = String::new();
        let mut on_fragment = |fragment: &str| translation.push_str(fragment);

        tokio::time::timeout(self.timeout, chat.chat(&working, &mut on_fragment))
            .await
            .map_err(|_| TranslationError::Timeout(self.timeout))?
            .inspect_err(|e| warn!("Contextual translation failed, history unchanged: {}", e))?;

        self.history.record_exchange(text, translation.as_str());
        info!(
            "Contextual translation done ({} history entries)",
            self.history.len()
        );
        Ok(translation)
    }

    async fn translate_stateless(&self, text: &str) -> TranslationResult<String> {
        let translator = self
            .stateless
            .clone()
            .ok_or(TranslationError::BackendUnavailable(TranslationMethod::Stateless))?;

        tokio::time::timeout(self.timeout, translator.translate(text, &self.target_lang))
            .await
            .map_err(|_| TranslationError::Timeout(self.timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ChatMessage, ChatRole};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Echoes the last user turn back in two fragments and records what it saw
    #[derive(Default)]
    struct EchoChat {
        seen: Mutex<Vec<Vec<ChatMessage>>>,
        fail: bool,
    }

    #[async_trait]
    impl ChatBackend for EchoChat {
        async fn chat(
            &self,
            history: &[ChatMessage],
            on_fragment: &mut (dyn for<'s> FnMut(&'s str) + Send),
        ) -> TranslationResult<()> {
            self.seen.lock().push(history.to_vec());
            if self.fail {
                return Err(TranslationError::InvalidResponse("boom".into()));
            }
            let last = history.last().map(|m| m.content.clone()).unwrap_or_default();
            on_fragment("EN:");
            on_fragment(&last);
            Ok(())
        }
    }

    struct UpperTranslator;

    #[async_trait]
    impl StatelessTranslator for UpperTranslator {
        async fn translate(&self, text: &str, target_lang: &str) -> TranslationResult<String> {
            Ok(format!("[{}] {}", target_lang, text.to_uppercase()))
        }
    }

    struct SlowTranslator;

    #[async_trait]
    impl StatelessTranslator for SlowTranslator {
        async fn translate(&self, _text: &str, _target_lang: &str) -> TranslationResult<String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(String::new())
        }
    }

    fn router(chat: Arc<EchoChat>) -> TranslationRouter {
        TranslationRouter::new(
            Some(chat),
            Some(Arc::new(UpperTranslator)),
            "EN-US",
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_contextual_sees_prior_turns_in_order() {
        let chat = Arc::new(EchoChat::default());
        let mut router = router(chat.clone());

        let first = router.translate("一", TranslationMethod::Contextual).await.unwrap();
        let second = router.translate("二", TranslationMethod::Contextual).await.unwrap();
        assert_eq!(first, "EN:一");
        assert_eq!(second, "EN:二");

        let seen = chat.seen.lock();
        let second_call = &seen[1];
        let seed = router.history().seed_len();
        assert_eq!(second_call.len(), seed + 3);
        assert_eq!(second_call[seed], ChatMessage::user("一"));
        assert_eq!(second_call[seed + 1], ChatMessage::assistant("EN:一"));
        assert_eq!(second_call[seed + 2], ChatMessage::user("二"));
        assert_eq!(router.history().len(), seed + 4);
    }

    #[tokio::test]
    async fn test_failed_chat_leaves_history_untouched() {
        let chat = Arc::new(EchoChat {
            fail: true,
            ..Default::default()
        });
        let mut router = router(chat);
        let before = router.history().clone();

        let err = router.translate("一", TranslationMethod::Contextual).await;
        assert!(err.is_err());
        assert_eq!(router.history(), &before);
    }

    #[tokio::test]
    async fn test_stateless_does_not_touch_history() {
        let mut router = router(Arc::new(EchoChat::default()));
        let before = router.history().len();

        let out = router.translate("abc", TranslationMethod::Stateless).await.unwrap();
        assert_eq!(out, "[EN-US] ABC");
        assert_eq!(router.history().len(), before);
        assert!(router
            .history()
            .entries()
            .iter()
            .all(|m| m.role != ChatRole::System));
    }

    #[tokio::test]
    async fn test_reset_restores_seed() {
        let mut router = router(Arc::new(EchoChat::default()));
        router.translate("一", TranslationMethod::Contextual).await.unwrap();
        router.reset_history();
        assert_eq!(router.history().len(), router.history().seed_len());
    }

    #[tokio::test]
    async fn test_missing_backend() {
        let mut router =
            TranslationRouter::new(None, None, "EN-US", Duration::from_secs(1));
        assert!(!router.is_available(TranslationMethod::Contextual));
        let err = router.translate("x", TranslationMethod::Stateless).await.unwrap_err();
        assert!(matches!(
            err,
            TranslationError::BackendUnavailable(TranslationMethod::Stateless)
        ));
    }

    #[tokio::test]
    async fn test_stateless_timeout() {
        let mut router = TranslationRouter::new(
            None,
            Some(Arc::new(SlowTranslator)),
            "EN-US",
            Duration::from_millis(20),
        );
        let err = router.translate("x", TranslationMethod::Stateless).await.unwrap_err();
        assert!(matches!(err, TranslationError::Timeout(_)));
    }
}
