pub mod deepl;
pub mod history;
pub mod router;
pub mod together;

use async_trait::async_trait;

use crate::core::errors::TranslationResult;
use crate::core::types::ChatMessage;

pub use deepl::DeeplClient;
pub use history::ConversationHistory;
pub use router::TranslationRouter;
pub use together::TogetherChatClient;

/// Chat model that translates the last user turn using the whole history.
///
/// Content arrives token by token; each fragment is handed to `on_fragment`
/// in order as it streams in.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat(
        &self,
        history: &[ChatMessage],
        on_fragment: &mut (dyn for<'s> FnMut(&'s str) + Send),
    ) -> TranslationResult<()>;
}

/// One-shot translator with no memory between calls
#[async_trait]
pub trait StatelessTranslator: Send + Sync {
    async fn translate(&self, text: &str, target_lang: &str) -> TranslationResult<String>;
}
