use crate::core::types::ChatMessage;

const SEED_INSTRUCTION: &str = "Your task is to translate text from Japanese to English. \
You can use before conversation for context, but your final answer should only give the translation. \
Do not provide any additional explanations or comments. Only return the translation of the given text. \
The result of the translate should pay attention to the atmosphere of the original text, and the \
translation should be accurate, maintain the original tone, handle cultural nuances, and ensure \
proper grammar and terminology.";

const SEED_ACKNOWLEDGEMENT: &str = "The task is to translate Japanese text into English, using prior \
conversations for context if necessary, but ensuring the final output is solely the translation \
without additional commentary. The translation should be accurate, maintain the original tone, \
handle cultural nuances, and ensure proper grammar and terminology.";

/// Running conversation for the context-aware translator.
///
/// Starts with fixed seed turns. Between resets it only grows, and always by
/// a complete user/assistant pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationHistory {
    entries: Vec<ChatMessage>,
    seed: Vec<ChatMessage>,
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::with_seed(default_seed())
    }
}

/// Instruction turn plus the assistant's acknowledgement of the style
pub fn default_seed() -> Vec<ChatMessage> {
    vec![
        ChatMessage::user(SEED_INSTRUCTION),
        ChatMessage::assistant(SEED_ACKNOWLEDGEMENT),
    ]
}

impl ConversationHistory {
    pub fn with_seed(seed: Vec<ChatMessage>) -> Self {
        Self {
            entries: seed.clone(),
            seed,
        }
    }

    pub fn entries(&self) -> &[ChatMessage] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn seed_len(&self) -> usize {
        self.seed.len()
    }

    /// Current history plus a pending user turn, without committing it
    pub fn with_pending_user(&self, text: &str) -> Vec<ChatMessage> {
        let mut working = Vec::with_capacity(self.entries.len() + 1);
        working.extend_from_slice(&self.entries);
        working.push(ChatMessage::user(text));
        working
    }

    pub fn record_exchange(&mut self, user_text: impl Into<String>, translation: impl Into<String>) {
        self.entries.push(ChatMessage::user(user_text));
        self.entries.push(ChatMessage::assistant(translation));
    }

    pub fn reset(&mut self) {
        self.entries.clone_from(&self.seed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ChatRole;

    #[test]
    fn test_default_seed_shape() {
        let history = ConversationHistory::default();
        assert_eq!(history.len(), 2);
        assert_eq!(history.seed_len(), 2);
        assert_eq!(history.entries()[0].role, ChatRole::User);
        assert_eq!(history.entries()[1].role, ChatRole::Assistant);
    }

    #[test]
    fn test_pending_user_does_not_commit() {
        let history = ConversationHistory::default();
        let working = history.with_pending_user("こんにちは");
        assert_eq!(working.len(), 3);
        assert_eq!(working[2], ChatMessage::user("こんにちは"));
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_record_and_reset() {
        let mut history = ConversationHistory::default();
        history.record_exchange("一", "one");
        history.record_exchange("二", "two");
        assert_eq!(history.len(), 6);
        assert_eq!(history.entries()[5], ChatMessage::assistant("two"));

        history.reset();
        assert_eq!(history.entries(), default_seed().as_slice());
    }
}
