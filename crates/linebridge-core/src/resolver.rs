//! Reply resolution: intent answer first, generative fallback when the
//! intent service flags the utterance as unmatched.

use std::sync::Arc;

use tracing::debug;

use crate::fallback::FallbackGenerator;
use crate::intent::IntentDetector;
use crate::types::IntentResult;

/// Decides which reply a user gets.
#[derive(Clone)]
pub struct ReplyResolver {
    intent: Arc<dyn IntentDetector>,
    fallback: Arc<dyn FallbackGenerator>,
}

impl ReplyResolver {
    pub fn new(intent: Arc<dyn IntentDetector>, fallback: Arc<dyn FallbackGenerator>) -> Self {
        Self { intent, fallback }
    }

    /// Resolve the reply for `text` from `user_id`.
    ///
    /// When the intent result is flagged as fallback its text is discarded
    /// and the generative fallback answers the original text instead.
    pub async fn resolve(&self, text: &str, user_id: &str) -> String {
        self.resolve_with_intent(text, user_id).await.1
    }

    /// Like [`resolve`](Self::resolve), also returning the intent result the
    /// reply was based on. The intent service is called once.
    pub async fn resolve_with_intent(&self, text: &str, user_id: &str) -> (IntentResult, String) {
        let result = self.intent.resolve_intent(text, user_id).await;
        let reply = if result.is_fallback {
            debug!("Intent flagged fallback for {}, using generative reply", user_id);
            self.fallback.generate_fallback(text).await
        } else {
            result.reply_text.clone()
        };
        (result, reply)
    }
}
