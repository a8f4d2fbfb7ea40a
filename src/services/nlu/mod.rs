pub mod dialogflow;
pub mod llm;

use async_trait::async_trait;

use crate::models::{ConfirmationPolicy, ResolvedIntent};

/// Turns a free-text utterance into a structured intent.
#[async_trait]
pub trait NluAdapter: Send + Sync {
    async fn resolve(&self, session_id: &str, utterance: &str) -> anyhow::Result<ResolvedIntent>;

    /// Whether a checked-out slot may be committed straight away, or only
    /// after the user confirms.
    fn confirmation_policy(&self) -> ConfirmationPolicy {
        ConfirmationPolicy::Immediate
    }

    /// Called with the reply sent for the turn, for adapters that keep
    /// their own conversation history.
    fn record_reply(&self, _session_id: &str, _reply: &str) {}
}
