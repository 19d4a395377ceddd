use core::{
    fmt::{self, Display},
    future::Future,
};
use model::{ConversationId, QuizItem};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryError {
    /// The channel is temporarily unavailable. The tick counts as missed.
    Transient,
    /// The conversation can never receive deliveries again.
    Unrecoverable,
}

impl Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Transient => "delivery temporarily failed",
            Self::Unrecoverable => "conversation can no longer receive deliveries",
        })
    }
}

/// Outward capability that shows one quiz item in a conversation.
pub trait Deliver: Send + Sync {
    fn deliver(
        &self,
        conversation: &ConversationId,
        item: &QuizItem,
    ) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}
