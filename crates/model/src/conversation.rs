use alloc::{boxed::Box, string::String};
use core::fmt::{self, Display};

/// Opaque identifier of the chat that receives quiz deliveries.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConversationId(Box<str>);

impl ConversationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConversationId {
    fn from(id: &str) -> Self {
        Self(id.into())
    }
}

impl From<String> for ConversationId {
    fn from(id: String) -> Self {
        Self(id.into_boxed_str())
    }
}

impl Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
