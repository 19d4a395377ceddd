#![cfg_attr(not(test), no_std)]
extern crate alloc;

pub mod conversation;
pub mod quiz;

pub use conversation::ConversationId;
pub use quiz::{Invalid, Quiz, QuizItem, MAX_OPTIONS, MIN_OPTIONS};
