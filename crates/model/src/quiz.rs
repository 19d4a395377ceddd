use alloc::{boxed::Box, string::String, vec::Vec};
use core::fmt::{self, Display};
use serde::{Deserialize, Serialize};

/// Fewest choices a question may offer.
pub const MIN_OPTIONS: usize = 2;

/// Most choices a question may offer. This is exactly one row of buttons in a chat message.
pub const MAX_OPTIONS: usize = 5;

/// Reasons for rejecting a quiz or one of its items.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Invalid {
    EmptyName,
    NoItems,
    EmptyQuestion,
    EmptyOption,
    TooFewOptions,
    TooManyOptions,
    AnswerOutOfRange,
}

impl Display for Invalid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::EmptyName => "The quiz has no name.",
            Self::NoItems => "The quiz has no questions.",
            Self::EmptyQuestion => "A question is blank.",
            Self::EmptyOption => "A choice is blank.",
            Self::TooFewOptions => "A question has too few choices.",
            Self::TooManyOptions => "A question has too many choices.",
            Self::AnswerOutOfRange => "A question points to a choice that does not exist.",
        })
    }
}

/// Acceptable schema for a single question.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct QuizItem {
    /// Question to be displayed in chat.
    pub question: String,
    /// Possible answers to select from.
    pub options: Vec<String>,
    /// Index of the selection with the correct answer.
    pub answer: u8,
}

impl QuizItem {
    pub fn validate(&self) -> Result<(), Invalid> {
        if self.question.trim().is_empty() {
            return Err(Invalid::EmptyQuestion);
        }

        let count = self.options.len();
        if count < MIN_OPTIONS {
            return Err(Invalid::TooFewOptions);
        }

        if count > MAX_OPTIONS {
            return Err(Invalid::TooManyOptions);
        }

        if self.options.iter().any(|option| option.trim().is_empty()) {
            return Err(Invalid::EmptyOption);
        }

        if usize::from(self.answer) >= count {
            return Err(Invalid::AnswerOutOfRange);
        }

        Ok(())
    }

    /// Text of the correct choice, if the answer index is in range.
    pub fn correct(&self) -> Option<&str> {
        self.options.get(usize::from(self.answer)).map(String::as_str)
    }
}

/// A named, non-empty collection of validated questions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Quiz {
    name: Box<str>,
    items: Vec<QuizItem>,
}

impl Quiz {
    pub fn new(name: impl Into<Box<str>>, items: Vec<QuizItem>) -> Result<Self, Invalid> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Invalid::EmptyName);
        }

        if items.is_empty() {
            return Err(Invalid::NoItems);
        }

        for item in &items {
            item.validate()?;
        }

        Ok(Self { name, items })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Never empty.
    pub fn items(&self) -> &[QuizItem] {
        &self.items
    }
}
