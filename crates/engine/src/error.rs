use crate::extract;
use core::fmt::{self, Display};
use model::Invalid;

/// Coarse classification used for logging and for deciding who hears about a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad request from the caller. Reported, never retried.
    Input,
    /// A backend (generation or delivery) misbehaved.
    Upstream,
    /// Stored data is missing or broken.
    State,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Input => "input",
            Self::Upstream => "upstream",
            Self::State => "state",
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// The source document contained no usable text or name.
    EmptyInput,
    /// The uploaded document could not be turned into text.
    Extraction(extract::Error),
    /// No quiz exists under the requested name.
    UnknownQuiz,
    /// The store refused a quiz that broke an invariant.
    InvalidQuiz(Invalid),
    /// Unrecoverable storage error.
    Store,
}

impl Error {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyInput | Self::Extraction(_) | Self::UnknownQuiz => ErrorKind::Input,
            Self::InvalidQuiz(_) | Self::Store => ErrorKind::State,
        }
    }
}

impl From<db::error::Error> for Error {
    fn from(err: db::error::Error) -> Self {
        use db::error::Error as DbError;
        match err {
            DbError::BadInput(invalid) => Self::InvalidQuiz(invalid),
            DbError::NotFound => Self::UnknownQuiz,
            DbError::Fatal => Self::Store,
        }
    }
}

impl From<extract::Error> for Error {
    fn from(err: extract::Error) -> Self {
        Self::Extraction(err)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyInput => f.write_str("The document is empty."),
            Self::Extraction(err) => err.fmt(f),
            Self::UnknownQuiz => f.write_str("Quiz not found."),
            Self::InvalidQuiz(err) => err.fmt(f),
            Self::Store => f.write_str("We encountered an unexpected storage error on our end."),
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;
