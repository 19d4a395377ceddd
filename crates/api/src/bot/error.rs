use core::fmt::{self, Display};

#[derive(Debug)]
pub enum Error {
    UnsupportedInteraction,
    UnknownCommandName,
    InvalidParams,
    UnknownUser,
    UnknownChannel,
    Forbidden,
    UnknownQuiz,
    NoSession,
    UntrustedAttachment,
    DocumentTooLarge,
    Download,
    Ingest(engine::Error),
    Fatal,
}

impl From<engine::Error> for Error {
    fn from(err: engine::Error) -> Self {
        match err {
            engine::Error::UnknownQuiz => Self::UnknownQuiz,
            engine::Error::Store => Self::Fatal,
            err => Self::Ingest(err),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::UnsupportedInteraction => "This interaction is not supported.",
            Self::UnknownCommandName => "This command is not supported.",
            Self::InvalidParams => "Invalid parameters.",
            Self::UnknownUser => "We could not identify who sent this command.",
            Self::UnknownChannel => "This command can only be used in a channel.",
            Self::Forbidden => "Only administrators may use this command.",
            Self::UnknownQuiz => "Quiz not found.",
            Self::NoSession => "No quiz is running in this channel.",
            Self::UntrustedAttachment => "Only `.pdf`, `.txt` and `.md` attachments uploaded to Discord are accepted.",
            Self::DocumentTooLarge => "The attachment is too large.",
            Self::Download => "We could not download the attachment.",
            Self::Ingest(err) => return write!(f, "Could not build quiz. {err}"),
            Self::Fatal => "Oops! We encountered an unexpected error on our end.",
        })
    }
}

pub type Result<T> = core::result::Result<T, Error>;
