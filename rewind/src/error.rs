//! Application error types.

use std::fmt;
use std::ops::Deref;

use abscissa_core::error::{BoxError, Context};

use crate::components::checkpoints::CheckpointError;

macro_rules! wfl {
    ($f:ident, $message_id:literal) => {
        write!($f, "{}", $crate::fl!($message_id))
    };

    ($f:ident, $message_id:literal, $($args:expr),* $(,)?) => {
        write!($f, "{}", $crate::fl!($message_id, $($args), *))
    };
}

/// Kinds of errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A failure without a more specific category.
    Generic,
    /// Rewind could not be set up, e.g. because of invalid configuration.
    Init,
    /// The checkpoint file could not be used.
    Checkpoint,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Generic => wfl!(f, "err-kind-generic"),
            ErrorKind::Init => wfl!(f, "err-kind-init"),
            ErrorKind::Checkpoint => wfl!(f, "err-kind-checkpoint"),
        }
    }
}

impl std::error::Error for ErrorKind {}

impl ErrorKind {
    /// Creates an error context from this error.
    pub(crate) fn context(self, source: impl Into<BoxError>) -> Context<ErrorKind> {
        Context::new(self, Some(source.into()))
    }
}

/// Error type
#[derive(Debug)]
pub struct Error(Box<Context<ErrorKind>>);

impl Deref for Error {
    type Target = Context<ErrorKind>;

    fn deref(&self) -> &Context<ErrorKind> {
        &self.0
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.0)?;
        writeln!(f)?;
        write!(f, "[ {} ]", crate::fl!("err-ux-A"))
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Context::new(kind, None).into()
    }
}

impl From<Context<ErrorKind>> for Error {
    fn from(context: Context<ErrorKind>) -> Self {
        Error(Box::new(context))
    }
}

impl From<CheckpointError> for Error {
    fn from(e: CheckpointError) -> Self {
        ErrorKind::Checkpoint.context(e).into()
    }
}

#[cfg(test)]
mod tests {
    use crate::components::checkpoints::Checkpoints;

    use super::{Error, ErrorKind};

    #[test]
    fn checkpoint_errors_keep_their_kind_and_source() {
        let e: Error = Checkpoints::parse("100 1600000000 zz").unwrap_err().into();
        assert_eq!(e.kind(), &ErrorKind::Checkpoint);
        assert_eq!(
            std::error::Error::source(&e).map(ToString::to_string),
            Some("line 1: invalid block hash".to_owned())
        );
    }
}
