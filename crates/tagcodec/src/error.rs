//! # Error Definitions
//!
//! Every encode and decode failure. None of these are retried or defaulted;
//! they surface to whoever called `encode` or `decode`.

use tagpack::Tag;

use crate::resolve::ScopeId;

/// Codec failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// No decoder is registered for a tag found on the wire.
    UnknownTag(Tag),
    /// No encoder is registered for the runtime type of an object value.
    UnencodableType(&'static str),
    /// A reference named something that is not live in the resolution context.
    ///
    /// An empty `path` means the scope itself was not found; otherwise `path`
    /// lists the names up to and including the one that missed.
    UnresolvedReference { scope: ScopeId, path: Vec<String> },
    /// A tagged node did not have the shape its decoder requires.
    Malformed { tag: Tag, reason: String },
}

impl Error {
    pub(crate) fn malformed(tag: &Tag, reason: impl Into<String>) -> Self {
        Error::Malformed { tag: tag.clone(), reason: reason.into() }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::UnknownTag(tag) => write!(f, "no decoder registered for tag '!{}'", tag),
            Error::UnencodableType(name) => write!(f, "no encoder registered for type '{}'", name),
            Error::UnresolvedReference { scope, path } if path.is_empty() => {
                write!(f, "{} does not exist", scope)
            }
            Error::UnresolvedReference { scope, path } => {
                write!(f, "no object '{}' in {}", path.join("/"), scope)
            }
            Error::Malformed { tag, reason } => write!(f, "malformed '!{}' node: {}", tag, reason),
        }
    }
}

impl std::error::Error for Error {}

/// A specialized Result type for codec operations.
pub type Result<T> = std::result::Result<T, Error>;
