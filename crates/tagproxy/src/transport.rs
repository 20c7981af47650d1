//! # Transport Abstraction
//!
//! The backend collaborators a proxy talks to.
//!
//! ## Philosophy
//!
//! - **Text-Oriented**: A `Module` moves one request string in and one response
//!   string out. It knows nothing about tags, values or the registry.
//! - **Two Failure Channels**: An `Err` from `send_command` means the request
//!   never got a real answer. An empty `Ok` response means the command ran and
//!   reported failure. Callers must be able to tell these apart.

use std::fmt;

use tagcodec::Resolver;
use tagcodec::ScopeId;

/// Errors that occur below the command protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The module is gone or the channel to it was closed.
    ConnectionLost(String),
    /// The module has no handler for the command it was sent.
    UnknownCommand(String),
    /// Generic I/O error or internal transport failure.
    Io(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionLost(msg) => write!(f, "Connection lost: {}", msg),
            Self::UnknownCommand(name) => write!(f, "Unknown command: {}", name),
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {}

pub type Result<T> = std::result::Result<T, TransportError>;

/// A named backend module that executes text commands.
pub trait Module: Send {
    /// Sends one framed request and blocks for the response.
    ///
    /// # invariants
    /// - Must return `Ok("")` (or whitespace) when the command itself failed.
    /// - Must return `Err` only if the request could not be delivered or answered.
    /// - Should not interpret the payload beyond routing on the command name.
    fn send_command(&mut self, request: &str) -> Result<String>;

    /// True if the module has a handler for `command`.
    fn supports_command(&self, command: &str) -> bool;

    /// The name the module reports for itself.
    fn plugin_name(&self) -> &str;
}

/// A backend that can load modules and resolve references to its objects.
pub trait Backend: Resolver + Send + Sync {
    /// Loads the module called `name` into `scope`, or `None` if there is no such module.
    fn create_module(&self, scope: ScopeId, name: &str) -> Option<Box<dyn Module>>;
}
