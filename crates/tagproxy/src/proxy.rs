//! # Command Proxy
//!
//! Invokes named commands on one backend module, marshalling arguments and
//! results through a codec `Registry`.
//!
//! A proxy is bound once and stays bound: `bind` loads the module, every
//! `invoke` reuses it, and dropping the proxy releases it.
//!
//! ## Protocol
//!
//! - Request: `<command><separator><payload>`, where the payload is the text
//!   form of a positional list, a keyword map, or `{}` for no arguments.
//! - Response: the text form of the result, or an empty string if the
//!   command failed.
//!
//! ## Invariants
//!
//! - Unsupported commands and ambiguous arguments never reach the module
//! - Empty responses are `CommandFailed`, never a decoded null
//! - Transport errors stay distinct from command failures

use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use tagcodec::Registry;
use tagcodec::ScopeId;
use tagcodec::Value;
use tracing::debug;
use tracing::debug_span;
use tracing::trace;
use tracing::warn;

use crate::transport::Backend;
use crate::transport::Module;
use crate::transport::TransportError;

/// Separator placed between the command name and its payload.
pub const DEFAULT_SEPARATOR: &str = " \n";

/// Errors during binding or invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The backend has no module by this name.
    ModuleNotFound { module: String, scope: ScopeId },
    /// The bound module does not handle this command.
    UnsupportedCommand { command: String, plugin: String },
    /// Both positional and keyword arguments were given.
    AmbiguousArguments,
    /// The command ran and reported failure with an empty response.
    CommandFailed { command: String },
    /// The request could not be delivered or answered.
    Transport(TransportError),
    /// Arguments could not be encoded, or the response could not be decoded.
    Codec(tagcodec::Error),
    /// The response was not valid wire text.
    Wire(tagpack::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ModuleNotFound { module, scope } => write!(
                f,
                "Unable to load module '{}' in {}; check the backend's plugin listing",
                module, scope
            ),
            Self::UnsupportedCommand { command, plugin } => {
                write!(f, "Module '{}' does not support command '{}'", plugin, command)
            }
            Self::AmbiguousArguments => {
                write!(f, "Cannot pass both positional and keyword arguments")
            }
            Self::CommandFailed { command } => write!(f, "Command '{}' failed", command),
            Self::Transport(e) => write!(f, "Transport failure: {}", e),
            Self::Codec(e) => write!(f, "Codec error: {}", e),
            Self::Wire(e) => write!(f, "Malformed response: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            Self::Codec(e) => Some(e),
            Self::Wire(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self { Self::Transport(e) }
}

impl From<tagcodec::Error> for Error {
    fn from(e: tagcodec::Error) -> Self { Self::Codec(e) }
}

impl From<tagpack::Error> for Error {
    fn from(e: tagpack::Error) -> Self { Self::Wire(e) }
}

pub type Result<T> = std::result::Result<T, Error>;

/// The arguments of one command: none, positional, or keyword.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Args {
    #[default]
    Empty,
    Positional(Vec<Value>),
    Named(Vec<(String, Value)>),
}

impl Args {
    /// Picks whichever side is populated. Fails if both are.
    pub fn from_parts(positional: Vec<Value>, named: Vec<(String, Value)>) -> Result<Self> {
        match (positional.is_empty(), named.is_empty()) {
            (true, true) => Ok(Args::Empty),
            (false, true) => Ok(Args::Positional(positional)),
            (true, false) => Ok(Args::Named(named)),
            (false, false) => Err(Error::AmbiguousArguments),
        }
    }

    /// No arguments encode as an empty mapping.
    fn into_value(self) -> Value {
        match self {
            Args::Empty => Value::Map(Vec::new()),
            Args::Positional(items) => Value::List(items),
            Args::Named(entries) => Value::Map(entries),
        }
    }
}

/// A command client bound to one backend module.
pub struct Proxy {
    module: Mutex<Box<dyn Module>>,
    plugin: String,
    scope: ScopeId,
    backend: Arc<dyn Backend>,
    registry: Arc<Registry>,
    separator: String,
}

impl Proxy {
    /// Binds to `module` in `scope` with the default registry and separator.
    pub fn bind(backend: Arc<dyn Backend>, scope: ScopeId, module: &str) -> Result<Self> {
        Self::builder(backend, module).scope(scope).bind()
    }

    pub fn builder(backend: Arc<dyn Backend>, module: impl Into<String>) -> ProxyBuilder {
        ProxyBuilder::new(backend, module)
    }

    /// The name the bound module reports for itself.
    pub fn plugin_name(&self) -> &str {
        &self.plugin
    }

    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// True if the bound module handles `command`.
    pub fn supports(&self, command: &str) -> bool {
        self.lock().supports_command(command)
    }

    /// Invokes `command` with positional or keyword arguments, not both.
    pub fn invoke(&self, command: &str, positional: Vec<Value>, named: Vec<(String, Value)>) -> Result<Value> {
        self.ensure_supported(command)?;
        let args = Args::from_parts(positional, named)?;
        self.dispatch(command, args)
    }

    /// Invokes `command` with prebuilt arguments.
    pub fn call(&self, command: &str, args: Args) -> Result<Value> {
        self.ensure_supported(command)?;
        self.dispatch(command, args)
    }

    fn ensure_supported(&self, command: &str) -> Result<()> {
        if self.supports(command) {
            return Ok(());
        }
        Err(Error::UnsupportedCommand {
            command: command.to_string(),
            plugin: self.plugin.clone(),
        })
    }

    fn dispatch(&self, command: &str, args: Args) -> Result<Value> {
        let span = debug_span!("invoke", command, plugin = %self.plugin);
        let _enter = span.enter();

        let payload = tagpack::to_text(&self.registry.encode(&args.into_value())?);
        let request = format!("{}{}{}", command, self.separator, payload);
        trace!(request = %request, "sending");

        let response = self.lock().send_command(&request)?;
        if response.trim().is_empty() {
            warn!("command reported failure");
            return Err(Error::CommandFailed { command: command.to_string() });
        }
        trace!(response = %response.trim_end(), "received");

        let node = tagpack::from_text(&response)?;
        Ok(self.registry.decode(&node, &self.backend)?)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Box<dyn Module>> {
        self.module.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Proxy {
    fn drop(&mut self) {
        debug!(plugin = %self.plugin, scope = %self.scope, "releasing module");
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("plugin", &self.plugin)
            .field("scope", &self.scope)
            .field("separator", &self.separator)
            .finish_non_exhaustive()
    }
}

/// Fluent configuration for a `Proxy`.
pub struct ProxyBuilder {
    backend: Arc<dyn Backend>,
    module: String,
    scope: ScopeId,
    registry: Option<Arc<Registry>>,
    separator: String,
}

impl ProxyBuilder {
    pub fn new(backend: Arc<dyn Backend>, module: impl Into<String>) -> Self {
        Self {
            backend,
            module: module.into(),
            scope: ScopeId(0),
            registry: None,
            separator: DEFAULT_SEPARATOR.to_string(),
        }
    }

    pub fn scope(mut self, scope: ScopeId) -> Self {
        self.scope = scope;
        self
    }

    /// Uses a shared registry instead of a fresh one with the built-ins.
    pub fn registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Loads the module. Fails with `ModuleNotFound` if the backend has none by that name.
    pub fn bind(self) -> Result<Proxy> {
        let module = self
            .backend
            .create_module(self.scope, &self.module)
            .ok_or_else(|| Error::ModuleNotFound {
                module: self.module.clone(),
                scope: self.scope,
            })?;
        let plugin = module.plugin_name().to_string();
        debug!(module = %self.module, plugin = %plugin, scope = %self.scope, "bound module");

        Ok(Proxy {
            module: Mutex::new(module),
            plugin,
            scope: self.scope,
            backend: self.backend,
            registry: self.registry.unwrap_or_else(|| Arc::new(Registry::with_builtins())),
            separator: self.separator,
        })
    }
}
