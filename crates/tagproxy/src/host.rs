//! # Module-Side Command Table
//!
//! The other end of a `Proxy`: a `Module` whose commands take a parsed wire
//! node and answer with one.
//!
//! A request is split at its first whitespace. The text before it names the
//! command; the rest is the payload. Handlers return `None` to report
//! failure, which goes back as an empty response.

use std::collections::BTreeMap;
use std::fmt;

use tagpack::Node;
use tracing::debug;
use tracing::error;

use crate::transport::Module;
use crate::transport::Result;
use crate::transport::TransportError;

type Handler = Box<dyn Fn(&Node) -> Option<Node> + Send + Sync>;

struct Command {
    help: String,
    handler: Handler,
}

/// A module built from a table of node-to-node command handlers.
pub struct CommandModule {
    plugin: String,
    commands: BTreeMap<String, Command>,
}

impl CommandModule {
    pub fn new(plugin: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            commands: BTreeMap::new(),
        }
    }

    /// Adds a command. A later registration under the same name replaces it.
    pub fn register<F>(mut self, name: impl Into<String>, help: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Node) -> Option<Node> + Send + Sync + 'static,
    {
        let name = name.into();
        let command = Command { help: help.into(), handler: Box::new(handler) };
        if self.commands.insert(name.clone(), command).is_some() {
            debug!(plugin = %self.plugin, command = %name, "command replaced");
        }
        self
    }

    /// Help text of a command.
    pub fn help(&self, name: &str) -> Option<&str> {
        self.commands.get(name).map(|c| c.help.as_str())
    }

    /// Command names in sorted order.
    pub fn commands(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    fn run(&self, name: &str, payload: &str) -> Result<String> {
        let command = self
            .commands
            .get(name)
            .ok_or_else(|| TransportError::UnknownCommand(name.to_string()))?;

        let input = match tagpack::from_text(payload) {
            Ok(node) => node,
            Err(e) => {
                error!(plugin = %self.plugin, command = %name, error = %e, "malformed command input");
                return Ok(String::new());
            }
        };

        match (command.handler)(&input) {
            Some(output) => Ok(format!("{}\n", tagpack::to_text(&output))),
            None => {
                debug!(plugin = %self.plugin, command = %name, "handler reported failure");
                Ok(String::new())
            }
        }
    }
}

impl Module for CommandModule {
    fn send_command(&mut self, request: &str) -> Result<String> {
        let request = request.trim_start();
        let (name, payload) = request.split_once(char::is_whitespace).unwrap_or((request, ""));
        self.run(name, payload)
    }

    fn supports_command(&self, command: &str) -> bool {
        self.commands.contains_key(command)
    }

    fn plugin_name(&self) -> &str {
        &self.plugin
    }
}

impl fmt::Debug for CommandModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandModule")
            .field("plugin", &self.plugin)
            .field("commands", &self.commands.keys().collect::<Vec<_>>())
            .finish()
    }
}
