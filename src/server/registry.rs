//! Command registration and dispatch types.

use super::connection::Connection;
use crate::value::Value;
use std::collections::HashMap;
use std::io;
use thiserror::Error;

/// Failure reason returned by a command handler.
///
/// The server loop discards any partial reply the handler buffered and
/// frames the message as `-ERR <msg>`.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("not enough arguments")]
    NotEnoughArguments,

    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<String> for CommandError {
    fn from(msg: String) -> CommandError {
        CommandError::Message(msg)
    }
}

impl From<&str> for CommandError {
    fn from(msg: &str) -> CommandError {
        CommandError::Message(msg.to_string())
    }
}

pub type CommandResult = Result<(), CommandError>;

/// Argument-count contract of a bound command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly this many arguments after the command name.
    Exact(usize),
    /// Any argument count; the handler validates for itself.
    Variadic,
}

/// A handler that manages its own state and synchronization.
pub type DirectHandler = Box<dyn Fn(&mut Connection, &[Value]) -> CommandResult + Send + Sync>;

/// A handler invoked with the shared context, serialized by the server's
/// context mutex.
pub type BoundHandler<C> =
    Box<dyn Fn(&mut Connection, &[Value], &mut C) -> CommandResult + Send + Sync>;

pub(crate) enum CommandEntry<C> {
    Direct(DirectHandler),
    Bound { arity: Arity, handler: BoundHandler<C> },
}

/// Mapping from lowercased command name to handler.
///
/// The registry is configured before the server runs and read-only
/// afterwards; lookups take no locks.
pub struct CommandRegistry<C> {
    commands: HashMap<String, CommandEntry<C>>,
}

impl<C> CommandRegistry<C> {
    pub fn new() -> CommandRegistry<C> {
        CommandRegistry { commands: HashMap::new() }
    }

    /// Register a context-bound command.
    pub fn register<F>(&mut self, name: impl Into<String>, arity: Arity, handler: F)
    where
        F: Fn(&mut Connection, &[Value], &mut C) -> CommandResult + Send + Sync + 'static,
    {
        self.commands.insert(
            name.into().to_lowercase(),
            CommandEntry::Bound { arity, handler: Box::new(handler) },
        );
    }

    /// Register a self-contained command.
    pub fn register_direct<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(&mut Connection, &[Value]) -> CommandResult + Send + Sync + 'static,
    {
        self.commands
            .insert(name.into().to_lowercase(), CommandEntry::Direct(Box::new(handler)));
    }

    pub(crate) fn get(&self, name: &str) -> Option<&CommandEntry<C>> {
        self.commands.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// Registered names, in no particular order.
    pub fn names(&self) -> Vec<String> {
        self.commands.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl<C> Default for CommandRegistry<C> {
    fn default() -> CommandRegistry<C> {
        CommandRegistry::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_lowercased_on_registration() {
        let mut registry: CommandRegistry<()> = CommandRegistry::new();
        registry.register("GeT", Arity::Exact(1), |_, _, _| Ok(()));
        registry.register_direct("TIME", |_, _| Ok(()));

        assert!(registry.contains("get"));
        assert!(registry.contains("time"));
        assert!(!registry.contains("GeT"));
        assert_eq!(registry.len(), 2);

        let mut names = registry.names();
        names.sort();
        assert_eq!(names, ["get", "time"]);
    }

    #[test]
    fn command_error_from_strings() {
        let e: CommandError = "disk full".into();
        assert_eq!(e.to_string(), "disk full");
        let e: CommandError = String::from("boom").into();
        assert_eq!(e.to_string(), "boom");
        assert_eq!(CommandError::NotEnoughArguments.to_string(), "not enough arguments");
    }
}
