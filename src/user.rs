//! Named users with per-command permissions.

use std::collections::HashSet;
use subtle::ConstantTimeEq;

/// Credentials plus the set of commands the user may run.
///
/// An empty permission set means every command is allowed. Permissions are
/// matched case-insensitively against the lowercased command name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct User {
    pub name: String,
    pub password: String,
    pub permissions: HashSet<String>,
}

impl User {
    pub fn new(name: impl Into<String>, password: impl Into<String>) -> User {
        User {
            name: name.into(),
            password: password.into(),
            permissions: HashSet::new(),
        }
    }

    /// Restrict this user to the given commands.
    pub fn with_permissions<I, S>(mut self, permissions: I) -> User
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions = permissions.into_iter().map(Into::into).collect();
        self
    }

    /// Whether this user may run `command`.
    pub fn can(&self, command: &str) -> bool {
        self.permissions.is_empty()
            || self.permissions.iter().any(|p| p.eq_ignore_ascii_case(command))
    }

    /// Constant-time password comparison.
    pub(crate) fn password_matches(&self, candidate: &str) -> bool {
        self.password.as_bytes().ct_eq(candidate.as_bytes()).into()
    }
}
