//! Error types shared by the keychain, parser and store layers

use thiserror::Error;

/// Diagnostic the `security` tool prints when a lookup matches no item.
///
/// Only this exact phrase turns a failed invocation into an absent value;
/// any other non-zero exit stays a [`MellonError::Command`].
pub const ITEM_NOT_FOUND: &str = "The specified item could not be found in the keychain.";

/// Diagnostic the `security` tool prints when a keychain path is unknown
pub const KEYCHAIN_NOT_FOUND: &str = "The specified keychain could not be found.";

/// Errors that can occur while talking to the keychain
#[derive(Error, Debug)]
pub enum MellonError {
    /// The external tool exited non-zero
    #[error("[ERROR] {command}\n  {stderr}")]
    Command { command: String, stderr: String },

    /// The external tool could not be started at all
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// No keychain name matched a `find` query
    #[error("Could not find keychain “{name}” in {}", .available.join(", "))]
    KeychainNotFound { name: String, available: Vec<String> },

    /// A keychain was bound to a path the tool does not know about
    #[error("Keychain {path} does not exist")]
    MissingKeychain { path: String },

    /// The tool succeeded but printed something that could not be parsed
    #[error("unexpected output from {command}: {output:?}")]
    UnexpectedOutput { command: String, output: String },

    /// `Store::fetch` on an absent key with no fallback
    #[error("key not found: {0:?}")]
    KeyNotFound(String),

    /// A store serializer failed to dump or load
    #[error("{format} serialization error: {message}")]
    Serialization { format: String, message: String },

    #[error("unknown serializer: {0}")]
    UnknownSerializer(String),

    #[error("unknown entry type: {0}")]
    UnknownEntryType(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MellonError {
    /// Create a command error, substituting a placeholder for empty stderr
    pub fn command(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        let stderr = stderr.into();
        Self::Command {
            command: command.into(),
            stderr: if stderr.is_empty() {
                "<no output>".to_string()
            } else {
                stderr
            },
        }
    }

    /// Create a keychain-not-found error
    pub fn keychain_not_found(name: impl Into<String>, available: Vec<String>) -> Self {
        Self::KeychainNotFound {
            name: name.into(),
            available,
        }
    }

    /// Create a serialization error
    pub fn serialization(format: impl Into<String>, message: impl ToString) -> Self {
        Self::Serialization {
            format: format.into(),
            message: message.to_string(),
        }
    }

    /// Whether this is a command error carrying the tool's "item not found" diagnostic
    pub fn is_item_not_found(&self) -> bool {
        matches!(self, Self::Command { stderr, .. } if stderr.contains(ITEM_NOT_FOUND))
    }

    /// Whether this is a command error carrying the tool's "keychain not found" diagnostic
    pub fn is_keychain_not_found(&self) -> bool {
        matches!(self, Self::Command { stderr, .. } if stderr.contains(KEYCHAIN_NOT_FOUND))
    }
}

pub type MellonResult<T> = Result<T, MellonError>;

/// Map an item-not-found command error to `None`, propagating everything else
pub(crate) fn absent_if_missing<T>(result: MellonResult<T>) -> MellonResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_item_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}
