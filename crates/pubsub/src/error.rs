//! Error types for PubSub node management.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failures raised by an [`IqTransport`](crate::IqTransport) while moving a
/// request to the server or waiting for its response.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The session dropped before a response arrived.
    #[error("XMPP session disconnected before a response arrived")]
    Disconnected,

    /// No correlated response within the configured window.
    #[error("no response after {0:?}")]
    Timeout(Duration),

    /// Outbound stanza could not be serialized.
    #[error("failed to serialize stanza: {0}")]
    Serialize(String),

    /// Inbound bytes were not a usable stanza.
    #[error("failed to parse stanza: {0}")]
    Parse(String),

    /// The outbound wire channel is closed.
    #[error("outbound wire channel closed")]
    WireClosed,
}

/// Outcome of a failed PubSub node operation.
#[derive(Debug, Error)]
pub enum PubSubError {
    /// `create` was called on a node that is already resolved.
    #[error("pubsub node {node} already exists")]
    AlreadyExists { node: String },

    /// An operation needing an existing node was called while unresolved.
    #[error("pubsub node {node} doesn't exist")]
    NotFound { node: String },

    /// The service answered with an IQ of type `error`.
    #[error("pubsub node {node}: server returned {condition}{}", text_suffix(.text))]
    Protocol {
        node: String,
        condition: String,
        text: Option<String>,
    },

    /// The service answered with something other than a result or an error.
    #[error("pubsub node {node}: unexpected response: {detail}")]
    UnexpectedResponse { node: String, detail: String },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl PubSubError {
    /// True when the failure came from the server rather than the session.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            PubSubError::Protocol { .. } | PubSubError::UnexpectedResponse { .. }
        )
    }

    /// Defined condition reported by the server, if any.
    pub fn condition(&self) -> Option<&str> {
        match self {
            PubSubError::Protocol { condition, .. } => Some(condition),
            _ => None,
        }
    }
}

fn text_suffix(text: &Option<String>) -> String {
    text.as_deref()
        .map(|t| format!(" ({t})"))
        .unwrap_or_default()
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found at {path}")]
    FileNotFound { path: PathBuf },

    #[error("invalid TOML at line {line}, column {column}: {message}")]
    InvalidToml {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("missing required fields: {fields:?}")]
    MissingRequiredFields { fields: Vec<String> },

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("I/O error reading configuration: {0}")]
    Io(#[from] std::io::Error),
}
