/// Result alias for `convoy`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the community engine, its configuration and the graph store.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// A structural per-agent value with no sensible default was absent.
    #[error("agent '{agent}' is missing required field '{field}'")]
    MissingField {
        /// Agent name.
        agent: String,
        /// Field that was required.
        field: &'static str,
    },

    /// A configuration key required by the selected mode was not provided.
    #[error("missing configuration key '{key}'")]
    MissingConfig {
        /// Configuration key.
        key: &'static str,
    },

    /// Invalid parameter value.
    #[error("invalid parameter '{name}': {message}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Error message.
        message: String,
    },

    /// The flat parameter map could not be decoded.
    #[error("configuration error: {0}")]
    Config(String),

    /// No agent with this name exists in the graph.
    #[error("unknown agent '{0}'")]
    UnknownAgent(String),

    /// An agent with this name already exists in the graph.
    #[error("agent '{0}' already exists")]
    DuplicateAgent(String),

    /// `add` was used on an attribute that already holds a value.
    #[error("attribute '{0}' already exists")]
    AttributeExists(String),

    /// The single-originator invariant does not hold.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(err.to_string())
    }
}
