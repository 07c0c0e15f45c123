//! Error types for the interception hub core.

/// Result type alias for hub-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error taxonomy, following the failure domains in the error
/// handling design: transport and protocol errors never reach here
/// (they are resolved to an original-sentinel reply at the ingress
/// boundary); what remains are the failures a caller can act on.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No project registration could be resolved for a flow under the
    /// strict-filter rule.
    #[error("routing error: {message}")]
    Routing { message: String },

    /// A mock rule or collection could not be stored or referenced.
    #[error("rule store error: {message}")]
    RuleStore { message: String },

    /// A regular expression supplied by a rule failed to compile.
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    /// Malformed URL on a flow's request.
    #[error("url parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// JSON encode/decode error on the wire protocol or persisted rules.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic configuration problem reported at startup.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl Error {
    /// Construct a [`Error::Routing`] error.
    pub fn routing<S: Into<String>>(message: S) -> Self {
        Self::Routing {
            message: message.into(),
        }
    }

    /// Construct a [`Error::RuleStore`] error.
    pub fn rule_store<S: Into<String>>(message: S) -> Self {
        Self::RuleStore {
            message: message.into(),
        }
    }

    /// Construct a [`Error::Config`] error.
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
