use std::{error::Error as StdError, fmt, io};

/// Boxed cause carried by decode failures.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Crate-wide `Result` type using [`DumpError`] as the error.
pub type Result<T> = std::result::Result<T, DumpError>;

/// Top-level error type for esdump operations.
#[derive(Debug)]
pub enum DumpError {
    /// Query descriptor is incomplete or inconsistent. Raised before any network call.
    Validation(ValidationError),

    /// None of the configured cluster addresses answered the connectivity check.
    Connect {
        address: String,
        source: BoxError,
    },

    /// Transport-level failure while sending a request or reading its response.
    Request(reqwest::Error),

    /// The cluster answered with a non-success status.
    Response {
        status: u16,
        body: serde_json::Value,
    },

    /// A response body (or a value inside it) could not be decoded.
    Decode {
        context: String,
        source: Option<BoxError>,
    },

    /// A request body could not be encoded.
    Encode(serde_json::Error),

    /// Overflow narrowing could not move past a timestamp shared by a whole page.
    WindowStalled { timestamp: String },

    /// Configuration errors.
    Config(ConfigError),

    /// I/O errors.
    Io(io::Error),

    /// Sink failure that is not an I/O error.
    Sink(String),

    /// A pipeline task panicked or was aborted.
    Task(String),
}

/// Query descriptor validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A mandatory field was never set.
    MissingField(&'static str),

    /// `start` is not strictly before `end`.
    EmptyRange { start: String, end: String },

    /// A field holds an unusable value.
    InvalidValue { field: &'static str, reason: String },
}

/// Configuration-specific errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file could not be read.
    Unreadable { path: String, source: io::Error },

    /// Invalid config format.
    InvalidFormat(String),

    /// Missing required field.
    MissingField(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },
}

impl DumpError {
    /// Build a decode error with a cause.
    pub fn decode<E>(context: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        DumpError::Decode {
            context: context.into(),
            source: Some(source.into()),
        }
    }

    /// Build a decode error without an underlying cause.
    pub fn decode_msg(context: impl Into<String>) -> Self {
        DumpError::Decode {
            context: context.into(),
            source: None,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, DumpError::Validation(_))
    }

    /// Status code of a cluster response error, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            DumpError::Response { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for DumpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DumpError::Validation(e) => write!(f, "Invalid query: {e}"),
            DumpError::Connect { address, source } => {
                write!(f, "Cannot connect to {address}: {source}")
            }
            DumpError::Request(e) => write!(f, "Request failed: {e}"),
            DumpError::Response { status, body } => {
                write!(f, "Cluster returned status {status}: {body}")
            }
            DumpError::Decode { context, source } => match source {
                Some(source) => write!(f, "Decode error ({context}): {source}"),
                None => write!(f, "Decode error: {context}"),
            },
            DumpError::Encode(e) => write!(f, "Encode error: {e}"),
            DumpError::WindowStalled { timestamp } => write!(
                f,
                "Window stalled: a full page shares timestamp {timestamp}, cannot narrow further"
            ),
            DumpError::Config(e) => write!(f, "Configuration error: {e}"),
            DumpError::Io(e) => write!(f, "I/O error: {e}"),
            DumpError::Sink(msg) => write!(f, "Sink error: {msg}"),
            DumpError::Task(msg) => write!(f, "Task error: {msg}"),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::MissingField(field) => {
                write!(f, "missing required field `{field}`")
            }
            ValidationError::EmptyRange { start, end } => {
                write!(f, "start time {start} must be before end time {end}")
            }
            ValidationError::InvalidValue { field, reason } => {
                write!(f, "invalid value for `{field}`: {reason}")
            }
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Unreadable { path, source } => {
                write!(f, "Cannot read config file {path}: {source}")
            }
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::MissingField(field) => write!(f, "Missing required field: {field}"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
        }
    }
}

impl StdError for DumpError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            DumpError::Validation(e) => Some(e),
            DumpError::Connect { source, .. } => Some(source.as_ref() as &(dyn StdError + 'static)),
            DumpError::Request(e) => Some(e),
            DumpError::Decode { source, .. } => source
                .as_ref()
                .map(|s| s.as_ref() as &(dyn StdError + 'static)),
            DumpError::Encode(e) => Some(e),
            DumpError::Config(e) => Some(e),
            DumpError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl StdError for ValidationError {}

impl StdError for ConfigError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ConfigError::Unreadable { source, .. } => Some(source),
            _ => None,
        }
    }
}

/* ========================= Conversions to DumpError ========================= */

impl From<ValidationError> for DumpError {
    fn from(err: ValidationError) -> Self {
        DumpError::Validation(err)
    }
}

impl From<ConfigError> for DumpError {
    fn from(err: ConfigError) -> Self {
        DumpError::Config(err)
    }
}

impl From<io::Error> for DumpError {
    fn from(err: io::Error) -> Self {
        DumpError::Io(err)
    }
}

impl From<reqwest::Error> for DumpError {
    fn from(err: reqwest::Error) -> Self {
        DumpError::Request(err)
    }
}

impl From<tokio::task::JoinError> for DumpError {
    fn from(err: tokio::task::JoinError) -> Self {
        DumpError::Task(err.to_string())
    }
}
