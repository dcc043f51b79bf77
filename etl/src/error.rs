//! Error types and result definitions for indexing operations.
//!
//! Provides an error system with classification and captured diagnostic metadata. Every
//! [`EtlError`] carries a kind, a static description, an optional detail and the callsite
//! it was raised at.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Convenient result type for indexing operations using [`EtlError`] as the error type.
pub type EtlResult<T> = Result<T, EtlError>;

/// Detailed payload stored for every [`EtlError`].
#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type for indexing operations.
#[derive(Debug, Clone)]
pub struct EtlError {
    payload: Box<ErrorPayload>,
}

/// Specific categories of errors that can occur while indexing.
///
/// The kind decides whether the backoff retries the failed call, see
/// [`ErrorKind::is_transient`].
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Connection Errors
    SourceConnectionFailed,
    DestinationConnectionFailed,
    StateStoreConnectionFailed,

    // Query & Execution Errors
    SourceQueryFailed,
    DestinationQueryFailed,
    StateStoreOperationFailed,

    // Data & Transformation Errors
    ConversionError,
    InvalidData,
    ValidationError,

    // Configuration Errors
    ConfigError,

    // IO & Serialization Errors
    IoError,
    SerializationError,
    DeserializationError,

    // Security & Authentication Errors
    AuthenticationError,

    // State & Workflow Errors
    InvalidState,

    // Unknown / Uncategorized
    Unknown,

    // Error kinds raised by fail points to drive the retry behavior in tests.
    #[cfg(feature = "failpoints")]
    WithTransientFailure,
    #[cfg(feature = "failpoints")]
    WithPermanentFailure,
}

impl ErrorKind {
    /// Returns `true` if a call failing with this kind may succeed when retried.
    ///
    /// Shape and logic errors are permanent: retrying them can only reproduce the failure.
    pub fn is_transient(&self) -> bool {
        match self {
            ErrorKind::SourceConnectionFailed
            | ErrorKind::DestinationConnectionFailed
            | ErrorKind::StateStoreConnectionFailed
            | ErrorKind::SourceQueryFailed
            | ErrorKind::DestinationQueryFailed
            | ErrorKind::StateStoreOperationFailed
            | ErrorKind::IoError
            | ErrorKind::AuthenticationError
            | ErrorKind::Unknown => true,
            ErrorKind::ConversionError
            | ErrorKind::InvalidData
            | ErrorKind::ValidationError
            | ErrorKind::ConfigError
            | ErrorKind::SerializationError
            | ErrorKind::DeserializationError
            | ErrorKind::InvalidState => false,
            #[cfg(feature = "failpoints")]
            ErrorKind::WithTransientFailure => true,
            #[cfg(feature = "failpoints")]
            ErrorKind::WithPermanentFailure => false,
        }
    }
}

impl EtlError {
    /// Returns the [`ErrorKind`] of this error.
    pub fn kind(&self) -> ErrorKind {
        self.payload.kind
    }

    /// Returns `true` if the failed call may succeed when retried.
    pub fn is_transient(&self) -> bool {
        self.payload.kind.is_transient()
    }

    /// Returns the detailed error information if available.
    pub fn detail(&self) -> Option<&str> {
        self.payload.detail.as_deref()
    }

    /// Returns the captured backtrace for this error.
    pub fn backtrace(&self) -> &Backtrace {
        self.payload.backtrace.as_ref()
    }

    /// Returns the captured callsite location for this error.
    pub fn location(&self) -> &'static Location<'static> {
        self.payload.location
    }

    /// Attaches an originating [`error::Error`] to this error and returns the modified instance.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        self.payload.source = Some(Arc::new(source));
        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        EtlError {
            payload: Box::new(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }

    #[track_caller]
    fn from_source<E>(kind: ErrorKind, description: &'static str, err: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        let detail = err.to_string();
        EtlError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl PartialEq for EtlError {
    fn eq(&self, other: &EtlError) -> bool {
        self.payload.kind == other.payload.kind
    }
}

impl fmt::Display for EtlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        let payload = &self.payload;
        let location = payload.location;
        write!(
            f,
            "[{:?}] {} @ {}:{}:{}",
            payload.kind,
            payload.description,
            location.file(),
            location.line(),
            location.column()
        )?;

        write_detail(payload.detail.as_deref(), f, 1)?;
        write_backtrace(payload.backtrace.as_ref(), f, 1)?;

        Ok(())
    }
}

impl error::Error for EtlError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.payload
            .source
            .as_ref()
            .map(|source| source as &(dyn error::Error + 'static))
    }
}

fn write_backtrace(
    backtrace: &Backtrace,
    f: &mut fmt::Formatter<'_>,
    indent: usize,
) -> fmt::Result {
    let indent_str = "  ".repeat(indent);

    let rendered_backtrace = format!("{backtrace}");
    if !rendered_backtrace.trim().is_empty() {
        write!(f, "\n{indent_str}Backtrace:")?;
        for line in rendered_backtrace.lines() {
            if line.trim().is_empty() {
                write!(f, "\n{indent_str}  ")?;
            } else {
                write!(f, "\n{indent_str}  {line}")?;
            }
        }
    }

    Ok(())
}

fn write_detail(detail: Option<&str>, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
    let Some(detail) = detail else {
        return Ok(());
    };

    let indent_str = "  ".repeat(indent);
    if detail.trim().is_empty() {
        return write!(f, "\n{indent_str}Detail: <empty>");
    }

    write!(f, "\n{indent_str}Detail:")?;
    for line in detail.lines() {
        if line.trim().is_empty() {
            write!(f, "\n{indent_str}  ")?;
        } else {
            write!(f, "\n{indent_str}  {line}")?;
        }
    }

    Ok(())
}

/// Creates an [`EtlError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for EtlError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> EtlError {
        EtlError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

/// Creates an [`EtlError`] from an error kind, static description, and dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for EtlError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> EtlError {
        EtlError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

impl From<std::io::Error> for EtlError {
    #[track_caller]
    fn from(err: std::io::Error) -> EtlError {
        EtlError::from_source(ErrorKind::IoError, "I/O operation failed", err)
    }
}

/// Maps serialization failures to [`ErrorKind::SerializationError`] and malformed input to
/// [`ErrorKind::DeserializationError`].
impl From<serde_json::Error> for EtlError {
    #[track_caller]
    fn from(err: serde_json::Error) -> EtlError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        EtlError::from_source(kind, description, err)
    }
}

impl From<uuid::Error> for EtlError {
    #[track_caller]
    fn from(err: uuid::Error) -> EtlError {
        EtlError::from_source(ErrorKind::InvalidData, "UUID parsing failed", err)
    }
}

impl From<chrono::ParseError> for EtlError {
    #[track_caller]
    fn from(err: chrono::ParseError) -> EtlError {
        EtlError::from_source(ErrorKind::ConversionError, "Datetime parsing failed", err)
    }
}

/// Converts [`sqlx::Error`] to [`EtlError`].
///
/// Pool and I/O failures map to [`ErrorKind::SourceConnectionFailed`], row decoding failures
/// to [`ErrorKind::ConversionError`] and everything else to [`ErrorKind::SourceQueryFailed`].
impl From<sqlx::Error> for EtlError {
    #[track_caller]
    fn from(err: sqlx::Error) -> EtlError {
        let (kind, description) = match &err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolClosed
            | sqlx::Error::PoolTimedOut => (
                ErrorKind::SourceConnectionFailed,
                "Source database connection failed",
            ),
            sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::Decode(_)
            | sqlx::Error::TypeNotFound { .. } => (
                ErrorKind::ConversionError,
                "Source row could not be decoded",
            ),
            sqlx::Error::Configuration(_) => {
                (ErrorKind::ConfigError, "Source database misconfigured")
            }
            _ => (ErrorKind::SourceQueryFailed, "Source database query failed"),
        };

        EtlError::from_source(kind, description, err)
    }
}

/// Converts [`reqwest::Error`] to [`EtlError`].
///
/// Connection and timeout failures map to [`ErrorKind::DestinationConnectionFailed`], body
/// decoding failures to [`ErrorKind::DeserializationError`].
impl From<reqwest::Error> for EtlError {
    #[track_caller]
    fn from(err: reqwest::Error) -> EtlError {
        let (kind, description) = if err.is_connect() || err.is_timeout() {
            (
                ErrorKind::DestinationConnectionFailed,
                "Search index connection failed",
            )
        } else if err.is_decode() {
            (
                ErrorKind::DeserializationError,
                "Search index response could not be decoded",
            )
        } else if err.is_builder() {
            (ErrorKind::ConfigError, "Search index request is invalid")
        } else {
            (ErrorKind::DestinationQueryFailed, "Search index request failed")
        };

        EtlError::from_source(kind, description, err)
    }
}

/// Converts [`fred::error::Error`] to [`EtlError`].
impl From<fred::error::Error> for EtlError {
    #[track_caller]
    fn from(err: fred::error::Error) -> EtlError {
        use fred::error::ErrorKind as RedisErrorKind;

        let (kind, description) = match err.kind() {
            RedisErrorKind::IO | RedisErrorKind::Timeout | RedisErrorKind::Canceled => (
                ErrorKind::StateStoreConnectionFailed,
                "State store connection failed",
            ),
            RedisErrorKind::Auth => (
                ErrorKind::AuthenticationError,
                "State store authentication failed",
            ),
            RedisErrorKind::Config | RedisErrorKind::Url => {
                (ErrorKind::ConfigError, "State store misconfigured")
            }
            RedisErrorKind::Parse => (
                ErrorKind::DeserializationError,
                "State store value could not be parsed",
            ),
            _ => (
                ErrorKind::StateStoreOperationFailed,
                "State store operation failed",
            ),
        };

        EtlError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(err.to_string())),
            None,
        )
    }
}
