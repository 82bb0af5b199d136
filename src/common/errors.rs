use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::panic::Location;
use std::path::Path;
use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T, E = SweepError> = std::result::Result<T, E>;

/// Broad classification of an error, inferred from the code range unless set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorType {
    Domain,
    Config,
    FileSystem,
    Network,
    System,
    Validation,
    Permission,
}

/// How loudly an error should be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

/// Numeric error codes, namespaced by range:
/// 1000-1999 domain, 2000-2999 config, 3000-3999 filesystem,
/// 4000-4999 network, 5000-5999 system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidGeneration = 1001,
    CleanupFailed = 1002,
    OptimizationFailed = 1003,
    InvalidOperation = 1004,
    SafetyViolation = 1005,
    ExternalToolUnavailable = 1006,

    InvalidConfig = 2001,
    MissingProfile = 2002,
    ValidationFailed = 2003,
    InvalidFormat = 2004,

    FileNotFound = 3001,
    PermissionDenied = 3002,
    DiskFull = 3003,
    Filesystem = 3004,

    ConnectionFailed = 4001,
    Timeout = 4002,

    ProcessFailed = 5001,
    OutOfMemory = 5002,
    Cancelled = 5003,
}

impl ErrorCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Type inferred from the numeric range.
    pub fn error_type(self) -> ErrorType {
        match self.as_u16() {
            1000..=1999 => ErrorType::Domain,
            2000..=2999 => ErrorType::Config,
            3000..=3999 => ErrorType::FileSystem,
            4000..=4999 => ErrorType::Network,
            _ => ErrorType::System,
        }
    }

    pub fn default_severity(self) -> Severity {
        match self {
            ErrorCode::FileNotFound | ErrorCode::Cancelled => Severity::Warning,
            ErrorCode::InvalidConfig => Severity::Info,
            ErrorCode::DiskFull | ErrorCode::OutOfMemory | ErrorCode::SafetyViolation => {
                Severity::Critical
            }
            _ => match self.as_u16() {
                4000..=4999 => Severity::Warning,
                _ => Severity::Error,
            },
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "E{}", self.as_u16())
    }
}

/// Structured error record carried by every fallible library operation.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct SweepError {
    code: ErrorCode,
    error_type: Option<ErrorType>,
    severity: Option<Severity>,
    message: String,
    details: BTreeMap<String, String>,
    #[source]
    cause: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    caller: Option<&'static Location<'static>>,
    timestamp: DateTime<Utc>,
}

impl SweepError {
    #[track_caller]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            error_type: None,
            severity: None,
            message: message.into(),
            details: BTreeMap::new(),
            cause: None,
            caller: Some(Location::caller()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_details(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn with_type(mut self, error_type: ErrorType) -> Self {
        self.error_type = Some(error_type);
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn error_type(&self) -> ErrorType {
        self.error_type.unwrap_or_else(|| self.code.error_type())
    }

    pub fn severity(&self) -> Severity {
        self.severity.unwrap_or_else(|| self.code.default_severity())
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> &BTreeMap<String, String> {
        &self.details
    }

    pub fn detail(&self, key: &str) -> Option<&str> {
        self.details.get(key).map(String::as_str)
    }

    /// Source location that constructed this error.
    pub fn caller(&self) -> Option<&'static Location<'static>> {
        self.caller
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// The wrapped cause, if any.
    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    pub fn is(&self, code: ErrorCode) -> bool {
        self.code == code
    }

    /// Warnings and below can be reported without aborting a run.
    pub fn is_recoverable(&self) -> bool {
        self.severity() <= Severity::Warning
    }

    // ─── Shorthands ──────────────────────────────────────────────────────────

    #[track_caller]
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidFormat, message).with_type(ErrorType::Validation)
    }

    #[track_caller]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message).with_type(ErrorType::Validation)
    }

    #[track_caller]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidConfig, message)
    }

    #[track_caller]
    pub fn tool_unavailable(tool: &str) -> Self {
        Self::new(
            ErrorCode::ExternalToolUnavailable,
            format!("{} is not available on this system", tool),
        )
        .with_severity(Severity::Warning)
        .with_details("tool", tool)
    }

    #[track_caller]
    pub fn timeout(command: &str, after: std::time::Duration) -> Self {
        Self::new(
            ErrorCode::Timeout,
            format!("`{}` timed out after {:?}", command, after),
        )
        .with_details("command", command)
    }

    #[track_caller]
    pub fn cancelled(what: &str) -> Self {
        Self::new(ErrorCode::Cancelled, format!("{} was cancelled", what))
    }

    /// Map an OS error on `path` onto the filesystem part of the taxonomy.
    #[track_caller]
    pub fn from_io(path: &Path, err: std::io::Error) -> Self {
        let shown = path.display().to_string();
        let mapped = match err.kind() {
            std::io::ErrorKind::NotFound => {
                Self::new(ErrorCode::FileNotFound, format!("no such file: {}", shown))
            }
            std::io::ErrorKind::PermissionDenied => Self::new(
                ErrorCode::PermissionDenied,
                format!("permission denied: {}", shown),
            )
            .with_type(ErrorType::Permission),
            _ if is_no_space(&err) => {
                Self::new(ErrorCode::DiskFull, format!("no space left writing {}", shown))
            }
            _ => Self::new(ErrorCode::Filesystem, format!("{}: {}", shown, err)),
        };
        mapped.with_details("path", shown).with_cause(err)
    }
}

#[cfg(unix)]
fn is_no_space(err: &std::io::Error) -> bool {
    err.raw_os_error() == Some(libc::ENOSPC)
}

#[cfg(not(unix))]
fn is_no_space(_err: &std::io::Error) -> bool {
    false
}

impl From<std::io::Error> for SweepError {
    #[track_caller]
    fn from(e: std::io::Error) -> Self {
        SweepError::from_io(Path::new("<unknown>"), e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_type_inferred_from_range() {
        assert_eq!(ErrorCode::SafetyViolation.error_type(), ErrorType::Domain);
        assert_eq!(ErrorCode::MissingProfile.error_type(), ErrorType::Config);
        assert_eq!(ErrorCode::DiskFull.error_type(), ErrorType::FileSystem);
        assert_eq!(ErrorCode::Timeout.error_type(), ErrorType::Network);
        assert_eq!(ErrorCode::ProcessFailed.error_type(), ErrorType::System);
    }

    #[test]
    fn test_explicit_type_wins() {
        let err = SweepError::new(ErrorCode::CleanupFailed, "x").with_type(ErrorType::Permission);
        assert_eq!(err.error_type(), ErrorType::Permission);
    }

    #[test]
    fn test_io_not_found_maps_to_warning() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = SweepError::from_io(Path::new("/tmp/x"), io);
        assert!(err.is(ErrorCode::FileNotFound));
        assert_eq!(err.severity(), Severity::Warning);
        assert_eq!(err.detail("path"), Some("/tmp/x"));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_io_permission_denied() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        let err = SweepError::from_io(Path::new("/root"), io);
        assert!(err.is(ErrorCode::PermissionDenied));
        assert_eq!(err.severity(), Severity::Error);
        assert_eq!(err.error_type(), ErrorType::Permission);
    }

    #[cfg(unix)]
    #[test]
    fn test_io_no_space() {
        let io = std::io::Error::from_raw_os_error(libc::ENOSPC);
        let err = SweepError::from_io(Path::new("/data"), io);
        assert!(err.is(ErrorCode::DiskFull));
        assert_eq!(err.severity(), Severity::Critical);
    }

    #[test]
    fn test_io_other_keeps_message() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "weird");
        let err = SweepError::from_io(Path::new("/a/b"), io);
        assert!(err.is(ErrorCode::Filesystem));
        assert!(err.message().contains("/a/b"));
        assert!(err.message().contains("weird"));
    }

    #[test]
    fn test_cause_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "root cause");
        let err = SweepError::new(ErrorCode::CleanupFailed, "outer").with_cause(io);
        let source = err.source().expect("source");
        assert_eq!(source.to_string(), "root cause");
        assert!(err.cause().is_some());
    }

    #[test]
    fn test_caller_is_recorded() {
        let err = SweepError::validation("bad");
        let caller = err.caller().expect("caller");
        assert!(caller.file().ends_with("errors.rs"));
    }
}
