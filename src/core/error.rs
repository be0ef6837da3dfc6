//! Error handling for reposerve
//!
//! The error system is built around two ideas:
//! 1. **Strongly-typed errors** with a stable [`ErrorKind`] so callers (the RPC
//!    layer, the CLI, tests) can branch on the failure class without parsing text
//! 2. **User-friendly messages** with suggestions for CLI users
//!
//! # Error Kinds
//!
//! | Kind | Raised for |
//! |------|------------|
//! | [`ErrorKind::Internal`] | checkout/transport failures, tool crashes, I/O |
//! | [`ErrorKind::InvalidArgument`] | missing per-type options, bad paths, ambiguous sources |
//! | [`ErrorKind::FailedPrecondition`] | malformed manifest files, unloadable projects |
//! | [`ErrorKind::NotRegistered`] | plugin name absent from the registry |
//! | [`ErrorKind::NotFound`] | requested file does not exist in the checkout |
//! | [`ErrorKind::Cancelled`] | the request was cancelled while waiting or running |
//!
//! Cache failures never appear here: they are logged and absorbed by the
//! service layer.
//!
//! # Examples
//!
//! ```rust,no_run
//! use reposerve::core::{ErrorKind, RepoServerError};
//!
//! let err = RepoServerError::PluginNotRegistered { name: "demo".to_string() };
//! assert_eq!(err.kind(), ErrorKind::NotRegistered);
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// Boxed error used to carry an underlying cause.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Stable classification of a [`RepoServerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Checkout, transport or tool failure.
    Internal,
    /// The request is malformed or lacks a required option.
    InvalidArgument,
    /// The repository content cannot be processed as requested.
    FailedPrecondition,
    /// The requested config management plugin is not registered.
    NotRegistered,
    /// A requested file does not exist.
    NotFound,
    /// The request was cancelled.
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Internal => "Internal",
            Self::InvalidArgument => "InvalidArgument",
            Self::FailedPrecondition => "FailedPrecondition",
            Self::NotRegistered => "NotRegistered",
            Self::NotFound => "NotFound",
            Self::Cancelled => "Cancelled",
        };
        f.write_str(name)
    }
}

/// The main error type for manifest service operations.
///
/// Every variant maps to exactly one [`ErrorKind`] through [`RepoServerError::kind`].
/// Underlying causes are kept as `source` so the full chain is available with
/// `{:#}` formatting through `anyhow` or by walking [`std::error::Error::source`].
#[derive(Error, Debug)]
pub enum RepoServerError {
    /// Checking out a revision into the working directory failed.
    #[error("Failed to checkout {revision}")]
    CheckoutFailed {
        /// The revision that was requested
        revision: String,
        /// The underlying git failure
        #[source]
        source: BoxError,
    },

    /// An external tool exited with a non-zero status.
    #[error("`{command}` failed with exit code {}: {stderr}", exit_code(.status))]
    CommandFailed {
        /// The command line that was executed
        command: String,
        /// Exit status, if the process exited normally
        status: Option<i32>,
        /// Captured standard error
        stderr: String,
    },

    /// An external tool did not finish within its timeout.
    #[error("`{command}` timed out after {seconds} seconds")]
    CommandTimedOut {
        /// The command line that was executed
        command: String,
        /// Timeout that elapsed
        seconds: u64,
    },

    /// An external tool's executable does not exist.
    #[error("`{program}` was not found; install it or set its path under [tools] in the configuration")]
    ToolNotFound {
        /// The program that could not be started
        program: String,
    },

    /// The request is malformed.
    #[error("{message}")]
    InvalidArgument {
        /// Description of what is wrong with the request
        message: String,
    },

    /// Repository content could not be processed.
    #[error("{message}")]
    FailedPrecondition {
        /// Description of the problem, usually naming the offending file
        message: String,
    },

    /// Plugin lookup by name failed.
    #[error("Config management plugin with name '{name}' is not supported.")]
    PluginNotRegistered {
        /// The plugin name that was requested
        name: String,
    },

    /// A requested path does not exist.
    #[error("{path}: no such file or directory")]
    NotFound {
        /// The path relative to the repository root
        path: String,
    },

    /// The request was cancelled while waiting on a lock, a render slot,
    /// or an external process.
    #[error("Request cancelled while {operation}")]
    Cancelled {
        /// What the request was doing when it was cancelled
        operation: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Any other internal failure, carrying its own context chain.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

fn exit_code(status: &Option<i32>) -> String {
    status.map_or_else(|| "unknown".to_string(), |code| code.to_string())
}

impl RepoServerError {
    /// Stable classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::CheckoutFailed { .. }
            | Self::CommandFailed { .. }
            | Self::CommandTimedOut { .. }
            | Self::ToolNotFound { .. }
            | Self::IoError(_)
            | Self::Internal(_) => ErrorKind::Internal,
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::FailedPrecondition { .. } => ErrorKind::FailedPrecondition,
            Self::PluginNotRegistered { .. } => ErrorKind::NotRegistered,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// Shorthand for an [`RepoServerError::InvalidArgument`].
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Shorthand for a [`RepoServerError::FailedPrecondition`].
    pub fn failed_precondition(message: impl Into<String>) -> Self {
        Self::FailedPrecondition {
            message: message.into(),
        }
    }

    /// Shorthand for a [`RepoServerError::Cancelled`].
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Render the error together with every underlying cause.
    #[must_use]
    pub fn cause_chain(&self) -> String {
        let mut out = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            let text = cause.to_string();
            if !out.ends_with(&text) {
                out.push_str(": ");
                out.push_str(&text);
            }
            source = cause.source();
        }
        out
    }
}

/// Error wrapper that adds user-facing details and a suggestion.
///
/// Built by [`user_friendly_error`] for the CLI.
#[derive(Debug)]
pub struct ErrorContext {
    /// Classification, when the error came from the manifest service
    pub kind: Option<ErrorKind>,
    /// The error message with its cause chain
    pub message: String,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a context carrying only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            kind: None,
            message: message.into(),
            suggestion: None,
            details: None,
        }
    }

    /// Attach the error classification.
    #[must_use]
    pub const fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Add a suggestion for resolving the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add details explaining the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error to stderr with colored formatting.
    pub fn display(&self) {
        match self.kind {
            Some(kind) => eprintln!("{} [{}]: {}", "error".red().bold(), kind, self.message),
            None => eprintln!("{}: {}", "error".red().bold(), self.message),
        }

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into a user-friendly [`ErrorContext`].
///
/// Service errors get a suggestion matched to their kind; I/O and TOML errors
/// get generic advice; everything else is shown with its cause chain.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(err) = error.downcast_ref::<RepoServerError>() {
        return create_error_context(err);
    }

    if let Some(toml_error) = error.downcast_ref::<toml::de::Error>() {
        return ErrorContext::new(format!("{error:#}"))
            .with_suggestion("Check the TOML syntax of the configuration file")
            .with_details(toml_error.to_string());
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        if io_error.kind() == std::io::ErrorKind::PermissionDenied {
            return ErrorContext::new(format!("{error:#}"))
                .with_suggestion("Check file ownership and permissions of the working and cache directories");
        }
    }

    ErrorContext::new(format!("{error:#}"))
}

fn create_error_context(error: &RepoServerError) -> ErrorContext {
    let ctx = ErrorContext::new(error.cause_chain()).with_kind(error.kind());
    match error {
        RepoServerError::CheckoutFailed { .. } => ctx
            .with_suggestion("Verify the repository URL, credentials and that the revision exists")
            .with_details("The working directory could not be brought to the requested revision"),
        RepoServerError::CommandFailed { command, .. } if command.starts_with("helm") => {
            ctx.with_suggestion("Run the helm command manually in the chart directory to see the full output")
        }
        RepoServerError::CommandFailed { .. } | RepoServerError::CommandTimedOut { .. } => {
            ctx.with_suggestion("Check that the tool is installed and its path is configured correctly")
        }
        RepoServerError::ToolNotFound { .. } => {
            ctx.with_suggestion("Install the tool or point the [tools] table of the server configuration at it")
        }
        RepoServerError::PluginNotRegistered { .. } => ctx
            .with_suggestion("Add the plugin under [[plugins]] in the server configuration"),
        RepoServerError::FailedPrecondition { .. } => {
            ctx.with_suggestion("Fix the offending manifest file in the repository and try again")
        }
        RepoServerError::InvalidArgument { .. } => {
            ctx.with_suggestion("Check the application source options passed with the request")
        }
        _ => ctx,
    }
}
