// ABOUTME: Error types for Gleaner: ErrorCode, the ScrapeError struct, and RuleError for invalid rule sets.
// ABOUTME: Provides categorized errors with convenience constructors and boolean helpers.

use std::fmt;

/// Error codes representing different categories of scrape failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidUrl,
    Fetch,
    Timeout,
    Ssrf,
    Config,
    Io,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::InvalidUrl => "invalid URL",
            ErrorCode::Fetch => "fetch error",
            ErrorCode::Timeout => "timeout",
            ErrorCode::Ssrf => "SSRF blocked",
            ErrorCode::Config => "configuration error",
            ErrorCode::Io => "I/O error",
        };
        write!(f, "{}", s)
    }
}

/// The main error type for fetch and extract operations.
#[derive(Debug, thiserror::Error)]
pub struct ScrapeError {
    pub code: ErrorCode,
    pub url: String,
    pub op: String,
    #[source]
    pub source: Option<anyhow::Error>,
}

impl fmt::Display for ScrapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gleaner: {} {}: {}", self.op, self.url, self.code)?;
        if let Some(ref src) = self.source {
            write!(f, ": {}", src)?;
        }
        Ok(())
    }
}

impl ScrapeError {
    fn with_code(
        code: ErrorCode,
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self {
            code,
            url: url.into(),
            op: op.into(),
            source,
        }
    }

    /// Create an InvalidUrl error.
    pub fn invalid_url(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::with_code(ErrorCode::InvalidUrl, url, op, source)
    }

    /// Create a Fetch error.
    pub fn fetch(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::with_code(ErrorCode::Fetch, url, op, source)
    }

    /// Create a Timeout error.
    pub fn timeout(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::with_code(ErrorCode::Timeout, url, op, source)
    }

    /// Create an SSRF error.
    pub fn ssrf(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::with_code(ErrorCode::Ssrf, url, op, source)
    }

    /// Create a Config error. `location` is the config file path or URL the rules belong to.
    pub fn config(location: impl Into<String>, op: impl Into<String>, source: RuleError) -> Self {
        Self::with_code(ErrorCode::Config, location, op, Some(source.into()))
    }

    /// Create an Io error.
    pub fn io(path: impl Into<String>, op: impl Into<String>, source: std::io::Error) -> Self {
        Self::with_code(ErrorCode::Io, path, op, Some(source.into()))
    }

    /// Returns true if this is an InvalidUrl error.
    pub fn is_invalid_url(&self) -> bool {
        self.code == ErrorCode::InvalidUrl
    }

    /// Returns true if this is a Fetch error.
    pub fn is_fetch(&self) -> bool {
        self.code == ErrorCode::Fetch
    }

    /// Returns true if this is a Timeout error.
    pub fn is_timeout(&self) -> bool {
        self.code == ErrorCode::Timeout
    }

    /// Returns true if this is an SSRF error.
    pub fn is_ssrf(&self) -> bool {
        self.code == ErrorCode::Ssrf
    }

    /// Returns true if this is a Config error.
    pub fn is_config(&self) -> bool {
        self.code == ErrorCode::Config
    }

    /// Returns true if the error came from the transport layer rather than from configuration or local I/O.
    pub fn is_transport(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::InvalidUrl | ErrorCode::Fetch | ErrorCode::Timeout | ErrorCode::Ssrf
        )
    }
}

/// A structurally invalid rule set. Raised before any document is touched.
///
/// `field` is the dotted path of the offending rule, e.g. `items.price`.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("rule `{field}`: missing `kind`")]
    MissingKind { field: String },

    #[error("rule `{field}`: unknown kind `{kind}` (expected text, attribute or list)")]
    UnknownKind { field: String, kind: String },

    #[error("rule `{field}`: selector is empty")]
    EmptySelector { field: String },

    #[error("rule `{field}`: selector `{selector}` is not valid CSS")]
    InvalidSelector { field: String, selector: String },

    #[error("rule `{field}`: attribute rules require `attributeName`")]
    MissingAttributeName { field: String },

    #[error("rule `{field}`: list rules require `childRules`")]
    MissingChildRules { field: String },

    #[error("rule `{field}` is defined more than once")]
    DuplicateField { field: String },

    #[error("malformed rule definition: {0}")]
    Json(#[from] serde_json::Error),
}

impl RuleError {
    /// The dotted field path this error refers to, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            RuleError::MissingKind { field }
            | RuleError::UnknownKind { field, .. }
            | RuleError::EmptySelector { field }
            | RuleError::InvalidSelector { field, .. }
            | RuleError::MissingAttributeName { field }
            | RuleError::MissingChildRules { field }
            | RuleError::DuplicateField { field } => Some(field),
            RuleError::Json(_) => None,
        }
    }
}
