use thiserror::Error;

/// Fatal errors for a single `parse_capture` call
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    /// The buffer cannot hold the 24-byte global header
    #[error("header too short: need 24 bytes, got {len}")]
    HeaderTooShort { len: usize },

    /// Neither byte order of the first 4 bytes is a known magic number
    #[error("invalid magic number: 0x{le:08x} (little-endian) / 0x{be:08x} (big-endian)")]
    InvalidMagic { le: u32, be: u32 },
}

/// Recoverable end-of-data condition while walking packet records.
///
/// Records already accepted before this point stay valid; the partial
/// record is dropped.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("truncated record #{index} at offset {offset}: need {needed} bytes, {available} available")]
pub struct TruncationWarning {
    /// Index the dropped record would have had
    pub index: usize,
    /// Offset of the dropped record header in the capture buffer
    pub offset: usize,
    /// Bytes required to complete the current part (record header or payload)
    pub needed: usize,
    /// Bytes left in the buffer for that part
    pub available: usize,
}

/// Failures of the signature scanning engine
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ScanError {
    /// The isolated execution unit could not be created
    #[error("scan engine unavailable: {0}")]
    EngineUnavailable(String),

    /// The engine (or its execution unit) was torn down
    #[error("scan engine terminated")]
    EngineTerminated,

    /// The execution unit answered this request with an error
    #[error("request {id} rejected: {reason}")]
    Rejected { id: u64, reason: String },

    /// The response could not be understood
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Errors raised while compiling rule sources inside the execution unit
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RuleError {
    #[error("syntax error at line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("rule {rule}: duplicate rule name")]
    DuplicateRule { rule: String },

    #[error("rule {rule}: undefined string identifier {ident}")]
    /// `ident` includes the leading `$`
    UndefinedString { rule: String, ident: String },

    /// A `them` quantifier that can never be false
    #[error("rule {rule}: invalid condition: {reason}")]
    InvalidCondition { rule: String, reason: String },

    #[error("rule {rule}: invalid pattern {ident}: {reason}")]
    InvalidPattern {
        rule: String,
        ident: String,
        reason: String,
    },
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
}
