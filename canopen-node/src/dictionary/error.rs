use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to access file")]
    IO(#[from] std::io::Error),
    #[error("EDS syntax error: {0}")]
    SyntaxError(String),
}

impl<'a> From<&'a str> for LoadError {
    fn from(value: &'a str) -> Self {
        Self::SyntaxError(value.to_string())
    }
}

impl From<String> for LoadError {
    fn from(value: String) -> Self {
        Self::SyntaxError(value)
    }
}

/// Errors from the typed Object Dictionary access layer (`get`/`read`/`write` and friends).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OdError {
    #[error("no object at index {index:#06X} subindex {sub_index:?}")]
    NotFound { index: u16, sub_index: Option<u8> },
    #[error("value out of range for {index:#06X}:{sub_index:02X}")]
    OutOfRange { index: u16, sub_index: u8 },
    #[error("type mismatch writing {index:#06X}:{sub_index:02X}")]
    TypeMismatch { index: u16, sub_index: u8 },
    #[error("unknown bit field {field:?} on {index:#06X}:{sub_index:02X}")]
    UnknownBitField { index: u16, sub_index: u8, field: String },
    #[error("value {value} is not a known display string for {index:#06X}:{sub_index:02X}")]
    EnumOutOfRange { index: u16, sub_index: u8, value: i64 },
    #[error("display string {display:?} is not a known value for {index:#06X}:{sub_index:02X}")]
    EnumUnknown { index: u16, sub_index: u8, display: String },
}
