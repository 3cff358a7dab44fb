//! Error taxonomy and the wire error shape.
//!
//! Extraction failures (400), request validation failures (422) and
//! response validation failures (500) are all serialized as
//! `{ "error": "<message>", "details": [{ "field", "message", "tag" }] }`.
//! Handler errors keep their status and are never reinterpreted.

use std::fmt;

use serde::Serialize;

use crate::plan::Source;

/// One field-level failure.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FieldError {
    /// Dotted path to the offending field.
    pub field: String,
    pub message: String,
    /// Failing rule name; absent for extraction failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            tag: None,
        }
    }

    pub fn with_tag(
        field: impl Into<String>,
        message: impl Into<String>,
        tag: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            tag: Some(tag.into()),
        }
    }
}

/// The JSON document written for any error response.
#[derive(Debug, Serialize)]
pub struct WireError {
    pub error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<FieldError>,
}

#[derive(Debug)]
pub enum Error {
    /// A single-field extraction or coercion failure. HTTP 400.
    Parse {
        field: String,
        source: Source,
        message: String,
    },
    /// Rule violations on the input record. HTTP 422.
    Validation(Vec<FieldError>),
    /// Rule violations on the handler's return value. HTTP 500. These mean
    /// the service contradicts its own declared contract.
    ResponseValidation(Vec<FieldError>),
    /// An error produced by the user handler; forwarded unchanged.
    Handler { status: u16, message: String },
}

impl Error {
    pub fn parse(
        field: impl Into<String>,
        source: Source,
        message: impl Into<String>,
    ) -> Self {
        Self::Parse {
            field: field.into(),
            source,
            message: message.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::Handler {
            status: 400,
            message: msg.into(),
        }
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Handler {
            status: 401,
            message: msg.into(),
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::Handler {
            status: 404,
            message: msg.into(),
        }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Handler {
            status: 409,
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Handler {
            status: 500,
            message: msg.into(),
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            Error::Parse { .. } => 400,
            Error::Validation(_) => 422,
            Error::ResponseValidation(_) => 500,
            Error::Handler { status, .. } => *status,
        }
    }

    /// The document written on the wire for this error.
    pub fn wire(&self) -> WireError {
        match self {
            Error::Parse { field, message, .. } => WireError {
                error: "Invalid request".to_string(),
                details: vec![FieldError::new(field.clone(), message.clone())],
            },
            Error::Validation(details) => WireError {
                error: "Validation failed".to_string(),
                details: details.clone(),
            },
            Error::ResponseValidation(details) => WireError {
                error: "Response validation failed".to_string(),
                details: details.clone(),
            },
            Error::Handler { message, .. } => WireError {
                error: message.clone(),
                details: Vec::new(),
            },
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Parse { field, source, message } => {
                write!(f, "failed to bind `{}` from {}: {}", field, source, message)
            }
            Error::Validation(details) => {
                write!(f, "request validation failed ({} field(s))", details.len())
            }
            Error::ResponseValidation(details) => {
                write!(f, "response validation failed ({} field(s))", details.len())
            }
            Error::Handler { message, .. } => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
