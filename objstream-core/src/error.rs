//! Error types for object stream operations.

use std::io;
use std::sync::Arc;
use thiserror::Error;

/// The main error type for object stream operations.
///
/// Errors are `Clone` so that the read-side handle table can record a failure against a
/// handle and hand the same error to every object that depends on it.
#[derive(Debug, Clone, Error)]
pub enum StreamError {
    /// Malformed or out-of-protocol control data, including invalid handle references.
    #[error("stream corrupted: {0}")]
    StreamCorrupted(String),

    /// A class descriptor is invalid or cannot be bound to the local type.
    #[error("invalid class{}: {reason}", class_suffix(.class_name))]
    InvalidClass {
        /// The class the failure applies to, when known.
        class_name: Option<String>,
        /// Human-readable reason.
        reason: String,
    },

    /// Stream and local version ids disagree for a serializable type.
    #[error(
        "invalid class {class_name}: local class incompatible: stream classdesc version id = {stream_suid}, local class version id = {local_suid}"
    )]
    VersionMismatch {
        /// The local class name.
        class_name: String,
        /// The version id read from the stream.
        stream_suid: i64,
        /// The version id of the local type.
        local_suid: i64,
    },

    /// A type named by the stream cannot be resolved locally.
    #[error("class not found: {0}")]
    ClassNotFound(String),

    /// Write side: the value's type has no transfer strategy.
    #[error("not serializable: {0}")]
    NotSerializable(String),

    /// Primitive data was found where an object was expected, or the end of custom data
    /// was reached.
    #[error("optional data: eof={eof}, length={length}")]
    OptionalData {
        /// True when no more primitive data is available in the current custom block.
        eof: bool,
        /// Number of primitive bytes available before the next object record.
        length: usize,
    },

    /// A decoded object failed validation or violates a sharing rule.
    #[error("invalid object: {0}")]
    InvalidObject(String),

    /// A hook-only operation was called outside of a hook.
    #[error("not active: {0}")]
    NotActive(String),

    /// The writer aborted and recorded a terminal exception record.
    #[error("writing aborted; {class_name}: {}", .message.as_deref().unwrap_or(""))]
    WriteAborted {
        /// Class name of the recorded exception.
        class_name: String,
        /// Detail message of the recorded exception.
        message: Option<String>,
    },

    /// The underlying byte channel ended early.
    #[error("unexpected end of stream")]
    Eof,

    /// Engine misuse, such as switching framing modes with unread data.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// I/O errors from the underlying byte channel.
    #[error("I/O error: {0}")]
    Io(Arc<io::Error>),
}

fn class_suffix(class_name: &Option<String>) -> String {
    match class_name {
        Some(name) => format!(" {}", name),
        None => String::new(),
    }
}

/// Classification of [`StreamError`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed stream.
    StreamCorrupted,
    /// Version/shape mismatch, incompatible flags, filter rejection, no usable constructor.
    InvalidClass,
    /// Unresolvable type.
    ClassNotFound,
    /// No transfer strategy on the write side.
    NotSerializable,
    /// Primitive/object confusion at a custom-hook boundary.
    OptionalData,
    /// Failed validation or sharing rule.
    InvalidObject,
    /// Hook-only call outside a hook.
    NotActive,
    /// Terminal exception record observed.
    WriteAborted,
    /// Channel or engine state failure.
    Io,
}

impl StreamError {
    /// Creates an `InvalidClass` error for a named class.
    pub fn invalid_class(class_name: impl Into<String>, reason: impl Into<String>) -> Self {
        StreamError::InvalidClass {
            class_name: Some(class_name.into()),
            reason: reason.into(),
        }
    }

    /// Creates an `InvalidClass` error that is not tied to a class.
    pub fn invalid_class_anon(reason: impl Into<String>) -> Self {
        StreamError::InvalidClass {
            class_name: None,
            reason: reason.into(),
        }
    }

    /// Creates a `StreamCorrupted` error.
    pub fn corrupted(reason: impl Into<String>) -> Self {
        StreamError::StreamCorrupted(reason.into())
    }

    /// Returns the taxonomy bucket for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StreamError::StreamCorrupted(_) => ErrorKind::StreamCorrupted,
            StreamError::InvalidClass { .. } | StreamError::VersionMismatch { .. } => {
                ErrorKind::InvalidClass
            }
            StreamError::ClassNotFound(_) => ErrorKind::ClassNotFound,
            StreamError::NotSerializable(_) => ErrorKind::NotSerializable,
            StreamError::OptionalData { .. } => ErrorKind::OptionalData,
            StreamError::InvalidObject(_) => ErrorKind::InvalidObject,
            StreamError::NotActive(_) => ErrorKind::NotActive,
            StreamError::WriteAborted { .. } => ErrorKind::WriteAborted,
            StreamError::Eof | StreamError::IllegalState(_) | StreamError::Io(_) => ErrorKind::Io,
        }
    }

    /// Returns true if this is a `ClassNotFound` error.
    pub fn is_class_not_found(&self) -> bool {
        matches!(self, StreamError::ClassNotFound(_))
    }

    /// Exception class name used when this error is recorded as a terminal exception record.
    pub fn exception_class_name(&self) -> &'static str {
        match self {
            StreamError::StreamCorrupted(_) => "java.io.StreamCorruptedException",
            StreamError::InvalidClass { .. } | StreamError::VersionMismatch { .. } => {
                "java.io.InvalidClassException"
            }
            StreamError::ClassNotFound(_) => "java.lang.ClassNotFoundException",
            StreamError::NotSerializable(_) => "java.io.NotSerializableException",
            StreamError::OptionalData { .. } => "java.io.OptionalDataException",
            StreamError::InvalidObject(_) => "java.io.InvalidObjectException",
            StreamError::NotActive(_) => "java.io.NotActiveException",
            StreamError::WriteAborted { .. } => "java.io.WriteAbortedException",
            StreamError::Eof => "java.io.EOFException",
            StreamError::IllegalState(_) | StreamError::Io(_) => "java.io.IOException",
        }
    }

    /// Detail message used when this error is recorded as a terminal exception record.
    pub fn detail_message(&self) -> String {
        match self {
            StreamError::StreamCorrupted(msg)
            | StreamError::ClassNotFound(msg)
            | StreamError::NotSerializable(msg)
            | StreamError::InvalidObject(msg)
            | StreamError::NotActive(msg)
            | StreamError::IllegalState(msg) => msg.clone(),
            StreamError::InvalidClass { class_name, reason } => match class_name {
                Some(name) => format!("{}; {}", name, reason),
                None => reason.clone(),
            },
            other => other.to_string(),
        }
    }
}

impl From<io::Error> for StreamError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            StreamError::Eof
        } else {
            StreamError::Io(Arc::new(err))
        }
    }
}

/// A specialized `Result` type for object stream operations.
pub type Result<T> = std::result::Result<T, StreamError>;
