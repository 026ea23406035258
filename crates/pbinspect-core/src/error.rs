//! Error types for the pbinspect-core library.
//!
//! This module provides comprehensive error handling using the `thiserror` crate.
//! Every wire-level variant carries the absolute byte offset where the problem
//! was detected, so a failure can always be traced back to the input position.

use crate::wire::WireType;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pbinspect operations
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error type for all pbinspect operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The buffer ended in the middle of a read
    #[error("unexpected end of input at offset {offset}")]
    UnexpectedEof {
        /// Byte offset where the read started
        offset: usize,
    },

    /// A varint carried more than 64 bits of payload
    #[error("varint at offset {offset} overflows 64 bits")]
    VarintOverflow {
        /// Byte offset of the first varint byte
        offset: usize,
    },

    /// A length prefix cannot be used to index the buffer
    #[error("malformed length {length} at offset {offset}")]
    MalformedLength {
        /// Byte offset of the length prefix
        offset: usize,
        /// The declared length
        length: u64,
    },

    /// The low three bits of a tag are not a defined wire type
    #[error("unknown wire type {wire_type} for field {field_number} at offset {offset}")]
    UnknownWireType {
        /// Byte offset of the tag
        offset: usize,
        /// Field number decoded from the tag
        field_number: u64,
        /// The raw wire type bits
        wire_type: u8,
    },

    /// A string field does not hold valid UTF-8
    #[error("invalid UTF-8 in string at offset {offset}: {source}")]
    InvalidUtf8 {
        /// Byte offset of the length prefix
        offset: usize,
        /// Underlying conversion error
        #[source]
        source: std::str::Utf8Error,
    },

    /// The requested message type is not in the schema store
    #[error("no definition found for type '{name}'")]
    UnknownType {
        /// Qualified name that was looked up
        name: String,
    },

    /// A field references a type that resolves to neither a message nor an enum
    #[error("unknown type '{type_name}' for field '{field}'")]
    UnknownFieldType {
        /// Field name
        field: String,
        /// The unresolved type reference
        type_name: String,
    },

    /// An enum field holds a number with no matching member
    #[error("unknown value {value} of enum '{enum_name}' for field '{field}' at offset {offset}")]
    UnknownEnumValue {
        /// Byte offset of the value
        offset: usize,
        /// Field name
        field: String,
        /// Qualified enum name
        enum_name: String,
        /// The wire value
        value: i64,
    },

    /// A field arrived with a wire type its declared type cannot use
    #[error("field '{field}' at offset {offset}: expected wire type {expected:?}, found {actual:?}")]
    WireTypeMismatch {
        /// Byte offset of the tag
        offset: usize,
        /// Field name
        field: String,
        /// Wire type implied by the schema
        expected: WireType,
        /// Wire type found on the wire
        actual: WireType,
    },

    /// Start-group and end-group markers do not pair up
    #[error("start-end not balanced at offset {offset} (depth {depth})")]
    UnbalancedGroup {
        /// Byte offset where the imbalance was detected
        offset: usize,
        /// Group depth at that point
        depth: isize,
    },

    /// Nesting went deeper than the configured limit
    #[error("recursion limit of {limit} exceeded at offset {offset}")]
    RecursionLimit {
        /// Byte offset of the nested payload
        offset: usize,
        /// Configured maximum depth
        limit: usize,
    },

    /// A failure while decoding a particular field
    #[error("field '{field}' (tag {tag}): {source}")]
    Field {
        /// Field name
        field: String,
        /// Field number
        tag: u64,
        /// What went wrong
        #[source]
        source: Box<Error>,
    },

    /// Failed to parse schema source text
    #[error("failed to parse schema '{identifier}': {details}")]
    SchemaParse {
        /// Source identifier (usually a path)
        identifier: String,
        /// Parser diagnostics
        details: String,
    },

    /// Failed to read input file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        /// Path to the file that failed to read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A record sink failed to write output
    #[error("failed to write output: {0}")]
    Format(#[from] std::fmt::Error),

    /// Failed to decode a compiled descriptor set
    #[error("failed to decode descriptor set: {0}")]
    DescriptorDecode(#[from] prost::DecodeError),
}

impl Error {
    /// Creates a new unexpected end of input error
    pub fn unexpected_eof(offset: usize) -> Self {
        Self::UnexpectedEof { offset }
    }

    /// Creates a new malformed length error
    pub fn malformed_length(offset: usize, length: u64) -> Self {
        Self::MalformedLength { offset, length }
    }

    /// Creates a new unknown field type error
    pub fn unknown_field_type(field: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::UnknownFieldType {
            field: field.into(),
            type_name: type_name.into(),
        }
    }

    /// Creates a new schema parse error
    pub fn schema_parse(identifier: impl Into<String>, details: impl ToString) -> Self {
        Self::SchemaParse {
            identifier: identifier.into(),
            details: details.to_string(),
        }
    }

    /// Creates a new file read error
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Wraps this error with the field it occurred in
    pub fn in_field(self, field: impl Into<String>, tag: u64) -> Self {
        Self::Field {
            field: field.into(),
            tag,
            source: Box::new(self),
        }
    }

    /// Returns the innermost error, looking through field context
    pub fn root(&self) -> &Error {
        match self {
            Self::Field { source, .. } => source.root(),
            other => other,
        }
    }

    /// Returns true if the input simply ran out of bytes
    ///
    /// Embedded-message decoding keeps its partial result on this condition.
    pub fn is_unexpected_eof(&self) -> bool {
        matches!(self.root(), Self::UnexpectedEof { .. })
    }

    /// Returns the byte offset the error points at, if it has one
    pub fn offset(&self) -> Option<usize> {
        match self.root() {
            Self::UnexpectedEof { offset }
            | Self::VarintOverflow { offset }
            | Self::MalformedLength { offset, .. }
            | Self::UnknownWireType { offset, .. }
            | Self::InvalidUtf8 { offset, .. }
            | Self::UnknownEnumValue { offset, .. }
            | Self::WireTypeMismatch { offset, .. }
            | Self::UnbalancedGroup { offset, .. }
            | Self::RecursionLimit { offset, .. } => Some(*offset),
            _ => None,
        }
    }
}
