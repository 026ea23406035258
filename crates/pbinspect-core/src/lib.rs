//! # pbinspect-core
//!
//! A library for inspecting and decoding Protocol Buffer wire-format data.
//!
//! This crate provides the core functionality for:
//! - Reading the wire primitives (varints, zigzag, fixed-width, length-delimited runs)
//! - Listing the records of a message without any schema
//! - Loading message definitions from `.proto` text or compiled descriptors
//! - Decoding bytes against those definitions into a nested key-value structure
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`wire`]: Wire-format primitives over a bounded byte cursor
//! - [`inspect`]: Schema-less record listing
//! - [`schema`]: Message and enum definitions
//! - [`decode`]: Schema-driven decoding
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```
//! use pbinspect_core::{Decoder, SchemaStore, Value};
//!
//! let mut store = SchemaStore::new();
//! store.read_source(
//!     "point.proto",
//!     "syntax = \"proto3\"; package geo; message Point { sint32 x = 1; sint32 y = 2; }",
//! )?;
//!
//! let fields = Decoder::new(&store).decode("geo", "Point", &[0x08, 0x03, 0x10, 0x04])?;
//! assert_eq!(fields.get("x"), Some(&Value::I32(-2)));
//! assert_eq!(fields.get("y"), Some(&Value::I32(2)));
//! # Ok::<(), pbinspect_core::Error>(())
//! ```
//!
//! ## Extensibility
//!
//! - [`RecordSink`]: Customize what happens to each record the inspector finds
//!

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod decode;
pub mod error;
pub mod inspect;
pub mod schema;
pub mod wire;

// Re-export primary types for convenience
pub use decode::{Decoder, DecoderConfig, EndOfInput, Fields, OneofMode, Value};
pub use error::{Error, Result};
pub use inspect::{InspectSummary, Inspector, InspectorConfig, NullSink, RecordSink, StatsSink, TextSink};
pub use schema::{FieldDef, FieldType, MessageDef, Primitive, SchemaStore};
pub use wire::{ByteCursor, Tag, WireType};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
