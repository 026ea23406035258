//! Schema-less inspection of wire-format bytes.
//!
//! The [`Inspector`] walks a buffer from offset 0, reading one tag at a time
//! and reporting each record to a [`RecordSink`]. It knows nothing about
//! field names or types: length-delimited payloads are reported as bytes and
//! never parsed as sub-messages, and only deprecated group markers change the
//! nesting depth.
//!
//! ## Example
//!
//! ```
//! use pbinspect_core::Inspector;
//!
//! let mut out = String::new();
//! let summary = Inspector::new().inspect_text(&[0x08, 0x96, 0x01], &mut out)?;
//! assert_eq!(out, "  0: t=  1 varint 150\n");
//! assert!(summary.is_balanced());
//! # Ok::<(), pbinspect_core::Error>(())
//! ```

mod sink;

use crate::error::{Error, Result};
use crate::wire::{ByteCursor, WireType};
use tracing::{debug, trace};

pub use sink::{NullSink, Position, RecordSink, StatsSink, TextSink};

/// Configuration for the inspector
#[derive(Debug, Clone)]
pub struct InspectorConfig {
    /// Dump every byte of length-delimited payloads
    pub verbose: bool,
    /// Indentation string per group level (default: 2 spaces)
    pub indent_str: String,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            indent_str: "  ".to_string(),
        }
    }
}

impl InspectorConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether payloads are dumped in full
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Sets the indentation string
    pub fn indent_str(mut self, s: impl Into<String>) -> Self {
        self.indent_str = s.into();
        self
    }
}

/// Outcome of a completed walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InspectSummary {
    /// Number of records reported
    pub records: usize,
    /// Offset where the walk stopped (the input length)
    pub end_offset: usize,
    /// Group depth at the end; zero for well-formed input
    pub depth: isize,
}

impl InspectSummary {
    /// Returns true if every start-group had a matching end-group
    pub fn is_balanced(&self) -> bool {
        self.depth == 0
    }

    /// Turns an unbalanced ending into an error
    pub fn check(&self) -> Result<()> {
        if self.is_balanced() {
            Ok(())
        } else {
            Err(Error::UnbalancedGroup {
                offset: self.end_offset,
                depth: self.depth,
            })
        }
    }
}

/// Walks wire-format bytes without a schema
#[derive(Debug, Clone, Default)]
pub struct Inspector {
    config: InspectorConfig,
}

impl Inspector {
    /// Creates a new inspector with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new inspector with custom configuration
    pub fn with_config(config: InspectorConfig) -> Self {
        Self { config }
    }

    /// Renders `data` as text lines into `out`.
    ///
    /// On error, every line produced before the failure is already in `out`.
    pub fn inspect_text(&self, data: &[u8], out: &mut impl std::fmt::Write) -> Result<InspectSummary> {
        let mut sink = TextSink::new(out, &self.config.indent_str, self.config.verbose);
        self.inspect(data, &mut sink)
    }

    /// Walks `data`, reporting every record to `sink`.
    ///
    /// An unbalanced group structure is reported to the sink and in the
    /// summary, not as an error.
    pub fn inspect<S: RecordSink>(&self, data: &[u8], sink: &mut S) -> Result<InspectSummary> {
        let mut cursor = ByteCursor::new(data);
        let mut depth: isize = 0;
        let mut records = 0;

        debug!("Inspecting {} bytes", data.len());

        while !cursor.is_empty() {
            let offset = cursor.position();
            let tag = cursor.read_tag()?;
            let mut at = Position {
                offset,
                depth,
                field_number: tag.field_number,
            };

            trace!("t={} {:?} at {}", tag.field_number, tag.wire_type, offset);

            match tag.wire_type {
                WireType::LengthDelimited => {
                    let payload = cursor.read_length_delimited()?;
                    sink.bytes(at, payload)?;
                }
                WireType::Fixed32 => {
                    let value = cursor.read_fixed32()?;
                    sink.fixed32(at, value)?;
                }
                WireType::Fixed64 => {
                    let value = cursor.read_fixed64()?;
                    sink.fixed64(at, value)?;
                }
                WireType::Varint => {
                    let value = cursor.read_varint()?;
                    sink.varint(at, value)?;
                }
                WireType::StartGroup => {
                    sink.start_group(at)?;
                    depth += 1;
                }
                WireType::EndGroup => {
                    depth -= 1;
                    at.depth = depth;
                    sink.end_group(at)?;
                }
            }
            records += 1;
        }

        let summary = InspectSummary {
            records,
            end_offset: cursor.position(),
            depth,
        };

        if !summary.is_balanced() {
            debug!("Unbalanced groups at end of input: depth {}", depth);
            sink.unbalanced(summary.end_offset, depth)?;
        }

        Ok(summary)
    }
}
