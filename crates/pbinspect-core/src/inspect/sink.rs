//! Extensible record output for schema-less inspection.
//!
//! This module provides the [`RecordSink`] trait for customizing what happens
//! to each record the [`Inspector`](super::Inspector) finds.

use std::fmt::{self, Write};

/// Where a record sits in the input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    /// Byte offset of the record's tag
    pub offset: usize,
    /// Group nesting depth when the record is emitted
    pub depth: isize,
    /// Field number from the tag
    pub field_number: u64,
}

/// Trait for receiving inspection records.
///
/// Every method has a no-op default, so a sink only implements what it
/// cares about.
pub trait RecordSink {
    /// A varint value
    fn varint(&mut self, at: Position, value: u64) -> fmt::Result {
        let _ = (at, value);
        Ok(())
    }

    /// A 32-bit fixed value
    fn fixed32(&mut self, at: Position, value: u32) -> fmt::Result {
        let _ = (at, value);
        Ok(())
    }

    /// A 64-bit fixed value
    fn fixed64(&mut self, at: Position, value: u64) -> fmt::Result {
        let _ = (at, value);
        Ok(())
    }

    /// A length-delimited payload
    fn bytes(&mut self, at: Position, payload: &[u8]) -> fmt::Result {
        let _ = (at, payload);
        Ok(())
    }

    /// A start-group marker
    fn start_group(&mut self, at: Position) -> fmt::Result {
        let _ = at;
        Ok(())
    }

    /// An end-group marker
    fn end_group(&mut self, at: Position) -> fmt::Result {
        let _ = at;
        Ok(())
    }

    /// Input ended while `depth` groups were still open (or over-closed)
    fn unbalanced(&mut self, offset: usize, depth: isize) -> fmt::Result {
        let _ = (offset, depth);
        Ok(())
    }
}

/// A no-op sink that discards all records
pub struct NullSink;

impl RecordSink for NullSink {}

/// A sink that counts records per wire type
#[derive(Debug, Default)]
pub struct StatsSink {
    /// Number of varint records
    pub varints: usize,
    /// Number of fixed32 and fixed64 records
    pub fixed: usize,
    /// Number of length-delimited records
    pub bytes: usize,
    /// Number of group markers
    pub groups: usize,
    /// Largest group depth seen
    pub max_depth: isize,
}

impl RecordSink for StatsSink {
    fn varint(&mut self, _at: Position, _value: u64) -> fmt::Result {
        self.varints += 1;
        Ok(())
    }

    fn fixed32(&mut self, _at: Position, _value: u32) -> fmt::Result {
        self.fixed += 1;
        Ok(())
    }

    fn fixed64(&mut self, _at: Position, _value: u64) -> fmt::Result {
        self.fixed += 1;
        Ok(())
    }

    fn bytes(&mut self, _at: Position, _payload: &[u8]) -> fmt::Result {
        self.bytes += 1;
        Ok(())
    }

    fn start_group(&mut self, at: Position) -> fmt::Result {
        self.groups += 1;
        self.max_depth = self.max_depth.max(at.depth + 1);
        Ok(())
    }

    fn end_group(&mut self, _at: Position) -> fmt::Result {
        self.groups += 1;
        Ok(())
    }
}

/// Renders records as indented text lines.
///
/// Line shape: `<offset>: t=<field> <kind> <value>`, offsets and field
/// numbers right-aligned to three columns.
pub struct TextSink<'a, W: Write> {
    writer: &'a mut W,
    indent_str: &'a str,
    verbose: bool,
}

/// Payloads up to this length are always dumped in full
const FULL_DUMP_LEN: usize = 6;

/// Bytes shown at each end of a truncated dump
const PREVIEW_LEN: usize = 3;

impl<'a, W: Write> TextSink<'a, W> {
    /// Creates a text sink; `verbose` dumps every payload byte
    pub fn new(writer: &'a mut W, indent_str: &'a str, verbose: bool) -> Self {
        Self {
            writer,
            indent_str,
            verbose,
        }
    }

    fn prefix(&mut self, at: Position) -> fmt::Result {
        for _ in 0..at.depth.max(0) {
            self.writer.write_str(self.indent_str)?;
        }
        write!(self.writer, "{:3}: t={:3}", at.offset, at.field_number)
    }

    fn dump(&mut self, bytes: &[u8]) -> fmt::Result {
        bytes
            .iter()
            .try_for_each(|b| write!(self.writer, " {:02x}", b))
    }
}

impl<W: Write> RecordSink for TextSink<'_, W> {
    fn varint(&mut self, at: Position, value: u64) -> fmt::Result {
        self.prefix(at)?;
        writeln!(self.writer, " varint {}", value)
    }

    fn fixed32(&mut self, at: Position, value: u32) -> fmt::Result {
        self.prefix(at)?;
        writeln!(self.writer, " fix32 {}", value)
    }

    fn fixed64(&mut self, at: Position, value: u64) -> fmt::Result {
        self.prefix(at)?;
        writeln!(self.writer, " fix64 {}", value)
    }

    fn bytes(&mut self, at: Position, payload: &[u8]) -> fmt::Result {
        self.prefix(at)?;
        write!(self.writer, " bytes [{}]", payload.len())?;

        if self.verbose || payload.len() <= FULL_DUMP_LEN {
            self.dump(payload)?;
        } else {
            self.dump(&payload[..PREVIEW_LEN])?;
            self.writer.write_str(" ..")?;
            self.dump(&payload[payload.len() - PREVIEW_LEN..])?;
        }
        writeln!(self.writer)
    }

    fn start_group(&mut self, at: Position) -> fmt::Result {
        self.prefix(at)?;
        writeln!(self.writer, " start")
    }

    fn end_group(&mut self, at: Position) -> fmt::Result {
        self.prefix(at)?;
        writeln!(self.writer, " end")
    }

    fn unbalanced(&mut self, offset: usize, depth: isize) -> fmt::Result {
        writeln!(self.writer, "{:3}: start-end not balanced {}", offset, depth)
    }
}
