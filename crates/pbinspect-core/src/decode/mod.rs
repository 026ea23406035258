//! Schema-driven decoding of wire-format bytes.
//!
//! A [`Decoder`] looks up the starting message in a [`SchemaStore`] and walks
//! the input tag by tag, turning each record into a named [`Value`]. Embedded
//! messages and map entries are decoded by a fresh sub-decoder over exactly
//! their payload, so nothing in a sub-message can read past its own bounds.
//!
//! The store is only ever borrowed: one store can back any number of decoders.

mod value;

pub use value::{Fields, Value};

use crate::error::{Error, Result};
use crate::schema::{
    qualify, EnumDef, Field, FieldDef, FieldType, MapField, MessageDef, OneOf, Primitive,
    SchemaStore, TypeDef,
};
use crate::wire::{ByteCursor, Tag, WireType};
use tracing::{debug, trace, warn};

/// What running out of bytes while reading a tag means
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndOfInput {
    /// Any end of input at a tag read ends the message
    #[default]
    Lenient,
    /// Only a clean boundary ends the message; a truncated tag is an error
    Strict,
}

/// How fields inside a `oneof` are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OneofMode {
    /// Recognise the tag, skip its value and log a warning
    #[default]
    Skip,
    /// Decode the member and store it under the member's name
    Decode,
}

/// Configuration for the decoder
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Maximum embedded-message nesting (default: 100)
    pub max_depth: usize,
    /// End-of-input handling
    pub end_of_input: EndOfInput,
    /// Oneof handling
    pub oneof: OneofMode,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_depth: 100,
            end_of_input: EndOfInput::default(),
            oneof: OneofMode::default(),
        }
    }
}

impl DecoderConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum nesting depth
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Enables strict end-of-input handling
    pub fn strict(mut self, strict: bool) -> Self {
        self.end_of_input = if strict {
            EndOfInput::Strict
        } else {
            EndOfInput::Lenient
        };
        self
    }

    /// Enables decoding of oneof members
    pub fn decode_oneofs(mut self, decode: bool) -> Self {
        self.oneof = if decode {
            OneofMode::Decode
        } else {
            OneofMode::Skip
        };
        self
    }
}

/// Decodes messages against a schema store
#[derive(Debug, Clone)]
pub struct Decoder<'s> {
    store: &'s SchemaStore,
    config: DecoderConfig,
}

impl<'s> Decoder<'s> {
    /// Creates a decoder with default configuration
    pub fn new(store: &'s SchemaStore) -> Self {
        Self::with_config(store, DecoderConfig::default())
    }

    /// Creates a decoder with custom configuration
    pub fn with_config(store: &'s SchemaStore, config: DecoderConfig) -> Self {
        Self { store, config }
    }

    /// Returns the configuration in use
    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Decodes `data` as message `type_name` of `package`.
    ///
    /// Fails with [`Error::UnknownType`] if the store has no such message.
    pub fn decode(&self, package: &str, type_name: &str, data: &[u8]) -> Result<Fields> {
        let message = self
            .store
            .lookup_message(package, type_name)
            .ok_or_else(|| Error::UnknownType {
                name: qualify(package, type_name),
            })?;
        self.decode_message(message, data)
    }

    /// Decodes `data` as `message`, which need not be registered.
    ///
    /// Named field types are still resolved through the store.
    pub fn decode_message(&self, message: &MessageDef, data: &[u8]) -> Result<Fields> {
        debug!("Decoding {} bytes as {}", data.len(), message.full_name());

        let mut state = MessageDecoder {
            decoder: self,
            message,
            cursor: ByteCursor::new(data),
            fields: Fields::new(),
            depth: 0,
        };
        state.run()?;
        Ok(state.fields)
    }
}

/// Decoding state for one message body
struct MessageDecoder<'d, 'a> {
    decoder: &'d Decoder<'d>,
    message: &'d MessageDef,
    cursor: ByteCursor<'a>,
    fields: Fields,
    depth: usize,
}

impl<'d, 'a> MessageDecoder<'d, 'a> {
    fn config(&self) -> &DecoderConfig {
        &self.decoder.config
    }

    fn run(&mut self) -> Result<()> {
        let lenient = self.config().end_of_input == EndOfInput::Lenient;
        while !self.cursor.is_empty() {
            let offset = self.cursor.position();
            let tag = match self.cursor.read_tag() {
                Ok(tag) => tag,
                Err(e) if lenient && e.is_unexpected_eof() => {
                    trace!("{}: truncated tag at {}, ending message", self.message.name, offset);
                    return Ok(());
                }
                Err(e) => return Err(e),
            };
            self.decode_tag(tag, offset)?;
        }
        Ok(())
    }

    fn decode_tag(&mut self, tag: Tag, offset: usize) -> Result<()> {
        let message = self.message;
        let Some(def) = message.field_for(tag.field_number) else {
            debug!(
                "{}: skipping unknown field {} ({:?}) at {}",
                message.name, tag.field_number, tag.wire_type, offset
            );
            return self.cursor.skip_field(tag, self.config().max_depth);
        };

        trace!("{}.{} at {}", message.name, def.name(), offset);

        let result = match def {
            FieldDef::Normal(field) => self.decode_field(field, tag, offset),
            FieldDef::Map(map) => self.decode_map(map, tag, offset),
            FieldDef::OneOf(oneof) => self.decode_oneof(oneof, tag, offset),
        };
        result.map_err(|e| e.in_field(def.name(), tag.field_number))
    }

    fn decode_field(&mut self, field: &Field, tag: Tag, offset: usize) -> Result<()> {
        let store = self.decoder.store;
        match &field.ty {
            FieldType::Primitive(primitive) => self.decode_primitive(field, *primitive, tag, offset),
            FieldType::Named(type_name) => match store.resolve(self.message, type_name) {
                Some(TypeDef::Message(message)) => self.decode_embedded(field, message, tag, offset),
                Some(TypeDef::Enum(enum_def)) => self.decode_enum(field, enum_def, tag, offset),
                None => Err(Error::unknown_field_type(&field.name, type_name)),
            },
        }
    }

    fn decode_primitive(
        &mut self,
        field: &Field,
        primitive: Primitive,
        tag: Tag,
        offset: usize,
    ) -> Result<()> {
        if field.repeated && primitive.is_packable() && tag.wire_type == WireType::LengthDelimited {
            let mut packed = self.packed_payload()?;
            while !packed.is_empty() {
                let value = read_primitive(primitive, &mut packed)?;
                self.fields.push(&field.name, value);
            }
            return Ok(());
        }

        expect_wire_type(&field.name, primitive.wire_type(), tag, offset)?;
        let value = read_primitive(primitive, &mut self.cursor)?;
        self.store_value(field, value);
        Ok(())
    }

    fn decode_enum(&mut self, field: &Field, enum_def: &EnumDef, tag: Tag, offset: usize) -> Result<()> {
        if field.repeated && tag.wire_type == WireType::LengthDelimited {
            let mut packed = self.packed_payload()?;
            while !packed.is_empty() {
                let value = read_enum(field, enum_def, &mut packed)?;
                self.fields.push(&field.name, value);
            }
            return Ok(());
        }

        expect_wire_type(&field.name, WireType::Varint, tag, offset)?;
        let value = read_enum(field, enum_def, &mut self.cursor)?;
        self.store_value(field, value);
        Ok(())
    }

    fn decode_embedded(
        &mut self,
        field: &Field,
        message: &MessageDef,
        tag: Tag,
        offset: usize,
    ) -> Result<()> {
        if tag.wire_type == WireType::StartGroup {
            debug!("{}: skipping group-encoded field at {}", field.name, offset);
            return self.cursor.skip_field(tag, self.config().max_depth);
        }
        expect_wire_type(&field.name, WireType::LengthDelimited, tag, offset)?;

        let (payload, base) = self.payload()?;
        let (fields, outcome) = self.decode_nested(message, payload, base)?;
        match outcome {
            Ok(()) => {}
            Err(e) if e.is_unexpected_eof() => {
                debug!("{}: keeping partial message: {}", field.name, e);
            }
            Err(e) => return Err(e),
        }
        self.store_value(field, Value::Message(fields));
        Ok(())
    }

    fn decode_map(&mut self, map: &MapField, tag: Tag, offset: usize) -> Result<()> {
        expect_wire_type(&map.name, WireType::LengthDelimited, tag, offset)?;

        let store = self.decoder.store;
        let entry = store.map_entry(self.message, map);
        let (payload, base) = self.payload()?;
        let (mut fields, outcome) = self.decode_nested(&entry, payload, base)?;
        outcome?;

        let key = match fields.remove("key") {
            Some(key) => key,
            None => self.default_value(&entry, "key", &map.key)?,
        };
        let value = match fields.remove("value") {
            Some(value) => value,
            None => self.default_value(&entry, "value", &map.value)?,
        };

        self.fields.merge_entry(&map.name, key.map_key(&map.key), value);
        Ok(())
    }

    fn decode_oneof(&mut self, oneof: &OneOf, tag: Tag, offset: usize) -> Result<()> {
        let member = oneof
            .members
            .iter()
            .find(|m| u64::from(m.number) == tag.field_number);

        match (self.config().oneof, member) {
            (OneofMode::Decode, Some(member)) => {
                for other in oneof.members.iter().filter(|m| m.name != member.name) {
                    self.fields.remove(&other.name);
                }
                self.decode_field(member, tag, offset)
            }
            _ => {
                warn!(
                    "{}: skipping oneof '{}' member with tag {} at {}",
                    self.message.name, oneof.name, tag.field_number, offset
                );
                self.cursor.skip_field(tag, self.config().max_depth)
            }
        }
    }

    /// Reads a length-delimited payload and its absolute start offset
    fn payload(&mut self) -> Result<(&'a [u8], usize)> {
        let payload = self.cursor.read_length_delimited()?;
        Ok((payload, self.cursor.position() - payload.len()))
    }

    fn packed_payload(&mut self) -> Result<ByteCursor<'a>> {
        let (payload, base) = self.payload()?;
        Ok(ByteCursor::with_base(payload, base))
    }

    /// Runs a sub-decoder over `payload`.
    ///
    /// The outer result fails only on the depth limit; the inner one carries
    /// whatever stopped the sub-decoder, alongside the fields it produced.
    fn decode_nested(
        &self,
        message: &MessageDef,
        payload: &'a [u8],
        base: usize,
    ) -> Result<(Fields, Result<()>)> {
        let limit = self.config().max_depth;
        if self.depth >= limit {
            return Err(Error::RecursionLimit {
                offset: base,
                limit,
            });
        }

        let mut nested = MessageDecoder {
            decoder: self.decoder,
            message,
            cursor: ByteCursor::with_base(payload, base),
            fields: Fields::new(),
            depth: self.depth + 1,
        };
        let outcome = nested.run();
        Ok((nested.fields, outcome))
    }

    fn default_value(&self, scope: &MessageDef, field: &str, ty: &FieldType) -> Result<Value> {
        match ty {
            FieldType::Primitive(primitive) => Ok(Value::default_for(*primitive)),
            FieldType::Named(type_name) => match self.decoder.store.resolve(scope, type_name) {
                Some(TypeDef::Message(_)) => Ok(Value::Message(Fields::new())),
                Some(TypeDef::Enum(enum_def)) => Ok(enum_def
                    .values
                    .first()
                    .map(|(name, _)| Value::Enum(name.clone()))
                    .unwrap_or(Value::I32(0))),
                None => Err(Error::unknown_field_type(field, type_name)),
            },
        }
    }

    fn store_value(&mut self, field: &Field, value: Value) {
        if field.repeated {
            self.fields.push(&field.name, value);
        } else {
            self.fields.set(&field.name, value);
        }
    }
}

fn expect_wire_type(field: &str, expected: WireType, tag: Tag, offset: usize) -> Result<()> {
    if tag.wire_type == expected {
        Ok(())
    } else {
        Err(Error::WireTypeMismatch {
            offset,
            field: field.to_string(),
            expected,
            actual: tag.wire_type,
        })
    }
}

fn read_primitive(primitive: Primitive, cursor: &mut ByteCursor<'_>) -> Result<Value> {
    // Varint-encoded 32-bit types keep the low 32 bits, as protobuf does.
    Ok(match primitive {
        Primitive::Double => Value::F64(f64::from_bits(cursor.read_fixed64()?)),
        Primitive::Float => Value::F32(f32::from_bits(cursor.read_fixed32()?)),
        Primitive::Int32 => Value::I32(cursor.read_varint()? as i32),
        Primitive::Int64 => Value::I64(cursor.read_varint()? as i64),
        Primitive::Uint32 => Value::U32(cursor.read_varint()? as u32),
        Primitive::Uint64 => Value::U64(cursor.read_varint()?),
        Primitive::Sint32 => Value::I32(cursor.read_zigzag32()?),
        Primitive::Sint64 => Value::I64(cursor.read_zigzag64()?),
        Primitive::Fixed32 => Value::U32(cursor.read_fixed32()?),
        Primitive::Fixed64 => Value::U64(cursor.read_fixed64()?),
        Primitive::Sfixed32 => Value::I32(cursor.read_fixed32()? as i32),
        Primitive::Sfixed64 => Value::I64(cursor.read_fixed64()? as i64),
        Primitive::Bool => Value::Bool(cursor.read_varint()? != 0),
        Primitive::String => Value::String(cursor.read_str()?.to_string()),
        Primitive::Bytes => Value::Bytes(cursor.read_length_delimited_owned()?),
    })
}

fn read_enum(field: &Field, enum_def: &EnumDef, cursor: &mut ByteCursor<'_>) -> Result<Value> {
    let offset = cursor.position();
    let raw = cursor.read_varint()? as i64;
    i32::try_from(raw)
        .ok()
        .and_then(|number| enum_def.name_of(number))
        .map(|name| Value::Enum(name.to_string()))
        .ok_or_else(|| Error::UnknownEnumValue {
            offset,
            field: field.name.clone(),
            enum_name: enum_def.full_name(),
            value: raw,
        })
}
