//! Lowering of file descriptors into store definitions.

use super::{qualify, EnumDef, Field, FieldDef, FieldType, MapField, MessageDef, OneOf, Primitive};
use crate::error::{Error, Result};
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{DescriptorProto, EnumDescriptorProto, FieldDescriptorProto, FileDescriptorProto};
use std::collections::HashMap;

/// Definitions extracted from one file
#[derive(Debug, Default)]
pub(crate) struct Lowered {
    pub(crate) package: String,
    pub(crate) messages: Vec<MessageDef>,
    pub(crate) enums: Vec<EnumDef>,
    pub(crate) entries: Vec<MessageDef>,
}

/// Parses `.proto` text into an unresolved file descriptor
pub(crate) fn parse_source(identifier: &str, text: &str) -> Result<FileDescriptorProto> {
    protox_parse::parse(identifier, text).map_err(|e| Error::schema_parse(identifier, e))
}

pub(crate) fn lower_file(file: &FileDescriptorProto) -> Lowered {
    let mut out = Lowered {
        package: file.package().to_string(),
        ..Default::default()
    };

    for message in &file.message_type {
        lower_message(message, "", &mut out);
    }
    for enum_type in &file.enum_type {
        lower_enum(enum_type, "", &mut out);
    }

    out
}

fn lower_message(message: &DescriptorProto, parent: &str, out: &mut Lowered) {
    let path = qualify(parent, message.name());

    // Map fields point at synthetic nested `FooEntry` types; they are folded
    // into `FieldDef::Map` instead of being indexed.
    let entries: HashMap<&str, &DescriptorProto> = message
        .nested_type
        .iter()
        .filter(|nested| is_map_entry(nested))
        .map(|nested| (nested.name(), nested))
        .collect();

    for nested in message.nested_type.iter().filter(|n| !is_map_entry(n)) {
        lower_message(nested, &path, out);
    }
    for enum_type in &message.enum_type {
        lower_enum(enum_type, &path, out);
    }

    let mut def = MessageDef::new(out.package.clone(), path);
    let mut oneof_slots: HashMap<i32, usize> = HashMap::new();

    for field in &message.field {
        if let Some(index) = real_oneof_index(field, message) {
            let member = lower_field(field);
            match oneof_slots.get(&index) {
                Some(&slot) => {
                    if let FieldDef::OneOf(oneof) = &mut def.fields[slot] {
                        oneof.members.push(member);
                    }
                }
                None => {
                    let name = message
                        .oneof_decl
                        .get(index as usize)
                        .map(|o| o.name().to_string())
                        .unwrap_or_default();
                    oneof_slots.insert(index, def.fields.len());
                    def.fields.push(FieldDef::OneOf(OneOf {
                        name,
                        members: vec![member],
                    }));
                }
            }
            continue;
        }

        let entry = (field.label() == Label::Repeated)
            .then(|| field.type_name().rsplit('.').next())
            .flatten()
            .and_then(|name| entries.get(name));

        match entry.and_then(|entry| lower_map(field, entry)) {
            Some(map) => {
                out.entries.push(def.map_entry_for(&map));
                def.fields.push(FieldDef::Map(map));
            }
            None => def.fields.push(FieldDef::Normal(lower_field(field))),
        }
    }

    out.messages.push(def);
}

fn lower_enum(enum_type: &EnumDescriptorProto, parent: &str, out: &mut Lowered) {
    out.enums.push(EnumDef {
        package: out.package.clone(),
        name: qualify(parent, enum_type.name()),
        values: enum_type
            .value
            .iter()
            .map(|v| (v.name().to_string(), v.number()))
            .collect(),
    });
}

fn lower_field(field: &FieldDescriptorProto) -> Field {
    Field {
        name: field.name().to_string(),
        ty: lower_type(field),
        number: field.number().max(0) as u32,
        repeated: field.label() == Label::Repeated,
    }
}

fn lower_map(field: &FieldDescriptorProto, entry: &DescriptorProto) -> Option<MapField> {
    let key = entry.field.iter().find(|f| f.number() == 1)?;
    let value = entry.field.iter().find(|f| f.number() == 2)?;
    Some(MapField {
        name: field.name().to_string(),
        key: lower_type(key),
        value: lower_type(value),
        number: field.number().max(0) as u32,
    })
}

/// Scalar types are resolved here; messages, enums and groups stay named.
///
/// Unresolved descriptors (straight from the parser) leave `type` unset for
/// named types, so a missing `type` also means "named".
fn lower_type(field: &FieldDescriptorProto) -> FieldType {
    field
        .r#type
        .and_then(|t| Type::try_from(t).ok())
        .and_then(primitive_of)
        .map(FieldType::Primitive)
        .unwrap_or_else(|| FieldType::Named(field.type_name().to_string()))
}

fn primitive_of(ty: Type) -> Option<Primitive> {
    Some(match ty {
        Type::Double => Primitive::Double,
        Type::Float => Primitive::Float,
        Type::Int64 => Primitive::Int64,
        Type::Uint64 => Primitive::Uint64,
        Type::Int32 => Primitive::Int32,
        Type::Fixed64 => Primitive::Fixed64,
        Type::Fixed32 => Primitive::Fixed32,
        Type::Bool => Primitive::Bool,
        Type::String => Primitive::String,
        Type::Bytes => Primitive::Bytes,
        Type::Uint32 => Primitive::Uint32,
        Type::Sfixed32 => Primitive::Sfixed32,
        Type::Sfixed64 => Primitive::Sfixed64,
        Type::Sint32 => Primitive::Sint32,
        Type::Sint64 => Primitive::Sint64,
        Type::Group | Type::Message | Type::Enum => return None,
    })
}

fn is_map_entry(message: &DescriptorProto) -> bool {
    message
        .options
        .as_ref()
        .map_or(false, |o| o.map_entry.unwrap_or(false))
}

/// Oneof index of a field, unless it is a proto3 `optional` (synthetic oneof)
fn real_oneof_index(field: &FieldDescriptorProto, message: &DescriptorProto) -> Option<i32> {
    let index = field.oneof_index?;
    if field.proto3_optional.unwrap_or(false) {
        return None;
    }
    // Synthetic oneofs have names starting with "_"
    let synthetic = message
        .oneof_decl
        .get(index as usize)
        .map_or(false, |o| o.name().starts_with('_'));
    (!synthetic).then_some(index)
}
