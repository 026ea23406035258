//! Schema store: message and enum definitions indexed by qualified name.
//!
//! Definitions come from `.proto` source text (parsed by `protox-parse`),
//! from already-parsed `FileDescriptorProto`s, or from compiled
//! descriptor sets. Each is lowered into the small model in this module
//! ([`MessageDef`], [`EnumDef`], [`FieldDef`]) where primitive type keywords
//! are resolved up front into [`Primitive`], and only references to other
//! messages and enums stay symbolic.
//!
//! The store is filled through `&mut self` and is read-only afterwards, so a
//! single store can be shared by any number of concurrent decodes.

mod load;

use crate::error::{Error, Result};
use crate::wire::WireType;
use prost::Message;
use prost_types::{FileDescriptorProto, FileDescriptorSet};
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use tracing::{debug, trace};

/// Scalar field types known to the wire format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    /// `double`
    Double,
    /// `float`
    Float,
    /// `int32`
    Int32,
    /// `int64`
    Int64,
    /// `uint32`
    Uint32,
    /// `uint64`
    Uint64,
    /// `sint32`
    Sint32,
    /// `sint64`
    Sint64,
    /// `fixed32`
    Fixed32,
    /// `fixed64`
    Fixed64,
    /// `sfixed32`
    Sfixed32,
    /// `sfixed64`
    Sfixed64,
    /// `bool`
    Bool,
    /// `string`
    String,
    /// `bytes`
    Bytes,
}

impl Primitive {
    /// Resolves a schema type keyword
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Some(match keyword {
            "double" => Self::Double,
            "float" => Self::Float,
            "int32" => Self::Int32,
            "int64" => Self::Int64,
            "uint32" => Self::Uint32,
            "uint64" => Self::Uint64,
            "sint32" => Self::Sint32,
            "sint64" => Self::Sint64,
            "fixed32" => Self::Fixed32,
            "fixed64" => Self::Fixed64,
            "sfixed32" => Self::Sfixed32,
            "sfixed64" => Self::Sfixed64,
            "bool" => Self::Bool,
            "string" => Self::String,
            "bytes" => Self::Bytes,
            _ => return None,
        })
    }

    /// The schema keyword for this type
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Double => "double",
            Self::Float => "float",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Uint32 => "uint32",
            Self::Uint64 => "uint64",
            Self::Sint32 => "sint32",
            Self::Sint64 => "sint64",
            Self::Fixed32 => "fixed32",
            Self::Fixed64 => "fixed64",
            Self::Sfixed32 => "sfixed32",
            Self::Sfixed64 => "sfixed64",
            Self::Bool => "bool",
            Self::String => "string",
            Self::Bytes => "bytes",
        }
    }

    /// Wire type a single value of this type is encoded with
    pub fn wire_type(&self) -> WireType {
        match self {
            Self::Double | Self::Fixed64 | Self::Sfixed64 => WireType::Fixed64,
            Self::Float | Self::Fixed32 | Self::Sfixed32 => WireType::Fixed32,
            Self::String | Self::Bytes => WireType::LengthDelimited,
            _ => WireType::Varint,
        }
    }

    /// Whether repeated values of this type may use packed encoding
    pub fn is_packable(&self) -> bool {
        !matches!(self, Self::String | Self::Bytes)
    }
}

/// Declared type of a field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    /// A scalar keyword
    Primitive(Primitive),
    /// A reference to a message or enum, resolved at decode time
    Named(String),
}

impl FieldType {
    /// Classifies a type name as written in a schema
    pub fn parse(name: &str) -> Self {
        Primitive::from_keyword(name)
            .map(Self::Primitive)
            .unwrap_or_else(|| Self::Named(name.to_string()))
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primitive(p) => f.write_str(p.keyword()),
            Self::Named(name) => f.write_str(name),
        }
    }
}

/// A plain (scalar, enum or message) field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Field name
    pub name: String,
    /// Declared type
    pub ty: FieldType,
    /// Tag number
    pub number: u32,
    /// Whether the field is `repeated`
    pub repeated: bool,
}

impl Field {
    /// Creates a singular field
    pub fn new(name: impl Into<String>, ty: FieldType, number: u32) -> Self {
        Self {
            name: name.into(),
            ty,
            number,
            repeated: false,
        }
    }

    /// Marks the field as `repeated`
    pub fn repeated(mut self) -> Self {
        self.repeated = true;
        self
    }
}

/// A `map<K, V>` field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapField {
    /// Field name
    pub name: String,
    /// Key type
    pub key: FieldType,
    /// Value type
    pub value: FieldType,
    /// Tag number
    pub number: u32,
}

/// A `oneof` group; each member carries its own tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneOf {
    /// Oneof name
    pub name: String,
    /// Member alternatives
    pub members: Vec<Field>,
}

/// A field definition inside a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldDef {
    /// Scalar, enum or message field
    Normal(Field),
    /// Map field
    Map(MapField),
    /// Oneof group
    OneOf(OneOf),
}

impl FieldDef {
    /// Field (or oneof) name
    pub fn name(&self) -> &str {
        match self {
            Self::Normal(f) => &f.name,
            Self::Map(m) => &m.name,
            Self::OneOf(o) => &o.name,
        }
    }

    /// Whether a wire tag with this field number belongs to this definition
    pub fn matches(&self, number: u64) -> bool {
        match self {
            Self::Normal(f) => u64::from(f.number) == number,
            Self::Map(m) => u64::from(m.number) == number,
            Self::OneOf(o) => o.members.iter().any(|m| u64::from(m.number) == number),
        }
    }
}

/// A message definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDef {
    /// Declaring package (may be empty)
    pub package: String,
    /// Name relative to the package; nested messages use `Outer.Inner`
    pub name: String,
    /// Fields in declaration order
    pub fields: Vec<FieldDef>,
    /// True for synthesized map-entry messages
    pub map_entry: bool,
}

impl MessageDef {
    /// Creates an empty message definition
    pub fn new(package: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            name: name.into(),
            fields: Vec::new(),
            map_entry: false,
        }
    }

    /// Appends a field definition
    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// `package.name`, or just `name` without a package
    pub fn full_name(&self) -> String {
        qualify(&self.package, &self.name)
    }

    /// First field whose tag matches `number`
    pub fn field_for(&self, number: u64) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.matches(number))
    }

    /// Name of the entry message synthesized for `map` in this message
    pub fn entry_name(&self, map: &MapField) -> String {
        format!("{}.{}.Entry", self.name, map.name)
    }

    /// Builds the two-field entry message backing `map`
    pub fn map_entry_for(&self, map: &MapField) -> MessageDef {
        let mut entry = MessageDef::new(self.package.clone(), self.entry_name(map))
            .with_field(FieldDef::Normal(Field::new("key", map.key.clone(), 1)))
            .with_field(FieldDef::Normal(Field::new("value", map.value.clone(), 2)));
        entry.map_entry = true;
        entry
    }
}

/// An enum definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDef {
    /// Declaring package (may be empty)
    pub package: String,
    /// Name relative to the package
    pub name: String,
    /// Members in declaration order
    pub values: Vec<(String, i32)>,
}

impl EnumDef {
    /// `package.name`, or just `name` without a package
    pub fn full_name(&self) -> String {
        qualify(&self.package, &self.name)
    }

    /// Name of the first declared member with this number (aliases lose)
    pub fn name_of(&self, number: i32) -> Option<&str> {
        self.values
            .iter()
            .find(|(_, n)| *n == number)
            .map(|(name, _)| name.as_str())
    }
}

/// A resolved type reference
#[derive(Debug, Clone, Copy)]
pub enum TypeDef<'a> {
    /// Reference to a message
    Message(&'a MessageDef),
    /// Reference to an enum
    Enum(&'a EnumDef),
}

/// Joins a package (or scope) and a name with a dot, skipping empty parts
pub fn qualify(package: &str, name: &str) -> String {
    if package.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", package, name)
    }
}

/// All known messages and enums, keyed by qualified name
#[derive(Debug, Clone, Default)]
pub struct SchemaStore {
    messages: HashMap<String, MessageDef>,
    enums: HashMap<String, EnumDef>,
    sources: HashSet<String>,
    packages: HashMap<String, String>,
}

impl SchemaStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `.proto` source text and indexes its definitions.
    ///
    /// Reading the same identifier twice is a no-op, whatever the text.
    pub fn read_source(&mut self, identifier: &str, text: &str) -> Result<()> {
        if self.sources.contains(identifier) {
            trace!("Schema source '{}' already read", identifier);
            return Ok(());
        }
        let file = load::parse_source(identifier, text)?;
        self.read_descriptor(identifier, &file);
        Ok(())
    }

    /// Reads a `.proto` file; the path is its identifier
    pub fn read_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let identifier = path.to_string_lossy();
        if self.sources.contains(identifier.as_ref()) {
            return Ok(());
        }
        let text = std::fs::read_to_string(path).map_err(|e| Error::file_read(path, e))?;
        self.read_source(&identifier, &text)
    }

    /// Indexes an already-parsed file descriptor
    pub fn read_descriptor(&mut self, identifier: &str, file: &FileDescriptorProto) {
        if !self.sources.insert(identifier.to_string()) {
            return;
        }

        let lowered = load::lower_file(file);
        debug!(
            "Read '{}': package '{}', {} messages, {} enums",
            identifier,
            lowered.package,
            lowered.messages.len(),
            lowered.enums.len()
        );

        self.packages
            .insert(identifier.to_string(), lowered.package.clone());
        for message in lowered.messages {
            self.messages.insert(message.full_name(), message);
        }
        for enum_def in lowered.enums {
            self.enums.insert(enum_def.full_name(), enum_def);
        }
        for entry in lowered.entries {
            self.register_message(entry);
        }
    }

    /// Decodes a compiled `FileDescriptorSet` and indexes every file in it
    pub fn read_descriptor_set(&mut self, identifier: &str, data: &[u8]) -> Result<()> {
        if self.sources.contains(identifier) {
            return Ok(());
        }
        let set = FileDescriptorSet::decode(data)?;
        for file in &set.file {
            self.read_descriptor(&format!("{}:{}", identifier, file.name()), file);
        }
        self.sources.insert(identifier.to_string());
        Ok(())
    }

    /// Whether a source identifier has been read
    pub fn has_source(&self, identifier: &str) -> bool {
        self.sources.contains(identifier)
    }

    /// Package declared by a source
    pub fn package_of(&self, identifier: &str) -> Option<&str> {
        self.packages.get(identifier).map(String::as_str)
    }

    /// Exact lookup of a message
    pub fn lookup_message(&self, package: &str, name: &str) -> Option<&MessageDef> {
        self.messages.get(&qualify(package, name))
    }

    /// Exact lookup of an enum
    pub fn lookup_enum(&self, package: &str, name: &str) -> Option<&EnumDef> {
        self.enums.get(&qualify(package, name))
    }

    /// Inserts a message, replacing any definition with the same qualified name
    pub fn insert_message(&mut self, message: MessageDef) {
        self.messages.insert(message.full_name(), message);
    }

    /// Inserts an enum, replacing any definition with the same qualified name
    pub fn insert_enum(&mut self, enum_def: EnumDef) {
        self.enums.insert(enum_def.full_name(), enum_def);
    }

    /// Inserts a message only if its qualified name is free.
    ///
    /// Returns whether the message was inserted.
    pub fn register_message(&mut self, message: MessageDef) -> bool {
        let key = message.full_name();
        if self.messages.contains_key(&key) {
            trace!("Message '{}' already registered", key);
            return false;
        }
        self.messages.insert(key, message);
        true
    }

    /// Messages declared in `package`, sorted by name, map entries excluded
    pub fn messages_in_package(&self, package: &str) -> Vec<&MessageDef> {
        let mut list: Vec<_> = self
            .messages
            .values()
            .filter(|m| m.package == package && !m.map_entry)
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list
    }

    /// Number of indexed messages
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Number of indexed enums
    pub fn enum_count(&self) -> usize {
        self.enums.len()
    }

    /// Resolves a type reference made from inside `scope`.
    ///
    /// A leading `.` means fully qualified. Otherwise the name is tried in
    /// the innermost enclosing scope first, then outward through enclosing
    /// messages and package components, then as written. At each candidate
    /// a message wins over an enum.
    pub fn resolve(&self, scope: &MessageDef, type_name: &str) -> Option<TypeDef<'_>> {
        if let Some(absolute) = type_name.strip_prefix('.') {
            return self.lookup_qualified(absolute);
        }

        let full_scope = scope.full_name();
        let mut prefix = full_scope.as_str();
        loop {
            if let Some(found) = self.lookup_qualified(&qualify(prefix, type_name)) {
                return Some(found);
            }
            if prefix.is_empty() {
                return None;
            }
            prefix = prefix.rsplit_once('.').map_or("", |(head, _)| head);
        }
    }

    fn lookup_qualified(&self, name: &str) -> Option<TypeDef<'_>> {
        if let Some(message) = self.messages.get(name) {
            return Some(TypeDef::Message(message));
        }
        self.enums.get(name).map(TypeDef::Enum)
    }

    /// Entry message for a map field of `owner`.
    ///
    /// Uses the registered entry when there is one and synthesizes a
    /// transient definition otherwise; the store itself is never modified.
    pub fn map_entry(&self, owner: &MessageDef, map: &MapField) -> Cow<'_, MessageDef> {
        match self.lookup_message(&owner.package, &owner.entry_name(map)) {
            Some(entry) => Cow::Borrowed(entry),
            None => Cow::Owned(owner.map_entry_for(map)),
        }
    }
}
