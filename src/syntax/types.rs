//! Type descriptions: runtime tags, composite type shapes, aliases and the
//! registry that `typedef` statements populate during parsing.

use std::rc::Rc;

use core::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::syntax::expressions::Expression;

/// Closed set of runtime type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Null,
    Byte,
    Integer,
    Long,
    Float,
    Double,
    String,
    Date,
    Boolean,
    Json,
    Array,
    Record,
    Map,
    Queue,
    Bitmap,
    Intmap,
    Cursor,
    Connection,
    Image,
}

impl DataType {
    pub fn name(self) -> &'static str {
        match self {
            DataType::Null => "null",
            DataType::Byte => "byte",
            DataType::Integer => "integer",
            DataType::Long => "long",
            DataType::Float => "float",
            DataType::Double => "double",
            DataType::String => "string",
            DataType::Date => "date",
            DataType::Boolean => "boolean",
            DataType::Json => "json",
            DataType::Array => "array",
            DataType::Record => "record",
            DataType::Map => "map",
            DataType::Queue => "queue",
            DataType::Bitmap => "bitmap",
            DataType::Intmap => "intmap",
            DataType::Cursor => "cursor",
            DataType::Connection => "connection",
            DataType::Image => "image",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            DataType::Byte
                | DataType::Integer
                | DataType::Long
                | DataType::Float
                | DataType::Double
        )
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One field of a record shape. Nested composites go through `TypeSpec`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordField {
    pub name: String,
    pub ty: TypeSpec,
}

/// Ordered field list of a `record { … }` type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordType {
    pub fields: Vec<RecordField>,
}

impl RecordType {
    pub fn field(&self, name: &str) -> Option<&RecordField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

/// One bit range of a bitmap/intmap type. A width of 1 bit encodes a
/// boolean field, wider ranges encode small unsigned integers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitField {
    pub name: String,
    pub start_bit: u8,
    pub end_bit: u8,
}

impl BitField {
    pub fn width(&self) -> u8 {
        self.end_bit - self.start_bit + 1
    }

    pub fn is_boolean(&self) -> bool {
        self.width() == 1
    }

    pub fn mask(&self) -> u32 {
        let width = self.width() as u32;
        let ones = if width >= 32 { u32::MAX } else { (1u32 << width) - 1 };
        ones << self.start_bit
    }
}

/// Ordered bit-range list of a `bitmap { … }` (backing byte, bits 0–7) or
/// `intmap { … }` (backing 32-bit integer, bits 0–31) type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackedType {
    pub fields: Vec<BitField>,
    /// Highest legal bit index: 7 for bitmap, 31 for intmap.
    pub max_bit: u8,
}

impl PackedType {
    pub fn field(&self, name: &str) -> Option<&BitField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Fields must stay inside the backing width and must not overlap.
    pub fn validate(&self) -> Result<(), String> {
        for f in &self.fields {
            if f.start_bit > f.end_bit {
                return Err(format!("bit field '{}' has an inverted range", f.name));
            }
            if f.end_bit > self.max_bit {
                return Err(format!(
                    "bit field '{}' exceeds bit {}",
                    f.name, self.max_bit
                ));
            }
        }
        for (i, a) in self.fields.iter().enumerate() {
            for b in &self.fields[i + 1..] {
                if a.start_bit <= b.end_bit && b.start_bit <= a.end_bit {
                    return Err(format!(
                        "bit fields '{}' and '{}' overlap",
                        a.name, b.name
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Array dimension: a fixed extent (evaluated when the declaration runs) or
/// the `*` marker for a dynamic, growable dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArrayDim {
    Fixed(Expression),
    Dynamic,
}

/// Parsed type syntax. Aliases stay symbolic until the interpreter resolves
/// them against the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeSpec {
    Data(DataType),
    SortedMap,
    Record(RecordType),
    Bitmap(PackedType),
    Intmap(PackedType),
    Array {
        elem: Box<TypeSpec>,
        dims: Vec<ArrayDim>,
    },
    Queue(Box<TypeSpec>),
    Alias(String),
}

impl TypeSpec {
    /// The runtime tag this spec declares, without resolving aliases.
    pub fn data_type(&self) -> DataType {
        match self {
            TypeSpec::Data(d) => *d,
            TypeSpec::SortedMap => DataType::Map,
            TypeSpec::Record(_) => DataType::Record,
            TypeSpec::Bitmap(_) => DataType::Bitmap,
            TypeSpec::Intmap(_) => DataType::Intmap,
            TypeSpec::Array { .. } => DataType::Array,
            TypeSpec::Queue(_) => DataType::Queue,
            // Alias resolution happens against the registry; callers that
            // can see one resolve first.
            TypeSpec::Alias(_) => DataType::Null,
        }
    }
}

/// A user-introduced name for a composite type, registered by `typedef`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeAlias {
    pub name: String,
    pub spec: TypeSpec,
}

/// Alias table. Writes happen during parsing (`typedef` statements), reads
/// happen both later in the same parse (declarations naming the alias) and
/// at run time (assignment validation, alias casts). Owned by the pipeline,
/// never process-global, so interpreters stay isolated.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    aliases: IndexMap<String, Rc<TypeAlias>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace an alias. Re-registering is how imported files
    /// and screen redeclarations refresh a name.
    pub fn register(&mut self, alias: TypeAlias) -> Rc<TypeAlias> {
        let alias = Rc::new(alias);
        self.aliases.insert(alias.name.clone(), Rc::clone(&alias));
        alias
    }

    pub fn get(&self, name: &str) -> Option<Rc<TypeAlias>> {
        self.aliases.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.aliases.contains_key(name)
    }

    /// Chase alias indirection down to a concrete spec.
    pub fn resolve<'a>(&self, spec: &'a TypeSpec) -> Option<TypeSpec> {
        let mut current: TypeSpec = spec.clone();
        let mut hops = 0;
        while let TypeSpec::Alias(name) = &current {
            let next = self.get(name)?;
            current = next.spec.clone();
            hops += 1;
            if hops > 32 {
                return None;
            }
        }
        Some(current)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.aliases.keys().map(String::as_str)
    }

    /// Absorb another registry's aliases (imports, program load).
    pub fn merge(&mut self, other: &TypeRegistry) {
        for (name, alias) in &other.aliases {
            self.aliases.insert(name.clone(), Rc::clone(alias));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packed(fields: &[(&str, u8, u8)], max_bit: u8) -> PackedType {
        PackedType {
            fields: fields
                .iter()
                .map(|(n, s, e)| BitField {
                    name: (*n).to_string(),
                    start_bit: *s,
                    end_bit: *e,
                })
                .collect(),
            max_bit,
        }
    }

    #[test]
    fn packed_fields_reject_overlap() {
        assert!(packed(&[("ready", 0, 0), ("prio", 1, 3)], 7).validate().is_ok());
        assert!(packed(&[("a", 0, 2), ("b", 2, 4)], 7).validate().is_err());
        assert!(packed(&[("a", 0, 8)], 7).validate().is_err());
        assert!(packed(&[("a", 0, 31)], 31).validate().is_ok());
    }

    #[test]
    fn bitfield_masks() {
        let f = BitField {
            name: "prio".into(),
            start_bit: 1,
            end_bit: 3,
        };
        assert_eq!(f.width(), 3);
        assert_eq!(f.mask(), 0b0000_1110);
        assert!(!f.is_boolean());
    }

    #[test]
    fn registry_resolves_alias_chains() {
        let mut reg = TypeRegistry::new();
        reg.register(TypeAlias {
            name: "small".into(),
            spec: TypeSpec::Data(DataType::Byte),
        });
        reg.register(TypeAlias {
            name: "tiny".into(),
            spec: TypeSpec::Alias("small".into()),
        });
        let resolved = reg.resolve(&TypeSpec::Alias("tiny".into())).unwrap();
        assert_eq!(resolved, TypeSpec::Data(DataType::Byte));
    }
}
