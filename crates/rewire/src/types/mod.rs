// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wire type descriptors.
//!
//! A [`TypeDescriptor`] is the immutable wire-side description of a host
//! type: qualified name, kind, and (once registered) a type id. Field lists
//! are built once and cached for the registry entry's lifetime. Identity is
//! the qualified name; the type id is stable for one registry instance.

use std::sync::Arc;

// =======================================================================
// Wire-type tags
// =======================================================================
// Shared between root-value type tokens (built-in kinds) and schema-block
// type expressions. User-registered types get ids >= USER_ID_BASE.

pub const TAG_BOOL: u8 = 0;
pub const TAG_I8: u8 = 1;
pub const TAG_I16: u8 = 2;
pub const TAG_I32: u8 = 3;
pub const TAG_I64: u8 = 4;
pub const TAG_F32: u8 = 5;
pub const TAG_F64: u8 = 6;
pub const TAG_STRING: u8 = 7;
pub const TAG_BYTES: u8 = 8;
pub const TAG_LIST: u8 = 9;
pub const TAG_MAP: u8 = 10;
pub const TAG_ENUM: u8 = 11;
pub const TAG_OBJECT: u8 = 12;
pub const TAG_ANY: u8 = 13;

/// Declared type of a field or collection element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WireType {
    Bool,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    String,
    Bytes,
    List(Box<WireType>),
    Map(Box<WireType>, Box<WireType>),
    /// Registered enum type, by qualified name.
    Enum(Arc<str>),
    /// Registered object type, by qualified name. The concrete runtime type
    /// may be any registered type, so object positions always carry a type
    /// token on the wire.
    Object(Arc<str>),
    /// The value writes its own type token.
    Any,
}

impl WireType {
    pub fn tag(&self) -> u8 {
        match self {
            WireType::Bool => TAG_BOOL,
            WireType::I8 => TAG_I8,
            WireType::I16 => TAG_I16,
            WireType::I32 => TAG_I32,
            WireType::I64 => TAG_I64,
            WireType::F32 => TAG_F32,
            WireType::F64 => TAG_F64,
            WireType::String => TAG_STRING,
            WireType::Bytes => TAG_BYTES,
            WireType::List(_) => TAG_LIST,
            WireType::Map(_, _) => TAG_MAP,
            WireType::Enum(_) => TAG_ENUM,
            WireType::Object(_) => TAG_OBJECT,
            WireType::Any => TAG_ANY,
        }
    }

    /// Fixed-width scalar (bool, integers, floats).
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            WireType::Bool
                | WireType::I8
                | WireType::I16
                | WireType::I32
                | WireType::I64
                | WireType::F32
                | WireType::F64
        )
    }

    /// Positions of this type go through the full value form (reference
    /// flag + type token) instead of a raw body.
    pub fn is_polymorphic(&self) -> bool {
        matches!(self, WireType::Object(_) | WireType::Any)
    }
}

impl std::fmt::Display for WireType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WireType::Bool => write!(f, "bool"),
            WireType::I8 => write!(f, "i8"),
            WireType::I16 => write!(f, "i16"),
            WireType::I32 => write!(f, "i32"),
            WireType::I64 => write!(f, "i64"),
            WireType::F32 => write!(f, "f32"),
            WireType::F64 => write!(f, "f64"),
            WireType::String => write!(f, "string"),
            WireType::Bytes => write!(f, "bytes"),
            WireType::List(elem) => write!(f, "list<{}>", elem),
            WireType::Map(k, v) => write!(f, "map<{}, {}>", k, v),
            WireType::Enum(name) => write!(f, "enum {}", name),
            WireType::Object(name) => write!(f, "object {}", name),
            WireType::Any => write!(f, "any"),
        }
    }
}

/// One field of an object type. Built once per type, cached for the
/// registry entry's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: Arc<str>,
    pub wire_type: WireType,
    /// Nullable fields carry a null/not-null flag byte on the wire.
    pub nullable: bool,
    /// Tracked fields participate in reference-id assignment (shared and
    /// cyclic instances). Only meaningful for object-typed positions.
    pub track_ref: bool,
    /// Position in declaration order; doubles as the slot index of object
    /// values of this type.
    pub ordinal: u16,
}

/// What kind of type a descriptor describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    /// Structured type with a declared field list.
    Object(Vec<FieldDescriptor>),
    /// Closed set of named variants, exchanged by ordinal.
    Enum(Vec<Arc<str>>),
    /// Extension type: opaque to the schema machinery, requires a
    /// user-registered strategy (or a built-in shim).
    Ext,
}

/// Immutable wire-side description of a host type.
///
/// `type_id` is `UNREGISTERED` until the registry assigns one; the
/// registry's canonical copy is the one that carries the live id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub type_id: u32,
    pub qualified_name: Arc<str>,
    pub kind: TypeKind,
}

/// Placeholder id of a descriptor that has not been registered yet.
pub const UNREGISTERED: u32 = 0;

impl TypeDescriptor {
    /// Start building an object type.
    pub fn object(qualified_name: impl Into<Arc<str>>) -> ObjectTypeBuilder {
        ObjectTypeBuilder {
            name: qualified_name.into(),
            fields: Vec::new(),
        }
    }

    /// Enum type from its variant names, in ordinal order.
    pub fn enum_type(
        qualified_name: impl Into<Arc<str>>,
        variants: impl IntoIterator<Item = &'static str>,
    ) -> Self {
        Self {
            type_id: UNREGISTERED,
            qualified_name: qualified_name.into(),
            kind: TypeKind::Enum(variants.into_iter().map(Arc::from).collect()),
        }
    }

    /// Extension type; encoding one requires a registered strategy or shim.
    pub fn ext(qualified_name: impl Into<Arc<str>>) -> Self {
        Self {
            type_id: UNREGISTERED,
            qualified_name: qualified_name.into(),
            kind: TypeKind::Ext,
        }
    }

    pub fn fields(&self) -> Option<&[FieldDescriptor]> {
        match &self.kind {
            TypeKind::Object(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields()?.iter().find(|f| &*f.name == name)
    }

    pub fn is_object(&self) -> bool {
        matches!(self.kind, TypeKind::Object(_))
    }

    /// Same shape: identical name, kind and field list, ignoring the id.
    /// Used for idempotent re-registration checks.
    pub fn same_shape(&self, other: &TypeDescriptor) -> bool {
        self.qualified_name == other.qualified_name && self.kind == other.kind
    }
}

/// Fluent builder for object type descriptors.
pub struct ObjectTypeBuilder {
    name: Arc<str>,
    fields: Vec<FieldDescriptor>,
}

impl ObjectTypeBuilder {
    /// Required field, no flag byte on the wire.
    pub fn field(self, name: impl Into<Arc<str>>, wire_type: WireType) -> Self {
        self.field_with(name, wire_type, false, false)
    }

    /// Nullable field: a null/not-null flag precedes the body.
    pub fn nullable(self, name: impl Into<Arc<str>>, wire_type: WireType) -> Self {
        self.field_with(name, wire_type, true, false)
    }

    /// Nullable, reference-tracked field for shared or cyclic object graphs.
    pub fn tracked(self, name: impl Into<Arc<str>>, wire_type: WireType) -> Self {
        self.field_with(name, wire_type, true, true)
    }

    pub fn field_with(
        mut self,
        name: impl Into<Arc<str>>,
        wire_type: WireType,
        nullable: bool,
        track_ref: bool,
    ) -> Self {
        let ordinal = self.fields.len() as u16;
        self.fields.push(FieldDescriptor {
            name: name.into(),
            wire_type,
            nullable,
            track_ref,
            ordinal,
        });
        self
    }

    pub fn build(self) -> TypeDescriptor {
        TypeDescriptor {
            type_id: UNREGISTERED,
            qualified_name: self.name,
            kind: TypeKind::Object(self.fields),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_assigns_ordinals_in_declaration_order() {
        let desc = TypeDescriptor::object("demo.Point")
            .field("x", WireType::I32)
            .field("y", WireType::I32)
            .nullable("label", WireType::String)
            .build();
        let fields = desc.fields().expect("object fields");
        assert_eq!(fields.len(), 3);
        assert_eq!(&*fields[0].name, "x");
        assert_eq!(fields[2].ordinal, 2);
        assert!(fields[2].nullable);
        assert!(!fields[2].track_ref);
    }

    #[test]
    fn test_same_shape_ignores_type_id() {
        let a = TypeDescriptor::object("demo.P").field("x", WireType::I32).build();
        let mut b = a.clone();
        b.type_id = 77;
        assert!(a.same_shape(&b));
    }

    #[test]
    fn test_different_field_order_is_different_shape() {
        let a = TypeDescriptor::object("demo.P")
            .field("x", WireType::I32)
            .field("y", WireType::I32)
            .build();
        let b = TypeDescriptor::object("demo.P")
            .field("y", WireType::I32)
            .field("x", WireType::I32)
            .build();
        assert!(!a.same_shape(&b));
    }

    #[test]
    fn test_wire_type_display() {
        let t = WireType::Map(Box::new(WireType::String), Box::new(WireType::I64));
        assert_eq!(t.to_string(), "map<string, i64>");
        assert_eq!(WireType::List(Box::new(WireType::F64)).to_string(), "list<f64>");
    }

    #[test]
    fn test_field_lookup() {
        let desc = TypeDescriptor::object("demo.Node")
            .field("value", WireType::I64)
            .tracked("next", WireType::Object(Arc::from("demo.Node")))
            .build();
        let next = desc.field("next").expect("next field");
        assert!(next.track_ref);
        assert!(next.wire_type.is_polymorphic());
        assert!(desc.field("missing").is_none());
    }
}
