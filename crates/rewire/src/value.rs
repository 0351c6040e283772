// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Runtime value model - the host object graph.
//!
//! Rust has no runtime reflection, so the engine serializes a runtime value
//! tree. Scalars and containers are plain variants; object nodes are
//! `Rc<RefCell<_>>` so one instance can appear at several positions of the
//! graph (shared references, cycles). `Rc` pointer identity is what the
//! reference tracker assigns ids to.
//!
//! Equality is structural with a visited-pair set, so cyclic graphs compare
//! by shape instead of overflowing the stack. Floats compare bitwise.

use crate::error::{Error, Result};
use crate::types::{TypeDescriptor, TypeKind, WireType};
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::Arc;

/// Shared handle to an object node. Cloning the handle shares identity.
pub type ObjectRef = Rc<RefCell<ObjectValue>>;

/// A dynamic value the engine can serialize.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    /// Insertion-ordered key/value pairs; order is preserved on the wire so
    /// encoding stays deterministic.
    Map(Vec<(Value, Value)>),
    Enum(EnumValue),
    Object(ObjectRef),
}

/// A value of a registered enum type.
#[derive(Debug, Clone)]
pub struct EnumValue {
    pub descriptor: Arc<TypeDescriptor>,
    pub ordinal: u32,
}

impl EnumValue {
    pub fn new(descriptor: &Arc<TypeDescriptor>, ordinal: u32) -> Self {
        Self {
            descriptor: descriptor.clone(),
            ordinal,
        }
    }

    pub fn variant_name(&self) -> Option<&str> {
        match &self.descriptor.kind {
            TypeKind::Enum(variants) => variants.get(self.ordinal as usize).map(|v| &**v),
            _ => None,
        }
    }
}

/// One object node: its descriptor plus field slots in ordinal order.
pub struct ObjectValue {
    descriptor: Arc<TypeDescriptor>,
    fields: Vec<Value>,
}

impl ObjectValue {
    /// Fresh node with every field at its default value. Extension types
    /// get a single opaque payload slot.
    pub fn new(descriptor: &Arc<TypeDescriptor>) -> ObjectRef {
        let fields = match &descriptor.kind {
            TypeKind::Object(fs) => fs.iter().map(|f| default_for(&f.wire_type)).collect(),
            TypeKind::Ext => vec![Value::Null],
            TypeKind::Enum(_) => Vec::new(),
        };
        Rc::new(RefCell::new(Self {
            descriptor: descriptor.clone(),
            fields,
        }))
    }

    /// Extension-type node with its payload set.
    pub fn with_payload(descriptor: &Arc<TypeDescriptor>, payload: impl Into<Value>) -> ObjectRef {
        let node = Self::new(descriptor);
        node.borrow_mut().fields[0] = payload.into();
        node
    }

    /// Opaque payload of an extension-type node.
    pub fn payload(&self) -> &Value {
        &self.fields[0]
    }

    pub fn set_payload(&mut self, payload: impl Into<Value>) {
        self.fields[0] = payload.into();
    }

    pub fn descriptor(&self) -> &Arc<TypeDescriptor> {
        &self.descriptor
    }

    pub fn type_name(&self) -> &str {
        &self.descriptor.qualified_name
    }

    pub fn fields(&self) -> &[Value] {
        &self.fields
    }

    /// Field value by name (cloned; object handles share identity).
    pub fn get(&self, name: &str) -> Result<Value> {
        let field = self.descriptor.field(name).ok_or_else(|| Error::FieldNotFound {
            type_name: self.type_name().to_string(),
            field: name.to_string(),
        })?;
        Ok(self.fields[field.ordinal as usize].clone())
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let ordinal = self
            .descriptor
            .field(name)
            .map(|f| f.ordinal as usize)
            .ok_or_else(|| Error::FieldNotFound {
                type_name: self.type_name().to_string(),
                field: name.to_string(),
            })?;
        self.fields[ordinal] = value.into();
        Ok(())
    }

    pub fn slot(&self, ordinal: usize) -> &Value {
        &self.fields[ordinal]
    }

    pub fn set_slot(&mut self, ordinal: usize, value: Value) {
        self.fields[ordinal] = value;
    }
}

// Shallow on purpose: object graphs can be cyclic and a derived Debug would
// recurse forever.
impl std::fmt::Debug for ObjectValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ObjectValue {{ type: {}, fields: {} }}",
            self.type_name(),
            self.fields.len()
        )
    }
}

/// Default value for a declared wire type: zero for scalars, empty for
/// containers, null for reference-typed positions.
pub fn default_for(wire_type: &WireType) -> Value {
    match wire_type {
        WireType::Bool => Value::Bool(false),
        WireType::I8 => Value::I8(0),
        WireType::I16 => Value::I16(0),
        WireType::I32 => Value::I32(0),
        WireType::I64 => Value::I64(0),
        WireType::F32 => Value::F32(0.0),
        WireType::F64 => Value::F64(0.0),
        WireType::String => Value::String(String::new()),
        WireType::Bytes => Value::Bytes(Vec::new()),
        WireType::List(_) => Value::List(Vec::new()),
        WireType::Map(_, _) => Value::Map(Vec::new()),
        WireType::Enum(_) | WireType::Object(_) | WireType::Any => Value::Null,
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Variant name for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::I8(_) => "i8",
            Value::I16(_) => "i16",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Enum(_) => "enum",
            Value::Object(_) => "object",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::I32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(v) => Some(v),
            _ => None,
        }
    }

    /// Structural deep equality, cycle-safe.
    pub fn deep_eq(&self, other: &Value) -> bool {
        let mut visited = HashSet::new();
        deep_eq_inner(self, other, &mut visited)
    }
}

fn deep_eq_inner(a: &Value, b: &Value, visited: &mut HashSet<(usize, usize)>) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::I8(x), Value::I8(y)) => x == y,
        (Value::I16(x), Value::I16(y)) => x == y,
        (Value::I32(x), Value::I32(y)) => x == y,
        (Value::I64(x), Value::I64(y)) => x == y,
        (Value::F32(x), Value::F32(y)) => x.to_bits() == y.to_bits(),
        (Value::F64(x), Value::F64(y)) => x.to_bits() == y.to_bits(),
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Bytes(x), Value::Bytes(y)) => x == y,
        (Value::List(x), Value::List(y)) => {
            x.len() == y.len()
                && x.iter().zip(y).all(|(ea, eb)| deep_eq_inner(ea, eb, visited))
        }
        (Value::Map(x), Value::Map(y)) => {
            x.len() == y.len()
                && x.iter().zip(y).all(|((ka, va), (kb, vb))| {
                    deep_eq_inner(ka, kb, visited) && deep_eq_inner(va, vb, visited)
                })
        }
        (Value::Enum(x), Value::Enum(y)) => {
            x.ordinal == y.ordinal
                && x.descriptor.qualified_name == y.descriptor.qualified_name
        }
        (Value::Object(x), Value::Object(y)) => {
            if Rc::ptr_eq(x, y) {
                return true;
            }
            let pair = (Rc::as_ptr(x) as usize, Rc::as_ptr(y) as usize);
            // A revisited pair is equal-so-far; asserting equality here is
            // what makes cyclic graphs compare by shape.
            if !visited.insert(pair) {
                return true;
            }
            let xa = x.borrow();
            let yb = y.borrow();
            xa.type_name() == yb.type_name()
                && xa.fields().len() == yb.fields().len()
                && xa
                    .fields()
                    .iter()
                    .zip(yb.fields())
                    .all(|(fa, fb)| deep_eq_inner(fa, fb, visited))
        }
        _ => false,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.deep_eq(other)
    }
}

// Scalar conversions for ergonomic field assignment.
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}
impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Value::I8(v)
    }
}
impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::I16(v)
    }
}
impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}
impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::F32(v)
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}
impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}
impl From<ObjectRef> for Value {
    fn from(v: ObjectRef) -> Self {
        Value::Object(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point_type() -> Arc<TypeDescriptor> {
        Arc::new(
            TypeDescriptor::object("demo.Point")
                .field("x", WireType::I32)
                .field("y", WireType::I32)
                .build(),
        )
    }

    fn node_type() -> Arc<TypeDescriptor> {
        Arc::new(
            TypeDescriptor::object("demo.Node")
                .field("value", WireType::I64)
                .tracked("next", WireType::Object(Arc::from("demo.Node")))
                .build(),
        )
    }

    #[test]
    fn test_object_defaults() {
        let obj = ObjectValue::new(&point_type());
        let inner = obj.borrow();
        assert_eq!(inner.get("x").expect("x"), Value::I32(0));
        assert_eq!(inner.get("y").expect("y"), Value::I32(0));
    }

    #[test]
    fn test_set_unknown_field_fails() {
        let obj = ObjectValue::new(&point_type());
        let err = obj.borrow_mut().set("z", 1i32).unwrap_err();
        assert!(err.to_string().contains("demo.Point"));
    }

    #[test]
    fn test_deep_eq_by_shape() {
        let a = ObjectValue::new(&point_type());
        a.borrow_mut().set("x", 3i32).expect("set x");
        let b = ObjectValue::new(&point_type());
        b.borrow_mut().set("x", 3i32).expect("set x");
        assert_eq!(Value::Object(a), Value::Object(b));
    }

    #[test]
    fn test_deep_eq_detects_difference() {
        let a = ObjectValue::new(&point_type());
        let b = ObjectValue::new(&point_type());
        b.borrow_mut().set("y", 9i32).expect("set y");
        assert_ne!(Value::Object(a), Value::Object(b));
    }

    #[test]
    fn test_cyclic_graphs_compare_without_overflow() {
        let a = ObjectValue::new(&node_type());
        a.borrow_mut().set("next", a.clone()).expect("self link");
        let b = ObjectValue::new(&node_type());
        b.borrow_mut().set("next", b.clone()).expect("self link");
        assert_eq!(Value::Object(a), Value::Object(b));
    }

    #[test]
    fn test_shared_handle_keeps_identity() {
        let a = ObjectValue::new(&point_type());
        let v = Value::Object(a.clone());
        let w = v.clone();
        match (&v, &w) {
            (Value::Object(x), Value::Object(y)) => assert!(Rc::ptr_eq(x, y)),
            _ => panic!("expected objects"),
        }
    }

    #[test]
    fn test_float_equality_is_bitwise() {
        assert_ne!(Value::F64(0.0), Value::F64(-0.0));
        assert_eq!(Value::F64(f64::NAN), Value::F64(f64::NAN));
    }
}
