// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Schema-driven object strategy and its flat fast path.
//!
//! The generic strategy walks the live ClassDef field list; decode allocates
//! the node and registers it *before* recursing into fields, so cyclic
//! backedges land on the instance under construction. In compatible mode
//! the active field-alignment plan (remote wire order) governs the walk.
//!
//! The flat strategy is a precomputed per-field op list for object types
//! whose fields are all non-nullable fixed-layout primitives. It produces
//! byte-identical output and is swapped in by the dispatcher after a use
//! threshold; when a non-exact alignment plan is active it delegates back
//! to the generic path.

use super::builtin::{read_field, skip_field, write_field};
use super::{ReadContext, Strategy, WriteContext};
use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::schema::compat::FieldOp;
use crate::schema::ClassDef;
use crate::types::{TypeDescriptor, TypeKind, WireType};
use crate::value::{EnumValue, ObjectValue, Value};
use std::sync::Arc;

fn expect_object<'v>(value: &'v Value) -> Result<&'v crate::value::ObjectRef> {
    value.as_object().ok_or_else(|| Error::ValueMismatch {
        expected: "object".into(),
        got: value.kind_name().to_string(),
    })
}

/// Generic schema-driven strategy: one per object type, built from the live
/// ClassDef.
pub struct ObjectStrategy {
    descriptor: Arc<TypeDescriptor>,
    def: Arc<ClassDef>,
}

impl ObjectStrategy {
    pub fn new(descriptor: Arc<TypeDescriptor>, def: Arc<ClassDef>) -> Self {
        Self { descriptor, def }
    }
}

impl Strategy for ObjectStrategy {
    fn write(&self, buf: &mut Buffer, value: &Value, ctx: &mut WriteContext<'_>) -> Result<()> {
        let obj = expect_object(value)?;
        let node = obj.borrow();
        if node.fields().len() != self.def.fields.len() {
            return Err(Error::ValueMismatch {
                expected: format!("{} with {} fields", self.def.type_name, self.def.fields.len()),
                got: format!("{} fields", node.fields().len()),
            });
        }
        for field in &self.def.fields {
            write_field(buf, field, node.slot(field.ordinal as usize), ctx)?;
        }
        Ok(())
    }

    fn read(&self, buf: &mut Buffer, ctx: &mut ReadContext<'_>) -> Result<Value> {
        let node = ObjectValue::new(&self.descriptor);
        ctx.adopt(&node);

        match ctx.active_plan.clone() {
            Some(plan) => {
                for op in &plan.ops {
                    match op {
                        FieldOp::Read {
                            local_ordinal,
                            remote,
                        } => {
                            let mut value = read_field(buf, remote, ctx)?;
                            let local_field = &self.def.fields[*local_ordinal as usize];
                            if value.is_null() && !local_field.nullable {
                                value = crate::value::default_for(&local_field.wire_type);
                            }
                            node.borrow_mut().set_slot(*local_ordinal as usize, value);
                        }
                        FieldOp::Skip { remote } => skip_field(buf, remote, ctx)?,
                        // Slots start at their defaults; nothing to do.
                        FieldOp::Default { .. } => {}
                    }
                }
            }
            None => {
                // Strict mode: shapes were fingerprint-checked, walk the
                // local field list directly.
                for field in &self.def.fields {
                    let value = read_field(buf, field, ctx)?;
                    node.borrow_mut().set_slot(field.ordinal as usize, value);
                }
            }
        }
        Ok(Value::Object(node))
    }
}

/// Eligibility for the flat fast path: every field a non-nullable primitive.
pub fn flat_eligible(descriptor: &TypeDescriptor) -> bool {
    match &descriptor.kind {
        TypeKind::Object(fields) => fields
            .iter()
            .all(|f| f.wire_type.is_primitive() && !f.nullable),
        _ => false,
    }
}

enum FlatOp {
    Bool,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

/// Precomputed field loop for all-primitive object types. Byte output is
/// identical to the generic strategy.
pub struct FlatObjectStrategy {
    generic: ObjectStrategy,
    ops: Vec<FlatOp>,
}

impl FlatObjectStrategy {
    pub fn new(descriptor: Arc<TypeDescriptor>, def: Arc<ClassDef>) -> Self {
        let ops = def
            .fields
            .iter()
            .map(|f| match f.wire_type {
                WireType::Bool => FlatOp::Bool,
                WireType::I8 => FlatOp::I8,
                WireType::I16 => FlatOp::I16,
                WireType::I32 => FlatOp::I32,
                WireType::I64 => FlatOp::I64,
                WireType::F32 => FlatOp::F32,
                // Eligibility guarantees a primitive; F64 is the remainder.
                _ => FlatOp::F64,
            })
            .collect();
        Self {
            generic: ObjectStrategy::new(descriptor, def),
            ops,
        }
    }
}

impl Strategy for FlatObjectStrategy {
    fn write(&self, buf: &mut Buffer, value: &Value, ctx: &mut WriteContext<'_>) -> Result<()> {
        let obj = expect_object(value)?;
        let node = obj.borrow();
        if node.fields().len() != self.ops.len() {
            return self.generic.write(buf, value, ctx);
        }
        for (op, slot) in self.ops.iter().zip(node.fields()) {
            match (op, slot) {
                (FlatOp::Bool, Value::Bool(v)) => buf.write_u8(u8::from(*v)),
                (FlatOp::I8, Value::I8(v)) => buf.write_i8(*v),
                (FlatOp::I16, Value::I16(v)) => buf.write_i16(*v),
                (FlatOp::I32, Value::I32(v)) => buf.write_varint32(*v),
                (FlatOp::I64, Value::I64(v)) => buf.write_varint64(*v),
                (FlatOp::F32, Value::F32(v)) => buf.write_f32(*v),
                (FlatOp::F64, Value::F64(v)) => buf.write_f64(*v),
                (_, got) => {
                    return Err(Error::ValueMismatch {
                        expected: "primitive field".into(),
                        got: got.kind_name().to_string(),
                    })
                }
            }
        }
        Ok(())
    }

    fn read(&self, buf: &mut Buffer, ctx: &mut ReadContext<'_>) -> Result<Value> {
        if let Some(plan) = &ctx.active_plan {
            if !plan.exact {
                // Drifted remote shape: the generic path owns reconciliation.
                return self.generic.read(buf, ctx);
            }
        }
        let node = ObjectValue::new(&self.generic.descriptor);
        ctx.adopt(&node);
        {
            let mut inner = node.borrow_mut();
            for (ordinal, op) in self.ops.iter().enumerate() {
                let value = match op {
                    FlatOp::Bool => Value::Bool(buf.read_u8()? != 0),
                    FlatOp::I8 => Value::I8(buf.read_i8()?),
                    FlatOp::I16 => Value::I16(buf.read_i16()?),
                    FlatOp::I32 => Value::I32(buf.read_varint32()?),
                    FlatOp::I64 => Value::I64(buf.read_varint64()?),
                    FlatOp::F32 => Value::F32(buf.read_f32()?),
                    FlatOp::F64 => Value::F64(buf.read_f64()?),
                };
                inner.set_slot(ordinal, value);
            }
        }
        Ok(Value::Object(node))
    }
}

/// Enum values cross the wire as their ordinal.
pub struct EnumStrategy {
    descriptor: Arc<TypeDescriptor>,
}

impl EnumStrategy {
    pub fn new(descriptor: Arc<TypeDescriptor>) -> Self {
        Self { descriptor }
    }
}

impl Strategy for EnumStrategy {
    fn write(&self, buf: &mut Buffer, value: &Value, _ctx: &mut WriteContext<'_>) -> Result<()> {
        match value {
            Value::Enum(ev) => {
                buf.write_varuint32(ev.ordinal);
                Ok(())
            }
            other => Err(Error::ValueMismatch {
                expected: format!("enum {}", self.descriptor.qualified_name),
                got: other.kind_name().to_string(),
            }),
        }
    }

    fn read(&self, buf: &mut Buffer, _ctx: &mut ReadContext<'_>) -> Result<Value> {
        let ordinal = buf.read_varuint32()?;
        Ok(Value::Enum(EnumValue {
            descriptor: self.descriptor.clone(),
            ordinal,
        }))
    }
}
