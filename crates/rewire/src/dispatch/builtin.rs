// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Built-in codecs: primitive/string/bytes/list/map bodies, the field-level
//! encoders the object strategy drives, and the skip routines that keep the
//! cursor aligned over unmatched remote fields.
//!
//! Skipping an object-typed or `any` field is a full decode-and-discard:
//! the value may own reference ids that later backreferences point at, so
//! the reference table must advance exactly as it did on the encode side.

use super::{read_value, write_value, write_value_opts, ReadContext, WriteContext};
use crate::buffer::Buffer;
use crate::config::{NOT_NULL_FLAG, NULL_FLAG};
use crate::error::{Error, Result};
use crate::types::{
    FieldDescriptor, TypeDescriptor, TypeKind, WireType, TAG_BOOL, TAG_BYTES, TAG_F32,
    TAG_F64, TAG_I16, TAG_I32, TAG_I64, TAG_I8, TAG_LIST, TAG_MAP, TAG_STRING, UNREGISTERED,
};
use crate::value::{EnumValue, Value};
use std::sync::Arc;

/// Upper bound on speculative pre-allocation from wire-supplied counts.
const PREALLOC_LIMIT: usize = 4096;

fn mismatch(expected: impl std::fmt::Display, got: &Value) -> Error {
    Error::ValueMismatch {
        expected: expected.to_string(),
        got: got.kind_name().to_string(),
    }
}

// =======================================================================
// Built-in root values (scalars and untyped containers)
// =======================================================================

/// Token + body for a value of a built-in kind (root or `any` positions).
pub(crate) fn write_builtin(buf: &mut Buffer, value: &Value, ctx: &mut WriteContext<'_>) -> Result<()> {
    match value {
        Value::Bool(v) => {
            buf.write_varuint32(u32::from(TAG_BOOL));
            buf.write_u8(u8::from(*v));
        }
        Value::I8(v) => {
            buf.write_varuint32(u32::from(TAG_I8));
            buf.write_i8(*v);
        }
        Value::I16(v) => {
            buf.write_varuint32(u32::from(TAG_I16));
            buf.write_i16(*v);
        }
        Value::I32(v) => {
            buf.write_varuint32(u32::from(TAG_I32));
            buf.write_varint32(*v);
        }
        Value::I64(v) => {
            buf.write_varuint32(u32::from(TAG_I64));
            buf.write_varint64(*v);
        }
        Value::F32(v) => {
            buf.write_varuint32(u32::from(TAG_F32));
            buf.write_f32(*v);
        }
        Value::F64(v) => {
            buf.write_varuint32(u32::from(TAG_F64));
            buf.write_f64(*v);
        }
        Value::String(s) => {
            buf.write_varuint32(u32::from(TAG_STRING));
            buf.write_varuint32(s.len() as u32);
            buf.write_bytes(s.as_bytes());
        }
        Value::Bytes(b) => {
            buf.write_varuint32(u32::from(TAG_BYTES));
            buf.write_varuint32(b.len() as u32);
            buf.write_bytes(b);
        }
        Value::List(items) => {
            buf.write_varuint32(u32::from(TAG_LIST));
            buf.write_varuint32(items.len() as u32);
            for item in items {
                write_value(buf, item, ctx)?;
            }
        }
        Value::Map(pairs) => {
            buf.write_varuint32(u32::from(TAG_MAP));
            buf.write_varuint32(pairs.len() as u32);
            for (key, val) in pairs {
                write_value(buf, key, ctx)?;
                write_value(buf, val, ctx)?;
            }
        }
        Value::Null | Value::Enum(_) | Value::Object(_) => {
            return Err(mismatch("built-in value", value));
        }
    }
    Ok(())
}

pub(crate) fn read_builtin_body(
    buf: &mut Buffer,
    token: u32,
    ctx: &mut ReadContext<'_>,
) -> Result<Value> {
    let tag = token as u8;
    Ok(match tag {
        TAG_BOOL => Value::Bool(buf.read_u8()? != 0),
        TAG_I8 => Value::I8(buf.read_i8()?),
        TAG_I16 => Value::I16(buf.read_i16()?),
        TAG_I32 => Value::I32(buf.read_varint32()?),
        TAG_I64 => Value::I64(buf.read_varint64()?),
        TAG_F32 => Value::F32(buf.read_f32()?),
        TAG_F64 => Value::F64(buf.read_f64()?),
        TAG_STRING => Value::String(read_string(buf)?),
        TAG_BYTES => {
            let len = buf.read_varuint32()? as usize;
            Value::Bytes(buf.read_bytes(len)?.to_vec())
        }
        TAG_LIST => {
            let count = buf.read_varuint32()? as usize;
            let mut items = Vec::with_capacity(count.min(PREALLOC_LIMIT));
            for _ in 0..count {
                items.push(read_value(buf, ctx)?);
            }
            Value::List(items)
        }
        TAG_MAP => {
            let count = buf.read_varuint32()? as usize;
            let mut pairs = Vec::with_capacity(count.min(PREALLOC_LIMIT));
            for _ in 0..count {
                let key = read_value(buf, ctx)?;
                let val = read_value(buf, ctx)?;
                pairs.push((key, val));
            }
            Value::Map(pairs)
        }
        other => {
            return Err(Error::InvalidData(format!(
                "unexpected built-in token {}",
                other
            )))
        }
    })
}

fn read_string(buf: &mut Buffer) -> Result<String> {
    let len = buf.read_varuint32()? as usize;
    let bytes = buf.read_bytes(len)?;
    String::from_utf8(bytes.to_vec())
        .map_err(|_| Error::InvalidData("string is not valid UTF-8".into()))
}

// =======================================================================
// Fields
// =======================================================================

/// Encode one field slot per its declared descriptor.
pub(crate) fn write_field(
    buf: &mut Buffer,
    field: &FieldDescriptor,
    value: &Value,
    ctx: &mut WriteContext<'_>,
) -> Result<()> {
    if field.wire_type.is_polymorphic() {
        // The value form carries its own null/ref flag.
        return write_value_opts(buf, value, ctx, field.track_ref);
    }
    if field.nullable {
        if value.is_null() {
            buf.write_i8(NULL_FLAG);
            return Ok(());
        }
        buf.write_i8(NOT_NULL_FLAG);
    } else if value.is_null() {
        return Err(mismatch(&field.wire_type, value));
    }
    write_plain_body(buf, &field.wire_type, value, ctx)
}

/// Decode one field per the (possibly remote) declaration that produced the
/// bytes.
pub(crate) fn read_field(
    buf: &mut Buffer,
    field: &FieldDescriptor,
    ctx: &mut ReadContext<'_>,
) -> Result<Value> {
    if field.wire_type.is_polymorphic() {
        return read_value(buf, ctx);
    }
    if field.nullable {
        match buf.read_i8()? {
            NULL_FLAG => return Ok(Value::Null),
            NOT_NULL_FLAG => {}
            other => {
                return Err(Error::InvalidData(format!(
                    "unexpected flag {} ahead of nullable field",
                    other
                )))
            }
        }
    }
    read_plain_body(buf, &field.wire_type, ctx)
}

/// Consume one unmatched remote field, discarding the value. Polymorphic
/// fields decode fully so reference ids stay aligned; everything else skips
/// by declared width.
pub(crate) fn skip_field(
    buf: &mut Buffer,
    field: &FieldDescriptor,
    ctx: &mut ReadContext<'_>,
) -> Result<()> {
    if field.wire_type.is_polymorphic() {
        return read_value(buf, ctx).map(|_| ());
    }
    if field.nullable {
        match buf.read_i8()? {
            NULL_FLAG => return Ok(()),
            NOT_NULL_FLAG => {}
            other => {
                return Err(Error::InvalidData(format!(
                    "unexpected flag {} ahead of skipped field",
                    other
                )))
            }
        }
    }
    skip_plain_body(buf, &field.wire_type, ctx)
}

// =======================================================================
// Plain bodies (non-polymorphic declared types)
// =======================================================================

fn write_plain_body(
    buf: &mut Buffer,
    wire_type: &WireType,
    value: &Value,
    ctx: &mut WriteContext<'_>,
) -> Result<()> {
    match (wire_type, value) {
        (WireType::Bool, Value::Bool(v)) => buf.write_u8(u8::from(*v)),
        (WireType::I8, Value::I8(v)) => buf.write_i8(*v),
        (WireType::I16, Value::I16(v)) => buf.write_i16(*v),
        (WireType::I32, Value::I32(v)) => buf.write_varint32(*v),
        (WireType::I64, Value::I64(v)) => buf.write_varint64(*v),
        (WireType::F32, Value::F32(v)) => buf.write_f32(*v),
        (WireType::F64, Value::F64(v)) => buf.write_f64(*v),
        (WireType::String, Value::String(s)) => {
            buf.write_varuint32(s.len() as u32);
            buf.write_bytes(s.as_bytes());
        }
        (WireType::Bytes, Value::Bytes(b)) => {
            buf.write_varuint32(b.len() as u32);
            buf.write_bytes(b);
        }
        (WireType::List(elem), Value::List(items)) => {
            buf.write_varuint32(items.len() as u32);
            for item in items {
                write_element(buf, elem, item, ctx)?;
            }
        }
        (WireType::Map(key_type, val_type), Value::Map(pairs)) => {
            buf.write_varuint32(pairs.len() as u32);
            for (key, val) in pairs {
                write_element(buf, key_type, key, ctx)?;
                write_element(buf, val_type, val, ctx)?;
            }
        }
        (WireType::Enum(_), Value::Enum(ev)) => buf.write_varuint32(ev.ordinal),
        (expected, got) => return Err(mismatch(expected, got)),
    }
    Ok(())
}

fn read_plain_body(
    buf: &mut Buffer,
    wire_type: &WireType,
    ctx: &mut ReadContext<'_>,
) -> Result<Value> {
    Ok(match wire_type {
        WireType::Bool => Value::Bool(buf.read_u8()? != 0),
        WireType::I8 => Value::I8(buf.read_i8()?),
        WireType::I16 => Value::I16(buf.read_i16()?),
        WireType::I32 => Value::I32(buf.read_varint32()?),
        WireType::I64 => Value::I64(buf.read_varint64()?),
        WireType::F32 => Value::F32(buf.read_f32()?),
        WireType::F64 => Value::F64(buf.read_f64()?),
        WireType::String => Value::String(read_string(buf)?),
        WireType::Bytes => {
            let len = buf.read_varuint32()? as usize;
            Value::Bytes(buf.read_bytes(len)?.to_vec())
        }
        WireType::List(elem) => {
            let count = buf.read_varuint32()? as usize;
            let mut items = Vec::with_capacity(count.min(PREALLOC_LIMIT));
            for _ in 0..count {
                items.push(read_element(buf, elem, ctx)?);
            }
            Value::List(items)
        }
        WireType::Map(key_type, val_type) => {
            let count = buf.read_varuint32()? as usize;
            let mut pairs = Vec::with_capacity(count.min(PREALLOC_LIMIT));
            for _ in 0..count {
                let key = read_element(buf, key_type, ctx)?;
                let val = read_element(buf, val_type, ctx)?;
                pairs.push((key, val));
            }
            Value::Map(pairs)
        }
        WireType::Enum(name) => {
            let ordinal = buf.read_varuint32()?;
            let descriptor = resolve_enum(name, ctx)?;
            Value::Enum(EnumValue {
                descriptor,
                ordinal,
            })
        }
        WireType::Object(_) | WireType::Any => {
            return Err(Error::InvalidData(
                "polymorphic type in plain body position".into(),
            ))
        }
    })
}

fn skip_plain_body(buf: &mut Buffer, wire_type: &WireType, ctx: &mut ReadContext<'_>) -> Result<()> {
    match wire_type {
        WireType::Bool | WireType::I8 => buf.skip(1)?,
        WireType::I16 => buf.skip(2)?,
        WireType::F32 => buf.skip(4)?,
        WireType::F64 => buf.skip(8)?,
        WireType::I32 | WireType::I64 | WireType::Enum(_) => buf.skip_varint()?,
        WireType::String | WireType::Bytes => {
            let len = buf.read_varuint32()? as usize;
            buf.skip(len)?;
        }
        WireType::List(elem) => {
            let count = buf.read_varuint32()? as usize;
            for _ in 0..count {
                skip_element(buf, elem, ctx)?;
            }
        }
        WireType::Map(key_type, val_type) => {
            let count = buf.read_varuint32()? as usize;
            for _ in 0..count {
                skip_element(buf, key_type, ctx)?;
                skip_element(buf, val_type, ctx)?;
            }
        }
        WireType::Object(_) | WireType::Any => {
            read_value(buf, ctx)?;
        }
    }
    Ok(())
}

// =======================================================================
// Collection elements (non-nullable field semantics)
// =======================================================================

fn write_element(
    buf: &mut Buffer,
    elem_type: &WireType,
    value: &Value,
    ctx: &mut WriteContext<'_>,
) -> Result<()> {
    if elem_type.is_polymorphic() {
        return write_value(buf, value, ctx);
    }
    if value.is_null() {
        return Err(mismatch(elem_type, value));
    }
    write_plain_body(buf, elem_type, value, ctx)
}

fn read_element(buf: &mut Buffer, elem_type: &WireType, ctx: &mut ReadContext<'_>) -> Result<Value> {
    if elem_type.is_polymorphic() {
        return read_value(buf, ctx);
    }
    read_plain_body(buf, elem_type, ctx)
}

fn skip_element(buf: &mut Buffer, elem_type: &WireType, ctx: &mut ReadContext<'_>) -> Result<()> {
    if elem_type.is_polymorphic() {
        return read_value(buf, ctx).map(|_| ());
    }
    skip_plain_body(buf, elem_type, ctx)
}

/// Resolve an enum descriptor by declared name; unknown names synthesize a
/// variantless placeholder unless strict registration forbids decode.
fn resolve_enum(name: &Arc<str>, ctx: &mut ReadContext<'_>) -> Result<Arc<TypeDescriptor>> {
    match ctx.shared.registry.lookup(name)? {
        Some(found) if matches!(found.kind, TypeKind::Enum(_)) => Ok(found),
        Some(found) => Err(Error::InvalidData(format!(
            "{} is declared as an enum but registered otherwise",
            found.qualified_name
        ))),
        None => {
            if ctx.shared.config.strict_registration {
                return Err(Error::ClassUnregistered(name.to_string()));
            }
            Ok(Arc::new(TypeDescriptor {
                type_id: UNREGISTERED,
                qualified_name: name.clone(),
                kind: TypeKind::Enum(Vec::new()),
            }))
        }
    }
}
