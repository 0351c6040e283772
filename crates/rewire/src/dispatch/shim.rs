// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Built-in shims: narrow strategies for well-known cross-language scalar
//! types the generic schema path cannot express compactly. Shims activate
//! when an extension type is registered under a shimmed qualified name;
//! the dispatch rule table consults this table after user strategies and
//! before the built-in kinds.

use super::{ReadContext, Strategy, WriteContext};
use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::types::TypeDescriptor;
use crate::value::{ObjectValue, Value};
use std::sync::Arc;

/// Qualified names with built-in handling.
pub const SHIM_UUID: &str = "rewire.uuid";
pub const SHIM_TIMESTAMP: &str = "rewire.timestamp";

/// Shim lookup, keyed by qualified name.
pub(crate) fn shim_for(descriptor: &Arc<TypeDescriptor>) -> Option<Box<dyn Strategy>> {
    match &*descriptor.qualified_name {
        SHIM_UUID => Some(Box::new(UuidShim {
            descriptor: descriptor.clone(),
        })),
        SHIM_TIMESTAMP => Some(Box::new(TimestampShim {
            descriptor: descriptor.clone(),
        })),
        _ => None,
    }
}

/// 128-bit identifier, 16 raw bytes on the wire. Payload: `Value::Bytes`
/// of length 16.
struct UuidShim {
    descriptor: Arc<TypeDescriptor>,
}

impl Strategy for UuidShim {
    fn write(&self, buf: &mut Buffer, value: &Value, _ctx: &mut WriteContext<'_>) -> Result<()> {
        let obj = value.as_object().ok_or_else(|| Error::ValueMismatch {
            expected: SHIM_UUID.into(),
            got: value.kind_name().to_string(),
        })?;
        let node = obj.borrow();
        match node.payload() {
            Value::Bytes(bytes) if bytes.len() == 16 => {
                buf.write_bytes(bytes);
                Ok(())
            }
            other => Err(Error::ValueMismatch {
                expected: "16-byte payload".into(),
                got: other.kind_name().to_string(),
            }),
        }
    }

    fn read(&self, buf: &mut Buffer, ctx: &mut ReadContext<'_>) -> Result<Value> {
        let node = ObjectValue::new(&self.descriptor);
        ctx.adopt(&node);
        let bytes = buf.read_bytes(16)?.to_vec();
        node.borrow_mut().set_payload(bytes);
        Ok(Value::Object(node))
    }
}

/// Epoch-millis timestamp, zig-zag varint on the wire. Payload:
/// `Value::I64`.
struct TimestampShim {
    descriptor: Arc<TypeDescriptor>,
}

impl Strategy for TimestampShim {
    fn write(&self, buf: &mut Buffer, value: &Value, _ctx: &mut WriteContext<'_>) -> Result<()> {
        let obj = value.as_object().ok_or_else(|| Error::ValueMismatch {
            expected: SHIM_TIMESTAMP.into(),
            got: value.kind_name().to_string(),
        })?;
        let node = obj.borrow();
        match node.payload() {
            Value::I64(millis) => {
                buf.write_varint64(*millis);
                Ok(())
            }
            other => Err(Error::ValueMismatch {
                expected: "i64 payload".into(),
                got: other.kind_name().to_string(),
            }),
        }
    }

    fn read(&self, buf: &mut Buffer, ctx: &mut ReadContext<'_>) -> Result<Value> {
        let node = ObjectValue::new(&self.descriptor);
        ctx.adopt(&node);
        let millis = buf.read_varint64()?;
        node.borrow_mut().set_payload(millis);
        Ok(Value::Object(node))
    }
}
