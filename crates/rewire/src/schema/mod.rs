// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Schema derivation and the schema-block codec.
//!
//! A [`ClassDef`] is the canonical, ordered field description of an object
//! type: what actually crosses the wire in compatible mode so two
//! independently compiled binaries can reconcile drifted shapes. Derived
//! lazily on first encode of a type and cached append-only - a schema change
//! produces a new ClassDef with a new fingerprint, never an in-place
//! mutation.
//!
//! Field order is declaration order of the registered descriptor, never any
//! platform's reflection order.

pub mod compat;

use crate::error::{Error, Result};
use crate::types::{
    FieldDescriptor, TypeDescriptor, TypeKind, WireType, TAG_ANY, TAG_BOOL, TAG_BYTES,
    TAG_ENUM, TAG_F32, TAG_F64, TAG_I16, TAG_I32, TAG_I64, TAG_I8, TAG_LIST, TAG_MAP,
    TAG_OBJECT, TAG_STRING, UNREGISTERED,
};
use crate::config::MAX_TYPE_DEPTH;
use crate::buffer::Buffer;
use md5::{Digest, Md5};
use std::fmt;
use std::sync::Arc;

/// 8-byte schema fingerprint: truncated MD5 over the canonical block bytes.
///
/// Two ClassDefs are equal iff their ordered (name, type) pairs are equal;
/// the fingerprint is the transportable witness of that equality. Same
/// fields under a different qualified name fingerprint differently.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 8]);

impl Fingerprint {
    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    pub const fn zero() -> Self {
        Self([0u8; 8])
    }

    /// MD5, truncated to 8 bytes.
    pub fn compute(canonical: &[u8]) -> Self {
        let mut hasher = Md5::new();
        hasher.update(canonical);
        let digest = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        Self(bytes)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint(")?;
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Kind of the described type; rides in the block so a peer can decode
/// values of types it never registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefKind {
    Object = 0,
    Enum = 1,
    Ext = 2,
}

impl DefKind {
    fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Object),
            1 => Ok(Self::Enum),
            2 => Ok(Self::Ext),
            other => Err(Error::InvalidData(format!("unknown def kind {}", other))),
        }
    }
}

/// Canonical ordered field description of a type. Enum and extension types
/// carry an empty field list; the block still transports their name, kind
/// and fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDef {
    pub type_name: Arc<str>,
    pub kind: DefKind,
    pub fields: Vec<FieldDescriptor>,
    pub fingerprint: Fingerprint,
}

impl ClassDef {
    /// Derive the ClassDef of a registered descriptor.
    pub fn derive(descriptor: &TypeDescriptor) -> Result<ClassDef> {
        let (kind, fields) = match &descriptor.kind {
            TypeKind::Object(fields) => (DefKind::Object, fields.clone()),
            TypeKind::Enum(_) => (DefKind::Enum, Vec::new()),
            TypeKind::Ext => (DefKind::Ext, Vec::new()),
        };
        let mut def = ClassDef {
            type_name: descriptor.qualified_name.clone(),
            kind,
            fields,
            fingerprint: Fingerprint::zero(),
        };
        def.fingerprint = Fingerprint::compute(&def.canonical_bytes());
        Ok(def)
    }

    /// Synthesize a (unregistered) local descriptor from a remote ClassDef,
    /// for decoding types this process never registered.
    pub fn to_descriptor(&self) -> TypeDescriptor {
        let kind = match self.kind {
            DefKind::Object => TypeKind::Object(self.fields.clone()),
            // Variant names did not ride along; values still carry ordinals.
            DefKind::Enum => TypeKind::Enum(Vec::new()),
            DefKind::Ext => TypeKind::Ext,
        };
        TypeDescriptor {
            type_id: UNREGISTERED,
            qualified_name: self.type_name.clone(),
            kind,
        }
    }

    /// Canonical encoding: symbol-deduplicated names, type expressions,
    /// flag bits. The fingerprint is computed over exactly these bytes.
    fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Buffer::new();
        let mut symbols = SymbolWriter::new();
        symbols.write(&mut buf, &self.type_name);
        buf.write_u8(self.kind as u8);
        buf.write_varuint32(self.fields.len() as u32);
        for field in &self.fields {
            symbols.write(&mut buf, &field.name);
            write_type_expr(&mut buf, &field.wire_type, &mut symbols);
            let mut flags = 0u8;
            if field.nullable {
                flags |= 0b01;
            }
            if field.track_ref {
                flags |= 0b10;
            }
            buf.write_u8(flags);
        }
        buf.into_vec()
    }

    /// Full block: canonical bytes followed by the 8-byte fingerprint.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = self.canonical_bytes();
        bytes.extend_from_slice(self.fingerprint.as_bytes());
        bytes
    }

    /// Parse a block received from a remote peer. The trailing fingerprint
    /// is recomputed over the content bytes and must match.
    pub fn decode(bytes: &[u8]) -> Result<ClassDef> {
        if bytes.len() < 8 {
            return Err(Error::InvalidData("schema block shorter than its fingerprint".into()));
        }
        let (content, tail) = bytes.split_at(bytes.len() - 8);
        let mut fp = [0u8; 8];
        fp.copy_from_slice(tail);
        let fingerprint = Fingerprint::from_bytes(fp);
        if Fingerprint::compute(content) != fingerprint {
            return Err(Error::InvalidData("schema block fingerprint mismatch".into()));
        }

        let mut buf = Buffer::from_slice(content);
        let mut symbols = SymbolReader::new();
        let type_name = symbols.read(&mut buf)?;
        let kind = DefKind::from_u8(buf.read_u8()?)?;
        let count = buf.read_varuint32()?;
        let mut fields = Vec::with_capacity(count as usize);
        for ordinal in 0..count {
            let name = symbols.read(&mut buf)?;
            let wire_type = read_type_expr(&mut buf, &mut symbols, 0)?;
            let flags = buf.read_u8()?;
            fields.push(FieldDescriptor {
                name,
                wire_type,
                nullable: flags & 0b01 != 0,
                track_ref: flags & 0b10 != 0,
                ordinal: ordinal as u16,
            });
        }
        if buf.remaining() != 0 {
            return Err(Error::InvalidData("trailing bytes in schema block".into()));
        }
        Ok(ClassDef {
            type_name,
            kind,
            fields,
            fingerprint,
        })
    }
}

/// Engine-scoped, append-only ClassDef cache: derived once per type, then
/// shared. A re-registered shape would be a new descriptor and therefore a
/// new entry; existing entries are never mutated.
pub struct SchemaStore {
    defs: dashmap::DashMap<Arc<str>, Arc<ClassDef>>,
}

impl SchemaStore {
    pub fn new() -> Self {
        Self {
            defs: dashmap::DashMap::new(),
        }
    }

    pub fn get_or_derive(&self, descriptor: &TypeDescriptor) -> Result<Arc<ClassDef>> {
        if let Some(found) = self.defs.get(&descriptor.qualified_name) {
            return Ok(found.value().clone());
        }
        let def = Arc::new(ClassDef::derive(descriptor)?);
        Ok(self
            .defs
            .entry(descriptor.qualified_name.clone())
            .or_insert(def)
            .value()
            .clone())
    }
}

impl Default for SchemaStore {
    fn default() -> Self {
        Self::new()
    }
}

// =======================================================================
// Type expressions
// =======================================================================

fn write_type_expr(buf: &mut Buffer, wire_type: &WireType, symbols: &mut SymbolWriter) {
    buf.write_u8(wire_type.tag());
    match wire_type {
        WireType::List(elem) => write_type_expr(buf, elem, symbols),
        WireType::Map(key, value) => {
            write_type_expr(buf, key, symbols);
            write_type_expr(buf, value, symbols);
        }
        WireType::Enum(name) | WireType::Object(name) => symbols.write(buf, name),
        _ => {}
    }
}

fn read_type_expr(buf: &mut Buffer, symbols: &mut SymbolReader, depth: usize) -> Result<WireType> {
    if depth > MAX_TYPE_DEPTH {
        return Err(Error::TypeCycle(format!(
            "type expression nested deeper than {}",
            MAX_TYPE_DEPTH
        )));
    }
    let tag = buf.read_u8()?;
    Ok(match tag {
        TAG_BOOL => WireType::Bool,
        TAG_I8 => WireType::I8,
        TAG_I16 => WireType::I16,
        TAG_I32 => WireType::I32,
        TAG_I64 => WireType::I64,
        TAG_F32 => WireType::F32,
        TAG_F64 => WireType::F64,
        TAG_STRING => WireType::String,
        TAG_BYTES => WireType::Bytes,
        TAG_LIST => WireType::List(Box::new(read_type_expr(buf, symbols, depth + 1)?)),
        TAG_MAP => WireType::Map(
            Box::new(read_type_expr(buf, symbols, depth + 1)?),
            Box::new(read_type_expr(buf, symbols, depth + 1)?),
        ),
        TAG_ENUM => WireType::Enum(symbols.read(buf)?),
        TAG_OBJECT => WireType::Object(symbols.read(buf)?),
        TAG_ANY => WireType::Any,
        other => return Err(Error::InvalidData(format!("unknown type tag {}", other))),
    })
}

// =======================================================================
// Symbol tables (per schema block, so blocks stay independently
// decompressible)
// =======================================================================

/// Write half: first occurrence emits `index == table length` followed by
/// the string bytes; later occurrences emit the index alone.
struct SymbolWriter {
    index: std::collections::HashMap<Arc<str>, u32>,
}

impl SymbolWriter {
    fn new() -> Self {
        Self {
            index: std::collections::HashMap::new(),
        }
    }

    fn write(&mut self, buf: &mut Buffer, name: &Arc<str>) {
        if let Some(&idx) = self.index.get(name) {
            buf.write_varuint32(idx);
        } else {
            let idx = self.index.len() as u32;
            self.index.insert(name.clone(), idx);
            buf.write_varuint32(idx);
            buf.write_varuint32(name.len() as u32);
            buf.write_bytes(name.as_bytes());
        }
    }
}

struct SymbolReader {
    names: Vec<Arc<str>>,
}

impl SymbolReader {
    fn new() -> Self {
        Self { names: Vec::new() }
    }

    fn read(&mut self, buf: &mut Buffer) -> Result<Arc<str>> {
        let idx = buf.read_varuint32()? as usize;
        if idx < self.names.len() {
            return Ok(self.names[idx].clone());
        }
        if idx != self.names.len() {
            return Err(Error::InvalidData(format!(
                "symbol index {} out of sequence (table has {})",
                idx,
                self.names.len()
            )));
        }
        let len = buf.read_varuint32()? as usize;
        let bytes = buf.read_bytes(len)?;
        let name: Arc<str> = std::str::from_utf8(bytes)
            .map_err(|_| Error::InvalidData("symbol is not valid UTF-8".into()))?
            .into();
        self.names.push(name.clone());
        Ok(name)
    }
}
