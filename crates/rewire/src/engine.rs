// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Engine facade: registration API plus `serialize` / `deserialize`.
//!
//! An engine owns the instance-scoped state (registry, schema cache,
//! dispatch table, plan cache, compressor) and supports concurrent use once
//! warmed; registration is a writer operation resolved by insert-if-absent.
//! Each call builds one session (one buffer, one reference tracker, fresh
//! meta tables) that is never shared or reused - throughput under
//! concurrency comes from pooling whole engines (see [`crate::pool`]), not
//! from sharing sessions.
//!
//! The engine is a pure byte transform: no internal I/O, no retries, no
//! timeouts. Compressor calls are synchronous and block the caller.

use crate::buffer::Buffer;
use crate::compress::{Deflate, SchemaCompressor};
use crate::config::{
    Config, Mode, FLAG_COMPATIBLE, FLAG_LITTLE_ENDIAN, FLAG_REF_TRACKING, MAX_PARTIAL_OBJECTS,
    WIRE_MAGIC,
};
use crate::dispatch::{Dispatch, ReadContext, Strategy, WriteContext};
use crate::error::{Error, Result};
use crate::registry::TypeRegistry;
use crate::schema::compat::PlanCache;
use crate::schema::{Fingerprint, SchemaStore};
use crate::types::TypeDescriptor;
use crate::value::Value;
use dashmap::DashMap;
use std::sync::Arc;

/// Instance-scoped state shared by every session of one engine.
pub(crate) struct EngineShared {
    pub(crate) config: Config,
    pub(crate) registry: TypeRegistry,
    pub(crate) schemas: SchemaStore,
    pub(crate) dispatch: Dispatch,
    pub(crate) plans: PlanCache,
    pub(crate) compressor: Arc<dyn SchemaCompressor>,
    /// Descriptors synthesized from remote schema blocks, keyed by
    /// fingerprint (append-only).
    pub(crate) remote_types: DashMap<Fingerprint, Arc<TypeDescriptor>>,
}

/// Serialization engine. Build via [`Engine::builder`].
pub struct Engine {
    shared: EngineShared,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Engine with the default configuration (compatible mode, reference
    /// tracking on, Deflate schema compression).
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    // ===================================================================
    // Registration
    // ===================================================================

    /// Register a type, auto-assigning its id. Idempotent; re-registering
    /// an existing name against a different backing type is rejected.
    pub fn register(&self, descriptor: TypeDescriptor) -> Result<Arc<TypeDescriptor>> {
        self.shared.registry.register(descriptor)
    }

    /// Register under a pre-declared id. Interoperating peers must agree
    /// on explicit ids (or register in identical order).
    pub fn register_with_id(
        &self,
        descriptor: TypeDescriptor,
        type_id: u32,
    ) -> Result<Arc<TypeDescriptor>> {
        self.shared.registry.register_with_id(descriptor, type_id)
    }

    /// Make an alternative qualified name resolve to an already registered
    /// type (renames across schema versions).
    pub fn register_alias(&self, alias: &str, target: &str) -> Result<()> {
        self.shared.registry.register_alias(alias, target)
    }

    /// Register a custom strategy for a qualified type name. Takes effect
    /// from the type's next first use.
    pub fn register_strategy(&self, name: &str, strategy: Box<dyn Strategy>) -> Result<()> {
        let type_id = self.shared.registry.lookup(name)?.map(|d| d.type_id);
        self.shared
            .dispatch
            .register_custom(Arc::from(name), strategy, type_id);
        Ok(())
    }

    // ===================================================================
    // Serialize / Deserialize
    // ===================================================================

    /// Encode one value graph into a fresh payload.
    pub fn serialize(&self, value: &Value) -> Result<Vec<u8>> {
        let config = &self.shared.config;
        let mut buf = Buffer::with_capacity(128);
        buf.write_u16(WIRE_MAGIC);
        buf.write_u8(config.header_flags());

        let mut ctx = WriteContext::new(
            &self.shared,
            config.mode == Mode::Compatible,
            config.ref_tracking,
        );
        ctx.write_value(&mut buf, value)?;
        Ok(buf.into_vec())
    }

    /// Decode one payload produced by a compatible encoder. The header
    /// flags drive the session (mode, tracking), so a strict-mode engine
    /// can still read a compatible-mode payload.
    pub fn deserialize(&self, bytes: &[u8]) -> Result<Value> {
        let mut buf = if self.shared.config.trusted_input {
            Buffer::from_slice_trusted(bytes)
        } else {
            Buffer::from_slice(bytes)
        };

        let magic = buf.read_u16()?;
        if magic != WIRE_MAGIC {
            return Err(Error::BadMagic(magic));
        }
        let flags = buf.read_u8()?;
        if flags & FLAG_LITTLE_ENDIAN == 0 {
            return Err(Error::InvalidData(
                "big-endian payloads are not supported".into(),
            ));
        }

        let mut ctx = ReadContext::new(
            &self.shared,
            flags & FLAG_COMPATIBLE != 0,
            flags & FLAG_REF_TRACKING != 0,
        );
        let outcome = ctx.read_value(&mut buf).and_then(|value| {
            if buf.remaining() != 0 {
                Err(Error::InvalidData(format!(
                    "{} trailing bytes after the root value",
                    buf.remaining()
                )))
            } else {
                Ok(value)
            }
        });
        outcome.map_err(|source| wrap_decode_failure(source, &ctx))
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// Wrap a decode failure, retaining the partially reconstructed objects
/// only when their count is small. Taxonomy errors with their own meaning
/// (schema mismatch, registration, compressor) pass through unchanged.
fn wrap_decode_failure(source: Error, ctx: &ReadContext<'_>) -> Error {
    match source {
        Error::ClassNotCompatible { .. }
        | Error::ClassUnregistered(_)
        | Error::SerializerUnregistered(_)
        | Error::Compression(_) => return source,
        _ => {}
    }
    let objects = ctx.partial_objects();
    let partial = if objects.len() <= MAX_PARTIAL_OBJECTS {
        objects.iter().map(|o| Value::Object(o.clone())).collect()
    } else {
        log::debug!(
            "[engine] dropping {} partial objects from failure report",
            objects.len()
        );
        Vec::new()
    };
    Error::Deserialization {
        source: Box::new(source),
        partial,
    }
}

/// Fluent engine construction (mode, tracking, compressor, limits).
pub struct EngineBuilder {
    config: Config,
    compressor: Arc<dyn SchemaCompressor>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            compressor: Arc::new(Deflate),
        }
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn ref_tracking(mut self, enabled: bool) -> Self {
        self.config.ref_tracking = enabled;
        self
    }

    pub fn strict_registration(mut self, enabled: bool) -> Self {
        self.config.strict_registration = enabled;
        self
    }

    pub fn trusted_input(mut self, enabled: bool) -> Self {
        self.config.trusted_input = enabled;
        self
    }

    pub fn compress_schema(mut self, enabled: bool) -> Self {
        self.config.compress_schema = enabled;
        self
    }

    pub fn compressor(mut self, compressor: Arc<dyn SchemaCompressor>) -> Self {
        self.compressor = compressor;
        self
    }

    pub fn build(self) -> Engine {
        Engine {
            shared: EngineShared {
                config: self.config,
                registry: TypeRegistry::new(),
                schemas: SchemaStore::new(),
                dispatch: Dispatch::new(),
                plans: PlanCache::new(),
                compressor: self.compressor,
                remote_types: DashMap::new(),
            },
        }
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
