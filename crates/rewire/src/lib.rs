// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # REWIRE - Cross-Language Object-Graph Serialization
//!
//! A pure Rust engine that converts in-memory object graphs into a compact,
//! versioned binary wire format and back, across independently built and
//! independently versioned peers. Built for RPC payloads, caches and
//! persisted state where producer and consumer schemas drift over time.
//!
//! ## Quick Start
//!
//! ```rust
//! use rewire::{Engine, ObjectValue, TypeDescriptor, Value, WireType};
//!
//! fn main() -> rewire::Result<()> {
//!     let engine = Engine::new();
//!
//!     let point = engine.register(
//!         TypeDescriptor::object("demo.Point")
//!             .field("x", WireType::I32)
//!             .field("y", WireType::I32)
//!             .build(),
//!     )?;
//!
//!     let value = ObjectValue::new(&point);
//!     value.borrow_mut().set("x", 3i32)?;
//!     value.borrow_mut().set("y", 4i32)?;
//!
//!     let bytes = engine.serialize(&Value::Object(value))?;
//!     let back = engine.deserialize(&bytes)?;
//!     assert_eq!(
//!         back.as_object().unwrap().borrow().get("x")?,
//!         Value::I32(3)
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------------+
//! |                            Engine                                  |
//! |      serialize / deserialize -> one session per call               |
//! +--------------------------------------------------------------------+
//! |                       SerializerDispatch                           |
//! |   rule table: custom -> shim -> enum -> schema-driven fallback     |
//! +--------------------------------------------------------------------+
//! |  TypeRegistry  |  SchemaCodec (ClassDef)  |  ReferenceTracker      |
//! |  name/id maps  |  fingerprints, blocks,   |  identity -> ref id    |
//! |  aliases       |  alignment plans         |  backref replay        |
//! +--------------------------------------------------------------------+
//! |                            Buffer                                  |
//! |        growable bytes, LE primitives, varints, reserve/patch       |
//! +--------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Engine`] | Entry point: registration plus serialize/deserialize |
//! | [`TypeDescriptor`] | Wire-side description of a host type |
//! | [`Value`] / [`ObjectValue`] | Runtime object graph the engine walks |
//! | [`Mode`] | Schema exchange mode (strict vs. compatible) |
//! | [`Strategy`] | The `{write, read}` contract encode routines satisfy |
//! | [`EnginePool`] | Checkout/return pooling of whole engine instances |
//!
//! ## Modes
//!
//! - **Compatible** (default): schema blocks ride along; field additions,
//!   removals and reorders between peers reconcile at decode.
//! - **SchemaConsistent**: both ends must hold identical schemas; any
//!   mismatch is a hard error, nothing is silently defaulted.

/// Growable byte store with independent read/write cursors and varints.
pub mod buffer;
/// Schema-block compressor contract (Deflate, Identity, optional LZ4).
pub mod compress;
/// Engine configuration and wire constants.
pub mod config;
/// Strategy dispatch: rule table, contexts, per-value state machine.
pub mod dispatch;
/// Engine facade and builder.
pub mod engine;
/// Error taxonomy.
pub mod error;
/// Pooling of whole engine instances.
pub mod pool;
/// Type registry: host type <-> wire descriptor.
pub mod registry;
/// ClassDef derivation, fingerprints, compatible-mode alignment.
pub mod schema;
/// Reference tracking for shared and cyclic graphs.
pub mod track;
/// Wire type descriptors.
pub mod types;
/// Runtime value model.
pub mod value;

pub use buffer::Buffer;
pub use compress::{CompressorKind, Deflate, Identity, SchemaCompressor};
#[cfg(feature = "lz4")]
pub use compress::Lz4;
pub use config::{Config, Mode};
pub use dispatch::{ReadContext, Strategy, WriteContext};
pub use engine::{Engine, EngineBuilder};
pub use error::{Error, Result};
pub use pool::{EnginePool, PooledEngine};
pub use schema::{ClassDef, Fingerprint};
pub use types::{FieldDescriptor, TypeDescriptor, TypeKind, WireType};
pub use value::{EnumValue, ObjectRef, ObjectValue, Value};
