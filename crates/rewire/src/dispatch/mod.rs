// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Strategy dispatch: which routine encodes/decodes each type, and the
//! per-value state machine that drives it.
//!
//! Resolution is an explicit ordered rule table evaluated top-down - user
//! strategies, then shims, then enums, then the generic schema-driven
//! object strategy as fallback - an auditable list instead of implicit
//! dispatch. Resolved once, cached per type id.
//!
//! Per-value encode states:
//! `NOT_VISITED -> (null) NULL_MARKER | (seen, tracking on) BACKREF
//!  -> WRITE_TYPE_TOKEN -> WRITE_SCHEMA_TOKEN (compatible, first use)
//!  -> WRITE_BODY` (recurses into fields).

pub mod builtin;
pub mod object;
pub mod shim;

use crate::buffer::Buffer;
use crate::compress::CompressorKind;
use crate::config::{
    FLAT_STRATEGY_THRESHOLD, NOT_NULL_FLAG, NULL_FLAG, REF_FLAG, REF_VALUE_FLAG, USER_ID_BASE,
};
use crate::engine::EngineShared;
use crate::error::{Error, Result};
use crate::schema::compat::FieldPlan;
use crate::schema::ClassDef;
use crate::track::{RefReader, RefWriter};
use crate::types::{TypeDescriptor, TypeKind};
use crate::value::{ObjectRef, Value};
use arc_swap::ArcSwapAny;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Shared strategy handle. Double indirection because the swap slot needs a
/// thin pointer and `Arc<dyn Strategy>` is fat.
pub type StrategyRef = Arc<Box<dyn Strategy>>;

/// The encode/decode contract every strategy satisfies. A strategy must
/// consume and produce exactly the bytes it wrote so sibling fields stay
/// aligned.
///
/// Strategies that build object nodes must call [`ReadContext::adopt`] on
/// the node *before* decoding any children, so backedges into the node
/// under construction resolve to the same instance.
pub trait Strategy: Send + Sync {
    fn write(&self, buf: &mut Buffer, value: &Value, ctx: &mut WriteContext<'_>) -> Result<()>;

    fn read(&self, buf: &mut Buffer, ctx: &mut ReadContext<'_>) -> Result<Value>;
}

/// Cached per-type dispatch slot. The strategy can be swapped once a faster
/// one is built in the background; the swap never gates correctness.
pub struct StrategySlot {
    strategy: ArcSwapAny<StrategyRef>,
    uses: AtomicU32,
    upgrading: AtomicBool,
    /// Present when the type is eligible for the flat fast path.
    flat_source: Option<(Arc<TypeDescriptor>, Arc<ClassDef>)>,
}

impl StrategySlot {
    fn new(strategy: StrategyRef, flat_source: Option<(Arc<TypeDescriptor>, Arc<ClassDef>)>) -> Self {
        Self {
            strategy: ArcSwapAny::new(strategy),
            uses: AtomicU32::new(0),
            upgrading: AtomicBool::new(false),
            flat_source,
        }
    }

    pub fn strategy(&self) -> StrategyRef {
        self.strategy.load_full()
    }
}

type RuleFn = fn(&Dispatch, &Arc<TypeDescriptor>, &EngineShared) -> Result<Option<StrategyRef>>;

/// Ordered resolution rules, evaluated top-down; first hit wins. The last
/// entry is the generic fallback; a type no rule accepts has no strategy.
const RULES: &[(&str, RuleFn)] = &[
    ("custom", rule_custom),
    ("shim", rule_shim),
    ("enum", rule_enum),
    ("schema", rule_schema),
];

fn rule_custom(
    dispatch: &Dispatch,
    descriptor: &Arc<TypeDescriptor>,
    _shared: &EngineShared,
) -> Result<Option<StrategyRef>> {
    Ok(dispatch
        .custom
        .get(&descriptor.qualified_name)
        .map(|entry| entry.value().clone()))
}

fn rule_shim(
    _dispatch: &Dispatch,
    descriptor: &Arc<TypeDescriptor>,
    _shared: &EngineShared,
) -> Result<Option<StrategyRef>> {
    Ok(shim::shim_for(descriptor).map(|s| Arc::new(s)))
}

fn rule_enum(
    _dispatch: &Dispatch,
    descriptor: &Arc<TypeDescriptor>,
    _shared: &EngineShared,
) -> Result<Option<StrategyRef>> {
    match descriptor.kind {
        TypeKind::Enum(_) => Ok(Some(Arc::new(
            Box::new(object::EnumStrategy::new(descriptor.clone())) as Box<dyn Strategy>,
        ))),
        _ => Ok(None),
    }
}

fn rule_schema(
    _dispatch: &Dispatch,
    descriptor: &Arc<TypeDescriptor>,
    shared: &EngineShared,
) -> Result<Option<StrategyRef>> {
    match descriptor.kind {
        TypeKind::Object(_) => {
            // Descriptors synthesized from remote blocks stay out of the
            // name-keyed schema cache; a local registration of the same
            // name may carry a different shape.
            let def = if descriptor.type_id == crate::types::UNREGISTERED {
                Arc::new(ClassDef::derive(descriptor)?)
            } else {
                shared.schemas.get_or_derive(descriptor)?
            };
            Ok(Some(Arc::new(Box::new(object::ObjectStrategy::new(
                descriptor.clone(),
                def,
            )) as Box<dyn Strategy>)))
        }
        _ => Ok(None),
    }
}

/// Per-type strategy table.
pub struct Dispatch {
    cache: DashMap<u32, Arc<StrategySlot>>,
    custom: DashMap<Arc<str>, StrategyRef>,
}

impl Dispatch {
    pub fn new() -> Self {
        Self {
            cache: DashMap::new(),
            custom: DashMap::new(),
        }
    }

    /// Register a user strategy for a qualified type name. Must happen
    /// before the type's first use; a cached resolution for the same id is
    /// dropped so the next use re-resolves.
    pub(crate) fn register_custom(
        &self,
        name: Arc<str>,
        strategy: Box<dyn Strategy>,
        type_id: Option<u32>,
    ) {
        self.custom.insert(name, Arc::new(strategy));
        if let Some(id) = type_id {
            self.cache.remove(&id);
        }
    }

    /// Resolve the strategy slot for a registered descriptor, walking the
    /// rule table on a cache miss.
    pub(crate) fn resolve(
        &self,
        descriptor: &Arc<TypeDescriptor>,
        shared: &EngineShared,
    ) -> Result<Arc<StrategySlot>> {
        if let Some(slot) = self.cache.get(&descriptor.type_id) {
            return Ok(slot.value().clone());
        }
        let slot = Arc::new(self.build_slot(descriptor, shared)?);
        Ok(self
            .cache
            .entry(descriptor.type_id)
            .or_insert(slot)
            .value()
            .clone())
    }

    /// Build an uncached slot; also used for descriptors synthesized from
    /// remote schema blocks (which have no registry id to cache under).
    pub(crate) fn build_slot(
        &self,
        descriptor: &Arc<TypeDescriptor>,
        shared: &EngineShared,
    ) -> Result<StrategySlot> {
        for (name, rule) in RULES {
            if let Some(strategy) = rule(self, descriptor, shared)? {
                log::debug!(
                    "[dispatch] {} resolved by rule '{}'",
                    descriptor.qualified_name,
                    name
                );
                let flat_source = if descriptor.type_id != crate::types::UNREGISTERED
                    && object::flat_eligible(descriptor)
                {
                    Some((
                        descriptor.clone(),
                        shared.schemas.get_or_derive(descriptor)?,
                    ))
                } else {
                    None
                };
                return Ok(StrategySlot::new(strategy, flat_source));
            }
        }
        Err(Error::SerializerUnregistered(
            descriptor.qualified_name.to_string(),
        ))
    }

    /// Count one use; past the threshold, build the flat fast path in the
    /// background and swap it in. Purely an optimization.
    fn note_use(&self, slot: &Arc<StrategySlot>) {
        let Some((descriptor, def)) = &slot.flat_source else {
            return;
        };
        let uses = slot.uses.fetch_add(1, Ordering::Relaxed) + 1;
        if uses >= FLAT_STRATEGY_THRESHOLD && !slot.upgrading.swap(true, Ordering::AcqRel) {
            let slot = slot.clone();
            let descriptor = descriptor.clone();
            let def = def.clone();
            std::thread::spawn(move || {
                let flat = object::FlatObjectStrategy::new(descriptor.clone(), def);
                slot.strategy
                    .store(Arc::new(Box::new(flat) as Box<dyn Strategy>));
                log::debug!(
                    "[dispatch] flat strategy swapped in for {}",
                    descriptor.qualified_name
                );
            });
        }
    }
}

impl Default for Dispatch {
    fn default() -> Self {
        Self::new()
    }
}

// =======================================================================
// Sessions
// =======================================================================

/// One encode session: reference tracker, meta table, strict-mode
/// fingerprint set. Created per call, never shared.
pub struct WriteContext<'a> {
    pub(crate) shared: &'a EngineShared,
    pub(crate) refs: RefWriter,
    pub(crate) meta: HashMap<Arc<str>, u32>,
    pub(crate) strict_sent: HashSet<u32>,
    pub(crate) compatible: bool,
}

impl<'a> WriteContext<'a> {
    pub(crate) fn new(shared: &'a EngineShared, compatible: bool, tracking: bool) -> Self {
        Self {
            shared,
            refs: RefWriter::new(tracking),
            meta: HashMap::new(),
            strict_sent: HashSet::new(),
            compatible,
        }
    }

    /// Encode a nested value (custom strategies recurse through this).
    pub fn write_value(&mut self, buf: &mut Buffer, value: &Value) -> Result<()> {
        write_value(buf, value, self)
    }
}

/// Resolved meta-table entry for one schema token.
#[derive(Clone)]
pub(crate) struct MetaEntry {
    pub descriptor: Arc<TypeDescriptor>,
    pub plan: Arc<FieldPlan>,
}

/// One decode session; mirrors [`WriteContext`].
pub struct ReadContext<'a> {
    pub(crate) shared: &'a EngineShared,
    pub(crate) refs: RefReader,
    pub(crate) meta: Vec<MetaEntry>,
    pub(crate) strict_seen: HashSet<u32>,
    pub(crate) compatible: bool,
    pub(crate) active_plan: Option<Arc<FieldPlan>>,
    pub(crate) pending_tracked: bool,
}

impl<'a> ReadContext<'a> {
    pub(crate) fn new(shared: &'a EngineShared, compatible: bool, tracking: bool) -> Self {
        Self {
            shared,
            refs: RefReader::new(tracking),
            meta: Vec::new(),
            strict_seen: HashSet::new(),
            compatible,
            active_plan: None,
            pending_tracked: false,
        }
    }

    /// Decode a nested value (custom strategies recurse through this).
    pub fn read_value(&mut self, buf: &mut Buffer) -> Result<Value> {
        read_value(buf, self)
    }

    /// Register a freshly allocated node under the pending reference id.
    /// Must be called before any of the node's children are decoded.
    pub fn adopt(&mut self, node: &ObjectRef) {
        if std::mem::take(&mut self.pending_tracked) {
            self.refs.register(node);
        }
    }

    pub(crate) fn partial_objects(&self) -> &[ObjectRef] {
        self.refs.objects()
    }
}

// =======================================================================
// Encode state machine
// =======================================================================

/// Encode one value at a trackable/polymorphic position.
pub(crate) fn write_value(buf: &mut Buffer, value: &Value, ctx: &mut WriteContext<'_>) -> Result<()> {
    write_value_opts(buf, value, ctx, true)
}

/// `track`: whether this position participates in reference tracking.
/// Untracked positions still encode correctly; they just never emit or
/// consume reference ids.
pub(crate) fn write_value_opts(
    buf: &mut Buffer,
    value: &Value,
    ctx: &mut WriteContext<'_>,
    track: bool,
) -> Result<()> {
    let descriptor = match value {
        Value::Null => {
            buf.write_i8(NULL_FLAG);
            return Ok(());
        }
        Value::Object(obj) => Some(obj.borrow().descriptor().clone()),
        Value::Enum(ev) => Some(ev.descriptor.clone()),
        _ => None,
    };

    match descriptor {
        Some(descriptor) => {
            // Type resolution first: an unregistered type in strict mode
            // fails before any bytes of this object are emitted.
            let canonical = ctx
                .shared
                .registry
                .resolve_for_encode(&descriptor, ctx.shared.config.strict_registration)?;
            let slot = ctx.shared.dispatch.resolve(&canonical, ctx.shared)?;

            let terminal = if track {
                ctx.refs.write_ref_or_null(buf, value)
            } else {
                buf.write_i8(NOT_NULL_FLAG);
                false
            };
            if terminal {
                return Ok(());
            }

            buf.write_varuint32(canonical.type_id);
            if ctx.compatible {
                write_schema_token(buf, &canonical, ctx)?;
            } else {
                write_strict_fingerprint(buf, &canonical, ctx)?;
            }

            ctx.refs.enter()?;
            let strategy = slot.strategy();
            let result = strategy.write(buf, value, ctx);
            ctx.refs.exit();
            ctx.shared.dispatch.note_use(&slot);
            result
        }
        None => {
            buf.write_i8(NOT_NULL_FLAG);
            builtin::write_builtin(buf, value, ctx)
        }
    }
}

/// Compatible mode: short token referencing the session meta table; first
/// use of a type transmits the block inline (meta sharing).
fn write_schema_token(
    buf: &mut Buffer,
    canonical: &Arc<TypeDescriptor>,
    ctx: &mut WriteContext<'_>,
) -> Result<()> {
    if let Some(&index) = ctx.meta.get(&canonical.qualified_name) {
        buf.write_varuint32(index);
        return Ok(());
    }
    let index = ctx.meta.len() as u32;
    ctx.meta.insert(canonical.qualified_name.clone(), index);
    buf.write_varuint32(index);

    let def = ctx.shared.schemas.get_or_derive(canonical)?;
    let raw = def.encode();
    let mut flags = 0u8;
    let mut payload = raw;
    if ctx.shared.config.compress_schema {
        let kind = ctx.shared.compressor.kind();
        if kind != CompressorKind::Identity {
            let packed = ctx.shared.compressor.compress(&payload)?;
            // Store compressed only when it actually shrinks the block.
            if packed.len() < payload.len() {
                flags = 0b1 | (kind.to_u8() << 1);
                payload = packed;
            }
        }
    }
    buf.write_u8(flags);
    buf.write_varuint32(payload.len() as u32);
    buf.write_bytes(&payload);
    Ok(())
}

/// Strict mode: no schema block, just the fingerprint on first use of each
/// type per call.
fn write_strict_fingerprint(
    buf: &mut Buffer,
    canonical: &Arc<TypeDescriptor>,
    ctx: &mut WriteContext<'_>,
) -> Result<()> {
    if ctx.strict_sent.insert(canonical.type_id) {
        let def = ctx.shared.schemas.get_or_derive(canonical)?;
        buf.write_bytes(def.fingerprint.as_bytes());
    }
    Ok(())
}

// =======================================================================
// Decode state machine
// =======================================================================

pub(crate) fn read_value(buf: &mut Buffer, ctx: &mut ReadContext<'_>) -> Result<Value> {
    let flag = buf.read_i8()?;
    match flag {
        NULL_FLAG => Ok(Value::Null),
        REF_FLAG => {
            let id = buf.read_varuint32()?;
            Ok(Value::Object(ctx.refs.get(id)?))
        }
        NOT_NULL_FLAG | REF_VALUE_FLAG => {
            let tracked = flag == REF_VALUE_FLAG;
            let token = buf.read_varuint32()?;
            if token < USER_ID_BASE {
                if tracked {
                    return Err(Error::InvalidData(
                        "built-in value carries a reference id".into(),
                    ));
                }
                builtin::read_builtin_body(buf, token, ctx)
            } else {
                read_registered(buf, token, tracked, ctx)
            }
        }
        other => Err(Error::InvalidData(format!("unknown reference flag {}", other))),
    }
}

fn read_registered(
    buf: &mut Buffer,
    token: u32,
    tracked: bool,
    ctx: &mut ReadContext<'_>,
) -> Result<Value> {
    let (descriptor, plan) = if ctx.compatible {
        let entry = read_schema_token(buf, ctx)?;
        (entry.descriptor, Some(entry.plan))
    } else {
        let descriptor = ctx
            .shared
            .registry
            .by_id(token)
            .ok_or(Error::UnknownTypeId(token))?;
        check_strict_fingerprint(buf, token, &descriptor, ctx)?;
        (descriptor, None)
    };

    let slot = if descriptor.type_id == crate::types::UNREGISTERED {
        Arc::new(ctx.shared.dispatch.build_slot(&descriptor, ctx.shared)?)
    } else {
        ctx.shared.dispatch.resolve(&descriptor, ctx.shared)?
    };

    ctx.pending_tracked = tracked;
    let saved_plan = std::mem::replace(&mut ctx.active_plan, plan);
    let strategy = slot.strategy();
    let result = strategy.read(buf, ctx);
    ctx.active_plan = saved_plan;
    ctx.pending_tracked = false;
    ctx.shared.dispatch.note_use(&slot);
    result
}

fn read_schema_token(buf: &mut Buffer, ctx: &mut ReadContext<'_>) -> Result<MetaEntry> {
    let index = buf.read_varuint32()? as usize;
    if index < ctx.meta.len() {
        return Ok(ctx.meta[index].clone());
    }
    if index != ctx.meta.len() {
        return Err(Error::InvalidData(format!(
            "schema token {} out of sequence (table has {})",
            index,
            ctx.meta.len()
        )));
    }

    let flags = buf.read_u8()?;
    let len = buf.read_varuint32()? as usize;
    let bytes = buf.read_bytes(len)?.to_vec();
    let raw = if flags & 0b1 != 0 {
        let kind = CompressorKind::from_u8(flags >> 1)?;
        if kind != ctx.shared.compressor.kind() {
            return Err(Error::Compression(format!(
                "block compressed with {:?}, engine configured for {:?}",
                kind,
                ctx.shared.compressor.kind()
            )));
        }
        ctx.shared.compressor.decompress(&bytes)?
    } else {
        bytes
    };

    let remote = Arc::new(ClassDef::decode(&raw)?);
    let entry = resolve_meta_entry(remote, ctx)?;
    ctx.meta.push(entry.clone());
    Ok(entry)
}

/// Map a remote ClassDef onto local knowledge: a registered local type gets
/// an alignment plan; an unknown type is synthesized from the block (unless
/// strict registration forbids it).
fn resolve_meta_entry(remote: Arc<ClassDef>, ctx: &mut ReadContext<'_>) -> Result<MetaEntry> {
    match ctx.shared.registry.lookup(&remote.type_name)? {
        Some(local) => {
            let local_def = ctx.shared.schemas.get_or_derive(&local)?;
            if local_def.kind != remote.kind {
                return Err(Error::ClassNotCompatible {
                    type_name: remote.type_name.to_string(),
                    local: local_def.fingerprint.to_string(),
                    remote: remote.fingerprint.to_string(),
                });
            }
            let plan = ctx.shared.plans.get_or_build(&local_def, &remote);
            Ok(MetaEntry {
                descriptor: local,
                plan,
            })
        }
        None => {
            if ctx.shared.config.strict_registration {
                return Err(Error::ClassUnregistered(remote.type_name.to_string()));
            }
            let descriptor = ctx
                .shared
                .remote_types
                .entry(remote.fingerprint)
                .or_insert_with(|| Arc::new(remote.to_descriptor()))
                .value()
                .clone();
            let plan = ctx.shared.plans.get_or_build(&remote, &remote);
            Ok(MetaEntry { descriptor, plan })
        }
    }
}

fn check_strict_fingerprint(
    buf: &mut Buffer,
    token: u32,
    descriptor: &Arc<TypeDescriptor>,
    ctx: &mut ReadContext<'_>,
) -> Result<()> {
    if ctx.strict_seen.insert(token) {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(buf.read_bytes(8)?);
        let remote = crate::schema::Fingerprint::from_bytes(bytes);
        let local_def = ctx.shared.schemas.get_or_derive(descriptor)?;
        if local_def.fingerprint != remote {
            return Err(Error::ClassNotCompatible {
                type_name: descriptor.qualified_name.to_string(),
                local: local_def.fingerprint.to_string(),
                remote: remote.to_string(),
            });
        }
    }
    Ok(())
}
