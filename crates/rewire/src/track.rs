// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reference tracking for shared and cyclic object graphs.
//!
//! Call-scoped state, created fresh per serialize/deserialize and discarded
//! at call end - never shared across calls. Traversal is depth-first
//! pre-order: the writer assigns `id = next_id` on first visit of an `Rc`
//! identity and emits a short backreference token on later visits; the
//! reader registers every allocated node under the next sequential id
//! *before* recursing into its fields, so a self-referential backedge
//! resolves to the node under construction.
//!
//! Null is a distinguished zero-cost marker and never gets an id.

use crate::buffer::Buffer;
use crate::config::{
    MAX_UNTRACKED_DEPTH, NOT_NULL_FLAG, NULL_FLAG, REF_FLAG, REF_VALUE_FLAG,
};
use crate::error::{Error, Result};
use crate::value::{ObjectRef, Value};
use std::collections::HashMap;
use std::rc::Rc;

/// Encode half: identity -> id map plus the untracked-cycle guard.
pub struct RefWriter {
    enabled: bool,
    ids: HashMap<usize, u32>,
    next_id: u32,
    depth: usize,
}

impl RefWriter {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ids: HashMap::new(),
            next_id: 0,
            depth: 0,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Emit the reference flag for `value`. Returns `true` when the flag is
    /// terminal (null or backreference) and no body must follow.
    pub fn write_ref_or_null(&mut self, buf: &mut Buffer, value: &Value) -> bool {
        match value {
            Value::Null => {
                buf.write_i8(NULL_FLAG);
                true
            }
            Value::Object(obj) if self.enabled => {
                let key = Rc::as_ptr(obj) as usize;
                if let Some(&id) = self.ids.get(&key) {
                    buf.write_i8(REF_FLAG);
                    buf.write_varuint32(id);
                    true
                } else {
                    self.ids.insert(key, self.next_id);
                    self.next_id += 1;
                    buf.write_i8(REF_VALUE_FLAG);
                    false
                }
            }
            _ => {
                buf.write_i8(NOT_NULL_FLAG);
                false
            }
        }
    }

    /// Guard one level of recursion. With tracking disabled a cyclic graph
    /// would otherwise recurse forever; the depth limit turns that into a
    /// detect-and-fail.
    pub fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if !self.enabled && self.depth > MAX_UNTRACKED_DEPTH {
            return Err(Error::CycleDetected { depth: self.depth });
        }
        Ok(())
    }

    pub fn exit(&mut self) {
        self.depth -= 1;
    }
}

/// Decode half: id -> instance table, replayed in the same first-visit
/// order the writer assigned.
pub struct RefReader {
    enabled: bool,
    objects: Vec<ObjectRef>,
}

impl RefReader {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            objects: Vec::new(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Register a freshly allocated node under the next sequential id.
    /// Must happen before its fields are decoded.
    pub fn register(&mut self, obj: &ObjectRef) -> u32 {
        let id = self.objects.len() as u32;
        self.objects.push(obj.clone());
        id
    }

    /// Resolve a backreference id to its shared instance.
    pub fn get(&self, id: u32) -> Result<ObjectRef> {
        self.objects
            .get(id as usize)
            .cloned()
            .ok_or_else(|| Error::InvalidData(format!("backreference to unknown id {}", id)))
    }

    /// Objects reconstructed so far, for partial capture on failure.
    pub fn objects(&self) -> &[ObjectRef] {
        &self.objects
    }
}
