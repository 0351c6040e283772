// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Compatible-mode field alignment.
//!
//! When producer and consumer schemas drift, the decoder walks the *remote*
//! field order (that is what the bytes follow) and maps each remote field to
//! a local slot, a skip, or nothing; unmatched local fields take their
//! defaults. Plans are cached keyed by the (local, remote) fingerprint pair
//! so repeated objects of the same drifted type reuse one plan.

use super::{ClassDef, Fingerprint};
use crate::config::PLAN_CACHE_CAPACITY;
use crate::types::FieldDescriptor;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// One step of a reconciliation plan, in remote field order; `Default` steps
/// are appended after the wire fields are exhausted.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    /// Remote field matched a local field by (name, type): decode per the
    /// remote declaration, store at the local ordinal.
    Read {
        local_ordinal: u16,
        remote: FieldDescriptor,
    },
    /// No local counterpart (or the type diverged): consume the bytes per
    /// the remote declaration, discard the value.
    Skip { remote: FieldDescriptor },
    /// No remote counterpart: the local field takes its default value.
    Default { local_ordinal: u16 },
}

/// Alignment plan between one local and one remote ClassDef.
#[derive(Debug, Clone)]
pub struct FieldPlan {
    pub type_name: Arc<str>,
    pub ops: Vec<FieldOp>,
    /// True when remote and local shapes are identical (every op is a
    /// straight read in ordinal order).
    pub exact: bool,
}

/// Build the plan: remote fields in wire order, then defaults for local
/// leftovers. Matching is by (name, wire type); a name that matches with a
/// different type is treated as unmatched on both sides.
pub fn build_plan(local: &ClassDef, remote: &ClassDef) -> FieldPlan {
    let mut ops = Vec::with_capacity(remote.fields.len());
    let mut matched = vec![false; local.fields.len()];

    for remote_field in &remote.fields {
        let hit = local
            .fields
            .iter()
            .find(|lf| lf.name == remote_field.name && lf.wire_type == remote_field.wire_type);
        match hit {
            Some(local_field) => {
                matched[local_field.ordinal as usize] = true;
                ops.push(FieldOp::Read {
                    local_ordinal: local_field.ordinal,
                    remote: remote_field.clone(),
                });
            }
            None => ops.push(FieldOp::Skip {
                remote: remote_field.clone(),
            }),
        }
    }

    for (ordinal, hit) in matched.iter().enumerate() {
        if !hit {
            ops.push(FieldOp::Default {
                local_ordinal: ordinal as u16,
            });
        }
    }

    let exact = local.fingerprint == remote.fingerprint;
    if !exact {
        log::debug!(
            "[schema] aligned {}: {} reads, {} skips, {} defaults",
            remote.type_name,
            ops.iter().filter(|op| matches!(op, FieldOp::Read { .. })).count(),
            ops.iter().filter(|op| matches!(op, FieldOp::Skip { .. })).count(),
            ops.iter().filter(|op| matches!(op, FieldOp::Default { .. })).count(),
        );
    }
    FieldPlan {
        type_name: remote.type_name.clone(),
        ops,
        exact,
    }
}

/// Bounded LRU of alignment plans, engine-scoped.
pub struct PlanCache {
    inner: Mutex<LruCache<(Fingerprint, Fingerprint), Arc<FieldPlan>>>,
}

impl PlanCache {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LruCache::new(
                NonZeroUsize::new(PLAN_CACHE_CAPACITY).expect("nonzero capacity"),
            )),
        }
    }

    pub fn get_or_build(&self, local: &ClassDef, remote: &ClassDef) -> Arc<FieldPlan> {
        let key = (local.fingerprint, remote.fingerprint);
        let mut cache = self.inner.lock();
        if let Some(plan) = cache.get(&key) {
            return plan.clone();
        }
        let plan = Arc::new(build_plan(local, remote));
        cache.put(key, plan.clone());
        plan
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }
}

impl Default for PlanCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TypeDescriptor, WireType};

    fn def(fields: &[(&str, WireType)]) -> ClassDef {
        let mut builder = TypeDescriptor::object("demo.T");
        for (name, wt) in fields {
            builder = builder.field(name.to_string(), wt.clone());
        }
        ClassDef::derive(&builder.build()).expect("derive")
    }

    #[test]
    fn test_identical_defs_build_exact_plan() {
        let local = def(&[("a", WireType::I32), ("b", WireType::String)]);
        let plan = build_plan(&local, &local);
        assert!(plan.exact);
        assert_eq!(plan.ops.len(), 2);
        assert!(matches!(plan.ops[0], FieldOp::Read { local_ordinal: 0, .. }));
    }

    #[test]
    fn test_superset_remote_yields_skips() {
        let local = def(&[("a", WireType::I32), ("b", WireType::I32)]);
        let remote = def(&[
            ("a", WireType::I32),
            ("b", WireType::I32),
            ("c", WireType::String),
            ("d", WireType::F64),
        ]);
        let plan = build_plan(&local, &remote);
        assert!(!plan.exact);
        let skips = plan
            .ops
            .iter()
            .filter(|op| matches!(op, FieldOp::Skip { .. }))
            .count();
        assert_eq!(skips, 2);
    }

    #[test]
    fn test_subset_remote_yields_defaults() {
        let local = def(&[("a", WireType::I32), ("b", WireType::I32)]);
        let remote = def(&[("a", WireType::I32)]);
        let plan = build_plan(&local, &remote);
        assert_eq!(
            plan.ops,
            vec![
                FieldOp::Read {
                    local_ordinal: 0,
                    remote: remote.fields[0].clone(),
                },
                FieldOp::Default { local_ordinal: 1 },
            ]
        );
    }

    #[test]
    fn test_type_divergence_is_unmatched_on_both_sides() {
        let local = def(&[("a", WireType::I32)]);
        let remote = def(&[("a", WireType::String)]);
        let plan = build_plan(&local, &remote);
        assert!(matches!(plan.ops[0], FieldOp::Skip { .. }));
        assert!(matches!(plan.ops[1], FieldOp::Default { local_ordinal: 0 }));
    }

    #[test]
    fn test_reordered_fields_still_match() {
        let local = def(&[("a", WireType::I32), ("b", WireType::String)]);
        let remote = def(&[("b", WireType::String), ("a", WireType::I32)]);
        let plan = build_plan(&local, &remote);
        assert!(matches!(plan.ops[0], FieldOp::Read { local_ordinal: 1, .. }));
        assert!(matches!(plan.ops[1], FieldOp::Read { local_ordinal: 0, .. }));
    }

    #[test]
    fn test_plan_cache_reuses_plans() {
        let cache = PlanCache::new();
        let local = def(&[("a", WireType::I32)]);
        let remote = def(&[("a", WireType::I32), ("b", WireType::I32)]);
        let first = cache.get_or_build(&local, &remote);
        let second = cache.get_or_build(&local, &remote);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }
}
