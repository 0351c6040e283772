// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Type registry: host type <-> wire descriptor.
//!
//! Engine-scoped, append-only, concurrent. Both directions (qualified name
//! and type id) are `DashMap`s with insert-if-absent semantics: once a key
//! exists it is never mutated, so warmed lookups take no lock. A losing
//! concurrent registration that agrees on the shape is idempotent; one that
//! conflicts raises [`Error::RegistrationConflict`].
//!
//! Registration is explicit (`register`, `register_with_id`) or implicit
//! (first-use auto-registration, only when strict registration is off -
//! decoding unregistered types is a known attack surface).

use crate::config::{MAX_TYPE_DEPTH, USER_ID_BASE};
use crate::error::{Error, Result};
use crate::types::TypeDescriptor;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

pub struct TypeRegistry {
    by_name: DashMap<Arc<str>, Arc<TypeDescriptor>>,
    by_id: DashMap<u32, Arc<TypeDescriptor>>,
    aliases: DashMap<Arc<str>, Arc<str>>,
    next_id: AtomicU32,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self {
            by_name: DashMap::new(),
            by_id: DashMap::new(),
            aliases: DashMap::new(),
            next_id: AtomicU32::new(USER_ID_BASE),
        }
    }

    /// Register a descriptor, auto-assigning the next free type id.
    /// Idempotent for identical shapes.
    pub fn register(&self, descriptor: TypeDescriptor) -> Result<Arc<TypeDescriptor>> {
        self.register_inner(descriptor, None)
    }

    /// Register under a pre-declared id (interop peers must agree on ids).
    pub fn register_with_id(
        &self,
        descriptor: TypeDescriptor,
        type_id: u32,
    ) -> Result<Arc<TypeDescriptor>> {
        if type_id < USER_ID_BASE {
            return Err(Error::RegistrationConflict {
                name: descriptor.qualified_name.to_string(),
                reason: format!("explicit id {} collides with built-in tokens", type_id),
            });
        }
        self.register_inner(descriptor, Some(type_id))
    }

    fn register_inner(
        &self,
        mut descriptor: TypeDescriptor,
        explicit_id: Option<u32>,
    ) -> Result<Arc<TypeDescriptor>> {
        let name = descriptor.qualified_name.clone();
        if self.aliases.contains_key(&name) {
            return Err(Error::RegistrationConflict {
                name: name.to_string(),
                reason: "name is already an alias".into(),
            });
        }

        if let Some(existing) = self.by_name.get(&name) {
            return self.check_existing(&existing, &descriptor, explicit_id);
        }

        descriptor.type_id =
            explicit_id.unwrap_or_else(|| self.next_id.fetch_add(1, Ordering::Relaxed));
        let arc = Arc::new(descriptor);

        // Insert-if-absent; a losing race falls back to the winner's entry.
        let winner = match self.by_name.entry(name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                let existing = entry.get().clone();
                drop(entry);
                return self.check_existing(&existing, &arc, explicit_id);
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(arc.clone());
                arc
            }
        };

        match self.by_id.entry(winner.type_id) {
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                let taken_by = entry.get().qualified_name.clone();
                drop(entry);
                self.by_name.remove(&name);
                return Err(Error::RegistrationConflict {
                    name: name.to_string(),
                    reason: format!("type id {} is taken by {}", winner.type_id, taken_by),
                });
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(winner.clone());
            }
        }

        log::debug!(
            "[registry] registered {} as id {}",
            winner.qualified_name,
            winner.type_id
        );
        Ok(winner)
    }

    fn check_existing(
        &self,
        existing: &Arc<TypeDescriptor>,
        incoming: &TypeDescriptor,
        explicit_id: Option<u32>,
    ) -> Result<Arc<TypeDescriptor>> {
        if !existing.same_shape(incoming) {
            return Err(Error::RegistrationConflict {
                name: incoming.qualified_name.to_string(),
                reason: "name is registered against a different backing type".into(),
            });
        }
        if let Some(id) = explicit_id {
            if id != existing.type_id {
                return Err(Error::RegistrationConflict {
                    name: incoming.qualified_name.to_string(),
                    reason: format!(
                        "already registered as id {}, re-registration asked for {}",
                        existing.type_id, id
                    ),
                });
            }
        }
        Ok(existing.clone())
    }

    /// Make `alias` resolve to `target`'s descriptor (type renames across
    /// versions).
    pub fn register_alias(
        &self,
        alias: impl Into<Arc<str>>,
        target: impl Into<Arc<str>>,
    ) -> Result<()> {
        let alias = alias.into();
        let target = target.into();
        if self.by_name.contains_key(&alias) {
            return Err(Error::RegistrationConflict {
                name: alias.to_string(),
                reason: "alias name is already a registered type".into(),
            });
        }
        match self.aliases.entry(alias.clone()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                if *entry.get() != target {
                    return Err(Error::RegistrationConflict {
                        name: alias.to_string(),
                        reason: format!("alias already points at {}", entry.get()),
                    });
                }
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(target);
            }
        }
        Ok(())
    }

    /// Resolve a qualified name, following alias chains. The threaded path
    /// bounds alias depth so an alias loop aborts instead of spinning.
    pub fn lookup(&self, name: &str) -> Result<Option<Arc<TypeDescriptor>>> {
        let mut current: Arc<str> = Arc::from(name);
        let mut path: Vec<Arc<str>> = Vec::new();
        loop {
            if let Some(found) = self.by_name.get(&current) {
                return Ok(Some(found.value().clone()));
            }
            match self.aliases.get(&current) {
                Some(next) => {
                    path.push(current.clone());
                    if path.len() > MAX_TYPE_DEPTH || path.contains(next.value()) {
                        path.push(next.value().clone());
                        return Err(Error::TypeCycle(
                            path.iter()
                                .map(|p| p.to_string())
                                .collect::<Vec<_>>()
                                .join(" -> "),
                        ));
                    }
                    current = next.value().clone();
                }
                None => return Ok(None),
            }
        }
    }

    pub fn by_id(&self, type_id: u32) -> Option<Arc<TypeDescriptor>> {
        self.by_id.get(&type_id).map(|entry| entry.value().clone())
    }

    /// Resolve the canonical descriptor for an encode of `descriptor`'s
    /// type. Auto-registers on first use unless strict registration is on;
    /// raised errors happen before any bytes of the object are emitted.
    pub fn resolve_for_encode(
        &self,
        descriptor: &Arc<TypeDescriptor>,
        strict_registration: bool,
    ) -> Result<Arc<TypeDescriptor>> {
        if let Some(found) = self.lookup(&descriptor.qualified_name)? {
            if !found.same_shape(descriptor) {
                return Err(Error::RegistrationConflict {
                    name: descriptor.qualified_name.to_string(),
                    reason: "value descriptor differs from the registered shape".into(),
                });
            }
            return Ok(found);
        }
        if strict_registration {
            return Err(Error::ClassUnregistered(
                descriptor.qualified_name.to_string(),
            ));
        }
        log::debug!(
            "[registry] implicit registration of {}",
            descriptor.qualified_name
        );
        self.register(descriptor.as_ref().clone())
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WireType;

    fn point() -> TypeDescriptor {
        TypeDescriptor::object("demo.Point")
            .field("x", WireType::I32)
            .field("y", WireType::I32)
            .build()
    }

    #[test]
    fn test_register_assigns_user_ids() {
        let registry = TypeRegistry::new();
        let a = registry.register(point()).expect("register");
        assert!(a.type_id >= USER_ID_BASE);
        let b = registry
            .register(TypeDescriptor::object("demo.Other").build())
            .expect("register");
        assert_ne!(a.type_id, b.type_id);
    }

    #[test]
    fn test_reregistration_is_idempotent() {
        let registry = TypeRegistry::new();
        let first = registry.register(point()).expect("first");
        let second = registry.register(point()).expect("second");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_conflicting_shape_is_rejected() {
        let registry = TypeRegistry::new();
        registry.register(point()).expect("register");
        let other_shape = TypeDescriptor::object("demo.Point")
            .field("x", WireType::F64)
            .build();
        match registry.register(other_shape).unwrap_err() {
            Error::RegistrationConflict { name, .. } => assert_eq!(name, "demo.Point"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_explicit_id_below_builtin_range_is_rejected() {
        let registry = TypeRegistry::new();
        assert!(registry.register_with_id(point(), 3).is_err());
    }

    #[test]
    fn test_explicit_id_conflict_is_rejected() {
        let registry = TypeRegistry::new();
        registry.register_with_id(point(), 100).expect("register");
        let other = TypeDescriptor::object("demo.Other").build();
        assert!(registry.register_with_id(other, 100).is_err());
    }

    #[test]
    fn test_lookup_follows_aliases() {
        let registry = TypeRegistry::new();
        let canonical = registry.register(point()).expect("register");
        registry
            .register_alias("demo.PointV1", "demo.Point")
            .expect("alias");
        let found = registry
            .lookup("demo.PointV1")
            .expect("lookup")
            .expect("resolved");
        assert!(Arc::ptr_eq(&found, &canonical));
    }

    #[test]
    fn test_alias_cycle_is_detected() {
        let registry = TypeRegistry::new();
        registry.register_alias("a", "b").expect("a->b");
        registry.register_alias("b", "a").expect("b->a");
        match registry.lookup("a").unwrap_err() {
            Error::TypeCycle(path) => assert!(path.contains("a") && path.contains("b")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_strict_registration_rejects_unknown_types() {
        let registry = TypeRegistry::new();
        let desc = Arc::new(point());
        match registry.resolve_for_encode(&desc, true).unwrap_err() {
            Error::ClassUnregistered(name) => assert_eq!(name, "demo.Point"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_implicit_registration_when_strict_is_off() {
        let registry = TypeRegistry::new();
        let desc = Arc::new(point());
        let canonical = registry.resolve_for_encode(&desc, false).expect("implicit");
        assert!(canonical.type_id >= USER_ID_BASE);
        assert!(registry.by_id(canonical.type_id).is_some());
    }

    #[test]
    fn test_concurrent_first_registration_converges() {
        let registry = Arc::new(TypeRegistry::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let registry = registry.clone();
            handles.push(std::thread::spawn(move || {
                registry.register(point()).expect("register").type_id
            }));
        }
        let ids: Vec<u32> = handles.into_iter().map(|h| h.join().expect("join")).collect();
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
    }
}
