// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Engine error taxonomy.
//!
//! One enum for the whole crate. Nothing is retried internally: the engine
//! is a synchronous byte transform and carries no state across calls, so
//! retry policy (typically "retry under a different mode") belongs to the
//! caller.

use crate::value::Value;

/// Errors raised by the serialization engine.
#[derive(Debug)]
pub enum Error {
    // ========================================================================
    // Registration Errors
    // ========================================================================
    /// Strict registration is on and the type was never registered.
    ClassUnregistered(String),
    /// The type is registered but no strategy resolves for it
    /// (extension types require a user-registered strategy).
    SerializerUnregistered(String),
    /// A name or type id is already taken by a different backing type.
    RegistrationConflict { name: String, reason: String },
    /// Type-definition cycle detected while resolving a type path
    /// (alias loops, unbounded nesting). Distinct from instance cycles,
    /// which reference tracking owns.
    TypeCycle(String),

    // ========================================================================
    // Encode Errors
    // ========================================================================
    /// A value does not match the declared wire type of its position.
    ValueMismatch { expected: String, got: String },
    /// Field access against a descriptor that does not declare it.
    FieldNotFound { type_name: String, field: String },
    /// Reference tracking is disabled and the traversal depth limit was hit,
    /// which means the graph is cyclic (or absurdly deep).
    CycleDetected { depth: usize },

    // ========================================================================
    // Wire Errors
    // ========================================================================
    /// Read past the writer's high-water mark.
    OutOfBounds {
        offset: usize,
        requested: usize,
        limit: usize,
    },
    /// Payload does not start with the wire magic.
    BadMagic(u16),
    /// Type token does not resolve in the local registry.
    UnknownTypeId(u32),
    /// Malformed wire content (bad token, bad symbol index, bad UTF-8, ...).
    InvalidData(String),
    /// Strict structural mode and the remote schema shape diverges from the
    /// local one. Switch to compatible mode if drift is expected.
    ClassNotCompatible {
        type_name: String,
        local: String,
        remote: String,
    },
    /// Generic decode failure wrapping the root cause. `partial` carries the
    /// objects reconstructed before the failure, but only when that list is
    /// small; a large partial graph is dropped rather than retained.
    Deserialization {
        source: Box<Error>,
        partial: Vec<Value>,
    },

    // ========================================================================
    // Collaborator Errors
    // ========================================================================
    /// Schema-block compressor failure, propagated unchanged.
    Compression(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // Registration
            Error::ClassUnregistered(name) => {
                write!(f, "Type not registered (strict registration): {}", name)
            }
            Error::SerializerUnregistered(name) => {
                write!(f, "No serializer strategy for registered type: {}", name)
            }
            Error::RegistrationConflict { name, reason } => {
                write!(f, "Registration conflict for {}: {}", name, reason)
            }
            Error::TypeCycle(path) => write!(f, "Type-definition cycle: {}", path),
            // Encode
            Error::ValueMismatch { expected, got } => {
                write!(f, "Value mismatch: expected {}, got {}", expected, got)
            }
            Error::FieldNotFound { type_name, field } => {
                write!(f, "No field {} on type {}", field, type_name)
            }
            Error::CycleDetected { depth } => write!(
                f,
                "Cycle detected at depth {} with reference tracking disabled",
                depth
            ),
            // Wire
            Error::OutOfBounds {
                offset,
                requested,
                limit,
            } => write!(
                f,
                "Out of bounds: {} bytes at offset {} (limit {})",
                requested, offset, limit
            ),
            Error::BadMagic(magic) => write!(f, "Bad wire magic: 0x{:04x}", magic),
            Error::UnknownTypeId(id) => write!(f, "Unknown type id: {}", id),
            Error::InvalidData(msg) => write!(f, "Invalid wire data: {}", msg),
            Error::ClassNotCompatible {
                type_name,
                local,
                remote,
            } => write!(
                f,
                "Schema mismatch for {} (local {}, remote {})",
                type_name, local, remote
            ),
            Error::Deserialization { source, partial } => write!(
                f,
                "Deserialization failed ({} partial objects retained): {}",
                partial.len(),
                source
            ),
            // Collaborators
            Error::Compression(msg) => write!(f, "Compressor failure: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Deserialization { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Convenient alias for API results using the crate `Error` type.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_out_of_bounds() {
        let err = Error::OutOfBounds {
            offset: 10,
            requested: 4,
            limit: 12,
        };
        assert_eq!(err.to_string(), "Out of bounds: 4 bytes at offset 10 (limit 12)");
    }

    #[test]
    fn test_display_class_not_compatible() {
        let err = Error::ClassNotCompatible {
            type_name: "demo.Point".into(),
            local: "00112233aabbccdd".into(),
            remote: "ffee00112233aabb".into(),
        };
        let text = err.to_string();
        assert!(text.contains("demo.Point"));
        assert!(text.contains("ffee00112233aabb"));
    }

    #[test]
    fn test_deserialization_source_chain() {
        let err = Error::Deserialization {
            source: Box::new(Error::UnknownTypeId(99)),
            partial: Vec::new(),
        };
        let source = std::error::Error::source(&err).expect("source should be set");
        assert!(source.to_string().contains("99"));
    }
}
