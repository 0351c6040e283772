// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Engine configuration and wire constants - single source of truth.
//!
//! All wire-level magic values, flag bits and reference-flag bytes live
//! here. **Never hardcode these elsewhere!**
//!
//! Two configuration levels:
//! - **Level 1 (Static)**: compile-time wire constants below
//! - **Level 2 (Per-engine)**: [`Config`], frozen at engine build time

// =======================================================================
// Wire Header
// =======================================================================

/// Wire magic, first two bytes of every payload (little-endian on the wire).
pub const WIRE_MAGIC: u16 = 0x5257;

/// Header flag: payload was produced in compatible mode (schema blocks ride
/// along with the data).
pub const FLAG_COMPATIBLE: u8 = 0b0000_0001;

/// Header flag: reference tracking was on for this payload.
pub const FLAG_REF_TRACKING: u8 = 0b0000_0010;

/// Header flag: payload integers are little-endian. Always set by this
/// implementation; a clear bit is rejected on decode.
pub const FLAG_LITTLE_ENDIAN: u8 = 0b0000_0100;

// =======================================================================
// Reference Flags
// =======================================================================
// One signed byte ahead of every value position. Negative values are
// terminal for the reader (no body follows except the backref id).

/// The value is null. Never assigned a reference id.
pub const NULL_FLAG: i8 = -3;

/// Backreference: a varuint32 reference id follows instead of a body.
pub const REF_FLAG: i8 = -2;

/// Non-null value that does not participate in reference tracking.
pub const NOT_NULL_FLAG: i8 = -1;

/// First occurrence of a tracked identity; the body follows and the reader
/// must assign the next sequential reference id before recursing.
pub const REF_VALUE_FLAG: i8 = 0;

// =======================================================================
// Registry / Dispatch Limits
// =======================================================================

/// First type id available to user registrations. Tokens below this are
/// built-in wire kinds.
pub const USER_ID_BASE: u32 = 64;

/// Traversal depth limit applied when reference tracking is disabled; hitting
/// it means the graph is cyclic and the call fails instead of recursing
/// forever. Low enough that the abort happens well inside a 2 MiB stack.
pub const MAX_UNTRACKED_DEPTH: usize = 256;

/// Alias/nesting resolution limit for type-definition paths.
pub const MAX_TYPE_DEPTH: usize = 64;

/// Decode failures retain already-reconstructed objects only up to this
/// count; larger partial graphs are dropped.
pub const MAX_PARTIAL_OBJECTS: usize = 32;

/// Generic object-strategy use count after which the flat fast path is built
/// for eligible types.
pub const FLAT_STRATEGY_THRESHOLD: u32 = 32;

/// Field-alignment plans cached per engine (LRU).
pub const PLAN_CACHE_CAPACITY: usize = 256;

// =======================================================================
// Engine Configuration
// =======================================================================

/// Schema exchange mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Both ends must hold the identical schema; any shape mismatch at decode
    /// is a hard error. No per-object schema blocks are sent, only a
    /// fingerprint on first use of each type per call.
    SchemaConsistent,
    /// Field additions and removals between producer and consumer are
    /// tolerated; schema blocks ride along and are reconciled at decode.
    Compatible,
}

/// Per-engine configuration, frozen at build time.
///
/// Constructed through `Engine::builder()`; sessions read it, never write it.
#[derive(Debug, Clone)]
pub struct Config {
    /// Schema exchange mode.
    pub mode: Mode,
    /// Assign reference ids to object identities during traversal so shared
    /// and cyclic graphs round-trip. Disable only for acyclic, non-shared
    /// graphs; a cycle under disabled tracking is detected and fails.
    pub ref_tracking: bool,
    /// Require explicit registration before a type can be encoded or decoded.
    /// Deserializing unregistered types is a known attack surface.
    pub strict_registration: bool,
    /// Skip the read-side high-water guard for trusted inputs. Slice
    /// operations still abort on overrun; this only elides the graceful
    /// error path.
    pub trusted_input: bool,
    /// Pass schema blocks through the configured compressor when it shrinks
    /// them (compatible mode only).
    pub compress_schema: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::Compatible,
            ref_tracking: true,
            strict_registration: false,
            trusted_input: false,
            compress_schema: true,
        }
    }
}

impl Config {
    /// Header flag byte for payloads produced under this config.
    pub fn header_flags(&self) -> u8 {
        let mut flags = FLAG_LITTLE_ENDIAN;
        if self.mode == Mode::Compatible {
            flags |= FLAG_COMPATIBLE;
        }
        if self.ref_tracking {
            flags |= FLAG_REF_TRACKING;
        }
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_flags() {
        let config = Config::default();
        let flags = config.header_flags();
        assert_ne!(flags & FLAG_COMPATIBLE, 0);
        assert_ne!(flags & FLAG_REF_TRACKING, 0);
        assert_ne!(flags & FLAG_LITTLE_ENDIAN, 0);
    }

    #[test]
    fn test_strict_mode_clears_compatible_flag() {
        let config = Config {
            mode: Mode::SchemaConsistent,
            ref_tracking: false,
            ..Config::default()
        };
        let flags = config.header_flags();
        assert_eq!(flags & FLAG_COMPATIBLE, 0);
        assert_eq!(flags & FLAG_REF_TRACKING, 0);
        assert_ne!(flags & FLAG_LITTLE_ENDIAN, 0);
    }

    #[test]
    fn test_ref_flags_are_distinct() {
        let flags = [NULL_FLAG, REF_FLAG, NOT_NULL_FLAG, REF_VALUE_FLAG];
        for (i, a) in flags.iter().enumerate() {
            for b in &flags[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
