//! Layer identity and skip declarations.
//!
//! Middleware, guards, and interceptors may carry a [`LayerId`]. A narrower
//! scope can then opt out of an inherited layer by listing its identity in a
//! skip declaration; the endpoint compiler drops skipped layers from the
//! chain before any request runs. Anonymous layers (no identity) can never be
//! skipped, and pre-execute hooks are outside the skip mechanism entirely.

use std::collections::HashSet;
use std::fmt;

use trellis_core::NamedKey;

/// Metadata key under which a scope's skip declarations live.
///
/// Skip sets ride the ordinary metadata channel, so the layered override
/// rules (narrower scope wins) apply to them unchanged.
pub(crate) const SKIP_KEY: &str = "trellis.skip";

/// The set of layer identities a scope skips.
pub(crate) type SkipSet = HashSet<LayerId>;

/// Returns the metadata key addressing a scope's skip set.
pub(crate) fn skip_key() -> NamedKey {
    NamedKey::new(SKIP_KEY)
}

/// A stable identity for a skippable pipeline layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerId(&'static str);

impl LayerId {
    /// The reserved identity matching every guard on an endpoint.
    pub const ALL_GUARDS: Self = Self("trellis.all_guards");

    /// Creates an identity from an explicit name.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// Derives an identity from a Rust type.
    ///
    /// Layers implemented as named structs typically use their own type here,
    /// which gives every instance of the layer the same skippable identity.
    #[must_use]
    pub fn of<T: ?Sized>() -> Self {
        Self(std::any::type_name::<T>())
    }

    /// Returns the identity's name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AuthGuard;
    struct AuditLog;

    #[test]
    fn test_type_derived_ids_are_stable_and_distinct() {
        assert_eq!(LayerId::of::<AuthGuard>(), LayerId::of::<AuthGuard>());
        assert_ne!(LayerId::of::<AuthGuard>(), LayerId::of::<AuditLog>());
    }

    #[test]
    fn test_named_id_does_not_collide_with_reserved() {
        assert_ne!(LayerId::new("all_guards"), LayerId::ALL_GUARDS);
    }
}
