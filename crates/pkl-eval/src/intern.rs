//! Identifier interning for property and method names.
//!
//! Every name mentioned in a module is interned once and referred to by a
//! compact [`Identifier`] afterwards. Each interned name owns a *pair* of
//! ids: the public form (`x`) and a disjoint `local` companion (`local x`),
//! so name resolution can look up `local x` without aliasing `x`.
//!
//! The interner is owned by the evaluator and lives for its lifetime.
//! Lookups of the backing string are needed only for member dispatch on
//! builtin values and for error messages.
//!
//! Identifier ids are laid out as follows:
//! * bit 0 — the `local` flag; `2n` is the public id, `2n + 1` its local companion
//! * pair indices `0..WellKnown::COUNT` — names the evaluator consults itself
//! * pair indices `WellKnown::COUNT..` — names interned per evaluator

use std::rc::Rc;

use ahash::AHashMap;
use strum::{EnumCount, FromRepr, IntoStaticStr};

/// An interned property or method name.
///
/// Uses `u32` to save space. Two identifiers compare equal iff they came
/// from the same `intern` call (and the same local/public side of the pair).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct Identifier(u32);

impl Identifier {
    /// Returns the `local` companion of this identifier.
    ///
    /// A `local foo` member is stored under the companion id so that a
    /// public `foo` on the same object never collides with it.
    #[inline]
    #[must_use]
    pub fn local_of(self) -> Self {
        Self(self.0 | 1)
    }

    /// Returns the public side of this identifier pair.
    #[inline]
    #[must_use]
    pub fn public_of(self) -> Self {
        Self(self.0 & !1)
    }

    /// Whether this identifier is a `local` companion.
    #[inline]
    #[must_use]
    pub fn is_local(self) -> bool {
        self.0 & 1 == 1
    }

    /// Index of the identifier pair in the interner's storage.
    #[inline]
    fn pair_index(self) -> usize {
        (self.0 >> 1) as usize
    }

    fn from_pair_index(index: usize) -> Self {
        let index = u32::try_from(index).expect("interner overflowed u32 id space");
        Self(index << 1)
    }
}

/// Names the evaluator itself consults, pre-interned at fixed ids.
///
/// Interned first, in declaration order, so `WellKnown::Output.identifier()`
/// and `interner.intern("output")` agree without a lookup.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, IntoStaticStr, EnumCount)]
#[strum(serialize_all = "camelCase")]
pub enum WellKnown {
    Output,
    Value,
    Text,
    Default,
}

impl WellKnown {
    /// The fixed public identifier of this well-known name.
    #[inline]
    #[must_use]
    pub fn identifier(self) -> Identifier {
        Identifier((self as u32) << 1)
    }
}

/// Per-evaluator name interner.
///
/// Stores each distinct name once and hands out [`Identifier`]s. The local
/// companion of every name shares the stored string; only the id differs.
#[derive(Debug)]
pub struct Interner {
    names: Vec<Rc<str>>,
    ids: AHashMap<Rc<str>, u32>,
}

impl Interner {
    /// Creates an interner with all [`WellKnown`] names pre-interned.
    #[must_use]
    pub fn new() -> Self {
        let mut interner = Self {
            names: Vec::with_capacity(64),
            ids: AHashMap::with_capacity(64),
        };
        for repr in 0..WellKnown::COUNT {
            let well_known = WellKnown::from_repr(repr as u32).expect("well-known repr in range");
            let name: &'static str = well_known.into();
            let id = interner.intern(name);
            debug_assert_eq!(id, well_known.identifier());
        }
        interner
    }

    /// Interns a name, returning its public identifier.
    ///
    /// Interning the same name twice returns the same identifier.
    pub fn intern(&mut self, name: &str) -> Identifier {
        if let Some(&index) = self.ids.get(name) {
            return Identifier::from_pair_index(index as usize);
        }
        let stored: Rc<str> = Rc::from(name);
        let index = self.names.len();
        self.names.push(Rc::clone(&stored));
        self.ids
            .insert(stored, u32::try_from(index).expect("interner overflowed u32 id space"));
        Identifier::from_pair_index(index)
    }

    /// Returns the name behind an identifier (without any `local` prefix).
    #[must_use]
    pub fn resolve(&self, id: Identifier) -> &str {
        &self.names[id.pair_index()]
    }

    /// Returns the name for display in errors, prefixing `local` companions.
    #[must_use]
    pub fn display(&self, id: Identifier) -> String {
        let name = self.resolve(id);
        if id.is_local() {
            format!("local {name}")
        } else {
            name.to_owned()
        }
    }
}

impl Default for Interner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_is_idempotent() {
        let mut interner = Interner::new();
        let a = interner.intern("diet");
        let b = interner.intern("diet");
        assert_eq!(a, b, "same name must intern to the same identifier");
    }

    #[test]
    fn local_companion_is_disjoint() {
        let mut interner = Interner::new();
        let id = interner.intern("name");
        let local = id.local_of();
        assert_ne!(id, local);
        assert!(local.is_local());
        assert!(!id.is_local());
        assert_eq!(local.public_of(), id);
        assert_eq!(interner.resolve(id), interner.resolve(local));
    }

    #[test]
    fn well_known_ids_are_fixed() {
        let mut interner = Interner::new();
        assert_eq!(interner.intern("output"), WellKnown::Output.identifier());
        assert_eq!(interner.intern("value"), WellKnown::Value.identifier());
        assert_eq!(interner.intern("text"), WellKnown::Text.identifier());
        assert_eq!(interner.intern("default"), WellKnown::Default.identifier());
    }
}
