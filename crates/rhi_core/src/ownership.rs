//! Ownership model deciding who destroys a managed object
//!
//! Every object starts out [`Ownership::Reference`]: its lifetime belongs to the registry that
//! created it (or to whoever explicitly destroys it). Composite objects mark the sub-objects they
//! create as [`Ownership::Exclusive`] and destroy them during their own teardown.
//! [`Ownership::Restricted`] is absorbing: once an object enters it, no further transition is
//! applied.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

/// Destruction responsibility for a managed object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Ownership {
    /// Lifetime is managed by the owning registry or the application
    #[default]
    Reference,
    /// The containing object must destroy this object
    Exclusive,
    /// Owned by a containing object and frozen against further changes
    Restricted,
}

impl Ownership {
    /// Resolve a requested transition against the current state.
    ///
    /// Reference and Exclusive move freely between each other and into Restricted;
    /// Restricted never leaves.
    #[must_use]
    pub const fn transition(self, requested: Self) -> Self {
        match self {
            Self::Restricted => Self::Restricted,
            Self::Reference | Self::Exclusive => requested,
        }
    }

    /// True when a containing object is responsible for destruction
    pub const fn is_owned_by_parent(self) -> bool {
        !matches!(self, Self::Reference)
    }

    const fn to_bits(self) -> u8 {
        match self {
            Self::Reference => 0,
            Self::Exclusive => 1,
            Self::Restricted => 2,
        }
    }

    const fn from_bits(bits: u8) -> Self {
        match bits {
            1 => Self::Exclusive,
            2 => Self::Restricted,
            _ => Self::Reference,
        }
    }
}

impl fmt::Display for Ownership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Reference => "reference",
            Self::Exclusive => "exclusive",
            Self::Restricted => "restricted",
        };
        f.write_str(name)
    }
}

/// Ownership storage embedded in every object header
pub struct OwnershipCell {
    bits: AtomicU8,
}

impl OwnershipCell {
    /// Create a cell holding `ownership`
    pub const fn new(ownership: Ownership) -> Self {
        Self {
            bits: AtomicU8::new(ownership.to_bits()),
        }
    }

    /// Current ownership
    pub fn get(&self) -> Ownership {
        Ownership::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// Request a transition, returning the ownership now in effect
    pub fn set(&self, requested: Ownership) -> Ownership {
        let result = self
            .bits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                Some(Ownership::from_bits(bits).transition(requested).to_bits())
            });
        let previous = match result {
            Ok(bits) | Err(bits) => Ownership::from_bits(bits),
        };
        previous.transition(requested)
    }

    /// Move from `expected` to `new` only if the cell currently holds `expected`.
    ///
    /// Returns the ownership found when the exchange fails.
    pub fn exchange(&self, expected: Ownership, new: Ownership) -> Result<(), Ownership> {
        self.bits
            .compare_exchange(
                expected.to_bits(),
                expected.transition(new).to_bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(Ownership::from_bits)
    }
}

impl Default for OwnershipCell {
    fn default() -> Self {
        Self::new(Ownership::Reference)
    }
}

impl fmt::Debug for OwnershipCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OwnershipCell").field(&self.get()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_reference() {
        let cell = OwnershipCell::default();
        assert_eq!(cell.get(), Ownership::Reference);
    }

    #[test]
    fn test_reference_exclusive_round_trip() {
        let cell = OwnershipCell::default();
        assert_eq!(cell.set(Ownership::Exclusive), Ownership::Exclusive);
        assert_eq!(cell.set(Ownership::Reference), Ownership::Reference);
        assert_eq!(cell.get(), Ownership::Reference);
    }

    #[test]
    fn test_restricted_is_sticky() {
        let cell = OwnershipCell::new(Ownership::Exclusive);
        assert_eq!(cell.set(Ownership::Restricted), Ownership::Restricted);

        assert_eq!(cell.set(Ownership::Reference), Ownership::Restricted);
        assert_eq!(cell.set(Ownership::Exclusive), Ownership::Restricted);
        assert_eq!(cell.get(), Ownership::Restricted);
    }

    #[test]
    fn test_exchange_only_from_expected() {
        let cell = OwnershipCell::default();
        assert!(cell.exchange(Ownership::Reference, Ownership::Exclusive).is_ok());
        assert_eq!(
            cell.exchange(Ownership::Reference, Ownership::Exclusive),
            Err(Ownership::Exclusive)
        );

        let restricted = OwnershipCell::new(Ownership::Restricted);
        assert_eq!(
            restricted.exchange(Ownership::Reference, Ownership::Exclusive),
            Err(Ownership::Restricted)
        );
    }

    #[test]
    fn test_parent_ownership() {
        assert!(!Ownership::Reference.is_owned_by_parent());
        assert!(Ownership::Exclusive.is_owned_by_parent());
        assert!(Ownership::Restricted.is_owned_by_parent());
    }
}
