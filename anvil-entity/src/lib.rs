//! Array-based data structures using densely numbered entity references as
//! mapping keys.
//!
//! This crate defines a number of data structures based on arrays. The arrays
//! are not indexed by `usize` as usual, but by *entity references*: small
//! integer indices wrapped in a new type. The `entity_impl!` macro defines
//! such a reference type for a `u32` wrapper struct.
//!
//! While the `EntityRef` trait is checked at the type level, the wrapped
//! index is not: an entity reference is only meaningful relative to the
//! `PrimaryMap` that allocated it.
//!
//! The data structures are:
//!
//! - [`PrimaryMap`] is used to keep track of a vector of entities, assigning
//!   a unique entity reference to each.
//! - [`SecondaryMap`] associates extra data with entities allocated
//!   elsewhere; all keys have a default value which is not stored.
//! - [`EntityList`] is a compact representation of lists of entity
//!   references allocated from an associated memory pool, such that many
//!   lists can grow independently without invalidating one another.

#![deny(missing_docs)]
#![no_std]

extern crate alloc;

/// A type wrapping a small integer index should implement `EntityRef` so it
/// can be used as the key of a [`SecondaryMap`] or allocated from a
/// [`PrimaryMap`].
pub trait EntityRef: Copy + Eq {
    /// Create a new entity reference from a small integer.
    /// This should crash if the requested index is not representable.
    fn new(_: usize) -> Self;

    /// Get the index that was used to create this entity reference.
    fn index(self) -> usize;
}

/// Macro which provides the common implementation of a 32-bit entity
/// reference: `EntityRef`, `ReservedValue` (with `u32::MAX` reserved as the
/// "none" sentinel), raw `u32` conversions, and, given a display prefix,
/// `Display` and `Debug` rendering as `prefix` followed by the index.
#[macro_export]
macro_rules! entity_impl {
    // Basic traits: EntityRef, ReservedValue, u32 conversions.
    ($entity:ident) => {
        impl $crate::EntityRef for $entity {
            #[inline]
            fn new(index: usize) -> Self {
                debug_assert!(index < (core::u32::MAX as usize));
                $entity(index as u32)
            }

            #[inline]
            fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl $crate::packed_option::ReservedValue for $entity {
            #[inline]
            fn reserved_value() -> $entity {
                $entity(core::u32::MAX)
            }

            #[inline]
            fn is_reserved_value(&self) -> bool {
                self.0 == core::u32::MAX
            }
        }

        impl $entity {
            /// Create a new instance from a `u32`.
            #[allow(dead_code)]
            #[inline]
            pub fn from_u32(x: u32) -> Self {
                debug_assert!(x < core::u32::MAX);
                $entity(x)
            }

            /// Return the underlying index value as a `u32`.
            #[allow(dead_code)]
            #[inline]
            pub fn as_u32(self) -> u32 {
                self.0
            }
        }
    };

    // Include basic traits and add Display/Debug with a prefix.
    ($entity:ident, $display_prefix:expr) => {
        $crate::entity_impl!($entity);

        impl core::fmt::Display for $entity {
            fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
                write!(f, concat!($display_prefix, "{}"), self.0)
            }
        }

        impl core::fmt::Debug for $entity {
            fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
                (self as &dyn core::fmt::Display).fmt(f)
            }
        }
    };
}

pub mod packed_option;

mod iter;
mod keys;
mod list;
mod map;
mod primary;

pub use self::iter::{Iter, IterMut};
pub use self::keys::Keys;
pub use self::list::{EntityList, ListPool};
pub use self::map::SecondaryMap;
pub use self::primary::PrimaryMap;
