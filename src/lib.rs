#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

/// The error type shared by every container in the crate.
pub mod error;

/// FNV-1a hashing, the default hasher of every container.
pub mod fnv;

pub mod hash_table;

/// A dense map layered over the hash table.
///
/// This module provides a `Map` that keeps its values packed in a vector and
/// uses the `HashTable` to find them by key.
pub mod map;

/// A handle registry layered over the map.
///
/// This module provides a `Storage` that assigns a fresh `Handle` to every
/// value pushed into it.
pub mod storage;

pub use error::Error;
pub use fnv::FnvBuildHasher;
pub use hash_table::HashTable;
pub use hash_table::Key;
pub use hash_table::NULL_KEY;
pub use hash_table::Value;
pub use map::Map;
pub use storage::Handle;
pub use storage::Storage;

cfg_if::cfg_if! {
    if #[cfg(feature = "foldhash")] {
        /// A randomly seeded [foldhash](https://docs.rs/foldhash) hasher
        /// builder.
        ///
        /// Every instance draws its own seed, so bucket placement cannot be
        /// predicted ahead of time. Pass it as the `S` parameter of any
        /// container when keys may be chosen by an adversary.
        pub type FoldHashBuilder = foldhash::fast::RandomState;
    }
}

#[cfg(all(test, feature = "foldhash"))]
mod tests {
    use core::hash::BuildHasher;

    use super::*;

    #[test]
    fn foldhash_backed_containers() {
        let mut table = HashTable::with_hasher(foldhash::fast::FixedState::with_seed(0x1234));
        for key in 1..=100u64 {
            table.set(key, key * 2).unwrap();
        }
        for key in (1..=100u64).step_by(2) {
            assert_eq!(table.remove(key), Some(key * 2));
        }
        for key in (2..=100u64).step_by(2) {
            assert_eq!(table.get(key), Some(&(key * 2)));
        }

        let mut storage = Storage::with_hasher(FoldHashBuilder::default());
        let handle = storage.push("value").unwrap();
        assert_eq!(storage[handle], "value");
        assert_eq!(storage.remove(handle), Some("value"));
    }

    #[test]
    fn foldhash_builders_are_seeded_per_instance() {
        let first = FoldHashBuilder::default();
        let second = FoldHashBuilder::default();
        let differing = (1..=8u64)
            .filter(|&key| first.hash_one(key) != second.hash_one(key))
            .count();
        assert!(differing > 0);

        assert_eq!(first.hash_one(42u64), first.hash_one(42u64));
    }
}
