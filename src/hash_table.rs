//! Open-addressing hash table from non-zero `u64` keys to `u64` values.
//!
//! Collisions are resolved with linear probing over a power-of-two slot
//! array. Key `0` marks an empty slot, so the table carries no per-slot
//! metadata and no tombstones: removal shifts the rest of the probe cluster
//! backwards instead.

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt::Debug;
use core::hash::BuildHasher;
use core::iter::FusedIterator;

use crate::error::Error;
use crate::fnv::FnvBuildHasher;

/// Key type of the table.
pub type Key = u64;

/// Payload stored next to each key. [`Map`](crate::Map) stores dense
/// indexes here.
pub type Value = u64;

/// Key reserved for empty slots. It can never be stored.
pub const NULL_KEY: Key = 0;

const DEFAULT_CAPACITY: usize = 2;

#[derive(Clone, Copy, PartialEq, Eq)]
struct Slot {
    key: Key,
    value: Value,
}

impl Slot {
    const EMPTY: Slot = Slot {
        key: NULL_KEY,
        value: 0,
    };

    #[inline(always)]
    fn is_empty(&self) -> bool {
        self.key == NULL_KEY
    }
}

/// Smallest slot count that holds `len` entries without growing.
///
/// The table grows before an insertion once half of its slots are in use, so
/// storing `len` entries needs at least `2 * len` slots.
#[inline]
fn slots_for(len: usize) -> Option<usize> {
    len.checked_mul(2)?
        .max(DEFAULT_CAPACITY)
        .checked_next_power_of_two()
}

/// Probe statistics for a [`HashTable`].
///
/// Only compiled in tests or with the `stats` feature.
#[cfg(any(test, feature = "stats"))]
#[derive(Debug, Clone, PartialEq)]
pub struct TableStats {
    /// Number of live entries.
    pub len: usize,
    /// Number of slots.
    pub capacity: usize,
    /// `len / capacity`.
    pub load_factor: f64,
    /// `probe_histogram[d]` counts entries stored `d` slots after their home
    /// bucket.
    pub probe_histogram: Vec<usize>,
    /// Largest distance between an entry and its home bucket.
    pub max_displacement: usize,
    /// Mean distance between an entry and its home bucket.
    pub mean_displacement: f64,
    /// Number of maximal runs of occupied slots.
    pub clusters: usize,
    /// Length of the longest run of occupied slots.
    pub longest_cluster: usize,
}

#[cfg(any(test, feature = "stats"))]
impl TableStats {
    /// Pretty-print the statistics.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        println!("=== Hash Table Statistics ===");
        println!(
            "Population: {}/{} ({:.2}% load factor)",
            self.len,
            self.capacity,
            self.load_factor * 100.0
        );
        println!(
            "Clusters: {} (longest {} slots)",
            self.clusters, self.longest_cluster
        );
        println!(
            "Displacement: max {}, mean {:.3}",
            self.max_displacement, self.mean_displacement
        );
        let widest = self.probe_histogram.iter().copied().max().unwrap_or(0);
        for (distance, &count) in self.probe_histogram.iter().enumerate() {
            let bar_len = (count * 50).checked_div(widest).unwrap_or(0);
            println!("{distance:>4}: {count:>8} {}", "#".repeat(bar_len));
        }
    }
}

/// A linear-probing hash table keyed by non-zero `u64`s.
///
/// `HashTable` maps [`Key`]s to 8-byte [`Value`]s. Keys are hashed with `S`
/// (FNV-1a by default) and placed at `hash & (capacity - 1)`, or the next
/// free slot after it. The slot count is always a power of two and doubles
/// before an insertion whenever half of the slots are in use.
///
/// ## Example
///
/// ```rust
/// use compact_storage::HashTable;
///
/// let mut table = HashTable::new();
/// table.set(42, 7)?;
/// table.set(43, 9)?;
///
/// assert_eq!(table.get(42), Some(&7));
/// assert_eq!(table.remove(43), Some(9));
/// assert_eq!(table.get(43), None);
/// # Ok::<(), compact_storage::Error>(())
/// ```
#[derive(Clone)]
pub struct HashTable<S = FnvBuildHasher> {
    slots: Box<[Slot]>,
    len: usize,
    hash_builder: S,
}

impl<S> Debug for HashTable<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HashTable")
            .field("len", &self.len)
            .field("capacity", &self.capacity())
            .field("entries", &self.iter().collect::<Vec<_>>())
            .finish()
    }
}

impl HashTable<FnvBuildHasher> {
    /// Creates an empty table with the default capacity of two slots.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use compact_storage::HashTable;
    /// #
    /// let table = HashTable::new();
    /// assert!(table.is_empty());
    /// assert_eq!(table.capacity(), 2);
    /// ```
    pub fn new() -> Self {
        Self::with_hasher(FnvBuildHasher)
    }

    /// Creates an empty table that can hold `capacity` entries without
    /// growing.
    ///
    /// # Panics
    ///
    /// Panics if the required slot count overflows `usize`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use compact_storage::HashTable;
    /// #
    /// let table = HashTable::with_capacity(100);
    /// assert_eq!(table.capacity(), 256);
    /// ```
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, FnvBuildHasher)
    }
}

impl Default for HashTable<FnvBuildHasher> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> HashTable<S> {
    /// Creates an empty table using `hash_builder` to place keys.
    pub fn with_hasher(hash_builder: S) -> Self {
        Self::with_capacity_and_hasher(0, hash_builder)
    }

    /// Creates an empty table that can hold `capacity` entries without
    /// growing, using `hash_builder` to place keys.
    ///
    /// # Panics
    ///
    /// Panics if the required slot count overflows `usize`.
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        let slots = slots_for(capacity).expect("hash table capacity overflow");
        Self {
            slots: vec![Slot::EMPTY; slots].into_boxed_slice(),
            len: 0,
            hash_builder,
        }
    }

    /// Returns the number of live entries.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the number of slots. Always a power of two.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Returns a reference to the table's hasher builder.
    pub fn hasher(&self) -> &S {
        &self.hash_builder
    }

    /// Empties every slot. The capacity is unchanged.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use compact_storage::HashTable;
    /// #
    /// let mut table = HashTable::new();
    /// for key in 1..=10 {
    ///     table.set(key, key * 2)?;
    /// }
    /// let capacity = table.capacity();
    ///
    /// table.clear();
    /// assert!(table.is_empty());
    /// assert_eq!(table.capacity(), capacity);
    /// # Ok::<(), compact_storage::Error>(())
    /// ```
    pub fn clear(&mut self) {
        if self.len > 0 {
            self.slots.fill(Slot::EMPTY);
            self.len = 0;
        }
    }

    /// Returns an iterator over live `(key, value)` pairs in slot order.
    ///
    /// The order is unrelated to insertion order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use compact_storage::HashTable;
    /// #
    /// let mut table = HashTable::new();
    /// table.set(1, 10)?;
    /// table.set(2, 20)?;
    ///
    /// let mut pairs: Vec<_> = table.iter().collect();
    /// pairs.sort();
    /// assert_eq!(pairs, [(1, 10), (2, 20)]);
    /// # Ok::<(), compact_storage::Error>(())
    /// ```
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            slots: self.slots.iter(),
            remaining: self.len,
        }
    }

    /// Returns an iterator over live entries yielding mutable references to
    /// the values.
    pub fn iter_mut(&mut self) -> IterMut<'_> {
        IterMut {
            slots: self.slots.iter_mut(),
            remaining: self.len,
        }
    }

    /// Returns an iterator over the live keys.
    pub fn keys(&self) -> Keys<'_> {
        Keys { inner: self.iter() }
    }

    #[inline(always)]
    fn mask(&self) -> usize {
        self.slots.len() - 1
    }
}

impl<S> HashTable<S>
where
    S: BuildHasher,
{
    #[inline(always)]
    fn bucket(&self, key: Key) -> usize {
        self.hash_builder.hash_one(key) as usize & self.mask()
    }

    /// Walks the probe sequence of `key`.
    ///
    /// Returns `Ok(index)` of the slot holding `key`, or `Err(index)` of the
    /// empty slot that ends its cluster. Termination relies on at least one
    /// slot being empty, which `len < capacity` guarantees.
    #[inline]
    fn probe(&self, key: Key) -> Result<usize, usize> {
        debug_assert!(key != NULL_KEY);
        debug_assert!(self.len < self.slots.len());

        let mask = self.mask();
        let mut index = self.bucket(key);
        loop {
            let slot = &self.slots[index];
            if slot.key == key {
                return Ok(index);
            }
            if slot.is_empty() {
                return Err(index);
            }
            index = (index + 1) & mask;
        }
    }

    /// Returns a reference to the value stored for `key`.
    ///
    /// Returns `None` if the key is absent, including for [`NULL_KEY`].
    pub fn get(&self, key: Key) -> Option<&Value> {
        if key == NULL_KEY {
            return None;
        }
        let index = self.probe(key).ok()?;
        Some(&self.slots[index].value)
    }

    /// Returns a mutable reference to the value stored for `key`.
    pub fn get_mut(&mut self, key: Key) -> Option<&mut Value> {
        if key == NULL_KEY {
            return None;
        }
        let index = self.probe(key).ok()?;
        Some(&mut self.slots[index].value)
    }

    /// Returns `true` if `key` is stored in the table.
    pub fn contains_key(&self, key: Key) -> bool {
        self.get(key).is_some()
    }

    /// Stores `value` under `key`, returning the value it replaces.
    ///
    /// If half of the slots are already in use the table doubles first.
    ///
    /// # Errors
    ///
    /// - [`Error::NullKey`] if `key` is [`NULL_KEY`].
    /// - [`Error::CapacityOverflow`] if the slot count cannot double.
    ///
    /// The table is unchanged when an error is returned.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use compact_storage::Error;
    /// # use compact_storage::HashTable;
    /// #
    /// let mut table = HashTable::new();
    /// assert_eq!(table.set(12, 1), Ok(None));
    /// assert_eq!(table.set(12, 2), Ok(Some(1)));
    /// assert_eq!(table.set(0, 3), Err(Error::NullKey));
    /// ```
    pub fn set(&mut self, key: Key, value: Value) -> Result<Option<Value>, Error> {
        if key == NULL_KEY {
            return Err(Error::NullKey);
        }
        if self.len >= self.slots.len() / 2 {
            self.grow()?;
        }

        match self.probe(key) {
            Ok(index) => Ok(Some(core::mem::replace(
                &mut self.slots[index].value,
                value,
            ))),
            Err(index) => {
                self.slots[index] = Slot { key, value };
                self.len += 1;
                Ok(None)
            }
        }
    }

    /// Returns the value slot for `key`, inserting `0` if it is absent.
    ///
    /// # Errors
    ///
    /// Same as [`set`](Self::set).
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use compact_storage::HashTable;
    /// #
    /// let mut table = HashTable::new();
    /// *table.get_or_insert_default(5)? += 3;
    /// *table.get_or_insert_default(5)? += 3;
    /// assert_eq!(table.get(5), Some(&6));
    /// assert_eq!(*table.get_or_insert_default(9999999)?, 0);
    /// # Ok::<(), compact_storage::Error>(())
    /// ```
    pub fn get_or_insert_default(&mut self, key: Key) -> Result<&mut Value, Error> {
        if key == NULL_KEY {
            return Err(Error::NullKey);
        }

        let index = match self.probe(key) {
            Ok(index) => index,
            Err(mut index) => {
                if self.len >= self.slots.len() / 2 {
                    self.grow()?;
                    index = match self.probe(key) {
                        Ok(index) | Err(index) => index,
                    };
                }
                self.slots[index] = Slot { key, value: 0 };
                self.len += 1;
                index
            }
        };

        Ok(&mut self.slots[index].value)
    }

    /// Removes `key`, returning its value. Absent keys are a no-op.
    ///
    /// Entries after the removed slot in the same cluster are shifted back
    /// into the gap when their home bucket allows it, so every remaining key
    /// stays reachable without tombstones.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use compact_storage::HashTable;
    /// #
    /// let mut table = HashTable::new();
    /// table.set(5, 50)?;
    /// table.set(6, 60)?;
    ///
    /// assert_eq!(table.remove(5), Some(50));
    /// assert_eq!(table.remove(5), None);
    /// assert_eq!(table.get(6), Some(&60));
    /// assert_eq!(table.len(), 1);
    /// # Ok::<(), compact_storage::Error>(())
    /// ```
    pub fn remove(&mut self, key: Key) -> Option<Value> {
        if key == NULL_KEY || self.len == 0 {
            return None;
        }

        let mut hole = self.probe(key).ok()?;
        let removed = self.slots[hole].value;
        self.slots[hole] = Slot::EMPTY;
        self.len -= 1;

        let mask = self.mask();
        let mut index = hole;
        loop {
            index = (index + 1) & mask;
            let slot = self.slots[index];
            if slot.is_empty() {
                break;
            }

            // An entry may only move into the hole if the hole is not before
            // its home bucket along the probe sequence.
            let home = self.bucket(slot.key);
            if index.wrapping_sub(home) & mask >= index.wrapping_sub(hole) & mask {
                self.slots[hole] = slot;
                self.slots[index] = Slot::EMPTY;
                hole = index;
            }
        }

        Some(removed)
    }

    /// Makes room for at least `additional` more entries without growing.
    ///
    /// # Errors
    ///
    /// [`Error::CapacityOverflow`] if the required slot count overflows.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use compact_storage::HashTable;
    /// #
    /// let mut table = HashTable::new();
    /// table.reserve(50)?;
    /// let capacity = table.capacity();
    /// for key in 1..=50 {
    ///     table.set(key, key)?;
    /// }
    /// assert_eq!(table.capacity(), capacity);
    /// # Ok::<(), compact_storage::Error>(())
    /// ```
    pub fn reserve(&mut self, additional: usize) -> Result<(), Error> {
        let required = self
            .len
            .checked_add(additional)
            .and_then(slots_for)
            .ok_or(Error::CapacityOverflow)?;
        if required > self.slots.len() {
            self.rehash(required);
        }
        Ok(())
    }

    #[cold]
    fn grow(&mut self) -> Result<(), Error> {
        let capacity = self
            .slots
            .len()
            .checked_mul(2)
            .ok_or(Error::CapacityOverflow)?;
        self.rehash(capacity);
        Ok(())
    }

    /// Moves every live entry into a fresh array of `capacity` slots.
    ///
    /// Entries are re-inserted one by one because home buckets depend on the
    /// slot count.
    fn rehash(&mut self, capacity: usize) {
        debug_assert!(capacity.is_power_of_two());
        debug_assert!(capacity > self.len);

        let old = core::mem::replace(
            &mut self.slots,
            vec![Slot::EMPTY; capacity].into_boxed_slice(),
        );
        for slot in old.iter().filter(|slot| !slot.is_empty()) {
            match self.probe(slot.key) {
                Ok(index) | Err(index) => self.slots[index] = *slot,
            }
        }
    }

    /// Computes probe statistics for the current table state.
    ///
    /// Only compiled in tests or with the `stats` feature.
    #[cfg(any(test, feature = "stats"))]
    pub fn stats(&self) -> TableStats {
        let mask = self.mask();
        let mut probe_histogram = Vec::new();
        let mut total_displacement = 0usize;

        for (index, slot) in self.slots.iter().enumerate() {
            if slot.is_empty() {
                continue;
            }
            let displacement = index.wrapping_sub(self.bucket(slot.key)) & mask;
            if probe_histogram.len() <= displacement {
                probe_histogram.resize(displacement + 1, 0);
            }
            probe_histogram[displacement] += 1;
            total_displacement += displacement;
        }

        // Start scanning right after an empty slot so no cluster is split by
        // the wraparound.
        let start = self
            .slots
            .iter()
            .position(Slot::is_empty)
            .unwrap_or_default();
        let mut clusters = 0;
        let mut longest_cluster = 0;
        let mut run = 0;
        for offset in 1..=self.slots.len() {
            if self.slots[(start + offset) & mask].is_empty() {
                if run > 0 {
                    clusters += 1;
                    longest_cluster = longest_cluster.max(run);
                }
                run = 0;
            } else {
                run += 1;
            }
        }

        TableStats {
            len: self.len,
            capacity: self.slots.len(),
            load_factor: self.len as f64 / self.slots.len() as f64,
            max_displacement: probe_histogram.len().saturating_sub(1),
            mean_displacement: if self.len == 0 {
                0.0
            } else {
                total_displacement as f64 / self.len as f64
            },
            probe_histogram,
            clusters,
            longest_cluster,
        }
    }
}

impl<'a, S> IntoIterator for &'a HashTable<S> {
    type IntoIter = Iter<'a>;
    type Item = (Key, Value);

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, S> IntoIterator for &'a mut HashTable<S> {
    type IntoIter = IterMut<'a>;
    type Item = (Key, &'a mut Value);

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

/// An iterator over the entries of a [`HashTable`].
///
/// This struct is created by [`HashTable::iter`].
#[derive(Clone)]
pub struct Iter<'a> {
    slots: core::slice::Iter<'a, Slot>,
    remaining: usize,
}

impl Iterator for Iter<'_> {
    type Item = (Key, Value);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        for slot in self.slots.by_ref() {
            if !slot.is_empty() {
                self.remaining -= 1;
                return Some((slot.key, slot.value));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Iter<'_> {}

impl FusedIterator for Iter<'_> {}

/// A mutable iterator over the entries of a [`HashTable`].
///
/// This struct is created by [`HashTable::iter_mut`].
pub struct IterMut<'a> {
    slots: core::slice::IterMut<'a, Slot>,
    remaining: usize,
}

impl<'a> Iterator for IterMut<'a> {
    type Item = (Key, &'a mut Value);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        for slot in self.slots.by_ref() {
            if !slot.is_empty() {
                self.remaining -= 1;
                return Some((slot.key, &mut slot.value));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for IterMut<'_> {}

impl FusedIterator for IterMut<'_> {}

/// An iterator over the keys of a [`HashTable`].
#[derive(Clone)]
pub struct Keys<'a> {
    inner: Iter<'a>,
}

impl Iterator for Keys<'_> {
    type Item = Key;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(key, _)| key)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Keys<'_> {}

impl FusedIterator for Keys<'_> {}
