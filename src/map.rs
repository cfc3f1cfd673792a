use alloc::vec::Vec;
use core::fmt::Debug;
use core::hash::BuildHasher;
use core::iter::FusedIterator;
use core::ops::Index;

use crate::error::Error;
use crate::fnv::FnvBuildHasher;
use crate::hash_table::HashTable;
use crate::hash_table::Key;
use crate::hash_table::Value;

#[derive(Clone)]
struct Bucket<T> {
    key: Key,
    value: T,
}

/// An integer-keyed map whose values live in one dense vector.
///
/// `Map<T, S>` keeps its values packed in insertion order inside a `Vec` and
/// uses a [`HashTable`] to map each key to its position. Iteration is a
/// plain walk over the vector. Removal swaps the last value into the freed
/// position, so the order of the remaining values changes and positions are
/// never stable across a `remove`. References returned by [`get`] borrow the
/// map, so they cannot outlive such a move.
///
/// Key `0` is reserved, as in [`HashTable`].
///
/// [`get`]: Map::get
///
/// # Examples
///
/// ```rust
/// use compact_storage::Map;
///
/// #[derive(Debug, PartialEq)]
/// struct Data {
///     a: i32,
///     b: i32,
/// }
///
/// let mut map = Map::new();
/// map.set(42, Data { a: 1, b: 2 })?;
/// map.set(43, Data { a: 50, b: 54 })?;
///
/// assert_eq!(map.get(42), Some(&Data { a: 1, b: 2 }));
/// assert_eq!(map.get(44), None);
///
/// map.remove(42);
/// assert_eq!(map.get(42), None);
/// assert_eq!(map.len(), 1);
/// # Ok::<(), compact_storage::Error>(())
/// ```
#[derive(Clone)]
pub struct Map<T, S = FnvBuildHasher> {
    index: HashTable<S>,
    buckets: Vec<Bucket<T>>,
}

impl<T, S> Debug for Map<T, S>
where
    T: Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<T> Map<T, FnvBuildHasher> {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::with_hasher(FnvBuildHasher)
    }

    /// Creates an empty map that can hold `capacity` values without
    /// reallocating.
    ///
    /// # Panics
    ///
    /// Panics if the index's slot count overflows `usize`.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, FnvBuildHasher)
    }
}

impl<T> Default for Map<T, FnvBuildHasher> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, S> Map<T, S> {
    /// Creates an empty map whose index hashes keys with `hash_builder`.
    pub fn with_hasher(hash_builder: S) -> Self {
        Self::with_capacity_and_hasher(0, hash_builder)
    }

    /// Creates an empty map with room for `capacity` values, hashing keys with
    /// `hash_builder`.
    ///
    /// # Panics
    ///
    /// Panics if the index's slot count overflows `usize`.
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        Self {
            index: HashTable::with_capacity_and_hasher(capacity, hash_builder),
            buckets: Vec::with_capacity(capacity),
        }
    }

    /// Returns the number of values in the map.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Returns `true` if the map holds no values.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Returns how many values the map can hold before either the dense
    /// vector or the index has to grow.
    pub fn capacity(&self) -> usize {
        self.buckets.capacity().min(self.index.capacity() / 2)
    }

    /// Removes every value. Allocations are kept.
    pub fn clear(&mut self) {
        self.index.clear();
        self.buckets.clear();
    }

    /// Returns an iterator over `(key, &value)` pairs in storage order.
    ///
    /// Storage order is insertion order, except that each `remove` moves the
    /// last value into the removed one's position.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use compact_storage::Map;
    /// #
    /// let mut map = Map::new();
    /// map.set(1, "a")?;
    /// map.set(2, "b")?;
    /// map.set(3, "c")?;
    /// map.remove(1);
    ///
    /// let pairs: Vec<_> = map.iter().collect();
    /// assert_eq!(pairs, [(3, &"c"), (2, &"b")]);
    /// # Ok::<(), compact_storage::Error>(())
    /// ```
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            inner: self.buckets.iter(),
        }
    }

    /// Returns an iterator over `(key, &mut value)` pairs in storage order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use compact_storage::Map;
    /// #
    /// let mut map = Map::new();
    /// map.set(7, 1)?;
    /// map.set(8, 2)?;
    ///
    /// for (_, value) in map.iter_mut() {
    ///     *value *= 10;
    /// }
    /// assert_eq!(map.get(7), Some(&10));
    /// assert_eq!(map.get(8), Some(&20));
    /// # Ok::<(), compact_storage::Error>(())
    /// ```
    pub fn iter_mut(&mut self) -> IterMut<'_, T> {
        IterMut {
            inner: self.buckets.iter_mut(),
        }
    }

    /// Returns an iterator over the keys in storage order.
    pub fn keys(&self) -> Keys<'_, T> {
        Keys { inner: self.iter() }
    }

    /// Returns an iterator over the values in storage order.
    pub fn values(&self) -> Values<'_, T> {
        Values { inner: self.iter() }
    }

    /// Returns an iterator over mutable references to the values.
    pub fn values_mut(&mut self) -> ValuesMut<'_, T> {
        ValuesMut {
            inner: self.iter_mut(),
        }
    }
}

impl<T, S> Map<T, S>
where
    S: BuildHasher,
{
    #[inline]
    fn position(&self, key: Key) -> Option<usize> {
        self.index.get(key).map(|&position| position as usize)
    }

    /// Returns a reference to the value stored under `key`.
    pub fn get(&self, key: Key) -> Option<&T> {
        let position = self.position(key)?;
        Some(&self.buckets[position].value)
    }

    /// Returns a mutable reference to the value stored under `key`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use compact_storage::Map;
    /// #
    /// let mut map = Map::new();
    /// map.set(1, String::from("hello"))?;
    ///
    /// if let Some(value) = map.get_mut(1) {
    ///     value.push_str(" world");
    /// }
    /// assert_eq!(map.get(1).map(String::as_str), Some("hello world"));
    /// # Ok::<(), compact_storage::Error>(())
    /// ```
    pub fn get_mut(&mut self, key: Key) -> Option<&mut T> {
        let position = self.position(key)?;
        Some(&mut self.buckets[position].value)
    }

    /// Returns `true` if a value is stored under `key`.
    pub fn contains_key(&self, key: Key) -> bool {
        self.index.contains_key(key)
    }

    /// Stores `value` under `key`, returning the value it replaces.
    ///
    /// An existing value is overwritten in place. A new value is appended to
    /// the dense vector.
    ///
    /// # Errors
    ///
    /// - [`Error::NullKey`] if `key` is `0`.
    /// - [`Error::CapacityOverflow`] if the index cannot grow.
    ///
    /// The map is unchanged when an error is returned.
    pub fn set(&mut self, key: Key, value: T) -> Result<Option<T>, Error> {
        if let Some(position) = self.position(key) {
            let old = core::mem::replace(&mut self.buckets[position].value, value);
            return Ok(Some(old));
        }

        self.index.set(key, self.buckets.len() as Value)?;
        self.buckets.push(Bucket { key, value });
        Ok(None)
    }

    /// Returns the value stored under `key`, inserting `T::default()` first
    /// if it is absent.
    ///
    /// # Errors
    ///
    /// Same as [`set`](Self::set).
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use compact_storage::Map;
    /// #
    /// #[derive(Default)]
    /// struct Counter {
    ///     hits: u32,
    /// }
    ///
    /// let mut map: Map<Counter> = Map::new();
    /// map.get_or_insert_default(99)?.hits += 1;
    /// map.get_or_insert_default(99)?.hits += 1;
    /// assert_eq!(map.get(99).map(|c| c.hits), Some(2));
    /// # Ok::<(), compact_storage::Error>(())
    /// ```
    pub fn get_or_insert_default(&mut self, key: Key) -> Result<&mut T, Error>
    where
        T: Default,
    {
        let position = match self.position(key) {
            Some(position) => position,
            None => {
                let position = self.buckets.len();
                self.index.set(key, position as Value)?;
                self.buckets.push(Bucket {
                    key,
                    value: T::default(),
                });
                position
            }
        };
        Ok(&mut self.buckets[position].value)
    }

    /// Removes the value stored under `key` and returns it. Absent keys are a
    /// no-op.
    ///
    /// The last value in storage order takes the removed value's position.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use compact_storage::Map;
    /// #
    /// let mut map = Map::new();
    /// map.set(1, 'a')?;
    /// map.set(2, 'b')?;
    /// map.set(3, 'c')?;
    ///
    /// assert_eq!(map.remove(1), Some('a'));
    /// assert_eq!(map.remove(1), None);
    /// assert_eq!(map.len(), 2);
    /// assert_eq!(map.get(3), Some(&'c'));
    /// # Ok::<(), compact_storage::Error>(())
    /// ```
    pub fn remove(&mut self, key: Key) -> Option<T> {
        let position = self.index.remove(key)? as usize;
        let removed = self.buckets.swap_remove(position);

        if let Some(moved) = self.buckets.get(position) {
            let slot = self.index.get_mut(moved.key);
            debug_assert!(slot.is_some(), "moved key {} missing from index", moved.key);
            if let Some(slot) = slot {
                *slot = position as Value;
            }
        }

        Some(removed.value)
    }

    /// Makes room for at least `additional` more values.
    ///
    /// # Errors
    ///
    /// [`Error::CapacityOverflow`] if the index cannot hold that many keys.
    pub fn reserve(&mut self, additional: usize) -> Result<(), Error> {
        self.index.reserve(additional)?;
        self.buckets.reserve(additional);
        Ok(())
    }
}

impl<T, S> Index<Key> for Map<T, S>
where
    S: BuildHasher,
{
    type Output = T;

    /// # Panics
    ///
    /// Panics if no value is stored under `key`.
    fn index(&self, key: Key) -> &T {
        match self.get(key) {
            Some(value) => value,
            None => panic!("no entry found for key {key}"),
        }
    }
}

impl<'a, T, S> IntoIterator for &'a Map<T, S> {
    type IntoIter = Iter<'a, T>;
    type Item = (Key, &'a T);

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, T, S> IntoIterator for &'a mut Map<T, S> {
    type IntoIter = IterMut<'a, T>;
    type Item = (Key, &'a mut T);

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

impl<T, S> IntoIterator for Map<T, S> {
    type IntoIter = IntoIter<T>;
    type Item = (Key, T);

    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            inner: self.buckets.into_iter(),
        }
    }
}

/// An iterator over the entries of a [`Map`] in storage order.
pub struct Iter<'a, T> {
    inner: core::slice::Iter<'a, Bucket<T>>,
}

impl<T> Clone for Iter<'_, T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (Key, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|bucket| (bucket.key, &bucket.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> DoubleEndedIterator for Iter<'_, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner
            .next_back()
            .map(|bucket| (bucket.key, &bucket.value))
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}

impl<T> FusedIterator for Iter<'_, T> {}

/// A mutable iterator over the entries of a [`Map`] in storage order.
pub struct IterMut<'a, T> {
    inner: core::slice::IterMut<'a, Bucket<T>>,
}

impl<'a, T> Iterator for IterMut<'a, T> {
    type Item = (Key, &'a mut T);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|bucket| (bucket.key, &mut bucket.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> DoubleEndedIterator for IterMut<'_, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner
            .next_back()
            .map(|bucket| (bucket.key, &mut bucket.value))
    }
}

impl<T> ExactSizeIterator for IterMut<'_, T> {}

impl<T> FusedIterator for IterMut<'_, T> {}

/// An owning iterator over the entries of a [`Map`].
pub struct IntoIter<T> {
    inner: alloc::vec::IntoIter<Bucket<T>>,
}

impl<T> Iterator for IntoIter<T> {
    type Item = (Key, T);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|bucket| (bucket.key, bucket.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> ExactSizeIterator for IntoIter<T> {}

impl<T> FusedIterator for IntoIter<T> {}

/// An iterator over the keys of a [`Map`].
pub struct Keys<'a, T> {
    inner: Iter<'a, T>,
}

impl<T> Iterator for Keys<'_, T> {
    type Item = Key;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(key, _)| key)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> ExactSizeIterator for Keys<'_, T> {}

impl<T> FusedIterator for Keys<'_, T> {}

/// An iterator over the values of a [`Map`].
pub struct Values<'a, T> {
    inner: Iter<'a, T>,
}

impl<'a, T> Iterator for Values<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, value)| value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> ExactSizeIterator for Values<'_, T> {}

impl<T> FusedIterator for Values<'_, T> {}

/// A mutable iterator over the values of a [`Map`].
pub struct ValuesMut<'a, T> {
    inner: IterMut<'a, T>,
}

impl<'a, T> Iterator for ValuesMut<'a, T> {
    type Item = &'a mut T;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, value)| value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> ExactSizeIterator for ValuesMut<'_, T> {}

impl<T> FusedIterator for ValuesMut<'_, T> {}

#[cfg(test)]
mod tests {
    use alloc::format;
    use alloc::string::String;
    use alloc::string::ToString;
    use alloc::vec;
    use alloc::vec::Vec;

    use rand::Rng;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;

    #[derive(Debug, Default, Clone, PartialEq, Eq)]
    struct Data {
        a: i32,
        b: i32,
    }

    /// Every key in the index must point at a bucket holding that key, and
    /// every bucket must be indexed.
    fn assert_compact<T, S: BuildHasher>(map: &Map<T, S>) {
        assert_eq!(map.index.len(), map.buckets.len());
        for (key, position) in map.index.iter() {
            let position = position as usize;
            assert!(position < map.buckets.len(), "key {key} -> {position}");
            assert_eq!(map.buckets[position].key, key);
        }
    }

    #[test]
    fn set_get_remove() {
        let mut map = Map::new();
        assert_eq!(map.set(42, Data { a: 1, b: 2 }), Ok(None));
        assert_eq!(map.set(43, Data { a: 50, b: 54 }), Ok(None));

        assert_eq!(map.get(42), Some(&Data { a: 1, b: 2 }));
        assert_eq!(map.get(43), Some(&Data { a: 50, b: 54 }));
        assert_eq!(map.get(44), None);

        assert_eq!(map.remove(42), Some(Data { a: 1, b: 2 }));
        assert_eq!(map.get(42), None);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(43), Some(&Data { a: 50, b: 54 }));
        assert_compact(&map);
    }

    #[test]
    fn iteration_and_in_place_updates() {
        let mut map = Map::new();
        for (i, key) in (42..=48u64).enumerate() {
            let a = i as i32 * 2 + 1;
            map.set(key, Data { a, b: a + 1 }).unwrap();
        }
        assert_eq!(map.len(), 7);

        for (_, value) in &mut map {
            value.a += 1;
        }
        assert_eq!(map.len(), 7);
        for (i, key) in (42..=48u64).enumerate() {
            assert_eq!(map.get(key).map(|d| d.a), Some(i as i32 * 2 + 2));
        }

        map.get_mut(42).unwrap().a = 100;
        assert_eq!(map[42].a, 100);

        map.get_or_insert_default(42).unwrap().a = 200;
        assert_eq!(map[42], Data { a: 200, b: 2 });

        map.get_or_insert_default(99).unwrap().a = 300;
        assert_eq!(map[99], Data { a: 300, b: 0 });
        assert_eq!(map.len(), 8);
        assert_compact(&map);
    }

    #[test]
    fn overwrite_returns_previous() {
        let mut map = Map::new();
        map.set(5, "first".to_string()).unwrap();
        assert_eq!(
            map.set(5, "second".to_string()),
            Ok(Some("first".to_string()))
        );
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(5).map(String::as_str), Some("second"));
    }

    #[test]
    fn null_key_is_rejected() {
        let mut map: Map<i32> = Map::new();
        assert_eq!(map.set(0, 1), Err(Error::NullKey));
        assert_eq!(map.get_or_insert_default(0).err(), Some(Error::NullKey));
        assert!(map.is_empty());
        assert_eq!(map.buckets.len(), 0);
        assert_eq!(map.get(0), None);
        assert_eq!(map.remove(0), None);
    }

    #[test]
    fn remove_compacts_storage() {
        let mut map = Map::new();
        for key in 1..=20u64 {
            map.set(key, key * 100).unwrap();
        }

        // Last, first and middle positions exercise both the unmoved and the
        // moved branch.
        for key in [20u64, 1, 10] {
            let len = map.buckets.len();
            assert_eq!(map.remove(key), Some(key * 100));
            assert_eq!(map.buckets.len(), len - 1);
            assert_compact(&map);
        }

        assert_eq!(map.remove(10), None);
        assert_eq!(map.len(), 17);
        for key in (1..=20u64).filter(|key| ![1, 10, 20].contains(key)) {
            assert_eq!(map.get(key), Some(&(key * 100)));
        }
    }

    #[test]
    fn swap_remove_order() {
        let mut map = Map::new();
        for key in 1..=4u64 {
            map.set(key, key).unwrap();
        }
        map.remove(2);
        assert_eq!(map.keys().collect::<Vec<_>>(), vec![1, 4, 3]);
        map.remove(3);
        assert_eq!(map.keys().collect::<Vec<_>>(), vec![1, 4]);
        map.set(9, 9).unwrap();
        assert_eq!(map.values().copied().collect::<Vec<_>>(), vec![1, 4, 9]);
        assert_eq!(
            map.iter().rev().map(|(key, _)| key).collect::<Vec<_>>(),
            vec![9, 4, 1]
        );
    }

    #[test]
    fn random_operations_match_model() {
        let mut rng = SmallRng::seed_from_u64(42);
        let mut map = Map::new();
        let mut model = hashbrown::HashMap::new();

        for step in 0..10_000 {
            let key = rng.random_range(1..=128u64);
            match rng.random_range(0..3) {
                0 | 1 => {
                    let value = rng.random::<u32>();
                    assert_eq!(map.set(key, value).unwrap(), model.insert(key, value));
                }
                _ => assert_eq!(map.remove(key), model.remove(&key)),
            }
            assert_eq!(map.len(), model.len());

            if step % 250 == 0 {
                assert_compact(&map);
                for (key, value) in &model {
                    assert_eq!(map.get(*key), Some(value));
                }
            }
        }

        let mut entries: Vec<_> = map.into_iter().collect();
        let mut expected: Vec<_> = model.into_iter().collect();
        entries.sort_unstable();
        expected.sort_unstable();
        assert_eq!(entries, expected);
    }

    #[test]
    fn clear_and_reuse() {
        let mut map = Map::new();
        for key in 1..=10u64 {
            map.set(key, key).unwrap();
        }
        map.clear();
        assert!(map.is_empty());
        assert_eq!(map.get(3), None);
        assert_eq!(map.iter().count(), 0);

        map.set(3, 33).unwrap();
        assert_eq!(map.get(3), Some(&33));
        assert_compact(&map);
    }

    #[test]
    fn values_mut_and_clone() {
        let mut map = Map::new();
        for key in 1..=5u64 {
            map.set(key, vec![key]).unwrap();
        }
        let snapshot = map.clone();

        for value in map.values_mut() {
            value.push(0);
        }
        assert_eq!(map.get(2), Some(&vec![2, 0]));
        assert_eq!(snapshot.get(2), Some(&vec![2]));
    }

    #[test]
    fn capacity_and_reserve() {
        let mut map: Map<u8> = Map::with_capacity(100);
        assert!(map.capacity() >= 100);

        map.reserve(500).unwrap();
        assert!(map.capacity() >= 500);
        assert_eq!(map.reserve(usize::MAX), Err(Error::CapacityOverflow));
    }

    #[test]
    fn debug_lists_entries() {
        let mut map = Map::new();
        map.set(1, 'x').unwrap();
        map.set(2, 'y').unwrap();
        assert_eq!(format!("{map:?}"), "{1: 'x', 2: 'y'}");
    }

    #[test]
    #[should_panic(expected = "no entry found for key 7")]
    fn index_panics_on_missing_key() {
        let map: Map<i32> = Map::new();
        let _value = map[7];
    }
}
