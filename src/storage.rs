use core::fmt;
use core::fmt::Debug;
use core::hash::BuildHasher;
use core::iter::FusedIterator;
use core::ops::Index;
use core::ops::IndexMut;

use crate::error::Error;
use crate::fnv::FnvBuildHasher;
use crate::map;
use crate::map::Map;

/// Opaque identifier of a value inside a [`Storage`].
///
/// Handles are issued by [`Storage::push`] in strictly increasing order
/// starting at 1. [`Handle::NULL`] is never issued and can be used as a
/// "no value" marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct Handle(u64);

impl Handle {
    /// The reserved handle. No storage ever issues it.
    pub const NULL: Handle = Handle(0);

    /// Rebuilds a handle from its raw value.
    pub const fn from_raw(raw: u64) -> Self {
        Handle(raw)
    }

    /// Returns the raw value of the handle.
    pub const fn into_raw(self) -> u64 {
        self.0
    }

    /// Returns `true` for [`Handle::NULL`].
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A registry that stores values and hands out unique [`Handle`]s for them.
///
/// Values are kept in a [`Map`], so they are densely packed and iteration is
/// cheap. Handles come from a counter that never goes back, so a handle is
/// never reused within one storage, even after `remove` or `clear`.
///
/// # Examples
///
/// ```rust
/// use compact_storage::Storage;
///
/// #[derive(Debug, PartialEq)]
/// struct Data {
///     a: i32,
///     b: i32,
/// }
///
/// let mut storage = Storage::new();
/// let first = storage.push(Data { a: 1, b: 2 })?;
/// let second = storage.push(Data { a: 3, b: 4 })?;
///
/// storage[first].a = 7;
/// assert_eq!(storage.get(first), Some(&Data { a: 7, b: 2 }));
///
/// storage.remove(second);
/// assert!(!storage.contains(second));
/// assert_ne!(storage.push(Data { a: 5, b: 6 })?, second);
/// # Ok::<(), compact_storage::Error>(())
/// ```
#[derive(Clone)]
pub struct Storage<T, S = FnvBuildHasher> {
    map: Map<T, S>,
    last_handle: u64,
}

impl<T, S> Debug for Storage<T, S>
where
    T: Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("last_handle", &self.last_handle)
            .field("values", &self.map)
            .finish()
    }
}

impl<T> Storage<T, FnvBuildHasher> {
    /// Creates an empty storage.
    pub fn new() -> Self {
        Self::with_hasher(FnvBuildHasher)
    }

    /// Creates an empty storage with room for `capacity` values.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, FnvBuildHasher)
    }
}

impl<T> Default for Storage<T, FnvBuildHasher> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, S> Storage<T, S> {
    /// Creates an empty storage whose index hashes handles with
    /// `hash_builder`.
    pub fn with_hasher(hash_builder: S) -> Self {
        Self::with_capacity_and_hasher(0, hash_builder)
    }

    /// Creates an empty storage with room for `capacity` values.
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        Self {
            map: Map::with_capacity_and_hasher(capacity, hash_builder),
            last_handle: 0,
        }
    }

    /// Returns the number of stored values.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Drops every value. Handles issued before the call stay retired.
    pub fn clear(&mut self) {
        self.map.clear();
    }

    /// Returns an iterator over `(handle, &value)` pairs in storage order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            inner: self.map.iter(),
        }
    }

    /// Returns an iterator over `(handle, &mut value)` pairs in storage
    /// order.
    pub fn iter_mut(&mut self) -> IterMut<'_, T> {
        IterMut {
            inner: self.map.iter_mut(),
        }
    }

    /// Returns an iterator over the live handles.
    pub fn handles(&self) -> Handles<'_, T> {
        Handles {
            inner: self.map.keys(),
        }
    }

    /// Returns an iterator over the stored values.
    pub fn values(&self) -> map::Values<'_, T> {
        self.map.values()
    }

    /// Returns an iterator over mutable references to the stored values.
    pub fn values_mut(&mut self) -> map::ValuesMut<'_, T> {
        self.map.values_mut()
    }
}

impl<T, S> Storage<T, S>
where
    S: BuildHasher,
{
    /// Stores `value` and returns its new handle.
    ///
    /// # Errors
    ///
    /// - [`Error::HandlesExhausted`] once `u64::MAX` handles were issued.
    /// - [`Error::CapacityOverflow`] if the index cannot grow.
    ///
    /// No handle is consumed when an error is returned.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use compact_storage::Handle;
    /// # use compact_storage::Storage;
    /// #
    /// let mut storage = Storage::new();
    /// assert_eq!(storage.push("a")?, Handle::from_raw(1));
    /// assert_eq!(storage.push("b")?, Handle::from_raw(2));
    /// # Ok::<(), compact_storage::Error>(())
    /// ```
    pub fn push(&mut self, value: T) -> Result<Handle, Error> {
        let next = self
            .last_handle
            .checked_add(1)
            .ok_or(Error::HandlesExhausted)?;
        let replaced = self.map.set(next, value)?;
        debug_assert!(replaced.is_none(), "handle {next} issued twice");
        self.last_handle = next;
        Ok(Handle(next))
    }

    /// Returns a reference to the value behind `handle`.
    pub fn get(&self, handle: Handle) -> Option<&T> {
        self.map.get(handle.0)
    }

    /// Returns a mutable reference to the value behind `handle`.
    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        self.map.get_mut(handle.0)
    }

    /// Returns the value behind `handle`, or [`Error::InvalidHandle`].
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use compact_storage::Error;
    /// # use compact_storage::Handle;
    /// # use compact_storage::Storage;
    /// #
    /// let mut storage = Storage::new();
    /// let handle = storage.push(5)?;
    /// assert_eq!(storage.require(handle), Ok(&5));
    ///
    /// let missing = Handle::from_raw(999);
    /// assert_eq!(storage.require(missing), Err(Error::InvalidHandle(missing)));
    /// # Ok::<(), compact_storage::Error>(())
    /// ```
    pub fn require(&self, handle: Handle) -> Result<&T, Error> {
        self.get(handle).ok_or(Error::InvalidHandle(handle))
    }

    /// Mutable counterpart of [`require`](Self::require).
    pub fn require_mut(&mut self, handle: Handle) -> Result<&mut T, Error> {
        self.get_mut(handle).ok_or(Error::InvalidHandle(handle))
    }

    /// Returns `true` if `handle` refers to a stored value.
    pub fn contains(&self, handle: Handle) -> bool {
        self.map.contains_key(handle.0)
    }

    /// Removes and returns the value behind `handle`. The handle is not
    /// issued again.
    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        self.map.remove(handle.0)
    }

    /// Makes room for at least `additional` more values.
    ///
    /// # Errors
    ///
    /// [`Error::CapacityOverflow`] if the index cannot hold that many values.
    pub fn reserve(&mut self, additional: usize) -> Result<(), Error> {
        self.map.reserve(additional)
    }
}

impl<T, S> Index<Handle> for Storage<T, S>
where
    S: BuildHasher,
{
    type Output = T;

    /// # Panics
    ///
    /// Panics if `handle` does not refer to a stored value.
    fn index(&self, handle: Handle) -> &T {
        match self.get(handle) {
            Some(value) => value,
            None => panic!("{}", Error::InvalidHandle(handle)),
        }
    }
}

impl<T, S> IndexMut<Handle> for Storage<T, S>
where
    S: BuildHasher,
{
    /// # Panics
    ///
    /// Panics if `handle` does not refer to a stored value.
    fn index_mut(&mut self, handle: Handle) -> &mut T {
        match self.get_mut(handle) {
            Some(value) => value,
            None => panic!("{}", Error::InvalidHandle(handle)),
        }
    }
}

impl<'a, T, S> IntoIterator for &'a Storage<T, S> {
    type IntoIter = Iter<'a, T>;
    type Item = (Handle, &'a T);

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, T, S> IntoIterator for &'a mut Storage<T, S> {
    type IntoIter = IterMut<'a, T>;
    type Item = (Handle, &'a mut T);

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

impl<T, S> IntoIterator for Storage<T, S> {
    type IntoIter = IntoIter<T>;
    type Item = (Handle, T);

    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            inner: self.map.into_iter(),
        }
    }
}

/// An iterator over the values of a [`Storage`] and their handles.
pub struct Iter<'a, T> {
    inner: map::Iter<'a, T>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (Handle, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(key, value)| (Handle(key), value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}

impl<T> FusedIterator for Iter<'_, T> {}

/// A mutable iterator over the values of a [`Storage`] and their handles.
pub struct IterMut<'a, T> {
    inner: map::IterMut<'a, T>,
}

impl<'a, T> Iterator for IterMut<'a, T> {
    type Item = (Handle, &'a mut T);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(key, value)| (Handle(key), value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> ExactSizeIterator for IterMut<'_, T> {}

impl<T> FusedIterator for IterMut<'_, T> {}

/// An owning iterator over the values of a [`Storage`] and their handles.
pub struct IntoIter<T> {
    inner: map::IntoIter<T>,
}

impl<T> Iterator for IntoIter<T> {
    type Item = (Handle, T);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(key, value)| (Handle(key), value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> ExactSizeIterator for IntoIter<T> {}

impl<T> FusedIterator for IntoIter<T> {}

/// An iterator over the live handles of a [`Storage`].
pub struct Handles<'a, T> {
    inner: map::Keys<'a, T>,
}

impl<T> Iterator for Handles<'_, T> {
    type Item = Handle;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(Handle)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> ExactSizeIterator for Handles<'_, T> {}

impl<T> FusedIterator for Handles<'_, T> {}
