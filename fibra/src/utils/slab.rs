use std::mem::MaybeUninit;

/// A simple slab allocator.
///
/// A `Slab` stores values of type `T` in a contiguous array and
/// returns stable indices that can be reused after removal.
///
/// Internally, it keeps track of:
/// - initialized slots,
/// - free indices,
/// - and uninitialized memory using [`MaybeUninit`].
///
/// The workers use it as the arena of suspended-routine slots: every
/// holder of an index (a timer bucket, a reactor registration, a
/// semaphore waiter) is a weak reference and must call
/// [`has`](Self::has) before resolving it, because another event
/// source may already have consumed the slot.
///
/// # Safety
///
/// This type uses `unsafe` internally but provides a safe API
/// as long as indices returned by [`insert`](Self::insert)
/// are not reused after [`remove`](Self::remove).
pub(crate) struct Slab<T> {
    /// Storage for items (may contain uninitialized slots).
    items: Vec<MaybeUninit<T>>,
    /// Stack of free indices that can be reused.
    free: Vec<usize>,
    /// Marks whether a slot is currently initialized.
    used: Vec<bool>,
}

impl<T> Slab<T> {
    /// Creates a new `Slab` with a fixed initial capacity.
    ///
    /// All slots are initially free and uninitialized.
    pub(crate) fn new(size: usize) -> Self {
        let items = (0..size).map(|_| MaybeUninit::<T>::uninit()).collect();
        let free = (0..size).collect();
        let used = (0..size).map(|_| false).collect();

        Self { items, free, used }
    }

    /// Inserts a value into the slab and returns its index.
    ///
    /// If a free slot is available, it is reused.
    /// Otherwise, the slab grows exponentially.
    pub(crate) fn insert(&mut self, item: T) -> usize {
        let index = if let Some(i) = self.free.pop() {
            i
        } else {
            let len = self.items.len();
            let new_len = if len == 0 { 1 } else { 2 * len };

            self.items
                .extend((len..new_len).map(|_| MaybeUninit::<T>::uninit()));
            self.free.extend((len + 1)..new_len);
            self.used.extend((len..new_len).map(|_| false));

            len
        };

        self.items[index] = MaybeUninit::new(item);
        self.used[index] = true;

        index
    }

    /// Removes and returns the value stored at `index`.
    ///
    /// The slot becomes free and may be reused by future insertions.
    /// Callers that may race with another disposal path must check
    /// [`has`](Self::has) first; removing a slot twice is arena
    /// corruption and aborts.
    ///
    /// # Panics
    ///
    /// Panics if:
    /// - `index` is out of bounds
    /// - the slot is not currently in use
    pub(crate) fn remove(&mut self, index: usize) -> T {
        assert!(index < self.items.len(), "Index out of range");
        assert!(self.used[index], "Item is not set");

        self.free.push(index);
        self.used[index] = false;

        let item = unsafe { self.items[index].assume_init_read() };
        self.items[index] = MaybeUninit::uninit();

        item
    }

    /// Returns `true` if `index` denotes a live slot.
    pub(crate) fn has(&self, index: usize) -> bool {
        index < self.items.len() && self.used[index]
    }

    /// Returns a reference to the value at `index`, or `None` if the
    /// slot has already been freed.
    pub(crate) fn get(&self, index: usize) -> Option<&T> {
        if self.has(index) {
            Some(unsafe { self.items[index].assume_init_ref() })
        } else {
            None
        }
    }

    /// Returns a mutable reference to the value at `index`, or `None`
    /// if the slot has already been freed.
    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        if self.has(index) {
            Some(unsafe { self.items[index].assume_init_mut() })
        } else {
            None
        }
    }
}

impl<T> Drop for Slab<T> {
    /// Drops all initialized elements stored in the slab.
    ///
    /// Uninitialized slots are ignored.
    fn drop(&mut self) {
        for (slot, &used) in self.items.iter_mut().zip(self.used.iter()) {
            if used {
                unsafe {
                    slot.assume_init_drop();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_get() {
        let mut slab = Slab::new(2);
        let a = slab.insert(10);
        let b = slab.insert(20);

        assert_eq!(slab.get(a), Some(&10));
        assert_eq!(slab.get(b), Some(&20));
    }

    #[test]
    fn stale_index_is_not_live_after_remove() {
        let mut slab = Slab::new(1);
        let index = slab.insert(7);

        assert!(slab.has(index));
        assert_eq!(slab.remove(index), 7);
        assert!(!slab.has(index));
        assert_eq!(slab.get(index), None);
    }

    #[test]
    fn freed_index_is_reused_without_aliasing() {
        let mut slab = Slab::new(1);
        let first = slab.insert("one");
        slab.remove(first);

        let second = slab.insert("two");
        assert_eq!(first, second);
        assert_eq!(slab.get(second), Some(&"two"));

        // Only one live handle exists for the index at any time.
        slab.remove(second);
        assert!(!slab.has(first));
    }

    #[test]
    fn grows_past_initial_capacity() {
        let mut slab = Slab::new(1);
        let indices: Vec<usize> = (0..16usize).map(|i| slab.insert(i)).collect();

        for (value, index) in indices.iter().enumerate() {
            assert_eq!(slab.get(*index), Some(&value));
        }
    }

    #[test]
    #[should_panic(expected = "Item is not set")]
    fn double_remove_panics() {
        let mut slab = Slab::new(1);
        let index = slab.insert(1);
        slab.remove(index);
        slab.remove(index);
    }
}
