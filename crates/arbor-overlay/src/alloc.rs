//! Allocation of file and directory identities.

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, Ordering};

use arbor_types::{DirectoryId, FileId};

use crate::error::{OverlayError, OverlayResult};

/// Hands out identities that are never reused.
pub trait IdAllocator<T>: Send + Sync {
    fn allocate(&self) -> OverlayResult<T>;
}

/// Process-wide monotonically increasing identities, starting at 1.
pub struct SequentialIds<T> {
    next: AtomicU32,
    kind: &'static str,
    _id: PhantomData<fn() -> T>,
}

impl<T> SequentialIds<T> {
    /// An allocator whose first identity is `last + 1`.
    pub fn after(last: u32, kind: &'static str) -> Self {
        Self {
            next: AtomicU32::new(last.saturating_add(1)),
            kind,
            _id: PhantomData,
        }
    }

    /// Never hand out `id` or anything below it.
    pub fn reserve_through(&self, id: u32) {
        self.next.fetch_max(id.saturating_add(1), Ordering::SeqCst);
    }

    /// The identity the next call to `allocate` returns.
    pub fn peek(&self) -> u32 {
        self.next.load(Ordering::SeqCst)
    }
}

impl<T: From<u32>> IdAllocator<T> for SequentialIds<T> {
    fn allocate(&self) -> OverlayResult<T> {
        self.next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_add(1))
            .map(T::from)
            .map_err(|_| OverlayError::IdsExhausted { kind: self.kind })
    }
}

impl<T> fmt::Debug for SequentialIds<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequentialIds")
            .field("kind", &self.kind)
            .field("next", &self.peek())
            .finish()
    }
}

pub type FileIdAllocator = SequentialIds<FileId>;

pub type DirectoryIdAllocator = SequentialIds<DirectoryId>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn starts_after_last() {
        let ids = FileIdAllocator::after(41, "file");
        assert_eq!(ids.allocate().unwrap(), FileId::new(42));
        assert_eq!(ids.allocate().unwrap(), FileId::new(43));
        assert_eq!(ids.peek(), 44);
    }

    #[test]
    fn reserve_only_moves_forward() {
        let ids = FileIdAllocator::after(5, "file");
        ids.reserve_through(9);
        ids.reserve_through(2);
        assert_eq!(ids.allocate().unwrap(), FileId::new(10));
    }

    #[test]
    fn exhaustion_is_an_error() {
        let ids = DirectoryIdAllocator::after(u32::MAX - 1, "directory");
        assert!(matches!(ids.allocate(), Err(OverlayError::IdsExhausted { kind: "directory" })));
    }

    #[test]
    fn concurrent_allocation_never_repeats() {
        let ids = Arc::new(FileIdAllocator::after(0, "file"));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ids = Arc::clone(&ids);
                std::thread::spawn(move || (0..250).map(|_| ids.allocate().unwrap()).collect::<Vec<_>>())
            })
            .collect();
        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id));
            }
        }
        assert_eq!(seen.len(), 1_000);
    }
}
