// Process-wide, configurable allocator for page storage.
//
// The engine never reaches for the global allocator directly — every
// owned page asks an `Allocator` for its bytes and trusts what comes back.
// The default wraps `Vec<u8>`. A `Buffer` captures the *current* global
// allocator once, at construction, and keeps it for its own lifetime
// (see spec §9, "Open question — process-wide allocator"): this keeps
// `add`/`reserve_space` — the hot path — free of any lock acquisition,
// at the cost of `set_allocator` not affecting buffers that already exist.

use crate::error::{BufError, Result};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::sync::Arc;

/// A source of growable byte storage for owned pages.
///
/// Implementations must behave like `Vec<u8>`'s own growth: `grow` must
/// preserve the existing `buf.len()` bytes and zero-fill everything past
/// them up to `new_size`.
pub trait Allocator: Send + Sync {
    /// Allocate a new, zero-filled block of exactly `size` bytes.
    fn allocate(&self, size: usize) -> Result<Vec<u8>>;

    /// Grow `buf` in place (conceptually — the returned `Vec` may or may
    /// not share the original's storage) to `new_size` bytes, preserving
    /// its existing content and zero-filling the rest. `new_size` is
    /// always `>= buf.len()`.
    fn grow(&self, buf: Vec<u8>, new_size: usize) -> Result<Vec<u8>>;
}

/// The default allocator: routes through the standard library's `Vec<u8>`,
/// reporting allocation failure as [`BufError::OutOfMemory`] instead of
/// aborting the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

impl Allocator for SystemAllocator {
    fn allocate(&self, size: usize) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(size).map_err(|_| BufError::OutOfMemory)?;
        buf.resize(size, 0);
        Ok(buf)
    }

    fn grow(&self, mut buf: Vec<u8>, new_size: usize) -> Result<Vec<u8>> {
        debug_assert!(new_size >= buf.len());
        let additional = new_size - buf.len();
        buf.try_reserve_exact(additional).map_err(|_| BufError::OutOfMemory)?;
        buf.resize(new_size, 0);
        Ok(buf)
    }
}

static ALLOCATOR: Lazy<Mutex<Arc<dyn Allocator>>> =
    Lazy::new(|| Mutex::new(Arc::new(SystemAllocator) as Arc<dyn Allocator>));

/// Replace the process-wide default allocator. Buffers already constructed
/// keep using whichever allocator was current when they were created;
/// only buffers created after this call observe the change.
pub fn set_allocator(alloc: Arc<dyn Allocator>) {
    *ALLOCATOR.lock() = alloc;
}

/// Snapshot the current process-wide allocator, for a `Buffer` to capture
/// at construction time.
pub(crate) fn current_allocator() -> Arc<dyn Allocator> {
    ALLOCATOR.lock().clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn system_allocator_zero_fills() {
        let a = SystemAllocator;
        let buf = a.allocate(8).unwrap();
        assert_eq!(buf, vec![0u8; 8]);
    }

    #[test]
    fn system_allocator_grow_preserves_prefix() {
        let a = SystemAllocator;
        let mut buf = a.allocate(4).unwrap();
        buf[..4].copy_from_slice(b"abcd");
        let grown = a.grow(buf, 8).unwrap();
        assert_eq!(&grown[..4], b"abcd");
        assert_eq!(&grown[4..], &[0u8; 4]);
    }

    struct CountingAllocator {
        allocations: AtomicUsize,
    }

    impl Allocator for CountingAllocator {
        fn allocate(&self, size: usize) -> Result<Vec<u8>> {
            self.allocations.fetch_add(1, Ordering::SeqCst);
            SystemAllocator.allocate(size)
        }

        fn grow(&self, buf: Vec<u8>, new_size: usize) -> Result<Vec<u8>> {
            SystemAllocator.grow(buf, new_size)
        }
    }

    #[test]
    fn set_allocator_is_observed_by_current_allocator() {
        let counting = Arc::new(CountingAllocator {
            allocations: AtomicUsize::new(0),
        });
        set_allocator(counting.clone());
        let got = current_allocator();
        let _ = got.allocate(1).unwrap();
        assert_eq!(counting.allocations.load(Ordering::SeqCst), 1);
        // restore the default so later tests in this process aren't affected
        set_allocator(Arc::new(SystemAllocator));
    }
}
