//! Host-side allocator for buffers the tracking service fills in.
//!
//! The service asks the host for memory for images and point mappings; the
//! host owns that memory and hands it back through [`Buffer`], which releases
//! it through the same allocator exactly once on drop.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::sync::Arc;

/// What the service intends to store in an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocatorType {
    Uint8,
    Float,
    Unspecified,
}

/// Allocate/deallocate pair installed into a session.
pub trait Allocator: Send + Sync {
    /// Return `None` when memory is unavailable. `size` is never zero.
    fn allocate(&self, size: usize, hint: AllocatorType) -> Option<NonNull<u8>>;

    /// Release memory previously returned by `allocate` on this allocator.
    ///
    /// # Safety
    /// `ptr` must come from `self.allocate(size, _)` and not have been released.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, size: usize);
}

/// Allocator backed by the global Rust allocator.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

const ALIGN: usize = 16;

impl Allocator for SystemAllocator {
    fn allocate(&self, size: usize, _hint: AllocatorType) -> Option<NonNull<u8>> {
        let layout = std::alloc::Layout::from_size_align(size, ALIGN).ok()?;
        if layout.size() == 0 {
            return None;
        }
        // SAFETY: layout has non-zero size.
        NonNull::new(unsafe { std::alloc::alloc(layout) })
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, size: usize) {
        if let Ok(layout) = std::alloc::Layout::from_size_align(size, ALIGN) {
            std::alloc::dealloc(ptr.as_ptr(), layout);
        }
    }
}

/// Move-only byte buffer owned by an installed allocator.
pub struct Buffer {
    ptr: NonNull<u8>,
    len: usize,
    allocator: Arc<dyn Allocator>,
}

// SAFETY: the buffer uniquely owns its allocation and the allocator is Send + Sync.
unsafe impl Send for Buffer {}
unsafe impl Sync for Buffer {}

impl Buffer {
    /// Allocate a zeroed buffer. `None` on allocation failure or zero size;
    /// callers treat the owning event as absent.
    pub fn allocate(allocator: &Arc<dyn Allocator>, len: usize, hint: AllocatorType) -> Option<Buffer> {
        if len == 0 {
            return None;
        }
        let ptr = allocator.allocate(len, hint)?;
        // SAFETY: the allocator returned at least `len` writable bytes.
        unsafe { std::ptr::write_bytes(ptr.as_ptr(), 0, len) };
        Some(Buffer {
            ptr,
            len,
            allocator: Arc::clone(allocator),
        })
    }

    /// Allocate and copy `bytes` in.
    pub fn from_slice(allocator: &Arc<dyn Allocator>, bytes: &[u8], hint: AllocatorType) -> Option<Buffer> {
        let mut buf = Buffer::allocate(allocator, bytes.len(), hint)?;
        buf.copy_from_slice(bytes);
        Some(buf)
    }
}

impl Deref for Buffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // SAFETY: ptr is valid and initialized for len bytes for the buffer's lifetime.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl DerefMut for Buffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above, and &mut self guarantees uniqueness.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        // SAFETY: allocated by this allocator with this size; drop runs once.
        unsafe { self.allocator.deallocate(self.ptr, self.len) };
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts allocations and checks every release matches a live allocation.
    #[derive(Default)]
    pub(crate) struct CountingAllocator {
        pub allocs: AtomicUsize,
        pub deallocs: AtomicUsize,
        pub fail: std::sync::atomic::AtomicBool,
        live: Mutex<HashSet<usize>>,
    }

    impl CountingAllocator {
        pub fn live(&self) -> usize {
            self.live.lock().len()
        }
    }

    impl Allocator for CountingAllocator {
        fn allocate(&self, size: usize, hint: AllocatorType) -> Option<NonNull<u8>> {
            if self.fail.load(Ordering::SeqCst) {
                return None;
            }
            let ptr = SystemAllocator.allocate(size, hint)?;
            self.allocs.fetch_add(1, Ordering::SeqCst);
            self.live.lock().insert(ptr.as_ptr() as usize);
            Some(ptr)
        }

        unsafe fn deallocate(&self, ptr: NonNull<u8>, size: usize) {
            let was_live = self.live.lock().remove(&(ptr.as_ptr() as usize));
            assert!(was_live, "deallocate without matching allocate");
            self.deallocs.fetch_add(1, Ordering::SeqCst);
            SystemAllocator.deallocate(ptr, size);
        }
    }

    #[test]
    fn test_buffer_released_once() {
        let counting = Arc::new(CountingAllocator::default());
        let alloc: Arc<dyn Allocator> = counting.clone();

        let buf = Buffer::from_slice(&alloc, &[1, 2, 3], AllocatorType::Uint8).unwrap();
        assert_eq!(&buf[..], &[1, 2, 3]);
        assert_eq!(counting.live(), 1);

        let moved = buf;
        drop(moved);
        assert_eq!(counting.allocs.load(Ordering::SeqCst), 1);
        assert_eq!(counting.deallocs.load(Ordering::SeqCst), 1);
        assert_eq!(counting.live(), 0);
    }

    #[test]
    fn test_buffer_zeroed() {
        let alloc: Arc<dyn Allocator> = Arc::new(SystemAllocator);
        let buf = Buffer::allocate(&alloc, 64, AllocatorType::Unspecified).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_allocation_failure_is_none() {
        let counting = Arc::new(CountingAllocator::default());
        counting.fail.store(true, Ordering::SeqCst);
        let alloc: Arc<dyn Allocator> = counting.clone();
        assert!(Buffer::allocate(&alloc, 16, AllocatorType::Uint8).is_none());
        assert!(Buffer::allocate(&alloc, 0, AllocatorType::Uint8).is_none());
        assert_eq!(counting.deallocs.load(Ordering::SeqCst), 0);
    }
}
