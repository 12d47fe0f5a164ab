use std::alloc::Layout;
use std::ptr::NonNull;

use crate::big::BigObjectAllocator;
use crate::config::Config;
use crate::small::SmallObjectAllocator;

/// Single entry point: routes requests to a small-object or big-object
/// back-end by comparing the requested size against a runtime threshold.
///
/// The façade does not wrap errors; a `None` from either back-end flows up
/// unchanged, matching the back-ends' own `Option`-returning contract.
pub struct MemoryManager {
    threshold: usize,
    big: BigObjectAllocator,
    small: SmallObjectAllocator,
}

impl MemoryManager {
    /// Constructs both back-ends from `config`. Panics if `config` is
    /// invalid, or if the big-object region cannot be acquired.
    pub fn new(config: Config) -> Self {
        config.validate();
        let big = BigObjectAllocator::new(config.big_total_size)
            .expect("failed to acquire the big-object allocator's backing region");
        let small =
            SmallObjectAllocator::new(config.small_page_size, config.small_max_object_size, config.small_alignment);
        MemoryManager { threshold: config.threshold, big, small }
    }

    pub fn size_threshold(&self) -> usize {
        self.threshold
    }

    pub fn set_size_threshold(&mut self, threshold: usize) {
        assert!(threshold > 0, "threshold must be nonzero");
        self.threshold = threshold;
    }

    /// Allocates `n` bytes, routing by size vs. the current threshold.
    pub fn allocate(&mut self, n: usize) -> Option<NonNull<u8>> {
        if n >= self.threshold {
            self.big.allocate(n)
        } else {
            self.small.allocate(n, false)
        }
    }

    /// Deallocates `ptr`, which must have been returned by `allocate(n)` on
    /// this instance with the same `n`.
    pub fn deallocate(&mut self, ptr: NonNull<u8>, n: usize) {
        if n >= self.threshold {
            self.big.deallocate(ptr, n);
        } else {
            self.small.deallocate(ptr, n);
        }
    }

    /// Structural audit across both back-ends.
    pub fn is_corrupt(&self) -> bool {
        self.big.is_corrupt() || self.small.is_corrupt()
    }

    /// Allocates storage for one `T` and initialises it with `value`.
    /// Out-of-core-scope convenience wrapper over `allocate`.
    pub fn new_value<T>(&mut self, value: T) -> Option<NonNull<T>> {
        let ptr = self.allocate(size_of::<T>())?.cast::<T>();
        // SAFETY: ptr is freshly allocated, sized and aligned enough for a
        // single T as long as size_of::<T>() bytes were requested; callers
        // must not use this helper for over-aligned T (see module docs).
        unsafe {
            ptr.as_ptr().write(value);
        }
        Some(ptr)
    }

    /// Drops and deallocates a value previously returned by `new_value`.
    ///
    /// # Safety
    /// `ptr` must have come from `new_value::<T>` on this manager and must
    /// not have been freed already.
    pub unsafe fn delete_value<T>(&mut self, ptr: NonNull<T>) {
        // SAFETY: upheld by the caller.
        unsafe {
            ptr.as_ptr().drop_in_place();
        }
        self.deallocate(ptr.cast(), size_of::<T>());
    }

    /// Allocates storage for `len` elements of `T`, uninitialised.
    pub fn new_array<T>(&mut self, len: usize) -> Option<NonNull<T>> {
        let layout = Layout::array::<T>(len).ok()?;
        Some(self.allocate(layout.size())?.cast())
    }

    /// Deallocates storage previously returned by `new_array::<T>(len)`.
    /// Does not drop the elements; callers that need element drop glue
    /// must do so before calling this.
    ///
    /// # Safety
    /// `ptr` must have come from `new_array::<T>(len)` on this manager.
    pub unsafe fn delete_array<T>(&mut self, ptr: NonNull<T>, len: usize) {
        let layout = Layout::array::<T>(len).expect("layout must match the one used by new_array");
        self.deallocate(ptr.cast(), layout.size());
    }
}
