use std::alloc::{self, Layout};
use std::ptr::NonNull;

use crate::fixed::{FixedAllocator, MAX_OBJECTS_PER_CHUNK, MIN_OBJECTS_PER_CHUNK};

/// Dispatches fixed-size requests to one [`FixedAllocator`] pool per
/// quantised block size, and falls back to the host allocator for anything
/// larger than `max_object_size`.
pub struct SmallObjectAllocator {
    alignment: usize,
    max_object_size: usize,
    pools: Vec<FixedAllocator>,
}

impl SmallObjectAllocator {
    pub fn new(page_size: usize, max_object_size: usize, alignment: usize) -> Self {
        assert!(alignment > 0, "alignment must be nonzero");
        assert!(max_object_size > 0, "max object size must be nonzero");
        assert!(page_size >= alignment, "page size must be at least one alignment quantum");

        let pool_count = max_object_size.div_ceil(alignment);
        let pools = (0..pool_count)
            .map(|i| {
                let block_size = (i + 1) * alignment;
                let raw_count = page_size / block_size;
                let num_blocks =
                    raw_count.clamp(MIN_OBJECTS_PER_CHUNK as usize, MAX_OBJECTS_PER_CHUNK as usize) as u8;
                FixedAllocator::new(block_size, num_blocks)
            })
            .collect();

        SmallObjectAllocator { alignment, max_object_size, pools }
    }

    fn pool_index(&self, n: usize) -> usize {
        n.div_ceil(self.alignment) - 1
    }

    /// `do_throw` selects whether an exhausted host-allocator fallback
    /// panics or just returns `None`; pool exhaustion never panics.
    pub fn allocate(&mut self, n: usize, do_throw: bool) -> Option<NonNull<u8>> {
        let n = n.max(1);
        if n > self.max_object_size {
            let result = self.allocate_from_host(n);
            if result.is_none() && do_throw {
                panic!("small object allocator: host allocation failed for {n} bytes");
            }
            return result;
        }

        let idx = self.pool_index(n);
        if let Some(ptr) = self.pools[idx].allocate() {
            return Some(ptr);
        }
        self.trim_excess_memory();
        self.pools[idx].allocate()
    }

    pub fn deallocate(&mut self, ptr: NonNull<u8>, n: usize) {
        let n = n.max(1);
        if n > self.max_object_size {
            self.deallocate_to_host(ptr, n);
            return;
        }
        let idx = self.pool_index(n);
        let owned = self.pools[idx].deallocate(ptr, None);
        assert!(owned, "pointer does not belong to the pool implied by its size");
    }

    /// Deallocation path for callers that do not know the original size;
    /// scans pools by address range, falling back to the host deallocator
    /// if no pool claims the pointer.
    pub fn deallocate_unsized(&mut self, ptr: NonNull<u8>) {
        for pool in &mut self.pools {
            if pool.has_block(ptr).is_some() {
                pool.deallocate(ptr, None);
                return;
            }
        }
        // Not ours: must be a host-allocator pointer from the oversize path.
        // SAFETY: every pointer this allocator hands out that no pool owns
        // came from allocate_from_host, which always reserves a size header
        // immediately before the returned address.
        unsafe { self.deallocate_to_host_by_header(ptr) };
    }

    /// Host allocations above `max_object_size` carry a small header storing
    /// the requested size immediately before the returned pointer, so the
    /// size-unknown deallocation path can reconstruct the original `Layout`
    /// without the caller having to remember or pass it back in.
    fn host_data_offset(&self) -> usize {
        let header_align = self.alignment.max(std::mem::align_of::<usize>());
        std::mem::size_of::<usize>().next_multiple_of(header_align)
    }

    fn host_layout(&self, n: usize) -> Option<(Layout, usize)> {
        let data_offset = self.host_data_offset();
        let header_align = self.alignment.max(std::mem::align_of::<usize>());
        let total = data_offset.checked_add(n)?;
        Some((Layout::from_size_align(total, header_align).ok()?, data_offset))
    }

    fn allocate_from_host(&self, n: usize) -> Option<NonNull<u8>> {
        let (layout, data_offset) = self.host_layout(n)?;
        // SAFETY: layout has nonzero size (data_offset > 0).
        let raw = NonNull::new(unsafe { alloc::alloc(layout) })?;
        // SAFETY: raw is valid for layout.size() >= size_of::<usize>() bytes.
        unsafe {
            raw.as_ptr().cast::<usize>().write(n);
        }
        // SAFETY: data_offset <= layout.size(), so this stays in bounds.
        Some(unsafe { NonNull::new_unchecked(raw.as_ptr().add(data_offset)) })
    }

    fn deallocate_to_host(&self, ptr: NonNull<u8>, n: usize) {
        let (layout, data_offset) = self.host_layout(n).expect("invalid host layout on dealloc");
        // SAFETY: ptr was returned by allocate_from_host, which placed the
        // user data exactly data_offset bytes past the start of raw.
        let raw = unsafe { ptr.as_ptr().sub(data_offset) };
        debug_assert_eq!(
            unsafe { raw.cast::<usize>().read() },
            n,
            "host allocation size header does not match caller-supplied size"
        );
        // SAFETY: raw/layout match what allocate_from_host passed to alloc.
        unsafe {
            alloc::dealloc(raw, layout);
        }
    }

    /// As `deallocate_to_host`, but recovers the size from the header
    /// instead of taking it from the caller.
    ///
    /// # Safety
    /// `ptr` must have been returned by `allocate_from_host` on this
    /// allocator and not already deallocated.
    unsafe fn deallocate_to_host_by_header(&self, ptr: NonNull<u8>) {
        let data_offset = self.host_data_offset();
        // SAFETY: upheld by the caller.
        let raw = unsafe { ptr.as_ptr().sub(data_offset) };
        // SAFETY: raw points at the size header written by allocate_from_host.
        let n = unsafe { raw.cast::<usize>().read() };
        self.deallocate_to_host(ptr, n);
    }

    /// Trims each pool's cached empty chunk, then shrinks each pool's chunk
    /// list capacity. Returns whether anything was trimmed.
    pub fn trim_excess_memory(&mut self) -> bool {
        let mut trimmed = false;
        for pool in &mut self.pools {
            trimmed |= pool.trim_empty_chunk();
        }
        for pool in &mut self.pools {
            pool.trim_chunk_list();
        }
        trimmed
    }

    pub fn max_object_size(&self) -> usize {
        self.max_object_size
    }

    pub fn is_corrupt(&self) -> bool {
        if self.alignment == 0 || self.max_object_size == 0 || self.pools.is_empty() {
            return true;
        }
        self.pools.iter().any(|p| p.is_corrupt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_by_quantised_size() {
        let mut soa = SmallObjectAllocator::new(256, 64, 8);
        let a = soa.allocate(8, false).unwrap();
        let b = soa.allocate(16, false).unwrap();
        let c = soa.allocate(8, false).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
        soa.deallocate(a, 8);
        soa.deallocate(b, 16);
        soa.deallocate(c, 8);
        assert!(!soa.is_corrupt());
    }

    #[test]
    fn zero_size_behaves_like_one_byte() {
        let mut soa = SmallObjectAllocator::new(256, 64, 8);
        let p = soa.allocate(0, false).unwrap();
        soa.deallocate(p, 0);
        assert!(!soa.is_corrupt());
    }

    #[test]
    fn oversize_bypasses_pools() {
        let mut soa = SmallObjectAllocator::new(256, 64, 8);
        let p = soa.allocate(65, false).unwrap();
        soa.deallocate(p, 65);
    }

    #[test]
    fn unsized_dealloc_recovers_host_allocation_without_size() {
        let mut soa = SmallObjectAllocator::new(256, 64, 8);
        let p = soa.allocate(512, false).unwrap();
        soa.deallocate_unsized(p);
    }
}
