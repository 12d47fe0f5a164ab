use std::alloc::{self, Layout};
use std::ptr::NonNull;

use crate::free_list::{FreeList, NodeId};
use crate::size_index::OrderedSizeIndex;

/// Owns one contiguous region and hands out best-fit slices of it, merging
/// freed ranges with address-adjacent neighbours.
pub struct BigObjectAllocator {
    region: NonNull<u8>,
    layout: Layout,
    total_size: usize,
    free_list: FreeList,
    free_index: OrderedSizeIndex,
}

impl BigObjectAllocator {
    pub fn new(total_size: usize) -> Option<Self> {
        assert!(total_size > 0, "big allocator region must be nonzero");
        let layout = Layout::from_size_align(total_size, std::mem::align_of::<usize>()).ok()?;
        // SAFETY: layout has nonzero size.
        let raw = unsafe { alloc::alloc(layout) };
        let region = NonNull::new(raw)?;

        let mut free_list = FreeList::new();
        let mut free_index = OrderedSizeIndex::new();
        let whole = free_list.insert_before(None, 0, total_size);
        free_index.insert(total_size, whole);

        Some(BigObjectAllocator { region, layout, total_size, free_list, free_index })
    }

    pub fn total_size(&self) -> usize {
        self.total_size
    }

    fn base(&self) -> usize {
        self.region.as_ptr() as usize
    }

    /// Best-fit allocation: finds the smallest free block of size >= `n`
    /// and slices `n` bytes off its front, shrinking or removing it.
    pub fn allocate(&mut self, n: usize) -> Option<NonNull<u8>> {
        let n = n.max(1);
        let (size, node) = self.free_index.search_at_least(n)?;
        let address = self.free_list.address(node);

        if size == n {
            self.free_index.remove(size, node);
            self.free_list.remove(node);
        } else {
            self.free_index.remove(size, node);
            self.free_list.set_address(node, address + n);
            self.free_list.set_size(node, size - n);
            self.free_index.insert(size - n, node);
        }

        // SAFETY: address is within [0, total_size), base+address+n <= base+total_size.
        let ptr = unsafe { self.region.as_ptr().add(address) };
        Some(unsafe { NonNull::new_unchecked(ptr) })
    }

    /// Deallocates the `n`-byte range starting at `ptr`, coalescing with
    /// address-adjacent free neighbours. `ptr` must have been returned by
    /// `allocate` on this instance with the same `n`. A range outside
    /// `region` is silently ignored rather than rejected.
    pub fn deallocate(&mut self, ptr: NonNull<u8>, n: usize) {
        let n = n.max(1);
        let p = ptr.as_ptr() as usize;
        let base = self.base();
        if !(p >= base && p + n <= base + self.total_size) {
            return;
        }
        let address = p - base;

        let successor = self.free_list.find_first_after(address);
        let predecessor = successor.and_then(|s| self.free_list.prev(s)).or_else(|| {
            // No successor: the predecessor, if any, is the tail.
            if successor.is_none() {
                let mut cur = self.free_list.head();
                let mut last = None;
                while let Some(id) = cur {
                    last = Some(id);
                    cur = self.free_list.next(id);
                }
                last
            } else {
                None
            }
        });

        let touches_prev =
            predecessor.is_some_and(|p| self.free_list.address(p) + self.free_list.size(p) == address);
        let touches_next = successor.is_some_and(|s| address + n == self.free_list.address(s));

        match (touches_prev, touches_next) {
            (true, true) => {
                let prev = predecessor.unwrap();
                let next = successor.unwrap();
                let (next_addr, next_size) = (self.free_list.address(next), self.free_list.size(next));
                self.free_index.remove(next_size, next);
                self.free_list.remove(next);
                let prev_size = self.free_list.size(prev);
                self.free_index.remove(prev_size, prev);
                let merged = prev_size + n + next_size;
                self.free_list.set_size(prev, merged);
                self.free_index.insert(merged, prev);
                let _ = next_addr;
            }
            (true, false) => {
                let prev = predecessor.unwrap();
                let prev_size = self.free_list.size(prev);
                self.free_index.remove(prev_size, prev);
                let merged = prev_size + n;
                self.free_list.set_size(prev, merged);
                self.free_index.insert(merged, prev);
            }
            (false, true) => {
                let next = successor.unwrap();
                let next_size = self.free_list.size(next);
                self.free_index.remove(next_size, next);
                let merged = next_size + n;
                self.free_list.set_address(next, address);
                self.free_list.set_size(next, merged);
                self.free_index.insert(merged, next);
            }
            (false, false) => {
                let id = self.free_list.insert_before(successor, address, n);
                self.free_index.insert(n, id);
            }
        }
    }

    /// Whether `ptr` lies within this allocator's region.
    pub fn owns(&self, ptr: NonNull<u8>) -> bool {
        let p = ptr.as_ptr() as usize;
        let base = self.base();
        p >= base && p < base + self.total_size
    }

    /// Structural audit: the free list must be non-overlapping,
    /// non-adjacent, and address-ordered; the size index must mirror it
    /// exactly.
    pub fn is_corrupt(&self) -> bool {
        let mut prev_end: Option<usize> = None;
        let mut index_count = 0;
        for (id, addr, size) in self.free_list.iter() {
            if size == 0 || addr + size > self.total_size {
                return true;
            }
            if let Some(end) = prev_end {
                if addr < end {
                    return true; // overlap
                }
                if addr == end {
                    return true; // un-coalesced adjacency
                }
            }
            prev_end = Some(addr + size);
            if !self.free_index.contains(size, id) {
                return true;
            }
            index_count += 1;
        }
        index_count != self.free_index.len()
    }

    /// Snapshot of the free list as `(address, size)` pairs in address
    /// order. Exposed for tests and structural debugging, not the hot path.
    pub fn free_blocks(&self) -> Vec<(usize, usize)> {
        self.free_list.iter().map(|(_, addr, size)| (addr, size)).collect()
    }
}

impl Drop for BigObjectAllocator {
    fn drop(&mut self) {
        // SAFETY: region/layout are exactly what was passed to alloc::alloc.
        unsafe {
            alloc::dealloc(self.region.as_ptr(), self.layout);
        }
    }
}
