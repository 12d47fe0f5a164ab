use std::ptr::NonNull;

use crate::chunk::Chunk;

/// Default bounds on how many blocks a chunk may hold, clamping each pool's
/// per-chunk object count into a sane range.
pub const MIN_OBJECTS_PER_CHUNK: u8 = 8;
pub const MAX_OBJECTS_PER_CHUNK: u8 = 255;

/// Manages a growable set of [`Chunk`]s of one fixed block size.
///
/// Cursors are indices into `chunks`, not pointers: each `Chunk` separately
/// owns its byte buffer, so relocating the `Chunk` struct itself (on `Vec`
/// growth, or on `swap_remove` during trimming) never moves the bytes a
/// caller's pointer refers to.
pub struct FixedAllocator {
    block_size: usize,
    num_blocks: u8,
    chunks: Vec<Chunk>,
    alloc_cursor: Option<usize>,
    dealloc_cursor: Option<usize>,
    empty_chunk: Option<usize>,
}

impl FixedAllocator {
    pub fn new(block_size: usize, num_blocks: u8) -> Self {
        FixedAllocator {
            block_size,
            num_blocks,
            chunks: Vec::new(),
            alloc_cursor: None,
            dealloc_cursor: None,
            empty_chunk: None,
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn allocate(&mut self) -> Option<NonNull<u8>> {
        if self.alloc_cursor.map_or(true, |i| self.chunks[i].is_filled()) {
            self.reseat_alloc_cursor()?;
        }
        let idx = self.alloc_cursor.unwrap();
        if self.empty_chunk == Some(idx) {
            self.empty_chunk = None;
        }
        self.chunks[idx].allocate()
    }

    fn reseat_alloc_cursor(&mut self) -> Option<()> {
        if let Some(empty) = self.empty_chunk {
            self.alloc_cursor = Some(empty);
            return Some(());
        }
        if let Some(i) = self.chunks.iter().position(|c| !c.is_filled()) {
            self.alloc_cursor = Some(i);
            return Some(());
        }
        // Reserve capacity before constructing, so a failed Chunk::new
        // never leaves the Vec partially grown.
        self.chunks.reserve(1);
        let chunk = Chunk::new(self.block_size, self.num_blocks)?;
        self.chunks.push(chunk);
        self.alloc_cursor = Some(self.chunks.len() - 1);
        if self.dealloc_cursor.is_none() {
            self.dealloc_cursor = self.alloc_cursor;
        }
        Some(())
    }

    /// Deallocates `ptr`, which must have a block size of `self.block_size`.
    /// `hint` (if supplied) is tried first. Returns whether this allocator
    /// owned the pointer.
    pub fn deallocate(&mut self, ptr: NonNull<u8>, hint: Option<usize>) -> bool {
        let Some(idx) = self.locate(ptr, hint) else {
            return false;
        };
        self.dealloc_cursor = Some(idx);
        self.do_deallocate(idx, ptr);
        true
    }

    fn locate(&self, ptr: NonNull<u8>, hint: Option<usize>) -> Option<usize> {
        for candidate in [hint, self.dealloc_cursor, self.alloc_cursor] {
            if let Some(i) = candidate {
                if self.chunks.get(i).is_some_and(|c| c.has_block(ptr)) {
                    return Some(i);
                }
            }
        }
        self.vicinity_find(ptr)
    }

    /// Expanding-window search outward from `dealloc_cursor`, favouring
    /// chunks near the last deallocation since frees tend to cluster there.
    fn vicinity_find(&self, ptr: NonNull<u8>) -> Option<usize> {
        let start = self.dealloc_cursor.unwrap_or(0);
        let len = self.chunks.len();
        if len == 0 {
            return None;
        }
        for offset in 0..len {
            for dir in [-1i64, 1] {
                let idx = start as i64 + dir * offset as i64;
                if idx < 0 || idx as usize >= len {
                    continue;
                }
                if self.chunks[idx as usize].has_block(ptr) {
                    return Some(idx as usize);
                }
            }
            if offset == 0 {
                // -1*0 == 1*0, don't check the same index twice.
                continue;
            }
        }
        None
    }

    fn do_deallocate(&mut self, mut idx: usize, ptr: NonNull<u8>) {
        self.chunks[idx].deallocate(ptr);
        if !self.chunks[idx].has_available(self.num_blocks) {
            return;
        }
        if let Some(other_empty) = self.empty_chunk {
            if other_empty != idx {
                // Keep the newly-freed chunk as the cached empty; release
                // the previously cached one via swap_remove. If idx was the
                // last element, it gets relocated into other_empty's slot.
                let last = self.chunks.len() - 1;
                self.release_chunk(other_empty);
                if idx == last {
                    idx = other_empty;
                }
                self.empty_chunk = Some(idx);
                self.dealloc_cursor = Some(idx);
                return;
            }
        }
        self.empty_chunk = Some(idx);
    }

    /// Frees the memory backing the chunk at `idx` via `Vec::swap_remove`,
    /// then fixes up any cursor that pointed at the chunk that moved into
    /// `idx`'s old slot.
    fn release_chunk(&mut self, idx: usize) {
        let last = self.chunks.len() - 1;
        self.chunks.swap_remove(idx);
        if last != idx {
            for cursor in [&mut self.alloc_cursor, &mut self.dealloc_cursor, &mut self.empty_chunk] {
                if *cursor == Some(last) {
                    *cursor = Some(idx);
                }
            }
        }
        for cursor in [&mut self.alloc_cursor, &mut self.dealloc_cursor, &mut self.empty_chunk] {
            if *cursor == Some(idx) && self.chunks.len() <= idx {
                *cursor = None;
            }
        }
    }

    /// Releases the cached empty chunk, if any. Returns whether anything
    /// was released.
    pub fn trim_empty_chunk(&mut self) -> bool {
        let Some(idx) = self.empty_chunk else {
            return false;
        };
        self.release_chunk(idx);
        self.empty_chunk = None;
        if self.alloc_cursor.is_none() && !self.chunks.is_empty() {
            self.alloc_cursor = Some(0);
        }
        if self.dealloc_cursor.is_none() && !self.chunks.is_empty() {
            self.dealloc_cursor = Some(0);
        }
        true
    }

    /// Shrinks the backing `Vec`'s capacity to fit and re-seats cursors at
    /// the front/back of the chunk list.
    pub fn trim_chunk_list(&mut self) {
        self.chunks.shrink_to_fit();
        if self.chunks.is_empty() {
            self.alloc_cursor = None;
            self.dealloc_cursor = None;
            self.empty_chunk = None;
        } else {
            self.alloc_cursor = Some(self.chunks.len() - 1);
            self.dealloc_cursor = Some(0);
        }
    }

    pub fn count_empty_chunks(&self) -> usize {
        self.chunks.iter().filter(|c| c.has_available(self.num_blocks)).count()
    }

    pub fn has_block(&self, ptr: NonNull<u8>) -> Option<usize> {
        self.chunks.iter().position(|c| c.has_block(ptr))
    }

    pub fn is_corrupt(&self) -> bool {
        if self.chunks.is_empty() {
            return self.alloc_cursor.is_some() || self.dealloc_cursor.is_some() || self.empty_chunk.is_some();
        }
        for cursor in [self.alloc_cursor, self.dealloc_cursor, self.empty_chunk] {
            if cursor.is_some_and(|i| i >= self.chunks.len()) {
                return true;
            }
        }
        if let Some(i) = self.empty_chunk {
            if !self.chunks[i].has_available(self.num_blocks) {
                return true;
            }
        }
        if self.count_empty_chunks() > 1 {
            return true;
        }
        self.chunks.iter().any(|c| c.is_corrupt(true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_across_chunks() {
        let mut fa = FixedAllocator::new(8, 4);
        let mut ptrs = vec![];
        for _ in 0..10 {
            ptrs.push(fa.allocate().unwrap());
        }
        assert!(!fa.is_corrupt());
        assert_eq!(fa.count_empty_chunks(), 0);
    }

    #[test]
    fn at_most_one_empty_chunk() {
        let mut fa = FixedAllocator::new(8, 2);
        let a = fa.allocate().unwrap();
        let b = fa.allocate().unwrap();
        let c = fa.allocate().unwrap();
        let d = fa.allocate().unwrap();
        assert!(fa.deallocate(a, None));
        assert!(fa.deallocate(b, None));
        assert!(fa.count_empty_chunks() <= 1);
        assert!(fa.deallocate(c, None));
        assert!(fa.deallocate(d, None));
        assert!(fa.count_empty_chunks() <= 1);
        assert!(!fa.is_corrupt());
    }

    #[test]
    fn deallocate_rejects_foreign_pointer() {
        let mut fa = FixedAllocator::new(8, 4);
        let _ = fa.allocate().unwrap();
        let foreign = NonNull::new(0x1000 as *mut u8).unwrap();
        assert!(!fa.deallocate(foreign, None));
    }
}
