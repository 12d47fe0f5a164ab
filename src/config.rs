/// Runtime configuration for a [`crate::manager::MemoryManager`].
///
/// All five fields are immutable for the lifetime of the manager once
/// constructed, except that the dispatch threshold can be changed later via
/// `MemoryManager::set_size_threshold`.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// Requests of this size or larger are routed to the big-object
    /// allocator; smaller requests go to the small-object allocator.
    pub threshold: usize,
    /// Total byte size of the big-object allocator's backing region.
    pub big_total_size: usize,
    /// Preferred chunk size for the small-object allocator's pools.
    pub small_page_size: usize,
    /// Largest request size the small-object allocator serves directly.
    pub small_max_object_size: usize,
    /// Block-size quantum for the small-object allocator's pools.
    pub small_alignment: usize,
}

impl Config {
    /// Validates the configuration, panicking on the first violated
    /// constraint.
    pub fn validate(&self) {
        assert!(self.small_alignment > 0, "small_alignment must be nonzero");
        assert!(
            self.small_max_object_size % self.small_alignment == 0,
            "small_alignment must evenly divide small_max_object_size"
        );
        assert!(
            self.small_page_size >= self.small_alignment,
            "small_page_size must be at least one alignment quantum"
        );
        assert!(self.threshold > 0, "threshold must be nonzero");
        assert!(self.big_total_size > 0, "big_total_size must be nonzero");
    }
}

impl Default for Config {
    /// A reasonable default: an 8-byte quantum up to 256 bytes served from
    /// 4 KiB pages, a 256-byte dispatch threshold, and a 16 MiB big region.
    fn default() -> Self {
        Config {
            threshold: 256,
            big_total_size: 16 * 1024 * 1024,
            small_page_size: 4096,
            small_max_object_size: 256,
            small_alignment: 8,
        }
    }
}
