//! Minimal usage demo, out of core scope: construct a manager, allocate a
//! few values of different sizes, free them.

use segalloc::{Config, MemoryManager};

fn main() {
    let config = Config { threshold: 128, big_total_size: 1 << 20, small_page_size: 4096, small_max_object_size: 256, small_alignment: 8 };
    let mut mm = MemoryManager::new(config);

    let small = mm.allocate(32).expect("small allocation failed");
    let big = mm.allocate(4096).expect("big allocation failed");

    assert!(!mm.is_corrupt());

    mm.deallocate(small, 32);
    mm.deallocate(big, 4096);

    assert!(!mm.is_corrupt());
    println!("ok");
}
