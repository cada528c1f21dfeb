//! Compile-time tuning knobs. This is a library with fixed, documented
//! constants rather than a runtime configuration file.

/// Size of one page, in bytes.
pub const PAGE_SIZE: usize = 4096;

/// log2(PAGE_SIZE), kept around for address-shifting arithmetic.
pub const PAGE_POW: u32 = 12;

/// Number of page frames kept resident in the buffer pool.
pub const MEMORY_PAGE_LEN: usize = 20;

/// Size of one WAL segment file before a new one is opened.
pub const WAL_SEGMENT_SIZE: u64 = 16 * 1024 * 1024;

/// Largest single WAL record payload this engine will ever emit: an
/// update/CLR record carries two full page images plus a small header.
pub const MAX_NUPD_SIZE: usize = 200;

/// Maximum number of file descriptors the engine keeps open at once
/// across the db file, WAL segments, and any auxiliary files.
pub const MAX_OPEN_FILES: usize = 10;

/// Tuning for the adaptive hash tables backing the ATT and DPT. The lock
/// table is not one of these: its nodes hold condvar-blocked waiters, which
/// an incrementally-rehashed table would have to migrate mid-wait, so it
/// stays a plain mutex-guarded `HashMap` (see `lock::table`).
pub struct HashTableConfig {
    pub min_size: usize,
    pub max_size: usize,
    pub rehashing_work: usize,
    pub min_load_factor: usize,
    pub max_load_factor: usize,
}

/// Active transaction table: small, bounded by concurrent transaction count.
pub const ATT_HASH_CONFIG: HashTableConfig = HashTableConfig {
    min_size: 8,
    max_size: 512,
    rehashing_work: 16,
    min_load_factor: 1,
    max_load_factor: 4,
};

/// Dirty page table: can grow as large as the buffer pool itself.
pub const DPT_HASH_CONFIG: HashTableConfig = HashTableConfig {
    min_size: MEMORY_PAGE_LEN,
    max_size: 4096,
    rehashing_work: 16,
    min_load_factor: 1,
    max_load_factor: 4,
};
