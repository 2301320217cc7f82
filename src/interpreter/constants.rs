// Constants for the analyzer

/// Starting address for heap cells
/// Addresses start at 0x1000 so they read clearly in debugger output
pub const HEAP_ADDRESS_START: u64 = 0x1000;

/// Entry point used when none is configured
pub const DEFAULT_ENTRY_POINT: &str = "main";

/// How often (in steps) the driver checks its wall-clock deadline
pub const DEADLINE_CHECK_INTERVAL: u64 = 256;

/// Default ceiling on pending backtracking alternatives
pub const DEFAULT_MAX_ALTERNATIVES: usize = 100_000;

/// Default number of allocations between cycle collections
pub const DEFAULT_GC_THRESHOLD: usize = 4096;

/// Deepest container nesting a value may have when it is copied out of
/// the heap (results, `str` and `print`)
pub const MAX_RESULT_DEPTH: usize = 1024;

/// Longest list `range` will build
pub const MAX_RANGE_LEN: usize = 1 << 20;
