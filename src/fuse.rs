//! One-shot deduplicated internal assertions.
//!
//! A fuse records that something went wrong at a particular call site and
//! reports it exactly once per process; it never aborts. This is distinct
//! from a fatal error: tripping a fuse is a diagnostic, not a termination
//! request. Call sites are deduplicated by hashing the `(file, line)` pair
//! into a small fixed bitset, mirroring the dedup strategy of a counting
//! bloom filter with a single hash function.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

const FUSE_BYTES: usize = 4096;

static FUSES: Mutex<[u8; FUSE_BYTES]> = Mutex::new([0u8; FUSE_BYTES]);

/// Trips the fuse at `file:line`. Returns `true` the first time a given
/// call site trips (the caller should emit a diagnostic then), `false` on
/// every subsequent trip from the same site.
pub fn fuse(file: &str, line: u32) -> bool {
    let mut hasher = DefaultHasher::new();
    file.hash(&mut hasher);
    line.hash(&mut hasher);
    let hash = hasher.finish() as usize;
    let byte = (hash / 8) % FUSE_BYTES;
    let bit = 1u8 << (hash % 8);

    let mut fuses = FUSES.lock().unwrap();
    if fuses[byte] & bit != 0 {
        return false;
    }
    fuses[byte] |= bit;
    true
}

/// Trips a fuse at the call site and, on first trip, routes a diagnostic
/// line through [`crate::diag`]. Does not abort.
#[macro_export]
macro_rules! fuse {
    () => {{
        if $crate::fuse::fuse(file!(), line!()) {
            $crate::diag::log(&format!("a fuse blows in {} on line {}", file!(), line!()));
        }
    }};
    ($($arg:tt)*) => {{
        if $crate::fuse::fuse(file!(), line!()) {
            $crate::diag::log(&format!("a fuse blows in {} on line {}: {}", file!(), line!(), format!($($arg)*)));
        }
    }};
}
