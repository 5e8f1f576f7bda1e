//! Fuzz target for native annotation container parsing.
//!
//! Arbitrary bytes go through the version sniffer and the full container
//! parser; only panics count as failures.

#![no_main]

use labelvault::format::native::fuzz_parse_container;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let _ = fuzz_parse_container(data);
});
