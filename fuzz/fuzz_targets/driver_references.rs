#![no_main]

use libfuzzer_sys::fuzz_target;

use litterbox_engine::holygrail::{parse_block_policy, parse_loldrivers};

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = parse_loldrivers(text);
        for hash in parse_block_policy(text) {
            assert_eq!(hash, hash.to_ascii_lowercase());
        }
    }
});
