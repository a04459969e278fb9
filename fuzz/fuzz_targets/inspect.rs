#![no_main]

use libfuzzer_sys::fuzz_target;

use litterbox_store::inspect;

fuzz_target!(|data: &[u8]| {
    // Uploads are untrusted: header parsing must never panic.
    let info = inspect(data, "fuzz.sys");
    assert!((0.0..=8.0).contains(&info.entropy));
});
