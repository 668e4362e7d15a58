#![no_main]

use armory_pgp::armor;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Decoding untrusted armor must fail with an error, never panic.
    if let Ok(block) = armor::decode("fuzz", data) {
        let _ = armor::encode(block.block_type, &block.headers, &block.body);
    }
    let _ = armor::decode_all("fuzz", data);
});
