#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = armory_policy::ensure_encryption_output(data);
    let _ = armory_policy::ensure_signature_output(data);
    let _ = armory_policy::message_recipients(data);
});
