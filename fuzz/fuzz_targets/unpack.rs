#![no_main]

use libfuzzer_sys::fuzz_target;
use once_cell::sync::Lazy;

static SIGNING: Lazy<dx_envelope::SigningKeyPair> = Lazy::new(dx_envelope::SigningKeyPair::generate);

const KEY: [u8; 32] = [0x24; 32];

fuzz_target!(|data: &[u8]| {
    let vk = SIGNING.verifying_key();
    let envelope = hex::encode(data);

    let _ = dx_envelope::unpack("fuzz", &vk, &KEY, &envelope);

    // Past the signature gate: exercises decrypt and DataBlock parsing.
    let opts = dx_envelope::UnpackOptions {
        skip_verify: true,
        ..Default::default()
    };
    let _ = dx_envelope::unpack_with("fuzz", &vk, &KEY, &envelope, opts);
});
