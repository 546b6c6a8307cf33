#![no_main]

use dx_envelope::{DataBlock, Lv};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(lv) = Lv::unmarshal(data) {
        if let Ok(parts) = lv.expand() {
            let again = Lv::combine(&parts).unwrap();
            assert_eq!(again.value(), lv.value());
        }
    }
    let _ = DataBlock::from_bytes(data);
});
