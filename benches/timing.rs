use std::hint::black_box;
use std::time::Instant;

use dx_envelope::{pack, unpack, Lv, SigningKeyPair};

fn time_it<F: FnMut()>(label: &str, iters: usize, mut f: F) {
    // warmup
    for _ in 0..(iters / 10).max(10) {
        f();
    }

    let start = Instant::now();
    for _ in 0..iters {
        f();
    }
    let elapsed = start.elapsed();

    let per_iter = elapsed / (iters as u32);
    println!("{:<16} total={:?}  per_iter={:?}", label, elapsed, per_iter);
}

fn main() {
    let signing = SigningKeyPair::generate();
    let vk = signing.verifying_key();
    let key = [0x42u8; 32];
    let prekey = "bench-prekey";

    let payload = vec![Lv::from_utf8("{}"), Lv::from_raw_bytes(vec![0x42u8; 1024])];
    let envelope = pack(prekey, &signing, &key, &payload).unwrap();

    // Flip one ciphertext byte; fails at the signature gate.
    let mut tampered = hex::decode(&envelope).unwrap();
    tampered[12] ^= 0x01;
    let tampered = hex::encode(tampered);

    let iters = 5_000;

    time_it("pack", iters, || {
        let env = pack(black_box(prekey), &signing, black_box(&key), black_box(&payload)).unwrap();
        black_box(env);
    });

    time_it("unpack", iters, || {
        let lvs = unpack(black_box(prekey), &vk, black_box(&key), black_box(&envelope)).unwrap();
        black_box(lvs);
    });

    time_it("wrong_prekey", iters, || {
        let r = unpack(black_box("other"), &vk, black_box(&key), black_box(&envelope));
        black_box(r.err());
    });

    time_it("tampered", iters, || {
        let r = unpack(black_box(prekey), &vk, black_box(&key), black_box(&tampered));
        black_box(r.err());
    });

    time_it("short", iters, || {
        let r = unpack(black_box(prekey), &vk, black_box(&key), black_box("0000"));
        black_box(r.err());
    });

    println!("\nDone.");
}
