#![no_main]

use grinder_core::filter::truncated_mean;
use grinder_core::fix16::Fix16;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 3 {
        return;
    }
    let w = Fix16::from_raw(i32::from(data[0]) * 512 + 65536); // [1, 3)
    let samples: Vec<u16> = data[1..]
        .chunks_exact(2)
        .take(16)
        .map(|c| u16::from_le_bytes([c[0], c[1]]) & 0x0fff)
        .collect();
    if samples.is_empty() {
        return;
    }
    let m = truncated_mean(&samples, w);
    let lo = *samples.iter().min().unwrap();
    let hi = *samples.iter().max().unwrap();
    assert!(m >= lo && m <= hi);
});
