#![no_main]
use libfuzzer_sys::fuzz_target;
use mmdbscan::Decoder;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }
    // First byte picks the start offset, the rest is the data section
    let offset = data[0] as usize;
    let decoder = Decoder::new(&data[1..]);
    if let Ok((_, next)) = decoder.decode_at(offset) {
        assert!(next > offset && next <= decoder.len());
    }
});
