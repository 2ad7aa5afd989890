#![no_main]
use libfuzzer_sys::fuzz_target;
use mmdbscan::{NetworksOptions, Reader};

fuzz_target!(|data: &[u8]| {
    // Garbage input must produce errors, never panics
    let Ok(reader) = Reader::from_bytes(data.to_vec()) else {
        return;
    };
    let _ = reader.lookup("1.2.3.4".parse().unwrap());
    let _ = reader.lookup("2001:db8::1".parse().unwrap());

    let options = NetworksOptions::new().include_empty_networks(true);
    for item in reader.networks(options).take(1024) {
        let _ = item.decode();
    }
    for _ in reader.data_section().take(1024) {}
});
