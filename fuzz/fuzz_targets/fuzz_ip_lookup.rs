#![no_main]
use libfuzzer_sys::fuzz_target;
use mmdbscan::{Network, NetworksOptions, Reader};
use std::net::IpAddr;
use std::sync::OnceLock;

#[path = "../../tests/common/mod.rs"]
mod common;

fn reader() -> &'static Reader {
    static READER: OnceLock<Reader> = OnceLock::new();
    READER.get_or_init(|| Reader::from_bytes(common::mixed_db(28)).unwrap())
}

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    let reader = reader();

    if let Ok(ip) = s.parse::<IpAddr>() {
        let _ = reader.lookup(ip).unwrap();
    }
    if let Ok(network) = s.parse::<Network>() {
        assert!(network.contains(network.first_address()));
        let options = NetworksOptions::new().skip_aliased_networks(true);
        let mut networks = reader.networks_within(network, options);
        for item in networks.by_ref() {
            let _ = item.decode().unwrap();
        }
        assert!(networks.err().is_none());
    }
});
