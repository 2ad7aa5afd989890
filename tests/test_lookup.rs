// Point lookups and their agreement with enumeration.

mod common;

use common::*;
use mmdbscan::{MmdbError, NetworksOptions, Reader, Value};
use std::net::IpAddr;

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

#[test]
fn test_lookup_ipv4() {
    for record_size in RECORD_SIZES {
        let reader = Reader::from_bytes(ipv4_db(record_size)).unwrap();

        let result = reader.lookup_offset(ip("1.1.1.3")).unwrap().unwrap();
        assert_eq!(result.prefix_len, 31);
        assert_eq!(result.network.to_string(), "1.1.1.2/31");

        let record = reader.lookup(ip("1.1.1.3")).unwrap().unwrap();
        assert_eq!(record.get("ip").and_then(Value::as_str), Some("1.1.1.2"));

        let record = reader.lookup(ip("1.1.1.20")).unwrap().unwrap();
        assert_eq!(record.get("ip").and_then(Value::as_str), Some("1.1.1.16"));
    }
}

#[test]
fn test_lookup_not_found() {
    let reader = Reader::from_bytes(ipv4_db(24)).unwrap();
    assert!(reader.lookup(ip("1.1.1.33")).unwrap().is_none());
    assert!(reader.lookup(ip("1.1.1.0")).unwrap().is_none());
    assert!(reader.lookup_offset(ip("255.255.255.255")).unwrap().is_none());
}

#[test]
fn test_lookup_ipv6_on_ipv4_database() {
    let reader = Reader::from_bytes(ipv4_db(28)).unwrap();

    assert!(matches!(
        reader.lookup(ip("2001:db8::1")),
        Err(MmdbError::IpVersionMismatch(_))
    ));

    let mapped = reader.lookup_offset(ip("::ffff:1.1.1.1")).unwrap().unwrap();
    assert_eq!(mapped.network.to_string(), "1.1.1.1/32");
}

#[test]
fn test_lookup_ipv4_in_ipv6_tree() {
    // No IPv4 data at all
    let reader = Reader::from_bytes(ipv6_db(24)).unwrap();
    assert!(reader.lookup(ip("1.1.1.1")).unwrap().is_none());

    let reader = Reader::from_bytes(mixed_db(24)).unwrap();
    let result = reader.lookup_offset(ip("1.1.1.9")).unwrap().unwrap();
    assert_eq!(result.prefix_len, 29);
    assert_eq!(result.network.to_string(), "1.1.1.8/29");

    // Reached through the IPv4-mapped alias with a full-width prefix
    let mapped = reader.lookup_offset(ip("::ffff:1.1.1.9")).unwrap().unwrap();
    assert_eq!(mapped.data_offset, result.data_offset);
    assert_eq!(mapped.prefix_len, 125);

    // 6to4 prefix for 1.1.1.9
    let six_to_four = reader.lookup_offset(ip("2002:101:109::1")).unwrap().unwrap();
    assert_eq!(six_to_four.data_offset, result.data_offset);
    assert_eq!(six_to_four.network.to_string(), "2002:101:108::/45");
}

#[test]
fn test_lookup_ipv6() {
    let reader = Reader::from_bytes(ipv6_db(32)).unwrap();
    let record = reader.lookup(ip("::2:0:45")).unwrap().unwrap();
    assert_eq!(record.get("ip").and_then(Value::as_str), Some("::2:0:40"));
    assert!(reader.lookup(ip("::2:0:60")).unwrap().is_none());
}

#[test]
fn test_lookup_broken_tree() {
    let reader = Reader::from_bytes(broken_search_tree_db()).unwrap();

    let err = reader.lookup(ip("128.128.128.128")).unwrap_err();
    assert!(matches!(err, MmdbError::InvalidDatabase(_)));
    assert!(err.to_string().contains("invalid node in search tree"));

    // Other paths still resolve
    assert!(reader.lookup(ip("200.1.2.3")).unwrap().is_some());
}

#[test]
fn test_enumeration_agrees_with_lookup() {
    for record_size in RECORD_SIZES {
        for db in [ipv4_db(record_size), ipv6_db(record_size), mixed_db(record_size)] {
            let reader = Reader::from_bytes(db).unwrap();
            let mut networks = reader.networks(NetworksOptions::default());

            for item in networks.by_ref() {
                let network = item.network();
                let result = reader
                    .lookup_offset(network.first_address())
                    .unwrap()
                    .unwrap_or_else(|| panic!("{} has no lookup result", network));

                assert_eq!(Some(result.data_offset), item.data_offset(), "{}", network);
                assert_eq!(result.prefix_len, network.prefix_len(), "{}", network);
                assert_eq!(result.network, network);
            }
            assert!(networks.err().is_none());
        }
    }
}
