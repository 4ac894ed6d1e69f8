use std::net::Ipv4Addr;

use lightnode_net::net::ethernet::{self, ETHERTYPE_IPV4, HEADER_SIZE, MacAddr, multicast_mac};

#[test]
fn test_multicast_mac_mapping() {
    let cases = [
        (Ipv4Addr::new(224, 0, 1, 2), [0x01, 0x00, 0x5E, 0x00, 0x01, 0x02]),
        (Ipv4Addr::new(224, 0, 0, 251), [0x01, 0x00, 0x5E, 0x00, 0x00, 0xFB]),
        (Ipv4Addr::new(239, 255, 255, 250), [0x01, 0x00, 0x5E, 0x7F, 0xFF, 0xFA]),
        // Top bit of the second octet is not mapped
        (Ipv4Addr::new(224, 128, 1, 2), [0x01, 0x00, 0x5E, 0x00, 0x01, 0x02]),
    ];

    for (group, mac) in cases {
        assert_eq!(multicast_mac(group), MacAddr(mac), "{}", group);
    }
}

#[test]
fn test_mac_classification() {
    assert!(MacAddr::BROADCAST.is_broadcast());
    assert!(!MacAddr::BROADCAST.is_multicast());
    assert!(MacAddr([0x01, 0x00, 0x5E, 0, 0, 1]).is_multicast());
    assert!(MacAddr([0x02, 0, 0, 0, 0, 1]).is_unicast());
    assert_eq!(MacAddr::from([1, 2, 3, 4, 5, 6]).octets(), [1, 2, 3, 4, 5, 6]);
}

#[test]
fn test_header_roundtrip_in_place() {
    let mut frame = [0u8; HEADER_SIZE + 4];
    let src = MacAddr([0x02, 0x11, 0x22, 0x33, 0x44, 0x55]);
    ethernet::write_header(&mut frame, MacAddr::BROADCAST, src, ETHERTYPE_IPV4);

    assert_eq!(&frame[..6], &[0xFF; 6]);
    assert_eq!(ethernet::source(&frame), Some(src));
    assert_eq!(ethernet::ethertype(&frame), Some(ETHERTYPE_IPV4));
    assert_eq!(ethernet::destination(&frame[..3]), None);
}
