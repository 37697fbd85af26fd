//
// Copyright (c) The ospf6-manet Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::LazyLock as Lazy;

use bytes::Bytes;
use const_addrs::ip4;
use maplit::btreeset;
use ospf6_manet::packet::lsa::{
    Lsa, LsaBody, LsaHdr, LsaKey, LsaRouter, LsaRouterFlags, LsaRouterLink,
    LsaRouterLinkType, LsaType,
};
use ospf6_manet::packet::{
    DbDesc, DbDescFlags, Hello, LsAck, LsRequest, Options, Packet, PacketHdr,
    PacketType,
};

//
// Helper functions.
//

fn test_encode_packet(bytes_expected: &[u8], packet: &Packet) {
    let bytes_actual = packet.encode();
    assert_eq!(bytes_expected, bytes_actual.as_ref());
}

fn test_decode_packet(bytes: &[u8], packet_expected: &Packet) {
    let mut buf = Bytes::copy_from_slice(bytes);
    let packet_actual = Packet::decode(&mut buf).unwrap();
    assert_eq!(*packet_expected, packet_actual);
}

fn test_encode_lsa(bytes_expected: &[u8], lsa: &Lsa) {
    assert_eq!(bytes_expected, lsa.raw.as_ref());
}

fn test_decode_lsa(bytes: &[u8], lsa_expected: &Lsa) {
    let mut bytes = Bytes::copy_from_slice(bytes);
    let lsa_actual = Lsa::decode(&mut bytes).unwrap();
    assert_eq!(*lsa_expected, lsa_actual);
}

//
// Test packets.
//

static HELLO1: Lazy<(Vec<u8>, Packet)> = Lazy::new(|| {
    (
        vec![
            0x03, 0x01, 0x00, 0x28, 0x01, 0x01, 0x01, 0x01, 0x00, 0x00,
            0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x04,
            0x01, 0x00, 0x00, 0x13, 0x00, 0x03, 0x00, 0x24, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x02, 0x02, 0x02,
        ],
        Packet::Hello(Hello {
            hdr: PacketHdr {
                pkt_type: PacketType::Hello,
                router_id: ip4!("1.1.1.1"),
                area_id: ip4!("0.0.0.1"),
                instance_id: 0,
            },
            iface_id: 4,
            priority: 1,
            options: Options::R | Options::E | Options::V6,
            hello_interval: 3,
            dead_interval: 36,
            dr: None,
            bdr: None,
            neighbors: btreeset![ip4!("2.2.2.2")],
            lls: None,
        }),
    )
});

static DBDESC1: Lazy<(Vec<u8>, Packet)> = Lazy::new(|| {
    (
        vec![
            0x03, 0x02, 0x00, 0x1c, 0x01, 0x01, 0x01, 0x01, 0x00, 0x00,
            0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x13,
            0x05, 0xdc, 0x00, 0x07, 0x00, 0x00, 0x00, 0x10,
        ],
        Packet::DbDesc(DbDesc {
            hdr: PacketHdr {
                pkt_type: PacketType::DbDesc,
                router_id: ip4!("1.1.1.1"),
                area_id: ip4!("0.0.0.1"),
                instance_id: 0,
            },
            options: Options::R | Options::E | Options::V6,
            mtu: 1500,
            dd_flags: DbDescFlags::I | DbDescFlags::M | DbDescFlags::MS,
            dd_seq_no: 16,
            lsa_hdrs: vec![],
            lls: None,
        }),
    )
});

static LSREQUEST1: Lazy<(Vec<u8>, Packet)> = Lazy::new(|| {
    (
        vec![
            0x03, 0x03, 0x00, 0x1c, 0x02, 0x02, 0x02, 0x02, 0x00, 0x00,
            0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x20, 0x01,
            0x00, 0x00, 0x00, 0x00, 0x01, 0x01, 0x01, 0x01,
        ],
        Packet::LsRequest(LsRequest {
            hdr: PacketHdr {
                pkt_type: PacketType::LsRequest,
                router_id: ip4!("2.2.2.2"),
                area_id: ip4!("0.0.0.1"),
                instance_id: 0,
            },
            entries: vec![LsaKey {
                lsa_type: LsaType::ROUTER,
                adv_rtr: ip4!("1.1.1.1"),
                lsa_id: ip4!("0.0.0.0"),
            }],
        }),
    )
});

static LSACK1: Lazy<(Vec<u8>, Packet)> = Lazy::new(|| {
    (
        vec![
            0x03, 0x05, 0x00, 0x24, 0x02, 0x02, 0x02, 0x02, 0x00, 0x00,
            0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x20, 0x01,
            0x00, 0x00, 0x00, 0x00, 0x01, 0x01, 0x01, 0x01, 0x80, 0x00,
            0x00, 0x01, 0xd2, 0x2f, 0x00, 0x28,
        ],
        Packet::LsAck(LsAck {
            hdr: PacketHdr {
                pkt_type: PacketType::LsAck,
                router_id: ip4!("2.2.2.2"),
                area_id: ip4!("0.0.0.1"),
                instance_id: 0,
            },
            lsa_hdrs: vec![LsaHdr {
                age: 1,
                lsa_type: LsaType::ROUTER,
                lsa_id: ip4!("0.0.0.0"),
                adv_rtr: ip4!("1.1.1.1"),
                seq_no: 0x80000001,
                cksum: 0xd22f,
                length: 40,
            }],
        }),
    )
});

static LSA_ROUTER1: Lazy<(Vec<u8>, Lsa)> = Lazy::new(|| {
    (
        vec![
            0x00, 0x01, 0x20, 0x01, 0x00, 0x00, 0x00, 0x00, 0x01, 0x01,
            0x01, 0x01, 0x80, 0x00, 0x00, 0x01, 0xd2, 0x2f, 0x00, 0x28,
            0x00, 0x00, 0x00, 0x13, 0x01, 0x00, 0x00, 0x0a, 0x00, 0x00,
            0x00, 0x04, 0x00, 0x00, 0x00, 0x05, 0x02, 0x02, 0x02, 0x02,
        ],
        Lsa::new(
            1,
            ip4!("0.0.0.0"),
            ip4!("1.1.1.1"),
            0x80000001,
            LsaBody::Router(LsaRouter::new(
                LsaRouterFlags::empty(),
                Options::R | Options::E | Options::V6,
                vec![LsaRouterLink::new(
                    LsaRouterLinkType::PointToPoint,
                    10,
                    4,
                    5,
                    ip4!("2.2.2.2"),
                )],
            )),
        ),
    )
});

//
// Tests.
//

#[test]
fn test_encode_hello1() {
    let (ref bytes, ref packet) = *HELLO1;
    test_encode_packet(bytes, packet);
}

#[test]
fn test_decode_hello1() {
    let (ref bytes, ref packet) = *HELLO1;
    test_decode_packet(bytes, packet);
}

#[test]
fn test_encode_dbdesc1() {
    let (ref bytes, ref packet) = *DBDESC1;
    test_encode_packet(bytes, packet);
}

#[test]
fn test_decode_dbdesc1() {
    let (ref bytes, ref packet) = *DBDESC1;
    test_decode_packet(bytes, packet);
}

#[test]
fn test_encode_lsrequest1() {
    let (ref bytes, ref packet) = *LSREQUEST1;
    test_encode_packet(bytes, packet);
}

#[test]
fn test_decode_lsrequest1() {
    let (ref bytes, ref packet) = *LSREQUEST1;
    test_decode_packet(bytes, packet);
}

#[test]
fn test_encode_lsack1() {
    let (ref bytes, ref packet) = *LSACK1;
    test_encode_packet(bytes, packet);
}

#[test]
fn test_decode_lsack1() {
    let (ref bytes, ref packet) = *LSACK1;
    test_decode_packet(bytes, packet);
}

#[test]
fn test_encode_lsa_router1() {
    let (ref bytes, ref lsa) = *LSA_ROUTER1;
    test_encode_lsa(bytes, lsa);
}

#[test]
fn test_decode_lsa_router1() {
    let (ref bytes, ref lsa) = *LSA_ROUTER1;
    test_decode_lsa(bytes, lsa);
}

#[test]
fn test_lsa_checksum_validation() {
    let (ref bytes, _) = *LSA_ROUTER1;
    let mut buf = Bytes::copy_from_slice(bytes);
    let lsa = Lsa::decode(&mut buf).unwrap();
    lsa.validate().unwrap();

    // A corrupted body must fail the checksum validation.
    let mut corrupted = bytes.clone();
    corrupted[39] ^= 0xff;
    let mut buf = Bytes::copy_from_slice(&corrupted);
    let lsa = Lsa::decode(&mut buf).unwrap();
    assert!(lsa.validate().is_err());
}
