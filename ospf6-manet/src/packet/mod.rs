//
// Copyright (c) The ospf6-manet Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod error;
pub mod lls;
pub mod lsa;

use std::cell::{RefCell, RefMut};
use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use ospf6_manet_utils::bytes::{BytesExt, BytesMutExt, TLS_BUF};
use ospf6_manet_utils::ip::Ipv4AddrExt;
use serde::{Deserialize, Serialize};

use crate::neighbor::NeighborNetId;
use crate::packet::error::{DecodeError, DecodeResult};
use crate::packet::lls::{LLS_HDR_SIZE, LlsDbDescData, LlsHelloData};
use crate::packet::lsa::{Lsa, LsaHdr, LsaKey, LsaType};

// OSPFv3 Options field.
//
// IANA registry:
// https://www.iana.org/assignments/ospfv3-parameters/ospfv3-parameters.xhtml#ospfv3-parameters-1
bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct Options: u16 {
        const V6 = 0x0001;
        const E = 0x0002;
        const N = 0x0008;
        const R = 0x0010;
        const DC = 0x0020;
        const L = 0x0200;
    }
}

// Database Description flags.
bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct DbDescFlags: u8 {
        const MS = 0x01;
        const M = 0x02;
        const I = 0x04;
    }
}

// OSPF packet type.
#[derive(Clone, Copy, Debug, Eq, Hash, FromPrimitive, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum PacketType {
    Hello = 0x01,
    DbDesc = 0x02,
    LsRequest = 0x03,
    LsUpdate = 0x04,
    LsAck = 0x05,
}

// OSPFv3 packet.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum Packet {
    Hello(Hello),
    DbDesc(DbDesc),
    LsRequest(LsRequest),
    LsUpdate(LsUpdate),
    LsAck(LsAck),
}

//
// OSPFv3 packet header.
//
// Encoding format:
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |   Version #   |     Type      |         Packet length         |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                         Router ID                             |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                          Area ID                              |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |          Checksum             |  Instance ID  |      0        |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct PacketHdr {
    pub pkt_type: PacketType,
    pub router_id: Ipv4Addr,
    pub area_id: Ipv4Addr,
    pub instance_id: u8,
}

//
// OSPFv3 Hello packet.
//
// Encoding format (packet body):
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                        Interface ID                           |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// | Rtr Priority  |             Options                           |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |        HelloInterval          |       RouterDeadInterval      |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                   Designated Router ID                        |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                Backup Designated Router ID                    |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                         Neighbor ID                           |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                        ...                                    |
//
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct Hello {
    pub hdr: PacketHdr,
    pub iface_id: u32,
    pub priority: u8,
    pub options: Options,
    pub hello_interval: u16,
    pub dead_interval: u16,
    pub dr: Option<NeighborNetId>,
    pub bdr: Option<NeighborNetId>,
    pub neighbors: BTreeSet<Ipv4Addr>,
    pub lls: Option<LlsHelloData>,
}

//
// OSPFv3 Database Description packet.
//
// Encoding format (packet body):
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+--+
// |       0       |               Options                          |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+--+
// |        Interface MTU          |      0        |0|0|0|0|0|I|M|MS|
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+--+
// |                    DD sequence number                          |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+--+
// |                        LSA Headers ...                         |
//
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct DbDesc {
    pub hdr: PacketHdr,
    pub options: Options,
    pub mtu: u16,
    pub dd_flags: DbDescFlags,
    pub dd_seq_no: u32,
    pub lsa_hdrs: Vec<LsaHdr>,
    pub lls: Option<LlsDbDescData>,
}

//
// OSPFv3 Link State Request packet.
//
// Encoding format (packet body):
//
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |              0                |        LS Type                |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                         Link State ID                         |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                       Advertising Router                      |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                                 ...                           |
//
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsRequest {
    pub hdr: PacketHdr,
    pub entries: Vec<LsaKey>,
}

//
// OSPFv3 Link State Update packet.
//
// Encoding format (packet body):
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                            # LSAs                             |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                             LSAs ...                          |
//
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsUpdate {
    pub hdr: PacketHdr,
    pub lsas: Vec<Lsa>,
}

//
// OSPFv3 Link State Acknowledgment packet.
//
// Encoding format (packet body): a sequence of LSA headers.
//
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsAck {
    pub hdr: PacketHdr,
    pub lsa_hdrs: Vec<LsaHdr>,
}

// ===== impl Options =====

impl Options {
    pub(crate) fn decode(buf: &mut Bytes) -> Self {
        // Ignore unknown options.
        let _ = buf.get_u8();
        Options::from_bits_truncate(buf.get_u16())
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(0);
        buf.put_u16(self.bits());
    }

    pub(crate) fn e_bit(&self) -> bool {
        self.contains(Options::E)
    }

    pub(crate) fn l_bit(&self) -> bool {
        self.contains(Options::L)
    }
}

// ===== impl PacketHdr =====

impl PacketHdr {
    pub const VERSION: u8 = 3;
    pub const LENGTH: u16 = 16;
    pub const CHECKSUM_OFFSET: i32 = 12;

    pub fn new(
        pkt_type: PacketType,
        router_id: Ipv4Addr,
        area_id: Ipv4Addr,
        instance_id: u8,
    ) -> PacketHdr {
        PacketHdr {
            pkt_type,
            router_id,
            area_id,
            instance_id,
        }
    }

    // Decodes the packet header, returning it together with the packet
    // length from the header.
    fn decode(buf: &mut Bytes) -> DecodeResult<(Self, u16)> {
        let version = buf.get_u8();
        if version != Self::VERSION {
            return Err(DecodeError::InvalidVersion(version));
        }

        let pkt_type = buf.get_u8();
        let pkt_type = match PacketType::from_u8(pkt_type) {
            Some(pkt_type) => pkt_type,
            None => return Err(DecodeError::UnknownPacketType(pkt_type)),
        };

        let pkt_len = buf.get_u16();
        if pkt_len < Self::LENGTH {
            return Err(DecodeError::InvalidLength(pkt_len));
        }

        let router_id = buf.get_ipv4();
        if !router_id.is_usable() {
            return Err(DecodeError::InvalidRouterId(router_id));
        }

        let area_id = buf.get_ipv4();

        // The checksum is computed and verified at the IPv6 layer
        // (IPV6_CHECKSUM socket option).
        let _cksum = buf.get_u16();

        let instance_id = buf.get_u8();
        let _ = buf.get_u8();

        Ok((
            PacketHdr {
                pkt_type,
                router_id,
                area_id,
                instance_id,
            },
            pkt_len,
        ))
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(Self::VERSION);
        buf.put_u8(self.pkt_type as u8);
        // The length will be initialized later.
        buf.put_u16(0);
        buf.put_ipv4(&self.router_id);
        buf.put_ipv4(&self.area_id);
        // The checksum is computed by the kernel.
        buf.put_u16(0);
        buf.put_u8(self.instance_id);
        buf.put_u8(0);
    }
}

// ===== impl Hello =====

impl Hello {
    pub const BASE_LENGTH: u16 = 20;

    fn decode(
        hdr: PacketHdr,
        buf: &mut Bytes,
        lls: Option<LlsHelloData>,
    ) -> DecodeResult<Hello> {
        if buf.remaining() < Self::BASE_LENGTH as usize {
            return Err(DecodeError::InvalidLength(buf.len() as u16));
        }

        let iface_id = buf.get_u32();
        let priority = buf.get_u8();
        let options = Options::decode(buf);
        let hello_interval = buf.get_u16();
        let dead_interval = buf.get_u16();
        let dr = buf.get_opt_ipv4();
        let bdr = buf.get_opt_ipv4();

        // Parse list of neighbors.
        let mut neighbors = BTreeSet::new();
        let nbrs_cnt = buf.remaining() / 4;
        for _ in 0..nbrs_cnt {
            neighbors.insert(buf.get_ipv4());
        }

        Ok(Hello {
            hdr,
            iface_id,
            priority,
            options,
            hello_interval,
            dead_interval,
            dr: dr.map(NeighborNetId::from),
            bdr: bdr.map(NeighborNetId::from),
            neighbors,
            lls,
        })
    }

    pub fn encode(&self) -> Bytes {
        TLS_BUF.with(|buf| {
            let mut buf = packet_encode_start(buf, &self.hdr);

            buf.put_u32(self.iface_id);
            buf.put_u8(self.priority);
            self.options.encode(&mut buf);
            buf.put_u16(self.hello_interval);
            buf.put_u16(self.dead_interval);
            buf.put_ipv4(
                &self
                    .dr
                    .map(|addr| addr.get())
                    .unwrap_or(Ipv4Addr::UNSPECIFIED),
            );
            buf.put_ipv4(
                &self
                    .bdr
                    .map(|addr| addr.get())
                    .unwrap_or(Ipv4Addr::UNSPECIFIED),
            );
            for nbr in &self.neighbors {
                buf.put_ipv4(nbr);
            }

            packet_encode_end(buf, |buf| {
                if let Some(lls) = &self.lls {
                    lls.encode(buf);
                }
            })
        })
    }
}

// ===== impl DbDesc =====

impl DbDesc {
    pub const BASE_LENGTH: u16 = 12;

    fn decode(
        hdr: PacketHdr,
        buf: &mut Bytes,
        lls: Option<LlsDbDescData>,
    ) -> DecodeResult<DbDesc> {
        if buf.remaining() < Self::BASE_LENGTH as usize {
            return Err(DecodeError::InvalidLength(buf.len() as u16));
        }

        let _ = buf.get_u8();
        let options = Options::decode(buf);
        let mtu = buf.get_u16();
        let _ = buf.get_u8();
        let dd_flags = DbDescFlags::from_bits_truncate(buf.get_u8());
        let dd_seq_no = buf.get_u32();

        // Parse list of LSA headers.
        let mut lsa_hdrs = vec![];
        let lsa_hdrs_cnt = buf.remaining() / LsaHdr::LENGTH as usize;
        for _ in 0..lsa_hdrs_cnt {
            lsa_hdrs.push(LsaHdr::decode(buf)?);
        }

        Ok(DbDesc {
            hdr,
            options,
            mtu,
            dd_flags,
            dd_seq_no,
            lsa_hdrs,
            lls,
        })
    }

    pub fn encode(&self) -> Bytes {
        TLS_BUF.with(|buf| {
            let mut buf = packet_encode_start(buf, &self.hdr);

            buf.put_u8(0);
            self.options.encode(&mut buf);
            buf.put_u16(self.mtu);
            buf.put_u8(0);
            buf.put_u8(self.dd_flags.bits());
            buf.put_u32(self.dd_seq_no);
            for lsa_hdr in &self.lsa_hdrs {
                lsa_hdr.encode(&mut buf);
            }

            packet_encode_end(buf, |buf| {
                if let Some(lls) = &self.lls {
                    lls.encode(buf);
                }
            })
        })
    }
}

// ===== impl LsRequest =====

impl LsRequest {
    pub const ENTRY_LENGTH: u16 = 12;

    fn decode(hdr: PacketHdr, buf: &mut Bytes) -> DecodeResult<LsRequest> {
        // Parse list of request entries.
        let mut entries = vec![];
        let entries_cnt = buf.remaining() / LsRequest::ENTRY_LENGTH as usize;
        for _ in 0..entries_cnt {
            let _ = buf.get_u16();
            let lsa_type = LsaType(buf.get_u16());
            let lsa_id = buf.get_ipv4();
            let adv_rtr = buf.get_ipv4();
            entries.push(LsaKey {
                lsa_type,
                adv_rtr,
                lsa_id,
            });
        }

        Ok(LsRequest { hdr, entries })
    }

    pub fn encode(&self) -> Bytes {
        TLS_BUF.with(|buf| {
            let mut buf = packet_encode_start(buf, &self.hdr);

            for entry in &self.entries {
                buf.put_u16(0);
                buf.put_u16(entry.lsa_type.0);
                buf.put_ipv4(&entry.lsa_id);
                buf.put_ipv4(&entry.adv_rtr);
            }

            packet_encode_end(buf, |_| ())
        })
    }
}

// ===== impl LsUpdate =====

impl LsUpdate {
    pub const BASE_LENGTH: u16 = 4;

    fn decode(hdr: PacketHdr, buf: &mut Bytes) -> DecodeResult<LsUpdate> {
        if buf.remaining() < Self::BASE_LENGTH as usize {
            return Err(DecodeError::InvalidLength(buf.len() as u16));
        }

        // Parse list of LSAs.
        let mut lsas = vec![];
        let lsas_cnt = buf.get_u32();
        for _ in 0..lsas_cnt {
            lsas.push(Lsa::decode(buf)?);
        }

        Ok(LsUpdate { hdr, lsas })
    }

    pub fn encode(&self) -> Bytes {
        TLS_BUF.with(|buf| {
            let mut buf = packet_encode_start(buf, &self.hdr);

            buf.put_u32(self.lsas.len() as u32);
            for lsa in &self.lsas {
                buf.put_slice(&lsa.raw);
            }

            packet_encode_end(buf, |_| ())
        })
    }
}

// ===== impl LsAck =====

impl LsAck {
    fn decode(hdr: PacketHdr, buf: &mut Bytes) -> DecodeResult<LsAck> {
        // Parse list of LSA headers.
        let mut lsa_hdrs = vec![];
        let lsa_hdrs_cnt = buf.remaining() / LsaHdr::LENGTH as usize;
        for _ in 0..lsa_hdrs_cnt {
            lsa_hdrs.push(LsaHdr::decode(buf)?);
        }

        Ok(LsAck { hdr, lsa_hdrs })
    }

    pub fn encode(&self) -> Bytes {
        TLS_BUF.with(|buf| {
            let mut buf = packet_encode_start(buf, &self.hdr);

            for lsa_hdr in &self.lsa_hdrs {
                lsa_hdr.encode(&mut buf);
            }

            packet_encode_end(buf, |_| ())
        })
    }
}

// ===== impl Packet =====

impl Packet {
    // Decodes an OSPFv3 packet from a bytes buffer.
    pub fn decode(buf: &mut Bytes) -> DecodeResult<Packet> {
        // Ensure we have at least the fixed header length.
        if buf.len() < PacketHdr::LENGTH as usize {
            return Err(DecodeError::IncompletePacket);
        }

        // Create a zero-copy duplicate of the original packet buffer.
        let buf_orig = buf.clone();

        // Decode the packet header.
        let (hdr, pkt_len) = PacketHdr::decode(buf)?;

        // Verify the buffer length is at least the packet length specified
        // in the header. The two don't always match exactly because the
        // optional trailing LLS block is not counted in the packet length.
        if (pkt_len as usize) > buf_orig.len() {
            return Err(DecodeError::IncompletePacket);
        }

        // Decode the optional LLS block of Hello and Database Description
        // packets. An LLS block with a corrupted checksum is ignored rather
        // than failing the whole packet.
        let lls_data = match hdr.pkt_type {
            PacketType::Hello | PacketType::DbDesc => {
                let options = packet_options(buf_orig.as_ref());
                if options.is_some_and(|options| options.l_bit()) {
                    match decode_lls_block(&buf_orig, pkt_len) {
                        Ok(lls) => lls,
                        Err(DecodeError::InvalidChecksum) => None,
                        Err(error) => return Err(error),
                    }
                } else {
                    None
                }
            }
            _ => None,
        };

        // Decode the packet body.
        let mut buf =
            buf.slice(..pkt_len as usize - PacketHdr::LENGTH as usize);
        let packet = match hdr.pkt_type {
            PacketType::Hello => {
                let lls = lls_data
                    .map(|mut data| LlsHelloData::decode(&mut data))
                    .transpose()?;
                Packet::Hello(Hello::decode(hdr, &mut buf, lls)?)
            }
            PacketType::DbDesc => {
                let lls = lls_data
                    .map(|mut data| LlsDbDescData::decode(&mut data))
                    .transpose()?;
                Packet::DbDesc(DbDesc::decode(hdr, &mut buf, lls)?)
            }
            PacketType::LsRequest => {
                Packet::LsRequest(LsRequest::decode(hdr, &mut buf)?)
            }
            PacketType::LsUpdate => {
                Packet::LsUpdate(LsUpdate::decode(hdr, &mut buf)?)
            }
            PacketType::LsAck => Packet::LsAck(LsAck::decode(hdr, &mut buf)?),
        };

        Ok(packet)
    }

    // Encodes an OSPFv3 packet into a bytes buffer.
    pub fn encode(&self) -> Bytes {
        match self {
            Packet::Hello(pkt) => pkt.encode(),
            Packet::DbDesc(pkt) => pkt.encode(),
            Packet::LsRequest(pkt) => pkt.encode(),
            Packet::LsUpdate(pkt) => pkt.encode(),
            Packet::LsAck(pkt) => pkt.encode(),
        }
    }

    // Returns a reference to the packet header.
    pub fn hdr(&self) -> &PacketHdr {
        match self {
            Packet::Hello(pkt) => &pkt.hdr,
            Packet::DbDesc(pkt) => &pkt.hdr,
            Packet::LsRequest(pkt) => &pkt.hdr,
            Packet::LsUpdate(pkt) => &pkt.hdr,
            Packet::LsAck(pkt) => &pkt.hdr,
        }
    }
}

// ===== helper functions =====

fn packet_encode_start<'a>(
    buf: &'a RefCell<BytesMut>,
    hdr: &PacketHdr,
) -> RefMut<'a, BytesMut> {
    let mut buf = buf.borrow_mut();
    buf.clear();
    hdr.encode(&mut buf);
    buf
}

fn packet_encode_end(
    mut buf: RefMut<'_, BytesMut>,
    append_lls: impl FnOnce(&mut BytesMut),
) -> Bytes {
    // Initialize packet length. The LLS block appended afterwards is not
    // included in it.
    let pkt_len = buf.len() as u16;
    buf[2..4].copy_from_slice(&pkt_len.to_be_bytes());

    append_lls(&mut buf);

    buf.clone().freeze()
}

// Retrieves the Options field from Hello and Database Description packets.
//
// Assumes the packet length has been validated beforehand.
fn packet_options(data: &[u8]) -> Option<Options> {
    let pkt_type = PacketType::from_u8(data[1])?;
    if data.len() < PacketHdr::LENGTH as usize + 8 {
        return None;
    }
    match pkt_type {
        PacketType::Hello => {
            let options = &data[PacketHdr::LENGTH as usize + 6..];
            let options = ((options[0] as u16) << 8) | options[1] as u16;
            Some(Options::from_bits_truncate(options))
        }
        PacketType::DbDesc => {
            let options = &data[PacketHdr::LENGTH as usize + 2..];
            let options = ((options[0] as u16) << 8) | options[1] as u16;
            Some(Options::from_bits_truncate(options))
        }
        PacketType::LsRequest | PacketType::LsUpdate | PacketType::LsAck => {
            None
        }
    }
}

// Extracts and checksums the LLS block appended past the end of the OSPF
// packet proper.
fn decode_lls_block(data: &Bytes, pkt_len: u16) -> DecodeResult<Option<Bytes>> {
    let block = data.slice(pkt_len as usize..);
    if block.remaining() < LLS_HDR_SIZE as usize {
        return Err(DecodeError::InvalidLength(block.len() as u16));
    }

    // The length field counts 32-bit words, header included.
    let lls_words =
        u16::from_be_bytes([block[2], block[3]]) as usize;
    let lls_len = lls_words * 4;
    if block.remaining() < lls_len || lls_len < LLS_HDR_SIZE as usize {
        return Err(DecodeError::InvalidLength(block.len() as u16));
    }

    let block = block.slice(..lls_len);
    lls::lls_verify_cksum(block.as_ref())?;

    Ok(Some(block.slice(LLS_HDR_SIZE as usize..)))
}
