//
// Copyright (c) The ospf6-manet Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use internet_checksum::Checksum;
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive, ToPrimitive};
use ospf6_manet_utils::bytes::{BytesExt, BytesMutExt};
use serde::{Deserialize, Serialize};

use crate::packet::error::{DecodeError, DecodeResult};

// LLS header size: checksum (2) plus length in 32-bit words (2).
pub const LLS_HDR_SIZE: u16 = 4;

// TLV header size: type (2) plus value length in bytes (2).
pub const TLV_HDR_SIZE: u16 = 4;

// LLS TLV types used by the MANET extensions.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(FromPrimitive, ToPrimitive)]
pub enum LlsTlvType {
    Options = 0x01,
    Scs = 0x02,
    NeighborDrop = 0x03,
    Relay = 0x04,
    Willingness = 0x05,
    Request = 0x06,
    FullSync = 0x07,
    HeardNbrList = 0x11,
    ReportedNbrList = 0x12,
    LostNbrList = 0x13,
    HelloSeq = 0x14,
    MdrPair = 0x15,
    DependentNbrList = 0x16,
}

bitflags! {
    // State Check Sequence TLV flags.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct ScsFlags: u16 {
        // Request for current state.
        const R = 0x8000;
        // Answer with current state.
        const FS = 0x4000;
        // Incomplete state.
        const N = 0x2000;
    }
}

bitflags! {
    // Relay TLV flags.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct RelayFlags: u8 {
        // Always flood.
        const A = 0x80;
        // Almost never flood.
        const N = 0x40;
    }
}

// State Check Sequence TLV payload.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct ScsTlv {
    pub number: u16,
    pub flags: ScsFlags,
}

// Active Overlapping Relays TLV payload.
//
// The first `added` entries of `relays` are newly activated relays; the
// remainder are dropped relays being reported for RouterDeadInterval.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct RelayTlv {
    pub added: u8,
    pub flags: RelayFlags,
    pub relays: Vec<Ipv4Addr>,
}

// Hello Sequence TLV payload.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct HelloSeqTlv {
    pub number: u16,
}

// MDR pair TLV payload: the parent and backup parent selected by the
// sending router.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct MdrPairTlv {
    pub parent: Ipv4Addr,
    pub bparent: Ipv4Addr,
}

// LLS data block carried by Hello packets.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LlsHelloData {
    pub scs: Option<ScsTlv>,
    pub dropped_nbrs: BTreeSet<Ipv4Addr>,
    pub relay: Option<RelayTlv>,
    pub willingness: Option<u8>,
    pub request_from: BTreeSet<Ipv4Addr>,
    pub full_sync: BTreeSet<Ipv4Addr>,
    pub heard: BTreeSet<Ipv4Addr>,
    pub reported: BTreeSet<Ipv4Addr>,
    pub lost: BTreeSet<Ipv4Addr>,
    pub hello_seq: Option<HelloSeqTlv>,
    pub mdr: Option<MdrPairTlv>,
    pub dependent: BTreeSet<Ipv4Addr>,
}

// LLS data block carried by Database Description packets.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LlsDbDescData {
    pub scs: Option<ScsTlv>,
}

// ===== impl LlsHelloData =====

impl LlsHelloData {
    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        let start_pos = lls_encode_start(buf);

        if let Some(scs) = &self.scs {
            let tlv_pos = tlv_encode_start(buf, LlsTlvType::Scs);
            buf.put_u16(scs.number);
            buf.put_u16(scs.flags.bits());
            tlv_encode_end(buf, tlv_pos);
        }
        encode_router_id_tlv(buf, LlsTlvType::NeighborDrop, &self.dropped_nbrs);
        if let Some(relay) = &self.relay {
            let tlv_pos = tlv_encode_start(buf, LlsTlvType::Relay);
            buf.put_u8(relay.added);
            buf.put_u8(relay.flags.bits());
            buf.put_u16(0);
            for router_id in &relay.relays {
                buf.put_ipv4(router_id);
            }
            tlv_encode_end(buf, tlv_pos);
        }
        if let Some(will) = self.willingness {
            let tlv_pos = tlv_encode_start(buf, LlsTlvType::Willingness);
            buf.put_u8(will);
            buf.put_u8(0);
            buf.put_u16(0);
            tlv_encode_end(buf, tlv_pos);
        }
        encode_router_id_tlv(buf, LlsTlvType::Request, &self.request_from);
        encode_router_id_tlv(buf, LlsTlvType::FullSync, &self.full_sync);
        encode_router_id_tlv(buf, LlsTlvType::HeardNbrList, &self.heard);
        encode_router_id_tlv(buf, LlsTlvType::ReportedNbrList, &self.reported);
        encode_router_id_tlv(buf, LlsTlvType::LostNbrList, &self.lost);
        if let Some(hs) = &self.hello_seq {
            let tlv_pos = tlv_encode_start(buf, LlsTlvType::HelloSeq);
            buf.put_u16(hs.number);
            buf.put_u16(0);
            tlv_encode_end(buf, tlv_pos);
        }
        if let Some(mdr) = &self.mdr {
            let tlv_pos = tlv_encode_start(buf, LlsTlvType::MdrPair);
            buf.put_ipv4(&mdr.parent);
            buf.put_ipv4(&mdr.bparent);
            tlv_encode_end(buf, tlv_pos);
        }
        encode_router_id_tlv(
            buf,
            LlsTlvType::DependentNbrList,
            &self.dependent,
        );

        lls_encode_end(buf, start_pos);
    }

    pub(crate) fn decode(buf: &mut Bytes) -> DecodeResult<LlsHelloData> {
        let mut lls = LlsHelloData::default();

        decode_tlvs(buf, |tlv_type, tlv_len, buf| {
            match tlv_type {
                Some(LlsTlvType::Scs) => {
                    if tlv_len != 4 {
                        return Err(DecodeError::InvalidTlvLength(tlv_len));
                    }
                    lls.scs = Some(ScsTlv {
                        number: buf.get_u16(),
                        flags: ScsFlags::from_bits_truncate(buf.get_u16()),
                    });
                }
                Some(LlsTlvType::NeighborDrop) => {
                    lls.dropped_nbrs = decode_router_ids(tlv_len, buf)?;
                }
                Some(LlsTlvType::Relay) => {
                    if tlv_len < 4 || tlv_len % 4 != 0 {
                        return Err(DecodeError::InvalidTlvLength(tlv_len));
                    }
                    let added = buf.get_u8();
                    let flags = RelayFlags::from_bits_truncate(buf.get_u8());
                    let _ = buf.get_u16();
                    let mut relays = vec![];
                    for _ in 0..(tlv_len - 4) / 4 {
                        relays.push(buf.get_ipv4());
                    }
                    lls.relay = Some(RelayTlv {
                        added,
                        flags,
                        relays,
                    });
                }
                Some(LlsTlvType::Willingness) => {
                    if tlv_len != 4 {
                        return Err(DecodeError::InvalidTlvLength(tlv_len));
                    }
                    lls.willingness = Some(buf.get_u8());
                    let _ = buf.get_u8();
                    let _ = buf.get_u16();
                }
                Some(LlsTlvType::Request) => {
                    lls.request_from = decode_router_ids(tlv_len, buf)?;
                }
                Some(LlsTlvType::FullSync) => {
                    lls.full_sync = decode_router_ids(tlv_len, buf)?;
                }
                Some(LlsTlvType::HeardNbrList) => {
                    lls.heard = decode_router_ids(tlv_len, buf)?;
                }
                Some(LlsTlvType::ReportedNbrList) => {
                    lls.reported = decode_router_ids(tlv_len, buf)?;
                }
                Some(LlsTlvType::LostNbrList) => {
                    lls.lost = decode_router_ids(tlv_len, buf)?;
                }
                Some(LlsTlvType::HelloSeq) => {
                    if tlv_len != 4 {
                        return Err(DecodeError::InvalidTlvLength(tlv_len));
                    }
                    lls.hello_seq = Some(HelloSeqTlv {
                        number: buf.get_u16(),
                    });
                    let _ = buf.get_u16();
                }
                Some(LlsTlvType::MdrPair) => {
                    if tlv_len != 8 {
                        return Err(DecodeError::InvalidTlvLength(tlv_len));
                    }
                    lls.mdr = Some(MdrPairTlv {
                        parent: buf.get_ipv4(),
                        bparent: buf.get_ipv4(),
                    });
                }
                Some(LlsTlvType::DependentNbrList) => {
                    lls.dependent = decode_router_ids(tlv_len, buf)?;
                }
                // Unknown TLVs are skipped.
                Some(LlsTlvType::Options) | None => {
                    buf.advance(tlv_wire_len(tlv_len) as usize);
                }
            }
            Ok(())
        })?;

        Ok(lls)
    }
}

// ===== impl LlsDbDescData =====

impl LlsDbDescData {
    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        let start_pos = lls_encode_start(buf);

        if let Some(scs) = &self.scs {
            let tlv_pos = tlv_encode_start(buf, LlsTlvType::Scs);
            buf.put_u16(scs.number);
            buf.put_u16(scs.flags.bits());
            tlv_encode_end(buf, tlv_pos);
        }

        lls_encode_end(buf, start_pos);
    }

    pub(crate) fn decode(buf: &mut Bytes) -> DecodeResult<LlsDbDescData> {
        let mut lls = LlsDbDescData::default();

        decode_tlvs(buf, |tlv_type, tlv_len, buf| {
            match tlv_type {
                Some(LlsTlvType::Scs) => {
                    if tlv_len != 4 {
                        return Err(DecodeError::InvalidTlvLength(tlv_len));
                    }
                    lls.scs = Some(ScsTlv {
                        number: buf.get_u16(),
                        flags: ScsFlags::from_bits_truncate(buf.get_u16()),
                    });
                }
                _ => {
                    buf.advance(tlv_wire_len(tlv_len) as usize);
                }
            }
            Ok(())
        })?;

        Ok(lls)
    }
}

// ===== helper functions =====

// Returns the TLV value length padded to 32-bit alignment.
fn tlv_wire_len(tlv_len: u16) -> u16 {
    tlv_len.div_ceil(4) * 4
}

fn tlv_encode_start(buf: &mut BytesMut, tlv_type: LlsTlvType) -> usize {
    let start_pos = buf.len();
    buf.put_u16(tlv_type.to_u16().unwrap());
    // The TLV length will be rewritten later.
    buf.put_u16(0);
    start_pos
}

fn tlv_encode_end(buf: &mut BytesMut, start_pos: usize) {
    // Rewrite TLV length.
    let tlv_len = (buf.len() - start_pos) as u16 - TLV_HDR_SIZE;
    buf[start_pos + 2..start_pos + 4]
        .copy_from_slice(&tlv_len.to_be_bytes());

    // Add padding to 32-bit alignment.
    let padding = (tlv_wire_len(tlv_len) - tlv_len) as usize;
    buf.put_bytes(0, padding);
}

fn encode_router_id_tlv(
    buf: &mut BytesMut,
    tlv_type: LlsTlvType,
    router_ids: &BTreeSet<Ipv4Addr>,
) {
    if router_ids.is_empty() {
        return;
    }
    let tlv_pos = tlv_encode_start(buf, tlv_type);
    for router_id in router_ids {
        buf.put_ipv4(router_id);
    }
    tlv_encode_end(buf, tlv_pos);
}

fn decode_router_ids(
    tlv_len: u16,
    buf: &mut Bytes,
) -> DecodeResult<BTreeSet<Ipv4Addr>> {
    if tlv_len % 4 != 0 {
        return Err(DecodeError::InvalidTlvLength(tlv_len));
    }
    let mut router_ids = BTreeSet::new();
    for _ in 0..tlv_len / 4 {
        router_ids.insert(buf.get_ipv4());
    }
    Ok(router_ids)
}

fn decode_tlvs(
    buf: &mut Bytes,
    mut decode_tlv: impl FnMut(
        Option<LlsTlvType>,
        u16,
        &mut Bytes,
    ) -> DecodeResult<()>,
) -> DecodeResult<()> {
    while buf.remaining() >= TLV_HDR_SIZE as usize {
        let tlv_type = buf.get_u16();
        let tlv_len = buf.get_u16();
        if buf.remaining() < tlv_wire_len(tlv_len) as usize {
            return Err(DecodeError::InvalidTlvLength(tlv_len));
        }
        let tlv_type = LlsTlvType::from_u16(tlv_type);

        // Hand the value (plus padding) to the TLV-specific decoder.
        let before = buf.remaining();
        decode_tlv(tlv_type, tlv_len, buf)?;
        let consumed = before - buf.remaining();

        // Skip any padding the decoder did not consume.
        let wire_len = tlv_wire_len(tlv_len) as usize;
        if consumed < wire_len {
            buf.advance(wire_len - consumed);
        }
    }

    Ok(())
}

pub(crate) fn lls_encode_start(buf: &mut BytesMut) -> usize {
    let start_pos = buf.len();
    // Checksum will be rewritten later.
    buf.put_u16(0);
    // The LLS data block length will be rewritten later.
    buf.put_u16(0);
    start_pos
}

pub(crate) fn lls_encode_end(buf: &mut BytesMut, start_pos: usize) {
    // The length field counts the entire LLS block, header included, in
    // 32-bit words.
    let lls_len = ((buf.len() - start_pos) / 4) as u16;
    buf[start_pos + 2..start_pos + 4]
        .copy_from_slice(&lls_len.to_be_bytes());

    // Rewrite LLS checksum.
    let mut cksum = Checksum::new();
    cksum.add_bytes(&buf[start_pos..]);
    buf[start_pos..start_pos + 2].copy_from_slice(&cksum.checksum());
}

pub(crate) fn lls_verify_cksum(data: &[u8]) -> DecodeResult<()> {
    let mut cksum = Checksum::new();
    cksum.add_bytes(&data[2..]);
    if cksum.checksum() != data[0..2] {
        return Err(DecodeError::InvalidChecksum);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tlv_padding() {
        assert_eq!(tlv_wire_len(0), 0);
        assert_eq!(tlv_wire_len(1), 4);
        assert_eq!(tlv_wire_len(4), 4);
        assert_eq!(tlv_wire_len(5), 8);
        assert_eq!(tlv_wire_len(8), 8);
    }

    #[test]
    fn hello_lls_round_trip() {
        let lls = LlsHelloData {
            scs: Some(ScsTlv {
                number: 7,
                flags: ScsFlags::R,
            }),
            reported: ["1.1.1.1".parse().unwrap(), "2.2.2.2".parse().unwrap()]
                .into(),
            hello_seq: Some(HelloSeqTlv { number: 42 }),
            mdr: Some(MdrPairTlv {
                parent: "3.3.3.3".parse().unwrap(),
                bparent: "0.0.0.0".parse().unwrap(),
            }),
            ..Default::default()
        };

        let mut buf = BytesMut::new();
        lls.encode(&mut buf);

        // Whole block is 32-bit aligned and carries a valid checksum.
        assert_eq!(buf.len() % 4, 0);
        lls_verify_cksum(&buf).unwrap();

        let mut bytes = Bytes::copy_from_slice(&buf[LLS_HDR_SIZE as usize..]);
        let decoded = LlsHelloData::decode(&mut bytes).unwrap();
        assert_eq!(lls, decoded);
    }
}
