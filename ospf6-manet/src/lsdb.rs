//
// Copyright (c) The ospf6-manet Contributors
//
// SPDX-License-Identifier: MIT
//

use std::cmp::Ordering;
use std::collections::{btree_map, hash_map};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Instant;

use bitflags::bitflags;
use chrono::Utc;
use derive_new::new;
use itertools::Itertools;
use ospf6_manet_utils::UnboundedSender;
use ospf6_manet_utils::ip::Ipv6AddrExt;
use ospf6_manet_utils::task::TimeoutTask;
use serde::{Deserialize, Serialize};

use crate::area::{Area, AreaType, OptionsLocation};
use crate::collections::{
    AreaId, Arena, InterfaceId, LsaEntryId, LsaEntryIndex, LsdbId, LsdbIndex,
    lsdb_get, lsdb_index_mut,
};
use crate::debug::{Debug, LsaFlushReason};
use crate::error::Error;
use crate::flood::flood;
use crate::instance::{InstanceArenas, InstanceUpView};
use crate::interface::{Interface, InterfaceType, LsaFullness, MdrLevel, ism};
use crate::neighbor::nsm;
use crate::packet::lsa::{
    Lsa, LsaBody, LsaFunctionCode, LsaHdr, LsaIntraAreaPrefix,
    LsaIntraAreaPrefixEntry, LsaKey, LsaLink, LsaLinkPrefix, LsaNetwork,
    LsaRouter, LsaRouterFlags, LsaRouterLink, LsaRouterLinkType, LsaScope,
    LsaType, PrefixOptions,
};
use crate::spf::SpfTriggerLsa;
use crate::tasks;
use crate::tasks::messages::input::LsaFlushMsg;
use crate::{nssa, spf};

// Architectural constants.
pub const LSA_REFRESH_TIME: u16 = 1800;
pub const LSA_MAX_AGE: u16 = 3600;
pub const LSA_MAX_AGE_DIFF: u16 = 900;
pub const LSA_INFINITY: u32 = 0x00ffffff;
pub const LSA_INIT_SEQ_NO: u32 = 0x80000001;
pub const LSA_MAX_SEQ_NO: u32 = 0x7fffffff;
pub const LSA_RESERVED_SEQ_NO: u32 = 0x80000000;
pub const LSA_MIN_INTERVAL: u64 = 5;
pub const LSA_MIN_ARRIVAL: u64 = 1;
pub const MAX_LINK_METRIC: u16 = 0xffff;

// Maximum size of the LSA log record.
const LSA_LOG_MAX_SIZE: usize = 64;

#[derive(Debug)]
pub struct LsaEntry {
    // LSA ID.
    pub id: LsaEntryId,
    // LSA data.
    pub data: Arc<Lsa>,
    // Expiry timer that triggers when the LSA age reaches MaxAge.
    pub expiry_timer: Option<TimeoutTask>,
    // Refresh timer that triggers every LSA_REFRESH_TIME seconds.
    pub refresh_timer: Option<TimeoutTask>,
    // LSA entry flags.
    pub flags: LsaEntryFlags,
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct LsaEntryFlags: u8 {
        const RECEIVED = 0x01;
        const SELF_ORIGINATED = 0x02;
        // Type-5 produced by local NSSA Type-7 translation.
        const TRANSLATED = 0x04;
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub enum LsaOriginateEvent {
    AreaStart {
        area_id: AreaId,
    },
    InterfaceStateChange {
        area_id: AreaId,
        iface_id: InterfaceId,
    },
    InterfaceDrChange {
        area_id: AreaId,
        iface_id: InterfaceId,
    },
    InterfaceAddrAddDel {
        area_id: AreaId,
        iface_id: InterfaceId,
    },
    InterfaceCostChange {
        area_id: AreaId,
    },
    NeighborToFromFull {
        area_id: AreaId,
        iface_id: InterfaceId,
    },
    NeighborTwoWayOrHigherChange {
        area_id: AreaId,
        iface_id: InterfaceId,
    },
    NeighborInterfaceIdChange {
        area_id: AreaId,
        iface_id: InterfaceId,
    },
    LinkLsaRcvd {
        area_id: AreaId,
        iface_id: InterfaceId,
    },
    SelfOriginatedLsaRcvd {
        lsdb_id: LsdbId,
        lse_id: LsaEntryId,
    },
    // The local MDR level or relay set changed on an interface of the area.
    MdrLevelChange {
        area_id: AreaId,
    },
    // The NSSA translator state of the area changed.
    NssaTranslatorChange {
        area_id: AreaId,
    },
    // The set of redistributed external routes changed.
    ExternalRoutesChange,
}

#[derive(Debug)]
pub struct LsaDelayedOrig {
    pub data: Lsa,
    pub timeout: TimeoutTask,
}

#[derive(Debug, new)]
pub struct LsaLogEntry {
    pub id: u32,
    pub lsa: LsaLogId,
    pub rcvd_time: Option<Instant>,
    pub reason: LsaLogReason,
}

#[derive(Clone, Debug)]
pub struct LsaLogId {
    pub area_id: Option<Ipv4Addr>,
    pub lsa_type: LsaType,
    pub lsa_id: Ipv4Addr,
    pub adv_rtr: Ipv4Addr,
    pub seq_no: u32,
}

#[derive(Debug)]
pub enum LsaLogReason {
    Refresh,
    ContentChange,
    Purge,
}

// ===== impl LsaEntry =====

impl LsaEntry {
    pub(crate) fn new(
        lsdb_id: LsdbId,
        id: LsaEntryId,
        data: Arc<Lsa>,
        lsa_flushp: &UnboundedSender<LsaFlushMsg>,
    ) -> LsaEntry {
        let expiry_timer = (!data.hdr.is_maxage())
            .then_some(tasks::lsa_expiry_timer(lsdb_id, id, &data, lsa_flushp));

        LsaEntry {
            id,
            data,
            expiry_timer,
            refresh_timer: None,
            flags: Default::default(),
        }
    }
}

// ===== impl LsaLogId =====

impl LsaLogId {
    pub(crate) fn new(
        areas: &crate::collections::Areas,
        lsdb_idx: LsdbIndex,
        lsa: &Lsa,
    ) -> Self {
        // Get area ID from the LSA's LSDB.
        let area_id = match lsdb_idx {
            LsdbIndex::Link(area_idx, _) | LsdbIndex::Area(area_idx) => {
                Some(areas[area_idx].area_id)
            }
            LsdbIndex::As => None,
        };

        LsaLogId {
            area_id,
            lsa_type: lsa.hdr.lsa_type,
            lsa_id: lsa.hdr.lsa_id,
            adv_rtr: lsa.hdr.adv_rtr,
            seq_no: lsa.hdr.seq_no,
        }
    }
}

// ===== global functions =====

// Compares which LSA is more recent according to the rules specified in
// Section 13.1 of RFC 2328.
//
// Returns:
// - Ordering::Greater when `a` is more recent
// - Ordering::Less when `b` is more recent
// - Ordering::Equal when the two LSAs are considered to be identical
pub(crate) fn lsa_compare(a: &LsaHdr, b: &LsaHdr) -> Ordering {
    let a_seq_no = a.seq_no as i32;
    let b_seq_no = b.seq_no as i32;
    let cmp = a_seq_no.cmp(&b_seq_no);
    if cmp != Ordering::Equal {
        return cmp;
    }

    let cmp = a.cksum.cmp(&b.cksum);
    if cmp != Ordering::Equal {
        return cmp;
    }

    if a.is_maxage() && !b.is_maxage() {
        return Ordering::Greater;
    } else if !a.is_maxage() && b.is_maxage() {
        return Ordering::Less;
    }

    if a.age.abs_diff(b.age) > LSA_MAX_AGE_DIFF {
        return b.age.cmp(&a.age);
    }

    Ordering::Equal
}

// Compares two LSAs according to the rules specified in Section 13.2 of RFC
// 2328. Its purpose is to determine if the contents of the LSAs are
// identical.
pub(crate) fn lsa_same_contents(a: &Lsa, b: &Lsa) -> bool {
    if a.hdr.is_maxage() ^ b.hdr.is_maxage() {
        return false;
    }

    if a.hdr.length != b.hdr.length {
        return false;
    }

    let hdr_length = LsaHdr::LENGTH as usize;
    a.raw[hdr_length..] == b.raw[hdr_length..]
}

// Checks whether the LSA type is acceptable in the given area.
//
// AS-scoped LSAs (and Inter-Area-Router-LSAs, as per errata 3746 of RFC
// 2328) are rejected on stub and NSSA areas. LSAs of reserved scope are
// always rejected.
pub(crate) fn lsa_type_is_valid(
    area_type: Option<AreaType>,
    lsa_type: LsaType,
) -> bool {
    if lsa_type.scope() == LsaScope::Unknown {
        return false;
    }

    if let Some(area_type) = area_type
        && area_type != AreaType::Normal
        && (lsa_type.scope() == LsaScope::As
            || lsa_type.function_code()
                == Some(LsaFunctionCode::InterAreaRouter))
    {
        return false;
    }

    true
}

// Checks whether the LSA is self-originated.
//
// For IPv6, self-originated LSAs are those LSAs whose Advertising Router is
// equal to the router's own Router ID.
pub(crate) fn lsa_is_self_originated(lsa: &Lsa, router_id: Ipv4Addr) -> bool {
    lsa.hdr.adv_rtr == router_id
}

// Returns the LSDB holding LSAs of the given type, taking the U-bit into
// consideration: unrecognized LSAs with the U-bit clear are treated as
// having link-local scope.
pub(crate) fn lsdb_get_by_lsa_type(
    iface_idx: crate::collections::InterfaceIndex,
    area_idx: crate::collections::AreaIndex,
    lsa_type: LsaType,
) -> LsdbIndex {
    match lsa_type.scope() {
        LsaScope::Link => LsdbIndex::Link(area_idx, iface_idx),
        LsaScope::Area => {
            if lsa_type.function_code().is_none() && !lsa_type.u_bit() {
                LsdbIndex::Link(area_idx, iface_idx)
            } else {
                LsdbIndex::Area(area_idx)
            }
        }
        LsaScope::As => {
            if lsa_type.function_code().is_none() && !lsa_type.u_bit() {
                LsdbIndex::Link(area_idx, iface_idx)
            } else {
                LsdbIndex::As
            }
        }
        LsaScope::Unknown => {
            unreachable!();
        }
    }
}

// Checks if the given LSA was received via flooding less than MinLSArrival
// seconds ago.
pub(crate) fn lsa_min_arrival_check(lse: &LsaEntry) -> bool {
    if !lse.flags.contains(LsaEntryFlags::RECEIVED) {
        return false;
    }

    #[cfg(feature = "deterministic")]
    {
        false
    }
    #[cfg(not(feature = "deterministic"))]
    {
        match lse.data.base_time {
            Some(lsa_base_time) => {
                lsa_base_time.elapsed().as_secs() < LSA_MIN_ARRIVAL
            }
            None => false,
        }
    }
}

// Checks if the given LSA was originated less than MinLSInterval seconds
// ago.
fn lsa_min_orig_interval_check(lse: &LsaEntry) -> bool {
    if lse.flags.contains(LsaEntryFlags::RECEIVED) {
        return false;
    }

    #[cfg(feature = "deterministic")]
    {
        false
    }
    #[cfg(not(feature = "deterministic"))]
    {
        match lse.data.base_time {
            Some(lsa_base_time) => {
                lsa_base_time.elapsed().as_secs() < LSA_MIN_INTERVAL
            }
            None => false,
        }
    }
}

// Returns the number of retransmission list appearances of the given LSA
// instance across all neighbors of the process.
pub(crate) fn rxmt_count(
    arenas: &InstanceArenas,
    lsa: &Arc<Lsa>,
) -> usize {
    arenas
        .neighbors
        .iter()
        .filter(|(_, nbr)| {
            nbr.lists
                .ls_rxmt
                .get(&lsa.hdr.key())
                .filter(|rxmt_lsa| Arc::ptr_eq(lsa, rxmt_lsa))
                .is_some()
        })
        .count()
}

// Installs the provided LSA to the specified LSDB.
pub(crate) fn install(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    lsdb_idx: LsdbIndex,
    lsa: Arc<Lsa>,
) -> LsaEntryIndex {
    Debug::LsaInstall(&lsa.hdr).log();

    // Remove old instance (if any) from all neighbors' Link state
    // retransmission lists.
    rxmt_lists_remove(arenas, lsdb_idx, &lsa);

    // Lookup LSDB.
    let (lsdb_id, lsdb) = lsdb_index_mut(
        &mut instance.state.lsdb,
        &mut arenas.areas,
        &mut arenas.interfaces,
        lsdb_idx,
    );

    // Remove old instance of the LSA.
    let old_lsa = match lsdb.get(&arenas.lsa_entries, &lsa.hdr.key()) {
        Some((old_lse_idx, old_lse)) => {
            let old_lsa = old_lse.data.clone();
            lsdb.delete(&mut arenas.lsa_entries, old_lse_idx);
            Some(old_lsa)
        }
        None => None,
    };

    // A newer instance supersedes whatever sits in the not-yet-adjacent
    // cache.
    lsdb.cache_remove(&lsa.hdr.key());

    // Add LSA entry to LSDB.
    let (lse_idx, lse) = lsdb.insert(
        &mut arenas.lsa_entries,
        lsdb_id,
        lsa.clone(),
        &instance.tx.protocol_input,
    );

    // Check if the LSA is self-originated and mark it as such.
    if lsa_is_self_originated(&lse.data, instance.state.router_id) {
        lse.flags.insert(LsaEntryFlags::SELF_ORIGINATED);
    }

    // RFC 2328 - Section 13.2:
    // "The contents of the new LSA should be compared to the old instance,
    // if present. If there is no difference, there is no need to
    // recalculate the routing table".
    let mut content_change = true;
    if let Some(old_lsa) = &old_lsa
        && lsa_same_contents(old_lsa, &lsa)
    {
        content_change = false;
    }
    let lsa_type = lsa.hdr.lsa_type;
    let self_orig_summary = lse.flags.contains(LsaEntryFlags::SELF_ORIGINATED)
        && (lsa_type == LsaType::INTER_AREA_PREFIX
            || lsa_type == LsaType::INTER_AREA_ROUTER);
    let route_recalc =
        content_change && !lsa.body.is_unknown() && !self_orig_summary;

    // A received Link-LSA may require a new Intra-Area-Prefix-LSA from the
    // DR.
    if let LsdbId::Link(area_id, iface_id) = lsdb_id
        && lsa.hdr.lsa_type.function_code() == Some(LsaFunctionCode::Link)
    {
        instance
            .tx
            .protocol_input
            .lsa_orig_event(LsaOriginateEvent::LinkLsaRcvd {
                area_id,
                iface_id,
            });
    }

    // NSSA Type-7 LSAs may need translation by the elected translator.
    if lsa.hdr.lsa_type == LsaType::TYPE7
        && let LsdbIndex::Area(area_idx) = lsdb_idx
    {
        nssa::type7_changed(instance, arenas, area_idx, &lsa);
    }

    // Add entry to LSA log.
    let lsa_log_id = LsaLogId::new(&arenas.areas, lsdb_idx, &lsa);
    let reason = if lsa.hdr.is_maxage() {
        LsaLogReason::Purge
    } else if content_change {
        LsaLogReason::ContentChange
    } else {
        LsaLogReason::Refresh
    };
    log_lsa(instance, lsa_log_id.clone(), lsa.base_time, reason);

    // Schedule SPF run if necessary.
    if route_recalc {
        // Update list of SPF-triggering LSAs.
        let trigger_lsa = SpfTriggerLsa::new(old_lsa, lsa, lsa_log_id);
        instance.state.spf_trigger_lsas.push(trigger_lsa);

        instance
            .state
            .spf_schedule_time
            .get_or_insert_with(Instant::now);
        instance
            .tx
            .protocol_input
            .spf_delay_event(spf::fsm::Event::Igp);
    }

    lse_idx
}

// Originates the provided LSA.
pub(crate) fn originate(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    lsdb_idx: LsdbIndex,
    lsa: Lsa,
) {
    let (lsdb_id, lsdb) = lsdb_index_mut(
        &mut instance.state.lsdb,
        &mut arenas.areas,
        &mut arenas.interfaces,
        lsdb_idx,
    );

    // When an attempt is made to increment the sequence number past the
    // maximum value of MaxSequenceNumber, the current instance of the LSA
    // must first be flushed from the routing domain. This is done by
    // prematurely aging the LSA and reflooding it. As soon as this flood
    // has been acknowledged by all adjacent neighbors, a new instance can
    // be originated with sequence number of InitialSequenceNumber.
    let lsa_key = lsa.hdr.key();
    if let Some((old_lse_idx, _)) = lsdb.get(&arenas.lsa_entries, &lsa_key)
        && lsa.hdr.seq_no == LSA_MAX_SEQ_NO + 1
    {
        // Record LSA that will be originated later and then flush the
        // existing instance.
        match lsdb.seqno_wrapping.entry(lsa_key) {
            hash_map::Entry::Occupied(mut o) => {
                *o.get_mut() = lsa;
            }
            hash_map::Entry::Vacant(v) => {
                v.insert(lsa);
            }
        }
        let reason = LsaFlushReason::PrematureAging;
        flush(instance, arenas, lsdb_idx, old_lse_idx, reason);
        return;
    }

    Debug::LsaOriginate(&lsa.hdr).log();

    let lse_idx = install(instance, arenas, lsdb_idx, Arc::new(lsa));

    let lse = &mut arenas.lsa_entries[lse_idx];
    flood(
        instance,
        &arenas.areas,
        &mut arenas.interfaces,
        &mut arenas.neighbors,
        lsdb_idx,
        &lse.data,
        None,
    );

    // Update statistics.
    instance.state.orig_lsa_count += 1;
    instance.state.discontinuity_time = Utc::now();

    // Schedule LSA refreshing.
    let refresh_timer = tasks::lsa_refresh_timer(
        lsdb_id,
        lse.id,
        &instance.tx.protocol_input.lsa_refresh,
    );
    lse.refresh_timer = Some(refresh_timer);
}

// Attempts to originate the provided LSA, but only if it passes a few
// checks.
pub(crate) fn originate_check(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    lsdb_idx: LsdbIndex,
    lsa_id: Ipv4Addr,
    lsa_body: LsaBody,
) {
    let (lsdb_id, lsdb) = lsdb_index_mut(
        &mut instance.state.lsdb,
        &mut arenas.areas,
        &mut arenas.interfaces,
        lsdb_idx,
    );
    let adv_rtr = instance.state.router_id;
    let lsa_key = LsaKey::new(lsa_body.lsa_type(), adv_rtr, lsa_id);

    // Get next sequence number.
    let seq_no = lsdb
        .get(&arenas.lsa_entries, &lsa_key)
        .map(|(_, old_lse)| old_lse.data.hdr.seq_no + 1)
        .unwrap_or(LSA_INIT_SEQ_NO);

    // Make new LSA.
    let lsa = Lsa::new(0, lsa_id, adv_rtr, seq_no, lsa_body);

    // Check if an instance of this LSA already exists in the LSDB.
    if let Some((_, old_lse)) = lsdb.get(&arenas.lsa_entries, &lsa_key) {
        // If an LSA with identical contents already exists in the LSDB,
        // skip originating a new one (as per section 12.4 of RFC 2328).
        //
        // However, if the database copy was received through flooding,
        // proceed to originate a new instance with an updated sequence
        // number.
        if lsa_same_contents(&old_lse.data, &lsa)
            && !old_lse.flags.contains(LsaEntryFlags::RECEIVED)
        {
            return;
        }

        // Perform the MinLSInterval check.
        if lsdb.delayed_orig.contains_key(&lsa_key)
            || lsa_min_orig_interval_check(old_lse)
        {
            Debug::LsaOriginateMinInterval(&lsa.hdr).log();

            match lsdb.delayed_orig.entry(lsa_key) {
                hash_map::Entry::Occupied(mut o) => {
                    // Update the LSA that will be originated, but keep the
                    // current timeout.
                    let ldo = o.get_mut();
                    ldo.data = lsa;
                }
                hash_map::Entry::Vacant(v) => {
                    // Start timer to postpone originating the LSA.
                    let timeout = tasks::lsa_orig_delayed_timer(
                        lsdb_id,
                        lsa_key,
                        old_lse.data.base_time,
                        &instance.tx.protocol_input.lsa_orig_delayed_timer,
                    );
                    v.insert(LsaDelayedOrig { data: lsa, timeout });
                }
            }
            return;
        }
    }

    // Effectively originate the LSA.
    originate(instance, arenas, lsdb_idx, lsa);
}

// Flushes LSA from the LSDB.
pub(crate) fn flush(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    lsdb_idx: LsdbIndex,
    lse_idx: LsaEntryIndex,
    reason: LsaFlushReason,
) {
    // Do not flush the same LSA more than once.
    let lse = &mut arenas.lsa_entries[lse_idx];
    if lse.data.hdr.is_maxage() {
        return;
    }

    if reason == LsaFlushReason::PrematureAging {
        assert!(lse.flags.contains(LsaEntryFlags::SELF_ORIGINATED));
    }

    Debug::LsaFlush(&lse.data.hdr, reason).log();

    // Disarm timers.
    lse.expiry_timer = None;
    lse.refresh_timer = None;

    // Set the LSA age to MaxAge.
    let mut lsa = (*lse.data).clone();
    lsa.set_maxage();
    let lsa = Arc::new(lsa);

    // Install updated LSA to clear rxmt lists and rerun route calculations.
    let lse_idx = install(instance, arenas, lsdb_idx, lsa);

    // Reflood updated LSA.
    let lse = &arenas.lsa_entries[lse_idx];
    let _ = flood(
        instance,
        &arenas.areas,
        &mut arenas.interfaces,
        &mut arenas.neighbors,
        lsdb_idx,
        &lse.data,
        None,
    );

    // Get LSA's LSDB.
    let (_, lsdb) = lsdb_index_mut(
        &mut instance.state.lsdb,
        &mut arenas.areas,
        &mut arenas.interfaces,
        lsdb_idx,
    );
    let lsa_key = lse.data.hdr.key();

    // Remove pending LSA origination, if any.
    lsdb.delayed_orig.remove(&lsa_key);
}

// Flushes all self-originated LSAs from the LSDB.
pub(crate) fn flush_all_self_originated(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
) {
    let reason = LsaFlushReason::PrematureAging;
    let mut idxs = vec![];

    // AS-scope LSAs.
    let lsdb_idx = LsdbIndex::As;
    idxs.extend(
        instance
            .state
            .lsdb
            .iter(&arenas.lsa_entries)
            .filter(|(_, lse)| {
                lse.flags.contains(LsaEntryFlags::SELF_ORIGINATED)
            })
            .map(|(lse_idx, _)| (lsdb_idx, lse_idx)),
    );

    // Area-scope LSAs.
    for area_idx in arenas.areas.indexes() {
        let area = &arenas.areas[area_idx];
        let lsdb_idx = LsdbIndex::Area(area_idx);
        idxs.extend(
            area.state
                .lsdb
                .iter(&arenas.lsa_entries)
                .filter(|(_, lse)| {
                    lse.flags.contains(LsaEntryFlags::SELF_ORIGINATED)
                })
                .map(|(lse_idx, _)| (lsdb_idx, lse_idx)),
        );

        // Link-scope LSAs.
        for iface_idx in area.interfaces.indexes() {
            let iface = &arenas.interfaces[iface_idx];
            let lsdb_idx = LsdbIndex::Link(area_idx, iface_idx);
            idxs.extend(
                iface
                    .state
                    .lsdb
                    .iter(&arenas.lsa_entries)
                    .filter(|(_, lse)| {
                        lse.flags.contains(LsaEntryFlags::SELF_ORIGINATED)
                    })
                    .map(|(lse_idx, _)| (lsdb_idx, lse_idx)),
            );
        }
    }

    // Flush LSAs.
    for (lsdb_idx, lse_idx) in idxs {
        flush(instance, arenas, lsdb_idx, lse_idx, reason);
    }
}

// Removes old instance of the given LSA from all neighbors' Link state
// retransmission lists.
fn rxmt_lists_remove(
    arenas: &mut InstanceArenas,
    lsdb_idx: LsdbIndex,
    lsa: &Lsa,
) {
    for area_idx in arenas.areas.indexes() {
        let area = &arenas.areas[area_idx];

        // Filter by LSA area.
        match lsdb_idx {
            LsdbIndex::Link(lsdb_area_idx, _)
            | LsdbIndex::Area(lsdb_area_idx) => {
                if area_idx != lsdb_area_idx {
                    continue;
                }
            }
            _ => (),
        }

        for iface_idx in area.interfaces.indexes() {
            // Filter by LSA interface.
            if let LsdbIndex::Link(_, lsdb_iface_idx) = lsdb_idx
                && iface_idx != lsdb_iface_idx
            {
                continue;
            }
            let iface = &arenas.interfaces[iface_idx];

            // Iterate over all neighbors from this interface.
            for nbr_idx in iface.state.neighbors.indexes() {
                let nbr = &mut arenas.neighbors[nbr_idx];

                // Remove LSA from rxmt list as long as it's an older
                // version.
                if let btree_map::Entry::Occupied(o) =
                    nbr.lists.ls_rxmt.entry(lsa.hdr.key())
                {
                    let old_lsa = o.get();
                    if lsa_compare(&old_lsa.hdr, &lsa.hdr) == Ordering::Less {
                        o.remove();
                        nbr.rxmt_lsupd_stop_check();
                    }
                }
            }
        }
    }
}

// Adds log entry for the newly installed LSA.
fn log_lsa(
    instance: &mut InstanceUpView<'_>,
    lsa: LsaLogId,
    rcvd_time: Option<Instant>,
    reason: LsaLogReason,
) {
    // Get next log ID.
    let log_id = &mut instance.state.lsa_log_next_id;
    *log_id += 1;

    // Add new log entry.
    let log_entry = LsaLogEntry::new(*log_id, lsa, rcvd_time, reason);
    instance.state.lsa_log.push_front(log_entry);

    // Remove old entries if necessary.
    instance.state.lsa_log.truncate(LSA_LOG_MAX_SIZE);
}

// ===== LSA origination =====

// Originates or flushes the required LSAs in response to an LSA origination
// event.
pub(crate) fn lsa_orig_event(
    instance: &InstanceUpView<'_>,
    arenas: &InstanceArenas,
    event: LsaOriginateEvent,
) -> Result<(), Error> {
    match event {
        LsaOriginateEvent::AreaStart { area_id } => {
            let (_, area) = arenas.areas.get_by_id(area_id)?;

            // Originate the initial Router-LSA of the area.
            lsa_orig_router(area, instance, arenas);
        }
        LsaOriginateEvent::InterfaceStateChange { area_id, iface_id } => {
            // (Re)originate Router-LSA(s) in all areas since the ABR status
            // might have changed.
            for area in arenas.areas.iter() {
                lsa_orig_router(area, instance, arenas);
            }

            // (Re)originate or flush Network-LSA.
            let (_, area) = arenas.areas.get_by_id(area_id)?;
            let (_, iface) =
                area.interfaces.get_by_id(&arenas.interfaces, iface_id)?;
            if iface.state.ism_state == ism::State::Dr
                && iface
                    .state
                    .neighbors
                    .iter(&arenas.neighbors)
                    .any(|nbr| nbr.state == nsm::State::Full)
            {
                lsa_orig_network(iface, area, instance, arenas);
            } else {
                lsa_flush_network(iface, area, instance, arenas);
            }

            // (Re)originate or flush Link-LSA.
            if iface.state.ism_state >= ism::State::Waiting {
                lsa_orig_link(iface, area, instance);
            } else {
                lsa_flush_link(iface, area, instance, arenas);
            }

            // (Re)originate Intra-area-prefix-LSA(s).
            if iface.state.ism_state == ism::State::Dr {
                lsa_orig_intra_area_prefix(area, instance, arenas);
            }
        }
        LsaOriginateEvent::InterfaceDrChange { area_id, iface_id } => {
            // (Re)originate Router-LSA(s).
            let (_, area) = arenas.areas.get_by_id(area_id)?;
            lsa_orig_router(area, instance, arenas);

            // (Re)originate or flush Network-LSA.
            let (_, iface) =
                area.interfaces.get_by_id(&arenas.interfaces, iface_id)?;
            if iface.state.ism_state == ism::State::Dr
                && iface
                    .state
                    .neighbors
                    .iter(&arenas.neighbors)
                    .any(|nbr| nbr.state == nsm::State::Full)
            {
                lsa_orig_network(iface, area, instance, arenas);
            } else {
                lsa_flush_network(iface, area, instance, arenas);
            }

            // (Re)originate Intra-area-prefix-LSA(s).
            lsa_orig_intra_area_prefix(area, instance, arenas);
        }
        LsaOriginateEvent::InterfaceAddrAddDel { area_id, iface_id } => {
            let (_, area) = arenas.areas.get_by_id(area_id)?;
            let (_, iface) =
                area.interfaces.get_by_id(&arenas.interfaces, iface_id)?;

            if iface.state.ism_state >= ism::State::Waiting {
                // (Re)originate or flush Link-LSA.
                lsa_orig_link(iface, area, instance);
            } else {
                // (Re)originate Intra-area-prefix-LSA(s).
                lsa_orig_intra_area_prefix(area, instance, arenas);
            }
        }
        LsaOriginateEvent::InterfaceCostChange { area_id } => {
            let (_, area) = arenas.areas.get_by_id(area_id)?;

            // (Re)originate Router-LSA(s).
            lsa_orig_router(area, instance, arenas);

            // (Re)originate Intra-area-prefix-LSA(s).
            lsa_orig_intra_area_prefix(area, instance, arenas);
        }
        LsaOriginateEvent::NeighborToFromFull { area_id, iface_id } => {
            // (Re)originate Router-LSA(s).
            let (_, area) = arenas.areas.get_by_id(area_id)?;
            lsa_orig_router(area, instance, arenas);

            // (Re)originate Network-LSA.
            let (_, iface) =
                area.interfaces.get_by_id(&arenas.interfaces, iface_id)?;
            if iface.state.ism_state == ism::State::Dr
                && iface
                    .state
                    .neighbors
                    .iter(&arenas.neighbors)
                    .any(|nbr| nbr.state == nsm::State::Full)
            {
                lsa_orig_network(iface, area, instance, arenas);
            } else {
                lsa_flush_network(iface, area, instance, arenas);
            }

            // (Re)originate Intra-area-prefix-LSA(s).
            lsa_orig_intra_area_prefix(area, instance, arenas);
        }
        LsaOriginateEvent::NeighborTwoWayOrHigherChange { area_id, .. } => {
            // On MANET interfaces running mdr-full LSAs, bidirectional
            // neighbors are advertised even before becoming adjacent.
            let (_, area) = arenas.areas.get_by_id(area_id)?;
            lsa_orig_router(area, instance, arenas);
        }
        LsaOriginateEvent::NeighborInterfaceIdChange { area_id, .. } => {
            // (Re)originate Router-LSA(s).
            let (_, area) = arenas.areas.get_by_id(area_id)?;
            lsa_orig_router(area, instance, arenas);
        }
        LsaOriginateEvent::LinkLsaRcvd { area_id, iface_id } => {
            let (_, area) = arenas.areas.get_by_id(area_id)?;
            let (_, iface) =
                area.interfaces.get_by_id(&arenas.interfaces, iface_id)?;
            if iface.state.ism_state == ism::State::Dr {
                // (Re)originate Network-LSA.
                if iface
                    .state
                    .neighbors
                    .iter(&arenas.neighbors)
                    .any(|nbr| nbr.state == nsm::State::Full)
                {
                    lsa_orig_network(iface, area, instance, arenas);
                }

                // (Re)originate Intra-area-prefix-LSA(s).
                lsa_orig_intra_area_prefix(area, instance, arenas);
            }
        }
        LsaOriginateEvent::SelfOriginatedLsaRcvd { lsdb_id, lse_id } => {
            // Check if the received self-originated LSA needs to be
            // reoriginated or flushed.
            process_self_originated_lsa(instance, arenas, lsdb_id, lse_id)?;
        }
        LsaOriginateEvent::MdrLevelChange { area_id } => {
            // The advertised neighbor set depends on the MDR level when
            // LSAFullness is mdr-full.
            let (_, area) = arenas.areas.get_by_id(area_id)?;
            lsa_orig_router(area, instance, arenas);
        }
        LsaOriginateEvent::NssaTranslatorChange { area_id } => {
            let (area_idx, _) = arenas.areas.get_by_id(area_id)?;
            nssa::translator_state_changed(instance, arenas, area_idx);
        }
        LsaOriginateEvent::ExternalRoutesChange => {
            nssa::orig_external_lsas(instance, arenas);
        }
    };

    Ok(())
}

// (Re)originates the Router-LSA of the given area.
pub(crate) fn lsa_orig_router(
    area: &Area,
    instance: &InstanceUpView<'_>,
    arenas: &InstanceArenas,
) {
    let lsdb_id = LsdbId::Area(area.id);

    // Router-LSA's options.
    let options = area.options(instance, OptionsLocation::Lsa);

    // Router-LSA's flags.
    let mut flags = LsaRouterFlags::empty();
    if arenas.areas.is_abr(&arenas.interfaces) {
        flags.insert(LsaRouterFlags::B);
    }
    if instance.config.asbr && area.config.area_type == AreaType::Normal {
        flags.insert(LsaRouterFlags::E);
    }
    if area.config.area_type == AreaType::Nssa && area.nssa_nt_bit(instance) {
        flags.insert(LsaRouterFlags::NT);
    }
    if area
        .vlinks
        .iter()
        .any(|vlink| vlink.state.nbr_state == nsm::State::Full)
    {
        flags.insert(LsaRouterFlags::V);
    }

    // Router-LSA's links.
    let mut links = vec![];
    for iface in area
        .interfaces
        .iter(&arenas.interfaces)
        // Skip interfaces in the "Down" or "Loopback" states.
        .filter(|iface| {
            !matches!(
                iface.state.ism_state,
                ism::State::Down | ism::State::Loopback,
            )
        })
    {
        let ifindex = iface.system.ifindex.unwrap_or(0);
        let cost = iface.cost(instance);

        match iface.config.if_type {
            InterfaceType::PointToPoint | InterfaceType::PointToMultipoint => {
                // Add a Type-1 link (p2p) for each fully adjacent neighbor.
                for nbr in iface
                    .state
                    .neighbors
                    .iter(&arenas.neighbors)
                    .filter(|nbr| nbr.state == nsm::State::Full)
                {
                    links.push(LsaRouterLink::new(
                        LsaRouterLinkType::PointToPoint,
                        cost,
                        ifindex,
                        nbr.iface_id.unwrap_or(0),
                        nbr.router_id,
                    ));
                }
            }
            InterfaceType::Manet => {
                // The advertised neighbor set is governed by LSAFullness.
                // With mdr-full, MDR and BMDR routers describe all
                // bidirectional neighbors; everyone else describes only the
                // adjacent ones.
                let advertise_twoway = iface.config.lsa_fullness
                    == LsaFullness::MdrFull
                    && iface.state.manet.mdr.level >= MdrLevel::Bmdr;
                for nbr in iface
                    .state
                    .neighbors
                    .iter(&arenas.neighbors)
                    .filter(|nbr| {
                        if advertise_twoway {
                            nbr.state >= nsm::State::TwoWay
                        } else {
                            nbr.state == nsm::State::Full
                        }
                    })
                {
                    links.push(LsaRouterLink::new(
                        LsaRouterLinkType::PointToPoint,
                        cost,
                        ifindex,
                        nbr.iface_id.unwrap_or(0),
                        nbr.router_id,
                    ));
                }
            }
            InterfaceType::Broadcast | InterfaceType::NonBroadcast => {
                let (dr_router_id, dr_iface_id) = if iface.state.ism_state
                    == ism::State::Dr
                {
                    if !iface
                        .state
                        .neighbors
                        .iter(&arenas.neighbors)
                        .any(|nbr| nbr.state == nsm::State::Full)
                    {
                        continue;
                    }
                    // The router itself is the DR.
                    (instance.state.router_id, ifindex)
                } else {
                    match iface.state.dr.and_then(|net_id| {
                        iface
                            .state
                            .neighbors
                            .iter(&arenas.neighbors)
                            .find(|nbr| nbr.network_id() == net_id)
                            .filter(|nbr| nbr.state == nsm::State::Full)
                    }) {
                        Some(nbr) => {
                            // The router is fully adjacent to the DR.
                            (nbr.router_id, nbr.iface_id.unwrap_or(0))
                        }
                        None => continue,
                    }
                };

                // Add a Type-2 (transit) link.
                links.push(LsaRouterLink::new(
                    LsaRouterLinkType::TransitNetwork,
                    cost,
                    ifindex,
                    dr_iface_id,
                    dr_router_id,
                ));
            }
        }
    }

    // Virtual link endpoints are described as Type-4 links.
    for vlink in area
        .vlinks
        .iter()
        .filter(|vlink| vlink.state.nbr_state == nsm::State::Full)
    {
        links.push(LsaRouterLink::new(
            LsaRouterLinkType::VirtualLink,
            vlink.config.cost,
            vlink.state.ifindex,
            vlink.state.nbr_iface_id,
            vlink.config.nbr_router_id,
        ));
    }

    // Originate as many Router-LSAs as necessary.
    let mut lsa_id: u32 = 0;
    let mut originate_fn = |links| {
        let lsa_body = LsaBody::Router(LsaRouter::new(flags, options, links));

        // (Re)originate Router-LSA.
        instance
            .tx
            .protocol_input
            .lsa_orig_check(lsdb_id, lsa_id.into(), lsa_body);

        // Increment the LSA-ID.
        lsa_id += 1;
    };
    const ROUTER_LINK_LENGTH: usize = 16;
    const ROUTER_BASE_LENGTH: usize = 4;
    if links.is_empty() {
        originate_fn(links);
    } else {
        for links in links
            .into_iter()
            .chunks(
                (Lsa::MAX_LENGTH
                    - LsaHdr::LENGTH as usize
                    - ROUTER_BASE_LENGTH)
                    / ROUTER_LINK_LENGTH,
            )
            .into_iter()
        {
            originate_fn(links.collect());
        }
    }

    // Flush self-originated Router-LSAs that are no longer needed.
    for (_, lse) in area
        .state
        .lsdb
        .iter_by_type_advrtr(
            &arenas.lsa_entries,
            LsaType::ROUTER,
            instance.state.router_id,
        )
        .filter(|(_, lse)| lse.data.hdr.lsa_id >= Ipv4Addr::from(lsa_id))
    {
        lsa_flush(instance, lsdb_id, lse.id);
    }
}

fn lsa_orig_network(
    iface: &Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
    arenas: &InstanceArenas,
) {
    let lsdb_id = LsdbId::Area(area.id);

    // Network-LSA's options.
    let options = area.options(instance, OptionsLocation::Lsa);

    // An IPv6 network-LSA's Link State ID is set to the Interface ID of the
    // Designated Router on the link.
    let lsa_id = Ipv4Addr::from(iface.system.ifindex.unwrap_or(0));

    // Network-LSA's attached routers.
    let myself = instance.state.router_id;
    let nbrs = iface
        .state
        .neighbors
        .iter(&arenas.neighbors)
        .filter(|nbr| nbr.state == nsm::State::Full)
        .map(|nbr| nbr.router_id);
    let attached_rtrs = std::iter::once(myself).chain(nbrs).collect();

    // (Re)originate Network-LSA.
    let lsa_body = LsaBody::Network(LsaNetwork::new(options, attached_rtrs));
    instance
        .tx
        .protocol_input
        .lsa_orig_check(lsdb_id, lsa_id, lsa_body);
}

fn lsa_flush_network(
    iface: &Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
    arenas: &InstanceArenas,
) {
    let lsdb_id = LsdbId::Area(area.id);

    let adv_rtr = instance.state.router_id;
    let lsa_id = Ipv4Addr::from(iface.system.ifindex.unwrap_or(0));
    let lsa_key = LsaKey::new(LsaType::NETWORK, adv_rtr, lsa_id);
    if let Some((_, lse)) = area.state.lsdb.get(&arenas.lsa_entries, &lsa_key)
    {
        lsa_flush(instance, lsdb_id, lse.id);
    }
}

fn lsa_orig_link(
    iface: &Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
) {
    let lsdb_id = LsdbId::Link(area.id, iface.id);

    // Link-LSA's options.
    let options = area.options(instance, OptionsLocation::Lsa);

    // The Link State ID is set to the router's Interface ID on the link.
    let lsa_id = Ipv4Addr::from(iface.system.ifindex.unwrap_or(0));

    // Link-LSA's prefixes: all global prefixes assigned to the interface.
    let prefixes = iface
        .system
        .addr_list
        .iter()
        .filter(|addr| !addr.ip().is_unicast_link_local())
        .map(|addr| LsaLinkPrefix::new(PrefixOptions::empty(), *addr))
        .collect();

    let Some(linklocal) = iface.system.linklocal_addr else {
        return;
    };

    // (Re)originate Link-LSA.
    let lsa_body = LsaBody::Link(LsaLink::new(
        iface.config.priority,
        options,
        linklocal.ip(),
        prefixes,
    ));
    instance
        .tx
        .protocol_input
        .lsa_orig_check(lsdb_id, lsa_id, lsa_body);
}

fn lsa_flush_link(
    iface: &Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
    arenas: &InstanceArenas,
) {
    let lsdb_id = LsdbId::Link(area.id, iface.id);

    let adv_rtr = instance.state.router_id;
    let lsa_id = Ipv4Addr::from(iface.system.ifindex.unwrap_or(0));
    let lsa_key = LsaKey::new(LsaType::LINK, adv_rtr, lsa_id);
    if let Some((_, lse)) = iface.state.lsdb.get(&arenas.lsa_entries, &lsa_key)
    {
        lsa_flush(instance, lsdb_id, lse.id);
    }
}

pub(crate) fn lsa_orig_intra_area_prefix(
    area: &Area,
    instance: &InstanceUpView<'_>,
    arenas: &InstanceArenas,
) {
    let lsdb_id = LsdbId::Area(area.id);
    let adv_rtr = instance.state.router_id;
    let mut adv_list = vec![];

    // Router's attached stub links.
    let mut prefixes = vec![];
    for (iface, prefix) in area
        .interfaces
        .iter(&arenas.interfaces)
        // Skip interfaces in the "Down" state.
        .filter(|iface| !iface.is_down())
        // Skip interfaces reported as transit networks in the Router-LSA.
        .filter(|iface| {
            !((iface.state.ism_state == ism::State::Dr
                && iface
                    .state
                    .neighbors
                    .iter(&arenas.neighbors)
                    .any(|nbr| nbr.state == nsm::State::Full))
                || iface
                    .state
                    .dr
                    .and_then(|net_id| {
                        iface
                            .state
                            .neighbors
                            .iter(&arenas.neighbors)
                            .find(|nbr| nbr.network_id() == net_id)
                            .filter(|nbr| nbr.state == nsm::State::Full)
                    })
                    .is_some())
        })
        // Get all global interface addresses.
        .flat_map(|iface| {
            iface
                .system
                .addr_list
                .iter()
                .map(move |addr| (iface, *addr))
        })
        .filter(|(_, addr)| !addr.ip().is_unicast_link_local())
    {
        let entry = if iface.state.ism_state == ism::State::Loopback
            || iface.config.if_type == InterfaceType::PointToMultipoint
        {
            // Host addresses are advertised with the LA-bit set, a prefix
            // length of 128 and a metric of 0.
            let prefix =
                ipnetwork::Ipv6Network::new(prefix.ip(), 128).unwrap();
            LsaIntraAreaPrefixEntry::new(PrefixOptions::LA, prefix, 0)
        } else {
            LsaIntraAreaPrefixEntry::new(
                PrefixOptions::empty(),
                prefix,
                iface.cost(instance),
            )
        };
        prefixes.push(entry);
    }
    let ref_lsa = LsaKey::new(LsaType::ROUTER, adv_rtr, Ipv4Addr::from(0));
    adv_list.push((ref_lsa, prefixes));

    // Designated Router's attached links.
    for iface in area
        .interfaces
        .iter(&arenas.interfaces)
        // Skip non-DR interfaces.
        .filter(|iface| iface.state.ism_state == ism::State::Dr)
    {
        let mut prefixes = std::collections::HashMap::new();
        for prefix in iface
            .state
            .lsdb
            // Get all interface Link-LSAs.
            .iter_by_type(&arenas.lsa_entries, LsaType::LINK)
            .map(|(_, lse)| &lse.data)
            // Check if the Link-LSA's Advertising Router is fully adjacent
            // to the DR and the Link State ID matches the neighbor's
            // interface ID.
            .filter(|lsa| {
                iface
                    .state
                    .neighbors
                    .get_by_router_id(&arenas.neighbors, lsa.hdr.adv_rtr)
                    .filter(|(_, nbr)| nbr.state == nsm::State::Full)
                    .filter(|(_, nbr)| {
                        lsa.hdr.lsa_id
                            == Ipv4Addr::from(nbr.iface_id.unwrap_or(0))
                    })
                    .is_some()
            })
            // Get all Link-LSA prefixes.
            .flat_map(|lsa| {
                let link_lsa = lsa.body.as_link().unwrap();
                link_lsa.prefixes.iter().cloned()
            })
            // Filter out prefixes with the NU/LA options.
            .filter(|prefix| {
                !prefix
                    .options
                    .intersects(PrefixOptions::NU | PrefixOptions::LA)
            })
            .filter(|prefix| !prefix.value.ip().is_unicast_link_local())
        {
            match prefixes.entry(prefix.value) {
                hash_map::Entry::Occupied(mut o) => {
                    // PrefixOptions fields should be logically OR'ed
                    // together.
                    *o.get_mut() |= prefix.options;
                }
                hash_map::Entry::Vacant(v) => {
                    v.insert(prefix.options);
                }
            }
        }

        let ref_lsa = LsaKey::new(
            LsaType::NETWORK,
            adv_rtr,
            Ipv4Addr::from(iface.system.ifindex.unwrap_or(0)),
        );
        let prefixes = prefixes
            .into_iter()
            // The Metric field for all prefixes is set to 0.
            .map(|(prefix, prefix_options)| {
                LsaIntraAreaPrefixEntry::new(prefix_options, prefix, 0)
            })
            .collect();
        adv_list.push((ref_lsa, prefixes));
    }

    // Originate as many Intra-Area-Prefix-LSAs as necessary.
    let mut lsa_id: u32 = 0;
    let mut originate_fn = |ref_lsa: LsaKey, prefixes| {
        let lsa_body = LsaBody::IntraAreaPrefix(LsaIntraAreaPrefix::new(
            ref_lsa.lsa_type,
            ref_lsa.lsa_id,
            ref_lsa.adv_rtr,
            prefixes,
        ));

        // (Re)originate Intra-Area-Prefix-LSA.
        instance
            .tx
            .protocol_input
            .lsa_orig_check(lsdb_id, lsa_id.into(), lsa_body);

        // Increment the LSA-ID.
        lsa_id += 1;
    };
    // A /128 prefix entry takes at most 20 bytes on the wire.
    const PREFIX_ENTRY_MAX_LENGTH: usize = 20;
    const INTRA_PREFIX_BASE_LENGTH: usize = 12;
    for (ref_lsa, prefixes) in adv_list {
        if prefixes.is_empty() {
            originate_fn(ref_lsa, prefixes);
        } else {
            for prefixes in prefixes
                .into_iter()
                .chunks(
                    (Lsa::MAX_LENGTH
                        - LsaHdr::LENGTH as usize
                        - INTRA_PREFIX_BASE_LENGTH)
                        / PREFIX_ENTRY_MAX_LENGTH,
                )
                .into_iter()
            {
                originate_fn(ref_lsa, prefixes.collect());
            }
        }
    }

    // Flush self-originated Intra-Area-Prefix-LSAs that are no longer
    // needed.
    for (_, lse) in area
        .state
        .lsdb
        .iter_by_type_advrtr(
            &arenas.lsa_entries,
            LsaType::INTRA_AREA_PREFIX,
            adv_rtr,
        )
        .filter(|(_, lse)| lse.data.hdr.lsa_id >= Ipv4Addr::from(lsa_id))
    {
        lsa_flush(instance, lsdb_id, lse.id);
    }
}

fn process_self_originated_lsa(
    instance: &InstanceUpView<'_>,
    arenas: &InstanceArenas,
    lsdb_id: LsdbId,
    lse_id: LsaEntryId,
) -> Result<(), Error> {
    let mut flush = false;

    // Lookup LSDB and LSA entry.
    let (lsdb_idx, lsdb) = lsdb_get(
        &instance.state.lsdb,
        &arenas.areas,
        &arenas.interfaces,
        &lsdb_id.into(),
    )?;
    let (_, lse) = lsdb.get_by_id(&arenas.lsa_entries, lse_id)?;
    let lsa = &lse.data;

    // Check LSA type.
    match lsa.hdr.lsa_type.function_code() {
        Some(LsaFunctionCode::Router) => {
            let area_idx = lsdb_idx.into_area().unwrap();
            let area = &arenas.areas[area_idx];

            // Reoriginate Router-LSA.
            lsa_orig_router(area, instance, arenas);
        }
        Some(LsaFunctionCode::Network) => {
            let area_idx = lsdb_idx.into_area().unwrap();
            let area = &arenas.areas[area_idx];

            // Check if the router is still the DR for the network.
            if let Some(iface) = area
                .interfaces
                .iter(&arenas.interfaces)
                .find(|iface| {
                    iface.system.ifindex == Some(u32::from(lsa.hdr.lsa_id))
                })
                .filter(|iface| iface.state.ism_state == ism::State::Dr)
            {
                // Reoriginate Network-LSA.
                lsa_orig_network(iface, area, instance, arenas);
            } else {
                // Flush Network-LSA.
                flush = true;
            }
        }
        Some(
            LsaFunctionCode::InterAreaPrefix | LsaFunctionCode::InterAreaRouter,
        ) => {
            // Do nothing. These LSAs will be either reoriginated or flushed
            // once SPF runs and the routing table is computed.
        }
        Some(LsaFunctionCode::AsExternal | LsaFunctionCode::Type7) => {
            // Reoriginate or flush once the redistributed route table is
            // reexamined.
            instance
                .tx
                .protocol_input
                .lsa_orig_event(LsaOriginateEvent::ExternalRoutesChange);
        }
        Some(LsaFunctionCode::Link) => {
            let (area_idx, iface_idx) = lsdb_idx.into_link().unwrap();
            let area = &arenas.areas[area_idx];
            let iface = &arenas.interfaces[iface_idx];

            if iface.state.ism_state >= ism::State::Waiting {
                // Reoriginate Link-LSA.
                lsa_orig_link(iface, area, instance);
            } else {
                // Flush Link-LSA.
                flush = true;
            }
        }
        Some(LsaFunctionCode::IntraAreaPrefix) => {
            let area_idx = lsdb_idx.into_area().unwrap();
            let area = &arenas.areas[area_idx];

            // Reoriginate Intra-area-prefix-LSA(s).
            lsa_orig_intra_area_prefix(area, instance, arenas);
        }
        _ => {
            // Flush unknown LSA.
            flush = true;
        }
    }

    if flush {
        // Effectively flush the received self-originated LSA.
        lsa_flush(instance, lsdb_id, lse_id);
    }

    Ok(())
}

pub(crate) fn lsa_flush(
    instance: &InstanceUpView<'_>,
    lsdb_id: LsdbId,
    lse_id: LsaEntryId,
) {
    instance.tx.protocol_input.lsa_flush(
        lsdb_id,
        lse_id,
        LsaFlushReason::PrematureAging,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hdr(age: u16, seq_no: u32, cksum: u16) -> LsaHdr {
        LsaHdr {
            age,
            lsa_type: LsaType::ROUTER,
            lsa_id: Ipv4Addr::UNSPECIFIED,
            adv_rtr: Ipv4Addr::new(1, 1, 1, 1),
            seq_no,
            cksum,
            length: LsaHdr::LENGTH,
        }
    }

    #[test]
    fn compare_by_seqno() {
        let a = hdr(10, 0x80000002, 0x1111);
        let b = hdr(10, 0x80000001, 0xffff);
        assert_eq!(lsa_compare(&a, &b), Ordering::Greater);
        assert_eq!(lsa_compare(&b, &a), Ordering::Less);
    }

    #[test]
    fn compare_signed_seqno_wrap() {
        // MaxSequenceNumber is greater than InitialSequenceNumber under
        // signed comparison.
        let a = hdr(10, LSA_MAX_SEQ_NO, 0x1111);
        let b = hdr(10, LSA_INIT_SEQ_NO, 0x1111);
        assert_eq!(lsa_compare(&a, &b), Ordering::Greater);
    }

    #[test]
    fn compare_by_cksum() {
        let a = hdr(10, 0x80000001, 0x2222);
        let b = hdr(10, 0x80000001, 0x1111);
        assert_eq!(lsa_compare(&a, &b), Ordering::Greater);
    }

    #[test]
    fn compare_maxage_wins() {
        let a = hdr(LSA_MAX_AGE, 0x80000001, 0x1111);
        let b = hdr(10, 0x80000001, 0x1111);
        assert_eq!(lsa_compare(&a, &b), Ordering::Greater);
        assert_eq!(lsa_compare(&b, &a), Ordering::Less);
    }

    #[test]
    fn compare_age_difference() {
        // Within MaxAgeDiff the instances are considered identical.
        let a = hdr(10, 0x80000001, 0x1111);
        let b = hdr(800, 0x80000001, 0x1111);
        assert_eq!(lsa_compare(&a, &b), Ordering::Equal);

        // Beyond MaxAgeDiff the younger instance wins.
        let b = hdr(1000, 0x80000001, 0x1111);
        assert_eq!(lsa_compare(&a, &b), Ordering::Greater);
    }

    #[test]
    fn stub_area_lsa_types() {
        assert!(lsa_type_is_valid(
            Some(AreaType::Normal),
            LsaType::AS_EXTERNAL
        ));
        assert!(!lsa_type_is_valid(
            Some(AreaType::Stub),
            LsaType::AS_EXTERNAL
        ));
        assert!(!lsa_type_is_valid(
            Some(AreaType::Nssa),
            LsaType::AS_EXTERNAL
        ));
        assert!(lsa_type_is_valid(Some(AreaType::Nssa), LsaType::TYPE7));
        assert!(!lsa_type_is_valid(
            Some(AreaType::Stub),
            LsaType::INTER_AREA_ROUTER
        ));
        assert!(lsa_type_is_valid(Some(AreaType::Stub), LsaType::ROUTER));
        // Reserved scope.
        assert!(!lsa_type_is_valid(None, LsaType(0x6001)));
    }
}
