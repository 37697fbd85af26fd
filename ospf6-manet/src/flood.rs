//
// Copyright (c) The ospf6-manet Contributors
//
// SPDX-License-Identifier: MIT
//

use std::cmp::Ordering;
use std::collections::btree_map;
use std::net::Ipv4Addr;
use std::sync::Arc;

use bitflags::bitflags;

use crate::area::Area;
use crate::collections::{
    Areas, Arena, InterfaceIndex, LsdbIndex, NeighborIndex,
};
use crate::instance::InstanceUpView;
use crate::interface::{FloodingMode, Interface, InterfaceType, MdrLevel, ism};
use crate::lsdb::{self, lsa_type_is_valid};
use crate::neighbor::{Neighbor, nsm};
use crate::packet::lsa::{Lsa, LsaHdr};
use crate::{output, pushback};

bitflags! {
    // Per-reception LSA state driving the acknowledgement policy.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct LsaRxFlags: u8 {
        // The LSA was reflooded out its receiving interface.
        const FLOODBACK = 0x01;
        // The LSA is a duplicate of the database copy.
        const DUPLICATE = 0x02;
        // The duplicate was treated as an implied acknowledgement.
        const IMPLIEDACK = 0x04;
        // The LSA arrived as a multicast.
        const RECVMCAST = 0x08;
    }
}

// Origin of a flooded LSA.
#[derive(Clone, Copy, Debug)]
pub struct FloodSource {
    pub iface_idx: InterfaceIndex,
    pub nbr_idx: NeighborIndex,
    // Whether the LSA was received as a multicast.
    pub mcast: bool,
}

// ===== global functions =====

pub(crate) fn flood(
    instance: &InstanceUpView<'_>,
    areas: &Areas,
    interfaces: &mut Arena<Interface>,
    neighbors: &mut Arena<Neighbor>,
    lsdb_idx: LsdbIndex,
    lsa: &Arc<Lsa>,
    src: Option<FloodSource>,
) -> bool {
    // Iterate over eligible interfaces.
    //
    // The LSDB index already takes the U-bit of the LSA into
    // consideration, so there's no need to check it here.
    match lsdb_idx {
        LsdbIndex::Link(area_idx, iface_idx) => {
            let area = &areas[area_idx];
            flood_interface(
                iface_idx, area, instance, interfaces, neighbors, lsa, src,
            )
        }
        LsdbIndex::Area(area_idx) => {
            let area = &areas[area_idx];
            flood_area(area, instance, interfaces, neighbors, lsa, src)
        }
        LsdbIndex::As => {
            flood_as(instance, areas, interfaces, neighbors, lsa, src)
        }
    }
}

// Flooding procedure for one interface. Dispatches on the configured
// relay-reduction algorithm.
fn flood_interface(
    iface_idx: InterfaceIndex,
    area: &Area,
    instance: &InstanceUpView<'_>,
    interfaces: &mut Arena<Interface>,
    neighbors: &mut Arena<Neighbor>,
    lsa: &Arc<Lsa>,
    src: Option<FloodSource>,
) -> bool {
    let iface = &mut interfaces[iface_idx];

    match (iface.config.if_type, iface.config.flooding) {
        (InterfaceType::Manet, FloodingMode::MprSdcds) => {
            flood_interface_mpr(
                iface_idx, iface, area, instance, neighbors, lsa, src,
            )
        }
        (InterfaceType::Manet, FloodingMode::MdrSicds) => {
            flood_interface_mdr(
                iface_idx, iface, area, instance, neighbors, lsa, src,
            )
        }
        _ => flood_interface_classic(
            iface_idx, iface, area, instance, neighbors, lsa, src,
        ),
    }
}

// RFC 2328 section 13.3, RFC 5340 section 4.5.2.
fn flood_interface_classic(
    iface_idx: InterfaceIndex,
    iface: &mut Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
    neighbors: &mut Arena<Neighbor>,
    lsa: &Arc<Lsa>,
    src: Option<FloodSource>,
) -> bool {
    let lsa_key = lsa.hdr.key();

    // Keep track that this LSA was flooded back out the receiving
    // interface. This information is relevant when deciding whether or not
    // to send a delayed ack later.
    let mut flooded_back = false;

    // (1) Each of the neighbors attached to this interface are examined.
    let mut rxmt_added = false;
    for nbr_idx in iface.state.neighbors.indexes().collect::<Vec<_>>() {
        let nbr = &mut neighbors[nbr_idx];

        // (1.a) Skip neighbors in a lesser state than Exchange.
        if nbr.state < nsm::State::Exchange {
            continue;
        }

        // (1.b) Handle adjacencies that are not full.
        if nbr.state != nsm::State::Full
            && request_list_check(nbr, iface, area, instance, lsa)
                == RequestListCheck::SkipNeighbor
        {
            continue;
        }

        // (1.c) If the new LSA was received from this neighbor, examine the
        // next neighbor.
        if let Some(src) = src
            && src.nbr_idx == nbr_idx
        {
            continue;
        }

        // (1.d) Add LSA to the neighbor's rxmt list (or update the old
        // version).
        nbr.lists.ls_rxmt.insert(lsa_key, lsa.clone());
        nbr.rxmt_lsupd_start_check(iface, area, instance);
        rxmt_added = true;
    }

    // (2) If in the previous step the LSA was NOT added to any of the Link
    // state retransmission lists, there is no need to flood the LSA out the
    // interface.
    if !rxmt_added {
        return flooded_back;
    }

    if let Some(src) = src
        && src.iface_idx == iface_idx
    {
        let nbr_src = &neighbors[src.nbr_idx];
        let nbr_src_net_id = nbr_src.network_id();

        // (3) If the new LSA was received on this interface, and it was
        // received from either the DR or the BDR, chances are that all the
        // neighbors have received the LSA already.
        if iface.state.dr == Some(nbr_src_net_id)
            || iface.state.bdr == Some(nbr_src_net_id)
        {
            return flooded_back;
        }

        // (4) If the new LSA was received on this interface, and the
        // interface state is BDR, examine the next interface.
        if iface.state.ism_state == ism::State::Backup {
            return flooded_back;
        }

        flooded_back = true;
    }

    // (5) Flood the LSA out the interface. Schedule the transmission as an
    // attempt to group more LSAs into the same message.
    iface.enqueue_ls_update(area, instance, lsa_key, lsa.clone());

    flooded_back
}

// MPR-SDCDS flooding: only active overlapping relays of the sender
// reflood; everyone else pushes the LSA back and waits for coverage.
fn flood_interface_mpr(
    iface_idx: InterfaceIndex,
    iface: &mut Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
    neighbors: &mut Arena<Neighbor>,
    lsa: &Arc<Lsa>,
    src: Option<FloodSource>,
) -> bool {
    let lsa_key = lsa.hdr.key();
    let mut flooded_back = false;

    // Determine whether the sender selected the local router as an active
    // overlapping relay.
    let mut flood_lsa = true;
    if let Some(src) = src {
        let nbr_src = &neighbors[src.nbr_idx];
        if !iface.relay_selector_lookup(nbr_src.router_id) {
            flood_lsa = false;
        }
    }

    let mut rxmt_added = false;
    let mut pushback_nbrs = vec![];
    for nbr_idx in iface.state.neighbors.indexes().collect::<Vec<_>>() {
        let nbr = &mut neighbors[nbr_idx];

        // A fresher LSA invalidates older cached acknowledgements.
        if src.is_some() {
            nbr.ack_cache_update(&lsa.hdr);
        }

        // (a) Skip neighbors in a lesser state than Exchange.
        if nbr.state < nsm::State::Exchange {
            continue;
        }

        // (b) Handle adjacencies that are not full.
        if nbr.state != nsm::State::Full
            && request_list_check(nbr, iface, area, instance, lsa)
                == RequestListCheck::SkipNeighbor
        {
            continue;
        }

        // (c) If the new LSA was received from this neighbor, examine the
        // next neighbor.
        if let Some(src) = src
            && src.nbr_idx == nbr_idx
        {
            continue;
        }

        // The neighbor already acknowledged this instance with a multicast
        // ack: no retransmission is needed.
        if nbr.ack_cache_lookup(&lsa.hdr) {
            continue;
        }

        // When the router is not a relay for the sender, record this
        // neighbor on the pushback wait list instead of scheduling a
        // retransmission.
        if !flood_lsa {
            pushback_nbrs.push(nbr.router_id);
            continue;
        }

        // (d) Add LSA to the neighbor's rxmt list, schedule retransmission.
        nbr.lists.ls_rxmt.insert(lsa_key, lsa.clone());
        nbr.rxmt_lsupd_start_check(iface, area, instance);
        rxmt_added = true;
    }

    // Register the pushed-back LSA with its backup-wait list.
    if !flood_lsa {
        if !pushback_nbrs.is_empty() {
            pushback::add(iface, area, instance, lsa, pushback_nbrs);
        }
        return flooded_back;
    }

    // Examine the next interface if not added to any retransmission list.
    if !rxmt_added {
        return flooded_back;
    }

    if let Some(src) = src
        && src.iface_idx == iface_idx
    {
        let nbr_src = &neighbors[src.nbr_idx];
        let nbr_src_net_id = nbr_src.network_id();

        // Skip reflooding when the LSA came from the DR or BDR, or when
        // acting as BDR.
        if iface.state.dr == Some(nbr_src_net_id)
            || iface.state.bdr == Some(nbr_src_net_id)
        {
            return flooded_back;
        }
        if iface.state.ism_state == ism::State::Backup {
            return flooded_back;
        }

        flooded_back = true;
    }

    // Flood the LSA out the interface.
    iface.enqueue_ls_update(area, instance, lsa_key, lsa.clone());

    flooded_back
}

// MDR-SICDS flooding: MDRs reflood when at least one neighbor is not
// covered by the sender, BMDRs push back, Others never reflood.
fn flood_interface_mdr(
    iface_idx: InterfaceIndex,
    iface: &mut Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
    neighbors: &mut Arena<Neighbor>,
    lsa: &Arc<Lsa>,
    src: Option<FloodSource>,
) -> bool {
    let lsa_key = lsa.hdr.key();
    let mut flooded_back = false;

    let src_info = src.map(|src| {
        let nbr_src = &neighbors[src.nbr_idx];
        (
            nbr_src.router_id,
            nbr_src.manet.report_twohop,
            nbr_src.manet.rnl.clone(),
            src.mcast,
        )
    });

    let mut flood_neighbors = vec![];
    for nbr_idx in iface.state.neighbors.indexes().collect::<Vec<_>>() {
        let nbr = &mut neighbors[nbr_idx];

        if src.is_some() {
            nbr.ack_cache_update(&lsa.hdr);
        }

        // (a) All bidirectional neighbors must be covered, not only the
        // adjacent ones.
        if nbr.state < nsm::State::TwoWay {
            continue;
        }

        // (b) Handle adjacencies that are not full.
        if nbr.state >= nsm::State::Exchange
            && nbr.state != nsm::State::Full
            && request_list_check(nbr, iface, area, instance, lsa)
                == RequestListCheck::SkipNeighbor
        {
            continue;
        }

        // (c) If the new LSA was received from this neighbor, examine the
        // next neighbor.
        if let Some(src) = src
            && src.nbr_idx == nbr_idx
        {
            continue;
        }

        // The neighbor already acknowledged this instance with a multicast
        // ack.
        if nbr.ack_cache_lookup(&lsa.hdr) {
            continue;
        }

        // Check for coverage of this neighbor on the sender's reported
        // neighbor list. If the LSA was received as a unicast, the
        // sender's transmission cannot have covered anyone.
        if let Some((_, report_twohop, rnl, mcast)) = &src_info
            && (!report_twohop || !mcast || !rnl.contains(&nbr.router_id))
        {
            flood_neighbors.push(nbr.router_id);
        }

        // Retransmit only to adjacent neighbors.
        if nbr.state < nsm::State::Exchange {
            continue;
        }

        // (d) Add LSA to the neighbor's rxmt list, schedule retransmission.
        nbr.lists.ls_rxmt.insert(lsa_key, lsa.clone());
        nbr.rxmt_lsupd_start_check(iface, area, instance);
    }

    // Forwarding procedure: the decision to reflood depends on the local
    // MDR level.
    let mut flood_lsa = true;
    if src.is_some() {
        match iface.state.manet.mdr.level {
            MdrLevel::Mdr => {
                if flood_neighbors.is_empty() {
                    flood_lsa = false;
                }
            }
            MdrLevel::Bmdr => {
                // Push back: reflood only if coverage doesn't materialize
                // before the backup-wait timer fires.
                if !flood_neighbors.is_empty() {
                    pushback::add(iface, area, instance, lsa, flood_neighbors);
                }
                flood_lsa = false;
            }
            MdrLevel::Other => {
                // Other routers do not flood.
                flood_lsa = false;
            }
        }
    }

    if !flood_lsa {
        return flooded_back;
    }

    if let Some(src) = src
        && src.iface_idx == iface_idx
    {
        flooded_back = true;
    }

    // Flood the LSA out the interface.
    iface.enqueue_ls_update(area, instance, lsa_key, lsa.clone());

    flooded_back
}

fn flood_area(
    area: &Area,
    instance: &InstanceUpView<'_>,
    interfaces: &mut Arena<Interface>,
    neighbors: &mut Arena<Neighbor>,
    lsa: &Arc<Lsa>,
    src: Option<FloodSource>,
) -> bool {
    let mut flooded_back = false;
    for iface_idx in area.interfaces.indexes().collect::<Vec<_>>() {
        flooded_back |= flood_interface(
            iface_idx, area, instance, interfaces, neighbors, lsa, src,
        );
    }

    flooded_back
}

fn flood_as(
    instance: &InstanceUpView<'_>,
    areas: &Areas,
    interfaces: &mut Arena<Interface>,
    neighbors: &mut Arena<Neighbor>,
    lsa: &Arc<Lsa>,
    src: Option<FloodSource>,
) -> bool {
    let mut flooded_back = false;
    for area in areas
        .iter()
        // Check if the LSA type is valid for this area.
        .filter(|area| {
            lsa_type_is_valid(Some(area.config.area_type), lsa.hdr.lsa_type)
        })
    {
        flooded_back |=
            flood_area(area, instance, interfaces, neighbors, lsa, src);
    }

    flooded_back
}

#[derive(Debug, Eq, PartialEq)]
enum RequestListCheck {
    SkipNeighbor,
    FallThrough,
}

// Reconciles a flooded LSA against the Link state request list of a
// not-yet-full adjacency.
fn request_list_check(
    nbr: &mut Neighbor,
    iface: &Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
    lsa: &Arc<Lsa>,
) -> RequestListCheck {
    use btree_map::Entry::Occupied;

    let lsa_key = lsa.hdr.key();
    match (
        nbr.lists.ls_request.entry(lsa_key),
        nbr.lists.ls_request_pending.entry(lsa_key),
    ) {
        (Occupied(o), _) | (_, Occupied(o)) => {
            let req = o.get();
            let cmp = lsdb::lsa_compare(&lsa.hdr, req);
            match cmp {
                // The requested instance is newer: suppress flooding to
                // this neighbor.
                Ordering::Less => RequestListCheck::SkipNeighbor,
                Ordering::Equal | Ordering::Greater => {
                    // Delete the LSA from the Link state request list.
                    o.remove();

                    // Check if the neighbor can transition to Full.
                    nbr.loading_done_check(iface, area, instance);

                    // Examine the next neighbor if the two copies are the
                    // same instance.
                    if cmp == Ordering::Equal {
                        RequestListCheck::SkipNeighbor
                    } else {
                        RequestListCheck::FallThrough
                    }
                }
            }
        }
        _ => RequestListCheck::FallThrough,
    }
}

// ===== acknowledgement policy =====

// Decides whether and how to acknowledge a received LSA (RFC 2328 table
// 19, as modified by the MANET extensions).
//
// `more_recent` indicates the received LSA was more recent than the
// database copy.
pub(crate) fn acknowledge_lsa(
    nbr: &Neighbor,
    iface: &mut Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
    lsa_hdr: &LsaHdr,
    more_recent: bool,
    flags: LsaRxFlags,
) {
    if iface.state.ism_state == ism::State::Backup {
        acknowledge_lsa_bdrouter(
            nbr,
            iface,
            area,
            instance,
            lsa_hdr,
            more_recent,
            flags,
        );
    } else {
        acknowledge_lsa_allother(
            nbr,
            iface,
            area,
            instance,
            lsa_hdr,
            more_recent,
            flags,
        );
    }
}

fn acknowledge_lsa_bdrouter(
    nbr: &Neighbor,
    iface: &mut Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
    lsa_hdr: &LsaHdr,
    more_recent: bool,
    flags: LsaRxFlags,
) {
    // LSA has been flooded back out the receiving interface. No
    // acknowledgement sent.
    if flags.contains(LsaRxFlags::FLOODBACK) {
        return;
    }

    // LSA is more recent than the database copy, but was not flooded back
    // out the receiving interface. Delayed acknowledgement sent if the
    // advertisement was received from the Designated Router, otherwise do
    // nothing.
    if more_recent {
        if iface.state.dr == Some(nbr.network_id()) {
            iface.enqueue_delayed_ack(area, instance, lsa_hdr);
        }
        return;
    }

    // LSA is a duplicate, and was treated as an implied acknowledgement.
    // Delayed acknowledgement sent if the advertisement was received from
    // the Designated Router, otherwise do nothing.
    if flags.contains(LsaRxFlags::DUPLICATE | LsaRxFlags::IMPLIEDACK) {
        if iface.state.dr == Some(nbr.network_id()) {
            iface.enqueue_delayed_ack(area, instance, lsa_hdr);
        }
        return;
    }

    // LSA is a duplicate, and was not treated as an implied
    // acknowledgement. Direct acknowledgement sent; on MANET interfaces
    // the ack goes multicast through the coalescing list instead.
    if flags.contains(LsaRxFlags::DUPLICATE) {
        if iface.is_manet() {
            iface.enqueue_delayed_ack(area, instance, lsa_hdr);
        } else {
            output::send_lsack_direct(nbr, iface, area, instance, lsa_hdr);
        }
    }
}

fn acknowledge_lsa_allother(
    nbr: &Neighbor,
    iface: &mut Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
    lsa_hdr: &LsaHdr,
    more_recent: bool,
    flags: LsaRxFlags,
) {
    // LSA has been flooded back out the receiving interface. No
    // acknowledgement sent.
    if flags.contains(LsaRxFlags::FLOODBACK) {
        return;
    }

    // LSA is more recent than the database copy, but was not flooded back
    // out the receiving interface. Delayed acknowledgement sent.
    if more_recent {
        iface.enqueue_delayed_ack(area, instance, lsa_hdr);
        return;
    }

    // LSA is a duplicate, and was treated as an implied acknowledgement.
    // No acknowledgement sent.
    if flags.contains(LsaRxFlags::DUPLICATE | LsaRxFlags::IMPLIEDACK) {
        return;
    }

    // LSA is a duplicate, and was not treated as an implied
    // acknowledgement.
    if flags.contains(LsaRxFlags::DUPLICATE) {
        // On a MANET interface, a duplicate received as multicast is left
        // for the upcoming multicast acknowledgement of the first arrival.
        if iface.is_manet() && flags.contains(LsaRxFlags::RECVMCAST) {
            return;
        }

        if iface.is_manet() {
            iface.enqueue_delayed_ack(area, instance, lsa_hdr);

            // MDR-SICDS sends the multicast ack immediately when the local
            // router is MDR or BMDR, or when full adjacencies are in use.
            if iface.config.flooding == FloodingMode::MdrSicds
                && (iface.config.adj_connectivity
                    == crate::interface::AdjConnectivity::Full
                    || iface.state.manet.mdr.level >= MdrLevel::Bmdr)
            {
                instance
                    .tx
                    .protocol_input
                    .delayed_ack_now(area.id, iface.id);
            }
        } else {
            output::send_lsack_direct(nbr, iface, area, instance, lsa_hdr);
        }
    }
}

// Registers a multicast acknowledgement from a neighbor so subsequent
// flooding decisions can skip it.
pub(crate) fn register_multicast_ack(
    nbr: &mut Neighbor,
    iface: &Interface,
    lsa_hdr: &LsaHdr,
) {
    if iface.is_manet() {
        nbr.ack_cache_register(lsa_hdr);
    }
}

// ===== helper functions =====

// Looks up whether the given router selected the local router as an active
// overlapping relay.
impl Interface {
    pub(crate) fn relay_selector_lookup(&self, router_id: Ipv4Addr) -> bool {
        if self.config.flooding != FloodingMode::MprSdcds {
            return false;
        }
        self.state
            .manet
            .relay_selectors
            .get(&router_id)
            .is_some_and(|expiry| {
                expiry.elapsed().as_secs()
                    <= self.config.dead_interval as u64
            })
    }
}
