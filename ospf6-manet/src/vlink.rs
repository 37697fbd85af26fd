//
// Copyright (c) The ospf6-manet Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::instance::{InstanceArenas, InstanceUpView};
use crate::neighbor::nsm;
use crate::packet::lsa::{LsaType, PrefixOptions};

// A virtual link carried by a transit area.
//
// The pseudo-interface never joins multicast groups; every packet towards
// the remote end-point goes unicast to the address derived from its
// Intra-Area-Prefix-LSA.
#[derive(Debug)]
pub struct VirtualLink {
    pub config: VirtualLinkCfg,
    pub state: VirtualLinkState,
}

#[derive(Debug)]
pub struct VirtualLinkCfg {
    // Router ID of the remote ABR.
    pub nbr_router_id: Ipv4Addr,
    pub cost: u16,
    pub hello_interval: u16,
    pub dead_interval: u16,
    pub retransmit_interval: u16,
    pub transmit_delay: u16,
}

#[derive(Debug, Default)]
pub struct VirtualLinkState {
    // Adjacency state towards the remote end-point.
    pub nbr_state: nsm::State,
    // Forwarding ifindex towards the remote end-point.
    pub ifindex: u32,
    // Interface ID the remote end advertises for the virtual link.
    pub nbr_iface_id: u32,
    // Local global address on the forwarding interface.
    pub src_addr: Option<Ipv6Addr>,
    // Remote end-point address, taken from the LA-flagged prefix of its
    // Intra-Area-Prefix-LSA.
    pub dst_addr: Option<Ipv6Addr>,
}

// ===== impl VirtualLink =====

impl VirtualLink {
    pub(crate) fn new(nbr_router_id: Ipv4Addr) -> VirtualLink {
        VirtualLink {
            config: VirtualLinkCfg {
                nbr_router_id,
                cost: 10,
                hello_interval: 10,
                dead_interval: 60,
                retransmit_interval: 5,
                transmit_delay: 1,
            },
            state: VirtualLinkState::default(),
        }
    }

    // Returns whether both end-point addresses could be derived.
    pub(crate) fn is_operational(&self) -> bool {
        self.state.src_addr.is_some() && self.state.dst_addr.is_some()
    }
}

// ===== global functions =====

// Rederives the end-point addresses of every virtual link after an SPF
// run: the source is the local global address on the forwarding ifindex
// towards the remote ABR, and the destination is the LA-flagged prefix the
// remote end advertises in its Intra-Area-Prefix-LSA.
pub(crate) fn update_virtual_links(
    instance: &InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
) {
    for area_idx in arenas.areas.indexes().collect::<Vec<_>>() {
        let area = &arenas.areas[area_idx];

        // Only transit-capable areas carry virtual links.
        if area.is_backbone() {
            continue;
        }

        let mut updates = vec![];
        for (pos, vlink) in area.vlinks.iter().enumerate() {
            let nbr_router_id = vlink.config.nbr_router_id;

            // The remote end-point must be a reachable ABR in the transit
            // area.
            let Some(rtr) = area.state.routers.get(&nbr_router_id) else {
                updates.push((pos, VirtualLinkState::default()));
                continue;
            };

            // Forwarding interface and local global address.
            let Some(nexthop) = rtr.nexthops.values().next() else {
                updates.push((pos, VirtualLinkState::default()));
                continue;
            };
            let iface = &arenas.interfaces[nexthop.iface_idx];
            let ifindex = iface.system.ifindex.unwrap_or(0);
            let src_addr =
                iface.system.addr_list.iter().next().map(|addr| addr.ip());

            // Remote end-point address from its Intra-Area-Prefix-LSA.
            let dst_addr = area
                .state
                .lsdb
                .iter_by_type_advrtr(
                    &arenas.lsa_entries,
                    LsaType::INTRA_AREA_PREFIX,
                    nbr_router_id,
                )
                .filter(|(_, lse)| !lse.data.hdr.is_maxage())
                .filter_map(|(_, lse)| lse.data.body.as_intra_area_prefix())
                .flat_map(|intra_prefix| intra_prefix.prefixes.iter())
                .find(|prefix| prefix.options.contains(PrefixOptions::LA))
                .map(|prefix| prefix.value.ip());

            updates.push((
                pos,
                VirtualLinkState {
                    nbr_state: area.vlinks[pos].state.nbr_state,
                    ifindex,
                    nbr_iface_id: area.vlinks[pos].state.nbr_iface_id,
                    src_addr,
                    dst_addr,
                },
            ));
        }

        let area = &mut arenas.areas[area_idx];
        for (pos, state) in updates {
            let vlink = &mut area.vlinks[pos];
            // An end-point that became unreachable tears the adjacency
            // down.
            if state.src_addr.is_none() || state.dst_addr.is_none() {
                vlink.state = VirtualLinkState {
                    nbr_state: nsm::State::Down,
                    ..state
                };
            } else {
                vlink.state = state;
            }
        }
    }
}
