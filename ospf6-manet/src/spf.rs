//
// Copyright (c) The ospf6-manet Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use derive_new::new;
use ipnetwork::Ipv6Network;

use crate::area::{Area, AreaType};
use crate::collections::Arena;
use crate::debug::Debug;
use crate::error::Error;
use crate::instance::{InstanceArenas, InstanceUpView};
use crate::interface::Interface;
use crate::lsdb::{LSA_INFINITY, LsaEntry, LsaLogId};
use crate::neighbor::{Neighbor, nsm};
use crate::packet::lsa::{
    Lsa, LsaAsExternalFlags, LsaRouterLinkType, LsaType,
};
use crate::route::{
    Nexthop, Nexthops, PathType, RouteNet, RouteNetFlags, RouteRtr,
};
use crate::tasks;
use crate::{area, nssa, vlink};

// Maximum size of the SPF log record.
const SPF_LOG_MAX_SIZE: usize = 32;
// Maximum number of trigger LSAs per entry in the SPF log record.
const SPF_LOG_TRIGGER_LSAS_MAX_SIZE: usize = 8;

// SPF vertex identifier.
//
// Network vertices are ordered before router vertices so the SPF
// algorithm finds all equal-cost paths.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum VertexId {
    Network { router_id: Ipv4Addr, iface_id: u32 },
    Router { router_id: Ipv4Addr },
}

#[derive(Debug, new)]
pub struct Vertex {
    pub id: VertexId,
    pub distance: u32,
    pub hops: u16,
    #[new(default)]
    pub nexthops: Nexthops,
}

#[derive(Debug, new)]
pub struct SpfTriggerLsa {
    pub old: Option<Arc<Lsa>>,
    pub new: Arc<Lsa>,
    pub log_id: LsaLogId,
}

#[derive(Debug, new)]
pub struct SpfLogEntry {
    pub id: u32,
    pub schedule_time: Instant,
    pub start_time: Instant,
    pub end_time: Instant,
    pub trigger_lsas: Vec<LsaLogId>,
}

// SPF Delay State Machine.
pub mod fsm {
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
    #[derive(Deserialize, Serialize)]
    pub enum State {
        #[default]
        Quiet,
        ShortWait,
        LongWait,
    }

    #[derive(Debug, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    pub enum Event {
        Igp,
        DelayTimer,
        HoldDownTimer,
        LearnTimer,
        ConfigChange,
    }
}

// ===== global functions =====

pub(crate) fn fsm(
    event: fsm::Event,
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
) -> Result<(), Error> {
    Debug::SpfDelayFsmEvent(&instance.state.spf_delay_state, &event).log();

    // Update time of last SPF triggering event.
    instance.state.spf_last_event_rcvd = Some(Instant::now());

    let new_fsm_state = match (instance.state.spf_delay_state, &event) {
        // Transition 1: IGP event while in QUIET state.
        (fsm::State::Quiet, fsm::Event::Igp) => {
            // If SPF_TIMER is not already running, start it with value
            // INITIAL_SPF_DELAY.
            if instance.state.spf_delay_timer.is_none() {
                let task = tasks::spf_delay_timer(
                    instance,
                    fsm::Event::DelayTimer,
                    instance.config.spf_initial_delay,
                );
                instance.state.spf_delay_timer = Some(task);
            }

            // Start LEARN_TIMER with TIME_TO_LEARN_INTERVAL.
            let task = tasks::spf_delay_timer(
                instance,
                fsm::Event::LearnTimer,
                instance.config.spf_time_to_learn,
            );
            instance.state.spf_learn_timer = Some(task);

            // Start HOLDDOWN_TIMER with HOLDDOWN_INTERVAL.
            let task = tasks::spf_delay_timer(
                instance,
                fsm::Event::HoldDownTimer,
                instance.config.spf_hold_down,
            );
            instance.state.spf_hold_down_timer = Some(task);

            // Transition to SHORT_WAIT state.
            Some(fsm::State::ShortWait)
        }
        // Transition 2: IGP event while in SHORT_WAIT.
        (fsm::State::ShortWait, fsm::Event::Igp) => {
            // Reset HOLDDOWN_TIMER to HOLDDOWN_INTERVAL.
            if let Some(timer) = &mut instance.state.spf_hold_down_timer {
                let timeout =
                    Duration::from_millis(instance.config.spf_hold_down.into());
                timer.reset(Some(timeout));
            }

            // If SPF_TIMER is not already running, start it with value
            // SHORT_SPF_DELAY.
            if instance.state.spf_delay_timer.is_none() {
                let task = tasks::spf_delay_timer(
                    instance,
                    fsm::Event::DelayTimer,
                    instance.config.spf_short_delay,
                );
                instance.state.spf_delay_timer = Some(task);
            }

            // Remain in current state.
            None
        }
        // Transition 3: LEARN_TIMER expiration.
        (fsm::State::ShortWait, fsm::Event::LearnTimer) => {
            instance.state.spf_learn_timer = None;

            // Transition to LONG_WAIT state.
            Some(fsm::State::LongWait)
        }
        // Transition 4: IGP event while in LONG_WAIT.
        (fsm::State::LongWait, fsm::Event::Igp) => {
            // Reset HOLDDOWN_TIMER to HOLDDOWN_INTERVAL.
            if let Some(timer) = &mut instance.state.spf_hold_down_timer {
                let timeout =
                    Duration::from_millis(instance.config.spf_hold_down.into());
                timer.reset(Some(timeout));
            }

            // If SPF_TIMER is not already running, start it with value
            // LONG_SPF_DELAY.
            if instance.state.spf_delay_timer.is_none() {
                let task = tasks::spf_delay_timer(
                    instance,
                    fsm::Event::DelayTimer,
                    instance.config.spf_long_delay,
                );
                instance.state.spf_delay_timer = Some(task);
            }

            // Remain in current state.
            None
        }
        // Transition 5: HOLDDOWN_TIMER expiration while in LONG_WAIT.
        (fsm::State::LongWait, fsm::Event::HoldDownTimer) => {
            instance.state.spf_hold_down_timer = None;

            // Transition to QUIET state.
            Some(fsm::State::Quiet)
        }
        // Transition 6: HOLDDOWN_TIMER expiration while in SHORT_WAIT.
        (fsm::State::ShortWait, fsm::Event::HoldDownTimer) => {
            instance.state.spf_hold_down_timer = None;

            // Deactivate LEARN_TIMER.
            instance.state.spf_learn_timer = None;

            // Transition to QUIET state.
            Some(fsm::State::Quiet)
        }
        // Transitions 7-9: SPF_TIMER expiration.
        (
            fsm::State::Quiet | fsm::State::ShortWait | fsm::State::LongWait,
            fsm::Event::DelayTimer,
        ) => {
            instance.state.spf_delay_timer = None;

            // Compute SPF.
            compute_spf(instance, arenas);

            // Remain in current state.
            None
        }
        // Custom FSM transition.
        (
            fsm::State::Quiet | fsm::State::ShortWait | fsm::State::LongWait,
            fsm::Event::ConfigChange,
        ) => {
            // Cancel the next scheduled SPF run, but preserve the other
            // timers.
            instance.state.spf_delay_timer = None;

            // Compute SPF.
            compute_spf(instance, arenas);

            // Remain in current state.
            None
        }
        _ => {
            return Err(Error::SpfDelayUnexpectedEvent(
                instance.state.spf_delay_state,
                event,
            ));
        }
    };

    if let Some(new_fsm_state) = new_fsm_state
        && new_fsm_state != instance.state.spf_delay_state
    {
        // Effectively transition to the new FSM state.
        Debug::SpfDelayFsmTransition(
            &instance.state.spf_delay_state,
            &new_fsm_state,
        )
        .log();
        instance.state.spf_delay_state = new_fsm_state;
    }

    Ok(())
}

// ===== helper functions =====

// This is the SPF main function.
pub(crate) fn compute_spf(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
) {
    // Get time the SPF was scheduled.
    let schedule_time = instance
        .state
        .spf_schedule_time
        .take()
        .unwrap_or_else(Instant::now);

    // Record time the SPF computation was started.
    let start_time = Instant::now();

    // Get list of new or updated LSAs that triggered the SPF computation.
    let trigger_lsas = std::mem::take(&mut instance.state.spf_trigger_lsas);

    // Calculate shortest-path trees.
    for area_idx in arenas.areas.indexes().collect::<Vec<_>>() {
        let area = &mut arenas.areas[area_idx];
        run_area(
            area,
            instance,
            &arenas.interfaces,
            &arenas.neighbors,
            &arenas.lsa_entries,
        );
    }

    // Update routing table.
    update_rib(instance, arenas);

    // Update summary LSAs.
    area::update_summary_lsas(instance, arenas);

    // Rerun the NSSA translator election with the new reachability
    // information.
    nssa::update_translator_election(instance, arenas);

    // Rederive virtual link end-point addresses.
    vlink::update_virtual_links(instance, arenas);

    // Update time of last SPF computation.
    let end_time = Instant::now();
    instance.state.spf_last_time = Some(end_time);

    // Add entry to SPF log.
    log_spf_run(instance, schedule_time, start_time, end_time, trigger_lsas);
}

// Runs SPF in the provided area.
fn run_area(
    area: &mut Area,
    instance: &mut InstanceUpView<'_>,
    interfaces: &Arena<Interface>,
    neighbors: &Arena<Neighbor>,
    lsa_entries: &Arena<LsaEntry>,
) {
    let router_id = instance.state.router_id;

    // Initialize SPT and candidate list.
    let root_vid = VertexId::Router { router_id };
    let root_v = Vertex::new(root_vid, 0, 0);
    let mut spt = BTreeMap::new();
    let mut cand_list = BTreeMap::new();
    cand_list.insert((root_v.distance, root_v.id), root_v);

    // Clear the area's router routing table.
    area.state.routers.clear();
    area.state.spf_sync_reachable.clear();

    // Main SPF loop.
    while let Some(((_, vertex_id), vertex)) = cand_list.pop_first() {
        for (link_vid, cost) in
            vertex_links(&vertex_id, area, lsa_entries)
        {
            // Skip vertices already on the SPT.
            if spt.contains_key(&link_vid) {
                continue;
            }

            // The back-link check: the target must also claim
            // connectivity to this vertex.
            if !has_back_link(&link_vid, &vertex_id, area, lsa_entries) {
                continue;
            }

            let distance = vertex.distance + cost as u32;
            let hops = vertex.hops + u16::from(cost != 0);

            // Compute nexthops for this candidate vertex.
            let nexthops = if vertex_id == root_vid {
                first_hop_nexthops(&link_vid, area, interfaces, neighbors)
            } else {
                vertex.nexthops.clone()
            };

            // Add or update candidate list entry.
            let existing = cand_list
                .keys()
                .find(|(_, cand_vid)| *cand_vid == link_vid)
                .copied();
            match existing {
                Some((cand_distance, _)) if distance < cand_distance => {
                    // Replace the candidate with the cheaper path.
                    cand_list.remove(&(cand_distance, link_vid));
                    let mut v = Vertex::new(link_vid, distance, hops);
                    v.nexthops = nexthops;
                    cand_list.insert((distance, link_vid), v);
                }
                Some((cand_distance, _)) if distance == cand_distance => {
                    // Merge equal-cost paths.
                    let cand_v =
                        cand_list.get_mut(&(cand_distance, link_vid)).unwrap();
                    cand_v.nexthops.extend(nexthops);
                }
                Some(_) => (),
                None => {
                    let mut v = Vertex::new(link_vid, distance, hops);
                    v.nexthops = nexthops;
                    cand_list.insert((distance, link_vid), v);
                }
            }
        }

        // Update the area's router table and the synchronization
        // reachability set.
        if let VertexId::Router { router_id: vertex_rid } = vertex_id {
            area.state.spf_sync_reachable.insert(vertex_rid);

            if vertex_rid != router_id
                && let Some(router_lsa) = lookup_router_lsa(
                    area, vertex_rid, lsa_entries,
                )
            {
                let router = router_lsa.body.as_router().unwrap();
                area.state.routers.insert(
                    vertex_rid,
                    RouteRtr::new(
                        PathType::IntraArea,
                        router.options,
                        router.flags,
                        vertex.distance,
                        vertex.nexthops.clone(),
                    ),
                );
            }
        }

        spt.insert(vertex_id, vertex);
    }

    // Store the new shortest-path tree.
    area.state.spt = spt;

    // Update statistics.
    area.state.spf_run_count += 1;
    area.state.discontinuity_time = chrono::Utc::now();
}

// Returns the links of the given vertex, derived from its Router-LSA or
// Network-LSA.
fn vertex_links(
    vertex_id: &VertexId,
    area: &Area,
    lsa_entries: &Arena<LsaEntry>,
) -> Vec<(VertexId, u16)> {
    let mut links = vec![];

    match vertex_id {
        VertexId::Router { router_id } => {
            let Some(lsa) = lookup_router_lsa(area, *router_id, lsa_entries)
            else {
                return links;
            };
            let router = lsa.body.as_router().unwrap();
            for link in &router.links {
                match link.link_type {
                    LsaRouterLinkType::PointToPoint
                    | LsaRouterLinkType::VirtualLink => {
                        links.push((
                            VertexId::Router {
                                router_id: link.nbr_router_id,
                            },
                            link.metric,
                        ));
                    }
                    LsaRouterLinkType::TransitNetwork => {
                        links.push((
                            VertexId::Network {
                                router_id: link.nbr_router_id,
                                iface_id: link.nbr_iface_id,
                            },
                            link.metric,
                        ));
                    }
                }
            }
        }
        VertexId::Network { router_id, iface_id } => {
            if let Some(lsa) =
                lookup_network_lsa(area, *router_id, *iface_id, lsa_entries)
            {
                let network = lsa.body.as_network().unwrap();
                for attached in &network.attached_rtrs {
                    links.push((
                        VertexId::Router {
                            router_id: *attached,
                        },
                        0,
                    ));
                }
            }
        }
    }

    links
}

// Checks that the target vertex has a link back to the parent vertex.
fn has_back_link(
    target: &VertexId,
    parent: &VertexId,
    area: &Area,
    lsa_entries: &Arena<LsaEntry>,
) -> bool {
    vertex_links(target, area, lsa_entries)
        .iter()
        .any(|(vid, _)| match (vid, parent) {
            (VertexId::Router { router_id: a }, VertexId::Router { router_id: b }) => a == b,
            (
                VertexId::Network { router_id: a, iface_id: ai },
                VertexId::Network { router_id: b, iface_id: bi },
            ) => a == b && ai == bi,
            _ => false,
        })
}

// Computes the nexthops towards a vertex directly connected to the root.
fn first_hop_nexthops(
    target: &VertexId,
    area: &Area,
    interfaces: &Arena<Interface>,
    neighbors: &Arena<Neighbor>,
) -> Nexthops {
    let mut nexthops = Nexthops::new();

    match target {
        VertexId::Router { router_id } => {
            // Find the interface with an adjacency to this router and use
            // the neighbor's link-local address.
            for iface_idx in area.interfaces.indexes() {
                let iface = &interfaces[iface_idx];
                if let Some((_, nbr)) = iface
                    .state
                    .neighbors
                    .get_by_router_id(neighbors, *router_id)
                    .filter(|(_, nbr)| nbr.state == nsm::State::Full)
                {
                    nexthops.insert(
                        nbr.src,
                        Nexthop::new(iface_idx, Some(nbr.src)),
                    );
                }
            }
        }
        VertexId::Network { iface_id, .. } => {
            // Directly attached transit network.
            for iface_idx in area.interfaces.indexes() {
                let iface = &interfaces[iface_idx];
                if iface.system.ifindex == Some(*iface_id)
                    || iface
                        .state
                        .neighbors
                        .iter(neighbors)
                        .any(|nbr| nbr.iface_id == Some(*iface_id))
                {
                    if let Some(addr) = iface.state.src_addr {
                        nexthops.insert(addr, Nexthop::new(iface_idx, None));
                    }
                }
            }
        }
    }

    nexthops
}

fn lookup_router_lsa<'a>(
    area: &'a Area,
    router_id: Ipv4Addr,
    lsa_entries: &'a Arena<LsaEntry>,
) -> Option<&'a Arc<Lsa>> {
    area.state
        .lsdb
        .iter_by_type_advrtr(lsa_entries, LsaType::ROUTER, router_id)
        .map(|(_, lse)| &lse.data)
        .find(|lsa| !lsa.hdr.is_maxage())
}

fn lookup_network_lsa<'a>(
    area: &'a Area,
    router_id: Ipv4Addr,
    iface_id: u32,
    lsa_entries: &'a Arena<LsaEntry>,
) -> Option<&'a Arc<Lsa>> {
    area.state
        .lsdb
        .iter_by_type_advrtr(lsa_entries, LsaType::NETWORK, router_id)
        .map(|(_, lse)| &lse.data)
        .filter(|lsa| !lsa.hdr.is_maxage())
        .find(|lsa| u32::from(lsa.hdr.lsa_id) == iface_id)
}

// Rebuilds the global routing table from the shortest-path trees, the
// inter-area summaries and the external LSAs.
fn update_rib(instance: &mut InstanceUpView<'_>, arenas: &mut InstanceArenas) {
    let router_id = instance.state.router_id;
    let mut new_rib: BTreeMap<Ipv6Network, RouteNet> = BTreeMap::new();

    for area in arenas.areas.iter() {
        // Intra-area prefixes.
        for (_, lse) in area
            .state
            .lsdb
            .iter_by_type(&arenas.lsa_entries, LsaType::INTRA_AREA_PREFIX)
            .filter(|(_, lse)| !lse.data.hdr.is_maxage())
        {
            let lsa = &lse.data;
            let intra_prefix = lsa.body.as_intra_area_prefix().unwrap();
            let ref_vid = match intra_prefix.ref_lsa_type {
                LsaType::ROUTER => VertexId::Router {
                    router_id: intra_prefix.ref_adv_rtr,
                },
                LsaType::NETWORK => VertexId::Network {
                    router_id: intra_prefix.ref_adv_rtr,
                    iface_id: intra_prefix.ref_lsa_id.into(),
                },
                _ => continue,
            };
            let Some(vertex) = area.state.spt.get(&ref_vid) else {
                continue;
            };

            for entry in &intra_prefix.prefixes {
                let metric = vertex.distance + entry.metric as u32;
                if metric >= LSA_INFINITY {
                    continue;
                }
                let mut flags = RouteNetFlags::empty();
                if lsa.hdr.adv_rtr == router_id {
                    flags.insert(RouteNetFlags::CONNECTED);
                }
                let route = RouteNet {
                    path_type: PathType::IntraArea,
                    prefix_options: entry.options,
                    metric,
                    type2_metric: None,
                    tag: None,
                    area_id: Some(area.area_id),
                    origin: Some(lsa.hdr.adv_rtr),
                    nexthops: vertex.nexthops.clone(),
                    flags,
                };
                rib_add(&mut new_rib, entry.value, route);
            }
        }

        // Inter-area prefixes advertised by reachable ABRs.
        for (_, lse) in area
            .state
            .lsdb
            .iter_by_type(&arenas.lsa_entries, LsaType::INTER_AREA_PREFIX)
            .filter(|(_, lse)| !lse.data.hdr.is_maxage())
            .filter(|(_, lse)| lse.data.hdr.adv_rtr != router_id)
        {
            let lsa = &lse.data;
            let inter_prefix = lsa.body.as_inter_area_prefix().unwrap();
            let Some(abr) = area
                .state
                .routers
                .get(&lsa.hdr.adv_rtr)
                .filter(|abr| abr.flags.contains(crate::packet::lsa::LsaRouterFlags::B))
            else {
                continue;
            };

            let metric = abr.metric + inter_prefix.metric;
            if metric >= LSA_INFINITY {
                continue;
            }
            let route = RouteNet {
                path_type: PathType::InterArea,
                prefix_options: inter_prefix.prefix_options,
                metric,
                type2_metric: None,
                tag: None,
                area_id: Some(area.area_id),
                origin: Some(lsa.hdr.adv_rtr),
                nexthops: abr.nexthops.clone(),
                flags: RouteNetFlags::empty(),
            };
            rib_add(&mut new_rib, inter_prefix.prefix, route);
        }

        // NSSA Type-7 prefixes advertised by reachable ASBRs.
        if area.config.area_type == AreaType::Nssa {
            for (_, lse) in area
                .state
                .lsdb
                .iter_by_type(&arenas.lsa_entries, LsaType::TYPE7)
                .filter(|(_, lse)| !lse.data.hdr.is_maxage())
                .filter(|(_, lse)| lse.data.hdr.adv_rtr != router_id)
            {
                let lsa = &lse.data;
                let external = lsa.body.as_type7().unwrap();
                if let Some(route) = external_route(
                    area,
                    lsa.hdr.adv_rtr,
                    external,
                ) {
                    rib_add(&mut new_rib, external.prefix, route);
                }
            }
        }
    }

    // AS-external prefixes advertised by reachable ASBRs.
    for (_, lse) in instance
        .state
        .lsdb
        .iter_by_type(&arenas.lsa_entries, LsaType::AS_EXTERNAL)
        .filter(|(_, lse)| !lse.data.hdr.is_maxage())
        .filter(|(_, lse)| lse.data.hdr.adv_rtr != router_id)
    {
        let lsa = &lse.data;
        let external = lsa.body.as_as_external().unwrap();
        if let Some(route) = arenas.areas.iter().find_map(|area| {
            external_route(area, lsa.hdr.adv_rtr, external)
        }) {
            rib_add(&mut new_rib, external.prefix, route);
        }
    }

    // Reconcile with the previous routing table through the installer.
    let old_rib = std::mem::take(&mut instance.state.rib);
    for (prefix, route) in old_rib {
        if !new_rib.contains_key(&prefix)
            && route.flags.contains(RouteNetFlags::INSTALLED)
        {
            instance.route_installer.uninstall(prefix);
        }
    }
    for (prefix, route) in new_rib.iter_mut() {
        if !route.flags.contains(RouteNetFlags::CONNECTED) {
            instance.route_installer.install(*prefix, route);
            route.flags.insert(RouteNetFlags::INSTALLED);
        }
    }
    instance.state.rib = new_rib;
}

// Builds an external route through the given ASBR, if it is reachable in
// the area.
fn external_route(
    area: &Area,
    adv_rtr: Ipv4Addr,
    external: &crate::packet::lsa::LsaAsExternal,
) -> Option<RouteNet> {
    let asbr = area.state.routers.get(&adv_rtr).filter(|asbr| {
        asbr.flags
            .contains(crate::packet::lsa::LsaRouterFlags::E)
    })?;

    let (path_type, metric, type2_metric) =
        if external.flags.contains(LsaAsExternalFlags::E) {
            (PathType::Type2External, asbr.metric, Some(external.metric))
        } else {
            (
                PathType::Type1External,
                asbr.metric + external.metric,
                None,
            )
        };
    if external.metric >= LSA_INFINITY {
        return None;
    }

    Some(RouteNet {
        path_type,
        prefix_options: external.prefix_options,
        metric,
        type2_metric,
        tag: external.tag,
        area_id: None,
        origin: Some(adv_rtr),
        nexthops: asbr.nexthops.clone(),
        flags: RouteNetFlags::empty(),
    })
}

// Inserts a route into the new routing table, keeping only the preferred
// path for each destination.
fn rib_add(
    rib: &mut BTreeMap<Ipv6Network, RouteNet>,
    prefix: Ipv6Network,
    route: RouteNet,
) {
    match rib.entry(prefix) {
        std::collections::btree_map::Entry::Occupied(mut o) => {
            let current = o.get_mut();
            let new_key =
                (route.path_type, route.type2_metric, route.metric);
            let cur_key = (
                current.path_type,
                current.type2_metric,
                current.metric,
            );
            match new_key.cmp(&cur_key) {
                std::cmp::Ordering::Less => {
                    *current = route;
                }
                std::cmp::Ordering::Equal => {
                    // Merge equal-cost paths.
                    current.nexthops.extend(route.nexthops);
                }
                std::cmp::Ordering::Greater => (),
            }
        }
        std::collections::btree_map::Entry::Vacant(v) => {
            v.insert(route);
        }
    }
}

// Adds entry for the SPF run to the SPF log.
fn log_spf_run(
    instance: &mut InstanceUpView<'_>,
    schedule_time: Instant,
    start_time: Instant,
    end_time: Instant,
    mut trigger_lsas: Vec<SpfTriggerLsa>,
) {
    // Get next log ID.
    let log_id = &mut instance.state.spf_log_next_id;
    *log_id += 1;

    // Get trigger LSAs in log format.
    trigger_lsas.truncate(SPF_LOG_TRIGGER_LSAS_MAX_SIZE);
    let trigger_lsas = trigger_lsas
        .into_iter()
        .map(|tlsa| tlsa.log_id)
        .collect();

    // Add new log entry.
    let log_entry = SpfLogEntry::new(
        *log_id,
        schedule_time,
        start_time,
        end_time,
        trigger_lsas,
    );
    instance.state.spf_log.push_front(log_entry);

    // Remove old entries if necessary.
    instance.state.spf_log.truncate(SPF_LOG_MAX_SIZE);
}
