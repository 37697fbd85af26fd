//
// Copyright (c) The ospf6-manet Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use ipnetwork::Ipv6Network;

use crate::collections::{
    AreaId, AreaIndex, Areas, Arena, Interfaces, Lsdb, LsdbId,
};
use crate::instance::{InstanceArenas, InstanceUpView};
use crate::interface::Interface;
use crate::lsdb::{LSA_INFINITY, LsaEntry, LsaEntryFlags, lsa_flush};
use crate::packet::lsa::{
    LsaBody, LsaInterAreaPrefix, LsaInterAreaRouter, LsaKey, LsaRouterFlags,
    LsaType, PrefixOptions,
};
use crate::packet::{Options, PacketType};
use crate::route::{
    Nexthops, PathType, RouteNetFlags, RouteRtr, SummaryNet, SummaryNetFlags,
    SummaryRtr,
};
use crate::spf::{Vertex, VertexId};
use crate::vlink::VirtualLink;

// OSPF area.
#[derive(Debug)]
pub struct Area {
    // ID.
    pub id: AreaId,
    // Area ID.
    pub area_id: Ipv4Addr,
    // Area configuration data.
    pub config: AreaCfg,
    // Area state data.
    pub state: AreaState,
    // Area ranges.
    pub ranges: HashMap<Ipv6Network, Range>,
    // Area interfaces.
    pub interfaces: Interfaces,
    // Virtual links through this area.
    pub vlinks: Vec<VirtualLink>,
}

// Area configuration.
#[derive(Debug)]
pub struct AreaCfg {
    pub area_type: AreaType,
    // Whether Inter-Area-Prefix-LSAs are originated into this area
    // (disabled by the `no-summary` knob of stub/NSSA areas).
    pub summary: bool,
    // Cost of the default route originated into stub/NSSA areas.
    pub default_cost: u32,
    // Inter-area prefix filters (resolved through the instance's
    // prefix-list shim).
    pub filter_list_in: Option<String>,
    pub filter_list_out: Option<String>,
    // NSSA configuration.
    pub nssa: NssaCfg,
}

// NSSA configuration.
#[derive(Debug)]
pub struct NssaCfg {
    pub translator_role: NssaTranslatorRole,
    // Do not flood Type-7 LSAs received on this area into it.
    pub no_propagate: bool,
    // Do not originate Type-7 LSAs for redistributed routes.
    pub no_redistribution: bool,
    // How long a losing translator keeps translating, in seconds.
    pub stability_interval: u16,
    pub default_metric_type: NssaDefaultMetricType,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum NssaTranslatorRole {
    #[default]
    Candidate,
    Never,
    Always,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum NssaDefaultMetricType {
    Type1,
    #[default]
    Type2,
}

// Elected NSSA translator state.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum NssaTranslatorState {
    #[default]
    Disabled,
    Enabled,
}

// OSPF area state.
#[derive(Debug)]
pub struct AreaState {
    // LSDB of area-scope LSAs.
    pub lsdb: Lsdb,
    // Indicates whether the area can carry data traffic that neither
    // originates nor terminates in the area itself.
    pub transit_capability: bool,
    // Shortest-path tree.
    pub spt: BTreeMap<VertexId, Vertex>,
    // Table of all routers in the area.
    pub routers: BTreeMap<Ipv4Addr, RouteRtr>,
    // Routers reachable through the synchronization SPF, used by
    // smart peering.
    pub spf_sync_reachable: BTreeSet<Ipv4Addr>,
    // Table of summaries originated into this area.
    pub net_summaries: BTreeMap<Ipv6Network, (u32, SummaryNet)>,
    pub rtr_summaries: BTreeMap<Ipv4Addr, (u32, SummaryRtr)>,
    // LSA-ID allocators for summary LSAs.
    pub next_inter_prefix_lsa_id: u32,
    pub next_inter_router_lsa_id: u32,
    // NSSA translator state.
    pub nssa: NssaState,
    // Statistics.
    pub spf_run_count: u32,
    pub discontinuity_time: DateTime<Utc>,
}

// NSSA translator runtime state.
#[derive(Debug, Default)]
pub struct NssaState {
    pub translator_state: NssaTranslatorState,
    // Keeps the translator translating for the stability interval after
    // losing the election.
    pub stability_timer: Option<ospf6_manet_utils::task::TimeoutTask>,
    // Type-5 LSA-IDs produced by translation, keyed by the Type-7 origin.
    pub translated: BTreeMap<LsaKey, Ipv4Addr>,
}

// OSPF area type.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AreaType {
    Normal,
    Stub,
    Nssa,
}

// OSPF area range.
#[derive(Debug, Default)]
pub struct Range {
    pub config: RangeCfg,
    pub cost: u32,
}

#[derive(Debug)]
pub struct RangeCfg {
    pub advertise: bool,
    pub cost: Option<u32>,
}

// Represents the possible locations of the OSPF Options field.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OptionsLocation {
    Packet { pkt_type: PacketType },
    Lsa,
}

// ===== impl Area =====

impl Area {
    // Create new area.
    pub(crate) fn new(id: AreaId, area_id: Ipv4Addr) -> Self {
        Self {
            id,
            area_id,
            config: Default::default(),
            state: Default::default(),
            ranges: Default::default(),
            interfaces: Default::default(),
            vlinks: Default::default(),
        }
    }

    // Returns whether this area is active.
    //
    // An area is active as long as it contains at least one operational
    // interface.
    pub(crate) fn is_active(&self, interfaces: &Arena<Interface>) -> bool {
        self.interfaces
            .iter(interfaces)
            .any(|iface| !iface.is_down())
    }

    // Returns whether this is the backbone area.
    pub(crate) fn is_backbone(&self) -> bool {
        self.area_id == Ipv4Addr::UNSPECIFIED
    }

    // Returns the options used for packets and self-originated LSAs in
    // this area.
    pub(crate) fn options(
        &self,
        _instance: &InstanceUpView<'_>,
        _location: OptionsLocation,
    ) -> Options {
        let mut options = Options::V6 | Options::R;
        if self.config.area_type == AreaType::Normal {
            options.insert(Options::E);
        }
        if self.config.area_type == AreaType::Nssa {
            options.insert(Options::N);
        }
        options
    }

    // Returns whether the router is an NSSA translator candidate for this
    // area.
    pub(crate) fn nssa_candidate(&self) -> bool {
        self.config.area_type == AreaType::Nssa
            && self.config.nssa.translator_role != NssaTranslatorRole::Never
    }

    // Returns whether the NT-bit is advertised in the Router-LSA.
    pub(crate) fn nssa_nt_bit(&self, _instance: &InstanceUpView<'_>) -> bool {
        self.nssa_candidate()
    }
}

// ===== impl AreaCfg =====

impl Default for AreaCfg {
    fn default() -> AreaCfg {
        AreaCfg {
            area_type: AreaType::Normal,
            summary: true,
            default_cost: 1,
            filter_list_in: None,
            filter_list_out: None,
            nssa: NssaCfg::default(),
        }
    }
}

impl Default for NssaCfg {
    fn default() -> NssaCfg {
        NssaCfg {
            translator_role: NssaTranslatorRole::default(),
            no_propagate: false,
            no_redistribution: false,
            stability_interval: 40,
            default_metric_type: NssaDefaultMetricType::default(),
        }
    }
}

impl Default for RangeCfg {
    fn default() -> RangeCfg {
        RangeCfg {
            advertise: true,
            cost: None,
        }
    }
}

// ===== impl AreaState =====

impl Default for AreaState {
    fn default() -> AreaState {
        AreaState {
            lsdb: Default::default(),
            transit_capability: false,
            spt: Default::default(),
            routers: Default::default(),
            spf_sync_reachable: Default::default(),
            net_summaries: Default::default(),
            rtr_summaries: Default::default(),
            next_inter_prefix_lsa_id: 0,
            next_inter_router_lsa_id: 0,
            nssa: Default::default(),
            spf_run_count: 0,
            discontinuity_time: Utc::now(),
        }
    }
}

// ===== global functions =====

pub(crate) fn update_summary_lsas(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
) {
    let InstanceArenas {
        areas,
        interfaces,
        lsa_entries,
        ..
    } = arenas;

    // Check ABR status.
    let is_abr = areas.is_abr(interfaces);

    // Clear the summarized flag from all routes.
    for route in instance.state.rib.values_mut() {
        route.flags.remove(RouteNetFlags::SUMMARIZED);
    }

    // Check which routes should be summarized and which area ranges are
    // active.
    for area in areas.iter_mut() {
        update_net_ranges(area, is_abr, instance);
    }

    // Proceed to originate and/or flush summary LSAs as required.
    for area_idx in areas.indexes().collect::<Vec<_>>() {
        update_net_summary_lsas(area_idx, is_abr, instance, areas, lsa_entries);
        update_rtr_summary_lsas(area_idx, is_abr, instance, areas, lsa_entries);
    }
}

fn update_net_ranges(
    area: &mut Area,
    is_abr: bool,
    instance: &mut InstanceUpView<'_>,
) {
    // Reset area ranges.
    for range in area.ranges.values_mut() {
        range.cost = 0;
    }

    // Area ranges are only checked when the router is an ABR.
    if is_abr {
        for (prefix, route) in instance
            .state
            .rib
            .iter_mut()
            // Select intra-area routes from this area.
            .filter(|(_, route)| route.path_type == PathType::IntraArea)
            .filter(|(_, route)| route.area_id == Some(area.area_id))
            // Skip unreachable destinations.
            .filter(|(_, route)| route.metric < LSA_INFINITY)
        {
            // Check if the network is contained in an explicitly
            // configured address range.
            if let Some((_, range)) = area
                .ranges
                .iter_mut()
                .find(|(range_prefix, _)| range_prefix.is_supernet_of(*prefix))
            {
                route.flags.insert(RouteNetFlags::SUMMARIZED);

                // Update range's cost.
                if route.metric > range.cost {
                    range.cost = route.metric;
                }
            }
        }
    }
}

fn update_net_summary_lsas(
    area_idx: AreaIndex,
    is_abr: bool,
    instance: &InstanceUpView<'_>,
    areas: &mut Areas,
    lsa_entries: &Arena<LsaEntry>,
) {
    // Compute summary routes.
    let area = &areas[area_idx];
    let new_summaries = compute_net_summaries(is_abr, area, instance, areas);

    // Save the old table of summary routes.
    let area = &mut areas[area_idx];
    let mut old_summaries = std::mem::take(&mut area.state.net_summaries);

    // (Re)originate the required summary LSAs.
    area.state.net_summaries = new_summaries
        .into_iter()
        .map(|(prefix, new_summary)| {
            let lsa_id = match old_summaries.remove(&prefix) {
                Some((old_lsa_id, old_summary)) => {
                    // Reoriginate summary LSA if the route has changed,
                    // reusing the previous LSA-ID.
                    if new_summary != old_summary {
                        lsa_orig_inter_area_prefix(
                            area,
                            instance,
                            prefix,
                            Some(old_lsa_id),
                            &new_summary,
                        );
                    }
                    old_lsa_id
                }
                None => {
                    // Originate new summary LSA.
                    lsa_orig_inter_area_prefix(
                        area,
                        instance,
                        prefix,
                        None,
                        &new_summary,
                    )
                }
            };

            (prefix, (lsa_id, new_summary))
        })
        .collect();

    // Flush old summaries that are no longer valid.
    let lsa_ids = old_summaries.into_values().map(|(lsa_id, _)| lsa_id);
    flush_summary_lsas(
        LsaType::INTER_AREA_PREFIX,
        lsa_ids,
        &areas[area_idx],
        instance,
        lsa_entries,
    );
}

fn update_rtr_summary_lsas(
    area_idx: AreaIndex,
    is_abr: bool,
    instance: &InstanceUpView<'_>,
    areas: &mut Areas,
    lsa_entries: &Arena<LsaEntry>,
) {
    // Compute summary routes.
    let area = &areas[area_idx];
    let new_summaries = compute_rtr_summaries(is_abr, area, areas);

    // Save the old table of summary routes.
    let area = &mut areas[area_idx];
    let mut old_summaries = std::mem::take(&mut area.state.rtr_summaries);

    // (Re)originate the required summary LSAs.
    area.state.rtr_summaries = new_summaries
        .into_iter()
        .map(|(router_id, new_summary)| {
            let lsa_id = match old_summaries.remove(&router_id) {
                Some((old_lsa_id, old_summary)) => {
                    // Reoriginate summary LSA if the route has changed,
                    // reusing the previous LSA-ID.
                    if new_summary != old_summary {
                        lsa_orig_inter_area_router(
                            area,
                            instance,
                            router_id,
                            Some(old_lsa_id),
                            &new_summary,
                        );
                    }
                    old_lsa_id
                }
                None => {
                    // Originate new summary LSA.
                    lsa_orig_inter_area_router(
                        area,
                        instance,
                        router_id,
                        None,
                        &new_summary,
                    )
                }
            };

            (router_id, (lsa_id, new_summary))
        })
        .collect();

    // Flush old summaries that are no longer valid.
    let lsa_ids = old_summaries.into_values().map(|(lsa_id, _)| lsa_id);
    flush_summary_lsas(
        LsaType::INTER_AREA_ROUTER,
        lsa_ids,
        &areas[area_idx],
        instance,
        lsa_entries,
    );
}

fn compute_net_summaries(
    is_abr: bool,
    area: &Area,
    instance: &InstanceUpView<'_>,
    areas: &Areas,
) -> Vec<(Ipv6Network, SummaryNet)> {
    let mut summaries = vec![];

    // Only ABRs should originate summaries.
    if !is_abr {
        return summaries;
    }

    // Add regular summaries and ranges, except for totally stub/NSSA
    // areas.
    if area.config.summary {
        let rsummaries = compute_net_regular_summaries(area, instance);
        summaries.extend(rsummaries);

        let rsummaries = compute_net_range_summaries(area, areas);
        summaries.extend(rsummaries);
    }

    // Add default route for stub/NSSA areas.
    if area.config.area_type != AreaType::Normal {
        let prefix = Ipv6Network::new(std::net::Ipv6Addr::UNSPECIFIED, 0)
            .unwrap();
        let default_summary = SummaryNet {
            prefix_options: PrefixOptions::empty(),
            metric: area.config.default_cost,
            flags: SummaryNetFlags::empty(),
        };
        summaries.push((prefix, default_summary));
    }

    summaries
}

fn compute_net_regular_summaries<'a>(
    area: &'a Area,
    instance: &'a InstanceUpView<'_>,
) -> impl Iterator<Item = (Ipv6Network, SummaryNet)> + 'a {
    instance
        .state
        .rib
        .iter()
        // AS external routes are never advertised in summary LSAs.
        .filter(|(_, route)| {
            !matches!(
                route.path_type,
                PathType::Type1External | PathType::Type2External
            )
        })
        // Skip unreachable destinations.
        .filter(|(_, route)| route.metric < LSA_INFINITY)
        // Skip route if it's associated with the area itself.
        .filter(|(_, route)| route.area_id != Some(area.area_id))
        // Only intra-area routes are advertised into the backbone.
        .filter(|(_, route)| {
            route.path_type == PathType::IntraArea || !area.is_backbone()
        })
        // Check if the nexthops associated with this route belong to the
        // area. This is the logical equivalent of a Distance Vector
        // protocol's split horizon logic.
        .filter(|(_, route)| !nexthops_area_check(&route.nexthops, area))
        // Apply the area's outbound prefix filter.
        .filter(|(prefix, _)| {
            prefix_filter_check(instance, &area.config.filter_list_out, prefix)
        })
        // Check if the network is not contained in any explicitly
        // configured address range.
        .filter(|(_, route)| {
            // The backbone's configured ranges should be ignored when
            // originating summary LSAs into transit areas.
            if route.area_id == Some(Ipv4Addr::UNSPECIFIED)
                && area.state.transit_capability
            {
                true
            } else {
                !route.flags.contains(RouteNetFlags::SUMMARIZED)
            }
        })
        // Map to summary route.
        .map(|(prefix, route)| {
            let mut flags = SummaryNetFlags::empty();
            if route.flags.contains(RouteNetFlags::CONNECTED) {
                flags.insert(SummaryNetFlags::CONNECTED);
            }

            let summary = SummaryNet {
                prefix_options: route.prefix_options,
                metric: route.metric,
                flags,
            };
            (*prefix, summary)
        })
}

fn compute_net_range_summaries<'a>(
    area: &'a Area,
    areas: &'a Areas,
) -> impl Iterator<Item = (Ipv6Network, SummaryNet)> + 'a {
    areas
        .iter()
        // Check all other areas.
        .filter(|other_area| other_area.area_id != area.area_id)
        // The backbone's configured ranges should be ignored when
        // originating summary LSAs into transit areas.
        .filter(|other_area| {
            !(other_area.is_backbone() && area.state.transit_capability)
        })
        .flat_map(|other_area| {
            // Check the other area's configured ranges.
            other_area
                .ranges
                .iter()
                // Skip inactive ranges.
                .filter(|(_, range)| range.cost != 0)
                // Skip ranges whose advertisement isn't enabled
                // (Do-Not-Advertise).
                .filter(|(_, range)| range.config.advertise)
                // Map to summary route.
                .map(|(range_prefix, range)| {
                    let summary = SummaryNet {
                        prefix_options: PrefixOptions::empty(),
                        metric: range.config.cost.unwrap_or(range.cost),
                        flags: SummaryNetFlags::empty(),
                    };
                    (*range_prefix, summary)
                })
        })
}

fn compute_rtr_summaries(
    is_abr: bool,
    area: &Area,
    areas: &Areas,
) -> Vec<(Ipv4Addr, SummaryRtr)> {
    // Check conditions in which no router summaries should be generated.
    if !is_abr || area.config.area_type != AreaType::Normal {
        return Vec::new();
    }

    areas
        .iter()
        // Check the routing table from all other areas.
        .filter(|area_src| area_src.id != area.id)
        // An ASBR homed in an NSSA is never summarized: its external
        // routes reach the backbone only through Type-7 translation.
        .filter(|area_src| area_src.config.area_type != AreaType::Nssa)
        .flat_map(|area_src| area_src.state.routers.iter())
        // Only ASBR routes are advertised in summary LSAs.
        .filter(|(_, route)| route.flags.contains(LsaRouterFlags::E))
        // Skip unreachable destinations.
        .filter(|(_, route)| route.metric < LSA_INFINITY)
        // Only intra-area routes are advertised into the backbone.
        .filter(|(_, route)| {
            route.path_type == PathType::IntraArea || !area.is_backbone()
        })
        // Check if the nexthops associated with this route belong to the
        // area.
        .filter(|(_, route)| !nexthops_area_check(&route.nexthops, area))
        // Map to summary route.
        .map(|(router_id, route)| {
            let summary = SummaryRtr {
                options: route.options,
                metric: route.metric,
            };
            (*router_id, summary)
        })
        .collect()
}

fn nexthops_area_check(nexthops: &Nexthops, area: &Area) -> bool {
    nexthops.values().any(|nexthop| {
        area.interfaces
            .indexes()
            .any(|iface_idx| nexthop.iface_idx == iface_idx)
    })
}

// Consults the instance's prefix-list shim: an absent or unknown list
// matches everything.
pub(crate) fn prefix_filter_check(
    instance: &InstanceUpView<'_>,
    filter_list: &Option<String>,
    prefix: &Ipv6Network,
) -> bool {
    let Some(name) = filter_list else {
        return true;
    };
    let Some(entries) = instance.config.prefix_lists.get(name) else {
        return true;
    };
    entries.iter().any(|entry| entry.is_supernet_of(*prefix))
}

fn flush_summary_lsas(
    lsa_type: LsaType,
    lsa_ids: impl Iterator<Item = u32>,
    area: &Area,
    instance: &InstanceUpView<'_>,
    lsa_entries: &Arena<LsaEntry>,
) {
    let lsdb_id = LsdbId::Area(area.id);
    let adv_rtr = instance.state.router_id;

    // Flush previously originated summaries that are no longer valid.
    for lsa_id in lsa_ids {
        let lsa_key = LsaKey::new(lsa_type, adv_rtr, lsa_id.into());
        if let Some((_, lse)) = area.state.lsdb.get(lsa_entries, &lsa_key) {
            lsa_flush(instance, lsdb_id, lse.id);
        }
    }

    // Flush received self-originated summaries that are no longer valid.
    for (_, lse) in area
        .state
        .lsdb
        .iter_by_type_advrtr(lsa_entries, lsa_type, adv_rtr)
        .filter(|(_, lse)| lse.flags.contains(LsaEntryFlags::RECEIVED))
    {
        lsa_flush(instance, lsdb_id, lse.id);
    }
}

// (Re)originates an Inter-Area-Prefix-LSA, subject to the inbound filter
// and LSInfinity checks.
fn lsa_orig_inter_area_prefix(
    area: &mut Area,
    instance: &InstanceUpView<'_>,
    prefix: Ipv6Network,
    lsa_id: Option<u32>,
    summary: &SummaryNet,
) -> u32 {
    let lsdb_id = LsdbId::Area(area.id);

    // Get LSA-ID.
    let lsa_id = match lsa_id {
        Some(lsa_id) => lsa_id,
        None => {
            area.state.next_inter_prefix_lsa_id += 1;
            area.state.next_inter_prefix_lsa_id
        }
    };

    // Apply the area's inbound prefix filter.
    if !prefix_filter_check(instance, &area.config.filter_list_in, &prefix) {
        return lsa_id;
    }

    // (Re)originate Inter-Area-Prefix-LSA.
    let lsa_body = LsaBody::InterAreaPrefix(LsaInterAreaPrefix::new(
        summary.metric,
        summary.prefix_options,
        prefix,
    ));
    instance
        .tx
        .protocol_input
        .lsa_orig_check(lsdb_id, lsa_id.into(), lsa_body);

    lsa_id
}

// (Re)originates an Inter-Area-Router-LSA.
fn lsa_orig_inter_area_router(
    area: &mut Area,
    instance: &InstanceUpView<'_>,
    router_id: Ipv4Addr,
    lsa_id: Option<u32>,
    summary: &SummaryRtr,
) -> u32 {
    let lsdb_id = LsdbId::Area(area.id);

    // Get LSA-ID.
    let lsa_id = match lsa_id {
        Some(lsa_id) => lsa_id,
        None => {
            area.state.next_inter_router_lsa_id += 1;
            area.state.next_inter_router_lsa_id
        }
    };

    // (Re)originate Inter-Area-Router-LSA.
    let lsa_body = LsaBody::InterAreaRouter(LsaInterAreaRouter::new(
        summary.options,
        summary.metric,
        router_id,
    ));
    instance
        .tx
        .protocol_input
        .lsa_orig_check(lsdb_id, lsa_id.into(), lsa_body);

    lsa_id
}
