//
// Copyright (c) The ospf6-manet Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use std::time::Instant;

use crate::area::Area;
use crate::collections::Arena;
use crate::instance::InstanceUpView;
use crate::interface::{FloodingMode, Interface, Relay};
use crate::lsdb::LsaEntry;
use crate::neighbor::{Neighbor, nsm};
use crate::packet::lsa::LsaType;

// Snapshot of one 1-hop neighbor used as input to the relay calculation.
#[derive(Clone, Debug)]
pub struct MprNeighbor {
    pub router_id: Ipv4Addr,
    // Whether the neighbor is eligible for greedy selection (Full state).
    pub eligible: bool,
    // The neighbor's own neighbors, i.e. our 2-hop candidates.
    pub two_hops: BTreeSet<Ipv4Addr>,
}

// ===== global functions =====

// Computes the set of active overlapping relays over a neighborhood
// snapshot: a greedy set cover with deterministic tie-breaking.
//
// The result covers every reachable 2-hop neighbor at least once.
pub(crate) fn calculate_relays(
    neighbors: &[MprNeighbor],
) -> BTreeSet<Ipv4Addr> {
    let mut relays = BTreeSet::new();

    // Coverage map: 2-hop neighbor -> 1-hop neighbors that reach it.
    let mut coverage: BTreeMap<Ipv4Addr, Vec<&MprNeighbor>> = BTreeMap::new();
    for nbr in neighbors {
        for two_hop in &nbr.two_hops {
            coverage.entry(*two_hop).or_default().push(nbr);
        }
    }

    let mut covered_two_hops: BTreeSet<Ipv4Addr> = BTreeSet::new();
    let mut covered_nbrs: BTreeSet<Ipv4Addr> = BTreeSet::new();

    // Poorly covered 2-hops first: a 2-hop reachable through exactly one
    // 1-hop forces that 1-hop into the relay set.
    for (two_hop, one_hops) in &coverage {
        if covered_two_hops.contains(two_hop) || one_hops.len() != 1 {
            continue;
        }
        let forced = one_hops[0];
        if covered_nbrs.contains(&forced.router_id) {
            covered_two_hops.insert(*two_hop);
            continue;
        }
        covered_nbrs.insert(forced.router_id);
        covered_two_hops.extend(forced.two_hops.iter().copied());
        relays.insert(forced.router_id);
    }

    // While an uncovered 2-hop exists, pick the eligible 1-hop covering
    // the largest number of uncovered 2-hops; ties go to the larger
    // router ID.
    loop {
        let best = neighbors
            .iter()
            .filter(|nbr| nbr.eligible)
            .filter(|nbr| !covered_nbrs.contains(&nbr.router_id))
            .map(|nbr| {
                let cover_count = nbr
                    .two_hops
                    .iter()
                    .filter(|two_hop| !covered_two_hops.contains(two_hop))
                    .count();
                (cover_count, u32::from(nbr.router_id), nbr)
            })
            .filter(|(cover_count, _, _)| *cover_count > 0)
            .max_by_key(|(cover_count, router_id, _)| {
                (*cover_count, *router_id)
            });

        match best {
            Some((_, _, best)) => {
                covered_nbrs.insert(best.router_id);
                covered_two_hops.extend(best.two_hops.iter().copied());
                relays.insert(best.router_id);
            }
            None => {
                // No more uncovered 2-hops.
                break;
            }
        }
    }

    relays
}

// Builds the neighborhood snapshot for the given MANET interface.
//
// The 2-hop set of a neighbor is taken from its Router-LSA; neighbors that
// are themselves 1-hops (or the local router) are excluded.
pub(crate) fn snapshot(
    iface: &Interface,
    area: &Area,
    router_id: Ipv4Addr,
    neighbors: &Arena<Neighbor>,
    lsa_entries: &Arena<LsaEntry>,
) -> Vec<MprNeighbor> {
    let one_hops: BTreeSet<_> = iface
        .state
        .neighbors
        .iter(neighbors)
        .filter(|nbr| nbr.state >= nsm::State::TwoWay)
        .map(|nbr| nbr.router_id)
        .collect();

    iface
        .state
        .neighbors
        .iter(neighbors)
        .filter(|nbr| nbr.state >= nsm::State::TwoWay)
        .map(|nbr| {
            let two_hops = area
                .state
                .lsdb
                .iter_by_type_advrtr(
                    lsa_entries,
                    LsaType::ROUTER,
                    nbr.router_id,
                )
                .filter(|(_, lse)| !lse.data.hdr.is_maxage())
                .filter_map(|(_, lse)| lse.data.body.as_router())
                .flat_map(|router| router.links.iter())
                .map(|link| link.nbr_router_id)
                .filter(|id| *id != router_id && !one_hops.contains(id))
                .collect();

            MprNeighbor {
                router_id: nbr.router_id,
                eligible: nbr.state == nsm::State::Full,
                two_hops,
            }
        })
        .collect()
}

// Recomputes the relay set and applies the differences to the interface
// state, driving relay lifecycle and the State Check Sequence.
pub(crate) fn update_relays(
    iface: &mut Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
    neighbors: &Arena<Neighbor>,
    lsa_entries: &Arena<LsaEntry>,
) {
    if iface.config.flooding != FloodingMode::MprSdcds
        || !iface.state.manet.topology_changed
    {
        return;
    }
    iface.state.manet.topology_changed = false;

    let snapshot =
        snapshot(iface, area, instance.state.router_id, neighbors, lsa_entries);
    let active = calculate_relays(&snapshot);

    // Activate new relays.
    for router_id in &active {
        match iface.state.manet.relays.get_mut(router_id) {
            Some(relay) if relay.active => (),
            Some(relay) => {
                // A relay resurrected from the drop list counts as newly
                // activated.
                if relay.dropped {
                    relay.newly_activated = true;
                    iface.state.manet.increment_scs = true;
                }
                relay.dropped = false;
                relay.drop_time = None;
                relay.active = true;
            }
            None => {
                iface.state.manet.relays.insert(*router_id, Relay::new());
                iface.state.manet.increment_scs = true;
            }
        }
    }

    // Deactivate relays that fell out of the set. Dropped relays linger
    // for RouterDeadInterval so peers learn of the change through
    // differential Hellos.
    let dead_interval = iface.config.dead_interval as u64;
    let mut deleted = vec![];
    for (router_id, relay) in iface.state.manet.relays.iter_mut() {
        if active.contains(router_id) {
            continue;
        }
        relay.active = false;
        if !relay.dropped {
            relay.dropped = true;
            relay.newly_activated = false;
            relay.drop_time = Some(Instant::now());
            iface.state.manet.increment_scs = true;
        } else if relay
            .drop_time
            .is_some_and(|t| t.elapsed().as_secs() >= dead_interval)
        {
            deleted.push(*router_id);
        }
    }
    for router_id in deleted {
        iface.state.manet.relays.remove(&router_id);
    }

    // A changed relay set bumps the State Check Sequence used by
    // differential Hellos.
    if iface.state.manet.increment_scs {
        iface.state.manet.scs = iface.state.manet.scs.wrapping_add(1);
        iface.state.manet.increment_scs = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nbr(id: &str, eligible: bool, two_hops: &[&str]) -> MprNeighbor {
        MprNeighbor {
            router_id: id.parse().unwrap(),
            eligible,
            two_hops: two_hops.iter().map(|s| s.parse().unwrap()).collect(),
        }
    }

    fn ids(ids: &[&str]) -> BTreeSet<Ipv4Addr> {
        ids.iter().map(|s| s.parse().unwrap()).collect()
    }

    #[test]
    fn chain_topology() {
        // Linear chain A-B-C-D-E, computed at C: B covers A, D covers E.
        let neighbors = vec![
            nbr("2.2.2.2", true, &["1.1.1.1"]),
            nbr("4.4.4.4", true, &["5.5.5.5"]),
        ];
        assert_eq!(
            calculate_relays(&neighbors),
            ids(&["2.2.2.2", "4.4.4.4"])
        );
    }

    #[test]
    fn greedy_prefers_wider_coverage() {
        // One neighbor covers both 2-hops, the other only one of them.
        let neighbors = vec![
            nbr("2.2.2.2", true, &["10.0.0.1", "10.0.0.2"]),
            nbr("3.3.3.3", true, &["10.0.0.1"]),
        ];
        assert_eq!(calculate_relays(&neighbors), ids(&["2.2.2.2"]));
    }

    #[test]
    fn tie_break_by_router_id() {
        let neighbors = vec![
            nbr("2.2.2.2", true, &["10.0.0.1"]),
            nbr("3.3.3.3", true, &["10.0.0.1"]),
        ];
        assert_eq!(calculate_relays(&neighbors), ids(&["3.3.3.3"]));
    }

    #[test]
    fn forced_relay_for_poorly_covered_two_hop() {
        // 10.0.0.2 is reachable only via 2.2.2.2, which must be selected
        // even though 3.3.3.3 covers more 2-hops.
        let neighbors = vec![
            nbr("2.2.2.2", true, &["10.0.0.2"]),
            nbr("3.3.3.3", true, &["10.0.0.1", "10.0.0.3"]),
        ];
        assert_eq!(
            calculate_relays(&neighbors),
            ids(&["2.2.2.2", "3.3.3.3"])
        );
    }

    #[test]
    fn full_coverage_invariant() {
        // Every 2-hop must be covered by at least one selected relay.
        let neighbors = vec![
            nbr("1.1.1.1", true, &["10.0.0.1", "10.0.0.2"]),
            nbr("2.2.2.2", true, &["10.0.0.2", "10.0.0.3"]),
            nbr("3.3.3.3", true, &["10.0.0.3", "10.0.0.4"]),
            nbr("4.4.4.4", true, &["10.0.0.4", "10.0.0.1"]),
        ];
        let relays = calculate_relays(&neighbors);

        let all_two_hops: BTreeSet<_> = neighbors
            .iter()
            .flat_map(|nbr| nbr.two_hops.iter().copied())
            .collect();
        for two_hop in &all_two_hops {
            assert!(
                neighbors
                    .iter()
                    .filter(|nbr| relays.contains(&nbr.router_id))
                    .any(|nbr| nbr.two_hops.contains(two_hop)),
                "2-hop {two_hop} left uncovered by {relays:?}"
            );
        }
    }

    #[test]
    fn no_two_hops_no_relays() {
        let neighbors = vec![nbr("2.2.2.2", true, &[])];
        assert!(calculate_relays(&neighbors).is_empty());
    }
}
