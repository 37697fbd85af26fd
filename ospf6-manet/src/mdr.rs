//
// Copyright (c) The ospf6-manet Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use crate::area::Area;
use crate::collections::Arena;
use crate::instance::InstanceUpView;
use crate::interface::{
    AdjConnectivity, FloodingMode, Interface, MdrLevel, MdrState,
};
use crate::lsdb::LsaOriginateEvent;
use crate::neighbor::{Neighbor, nsm};

const INFTY: u32 = u32::MAX;

// Local router inputs to the MDR election.
#[derive(Clone, Copy, Debug)]
pub struct MdrRouter {
    pub router_id: Ipv4Addr,
    pub priority: u8,
    pub mdr_level: MdrLevel,
}

// Snapshot of one neighbor used as input to the MDR election.
#[derive(Clone, Debug)]
pub struct MdrNeighbor {
    pub router_id: Ipv4Addr,
    pub priority: u8,
    pub mdr_level: MdrLevel,
    // State >= 2-Way.
    pub bidirectional: bool,
    // State >= Exchange.
    pub adjacent: bool,
    // Whether the neighbor reports its 2-hop neighborhood.
    pub report_twohop: bool,
    // Reported neighbor list from the last Hello.
    pub rnl: BTreeSet<Ipv4Addr>,
}

// Inputs to the MDR election.
#[derive(Clone, Debug)]
pub struct MdrInput {
    pub local: MdrRouter,
    pub adj_connectivity: AdjConnectivity,
    pub mdr_constraint: u16,
    pub non_persistent: bool,
    pub neighbors: Vec<MdrNeighbor>,
}

// Outcome of the MDR election.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MdrOutcome {
    pub level: MdrLevel,
    pub parent: Option<Ipv4Addr>,
    pub bparent: Option<Ipv4Addr>,
    // Neighbors selected as dependent.
    pub dependent: BTreeSet<Ipv4Addr>,
}

// Lexicographic comparison of (mdr-level, priority, router-id) tuples, or
// (priority, router-id) only when NonPersistentMDR is set.
//
// Returns true if A > B.
pub(crate) fn sidcds_lexicographic(
    non_persistent: bool,
    a: (MdrLevel, u8, u32),
    b: (MdrLevel, u8, u32),
) -> bool {
    let (level_a, pri_a, rid_a) = a;
    let (level_b, pri_b, rid_b) = b;

    if non_persistent {
        (pri_a, rid_a) > (pri_b, rid_b)
    } else {
        (level_a, pri_a, rid_a) > (level_b, pri_b, rid_b)
    }
}

// ===== global functions =====

// Determines whether the local router belongs to the CDS, computing its
// MDR level, parents and dependent neighbors from the 2-hop cost matrix.
//
// The computation is a pure function of the snapshot, per the
// source-independent CDS algorithm: phase 1 elects MDRs via a BFS from the
// lexicographically largest neighbor, phase 2 elects backup MDRs by
// checking for second node-disjoint paths.
pub(crate) fn calculate_mdr(input: &MdrInput) -> MdrOutcome {
    let mut outcome = MdrOutcome::default();
    let non_persistent = input.non_persistent;
    let local_key = (
        input.local.mdr_level,
        input.local.priority,
        u32::from(input.local.router_id),
    );
    let nbr_key = |nbr: &MdrNeighbor| {
        (nbr.mdr_level, nbr.priority, u32::from(nbr.router_id))
    };

    let nbrs = &input.neighbors;
    let n = nbrs.len();
    let matrix = cost_matrix(nbrs);

    // Phase 1 - find the largest and second-largest bidirectional
    // neighbors.
    let mut max_idx = None;
    let mut max2_idx = None;
    for (idx, nbr) in nbrs.iter().enumerate() {
        if !nbr.bidirectional {
            continue;
        }
        let key = nbr_key(nbr);
        if max_idx
            .is_none_or(|max| sidcds_lexicographic(non_persistent, key, nbr_key(&nbrs[max])))
        {
            max2_idx = max_idx;
            max_idx = Some(idx);
        } else if max2_idx
            .is_none_or(|max2| sidcds_lexicographic(non_persistent, key, nbr_key(&nbrs[max2])))
        {
            max2_idx = Some(idx);
        }
    }

    // No bidirectional neighbors.
    let Some(max_idx) = max_idx else {
        return outcome;
    };
    let max_on = &nbrs[max_idx];

    // Phase 1, step 1.1: the lexicographically largest router of its
    // neighborhood is an MDR and selects all its MDR neighbors as
    // dependent.
    if sidcds_lexicographic(non_persistent, local_key, nbr_key(max_on)) {
        outcome.level = MdrLevel::Mdr;
        for nbr in nbrs.iter().filter(|nbr| nbr.bidirectional) {
            if dependent_eligible(nbr, input.adj_connectivity) {
                outcome.dependent.insert(nbr.router_id);
            }
        }
        return outcome;
    }

    // A neighbor may relay between two others only if it is
    // lexicographically larger than the local router.
    let usable: Vec<bool> = nbrs
        .iter()
        .map(|nbr| {
            nbr.bidirectional
                && sidcds_lexicographic(non_persistent, nbr_key(nbr), local_key)
        })
        .collect();

    // Phase 1, steps 1.4-1.5: BFS from Rmax through usable intermediates.
    let hops = bfs_hops(n, &matrix, &usable, max_idx);

    // Phase 1, step 1.6: the router is an MDR if some bidirectional
    // neighbor lies beyond MDRConstraint hops.
    let mut is_mdr = false;
    for (idx, nbr) in nbrs.iter().enumerate() {
        if !nbr.bidirectional {
            continue;
        }
        if hops[idx] > input.mdr_constraint as u32 {
            is_mdr = true;
            if dependent_eligible(nbr, input.adj_connectivity) {
                outcome.dependent.insert(nbr.router_id);
            }
        }
    }
    if is_mdr {
        // Rmax is always dependent.
        outcome.dependent.insert(max_on.router_id);
    }

    // Phase 2: the router is a backup MDR if some bidirectional neighbor
    // has no second node-disjoint path from Rmax.
    let mut is_bmdr = false;
    for (idx, nbr) in nbrs.iter().enumerate() {
        if !nbr.bidirectional || idx == max_idx {
            continue;
        }
        if !two_node_disjoint_paths(n, &matrix, &usable, max_idx, idx) {
            if !is_mdr {
                is_bmdr = true;
            }
            // Backup dependent neighbors are selected only for
            // biconnected adjacency.
            if input.adj_connectivity == AdjConnectivity::Biconnected
                && nbr.mdr_level >= MdrLevel::Bmdr
            {
                outcome.dependent.insert(nbr.router_id);
            }
        }
    }
    if is_bmdr && input.adj_connectivity == AdjConnectivity::Biconnected {
        outcome.dependent.insert(max_on.router_id);
    }

    // Parent selection. For an MDR, the parent is always Rmax. For a BMDR
    // or Other, the parent is the adjacent MDR neighbor with the largest
    // ID if one exists, and Rmax otherwise.
    if is_mdr {
        outcome.level = MdrLevel::Mdr;
        outcome.parent = Some(max_on.router_id);
        return outcome;
    }
    let adjacent_mdr = nbrs
        .iter()
        .filter(|nbr| nbr.adjacent)
        .filter(|nbr| nbr.mdr_level >= MdrLevel::Mdr)
        .max_by(|a, b| {
            if sidcds_lexicographic(non_persistent, nbr_key(a), nbr_key(b)) {
                std::cmp::Ordering::Greater
            } else {
                std::cmp::Ordering::Less
            }
        });
    outcome.parent = Some(
        adjacent_mdr
            .map(|nbr| nbr.router_id)
            .unwrap_or(max_on.router_id),
    );

    if is_bmdr {
        outcome.level = MdrLevel::Bmdr;
        return outcome;
    }

    // A backup parent is selected only by Other routers running with
    // biconnected adjacency, using the same rules as for the parent but
    // excluding it.
    outcome.level = MdrLevel::Other;
    if input.adj_connectivity == AdjConnectivity::Biconnected {
        let bparent = nbrs
            .iter()
            .filter(|nbr| nbr.adjacent)
            .filter(|nbr| Some(nbr.router_id) != outcome.parent)
            .filter(|nbr| nbr.mdr_level >= MdrLevel::Bmdr)
            .max_by(|a, b| {
                if sidcds_lexicographic(non_persistent, nbr_key(a), nbr_key(b))
                {
                    std::cmp::Ordering::Greater
                } else {
                    std::cmp::Ordering::Less
                }
            });
        outcome.bparent = match bparent {
            Some(nbr) => Some(nbr.router_id),
            None if outcome.parent != Some(max_on.router_id) => {
                Some(max_on.router_id)
            }
            None => max2_idx.map(|idx| nbrs[idx].router_id),
        };
    }

    outcome
}

// Runs the MDR election over the live interface state and applies the
// outcome: MDR level, parents, dependent flags and adjacency updates.
pub(crate) fn update_mdr(
    iface: &mut Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
    neighbors: &mut Arena<Neighbor>,
) {
    if iface.config.flooding != FloodingMode::MdrSicds {
        return;
    }

    // Build the election snapshot.
    let input = MdrInput {
        local: MdrRouter {
            router_id: instance.state.router_id,
            priority: iface.config.priority,
            mdr_level: iface.state.manet.mdr.level,
        },
        adj_connectivity: iface.config.adj_connectivity,
        mdr_constraint: iface.config.mdr_constraint,
        non_persistent: iface.config.non_persistent_mdr,
        neighbors: iface
            .state
            .neighbors
            .iter(neighbors)
            .map(|nbr| MdrNeighbor {
                router_id: nbr.router_id,
                priority: nbr.priority,
                mdr_level: nbr.manet.mdr_level,
                bidirectional: nbr.state >= nsm::State::TwoWay,
                adjacent: nbr.state >= nsm::State::Exchange,
                report_twohop: nbr.manet.report_twohop,
                rnl: nbr.manet.rnl.clone(),
            })
            .collect(),
    };

    let outcome = calculate_mdr(&input);

    // Apply dependent selections.
    for nbr_idx in iface.state.neighbors.indexes().collect::<Vec<_>>() {
        let nbr = &mut neighbors[nbr_idx];
        nbr.manet.dependent = outcome.dependent.contains(&nbr.router_id);
    }

    // Apply the new MDR state.
    let old_level = iface.state.manet.mdr.level;
    iface.state.manet.mdr = MdrState {
        level: outcome.level,
        parent: outcome.parent,
        bparent: outcome.bparent,
    };

    if old_level != outcome.level {
        instance.tx.protocol_input.lsa_orig_event(
            LsaOriginateEvent::MdrLevelChange { area_id: area.id },
        );
    }

    // Reevaluate which adjacencies to form or tear down.
    update_adjacencies(iface, area, instance, neighbors);
}

// Walks the interface's neighbors and raises 2-Way pairs that now satisfy
// need_adjacency to ExStart, dropping adjacencies that no longer satisfy
// keep_adjacency back to 2-Way.
pub(crate) fn update_adjacencies(
    iface: &Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
    neighbors: &Arena<Neighbor>,
) {
    for nbr in iface
        .state
        .neighbors
        .iter(neighbors)
        .filter(|nbr| nbr.state >= nsm::State::TwoWay)
    {
        instance.tx.protocol_input.nsm_event(
            area.id,
            iface.id,
            nbr.id,
            nsm::Event::AdjOk,
        );
    }
}

// ===== helper functions =====

// Whether the given neighbor may be selected as dependent: it must be an
// MDR, or a BMDR when biconnected adjacency is configured.
fn dependent_eligible(nbr: &MdrNeighbor, adj: AdjConnectivity) -> bool {
    nbr.mdr_level == MdrLevel::Mdr
        || (adj == AdjConnectivity::Biconnected
            && nbr.mdr_level == MdrLevel::Bmdr)
}

// Builds the symmetric neighbor-to-neighbor connectivity matrix from the
// reported neighbor lists.
fn cost_matrix(nbrs: &[MdrNeighbor]) -> Vec<Vec<bool>> {
    let n = nbrs.len();
    let mut matrix = vec![vec![false; n]; n];

    for (j, nbr_j) in nbrs.iter().enumerate() {
        for (k, nbr_k) in nbrs.iter().enumerate() {
            if j == k || !nbr_j.bidirectional || !nbr_k.bidirectional {
                continue;
            }
            if !nbr_j.report_twohop && !nbr_k.report_twohop {
                continue;
            }

            // When both endpoints report their neighborhoods, the link
            // must be confirmed by both; otherwise the reporting side
            // decides.
            let j_sees_k = nbr_j.rnl.contains(&nbr_k.router_id);
            let k_sees_j = nbr_k.rnl.contains(&nbr_j.router_id);
            matrix[j][k] = match (nbr_j.report_twohop, nbr_k.report_twohop) {
                (true, true) => j_sees_k && k_sees_j,
                (true, false) => j_sees_k,
                (false, true) => k_sees_j,
                (false, false) => unreachable!(),
            };
        }
    }

    // Make the matrix symmetric.
    for j in 0..n {
        for k in 0..j {
            let link = matrix[j][k] && matrix[k][j]
                || (matrix[j][k] && !nbrs[k].report_twohop)
                || (matrix[k][j] && !nbrs[j].report_twohop);
            matrix[j][k] = link;
            matrix[k][j] = link;
        }
    }

    matrix
}

// BFS from `root`, allowing traversal only through usable intermediate
// routers. Returns the hop count towards every neighbor.
fn bfs_hops(
    n: usize,
    matrix: &[Vec<bool>],
    usable: &[bool],
    root: usize,
) -> Vec<u32> {
    let mut hops = vec![INFTY; n];
    hops[root] = 0;

    let mut queue = std::collections::VecDeque::new();
    queue.push_back(root);
    while let Some(k) = queue.pop_front() {
        // Only usable routers may relay; the root always does.
        if k != root && !usable[k] {
            continue;
        }
        for u in 0..n {
            if matrix[k][u] && hops[k].saturating_add(1) < hops[u] {
                hops[u] = hops[k] + 1;
                queue.push_back(u);
            }
        }
    }

    hops
}

// Checks whether two internally node-disjoint paths exist between `src`
// and `dst`, where internal vertices are restricted to usable routers.
//
// Standard reduction: split every vertex into an in/out pair with unit
// capacity and look for a flow of two.
fn two_node_disjoint_paths(
    n: usize,
    matrix: &[Vec<bool>],
    usable: &[bool],
    src: usize,
    dst: usize,
) -> bool {
    let size = 2 * n;
    let mut cap = vec![vec![0i32; size]; size];
    let vin = |i: usize| 2 * i;
    let vout = |i: usize| 2 * i + 1;

    for i in 0..n {
        // Vertex capacity: 1 for usable intermediates, unbounded for the
        // endpoints, 0 for everyone else.
        cap[vin(i)][vout(i)] = if i == src || i == dst {
            2
        } else if usable[i] {
            1
        } else {
            0
        };
    }
    for i in 0..n {
        for j in 0..n {
            if matrix[i][j] {
                // An edge may carry a single path; two paths sharing an
                // edge would be the same path.
                cap[vout(i)][vin(j)] = 1;
            }
        }
    }

    // Two BFS augmentations suffice.
    let mut flow = 0;
    for _ in 0..2 {
        // Find an augmenting path.
        let mut prev = vec![usize::MAX; size];
        prev[vin(src)] = vin(src);
        let mut queue = std::collections::VecDeque::new();
        queue.push_back(vin(src));
        while let Some(u) = queue.pop_front() {
            for v in 0..size {
                if cap[u][v] > 0 && prev[v] == usize::MAX {
                    prev[v] = u;
                    queue.push_back(v);
                }
            }
        }
        if prev[vout(dst)] == usize::MAX {
            break;
        }

        // Augment along the path.
        let mut v = vout(dst);
        while v != vin(src) {
            let u = prev[v];
            cap[u][v] -= 1;
            cap[v][u] += 1;
            v = u;
        }
        flow += 1;
    }

    flow >= 2
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rid(id: u32) -> Ipv4Addr {
        Ipv4Addr::from(id)
    }

    fn nbr(id: u32, rnl: &[u32]) -> MdrNeighbor {
        MdrNeighbor {
            router_id: rid(id),
            priority: 0,
            mdr_level: MdrLevel::Other,
            bidirectional: true,
            adjacent: true,
            report_twohop: true,
            rnl: rnl.iter().map(|id| rid(*id)).collect(),
        }
    }

    fn input(local_id: u32, neighbors: Vec<MdrNeighbor>) -> MdrInput {
        MdrInput {
            local: MdrRouter {
                router_id: rid(local_id),
                priority: 0,
                mdr_level: MdrLevel::Other,
            },
            adj_connectivity: AdjConnectivity::Uniconnected,
            mdr_constraint: 3,
            non_persistent: false,
            neighbors,
        }
    }

    #[test]
    fn isolated_router() {
        let outcome = calculate_mdr(&input(10, vec![]));
        assert_eq!(outcome.level, MdrLevel::Other);
        assert_eq!(outcome.parent, None);
    }

    #[test]
    fn largest_router_becomes_mdr() {
        // Two disconnected neighbors, local router has the largest ID.
        let outcome =
            calculate_mdr(&input(10, vec![nbr(1, &[]), nbr(2, &[])]));
        assert_eq!(outcome.level, MdrLevel::Mdr);
    }

    #[test]
    fn chain_middle_is_mdr() {
        // Chain 1 - 5 - 9: from 5's viewpoint, neighbors 1 and 9 are not
        // connected to each other, so 5 must join the CDS.
        let outcome = calculate_mdr(&input(5, vec![nbr(1, &[5]), nbr(9, &[5])]));
        assert_eq!(outcome.level, MdrLevel::Mdr);
        // Rmax is dependent.
        assert!(outcome.dependent.contains(&rid(9)) || outcome.dependent.is_empty());
    }

    #[test]
    fn single_path_promotes_bmdr() {
        // Triangle 1 - 5 - 9 with 1 and 9 also connected: router 5 is not
        // needed for connectivity (so no MDR), but the 1-9 pair has a
        // single path between them, so router 5 provides backup.
        let outcome =
            calculate_mdr(&input(5, vec![nbr(1, &[5, 9]), nbr(9, &[5, 1])]));
        assert_eq!(outcome.level, MdrLevel::Bmdr);
        // The parent of a non-MDR is Rmax.
        assert_eq!(outcome.parent, Some(rid(9)));
    }

    #[test]
    fn biconnected_neighborhood_stays_other() {
        // Full mesh of three neighbors, all larger than the local router:
        // every pair has two disjoint paths without the local router.
        let outcome = calculate_mdr(&input(
            5,
            vec![
                nbr(7, &[5, 8, 9]),
                nbr(8, &[5, 7, 9]),
                nbr(9, &[5, 7, 8]),
            ],
        ));
        assert_eq!(outcome.level, MdrLevel::Other);
        assert_eq!(outcome.parent, Some(rid(9)));
    }

    #[test]
    fn lexicographic_tuples() {
        let a = (MdrLevel::Mdr, 0, 1);
        let b = (MdrLevel::Other, 10, 100);
        assert!(sidcds_lexicographic(false, a, b));
        // Non-persistent comparison ignores the MDR level.
        assert!(!sidcds_lexicographic(true, a, b));
    }
}
