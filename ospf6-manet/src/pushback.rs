//
// Copyright (c) The ospf6-manet Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::sync::Arc;

use ospf6_manet_utils::task::TimeoutTask;

use crate::area::Area;
use crate::collections::{AreaKey, InterfaceKey};
use crate::debug::Debug;
use crate::error::Error;
use crate::instance::{InstanceArenas, InstanceUpView};
use crate::interface::Interface;
use crate::lsdb::lsa_compare;
use crate::neighbor::Neighbor;
use crate::packet::lsa::{Lsa, LsaKey};
use crate::tasks;

// An LSA whose reflood was pushed back.
//
// The backup-wait list holds the neighbors that had not yet received the
// LSA when it was pushed back. Acknowledgements and overheard refloods
// shrink the list; if it empties before the timer fires, the reflood is
// cancelled.
#[derive(Debug)]
pub struct PushbackLsa {
    pub lsa: Arc<Lsa>,
    pub backup_wait: BTreeSet<Ipv4Addr>,
    pub backup_timer: TimeoutTask,
}

// ===== global functions =====

// Pushes back the given LSA, recording the uncovered neighbors.
pub(crate) fn add(
    iface: &mut Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
    lsa: &Arc<Lsa>,
    nbrs: Vec<Ipv4Addr>,
) {
    let lsa_key = lsa.hdr.key();

    let same_instance = iface
        .state
        .manet
        .pushback
        .get(&lsa_key)
        .is_some_and(|pb| {
            lsa_compare(&pb.lsa.hdr, &lsa.hdr) == std::cmp::Ordering::Equal
        });
    if same_instance {
        // Already pushed back: extend the wait list and restart the timer.
        let timer = tasks::pushback_timer(iface, area, instance, lsa_key);
        let pb = iface.state.manet.pushback.get_mut(&lsa_key).unwrap();
        pb.backup_wait.extend(nbrs);
        pb.backup_timer = timer;
        return;
    }

    Debug::PushbackAdd(&lsa.hdr).log();

    let backup_timer = tasks::pushback_timer(iface, area, instance, lsa_key);
    iface.state.manet.pushback.insert(
        lsa_key,
        PushbackLsa {
            lsa: lsa.clone(),
            backup_wait: nbrs.into_iter().collect(),
            backup_timer,
        },
    );
}

// Handles an acknowledgement of a pushed-back LSA from the given neighbor.
pub(crate) fn ack_received(
    iface: &mut Interface,
    router_id: Ipv4Addr,
    lsa_key: &LsaKey,
) {
    if let Some(pb) = iface.state.manet.pushback.get_mut(lsa_key) {
        pb.backup_wait.remove(&router_id);
        if pb.backup_wait.is_empty() {
            // Every neighbor is covered: the reflood would be redundant.
            cancel(iface, lsa_key);
        }
    }
}

// Handles a duplicate of a pushed-back LSA overheard from the given
// neighbor: the reflood reached the sender's reported neighbors too
// (implicit ack by proxy), provided it went out as a multicast.
pub(crate) fn duplicate_received(
    iface: &mut Interface,
    from: &Neighbor,
    lsa_key: &LsaKey,
    mcast: bool,
) {
    let Some(pb) = iface.state.manet.pushback.get_mut(lsa_key) else {
        return;
    };

    pb.backup_wait.remove(&from.router_id);
    if mcast {
        for router_id in &from.manet.rnl {
            pb.backup_wait.remove(router_id);
        }
    }

    if pb.backup_wait.is_empty() {
        cancel(iface, lsa_key);
    }
}

// Removes a dead or demoted neighbor from all backup-wait lists.
pub(crate) fn neighbor_down(iface: &mut Interface, router_id: Ipv4Addr) {
    let empty: Vec<_> = iface
        .state
        .manet
        .pushback
        .iter_mut()
        .filter_map(|(lsa_key, pb)| {
            pb.backup_wait.remove(&router_id);
            pb.backup_wait.is_empty().then_some(*lsa_key)
        })
        .collect();

    for lsa_key in empty {
        cancel(iface, &lsa_key);
    }
}

// Cancels a pending reflood. Dropping the entry also drops its timer.
fn cancel(iface: &mut Interface, lsa_key: &LsaKey) {
    if let Some(pb) = iface.state.manet.pushback.remove(lsa_key) {
        Debug::PushbackCancel(&pb.lsa.hdr).log();
    }
}

// Backup-wait timer expiration: at least one neighbor may have failed to
// receive the LSA, so reflood it.
pub(crate) fn process_timeout(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    area_key: AreaKey,
    iface_key: InterfaceKey,
    lsa_key: LsaKey,
) -> Result<(), Error> {
    // Lookup area and interface.
    let (_, area) = arenas.areas.get_mut_by_key(&area_key)?;
    let (_, iface) = area
        .interfaces
        .get_mut_by_key(&mut arenas.interfaces, &iface_key)?;

    let Some(pb) = iface.state.manet.pushback.remove(&lsa_key) else {
        return Ok(());
    };

    // All neighbors have received the LSA in the meantime: abort.
    if pb.backup_wait.is_empty() {
        Debug::PushbackCancel(&pb.lsa.hdr).log();
        return Ok(());
    }

    Debug::PushbackFlood(&pb.lsa.hdr).log();

    // The reflood serves as an implicit acknowledgement: drop any pending
    // delayed ack for this LSA.
    iface.state.ls_ack_list.remove(&lsa_key);

    // Enqueue the LSA for multicast transmission on the interface.
    iface.enqueue_ls_update(area, instance, lsa_key, pb.lsa.clone());

    // Postpone pending retransmissions of this LSA, the reflood stands in
    // for them.
    for nbr_idx in iface.state.neighbors.indexes().collect::<Vec<_>>() {
        let nbr = &mut arenas.neighbors[nbr_idx];
        if nbr.lists.ls_rxmt.contains_key(&lsa_key) {
            nbr.rxmt_lsupd_restart(iface, area, instance);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_wait_bookkeeping() {
        let mut wait: BTreeSet<Ipv4Addr> =
            ["1.1.1.1".parse().unwrap(), "2.2.2.2".parse().unwrap()].into();

        wait.remove(&"1.1.1.1".parse().unwrap());
        assert!(!wait.is_empty());
        wait.remove(&"2.2.2.2".parse().unwrap());
        assert!(wait.is_empty());
    }
}
