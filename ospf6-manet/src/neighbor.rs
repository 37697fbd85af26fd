//
// Copyright (c) The ospf6-manet Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use nsm::{Event, State};
use ospf6_manet_utils::task::{IntervalTask, TimeoutTask};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::area::Area;
use crate::collections::{Arena, NeighborId};
use crate::debug::Debug;
use crate::error::Error;
use crate::instance::InstanceUpView;
use crate::interface::{Interface, MdrLevel};
use crate::lsdb::{LsaEntry, LsaOriginateEvent, lsa_compare, lsa_type_is_valid};
use crate::packet::lsa::{Lsa, LsaHdr, LsaKey, LsaScope};
use crate::packet::{DbDescFlags, Options};
use crate::tasks;
use crate::tasks::messages::input::RxmtIntervalMsg;
use crate::tasks::messages::output::NetTxPacketMsg;
use crate::{output, pushback};

#[derive(Debug)]
pub struct Neighbor {
    pub id: NeighborId,
    pub router_id: Ipv4Addr,
    pub iface_id: Option<u32>,
    // Link-local source address of the neighbor.
    pub src: Ipv6Addr,
    pub dr: Option<NeighborNetId>,
    pub bdr: Option<NeighborNetId>,
    pub priority: u8,
    pub state: State,

    pub options: Option<Options>,
    pub dd_flags: DbDescFlags,
    pub dd_seq_no: u32,
    pub last_rcvd_dbdesc: Option<LastDbDesc>,
    pub last_sent_dbdesc: Option<NetTxPacketMsg>,

    pub event_count: u32,
    pub discontinuity_time: DateTime<Utc>,

    pub lists: NeighborLsaLists,
    pub tasks: NeighborTasks,

    // MANET extensions.
    pub manet: NeighborManet,
}

// MANET per-neighbor state learned from Hello LLS blocks.
#[derive(Debug, Default)]
pub struct NeighborManet {
    // Whether the neighbor reports its 2-hop neighborhood.
    pub report_twohop: bool,
    // Reported neighbor list from the last Hello.
    pub rnl: BTreeSet<Ipv4Addr>,
    // MDR level advertised by or computed for this neighbor.
    pub mdr_level: MdrLevel,
    // The neighbor is a dependent neighbor of the local router.
    pub dependent: bool,
    // The neighbor selected the local router as dependent.
    pub dependent_selector: bool,
    // The neighbor selected the local router as parent or backup parent.
    pub child: bool,
    // The neighbor is advertised in the local Router-LSA.
    pub adv: bool,
    // LSAs this neighbor has acknowledged via multicast.
    pub ack_cache: BTreeMap<LsaKey, LsaHdr>,
    // State Check Sequence number from differential Hellos.
    pub scs_num: u16,
    // Last Hello sequence number received.
    pub hello_seq: Option<u16>,
}

// IPv4 identifier of a neighbor on a multi-access network.
//
// OSPFv3 identifies neighbors by Router ID rather than by address.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct NeighborNetId(Ipv4Addr);

#[derive(Debug)]
pub struct LastDbDesc {
    pub options: Options,
    pub dd_flags: DbDescFlags,
    pub dd_seq_no: u32,
}

#[derive(Debug, Default)]
pub struct NeighborLsaLists {
    // LSAs enqueued for transmission in LS Update packets.
    pub ls_update: BTreeMap<LsaKey, Arc<Lsa>>,
    // LSAs waiting to be acknowledged.
    pub ls_rxmt: BTreeMap<LsaKey, Arc<Lsa>>,
    // LSA headers enqueued for transmission in Database Description
    // packets.
    pub db_summary: BTreeMap<LsaKey, Arc<Lsa>>,
    // LSAs that need to be received from this neighbor.
    pub ls_request: BTreeMap<LsaKey, LsaHdr>,
    // LSAs that were requested but not received yet.
    pub ls_request_pending: BTreeMap<LsaKey, LsaHdr>,
}

#[derive(Debug, Default)]
pub struct NeighborTasks {
    pub inactivity_timer: Option<TimeoutTask>,
    pub dbdesc_free_timer: Option<TimeoutTask>,
    rxmt_dbdesc: Option<IntervalTask>,
    rxmt_lsreq: Option<IntervalTask>,
    rxmt_lsupd: Option<IntervalTask>,
}

#[derive(Clone, Copy, Debug)]
#[derive(Deserialize, Serialize)]
pub enum RxmtPacketType {
    DbDesc,
    LsRequest,
    LsUpdate,
}

// Neighbor state machine.
pub mod nsm {
    use serde::{Deserialize, Serialize};

    use crate::debug::SeqNoMismatchReason;

    #[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
    #[derive(Deserialize, Serialize)]
    pub enum State {
        #[default]
        Down,
        Attempt,
        Init,
        TwoWay,
        ExStart,
        Exchange,
        Loading,
        Full,
    }

    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    pub enum Event {
        HelloRcvd,
        Start,
        TwoWayRcvd,
        NegotiationDone,
        ExchangeDone,
        BadLsReq,
        LoadingDone,
        AdjOk,
        SeqNoMismatch(SeqNoMismatchReason),
        OneWayRcvd,
        Kill,
        InactivityTimer,
        LinkDown,
    }
}

// ===== impl Neighbor =====

impl Neighbor {
    pub(crate) fn new(
        id: NeighborId,
        router_id: Ipv4Addr,
        src: Ipv6Addr,
    ) -> Neighbor {
        Debug::NeighborCreate(router_id).log();

        // Initialize the DD Sequence Number.
        let dd_seq_no = {
            #[cfg(not(feature = "deterministic"))]
            {
                // Random value.
                rand::rng().next_u32()
            }
            #[cfg(feature = "deterministic")]
            {
                // Fixed value for deterministic test results.
                router_id.into()
            }
        };

        Neighbor {
            id,
            router_id,
            iface_id: None,
            src,
            dr: None,
            bdr: None,
            priority: 0,
            state: State::Down,
            options: None,
            dd_flags: DbDescFlags::empty(),
            dd_seq_no,
            last_rcvd_dbdesc: None,
            last_sent_dbdesc: None,
            event_count: 0,
            discontinuity_time: Utc::now(),
            lists: Default::default(),
            tasks: Default::default(),
            manet: Default::default(),
        }
    }

    pub(crate) fn fsm(
        &mut self,
        iface: &mut Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
        lsa_entries: &Arena<LsaEntry>,
        event: Event,
    ) {
        Debug::NsmEvent(self.router_id, &self.state, &event).log();

        let new_state = match (self.state, &event) {
            (State::Down, Event::Start) => {
                self.inactivity_timer_reset(iface, area, instance);
                Some(State::Attempt)
            }
            (State::Attempt | State::Down, Event::HelloRcvd) => {
                self.inactivity_timer_reset(iface, area, instance);
                Some(State::Init)
            }
            (
                State::Init
                | State::TwoWay
                | State::ExStart
                | State::Exchange
                | State::Loading
                | State::Full,
                Event::HelloRcvd,
            ) => {
                self.inactivity_timer_reset(iface, area, instance);
                None
            }
            (State::Init, Event::TwoWayRcvd)
            | (State::TwoWay, Event::AdjOk) => {
                if iface.need_adjacency(area, self) {
                    self.dd_seq_no += 1;
                    self.dd_flags.insert(
                        DbDescFlags::I | DbDescFlags::M | DbDescFlags::MS,
                    );
                    output::send_dbdesc(self, iface, area, instance);
                    Some(State::ExStart)
                } else {
                    Some(State::TwoWay)
                }
            }
            (State::ExStart, Event::NegotiationDone) => {
                // List the contents of the entire LSDB in the summary list.
                // LSAs whose identical instance sits in the cache of their
                // scope's LSDB are known to both ends already and are
                // skipped; MaxAge LSAs are flushed through the
                // retransmission list instead of being described.
                for lse in iface
                    .state
                    .lsdb
                    .iter(lsa_entries)
                    .chain(area.state.lsdb.iter(lsa_entries))
                    .chain(instance.state.lsdb.iter(lsa_entries))
                    .map(|(_, lse)| lse)
                    // Filter out unneeded LSAs.
                    .filter(|lse| {
                        lsa_type_is_valid(
                            Some(area.config.area_type),
                            lse.data.hdr.lsa_type,
                        )
                    })
                {
                    let lsa_key = lse.data.hdr.key();
                    if lse.data.hdr.is_maxage() {
                        self.lists.ls_rxmt.insert(lsa_key, lse.data.clone());
                        self.rxmt_lsupd_start_check(iface, area, instance);
                        continue;
                    }

                    let cache_lsdb = match lsa_key.lsa_type.scope() {
                        LsaScope::Link => &iface.state.lsdb,
                        LsaScope::Area => &area.state.lsdb,
                        LsaScope::As => &instance.state.lsdb,
                        LsaScope::Unknown => unreachable!(),
                    };
                    if cache_lsdb.cache_get(&lsa_key).is_none_or(|cached| {
                        lsa_compare(&cached.hdr, &lse.data.hdr)
                            != std::cmp::Ordering::Equal
                    }) {
                        self.lists.db_summary.insert(lsa_key, lse.data.clone());
                    }
                }

                self.dd_flags.remove(DbDescFlags::I);
                Some(State::Exchange)
            }
            (State::Exchange, Event::ExchangeDone) => {
                if self.lists.ls_request_pending.is_empty()
                    && self.lists.ls_request.is_empty()
                {
                    Some(State::Full)
                } else {
                    // Wait for outstanding LS Requests to be responded.
                    Some(State::Loading)
                }
            }
            (State::Loading, Event::LoadingDone) => {
                assert!(self.lists.ls_request.is_empty());
                Some(State::Full)
            }
            (
                State::ExStart | State::Exchange | State::Loading | State::Full,
                Event::AdjOk,
            ) => {
                if iface.keep_adjacency(self) {
                    None
                } else {
                    self.reset_adjacency();
                    Some(State::TwoWay)
                }
            }
            (
                State::Exchange | State::Loading | State::Full,
                Event::SeqNoMismatch(_) | Event::BadLsReq,
            ) => {
                self.reset_adjacency();
                self.dd_seq_no += 1;
                self.dd_flags
                    .insert(DbDescFlags::I | DbDescFlags::M | DbDescFlags::MS);
                output::send_dbdesc(self, iface, area, instance);
                Some(State::ExStart)
            }
            (_, Event::Kill | Event::LinkDown | Event::InactivityTimer) => {
                self.reset_adjacency();
                self.tasks.inactivity_timer = None;
                Some(State::Down)
            }
            (
                State::TwoWay
                | State::ExStart
                | State::Exchange
                | State::Loading
                | State::Full,
                Event::OneWayRcvd,
            ) => {
                self.reset_adjacency();
                Some(State::Init)
            }
            (
                State::TwoWay
                | State::ExStart
                | State::Exchange
                | State::Loading
                | State::Full,
                Event::TwoWayRcvd,
            ) => {
                // No action required.
                None
            }
            (State::Init, Event::OneWayRcvd) => {
                // No action required.
                None
            }
            // Catch-all wildcard.
            _ => {
                Error::NsmUnexpectedEvent(self.router_id, self.state, event)
                    .log();
                return;
            }
        };

        // Check for FSM state change.
        if let Some(new_state) = new_state
            && new_state != self.state
        {
            self.fsm_state_change(iface, area, instance, new_state);
        }
    }

    fn fsm_state_change(
        &mut self,
        iface: &mut Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
        new_state: State,
    ) {
        // Check for bidirectional communication change.
        if new_state >= State::TwoWay && self.state < State::TwoWay
            || new_state < State::TwoWay && self.state >= State::TwoWay
        {
            // Trigger the NeighborChange event on broadcast/NBMA networks.
            if iface.is_broadcast_or_nbma() {
                instance.tx.protocol_input.ism_event(
                    area.id,
                    iface.id,
                    crate::interface::ism::Event::NbrChange,
                );
            }

            // A 2-Way change affects the relay sets and, with mdr-full
            // LSAs, the advertised neighbor set.
            if iface.is_manet() {
                iface.state.manet.topology_changed = true;
                instance.tx.protocol_input.lsa_orig_event(
                    LsaOriginateEvent::NeighborTwoWayOrHigherChange {
                        area_id: area.id,
                        iface_id: iface.id,
                    },
                );
            }
        }

        // A neighbor falling below Exchange no longer takes part in
        // pushback coverage accounting.
        if new_state < State::Exchange && self.state >= State::Exchange {
            pushback::neighbor_down(iface, self.router_id);
        }

        // Check if the neighbor changed to/from the FULL state.
        if new_state == State::Full || self.state == State::Full {
            // (Re)originate LSAs that might have been affected.
            instance.tx.protocol_input.lsa_orig_event(
                LsaOriginateEvent::NeighborToFromFull {
                    area_id: area.id,
                    iface_id: iface.id,
                },
            );
        }

        // Effectively transition to the new FSM state.
        Debug::NsmTransition(self.router_id, &self.state, &new_state).log();
        self.state = new_state;

        // Update statistics.
        self.event_count += 1;
        self.discontinuity_time = Utc::now();
    }

    pub(crate) fn loading_done_check(
        &mut self,
        iface: &Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) {
        // Check if all pending LSA requests were received.
        if self.lists.ls_request_pending.is_empty() {
            // Stop the LS Request rxmt task.
            self.rxmt_lsreq_stop();

            // Check if there are new LSAs to request.
            if !self.lists.ls_request.is_empty() {
                output::send_lsreq(self, iface, area, instance);
            } else if self.state == nsm::State::Loading {
                // Database loading has completed.
                instance.tx.protocol_input.nsm_event(
                    area.id,
                    iface.id,
                    self.id,
                    nsm::Event::LoadingDone,
                );
            }
        }
    }

    pub(crate) fn reset_adjacency(&mut self) {
        self.options = None;
        self.last_rcvd_dbdesc = None;
        self.last_sent_dbdesc = None;
        self.lists = Default::default();
        self.tasks.dbdesc_free_timer = None;
        self.tasks.rxmt_dbdesc = None;
        self.tasks.rxmt_lsreq = None;
        self.tasks.rxmt_lsupd = None;
    }

    pub(crate) fn dbdesc_is_dup(&self, dbdesc: &crate::packet::DbDesc) -> bool {
        if let Some(last_rcvd_dbdesc) = &self.last_rcvd_dbdesc
            && last_rcvd_dbdesc.options == dbdesc.options
            && last_rcvd_dbdesc.dd_flags == dbdesc.dd_flags
            && last_rcvd_dbdesc.dd_seq_no == dbdesc.dd_seq_no
        {
            return true;
        }

        false
    }

    pub(crate) fn network_id(&self) -> NeighborNetId {
        NeighborNetId(self.router_id)
    }

    // Records a multicast acknowledgement from this neighbor. Older cached
    // instances of the same LSA are superseded.
    pub(crate) fn ack_cache_register(&mut self, lsa_hdr: &LsaHdr) {
        let key = lsa_hdr.key();
        match self.manet.ack_cache.entry(key) {
            std::collections::btree_map::Entry::Occupied(mut o) => {
                if lsa_compare(lsa_hdr, o.get()) == std::cmp::Ordering::Greater
                {
                    o.insert(*lsa_hdr);
                }
            }
            std::collections::btree_map::Entry::Vacant(v) => {
                v.insert(*lsa_hdr);
            }
        }
    }

    // Returns whether the neighbor has acknowledged this exact LSA
    // instance.
    pub(crate) fn ack_cache_lookup(&self, lsa_hdr: &LsaHdr) -> bool {
        self.manet
            .ack_cache
            .get(&lsa_hdr.key())
            .is_some_and(|cached| {
                lsa_compare(lsa_hdr, cached) == std::cmp::Ordering::Equal
            })
    }

    // Drops cached acknowledgements made stale by a newer LSA instance.
    pub(crate) fn ack_cache_update(&mut self, lsa_hdr: &LsaHdr) {
        if let std::collections::btree_map::Entry::Occupied(o) =
            self.manet.ack_cache.entry(lsa_hdr.key())
            && lsa_compare(o.get(), lsa_hdr) == std::cmp::Ordering::Less
        {
            o.remove();
        }
    }

    pub(crate) fn inactivity_timer_start(
        &mut self,
        iface: &Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) {
        let task = tasks::nsm_inactivity_timer(self, iface, area, instance);
        self.tasks.inactivity_timer = Some(task);
    }

    fn inactivity_timer_reset(
        &mut self,
        iface: &Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) {
        if let Some(inactivity_timer) = self.tasks.inactivity_timer.as_mut() {
            inactivity_timer.reset(None);
        } else {
            self.inactivity_timer_start(iface, area, instance);
        }
    }

    pub(crate) fn rxmt_dbdesc_start(
        &mut self,
        iface: &Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) {
        let msg = RxmtIntervalMsg {
            area_key: area.id.into(),
            iface_key: iface.id.into(),
            nbr_key: self.id.into(),
            packet_type: RxmtPacketType::DbDesc,
        };

        let task = tasks::packet_rxmt_interval(iface, msg, instance);
        self.tasks.rxmt_dbdesc = Some(task);
    }

    pub(crate) fn rxmt_dbdesc_stop(&mut self) {
        self.tasks.rxmt_dbdesc = None;
    }

    pub(crate) fn rxmt_lsreq_start(
        &mut self,
        iface: &Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) {
        let msg = RxmtIntervalMsg {
            area_key: area.id.into(),
            iface_key: iface.id.into(),
            nbr_key: self.id.into(),
            packet_type: RxmtPacketType::LsRequest,
        };

        let task = tasks::packet_rxmt_interval(iface, msg, instance);
        self.tasks.rxmt_lsreq = Some(task);
    }

    fn rxmt_lsreq_stop(&mut self) {
        self.tasks.rxmt_lsreq = None;
    }

    pub(crate) fn rxmt_lsupd_start_check(
        &mut self,
        iface: &Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) {
        if !self.lists.ls_rxmt.is_empty() && self.tasks.rxmt_lsupd.is_none() {
            let msg = RxmtIntervalMsg {
                area_key: area.id.into(),
                iface_key: iface.id.into(),
                nbr_key: self.id.into(),
                packet_type: RxmtPacketType::LsUpdate,
            };
            let task = tasks::packet_rxmt_interval(iface, msg, instance);
            self.tasks.rxmt_lsupd = Some(task);
        }
    }

    // Restarts the LS Update retransmission timer, postponing the next
    // retransmission by a full RxmtInterval.
    pub(crate) fn rxmt_lsupd_restart(
        &mut self,
        iface: &Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) {
        self.tasks.rxmt_lsupd = None;
        self.rxmt_lsupd_start_check(iface, area, instance);
    }

    pub(crate) fn rxmt_lsupd_stop_check(&mut self) {
        if self.lists.ls_rxmt.is_empty() && self.tasks.rxmt_lsupd.is_some() {
            self.tasks.rxmt_lsupd = None;
        }
    }
}

impl Drop for Neighbor {
    fn drop(&mut self) {
        Debug::NeighborDelete(self.router_id).log();
    }
}

// ===== impl NeighborNetId =====

impl NeighborNetId {
    pub(crate) fn get(&self) -> Ipv4Addr {
        self.0
    }
}

impl std::fmt::Display for NeighborNetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Ipv4Addr> for NeighborNetId {
    fn from(addr: Ipv4Addr) -> NeighborNetId {
        NeighborNetId(addr)
    }
}
