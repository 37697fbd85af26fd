//
// Copyright (c) The ospf6-manet Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::time::Instant;

use bitflags::bitflags;
use chrono::{DateTime, Utc};
use ipnetwork::Ipv6Network;
use ism::{Event, State};
use ospf6_manet_utils::socket::{AsyncFd, Socket};
use ospf6_manet_utils::task::{IntervalTask, Task, TimeoutTask};
use ospf6_manet_utils::UnboundedSender;
use serde::{Deserialize, Serialize};
use smallvec::smallvec;
use tokio::sync::mpsc;

use crate::area::{Area, OptionsLocation};
use crate::collections::{Arena, InterfaceId, Lsdb, Neighbors};
use crate::debug::{Debug, InterfaceInactiveReason};
use crate::error::{Error, IoError};
use crate::instance::InstanceUpView;
use crate::lsdb::{LsaEntry, LsaOriginateEvent};
use crate::neighbor::{Neighbor, NeighborNetId, nsm};
use crate::network::{self, MulticastAddr};
use crate::packet::lls::{
    HelloSeqTlv, LlsHelloData, MdrPairTlv, RelayTlv, ScsTlv,
};
use crate::packet::lsa::{Lsa, LsaHdr, LsaKey};
use crate::packet::{Hello, Options, Packet, PacketHdr, PacketType};
use crate::pushback::PushbackLsa;
use crate::tasks;
use crate::tasks::messages::output::NetTxPacketMsg;

#[derive(Debug)]
pub struct Interface {
    pub id: InterfaceId,
    pub name: String,
    pub system: InterfaceSys,
    pub config: InterfaceCfg,
    pub state: InterfaceState,
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct InterfaceFlags: u8 {
        const OPERATIVE = 0x01;
        const LOOPBACK = 0x02;
    }
}

#[derive(Debug, Default)]
pub struct InterfaceSys {
    // Interface flags.
    pub flags: InterfaceFlags,
    // Interface ifindex.
    pub ifindex: Option<u32>,
    // Interface MTU.
    pub mtu: Option<u16>,
    // Link bandwidth, in bits per second.
    pub bandwidth: Option<u64>,
    // List of global addresses associated with this interface.
    pub addr_list: BTreeSet<Ipv6Network>,
    // Link-local address.
    pub linklocal_addr: Option<Ipv6Network>,
}

// Interface configuration.
//
// All recognised knobs from the configuration surface; unset timers take
// the standard defaults.
#[derive(Debug)]
pub struct InterfaceCfg {
    pub enabled: bool,
    pub if_type: InterfaceType,
    // Explicit metric; when unset the cost is derived from the link
    // bandwidth and the instance's reference bandwidth.
    pub cost: Option<u16>,
    pub mtu_ignore: bool,
    // Configured MTU cap, bounded by the link MTU.
    pub ifmtu: Option<u16>,
    pub hello_interval: u16,
    pub dead_interval: u16,
    pub retransmit_interval: u16,
    pub transmit_delay: u16,
    pub priority: u8,
    pub passive: bool,
    pub instance_id: u8,
    pub static_nbrs: BTreeMap<Ipv6Addr, StaticNbr>,
    // MANET parameters.
    pub flooding: FloodingMode,
    pub adj_connectivity: AdjConnectivity,
    pub lsa_fullness: LsaFullness,
    // Pushback interval, in milliseconds.
    pub pushback_interval: u32,
    // Ack coalescing interval, in milliseconds.
    pub ack_interval: u32,
    pub mdr_constraint: u16,
    pub non_persistent_mdr: bool,
    pub smart_peering: bool,
    pub willingness: u8,
}

// Statically configured neighbor (NBMA).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StaticNbr {
    pub priority: u8,
    pub poll_interval: u16,
}

#[derive(Debug)]
pub struct InterfaceState {
    // ISM state.
    pub ism_state: State,
    // Raw socket and Tx/Rx tasks.
    pub net: Option<InterfaceNet>,
    // Source address used when sending packets.
    pub src_addr: Option<Ipv6Addr>,
    // Joined multicast groups.
    pub mcast_groups: HashSet<MulticastAddr>,
    // The network DR/BDR.
    pub dr: Option<NeighborNetId>,
    pub bdr: Option<NeighborNetId>,
    // List of neighbors attached to this interface.
    pub neighbors: Neighbors,
    // List of LSAs enqueued for transmission.
    pub ls_update_list: BTreeMap<LsaKey, Arc<Lsa>>,
    // List of pending delayed Acks.
    pub ls_ack_list: BTreeMap<LsaKey, LsaHdr>,
    // Statistics.
    pub event_count: u32,
    pub discontinuity_time: DateTime<Utc>,
    // LSDB of link-scope LSAs.
    pub lsdb: Lsdb,
    pub network_lsa_self: Option<LsaKey>,
    // MANET state.
    pub manet: InterfaceManetState,
    // Tasks.
    pub tasks: InterfaceTasks,
}

// MANET relay state.
#[derive(Debug, Default)]
pub struct InterfaceManetState {
    // MDR election results.
    pub mdr: MdrState,
    // Active overlapping relays (MPR-SDCDS).
    pub relays: BTreeMap<Ipv4Addr, Relay>,
    // Neighbors that selected the local router as relay.
    pub relay_selectors: BTreeMap<Ipv4Addr, Instant>,
    // State Check Sequence advertised in differential Hellos.
    pub scs: u16,
    pub increment_scs: bool,
    // Hello sequence number.
    pub hello_seq: u16,
    // LSAs held back from reflooding, keyed by LSA identity.
    pub pushback: BTreeMap<LsaKey, PushbackLsa>,
    // The 2-hop topology changed since the last relay computation.
    pub topology_changed: bool,
}

#[derive(Debug, Default)]
pub struct MdrState {
    pub level: MdrLevel,
    pub parent: Option<Ipv4Addr>,
    pub bparent: Option<Ipv4Addr>,
}

// Active overlapping relay (MPR-SDCDS).
#[derive(Debug)]
pub struct Relay {
    pub active: bool,
    pub newly_activated: bool,
    pub dropped: bool,
    pub drop_time: Option<Instant>,
}

#[derive(Debug)]
pub struct InterfaceNet {
    // Raw socket.
    pub socket: Arc<AsyncFd<Socket>>,
    // Network Tx/Rx tasks.
    _net_tx_task: Task<()>,
    _net_rx_task: Task<()>,
    // Network Tx output channel.
    pub net_tx_packetp: UnboundedSender<NetTxPacketMsg>,
}

#[derive(Debug, Default)]
pub struct InterfaceTasks {
    // ISM Hello Tx interval task.
    pub hello_interval: Option<IntervalTask>,
    // NBMA poll interval tasks.
    pub nbma_poll_interval: HashMap<Ipv6Addr, IntervalTask>,
    // ISM WaitTimer task.
    pub wait_timer: Option<TimeoutTask>,
    // LS Update timer task.
    pub ls_update_timer: Option<TimeoutTask>,
    // Delayed Ack task.
    pub ls_delayed_ack: Option<TimeoutTask>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InterfaceType {
    Broadcast,
    NonBroadcast,
    PointToMultipoint,
    PointToPoint,
    Manet,
}

// MANET relay-reduction algorithm.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum FloodingMode {
    #[default]
    Classic,
    MprSdcds,
    MdrSicds,
}

// Number of disjoint adjacency paths to maintain towards the MDR backbone.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum AdjConnectivity {
    Uniconnected,
    Biconnected,
    #[default]
    Full,
}

// Which neighbors the self-originated Router-LSA describes.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum LsaFullness {
    #[default]
    Full,
    MinCost,
    MinCostTwoPaths,
    MdrFull,
}

// MDR level of a router.
#[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum MdrLevel {
    #[default]
    Other,
    Bmdr,
    Mdr,
}

#[derive(Clone, Copy, Debug)]
struct DrCandidate {
    router_id: Ipv4Addr,
    net_id: NeighborNetId,
    dr: Option<NeighborNetId>,
    bdr: Option<NeighborNetId>,
    priority: u8,
}

// Interface state machine.
pub mod ism {
    use serde::{Deserialize, Serialize};

    use crate::debug::InterfaceInactiveReason;

    #[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
    #[derive(Deserialize, Serialize)]
    pub enum State {
        #[default]
        Down,
        Loopback,
        Waiting,
        PointToPoint,
        DrOther,
        Backup,
        Dr,
    }

    #[derive(Debug, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    pub enum Event {
        InterfaceUp,
        WaitTimer,
        BackupSeen,
        NbrChange,
        LoopInd,
        UnloopInd,
        InterfaceDown(InterfaceInactiveReason),
    }
}

// ===== impl Interface =====

impl Interface {
    pub(crate) fn new(id: InterfaceId, name: String) -> Interface {
        Debug::InterfaceCreate(&name).log();

        Interface {
            id,
            name,
            system: InterfaceSys::default(),
            config: InterfaceCfg::default(),
            state: InterfaceState::default(),
        }
    }

    // Checks if the interface needs to be started or stopped in response to
    // a configuration or system event.
    pub(crate) fn update(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        neighbors: &mut Arena<Neighbor>,
        lsa_entries: &Arena<LsaEntry>,
    ) {
        // Check next ISM event to invoke, but only if necessary.
        let event = match self.is_ready() {
            Ok(_) => {
                let ism_state = self.state.ism_state;
                if self.system.flags.contains(InterfaceFlags::LOOPBACK) {
                    if ism_state == State::Loopback {
                        return;
                    }
                    Event::LoopInd
                } else if ism_state == State::Loopback {
                    Event::UnloopInd
                } else if ism_state == State::Down {
                    Event::InterfaceUp
                } else {
                    return;
                }
            }
            Err(reason) if !self.is_down() => Event::InterfaceDown(reason),
            _ => return,
        };

        // Invoke ISM event.
        self.fsm(area, instance, neighbors, lsa_entries, event);
    }

    // Returns whether the interface is ready for OSPF operation.
    fn is_ready(&self) -> Result<(), InterfaceInactiveReason> {
        if !self.config.enabled {
            return Err(InterfaceInactiveReason::AdminDown);
        }

        if !self.system.flags.contains(InterfaceFlags::OPERATIVE) {
            return Err(InterfaceInactiveReason::OperationalDown);
        }

        if self.system.ifindex.is_none() {
            return Err(InterfaceInactiveReason::MissingIfindex);
        }

        if self.system.mtu.is_none() {
            return Err(InterfaceInactiveReason::MissingMtu);
        }

        if !self.system.flags.contains(InterfaceFlags::LOOPBACK)
            && self.system.linklocal_addr.is_none()
        {
            return Err(InterfaceInactiveReason::MissingLinkLocalAddress);
        }

        Ok(())
    }

    fn start(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        neighbors: &Arena<Neighbor>,
    ) -> State {
        Debug::InterfaceStart(&self.name).log();

        // Initialize source address.
        self.state.src_addr =
            self.system.linklocal_addr.map(|addr| addr.ip());

        if !self.is_passive() {
            // Start network Tx/Rx tasks.
            match InterfaceNet::new(self, area, instance) {
                Ok(net) => self.state.net = Some(net),
                Err(error) => {
                    let ifname = self.name.clone();
                    Error::InterfaceStartError(ifname, error).log();
                    return State::Down;
                }
            }

            // Start Hello Tx task.
            self.hello_interval_start(area, instance);
        }

        // Get new ISM state.
        let new_ism_state = match self.config.if_type {
            InterfaceType::PointToPoint
            | InterfaceType::PointToMultipoint
            | InterfaceType::Manet => State::PointToPoint,
            InterfaceType::Broadcast | InterfaceType::NonBroadcast => {
                if self.config.priority == 0 {
                    State::DrOther
                } else {
                    State::Waiting
                }
            }
        };

        if new_ism_state == State::Waiting {
            // Start wait timer.
            let task = tasks::ism_wait_timer(self, area, instance);
            self.state.tasks.wait_timer = Some(task);

            if self.config.if_type == InterfaceType::NonBroadcast {
                // Examine the configured list of neighbors for this
                // interface and generate the neighbor event Start for each
                // neighbor that is also eligible to become Designated
                // Router.
                for nbr in self
                    .config
                    .static_nbrs
                    .iter()
                    .filter(|(_, snbr)| snbr.priority != 0)
                    .filter_map(|(addr, _)| {
                        self.state
                            .neighbors
                            .iter(neighbors)
                            .find(|nbr| nbr.src == *addr)
                    })
                {
                    instance.tx.protocol_input.nsm_event(
                        area.id,
                        self.id,
                        nbr.id,
                        nsm::Event::Start,
                    );
                }
            }
        }

        new_ism_state
    }

    // Stop interface if it's active.
    fn stop(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        neighbors: &mut Arena<Neighbor>,
        lsa_entries: &Arena<LsaEntry>,
        reason: InterfaceInactiveReason,
    ) {
        if self.is_down() {
            return;
        }

        Debug::InterfaceStop(&self.name, reason).log();

        // Kill all neighbors.
        let event = match reason {
            InterfaceInactiveReason::OperationalDown
            | InterfaceInactiveReason::MissingIfindex
            | InterfaceInactiveReason::MissingMtu
            | InterfaceInactiveReason::MissingLinkLocalAddress => {
                nsm::Event::LinkDown
            }
            _ => nsm::Event::Kill,
        };
        for nbr_idx in self.state.neighbors.indexes().collect::<Vec<_>>() {
            let nbr = &mut neighbors[nbr_idx];
            nbr.fsm(self, area, instance, lsa_entries, event);
            self.state.neighbors.delete(neighbors, nbr_idx);
        }

        // Reset interface state.
        self.state.net = None;
        self.state.src_addr = None;
        self.state.mcast_groups = Default::default();
        self.state.dr = None;
        self.state.bdr = None;
        self.state.neighbors = Default::default();
        self.state.ls_update_list = Default::default();
        self.state.ls_ack_list = Default::default();
        self.state.manet = Default::default();
        // NOTE: the interface LSDB should be preserved.
        self.state.tasks = Default::default();
    }

    // Restart the Hello Tx task.
    pub(crate) fn sync_hello_tx(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) {
        if !self.is_passive() && self.state.ism_state >= ism::State::Waiting {
            self.hello_interval_start(area, instance);
        }
    }

    pub(crate) fn is_down(&self) -> bool {
        self.state.ism_state == State::Down
    }

    pub(crate) fn is_passive(&self) -> bool {
        self.system.flags.contains(InterfaceFlags::LOOPBACK)
            || self.config.passive
    }

    pub(crate) fn is_dr_or_backup(&self) -> bool {
        matches!(self.state.ism_state, State::Dr | State::Backup)
    }

    pub(crate) fn is_broadcast_or_nbma(&self) -> bool {
        matches!(
            self.config.if_type,
            InterfaceType::Broadcast | InterfaceType::NonBroadcast
        )
    }

    pub(crate) fn is_manet(&self) -> bool {
        self.config.if_type == InterfaceType::Manet
    }

    // Returns the interface output cost: the configured metric, or
    // reference-bandwidth / link-bandwidth when only the latter is known.
    pub(crate) fn cost(&self, instance: &InstanceUpView<'_>) -> u16 {
        const DFLT_COST: u16 = 10;

        if let Some(cost) = self.config.cost {
            return cost;
        }
        match self.system.bandwidth {
            Some(bw) if bw > 0 => {
                let cost = instance.config.reference_bandwidth / bw;
                cost.clamp(1, u16::MAX as u64) as u16
            }
            _ => DFLT_COST,
        }
    }

    pub(crate) fn fsm(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        neighbors: &mut Arena<Neighbor>,
        lsa_entries: &Arena<LsaEntry>,
        event: Event,
    ) {
        Debug::IsmEvent(&self.name, &self.state.ism_state, &event).log();

        let new_ism_state = match (self.state.ism_state, &event) {
            (State::Down, Event::InterfaceUp) => {
                // Start interface.
                self.start(area, instance, neighbors)
            }
            (State::Waiting, Event::NbrChange) => {
                // This is an unspecified event but it can happen during
                // normal operation, so ignore it gracefully instead of
                // logging an error.
                return;
            }
            (State::Waiting, Event::BackupSeen | Event::WaitTimer) => {
                self.state.tasks.wait_timer = None;

                // Run DR election.
                self.dr_election(area, instance, neighbors)
            }
            (State::DrOther | State::Backup | State::Dr, Event::NbrChange) => {
                // Run DR election.
                self.dr_election(area, instance, neighbors)
            }
            (_, Event::InterfaceDown(reason)) => {
                // Stop interface.
                self.stop(area, instance, neighbors, lsa_entries, *reason);
                State::Down
            }
            (_, Event::LoopInd) => {
                // Stop interface.
                self.stop(
                    area,
                    instance,
                    neighbors,
                    lsa_entries,
                    InterfaceInactiveReason::LoopedBack,
                );
                State::Loopback
            }
            (State::Loopback, Event::UnloopInd) => {
                // No actions are necessary.
                State::Down
            }
            _ => {
                Error::IsmUnexpectedEvent(self.state.ism_state, event).log();
                return;
            }
        };

        // Check for FSM state change.
        if new_ism_state != self.state.ism_state {
            self.fsm_state_change(area, instance, new_ism_state);
        }
    }

    fn fsm_state_change(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        new_ism_state: State,
    ) {
        // (Re)originate LSAs that might have been affected.
        instance.tx.protocol_input.lsa_orig_event(
            LsaOriginateEvent::InterfaceStateChange {
                area_id: area.id,
                iface_id: self.id,
            },
        );
        if self.state.ism_state == ism::State::Dr {
            instance.tx.protocol_input.lsa_orig_event(
                LsaOriginateEvent::InterfaceDrChange {
                    area_id: area.id,
                    iface_id: self.id,
                },
            );
        }

        // Effectively transition to the new FSM state.
        Debug::IsmTransition(
            &self.name,
            &self.state.ism_state,
            &new_ism_state,
        )
        .log();
        self.state.ism_state = new_ism_state;

        // Join or leave OSPF multicast groups as necessary.
        self.update_mcast_groups();

        // Update statistics.
        self.state.event_count += 1;
        self.state.discontinuity_time = Utc::now();
    }

    pub(crate) fn hello_interval_start(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) {
        let interval = self.config.hello_interval;
        let task = tasks::hello_interval(self, area, instance, interval);
        self.state.tasks.hello_interval = Some(task);
    }

    // Returns the destinations of outgoing Hello packets.
    pub(crate) fn hello_destination(
        &self,
        neighbors: &Arena<Neighbor>,
    ) -> network::SendDestination {
        let ifindex = self.system.ifindex.unwrap_or(0);
        let addrs = match self.config.if_type {
            InterfaceType::PointToPoint
            | InterfaceType::Broadcast
            | InterfaceType::Manet => {
                smallvec![*network::multicast_addr(MulticastAddr::AllSpfRtrs)]
            }
            InterfaceType::NonBroadcast | InterfaceType::PointToMultipoint => {
                // Hello packets go unicast to the configured neighbors,
                // plus any dynamically discovered ones.
                self.config
                    .static_nbrs
                    .keys()
                    .copied()
                    .chain(
                        self.state
                            .neighbors
                            .iter(neighbors)
                            .map(|nbr| nbr.src),
                    )
                    .collect()
            }
        };
        network::SendDestination::new(ifindex, addrs)
    }

    pub(crate) fn nbma_poll_interval_start(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        addr: Ipv6Addr,
        poll_interval: u16,
    ) {
        let task = tasks::hello_interval(self, area, instance, poll_interval);
        self.state.tasks.nbma_poll_interval.insert(addr, task);
    }

    pub(crate) fn nbma_poll_interval_stop(&mut self, addr: Ipv6Addr) {
        self.state.tasks.nbma_poll_interval.remove(&addr);
    }

    fn update_mcast_groups(&mut self) {
        let socket = match &self.state.net {
            Some(net) => net.socket.get_ref(),
            None => return,
        };

        // AllSPFRouters.
        if self.state.ism_state >= State::Waiting
            && !self.state.mcast_groups.contains(&MulticastAddr::AllSpfRtrs)
        {
            self.system.join_multicast(socket, MulticastAddr::AllSpfRtrs);
            self.state.mcast_groups.insert(MulticastAddr::AllSpfRtrs);
        } else if self.state.ism_state < State::Waiting
            && self.state.mcast_groups.contains(&MulticastAddr::AllSpfRtrs)
        {
            self.system
                .leave_multicast(socket, MulticastAddr::AllSpfRtrs);
            self.state.mcast_groups.remove(&MulticastAddr::AllSpfRtrs);
        }

        // AllDRouters.
        if self.is_dr_or_backup()
            && !self.state.mcast_groups.contains(&MulticastAddr::AllDrRtrs)
        {
            self.system.join_multicast(socket, MulticastAddr::AllDrRtrs);
            self.state.mcast_groups.insert(MulticastAddr::AllDrRtrs);
        } else if !self.is_dr_or_backup()
            && self.state.mcast_groups.contains(&MulticastAddr::AllDrRtrs)
        {
            self.system
                .leave_multicast(socket, MulticastAddr::AllDrRtrs);
            self.state.mcast_groups.remove(&MulticastAddr::AllDrRtrs);
        }
    }

    fn dr_election(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        neighbors: &Arena<Neighbor>,
    ) -> State {
        let router_id = instance.state.router_id;
        let net_id = NeighborNetId::from(router_id);

        // Step 1: note the current values for the network's Designated
        // Router and Backup Designated Router.
        let old_dr = self.state.dr;
        let old_bdr = self.state.bdr;

        // Step 2: calculate the new Backup Designated Router.
        let calc_bdr = |iface: &Interface| {
            iface
                .dr_eligible_routers(router_id, net_id, neighbors)
                .filter(|rtr| rtr.dr != Some(rtr.net_id))
                .filter(|rtr| rtr.bdr == Some(rtr.net_id))
                .max_by_key(|rtr| (rtr.priority, rtr.router_id))
                .or_else(|| {
                    iface
                        .dr_eligible_routers(router_id, net_id, neighbors)
                        .filter(|rtr| rtr.dr != Some(rtr.net_id))
                        .max_by_key(|rtr| (rtr.priority, rtr.router_id))
                })
                .map(|rtr| rtr.net_id)
        };
        let mut new_bdr = calc_bdr(self);

        // Step 3: calculate the new Designated Router.
        let calc_dr = |iface: &Interface, new_bdr: &Option<NeighborNetId>| {
            iface
                .dr_eligible_routers(router_id, net_id, neighbors)
                .filter(|rtr| rtr.dr == Some(rtr.net_id))
                .max_by_key(|rtr| (rtr.priority, rtr.router_id))
                .map(|rtr| rtr.net_id)
                .or(*new_bdr)
        };
        let mut new_dr = calc_dr(self, &new_bdr);
        self.state.dr = new_dr;
        self.state.bdr = new_bdr;

        // Step 4: check if the router is the new DR/BDR or no longer the
        // DR/BDR.
        if (new_dr == Some(net_id) || old_dr == Some(net_id))
            && new_dr != old_dr
            || (new_bdr == Some(net_id) || old_bdr == Some(net_id))
                && new_bdr != old_bdr
        {
            // Repeat steps 2 and 3.
            new_bdr = calc_bdr(self);
            new_dr = calc_dr(self, &new_bdr);
            self.state.dr = new_dr;
            self.state.bdr = new_bdr;
        }

        // Step 5: set the interface state accordingly.
        Debug::IsmDrElection(&self.name, old_dr, new_dr, old_bdr, new_bdr)
            .log();
        let next_state = if new_dr == Some(net_id) {
            ism::State::Dr
        } else if new_bdr == Some(net_id) {
            ism::State::Backup
        } else {
            ism::State::DrOther
        };

        // Step 6: if the attached network is an NBMA network, and the
        // router itself has just become either DR or BDR, it must start
        // sending Hello Packets to those neighbors that are not eligible
        // to become DR.
        if self.config.if_type == InterfaceType::NonBroadcast
            && matches!(next_state, ism::State::Dr | ism::State::Backup)
        {
            for nbr in self
                .config
                .static_nbrs
                .iter()
                .filter(|(_, snbr)| snbr.priority == 0)
                .filter_map(|(addr, _)| {
                    self.state
                        .neighbors
                        .iter(neighbors)
                        .find(|nbr| nbr.src == *addr)
                })
            {
                instance.tx.protocol_input.nsm_event(
                    area.id,
                    self.id,
                    nbr.id,
                    nsm::Event::Start,
                );
            }
        }

        // Step 7: if the DR or BDR changes, invoke the AdjOk? event on all
        // neighbors whose state is at least 2-Way.
        if new_dr != old_dr || new_bdr != old_bdr {
            for nbr in self
                .state
                .neighbors
                .iter(neighbors)
                .filter(|nbr| nbr.state >= nsm::State::TwoWay)
            {
                instance.tx.protocol_input.nsm_event(
                    area.id,
                    self.id,
                    nbr.id,
                    nsm::Event::AdjOk,
                );
            }

            // Synchronize interface's Hello Tx task (updated DR and/or
            // BDR).
            self.sync_hello_tx(area, instance);
        }

        // If the DR changed, reoriginate LSAs that might have been
        // affected.
        if new_dr != old_dr {
            instance.tx.protocol_input.lsa_orig_event(
                LsaOriginateEvent::InterfaceDrChange {
                    area_id: area.id,
                    iface_id: self.id,
                },
            );
        }

        next_state
    }

    fn dr_eligible_routers<'a>(
        &'a self,
        router_id: Ipv4Addr,
        net_id: NeighborNetId,
        neighbors: &'a Arena<Neighbor>,
    ) -> impl Iterator<Item = DrCandidate> + 'a {
        let myself = (self.config.priority != 0).then_some(DrCandidate {
            router_id,
            net_id,
            dr: self.state.dr,
            bdr: self.state.bdr,
            priority: self.config.priority,
        });

        let nbrs = self
            .state
            .neighbors
            .iter(neighbors)
            .filter(|nbr| nbr.state >= nsm::State::TwoWay)
            .filter(|nbr| nbr.priority != 0)
            .map(|nbr| DrCandidate {
                router_id: nbr.router_id,
                net_id: nbr.network_id(),
                dr: nbr.dr,
                bdr: nbr.bdr,
                priority: nbr.priority,
            });

        myself.into_iter().chain(nbrs)
    }

    // RFC 2328 section 10.4, as modified by the MANET extensions.
    pub(crate) fn need_adjacency(&self, area: &Area, nbr: &Neighbor) -> bool {
        match self.config.if_type {
            InterfaceType::PointToPoint | InterfaceType::PointToMultipoint => {
                true
            }
            InterfaceType::Broadcast | InterfaceType::NonBroadcast => {
                let nbr_net_id = nbr.network_id();
                self.state.ism_state == State::Dr
                    || self.state.ism_state == State::Backup
                    || self.state.dr == Some(nbr_net_id)
                    || self.state.bdr == Some(nbr_net_id)
            }
            InterfaceType::Manet => match self.config.flooding {
                FloodingMode::MdrSicds
                    if self.config.adj_connectivity
                        != AdjConnectivity::Full =>
                {
                    let mdr = &self.state.manet.mdr;

                    // Adjacencies form between MDR-level pairs where one
                    // selected the other as dependent.
                    if mdr.level >= MdrLevel::Bmdr
                        && nbr.manet.mdr_level >= MdrLevel::Bmdr
                        && (nbr.manet.dependent || nbr.manet.dependent_selector)
                    {
                        return true;
                    }

                    // Form adjacency between child and parent. The
                    // condition must be symmetric: child and parent must
                    // agree.
                    if mdr.level >= MdrLevel::Bmdr && nbr.manet.child {
                        return true;
                    }

                    if nbr.manet.mdr_level >= MdrLevel::Bmdr
                        && (mdr.parent == Some(nbr.router_id)
                            || mdr.bparent == Some(nbr.router_id))
                    {
                        return true;
                    }

                    false
                }
                FloodingMode::MprSdcds if self.config.smart_peering => {
                    // Adjacency is needed only when the synchronization SPF
                    // table offers no path to the peer yet.
                    !area.state.spf_sync_reachable.contains(&nbr.router_id)
                }
                _ => true,
            },
        }
    }

    // Decides whether an existing adjacency should be kept. The condition
    // is less strict than `need_adjacency` for hysteresis and adjacency
    // stability.
    pub(crate) fn keep_adjacency(&self, nbr: &Neighbor) -> bool {
        match self.config.if_type {
            InterfaceType::Manet => match self.config.flooding {
                FloodingMode::MdrSicds => {
                    self.config.adj_connectivity == AdjConnectivity::Full
                        || self.state.manet.mdr.level >= MdrLevel::Bmdr
                        || nbr.manet.mdr_level >= MdrLevel::Bmdr
                }
                _ => true,
            },
            InterfaceType::PointToPoint | InterfaceType::PointToMultipoint => {
                true
            }
            InterfaceType::Broadcast | InterfaceType::NonBroadcast => {
                let nbr_net_id = nbr.network_id();
                self.state.ism_state == State::Dr
                    || self.state.ism_state == State::Backup
                    || self.state.dr == Some(nbr_net_id)
                    || self.state.bdr == Some(nbr_net_id)
            }
        }
    }

    // Generates an OSPF Hello message, including the MANET LLS block when a
    // relay-reduction algorithm is active.
    pub(crate) fn generate_hello(
        &self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        neighbors: &Arena<Neighbor>,
    ) -> Packet {
        let lls = match (self.config.if_type, self.config.flooding) {
            (InterfaceType::Manet, FloodingMode::MprSdcds) => {
                let relays: Vec<_> = self
                    .state
                    .manet
                    .relays
                    .iter()
                    .filter(|(_, relay)| relay.active || relay.dropped)
                    .map(|(router_id, _)| *router_id)
                    .collect();
                let added = self
                    .state
                    .manet
                    .relays
                    .values()
                    .filter(|relay| relay.newly_activated)
                    .count() as u8;

                Some(LlsHelloData {
                    scs: Some(ScsTlv {
                        number: self.state.manet.scs,
                        flags: Default::default(),
                    }),
                    relay: Some(RelayTlv {
                        added,
                        flags: Default::default(),
                        relays,
                    }),
                    willingness: Some(self.config.willingness),
                    ..Default::default()
                })
            }
            (InterfaceType::Manet, FloodingMode::MdrSicds) => {
                let heard = self
                    .state
                    .neighbors
                    .iter(neighbors)
                    .filter(|nbr| nbr.state == nsm::State::Init)
                    .map(|nbr| nbr.router_id)
                    .collect();
                let reported = self
                    .state
                    .neighbors
                    .iter(neighbors)
                    .filter(|nbr| nbr.state >= nsm::State::TwoWay)
                    .map(|nbr| nbr.router_id)
                    .collect();
                let dependent = self
                    .state
                    .neighbors
                    .iter(neighbors)
                    .filter(|nbr| nbr.manet.dependent)
                    .map(|nbr| nbr.router_id)
                    .collect();
                // An MDR advertises itself in the parent slot, a BMDR in
                // the backup slot; everyone else advertises its selected
                // parents so they learn of the child relationship.
                let mdr = &self.state.manet.mdr;
                let router_id = instance.state.router_id;
                let (parent, bparent) = match mdr.level {
                    MdrLevel::Mdr => (
                        router_id,
                        mdr.parent.unwrap_or(Ipv4Addr::UNSPECIFIED),
                    ),
                    MdrLevel::Bmdr => (
                        mdr.parent.unwrap_or(Ipv4Addr::UNSPECIFIED),
                        router_id,
                    ),
                    MdrLevel::Other => (
                        mdr.parent.unwrap_or(Ipv4Addr::UNSPECIFIED),
                        mdr.bparent.unwrap_or(Ipv4Addr::UNSPECIFIED),
                    ),
                };

                Some(LlsHelloData {
                    heard,
                    reported,
                    dependent,
                    hello_seq: Some(HelloSeqTlv {
                        number: self.state.manet.hello_seq,
                    }),
                    mdr: Some(MdrPairTlv { parent, bparent }),
                    ..Default::default()
                })
            }
            _ => None,
        };

        let hdr = PacketHdr {
            pkt_type: PacketType::Hello,
            router_id: instance.state.router_id,
            area_id: area.area_id,
            instance_id: self.config.instance_id,
        };

        let mut options = area.options(
            instance,
            OptionsLocation::Packet {
                pkt_type: PacketType::Hello,
            },
        );
        if lls.is_some() {
            options.insert(Options::L);
        }

        Packet::Hello(Hello {
            hdr,
            iface_id: self.system.ifindex.unwrap_or(0),
            priority: self.config.priority,
            options,
            hello_interval: self.config.hello_interval,
            dead_interval: self.config.dead_interval,
            dr: self.state.dr,
            bdr: self.state.bdr,
            neighbors: self.state.neighbors.router_ids().collect(),
            lls,
        })
    }

    // Validates the destination of the received packet.
    pub(crate) fn validate_packet_dst(&self, dst: Ipv6Addr) -> Result<(), Error> {
        // Check if the destination matches one of the interface unicast
        // addresses.
        if self.state.src_addr == Some(dst)
            || self.system.addr_list.iter().any(|addr| addr.ip() == dst)
        {
            return Ok(());
        }

        // Check if the destination matches AllSPFRouters.
        if dst == *network::multicast_addr(MulticastAddr::AllSpfRtrs) {
            return Ok(());
        }

        // Packets whose IP destination is AllDRouters should only be
        // accepted if the state of the receiving interface is DR or
        // Backup.
        if dst == *network::multicast_addr(MulticastAddr::AllDrRtrs)
            && self.is_dr_or_backup()
        {
            return Ok(());
        }

        Err(Error::InvalidDstAddr(dst))
    }

    // Validates the source of the received packet.
    pub(crate) fn validate_packet_src(&self, src: Ipv6Addr) -> Result<(), Error> {
        use ospf6_manet_utils::ip::Ipv6AddrExt;

        if !src.is_usable() {
            return Err(Error::InvalidSrcAddr(src));
        }

        Ok(())
    }

    // Returns the maximum packet size that can be sent on this interface.
    pub(crate) fn max_packet_size(&self) -> u16 {
        const IPV6_HDR_SIZE: u16 = 40;

        let link_mtu = self.system.mtu.unwrap_or(1280);
        let mtu = match self.config.ifmtu {
            Some(ifmtu) => std::cmp::min(ifmtu, link_mtu),
            None => link_mtu,
        };

        mtu - IPV6_HDR_SIZE
    }

    pub(crate) fn enqueue_ls_update(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        lsa_key: LsaKey,
        lsa: Arc<Lsa>,
    ) {
        self.state.ls_update_list.insert(lsa_key, lsa);

        // Start LS Update timeout if necessary.
        if self.state.tasks.ls_update_timer.is_none() {
            let task = tasks::ls_update_timer(self, area, instance);
            self.state.tasks.ls_update_timer = Some(task);
        }
    }

    pub(crate) fn enqueue_delayed_ack(
        &mut self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        lsa_hdr: &LsaHdr,
    ) {
        self.state.ls_ack_list.insert(lsa_hdr.key(), *lsa_hdr);

        // Start delayed LS Ack timeout if necessary. MANET interfaces
        // coalesce acknowledgments for AckInterval.
        if self.state.tasks.ls_delayed_ack.is_none() {
            let task = tasks::delayed_ack_timer(self, area, instance);
            self.state.tasks.ls_delayed_ack = Some(task);
        }
    }

    pub(crate) fn send_packet(&self, msg: NetTxPacketMsg) {
        let _ = self.state.net.as_ref().unwrap().net_tx_packetp.send(msg);
    }
}

impl Drop for Interface {
    fn drop(&mut self) {
        Debug::InterfaceDelete(&self.name).log();
    }
}

// ===== impl InterfaceSys =====

impl InterfaceSys {
    // Check if the interface shares a subnet with the given IP address.
    pub(crate) fn contains_addr(&self, addr: &Ipv6Addr) -> bool {
        self.addr_list.iter().any(|local| local.contains(*addr))
    }

    fn join_multicast(&self, socket: &Socket, addr: MulticastAddr) {
        #[cfg(not(feature = "testing"))]
        if let Err(error) =
            network::join_multicast(socket, addr, self.ifindex.unwrap())
        {
            IoError::MulticastJoinError(addr, error).log();
        }
    }

    fn leave_multicast(&self, socket: &Socket, addr: MulticastAddr) {
        #[cfg(not(feature = "testing"))]
        if let Err(error) =
            network::leave_multicast(socket, addr, self.ifindex.unwrap())
        {
            IoError::MulticastLeaveError(addr, error).log();
        }
    }
}

// ===== impl InterfaceCfg =====

impl Default for InterfaceCfg {
    fn default() -> InterfaceCfg {
        InterfaceCfg {
            enabled: true,
            if_type: InterfaceType::Broadcast,
            cost: None,
            mtu_ignore: false,
            ifmtu: None,
            hello_interval: 10,
            dead_interval: 40,
            retransmit_interval: 5,
            transmit_delay: 1,
            priority: 1,
            passive: false,
            instance_id: 0,
            static_nbrs: Default::default(),
            flooding: FloodingMode::default(),
            adj_connectivity: AdjConnectivity::default(),
            lsa_fullness: LsaFullness::default(),
            pushback_interval: 2000,
            ack_interval: 1800,
            mdr_constraint: 3,
            non_persistent_mdr: false,
            smart_peering: false,
            willingness: 3,
        }
    }
}

// ===== impl InterfaceState =====

impl Default for InterfaceState {
    fn default() -> InterfaceState {
        InterfaceState {
            ism_state: Default::default(),
            net: None,
            src_addr: None,
            mcast_groups: Default::default(),
            dr: None,
            bdr: None,
            neighbors: Default::default(),
            ls_update_list: Default::default(),
            ls_ack_list: Default::default(),
            event_count: 0,
            discontinuity_time: Utc::now(),
            lsdb: Default::default(),
            network_lsa_self: None,
            manet: Default::default(),
            tasks: Default::default(),
        }
    }
}

// ===== impl InterfaceNet =====

impl InterfaceNet {
    fn new(
        iface: &Interface,
        area: &Area,
        instance: &InstanceUpView<'_>,
    ) -> Result<Self, IoError> {
        // Create raw socket.
        let socket = network::socket(&iface.name)
            .map_err(IoError::SocketError)
            .and_then(|socket| {
                AsyncFd::new(socket).map_err(IoError::SocketError)
            })
            .map(Arc::new)?;

        // Start network Tx/Rx tasks.
        let (net_tx_packetp, net_tx_packetc) = mpsc::unbounded_channel();
        let mut net_tx_task = tasks::net_tx(
            socket.clone(),
            iface,
            net_tx_packetc,
            #[cfg(feature = "testing")]
            &instance.tx.protocol_output,
        );
        let net_rx_task = tasks::net_rx(
            socket.clone(),
            iface,
            area,
            &instance.tx.protocol_input.net_packet_rx,
        );

        // The network Tx task needs to be detached to ensure flushed
        // self-originated LSAs will be sent once the instance terminates.
        net_tx_task.detach();

        Ok(InterfaceNet {
            socket,
            _net_tx_task: net_tx_task,
            _net_rx_task: net_rx_task,
            net_tx_packetp,
        })
    }
}

// ===== impl Relay =====

impl Relay {
    pub(crate) fn new() -> Relay {
        Relay {
            active: true,
            newly_activated: true,
            dropped: false,
            drop_time: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mdr_level_ordering() {
        assert!(MdrLevel::Mdr > MdrLevel::Bmdr);
        assert!(MdrLevel::Bmdr > MdrLevel::Other);
    }
}
