//
// Copyright (c) The ospf6-manet Contributors
//
// SPDX-License-Identifier: MIT
//

use std::cell::Cell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::net::Ipv4Addr;
use std::time::Instant;

use chrono::{DateTime, Utc};
use ipnetwork::Ipv6Network;
use ospf6_manet_utils::task::TimeoutTask;
use ospf6_manet_utils::{Receiver, Sender, UnboundedReceiver, UnboundedSender};
use tokio::sync::mpsc;

use crate::collections::{
    AreaId, Areas, Arena, InterfaceId, LsaEntryId, Lsdb, LsdbId, NeighborId,
};
use crate::debug::{
    Debug, InstanceInactiveReason, InterfaceInactiveReason, LsaFlushReason,
};
use crate::error::Error;
use crate::interface::{Interface, ism};
use crate::lsdb::{LsaEntry, LsaLogEntry, LsaOriginateEvent};
use crate::neighbor::{Neighbor, nsm};
use crate::nssa::RedistributedRoute;
use crate::packet::lsa::{LsaBody, LsaKey};
use crate::route::{RouteInstaller, RouteNet, RouteNetFlags};
use crate::spf::{SpfLogEntry, SpfTriggerLsa};
use crate::tasks::messages::input::{
    DbDescFreeMsg, DelayedAckMsg, IsmEventMsg, LsaFlushMsg, LsaOrigCheckMsg,
    LsaOrigDelayedMsg, LsaOrigEventMsg, LsaRefreshMsg, LsdbMaxAgeSweepMsg,
    NetRxPacketMsg, NsmEventMsg, NssaStabilityMsg, NssaTranslatedMsg,
    PushbackTimeoutMsg, RxmtIntervalMsg, SendHelloMsg, SendLsUpdateMsg,
    SpfDelayEventMsg,
};
use crate::tasks::messages::ProtocolInputMsg;
#[cfg(feature = "testing")]
use crate::tasks::messages::ProtocolOutputMsg;
use crate::{events, lsdb, nssa, output, spf};

pub struct Instance {
    // Instance name.
    pub name: String,
    // Instance system data.
    pub system: InstanceSys,
    // Instance configuration data.
    pub config: InstanceCfg,
    // Instance state data.
    pub state: Option<InstanceState>,
    // Instance arenas.
    pub arenas: InstanceArenas,
    // Instance Tx channels.
    pub tx: InstanceChannelsTx,
    // Route installer collaborator.
    pub route_installer: Box<dyn RouteInstaller>,
}

#[derive(Debug, Default)]
pub struct InstanceSys {
    pub router_id: Option<Ipv4Addr>,
}

// Instance configuration.
#[derive(Debug)]
pub struct InstanceCfg {
    pub enabled: bool,
    pub router_id: Option<Ipv4Addr>,
    // Whether the router redistributes external routes.
    pub asbr: bool,
    // Reference bandwidth for automatic interface costs, in bits per
    // second.
    pub reference_bandwidth: u64,
    // SPF delay FSM intervals, in milliseconds.
    pub spf_initial_delay: u32,
    pub spf_short_delay: u32,
    pub spf_long_delay: u32,
    pub spf_hold_down: u32,
    pub spf_time_to_learn: u32,
    // Prefix-list shim used by the inter-area filters.
    pub prefix_lists: HashMap<String, Vec<Ipv6Network>>,
}

#[derive(Debug)]
pub struct InstanceState {
    // Instance Router ID.
    pub router_id: Ipv4Addr,
    // LSDB of AS-scope LSAs.
    pub lsdb: Lsdb,
    // SPF data.
    pub spf_last_event_rcvd: Option<Instant>,
    pub spf_last_time: Option<Instant>,
    pub spf_delay_state: spf::fsm::State,
    pub spf_delay_timer: Option<TimeoutTask>,
    pub spf_hold_down_timer: Option<TimeoutTask>,
    pub spf_learn_timer: Option<TimeoutTask>,
    // List of LSAs that have changed since the last SPF computation.
    pub spf_trigger_lsas: Vec<SpfTriggerLsa>,
    // Time the SPF was scheduled.
    pub spf_schedule_time: Option<Instant>,
    // Routing table.
    pub rib: BTreeMap<Ipv6Network, RouteNet>,
    // Redistributed external routes and their LSA-ID allocations.
    pub redistributed: BTreeMap<Ipv6Network, RedistributedRoute>,
    pub external_ids: BTreeMap<Ipv6Network, u32>,
    pub next_external_id: Cell<u32>,
    // Statistics.
    pub orig_lsa_count: u32,
    pub rx_lsa_count: u32,
    pub discontinuity_time: DateTime<Utc>,
    // LSA log.
    pub lsa_log: VecDeque<LsaLogEntry>,
    pub lsa_log_next_id: u32,
    // SPF log.
    pub spf_log: VecDeque<SpfLogEntry>,
    pub spf_log_next_id: u32,
}

#[derive(Debug, Default)]
pub struct InstanceArenas {
    pub areas: Areas,
    pub interfaces: Arena<Interface>,
    pub neighbors: Arena<Neighbor>,
    pub lsa_entries: Arena<LsaEntry>,
}

// Instance output channels.
#[derive(Clone, Debug)]
pub struct InstanceChannelsTx {
    pub protocol_input: ProtocolInputChannelsTx,
    #[cfg(feature = "testing")]
    pub protocol_output: Sender<ProtocolOutputMsg>,
}

#[derive(Clone, Debug)]
pub struct ProtocolInputChannelsTx {
    // Interface FSM event.
    pub ism_event: UnboundedSender<IsmEventMsg>,
    // Neighbor FSM event.
    pub nsm_event: UnboundedSender<NsmEventMsg>,
    // Packet Rx event.
    pub net_packet_rx: Sender<NetRxPacketMsg>,
    // Hello transmission tick.
    pub send_hello: UnboundedSender<SendHelloMsg>,
    // Free last sent/received Database Description packets.
    pub dbdesc_free: Sender<DbDescFreeMsg>,
    // Request to send LS Update.
    pub send_lsupd: UnboundedSender<SendLsUpdateMsg>,
    // Packet retransmission interval.
    pub rxmt_interval: Sender<RxmtIntervalMsg>,
    // Delayed Ack timeout.
    pub delayed_ack_timeout: UnboundedSender<DelayedAckMsg>,
    // Pushback backup-wait timeout.
    pub pushback_timeout: UnboundedSender<PushbackTimeoutMsg>,
    // LSA originate event.
    pub lsa_orig_event: UnboundedSender<LsaOrigEventMsg>,
    // LSA originate check.
    pub lsa_orig_check: UnboundedSender<LsaOrigCheckMsg>,
    // LSA delayed origination timer.
    pub lsa_orig_delayed_timer: Sender<LsaOrigDelayedMsg>,
    // LSA flush event.
    pub lsa_flush: UnboundedSender<LsaFlushMsg>,
    // LSA refresh event.
    pub lsa_refresh: UnboundedSender<LsaRefreshMsg>,
    // LSDB MaxAge sweep timer.
    pub lsdb_maxage_sweep_interval: Sender<LsdbMaxAgeSweepMsg>,
    // SPF run event.
    pub spf_delay_event: UnboundedSender<SpfDelayEventMsg>,
    // NSSA translator stability timeout.
    pub nssa_stability: UnboundedSender<NssaStabilityMsg>,
    // NSSA translation binding.
    pub nssa_translated: UnboundedSender<NssaTranslatedMsg>,
}

#[derive(Debug)]
pub struct ProtocolInputChannelsRx {
    pub ism_event: UnboundedReceiver<IsmEventMsg>,
    pub nsm_event: UnboundedReceiver<NsmEventMsg>,
    pub net_packet_rx: Receiver<NetRxPacketMsg>,
    pub send_hello: UnboundedReceiver<SendHelloMsg>,
    pub dbdesc_free: Receiver<DbDescFreeMsg>,
    pub send_lsupd: UnboundedReceiver<SendLsUpdateMsg>,
    pub rxmt_interval: Receiver<RxmtIntervalMsg>,
    pub delayed_ack_timeout: UnboundedReceiver<DelayedAckMsg>,
    pub pushback_timeout: UnboundedReceiver<PushbackTimeoutMsg>,
    pub lsa_orig_event: UnboundedReceiver<LsaOrigEventMsg>,
    pub lsa_orig_check: UnboundedReceiver<LsaOrigCheckMsg>,
    pub lsa_orig_delayed_timer: Receiver<LsaOrigDelayedMsg>,
    pub lsa_flush: UnboundedReceiver<LsaFlushMsg>,
    pub lsa_refresh: UnboundedReceiver<LsaRefreshMsg>,
    pub lsdb_maxage_sweep_interval: Receiver<LsdbMaxAgeSweepMsg>,
    pub spf_delay_event: UnboundedReceiver<SpfDelayEventMsg>,
    pub nssa_stability: UnboundedReceiver<NssaStabilityMsg>,
    pub nssa_translated: UnboundedReceiver<NssaTranslatedMsg>,
}

pub struct InstanceUpView<'a> {
    pub name: &'a str,
    pub system: &'a InstanceSys,
    pub config: &'a InstanceCfg,
    pub state: &'a mut InstanceState,
    pub tx: &'a InstanceChannelsTx,
    pub route_installer: &'a mut Box<dyn RouteInstaller>,
}

// ===== impl Instance =====

impl Instance {
    // Creates a new instance together with the receiving half of its
    // protocol input channels.
    pub fn new(
        name: String,
        route_installer: Box<dyn RouteInstaller>,
        #[cfg(feature = "testing")] protocol_output: Sender<ProtocolOutputMsg>,
    ) -> (Instance, ProtocolInputChannelsRx) {
        Debug::InstanceCreate.log();

        let (tx, rx) = protocol_input_channels();
        let instance = Instance {
            name,
            system: Default::default(),
            config: Default::default(),
            state: None,
            arenas: Default::default(),
            tx: InstanceChannelsTx {
                protocol_input: tx,
                #[cfg(feature = "testing")]
                protocol_output,
            },
            route_installer,
        };

        (instance, rx)
    }

    // Runs the instance event loop until all input channels close.
    //
    // Every protocol mutation happens inside this single loop; child tasks
    // only produce messages.
    pub async fn run(mut self, mut rx: ProtocolInputChannelsRx) {
        while let Some(msg) = rx.recv().await {
            self.process_protocol_msg(msg);
        }

        self.shutdown();
    }

    pub fn process_protocol_msg(&mut self, msg: ProtocolInputMsg) {
        // Ignore event if the instance isn't active.
        if let Some((mut instance, arenas)) = self.as_up()
            && let Err(error) =
                events::process_protocol_msg(&mut instance, arenas, msg)
        {
            error.log();
        }
    }

    pub fn shutdown(mut self) {
        // Ensure instance is disabled before exiting.
        self.stop(InstanceInactiveReason::AdminDown);
    }

    // Checks if the instance needs to be started or stopped in response to
    // a configuration or system event.
    pub fn update(&mut self) {
        let router_id = self.get_router_id();

        match self.is_ready(router_id) {
            Ok(()) if !self.is_active() => {
                self.start(router_id.unwrap());
            }
            Err(reason) if self.is_active() => {
                self.stop(reason);
            }
            _ => (),
        }
    }

    fn start(&mut self, router_id: Ipv4Addr) {
        Debug::InstanceStart.log();

        // Store instance initial state.
        self.state = Some(InstanceState::new(router_id));

        // Iterate over all configured areas.
        let (instance, arenas) = self.as_up().unwrap();
        for area_idx in arenas.areas.indexes().collect::<Vec<_>>() {
            let area = &arenas.areas[area_idx];

            // Try to start interfaces.
            for iface_idx in area.interfaces.indexes().collect::<Vec<_>>() {
                let iface = &mut arenas.interfaces[iface_idx];

                iface.update(
                    area,
                    &instance,
                    &mut arenas.neighbors,
                    &arenas.lsa_entries,
                );
            }

            // Originate the initial LSAs of the area.
            instance.tx.protocol_input.lsa_orig_event(
                LsaOriginateEvent::AreaStart { area_id: area.id },
            );
        }
    }

    fn stop(&mut self, reason: InstanceInactiveReason) {
        if !self.is_active() {
            return;
        }

        Debug::InstanceStop(reason).log();

        // Flush all self-originated LSAs.
        let (mut instance, arenas) = self.as_up().unwrap();
        lsdb::flush_all_self_originated(&mut instance, arenas);

        // Uninstall all routes.
        let routes: Vec<_> = instance
            .state
            .rib
            .iter()
            .filter(|(_, route)| {
                route.flags.contains(RouteNetFlags::INSTALLED)
            })
            .map(|(prefix, _)| *prefix)
            .collect();
        for prefix in routes {
            instance.route_installer.uninstall(prefix);
        }

        for area_idx in arenas.areas.indexes().collect::<Vec<_>>() {
            // Stop interfaces.
            for iface_idx in arenas.areas[area_idx]
                .interfaces
                .indexes()
                .collect::<Vec<_>>()
            {
                let area = &arenas.areas[area_idx];
                let iface = &mut arenas.interfaces[iface_idx];
                if iface.is_down() || iface.is_passive() {
                    continue;
                }

                // Send pending LS Updates.
                output::send_lsupd(
                    None,
                    iface,
                    area,
                    &instance,
                    &mut arenas.neighbors,
                );

                let reason = InterfaceInactiveReason::InstanceDown;
                iface.fsm(
                    area,
                    &instance,
                    &mut arenas.neighbors,
                    &arenas.lsa_entries,
                    ism::Event::InterfaceDown(reason),
                );
            }

            // Clear area's state.
            arenas.areas[area_idx].state = Default::default();
        }

        // Clear instance state.
        self.state = None;
    }

    pub fn reset(&mut self) {
        if self.is_active() {
            self.stop(InstanceInactiveReason::Resetting);
            self.update();
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.is_some()
    }

    // Returns whether the instance is ready for OSPF operation.
    fn is_ready(
        &self,
        router_id: Option<Ipv4Addr>,
    ) -> Result<(), InstanceInactiveReason> {
        if !self.config.enabled || self.arenas.interfaces.is_empty() {
            return Err(InstanceInactiveReason::AdminDown);
        }

        if router_id.is_none() {
            return Err(InstanceInactiveReason::MissingRouterId);
        }

        Ok(())
    }

    pub fn get_router_id(&self) -> Option<Ipv4Addr> {
        self.config.router_id.or(self.system.router_id)
    }

    pub fn as_up(
        &mut self,
    ) -> Option<(InstanceUpView<'_>, &mut InstanceArenas)> {
        if let Some(state) = &mut self.state {
            let instance = InstanceUpView {
                name: &self.name,
                system: &self.system,
                config: &self.config,
                state,
                tx: &self.tx,
                route_installer: &mut self.route_installer,
            };
            Some((instance, &mut self.arenas))
        } else {
            None
        }
    }

    // ===== collaborator-facing configuration API =====

    // Adds a new area.
    pub fn add_area(&mut self, area_id: Ipv4Addr) -> AreaId {
        let (_, area) = self.arenas.areas.insert(area_id);
        area.id
    }

    // Adds a new interface to the given area.
    pub fn add_interface(
        &mut self,
        area_id: Ipv4Addr,
        ifname: &str,
    ) -> Option<InterfaceId> {
        let (_, area) = self.arenas.areas.get_mut_by_area_id(area_id)?;
        let (_, iface) =
            area.interfaces.insert(&mut self.arenas.interfaces, ifname);
        Some(iface.id)
    }

    // Adds a virtual link through the given transit area.
    pub fn add_virtual_link(
        &mut self,
        transit_area_id: Ipv4Addr,
        nbr_router_id: Ipv4Addr,
    ) -> bool {
        let Some((_, area)) =
            self.arenas.areas.get_mut_by_area_id(transit_area_id)
        else {
            return false;
        };
        area.vlinks
            .push(crate::vlink::VirtualLink::new(nbr_router_id));
        true
    }

    // Adds or replaces a redistributed external route.
    pub fn redistribute(
        &mut self,
        prefix: Ipv6Network,
        route: RedistributedRoute,
    ) {
        if let Some((mut instance, _)) = self.as_up() {
            instance.state.redistributed.insert(prefix, route);
            nssa::assign_external_ids(&mut instance);
            instance
                .tx
                .protocol_input
                .lsa_orig_event(LsaOriginateEvent::ExternalRoutesChange);
        }
    }

    // Withdraws a redistributed external route.
    pub fn withdraw_redistributed(&mut self, prefix: Ipv6Network) {
        if let Some((instance, _)) = self.as_up()
            && instance.state.redistributed.remove(&prefix).is_some()
        {
            instance
                .tx
                .protocol_input
                .lsa_orig_event(LsaOriginateEvent::ExternalRoutesChange);
        }
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance").field("name", &self.name).finish()
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        Debug::InstanceDelete.log();
    }
}

// ===== impl InstanceState =====

impl InstanceState {
    fn new(router_id: Ipv4Addr) -> InstanceState {
        InstanceState {
            router_id,
            lsdb: Default::default(),
            spf_last_event_rcvd: None,
            spf_last_time: None,
            spf_delay_state: spf::fsm::State::Quiet,
            spf_delay_timer: None,
            spf_hold_down_timer: None,
            spf_learn_timer: None,
            spf_trigger_lsas: Default::default(),
            spf_schedule_time: None,
            rib: Default::default(),
            redistributed: Default::default(),
            external_ids: Default::default(),
            next_external_id: Cell::new(1),
            orig_lsa_count: 0,
            rx_lsa_count: 0,
            discontinuity_time: Utc::now(),
            lsa_log: Default::default(),
            lsa_log_next_id: 0,
            spf_log: Default::default(),
            spf_log_next_id: 0,
        }
    }
}

// ===== impl InstanceCfg =====

impl Default for InstanceCfg {
    fn default() -> InstanceCfg {
        InstanceCfg {
            enabled: true,
            router_id: None,
            asbr: false,
            reference_bandwidth: 100_000_000,
            spf_initial_delay: 50,
            spf_short_delay: 200,
            spf_long_delay: 5000,
            spf_hold_down: 10000,
            spf_time_to_learn: 500,
            prefix_lists: Default::default(),
        }
    }
}

// ===== impl ProtocolInputChannelsTx =====

impl ProtocolInputChannelsTx {
    pub(crate) fn ism_event(
        &self,
        area_id: AreaId,
        iface_id: InterfaceId,
        event: ism::Event,
    ) {
        let _ = self.ism_event.send(IsmEventMsg {
            area_key: area_id.into(),
            iface_key: iface_id.into(),
            event,
        });
    }

    pub(crate) fn nsm_event(
        &self,
        area_id: AreaId,
        iface_id: InterfaceId,
        nbr_id: NeighborId,
        event: nsm::Event,
    ) {
        let _ = self.nsm_event.send(NsmEventMsg {
            area_key: area_id.into(),
            iface_key: iface_id.into(),
            nbr_key: nbr_id.into(),
            event,
        });
    }

    pub(crate) fn send_lsupd(
        &self,
        area_id: AreaId,
        iface_id: InterfaceId,
        nbr_id: Option<NeighborId>,
    ) {
        let _ = self.send_lsupd.send(SendLsUpdateMsg {
            area_key: area_id.into(),
            iface_key: iface_id.into(),
            nbr_key: nbr_id.map(std::convert::Into::into),
        });
    }

    // Requests an immediate transmission of the coalesced delayed acks.
    pub(crate) fn delayed_ack_now(
        &self,
        area_id: AreaId,
        iface_id: InterfaceId,
    ) {
        let _ = self.delayed_ack_timeout.send(DelayedAckMsg {
            area_key: area_id.into(),
            iface_key: iface_id.into(),
        });
    }

    pub(crate) fn lsa_orig_event(&self, event: LsaOriginateEvent) {
        let _ = self.lsa_orig_event.send(LsaOrigEventMsg { event });
    }

    pub(crate) fn lsa_orig_check(
        &self,
        lsdb_id: LsdbId,
        lsa_id: Ipv4Addr,
        lsa_body: LsaBody,
    ) {
        let _ = self.lsa_orig_check.send(LsaOrigCheckMsg {
            lsdb_key: lsdb_id.into(),
            lsa_id,
            lsa_body,
        });
    }

    pub(crate) fn lsa_flush(
        &self,
        lsdb_id: LsdbId,
        lse_id: LsaEntryId,
        reason: LsaFlushReason,
    ) {
        let _ = self.lsa_flush.send(LsaFlushMsg {
            lsdb_key: lsdb_id.into(),
            lse_key: lse_id.into(),
            reason,
        });
    }

    pub(crate) fn spf_delay_event(&self, event: spf::fsm::Event) {
        let _ = self.spf_delay_event.send(SpfDelayEventMsg { event });
    }

    pub(crate) fn nssa_translated(
        &self,
        area_id: AreaId,
        type7_key: LsaKey,
        lsa_id: Ipv4Addr,
    ) {
        let _ = self.nssa_translated.send(NssaTranslatedMsg {
            area_key: area_id.into(),
            type7_key,
            lsa_id,
        });
    }
}

// ===== impl ProtocolInputChannelsRx =====

impl ProtocolInputChannelsRx {
    pub async fn recv(&mut self) -> Option<ProtocolInputMsg> {
        tokio::select! {
            biased;
            msg = self.ism_event.recv() => {
                msg.map(ProtocolInputMsg::IsmEvent)
            }
            msg = self.nsm_event.recv() => {
                msg.map(ProtocolInputMsg::NsmEvent)
            }
            msg = self.net_packet_rx.recv() => {
                msg.map(ProtocolInputMsg::NetRxPacket)
            }
            msg = self.send_hello.recv() => {
                msg.map(ProtocolInputMsg::SendHello)
            }
            msg = self.dbdesc_free.recv() => {
                msg.map(ProtocolInputMsg::DbDescFree)
            }
            msg = self.send_lsupd.recv() => {
                msg.map(ProtocolInputMsg::SendLsUpdate)
            }
            msg = self.rxmt_interval.recv() => {
                msg.map(ProtocolInputMsg::RxmtInterval)
            }
            msg = self.delayed_ack_timeout.recv() => {
                msg.map(ProtocolInputMsg::DelayedAck)
            }
            msg = self.pushback_timeout.recv() => {
                msg.map(ProtocolInputMsg::PushbackTimeout)
            }
            msg = self.lsa_orig_event.recv() => {
                msg.map(ProtocolInputMsg::LsaOrigEvent)
            }
            msg = self.lsa_orig_check.recv() => {
                msg.map(ProtocolInputMsg::LsaOrigCheck)
            }
            msg = self.lsa_orig_delayed_timer.recv() => {
                msg.map(ProtocolInputMsg::LsaOrigDelayed)
            }
            msg = self.lsa_flush.recv() => {
                msg.map(ProtocolInputMsg::LsaFlush)
            }
            msg = self.lsa_refresh.recv() => {
                msg.map(ProtocolInputMsg::LsaRefresh)
            }
            msg = self.lsdb_maxage_sweep_interval.recv() => {
                msg.map(ProtocolInputMsg::LsdbMaxAgeSweep)
            }
            msg = self.spf_delay_event.recv() => {
                msg.map(ProtocolInputMsg::SpfDelayEvent)
            }
            msg = self.nssa_stability.recv() => {
                msg.map(ProtocolInputMsg::NssaStability)
            }
            msg = self.nssa_translated.recv() => {
                msg.map(ProtocolInputMsg::NssaTranslated)
            }
        }
    }
}

// ===== helper functions =====

fn protocol_input_channels()
-> (ProtocolInputChannelsTx, ProtocolInputChannelsRx) {
    let (ism_eventp, ism_eventc) = mpsc::unbounded_channel();
    let (nsm_eventp, nsm_eventc) = mpsc::unbounded_channel();
    let (net_packet_rxp, net_packet_rxc) = mpsc::channel(4);
    let (send_hellop, send_helloc) = mpsc::unbounded_channel();
    let (dbdesc_freep, dbdesc_freec) = mpsc::channel(4);
    let (send_lsupdp, send_lsupdc) = mpsc::unbounded_channel();
    let (rxmt_intervalp, rxmt_intervalc) = mpsc::channel(4);
    let (delayed_ack_timeoutp, delayed_ack_timeoutc) =
        mpsc::unbounded_channel();
    let (pushback_timeoutp, pushback_timeoutc) = mpsc::unbounded_channel();
    let (lsa_orig_eventp, lsa_orig_eventc) = mpsc::unbounded_channel();
    let (lsa_orig_checkp, lsa_orig_checkc) = mpsc::unbounded_channel();
    let (lsa_orig_delayed_timerp, lsa_orig_delayed_timerc) = mpsc::channel(4);
    let (lsa_flushp, lsa_flushc) = mpsc::unbounded_channel();
    let (lsa_refreshp, lsa_refreshc) = mpsc::unbounded_channel();
    let (lsdb_maxage_sweep_intervalp, lsdb_maxage_sweep_intervalc) =
        mpsc::channel(4);
    let (spf_delay_eventp, spf_delay_eventc) = mpsc::unbounded_channel();
    let (nssa_stabilityp, nssa_stabilityc) = mpsc::unbounded_channel();
    let (nssa_translatedp, nssa_translatedc) = mpsc::unbounded_channel();

    let tx = ProtocolInputChannelsTx {
        ism_event: ism_eventp,
        nsm_event: nsm_eventp,
        net_packet_rx: net_packet_rxp,
        send_hello: send_hellop,
        dbdesc_free: dbdesc_freep,
        send_lsupd: send_lsupdp,
        rxmt_interval: rxmt_intervalp,
        delayed_ack_timeout: delayed_ack_timeoutp,
        pushback_timeout: pushback_timeoutp,
        lsa_orig_event: lsa_orig_eventp,
        lsa_orig_check: lsa_orig_checkp,
        lsa_orig_delayed_timer: lsa_orig_delayed_timerp,
        lsa_flush: lsa_flushp,
        lsa_refresh: lsa_refreshp,
        lsdb_maxage_sweep_interval: lsdb_maxage_sweep_intervalp,
        spf_delay_event: spf_delay_eventp,
        nssa_stability: nssa_stabilityp,
        nssa_translated: nssa_translatedp,
    };
    let rx = ProtocolInputChannelsRx {
        ism_event: ism_eventc,
        nsm_event: nsm_eventc,
        net_packet_rx: net_packet_rxc,
        send_hello: send_helloc,
        dbdesc_free: dbdesc_freec,
        send_lsupd: send_lsupdc,
        rxmt_interval: rxmt_intervalc,
        delayed_ack_timeout: delayed_ack_timeoutc,
        pushback_timeout: pushback_timeoutc,
        lsa_orig_event: lsa_orig_eventc,
        lsa_orig_check: lsa_orig_checkc,
        lsa_orig_delayed_timer: lsa_orig_delayed_timerc,
        lsa_flush: lsa_flushc,
        lsa_refresh: lsa_refreshc,
        lsdb_maxage_sweep_interval: lsdb_maxage_sweep_intervalc,
        spf_delay_event: spf_delay_eventc,
        nssa_stability: nssa_stabilityc,
        nssa_translated: nssa_translatedc,
    };

    (tx, rx)
}
