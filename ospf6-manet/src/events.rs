//
// Copyright (c) The ospf6-manet Contributors
//
// SPDX-License-Identifier: MIT
//

use std::cmp::Ordering;
use std::collections::btree_map;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use chrono::Utc;

use crate::area::{Area, AreaType};
use crate::collections::{
    AreaIndex, AreaKey, InterfaceIndex, InterfaceKey, LsaEntryKey, LsdbIndex,
    LsdbKey, NeighborIndex, NeighborKey, lsdb_get, lsdb_get_mut, lsdb_index,
    lsdb_index_mut,
};
use crate::debug::{Debug, LsaFlushReason, SeqNoMismatchReason};
use crate::error::{Error, InterfaceCfgError};
use crate::flood::{FloodSource, LsaRxFlags, flood};
use crate::instance::{InstanceArenas, InstanceUpView};
use crate::interface::{FloodingMode, Interface, ism};
use crate::lsdb::{
    self, LsaEntryFlags, LsaOriginateEvent, lsa_compare, lsa_type_is_valid,
};
use crate::neighbor::{LastDbDesc, Neighbor, RxmtPacketType, nsm};
use crate::packet::lsa::{Lsa, LsaBody, LsaKey, LsaScope};
use crate::packet::{DbDesc, DbDescFlags, Hello, LsAck, LsRequest, LsUpdate, Packet};
use crate::tasks::messages::ProtocolInputMsg;
use crate::{flood, mdr, mpr, nssa, output, pushback, spf, tasks};

// ===== message dispatch =====

pub(crate) fn process_protocol_msg(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    msg: ProtocolInputMsg,
) -> Result<(), Error> {
    match msg {
        // Interface FSM event.
        ProtocolInputMsg::IsmEvent(msg) => process_ism_event(
            instance,
            arenas,
            msg.area_key,
            msg.iface_key,
            msg.event,
        )?,
        // Neighbor FSM event.
        ProtocolInputMsg::NsmEvent(msg) => process_nsm_event(
            instance,
            arenas,
            msg.area_key,
            msg.iface_key,
            msg.nbr_key,
            msg.event,
        )?,
        // Received network packet.
        ProtocolInputMsg::NetRxPacket(msg) => process_packet(
            instance,
            arenas,
            msg.area_key,
            msg.iface_key,
            msg.src,
            msg.dst,
            msg.packet.map_err(Error::PacketDecodeError),
        )?,
        // Hello transmission tick.
        ProtocolInputMsg::SendHello(msg) => process_send_hello(
            instance,
            arenas,
            msg.area_key,
            msg.iface_key,
        )?,
        // Free last sent/received Database Description packets.
        ProtocolInputMsg::DbDescFree(msg) => process_dbdesc_free(
            instance,
            arenas,
            msg.area_key,
            msg.iface_key,
            msg.nbr_key,
        )?,
        // Request to send LS Update.
        ProtocolInputMsg::SendLsUpdate(msg) => process_send_lsupd(
            instance,
            arenas,
            msg.area_key,
            msg.iface_key,
            msg.nbr_key,
        )?,
        // Packet retransmission.
        ProtocolInputMsg::RxmtInterval(msg) => process_packet_rxmt(
            instance,
            arenas,
            msg.area_key,
            msg.iface_key,
            msg.nbr_key,
            msg.packet_type,
        )?,
        // Delayed Ack timeout.
        ProtocolInputMsg::DelayedAck(msg) => process_delayed_ack_timeout(
            instance,
            arenas,
            msg.area_key,
            msg.iface_key,
        )?,
        // Pushback backup-wait timeout.
        ProtocolInputMsg::PushbackTimeout(msg) => pushback::process_timeout(
            instance,
            arenas,
            msg.area_key,
            msg.iface_key,
            msg.lsa_key,
        )?,
        // LSA origination event.
        ProtocolInputMsg::LsaOrigEvent(msg) => {
            lsdb::lsa_orig_event(instance, arenas, msg.event)?
        }
        // LSA origination check.
        ProtocolInputMsg::LsaOrigCheck(msg) => process_lsa_orig_check(
            instance,
            arenas,
            msg.lsdb_key,
            msg.lsa_id,
            msg.lsa_body,
        )?,
        // LSA delayed origination timer.
        ProtocolInputMsg::LsaOrigDelayed(msg) => {
            process_lsa_orig_delayed_timer(
                instance,
                arenas,
                msg.lsdb_key,
                msg.lsa_key,
            )?
        }
        // LSA flush.
        ProtocolInputMsg::LsaFlush(msg) => process_lsa_flush(
            instance,
            arenas,
            msg.lsdb_key,
            msg.lse_key,
            msg.reason,
        )?,
        // LSA refresh event.
        ProtocolInputMsg::LsaRefresh(msg) => {
            process_lsa_refresh(instance, arenas, msg.lsdb_key, msg.lse_key)?
        }
        // LSA MaxAge sweep interval.
        ProtocolInputMsg::LsdbMaxAgeSweep(msg) => {
            process_lsdb_maxage_sweep_interval(instance, arenas, msg.lsdb_key)?
        }
        // SPF run event.
        ProtocolInputMsg::SpfDelayEvent(msg) => {
            spf::fsm(msg.event, instance, arenas)?
        }
        // NSSA translator stability timeout.
        ProtocolInputMsg::NssaStability(msg) => {
            nssa::process_stability_timeout(instance, arenas, msg.area_key)?
        }
        // NSSA translation binding.
        ProtocolInputMsg::NssaTranslated(msg) => nssa::process_translated(
            instance,
            arenas,
            msg.area_key,
            msg.type7_key,
            msg.lsa_id,
        )?,
    }

    Ok(())
}

// ===== Interface FSM event =====

pub(crate) fn process_ism_event(
    instance: &InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    area_key: AreaKey,
    iface_key: InterfaceKey,
    event: ism::Event,
) -> Result<(), Error> {
    // Lookup area and interface.
    let (_, area) = arenas.areas.get_mut_by_key(&area_key)?;
    let (_, iface) = area
        .interfaces
        .get_mut_by_key(&mut arenas.interfaces, &iface_key)?;

    // Invoke FSM event.
    iface.fsm(
        area,
        instance,
        &mut arenas.neighbors,
        &arenas.lsa_entries,
        event,
    );

    Ok(())
}

// ===== Neighbor FSM event =====

pub(crate) fn process_nsm_event(
    instance: &InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    area_key: AreaKey,
    iface_key: InterfaceKey,
    nbr_key: NeighborKey,
    event: nsm::Event,
) -> Result<(), Error> {
    // Lookup area, interface and neighbor.
    let (_, area) = arenas.areas.get_mut_by_key(&area_key)?;
    let (_, iface) = area
        .interfaces
        .get_mut_by_key(&mut arenas.interfaces, &iface_key)?;
    let (nbr_idx, nbr) = iface
        .state
        .neighbors
        .get_mut_by_key(&mut arenas.neighbors, &nbr_key)?;

    // Invoke FSM event.
    nbr.fsm(iface, area, instance, &arenas.lsa_entries, event);
    if nbr.state == nsm::State::Down {
        // Effectively delete the neighbor.
        iface.state.neighbors.delete(&mut arenas.neighbors, nbr_idx);
    }

    Ok(())
}

// ===== Network packet receipt =====

pub(crate) fn process_packet(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    area_key: AreaKey,
    iface_key: InterfaceKey,
    src: Ipv6Addr,
    dst: Ipv6Addr,
    packet: Result<Packet, Error>,
) -> Result<(), Error> {
    // Lookup area and interface.
    let (area_idx, area) = arenas.areas.get_mut_by_key(&area_key)?;
    let (iface_idx, iface) = area
        .interfaces
        .get_mut_by_key(&mut arenas.interfaces, &iface_key)?;

    // Check if the packet was decoded successfully.
    let packet = packet?;

    // Ignore packets received on inoperational or passive interfaces.
    if iface.is_down() || iface.is_passive() {
        return Ok(());
    }

    // Validate IP destination address.
    iface.validate_packet_dst(dst)?;

    // Validate IP source address.
    iface.validate_packet_src(src)?;

    // Check for Area ID mismatch.
    let pkt_type = packet.hdr().pkt_type;
    if packet.hdr().area_id != area.area_id {
        return Err(Error::InterfaceCfgError(
            iface.name.clone(),
            src,
            pkt_type,
            InterfaceCfgError::AreaIdMismatch(
                packet.hdr().area_id,
                area.area_id,
            ),
        ));
    }

    // Check for Instance ID mismatch. Mismatches are expected in normal
    // operation and do not constitute an error.
    if packet.hdr().instance_id != iface.config.instance_id {
        return Ok(());
    }

    // Log received packet.
    Debug::PacketRx(&iface.name, &src, &dst, &packet).log();

    let router_id = packet.hdr().router_id;
    let mcast = dst.is_multicast();

    if let Packet::Hello(pkt) = packet {
        process_packet_hello(
            iface_idx, area_idx, instance, arenas, src, pkt,
        )
    } else {
        // Non-Hello packets not matching any active neighbor are
        // discarded. In OSPF for IPv6, neighboring routers on a given link
        // are always identified by their OSPF Router ID.
        let iface = &arenas.interfaces[iface_idx];
        let (nbr_idx, _) = iface
            .state
            .neighbors
            .get_by_router_id(&arenas.neighbors, router_id)
            .ok_or(Error::UnknownNeighbor(src, router_id))?;

        match packet {
            Packet::Hello(_) => unreachable!(),
            Packet::DbDesc(pkt) => process_packet_dbdesc(
                nbr_idx, iface_idx, area_idx, instance, arenas, src, pkt,
            ),
            Packet::LsRequest(pkt) => process_packet_lsreq(
                nbr_idx, iface_idx, area_idx, instance, arenas, pkt,
            ),
            Packet::LsUpdate(pkt) => process_packet_lsupd(
                nbr_idx, iface_idx, area_idx, instance, arenas, mcast, pkt,
            ),
            Packet::LsAck(pkt) => process_packet_lsack(
                nbr_idx, iface_idx, area_idx, instance, arenas, mcast, pkt,
            ),
        }
    }
}

fn process_packet_hello(
    iface_idx: InterfaceIndex,
    area_idx: AreaIndex,
    instance: &InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    src: Ipv6Addr,
    hello: Hello,
) -> Result<(), Error> {
    let InstanceArenas {
        areas,
        interfaces,
        neighbors,
        lsa_entries,
    } = arenas;
    let area = &areas[area_idx];
    let iface = &mut interfaces[iface_idx];
    let protocol_input = &instance.tx.protocol_input;
    let router_id = instance.state.router_id;

    // Perform all the required sanity checks.
    process_packet_hello_sanity_checks(iface, area, instance, &hello)
        .map_err(|error| {
            Error::InterfaceCfgError(
                iface.name.clone(),
                src,
                crate::packet::PacketType::Hello,
                error,
            )
        })?;

    // Find or create new neighbor.
    let (_, nbr) = match iface
        .state
        .neighbors
        .get_by_router_id(neighbors, hello.hdr.router_id)
        .map(|(nbr_idx, _)| nbr_idx)
    {
        Some(nbr_idx) => (nbr_idx, &mut neighbors[nbr_idx]),
        None => {
            // Create new neighbor.
            let (nbr_idx, nbr) = iface.state.neighbors.insert(
                neighbors,
                hello.hdr.router_id,
                src,
            );

            // Initialize neighbor values.
            nbr.iface_id = Some(hello.iface_id);
            nbr.priority = hello.priority;
            if iface.is_broadcast_or_nbma() {
                nbr.dr = hello.dr;
                nbr.bdr = hello.bdr;
            }

            (nbr_idx, &mut *nbr)
        }
    };

    // Update neighbor's source address.
    nbr.src = src;

    // Trigger the HelloReceived event.
    nbr.fsm(iface, area, instance, lsa_entries, nsm::Event::HelloRcvd);

    // Process the MANET LLS block before deciding on bidirectionality, as
    // the reported and heard lists also establish it.
    let mut two_way = hello.neighbors.contains(&router_id);
    if iface.is_manet()
        && let Some(lls) = &hello.lls
    {
        two_way = two_way
            || lls.heard.contains(&router_id)
            || lls.reported.contains(&router_id);

        if let Some(scs) = &lls.scs {
            nbr.manet.scs_num = scs.number;
        }
        if let Some(hs) = &lls.hello_seq {
            nbr.manet.hello_seq = Some(hs.number);
        }

        match iface.config.flooding {
            FloodingMode::MdrSicds => {
                nbr.manet.report_twohop =
                    !lls.reported.is_empty() || lls.hello_seq.is_some();
                if nbr.manet.rnl != lls.reported {
                    nbr.manet.rnl = lls.reported.clone();
                    iface.state.manet.topology_changed = true;
                }
                if let Some(mdr) = &lls.mdr {
                    // An MDR advertises itself as parent; a BMDR as backup
                    // parent. Everything else is an Other router. The
                    // advertisement also reveals whether the sender
                    // selected the local router as parent (child
                    // relationship).
                    use crate::interface::MdrLevel;
                    let level = if mdr.parent == nbr.router_id {
                        MdrLevel::Mdr
                    } else if mdr.bparent == nbr.router_id {
                        MdrLevel::Bmdr
                    } else {
                        MdrLevel::Other
                    };
                    if nbr.manet.mdr_level != level {
                        nbr.manet.mdr_level = level;
                        iface.state.manet.topology_changed = true;
                    }
                    nbr.manet.child =
                        mdr.parent == router_id || mdr.bparent == router_id;
                }
                nbr.manet.dependent_selector =
                    lls.dependent.contains(&router_id);
            }
            FloodingMode::MprSdcds => {
                // The sender's relay set determines whether the local
                // router must reflood on its behalf.
                if let Some(relay) = &lls.relay
                    && relay.relays.contains(&router_id)
                {
                    iface
                        .state
                        .manet
                        .relay_selectors
                        .insert(nbr.router_id, std::time::Instant::now());
                }
                if nbr.manet.rnl != hello.neighbors {
                    nbr.manet.rnl = hello.neighbors.clone();
                    iface.state.manet.topology_changed = true;
                }
            }
            FloodingMode::Classic => (),
        }
    }

    // Trigger the 1-WayReceived or the 2-WayReceived event.
    if two_way {
        nbr.fsm(iface, area, instance, lsa_entries, nsm::Event::TwoWayRcvd);
    } else {
        nbr.fsm(iface, area, instance, lsa_entries, nsm::Event::OneWayRcvd);

        // Update neighbor values.
        nbr.iface_id = Some(hello.iface_id);
        if iface.is_broadcast_or_nbma() {
            nbr.priority = hello.priority;
            nbr.dr = hello.dr;
            nbr.bdr = hello.bdr;
        }

        // The lost bidirectionality still feeds the MDR election.
        if iface.is_manet()
            && iface.config.flooding == FloodingMode::MdrSicds
        {
            mdr::update_mdr(iface, area, instance, neighbors);
        }
        return Ok(());
    }

    // Check for Interface ID change.
    if nbr.iface_id != Some(hello.iface_id) {
        nbr.iface_id = Some(hello.iface_id);

        // (Re)originate LSAs that might have been affected.
        instance.tx.protocol_input.lsa_orig_event(
            LsaOriginateEvent::NeighborInterfaceIdChange {
                area_id: area.id,
                iface_id: iface.id,
            },
        );
    }

    // Examine rest of the Hello packet (ignore point-to-multipoint
    // interfaces as per errata 4022 of RFC 2328).
    if iface.is_broadcast_or_nbma() {
        // Check for Router Priority change.
        if hello.priority != nbr.priority {
            nbr.priority = hello.priority;
            protocol_input.ism_event(area.id, iface.id, ism::Event::NbrChange);
        }

        // Check for DR/BDR changes.
        let nbr_net_id = nbr.network_id();
        if iface.state.ism_state == ism::State::Waiting
            && ((hello.dr == Some(nbr_net_id) && hello.bdr.is_none())
                || hello.bdr == Some(nbr_net_id))
        {
            protocol_input.ism_event(
                area.id,
                iface.id,
                ism::Event::BackupSeen,
            );
        }
        if (hello.dr == Some(nbr_net_id) && nbr.dr != Some(nbr_net_id))
            || (hello.dr != Some(nbr_net_id) && nbr.dr == Some(nbr_net_id))
            || (hello.bdr == Some(nbr_net_id) && nbr.bdr != Some(nbr_net_id))
            || (hello.bdr != Some(nbr_net_id) && nbr.bdr == Some(nbr_net_id))
        {
            protocol_input.ism_event(area.id, iface.id, ism::Event::NbrChange);
        }

        // Update neighbor's DR/BDR.
        nbr.dr = hello.dr;
        nbr.bdr = hello.bdr;
    }

    // Rerun the MDR election with the updated neighborhood.
    if iface.is_manet() && iface.config.flooding == FloodingMode::MdrSicds {
        mdr::update_mdr(iface, area, instance, neighbors);
    }

    Ok(())
}

fn process_packet_hello_sanity_checks(
    iface: &Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
    hello: &Hello,
) -> Result<(), InterfaceCfgError> {
    // Check for HelloInterval mismatch.
    if hello.hello_interval != iface.config.hello_interval {
        return Err(InterfaceCfgError::HelloIntervalMismatch(
            hello.hello_interval,
            iface.config.hello_interval,
        ));
    }

    // Check for RouterDeadInterval mismatch.
    if hello.dead_interval != iface.config.dead_interval {
        return Err(InterfaceCfgError::DeadIntervalMismatch(
            hello.dead_interval,
            iface.config.dead_interval,
        ));
    }

    // Check for ExternalRoutingCapability mismatch.
    if hello.options.e_bit() && area.config.area_type != AreaType::Normal
        || !hello.options.e_bit()
            && area.config.area_type == AreaType::Normal
    {
        return Err(InterfaceCfgError::ExternalRoutingCapabilityMismatch(
            hello.options.e_bit(),
        ));
    }

    // Check for duplicate Router ID. A collision is diagnosed but never
    // fatal.
    if hello.hdr.router_id == instance.state.router_id {
        return Err(InterfaceCfgError::DuplicateRouterId(
            hello.hdr.router_id,
        ));
    }

    Ok(())
}

fn process_packet_dbdesc(
    nbr_idx: NeighborIndex,
    iface_idx: InterfaceIndex,
    area_idx: AreaIndex,
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    src: Ipv6Addr,
    dbdesc: DbDesc,
) -> Result<(), Error> {
    let InstanceArenas {
        areas,
        interfaces,
        neighbors,
        lsa_entries,
    } = arenas;
    let area = &areas[area_idx];
    let iface = &mut interfaces[iface_idx];
    let nbr = &mut neighbors[nbr_idx];

    // MTU mismatch check, unless disabled by configuration.
    if !iface.config.mtu_ignore
        && dbdesc.mtu > iface.system.mtu.unwrap_or(u16::MAX)
    {
        return Err(Error::InterfaceCfgError(
            iface.name.clone(),
            src,
            crate::packet::PacketType::DbDesc,
            InterfaceCfgError::MtuMismatch(dbdesc.mtu),
        ));
    }

    // Further processing depends on the neighbor's state.
    match nbr.state {
        nsm::State::Down | nsm::State::Attempt | nsm::State::TwoWay => {
            return Err(Error::DbDescReject(nbr.router_id, nbr.state));
        }
        nsm::State::Init | nsm::State::ExStart => {
            if nbr.state == nsm::State::Init {
                let event = nsm::Event::TwoWayRcvd;
                nbr.fsm(iface, area, instance, lsa_entries, event);
                if nbr.state != nsm::State::ExStart {
                    return Ok(());
                }
                // Fall through to the ExStart case.
            }

            if dbdesc
                .dd_flags
                .contains(DbDescFlags::I | DbDescFlags::M | DbDescFlags::MS)
                && dbdesc.lsa_hdrs.is_empty()
                && dbdesc.hdr.router_id > instance.state.router_id
            {
                // Set the master/slave bit to slave, and set the neighbor
                // data structure's DD sequence number to that specified by
                // the master.
                nbr.dd_flags.remove(DbDescFlags::MS);
                nbr.dd_seq_no = dbdesc.dd_seq_no;
            } else if !dbdesc
                .dd_flags
                .contains(DbDescFlags::I | DbDescFlags::MS)
                && dbdesc.dd_seq_no == nbr.dd_seq_no
                && dbdesc.hdr.router_id < instance.state.router_id
            {
                // In this case the router is Master.
            } else {
                // Ignore the packet.
                return Ok(());
            }

            nbr.options = Some(dbdesc.options);
            let event = nsm::Event::NegotiationDone;
            nbr.fsm(iface, area, instance, lsa_entries, event);
        }
        nsm::State::Exchange => {
            // Check for duplicate packet.
            if nbr.dbdesc_is_dup(&dbdesc) {
                // The slave needs to retransmit the last Database
                // Description packet that it had sent.
                if !nbr.dd_flags.contains(DbDescFlags::MS) {
                    output::rxmt_dbdesc(nbr, iface);
                }

                return Ok(());
            }

            // Sanity checks.
            let last_rcvd_dbdesc = nbr.last_rcvd_dbdesc.as_ref().unwrap();
            if dbdesc.dd_flags.contains(DbDescFlags::I)
                || dbdesc.dd_flags.contains(DbDescFlags::MS)
                    != last_rcvd_dbdesc.dd_flags.contains(DbDescFlags::MS)
            {
                let reason = SeqNoMismatchReason::InconsistentFlags;
                let event = nsm::Event::SeqNoMismatch(reason);
                nbr.fsm(iface, area, instance, lsa_entries, event);
                return Ok(());
            }
            if dbdesc.options != last_rcvd_dbdesc.options {
                let reason = SeqNoMismatchReason::InconsistentOptions;
                let event = nsm::Event::SeqNoMismatch(reason);
                nbr.fsm(iface, area, instance, lsa_entries, event);
                return Ok(());
            }
            if (nbr.dd_flags.contains(DbDescFlags::MS)
                && dbdesc.dd_seq_no != nbr.dd_seq_no)
                || (!nbr.dd_flags.contains(DbDescFlags::MS)
                    && dbdesc.dd_seq_no != nbr.dd_seq_no + 1)
            {
                let reason = SeqNoMismatchReason::InconsistentSeqNo;
                let event = nsm::Event::SeqNoMismatch(reason);
                nbr.fsm(iface, area, instance, lsa_entries, event);
                return Ok(());
            }
        }
        nsm::State::Loading | nsm::State::Full => {
            // Check for duplicate packet.
            if nbr.dbdesc_is_dup(&dbdesc) {
                // The slave must respond to duplicates by repeating the
                // last Database Description packet that it had sent.
                if !nbr.dd_flags.contains(DbDescFlags::MS) {
                    output::rxmt_dbdesc(nbr, iface);
                }

                return Ok(());
            }

            let reason = SeqNoMismatchReason::UnexpectedDbDesc;
            let event = nsm::Event::SeqNoMismatch(reason);
            nbr.fsm(iface, area, instance, lsa_entries, event);
            return Ok(());
        }
    }

    // If we got this far it means the packet was accepted. Stop the
    // retransmission interval in case it's active.
    nbr.rxmt_dbdesc_stop();

    // Now iterate over all LSA headers.
    let mut cache_promotions = vec![];
    for lsa_hdr in &dbdesc.lsa_hdrs {
        // Check if the LSA is valid for this area.
        if !lsa_type_is_valid(Some(area.config.area_type), lsa_hdr.lsa_type) {
            let reason = SeqNoMismatchReason::InvalidLsaType;
            let event = nsm::Event::SeqNoMismatch(reason);
            nbr.fsm(iface, area, instance, lsa_entries, event);
            return Ok(());
        }

        // If the Database summary list contains an instance of the LSA
        // that is the same as or less recent than the listed LSA, the LSA
        // is removed from the Database summary list.
        let lsa_key = lsa_hdr.key();
        if let btree_map::Entry::Occupied(o) =
            nbr.lists.db_summary.entry(lsa_key)
        {
            let db_summ_lsa = o.get();
            if lsa_compare(&db_summ_lsa.hdr, lsa_hdr) != Ordering::Greater {
                o.remove();
            }
        }

        // Put the LSA on the Link state request list if it's not present
        // on the LSDB, or if the local copy is less recent than the
        // received one.
        let lsdb = match lsa_hdr.lsa_type.scope() {
            LsaScope::Link => &iface.state.lsdb,
            LsaScope::Area => &area.state.lsdb,
            LsaScope::As => &instance.state.lsdb,
            LsaScope::Unknown => unreachable!(),
        };
        if let Some((_, lse)) = lsdb.get(lsa_entries, &lsa_key)
            && lsa_compare(&lse.data.hdr, lsa_hdr) != Ordering::Less
        {
            continue;
        }

        // A same-or-newer copy cached from a not-yet-adjacent neighbor in
        // the scope-matched LSDB saves the request.
        if let Some(cached) = lsdb.cache_get(&lsa_key)
            && lsa_compare(&cached.hdr, lsa_hdr) != Ordering::Less
        {
            cache_promotions.push(cached.clone());
            continue;
        }

        nbr.lists.ls_request.insert(lsa_key, *lsa_hdr);
    }

    // Start sending Link State Request packets.
    if !nbr.lists.ls_request.is_empty()
        && nbr.lists.ls_request_pending.is_empty()
    {
        output::send_lsreq(nbr, iface, area, instance);
    }

    // Further processing depends on whether the router is master or slave.
    let mut exchange_done = false;
    if nbr.dd_flags.contains(DbDescFlags::MS) {
        nbr.dd_seq_no += 1;

        if !nbr.dd_flags.contains(DbDescFlags::M)
            && !dbdesc.dd_flags.contains(DbDescFlags::M)
        {
            exchange_done = true;
        } else {
            output::send_dbdesc(nbr, iface, area, instance);
        }
    } else {
        nbr.dd_seq_no = dbdesc.dd_seq_no;

        output::send_dbdesc(nbr, iface, area, instance);

        if !nbr.dd_flags.contains(DbDescFlags::M)
            && !dbdesc.dd_flags.contains(DbDescFlags::M)
        {
            exchange_done = true;
        }
    }
    if exchange_done {
        nbr.fsm(iface, area, instance, lsa_entries, nsm::Event::ExchangeDone);

        // The slave must wait RouterDeadInterval seconds before freeing
        // the last Database Description packet. Reception of a Database
        // Description packet from the master after this interval will
        // generate a SeqNumberMismatch neighbor event.
        if !nbr.dd_flags.contains(DbDescFlags::MS) {
            let dbdesc_free_timer =
                tasks::dbdesc_free_timer(nbr, iface, area, instance);
            nbr.tasks.dbdesc_free_timer = Some(dbdesc_free_timer);
        }
    }

    // Save last received Database Description packet.
    nbr.last_rcvd_dbdesc = Some(LastDbDesc {
        options: dbdesc.options,
        dd_flags: dbdesc.dd_flags,
        dd_seq_no: dbdesc.dd_seq_no,
    });

    // Install the cached copies that made requests unnecessary.
    for lsa in cache_promotions {
        let lsdb_idx = lsdb::lsdb_get_by_lsa_type(
            iface_idx,
            area_idx,
            lsa.hdr.lsa_type,
        );
        let lse_idx = lsdb::install(instance, arenas, lsdb_idx, lsa);
        let lse = &mut arenas.lsa_entries[lse_idx];
        lse.flags.insert(LsaEntryFlags::RECEIVED);
    }

    Ok(())
}

fn process_packet_lsreq(
    nbr_idx: NeighborIndex,
    iface_idx: InterfaceIndex,
    area_idx: AreaIndex,
    instance: &InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    ls_req: LsRequest,
) -> Result<(), Error> {
    let InstanceArenas {
        areas,
        interfaces,
        neighbors,
        lsa_entries,
    } = arenas;
    let area = &areas[area_idx];
    let iface = &mut interfaces[iface_idx];
    let nbr = &mut neighbors[nbr_idx];

    if nbr.state < nsm::State::Exchange {
        Debug::PacketRxIgnore(nbr.router_id, &nbr.state).log();
        return Ok(());
    }

    // Iterate over all request entries.
    for lsa_key in &ls_req.entries {
        // Locate LSA in the LSDB.
        let lsdb = match lsa_key.lsa_type.scope() {
            LsaScope::Link => &iface.state.lsdb,
            LsaScope::Area => &area.state.lsdb,
            LsaScope::As => &instance.state.lsdb,
            LsaScope::Unknown => {
                // Ignore requests for LSAs of unknown scope.
                continue;
            }
        };

        if let Some((_, lse)) = lsdb.get(lsa_entries, lsa_key) {
            // Copy LSA for transmission to the neighbor.
            let lsa = lse.data.clone();
            nbr.lists.ls_update.insert(*lsa_key, lsa);
        } else {
            // Something has gone wrong with the Database Exchange process.
            nbr.fsm(iface, area, instance, lsa_entries, nsm::Event::BadLsReq);
            return Ok(());
        }
    }

    // Schedule transmission of new LS Update.
    if !nbr.lists.ls_update.is_empty() {
        instance
            .tx
            .protocol_input
            .send_lsupd(area.id, iface.id, Some(nbr.id));
    }

    Ok(())
}

fn process_packet_lsupd(
    nbr_idx: NeighborIndex,
    iface_idx: InterfaceIndex,
    area_idx: AreaIndex,
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    mcast: bool,
    ls_upd: LsUpdate,
) -> Result<(), Error> {
    let nbr = &arenas.neighbors[nbr_idx];
    let nbr_router_id = nbr.router_id;
    let nbr_state = nbr.state;
    if nbr_state < nsm::State::Exchange {
        // On MANET interfaces, LSAs overheard from not-yet-adjacent
        // neighbors are retained in the cache LSDB so they need not be
        // requested once the adjacency forms.
        if arenas.interfaces[iface_idx].is_manet() {
            for lsa in ls_upd.lsas {
                cache_below_exchange(
                    iface_idx, area_idx, instance, arenas, lsa,
                );
            }
        } else {
            Debug::PacketRxIgnore(nbr_router_id, &nbr_state).log();
        }
        return Ok(());
    }

    // Process all LSAs contained in the packet.
    for lsa in ls_upd.lsas {
        let stop = process_packet_lsupd_lsa(
            nbr_idx, iface_idx, area_idx, instance, arenas, mcast, lsa,
        );
        if stop {
            break;
        }
    }

    Ok(())
}

// Stores an LSA heard from a not-yet-adjacent neighbor in the cache of
// the LSDB matching its scope.
fn cache_below_exchange(
    iface_idx: InterfaceIndex,
    area_idx: AreaIndex,
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    lsa: Lsa,
) {
    let area = &arenas.areas[area_idx];
    let iface = &arenas.interfaces[iface_idx];

    if lsa.validate().is_err() {
        return;
    }
    if !lsa_type_is_valid(Some(area.config.area_type), lsa.hdr.lsa_type) {
        return;
    }

    // Skip instances the scope-matched LSDB already covers.
    let lsa_key = lsa.hdr.key();
    let scope = lsa.hdr.lsa_type.scope();
    let lsdb = match scope {
        LsaScope::Link => &iface.state.lsdb,
        LsaScope::Area => &area.state.lsdb,
        LsaScope::As => &instance.state.lsdb,
        LsaScope::Unknown => return,
    };
    if let Some((_, lse)) = lsdb.get(&arenas.lsa_entries, &lsa_key)
        && lsa_compare(&lse.data.hdr, &lsa.hdr) != Ordering::Less
    {
        return;
    }

    // Keep only the most recent cached instance.
    if let Some(cached) = lsdb.cache_get(&lsa_key)
        && lsa_compare(&cached.hdr, &lsa.hdr) != Ordering::Less
    {
        return;
    }

    let lsdb = match scope {
        LsaScope::Link => &mut arenas.interfaces[iface_idx].state.lsdb,
        LsaScope::Area => &mut arenas.areas[area_idx].state.lsdb,
        LsaScope::As => &mut instance.state.lsdb,
        LsaScope::Unknown => unreachable!(),
    };
    lsdb.cache_insert(Arc::new(lsa));
}

fn process_packet_lsupd_lsa(
    nbr_idx: NeighborIndex,
    iface_idx: InterfaceIndex,
    area_idx: AreaIndex,
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    mcast: bool,
    lsa: Lsa,
) -> bool {
    let nbr = &arenas.neighbors[nbr_idx];
    let iface = &arenas.interfaces[iface_idx];
    let area = &arenas.areas[area_idx];
    let nbr_router_id = nbr.router_id;

    // (1) Validate the LSA checksum (and the rest of the header).
    if let Err(error) = lsa.validate() {
        // Log why the LSA is being discarded.
        Debug::LsaDiscard(nbr.router_id, &lsa.hdr, &error).log();

        // Examine the next LSA.
        return false;
    }

    // (2) Reject AS-scope LSAs received on stub/NSSA areas.
    if !lsa_type_is_valid(Some(area.config.area_type), lsa.hdr.lsa_type) {
        // Examine the next LSA.
        return false;
    }

    // (3) Resolve the LSDB matching the LSA's scope.
    let lsdb_idx =
        lsdb::lsdb_get_by_lsa_type(iface_idx, area_idx, lsa.hdr.lsa_type);
    let lsdb = match lsdb_idx {
        LsdbIndex::Link(_, _) => &iface.state.lsdb,
        LsdbIndex::Area(_) => &area.state.lsdb,
        LsdbIndex::As => &instance.state.lsdb,
    };
    let lsa_key = lsa.hdr.key();
    let lse = lsdb.get(&arenas.lsa_entries, &lsa_key).map(|(_, lse)| lse);

    // (4) If the LSA's LS age is equal to MaxAge, and there is currently
    // no instance of the LSA in the router's link state database, and none
    // of the router's neighbors are in states Exchange or Loading, the LSA
    // is directly acknowledged and dropped.
    if lsa.hdr.is_maxage()
        && lse.is_none()
        && !arenas.neighbors.iter().any(|(_, nbr)| {
            matches!(nbr.state, nsm::State::Exchange | nsm::State::Loading)
        })
    {
        // Acknowledge the receipt of the LSA.
        output::send_lsack_direct(nbr, iface, area, instance, &lsa.hdr);

        // Examine the next LSA.
        return false;
    }

    // (5) There is no database copy, or the received LSA is more recent
    // than the database copy.
    let lsa_cmp = lse.map(|lse| lsa_compare(&lse.data.hdr, &lsa.hdr));
    if matches!(lsa_cmp, None | Some(Ordering::Less)) {
        // (5.a) MinLSArrival check.
        if let Some(lse) = lse
            && lsdb::lsa_min_arrival_check(lse)
        {
            // Log why the LSA is being discarded.
            Debug::LsaMinArrivalDiscard(nbr_router_id, &lsa.hdr).log();

            // Examine the next LSA.
            return false;
        }

        // Move LSA into a reference-counting pointer.
        let lsa = Arc::new(lsa);

        // (5.b) Immediately flood the new LSA out some subset of the
        // router's interfaces. Flooding happens before installation so
        // same-identity removals from retransmission lists see the correct
        // generation.
        let src = Some(FloodSource {
            iface_idx,
            nbr_idx,
            mcast,
        });
        let flooded_back = flood(
            instance,
            &arenas.areas,
            &mut arenas.interfaces,
            &mut arenas.neighbors,
            lsdb_idx,
            &lsa,
            src,
        );

        // (5.c) Remove the old instance from all Link state retransmission
        // lists; handled by the LSA installation below.

        // (5.d) Install the new LSA in the link state database (replacing
        // the current database copy).
        let lse_idx = lsdb::install(instance, arenas, lsdb_idx, lsa);
        let lse = &mut arenas.lsa_entries[lse_idx];
        lse.flags.insert(LsaEntryFlags::RECEIVED);
        let lsa_hdr = lse.data.hdr;
        let self_originated =
            lse.flags.contains(LsaEntryFlags::SELF_ORIGINATED);

        // Update statistics.
        instance.state.rx_lsa_count += 1;
        instance.state.discontinuity_time = Utc::now();

        // (5.e) Possibly acknowledge the receipt of the LSA by sending a
        // Link State Acknowledgment packet.
        let nbr = &arenas.neighbors[nbr_idx];
        let iface = &mut arenas.interfaces[iface_idx];
        let area = &arenas.areas[area_idx];
        let mut flags = LsaRxFlags::empty();
        if flooded_back {
            flags.insert(LsaRxFlags::FLOODBACK);
        }
        if mcast {
            flags.insert(LsaRxFlags::RECVMCAST);
        }
        flood::acknowledge_lsa(
            nbr, iface, area, instance, &lsa_hdr, true, flags,
        );

        // (5.f) Check if this is a self-originated LSA.
        if self_originated {
            Debug::LsaSelfOriginated(nbr_router_id, &lsa_hdr).log();

            // (Re)originate or flush self-originated LSA.
            let (lsdb_id, _) = lsdb_index(
                &instance.state.lsdb,
                &arenas.areas,
                &arenas.interfaces,
                lsdb_idx,
            );
            let lse_id = arenas.lsa_entries[lse_idx].id;
            instance.tx.protocol_input.lsa_orig_event(
                LsaOriginateEvent::SelfOriginatedLsaRcvd {
                    lsdb_id,
                    lse_id,
                },
            );
        }

        // Examine the next LSA.
        return false;
    }

    // (6) If there is an instance of the LSA on the sending neighbor's
    // Link state request list, an error has occurred in the Database
    // Exchange process.
    let nbr = &mut arenas.neighbors[nbr_idx];
    let iface = &mut arenas.interfaces[iface_idx];
    if nbr.lists.ls_request.contains_key(&lsa_key)
        || nbr.lists.ls_request_pending.contains_key(&lsa_key)
    {
        // Restart the Database Exchange process.
        nbr.fsm(
            iface,
            area,
            instance,
            &arenas.lsa_entries,
            nsm::Event::BadLsReq,
        );

        // Stop processing the Link State Update packet.
        return true;
    }

    // (7) Check if the received LSA is the same instance as the database
    // copy (i.e., neither one is more recent).
    if lsa_cmp == Some(Ordering::Equal) {
        let mut flags = LsaRxFlags::DUPLICATE;
        if mcast {
            flags.insert(LsaRxFlags::RECVMCAST);
        }

        // The duplicate proves the sender (and, if multicast, its reported
        // neighbors) received the pushed-back LSA.
        if iface.is_manet() {
            let proxy_mcast = mcast
                && iface.config.flooding == FloodingMode::MdrSicds;
            let nbr = &arenas.neighbors[nbr_idx];
            pushback::duplicate_received(iface, nbr, &lsa_key, proxy_mcast);
        }

        // Check if this LSA can be handled as an implied acknowledgment.
        let nbr = &mut arenas.neighbors[nbr_idx];
        if let btree_map::Entry::Occupied(o) = nbr.lists.ls_rxmt.entry(lsa_key)
        {
            o.remove();
            nbr.rxmt_lsupd_stop_check();
            flags.insert(LsaRxFlags::IMPLIEDACK);
        }

        // Possibly acknowledge per the policy table.
        let nbr = &arenas.neighbors[nbr_idx];
        let area = &arenas.areas[area_idx];
        flood::acknowledge_lsa(
            nbr, iface, area, instance, &lsa.hdr, false, flags,
        );

        // Examine the next LSA.
        return false;
    }

    // (8) The database copy is more recent.
    //
    // If the database copy has LS age equal to MaxAge and LS sequence
    // number equal to MaxSequenceNumber, simply discard the received LSA
    // without acknowledging it, as the sequence number is wrapping.
    let lsdb = match lsdb_idx {
        LsdbIndex::Link(_, _) => &iface.state.lsdb,
        LsdbIndex::Area(_) => &area.state.lsdb,
        LsdbIndex::As => &instance.state.lsdb,
    };
    let (_, lse) = lsdb.get(&arenas.lsa_entries, &lsa_key).unwrap();
    if lse.data.hdr.is_maxage()
        && lse.data.hdr.seq_no == lsdb::LSA_MAX_SEQ_NO
    {
        // Examine the next LSA.
        return false;
    }
    if !lsdb::lsa_min_arrival_check(lse) {
        // Send the database copy back to the sending neighbor,
        // encapsulated within a Link State Update packet.
        let data = lse.data.clone();
        let nbr = &mut arenas.neighbors[nbr_idx];
        nbr.lists.ls_update.insert(lsa_key, data);
        instance
            .tx
            .protocol_input
            .send_lsupd(area.id, iface.id, Some(nbr.id));
    } else {
        // Log why the LSA is being discarded.
        Debug::LsaMinArrivalDiscard(nbr_router_id, &lsa.hdr).log();
    }

    // Examine the next LSA.
    false
}

fn process_packet_lsack(
    nbr_idx: NeighborIndex,
    iface_idx: InterfaceIndex,
    area_idx: AreaIndex,
    _instance: &InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    mcast: bool,
    ls_ack: LsAck,
) -> Result<(), Error> {
    let _ = area_idx;
    let iface = &mut arenas.interfaces[iface_idx];
    let nbr = &mut arenas.neighbors[nbr_idx];

    if nbr.state < nsm::State::Exchange {
        Debug::PacketRxIgnore(nbr.router_id, &nbr.state).log();
        return Ok(());
    }

    // Iterate over all LSA headers.
    for lsa_hdr in &ls_ack.lsa_hdrs {
        let lsa_key = lsa_hdr.key();

        // Multicast acknowledgements on MANET interfaces feed the per
        // neighbor ack cache and prune pushback wait lists.
        if mcast && iface.is_manet() {
            flood::register_multicast_ack(nbr, iface, lsa_hdr);
            pushback::ack_received(iface, nbr.router_id, &lsa_key);
        }

        if let btree_map::Entry::Occupied(o) = nbr.lists.ls_rxmt.entry(lsa_key)
        {
            let lsa = o.get();
            if lsa_compare(&lsa.hdr, lsa_hdr) == Ordering::Equal {
                o.remove();
                nbr.rxmt_lsupd_stop_check();
            } else {
                Debug::QuestionableAck(nbr.router_id, lsa_hdr).log();
            }
        }
    }

    Ok(())
}

// ===== Hello transmission =====

pub(crate) fn process_send_hello(
    instance: &InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    area_key: AreaKey,
    iface_key: InterfaceKey,
) -> Result<(), Error> {
    let (_, area) = arenas.areas.get_mut_by_key(&area_key)?;
    let (_, iface) = area
        .interfaces
        .get_mut_by_key(&mut arenas.interfaces, &iface_key)?;

    if iface.is_down() || iface.is_passive() || iface.state.net.is_none() {
        return Ok(());
    }

    // Refresh the relay set before advertising it.
    mpr::update_relays(
        iface,
        area,
        instance,
        &arenas.neighbors,
        &arenas.lsa_entries,
    );

    // Every transmitted Hello bumps the sequence number used by
    // differential Hellos.
    iface.state.manet.hello_seq = iface.state.manet.hello_seq.wrapping_add(1);

    let packet = iface.generate_hello(area, instance, &arenas.neighbors);
    let dst = iface.hello_destination(&arenas.neighbors);
    iface.send_packet(crate::tasks::messages::output::NetTxPacketMsg {
        packet,
        dst,
    });

    Ok(())
}

// ===== Free last sent/received Database Description packets =====

pub(crate) fn process_dbdesc_free(
    _instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    area_key: AreaKey,
    iface_key: InterfaceKey,
    nbr_key: NeighborKey,
) -> Result<(), Error> {
    // Lookup area, interface and neighbor.
    let (_, area) = arenas.areas.get_mut_by_key(&area_key)?;
    let (_, iface) = area
        .interfaces
        .get_mut_by_key(&mut arenas.interfaces, &iface_key)?;
    let (_, nbr) = iface
        .state
        .neighbors
        .get_mut_by_key(&mut arenas.neighbors, &nbr_key)?;

    // Free last sent/received Database Description packets.
    nbr.tasks.dbdesc_free_timer = None;
    nbr.last_rcvd_dbdesc = None;
    nbr.last_sent_dbdesc = None;

    Ok(())
}

// ===== Request to send LS Update =====

pub(crate) fn process_send_lsupd(
    instance: &InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    area_key: AreaKey,
    iface_key: InterfaceKey,
    nbr_key: Option<NeighborKey>,
) -> Result<(), Error> {
    // Lookup area, interface and optional neighbor.
    let (_, area) = arenas.areas.get_mut_by_key(&area_key)?;
    let (_, iface) = area
        .interfaces
        .get_mut_by_key(&mut arenas.interfaces, &iface_key)?;
    let nbr_idx = match &nbr_key {
        Some(nbr_key) => {
            let (nbr_idx, _) = iface
                .state
                .neighbors
                .get_mut_by_key(&mut arenas.neighbors, nbr_key)?;
            Some(nbr_idx)
        }
        None => None,
    };

    // Send LS Update.
    iface.state.tasks.ls_update_timer = None;
    output::send_lsupd(nbr_idx, iface, area, instance, &mut arenas.neighbors);

    Ok(())
}

// ===== Packet retransmission =====

pub(crate) fn process_packet_rxmt(
    instance: &InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    area_key: AreaKey,
    iface_key: InterfaceKey,
    nbr_key: NeighborKey,
    packet_type: RxmtPacketType,
) -> Result<(), Error> {
    // Lookup area, interface and neighbor.
    let (_, area) = arenas.areas.get_mut_by_key(&area_key)?;
    let (_, iface) = area
        .interfaces
        .get_mut_by_key(&mut arenas.interfaces, &iface_key)?;
    let (_, nbr) = iface
        .state
        .neighbors
        .get_mut_by_key(&mut arenas.neighbors, &nbr_key)?;

    // Retransmit packet.
    match packet_type {
        RxmtPacketType::DbDesc => {
            output::rxmt_dbdesc(nbr, iface);
        }
        RxmtPacketType::LsRequest => {
            output::rxmt_lsreq(nbr, iface, area, instance);
        }
        RxmtPacketType::LsUpdate => {
            output::rxmt_lsupd(nbr, iface, area, instance);
        }
    }

    Ok(())
}

// ===== Delayed Ack timeout =====

pub(crate) fn process_delayed_ack_timeout(
    instance: &InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    area_key: AreaKey,
    iface_key: InterfaceKey,
) -> Result<(), Error> {
    // Lookup area and interface.
    let (_, area) = arenas.areas.get_mut_by_key(&area_key)?;
    let (_, iface) = area
        .interfaces
        .get_mut_by_key(&mut arenas.interfaces, &iface_key)?;

    // Send delayed LS Ack.
    iface.state.tasks.ls_delayed_ack = None;
    output::send_lsack_delayed(iface, area, instance, &arenas.neighbors);

    Ok(())
}

// ===== LSA origination check =====

pub(crate) fn process_lsa_orig_check(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    lsdb_key: LsdbKey,
    lsa_id: Ipv4Addr,
    lsa_body: LsaBody,
) -> Result<(), Error> {
    // Lookup LSDB.
    let (lsdb_idx, _) = lsdb_get(
        &instance.state.lsdb,
        &arenas.areas,
        &arenas.interfaces,
        &lsdb_key,
    )?;

    // Attempt to originate LSA.
    lsdb::originate_check(instance, arenas, lsdb_idx, lsa_id, lsa_body);

    Ok(())
}

// ===== LSA delayed origination timer =====

pub(crate) fn process_lsa_orig_delayed_timer(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    lsdb_key: LsdbKey,
    lsa_key: LsaKey,
) -> Result<(), Error> {
    // Lookup LSDB.
    let (lsdb_idx, lsdb) = lsdb_get_mut(
        &mut instance.state.lsdb,
        &mut arenas.areas,
        &mut arenas.interfaces,
        &lsdb_key,
    )?;

    // Originate LSA.
    if let Some(ldo) = lsdb.delayed_orig.remove(&lsa_key) {
        lsdb::originate(instance, arenas, lsdb_idx, ldo.data);
    }

    Ok(())
}

// ===== LSA flush event =====

pub(crate) fn process_lsa_flush(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    lsdb_key: LsdbKey,
    lse_key: LsaEntryKey,
    reason: LsaFlushReason,
) -> Result<(), Error> {
    // Lookup LSA entry and its corresponding LSDB.
    let (lsdb_idx, lsdb) = lsdb_get_mut(
        &mut instance.state.lsdb,
        &mut arenas.areas,
        &mut arenas.interfaces,
        &lsdb_key,
    )?;
    let (lse_idx, _) = lsdb.get_mut_by_key(&mut arenas.lsa_entries, &lse_key)?;

    // Flush LSA.
    lsdb::flush(instance, arenas, lsdb_idx, lse_idx, reason);

    Ok(())
}

// ===== LSA refresh event =====

pub(crate) fn process_lsa_refresh(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    lsdb_key: LsdbKey,
    lse_key: LsaEntryKey,
) -> Result<(), Error> {
    // Lookup LSA entry and its corresponding LSDB.
    let (lsdb_idx, lsdb) = lsdb_get_mut(
        &mut instance.state.lsdb,
        &mut arenas.areas,
        &mut arenas.interfaces,
        &lsdb_key,
    )?;
    let (_, lse) = lsdb.get_by_key(&arenas.lsa_entries, &lse_key)?;

    assert!(lse.flags.contains(LsaEntryFlags::SELF_ORIGINATED));

    Debug::LsaRefresh(&lse.data.hdr).log();

    // Originate new instance of the LSA.
    let lsa = Lsa::new(
        0,
        lse.data.hdr.lsa_id,
        lse.data.hdr.adv_rtr,
        lse.data.hdr.seq_no + 1,
        lse.data.body.clone(),
    );
    lsdb::originate(instance, arenas, lsdb_idx, lsa);

    Ok(())
}

// ===== LSDB MaxAge sweep timer =====

pub(crate) fn process_lsdb_maxage_sweep_interval(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    lsdb_key: LsdbKey,
) -> Result<(), Error> {
    // Lookup LSDB.
    let (lsdb_idx, lsdb) = lsdb_get(
        &instance.state.lsdb,
        &arenas.areas,
        &arenas.interfaces,
        &lsdb_key,
    )?;

    // Skip discarding MaxAge LSAs if any of the router's neighbors are in
    // states Exchange or Loading.
    if arenas.neighbors.iter().any(|(_, nbr)| {
        matches!(nbr.state, nsm::State::Exchange | nsm::State::Loading)
    }) {
        return Ok(());
    }

    // Get list of MaxAge LSAs that are no longer contained on any neighbor
    // LS retransmission lists.
    let sweep: Vec<_> = lsdb
        .maxage_lsas
        .iter()
        .copied()
        .filter(|lse_idx| {
            let lse = &arenas.lsa_entries[*lse_idx];
            lsdb::rxmt_count(arenas, &lse.data) == 0
        })
        .collect();
    for lse_idx in sweep {
        let lsa_key = arenas.lsa_entries[lse_idx].data.hdr.key();
        let wrapping = {
            let (_, lsdb) = lsdb_index_mut(
                &mut instance.state.lsdb,
                &mut arenas.areas,
                &mut arenas.interfaces,
                lsdb_idx,
            );
            lsdb.seqno_wrapping.remove(&lsa_key)
        };

        // Delete or originate new instance of the LSA depending whether
        // it's wrapping its sequence number.
        match wrapping {
            Some(lsa) => {
                let lsa = Lsa::new(
                    0,
                    lsa.hdr.lsa_id,
                    lsa.hdr.adv_rtr,
                    lsdb::LSA_INIT_SEQ_NO,
                    lsa.body.clone(),
                );
                lsdb::originate(instance, arenas, lsdb_idx, lsa);
            }
            None => {
                let (_, lsdb) = lsdb_index_mut(
                    &mut instance.state.lsdb,
                    &mut arenas.areas,
                    &mut arenas.interfaces,
                    lsdb_idx,
                );
                lsdb.delete(&mut arenas.lsa_entries, lse_idx);
            }
        }
    }

    Ok(())
}
