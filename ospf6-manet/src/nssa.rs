//
// Copyright (c) The ospf6-manet Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use ipnetwork::Ipv6Network;

use crate::area::{AreaType, NssaTranslatorRole, NssaTranslatorState};
use crate::collections::{AreaIndex, AreaKey, LsdbId};
use crate::debug::Debug;
use crate::error::Error;
use crate::instance::{InstanceArenas, InstanceUpView};
use crate::lsdb::{self, LsaEntryFlags};
use crate::packet::lsa::{
    Lsa, LsaAsExternal, LsaAsExternalFlags, LsaBody, LsaKey, LsaRouterFlags,
    LsaType, PrefixOptions,
};
use crate::tasks;

// A route redistributed into OSPF by the ASBR collaborator.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RedistributedRoute {
    pub metric: u32,
    pub metric_type: ExternalMetricType,
    pub tag: Option<u32>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExternalMetricType {
    Type1,
    Type2,
}

// ===== global functions =====

// (Re)originates AS-External-LSAs and NSSA Type-7 LSAs for the
// redistributed route table, and flushes LSAs whose route is gone.
pub(crate) fn orig_external_lsas(
    instance: &InstanceUpView<'_>,
    arenas: &InstanceArenas,
) {
    let adv_rtr = instance.state.router_id;

    for (prefix, route) in &instance.state.redistributed {
        let Some(lsa_id) = instance.state.external_ids.get(prefix).copied()
        else {
            continue;
        };
        let lsa_id = Ipv4Addr::from(lsa_id);

        let mut flags = LsaAsExternalFlags::empty();
        if route.metric_type == ExternalMetricType::Type2 {
            flags.insert(LsaAsExternalFlags::E);
        }
        if route.tag.is_some() {
            flags.insert(LsaAsExternalFlags::T);
        }
        let body = LsaAsExternal::new(
            flags,
            route.metric,
            PrefixOptions::empty(),
            *prefix,
            None,
            route.tag,
            None,
            None,
        );

        // AS-scope external.
        instance.tx.protocol_input.lsa_orig_check(
            LsdbId::As,
            lsa_id,
            LsaBody::AsExternal(body.clone()),
        );

        // Type-7 into every NSSA area that allows redistribution. The
        // P-bit permits translation by the elected translator.
        for area in arenas
            .areas
            .iter()
            .filter(|area| area.config.area_type == AreaType::Nssa)
            .filter(|area| !area.config.nssa.no_redistribution)
        {
            let mut body = body.clone();
            body.prefix_options.insert(PrefixOptions::P);
            instance.tx.protocol_input.lsa_orig_check(
                LsdbId::Area(area.id),
                lsa_id,
                LsaBody::Type7(body),
            );
        }
    }

    // Flush externals whose redistributed route disappeared.
    for (prefix, lsa_id) in &instance.state.external_ids {
        if instance.state.redistributed.contains_key(prefix) {
            continue;
        }
        let lsa_id = Ipv4Addr::from(*lsa_id);

        let lsa_key = LsaKey::new(LsaType::AS_EXTERNAL, adv_rtr, lsa_id);
        if let Some((_, lse)) =
            instance.state.lsdb.get(&arenas.lsa_entries, &lsa_key)
        {
            lsdb::lsa_flush(instance, LsdbId::As, lse.id);
        }
        for area in arenas.areas.iter() {
            let lsa_key = LsaKey::new(LsaType::TYPE7, adv_rtr, lsa_id);
            if let Some((_, lse)) =
                area.state.lsdb.get(&arenas.lsa_entries, &lsa_key)
            {
                lsdb::lsa_flush(instance, LsdbId::Area(area.id), lse.id);
            }
        }
    }
}

// Runs the NSSA translator election on every NSSA area.
//
// The elected translator is the reachable NSSA border router with the
// NT-bit set and the highest Router ID. A router configured to always
// translate skips the election.
pub(crate) fn update_translator_election(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
) {
    let router_id = instance.state.router_id;
    let is_abr = arenas.areas.is_abr(&arenas.interfaces);

    for area_idx in arenas.areas.indexes().collect::<Vec<_>>() {
        let area = &arenas.areas[area_idx];
        if area.config.area_type != AreaType::Nssa {
            continue;
        }

        let elected = match area.config.nssa.translator_role {
            NssaTranslatorRole::Never => false,
            NssaTranslatorRole::Always => is_abr,
            NssaTranslatorRole::Candidate => {
                // Compare against every reachable translator candidate.
                is_abr
                    && !area
                        .state
                        .routers
                        .iter()
                        .filter(|(_, rtr)| {
                            rtr.flags.contains(
                                LsaRouterFlags::B | LsaRouterFlags::NT,
                            )
                        })
                        .any(|(rid, _)| *rid > router_id)
            }
        };

        let old_state = area.state.nssa.translator_state;
        match (old_state, elected) {
            (NssaTranslatorState::Disabled, true) => {
                Debug::NssaTranslatorElected(router_id).log();
                let area = &mut arenas.areas[area_idx];
                area.state.nssa.translator_state =
                    NssaTranslatorState::Enabled;
                area.state.nssa.stability_timer = None;
                instance.tx.protocol_input.lsa_orig_event(
                    lsdb::LsaOriginateEvent::NssaTranslatorChange {
                        area_id: area.id,
                    },
                );
            }
            (NssaTranslatorState::Enabled, false) => {
                // Keep translating for the stability interval before
                // withdrawing.
                let area = &arenas.areas[area_idx];
                if area.state.nssa.stability_timer.is_none() {
                    let task = tasks::nssa_stability_timer(
                        area,
                        instance,
                        area.config.nssa.stability_interval,
                    );
                    let area = &mut arenas.areas[area_idx];
                    area.state.nssa.stability_timer = Some(task);
                }
            }
            (NssaTranslatorState::Enabled, true) => {
                // Reelected: cancel a pending withdrawal.
                let area = &mut arenas.areas[area_idx];
                area.state.nssa.stability_timer = None;
            }
            (NssaTranslatorState::Disabled, false) => (),
        }
    }
}

// Stability interval expiration: effectively resign as translator.
pub(crate) fn process_stability_timeout(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    area_key: AreaKey,
) -> Result<(), Error> {
    let (area_idx, area) = arenas.areas.get_mut_by_key(&area_key)?;

    if area.state.nssa.translator_state != NssaTranslatorState::Enabled {
        return Ok(());
    }

    Debug::NssaTranslatorResigned(instance.state.router_id).log();
    area.state.nssa.translator_state = NssaTranslatorState::Disabled;
    area.state.nssa.stability_timer = None;

    // Withdraw every translated Type-5.
    flush_translated(instance, arenas, area_idx);

    Ok(())
}

// Reacts to a translator state change: start or stop translating the
// area's Type-7 database.
pub(crate) fn translator_state_changed(
    instance: &InstanceUpView<'_>,
    arenas: &InstanceArenas,
    area_idx: AreaIndex,
) {
    let area = &arenas.areas[area_idx];
    match area.state.nssa.translator_state {
        NssaTranslatorState::Enabled => {
            // Translate the entire Type-7 database of the area.
            for (_, lse) in area
                .state
                .lsdb
                .iter_by_type(&arenas.lsa_entries, LsaType::TYPE7)
                .filter(|(_, lse)| {
                    !lse.flags.contains(LsaEntryFlags::SELF_ORIGINATED)
                })
            {
                translate_type7(instance, arenas, area_idx, &lse.data);
            }
        }
        NssaTranslatorState::Disabled => {
            flush_translated(instance, arenas, area_idx);
        }
    }
}

// A Type-7 LSA was installed in the given area: translate or withdraw its
// Type-5 counterpart when acting as the elected translator.
pub(crate) fn type7_changed(
    instance: &InstanceUpView<'_>,
    arenas: &InstanceArenas,
    area_idx: AreaIndex,
    lsa: &Lsa,
) {
    let area = &arenas.areas[area_idx];
    if area.state.nssa.translator_state != NssaTranslatorState::Enabled {
        return;
    }
    if lsdb::lsa_is_self_originated(lsa, instance.state.router_id) {
        return;
    }

    translate_type7(instance, arenas, area_idx, lsa);
}

// Translates one Type-7 LSA into an AS-scope Type-5 (RFC 3101, adapted to
// OSPFv3 LSA formats).
fn translate_type7(
    instance: &InstanceUpView<'_>,
    arenas: &InstanceArenas,
    area_idx: AreaIndex,
    lsa: &Lsa,
) {
    let area = &arenas.areas[area_idx];
    let adv_rtr = instance.state.router_id;
    let Some(external) = lsa.body.as_type7() else {
        return;
    };

    // Only P-bit Type-7 LSAs are translated.
    if !external.prefix_options.contains(PrefixOptions::P) {
        return;
    }

    // A MaxAge Type-7 withdraws its translation.
    if lsa.hdr.is_maxage() {
        if let Some(lsa_id) =
            area.state.nssa.translated.get(&lsa.hdr.key()).copied()
            && let Some((_, lse)) = instance.state.lsdb.get(
                &arenas.lsa_entries,
                &LsaKey::new(LsaType::AS_EXTERNAL, adv_rtr, lsa_id),
            )
        {
            lsdb::lsa_flush(instance, LsdbId::As, lse.id);
        }
        return;
    }

    // Skip translation when a more preferred locally originated Type-5
    // already covers the prefix.
    if instance.state.external_ids.contains_key(&external.prefix) {
        return;
    }

    // Reuse the Type-5 LSA-ID from a previous translation of the same
    // Type-7, or allocate a new one.
    let lsa_id = match area.state.nssa.translated.get(&lsa.hdr.key()) {
        Some(lsa_id) => *lsa_id,
        None => {
            let id = instance.state.next_external_id.get();
            instance.state.next_external_id.set(id.wrapping_add(1));
            Ipv4Addr::from(id)
        }
    };

    // The translation must not be a no-op: an identical Type-5 in the
    // LSDB means there is nothing to do.
    let lsa_key = LsaKey::new(LsaType::AS_EXTERNAL, adv_rtr, lsa_id);
    let body = LsaBody::AsExternal(external.clone());
    if let Some((_, lse)) =
        instance.state.lsdb.get(&arenas.lsa_entries, &lsa_key)
        && !lse.data.hdr.is_maxage()
        && lse.data.body == body
    {
        return;
    }

    instance
        .tx
        .protocol_input
        .lsa_orig_check(LsdbId::As, lsa_id, body);
    instance
        .tx
        .protocol_input
        .nssa_translated(area.id, lsa.hdr.key(), lsa_id);
}

// Records the Type-7 to Type-5 LSA-ID binding produced by a translation.
pub(crate) fn process_translated(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    area_key: AreaKey,
    type7_key: LsaKey,
    lsa_id: Ipv4Addr,
) -> Result<(), Error> {
    let (_, area) = arenas.areas.get_mut_by_key(&area_key)?;
    area.state.nssa.translated.insert(type7_key, lsa_id);

    // Mark the Type-5 as the product of a translation.
    let adv_rtr = instance.state.router_id;
    let lsa_key = LsaKey::new(LsaType::AS_EXTERNAL, adv_rtr, lsa_id);
    if let Some((_, lse)) = instance
        .state
        .lsdb
        .get_mut(&mut arenas.lsa_entries, &lsa_key)
    {
        lse.flags.insert(LsaEntryFlags::TRANSLATED);
    }

    Ok(())
}

// Flushes every Type-5 produced by translating the area's Type-7 LSAs.
fn flush_translated(
    instance: &InstanceUpView<'_>,
    arenas: &InstanceArenas,
    area_idx: AreaIndex,
) {
    let area = &arenas.areas[area_idx];
    let adv_rtr = instance.state.router_id;

    for lsa_id in area.state.nssa.translated.values() {
        let lsa_key = LsaKey::new(LsaType::AS_EXTERNAL, adv_rtr, *lsa_id);
        if let Some((_, lse)) =
            instance.state.lsdb.get(&arenas.lsa_entries, &lsa_key)
            && !lse.data.hdr.is_maxage()
        {
            lsdb::lsa_flush(instance, LsdbId::As, lse.id);
        }
    }
}

// Allocates external LSA-IDs for newly redistributed routes. Called when
// the redistributed route table changes.
pub(crate) fn assign_external_ids(instance: &mut InstanceUpView<'_>) {
    let redistributed: Vec<Ipv6Network> =
        instance.state.redistributed.keys().copied().collect();
    for prefix in redistributed {
        if !instance.state.external_ids.contains_key(&prefix) {
            let id = instance.state.next_external_id.get();
            instance.state.next_external_id.set(id.wrapping_add(1));
            instance
                .state
                .external_ids
                .insert(prefix, id);
        }
    }
}
