//
// Copyright (c) The ospf6-manet Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::Arc;
use std::time::{Duration, Instant};

use ospf6_manet_utils::socket::{AsyncFd, Socket};
use ospf6_manet_utils::task::{IntervalTask, Task, TimeoutTask};
use ospf6_manet_utils::{Sender, UnboundedReceiver, UnboundedSender};
use tracing::{Instrument, debug_span};

use crate::area::Area;
use crate::collections::{LsaEntryId, LsdbId};
use crate::debug::LsaFlushReason;
use crate::instance::InstanceUpView;
use crate::interface::{Interface, InterfaceType, ism};
use crate::lsdb;
use crate::neighbor::{Neighbor, nsm};
use crate::packet::lsa::{Lsa, LsaKey};
use crate::spf;

//
// Tasks diagram:
//
//                      net_rx (Nx) -> |              | -> (Nx) net_tx
//                                     |              |
//               hello_interval (Nx) -> |              |
//               ism_wait_timer (Nx) -> |              |
//         nsm_inactivity_timer (Nx) -> |              |
//         packet_rxmt_interval (Nx) -> |              |
//            dbdesc_free_timer (Nx) -> |              |
//              ls_update_timer (Nx) -> |   instance   |
//            delayed_ack_timer (Nx) -> |              |
//               pushback_timer (Nx) -> |              |
//             lsa_expiry_timer (Nx) -> |              |
//            lsa_refresh_timer (Nx) -> |              |
//       lsa_orig_delayed_timer (Nx) -> |              |
//   lsdb_maxage_sweep_interval (Nx) -> |              |
//              spf_delay_timer (Nx) -> |              |
//         nssa_stability_timer (Nx) -> |              |
//

// Inter-task message types.
pub mod messages {
    use std::net::Ipv4Addr;

    use serde::{Deserialize, Serialize};

    use crate::collections::{
        AreaKey, InterfaceKey, LsaEntryKey, LsdbKey, NeighborKey,
    };
    use crate::debug::LsaFlushReason;
    use crate::interface::ism;
    use crate::lsdb::LsaOriginateEvent;
    use crate::neighbor::{RxmtPacketType, nsm};
    use crate::packet::lsa::{LsaBody, LsaKey};
    use crate::spf;

    // Type aliases.
    pub type ProtocolInputMsg = input::ProtocolMsg;
    pub type ProtocolOutputMsg = output::ProtocolMsg;

    // Input messages (child task -> main task).
    pub mod input {
        use super::*;
        use crate::packet::Packet;
        use crate::packet::error::DecodeError;

        #[derive(Debug, Deserialize, Serialize)]
        pub enum ProtocolMsg {
            IsmEvent(IsmEventMsg),
            NsmEvent(NsmEventMsg),
            NetRxPacket(NetRxPacketMsg),
            SendHello(SendHelloMsg),
            DbDescFree(DbDescFreeMsg),
            SendLsUpdate(SendLsUpdateMsg),
            RxmtInterval(RxmtIntervalMsg),
            DelayedAck(DelayedAckMsg),
            PushbackTimeout(PushbackTimeoutMsg),
            LsaOrigEvent(LsaOrigEventMsg),
            LsaOrigCheck(LsaOrigCheckMsg),
            LsaOrigDelayed(LsaOrigDelayedMsg),
            LsaFlush(LsaFlushMsg),
            LsaRefresh(LsaRefreshMsg),
            LsdbMaxAgeSweep(LsdbMaxAgeSweepMsg),
            SpfDelayEvent(SpfDelayEventMsg),
            NssaStability(NssaStabilityMsg),
            NssaTranslated(NssaTranslatedMsg),
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct IsmEventMsg {
            pub area_key: AreaKey,
            pub iface_key: InterfaceKey,
            pub event: ism::Event,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct NsmEventMsg {
            pub area_key: AreaKey,
            pub iface_key: InterfaceKey,
            pub nbr_key: NeighborKey,
            pub event: nsm::Event,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct NetRxPacketMsg {
            pub area_key: AreaKey,
            pub iface_key: InterfaceKey,
            pub src: std::net::Ipv6Addr,
            pub dst: std::net::Ipv6Addr,
            pub packet: Result<Packet, DecodeError>,
        }

        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub struct SendHelloMsg {
            pub area_key: AreaKey,
            pub iface_key: InterfaceKey,
        }

        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub struct DbDescFreeMsg {
            pub area_key: AreaKey,
            pub iface_key: InterfaceKey,
            pub nbr_key: NeighborKey,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct SendLsUpdateMsg {
            pub area_key: AreaKey,
            pub iface_key: InterfaceKey,
            pub nbr_key: Option<NeighborKey>,
        }

        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub struct RxmtIntervalMsg {
            pub area_key: AreaKey,
            pub iface_key: InterfaceKey,
            pub nbr_key: NeighborKey,
            pub packet_type: RxmtPacketType,
        }

        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub struct DelayedAckMsg {
            pub area_key: AreaKey,
            pub iface_key: InterfaceKey,
        }

        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub struct PushbackTimeoutMsg {
            pub area_key: AreaKey,
            pub iface_key: InterfaceKey,
            pub lsa_key: LsaKey,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct LsaOrigEventMsg {
            pub event: LsaOriginateEvent,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct LsaOrigCheckMsg {
            pub lsdb_key: LsdbKey,
            pub lsa_id: Ipv4Addr,
            pub lsa_body: LsaBody,
        }

        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub struct LsaOrigDelayedMsg {
            pub lsdb_key: LsdbKey,
            pub lsa_key: LsaKey,
        }

        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub struct LsaFlushMsg {
            pub lsdb_key: LsdbKey,
            pub lse_key: LsaEntryKey,
            pub reason: LsaFlushReason,
        }

        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub struct LsaRefreshMsg {
            pub lsdb_key: LsdbKey,
            pub lse_key: LsaEntryKey,
        }

        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub struct LsdbMaxAgeSweepMsg {
            pub lsdb_key: LsdbKey,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct SpfDelayEventMsg {
            pub event: spf::fsm::Event,
        }

        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub struct NssaStabilityMsg {
            pub area_key: AreaKey,
        }

        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub struct NssaTranslatedMsg {
            pub area_key: AreaKey,
            pub type7_key: LsaKey,
            pub lsa_id: Ipv4Addr,
        }
    }

    // Output messages (main task -> child task).
    pub mod output {
        use serde::Serialize;

        use crate::network::SendDestination;
        use crate::packet::Packet;

        #[derive(Debug, Serialize)]
        pub enum ProtocolMsg {
            NetTxPacket(NetTxPacketMsg),
        }

        #[derive(Clone, Debug, Serialize)]
        pub struct NetTxPacketMsg {
            pub packet: Packet,
            pub dst: SendDestination,
        }
    }
}

// ===== tasks =====

// Network Rx task.
pub(crate) fn net_rx(
    socket: Arc<AsyncFd<Socket>>,
    iface: &Interface,
    area: &Area,
    net_packet_rxp: &Sender<messages::input::NetRxPacketMsg>,
) -> Task<()> {
    #[cfg(not(feature = "testing"))]
    {
        let span1 = debug_span!("network");
        let _span1_guard = span1.enter();
        let span2 = debug_span!("input");
        let _span2_guard = span2.enter();

        let area_id = area.id;
        let iface_id = iface.id;
        let net_packet_rxp = net_packet_rxp.clone();

        Task::spawn_supervised(move || {
            let socket = socket.clone();
            let net_packet_rxp = net_packet_rxp.clone();
            async move {
                let _ = crate::network::read_loop(
                    socket,
                    area_id,
                    iface_id,
                    net_packet_rxp,
                )
                .await;
            }
            .in_current_span()
        })
    }
    #[cfg(feature = "testing")]
    {
        Task::spawn(async move { std::future::pending().await })
    }
}

// Network Tx task.
#[allow(unused_mut)]
pub(crate) fn net_tx(
    socket: Arc<AsyncFd<Socket>>,
    iface: &Interface,
    mut net_packet_txc: UnboundedReceiver<messages::output::NetTxPacketMsg>,
    #[cfg(feature = "testing")] proto_output_tx: &Sender<
        messages::ProtocolOutputMsg,
    >,
) -> Task<()> {
    #[cfg(not(feature = "testing"))]
    {
        let span1 = debug_span!("network");
        let _span1_guard = span1.enter();
        let span2 = debug_span!("output");
        let _span2_guard = span2.enter();

        let ifname = iface.name.clone();
        let src = iface.state.src_addr;

        Task::spawn(
            async move {
                crate::network::write_loop(
                    socket,
                    ifname,
                    src,
                    net_packet_txc,
                )
                .await;
            }
            .in_current_span(),
        )
    }
    #[cfg(feature = "testing")]
    {
        let proto_output_tx = proto_output_tx.clone();
        Task::spawn(async move {
            // Relay message to the test framework.
            while let Some(msg) = net_packet_txc.recv().await {
                let msg = messages::ProtocolOutputMsg::NetTxPacket(msg);
                let _ = proto_output_tx.send(msg).await;
            }
        })
    }
}

// Send periodic Hello messages.
//
// Hellos are regenerated on each tick so the MANET LLS content (relay
// sets, sequence numbers, reported neighbor lists) is always current.
pub(crate) fn hello_interval(
    iface: &Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
    interval: u16,
) -> IntervalTask {
    #[cfg(not(feature = "testing"))]
    {
        let area_id = area.id;
        let iface_id = iface.id;
        let send_hellop = instance.tx.protocol_input.send_hello.clone();

        IntervalTask::new(
            Duration::from_secs(interval.into()),
            true,
            move || {
                let send_hellop = send_hellop.clone();

                async move {
                    let msg = messages::input::SendHelloMsg {
                        area_key: area_id.into(),
                        iface_key: iface_id.into(),
                    };
                    let _ = send_hellop.send(msg);
                }
            },
        )
    }
    #[cfg(feature = "testing")]
    {
        IntervalTask::new(
            Duration::from_secs(interval.into()),
            true,
            move || async move {},
        )
    }
}

// Interface wait timer task.
pub(crate) fn ism_wait_timer(
    iface: &Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
) -> TimeoutTask {
    let timeout = Duration::from_secs(iface.config.dead_interval.into());
    let area_id = area.id;
    let iface_id = iface.id;
    let ism_eventp = instance.tx.protocol_input.ism_event.clone();

    TimeoutTask::new(timeout, move || async move {
        let msg = messages::input::IsmEventMsg {
            area_key: area_id.into(),
            iface_key: iface_id.into(),
            event: ism::Event::WaitTimer,
        };
        let _ = ism_eventp.send(msg);
    })
}

// Neighbor inactivity timer.
pub(crate) fn nsm_inactivity_timer(
    nbr: &Neighbor,
    iface: &Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
) -> TimeoutTask {
    let timeout = Duration::from_secs(iface.config.dead_interval.into());
    let nbr_id = nbr.id;
    let area_id = area.id;
    let iface_id = iface.id;
    let nsm_eventp = instance.tx.protocol_input.nsm_event.clone();

    TimeoutTask::new(timeout, move || async move {
        let msg = messages::input::NsmEventMsg {
            area_key: area_id.into(),
            iface_key: iface_id.into(),
            nbr_key: nbr_id.into(),
            event: nsm::Event::InactivityTimer,
        };
        let _ = nsm_eventp.send(msg);
    })
}

// Send periodic packet retransmissions.
pub(crate) fn packet_rxmt_interval(
    iface: &Interface,
    msg: messages::input::RxmtIntervalMsg,
    instance: &InstanceUpView<'_>,
) -> IntervalTask {
    let rxmt_intervalp = instance.tx.protocol_input.rxmt_interval.clone();

    IntervalTask::new(
        Duration::from_secs(iface.config.retransmit_interval.into()),
        false,
        move || {
            let rxmt_intervalp = rxmt_intervalp.clone();
            let msg = msg.clone();

            async move {
                let _ = rxmt_intervalp.send(msg).await;
            }
        },
    )
}

// Timer to free the neighbor's last sent/received Database Description
// packets.
pub(crate) fn dbdesc_free_timer(
    nbr: &Neighbor,
    iface: &Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
) -> TimeoutTask {
    let area_id = area.id;
    let iface_id = iface.id;
    let nbr_id = nbr.id;
    let dbdesc_freep = instance.tx.protocol_input.dbdesc_free.clone();

    TimeoutTask::new(
        Duration::from_secs(iface.config.dead_interval.into()),
        move || async move {
            let _ = dbdesc_freep
                .send(messages::input::DbDescFreeMsg {
                    area_key: area_id.into(),
                    iface_key: iface_id.into(),
                    nbr_key: nbr_id.into(),
                })
                .await;
        },
    )
}

// Interface LS Update timer task.
pub(crate) fn ls_update_timer(
    iface: &Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
) -> TimeoutTask {
    let area_id = area.id;
    let iface_id = iface.id;
    let send_lsupdp = instance.tx.protocol_input.send_lsupd.clone();

    #[cfg(not(feature = "testing"))]
    {
        // Start timer.
        TimeoutTask::new(Duration::from_millis(100), move || async move {
            let _ = send_lsupdp.send(messages::input::SendLsUpdateMsg {
                area_key: area_id.into(),
                iface_key: iface_id.into(),
                nbr_key: None,
            });
        })
    }
    #[cfg(feature = "testing")]
    {
        // Send LS Update immediately.
        let _ = send_lsupdp.send(messages::input::SendLsUpdateMsg {
            area_key: area_id.into(),
            iface_key: iface_id.into(),
            nbr_key: None,
        });

        TimeoutTask::new(Duration::from_millis(100), move || async move {})
    }
}

// Interface delayed Ack timer task.
//
// MANET interfaces coalesce acknowledgments for AckInterval; elsewhere the
// fixed interval must be shorter than RxmtInterval (RFC 2328 section
// 13.5).
pub(crate) fn delayed_ack_timer(
    iface: &Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
) -> TimeoutTask {
    let area_id = area.id;
    let iface_id = iface.id;
    let delayed_ack_timeoutp =
        instance.tx.protocol_input.delayed_ack_timeout.clone();

    let timeout = if iface.config.if_type == InterfaceType::Manet {
        Duration::from_millis(iface.config.ack_interval.into())
    } else {
        Duration::from_secs(1)
    };

    #[cfg(not(feature = "testing"))]
    {
        TimeoutTask::new(timeout, move || async move {
            let msg = messages::input::DelayedAckMsg {
                area_key: area_id.into(),
                iface_key: iface_id.into(),
            };
            let _ = delayed_ack_timeoutp.send(msg);
        })
    }
    #[cfg(feature = "testing")]
    {
        // Send LS Ack immediately.
        let msg = messages::input::DelayedAckMsg {
            area_key: area_id.into(),
            iface_key: iface_id.into(),
        };
        let _ = delayed_ack_timeoutp.send(msg);

        TimeoutTask::new(timeout, move || async move {})
    }
}

// Pushback backup-wait timer task.
pub(crate) fn pushback_timer(
    iface: &Interface,
    area: &Area,
    instance: &InstanceUpView<'_>,
    lsa_key: LsaKey,
) -> TimeoutTask {
    let area_id = area.id;
    let iface_id = iface.id;
    let pushback_timeoutp =
        instance.tx.protocol_input.pushback_timeout.clone();

    let timeout =
        Duration::from_millis(iface.config.pushback_interval as u64)
            + pushback_jitter(iface);

    TimeoutTask::new(timeout, move || async move {
        let msg = messages::input::PushbackTimeoutMsg {
            area_key: area_id.into(),
            iface_key: iface_id.into(),
            lsa_key,
        };
        let _ = pushback_timeoutp.send(msg);
    })
}

// Jitter added to the pushback interval so simultaneous refloods from
// different routers spread out.
fn pushback_jitter(iface: &Interface) -> Duration {
    #[cfg(not(feature = "deterministic"))]
    {
        use rand::Rng;

        let bound =
            std::cmp::max(1, iface.config.retransmit_interval as u64 * 100);
        let msec = rand::rng().random_range(0..bound.min(1000));
        Duration::from_millis(msec)
    }
    #[cfg(feature = "deterministic")]
    {
        let _ = iface;
        Duration::ZERO
    }
}

// LSA expiry timer task.
pub(crate) fn lsa_expiry_timer(
    lsdb_id: LsdbId,
    lse_id: LsaEntryId,
    lsa: &Lsa,
    lsa_flushp: &UnboundedSender<messages::input::LsaFlushMsg>,
) -> TimeoutTask {
    let timeout = lsdb::LSA_MAX_AGE - lsa.hdr.age;
    let timeout = Duration::from_secs(timeout.into());
    let lsa_flushp = lsa_flushp.clone();
    let lse_key = lse_id.into();

    TimeoutTask::new(timeout, move || async move {
        let msg = messages::input::LsaFlushMsg {
            lsdb_key: lsdb_id.into(),
            lse_key,
            reason: LsaFlushReason::Expiry,
        };
        let _ = lsa_flushp.send(msg);
    })
}

// LSA refresh timer task.
pub(crate) fn lsa_refresh_timer(
    lsdb_id: LsdbId,
    lse_id: LsaEntryId,
    lsa_refreshp: &UnboundedSender<messages::input::LsaRefreshMsg>,
) -> TimeoutTask {
    let timeout = Duration::from_secs(lsdb::LSA_REFRESH_TIME.into());
    let lsa_refreshp = lsa_refreshp.clone();
    let lse_key = lse_id.into();

    TimeoutTask::new(timeout, move || async move {
        let msg = messages::input::LsaRefreshMsg {
            lsdb_key: lsdb_id.into(),
            lse_key,
        };
        let _ = lsa_refreshp.send(msg);
    })
}

// LSA delayed origination timer task.
pub(crate) fn lsa_orig_delayed_timer(
    lsdb_id: LsdbId,
    lsa_key: LsaKey,
    lsa_base_time: Option<Instant>,
    lsa_orig_delayed_timerp: &Sender<messages::input::LsaOrigDelayedMsg>,
) -> TimeoutTask {
    let lsa_orig_delayed_timerp = lsa_orig_delayed_timerp.clone();

    let lsa_age = lsa_base_time
        .map(|base_time| base_time.elapsed())
        .unwrap_or_default();
    let timeout =
        Duration::from_secs(lsdb::LSA_MIN_INTERVAL).saturating_sub(lsa_age);

    TimeoutTask::new(timeout, move || async move {
        let msg = messages::input::LsaOrigDelayedMsg {
            lsdb_key: lsdb_id.into(),
            lsa_key,
        };
        let _ = lsa_orig_delayed_timerp.send(msg).await;
    })
}

// LSDB MaxAge sweeper interval task.
pub(crate) fn lsdb_maxage_sweep_interval(
    lsdb_id: LsdbId,
    lsdb_maxage_sweep_intervalp: &Sender<messages::input::LsdbMaxAgeSweepMsg>,
) -> IntervalTask {
    let lsdb_maxage_sweep_intervalp = lsdb_maxage_sweep_intervalp.clone();

    let timeout = Duration::from_secs(5);
    IntervalTask::new(timeout, false, move || {
        let lsdb_maxage_sweep_intervalp = lsdb_maxage_sweep_intervalp.clone();
        async move {
            let msg = messages::input::LsdbMaxAgeSweepMsg {
                lsdb_key: lsdb_id.into(),
            };
            let _ = lsdb_maxage_sweep_intervalp.send(msg).await;
        }
    })
}

// SPF delay timer task.
pub(crate) fn spf_delay_timer(
    instance: &InstanceUpView<'_>,
    event: spf::fsm::Event,
    timeout: u32,
) -> TimeoutTask {
    let timeout = Duration::from_millis(timeout.into());
    let spf_delay_eventp = instance.tx.protocol_input.spf_delay_event.clone();

    TimeoutTask::new(timeout, move || async move {
        let msg = messages::input::SpfDelayEventMsg { event };
        let _ = spf_delay_eventp.send(msg);
    })
}

// NSSA translator stability interval task.
pub(crate) fn nssa_stability_timer(
    area: &Area,
    instance: &InstanceUpView<'_>,
    stability_interval: u16,
) -> TimeoutTask {
    let area_id = area.id;
    let nssa_stabilityp = instance.tx.protocol_input.nssa_stability.clone();

    TimeoutTask::new(
        Duration::from_secs(stability_interval.into()),
        move || async move {
            let msg = messages::input::NssaStabilityMsg {
                area_key: area_id.into(),
            };
            let _ = nssa_stabilityp.send(msg);
        },
    )
}
