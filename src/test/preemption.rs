// Starling: Contact-Plan Scheduling for Satellite Constellations
// Copyright (C) 2023 Tibor Schneider <sctibor@ethz.ch>
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Priority-based preemption of bandwidth reservations on saturated links.

use std::sync::{Arc, RwLock};

use time::{Duration, OffsetDateTime};
use tokio::sync::mpsc;

use crate::agents::{AgentMessage, AgentPayload};
use crate::config::SchedulerConfig;
use crate::scheduler::{CancelChannel, ScheduleError, Scheduler};
use crate::types::{LinkId, NodeId, Path, PathHop, ServiceRequest, ServiceRequestId};
use crate::world::{Motion, Transceiver, WorldModel};

/// Two nodes and a single 1 Mb/s link between them.
fn get_world() -> WorldModel {
    let mut world = WorldModel::new(OffsetDateTime::now_utc());
    let xcvr = Transceiver {
        max_power_watts: 4.0,
        tx_power_dbw: 10.0,
        max_range_km: 100.0,
    };
    world.add_platform("p-a", [0.0, 0.0, 0.0], Motion::Fixed);
    world.add_platform("p-b", [50.0, 0.0, 0.0], Motion::Fixed);
    world.add_node("a", "p-a").unwrap();
    world.add_node("b", "p-b").unwrap();
    world.add_interface("a-rf0", "a", xcvr.clone()).unwrap();
    world.add_interface("b-rf0", "b", xcvr).unwrap();
    world.add_link("link-ab", "a-rf0", "b-rf0", 1_000_000).unwrap();
    world
}

fn request(id: &str, priority: u8, bw: u64) -> ServiceRequest {
    ServiceRequest {
        id: ServiceRequestId::from(id),
        src: NodeId::from("a"),
        dst: NodeId::from("b"),
        priority,
        provisioned: false,
        bandwidth_bps: bw,
    }
}

fn get_path(now: OffsetDateTime) -> Path {
    Path::from_hops(vec![PathHop {
        from: NodeId::from("a"),
        to: NodeId::from("b"),
        link: LinkId::from("link-ab"),
        start: now + Duration::minutes(1),
        end: now + Duration::minutes(2),
    }])
    .unwrap()
}

fn get_scheduler() -> (Scheduler, mpsc::Receiver<AgentMessage>) {
    let sched = Scheduler::new(
        SchedulerConfig::default(),
        Arc::new(RwLock::new(get_world())),
    );
    let (_, rx) = sched.agents().register("a", "token-a");
    (sched, rx)
}

fn drain(rx: &mut mpsc::Receiver<AgentMessage>) -> Vec<AgentMessage> {
    let mut messages = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        messages.push(msg);
    }
    messages
}

#[tokio::test]
async fn preempt_lower_priority() {
    let (sched, mut rx) = get_scheduler();
    let now = OffsetDateTime::now_utc();
    let link = LinkId::from("link-ab");
    let cancel = CancelChannel::new();

    sched.upsert_service_request(request("sr-low", 1, 1_000_000)).await;
    sched.upsert_service_request(request("sr-high", 10, 1_000_000)).await;

    // sr-low saturates the link
    sched
        .schedule_path(&ServiceRequestId::from("sr-low"), &get_path(now), now, &cancel)
        .await
        .unwrap();
    assert_eq!(sched.reserved_bandwidth(&link).await, 1_000_000);

    // sr-high needs the same 1 Mb/s and preempts sr-low
    sched
        .schedule_path(&ServiceRequestId::from("sr-high"), &get_path(now), now, &cancel)
        .await
        .unwrap();

    let preemptions = sched.preemptions().await;
    assert_eq!(preemptions.len(), 1);
    assert_eq!(preemptions[0].preempted, ServiceRequestId::from("sr-low"));
    assert_eq!(preemptions[0].preemptor, ServiceRequestId::from("sr-high"));
    assert_eq!(preemptions[0].link, link);

    // the victim lost its path and its reservation; the preemptor holds the link
    assert!(sched.active_path(&ServiceRequestId::from("sr-low")).await.is_none());
    assert!(sched.active_path(&ServiceRequestId::from("sr-high")).await.is_some());
    assert_eq!(sched.reserved_bandwidth(&link).await, 1_000_000);
    assert!(!sched
        .service_request(&ServiceRequestId::from("sr-low"))
        .await
        .unwrap()
        .provisioned);

    // southbound: 4 entries for sr-low, 4 teardowns, then 4 entries for sr-high, in order
    let messages = drain(&mut rx);
    assert_eq!(messages.len(), 12);
    assert!(messages[..4]
        .iter()
        .all(|m| matches!(m.payload, AgentPayload::ScheduledAction(_))));
    assert!(messages[4..8]
        .iter()
        .all(|m| matches!(m.payload, AgentPayload::DeleteEntry { .. })));
    assert!(messages[8..]
        .iter()
        .all(|m| matches!(m.payload, AgentPayload::ScheduledAction(_))));

    // per-agent sequence numbers are strictly increasing and gap-free
    for (i, msg) in messages.iter().enumerate() {
        assert_eq!(msg.seq, i as u64 + 1);
    }
}

#[tokio::test]
async fn preemption_cannot_free_enough() {
    let (sched, _rx) = get_scheduler();
    let now = OffsetDateTime::now_utc();
    let link = LinkId::from("link-ab");
    let cancel = CancelChannel::new();

    sched.upsert_service_request(request("sr-low", 1, 1_000_000)).await;
    sched.upsert_service_request(request("sr-big", 10, 2_000_000)).await;

    sched
        .schedule_path(&ServiceRequestId::from("sr-low"), &get_path(now), now, &cancel)
        .await
        .unwrap();

    // 2 Mb/s exceed the link capacity no matter how much is preempted
    let result = sched
        .schedule_path(&ServiceRequestId::from("sr-big"), &get_path(now), now, &cancel)
        .await;
    assert!(matches!(result, Err(ScheduleError::NothingScheduled(_))));

    // the victim candidate was left untouched
    assert!(sched.active_path(&ServiceRequestId::from("sr-low")).await.is_some());
    assert_eq!(sched.reserved_bandwidth(&link).await, 1_000_000);
    assert!(sched.preemptions().await.is_empty());
}

#[tokio::test]
async fn equal_priority_is_never_preempted() {
    let (sched, _rx) = get_scheduler();
    let now = OffsetDateTime::now_utc();
    let cancel = CancelChannel::new();

    sched.upsert_service_request(request("sr-1", 5, 1_000_000)).await;
    sched.upsert_service_request(request("sr-2", 5, 1_000_000)).await;

    sched
        .schedule_path(&ServiceRequestId::from("sr-1"), &get_path(now), now, &cancel)
        .await
        .unwrap();
    let result = sched
        .schedule_path(&ServiceRequestId::from("sr-2"), &get_path(now), now, &cancel)
        .await;
    assert!(matches!(result, Err(ScheduleError::NothingScheduled(_))));
    assert!(sched.active_path(&ServiceRequestId::from("sr-1")).await.is_some());
}
