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

//! Incremental path updates: only removed hops are withdrawn and only added hops are emitted.

use std::sync::{Arc, RwLock};

use itertools::Itertools;
use time::{Duration, OffsetDateTime};
use tokio::sync::mpsc;

use crate::agents::{AgentMessage, AgentPayload};
use crate::config::SchedulerConfig;
use crate::scheduler::{diff_paths, CancelChannel, ScheduleError, Scheduler};
use crate::types::{
    InterfaceId, LinkId, NodeId, Path, PathHop, ServiceRequest, ServiceRequestId,
};
use crate::world::{Motion, Transceiver, WorldModel};

fn get_world() -> WorldModel {
    let mut world = WorldModel::new(OffsetDateTime::now_utc());
    let xcvr = Transceiver {
        max_power_watts: 4.0,
        tx_power_dbw: 10.0,
        max_range_km: 100.0,
    };
    for (platform, node, x) in [("p-a", "a", 0.0), ("p-b", "b", 50.0), ("p-c", "c", 100.0)] {
        world.add_platform(platform, [x, 0.0, 0.0], Motion::Fixed);
        world.add_node(node, platform).unwrap();
    }
    world.add_interface("a-rf0", "a", xcvr.clone()).unwrap();
    world.add_interface("b-rf0", "b", xcvr.clone()).unwrap();
    world.add_interface("b-rf1", "b", xcvr.clone()).unwrap();
    world.add_interface("c-rf0", "c", xcvr).unwrap();
    world.add_link("link-ab", "a-rf0", "b-rf0", 10_000_000).unwrap();
    world.add_link("link-bc", "b-rf1", "c-rf0", 10_000_000).unwrap();
    world
}

struct Setup {
    sched: Scheduler,
    rx_a: mpsc::Receiver<AgentMessage>,
    rx_b: mpsc::Receiver<AgentMessage>,
    now: OffsetDateTime,
    sr: ServiceRequestId,
}

fn get_setup() -> Setup {
    let sched = Scheduler::new(
        SchedulerConfig::default(),
        Arc::new(RwLock::new(get_world())),
    );
    let (_, rx_a) = sched.agents().register("a", "token-a");
    let (_, rx_b) = sched.agents().register("b", "token-b");
    Setup {
        sched,
        rx_a,
        rx_b,
        now: OffsetDateTime::now_utc(),
        sr: ServiceRequestId::from("sr-x"),
    }
}

fn request(sr: &ServiceRequestId) -> ServiceRequest {
    ServiceRequest {
        id: sr.clone(),
        src: NodeId::from("a"),
        dst: NodeId::from("c"),
        priority: 5,
        provisioned: false,
        bandwidth_bps: 500_000,
    }
}

fn hop_ab(now: OffsetDateTime) -> PathHop {
    PathHop {
        from: NodeId::from("a"),
        to: NodeId::from("b"),
        link: LinkId::from("link-ab"),
        start: now + Duration::minutes(1),
        end: now + Duration::minutes(2),
    }
}

fn hop_bc(now: OffsetDateTime) -> PathHop {
    PathHop {
        from: NodeId::from("b"),
        to: NodeId::from("c"),
        link: LinkId::from("link-bc"),
        start: now + Duration::seconds(90),
        end: now + Duration::seconds(150),
    }
}

fn drain(rx: &mut mpsc::Receiver<AgentMessage>) -> Vec<AgentMessage> {
    let mut messages = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        messages.push(msg);
    }
    messages
}

#[tokio::test]
async fn append_a_hop() {
    let mut s = get_setup();
    let cancel = CancelChannel::new();
    s.sched.upsert_service_request(request(&s.sr)).await;

    let initial = Path::from_hops(vec![hop_ab(s.now)]).unwrap();
    s.sched
        .schedule_path(&s.sr, &initial, s.now, &cancel)
        .await
        .unwrap();
    assert_eq!(drain(&mut s.rx_a).len(), 4);

    // extend the path with b -> c
    let extended = Path::from_hops(vec![hop_ab(s.now), hop_bc(s.now)]).unwrap();
    let report = s.sched.update_path(&s.sr, &extended, s.now).await.unwrap();
    assert_eq!(report.scheduled_hops, 2);
    assert!(report.failed_hops.is_empty());

    let active = s.sched.active_path(&s.sr).await.unwrap();
    assert_eq!(active.path.hops.len(), 2);

    // the shared hop was not re-dispatched; the new hop got its four entries on agent b
    assert!(drain(&mut s.rx_a).is_empty());
    let to_b = drain(&mut s.rx_b);
    assert_eq!(to_b.len(), 4);

    // hop 1 carries 2 beam and 2 route entries with the canonical IDs
    let hop1 = &active.hop_entries[&1];
    assert_eq!(hop1.len(), 4);
    assert_eq!(hop1.iter().filter(|r| r.entry_id.contains(":beam:")).count(), 2);
    assert_eq!(hop1.iter().filter(|r| r.entry_id.contains(":route:")).count(), 2);

    let on_ns = hop_bc(s.now).start.unix_timestamp_nanos();
    let off_ns = hop_bc(s.now).end.unix_timestamp_nanos();
    let route_on = format!("sr:{}:hop:1:route:b->c:{on_ns}", s.sr);
    let route_off = format!("sr:{}:hop:1:route:b->c:off:{off_ns}", s.sr);
    assert!(hop1.iter().any(|r| r.entry_id == route_on));
    assert!(hop1.iter().any(|r| r.entry_id == route_off));

    // bandwidth is reserved on the added link
    assert_eq!(
        s.sched.reserved_bandwidth(&LinkId::from("link-bc")).await,
        500_000
    );
    assert_eq!(
        s.sched.reserved_bandwidth(&LinkId::from("link-ab")).await,
        500_000
    );

    // entries per hop and the flat action list agree as multisets
    let from_hops: Vec<_> = active
        .hop_entries
        .values()
        .flatten()
        .map(|r| r.entry_id.clone())
        .sorted()
        .collect();
    let flat: Vec<_> = active.scheduled_actions.iter().cloned().sorted().collect();
    assert_eq!(from_hops, flat);

    // both reverse indices know about the new link
    assert!(s
        .sched
        .service_requests_on_link(&LinkId::from("link-bc"))
        .await
        .contains(&s.sr));
    assert_eq!(
        s.sched.links_of_service_request(&s.sr).await,
        [LinkId::from("link-ab"), LinkId::from("link-bc")].into()
    );
}

#[tokio::test]
async fn remove_a_hop() {
    let mut s = get_setup();
    let cancel = CancelChannel::new();
    s.sched.upsert_service_request(request(&s.sr)).await;

    let full = Path::from_hops(vec![hop_ab(s.now), hop_bc(s.now)]).unwrap();
    s.sched.schedule_path(&s.sr, &full, s.now, &cancel).await.unwrap();
    drain(&mut s.rx_a);
    drain(&mut s.rx_b);

    // shrink the path back to the first hop
    let shrunk = Path::from_hops(vec![hop_ab(s.now)]).unwrap();
    s.sched.update_path(&s.sr, &shrunk, s.now).await.unwrap();

    // only the removed hop's entries are withdrawn
    assert!(drain(&mut s.rx_a).is_empty());
    let to_b = drain(&mut s.rx_b);
    assert_eq!(to_b.len(), 4);
    assert!(to_b
        .iter()
        .all(|m| matches!(m.payload, AgentPayload::DeleteEntry { .. })));

    assert_eq!(s.sched.reserved_bandwidth(&LinkId::from("link-bc")).await, 0);
    let active = s.sched.active_path(&s.sr).await.unwrap();
    assert_eq!(active.path.hops.len(), 1);
    assert_eq!(
        s.sched.links_of_service_request(&s.sr).await,
        [LinkId::from("link-ab")].into()
    );
}

#[tokio::test]
async fn teardown_conserves_resources() {
    let mut s = get_setup();
    let cancel = CancelChannel::new();
    s.sched.upsert_service_request(request(&s.sr)).await;

    let full = Path::from_hops(vec![hop_ab(s.now), hop_bc(s.now)]).unwrap();
    s.sched.schedule_path(&s.sr, &full, s.now, &cancel).await.unwrap();
    assert_eq!(
        s.sched.allocated_power(&InterfaceId::from("a-rf0")).await,
        1.0
    );
    assert_eq!(
        s.sched.allocated_power(&InterfaceId::from("b-rf1")).await,
        1.0
    );
    drain(&mut s.rx_a);
    drain(&mut s.rx_b);

    s.sched.teardown(&s.sr).await.unwrap();

    // every entry is retracted, and residuals equal the initial totals again
    assert_eq!(drain(&mut s.rx_a).len(), 4);
    assert_eq!(drain(&mut s.rx_b).len(), 4);
    assert_eq!(s.sched.reserved_bandwidth(&LinkId::from("link-ab")).await, 0);
    assert_eq!(s.sched.reserved_bandwidth(&LinkId::from("link-bc")).await, 0);
    assert_eq!(s.sched.allocated_power(&InterfaceId::from("a-rf0")).await, 0.0);
    assert_eq!(s.sched.allocated_power(&InterfaceId::from("b-rf1")).await, 0.0);
    assert!(s.sched.active_path(&s.sr).await.is_none());
    assert!(matches!(
        s.sched.teardown(&s.sr).await,
        Err(ScheduleError::NotProvisioned(_))
    ));
}

#[tokio::test]
async fn past_hop_start_is_clamped_to_now() {
    let mut s = get_setup();
    let cancel = CancelChannel::new();
    s.sched.upsert_service_request(request(&s.sr)).await;

    let hop = PathHop {
        start: s.now - Duration::minutes(1),
        end: s.now + Duration::minutes(1),
        ..hop_ab(s.now)
    };
    let path = Path::from_hops(vec![hop]).unwrap();
    s.sched.schedule_path(&s.sr, &path, s.now, &cancel).await.unwrap();

    let messages = drain(&mut s.rx_a);
    let beam_on = messages
        .iter()
        .find_map(|m| match &m.payload {
            AgentPayload::ScheduledAction(e)
                if matches!(e.kind, crate::agents::ActionKind::UpdateBeam) =>
            {
                Some(e.clone())
            }
            _ => None,
        })
        .unwrap();
    assert_eq!(beam_on.when, s.now);
}

#[tokio::test]
async fn cancelled_scheduling_rolls_back() {
    let mut s = get_setup();
    let cancel = CancelChannel::new();
    cancel.cancel();
    s.sched.upsert_service_request(request(&s.sr)).await;

    let path = Path::from_hops(vec![hop_ab(s.now)]).unwrap();
    let result = s.sched.schedule_path(&s.sr, &path, s.now, &cancel).await;
    assert!(matches!(result, Err(ScheduleError::Cancelled)));

    assert!(drain(&mut s.rx_a).is_empty());
    assert_eq!(s.sched.reserved_bandwidth(&LinkId::from("link-ab")).await, 0);
    assert!(s.sched.active_path(&s.sr).await.is_none());
}

#[test]
fn diff_is_a_multiset_partition() {
    let now = OffsetDateTime::now_utc();
    let old = Path::from_hops(vec![hop_ab(now), hop_bc(now)]).unwrap();
    let new = Path::from_hops(vec![hop_ab(now), hop_ab(now)]).unwrap();

    let diff = diff_paths(&old, &new);

    let mut shared_removed: Vec<_> = diff
        .shared
        .iter()
        .cloned()
        .chain(diff.removed.iter().map(|(_, h)| h.clone()))
        .collect();
    let mut shared_added: Vec<_> = diff
        .shared
        .iter()
        .cloned()
        .chain(diff.added.iter().map(|(_, h)| h.clone()))
        .collect();
    let sort_key = |h: &PathHop| (h.link.clone(), h.start, h.from.clone());
    shared_removed.sort_by_key(sort_key);
    shared_added.sort_by_key(sort_key);
    let mut old_hops = old.hops.clone();
    let mut new_hops = new.hops.clone();
    old_hops.sort_by_key(sort_key);
    new_hops.sort_by_key(sort_key);

    assert_eq!(shared_removed, old_hops);
    assert_eq!(shared_added, new_hops);
    assert_eq!(diff.shared.len(), 1);
    assert_eq!(diff.removed.len(), 1);
    assert_eq!(diff.added.len(), 1);
}

#[tokio::test]
async fn update_requires_an_active_path() {
    let s = get_setup();
    s.sched.upsert_service_request(request(&s.sr)).await;
    let path = Path::from_hops(vec![hop_ab(s.now)]).unwrap();
    assert!(matches!(
        s.sched.update_path(&s.sr, &path, s.now).await,
        Err(ScheduleError::NotProvisioned(_))
    ));
}
