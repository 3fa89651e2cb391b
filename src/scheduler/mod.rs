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

//! The scheduler: it turns planned paths into dated per-agent entries, arbitrates bandwidth and
//! power, tracks active paths, and closes the loop through the incremental replanner.
//!
//! The active-path table, both ledgers, the preemption log, and the known service requests live
//! behind a single scheduler-wide mutex. The hot path is replanning, which is bounded by the
//! configured minimum replan interval, so the coarse lock is acceptable. Within that lock, the
//! `(reserve, allocate, send, record)` sequence of a hop is atomic with respect to all other
//! scheduler operations.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, error, info, warn};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tokio::sync::{broadcast, mpsc, Mutex};

use crate::agents::{AgentError, AgentPayload, AgentRegistry};
use crate::config::SchedulerConfig;
use crate::sampling::{sample_windows, ContactCache, SampleError};
use crate::telemetry::{InterfaceTelemetry, TelemetryStore};
use crate::types::{
    ContactPlan, ContactWindow, EntryRef, InterfaceId, LinkId, NodeId, Path, PathHealth,
    PreemptionRecord, ServiceRequest, ServiceRequestId,
};
use crate::world::{WorldError, WorldModel};

pub mod actions;
pub mod diff;
pub mod replan;
pub mod resources;
pub mod table;

pub use diff::{diff_paths, PathDiff};
pub use replan::TopologyChange;
pub use table::{check_path_health, ActivePath, IndexViolation};

use resources::{preemption_victims, BandwidthLedger, PowerLedger, ResourceError};
use table::ActivePathTable;

/// The injectable replan capability. Invoked by the incremental replanner for every affected
/// service request that passes the replan gates.
pub type ReplanFn = Box<dyn Fn(&ServiceRequestId) + Send + Sync>;

/// Cooperative cancellation channel. Cancellation is observed between hops and between sampling
/// ticks; partial work is rolled back on cancellation paths.
#[derive(Debug, Clone)]
pub struct CancelChannel {
    /// Set once the channel fired.
    fired: Arc<AtomicBool>,
    /// Wakes up tasks currently waiting in [`CancelChannel::cancelled`].
    tx: broadcast::Sender<()>,
}

impl Default for CancelChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelChannel {
    /// Create a new, unfired channel.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            fired: Arc::new(AtomicBool::new(false)),
            tx,
        }
    }

    /// Fire the channel. All current and future observers see the cancellation.
    pub fn cancel(&self) {
        self.fired.store(true, Ordering::SeqCst);
        let _ = self.tx.send(());
    }

    /// Returns `true` if the channel has fired.
    pub fn is_cancelled(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Wait until the channel fires. Returns immediately if it already has.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        while !self.is_cancelled() {
            if rx.recv().await.is_err() {
                break;
            }
        }
    }
}

/// Outcome of scheduling or updating a path. Hops that could not be scheduled are reported
/// individually; their resources were rolled back and the service request is marked for replan.
#[derive(Debug)]
pub struct ScheduleReport {
    /// Number of hops whose entries were dispatched.
    pub scheduled_hops: usize,
    /// Hops that failed, with the per-hop error.
    pub failed_hops: Vec<(usize, ScheduleError)>,
}

/// State behind the scheduler-wide mutex.
#[derive(Debug, Default)]
struct SchedulerState {
    /// Active paths and their reverse indices.
    table: ActivePathTable,
    /// Bandwidth reservations per link.
    bandwidth: BandwidthLedger,
    /// Power allocations per interface.
    power: PowerLedger,
    /// Audit log of preemption events.
    preemptions: Vec<PreemptionRecord>,
    /// Known service requests, consumed read-only.
    requests: HashMap<ServiceRequestId, ServiceRequest>,
}

/// The control-plane scheduler.
pub struct Scheduler {
    /// Configuration knobs.
    config: SchedulerConfig,
    /// Shared handle to the production knowledge bases.
    world: Arc<std::sync::RwLock<WorldModel>>,
    /// Cache of sampled contact windows.
    cache: Arc<ContactCache>,
    /// Registry of connected agents.
    agents: Arc<AgentRegistry>,
    /// Store of agent-pushed telemetry.
    telemetry: Arc<TelemetryStore>,
    /// All mutable scheduling state, behind one mutex.
    state: Mutex<SchedulerState>,
    /// The injectable replan capability.
    replan_hook: std::sync::RwLock<Option<ReplanFn>>,
    /// Sending side of the single-slot replan signal.
    replan_tx: mpsc::Sender<LinkId>,
    /// Receiving side of the single-slot replan signal.
    replan_rx: Mutex<mpsc::Receiver<LinkId>>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .field("agents", &self.agents)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Create a scheduler over the given knowledge bases.
    pub fn new(config: SchedulerConfig, world: Arc<std::sync::RwLock<WorldModel>>) -> Self {
        let cache = Arc::new(ContactCache::new(config.contact_window_ttl));
        // replan requests for the same link are coalesced through this single slot
        let (replan_tx, replan_rx) = mpsc::channel(1);
        Self {
            config,
            world,
            cache,
            agents: Arc::new(AgentRegistry::new()),
            telemetry: Arc::new(TelemetryStore::new()),
            state: Mutex::new(SchedulerState::default()),
            replan_hook: std::sync::RwLock::new(None),
            replan_tx,
            replan_rx: Mutex::new(replan_rx),
        }
    }

    /// The configuration of the scheduler.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// The contact window cache.
    pub fn cache(&self) -> &Arc<ContactCache> {
        &self.cache
    }

    /// The agent registry.
    pub fn agents(&self) -> &Arc<AgentRegistry> {
        &self.agents
    }

    /// The telemetry store.
    pub fn telemetry(&self) -> &Arc<TelemetryStore> {
        &self.telemetry
    }

    /// Replace the replan capability. Passing `None` restores the default (no-op) behavior.
    pub fn set_replan_hook(&self, hook: Option<ReplanFn>) {
        *self.replan_hook.write().unwrap() = hook;
    }

    /// Register or update a service request. Requests are consumed read-only by the scheduler.
    pub async fn upsert_service_request(&self, request: ServiceRequest) {
        self.state
            .lock()
            .await
            .requests
            .insert(request.id.clone(), request);
    }

    /// Look up a known service request.
    pub async fn service_request(&self, sr: &ServiceRequestId) -> Option<ServiceRequest> {
        self.state.lock().await.requests.get(sr).cloned()
    }

    /// Schedule all hops of `path` for the given service request: reserve bandwidth and power,
    /// dispatch the four dated entries of every hop, and record the resulting active path.
    ///
    /// A hop whose resources or dispatch fail is rolled back and reported in the result; the
    /// remaining hops are still attempted. If no hop at all could be scheduled, the request
    /// stays unprovisioned and an error is returned.
    pub async fn schedule_path(
        &self,
        sr: &ServiceRequestId,
        path: &Path,
        now: OffsetDateTime,
        cancel: &CancelChannel,
    ) -> Result<ScheduleReport, ScheduleError> {
        let mut state = self.state.lock().await;
        if !state.requests.contains_key(sr) {
            return Err(ScheduleError::UnknownServiceRequest(sr.clone()));
        }
        let dst = path
            .dst()
            .cloned()
            .ok_or_else(|| ScheduleError::EmptyPath(sr.clone()))?;

        let mut hop_entries: BTreeMap<usize, Vec<EntryRef>> = BTreeMap::new();
        let mut scheduled_actions = Vec::new();
        let mut failed_hops = Vec::new();

        for (index, hop) in path.hops.iter().enumerate() {
            if cancel.is_cancelled() {
                self.rollback_hops(&mut state, sr, path, &hop_entries);
                return Err(ScheduleError::Cancelled);
            }
            match self.schedule_hop(&mut state, sr, index, hop, &dst, now) {
                Ok(refs) => {
                    scheduled_actions.extend(refs.iter().map(|r| r.entry_id.clone()));
                    hop_entries.insert(index, refs);
                }
                Err(e) => {
                    warn!("Cannot schedule hop {index} of {sr}: {e}");
                    failed_hops.push((index, e));
                }
            }
        }

        if scheduled_actions.is_empty() {
            return Err(ScheduleError::NothingScheduled(sr.clone()));
        }

        let complete = failed_hops.is_empty();
        state.table.record(ActivePath {
            sr: sr.clone(),
            path: path.clone(),
            hop_entries,
            scheduled_actions,
            best_window_at_plan: self.best_cached_windows(path),
            last_updated: now,
            health: PathHealth::Healthy,
            needs_replan: !complete,
        });
        if let Some(request) = state.requests.get_mut(sr) {
            request.provisioned = complete;
        }
        info!(
            "Scheduled path for {sr} with {} hops ({} failed)",
            path.hops.len() - failed_hops.len(),
            failed_hops.len()
        );

        Ok(ScheduleReport {
            scheduled_hops: path.hops.len() - failed_hops.len(),
            failed_hops,
        })
    }

    /// Apply `new_path` to an already provisioned service request, withdrawing only the entries
    /// of removed hops and dispatching only the entries of added hops.
    pub async fn update_path(
        &self,
        sr: &ServiceRequestId,
        new_path: &Path,
        now: OffsetDateTime,
    ) -> Result<ScheduleReport, ScheduleError> {
        let mut state = self.state.lock().await;
        let old = state
            .table
            .get(sr)
            .cloned()
            .ok_or_else(|| ScheduleError::NotProvisioned(sr.clone()))?;
        let dst = new_path
            .dst()
            .cloned()
            .ok_or_else(|| ScheduleError::EmptyPath(sr.clone()))?;
        let bw = self.requested_bandwidth(&state, sr)?;

        let diff = diff_paths(&old.path, new_path);
        debug!(
            "Updating path of {sr}: {} shared, {} removed, {} added",
            diff.shared.len(),
            diff.removed.len(),
            diff.added.len()
        );

        // withdraw the entries of all removed hops and give back their resources
        let removed_indices: HashSet<usize> = diff.removed.iter().map(|(i, _)| *i).collect();
        for (old_index, hop) in &diff.removed {
            for entry in old.hop_entries.get(old_index).into_iter().flatten() {
                self.retract_entry(&mut state, entry);
            }
            state.bandwidth.unreserve(sr, &hop.link, bw);
        }

        // kept hops carry their entries over, re-indexed to the new hop positions
        let mut kept: HashMap<&crate::types::PathHop, Vec<usize>> = HashMap::new();
        for (old_index, hop) in old.path.hops.iter().enumerate() {
            if !removed_indices.contains(&old_index) {
                kept.entry(hop).or_default().push(old_index);
            }
        }

        let added_indices: HashSet<usize> = diff.added.iter().map(|(i, _)| *i).collect();
        let mut hop_entries: BTreeMap<usize, Vec<EntryRef>> = BTreeMap::new();
        let mut scheduled_actions = Vec::new();
        let mut failed_hops = Vec::new();

        for (index, hop) in new_path.hops.iter().enumerate() {
            if added_indices.contains(&index) {
                match self.schedule_hop(&mut state, sr, index, hop, &dst, now) {
                    Ok(refs) => {
                        scheduled_actions.extend(refs.iter().map(|r| r.entry_id.clone()));
                        hop_entries.insert(index, refs);
                    }
                    Err(e) => {
                        warn!("Cannot schedule added hop {index} of {sr}: {e}");
                        failed_hops.push((index, e));
                    }
                }
            } else if let Some(old_index) = kept.get_mut(hop).and_then(Vec::pop) {
                let refs: Vec<EntryRef> = old
                    .hop_entries
                    .get(&old_index)
                    .cloned()
                    .unwrap_or_default()
                    .into_iter()
                    .map(|mut r| {
                        r.hop_index = index;
                        r
                    })
                    .collect();
                scheduled_actions.extend(refs.iter().map(|r| r.entry_id.clone()));
                hop_entries.insert(index, refs);
            }
        }

        let scheduled_hops = new_path.hops.len() - failed_hops.len();
        let complete = failed_hops.is_empty();
        state.table.record(ActivePath {
            sr: sr.clone(),
            path: new_path.clone(),
            hop_entries,
            scheduled_actions,
            best_window_at_plan: self.best_cached_windows(new_path),
            last_updated: now,
            health: PathHealth::Healthy,
            needs_replan: !complete,
        });
        if let Some(request) = state.requests.get_mut(sr) {
            request.provisioned = complete;
        }

        Ok(ScheduleReport {
            scheduled_hops,
            failed_hops,
        })
    }

    /// Tear down the active path of a service request: retract every scheduled entry, release
    /// all bandwidth and power, and drop the path from the table.
    pub async fn teardown(&self, sr: &ServiceRequestId) -> Result<(), ScheduleError> {
        let mut state = self.state.lock().await;
        if state.table.get(sr).is_none() {
            return Err(ScheduleError::NotProvisioned(sr.clone()));
        }
        self.teardown_locked(&mut state, sr);
        Ok(())
    }

    /// The ordered contact plan of a link: all cached windows that have not yet ended, and (for
    /// a positive horizon) start within `now + horizon`.
    pub fn get_contact_plan(
        &self,
        link: &LinkId,
        horizon: Duration,
        now: OffsetDateTime,
    ) -> Result<Vec<ContactWindow>, ScheduleError> {
        if link.is_empty() {
            return Err(ScheduleError::EmptyLinkId);
        }
        let mut windows = self.cache.get(link).unwrap_or_default();
        windows.retain(|w| w.end >= now && (!horizon.is_positive() || w.start <= now + horizon));
        windows.sort_by_key(|w| w.start);
        Ok(windows)
    }

    /// The contact plans of all links touching the given node, deduplicated by link.
    pub fn get_contact_plans_for_node(
        &self,
        node: &NodeId,
        horizon: Duration,
        now: OffsetDateTime,
    ) -> Result<ContactPlan, ScheduleError> {
        let links: BTreeSet<LinkId> = {
            let world = self.world.read().unwrap();
            world.links_of_node(node).into_iter().collect()
        };
        let mut plan = ContactPlan::new();
        for link in links {
            let windows = self.get_contact_plan(&link, horizon, now)?;
            if !windows.is_empty() {
                plan.insert(link, windows);
            }
        }
        Ok(plan)
    }

    /// Textual dump of an agent's state.
    pub fn dump_agent_state(&self, agent: &NodeId) -> Result<String, ScheduleError> {
        Ok(self.agents.dump_state(agent)?)
    }

    /// The recorded preemption events, oldest first.
    pub async fn preemptions(&self) -> Vec<PreemptionRecord> {
        self.state.lock().await.preemptions.clone()
    }

    /// Total bandwidth currently reserved on a link, in bits per second.
    pub async fn reserved_bandwidth(&self, link: &LinkId) -> u64 {
        self.state.lock().await.bandwidth.reserved_on(link)
    }

    /// Watts currently allocated on an interface.
    pub async fn allocated_power(&self, iface: &InterfaceId) -> f64 {
        self.state.lock().await.power.allocated_on(iface)
    }

    /// All service requests with a hop over the given link.
    pub async fn service_requests_on_link(&self, link: &LinkId) -> BTreeSet<ServiceRequestId> {
        self.state.lock().await.table.srs_on_link(link)
    }

    /// All links used by the active path of the given service request.
    pub async fn links_of_service_request(&self, sr: &ServiceRequestId) -> BTreeSet<LinkId> {
        self.state.lock().await.table.links_of(sr)
    }

    /// The active path of a service request, if any.
    pub async fn active_path(&self, sr: &ServiceRequestId) -> Option<ActivePath> {
        self.state.lock().await.table.get(sr).cloned()
    }

    /// Classify and store the current health of a service request's active path.
    pub async fn path_health(
        &self,
        sr: &ServiceRequestId,
        at: OffsetDateTime,
    ) -> Result<PathHealth, ScheduleError> {
        let mut state = self.state.lock().await;
        let Some(active) = state.table.get(sr) else {
            return Err(ScheduleError::NotProvisioned(sr.clone()));
        };
        let health = check_path_health(&active.path, at, &self.cache);
        if let Some(active) = state.table.get_mut(sr) {
            active.health = health;
        }
        Ok(health)
    }

    /// Perform one sampling pass from `now` over the configured horizon and refresh the cache.
    /// On failure the previous cache content is retained.
    pub fn sample_now(&self, now: OffsetDateTime) -> Result<usize, ScheduleError> {
        let world = self.world.read().unwrap().snapshot();
        let plan = sample_windows(&world, now, now + self.config.sampling_horizon)?;
        let links = plan.len();
        for (link, windows) in plan {
            self.cache.update(&link, &windows);
        }
        Ok(links)
    }

    /// Run the periodic sampling loop until cancelled. Sampling failures are logged and the
    /// previous cache content is retained; cancellation is observed between ticks.
    pub async fn run_sampling_loop(&self, cancel: CancelChannel) {
        let interval = std::time::Duration::from_secs_f64(
            self.config.sampling_interval.as_seconds_f64().max(0.0),
        );
        loop {
            let now = OffsetDateTime::now_utc();
            match self.sample_now(now) {
                Ok(links) => debug!("Sampling pass refreshed {links} links"),
                Err(e) => error!("Sampling pass failed: {e}"),
            }
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Sampling loop cancelled");
                    return;
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    /// Ingest one telemetry sample. A changed SINR reading signals a potential quality change
    /// on every link of the interface.
    pub fn ingest_telemetry(&self, iface: &InterfaceId, sample: InterfaceTelemetry) {
        let sinr = sample.sinr_db;
        let previous = self.telemetry.record(iface, sample);
        if sinr.is_some() && previous.and_then(|p| p.sinr_db) != sinr {
            let links = self.world.read().unwrap().links_of_interface(iface);
            for link in links {
                self.signal_replan(link);
            }
        }
    }

    /// Schedule a single hop: reserve bandwidth (preempting lower-priority requests if needed),
    /// allocate transmit power, and dispatch the hop's four entries. Rolls the hop back
    /// completely on any failure.
    fn schedule_hop(
        &self,
        state: &mut SchedulerState,
        sr: &ServiceRequestId,
        index: usize,
        hop: &crate::types::PathHop,
        dst: &NodeId,
        now: OffsetDateTime,
    ) -> Result<Vec<EntryRef>, ScheduleError> {
        let priority = state
            .requests
            .get(sr)
            .map(|r| r.priority)
            .unwrap_or_default();
        let bw = self.requested_bandwidth(state, sr)?;
        let (capacity, tx_interface, max_watts) = {
            let world = self.world.read().unwrap();
            let iface = world.tx_interface(&hop.from, &hop.link)?;
            (
                world.link_capacity(&hop.link)?,
                iface.clone(),
                world.max_power_watts(&iface)?,
            )
        };

        // (1) bandwidth, preempting lower-priority requests when the link is saturated
        if let Err(first) = state.bandwidth.reserve(sr, &hop.link, bw, capacity) {
            let residual = capacity.saturating_sub(state.bandwidth.reserved_on(&hop.link));
            let candidates: Vec<(ServiceRequestId, u64, u8)> = state
                .bandwidth
                .reservations_on(&hop.link)
                .into_iter()
                .filter(|(other, _)| other != sr)
                .map(|(other, other_bw)| {
                    let prio = state
                        .requests
                        .get(&other)
                        .map(|r| r.priority)
                        .unwrap_or_default();
                    (other, other_bw, prio)
                })
                .collect();
            let victims = preemption_victims(&candidates, priority, bw - residual)
                .ok_or(ScheduleError::Resource(first))?;
            for victim in victims {
                self.preempt(state, &victim, sr, &hop.link, now);
            }
            state.bandwidth.reserve(sr, &hop.link, bw, capacity)?;
        }

        // (2) one power unit on the transmit interface, bound to the beam-on entry
        let hop_entries = actions::build_hop_entries(sr, index, hop, &tx_interface, dst, now);
        if let Err(e) = state
            .power
            .allocate(&hop_entries.beam_on_id, &tx_interface, max_watts)
        {
            state.bandwidth.unreserve(sr, &hop.link, bw);
            return Err(e.into());
        }

        // (3) dispatch all four entries to the transmitting agent
        let mut sent = Vec::with_capacity(hop_entries.entries.len());
        for entry in &hop_entries.entries {
            match self
                .agents
                .send(&entry.agent, AgentPayload::ScheduledAction(entry.clone()))
            {
                Ok(_) => sent.push(EntryRef {
                    entry_id: entry.entry_id.clone(),
                    agent: entry.agent.clone(),
                    hop_index: index,
                }),
                Err(e) => {
                    // no partial schedule may survive a failed send
                    for r in &sent {
                        let _ = self.agents.send(
                            &r.agent,
                            AgentPayload::DeleteEntry {
                                entry_id: r.entry_id.clone(),
                            },
                        );
                    }
                    state.power.release(&hop_entries.beam_on_id);
                    state.bandwidth.unreserve(sr, &hop.link, bw);
                    return Err(e.into());
                }
            }
        }

        Ok(sent)
    }

    /// Preempt a service request on behalf of a higher-priority one: drop its active path, emit
    /// teardown for all its entries, release its resources, and record the event.
    fn preempt(
        &self,
        state: &mut SchedulerState,
        victim: &ServiceRequestId,
        preemptor: &ServiceRequestId,
        link: &LinkId,
        now: OffsetDateTime,
    ) {
        info!("Preempting {victim} on {link} in favor of {preemptor}");
        self.teardown_locked(state, victim);
        state.preemptions.push(PreemptionRecord {
            preempted: victim.clone(),
            preemptor: preemptor.clone(),
            link: link.clone(),
            at: now,
        });
    }

    /// Tear down a service request under the scheduler lock: retract all entries, release all
    /// resources, drop the active path, and mark the request unprovisioned.
    fn teardown_locked(&self, state: &mut SchedulerState, sr: &ServiceRequestId) {
        if let Some(active) = state.table.remove(sr) {
            for entry in active.hop_entries.values().flatten() {
                self.retract_entry(state, entry);
            }
        }
        state.bandwidth.release_all(sr);
        if let Some(request) = state.requests.get_mut(sr) {
            request.provisioned = false;
        }
    }

    /// Send a `DeleteEntry` for the given entry and release its power allocation. Dispatch
    /// failures are logged only: the agent may be gone already.
    fn retract_entry(&self, state: &mut SchedulerState, entry: &EntryRef) {
        if let Err(e) = self.agents.send(
            &entry.agent,
            AgentPayload::DeleteEntry {
                entry_id: entry.entry_id.clone(),
            },
        ) {
            warn!("Cannot retract entry {}: {e}", entry.entry_id);
        }
        state.power.release(&entry.entry_id);
    }

    /// Roll back all hops scheduled so far in a cancelled `schedule_path` call.
    fn rollback_hops(
        &self,
        state: &mut SchedulerState,
        sr: &ServiceRequestId,
        path: &Path,
        hop_entries: &BTreeMap<usize, Vec<EntryRef>>,
    ) {
        let bw = self.requested_bandwidth(state, sr).unwrap_or_default();
        for (index, refs) in hop_entries {
            for entry in refs {
                self.retract_entry(state, entry);
            }
            if let Some(hop) = path.hops.get(*index) {
                state.bandwidth.unreserve(sr, &hop.link, bw);
            }
        }
    }

    /// The bandwidth to reserve for a service request, falling back to the configured default.
    fn requested_bandwidth(
        &self,
        state: &SchedulerState,
        sr: &ServiceRequestId,
    ) -> Result<u64, ScheduleError> {
        let request = state
            .requests
            .get(sr)
            .ok_or_else(|| ScheduleError::UnknownServiceRequest(sr.clone()))?;
        Ok(if request.bandwidth_bps == 0 {
            self.config.default_bandwidth_bps
        } else {
            request.bandwidth_bps
        })
    }

    /// The longest cached window duration per link used by the path. The replanner compares
    /// against this to detect that a better window has opened since the last plan.
    fn best_cached_windows(&self, path: &Path) -> HashMap<LinkId, Duration> {
        let links: BTreeSet<&LinkId> = path.hops.iter().map(|h| &h.link).collect();
        links
            .into_iter()
            .map(|link| {
                let best = self
                    .cache
                    .get(link)
                    .unwrap_or_default()
                    .iter()
                    .map(ContactWindow::duration)
                    .max()
                    .unwrap_or(Duration::ZERO);
                (link.clone(), best)
            })
            .collect()
    }
}

/// Error of the scheduler.
#[derive(Debug, Clone, Error)]
pub enum ScheduleError {
    /// The link ID is empty.
    #[error("Link ID is empty")]
    EmptyLinkId,
    /// The path has no hops.
    #[error("The path for {0} has no hops")]
    EmptyPath(ServiceRequestId),
    /// The service request is not known to the scheduler.
    #[error("Unknown service request: {0}")]
    UnknownServiceRequest(ServiceRequestId),
    /// The service request has no active path.
    #[error("Service request {0} has no active path")]
    NotProvisioned(ServiceRequestId),
    /// No hop of the path could be scheduled.
    #[error("No hop of the path could be scheduled for {0}")]
    NothingScheduled(ServiceRequestId),
    /// An agent dispatch failed.
    #[error("{0}")]
    Agent(#[from] AgentError),
    /// A knowledge-base lookup failed.
    #[error("{0}")]
    World(#[from] WorldError),
    /// Bandwidth or power is exhausted, even after any preemption attempt.
    #[error("{0}")]
    Resource(#[from] ResourceError),
    /// A sampling pass failed.
    #[error("{0}")]
    Sampling(#[from] SampleError),
    /// The reverse indices disagree. This is an internal invariant violation.
    #[error("Reverse index corrupted: link {} and service request {} disagree", .0.link, .0.sr)]
    IndexCorrupted(IndexViolation),
    /// The operation was cancelled.
    #[error("The operation was cancelled")]
    Cancelled,
}
