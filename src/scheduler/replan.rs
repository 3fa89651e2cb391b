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

//! The incremental replanner: it consumes topology-change notifications, finds the affected
//! service requests through the reverse index, and invokes the injectable replan capability
//! under a rate limit.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::types::{ContactWindow, LinkId, PathHealth, ServiceRequestId};

use super::{check_path_health, CancelChannel, ScheduleError, Scheduler};

/// Why a topology-change notification was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TopologyChange {
    /// A new link appeared.
    LinkAdded,
    /// A link disappeared.
    LinkRemoved,
    /// The quality of a link changed.
    LinkQualityChanged,
    /// An interface went down.
    InterfaceDown,
    /// An interface came back up.
    InterfaceUp,
    /// A shared resource is under pressure.
    ResourcePressure,
}

impl std::fmt::Display for TopologyChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LinkAdded => write!(f, "link_added"),
            Self::LinkRemoved => write!(f, "link_removed"),
            Self::LinkQualityChanged => write!(f, "link_quality_changed"),
            Self::InterfaceDown => write!(f, "interface_down"),
            Self::InterfaceUp => write!(f, "interface_up"),
            Self::ResourcePressure => write!(f, "resource_pressure"),
        }
    }
}

impl Scheduler {
    /// React to a topology change on `link`: look up all service requests with a hop over the
    /// link, gate each one through [`Scheduler::should_replan`], and invoke the replan
    /// capability for those that pass. Returns the number of invoked replans.
    pub async fn incremental_update(
        &self,
        link: &LinkId,
        reason: TopologyChange,
        now: OffsetDateTime,
    ) -> Result<usize, ScheduleError> {
        if link.is_empty() {
            return Err(ScheduleError::EmptyLinkId);
        }

        let affected = {
            let state = self.state.lock().await;
            let affected = state.table.srs_on_link(link);
            // a reverse-index mismatch here means the materialized views diverged
            for sr in &affected {
                if !state.table.links_of(sr).contains(link) {
                    return Err(ScheduleError::IndexCorrupted(super::IndexViolation {
                        link: link.clone(),
                        sr: sr.clone(),
                    }));
                }
            }
            affected
        };
        info!(
            "Topology change on {link} ({reason}): {} affected service requests",
            affected.len()
        );

        let mut replanned = 0;
        for sr in affected {
            if self.should_replan(&sr, now).await {
                let hook = self.replan_hook.read().unwrap();
                if let Some(hook) = hook.as_ref() {
                    hook(&sr);
                } else {
                    debug!("No replan capability installed; skipping {sr}");
                }
                replanned += 1;
            }
        }
        Ok(replanned)
    }

    /// Decide whether the given service request must be replanned at time `at`.
    ///
    /// A request without an active path is always due. Otherwise: a broken (or
    /// dispatch-incomplete) path is due; a path updated less than the minimum replan interval
    /// ago is not; a longer contact window on a used link since the last plan makes it due; a
    /// saturated link shared with a strictly higher-priority request makes it due.
    pub async fn should_replan(&self, sr: &ServiceRequestId, at: OffsetDateTime) -> bool {
        let state = self.state.lock().await;
        let Some(active) = state.table.get(sr) else {
            return true;
        };

        // (i) broken paths are always due
        if active.needs_replan
            || check_path_health(&active.path, at, &self.cache) == PathHealth::Broken
        {
            return true;
        }

        // (ii) rate limit
        let min_interval = self.config.min_replan_interval;
        if min_interval.is_positive() && at - active.last_updated < min_interval {
            return false;
        }

        // (iii) a better contact window has opened on a used link since the last plan
        for (link, best_at_plan) in &active.best_window_at_plan {
            let best_now = self
                .cache
                .get(link)
                .unwrap_or_default()
                .iter()
                .map(ContactWindow::duration)
                .max()
                .unwrap_or(Duration::ZERO);
            if best_now > *best_at_plan {
                return true;
            }
        }

        // (iv) a higher-priority request shares a saturated link
        let priority = state
            .requests
            .get(sr)
            .map(|r| r.priority)
            .unwrap_or_default();
        for link in state.table.links_of(sr) {
            let capacity = {
                let world = self.world.read().unwrap();
                world.link_capacity(&link).unwrap_or_default()
            };
            let saturated = state.bandwidth.reserved_on(&link) >= capacity;
            if !saturated {
                continue;
            }
            let conflicting = state.table.srs_on_link(&link).into_iter().any(|other| {
                other != *sr
                    && state
                        .requests
                        .get(&other)
                        .map(|r| r.priority > priority)
                        .unwrap_or(false)
            });
            if conflicting {
                return true;
            }
        }

        false
    }

    /// Signal that a link needs re-evaluation. Signals for the same link are coalesced through
    /// the single-slot channel: while a signal is pending, further ones are dropped.
    pub fn signal_replan(&self, link: LinkId) {
        if self.replan_tx.try_send(link).is_err() {
            debug!("Replan signal coalesced");
        }
    }

    /// Consume the next pending replan signal. Used by the replan loop.
    pub async fn next_replan_signal(&self) -> Option<LinkId> {
        self.replan_rx.lock().await.recv().await
    }

    /// Drain replan signals until cancelled, feeding each one into
    /// [`Scheduler::incremental_update`] as a quality change.
    pub async fn run_replan_loop(&self, cancel: CancelChannel) {
        loop {
            let link = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Replan loop cancelled");
                    return;
                }
                link = self.next_replan_signal() => link,
            };
            let Some(link) = link else { return };
            let now = OffsetDateTime::now_utc();
            if let Err(e) = self
                .incremental_update(&link, TopologyChange::LinkQualityChanged, now)
                .await
            {
                log::warn!("Incremental update for {link} failed: {e}");
            }
        }
    }
}
