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

//! The table of active paths with its reverse indices, and the path health classification.
//!
//! The reverse indices `link → service requests` and `service request → links` are materialized
//! views: every insert and every delete goes through the same transactional helpers, so
//! membership in one index always implies membership in the other.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use time::{Duration, OffsetDateTime};

use crate::sampling::ContactCache;
use crate::types::{
    EntryId, EntryRef, LinkId, Path, PathHealth, ServiceRequestId,
};

/// A scheduled path of a service request, together with everything needed to retract it.
#[derive(Debug, Clone)]
pub struct ActivePath {
    /// The service request this path serves.
    pub sr: ServiceRequestId,
    /// The scheduled path.
    pub path: Path,
    /// Entries per hop index.
    pub hop_entries: BTreeMap<usize, Vec<EntryRef>>,
    /// All scheduled entry IDs, in dispatch order.
    pub scheduled_actions: Vec<EntryId>,
    /// Longest cached window duration per used link at plan time. Used by the replanner to
    /// detect that a better window has opened since.
    pub best_window_at_plan: HashMap<LinkId, Duration>,
    /// When the path was last scheduled or updated.
    pub last_updated: OffsetDateTime,
    /// Last known health of the path.
    pub health: PathHealth,
    /// Set when a hop failed to dispatch; the replanner treats the path as due.
    pub needs_replan: bool,
}

impl ActivePath {
    /// The links used by the path's hops.
    pub fn links(&self) -> BTreeSet<LinkId> {
        self.path.hops.iter().map(|h| h.link.clone()).collect()
    }
}

/// A detected mismatch between the two reverse indices. This is an internal invariant
/// violation; the caller is expected to fail loudly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexViolation {
    /// The link of the offending index entry.
    pub link: LinkId,
    /// The service request of the offending index entry.
    pub sr: ServiceRequestId,
}

/// Active paths per service request, indexed in both directions.
#[derive(Debug, Default)]
pub struct ActivePathTable {
    /// Active path per service request.
    paths: HashMap<ServiceRequestId, ActivePath>,
    /// Which service requests use a link.
    link_to_srs: HashMap<LinkId, BTreeSet<ServiceRequestId>>,
    /// Which links a service request uses.
    sr_to_links: HashMap<ServiceRequestId, BTreeSet<LinkId>>,
}

impl ActivePathTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an active path, replacing any previous path of the same service request. Both
    /// reverse indices are updated in the same transaction.
    pub fn record(&mut self, active: ActivePath) {
        self.remove(&active.sr);
        let sr = active.sr.clone();
        let links = active.links();
        self.paths.insert(sr.clone(), active);
        for link in &links {
            self.link_to_srs
                .entry(link.clone())
                .or_default()
                .insert(sr.clone());
        }
        self.sr_to_links.insert(sr, links);
    }

    /// Remove the active path of a service request, clearing both reverse indices.
    pub fn remove(&mut self, sr: &ServiceRequestId) -> Option<ActivePath> {
        let active = self.paths.remove(sr)?;
        for link in self.sr_to_links.remove(sr).unwrap_or_default() {
            if let Some(srs) = self.link_to_srs.get_mut(&link) {
                srs.remove(sr);
                if srs.is_empty() {
                    self.link_to_srs.remove(&link);
                }
            }
        }
        Some(active)
    }

    /// Look up the active path of a service request.
    pub fn get(&self, sr: &ServiceRequestId) -> Option<&ActivePath> {
        self.paths.get(sr)
    }

    /// Mutable lookup of the active path of a service request.
    pub fn get_mut(&mut self, sr: &ServiceRequestId) -> Option<&mut ActivePath> {
        self.paths.get_mut(sr)
    }

    /// All service requests with a hop over the given link.
    pub fn srs_on_link(&self, link: &LinkId) -> BTreeSet<ServiceRequestId> {
        self.link_to_srs.get(link).cloned().unwrap_or_default()
    }

    /// All links used by the given service request.
    pub fn links_of(&self, sr: &ServiceRequestId) -> BTreeSet<LinkId> {
        self.sr_to_links.get(sr).cloned().unwrap_or_default()
    }

    /// Number of active paths.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Returns `true` if no path is active.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// IDs of all service requests with an active path.
    pub fn service_requests(&self) -> Vec<ServiceRequestId> {
        self.paths.keys().cloned().collect()
    }

    /// Check that the two reverse indices mirror each other, returning the first mismatch.
    pub fn audit(&self) -> Result<(), IndexViolation> {
        for (link, srs) in &self.link_to_srs {
            for sr in srs {
                if !self
                    .sr_to_links
                    .get(sr)
                    .map(|links| links.contains(link))
                    .unwrap_or(false)
                {
                    return Err(IndexViolation {
                        link: link.clone(),
                        sr: sr.clone(),
                    });
                }
            }
        }
        for (sr, links) in &self.sr_to_links {
            for link in links {
                if !self
                    .link_to_srs
                    .get(link)
                    .map(|srs| srs.contains(sr))
                    .unwrap_or(false)
                {
                    return Err(IndexViolation {
                        link: link.clone(),
                        sr: sr.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Classify the health of a path at time `at` against the contact cache.
///
/// The path is broken if `at` lies past its validity, or if some hop's link has cached windows
/// but none of them covers the hop and survives until `at`. It is degraded if the cache has no
/// entry for one or more hops' links (a sampling gap). Broken dominates degraded.
pub fn check_path_health(path: &Path, at: OffsetDateTime, cache: &ContactCache) -> PathHealth {
    if at > path.valid_until {
        return PathHealth::Broken;
    }
    let mut degraded = false;
    for hop in &path.hops {
        match cache.get(&hop.link) {
            None => degraded = true,
            Some(windows) => {
                let surviving = windows
                    .iter()
                    .any(|w| w.covers(hop.start, hop.end) && w.end >= at);
                if !surviving {
                    return PathHealth::Broken;
                }
            }
        }
    }
    if degraded {
        PathHealth::Degraded
    } else {
        PathHealth::Healthy
    }
}
