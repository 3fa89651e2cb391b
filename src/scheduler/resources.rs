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

//! Ledgers for the shared physical resources: bandwidth per link and transmit power per
//! interface.
//!
//! Only the scheduler writes these ledgers, and all access happens under the scheduler mutex.
//! Power uses the unit-watt model: every active beam entry consumes one watt of the transmit
//! interface's budget, keyed by the entry ID so that teardown releases exactly one unit.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use itertools::Itertools;
use thiserror::Error;

use crate::types::{EntryId, InterfaceId, LinkId, ServiceRequestId};

/// Per-link bandwidth reservations of all service requests.
#[derive(Debug, Clone, Default)]
pub struct BandwidthLedger {
    /// Nested reservation map: service request to link to bits per second.
    reserved: BTreeMap<ServiceRequestId, BTreeMap<LinkId, u64>>,
}

impl BandwidthLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total bandwidth currently reserved on the given link.
    pub fn reserved_on(&self, link: &LinkId) -> u64 {
        self.reserved
            .values()
            .filter_map(|links| links.get(link))
            .sum()
    }

    /// All reservations on the given link, as `(service request, bits per second)` pairs.
    pub fn reservations_on(&self, link: &LinkId) -> Vec<(ServiceRequestId, u64)> {
        self.reserved
            .iter()
            .filter_map(|(sr, links)| links.get(link).map(|bw| (sr.clone(), *bw)))
            .collect()
    }

    /// The reservation of a single service request, as `link → bits per second`.
    pub fn reservations_of(&self, sr: &ServiceRequestId) -> BTreeMap<LinkId, u64> {
        self.reserved.get(sr).cloned().unwrap_or_default()
    }

    /// Reserve `bw` bits per second on `link` for `sr`. Succeeds iff the residual capacity is at
    /// least `bw`. Repeated reservations for the same `(sr, link)` pair accumulate.
    pub fn reserve(
        &mut self,
        sr: &ServiceRequestId,
        link: &LinkId,
        bw: u64,
        capacity: u64,
    ) -> Result<(), ResourceError> {
        let residual = capacity.saturating_sub(self.reserved_on(link));
        if bw > residual {
            return Err(ResourceError::BandwidthExhausted {
                link: link.clone(),
                requested_bps: bw,
                residual_bps: residual,
            });
        }
        *self
            .reserved
            .entry(sr.clone())
            .or_default()
            .entry(link.clone())
            .or_default() += bw;
        Ok(())
    }

    /// Subtract `bw` bits per second from the reservation of `sr` on `link`, dropping the
    /// reservation entirely when it reaches zero.
    pub fn unreserve(&mut self, sr: &ServiceRequestId, link: &LinkId, bw: u64) {
        let Some(links) = self.reserved.get_mut(sr) else {
            return;
        };
        if let Some(current) = links.get_mut(link) {
            *current = current.saturating_sub(bw);
            if *current == 0 {
                links.remove(link);
            }
        }
        if links.is_empty() {
            self.reserved.remove(sr);
        }
    }

    /// Release the reservation of `sr` on `link`, returning the released bandwidth.
    pub fn release(&mut self, sr: &ServiceRequestId, link: &LinkId) -> u64 {
        let Some(links) = self.reserved.get_mut(sr) else {
            return 0;
        };
        let released = links.remove(link).unwrap_or_default();
        if links.is_empty() {
            self.reserved.remove(sr);
        }
        released
    }

    /// Release all reservations of `sr`, returning the released `link → bits per second` map.
    pub fn release_all(&mut self, sr: &ServiceRequestId) -> BTreeMap<LinkId, u64> {
        self.reserved.remove(sr).unwrap_or_default()
    }
}

/// Select the service requests to preempt on a link so that at least `shortfall` bits per second
/// become free.
///
/// Candidates are the reservations of strictly lower priority than the requester, taken lowest
/// priority first and largest bandwidth second. Returns `None` if even preempting all candidates
/// would not free enough capacity.
pub fn preemption_victims(
    reservations: &[(ServiceRequestId, u64, u8)],
    requester_priority: u8,
    shortfall: u64,
) -> Option<Vec<ServiceRequestId>> {
    let mut victims = Vec::new();
    let mut freed = 0u64;
    for (sr, bw, _) in reservations
        .iter()
        .filter(|(_, _, prio)| *prio < requester_priority)
        .sorted_by_key(|(_, bw, prio)| (*prio, Reverse(*bw)))
    {
        victims.push(sr.clone());
        freed += bw;
        if freed >= shortfall {
            return Some(victims);
        }
    }
    None
}

/// Unit-watt power allocations per interface, keyed by the beam entry holding them.
#[derive(Debug, Clone, Default)]
pub struct PowerLedger {
    /// One allocation per active beam entry.
    allocations: HashMap<EntryId, InterfaceId>,
}

impl PowerLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Watts currently allocated on the given interface.
    pub fn allocated_on(&self, iface: &InterfaceId) -> f64 {
        self.allocations.values().filter(|i| *i == iface).count() as f64
    }

    /// Allocate one watt on `iface` for the given beam entry. Fails if the interface budget
    /// would be exceeded.
    pub fn allocate(
        &mut self,
        entry: &EntryId,
        iface: &InterfaceId,
        max_watts: f64,
    ) -> Result<(), ResourceError> {
        if self.allocated_on(iface) + 1.0 > max_watts {
            return Err(ResourceError::PowerExhausted {
                interface: iface.clone(),
                budget_watts: max_watts,
            });
        }
        self.allocations.insert(entry.clone(), iface.clone());
        Ok(())
    }

    /// Release the allocation held by the given entry, if any.
    pub fn release(&mut self, entry: &EntryId) -> Option<InterfaceId> {
        self.allocations.remove(entry)
    }

    /// Number of live allocations.
    pub fn len(&self) -> usize {
        self.allocations.len()
    }

    /// Returns `true` if no allocation is live.
    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }
}

/// Error of the resource arbiter.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResourceError {
    /// The link has less residual capacity than requested, even after any preemption attempt.
    #[error("Link {link} has {residual_bps} b/s residual capacity, requested {requested_bps} b/s")]
    BandwidthExhausted {
        /// The saturated link.
        link: LinkId,
        /// Requested bandwidth in bits per second.
        requested_bps: u64,
        /// Residual capacity in bits per second.
        residual_bps: u64,
    },
    /// The transmit interface has no remaining power budget.
    #[error("Interface {interface} has no remaining power budget ({budget_watts} W total)")]
    PowerExhausted {
        /// The exhausted interface.
        interface: InterfaceId,
        /// Total budget of the interface in watts.
        budget_watts: f64,
    },
}
