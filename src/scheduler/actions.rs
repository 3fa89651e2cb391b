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

//! Translation of path hops into dated beam and route entries.
//!
//! Every hop expands into exactly four entries on the hop's transmitting agent: beam on at the
//! hop start (clamped to `now` if the start lies in the past), beam off at the hop end, route
//! install at the hop start, and route withdraw at the hop end.

use time::OffsetDateTime;

use crate::agents::{ActionKind, BeamSpec, RouteSpec, ScheduledEntry};
use crate::types::{EntryId, InterfaceId, NodeId, PathHop, ServiceRequestId};

/// The four entries of a single hop, in dispatch order. `beam_on_id` is the entry that holds
/// the hop's power allocation.
#[derive(Debug, Clone)]
pub struct HopEntries {
    /// Beam on, beam off, route install, route withdraw.
    pub entries: Vec<ScheduledEntry>,
    /// ID of the beam-on entry, the key of the power allocation.
    pub beam_on_id: EntryId,
}

/// Build the canonical entry ID.
///
/// The format is `sr:{sr}:hop:{i}:{beam|route}:{from}->{to}[:off]:{unixNano}`, where the
/// timestamp is the entry's scheduled time in unix nanoseconds.
pub fn entry_id(
    sr: &ServiceRequestId,
    hop_index: usize,
    class: &str,
    from: &NodeId,
    to: &NodeId,
    off: bool,
    when: OffsetDateTime,
) -> EntryId {
    let off = if off { ":off" } else { "" };
    format!(
        "sr:{sr}:hop:{hop_index}:{class}:{from}->{to}{off}:{}",
        when.unix_timestamp_nanos()
    )
}

/// Expand a hop into its four dated entries, addressed to the agent of the hop's transmitting
/// node.
pub fn build_hop_entries(
    sr: &ServiceRequestId,
    hop_index: usize,
    hop: &PathHop,
    tx_interface: &InterfaceId,
    destination: &NodeId,
    now: OffsetDateTime,
) -> HopEntries {
    let agent = hop.from.clone();
    let beam = BeamSpec {
        link: hop.link.clone(),
        interface: tx_interface.clone(),
        peer: hop.to.clone(),
    };
    let route = RouteSpec {
        destination: destination.clone(),
        next_hop: hop.to.clone(),
    };

    // a hop that already started is activated immediately
    let beam_on_at = hop.start.max(now);
    let beam_on_id = entry_id(sr, hop_index, "beam", &hop.from, &hop.to, false, beam_on_at);

    let entries = vec![
        ScheduledEntry {
            entry_id: beam_on_id.clone(),
            agent: agent.clone(),
            when: beam_on_at,
            kind: ActionKind::UpdateBeam,
            beam: Some(beam.clone()),
            route: None,
        },
        ScheduledEntry {
            entry_id: entry_id(sr, hop_index, "beam", &hop.from, &hop.to, true, hop.end),
            agent: agent.clone(),
            when: hop.end,
            kind: ActionKind::DeleteBeam,
            beam: Some(beam),
            route: None,
        },
        ScheduledEntry {
            entry_id: entry_id(sr, hop_index, "route", &hop.from, &hop.to, false, hop.start),
            agent: agent.clone(),
            when: hop.start,
            kind: ActionKind::SetRoute,
            beam: None,
            route: Some(route.clone()),
        },
        ScheduledEntry {
            entry_id: entry_id(sr, hop_index, "route", &hop.from, &hop.to, true, hop.end),
            agent,
            when: hop.end,
            kind: ActionKind::DeleteRoute,
            beam: None,
            route: Some(route),
        },
    ];

    HopEntries {
        entries,
        beam_on_id,
    }
}
