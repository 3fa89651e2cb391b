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

//! Module containing all shared type definitions

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

/// Generate a string-backed identifier newtype.
macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(x: &str) -> Self {
                Self(x.to_string())
            }
        }

        impl From<String> for $name {
            fn from(x: String) -> Self {
                Self(x)
            }
        }

        impl $name {
            /// Returns `true` if the identifier is the empty string.
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            /// Borrow the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }
    };
}

id_type! {
    /// Identifier of a platform (a satellite or a ground station).
    PlatformId
}
id_type! {
    /// Identifier of a network node hosted on a platform.
    NodeId
}
id_type! {
    /// Identifier of a (potential) link between two interfaces.
    LinkId
}
id_type! {
    /// Identifier of a radio interface of a node.
    InterfaceId
}
id_type! {
    /// Identifier of an end-to-end service request.
    ServiceRequestId
}

/// Identifier of a node agent. Agents are identified by the node they run on.
pub type AgentId = NodeId;

/// Identifier of a scheduled entry. Entry IDs are deterministic strings derived from the service
/// request, the hop index, the entry kind, the hop endpoints, and the entry timestamp.
pub type EntryId = String;

/// An interval during which a specific link is usable given geometry and physics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactWindow {
    /// The link this window belongs to.
    pub link: LinkId,
    /// Start of the window.
    pub start: OffsetDateTime,
    /// End of the window. Always after `start`.
    pub end: OffsetDateTime,
    /// Link quality (SNR in dB) observed for this window. Larger is better.
    pub quality: f64,
}

impl ContactWindow {
    /// Duration of the window.
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Returns `true` if the window fully covers the interval `[start, end]`.
    pub fn covers(&self, start: OffsetDateTime, end: OffsetDateTime) -> bool {
        self.start <= start && end <= self.end
    }

    /// Clip the window to `[lo, hi]`, returning `None` if the clipped window is empty.
    pub fn clipped(&self, lo: OffsetDateTime, hi: OffsetDateTime) -> Option<Self> {
        let start = self.start.max(lo);
        let end = self.end.min(hi);
        (end > start).then(|| Self {
            link: self.link.clone(),
            start,
            end,
            quality: self.quality,
        })
    }
}

/// Mapping from link to the ordered sequence of its contact windows.
pub type ContactPlan = BTreeMap<LinkId, Vec<ContactWindow>>;

/// A single hop of a time-expanded path, crossing `link` during `[start, end]`.
///
/// The interval is always covered by some contact window of `link`, and `from`/`to` are the two
/// endpoints of that link.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathHop {
    /// Transmitting node of the hop.
    pub from: NodeId,
    /// Receiving node of the hop.
    pub to: NodeId,
    /// Link crossed by the hop.
    pub link: LinkId,
    /// Time at which the hop becomes usable.
    pub start: OffsetDateTime,
    /// Time at which the hop stops being usable.
    pub end: OffsetDateTime,
}

/// A time-respecting path through the constellation.
///
/// Consecutive hops share an intermediate node. Hops may overlap in wall time, as the
/// intermediate node may concurrently receive and transmit on distinct interfaces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Path {
    /// The ordered sequence of hops.
    pub hops: Vec<PathHop>,
    /// Time from which the path is usable (start of the first hop).
    pub valid_from: OffsetDateTime,
    /// Time until which the path is usable (end of the last hop).
    pub valid_until: OffsetDateTime,
}

impl Path {
    /// Build a path from a non-empty hop sequence. Returns `None` for an empty sequence.
    pub fn from_hops(hops: Vec<PathHop>) -> Option<Self> {
        let valid_from = hops.first()?.start;
        let valid_until = hops.last()?.end;
        Some(Self {
            hops,
            valid_from,
            valid_until,
        })
    }

    /// Source node of the path.
    pub fn src(&self) -> Option<&NodeId> {
        self.hops.first().map(|h| &h.from)
    }

    /// Destination node of the path.
    pub fn dst(&self) -> Option<&NodeId> {
        self.hops.last().map(|h| &h.to)
    }
}

/// Health classification of an active path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathHealth {
    /// All hops are covered by surviving contact windows.
    Healthy,
    /// The contact cache lacks entries for one or more hops' links (sampling gap).
    Degraded,
    /// The path has expired, or some hop lost its contact window.
    Broken,
}

impl std::fmt::Display for PathHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Broken => write!(f, "broken"),
        }
    }
}

/// An external demand for end-to-end connectivity. Consumed read-only by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRequest {
    /// Identifier of the request.
    pub id: ServiceRequestId,
    /// Source node.
    pub src: NodeId,
    /// Destination node.
    pub dst: NodeId,
    /// Priority of the request. Larger values preempt smaller ones.
    pub priority: u8,
    /// Whether the request is currently provisioned.
    pub provisioned: bool,
    /// Requested bandwidth in bits per second. Zero means the configured default.
    pub bandwidth_bps: u64,
}

/// Reference from a scheduled entry back to the agent and hop it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRef {
    /// Identifier of the scheduled entry.
    pub entry_id: EntryId,
    /// Agent the entry was dispatched to.
    pub agent: AgentId,
    /// Index of the hop the entry belongs to.
    pub hop_index: usize,
}

/// Audit record of a preemption event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreemptionRecord {
    /// The service request that lost its reservation.
    pub preempted: ServiceRequestId,
    /// The service request that triggered the preemption.
    pub preemptor: ServiceRequestId,
    /// The link on which the conflict occurred.
    pub link: LinkId,
    /// When the preemption happened.
    pub at: OffsetDateTime,
}
