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

//! In-memory knowledge bases for platforms, nodes, interfaces, links, and transceivers, together
//! with the motion model and the range-based connectivity model.
//!
//! The scheduler treats this module as an external collaborator: it owns positions and link
//! up/down truth. Sampling never operates on the production instance but on a deep
//! [`WorldModel::snapshot`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

use crate::types::{InterfaceId, LinkId, NodeId, PlatformId};

/// A position or velocity in a cartesian frame, in kilometers (per second).
pub type Vec3 = [f64; 3];

/// Motion model of a platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Motion {
    /// The platform does not move (e.g. a ground station in the rotating frame).
    Fixed,
    /// The platform moves with a constant velocity in km/s.
    Linear {
        /// Velocity vector in km/s.
        velocity: Vec3,
    },
    /// The platform follows a circular orbit in the XY plane, keeping its initial Z coordinate.
    CircularOrbit {
        /// Orbit radius in km.
        radius_km: f64,
        /// Angular rate in rad/s.
        angular_rate: f64,
        /// Phase angle at the epoch, in radians.
        phase: f64,
    },
}

impl Motion {
    /// Compute the position after `elapsed` seconds, starting from `initial`.
    fn position_after(&self, initial: Vec3, elapsed: f64) -> Vec3 {
        match self {
            Motion::Fixed => initial,
            Motion::Linear { velocity } => [
                initial[0] + velocity[0] * elapsed,
                initial[1] + velocity[1] * elapsed,
                initial[2] + velocity[2] * elapsed,
            ],
            Motion::CircularOrbit {
                radius_km,
                angular_rate,
                phase,
            } => {
                let theta = phase + angular_rate * elapsed;
                [radius_km * theta.cos(), radius_km * theta.sin(), initial[2]]
            }
        }
    }
}

/// A physical platform carrying nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Platform {
    /// Identifier of the platform.
    pub id: PlatformId,
    /// Motion model of the platform.
    pub motion: Motion,
    /// Position at the epoch.
    pub initial_position: Vec3,
    /// Current position (updated by [`WorldModel::advance_to`]).
    pub position: Vec3,
}

/// A network node hosted on a platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Identifier of the node.
    pub id: NodeId,
    /// Platform the node is mounted on.
    pub platform: PlatformId,
}

/// Transceiver parameters of an interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transceiver {
    /// Total transmit power budget in watts.
    pub max_power_watts: f64,
    /// Transmit power in dBW, used for the SNR estimate.
    pub tx_power_dbw: f64,
    /// Maximum usable range in km.
    pub max_range_km: f64,
}

/// A radio interface of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interface {
    /// Identifier of the interface.
    pub id: InterfaceId,
    /// Node the interface belongs to.
    pub node: NodeId,
    /// Transceiver parameters.
    pub transceiver: Transceiver,
}

/// A (potential) directional link between two interfaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    /// Identifier of the link.
    pub id: LinkId,
    /// First endpoint interface.
    pub a: InterfaceId,
    /// Second endpoint interface.
    pub b: InterfaceId,
    /// Capacity of the link in bits per second.
    pub capacity_bps: u64,
    /// Administrative state. Disabled links are never up.
    pub enabled: bool,
    /// Operational state, recomputed by [`WorldModel::recompute_connectivity`].
    pub up: bool,
}

/// The combined physical and network knowledge bases.
///
/// Cloning the model produces a deep snapshot: all state is owned, so a clone shares nothing
/// with the original.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldModel {
    /// Reference time at which the initial positions are defined.
    epoch: OffsetDateTime,
    /// All platforms, indexed by ID.
    platforms: BTreeMap<PlatformId, Platform>,
    /// All nodes, indexed by ID.
    nodes: BTreeMap<NodeId, Node>,
    /// All interfaces, indexed by ID.
    interfaces: BTreeMap<InterfaceId, Interface>,
    /// All links, indexed by ID.
    links: BTreeMap<LinkId, Link>,
}

impl WorldModel {
    /// Create an empty world with the given epoch.
    pub fn new(epoch: OffsetDateTime) -> Self {
        Self {
            epoch,
            platforms: BTreeMap::new(),
            nodes: BTreeMap::new(),
            interfaces: BTreeMap::new(),
            links: BTreeMap::new(),
        }
    }

    /// The epoch of the world.
    pub fn epoch(&self) -> OffsetDateTime {
        self.epoch
    }

    /// Add (or replace) a platform at the given initial position.
    pub fn add_platform(&mut self, id: impl Into<PlatformId>, position: Vec3, motion: Motion) {
        let id = id.into();
        self.platforms.insert(
            id.clone(),
            Platform {
                id,
                motion,
                initial_position: position,
                position,
            },
        );
    }

    /// Add (or replace) a node on the given platform.
    pub fn add_node(
        &mut self,
        id: impl Into<NodeId>,
        platform: impl Into<PlatformId>,
    ) -> Result<(), WorldError> {
        let id = id.into();
        let platform = platform.into();
        if !self.platforms.contains_key(&platform) {
            return Err(WorldError::UnknownPlatform(platform));
        }
        self.nodes.insert(id.clone(), Node { id, platform });
        Ok(())
    }

    /// Add (or replace) an interface on the given node.
    pub fn add_interface(
        &mut self,
        id: impl Into<InterfaceId>,
        node: impl Into<NodeId>,
        transceiver: Transceiver,
    ) -> Result<(), WorldError> {
        let id = id.into();
        let node = node.into();
        if !self.nodes.contains_key(&node) {
            return Err(WorldError::UnknownNode(node));
        }
        self.interfaces.insert(
            id.clone(),
            Interface {
                id,
                node,
                transceiver,
            },
        );
        Ok(())
    }

    /// Add (or replace) a link between the two given interfaces. The interfaces must exist and
    /// belong to distinct nodes. The link starts administratively enabled and operationally down.
    pub fn add_link(
        &mut self,
        id: impl Into<LinkId>,
        a: impl Into<InterfaceId>,
        b: impl Into<InterfaceId>,
        capacity_bps: u64,
    ) -> Result<(), WorldError> {
        let id = id.into();
        let a = a.into();
        let b = b.into();
        let node_a = self.node_of_interface(&a)?.clone();
        let node_b = self.node_of_interface(&b)?.clone();
        if node_a == node_b {
            return Err(WorldError::LoopLink(id));
        }
        self.links.insert(
            id.clone(),
            Link {
                id,
                a,
                b,
                capacity_bps,
                enabled: true,
                up: false,
            },
        );
        Ok(())
    }

    /// Change the administrative state of a link.
    pub fn set_link_enabled(
        &mut self,
        link: &LinkId,
        enabled: bool,
    ) -> Result<(), WorldError> {
        self.links
            .get_mut(link)
            .map(|l| l.enabled = enabled)
            .ok_or_else(|| WorldError::UnknownLink(link.clone()))
    }

    /// Take a deep snapshot of the world. The snapshot shares no mutable state with `self`.
    pub fn snapshot(&self) -> Self {
        self.clone()
    }

    /// Force the administrative state of every link to active, so that connectivity reflects raw
    /// geometric visibility. Only meaningful on a sampling snapshot.
    pub fn force_links_active(&mut self) {
        for link in self.links.values_mut() {
            link.enabled = true;
        }
    }

    /// Advance all platform positions to the given time. Fails if any motion model produces a
    /// non-finite position.
    pub fn advance_to(&mut self, t: OffsetDateTime) -> Result<(), WorldError> {
        let elapsed = (t - self.epoch).as_seconds_f64();
        for platform in self.platforms.values_mut() {
            let pos = platform.motion.position_after(platform.initial_position, elapsed);
            if pos.iter().any(|x| !x.is_finite()) {
                return Err(WorldError::NonFiniteMotion(platform.id.clone()));
            }
            platform.position = pos;
        }
        Ok(())
    }

    /// Recompute the operational state of every link from the current positions: a link is up iff
    /// it is administratively enabled and its endpoints are within range of both transceivers.
    pub fn recompute_connectivity(&mut self) -> Result<(), WorldError> {
        let mut state = Vec::with_capacity(self.links.len());
        for link in self.links.values() {
            let d = self.link_distance_km(link)?;
            let range_a = self.interface(&link.a)?.transceiver.max_range_km;
            let range_b = self.interface(&link.b)?.transceiver.max_range_km;
            state.push((link.id.clone(), link.enabled && d <= range_a.min(range_b)));
        }
        for (id, up) in state {
            if let Some(link) = self.links.get_mut(&id) {
                link.up = up;
            }
        }
        Ok(())
    }

    /// Operational state of a link.
    pub fn is_up(&self, link: &LinkId) -> Result<bool, WorldError> {
        Ok(self.link(link)?.up)
    }

    /// Estimate the SNR of a link in dB from the transmit power and the current distance. The
    /// value is monotone: larger is better.
    pub fn snr_db(&self, link: &LinkId) -> Result<f64, WorldError> {
        let l = self.link(link)?;
        let d = self.link_distance_km(l)?.max(1e-3);
        let tx = self.interface(&l.a)?.transceiver.tx_power_dbw;
        Ok(tx + 40.0 - 20.0 * d.log10())
    }

    /// The two endpoint nodes of a link, in the order of its interfaces.
    pub fn link_endpoints(&self, link: &LinkId) -> Result<(NodeId, NodeId), WorldError> {
        let l = self.link(link)?;
        Ok((
            self.node_of_interface(&l.a)?.clone(),
            self.node_of_interface(&l.b)?.clone(),
        ))
    }

    /// Endpoint map of all links, as consumed by the time-expanded graph builder.
    pub fn all_link_endpoints(
        &self,
    ) -> Result<BTreeMap<LinkId, (NodeId, NodeId)>, WorldError> {
        self.links
            .keys()
            .map(|l| Ok((l.clone(), self.link_endpoints(l)?)))
            .collect()
    }

    /// The interface of `node` that terminates `link`.
    pub fn tx_interface(
        &self,
        node: &NodeId,
        link: &LinkId,
    ) -> Result<InterfaceId, WorldError> {
        let l = self.link(link)?;
        for iface in [&l.a, &l.b] {
            if self.node_of_interface(iface)? == node {
                return Ok(iface.clone());
            }
        }
        Err(WorldError::NodeNotOnLink(node.clone(), link.clone()))
    }

    /// All links with at least one endpoint interface on the given node.
    pub fn links_of_node(&self, node: &NodeId) -> Vec<LinkId> {
        self.links
            .values()
            .filter(|l| {
                [&l.a, &l.b]
                    .into_iter()
                    .any(|i| self.node_of_interface(i).ok() == Some(node))
            })
            .map(|l| l.id.clone())
            .collect()
    }

    /// All links with the given interface as an endpoint.
    pub fn links_of_interface(&self, iface: &InterfaceId) -> Vec<LinkId> {
        self.links
            .values()
            .filter(|l| l.a == *iface || l.b == *iface)
            .map(|l| l.id.clone())
            .collect()
    }

    /// Capacity of a link in bits per second.
    pub fn link_capacity(&self, link: &LinkId) -> Result<u64, WorldError> {
        Ok(self.link(link)?.capacity_bps)
    }

    /// Transmit power budget of an interface in watts.
    pub fn max_power_watts(&self, iface: &InterfaceId) -> Result<f64, WorldError> {
        Ok(self.interface(iface)?.transceiver.max_power_watts)
    }

    /// All link IDs of the world.
    pub fn link_ids(&self) -> Vec<LinkId> {
        self.links.keys().cloned().collect()
    }

    /// All node IDs of the world.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().cloned().collect()
    }

    /// Look up a link.
    fn link(&self, link: &LinkId) -> Result<&Link, WorldError> {
        self.links
            .get(link)
            .ok_or_else(|| WorldError::UnknownLink(link.clone()))
    }

    /// Look up an interface.
    fn interface(&self, iface: &InterfaceId) -> Result<&Interface, WorldError> {
        self.interfaces
            .get(iface)
            .ok_or_else(|| WorldError::UnknownInterface(iface.clone()))
    }

    /// The node owning the given interface.
    fn node_of_interface(&self, iface: &InterfaceId) -> Result<&NodeId, WorldError> {
        Ok(&self.interface(iface)?.node)
    }

    /// Euclidean distance between the two endpoint platforms of a link, in km.
    fn link_distance_km(&self, link: &Link) -> Result<f64, WorldError> {
        let pos_a = self.interface_position(&link.a)?;
        let pos_b = self.interface_position(&link.b)?;
        Ok(((pos_a[0] - pos_b[0]).powi(2)
            + (pos_a[1] - pos_b[1]).powi(2)
            + (pos_a[2] - pos_b[2]).powi(2))
        .sqrt())
    }

    /// Position of the platform carrying the given interface.
    fn interface_position(&self, iface: &InterfaceId) -> Result<Vec3, WorldError> {
        let node = self.node_of_interface(iface)?;
        let node = self
            .nodes
            .get(node)
            .ok_or_else(|| WorldError::UnknownNode(node.clone()))?;
        self.platforms
            .get(&node.platform)
            .map(|p| p.position)
            .ok_or_else(|| WorldError::UnknownPlatform(node.platform.clone()))
    }
}

/// Error raised by the knowledge bases.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorldError {
    /// Reference to a platform that does not exist.
    #[error("Unknown platform: {0}")]
    UnknownPlatform(PlatformId),
    /// Reference to a node that does not exist.
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),
    /// Reference to an interface that does not exist.
    #[error("Unknown interface: {0}")]
    UnknownInterface(InterfaceId),
    /// Reference to a link that does not exist.
    #[error("Unknown link: {0}")]
    UnknownLink(LinkId),
    /// Both endpoints of the link sit on the same node.
    #[error("Both endpoints of link {0} are on the same node")]
    LoopLink(LinkId),
    /// The node is not an endpoint of the link.
    #[error("Node {0} is not an endpoint of link {1}")]
    NodeNotOnLink(NodeId, LinkId),
    /// A motion model produced a non-finite position.
    #[error("Motion model of platform {0} produced a non-finite position")]
    NonFiniteMotion(PlatformId),
}
