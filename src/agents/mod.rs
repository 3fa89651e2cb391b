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

//! Registry of connected node agents and southbound dispatch.
//!
//! Each registered agent owns a bounded outgoing channel of controller-to-agent messages.
//! Messages carry a per-agent sequence number that increases monotonically under the handle's
//! mutex, so the stream per agent is strictly ordered. The wire framing and the gRPC transport
//! live outside this crate; here the southbound is the channel abstraction itself.

use std::collections::HashMap;
use std::fmt::Write;
use std::sync::{Arc, Mutex, RwLock};

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::mpsc;

use crate::types::{AgentId, EntryId, InterfaceId, LinkId, NodeId};

/// Capacity of the per-agent outgoing channel. A full channel is a fatal agent condition.
pub const AGENT_CHANNEL_CAPACITY: usize = 64;

/// Kind of a scheduled action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    /// Activate or retarget a directional beam.
    UpdateBeam,
    /// Tear down a directional beam.
    DeleteBeam,
    /// Install a forwarding route.
    SetRoute,
    /// Withdraw a forwarding route.
    DeleteRoute,
}

/// Beam parameters of a scheduled action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeamSpec {
    /// Link the beam realizes.
    pub link: LinkId,
    /// Transmitting interface on the agent's node.
    pub interface: InterfaceId,
    /// Node the beam points at.
    pub peer: NodeId,
}

/// Route parameters of a scheduled action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSpec {
    /// Final destination of the route.
    pub destination: NodeId,
    /// Next hop towards the destination.
    pub next_hop: NodeId,
}

/// A dated, idempotent instruction to a node agent. The `entry_id` is the idempotency key:
/// re-sending an entry with the same ID must be safe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledEntry {
    /// Identifier of the entry.
    pub entry_id: EntryId,
    /// Agent the entry is addressed to.
    pub agent: AgentId,
    /// When the agent must apply the action.
    pub when: OffsetDateTime,
    /// Kind of the action.
    pub kind: ActionKind,
    /// Beam parameters, present for beam actions.
    pub beam: Option<BeamSpec>,
    /// Route parameters, present for route actions.
    pub route: Option<RouteSpec>,
}

/// Payload of a controller-to-agent message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AgentPayload {
    /// Schedule a dated action.
    ScheduledAction(ScheduledEntry),
    /// Retract a previously scheduled entry.
    DeleteEntry {
        /// Identifier of the entry to retract.
        entry_id: EntryId,
    },
}

/// A controller-to-agent message with its per-agent sequence number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    /// Monotonically increasing per-agent sequence number.
    pub seq: u64,
    /// The message payload.
    pub payload: AgentPayload,
}

/// Mutable per-agent session state, guarded by the handle's mutex.
#[derive(Debug)]
struct AgentSession {
    /// Session token echoed by the agent at registration. No cryptographic meaning.
    token: String,
    /// Sequence number of the last message sent.
    seq_no: u64,
    /// Highest sequence number the agent has acknowledged.
    last_acked: u64,
}

/// Handle of a connected agent.
#[derive(Debug)]
pub struct AgentHandle {
    /// Identifier of the agent (equal to the node ID).
    agent: AgentId,
    /// Node the agent runs on.
    node: NodeId,
    /// Outgoing bounded channel of controller-to-agent messages.
    tx: mpsc::Sender<AgentMessage>,
    /// Session state under a dedicated mutex.
    session: Mutex<AgentSession>,
}

impl AgentHandle {
    /// Identifier of the agent.
    pub fn agent(&self) -> &AgentId {
        &self.agent
    }

    /// Node the agent runs on.
    pub fn node(&self) -> &NodeId {
        &self.node
    }

    /// Current session token.
    pub fn token(&self) -> String {
        self.session.lock().unwrap().token.clone()
    }

    /// Sequence number of the last message sent to this agent.
    pub fn seq_no(&self) -> u64 {
        self.session.lock().unwrap().seq_no
    }

    /// Replace the session token (re-registration).
    pub fn set_token(&self, token: impl Into<String>) {
        self.session.lock().unwrap().token = token.into();
    }

    /// Send a payload to the agent, assigning the next sequence number.
    ///
    /// The sequence number is only consumed if the send succeeds, so `seq_no` stays
    /// monotonically non-decreasing and gap-free on the channel.
    pub fn send(&self, payload: AgentPayload) -> Result<u64, AgentError> {
        let mut session = self.session.lock().unwrap();
        let seq = session.seq_no + 1;
        self.tx
            .try_send(AgentMessage { seq, payload })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => AgentError::ChannelFull(self.agent.clone()),
                mpsc::error::TrySendError::Closed(_) => {
                    AgentError::ChannelClosed(self.agent.clone())
                }
            })?;
        session.seq_no = seq;
        Ok(seq)
    }

    /// Record an acknowledgement from the agent. Acknowledgements never move backwards.
    pub fn acknowledge(&self, seq: u64) {
        let mut session = self.session.lock().unwrap();
        session.last_acked = session.last_acked.max(seq);
    }
}

/// The set of currently connected agents.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    /// All registered agents, indexed by agent ID.
    agents: RwLock<HashMap<AgentId, Arc<AgentHandle>>>,
}

impl AgentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent for the given node, replacing any previous registration. Returns the
    /// handle and the receiving end of the agent's outgoing channel.
    pub fn register(
        &self,
        node: impl Into<NodeId>,
        token: impl Into<String>,
    ) -> (Arc<AgentHandle>, mpsc::Receiver<AgentMessage>) {
        let node = node.into();
        let (tx, rx) = mpsc::channel(AGENT_CHANNEL_CAPACITY);
        let handle = Arc::new(AgentHandle {
            agent: node.clone(),
            node: node.clone(),
            tx,
            session: Mutex::new(AgentSession {
                token: token.into(),
                seq_no: 0,
                last_acked: 0,
            }),
        });
        debug!("Registered agent {node}");
        self.agents
            .write()
            .unwrap()
            .insert(node, Arc::clone(&handle));
        (handle, rx)
    }

    /// Remove the registration of an agent.
    pub fn deregister(&self, agent: &AgentId) -> Option<Arc<AgentHandle>> {
        self.agents.write().unwrap().remove(agent)
    }

    /// Look up the handle of an agent.
    pub fn get(&self, agent: &AgentId) -> Option<Arc<AgentHandle>> {
        self.agents.read().unwrap().get(agent).cloned()
    }

    /// Send a payload to the given agent.
    pub fn send(&self, agent: &AgentId, payload: AgentPayload) -> Result<u64, AgentError> {
        self.get(agent)
            .ok_or_else(|| AgentError::NotFound(agent.clone()))?
            .send(payload)
    }

    /// Record an acknowledgement of the given agent.
    pub fn acknowledge(&self, agent: &AgentId, seq: u64) -> Result<(), AgentError> {
        self.get(agent)
            .ok_or_else(|| AgentError::NotFound(agent.clone()))?
            .acknowledge(seq);
        Ok(())
    }

    /// Produce a textual dump of the agent's state for introspection.
    pub fn dump_state(&self, agent: &AgentId) -> Result<String, AgentError> {
        let handle = self
            .get(agent)
            .ok_or_else(|| AgentError::NotFound(agent.clone()))?;
        let session = handle.session.lock().unwrap();
        let mut s = String::new();
        writeln!(&mut s, "agent:      {}", handle.agent).unwrap();
        writeln!(&mut s, "node:       {}", handle.node).unwrap();
        writeln!(&mut s, "token:      {}", session.token).unwrap();
        writeln!(&mut s, "seq_no:     {}", session.seq_no).unwrap();
        writeln!(&mut s, "last_acked: {}", session.last_acked).unwrap();
        Ok(s)
    }

    /// IDs of all registered agents.
    pub fn agent_ids(&self) -> Vec<AgentId> {
        self.agents.read().unwrap().keys().cloned().collect()
    }
}

/// Error of agent dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentError {
    /// No agent is registered under the given ID.
    #[error("agent {0} not found")]
    NotFound(AgentId),
    /// The agent's outgoing channel is full.
    #[error("Outgoing channel of agent {0} is full")]
    ChannelFull(AgentId),
    /// The agent's outgoing channel is closed.
    #[error("Outgoing channel of agent {0} is closed")]
    ChannelClosed(AgentId),
}
