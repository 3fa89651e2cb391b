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

//! # Starling: Contact-Plan Scheduling for Satellite Constellations
//!
//! Starling is the control plane of a satellite-constellation network simulator. It translates a
//! dynamic, time-varying physical topology (moving platforms, transient line-of-sight between
//! radios) into a concrete schedule of per-node actions: when each node must activate or tear
//! down a directional beam, and when each node must install or withdraw a forwarding route, such
//! that end-to-end service requests remain satisfied as the topology evolves.
//!
//! ## Structure
//! The source code of this library is structured as follows:
//! - The module [`sampling`] advances a cloned world across a horizon and turns link visibility
//!   into contact windows, memoized in the [`sampling::ContactCache`].
//! - The module [`planning`] builds the time-expanded graph over a contact plan
//!   ([`planning::graph`]) and searches it for shortest time-respecting paths
//!   ([`planning::plan_path`]).
//! - The module [`agents`] keeps the registry of connected node agents and their ordered
//!   southbound channels.
//! - The module [`scheduler`] is the core: it expands paths into dated entries
//!   ([`scheduler::actions`]), arbitrates bandwidth and power with priority-based preemption
//!   ([`scheduler::resources`]), tracks active paths and their health ([`scheduler::table`]),
//!   diffs paths on updates ([`scheduler::diff`]), and drives incremental replanning
//!   ([`scheduler::replan`]).
//! - The module [`world`] holds the in-memory knowledge bases (platforms, nodes, interfaces,
//!   links, transceivers) together with the motion and connectivity models, and the module
//!   [`telemetry`] the agent-pushed telemetry store. Both are collaborators of the scheduler,
//!   not part of it.
//!
//! The wire protocol framing, the gRPC transport, the telemetry ingestion path, and the CLI sit
//! outside of this crate; the southbound interface is the per-agent channel abstraction of
//! [`agents`].

#![deny(
    missing_docs,
    clippy::missing_docs_in_private_items,
    missing_debug_implementations,
    rust_2018_idioms
)]

pub mod agents;
pub mod config;
pub mod planning;
pub mod sampling;
pub mod scheduler;
pub mod telemetry;
#[cfg(test)]
mod test;
pub mod types;
pub mod world;

pub use config::SchedulerConfig;
pub use planning::plan_path;
pub use sampling::{sample_windows, ContactCache};
pub use scheduler::{CancelChannel, Scheduler, TopologyChange};
pub use types::{ContactPlan, ContactWindow, Path, PathHop, ServiceRequest};
