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

//! Store for telemetry pushed by node agents.
//!
//! The ingestion path itself (stream framing and transport) is an external collaborator; the
//! scheduler only reads this store to translate quality changes into replan signals.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::types::InterfaceId;

/// Metadata key under which agents carry their node identity on telemetry streams.
pub const NODE_ID_METADATA_KEY: &str = "x-node-id";

/// One telemetry sample of an interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceTelemetry {
    /// Operational state of the interface.
    pub oper_up: bool,
    /// Received bytes since the agent started.
    pub rx_bytes: u64,
    /// Transmitted bytes since the agent started.
    pub tx_bytes: u64,
    /// Modem SINR in dB, if the interface has a modem.
    pub sinr_db: Option<f64>,
    /// When the sample was taken.
    pub taken_at: OffsetDateTime,
}

/// The latest telemetry sample per interface.
#[derive(Debug, Default)]
pub struct TelemetryStore {
    /// Samples indexed by interface.
    samples: RwLock<HashMap<InterfaceId, InterfaceTelemetry>>,
}

impl TelemetryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a sample, replacing the previous one. Returns the replaced sample.
    pub fn record(
        &self,
        iface: &InterfaceId,
        sample: InterfaceTelemetry,
    ) -> Option<InterfaceTelemetry> {
        self.samples
            .write()
            .unwrap()
            .insert(iface.clone(), sample)
    }

    /// Latest sample of the given interface.
    pub fn get(&self, iface: &InterfaceId) -> Option<InterfaceTelemetry> {
        self.samples.read().unwrap().get(iface).cloned()
    }

    /// All interfaces with at least one sample.
    pub fn interfaces(&self) -> Vec<InterfaceId> {
        self.samples.read().unwrap().keys().cloned().collect()
    }
}
