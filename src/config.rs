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

//! This module contains the code for reading the scheduler configuration.

use serde::{Deserialize, Deserializer};
use thiserror::Error;
use time::Duration;

/// Configuration knobs of the scheduler. All durations are given in seconds in the TOML
/// representation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SchedulerConfig {
    /// How long sampled contact windows stay fresh in the cache.
    #[serde(
        default = "default_contact_window_ttl",
        deserialize_with = "deserialize_duration_secs"
    )]
    pub contact_window_ttl: Duration,
    /// Interval between two sampling passes of the periodic sampling loop.
    #[serde(
        default = "default_sampling_interval",
        deserialize_with = "deserialize_duration_secs"
    )]
    pub sampling_interval: Duration,
    /// How far into the future each sampling pass looks.
    #[serde(
        default = "default_sampling_horizon",
        deserialize_with = "deserialize_duration_secs"
    )]
    pub sampling_horizon: Duration,
    /// Minimum interval between two replans of the same service request. Zero disables the rate
    /// limit.
    #[serde(
        default = "default_min_replan_interval",
        deserialize_with = "deserialize_duration_secs"
    )]
    pub min_replan_interval: Duration,
    /// Bandwidth reserved for service requests that do not specify one, in bits per second.
    #[serde(default = "default_bandwidth_bps")]
    pub default_bandwidth_bps: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            contact_window_ttl: default_contact_window_ttl(),
            sampling_interval: default_sampling_interval(),
            sampling_horizon: default_sampling_horizon(),
            min_replan_interval: Duration::ZERO,
            default_bandwidth_bps: default_bandwidth_bps(),
        }
    }
}

impl SchedulerConfig {
    /// Parse the configuration from a TOML string. Missing knobs take their default value.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }
}

/// Default TTL of cached contact windows: 30 seconds.
fn default_contact_window_ttl() -> Duration {
    Duration::seconds(30)
}

/// Default sampling interval: 30 seconds.
fn default_sampling_interval() -> Duration {
    Duration::seconds(30)
}

/// Default sampling horizon: 15 minutes.
fn default_sampling_horizon() -> Duration {
    Duration::seconds(900)
}

/// By default, replanning is not rate limited.
fn default_min_replan_interval() -> Duration {
    Duration::ZERO
}

/// Default bandwidth of a service request: 1 Mb/s.
fn default_bandwidth_bps() -> u64 {
    1_000_000
}

/// Deserialize a duration given as a number of seconds.
fn deserialize_duration_secs<'de, D>(de: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = u64::deserialize(de)?;
    Ok(Duration::seconds(secs as i64))
}

/// Error while reading the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The TOML file could not be parsed.
    #[error("Cannot parse the configuration: {0}")]
    Parse(#[from] toml::de::Error),
}
