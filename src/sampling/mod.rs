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

//! Sampling of future link visibility into a contact plan.
//!
//! The sampler steps a cloned world across a horizon and records for each link the intervals
//! during which the link is geometrically visible.

use std::collections::HashMap;

use log::debug;
use thiserror::Error;
use time::{Duration, OffsetDateTime};

use crate::types::{ContactPlan, ContactWindow, LinkId};
use crate::world::{WorldError, WorldModel};

pub mod cache;

pub use cache::{CacheStats, ContactCache};

/// Stride of the simulated clock while sampling.
pub const SAMPLE_STRIDE: Duration = Duration::seconds(30);

/// Sample the visibility of every link of `world` from `now` to `horizon`, returning one ordered,
/// disjoint window sequence per link that was visible at least once.
///
/// The pass operates on a deep snapshot with all links forced administratively active, so it
/// neither mutates production state nor filters by administrative state. Any motion or
/// connectivity error fails the entire pass.
pub fn sample_windows(
    world: &WorldModel,
    now: OffsetDateTime,
    horizon: OffsetDateTime,
) -> Result<ContactPlan, SampleError> {
    if horizon < now {
        return Err(SampleError::HorizonInPast { now, horizon });
    }

    let mut sim = world.snapshot();
    sim.force_links_active();

    let links = sim.link_ids();
    let mut open: HashMap<LinkId, OffsetDateTime> = HashMap::new();
    let mut plan = ContactPlan::new();

    let mut t = now;
    loop {
        sim.advance_to(t)?;
        sim.recompute_connectivity()?;

        for link in &links {
            if sim.is_up(link)? {
                // rising edge
                open.entry(link.clone()).or_insert(t);
            } else if let Some(opened_at) = open.remove(link) {
                // falling edge
                close_window(&mut plan, &sim, link, opened_at, t)?;
            }
        }

        if t >= horizon {
            break;
        }
        t = (t + SAMPLE_STRIDE).min(horizon);
    }

    // any still-open window closes at the horizon
    for (link, opened_at) in open {
        close_window(&mut plan, &sim, &link, opened_at, horizon)?;
    }
    for windows in plan.values_mut() {
        windows.sort_by_key(|w| w.start);
    }

    debug!(
        "Sampled {} windows on {} links between {now} and {horizon}",
        plan.values().map(Vec::len).sum::<usize>(),
        plan.len(),
    );
    Ok(plan)
}

/// Record a window that closed at `end`, stamping it with the quality observed at close time.
/// Degenerate windows (opened exactly at the horizon) are dropped.
fn close_window(
    plan: &mut ContactPlan,
    sim: &WorldModel,
    link: &LinkId,
    start: OffsetDateTime,
    end: OffsetDateTime,
) -> Result<(), SampleError> {
    if end > start {
        plan.entry(link.clone()).or_default().push(ContactWindow {
            link: link.clone(),
            start,
            end,
            quality: sim.snr_db(link)?,
        });
    }
    Ok(())
}

/// Error of a sampling pass.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SampleError {
    /// The requested horizon lies in the past.
    #[error("Sampling horizon {horizon} lies before the current time {now}")]
    HorizonInPast {
        /// Start of the requested sampling interval.
        now: OffsetDateTime,
        /// Requested horizon.
        horizon: OffsetDateTime,
    },
    /// The motion or connectivity update failed, or the snapshot is inconsistent.
    #[error("{0}")]
    World(#[from] WorldError),
}
