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

//! Diffing two paths to minimize southbound churn on incremental updates.

use std::collections::HashMap;

use crate::types::{Path, PathHop};

/// Partition of the hops of two paths. Hops are compared as tuples, and the partition is a
/// multiset partition: `shared` plus `removed` equals the old hops, and `shared` plus `added`
/// equals the new hops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathDiff {
    /// Hops present in both paths.
    pub shared: Vec<PathHop>,
    /// Hops of the old path that are gone, with their index in the old path.
    pub removed: Vec<(usize, PathHop)>,
    /// Hops of the new path that are new, with their index in the new path.
    pub added: Vec<(usize, PathHop)>,
}

/// Compute the multiset partition of the hops of `old` and `new`.
pub fn diff_paths(old: &Path, new: &Path) -> PathDiff {
    let mut remaining: HashMap<&PathHop, usize> = HashMap::new();
    for hop in &old.hops {
        *remaining.entry(hop).or_default() += 1;
    }

    let mut diff = PathDiff::default();
    for (i, hop) in new.hops.iter().enumerate() {
        match remaining.get_mut(hop) {
            Some(n) if *n > 0 => {
                *n -= 1;
                diff.shared.push(hop.clone());
            }
            _ => diff.added.push((i, hop.clone())),
        }
    }

    // whatever was not matched by a new hop was removed
    let mut shared_left: HashMap<&PathHop, usize> = HashMap::new();
    for hop in &diff.shared {
        *shared_left.entry(hop).or_default() += 1;
    }
    for (i, hop) in old.hops.iter().enumerate() {
        match shared_left.get_mut(hop) {
            Some(n) if *n > 0 => *n -= 1,
            _ => diff.removed.push((i, hop.clone())),
        }
    }

    diff
}
