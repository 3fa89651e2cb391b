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

//! Lifecycle of the contact window cache: hits within the TTL, misses beyond it, and explicit
//! invalidation.

use test_log::test;
use time::{Duration, OffsetDateTime};

use crate::sampling::ContactCache;
use crate::types::{ContactWindow, LinkId};

fn window(link: &LinkId, offset_s: i64, duration_s: i64) -> ContactWindow {
    let start = OffsetDateTime::now_utc() + Duration::seconds(offset_s);
    ContactWindow {
        link: link.clone(),
        start,
        end: start + Duration::seconds(duration_s),
        quality: 7.5,
    }
}

#[test]
fn lifecycle() {
    let cache = ContactCache::new(Duration::milliseconds(50));
    let link = LinkId::from("link-A");
    let windows = vec![window(&link, 60, 120)];

    cache.update(&link, &windows);
    assert_eq!(cache.get(&link), Some(windows.clone()));

    // let the entry expire
    std::thread::sleep(std::time::Duration::from_millis(60));
    assert_eq!(cache.get(&link), None);

    cache.invalidate(&link);
    assert_eq!(cache.get(&link), None);

    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 2);
    assert_eq!(stats.invalidations, 1);
}

#[test]
fn returned_copy_is_owned() {
    let cache = ContactCache::new(Duration::seconds(30));
    let link = LinkId::from("link-A");
    cache.update(&link, &[window(&link, 0, 60)]);

    let mut copy = cache.get(&link).unwrap();
    copy[0].quality = -1.0;
    copy.clear();

    // the cache is unaffected by mutations of the returned copy
    let again = cache.get(&link).unwrap();
    assert_eq!(again.len(), 1);
    assert_eq!(again[0].quality, 7.5);
}

#[test]
fn update_resorts_windows() {
    let cache = ContactCache::new(Duration::seconds(30));
    let link = LinkId::from("link-A");
    let late = window(&link, 600, 60);
    let early = window(&link, 60, 60);

    cache.update(&link, &[late.clone(), early.clone()]);
    assert_eq!(cache.get(&link), Some(vec![early, late]));
}

#[test]
fn invalidate_all_clears_every_entry() {
    let cache = ContactCache::new(Duration::seconds(30));
    let link_a = LinkId::from("link-A");
    let link_b = LinkId::from("link-B");
    cache.update(&link_a, &[window(&link_a, 0, 60)]);
    cache.update(&link_b, &[window(&link_b, 0, 60)]);
    assert_eq!(cache.len(), 2);

    cache.invalidate_all();
    assert!(cache.is_empty());
    assert_eq!(cache.get(&link_a), None);
    assert_eq!(cache.get(&link_b), None);
    assert_eq!(cache.stats().invalidations, 2);
}
