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

//! Health classification of active paths against the contact cache.

use test_log::test;
use time::{Duration, OffsetDateTime};

use crate::sampling::ContactCache;
use crate::scheduler::check_path_health;
use crate::types::{ContactWindow, LinkId, NodeId, Path, PathHealth, PathHop};

fn get_path(link: &str, start: OffsetDateTime, end: OffsetDateTime) -> Path {
    Path::from_hops(vec![PathHop {
        from: NodeId::from("a"),
        to: NodeId::from("b"),
        link: LinkId::from(link),
        start,
        end,
    }])
    .unwrap()
}

#[test]
fn window_coverage() {
    let cache = ContactCache::new(Duration::seconds(30));
    let now = OffsetDateTime::now_utc();
    let link = LinkId::from("link-1");
    let path = get_path("link-1", now, now + Duration::minutes(1));

    cache.update(
        &link,
        &[ContactWindow {
            link: link.clone(),
            start: now - Duration::minutes(1),
            end: now + Duration::minutes(1),
            quality: 5.0,
        }],
    );

    // the cached window covers the hop and extends to `now`
    assert_eq!(check_path_health(&path, now, &cache), PathHealth::Healthy);

    // two minutes later the path validity has expired
    assert_eq!(
        check_path_health(&path, now + Duration::minutes(2), &cache),
        PathHealth::Broken
    );

    // a hop over a link without any cache entry is a sampling gap
    let renamed = get_path("link-unsampled", now, now + Duration::minutes(1));
    assert_eq!(
        check_path_health(&renamed, now, &cache),
        PathHealth::Degraded
    );
}

#[test]
fn lost_window_breaks_the_path() {
    let cache = ContactCache::new(Duration::seconds(30));
    let now = OffsetDateTime::now_utc();
    let link = LinkId::from("link-1");
    let path = get_path("link-1", now, now + Duration::minutes(10));

    // the surviving window no longer covers the whole hop
    cache.update(
        &link,
        &[ContactWindow {
            link: link.clone(),
            start: now,
            end: now + Duration::minutes(5),
            quality: 5.0,
        }],
    );
    assert_eq!(check_path_health(&path, now, &cache), PathHealth::Broken);
}

#[test]
fn broken_dominates_degraded() {
    let cache = ContactCache::new(Duration::seconds(30));
    let now = OffsetDateTime::now_utc();
    let covered = LinkId::from("link-1");

    let mut hops = get_path("link-unsampled", now, now + Duration::minutes(1)).hops;
    hops.push(PathHop {
        from: NodeId::from("b"),
        to: NodeId::from("c"),
        link: covered.clone(),
        start: now,
        end: now + Duration::minutes(10),
    });
    let path = Path::from_hops(hops).unwrap();

    // one hop is unsampled (degraded), the other lost its window (broken)
    cache.update(
        &covered,
        &[ContactWindow {
            link: covered.clone(),
            start: now + Duration::minutes(5),
            end: now + Duration::minutes(10),
            quality: 1.0,
        }],
    );
    assert_eq!(check_path_health(&path, now, &cache), PathHealth::Broken);
}
