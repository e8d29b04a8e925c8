// Copyright 2017 ETH Zurich. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::task::Task;
use crate::Timestamp;

/// Maximum number of tasks which were running at the same time.
///
/// Tasks are replayed in launch order onto a pool of slots; a slot becomes
/// free once its task finished, and a task which finishes exactly when
/// another launches does not overlap with it. The number of slots needed is
/// the maximum concurrency.
pub fn get_max_concurrency<'a, I>(tasks: I) -> usize
where
    I: IntoIterator<Item = &'a Task>,
{
    let mut intervals: Vec<(Timestamp, Timestamp)> = tasks
        .into_iter()
        .map(|task| (task.start_time, task.finish_time))
        .collect();
    intervals.sort_by_key(|&(start, _)| start);

    // timestamp of when each slot becomes free again
    let mut busy_until: Vec<Timestamp> = Vec::new();
    for (start, finish) in intervals {
        match busy_until.iter_mut().find(|until| **until <= start) {
            Some(slot) => *slot = finish,
            None => busy_until.push(finish),
        }
    }
    busy_until.len()
}
