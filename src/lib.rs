// Copyright 2017 ETH Zurich. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Reconstructs jobs, stages and tasks from Spark event logs and derives
//! per-executor resource usage and "ideal" stage completion times.
//!
//! Spark logs are new-line delimited JSON. The `Analyzer` demultiplexes the
//! records into `Job`s, each `Job` routes task completion records to its
//! `Stage`s, and each `Stage` parses them into immutable `Task`s. All derived
//! statistics (resource metrics, ideal times, load balancing) are computed on
//! demand from the task population and never cached.

extern crate json;
#[macro_use]
extern crate log;

pub mod analyzer;
pub mod concurrency;
pub mod error;
pub mod ideal;
pub mod job;
pub mod metrics;
pub mod record;
pub mod stage;
pub mod task;

#[cfg(test)]
mod fixtures;

pub use crate::analyzer::Analyzer;
pub use crate::error::Error;
pub use crate::ideal::{IdealTimeConfig, IdealTimes, MismatchPolicy, Placement};
pub use crate::job::Job;
pub use crate::metrics::ExecutorResourceMetrics;
pub use crate::stage::Stage;
pub use crate::task::Task;

pub type JobId = u32;
pub type StageId = u32;
pub type TaskId = u64;
pub type ExecutorId = String;

/// Unix time in milliseconds, as reported by the Spark driver.
pub type Timestamp = u64;
