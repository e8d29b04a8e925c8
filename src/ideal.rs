// Copyright 2017 ETH Zurich. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Policy knobs and result type of the ideal-time estimators in `Stage`.

use std::fmt;

use crate::error::{Error, Resource};
use crate::StageId;

/// Link speed of the m2.4xlarge instances most logs were collected on.
pub const DEFAULT_NETWORK_GIGABITS_PER_S: f64 = 1.0;
pub const DEFAULT_CORES_PER_EXECUTOR: usize = 8;
pub const DEFAULT_TOLERANCE: f64 = 0.1;

/// Whether tasks could have moved between executors.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Placement {
    /// Work could be spread evenly across all participating executors.
    Fluid,
    /// Every task stays on the executor it ran on; the busiest executor
    /// bounds the stage.
    FixedExecutors,
}

/// What to do when engine-reported and OS-reported usage disagree.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MismatchPolicy {
    Warn,
    Fail,
}

#[derive(Clone, Debug, PartialEq)]
pub struct IdealTimeConfig {
    pub num_cores_per_executor: usize,
    pub network_throughput_gigabits_per_executor: f64,
    /// maximum relative difference between two measurements of one quantity
    pub tolerance: f64,
    pub mismatch: MismatchPolicy,
    pub placement: Placement,
    /// Use the disk monotask times reported by the engine instead of the
    /// disk throughput model, if the stage has any.
    pub use_disk_monotask_times: bool,
}

impl Default for IdealTimeConfig {
    fn default() -> Self {
        IdealTimeConfig {
            num_cores_per_executor: DEFAULT_CORES_PER_EXECUTOR,
            network_throughput_gigabits_per_executor: DEFAULT_NETWORK_GIGABITS_PER_S,
            tolerance: DEFAULT_TOLERANCE,
            mismatch: MismatchPolicy::Warn,
            placement: Placement::Fluid,
            use_disk_monotask_times: false,
        }
    }
}

impl IdealTimeConfig {
    pub fn network_bytes_per_milli(&self) -> f64 {
        self.network_throughput_gigabits_per_executor * 1.0e9 / 8.0 / 1000.0
    }

    /// Compares a quantity reported by the engine with the same quantity
    /// derived from OS counters.
    pub fn check_consistency(
        &self,
        stage: StageId,
        resource: Resource,
        reported: f64,
        measured: f64,
    ) -> Result<(), Error> {
        let difference = relative_difference(reported, measured);
        if difference <= self.tolerance {
            return Ok(());
        }
        let err = Error::MeasurementInconsistency {
            stage,
            resource,
            reported,
            measured,
            tolerance: self.tolerance,
        };
        match self.mismatch {
            MismatchPolicy::Warn => {
                warn!("{}", err);
                Ok(())
            }
            MismatchPolicy::Fail => Err(err),
        }
    }
}

/// `|a - b|` relative to the larger magnitude; 0 if both are 0.
pub fn relative_difference(a: f64, b: f64) -> f64 {
    let scale = a.abs().max(b.abs());
    if scale == 0.0 {
        0.0
    } else {
        (a - b).abs() / scale
    }
}

/// Best-case completion time of a stage along each resource, in seconds.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct IdealTimes {
    pub cpu_s: f64,
    pub network_s: f64,
    pub disk_s: f64,
}

impl IdealTimes {
    /// CPU, network and disk work overlap within a stage, so the slowest
    /// resource determines completion.
    pub fn max_s(&self) -> f64 {
        self.cpu_s.max(self.network_s).max(self.disk_s)
    }

    pub fn as_tuple(&self) -> (f64, f64, f64) {
        (self.cpu_s, self.network_s, self.disk_s)
    }
}

impl fmt::Display for IdealTimes {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "CPU: {:.3}s, network: {:.3}s, disk: {:.3}s",
            self.cpu_s, self.network_s, self.disk_s
        )
    }
}
