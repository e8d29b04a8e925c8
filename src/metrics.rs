// Copyright 2017 ETH Zurich. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Per-executor resource usage derived from cumulative OS counters.
//!
//! The counters sampled at task boundaries are cumulative for the whole
//! machine, so the usage during a window is the difference between the
//! counters of the first task to start and the last task to finish.
//! Summing per-task differences would count overlapping tasks twice.

use std::collections::BTreeMap;
use std::fmt;

use json::JsonValue;

use crate::error::Error;
use crate::record::{optional_f64, required_f64};
use crate::task::Task;

pub const MILLIS_PER_JIFFY: f64 = 10.0;
pub const BYTES_PER_SECTOR: f64 = 512.0;

/// `numerator / denominator`, or 0 if the denominator is zero. A non-zero
/// numerator over a zero denominator points at inconsistent measurements
/// and is logged.
pub fn ratio_or_zero(numerator: f64, denominator: f64, what: &str) -> f64 {
    if denominator == 0.0 || !denominator.is_finite() {
        if numerator != 0.0 {
            warn!("{}: {} over a zero denominator, using 0", what, numerator);
        }
        0.0
    } else {
        numerator / denominator
    }
}

/// Raw block device counters as read from `/proc/diskstats`.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct DiskCounters {
    pub sectors_read: f64,
    pub millis_reading: f64,
    pub sectors_written: f64,
    pub millis_writing: f64,
}

impl DiskCounters {
    fn parse(data: &JsonValue) -> Result<Self, Error> {
        Ok(DiskCounters {
            sectors_read: optional_f64(data, "Sectors Read")?,
            millis_reading: optional_f64(data, "Millis Reading")?,
            sectors_written: optional_f64(data, "Sectors Written")?,
            millis_writing: optional_f64(data, "Millis Writing")?,
        })
    }
}

/// Disk utilization of one block device while a particular task was running.
#[derive(Clone, Debug, PartialEq)]
pub struct DiskUtilization {
    pub start_counters: DiskCounters,
    pub end_counters: DiskCounters,
    pub utilization: f64,
    pub read_throughput_bps: f64,
    pub write_throughput_bps: f64,
}

impl DiskUtilization {
    pub fn parse(data: &JsonValue) -> Result<Self, Error> {
        Ok(DiskUtilization {
            start_counters: DiskCounters::parse(&data["Start Counters"])?,
            end_counters: DiskCounters::parse(&data["End Counters"])?,
            utilization: required_f64(data, "Disk Utilization")?,
            read_throughput_bps: required_f64(data, "Read Throughput")?,
            write_throughput_bps: required_f64(data, "Write Throughput")?,
        })
    }

    /// Throughput the device would have reached at full utilization.
    pub fn effective_throughput_bps(&self) -> f64 {
        if self.utilization > 0.0 {
            (self.read_throughput_bps + self.write_throughput_bps) / self.utilization
        } else {
            0.0
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CpuMetrics {
    pub elapsed_millis: f64,
    pub cpu_millis: f64,
    pub num_cores: usize,
}

impl CpuMetrics {
    pub fn utilization(&self) -> f64 {
        ratio_or_zero(
            self.cpu_millis,
            self.elapsed_millis * self.num_cores as f64,
            "CPU utilization",
        )
    }

    pub fn add_metrics(&mut self, other: &CpuMetrics) {
        self.elapsed_millis += other.elapsed_millis;
        self.cpu_millis += other.cpu_millis;
        self.num_cores = self.num_cores.max(other.num_cores);
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NetworkMetrics {
    pub elapsed_millis: f64,
    /// Known to be unreliable; reported but never used to size a window.
    pub transmit_idle_millis: f64,
    pub bytes_transmitted: f64,
    pub bytes_received: f64,
}

impl NetworkMetrics {
    pub fn transmit_active_millis(&self) -> f64 {
        self.elapsed_millis - self.transmit_idle_millis
    }

    pub fn utilization(&self) -> f64 {
        ratio_or_zero(
            self.transmit_active_millis(),
            self.elapsed_millis,
            "network utilization",
        )
    }

    /// Bytes per millisecond while the link was transmitting.
    pub fn effective_throughput(&self) -> f64 {
        ratio_or_zero(
            self.bytes_transmitted,
            self.transmit_active_millis(),
            "network throughput",
        )
    }

    pub fn add_metrics(&mut self, other: &NetworkMetrics) {
        self.elapsed_millis += other.elapsed_millis;
        self.transmit_idle_millis += other.transmit_idle_millis;
        self.bytes_transmitted += other.bytes_transmitted;
        self.bytes_received += other.bytes_received;
    }
}

/// Usage of one block device over a window. `millis_reading` and
/// `millis_writing` are only accurate if all disk operations issued in the
/// window also completed in it.
#[derive(Clone, Debug, PartialEq)]
pub struct DiskMetrics {
    pub elapsed_millis: f64,
    pub bytes_read: f64,
    pub millis_reading: f64,
    pub bytes_written: f64,
    pub millis_writing: f64,
}

impl DiskMetrics {
    pub fn new(elapsed_millis: f64, start: &DiskCounters, end: &DiskCounters) -> Self {
        DiskMetrics {
            elapsed_millis,
            bytes_read: BYTES_PER_SECTOR * (end.sectors_read - start.sectors_read),
            millis_reading: end.millis_reading - start.millis_reading,
            bytes_written: BYTES_PER_SECTOR * (end.sectors_written - start.sectors_written),
            millis_writing: end.millis_writing - start.millis_writing,
        }
    }

    pub fn total_bytes(&self) -> f64 {
        self.bytes_read + self.bytes_written
    }

    pub fn total_io_millis(&self) -> f64 {
        self.millis_reading + self.millis_writing
    }

    pub fn utilization(&self) -> f64 {
        ratio_or_zero(self.total_io_millis(), self.elapsed_millis, "disk utilization")
    }

    /// Bytes per millisecond while the device was busy.
    pub fn effective_throughput(&self) -> f64 {
        ratio_or_zero(self.total_bytes(), self.total_io_millis(), "disk throughput")
    }

    pub fn add_metrics(&mut self, other: &DiskMetrics) {
        self.elapsed_millis += other.elapsed_millis;
        self.bytes_read += other.bytes_read;
        self.millis_reading += other.millis_reading;
        self.bytes_written += other.bytes_written;
        self.millis_writing += other.millis_writing;
    }
}

/// CPU, network, disk and GC usage of a single executor from the time the
/// first of a set of tasks started until the last one finished.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutorResourceMetrics {
    pub elapsed_millis: f64,
    pub num_tasks: usize,
    pub cpu: CpuMetrics,
    pub network: NetworkMetrics,
    pub disks: BTreeMap<String, DiskMetrics>,
    pub gc_millis: f64,
}

impl ExecutorResourceMetrics {
    /// Builds the metrics for `tasks`, which must all have run on the same
    /// executor. Returns `None` for an empty task set.
    pub fn for_executor_tasks(tasks: &[&Task], num_cores: usize) -> Option<Self> {
        let first = tasks.iter().min_by_key(|task| task.start_time)?;
        let last = tasks.iter().max_by_key(|task| task.finish_time)?;
        debug_assert!(tasks.iter().all(|t| t.executor_id == first.executor_id));
        Some(ExecutorResourceMetrics::between(first, last, tasks.len(), num_cores))
    }

    /// Counter deltas between the start of `first` and the end of `last`.
    pub fn between(first: &Task, last: &Task, num_tasks: usize, num_cores: usize) -> Self {
        let elapsed_millis = last.finish_time as f64 - first.start_time as f64;

        let cpu = CpuMetrics {
            elapsed_millis,
            cpu_millis: (last.end_total_cpu_jiffies - first.start_total_cpu_jiffies)
                * MILLIS_PER_JIFFY,
            num_cores,
        };

        let network = NetworkMetrics {
            elapsed_millis,
            transmit_idle_millis: last.end_network_transmit_idle_millis
                - first.start_network_transmit_idle_millis,
            bytes_transmitted: last.end_network_bytes_transmitted
                - first.start_network_bytes_transmitted,
            bytes_received: last.end_network_bytes_received - first.start_network_bytes_received,
        };

        let mut disks = BTreeMap::new();
        for (name, start) in &first.disk_utilization {
            match last.disk_utilization.get(name) {
                Some(end) => {
                    let metrics =
                        DiskMetrics::new(elapsed_millis, &start.start_counters, &end.end_counters);
                    disks.insert(name.clone(), metrics);
                }
                None => warn!(
                    "disk {} of executor {} missing from task {}",
                    name, last.executor_id, last.task_id
                ),
            }
        }

        ExecutorResourceMetrics {
            elapsed_millis,
            num_tasks,
            cpu,
            network,
            disks,
            gc_millis: last.end_gc_millis - first.start_gc_millis,
        }
    }

    /// Folds in the metrics of a disjoint window on the same executor.
    pub fn add_metrics(&mut self, other: &ExecutorResourceMetrics) {
        self.elapsed_millis += other.elapsed_millis;
        self.num_tasks += other.num_tasks;
        self.cpu.add_metrics(&other.cpu);
        self.network.add_metrics(&other.network);
        for (name, disk) in &other.disks {
            match self.disks.get_mut(name) {
                Some(existing) => existing.add_metrics(disk),
                None => {
                    self.disks.insert(name.clone(), disk.clone());
                }
            }
        }
        self.gc_millis += other.gc_millis;
    }

    pub fn disk_bytes(&self) -> f64 {
        self.disks.values().map(DiskMetrics::total_bytes).sum()
    }

    /// Combined bytes per millisecond of all disks which did any I/O.
    pub fn disk_throughput(&self) -> f64 {
        self.disks
            .values()
            .map(DiskMetrics::effective_throughput)
            .sum()
    }
}

impl fmt::Display for ExecutorResourceMetrics {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "elapsed millis: {}", self.elapsed_millis)?;
        writeln!(f, "num tasks: {}", self.num_tasks)?;
        writeln!(
            f,
            "CPU millis: {} (utilization {:.3})",
            self.cpu.cpu_millis,
            self.cpu.utilization()
        )?;
        writeln!(
            f,
            "network: transmit idle millis {}, transmit active millis {}, bytes transmitted {}",
            self.network.transmit_idle_millis,
            self.network.transmit_active_millis(),
            self.network.bytes_transmitted
        )?;
        for (name, disk) in &self.disks {
            writeln!(
                f,
                "{}: bytes read {}, millis reading {}, bytes written {}, millis writing {}",
                name, disk.bytes_read, disk.millis_reading, disk.bytes_written, disk.millis_writing
            )?;
        }
        write!(f, "GC millis: {}", self.gc_millis)
    }
}
