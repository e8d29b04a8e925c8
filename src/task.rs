// Copyright 2017 ETH Zurich. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::BTreeMap;
use std::fmt;

use json::JsonValue;

use crate::error::Error;
use crate::metrics::DiskUtilization;
use crate::record::{optional_f64, required, required_str, required_u64, JsonParse};
use crate::{ExecutorId, StageId, TaskId, Timestamp};

pub const BYTES_PER_MB: f64 = 1_048_576.0;
const NANOS_PER_MILLI: f64 = 1_000_000.0;

/// Shuffle data fetched by a reduce task. Only present if the task read
/// shuffle output from a previous stage.
#[derive(Clone, Debug, PartialEq)]
pub struct ShuffleReadMetrics {
    /// time blocked waiting for remote blocks (ms)
    pub fetch_wait: f64,
    pub local_blocks_read: u64,
    pub remote_blocks_read: u64,
    pub remote_mb_read: f64,
    pub local_mb_read: f64,
    /// Not part of `fetch_wait`: local blocks are read while the fetch
    /// iterator is initialized (ms).
    pub local_read_time: f64,
}

impl ShuffleReadMetrics {
    fn parse(metrics: &JsonValue) -> Result<Self, Error> {
        let local_read_time = optional_f64(metrics, "Local Read Time")? / NANOS_PER_MILLI;
        Ok(ShuffleReadMetrics {
            fetch_wait: required(metrics, "Fetch Wait Time")?.parse_f64()?,
            local_blocks_read: required_u64(metrics, "Local Blocks Fetched")?,
            remote_blocks_read: required_u64(metrics, "Remote Blocks Fetched")?,
            remote_mb_read: required(metrics, "Remote Bytes Read")?.parse_f64()? / BYTES_PER_MB,
            local_mb_read: optional_f64(metrics, "Local Bytes Read")? / BYTES_PER_MB,
            local_read_time,
        })
    }

    pub fn total_mb_read(&self) -> f64 {
        self.remote_mb_read + self.local_mb_read
    }
}

/// One completed task, as described by a `SparkListenerTaskEnd` record.
///
/// Times are in milliseconds since the epoch. Fields suffixed with
/// `_jiffies`, `_millis` or `bytes` prefixed by `start_`/`end_` are
/// cumulative per-machine OS counters sampled when the task started and
/// finished; they are only meaningful as differences.
#[derive(Clone, Debug, PartialEq)]
pub struct Task {
    pub task_id: TaskId,
    pub stage_id: StageId,
    pub executor_id: ExecutorId,
    pub host: String,
    pub start_time: Timestamp,
    pub finish_time: Timestamp,

    pub executor_run_time: u64,
    pub executor_deserialize_time: u64,
    pub result_serialization_time: u64,

    pub gc_time: f64,
    pub start_gc_millis: f64,
    pub end_gc_millis: f64,

    pub process_user_cpu_utilization: f64,
    pub process_system_cpu_utilization: f64,
    pub total_cpu_utilization: f64,
    pub start_total_cpu_jiffies: f64,
    pub end_total_cpu_jiffies: f64,

    pub disk_utilization: BTreeMap<String, DiskUtilization>,

    pub network_bytes_transmitted_ps: f64,
    pub network_bytes_received_ps: f64,
    pub start_network_transmit_idle_millis: f64,
    pub end_network_transmit_idle_millis: f64,
    pub start_network_bytes_transmitted: f64,
    pub end_network_bytes_transmitted: f64,
    pub start_network_bytes_received: f64,
    pub end_network_bytes_received: f64,

    pub shuffle_read: Option<ShuffleReadMetrics>,
    /// includes shuffle file open and close time (ms)
    pub shuffle_write_time: f64,
    pub shuffle_mb_written: f64,

    pub input_read_time: f64,
    pub input_read_method: String,
    pub input_mb: f64,
    /// false if a map task did not run on a node holding its input
    pub data_local: bool,

    pub output_write_time: f64,
    pub output_mb: f64,
    pub output_on_disk: bool,

    pub compute_monotask_millis: f64,
    pub disk_monotask_millis: f64,
}

impl Task {
    /// Extracts the full task description from a "SparkListenerTaskEnd" log
    /// object. Sections which only some Spark builds emit default to zero.
    pub fn parse(stage_id: StageId, data: &JsonValue) -> Result<Task, Error> {
        trace!("Task::parse({})", data);

        let taskinfo = required(data, "Task Info")?;
        let metrics = required(data, "Task Metrics")?;

        let task_id = required_u64(taskinfo, "Task ID")?;
        let start_time = required_u64(taskinfo, "Launch Time")?;
        let finish_time = required_u64(taskinfo, "Finish Time")?;
        let executor_id = required_str(taskinfo, "Executor ID")?.to_string();
        let host = required_str(taskinfo, "Host")?.to_string();

        let executor_run_time = required_u64(metrics, "Executor Run Time")?;
        let executor_deserialize_time = required_u64(metrics, "Executor Deserialize Time")?;
        let result_serialization_time = required_u64(metrics, "Result Serialization Time")?;

        let gc_time = required(metrics, "JVM GC Time")?.parse_f64()?;
        let end_gc_millis = optional_f64(metrics, "JVM GC Time Total")?;

        let spilled = optional_f64(metrics, "Disk Bytes Spilled")?;
        if spilled > 0.0 {
            warn!(
                "task {} spilled {} bytes to disk; these are not accounted for in the metrics",
                task_id, spilled
            );
        }

        let mut task = Task {
            task_id,
            stage_id,
            executor_id,
            host,
            start_time,
            finish_time,
            executor_run_time,
            executor_deserialize_time,
            result_serialization_time,
            gc_time,
            start_gc_millis: end_gc_millis - gc_time,
            end_gc_millis,
            process_user_cpu_utilization: 0.0,
            process_system_cpu_utilization: 0.0,
            total_cpu_utilization: 0.0,
            start_total_cpu_jiffies: 0.0,
            end_total_cpu_jiffies: 0.0,
            disk_utilization: BTreeMap::new(),
            network_bytes_transmitted_ps: 0.0,
            network_bytes_received_ps: 0.0,
            start_network_transmit_idle_millis: optional_f64(
                metrics,
                "Start Network Transmit Total Idle Millis",
            )?,
            end_network_transmit_idle_millis: optional_f64(
                metrics,
                "End Network Transmit Total Idle Millis",
            )?,
            start_network_bytes_transmitted: 0.0,
            end_network_bytes_transmitted: 0.0,
            start_network_bytes_received: 0.0,
            end_network_bytes_received: 0.0,
            shuffle_read: None,
            shuffle_write_time: 0.0,
            shuffle_mb_written: 0.0,
            input_read_time: 0.0,
            input_read_method: "unknown".to_string(),
            input_mb: 0.0,
            data_local: true,
            output_write_time: optional_f64(metrics, "Output Write Blocked Nanos")?
                / NANOS_PER_MILLI,
            output_mb: optional_f64(metrics, "Output Bytes")? / BYTES_PER_MB,
            output_on_disk: true,
            compute_monotask_millis: optional_f64(metrics, "Computation Nanos")? / NANOS_PER_MILLI,
            disk_monotask_millis: optional_f64(metrics, "Disk Nanos")? / NANOS_PER_MILLI,
        };

        task.parse_cpu(&metrics["Cpu Utilization"])?;
        task.parse_disks(&metrics["Disk Utilization"])?;
        task.parse_network(&metrics["Network Utilization"])?;
        task.parse_shuffle_write(&metrics["Shuffle Write Metrics"])?;
        task.parse_input(&metrics["Input Metrics"])?;
        task.parse_updated_blocks(&metrics["Updated Blocks"])?;

        let ref shuffle_read = metrics["Shuffle Read Metrics"];
        if shuffle_read.is_null() {
            task.data_local = taskinfo["Locality"] == "NODE_LOCAL";
        } else {
            task.shuffle_read = Some(ShuffleReadMetrics::parse(shuffle_read)?);
        }

        if task.scheduler_delay() < 0 {
            warn!(
                "task {} has negative scheduler delay ({} ms), record is likely truncated",
                task.task_id,
                task.scheduler_delay()
            );
        }

        Ok(task)
    }

    fn parse_cpu(&mut self, cpu: &JsonValue) -> Result<(), Error> {
        if cpu.is_null() {
            return Ok(());
        }
        self.process_user_cpu_utilization = required(cpu, "Process User Utilization")?.parse_f64()?;
        self.process_system_cpu_utilization =
            required(cpu, "Process System Utilization")?.parse_f64()?;
        self.total_cpu_utilization = optional_f64(cpu, "Total User Utilization")?
            + optional_f64(cpu, "Total System Utilization")?;

        let ref start = cpu["Start Counters"];
        if !start.is_null() {
            let end = required(cpu, "End Counters")?;
            self.start_total_cpu_jiffies = required(start, "Total User Jiffies")?.parse_f64()?
                + required(start, "Total System Jiffies")?.parse_f64()?;
            self.end_total_cpu_jiffies = required(end, "Total User Jiffies")?.parse_f64()?
                + required(end, "Total System Jiffies")?.parse_f64()?;
        }
        Ok(())
    }

    fn parse_disks(&mut self, disks: &JsonValue) -> Result<(), Error> {
        // a list of single-entry objects, one per block device
        for device in disks["Device Name To Utilization"].members() {
            for (name, utilization) in device.entries() {
                let utilization = DiskUtilization::parse(utilization)
                    .map_err(|err| err.in_field(name))?;
                self.disk_utilization.insert(name.to_string(), utilization);
            }
        }
        Ok(())
    }

    fn parse_network(&mut self, network: &JsonValue) -> Result<(), Error> {
        if network.is_null() {
            return Ok(());
        }
        self.network_bytes_transmitted_ps =
            required(network, "Bytes Transmitted Per Second")?.parse_f64()?;
        self.network_bytes_received_ps =
            required(network, "Bytes Received Per Second")?.parse_f64()?;

        let ref start = network["Start Counters"];
        let ref end = network["End Counters"];
        self.start_network_bytes_transmitted = optional_f64(start, "Bytes Transmitted")?;
        self.end_network_bytes_transmitted = optional_f64(end, "Bytes Transmitted")?;
        self.start_network_bytes_received = optional_f64(start, "Bytes Received")?;
        self.end_network_bytes_received = optional_f64(end, "Bytes Received")?;
        Ok(())
    }

    fn parse_shuffle_write(&mut self, write: &JsonValue) -> Result<(), Error> {
        if write.is_null() {
            return Ok(());
        }
        // all three are nanoseconds (!)
        self.shuffle_write_time = (required(write, "Shuffle Write Time")?.parse_f64()?
            + optional_f64(write, "Shuffle Open Time")?
            + optional_f64(write, "Shuffle Close Time")?)
            / NANOS_PER_MILLI;
        self.shuffle_mb_written = required(write, "Shuffle Bytes Written")?.parse_f64()? / BYTES_PER_MB;
        Ok(())
    }

    fn parse_input(&mut self, input: &JsonValue) -> Result<(), Error> {
        if input.is_null() {
            return Ok(());
        }
        self.input_read_time = optional_f64(input, "Read Time Nanos")? / NANOS_PER_MILLI;
        self.input_read_method = required_str(input, "Data Read Method")?.to_string();
        // Spark's own estimate is wrong for Hadoop input, prefer the Hadoop counter
        let hadoop_bytes = &input["Hadoop Bytes Read"];
        self.input_mb = if self.input_read_method == "Hadoop" && !hadoop_bytes.is_null() {
            hadoop_bytes.parse_f64()? / BYTES_PER_MB
        } else {
            required(input, "Bytes Read")?.parse_f64()? / BYTES_PER_MB
        };
        Ok(())
    }

    fn parse_updated_blocks(&mut self, blocks: &JsonValue) -> Result<(), Error> {
        for block in blocks.members() {
            let memory_size = optional_f64(&block["Status"], "Memory Size")?;
            if memory_size > 0.0 && self.output_on_disk {
                if self.output_mb > 0.0 {
                    warn!(
                        "task {} wrote output both to disk and to memory",
                        self.task_id
                    );
                }
                self.output_on_disk = false;
            }
            self.output_mb += memory_size / BYTES_PER_MB;
        }
        Ok(())
    }

    pub fn has_fetch(&self) -> bool {
        self.shuffle_read.is_some()
    }

    /// total duration of the task's existence
    pub fn runtime(&self) -> u64 {
        self.finish_time.saturating_sub(self.start_time)
    }

    /// Time spent in non-instrumented parts. Negative only for malformed
    /// records.
    pub fn scheduler_delay(&self) -> i64 {
        self.finish_time as i64
            - self.executor_run_time as i64
            - self.executor_deserialize_time as i64
            - self.result_serialization_time as i64
            - self.start_time as i64
    }

    pub fn process_cpu_utilization(&self) -> f64 {
        self.process_user_cpu_utilization + self.process_system_cpu_utilization
    }

    pub fn shuffle_mb_read(&self) -> f64 {
        self.shuffle_read
            .as_ref()
            .map(ShuffleReadMetrics::total_mb_read)
            .unwrap_or(0.0)
    }

    pub fn remote_mb_read(&self) -> f64 {
        self.shuffle_read
            .as_ref()
            .map(|read| read.remote_mb_read)
            .unwrap_or(0.0)
    }

    /// Combined throughput of all disks at full utilization, in bytes per
    /// second, from the rates sampled during the task.
    pub fn disk_throughput_bps(&self) -> f64 {
        self.disk_utilization
            .values()
            .map(DiskUtilization::effective_throughput_bps)
            .sum()
    }

    /// Shuffle data for reduce tasks, input data for everyone else.
    pub fn input_size_mb(&self) -> f64 {
        if self.has_fetch() {
            self.shuffle_mb_read()
        } else {
            self.input_mb
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.shuffle_read {
            Some(ref read) => write!(
                f,
                "Start time: {}, local read time: {}, fetch wait: {}, gc time: {}, \
                 shuffle write time: {}, result ser: {}, finish: {}, shuffle MB: {}, input MB: {}",
                self.start_time,
                read.local_read_time,
                read.fetch_wait,
                self.gc_time,
                self.shuffle_write_time,
                self.result_serialization_time,
                self.runtime(),
                read.total_mb_read(),
                self.input_mb
            )?,
            None => write!(
                f,
                "Start time: {}, finish: {}, scheduler delay: {}, input read time: {}, \
                 gc time: {}, shuffle write time: {}",
                self.start_time,
                self.finish_time,
                self.scheduler_delay(),
                self.input_read_time,
                self.gc_time,
                self.shuffle_write_time
            )?,
        }
        write!(
            f,
            ", process CPU: {:.2}, disk throughput: {:.0} B/s",
            self.process_cpu_utilization(),
            self.disk_throughput_bps()
        )
    }
}
