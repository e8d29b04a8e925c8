// Copyright 2017 ETH Zurich. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Builders for synthetic event log records used throughout the unit tests.

use json::JsonValue;

use crate::record::{JOB_START, TASK_END};
use crate::task::Task;
use crate::{JobId, StageId, TaskId, Timestamp};

/// Disk counters as `(sectors read, millis reading, sectors written, millis writing)`.
pub type Counters = (f64, f64, f64, f64);

pub struct TaskBuilder {
    data: JsonValue,
}

/// A task end record with only the fields every Spark build emits. The run
/// time defaults to the whole task duration.
pub fn task(id: TaskId, executor: &str, launch: Timestamp, finish: Timestamp) -> TaskBuilder {
    let mut data = JsonValue::new_object();
    data["Event"] = TASK_END.into();
    data["Stage ID"] = 0.into();

    let info = &mut data["Task Info"];
    info["Task ID"] = id.into();
    info["Launch Time"] = launch.into();
    info["Finish Time"] = finish.into();
    info["Executor ID"] = executor.into();
    info["Host"] = format!("host-{}", executor).into();
    info["Locality"] = "PROCESS_LOCAL".into();

    let metrics = &mut data["Task Metrics"];
    metrics["Executor Run Time"] = finish.saturating_sub(launch).into();
    metrics["Executor Deserialize Time"] = 0.into();
    metrics["Result Serialization Time"] = 0.into();
    metrics["JVM GC Time"] = 0.into();

    TaskBuilder { data }
}

pub fn job_start(job: JobId, stages: &[StageId]) -> String {
    let mut data = JsonValue::new_object();
    data["Event"] = JOB_START.into();
    data["Job ID"] = job.into();
    data["Stage IDs"] = JsonValue::Array(stages.iter().map(|&s| s.into()).collect());
    data.dump()
}

fn disk_counters(counters: Counters) -> JsonValue {
    let mut data = JsonValue::new_object();
    data["Sectors Read"] = counters.0.into();
    data["Millis Reading"] = counters.1.into();
    data["Sectors Written"] = counters.2.into();
    data["Millis Writing"] = counters.3.into();
    data
}

impl TaskBuilder {
    fn metrics(&mut self) -> &mut JsonValue {
        &mut self.data["Task Metrics"]
    }

    fn network(&mut self) -> &mut JsonValue {
        let network = &mut self.data["Task Metrics"]["Network Utilization"];
        if network.is_null() {
            network["Bytes Transmitted Per Second"] = 0.into();
            network["Bytes Received Per Second"] = 0.into();
        }
        network
    }

    pub fn stage(mut self, stage: StageId) -> Self {
        self.data["Stage ID"] = stage.into();
        self
    }

    pub fn run_times(mut self, run: u64, deserialize: u64, serialize: u64) -> Self {
        let metrics = self.metrics();
        metrics["Executor Run Time"] = run.into();
        metrics["Executor Deserialize Time"] = deserialize.into();
        metrics["Result Serialization Time"] = serialize.into();
        self
    }

    pub fn host(mut self, host: &str) -> Self {
        self.data["Task Info"]["Host"] = host.into();
        self
    }

    /// GC time of this task and the executor's cumulative GC time at its end.
    pub fn gc(mut self, elapsed: f64, total: f64) -> Self {
        let metrics = self.metrics();
        metrics["JVM GC Time"] = elapsed.into();
        metrics["JVM GC Time Total"] = total.into();
        self
    }

    pub fn cpu_jiffies(mut self, start: f64, end: f64) -> Self {
        let cpu = &mut self.metrics()["Cpu Utilization"];
        cpu["Process User Utilization"] = 0.into();
        cpu["Process System Utilization"] = 0.into();
        cpu["Start Counters"]["Total User Jiffies"] = start.into();
        cpu["Start Counters"]["Total System Jiffies"] = 0.into();
        cpu["End Counters"]["Total User Jiffies"] = end.into();
        cpu["End Counters"]["Total System Jiffies"] = 0.into();
        self
    }

    pub fn transmitted(mut self, start: f64, end: f64) -> Self {
        let network = self.network();
        network["Start Counters"]["Bytes Transmitted"] = start.into();
        network["End Counters"]["Bytes Transmitted"] = end.into();
        self
    }

    pub fn received(mut self, start: f64, end: f64) -> Self {
        let network = self.network();
        network["Start Counters"]["Bytes Received"] = start.into();
        network["End Counters"]["Bytes Received"] = end.into();
        self
    }

    pub fn transmit_idle(mut self, start: f64, end: f64) -> Self {
        let metrics = self.metrics();
        metrics["Start Network Transmit Total Idle Millis"] = start.into();
        metrics["End Network Transmit Total Idle Millis"] = end.into();
        self
    }

    pub fn disk(mut self, name: &str, start: Counters, end: Counters) -> Self {
        let mut utilization = JsonValue::new_object();
        utilization["Disk Utilization"] = 0.into();
        utilization["Read Throughput"] = 0.into();
        utilization["Write Throughput"] = 0.into();
        utilization["Start Counters"] = disk_counters(start);
        utilization["End Counters"] = disk_counters(end);

        let mut device = JsonValue::new_object();
        device[name] = utilization;

        let devices = &mut self.metrics()["Disk Utilization"]["Device Name To Utilization"];
        if devices.is_null() {
            *devices = JsonValue::new_array();
        }
        devices.push(device).unwrap();
        self
    }

    pub fn shuffle_read(mut self, remote_bytes: f64, local_bytes: f64) -> Self {
        let read = &mut self.metrics()["Shuffle Read Metrics"];
        read["Fetch Wait Time"] = 0.into();
        read["Local Blocks Fetched"] = 0.into();
        read["Remote Blocks Fetched"] = 0.into();
        read["Remote Bytes Read"] = remote_bytes.into();
        read["Local Bytes Read"] = local_bytes.into();
        self
    }

    pub fn shuffle_write(mut self, bytes: f64) -> Self {
        let write = &mut self.metrics()["Shuffle Write Metrics"];
        write["Shuffle Write Time"] = 0.into();
        write["Shuffle Bytes Written"] = bytes.into();
        self
    }

    pub fn input(mut self, method: &str, bytes: f64) -> Self {
        let input = &mut self.metrics()["Input Metrics"];
        input["Data Read Method"] = method.into();
        input["Bytes Read"] = bytes.into();
        self
    }

    pub fn compute_nanos(mut self, nanos: f64) -> Self {
        self.metrics()["Computation Nanos"] = nanos.into();
        self
    }

    pub fn disk_nanos(mut self, nanos: f64) -> Self {
        self.metrics()["Disk Nanos"] = nanos.into();
        self
    }

    pub fn spilled(mut self, bytes: f64) -> Self {
        self.metrics()["Disk Bytes Spilled"] = bytes.into();
        self
    }

    pub fn json(self) -> JsonValue {
        self.data
    }

    /// The record as it appears in an event log file.
    pub fn line(self) -> String {
        self.data.dump()
    }

    pub fn build(self) -> Task {
        let stage = self.data["Stage ID"].as_u32().unwrap();
        Task::parse(stage, &self.data).unwrap()
    }
}
