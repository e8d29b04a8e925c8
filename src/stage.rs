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

use crate::concurrency::get_max_concurrency;
use crate::error::{Error, Resource};
use crate::ideal::{IdealTimeConfig, IdealTimes, Placement};
use crate::metrics::{ratio_or_zero, ExecutorResourceMetrics};
use crate::task::{Task, BYTES_PER_MB};
use crate::{ExecutorId, StageId, Timestamp};

/// Resource usage of one executor during a stage, as seen by both the
/// engine and the OS.
#[derive(Debug)]
struct ExecutorUsage {
    os_cpu_millis: f64,
    compute_monotask_millis: f64,
    bytes_transmitted: f64,
    disk_bytes: f64,
    disk_throughput: f64,
    disk_monotask_millis: f64,
    num_disks: usize,
}

/// All tasks of one stage of a job.
///
/// Tasks are added one record at a time through `add_event`; everything else
/// is derived from the task list on demand.
#[derive(Clone, Debug)]
pub struct Stage {
    id: StageId,
    /// earliest launch time seen so far, `Timestamp::max_value()` while empty
    start_time: Timestamp,
    tasks: Vec<Task>,
}

impl Stage {
    pub fn new(id: StageId) -> Self {
        Stage {
            id,
            start_time: Timestamp::max_value(),
            tasks: Vec::new(),
        }
    }

    /// Parses a "SparkListenerTaskEnd" record and adds the task.
    pub fn add_event(&mut self, data: &JsonValue) -> Result<(), Error> {
        let task = Task::parse(self.id, data)?;
        self.add_task(task);
        Ok(())
    }

    pub fn add_task(&mut self, task: Task) {
        self.start_time = self.start_time.min(task.start_time);
        self.tasks.push(task);
    }

    pub fn id(&self) -> StageId {
        self.id
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn start_time(&self) -> Timestamp {
        self.start_time
    }

    /// Latest task finish time; 0 for an empty stage.
    pub fn finish_time(&self) -> Timestamp {
        self.tasks
            .iter()
            .map(|task| task.finish_time)
            .max()
            .unwrap_or(0)
    }

    /// Wall-clock time from the first launch to the last finish; 0 for an
    /// empty stage.
    pub fn runtime(&self) -> u64 {
        self.finish_time().saturating_sub(self.start_time)
    }

    /// Sum of all task runtimes.
    pub fn total_runtime(&self) -> u64 {
        self.tasks.iter().map(Task::runtime).sum()
    }

    pub fn average_task_runtime(&self) -> f64 {
        ratio_or_zero(
            self.total_runtime() as f64,
            self.tasks.len() as f64,
            "average task runtime",
        )
    }

    pub fn max_task_runtime(&self) -> u64 {
        self.tasks.iter().map(Task::runtime).max().unwrap_or(0)
    }

    pub fn max_concurrency(&self) -> usize {
        get_max_concurrency(&self.tasks)
    }

    /// "shuffle" for reduce stages, otherwise how the input was read.
    pub fn input_read_method(&self) -> &str {
        match self.tasks.first() {
            Some(task) if task.has_fetch() => "shuffle",
            Some(task) => task.input_read_method.as_str(),
            None => "unknown",
        }
    }

    pub fn get_executor_id_to_tasks(&self) -> BTreeMap<&str, Vec<&Task>> {
        let mut executor_id_to_tasks: BTreeMap<&str, Vec<&Task>> = BTreeMap::new();
        for task in &self.tasks {
            executor_id_to_tasks
                .entry(&task.executor_id)
                .or_insert_with(Vec::new)
                .push(task);
        }
        executor_id_to_tasks
    }

    pub fn get_executor_id_to_resource_metrics(
        &self,
        num_cores: usize,
    ) -> BTreeMap<ExecutorId, ExecutorResourceMetrics> {
        self.get_executor_id_to_tasks()
            .into_iter()
            .filter_map(|(executor_id, tasks)| {
                ExecutorResourceMetrics::for_executor_tasks(&tasks, num_cores)
                    .map(|metrics| (executor_id.to_string(), metrics))
            })
            .collect()
    }

    /// Stage runtime over the runtime it would have had if the busy time of
    /// all executors had been spread evenly across them. 1.0 is perfectly
    /// balanced.
    pub fn load_balancing_badness(&self) -> f64 {
        let executor_id_to_tasks = self.get_executor_id_to_tasks();

        let total_time: u64 = executor_id_to_tasks
            .values()
            .map(|tasks| {
                let min_start_time = tasks.iter().map(|t| t.start_time).min().unwrap_or(0);
                let max_finish_time = tasks.iter().map(|t| t.finish_time).max().unwrap_or(0);
                max_finish_time.saturating_sub(min_start_time)
            })
            .sum();

        let ideal_time = ratio_or_zero(
            total_time as f64,
            executor_id_to_tasks.len() as f64,
            "balanced executor time",
        );
        ratio_or_zero(self.runtime() as f64, ideal_time, "load balancing badness")
    }

    pub fn has_shuffle_read(&self) -> bool {
        let total_shuffle_read_mb: f64 = self.tasks.iter().map(Task::shuffle_mb_read).sum();
        total_shuffle_read_mb > 0.0
    }

    /// Shuffle data read plus input read by all tasks.
    pub fn input_mb(&self) -> f64 {
        self.tasks
            .iter()
            .map(|task| task.shuffle_mb_read() + task.input_mb)
            .sum()
    }

    /// Shuffle data written. Output stored to disk or memory is not counted.
    pub fn output_mb(&self) -> f64 {
        self.tasks.iter().map(|task| task.shuffle_mb_written).sum()
    }

    /// Shuffle data fetched from other machines.
    pub fn get_network_mb(&self) -> f64 {
        self.tasks.iter().map(Task::remote_mb_read).sum()
    }

    fn executor_usage(&self, num_cores: usize) -> Vec<ExecutorUsage> {
        self.get_executor_id_to_tasks()
            .values()
            .filter_map(|tasks| {
                let metrics = ExecutorResourceMetrics::for_executor_tasks(tasks, num_cores)?;
                Some(ExecutorUsage {
                    os_cpu_millis: metrics.cpu.cpu_millis,
                    compute_monotask_millis: tasks.iter().map(|t| t.compute_monotask_millis).sum(),
                    bytes_transmitted: metrics.network.bytes_transmitted,
                    disk_bytes: metrics.disk_bytes(),
                    disk_throughput: metrics.disk_throughput(),
                    disk_monotask_millis: tasks.iter().map(|t| t.disk_monotask_millis).sum(),
                    num_disks: metrics.disks.len(),
                })
            })
            .collect()
    }

    /// Compute monotask time if the engine reported any, otherwise the CPU
    /// time from the jiffy counters.
    fn cpu_millis(
        &self,
        config: &IdealTimeConfig,
        compute_monotask_millis: f64,
        os_cpu_millis: f64,
    ) -> Result<f64, Error> {
        if compute_monotask_millis > 0.0 {
            config.check_consistency(
                self.id,
                Resource::Cpu,
                compute_monotask_millis,
                os_cpu_millis,
            )?;
            Ok(compute_monotask_millis)
        } else {
            Ok(os_cpu_millis)
        }
    }

    /// Cross-checks the bytes the OS saw leaving the executors against the
    /// shuffle bytes the stage fetched remotely.
    fn check_network(&self, config: &IdealTimeConfig, bytes_transmitted: f64) -> Result<(), Error> {
        let shuffle_bytes = self.get_network_mb() * BYTES_PER_MB;
        if shuffle_bytes > 0.0 {
            config.check_consistency(self.id, Resource::Network, shuffle_bytes, bytes_transmitted)?;
        }
        Ok(())
    }

    fn uses_disk_monotasks(&self, config: &IdealTimeConfig, usage: &[ExecutorUsage]) -> bool {
        config.use_disk_monotask_times && usage.iter().any(|u| u.disk_monotask_millis > 0.0)
    }

    /// Ideal times assuming tasks could have been spread freely across all
    /// executors that took part in the stage.
    pub fn get_ideal_times_from_metrics(
        &self,
        config: &IdealTimeConfig,
    ) -> Result<IdealTimes, Error> {
        let usage = self.executor_usage(config.num_cores_per_executor);
        let num_executors = usage.len() as f64;

        let os_cpu_millis: f64 = usage.iter().map(|u| u.os_cpu_millis).sum();
        let compute_monotask_millis: f64 = usage.iter().map(|u| u.compute_monotask_millis).sum();
        let cpu_millis = self.cpu_millis(config, compute_monotask_millis, os_cpu_millis)?;
        let ideal_cpu_millis = ratio_or_zero(
            cpu_millis,
            num_executors * config.num_cores_per_executor as f64,
            "ideal CPU time",
        );

        let bytes_transmitted: f64 = usage.iter().map(|u| u.bytes_transmitted).sum();
        self.check_network(config, bytes_transmitted)?;
        let ideal_network_millis = ratio_or_zero(
            bytes_transmitted,
            num_executors * config.network_bytes_per_milli(),
            "ideal network time",
        );

        let ideal_disk_millis = if self.uses_disk_monotasks(config, &usage) {
            let disk_monotask_millis: f64 = usage.iter().map(|u| u.disk_monotask_millis).sum();
            let disks_per_executor = usage.iter().map(|u| u.num_disks).max().unwrap_or(0).max(1);
            ratio_or_zero(
                disk_monotask_millis,
                num_executors * disks_per_executor as f64,
                "ideal disk time",
            )
        } else {
            let disk_bytes: f64 = usage.iter().map(|u| u.disk_bytes).sum();
            let disk_throughput: f64 = usage.iter().map(|u| u.disk_throughput).sum();
            ratio_or_zero(disk_bytes, disk_throughput, "ideal disk time")
        };

        let times = IdealTimes {
            cpu_s: ideal_cpu_millis / 1000.0,
            network_s: ideal_network_millis / 1000.0,
            disk_s: ideal_disk_millis / 1000.0,
        };
        debug!(
            "stage {}: ideal times with fluid placement: {} (actual {} ms)",
            self.id,
            times,
            self.runtime()
        );
        Ok(times)
    }

    /// Ideal times assuming every task has to stay on the executor it ran
    /// on, so the most loaded executor bounds each resource.
    pub fn get_ideal_times_from_metrics_fix_executors(
        &self,
        config: &IdealTimeConfig,
    ) -> Result<IdealTimes, Error> {
        let usage = self.executor_usage(config.num_cores_per_executor);
        let cores = config.num_cores_per_executor as f64;
        let disk_monotasks = self.uses_disk_monotasks(config, &usage);

        let bytes_transmitted: f64 = usage.iter().map(|u| u.bytes_transmitted).sum();
        self.check_network(config, bytes_transmitted)?;

        let (mut cpu_millis, mut network_millis, mut disk_millis) = (0.0f64, 0.0f64, 0.0f64);
        for executor in &usage {
            let executor_cpu_millis = self.cpu_millis(
                config,
                executor.compute_monotask_millis,
                executor.os_cpu_millis,
            )?;
            cpu_millis = cpu_millis.max(ratio_or_zero(
                executor_cpu_millis,
                cores,
                "ideal executor CPU time",
            ));
            network_millis = network_millis.max(ratio_or_zero(
                executor.bytes_transmitted,
                config.network_bytes_per_milli(),
                "ideal executor network time",
            ));
            let executor_disk_millis = if disk_monotasks {
                executor.disk_monotask_millis / executor.num_disks.max(1) as f64
            } else {
                ratio_or_zero(
                    executor.disk_bytes,
                    executor.disk_throughput,
                    "ideal executor disk time",
                )
            };
            disk_millis = disk_millis.max(executor_disk_millis);
        }

        let times = IdealTimes {
            cpu_s: cpu_millis / 1000.0,
            network_s: network_millis / 1000.0,
            disk_s: disk_millis / 1000.0,
        };
        debug!(
            "stage {}: ideal times with fixed executors: {} (actual {} ms)",
            self.id,
            times,
            self.runtime()
        );
        Ok(times)
    }

    /// Ideal stage completion time in seconds under the configured placement.
    pub fn ideal_time_s(&self, config: &IdealTimeConfig) -> Result<f64, Error> {
        let times = match config.placement {
            Placement::Fluid => self.get_ideal_times_from_metrics(config)?,
            Placement::FixedExecutors => self.get_ideal_times_from_metrics_fix_executors(config)?,
        };
        Ok(times.max_s())
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} tasks (avg runtime: {:.1}, max runtime: {}) Start: {}, runtime: {}, \
             Max concurrency: {}, Input MB: {:.2} (from {}), Output MB: {:.2}",
            self.tasks.len(),
            self.average_task_runtime(),
            self.max_task_runtime(),
            self.start_time,
            self.runtime(),
            self.max_concurrency(),
            self.input_mb(),
            self.input_read_method(),
            self.output_mb()
        )
    }
}
