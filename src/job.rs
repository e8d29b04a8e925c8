// Copyright 2017 ETH Zurich. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::BTreeMap;

use json::JsonValue;

use crate::error::Error;
use crate::ideal::IdealTimeConfig;
use crate::metrics::ExecutorResourceMetrics;
use crate::record::required_u32;
use crate::stage::Stage;
use crate::task::Task;
use crate::{ExecutorId, JobId, StageId, Timestamp};

/// The stages submitted as part of one Spark job.
///
/// Built up record by record through `add_event`, then finalized once with
/// `initialize_job` before any statistic is read.
#[derive(Clone, Debug)]
pub struct Job {
    id: JobId,
    stages: BTreeMap<StageId, Stage>,
}

impl Job {
    pub fn new(id: JobId) -> Self {
        Job {
            id,
            stages: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    /// Routes a "SparkListenerTaskEnd" record to its stage, creating the
    /// stage on first reference.
    pub fn add_event(&mut self, data: &JsonValue) -> Result<(), Error> {
        let stage_id = required_u32(data, "Stage ID")?;
        self.stages
            .entry(stage_id)
            .or_insert_with(|| Stage::new(stage_id))
            .add_event(data)
    }

    /// Drops stages without tasks. Must run after the last record for this
    /// job was added; calling it again is a no-op.
    pub fn initialize_job(&mut self) {
        let id = self.id;
        self.stages.retain(|stage_id, stage| {
            if stage.is_empty() {
                info!("job {}: dropping stage {} without tasks", id, stage_id);
                false
            } else {
                true
            }
        });
    }

    pub fn stages(&self) -> &BTreeMap<StageId, Stage> {
        &self.stages
    }

    pub fn all_tasks(&self) -> impl Iterator<Item = &Task> {
        self.stages.values().flat_map(|stage| stage.tasks())
    }

    /// Earliest stage start, `Timestamp::max_value()` without stages.
    pub fn start_time(&self) -> Timestamp {
        self.stages
            .values()
            .map(Stage::start_time)
            .min()
            .unwrap_or(Timestamp::max_value())
    }

    pub fn finish_time(&self) -> Timestamp {
        self.stages
            .values()
            .map(Stage::finish_time)
            .max()
            .unwrap_or(0)
    }

    pub fn runtime(&self) -> u64 {
        self.finish_time().saturating_sub(self.start_time())
    }

    /// Per-executor usage summed over the windows of all stages.
    pub fn get_executor_id_to_resource_metrics(
        &self,
        num_cores: usize,
    ) -> BTreeMap<ExecutorId, ExecutorResourceMetrics> {
        let mut executor_id_to_metrics: BTreeMap<ExecutorId, ExecutorResourceMetrics> =
            BTreeMap::new();
        for stage in self.stages.values() {
            for (executor_id, metrics) in stage.get_executor_id_to_resource_metrics(num_cores) {
                match executor_id_to_metrics.get_mut(&executor_id) {
                    Some(existing) => existing.add_metrics(&metrics),
                    None => {
                        executor_id_to_metrics.insert(executor_id, metrics);
                    }
                }
            }
        }
        executor_id_to_metrics
    }

    /// Sum of the stages' ideal times; stages are assumed to run one after
    /// another.
    pub fn ideal_time_s(&self, config: &IdealTimeConfig) -> Result<f64, Error> {
        let mut total = 0.0;
        for stage in self.stages.values() {
            total += stage.ideal_time_s(config)?;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::task;
    use crate::ideal::{MismatchPolicy, Placement};

    fn job_of(records: Vec<JsonValue>) -> Job {
        let mut job = Job::new(1);
        for data in records {
            job.add_event(&data).unwrap();
        }
        job
    }

    #[test]
    fn routes_tasks_to_their_stage() {
        let job = job_of(vec![
            task(1, "e1", 0, 10).stage(3).json(),
            task(2, "e1", 0, 10).stage(4).json(),
            task(3, "e2", 5, 10).stage(3).json(),
        ]);
        assert_eq!(job.stages().len(), 2);
        assert_eq!(job.stages()[&3].tasks().len(), 2);
        assert_eq!(job.stages()[&4].tasks().len(), 1);
        assert_eq!(job.all_tasks().count(), 3);
    }

    #[test]
    fn record_without_stage_id_fails() {
        let mut data = task(1, "e1", 0, 10).json();
        data.remove("Stage ID");
        assert!(Job::new(0).add_event(&data).is_err());
    }

    #[test]
    fn initialize_drops_empty_stages_once() {
        let mut job = job_of(vec![
            task(1, "e1", 0, 10).stage(1).json(),
            task(2, "e1", 10, 20).stage(3).json(),
        ]);
        // a record that fails to parse still creates its stage
        let mut broken = task(3, "e1", 0, 10).stage(2).json();
        broken["Task Info"].remove("Launch Time");
        assert!(job.add_event(&broken).is_err());
        assert_eq!(job.stages().len(), 3);

        job.initialize_job();
        let once: Vec<StageId> = job.stages().keys().cloned().collect();
        assert_eq!(once, vec![1, 3]);
        assert!(job.stages().values().all(|stage| !stage.is_empty()));

        job.initialize_job();
        let twice: Vec<StageId> = job.stages().keys().cloned().collect();
        assert_eq!(once, twice);
    }

    #[test]
    fn runtime_covers_all_stages() {
        let mut job = job_of(vec![
            task(1, "e1", 100, 300).stage(1).json(),
            task(2, "e1", 350, 900).stage(2).json(),
            task(3, "e2", 400, 700).stage(2).json(),
        ]);
        job.initialize_job();
        assert_eq!(job.start_time(), 100);
        assert_eq!(job.finish_time(), 900);
        assert_eq!(job.runtime(), 800);
    }

    #[test]
    fn empty_job_has_zero_runtime() {
        let mut job = Job::new(0);
        job.initialize_job();
        assert_eq!(job.runtime(), 0);
        assert_eq!(job.ideal_time_s(&IdealTimeConfig::default()).unwrap(), 0.0);
    }

    #[test]
    fn executor_metrics_accumulate_across_stages() {
        let mut job = job_of(vec![
            task(1, "e1", 0, 100)
                .stage(1)
                .cpu_jiffies(0.0, 10.0)
                .transmitted(0.0, 1000.0)
                .json(),
            task(2, "e2", 0, 100).stage(1).cpu_jiffies(0.0, 5.0).json(),
            task(3, "e1", 100, 300)
                .stage(2)
                .cpu_jiffies(10.0, 30.0)
                .transmitted(1000.0, 1500.0)
                .received(0.0, 700.0)
                .json(),
        ]);
        job.initialize_job();

        let metrics = job.get_executor_id_to_resource_metrics(4);
        assert_eq!(metrics.len(), 2);
        let e1 = &metrics["e1"];
        assert_eq!(e1.elapsed_millis, 300.0);
        assert_eq!(e1.num_tasks, 2);
        assert_eq!(e1.cpu.cpu_millis, 300.0);
        assert_eq!(e1.network.bytes_transmitted, 1500.0);
        assert_eq!(e1.network.bytes_received, 700.0);
        assert_eq!(metrics["e2"].cpu.cpu_millis, 50.0);
    }

    #[test]
    fn ideal_time_sums_stages() {
        let mut job = job_of(vec![
            task(1, "e1", 0, 1000).stage(1).cpu_jiffies(0.0, 200.0).json(),
            task(2, "e1", 1000, 2000).stage(2).cpu_jiffies(200.0, 600.0).json(),
        ]);
        job.initialize_job();
        let config = IdealTimeConfig {
            num_cores_per_executor: 2,
            ..IdealTimeConfig::default()
        };
        // 2 s and 4 s of CPU on two cores
        assert!((job.ideal_time_s(&config).unwrap() - 3.0).abs() < 1e-9);

        let fixed = IdealTimeConfig {
            placement: Placement::FixedExecutors,
            ..config
        };
        assert!((job.ideal_time_s(&fixed).unwrap() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn strict_mismatch_fails_the_job() {
        let mut job = job_of(vec![task(1, "e1", 0, 1000)
            .cpu_jiffies(0.0, 100.0)
            .compute_nanos(100.0e6)
            .json()]);
        job.initialize_job();
        let strict = IdealTimeConfig {
            mismatch: MismatchPolicy::Fail,
            ..IdealTimeConfig::default()
        };
        assert!(job.ideal_time_s(&strict).is_err());
        assert!(job.ideal_time_s(&IdealTimeConfig::default()).is_ok());
    }
}
