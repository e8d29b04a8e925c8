// Copyright 2017 ETH Zurich. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Demultiplexes a Spark event log into `Job`s.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::mem;
use std::path::Path;

use json::JsonValue;

use crate::error::Error;
use crate::ideal::IdealTimeConfig;
use crate::job::Job;
use crate::record::EventRecord;
use crate::{JobId, StageId};

pub type Jobs = BTreeMap<JobId, Job>;

/// Keeps every job.
pub fn keep_all(jobs: Jobs) -> Jobs {
    jobs
}

/// Keeps the last nine single-stage jobs with more than five tasks, i.e. the
/// measured runs of the shuffle benchmark.
pub fn shuffle_jobs(jobs: Jobs) -> Jobs {
    let mut candidates: Vec<(JobId, Job)> = jobs
        .into_iter()
        .filter(|&(_, ref job)| {
            let stages = job.stages().values().filter(|s| !s.is_empty()).count();
            stages == 1 && job.all_tasks().count() > 5
        })
        .collect();
    let skip = candidates.len().saturating_sub(9);
    candidates.drain(..skip);
    candidates.into_iter().collect()
}

/// Drops the first `count` jobs by id.
pub fn drop_warmup_jobs(count: usize) -> impl FnOnce(Jobs) -> Jobs {
    move |jobs| jobs.into_iter().skip(count).collect()
}

#[derive(Debug, Default)]
pub struct Analyzer {
    jobs: Jobs,
    /// jobs depending on each stage, from the job start records
    jobs_for_stage: HashMap<StageId, Vec<JobId>>,
}

impl Analyzer {
    pub fn new() -> Self {
        Analyzer::default()
    }

    /// Reads a whole log, keeps the jobs selected by `filter` and finalizes
    /// them.
    pub fn from_reader<R, F>(reader: R, filter: F) -> Result<Self, Error>
    where
        R: BufRead,
        F: FnOnce(Jobs) -> Jobs,
    {
        let mut analyzer = Analyzer::new();
        analyzer.read_json(reader)?;

        let jobs = mem::replace(&mut analyzer.jobs, BTreeMap::new());
        analyzer.jobs = filter(jobs);
        for (job_id, job) in analyzer.jobs.iter_mut() {
            job.initialize_job();
            info!(
                "job {} has stages {:?} and runtime {:.3} s",
                job_id,
                job.stages().keys().collect::<Vec<_>>(),
                job.runtime() as f64 / 1000.0
            );
        }
        Ok(analyzer)
    }

    pub fn from_file<P, F>(path: P, filter: F) -> Result<Self, Error>
    where
        P: AsRef<Path>,
        F: FnOnce(Jobs) -> Jobs,
    {
        info!("parsing {}", path.as_ref().display());
        let file = File::open(path)?;
        Analyzer::from_reader(BufReader::new(file), filter)
    }

    /// Ingests new-line delimited JSON records. Lines which cannot be decoded
    /// are skipped; a task for a stage no job claimed aborts the run.
    pub fn read_json<R: BufRead>(&mut self, reader: R) -> Result<(), Error> {
        for (index, line) in reader.split(b'\n').enumerate() {
            let mut line = line?;
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = match String::from_utf8(line) {
                Ok(line) => line,
                Err(err) => {
                    warn!("line {}: skipping undecodable data ({})", index + 1, err);
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            let data = match json::parse(&line) {
                Ok(data) => data,
                Err(err) => {
                    warn!("line {}: skipping bad data ({}): {}", index + 1, err, line);
                    continue;
                }
            };

            match EventRecord::parse(&data) {
                Ok(EventRecord::JobStart { job_id, stage_ids }) => {
                    self.start_job(job_id, &stage_ids)
                }
                Ok(EventRecord::TaskEnd { stage_id, data }) => self.end_task(stage_id, data)?,
                Ok(EventRecord::Other(event)) => trace!("ignoring {}", event),
                Err(err) => warn!("line {}: skipping record: {}", index + 1, err),
            }
        }
        Ok(())
    }

    fn start_job(&mut self, job_id: JobId, stage_ids: &[StageId]) {
        debug!("job {} starts with stages {:?}", job_id, stage_ids);
        for &stage_id in stage_ids {
            self.jobs_for_stage
                .entry(stage_id)
                .or_insert_with(Vec::new)
                .push(job_id);
        }
    }

    /// Adds the task to every job which depends on its stage.
    fn end_task(&mut self, stage_id: StageId, data: &JsonValue) -> Result<(), Error> {
        let job_ids = self
            .jobs_for_stage
            .get(&stage_id)
            .ok_or(Error::UnknownStage(stage_id))?;

        for &job_id in job_ids {
            let job = self.jobs.entry(job_id).or_insert_with(|| Job::new(job_id));
            if let Err(err) = job.add_event(data) {
                error!("job {}, stage {}: dropping task: {}", job_id, stage_id, err);
            }
        }
        Ok(())
    }

    pub fn jobs(&self) -> &Jobs {
        &self.jobs
    }

    /// Load balancing badness of every stage of every job.
    pub fn load_balancing_badness(&self) -> Vec<f64> {
        self.jobs
            .values()
            .flat_map(|job| job.stages().values())
            .map(|stage| stage.load_balancing_badness())
            .collect()
    }

    /// Runtime of every job in milliseconds.
    pub fn runtimes(&self) -> Vec<(JobId, u64)> {
        self.jobs
            .iter()
            .map(|(&job_id, job)| (job_id, job.runtime()))
            .collect()
    }

    /// Writes one block per job: its runtime and ideal time, then every stage
    /// with its ideal resource times and load balancing badness.
    pub fn write_summary<W: Write>(
        &self,
        mut writer: W,
        config: &IdealTimeConfig,
    ) -> Result<(), Error> {
        for (job_id, job) in &self.jobs {
            writeln!(
                writer,
                "Job {}: runtime {:.3} s, ideal {:.3} s",
                job_id,
                job.runtime() as f64 / 1000.0,
                job.ideal_time_s(config)?
            )?;
            for (stage_id, stage) in job.stages() {
                writeln!(writer, "  Stage {}: {}", stage_id, stage)?;
                let ideal = stage.get_ideal_times_from_metrics(config)?;
                let fixed = stage.get_ideal_times_from_metrics_fix_executors(config)?;
                writeln!(
                    writer,
                    "    ideal {} / fixed executors {}, load balancing badness {:.3}",
                    ideal,
                    fixed,
                    stage.load_balancing_badness()
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{job_start, task};
    use crate::ideal::MismatchPolicy;

    fn log(lines: &[String]) -> String {
        lines.join("\n")
    }

    fn analyze(lines: &[String]) -> Result<Analyzer, Error> {
        Analyzer::from_reader(log(lines).as_bytes(), keep_all)
    }

    #[test]
    fn demultiplexes_jobs_and_stages() {
        let analyzer = analyze(&[
            job_start(0, &[0, 1]),
            task(1, "e1", 0, 10).stage(0).line(),
            task(2, "e2", 0, 20).stage(0).line(),
            task(3, "e1", 20, 50).stage(1).line(),
            job_start(1, &[2]),
            task(4, "e1", 60, 80).stage(2).line(),
        ])
        .unwrap();

        let jobs = analyzer.jobs();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[&0].stages().len(), 2);
        assert_eq!(jobs[&0].all_tasks().count(), 3);
        assert_eq!(jobs[&1].all_tasks().count(), 1);
        assert_eq!(analyzer.runtimes(), vec![(0, 50), (1, 20)]);
        assert_eq!(analyzer.load_balancing_badness().len(), 3);
    }

    #[test]
    fn shared_stage_feeds_every_job() {
        let analyzer = analyze(&[
            job_start(0, &[0]),
            job_start(1, &[0, 1]),
            task(1, "e1", 0, 10).stage(0).line(),
            task(2, "e1", 10, 20).stage(1).line(),
        ])
        .unwrap();
        assert_eq!(analyzer.jobs()[&0].all_tasks().count(), 1);
        assert_eq!(analyzer.jobs()[&1].all_tasks().count(), 2);
    }

    #[test]
    fn task_for_unknown_stage_is_fatal() {
        let result = analyze(&[job_start(0, &[0]), task(1, "e1", 0, 10).stage(7).line()]);
        match result {
            Err(Error::UnknownStage(7)) => {}
            other => panic!("unexpected {:?}", other.map(|a| a.jobs().len())),
        }
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let mut broken = task(2, "e1", 0, 10).json();
        broken["Task Info"].remove("Executor ID");
        let analyzer = analyze(&[
            "not json at all".to_string(),
            r#"{"no event": true}"#.to_string(),
            String::new(),
            job_start(0, &[0]),
            r#"{"Event": "SparkListenerApplicationStart"}"#.to_string(),
            task(1, "e1", 0, 10).line(),
            broken.dump(),
        ])
        .unwrap();
        assert_eq!(analyzer.jobs()[&0].all_tasks().count(), 1);
    }

    #[test]
    fn lines_with_invalid_utf8_are_skipped() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(job_start(0, &[0]).as_bytes());
        bytes.extend_from_slice(b"\n{\"Event\": \"garbage \xff\xfe\"}\r\n");
        bytes.extend_from_slice(task(1, "e1", 0, 10).line().as_bytes());
        bytes.extend_from_slice(b"\r\n");
        bytes.extend_from_slice(task(2, "e1", 10, 20).line().as_bytes());

        let analyzer = Analyzer::from_reader(&bytes[..], keep_all).unwrap();
        assert_eq!(analyzer.jobs()[&0].all_tasks().count(), 2);
    }

    #[test]
    fn stages_without_tasks_are_dropped() {
        let mut broken = task(2, "e1", 0, 10).stage(1).json();
        broken["Task Metrics"].remove("Executor Run Time");
        let analyzer = analyze(&[
            job_start(0, &[0, 1]),
            task(1, "e1", 0, 10).line(),
            broken.dump(),
        ])
        .unwrap();
        let stages: Vec<_> = analyzer.jobs()[&0].stages().keys().cloned().collect();
        assert_eq!(stages, vec![0]);
    }

    fn shuffle_log() -> Vec<String> {
        let mut lines = Vec::new();
        let mut task_id = 0;
        for job in 0..12 {
            lines.push(job_start(job, &[job]));
            // jobs 0 and 1 are too small to count
            let num_tasks = if job < 2 { 3 } else { 6 };
            for _ in 0..num_tasks {
                task_id += 1;
                lines.push(task(task_id, "e1", 0, 10).stage(job).line());
            }
        }
        lines
    }

    #[test]
    fn shuffle_filter_keeps_last_nine_large_jobs() {
        let analyzer =
            Analyzer::from_reader(log(&shuffle_log()).as_bytes(), shuffle_jobs).unwrap();
        let ids: Vec<JobId> = analyzer.jobs().keys().cloned().collect();
        assert_eq!(ids, (3..12).collect::<Vec<_>>());
    }

    #[test]
    fn warmup_filter_drops_leading_jobs() {
        let analyzer =
            Analyzer::from_reader(log(&shuffle_log()).as_bytes(), drop_warmup_jobs(10)).unwrap();
        let ids: Vec<JobId> = analyzer.jobs().keys().cloned().collect();
        assert_eq!(ids, vec![10, 11]);
    }

    #[test]
    fn summary_lists_jobs_and_stages() {
        let analyzer = analyze(&[
            job_start(3, &[5]),
            task(1, "e1", 0, 1000).stage(5).cpu_jiffies(0.0, 80.0).line(),
        ])
        .unwrap();
        let mut out = Vec::new();
        analyzer
            .write_summary(&mut out, &IdealTimeConfig::default())
            .unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.starts_with("Job 3: runtime 1.000 s, ideal 0.100 s"), "{}", out);
        assert!(out.contains("  Stage 5: 1 tasks"), "{}", out);
        assert!(out.contains("load balancing badness 1.000"), "{}", out);
    }

    #[test]
    fn strict_summary_reports_the_mismatch() {
        let analyzer = analyze(&[
            job_start(0, &[0]),
            task(1, "e1", 0, 1000)
                .cpu_jiffies(0.0, 100.0)
                .compute_nanos(10.0e6)
                .line(),
        ])
        .unwrap();
        let strict = IdealTimeConfig {
            mismatch: MismatchPolicy::Fail,
            ..IdealTimeConfig::default()
        };
        let result = analyzer.write_summary(Vec::new(), &strict);
        assert!(result.is_err());
    }
}
