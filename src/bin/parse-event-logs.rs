// Copyright 2017 ETH Zurich. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

extern crate env_logger;
extern crate getopts;
#[macro_use]
extern crate log;
extern crate spark_trace;

use std::env;
use std::io;
use std::process;
use std::str::FromStr;

use getopts::{Matches, Options};
use log::LevelFilter;

use spark_trace::analyzer::{drop_warmup_jobs, shuffle_jobs, Analyzer, Jobs};
use spark_trace::ideal::{DEFAULT_CORES_PER_EXECUTOR, DEFAULT_NETWORK_GIGABITS_PER_S, DEFAULT_TOLERANCE};
use spark_trace::{Error, IdealTimeConfig, MismatchPolicy, Placement};

fn print_usage(program: &str, opts: Options) -> ! {
    let brief = format!("Usage: {} [options] EVENT_LOG...", program);
    print!("{}", opts.usage(&brief));
    process::exit(0)
}

fn parse_opt<T: FromStr>(matches: &Matches, name: &str, default: T) -> T {
    match matches.opt_str(name) {
        Some(s) => s
            .parse::<T>()
            .unwrap_or_else(|_| panic!("invalid value for --{}: {}", name, s)),
        None => default,
    }
}

fn analyze(
    path: &str,
    config: &IdealTimeConfig,
    warmup: usize,
    shuffle_only: bool,
) -> Result<(), Error> {
    let filter = move |jobs: Jobs| {
        let jobs = drop_warmup_jobs(warmup)(jobs);
        if shuffle_only {
            shuffle_jobs(jobs)
        } else {
            jobs
        }
    };
    let analyzer = Analyzer::from_file(path, filter)?;

    let stdout = io::stdout();
    println!("{}", path);
    analyzer.write_summary(stdout.lock(), config)
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let program = args[0].clone();

    let mut opts = Options::new();
    opts.optopt(
        "c",
        "cores",
        &format!("cores per executor (default: {})", DEFAULT_CORES_PER_EXECUTOR),
        "NUM",
    );
    opts.optopt(
        "n",
        "network-gbps",
        &format!(
            "network throughput per executor in Gbit/s (default: {})",
            DEFAULT_NETWORK_GIGABITS_PER_S
        ),
        "GBPS",
    );
    opts.optopt(
        "t",
        "tolerance",
        &format!(
            "allowed relative difference between measurements (default: {})",
            DEFAULT_TOLERANCE
        ),
        "FRACTION",
    );
    opts.optflag("s", "strict", "fail on inconsistent measurements instead of warning");
    opts.optflag("f", "fix-executors", "keep tasks on the executor they ran on");
    opts.optflag("d", "disk-monotasks", "use disk monotask times for ideal disk time");
    opts.optflag("j", "shuffle-jobs", "only analyze the measured shuffle benchmark jobs");
    opts.optopt("w", "warmup", "number of leading jobs to ignore", "NUM");
    opts.optflag("v", "verbose", "log debug output");
    opts.optflag("h", "help", "print this help menu");
    let matches = match opts.parse(&args[1..]) {
        Ok(m) => m,
        Err(f) => panic!("{}", f),
    };

    if matches.opt_present("h") || matches.free.is_empty() {
        print_usage(&program, opts);
    }

    let mut logger = env_logger::Builder::from_default_env();
    if matches.opt_present("v") {
        logger.filter_level(LevelFilter::Debug);
    }
    logger.init();

    let tolerance = parse_opt(&matches, "tolerance", DEFAULT_TOLERANCE);
    if !(tolerance >= 0.0) {
        panic!("tolerance must not be negative: {}", tolerance);
    }

    let config = IdealTimeConfig {
        num_cores_per_executor: parse_opt(&matches, "cores", DEFAULT_CORES_PER_EXECUTOR),
        network_throughput_gigabits_per_executor: parse_opt(
            &matches,
            "network-gbps",
            DEFAULT_NETWORK_GIGABITS_PER_S,
        ),
        tolerance,
        mismatch: if matches.opt_present("strict") {
            MismatchPolicy::Fail
        } else {
            MismatchPolicy::Warn
        },
        placement: if matches.opt_present("fix-executors") {
            Placement::FixedExecutors
        } else {
            Placement::Fluid
        },
        use_disk_monotask_times: matches.opt_present("disk-monotasks"),
    };
    let warmup = parse_opt(&matches, "warmup", 0);
    let shuffle_only = matches.opt_present("shuffle-jobs");

    for path in &matches.free {
        if let Err(err) = analyze(path, &config, warmup, shuffle_only) {
            error!("failed to analyze {}: {}", path, err);
            process::exit(1);
        }
    }
}
