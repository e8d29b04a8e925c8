// Copyright 2017 ETH Zurich. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::error;
use std::fmt;
use std::io;

use json;

use crate::StageId;

/// The resource whose two independent measurements disagreed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Resource {
    Cpu,
    Network,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Resource::Cpu => f.write_str("CPU"),
            Resource::Network => f.write_str("network"),
        }
    }
}

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Json(json::Error),
    /// A record lacks a required field, or a field has the wrong type.
    MalformedRecord(String),
    /// A task finished for a stage that no job-start record mentioned.
    UnknownStage(StageId),
    /// Engine-reported and OS-reported quantities differ by more than the
    /// configured relative tolerance.
    MeasurementInconsistency {
        stage: StageId,
        resource: Resource,
        reported: f64,
        measured: f64,
        tolerance: f64,
    },
    Other(String),
}

impl Error {
    pub fn other<S: Into<String>>(s: S) -> Self {
        Error::Other(s.into())
    }

    pub fn malformed<S: Into<String>>(s: S) -> Self {
        Error::MalformedRecord(s.into())
    }

    /// Prefixes a malformed-record message with the key it was found under.
    pub fn in_field(self, key: &str) -> Self {
        match self {
            Error::MalformedRecord(msg) => Error::MalformedRecord(format!("{:?}: {}", key, msg)),
            other => other,
        }
    }
}

impl From<io::Error> for Error {
    fn from(io: io::Error) -> Self {
        Error::Io(io)
    }
}

impl From<json::Error> for Error {
    fn from(json: json::Error) -> Self {
        Error::Json(json)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Io(ref io) => io.fmt(f),
            Error::Json(ref json) => json.fmt(f),
            Error::MalformedRecord(ref s) => write!(f, "malformed record: {}", s),
            Error::UnknownStage(id) => write!(
                f,
                "task completed for stage {} which does not belong to any started job",
                id
            ),
            Error::MeasurementInconsistency {
                stage,
                resource,
                reported,
                measured,
                tolerance,
            } => write!(
                f,
                "stage {}: {} usage reported by the engine ({}) differs from the OS counters ({}) by more than {}%",
                stage,
                resource,
                reported,
                measured,
                tolerance * 100.0
            ),
            Error::Other(ref s) => s.fmt(f),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::Io(ref io) => Some(io),
            Error::Json(ref json) => Some(json),
            _ => None,
        }
    }
}
