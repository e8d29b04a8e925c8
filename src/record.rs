// Copyright 2017 ETH Zurich. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Typed access to the decoded JSON of a single event log line.

use json::JsonValue;

use crate::error::Error;
use crate::{JobId, StageId};

pub const JOB_START: &str = "SparkListenerJobStart";
pub const TASK_END: &str = "SparkListenerTaskEnd";

pub trait JsonParse {
    fn parse_u32(&self) -> Result<u32, Error> {
        self.parse_u64().and_then(|val| {
            if val > u64::from(u32::max_value()) {
                Err(Error::malformed(format!("integer too large for u32: {}", val)))
            } else {
                Ok(val as u32)
            }
        })
    }

    fn parse_u64(&self) -> Result<u64, Error>;

    fn parse_f64(&self) -> Result<f64, Error>;
}

impl JsonParse for JsonValue {
    fn parse_u64(&self) -> Result<u64, Error> {
        if let Some(val) = self.as_u64() {
            Ok(val)
        } else if let Some(s) = self.as_str() {
            s.parse::<u64>()
                .map_err(|err| Error::malformed(err.to_string()))
        } else {
            Err(Error::malformed(format!("failed to parse number: {:?}", self)))
        }
    }

    fn parse_f64(&self) -> Result<f64, Error> {
        if let Some(val) = self.as_f64() {
            Ok(val)
        } else if let Some(s) = self.as_str() {
            s.parse::<f64>()
                .map_err(|err| Error::malformed(err.to_string()))
        } else {
            Err(Error::malformed(format!("failed to parse number: {:?}", self)))
        }
    }
}

/// Looks up a key which the record schema guarantees to be present.
pub fn required<'a>(object: &'a JsonValue, key: &str) -> Result<&'a JsonValue, Error> {
    let value = &object[key];
    if value.is_null() {
        Err(Error::malformed(format!("missing required field {:?}", key)))
    } else {
        Ok(value)
    }
}

pub fn required_u32(object: &JsonValue, key: &str) -> Result<u32, Error> {
    required(object, key)?
        .parse_u32()
        .map_err(|err| err.in_field(key))
}

pub fn required_u64(object: &JsonValue, key: &str) -> Result<u64, Error> {
    required(object, key)?
        .parse_u64()
        .map_err(|err| err.in_field(key))
}

pub fn required_f64(object: &JsonValue, key: &str) -> Result<f64, Error> {
    required(object, key)?
        .parse_f64()
        .map_err(|err| err.in_field(key))
}

pub fn required_str<'a>(object: &'a JsonValue, key: &str) -> Result<&'a str, Error> {
    required(object, key)?
        .as_str()
        .ok_or_else(|| Error::malformed(format!("{:?} is not a string", key)))
}

/// Optional counters default to zero when absent.
pub fn optional_f64(object: &JsonValue, key: &str) -> Result<f64, Error> {
    let value = &object[key];
    if value.is_null() {
        Ok(0.0)
    } else {
        value.parse_f64().map_err(|err| err.in_field(key))
    }
}

/// The two record types the model cares about; everything else is passed
/// through by name so the caller can decide whether to log it.
#[derive(Debug, Clone, PartialEq)]
pub enum EventRecord<'a> {
    JobStart {
        job_id: JobId,
        stage_ids: Vec<StageId>,
    },
    TaskEnd {
        stage_id: StageId,
        data: &'a JsonValue,
    },
    Other(&'a str),
}

impl<'a> EventRecord<'a> {
    pub fn parse(data: &'a JsonValue) -> Result<Self, Error> {
        // each entry has an Event key
        let event = data["Event"]
            .as_str()
            .ok_or_else(|| Error::malformed("\"Event\" has invalid value"))?;

        match event {
            JOB_START => {
                let job_id = required_u32(data, "Job ID")?;
                // "Stage Infos" only exists in newer logs, "Stage IDs" in all of them
                let mut stage_ids = Vec::new();
                for stage in required(data, "Stage IDs")?.members() {
                    stage_ids.push(stage.parse_u32()?);
                }
                Ok(EventRecord::JobStart { job_id, stage_ids })
            }
            TASK_END => {
                let stage_id = required_u32(data, "Stage ID")?;
                Ok(EventRecord::TaskEnd { stage_id, data })
            }
            other => Ok(EventRecord::Other(other)),
        }
    }
}
