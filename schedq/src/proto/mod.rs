//! 线上协议模块
//! Wire protocol module
//!
//! RPC 表面使用的 protobuf 消息以及与领域类型之间的转换。
//! Protobuf messages used by the RPC surface and the conversions to and
//! from the domain types.

mod schedq;

pub use self::schedq::*;

use crate::error::{Error, Result};
use crate::job;
use chrono::DateTime;
use std::collections::HashMap;

impl From<&job::Job> for Job {
  fn from(j: &job::Job) -> Self {
    Job {
      id: j.id.clone(),
      name: j.name.clone(),
      job_type: j.job_type.as_str().to_string(),
      start_at: j.start_at.clone(),
      interval: j.interval.clone(),
      cron_expr: j.cron_expr.clone(),
      timezone: j.timezone.clone(),
      status: j.status.as_str().to_string(),
      timeout: j.timeout.clone(),
      func_name: j.func_name.clone(),
      args: serde_json::to_vec(&j.args).unwrap_or_default(),
      queues: j.queues.clone(),
      next_run_time: j.next_run_time.timestamp(),
      last_run_time: j.last_run_time.map(|t| t.timestamp()).unwrap_or(0),
      scheduled: false,
    }
  }
}

impl TryFrom<Job> for job::Job {
  type Error = Error;

  fn try_from(p: Job) -> Result<job::Job> {
    let args: HashMap<String, serde_json::Value> = if p.args.is_empty() {
      HashMap::new()
    } else {
      serde_json::from_slice(&p.args)?
    };
    Ok(job::Job {
      id: p.id,
      name: p.name,
      job_type: if p.job_type.is_empty() {
        job::JobType::default()
      } else {
        p.job_type.parse()?
      },
      start_at: p.start_at,
      interval: p.interval,
      cron_expr: p.cron_expr,
      timezone: p.timezone,
      status: p.status.parse()?,
      timeout: p.timeout,
      func_name: p.func_name,
      args,
      queues: p.queues,
      next_run_time: DateTime::from_timestamp(p.next_run_time, 0).unwrap_or(DateTime::UNIX_EPOCH),
      last_run_time: if p.last_run_time == 0 {
        None
      } else {
        DateTime::from_timestamp(p.last_run_time, 0)
      },
    })
  }
}

impl From<&[job::Job]> for Jobs {
  fn from(js: &[job::Job]) -> Self {
    Jobs {
      jobs: js.iter().map(Job::from).collect(),
    }
  }
}

impl TryFrom<Jobs> for Vec<job::Job> {
  type Error = Error;

  fn try_from(p: Jobs) -> Result<Vec<job::Job>> {
    p.jobs.into_iter().map(job::Job::try_from).collect()
  }
}
