//! 任务模块
//! Job module
//!
//! 定义了任务相关的数据结构和状态编解码
//! Defines job data structures and the state codec

use crate::calc::calc_next_run_time;
use crate::error::{Error, Result};
use crate::registry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// 默认的单次运行超时时间
/// Default per-run timeout
pub const DEFAULT_TIMEOUT: &str = "1h";

/// 默认时区
/// Default timezone
pub const DEFAULT_TIMEZONE: &str = "UTC";

/// 任务类型
/// Job type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
  /// 在指定时刻运行一次
  /// Runs once at a given instant
  Datetime,
  /// 按固定间隔重复运行
  /// Repeats on a fixed interval
  #[default]
  Interval,
  /// 按 cron 表达式运行
  /// Runs on a cron expression
  Cron,
}

impl JobType {
  /// 转换为字符串
  /// Convert to string
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Datetime => "datetime",
      Self::Interval => "interval",
      Self::Cron => "cron",
    }
  }
}

impl fmt::Display for JobType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for JobType {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s.to_lowercase().as_str() {
      "datetime" => Ok(Self::Datetime),
      "interval" => Ok(Self::Interval),
      "cron" => Ok(Self::Cron),
      _ => Err(Error::invalid_job("", "Type", s, "unknown")),
    }
  }
}

/// 任务状态
/// Job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
  /// 正常调度
  /// Scheduled normally
  #[default]
  Running,
  /// 暂停，下次运行时间为哨兵值
  /// Paused; next run time is the sentinel
  Paused,
}

impl JobStatus {
  /// 转换为字符串
  /// Convert to string
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Running => "running",
      Self::Paused => "paused",
    }
  }
}

impl fmt::Display for JobStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for JobStatus {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s.to_lowercase().as_str() {
      // 空字符串表示尚未初始化的任务，默认为 running
      // An empty string means an uninitialized job; defaults to running
      "" | "running" => Ok(Self::Running),
      "paused" => Ok(Self::Paused),
      _ => Err(Error::invalid_job("", "Status", s, "unknown")),
    }
  }
}

/// 任务，调度器管理的核心实体
/// Job, the central entity managed by the scheduler
///
/// 任务通过进程级函数注册表按 `func_name` 解析到用户函数，
/// 因此任务本身可以被序列化、持久化并在进程间传递。
/// A job resolves its user function through the process-wide registry by
/// `func_name`, so the job itself can be serialized, persisted and handed
/// between processes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Job {
  /// 16 位十六进制 id，首次持久化时生成，之后不可变
  /// 16-char hex id, generated on first persist, immutable afterwards
  pub id: String,
  /// 人类可读名称，不要求唯一
  /// Human-readable label, not required to be unique
  pub name: String,
  /// 任务类型
  /// Job type
  #[serde(rename = "type")]
  pub job_type: JobType,
  /// `YYYY-MM-DD HH:MM:SS`，type 为 datetime 时必填
  /// `YYYY-MM-DD HH:MM:SS`, required when type is datetime
  pub start_at: String,
  /// 时长字符串（例如 `2s`、`500ms`），type 为 interval 时必填
  /// Duration string (e.g. `2s`, `500ms`), required when type is interval
  pub interval: String,
  /// 5 字段 cron 表达式，type 为 cron 时必填
  /// 5-field cron expression, required when type is cron
  pub cron_expr: String,
  /// IANA 时区名称，决定 start_at 和 cron_expr 的解释
  /// IANA timezone name; governs how start_at and cron_expr are interpreted
  pub timezone: String,
  /// 任务状态
  /// Job status
  pub status: JobStatus,
  /// 单次运行的超时时间
  /// Per-run wall-clock timeout
  pub timeout: String,
  /// 注册表中的函数名
  /// Function name in the registry
  pub func_name: String,
  /// 传递给用户函数的参数，值类型任意
  /// Arguments handed to the user function, heterogeneous values
  pub args: HashMap<String, serde_json::Value>,
  /// 分发亲和的队列列表，空表示任意队列
  /// Dispatch-affinity queues; empty means any queue
  pub queues: Vec<String>,
  /// 下次运行时间，UTC 秒级精度
  /// Next run time, UTC at second precision
  pub next_run_time: DateTime<Utc>,
  /// 最近一次分发时间，首次运行前为空
  /// Most recent dispatch time; None until the first run
  pub last_run_time: Option<DateTime<Utc>>,
}

impl Default for Job {
  fn default() -> Self {
    Self {
      id: String::new(),
      name: String::new(),
      job_type: JobType::default(),
      start_at: String::new(),
      interval: String::new(),
      cron_expr: String::new(),
      timezone: String::new(),
      status: JobStatus::default(),
      timeout: String::new(),
      func_name: String::new(),
      args: HashMap::new(),
      queues: Vec::new(),
      next_run_time: DateTime::UNIX_EPOCH,
      last_run_time: None,
    }
  }
}

impl Job {
  /// 任务全名，用于日志和通知
  /// Full name of the job, used by logs and notifications
  pub fn full_name(&self) -> String {
    format!("{}:{}", self.name, self.id)
  }

  /// 生成 16 位十六进制 id
  /// Generate a 16-char hex id
  pub(crate) fn set_id(&mut self) {
    self.id = Uuid::new_v4().simple().to_string()[..16].to_string();
  }

  /// 初始化任务：分配 id、应用默认值、解析注册表、计算首次运行时间
  /// Initialize the job: assign id, apply defaults, resolve the registry,
  /// compute the first run time
  pub fn init(&mut self) -> Result<()> {
    if self.id.is_empty() {
      self.set_id();
    }
    if self.timezone.is_empty() {
      self.timezone = DEFAULT_TIMEZONE.to_string();
    }
    if self.timeout.is_empty() {
      self.timeout = DEFAULT_TIMEOUT.to_string();
    }
    if self.func_name.is_empty() || !registry::contains(&self.func_name) {
      return Err(Error::func_unregistered(self.func_name.as_str()));
    }
    self.check()?;
    self.next_run_time = calc_next_run_time(self, Utc::now())?;
    Ok(())
  }

  /// 校验任务字段，不做任何修改
  /// Validate the job's fields without mutating it
  pub fn check(&self) -> Result<()> {
    match self.job_type {
      JobType::Datetime if self.start_at.is_empty() => {
        return Err(Error::invalid_job(
          self.full_name(),
          "StartAt",
          self.start_at.as_str(),
          "required for datetime job",
        ));
      }
      JobType::Interval if self.interval.is_empty() => {
        return Err(Error::invalid_job(
          self.full_name(),
          "Interval",
          self.interval.as_str(),
          "required for interval job",
        ));
      }
      JobType::Cron if self.cron_expr.is_empty() => {
        return Err(Error::invalid_job(
          self.full_name(),
          "CronExpr",
          self.cron_expr.as_str(),
          "required for cron job",
        ));
      }
      _ => {}
    }

    crate::calc::load_timezone(self)?;

    if !self.timeout.is_empty() {
      humantime::parse_duration(&self.timeout).map_err(|e| {
        Error::invalid_job(
          self.full_name(),
          "Timeout".to_string(),
          self.timeout.clone(),
          e.to_string(),
        )
      })?;
    }

    Ok(())
  }
}

impl fmt::Display for Job {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let args = serde_json::to_string(&self.args).unwrap_or_else(|_| "{}".to_string());
    write!(
      f,
      "Job{{'Id': '{}', 'Name': '{}', 'Type': '{}', 'StartAt': '{}', 'Interval': '{}', \
       'CronExpr': '{}', 'Timezone': '{}', 'Status': '{}', 'Timeout': '{}', 'FuncName': '{}', \
       'Args': '{}', 'Queues': '{:?}', 'NextRunTime': '{}', 'LastRunTime': '{}'}}",
      self.id,
      self.name,
      self.job_type,
      self.start_at,
      self.interval,
      self.cron_expr,
      self.timezone,
      self.status,
      self.timeout,
      self.func_name,
      args,
      self.queues,
      self.next_run_time,
      self
        .last_run_time
        .map(|t| t.to_string())
        .unwrap_or_default(),
    )
  }
}

/// 将任务序列化为字节，用于持久化
/// Serialize a job to bytes for persistence
pub fn state_dump(j: &Job) -> Result<Vec<u8>> {
  Ok(serde_json::to_vec(j)?)
}

/// 从字节反序列化任务，输入不合法时返回类型化错误
/// Deserialize a job from bytes; malformed input yields a typed error
pub fn state_load(state: &[u8]) -> Result<Job> {
  Ok(serde_json::from_slice(state)?)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn get_job() -> Job {
    Job {
      name: "Job".to_string(),
      job_type: JobType::Interval,
      interval: "1s".to_string(),
      args: HashMap::from([
        ("arg1".to_string(), json!("1")),
        ("arg2".to_string(), json!(2)),
        ("arg3".to_string(), json!([3, "three"])),
      ]),
      ..Default::default()
    }
  }

  #[test]
  fn test_job_set_id() {
    let mut j = get_job();
    j.set_id();

    assert_eq!(j.id.len(), 16);
    assert!(j.id.chars().all(|c| c.is_ascii_hexdigit()));
  }

  #[test]
  fn test_job_string() {
    let j = get_job();
    let s = j.to_string();
    for field in [
      "Id",
      "Name",
      "Type",
      "StartAt",
      "Interval",
      "CronExpr",
      "Timezone",
      "Status",
      "Timeout",
      "FuncName",
      "Args",
      "Queues",
      "NextRunTime",
      "LastRunTime",
    ] {
      assert!(s.contains(&format!("'{}'", field)), "missing field {field}");
    }
  }

  #[test]
  fn test_job_state_dump() {
    let j = get_job();
    let state = state_dump(&j).unwrap();

    assert!(!state.is_empty());
  }

  #[test]
  fn test_job_state_load() {
    let j = get_job();
    let state = state_dump(&j).unwrap();
    let loaded = state_load(&state).unwrap();

    // 往返必须在每个字段上相等，包括异构的 args 值
    // The round trip must be equal on every field, heterogeneous args included
    assert_eq!(j, loaded);
  }

  #[test]
  fn test_job_state_load_error() {
    let result = state_load(b"job");
    assert!(matches!(result, Err(Error::Serialization(_))));
  }

  #[test]
  fn test_job_check_missing_field() {
    let mut j = get_job();
    j.interval = String::new();

    assert!(j.check().is_err());

    let mut j = get_job();
    j.job_type = JobType::Cron;
    assert!(j.check().is_err());
  }

  #[test]
  fn test_job_check_bad_timeout() {
    let mut j = get_job();
    j.timeout = "errorTimeout".to_string();

    let err = j.check().unwrap_err();
    assert!(err.to_string().contains("Timeout `errorTimeout` error"));
  }

  #[test]
  fn test_job_type_round_trip() {
    for t in [JobType::Datetime, JobType::Interval, JobType::Cron] {
      assert_eq!(t.as_str().parse::<JobType>().unwrap(), t);
    }
    assert!("unknown".parse::<JobType>().is_err());
  }

  #[test]
  fn test_job_status_round_trip() {
    assert_eq!("running".parse::<JobStatus>().unwrap(), JobStatus::Running);
    assert_eq!("paused".parse::<JobStatus>().unwrap(), JobStatus::Paused);
    assert_eq!("".parse::<JobStatus>().unwrap(), JobStatus::Running);
  }
}
