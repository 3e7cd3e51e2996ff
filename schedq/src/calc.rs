//! 下次运行时间计算
//! Next run time calculation
//!
//! 纯函数：从任务和当前时刻计算下一次运行的 UTC 时刻，秒级精度。
//! Pure function: computes the next UTC run instant from a job and the
//! current time, at second precision.

use crate::error::{Error, Result};
use crate::job::{Job, JobStatus, JobType};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use std::str::FromStr;

/// 暂停任务的哨兵时刻，按任务时区解释后转换为 UTC，
/// 使暂停的任务在按时间排序的扫描中自然沉底
/// Sentinel instant for paused jobs, interpreted in the job's timezone and
/// converted to UTC, so paused jobs naturally sink to the tail of
/// time-ordered scans
pub const NEXT_RUN_TIME_MAX: &str = "9999-09-09 09:09:09";

/// 墙钟时间的布局
/// Wall-clock time layout
pub const DATETIME_LAYOUT: &str = "%Y-%m-%d %H:%M:%S";

/// 解析任务的时区，空字符串按 UTC 处理
/// Parse the job's timezone; an empty string means UTC
pub(crate) fn load_timezone(j: &Job) -> Result<Tz> {
  if j.timezone.is_empty() {
    return Ok(Tz::UTC);
  }
  j.timezone.parse::<Tz>().map_err(|e| {
    Error::invalid_job(
      j.full_name(),
      "Timezone".to_string(),
      j.timezone.clone(),
      e.to_string(),
    )
  })
}

/// 截断到整秒
/// Truncate to whole seconds
pub(crate) fn truncate_to_second(t: DateTime<Utc>) -> DateTime<Utc> {
  DateTime::from_timestamp(t.timestamp(), 0).unwrap_or(t)
}

/// 把本地墙钟时间转换为 UTC
/// Convert a local wall-clock time to UTC
fn local_to_utc(j: &Job, field: &str, value: &str, naive: NaiveDateTime, tz: Tz) -> Result<DateTime<Utc>> {
  tz.from_local_datetime(&naive)
    .earliest()
    .map(|t| t.with_timezone(&Utc))
    .ok_or_else(|| {
      Error::invalid_job(
        j.full_name(),
        field.to_string(),
        value.to_string(),
        "not a valid local time".to_string(),
      )
    })
}

/// 把 5 字段 cron 表达式扩展为 `cron` crate 需要的 7 字段形式
/// Widen a 5-field cron expression to the 7-field form the `cron` crate
/// expects (seconds prepended, year appended)
fn widen_cron_expr(expr: &str) -> String {
  if expr.split_whitespace().count() == 5 {
    format!("0 {} *", expr)
  } else {
    expr.to_string()
  }
}

/// 计算下次运行时间，不同任务类型以不同方式计算；
/// 任务暂停时返回 `9999-09-09 09:09:09` 哨兵值。
/// Calculate the next run time; each job type is computed differently.
/// When the job is paused, the `9999-09-09 09:09:09` sentinel is returned.
pub fn calc_next_run_time(j: &Job, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
  let tz = load_timezone(j)?;

  if j.status == JobStatus::Paused {
    let naive = NaiveDateTime::parse_from_str(NEXT_RUN_TIME_MAX, DATETIME_LAYOUT)
      .map_err(|e| Error::invalid_job(j.full_name(), "Status", NEXT_RUN_TIME_MAX, e.to_string()))?;
    return Ok(truncate_to_second(local_to_utc(j, "Status", NEXT_RUN_TIME_MAX, naive, tz)?));
  }

  let next_run_time = match j.job_type {
    JobType::Datetime => {
      let naive = NaiveDateTime::parse_from_str(&j.start_at, DATETIME_LAYOUT).map_err(|e| {
        Error::invalid_job(
          j.full_name(),
          "StartAt".to_string(),
          j.start_at.clone(),
          e.to_string(),
        )
      })?;
      local_to_utc(j, "StartAt", &j.start_at, naive, tz)?
    }
    JobType::Interval => {
      let interval = humantime::parse_duration(&j.interval).map_err(|e| {
        Error::invalid_job(
          j.full_name(),
          "Interval".to_string(),
          j.interval.clone(),
          e.to_string(),
        )
      })?;
      now
        + chrono::Duration::from_std(interval).map_err(|e| {
          Error::invalid_job(
            j.full_name(),
            "Interval".to_string(),
            j.interval.clone(),
            e.to_string(),
          )
        })?
    }
    JobType::Cron => {
      let schedule = Schedule::from_str(&widen_cron_expr(&j.cron_expr)).map_err(|e| {
        Error::invalid_job(
          j.full_name(),
          "CronExpr".to_string(),
          j.cron_expr.clone(),
          e.to_string(),
        )
      })?;
      schedule
        .after(&now.with_timezone(&tz))
        .next()
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| {
          Error::invalid_job(
            j.full_name(),
            "CronExpr".to_string(),
            j.cron_expr.clone(),
            "no upcoming tick".to_string(),
          )
        })?
    }
  };

  Ok(truncate_to_second(next_run_time))
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Timelike;

  fn get_job() -> Job {
    Job {
      name: "Job".to_string(),
      job_type: JobType::Interval,
      interval: "1s".to_string(),
      timezone: "America/New_York".to_string(),
      status: JobStatus::Running,
      ..Default::default()
    }
  }

  #[test]
  fn test_calc_is_utc_at_second_precision() {
    let j = get_job();
    let next = calc_next_run_time(&j, Utc::now()).unwrap();

    assert_eq!(next.nanosecond(), 0);
    assert_eq!(next.timezone(), Utc);
  }

  #[test]
  fn test_calc_datetime() {
    let mut j = get_job();
    j.job_type = JobType::Datetime;
    j.start_at = "2023-09-22 07:30:08".to_string();

    let tz: Tz = "America/New_York".parse().unwrap();
    let naive = NaiveDateTime::parse_from_str(&j.start_at, DATETIME_LAYOUT).unwrap();
    let expected = tz
      .from_local_datetime(&naive)
      .single()
      .unwrap()
      .with_timezone(&Utc);

    let next = calc_next_run_time(&j, Utc::now()).unwrap();
    assert_eq!(next, expected);
  }

  #[test]
  fn test_calc_interval() {
    let j = get_job();
    let now = Utc::now();
    let next = calc_next_run_time(&j, now).unwrap();

    let expected = DateTime::from_timestamp((now + chrono::Duration::seconds(1)).timestamp(), 0).unwrap();
    assert_eq!(next, expected);
  }

  #[test]
  fn test_calc_cron() {
    let mut j = get_job();
    j.job_type = JobType::Cron;
    j.cron_expr = "*/1 * * * *".to_string();

    let now = Utc::now();
    let next = calc_next_run_time(&j, now).unwrap();

    // 下一个分钟边界，按任务时区解释后以 UTC 表达
    // The next minute boundary in the job's zone, expressed in UTC
    assert_eq!(next.second(), 0);
    assert!(next > now);
    assert!(next <= now + chrono::Duration::seconds(60));
  }

  #[test]
  fn test_calc_paused_sentinel() {
    for job_type in [JobType::Datetime, JobType::Interval, JobType::Cron] {
      let mut j = get_job();
      j.job_type = job_type;
      j.status = JobStatus::Paused;

      let tz: Tz = "America/New_York".parse().unwrap();
      let naive = NaiveDateTime::parse_from_str(NEXT_RUN_TIME_MAX, DATETIME_LAYOUT).unwrap();
      let expected = tz
        .from_local_datetime(&naive)
        .single()
        .unwrap()
        .with_timezone(&Utc);

      let next = calc_next_run_time(&j, Utc::now()).unwrap();
      assert_eq!(next, expected);
    }
  }

  #[test]
  fn test_calc_timezone_unknown() {
    let mut j = get_job();
    j.timezone = "unknown".to_string();

    assert!(calc_next_run_time(&j, Utc::now()).is_err());
  }

  #[test]
  fn test_calc_start_at_error() {
    let mut j = get_job();
    j.job_type = JobType::Datetime;
    j.start_at = "2023-10-22T07:30:08".to_string();

    assert!(calc_next_run_time(&j, Utc::now()).is_err());
  }

  #[test]
  fn test_calc_interval_error() {
    let mut j = get_job();
    j.interval = "2".to_string();

    assert!(calc_next_run_time(&j, Utc::now()).is_err());
  }

  #[test]
  fn test_calc_cron_error() {
    let mut j = get_job();
    j.job_type = JobType::Cron;
    j.cron_expr = "not a cron".to_string();

    assert!(calc_next_run_time(&j, Utc::now()).is_err());
  }

  #[test]
  fn test_calc_empty_timezone_means_utc() {
    let mut j = get_job();
    j.timezone = String::new();

    assert!(calc_next_run_time(&j, Utc::now()).is_ok());
  }

  #[test]
  fn test_widen_cron_expr() {
    assert_eq!(widen_cron_expr("*/1 * * * *"), "0 */1 * * * * *");
    assert_eq!(widen_cron_expr("0 0 0 * * *"), "0 0 0 * * *");
  }
}
