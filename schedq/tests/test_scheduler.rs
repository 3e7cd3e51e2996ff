//! 调度器集成测试
//! Scheduler integration tests

use chrono::{NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use schedq::calc::{calc_next_run_time, DATETIME_LAYOUT, NEXT_RUN_TIME_MAX};
use schedq::cluster::ClusterNode;
use schedq::error::Error;
use schedq::job::{Job, JobStatus, JobType};
use schedq::registry;
use schedq::scheduler::Scheduler;
use schedq::store::MemoryStore;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn register_funcs() {
  registry::register_func("tests.dry_run", |_token, _job| async { Ok(()) });
  registry::register_func("tests.panic", |_token, _job| async {
    panic!("boom");
  });
  registry::register_func("tests.count", |_token, _job| async {
    COUNTER.fetch_add(1, Ordering::SeqCst);
    Ok(())
  });
}

async fn get_scheduler() -> Arc<Scheduler> {
  register_funcs();
  let scheduler = Arc::new(Scheduler::new());
  scheduler
    .set_store(Arc::new(MemoryStore::new()))
    .await
    .unwrap();
  scheduler
}

fn get_job() -> Job {
  Job {
    name: "Job".to_string(),
    job_type: JobType::Interval,
    interval: "50ms".to_string(),
    func_name: "tests.dry_run".to_string(),
    ..Default::default()
  }
}

fn get_cluster_node() -> Arc<ClusterNode> {
  Arc::new(ClusterNode::new(
    "127.0.0.1:36380",
    "127.0.0.1:36380",
    "127.0.0.1:36390",
    "127.0.0.1:36360",
    "default",
  ))
}

#[tokio::test]
async fn test_scheduler_add_job() {
  let scheduler = get_scheduler().await;
  let mut j = get_job();
  j.interval = "1s".to_string();

  let before = Utc::now();
  let j = scheduler.add_job(j).await.unwrap();

  assert_eq!(j.id.len(), 16);
  assert_eq!(j.status, JobStatus::Running);
  assert_eq!(j.timezone, "UTC");
  assert_eq!(j.timeout, "1h");
  // 大约在 now + 1s
  // Approximately now + 1s
  assert!(j.next_run_time > before);
  assert!(j.next_run_time <= before + chrono::Duration::seconds(2));

  scheduler.stop();
}

#[tokio::test]
async fn test_scheduler_add_job_datetime() {
  let scheduler = get_scheduler().await;
  let mut j = get_job();
  j.job_type = JobType::Datetime;
  j.start_at = "2023-09-22 07:30:08".to_string();

  let j = scheduler.add_job(j).await.unwrap();

  // 过期的一次性任务立即触发并被自动删除
  // A past one-shot job fires immediately and is auto-deleted
  tokio::time::sleep(Duration::from_millis(100)).await;

  let err = scheduler.get_job(&j.id).await.unwrap_err();
  assert!(matches!(err, Error::JobNotFound { .. }));

  scheduler.stop();
}

#[tokio::test]
async fn test_scheduler_add_job_unregistered_error() {
  let scheduler = get_scheduler().await;
  let mut j = get_job();
  j.func_name = String::new();

  let err = scheduler.add_job(j).await.unwrap_err();
  assert!(matches!(err, Error::FuncUnregistered { .. }));

  let mut j = get_job();
  j.func_name = "tests.unknown".to_string();
  let err = scheduler.add_job(j).await.unwrap_err();
  assert!(matches!(err, Error::FuncUnregistered { .. }));
}

#[tokio::test]
async fn test_scheduler_add_job_timeout_error() {
  let scheduler = get_scheduler().await;
  let mut j = get_job();
  j.timeout = "errorTimeout".to_string();

  let err = scheduler.add_job(j).await.unwrap_err();
  assert!(err.to_string().contains("Timeout `errorTimeout` error"));
}

#[tokio::test]
async fn test_scheduler_run_job_panic() {
  let scheduler = get_scheduler().await;
  let mut j = get_job();
  j.func_name = "tests.panic".to_string();

  scheduler.add_job(j).await.unwrap();

  // panic 被吸收，调度器保持可用
  // The panic is absorbed; the scheduler stays usable
  tokio::time::sleep(Duration::from_millis(150)).await;
  assert!(!scheduler.get_all_jobs().await.unwrap().is_empty());

  scheduler.stop();
}

#[tokio::test]
async fn test_scheduler_get_job() {
  let scheduler = get_scheduler().await;
  let j = get_job();

  assert!(j.id.is_empty());

  let j = scheduler.add_job(j).await.unwrap();
  let j = scheduler.get_job(&j.id).await.unwrap();

  assert!(!j.id.is_empty());

  scheduler.stop();
}

#[tokio::test]
async fn test_scheduler_get_all_jobs() {
  let scheduler = get_scheduler().await;

  assert!(scheduler.get_all_jobs().await.unwrap().is_empty());

  scheduler.add_job(get_job()).await.unwrap();

  assert_eq!(scheduler.get_all_jobs().await.unwrap().len(), 1);

  scheduler.stop();
}

#[tokio::test]
async fn test_scheduler_update_job() {
  let scheduler = get_scheduler().await;
  let mut j = get_job();
  j.interval = "1s".to_string();

  let mut j = scheduler.add_job(j).await.unwrap();

  j.interval = "2s".to_string();
  let j = scheduler.update_job(j).await.unwrap();

  assert_eq!(j.interval, "2s");

  scheduler.stop();
}

#[tokio::test]
async fn test_scheduler_update_job_shortens_wakeup() {
  let scheduler = get_scheduler().await;
  COUNTER.store(0, Ordering::SeqCst);
  let mut j = get_job();
  j.func_name = "tests.count".to_string();
  j.interval = "1h".to_string();

  let mut j = scheduler.add_job(j).await.unwrap();

  // 不唤醒的话循环会睡一个小时
  // Without a wakeup the loop would sleep for an hour
  j.interval = "50ms".to_string();
  scheduler.update_job(j).await.unwrap();

  tokio::time::sleep(Duration::from_millis(500)).await;
  assert!(COUNTER.load(Ordering::SeqCst) > 0);

  scheduler.stop();
}

#[tokio::test]
async fn test_scheduler_delete_job() {
  let scheduler = get_scheduler().await;

  let j = scheduler.add_job(get_job()).await.unwrap();
  scheduler.delete_job(&j.id).await.unwrap();

  let err = scheduler.get_job(&j.id).await.unwrap_err();
  assert!(matches!(err, Error::JobNotFound { .. }));

  scheduler.stop();
}

#[tokio::test]
async fn test_scheduler_delete_all_jobs() {
  let scheduler = get_scheduler().await;

  scheduler.add_job(get_job()).await.unwrap();
  scheduler.delete_all_jobs().await.unwrap();

  assert!(scheduler.get_all_jobs().await.unwrap().is_empty());

  scheduler.stop();
}

#[tokio::test]
async fn test_scheduler_pause_resume_job() {
  let scheduler = get_scheduler().await;
  let mut j = get_job();
  j.interval = "1s".to_string();
  let j = scheduler.add_job(j).await.unwrap();

  let tz: Tz = j.timezone.parse().unwrap();
  let naive = NaiveDateTime::parse_from_str(NEXT_RUN_TIME_MAX, DATETIME_LAYOUT).unwrap();
  let sentinel = tz
    .from_local_datetime(&naive)
    .single()
    .unwrap()
    .with_timezone(&Utc);

  let paused = scheduler.pause_job(&j.id).await.unwrap();
  assert_eq!(paused.status, JobStatus::Paused);
  assert_eq!(paused.next_run_time.timestamp(), sentinel.timestamp());

  let before = Utc::now();
  let resumed = scheduler.resume_job(&j.id).await.unwrap();
  assert_eq!(resumed.status, JobStatus::Running);
  assert_ne!(resumed.next_run_time.timestamp(), sentinel.timestamp());
  // 恢复后回到一个间隔以内的将来时刻
  // Restored to a future instant within one interval
  assert!(resumed.next_run_time > before);
  assert!(resumed.next_run_time <= before + chrono::Duration::seconds(2));

  scheduler.stop();
}

#[tokio::test]
async fn test_scheduler_pause_job_error() {
  let scheduler = get_scheduler().await;
  assert!(scheduler.pause_job("1").await.is_err());
}

#[tokio::test]
async fn test_scheduler_resume_job_error() {
  let scheduler = get_scheduler().await;
  assert!(scheduler.resume_job("1").await.is_err());
}

#[tokio::test]
async fn test_scheduler_run_job() {
  let scheduler = get_scheduler().await;
  let j = scheduler.add_job(get_job()).await.unwrap();

  scheduler.stop();

  assert!(scheduler.run_job(j).is_ok());
}

#[tokio::test]
async fn test_scheduler_schedule_job_local() {
  let scheduler = get_scheduler().await;
  let cluster_node = get_cluster_node();

  scheduler.set_cluster_node(cluster_node).await.unwrap();
  let j = scheduler.add_job(get_job()).await.unwrap();

  assert!(scheduler.schedule_job(j).is_ok());

  scheduler.stop();
}

#[tokio::test]
async fn test_scheduler_schedule_job_remote() {
  let scheduler = get_scheduler().await;
  let cluster_node = get_cluster_node();

  scheduler
    .set_cluster_node(Arc::clone(&cluster_node))
    .await
    .unwrap();
  let j = scheduler.add_job(get_job()).await.unwrap();

  // 目录里留着旧 id 的条目，改掉本机 id 后选择必然落到“对端”，
  // 远端调用失败只会被记录
  // The directory keeps the old id's entry; after changing the local id
  // the choice lands on a "peer", and the failing remote call is only
  // logged
  cluster_node.set_id("ffffffffffffffff");

  assert!(scheduler.schedule_job(j).is_ok());
  tokio::time::sleep(Duration::from_millis(100)).await;

  scheduler.stop();
}

#[tokio::test]
async fn test_scheduler_schedule_job_queue_not_exist() {
  let scheduler = get_scheduler().await;
  let cluster_node = get_cluster_node();

  scheduler.set_cluster_node(cluster_node).await.unwrap();
  let mut j = get_job();
  j.queues = vec!["other".to_string()];
  let j = scheduler.add_job(j).await.unwrap();

  let err = scheduler.schedule_job(j).unwrap_err();
  assert!(err.to_string().contains("does not exist"));

  scheduler.stop();
}

#[tokio::test]
async fn test_scheduler_start_and_stop() {
  let scheduler = get_scheduler().await;
  scheduler.add_job(get_job()).await.unwrap();

  assert!(scheduler.is_running());
  tokio::time::sleep(Duration::from_millis(50)).await;
  scheduler.stop();
  tokio::time::sleep(Duration::from_millis(50)).await;
  assert!(!scheduler.is_running());
}

#[tokio::test]
async fn test_scheduler_start_once() {
  let scheduler = get_scheduler().await;
  scheduler.add_job(get_job()).await.unwrap();

  scheduler.start();
  scheduler.start();
  assert!(scheduler.is_running());

  scheduler.stop();
}

#[tokio::test]
async fn test_scheduler_stop_once() {
  let scheduler = get_scheduler().await;
  scheduler.add_job(get_job()).await.unwrap();

  scheduler.stop();
  scheduler.stop();
  assert!(!scheduler.is_running());
}

#[tokio::test]
async fn test_scheduler_auto_stop_on_empty_store() {
  let scheduler = get_scheduler().await;

  scheduler.start();
  assert!(scheduler.is_running());

  // 空存储会让运行循环在一次扫描内自行停止
  // An empty store makes the run loop halt itself within one sweep
  tokio::time::sleep(Duration::from_millis(100)).await;
  assert!(!scheduler.is_running());
}

#[tokio::test]
async fn test_calc_next_run_time_timezone() {
  let j = Job {
    name: "Job".to_string(),
    job_type: JobType::Interval,
    interval: "1s".to_string(),
    timezone: "America/New_York".to_string(),
    status: JobStatus::Running,
    ..Default::default()
  };

  let next_run_time = calc_next_run_time(&j, Utc::now()).unwrap();
  assert_eq!(next_run_time.timezone(), Utc);
}

#[tokio::test]
async fn test_calc_next_run_time_cron_in_zone() {
  let mut j = Job {
    name: "Job".to_string(),
    job_type: JobType::Cron,
    cron_expr: "*/1 * * * *".to_string(),
    timezone: "Asia/Shanghai".to_string(),
    status: JobStatus::Running,
    ..Default::default()
  };

  let now = Utc::now();
  let next_run_time = calc_next_run_time(&j, now).unwrap();

  // 下一个分钟边界，以 UTC 表达
  // The next minute boundary, expressed in UTC
  assert_eq!(next_run_time.timestamp() % 60, 0);
  assert!(next_run_time > now);
  assert!(next_run_time <= now + chrono::Duration::seconds(60));

  // 暂停后无论类型如何都是哨兵值
  // Once paused, the sentinel regardless of type
  j.status = JobStatus::Paused;
  let tz: Tz = "Asia/Shanghai".parse().unwrap();
  let naive = NaiveDateTime::parse_from_str(NEXT_RUN_TIME_MAX, DATETIME_LAYOUT).unwrap();
  let sentinel = tz
    .from_local_datetime(&naive)
    .single()
    .unwrap()
    .with_timezone(&Utc);
  assert_eq!(
    calc_next_run_time(&j, now).unwrap().timestamp(),
    sentinel.timestamp()
  );
}
