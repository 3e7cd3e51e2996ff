//! 存储模块
//! Store module
//!
//! 定义了任务持久化后端的抽象层
//! Defines the abstraction layer over job persistence backends

use crate::error::Result;
use crate::job::Job;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub mod memory;
pub mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

/// 存储特性，定义了与任务持久化后端交互的接口
/// Store trait, defines the interface for interacting with the job
/// persistence backend
///
/// 调度器只通过这个接口读写任务；`get_next_run_time` 必须由二级索引支撑，
/// 与遍历 `get_all_jobs` 取最小值的结果一致。
/// The scheduler reads and writes jobs only through this interface;
/// `get_next_run_time` must be backed by a secondary index and agree with
/// iterating `get_all_jobs` and taking the minimum.
#[async_trait]
pub trait Store: Send + Sync {
  /// 幂等的后端初始化，可以创建索引
  /// Idempotent backend setup; may create indexes
  async fn init(&self) -> Result<()>;

  /// 持久化任务，id 冲突时行为未定义，由调用方保证唯一
  /// Persist a job; behavior on id collision is undefined, the caller
  /// ensures uniqueness
  async fn add_job(&self, j: &Job) -> Result<()>;

  /// 按 id 读取任务
  /// Fetch a job by id
  async fn get_job(&self, id: &str) -> Result<Job>;

  /// 读取全部任务，顺序不作保证
  /// Fetch all jobs, in unspecified order
  async fn get_all_jobs(&self) -> Result<Vec<Job>>;

  /// 按 id 整体替换，任务不存在时失败
  /// Full replace by id; fails when the job is absent
  async fn update_job(&self, j: &Job) -> Result<()>;

  /// 删除任务
  /// Delete a job
  async fn delete_job(&self, id: &str) -> Result<()>;

  /// 删除全部任务
  /// Delete all jobs
  async fn delete_all_jobs(&self) -> Result<()>;

  /// 全部任务中最小的下次运行时间，存储为空时为 None
  /// The minimum next run time across all jobs, None when the store is
  /// empty
  async fn get_next_run_time(&self) -> Result<Option<DateTime<Utc>>>;

  /// 测试辅助，清空全部状态
  /// Test helper; drops all state
  async fn clear(&self) -> Result<()>;
}
