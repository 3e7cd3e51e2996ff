//! 内存存储实现
//! Memory store implementation
//!
//! 使用内存数据结构保存任务，不依赖任何外部服务；
//! 以 BTreeMap 充当按运行时间排序的二级索引。
//! Keeps jobs in in-memory data structures without any external service
//! dependencies; a BTreeMap acts as the run-time-ordered secondary index.

use crate::error::{Error, Result};
use crate::job::Job;
use crate::store::Store;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;

/// 内存中的任务表和运行时间索引
/// In-memory job table and run time index
#[derive(Default)]
struct MemoryStorage {
  /// 任务表 - key: 任务 id
  /// Job table - key: job id
  jobs: HashMap<String, Job>,
  /// 运行时间索引 - (unix 秒, 任务 id)
  /// Run time index - (unix seconds, job id)
  run_times: BTreeSet<(i64, String)>,
}

/// 内存存储
/// Memory store
#[derive(Default)]
pub struct MemoryStore {
  storage: RwLock<MemoryStorage>,
}

impl MemoryStore {
  /// 创建新的内存存储
  /// Create a new memory store
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl Store for MemoryStore {
  async fn init(&self) -> Result<()> {
    Ok(())
  }

  async fn add_job(&self, j: &Job) -> Result<()> {
    let mut storage = self.storage.write().await;
    storage
      .run_times
      .insert((j.next_run_time.timestamp(), j.id.clone()));
    storage.jobs.insert(j.id.clone(), j.clone());
    Ok(())
  }

  async fn get_job(&self, id: &str) -> Result<Job> {
    let storage = self.storage.read().await;
    storage
      .jobs
      .get(id)
      .cloned()
      .ok_or_else(|| Error::job_not_found(id))
  }

  async fn get_all_jobs(&self) -> Result<Vec<Job>> {
    let storage = self.storage.read().await;
    Ok(storage.jobs.values().cloned().collect())
  }

  async fn update_job(&self, j: &Job) -> Result<()> {
    let mut storage = self.storage.write().await;
    let old = storage
      .jobs
      .get(&j.id)
      .ok_or_else(|| Error::job_not_found(j.id.as_str()))?;
    let old_key = (old.next_run_time.timestamp(), old.id.clone());
    storage.run_times.remove(&old_key);
    storage
      .run_times
      .insert((j.next_run_time.timestamp(), j.id.clone()));
    storage.jobs.insert(j.id.clone(), j.clone());
    Ok(())
  }

  async fn delete_job(&self, id: &str) -> Result<()> {
    let mut storage = self.storage.write().await;
    if let Some(old) = storage.jobs.remove(id) {
      let old_key = (old.next_run_time.timestamp(), old.id);
      storage.run_times.remove(&old_key);
    }
    Ok(())
  }

  async fn delete_all_jobs(&self) -> Result<()> {
    let mut storage = self.storage.write().await;
    storage.jobs.clear();
    storage.run_times.clear();
    Ok(())
  }

  async fn get_next_run_time(&self) -> Result<Option<DateTime<Utc>>> {
    let storage = self.storage.read().await;
    Ok(
      storage
        .run_times
        .first()
        .and_then(|(ts, _)| DateTime::from_timestamp(*ts, 0)),
    )
  }

  async fn clear(&self) -> Result<()> {
    self.delete_all_jobs().await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::job::JobType;

  fn get_job(id: &str, next_run_time: DateTime<Utc>) -> Job {
    Job {
      id: id.to_string(),
      name: "Job".to_string(),
      job_type: JobType::Interval,
      interval: "1s".to_string(),
      next_run_time,
      ..Default::default()
    }
  }

  #[tokio::test]
  async fn test_memory_store_crud() {
    let store = MemoryStore::new();
    store.init().await.unwrap();

    let j = get_job("a000000000000001", Utc::now());
    store.add_job(&j).await.unwrap();

    let loaded = store.get_job(&j.id).await.unwrap();
    assert_eq!(j, loaded);

    assert_eq!(store.get_all_jobs().await.unwrap().len(), 1);

    store.delete_job(&j.id).await.unwrap();
    assert!(matches!(
      store.get_job(&j.id).await,
      Err(Error::JobNotFound { .. })
    ));
  }

  #[tokio::test]
  async fn test_memory_store_update_absent() {
    let store = MemoryStore::new();
    let j = get_job("a000000000000001", Utc::now());

    assert!(matches!(
      store.update_job(&j).await,
      Err(Error::JobNotFound { .. })
    ));
  }

  #[tokio::test]
  async fn test_memory_store_next_run_time_is_min() {
    let store = MemoryStore::new();
    let now = Utc::now();

    assert_eq!(store.get_next_run_time().await.unwrap(), None);

    store
      .add_job(&get_job("a000000000000001", now + chrono::Duration::seconds(30)))
      .await
      .unwrap();
    store
      .add_job(&get_job("a000000000000002", now + chrono::Duration::seconds(10)))
      .await
      .unwrap();
    store
      .add_job(&get_job("a000000000000003", now + chrono::Duration::seconds(20)))
      .await
      .unwrap();

    // 与遍历全部任务取最小值一致
    // Agrees with iterating all jobs and taking the minimum
    let min = store
      .get_all_jobs()
      .await
      .unwrap()
      .iter()
      .map(|j| j.next_run_time)
      .min()
      .unwrap();
    assert_eq!(store.get_next_run_time().await.unwrap(), Some(min));

    // 更新会同步移动索引
    // Updates move the index in step
    let mut j = store.get_job("a000000000000002").await.unwrap();
    j.next_run_time = now + chrono::Duration::seconds(60);
    store.update_job(&j).await.unwrap();

    let min = store
      .get_all_jobs()
      .await
      .unwrap()
      .iter()
      .map(|j| j.next_run_time)
      .min()
      .unwrap();
    assert_eq!(store.get_next_run_time().await.unwrap(), Some(min));

    store.clear().await.unwrap();
    assert_eq!(store.get_next_run_time().await.unwrap(), None);
  }
}
