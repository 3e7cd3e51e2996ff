//! Redis 存储实现
//! Redis store implementation
//!
//! 任务本体保存在 hash 中，下次运行时间保存在 sorted set 中作为二级索引；
//! 写操作通过原子管道执行，保证两个结构同步推进。
//! Job bodies live in a hash and next run times in a sorted set acting as
//! the secondary index; writes go through atomic pipelines so both
//! structures advance together.

use crate::error::{Error, Result};
use crate::job::{state_dump, state_load, Job};
use crate::store::Store;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

/// 任务 hash 的键 - field: 任务 id, value: 任务状态字节
/// Key of the job hash - field: job id, value: job state bytes
pub const JOBS_KEY: &str = "schedq.jobs";

/// 运行时间 sorted set 的键 - member: 任务 id, score: unix 秒
/// Key of the run time sorted set - member: job id, score: unix seconds
pub const RUN_TIMES_KEY: &str = "schedq.run_times";

/// Redis 存储
/// Redis store
pub struct RedisStore {
  client: redis::Client,
}

impl RedisStore {
  /// 从已有客户端创建
  /// Create from an existing client
  pub fn new(client: redis::Client) -> Self {
    Self { client }
  }

  /// 从连接地址创建，例如 `redis://127.0.0.1:6379`
  /// Create from a connection URL, e.g. `redis://127.0.0.1:6379`
  pub fn open(url: &str) -> Result<Self> {
    Ok(Self {
      client: redis::Client::open(url)?,
    })
  }

  async fn connection(&self) -> Result<MultiplexedConnection> {
    Ok(self.client.get_multiplexed_async_connection().await?)
  }

  async fn put_job(&self, j: &Job) -> Result<()> {
    let state = state_dump(j)?;
    let mut conn = self.connection().await?;
    let _: () = redis::pipe()
      .atomic()
      .hset(JOBS_KEY, &j.id, state)
      .zadd(RUN_TIMES_KEY, &j.id, j.next_run_time.timestamp())
      .query_async(&mut conn)
      .await?;
    Ok(())
  }
}

#[async_trait]
impl Store for RedisStore {
  async fn init(&self) -> Result<()> {
    Ok(())
  }

  async fn add_job(&self, j: &Job) -> Result<()> {
    self.put_job(j).await
  }

  async fn get_job(&self, id: &str) -> Result<Job> {
    let mut conn = self.connection().await?;
    let state: Option<Vec<u8>> = conn.hget(JOBS_KEY, id).await?;
    match state {
      Some(state) => state_load(&state),
      None => Err(Error::job_not_found(id)),
    }
  }

  async fn get_all_jobs(&self) -> Result<Vec<Job>> {
    let mut conn = self.connection().await?;
    let states: Vec<(String, Vec<u8>)> = conn.hgetall(JOBS_KEY).await?;
    states.iter().map(|(_, state)| state_load(state)).collect()
  }

  async fn update_job(&self, j: &Job) -> Result<()> {
    let mut conn = self.connection().await?;
    let exists: bool = conn.hexists(JOBS_KEY, &j.id).await?;
    if !exists {
      return Err(Error::job_not_found(j.id.as_str()));
    }
    self.put_job(j).await
  }

  async fn delete_job(&self, id: &str) -> Result<()> {
    let mut conn = self.connection().await?;
    let _: () = redis::pipe()
      .atomic()
      .hdel(JOBS_KEY, id)
      .zrem(RUN_TIMES_KEY, id)
      .query_async(&mut conn)
      .await?;
    Ok(())
  }

  async fn delete_all_jobs(&self) -> Result<()> {
    let mut conn = self.connection().await?;
    let _: () = redis::pipe()
      .atomic()
      .del(JOBS_KEY)
      .del(RUN_TIMES_KEY)
      .query_async(&mut conn)
      .await?;
    Ok(())
  }

  async fn get_next_run_time(&self) -> Result<Option<DateTime<Utc>>> {
    let mut conn = self.connection().await?;
    let run_times: Vec<(String, i64)> = conn.zrange_withscores(RUN_TIMES_KEY, 0, 0).await?;
    Ok(
      run_times
        .first()
        .and_then(|(_, score)| DateTime::from_timestamp(*score, 0)),
    )
  }

  async fn clear(&self) -> Result<()> {
    self.delete_all_jobs().await
  }
}
