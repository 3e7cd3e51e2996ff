//! 调度器模块
//! Scheduler module
//!
//! 单机模式下调度器只负责按时运行任务；
//! 集群模式下调度器还要负责把任务分配给集群节点。
//! In standalone mode the scheduler only runs jobs on time; in cluster
//! mode it is additionally responsible for allocating jobs to cluster
//! nodes.
//!
//! 运行循环是一个单独的任务：等待唤醒，读取到期任务并分发，
//! 然后根据存储中最小的下次运行时间动态计算下一次睡眠时长。
//! The run loop is a single task: it waits for a wakeup, reads and
//! dispatches due jobs, then derives the next sleep from the minimum next
//! run time in the store.

use crate::calc::{calc_next_run_time, truncate_to_second};
use crate::cluster::{ClusterNode, NodeInfo, REGISTER_TIMEOUT};
use crate::error::{Error, Result};
use crate::job::{Job, JobStatus, JobType};
use crate::notify::{notify_job_failure, EmailConfig, HttpCallbackConfig};
use crate::registry;
use crate::rpc;
use crate::store::Store;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 调度器
/// Scheduler
///
/// 所有公开方法都是并发安全的；调度器通常被放在 `Arc` 中，
/// 供运行循环、传输层和嵌入方共享。
/// All public methods are safe for concurrent use; the scheduler normally
/// lives in an `Arc` shared by the run loop, the transports and the
/// embedding caller.
pub struct Scheduler {
  /// 任务存储，唯一的任务状态来源
  /// Job store, the single source of job state
  store: RwLock<Option<Arc<dyn Store>>>,
  /// 集群模式下绑定的集群节点
  /// The cluster node bound in cluster mode
  cluster_node: RwLock<Option<Arc<ClusterNode>>>,
  /// 运行标志，start/stop 通过它串行化
  /// Running flag; start/stop serialize on it
  is_running: AtomicBool,
  /// 唤醒机制：到期时间被提前或调度器被停止时唤醒运行循环
  /// Wakeup primitive: wakes the run loop when a deadline moves earlier
  /// or the scheduler is stopped
  notify: tokio::sync::Notify,
  email_config: RwLock<Option<EmailConfig>>,
  http_callback_config: RwLock<Option<HttpCallbackConfig>>,
}

impl Default for Scheduler {
  fn default() -> Self {
    Self::new()
  }
}

impl Scheduler {
  /// 创建调度器，使用前须先绑定存储
  /// Create a scheduler; a store must be bound before use
  pub fn new() -> Self {
    Self {
      store: RwLock::new(None),
      cluster_node: RwLock::new(None),
      is_running: AtomicBool::new(false),
      notify: tokio::sync::Notify::new(),
      email_config: RwLock::new(None),
      http_callback_config: RwLock::new(None),
    }
  }

  /// 绑定存储并初始化后端
  /// Bind the store and initialize the backend
  pub async fn set_store(&self, store: Arc<dyn Store>) -> Result<()> {
    store.init().await?;
    if let Ok(mut guard) = self.store.write() {
      *guard = Some(store);
    }
    Ok(())
  }

  /// 绑定集群节点并初始化，注册失败对节点而言是致命的
  /// Bind and initialize the cluster node; a registration failure is
  /// fatal for the node
  pub async fn set_cluster_node(&self, cluster_node: Arc<ClusterNode>) -> Result<()> {
    if let Ok(mut guard) = self.cluster_node.write() {
      *guard = Some(Arc::clone(&cluster_node));
    }
    cluster_node.init().await
  }

  fn store(&self) -> Result<Arc<dyn Store>> {
    self
      .store
      .read()
      .ok()
      .and_then(|guard| guard.clone())
      .ok_or_else(|| Error::config("store is not set"))
  }

  fn cluster_node(&self) -> Option<Arc<ClusterNode>> {
    self.cluster_node.read().ok().and_then(|guard| guard.clone())
  }

  /// 设置邮件通知
  /// Set the email notification sink
  pub fn set_email_config(&self, config: EmailConfig) {
    if let Ok(mut guard) = self.email_config.write() {
      *guard = Some(config);
    }
  }

  /// 设置 HTTP 回调通知
  /// Set the HTTP callback notification sink
  pub fn set_http_callback_config(&self, config: HttpCallbackConfig) {
    if let Ok(mut guard) = self.http_callback_config.write() {
      *guard = Some(config);
    }
  }

  fn notify_configs(&self) -> (Option<EmailConfig>, Option<HttpCallbackConfig>) {
    (
      self.email_config.read().ok().and_then(|g| g.clone()),
      self.http_callback_config.read().ok().and_then(|g| g.clone()),
    )
  }

  /// 调度器是否在运行；存储取空时调度器会自行停止，
  /// 因此调用方不应假设该值跨事件稳定
  /// Whether the scheduler is running; it halts itself when the store
  /// drains, so callers should not assume this is stable across events
  pub fn is_running(&self) -> bool {
    self.is_running.load(Ordering::SeqCst)
  }

  /// 添加任务：初始化、持久化，并在需要时惰性启动调度器
  /// Add a job: initialize it, persist it and lazily start the scheduler
  pub async fn add_job(self: &Arc<Self>, mut j: Job) -> Result<Job> {
    j.init()?;

    info!("Scheduler add job `{}`.", j.full_name());

    self.store()?.add_job(&j).await?;

    if !self.is_running() {
      self.start();
    }

    Ok(j)
  }

  /// 按 id 读取任务
  /// Fetch a job by id
  pub async fn get_job(&self, id: &str) -> Result<Job> {
    self.store()?.get_job(id).await
  }

  /// 读取全部任务
  /// Fetch all jobs
  pub async fn get_all_jobs(&self) -> Result<Vec<Job>> {
    self.store()?.get_all_jobs().await
  }

  /// 更新任务并重算下次运行时间；
  /// 这是唯一会把下一次睡眠提前的路径
  /// Update a job and recompute its next run time; this is the only path
  /// that shortens the next sleep
  pub async fn update_job(&self, mut j: Job) -> Result<Job> {
    self.get_job(&j.id).await?;

    j.check()?;

    j.next_run_time = calc_next_run_time(&j, Utc::now())?;

    let last_next_wakeup_interval = self.next_wakeup_interval().await;

    self.store()?.update_job(&j).await?;

    let next_wakeup_interval = self.next_wakeup_interval().await;
    if next_wakeup_interval < last_next_wakeup_interval {
      self.wakeup();
    }

    Ok(j)
  }

  /// 删除任务
  /// Delete a job
  pub async fn delete_job(&self, id: &str) -> Result<()> {
    info!("Scheduler delete jobId `{}`.", id);

    self.get_job(id).await?;

    self.store()?.delete_job(id).await
  }

  /// 删除全部任务
  /// Delete all jobs
  pub async fn delete_all_jobs(&self) -> Result<()> {
    info!("Scheduler delete all jobs.");

    self.store()?.delete_all_jobs().await
  }

  /// 暂停任务，下次运行时间变为哨兵值
  /// Pause a job; its next run time becomes the sentinel
  pub async fn pause_job(&self, id: &str) -> Result<Job> {
    info!("Scheduler pause jobId `{}`.", id);

    let mut j = self.get_job(id).await?;
    j.status = JobStatus::Paused;

    self.update_job(j).await
  }

  /// 恢复任务
  /// Resume a job
  pub async fn resume_job(&self, id: &str) -> Result<Job> {
    info!("Scheduler resume jobId `{}`.", id);

    let mut j = self.get_job(id).await?;
    j.status = JobStatus::Running;

    self.update_job(j).await
  }

  /// 单机模式下直接运行任务，绕过调度
  /// Run a job directly in standalone mode, bypassing scheduling
  pub fn run_job(&self, j: Job) -> Result<()> {
    info!("Scheduler run job `{}`.", j.full_name());

    self._run_job(j);

    Ok(())
  }

  /// 集群模式下为任务挑选一个工作节点并分发
  /// Select a worker node for the job and dispatch, cluster aware
  pub fn schedule_job(&self, j: Job) -> Result<()> {
    info!("Scheduler schedule job `{}`.", j.full_name());

    self._schedule_job(j)
  }

  /// 在本进程内运行任务：解析注册表，带超时地在独立任务中执行
  /// Run the job in this process: resolve the registry and execute in its
  /// own task under the per-run timeout
  fn _run_job(&self, j: Job) {
    let Some(handler) = registry::lookup(&j.func_name) else {
      warn!("Job `{}` Func `{}` unregistered", j.full_name(), j.func_name);
      return;
    };

    info!(
      "Job `{}` is running, next run time: `{}`",
      j.full_name(),
      j.next_run_time
    );

    let (email_config, http_callback_config) = self.notify_configs();
    tokio::spawn(async move {
      let timeout = match humantime::parse_duration(&j.timeout) {
        Ok(timeout) => timeout,
        Err(e) => {
          let err_msg = format!("Job `{}` Timeout `{}` error: {}", j.full_name(), j.timeout, e);
          error!("{}", err_msg);
          notify_job_failure(&email_config, &http_callback_config, &j, &err_msg).await;
          return;
        }
      };

      let token = CancellationToken::new();
      let inner = tokio::spawn(handler(token.child_token(), j.clone()));
      tokio::select! {
        result = inner => match result {
          Ok(Ok(())) => {}
          Ok(Err(e)) => {
            let err_msg = format!("Job `{}` run error: {}", j.full_name(), e);
            error!("{}", err_msg);
            notify_job_failure(&email_config, &http_callback_config, &j, &err_msg).await;
          }
          Err(e) if e.is_panic() => {
            let err_msg = format!("Job `{}` run panic: {:?}", j.full_name(), e);
            error!("{}", err_msg);
            notify_job_failure(&email_config, &http_callback_config, &j, &err_msg).await;
          }
          Err(_) => {}
        },
        _ = tokio::time::sleep(timeout) => {
          // 运行中的任务不被强杀，取消信号即契约
          // The running task is not forcibly killed; the cancellation
          // signal is the contract
          token.cancel();
          warn!("Job `{}` run timeout", j.full_name());
          notify_job_failure(&email_config, &http_callback_config, &j, "Job run timeout").await;
        }
      }
    });
  }

  /// 调用对端节点的 RunJob RPC，不阻塞运行循环
  /// Call the peer node's RunJob RPC without blocking the run loop
  fn _run_job_remote(&self, node: NodeInfo, j: Job) {
    tokio::spawn(async move {
      let mut pb_job = crate::proto::Job::from(&j);
      pb_job.scheduled = true;
      if let Err(e) = rpc::call::<_, crate::proto::Empty>(
        &node.scheduler_endpoint,
        "RunJob",
        &pb_job,
        REGISTER_TIMEOUT,
      )
      .await
      {
        error!("Scheduler run job `{}` remote error {}", j.full_name(), e);
      }
    });
  }

  fn _schedule_job(&self, j: Job) -> Result<()> {
    match self.cluster_node() {
      // 单机模式
      // Standalone mode
      None => {
        self._run_job(j);
        Ok(())
      }
      // 集群模式下节点对等，也可能选中自己
      // In cluster mode all nodes are equal and may pick this node
      Some(cluster_node) => match cluster_node.choice_node(&j.queues) {
        Ok(node) if node.id != cluster_node.id() => {
          self._run_job_remote(node, j);
          Ok(())
        }
        _ => {
          if j.queues.is_empty() || j.queues.contains(&cluster_node.queue) {
            self._run_job(j);
            Ok(())
          } else {
            Err(Error::ClusterNodeUnavailable {
              queues: j.queues.clone(),
            })
          }
        }
      },
    }
  }

  /// 分发后的落盘：记录本次运行时间；已触发的一次性任务被删除，
  /// 其余任务整体更新
  /// Post-dispatch flush: record the run time; a fired one-shot job is
  /// deleted, everything else is updated in full
  async fn _flush_job(&self, mut j: Job, now: chrono::DateTime<Utc>) -> Result<()> {
    j.last_run_time = Some(truncate_to_second(now));

    if j.job_type == JobType::Datetime {
      if j.next_run_time < now {
        self
          .delete_job(&j.id)
          .await
          .map_err(|e| Error::store(format!("delete job `{}` error: {}", j.full_name(), e)))?;
      }
    } else {
      self
        .update_job(j.clone())
        .await
        .map_err(|e| Error::store(format!("update job `{}` error: {}", j.full_name(), e)))?;
    }

    Ok(())
  }

  /// 运行循环：扫描到期任务，分发并落盘，然后按最小下次运行时间睡眠
  /// The run loop: sweep due jobs, dispatch and flush them, then sleep
  /// until the minimum next run time
  async fn run(self: Arc<Self>) {
    loop {
      if !self.is_running() {
        break;
      }

      let now = Utc::now();

      let mut js = match self.get_all_jobs().await {
        Ok(js) => js,
        Err(e) => {
          // 存储级失败跳过本次扫描，循环保留，下次触发重试
          // A store-wide failure skips this sweep; the loop stays and the
          // next fire retries
          error!("Scheduler get all jobs error: {}", e);
          self.sleep_or_wakeup(Duration::from_secs(1)).await;
          continue;
        }
      };

      // 存储为空时停止调度器，避免空转唤醒
      // Stop the scheduler when the store is empty to avoid hot wakeups
      if js.is_empty() {
        self.stop();
        continue;
      }

      // 遇到第一个未到期的任务后，后续任务无需再检查
      // Once the first non-due job is reached, the rest need no check
      js.sort_by_key(|j| j.next_run_time);
      for mut j in js {
        if j.next_run_time >= now {
          break;
        }

        let next_run_time = match calc_next_run_time(&j, now) {
          Ok(next_run_time) => next_run_time,
          Err(e) => {
            error!("Scheduler calc next run time error: {}", e);
            continue;
          }
        };
        j.next_run_time = next_run_time;

        if let Err(e) = self._schedule_job(j.clone()) {
          error!("Scheduler schedule job `{}` error: {}", j.full_name(), e);
        }

        if let Err(e) = self._flush_job(j, now).await {
          error!("Scheduler {}", e);
          continue;
        }
      }

      let next_wakeup_interval = self.next_wakeup_interval().await;
      debug!("Scheduler next wakeup interval {:?}", next_wakeup_interval);
      self.sleep_or_wakeup(next_wakeup_interval).await;
    }

    info!("Scheduler quit.");
  }

  /// 睡到给定时长或被唤醒
  /// Sleep for the given duration or until woken
  async fn sleep_or_wakeup(&self, interval: Duration) {
    tokio::select! {
      _ = tokio::time::sleep(interval) => {}
      _ = self.notify.notified() => {}
    }
  }

  /// 动态计算下一次唤醒间隔，避免频繁唤醒调度器
  /// Dynamically compute the next wakeup interval to avoid waking the
  /// scheduler too often
  async fn next_wakeup_interval(&self) -> Duration {
    let next_run_time_min = match self.store() {
      Ok(store) => match store.get_next_run_time().await {
        Ok(next_run_time_min) => next_run_time_min,
        Err(e) => {
          error!("Scheduler get next wakeup interval error: {}", e);
          Some(Utc::now() + chrono::Duration::seconds(1))
        }
      },
      Err(_) => None,
    };

    match next_run_time_min {
      None => Duration::from_secs(1),
      Some(next_run_time_min) => {
        let interval = next_run_time_min - Utc::now();
        if interval < chrono::Duration::zero() {
          Duration::from_secs(1)
        } else {
          interval.to_std().unwrap_or(Duration::from_secs(1))
        }
      }
    }
  }

  /// 把运行循环的下一次唤醒提前到现在
  /// Move the run loop's next wakeup to now
  fn wakeup(&self) {
    self.notify.notify_one();
  }

  /// 启动调度器，幂等；除手动调用外 `add_job` 也会调用
  /// Start the scheduler, idempotent; besides manual calls, `add_job`
  /// also calls this
  pub fn start(self: &Arc<Self>) {
    if self.is_running.swap(true, Ordering::SeqCst) {
      info!("Scheduler is running.");
      return;
    }

    let scheduler = Arc::clone(self);
    tokio::spawn(async move {
      scheduler.run().await;
    });

    info!("Scheduler start.");
  }

  /// 停止调度器，幂等；除手动调用外，存储为空时也会被调用。
  /// 运行中的任务不会被终止，它们最多存活到各自的超时。
  /// Stop the scheduler, idempotent; besides manual calls, this is also
  /// invoked when the store is empty. Running jobs are not terminated;
  /// they live at most until their own timeouts.
  pub fn stop(&self) {
    if !self.is_running.swap(false, Ordering::SeqCst) {
      info!("Scheduler has stopped.");
      return;
    }

    self.notify.notify_one();

    info!("Scheduler stop.");
  }
}
