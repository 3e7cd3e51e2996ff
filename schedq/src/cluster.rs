//! 集群节点模块
//! Cluster node module
//!
//! 维护队列到节点的成员目录：主节点拥有权威目录并以扫描循环驱动
//! 健康状态机，工作节点向主节点注册并按固定周期发送心跳。
//! Maintains the queue-to-node membership directory: the main node owns
//! the authoritative directory and drives the health state machine with a
//! sweeper loop; worker nodes register with the main and heartbeat on a
//! fixed period.

use crate::error::{Error, Result};
use crate::proto::Node;
use crate::rpc;
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// 扫描循环的周期，同时也是健康判定阈值
/// Period of the sweeper loop, also the unhealthy threshold
pub const CHECK_INTERVAL: Duration = Duration::from_millis(200);

/// 心跳周期
/// Heartbeat period
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(100);

/// 心跳失败后的退避
/// Backoff after a failed heartbeat
pub const HEARTBEAT_BACKOFF: Duration = Duration::from_secs(1);

/// 超过该静默时长的节点从目录中删除
/// Nodes silent for longer than this are deleted from the directory
pub const NODE_EXPIRATION: Duration = Duration::from_secs(1);

/// 注册调用超时
/// Register call timeout
pub const REGISTER_TIMEOUT: Duration = Duration::from_secs(3);

/// 心跳调用超时
/// Ping call timeout
pub const PING_TIMEOUT: Duration = Duration::from_millis(200);

/// 目录条目，记录一个节点的身份与健康状态
/// Directory entry recording a node's identity and health
#[derive(Debug, Clone, Serialize)]
pub struct NodeInfo {
  pub id: String,
  pub main_endpoint: String,
  pub endpoint: String,
  pub endpoint_http: String,
  pub scheduler_endpoint: String,
  pub queue: String,
  pub health: bool,
  pub last_register_time: DateTime<Utc>,
}

impl From<&NodeInfo> for Node {
  fn from(n: &NodeInfo) -> Self {
    Node {
      id: n.id.clone(),
      main_endpoint: n.main_endpoint.clone(),
      endpoint: n.endpoint.clone(),
      endpoint_http: n.endpoint_http.clone(),
      scheduler_endpoint: n.scheduler_endpoint.clone(),
      queue: n.queue.clone(),
    }
  }
}

/// 队列 -> 节点 id -> 目录条目
/// queue -> node id -> directory entry
type QueueMap = HashMap<String, HashMap<String, NodeInfo>>;

/// 集群节点
/// Cluster node
///
/// 一个节点是主节点，当且仅当它自己的 `endpoint` 等于 `main_endpoint`。
/// 主节点拥有权威目录；工作节点本地只有自己的条目。
/// A node is main iff its own `endpoint` equals `main_endpoint`. The main
/// node owns the authoritative directory; a worker holds only its own
/// entry locally.
pub struct ClusterNode {
  id: RwLock<String>,
  /// 集群主节点的 RPC 地址
  /// RPC address of the cluster main
  pub main_endpoint: String,
  /// 本节点的集群 RPC 地址
  /// This node's cluster RPC address
  pub endpoint: String,
  /// 本节点的集群 HTTP 地址
  /// This node's cluster HTTP address
  pub endpoint_http: String,
  /// 本节点接受 RunJob RPC 的地址
  /// Address where this node accepts RunJob RPCs
  pub scheduler_endpoint: String,
  /// 本节点的队列名
  /// This node's queue name
  pub queue: String,
  queue_map: RwLock<QueueMap>,
}

impl ClusterNode {
  /// 创建集群节点，id 在 `init` 时分配
  /// Create a cluster node; the id is assigned by `init`
  pub fn new(
    main_endpoint: impl Into<String>,
    endpoint: impl Into<String>,
    endpoint_http: impl Into<String>,
    scheduler_endpoint: impl Into<String>,
    queue: impl Into<String>,
  ) -> Self {
    Self {
      id: RwLock::new(String::new()),
      main_endpoint: main_endpoint.into(),
      endpoint: endpoint.into(),
      endpoint_http: endpoint_http.into(),
      scheduler_endpoint: scheduler_endpoint.into(),
      queue: queue.into(),
      queue_map: RwLock::new(HashMap::new()),
    }
  }

  /// 本节点 id
  /// This node's id
  pub fn id(&self) -> String {
    self.id.read().map(|id| id.clone()).unwrap_or_default()
  }

  /// 覆盖节点 id，通常只由 `init` 调用
  /// Override the node id; normally only `init` does this
  pub fn set_id(&self, id: impl Into<String>) {
    if let Ok(mut guard) = self.id.write() {
      *guard = id.into();
    }
  }

  /// 是否是主节点
  /// Whether this node is the main node
  pub fn is_main(&self) -> bool {
    self.endpoint == self.main_endpoint
  }

  /// 本节点的线上身份
  /// This node's wire identity
  pub fn to_node(&self) -> Node {
    Node {
      id: self.id(),
      main_endpoint: self.main_endpoint.clone(),
      endpoint: self.endpoint.clone(),
      endpoint_http: self.endpoint_http.clone(),
      scheduler_endpoint: self.scheduler_endpoint.clone(),
      queue: self.queue.clone(),
    }
  }

  /// 初始化节点：分配 id、本地登记自己、启动扫描循环；
  /// 非主节点再向主节点注册并启动心跳。
  /// Initialize the node: assign an id, register self locally and start
  /// the sweeper loop; a non-main node then registers with the main and
  /// starts the heartbeat.
  ///
  /// 在远端注册返回之前本地就已经有自己的条目，因此本节点调度器的
  /// 分发在注册完成前也能工作。
  /// The local entry exists before the remote registration returns, so
  /// dispatch from this node's scheduler works even before the main has
  /// acknowledged it.
  pub async fn init(self: &Arc<Self>) -> Result<()> {
    if self.id().is_empty() {
      self.set_id(&Uuid::new_v4().simple().to_string()[..16]);
    }
    self.register_node(&self.to_node());

    let node = Arc::clone(self);
    tokio::spawn(async move {
      node.check_node().await;
    });

    if !self.is_main() {
      self.register_node_remote().await?;

      let node = Arc::clone(self);
      tokio::spawn(async move {
        node.heartbeat_remote().await;
      });
    }

    Ok(())
  }

  /// 登记一个节点，注册和心跳都经过这里
  /// Upsert a node; both registration and heartbeat funnel through here
  pub fn register_node(&self, n: &Node) {
    if let Ok(mut queue_map) = self.queue_map.write() {
      queue_map.entry(n.queue.clone()).or_default().insert(
        n.id.clone(),
        NodeInfo {
          id: n.id.clone(),
          main_endpoint: n.main_endpoint.clone(),
          endpoint: n.endpoint.clone(),
          endpoint_http: n.endpoint_http.clone(),
          scheduler_endpoint: n.scheduler_endpoint.clone(),
          queue: n.queue.clone(),
          health: true,
          last_register_time: Utc::now(),
        },
      );
    }
  }

  /// 在健康且队列被允许的节点中均匀随机选择一个
  /// Pick uniformly at random among healthy nodes whose queue is allowed
  ///
  /// `queues` 为空表示任意队列都可以。
  /// An empty `queues` means any queue is acceptable.
  pub fn choice_node(&self, queues: &[String]) -> Result<NodeInfo> {
    let candidates: Vec<NodeInfo> = self
      .queue_map
      .read()
      .map(|queue_map| {
        queue_map
          .values()
          .flat_map(|nodes| nodes.values())
          .filter(|n| n.health && (queues.is_empty() || queues.contains(&n.queue)))
          .cloned()
          .collect()
      })
      .unwrap_or_default();

    candidates
      .choose(&mut rand::thread_rng())
      .cloned()
      .ok_or_else(|| Error::ClusterNodeUnavailable {
        queues: queues.to_vec(),
      })
  }

  /// 目录快照
  /// Directory snapshot
  pub fn node_map(&self) -> QueueMap {
    self
      .queue_map
      .read()
      .map(|queue_map| queue_map.clone())
      .unwrap_or_default()
  }

  /// 扫描循环：静默超过 200ms 的节点标记为不健康，超过 1s 的删除
  /// Sweeper loop: nodes silent for over 200ms are marked unhealthy,
  /// over 1s are deleted
  async fn check_node(&self) {
    let expiration = chrono::Duration::seconds(NODE_EXPIRATION.as_secs() as i64);
    let unhealthy_after = chrono::Duration::milliseconds(CHECK_INTERVAL.as_millis() as i64);
    let mut ticker = tokio::time::interval(CHECK_INTERVAL);
    // 第一个 tick 立即完成
    // The first tick completes immediately
    ticker.tick().await;
    loop {
      ticker.tick().await;
      let now = Utc::now();
      let self_id = self.id();
      if let Ok(mut queue_map) = self.queue_map.write() {
        for nodes in queue_map.values_mut() {
          nodes.retain(|_, n| {
            if n.id == self_id {
              return true;
            }
            let silence = now - n.last_register_time;
            if silence > expiration {
              warn!("Cluster node `{}:{}` is deleted", n.id, n.endpoint);
              return false;
            }
            if silence > unhealthy_after {
              n.health = false;
              warn!("Cluster node `{}:{}` is unhealthy", n.id, n.endpoint);
            }
            true
          });
        }
      }
    }
  }

  /// 向主节点注册本节点，启动期失败对节点而言是致命的
  /// Register this node with the main; a failure at startup is fatal for
  /// the node
  pub async fn register_node_remote(&self) -> Result<()> {
    info!("Register with cluster main `{}`:", self.main_endpoint);

    let main: Node = rpc::call(
      &self.main_endpoint,
      "Register",
      &self.to_node(),
      REGISTER_TIMEOUT,
    )
    .await?;

    info!(
      "Cluster Main Scheduler RPC Service listening at: {}",
      main.scheduler_endpoint
    );
    info!("Cluster Main Scheduler RPC Service queue: `{}`", main.queue);

    Ok(())
  }

  /// 心跳循环，失败后以 1s 退避重试直至主节点恢复
  /// Heartbeat loop; after a failure retries with a 1s backoff until the
  /// main recovers
  async fn heartbeat_remote(&self) {
    loop {
      tokio::time::sleep(HEARTBEAT_INTERVAL).await;
      if let Err(e) = self.ping_remote().await {
        info!("Ping remote error: {}", e);
        tokio::time::sleep(HEARTBEAT_BACKOFF).await;
      }
    }
  }

  /// 向主节点发送一次心跳
  /// Send one heartbeat to the main
  pub async fn ping_remote(&self) -> Result<()> {
    let _: Node = rpc::call(&self.main_endpoint, "Ping", &self.to_node(), PING_TIMEOUT).await?;
    Ok(())
  }
}
