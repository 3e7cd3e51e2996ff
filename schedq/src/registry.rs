//! 函数注册表模块
//! Function registry module
//!
//! 任务持久化时只保存 `func_name`，进程级注册表负责在分发时把名字解析回
//! 可调用对象。Rust 无法可靠地从闭包推导出稳定的全限定名，因此注册时
//! 必须显式提供名字；同名注册后写覆盖先写。
//! A persisted job carries only `func_name`; the process-wide registry
//! resolves the name back to a callable at dispatch time. Rust cannot
//! reliably derive a stable fully-qualified name from a closure, so the
//! name is supplied explicitly at registration; on collisions the last
//! registration wins.

use crate::error::Result;
use crate::job::Job;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, LazyLock, RwLock};
use tokio_util::sync::CancellationToken;

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// 任务处理函数
/// Job handler function
///
/// 取消令牌在单次运行超时时被取消，处理函数可以选择观察它。
/// The cancellation token is cancelled at the per-run timeout; the handler
/// may choose to observe it.
pub type JobHandler = Arc<dyn Fn(CancellationToken, Job) -> BoxFuture<Result<()>> + Send + Sync>;

/// 进程级函数表，追加为主，无销毁
/// Process-wide function map, append-mostly, no teardown
static FUNC_MAP: LazyLock<RwLock<HashMap<String, JobHandler>>> =
  LazyLock::new(|| RwLock::new(HashMap::new()));

/// 注册一个任务处理函数，同名覆盖
/// Register a job handler; an existing name is overwritten
pub fn register_func<F, Fut>(name: &str, func: F)
where
  F: Fn(CancellationToken, Job) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<()>> + Send + 'static,
{
  let func = Arc::new(func);
  let handler: JobHandler = Arc::new(move |token: CancellationToken, job: Job| {
    let func = Arc::clone(&func);
    Box::pin(async move { func(token, job).await })
  });
  if let Ok(mut map) = FUNC_MAP.write() {
    map.insert(name.to_string(), handler);
  }
}

/// 查找处理函数
/// Look up a handler
pub fn lookup(name: &str) -> Option<JobHandler> {
  FUNC_MAP.read().ok().and_then(|map| map.get(name).cloned())
}

/// 检查名字是否已注册
/// Check whether a name is registered
pub fn contains(name: &str) -> bool {
  FUNC_MAP
    .read()
    .map(|map| map.contains_key(name))
    .unwrap_or(false)
}
