//! # Schedq
//!
//! Distributed, persistent job scheduler in Rust
//!
//! Schedq 是一个分布式持久化任务调度库：任务按间隔、cron 表达式或指定
//! 时刻触发，持久化在可插拔的存储后端中，到期后在本地运行或通过 RPC
//! 分发给集群中的对等节点。
//! Schedq is a distributed, persistent job scheduling library: jobs fire
//! on an interval, a cron expression or at a datetime, persist in a
//! pluggable store backend, and when due run locally or are dispatched to
//! a peer node over RPC.
//!
//! ## 特性
//! ## Features
//!
//! - 间隔、cron、一次性三种任务类型
//!   - Interval, cron and one-shot job types
//! - 按最小下次运行时间动态唤醒，空闲时不空转
//!   - Dynamic wakeups at the minimum next run time, no hot-spinning when idle
//! - 可插拔存储：内存、Redis
//!   - Pluggable stores: memory, Redis
//! - 对等集群：按队列路由、心跳健康检测
//!   - Peer-to-peer cluster: queue-keyed routing with heartbeat health checks
//! - 任务失败的邮件与 HTTP 回调通知
//!   - Email and HTTP callback notifications on job failures
//! - 每个任务独立的运行超时与取消信号
//!   - Per-job run timeout with a cancellation signal
//!
//! ## 快速开始
//! ## Quick Start
//!
//! ```rust,no_run
//! use schedq::job::{Job, JobType};
//! use schedq::registry;
//! use schedq::scheduler::Scheduler;
//! use schedq::store::MemoryStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // 注册任务函数
//!     // Register the job function
//!     registry::register_func("examples.print_msg", |_token, job| async move {
//!         println!("Run job `{}` {:?}", job.full_name(), job.args);
//!         Ok(())
//!     });
//!
//!     // 绑定存储并添加任务
//!     // Bind a store and add a job
//!     let scheduler = Arc::new(Scheduler::new());
//!     scheduler.set_store(Arc::new(MemoryStore::new())).await?;
//!
//!     let job = Job {
//!         name: "myJob".to_string(),
//!         job_type: JobType::Interval,
//!         interval: "2s".to_string(),
//!         func_name: "examples.print_msg".to_string(),
//!         ..Default::default()
//!     };
//!     scheduler.add_job(job).await?;
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(10)).await;
//!     scheduler.stop();
//!     Ok(())
//! }
//! ```

pub mod calc;
pub mod cluster;
pub mod error;
pub mod job;
pub mod notify;
pub mod proto;
pub mod registry;
pub mod rpc;
pub mod scheduler;
pub mod store;
